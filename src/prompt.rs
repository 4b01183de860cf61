//! Terminal prompts for parameter values

use anyhow::{Context, Result};
use depkit::{AskOptions, Choice, Prompter};
use dialoguer::{Input, Select};
use std::io::IsTerminal;
use std::sync::Mutex;

/// Asks on the terminal with dialoguer
///
/// Root deps may resolve on several threads; prompts are serialized so two
/// questions never share the screen.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    lock: Mutex<()>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&self, message: &str, options: &AskOptions) -> Result<String> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !options.choices.is_empty() {
            let items: Vec<String> = options.choices.iter().map(choice_label).collect();
            let default = options
                .default
                .as_deref()
                .and_then(|d| options.choices.iter().position(|c| c.value == d))
                .unwrap_or(0);
            let index = Select::new()
                .with_prompt(message)
                .items(&items)
                .default(default)
                .interact()
                .with_context(|| format!("Failed to read answer to '{message}'"))?;
            return Ok(options.choices[index].value.clone());
        }

        let mut input = Input::<String>::new().with_prompt(message);
        if let Some(default) = &options.default {
            input = input.default(default.clone());
        }
        input
            .interact_text()
            .with_context(|| format!("Failed to read answer to '{message}'"))
    }

    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }
}

fn choice_label(choice: &Choice) -> String {
    match &choice.description {
        Some(description) => format!("{} - {}", choice.value, description),
        None => choice.value.clone(),
    }
}
