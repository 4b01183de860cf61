//! Hook context and provider traits
//!
//! These traits let the engine run without depending on a particular shell,
//! terminal or prompt library. The binary supplies real implementations;
//! tests use the no-op ones here.

use crate::error::{ParamError, Result as DepResultOf};
use crate::parameter::{Choice, ParamSet, Parameter};
use crate::requirement::DepRequirement;
use crate::task::Task;
use crate::types::{CommandOptions, CommandOutput, DepResult, HookKind, Mode, Outcome};
use anyhow::Result;
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// `{{ name }}` placeholders in hook text
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Runs shell commands on behalf of hooks
///
/// The engine itself never shells out; hooks call through this.
pub trait CommandRunner: Send + Sync {
    /// Run a command line and capture its output
    fn run(&self, command: &str, options: &CommandOptions) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, command: &str, options: &CommandOptions) -> Result<bool> {
        Ok(self.run(command, options)?.success)
    }

    /// Run a command and capture stdout, failing on a non-zero exit
    fn run_capture(&self, command: &str, options: &CommandOptions) -> Result<String> {
        let output = self.run(command, options)?;
        if !output.success {
            anyhow::bail!("Command failed: {}", output.stderr_str().trim());
        }
        Ok(output.stdout_str())
    }
}

/// Runner for contexts where hooks must not shell out
pub struct NoCommands;

impl CommandRunner for NoCommands {
    fn run(&self, command: &str, _options: &CommandOptions) -> Result<CommandOutput> {
        anyhow::bail!("No command runner available to run: {command}")
    }
}

/// What a prompt may offer besides free text
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub default: Option<String>,
    pub choices: Vec<Choice>,
}

/// Asks the user for parameter values
pub trait Prompter: Send + Sync {
    /// Ask for a value
    fn ask(&self, message: &str, options: &AskOptions) -> Result<String>;

    /// Whether prompting is possible at all (e.g. stdin is a terminal)
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Prompter that refuses to ask, so resolution fails fast instead of blocking
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn ask(&self, message: &str, _options: &AskOptions) -> Result<String> {
        anyhow::bail!("Cannot prompt for '{message}' in non-interactive mode")
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Receives progress while deps resolve
///
/// `depth` is the nesting level of the dep in its call tree (roots are 0).
pub trait Reporter: Send + Sync {
    /// Free-form message from the engine or a hook
    fn log(&self, message: &str, depth: usize);

    /// Something worth drawing attention to
    fn warn(&self, message: &str, depth: usize) {
        self.log(message, depth);
    }

    /// Called when a dep starts resolving
    fn enter_dep(&self, dep: &str, depth: usize);

    /// Called before each hook runs
    fn hook(&self, _dep: &str, _hook: HookKind, _depth: usize) {}

    /// Called with the final result of a dep
    fn report_result(&self, dep: &str, result: &DepResult, depth: usize);

    /// Called when a dep's result came from the run cache
    fn report_cached(&self, dep: &str, result: &DepResult, depth: usize) {
        self.report_result(dep, result, depth);
    }
}

/// No-op reporter
pub struct NoReport;

impl Reporter for NoReport {
    fn log(&self, _message: &str, _depth: usize) {}
    fn enter_dep(&self, _dep: &str, _depth: usize) {}
    fn report_result(&self, _dep: &str, _result: &DepResult, _depth: usize) {}
}

/// The external collaborators a run talks to
#[derive(Clone, Copy)]
pub struct Providers<'a> {
    pub commands: &'a dyn CommandRunner,
    pub prompter: &'a dyn Prompter,
    pub reporter: &'a dyn Reporter,
}

impl Providers<'static> {
    /// No shell, no prompts, no output
    pub fn silent() -> Self {
        Self {
            commands: &NoCommands,
            prompter: &NonInteractive,
            reporter: &NoReport,
        }
    }
}

/// Cooperative cancellation flag, checked between deps
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at the next dep boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Everything a hook can reach while it runs
///
/// Parameters resolve lazily through the run's prompter. `is_met` and
/// `require` dereference other deps through the same cache and call stack
/// as declared requirements, so cycles through them are still caught.
pub struct HookContext<'t, 'r> {
    pub(crate) task: &'t mut Task<'r>,
    pub(crate) requirement: &'t DepRequirement,
    pub(crate) source: &'t str,
    pub(crate) params: &'t mut ParamSet,
    pub(crate) hook: HookKind,
    pub(crate) depth: usize,
    pub(crate) mode: Mode,
}

impl HookContext<'_, '_> {
    /// Display name of the dep being resolved (`source:name(args)`)
    pub fn dep_name(&self) -> String {
        self.requirement.to_string()
    }

    pub fn requirement(&self) -> &DepRequirement {
        self.requirement
    }

    /// Source the dep was loaded from
    pub fn source(&self) -> &str {
        self.source
    }

    /// The hook currently running
    pub fn hook(&self) -> HookKind {
        self.hook
    }

    /// Nesting level in the call tree
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether prompting is allowed in this run
    pub fn is_interactive(&self) -> bool {
        let runner = self.task.runner();
        !runner.options().defaults && runner.providers().prompter.is_interactive()
    }

    /// Resolve a parameter (prompting if needed and allowed)
    pub fn param(&mut self, name: &str) -> std::result::Result<String, ParamError> {
        let interactive = self.is_interactive();
        let prompter = self.task.runner().providers().prompter;
        self.params.resolve(name, prompter, interactive)
    }

    /// Bind a derived value, typically from `setup`
    pub fn set_param(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> std::result::Result<(), ParamError> {
        self.params.get_mut(name)?.set(value)
    }

    /// Adjust a parameter's default, prompt or choices before it resolves
    pub fn param_mut(&mut self, name: &str) -> std::result::Result<&mut Parameter, ParamError> {
        self.params.get_mut(name)
    }

    /// Replace `{{ name }}` placeholders with parameter values
    pub fn interpolate(&mut self, text: &str) -> std::result::Result<String, ParamError> {
        // Resolve in order of appearance so prompts follow the text
        for caps in PLACEHOLDER.captures_iter(text) {
            self.param(&caps[1])?;
        }
        Ok(PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                self.params
                    .get(&caps[1])
                    .and_then(Parameter::value)
                    .unwrap_or_default()
                    .to_string()
            })
            .into_owned())
    }

    /// Run a command with explicit options
    pub fn run_with(&self, command: &str, options: &CommandOptions) -> Result<CommandOutput> {
        log::debug!("[{}:{}] $ {}", self.requirement, self.hook, command);
        self.task.runner().providers().commands.run(command, options)
    }

    /// Run a command and capture its output
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with(command, &CommandOptions::default())
    }

    /// Run a command and report whether it exited 0
    pub fn run_ok(&self, command: &str) -> Result<bool> {
        Ok(self.run(command)?.success)
    }

    /// Run a command and return trimmed stdout, failing on a non-zero exit
    pub fn run_capture(&self, command: &str) -> Result<String> {
        let output = self.run(command)?;
        if !output.success {
            anyhow::bail!("Command failed: {}", output.stderr_str().trim());
        }
        Ok(output.stdout_str().trim().to_string())
    }

    /// Run a command through sudo
    pub fn run_sudo(&self, command: &str) -> Result<CommandOutput> {
        self.run_with(command, &CommandOptions::sudo())
    }

    /// Send a message to the reporter at this dep's depth
    pub fn log(&self, message: &str) {
        self.task.runner().providers().reporter.log(message, self.depth + 1);
    }

    pub fn warn(&self, message: &str) {
        self.task.runner().providers().reporter.warn(message, self.depth + 1);
    }

    /// Shorthand for returning [`Outcome::Unmeetable`]
    pub fn unmeetable(&self, reason: impl Into<String>) -> Outcome {
        Outcome::unmeetable(reason)
    }

    /// Check whether another dep is met without meeting it
    pub fn is_met(&mut self, requirement: impl Into<DepRequirement>) -> DepResultOf<bool> {
        let requirement = requirement.into();
        let result = self.task.resolve(
            &requirement,
            Some(self.source),
            Mode::CheckOnly,
            self.depth + 1,
            false,
        )?;
        Ok(result.is_met())
    }

    /// Resolve another dep in the current mode (meeting it if this run meets)
    pub fn require(&mut self, requirement: impl Into<DepRequirement>) -> DepResultOf<bool> {
        let requirement = requirement.into();
        let result = self.task.resolve(
            &requirement,
            Some(self.source),
            self.mode,
            self.depth + 1,
            false,
        )?;
        Ok(result.is_met())
    }
}
