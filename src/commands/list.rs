//! `tend list`: show the deps that are loaded

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::Context;
use crate::cli::ListArgs;
use crate::config::Config;
use crate::ui;

#[derive(Debug, Serialize)]
struct DepInfo {
    source: String,
    name: String,
    description: Option<String>,
    template: Option<String>,
    params: Vec<String>,
    requires: Vec<String>,
}

pub fn run(_ctx: &Context, config: &Config, args: &ListArgs) -> Result<()> {
    let loaded = super::load(config)?;
    let filter = args.filter.as_deref().map(str::to_lowercase);

    let deps: Vec<DepInfo> = loaded
        .registry
        .iter()
        .filter(|(_, def)| {
            filter
                .as_deref()
                .is_none_or(|f| def.name.to_lowercase().contains(f))
        })
        .map(|(source, def)| DepInfo {
            source: source.to_string(),
            name: def.name.clone(),
            description: def.description.clone(),
            template: def.template.as_ref().map(ToString::to_string),
            params: def.params.iter().map(|p| p.name.clone()).collect(),
            requires: def.requires.iter().map(|r| r.dep.to_string()).collect(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&deps)?);
        return Ok(());
    }

    ui::header("Deps");
    if deps.is_empty() {
        ui::dim("No deps found");
        return Ok(());
    }

    let mut current_source = "";
    for dep in &deps {
        if dep.source != current_source {
            ui::section(&dep.source);
            current_source = &dep.source;
        }
        let params = if dep.params.is_empty() {
            String::new()
        } else {
            format!("({})", dep.params.join(", "))
        };
        let template = dep
            .template
            .as_ref()
            .map(|t| format!(" [from {t}]").dimmed().to_string())
            .unwrap_or_default();
        println!("  {}{}{}", dep.name.bold(), params, template);
        if let Some(description) = &dep.description {
            println!("    {}", description.dimmed());
        }
    }
    println!();
    ui::kv("Total", &deps.len().to_string());
    Ok(())
}
