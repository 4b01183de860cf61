//! `tend meet`: resolve deps, meeting the unmet ones

use anyhow::{Result, bail};
use colored::Colorize;
use depkit::{NoReport, Providers, Reporter, RunOptions, RunSummary, Runner};
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::MeetArgs;
use crate::config::Config;
use crate::prompt::TerminalPrompter;
use crate::report::{ConsoleReporter, mark};
use crate::shell::ShellRunner;
use crate::{signal, ui};

/// Run the deps named in `args`; returns whether every root ended up met
pub fn run(ctx: &Context, config: &Config, args: &MeetArgs) -> Result<bool> {
    let (roots, named) = split_targets(&args.targets);
    if roots.is_empty() {
        bail!("No deps given, only parameter values");
    }

    let loaded = super::load(config)?;
    let options = RunOptions {
        dry_run: args.dry_run,
        force: args.force,
        defaults: args.defaults || config.defaults,
        jobs: args.jobs.or(config.jobs).unwrap_or(1).max(1),
    };
    log::debug!("run options: {options:?}");

    let commands = ShellRunner::new(ctx.verbose > 0 && !args.json);
    let prompter = TerminalPrompter::new();
    let console = ConsoleReporter::new(ctx.quiet, ctx.verbose > 0);
    let reporter: &dyn Reporter = if args.json { &NoReport } else { &console };
    let providers = Providers {
        commands: &commands,
        prompter: &prompter,
        reporter,
    };

    let runner =
        Runner::new(&loaded.registry, providers, options).with_cancel_token(signal::install());
    let summary = runner.process(roots.as_slice(), &named)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !ctx.quiet {
        print_summary(&summary, args.dry_run);
    }
    Ok(summary.is_success())
}

/// Separate `KEY=VALUE` parameter values from dep names
///
/// A token is a value when the text before `=` is a plain identifier, so
/// requirement syntax like `gem(name=rails)` stays a dep name.
fn split_targets(targets: &[String]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut roots = Vec::new();
    let mut named = BTreeMap::new();
    for target in targets {
        match target.split_once('=') {
            Some((key, value))
                if !key.is_empty()
                    && key
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '-') =>
            {
                named.insert(key.to_string(), value.to_string());
            }
            _ => roots.push(target.clone()),
        }
    }
    (roots, named)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    for root in &summary.roots {
        println!("{} {}", mark(&root.result), root.requirement);
    }
    for (requirement, failure) in summary.failures() {
        if failure.dep == requirement.to_string() {
            ui::error(&failure.to_string());
        } else {
            ui::error(&format!("{requirement}: caused by {failure}"));
        }
    }

    let total = summary.roots.len();
    let line = if dry_run {
        format!("{} of {} met", summary.met(), total)
    } else {
        format!(
            "{} of {} met, {} changed",
            summary.met(),
            total,
            summary.changed()
        )
    };
    if summary.is_success() {
        ui::success(&line);
    } else {
        println!("{} {}", "✗".red(), line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_split_targets() {
        let (roots, named) = split_targets(&strings(&[
            "ripgrep",
            "version=14",
            "core:git",
            "gem(name=rails)",
            "user_name=ada",
        ]));
        assert_eq!(roots, ["ripgrep", "core:git", "gem(name=rails)"]);
        assert_eq!(named.len(), 2);
        assert_eq!(named["version"], "14");
        assert_eq!(named["user_name"], "ada");
    }

    #[test]
    fn test_only_values_yields_no_roots() {
        let (roots, named) = split_targets(&strings(&["a=1"]));
        assert!(roots.is_empty());
        assert_eq!(named["a"], "1");
    }
}
