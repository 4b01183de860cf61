//! Console progress output for a run
//!
//! Deps print as nested blocks, one level of indent per requirement depth:
//!
//! ```text
//! ripgrep {
//!   homebrew ✓ (cached)
//!   meet: brew install ripgrep
//! } ✓ ripgrep
//! ```

use colored::Colorize;
use depkit::{DepResult, HookKind, Reporter};

const INDENT: &str = "  ";

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter {
    /// Only print failures and warnings
    pub quiet: bool,
    /// Also print each hook as it starts
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }
}

fn indent(depth: usize) -> String {
    INDENT.repeat(depth)
}

/// One-word status mark for a result
pub fn mark(result: &DepResult) -> String {
    match result {
        DepResult::Met { changed: false } => "✓".green().to_string(),
        DepResult::Met { changed: true } => "✓".green().bold().to_string(),
        DepResult::Unmet => "~".yellow().to_string(),
        DepResult::Failed(_) => "✗".red().to_string(),
    }
}

impl Reporter for ConsoleReporter {
    fn log(&self, message: &str, depth: usize) {
        if !self.quiet {
            println!("{}{}", indent(depth), message.dimmed());
        }
    }

    fn warn(&self, message: &str, depth: usize) {
        println!("{}{} {}", indent(depth), "⚠".yellow(), message);
    }

    fn enter_dep(&self, dep: &str, depth: usize) {
        if !self.quiet {
            println!("{}{} {{", indent(depth), dep.bold());
        }
    }

    fn hook(&self, dep: &str, hook: HookKind, depth: usize) {
        if self.verbose && !self.quiet {
            println!("{}{}", indent(depth + 1), format!("{dep}: {hook}").dimmed());
        }
    }

    fn report_result(&self, dep: &str, result: &DepResult, depth: usize) {
        let pad = indent(depth);
        match result {
            DepResult::Failed(failure) => {
                let close = if self.quiet { "" } else { "} " };
                println!("{pad}{close}{} {}", mark(result), dep.red());
                if failure.dep == dep {
                    println!("{pad}{INDENT}{}", failure.to_string().red());
                }
            }
            DepResult::Unmet if self.quiet => println!("{pad}{} {} (unmet)", mark(result), dep),
            _ if self.quiet => {}
            DepResult::Unmet => println!("{pad}}} {} {} {}", mark(result), dep, "(unmet)".yellow()),
            DepResult::Met { .. } => println!("{pad}}} {} {}", mark(result), dep),
        }
    }

    fn report_cached(&self, dep: &str, result: &DepResult, depth: usize) {
        if self.quiet && !matches!(result, DepResult::Failed(_)) {
            return;
        }
        println!(
            "{}{} {} {}",
            indent(depth),
            dep,
            mark(result),
            "(cached)".dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depkit::{Failure, FailureKind};

    #[test]
    fn test_marks_differ_by_result() {
        colored::control::set_override(false);
        assert_eq!(mark(&DepResult::Met { changed: false }), "✓");
        assert_eq!(mark(&DepResult::Unmet), "~");
        let failed = DepResult::Failed(Failure::new("git", None, FailureKind::Error, "boom"));
        assert_eq!(mark(&failed), "✗");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "    ");
    }
}
