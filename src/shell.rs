//! Runs hook commands through the system shell

use anyhow::{Context, Result};
use depkit::{CommandOptions, CommandOutput, CommandRunner};
use std::process::{Command, Stdio};

/// Runs each command line with `sh -c`, or `sudo sh -c` when asked
///
/// Stdin is inherited so sudo and interactive installers can prompt; stdout
/// and stderr are captured for the hook to inspect.
#[derive(Debug, Default)]
pub struct ShellRunner {
    /// Print each command before running it
    pub echo: bool,
}

impl ShellRunner {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }

    fn command(line: &str, options: &CommandOptions) -> Command {
        let mut cmd = if options.sudo {
            let mut cmd = Command::new("sudo");
            cmd.args(["sh", "-c", line]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", line]);
            cmd
        };
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(options.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, line: &str, options: &CommandOptions) -> Result<CommandOutput> {
        let prefix = if options.sudo { "sudo " } else { "" };
        log::debug!("$ {prefix}{line}");
        if self.echo {
            crate::ui::dim(&format!("$ {prefix}{line}"));
        }

        let output = Self::command(line, options)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute: {prefix}sh -c {line:?}"))?;

        let output = CommandOutput::from(output);
        log::trace!("exit {:?}: {}", output.code, output.stderr_str().trim());
        Ok(output)
    }
}
