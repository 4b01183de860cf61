//! Core types for dep resolution

use crate::requirement::DepRequirement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Output;

/// The lifecycle hooks a dep can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    Setup,
    Met,
    Prepare,
    Before,
    Meet,
    After,
}

impl HookKind {
    /// All hooks in the order a full meet runs them
    pub const ALL: [HookKind; 6] = [
        Self::Setup,
        Self::Met,
        Self::Prepare,
        Self::Before,
        Self::Meet,
        Self::After,
    ];

    /// Name used in logs and dep files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Met => "met?",
            Self::Prepare => "prepare",
            Self::Before => "before",
            Self::Meet => "meet",
            Self::After => "after",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook reports back to the engine
///
/// `Unmet` is the ordinary "not yet" answer that drives the meet step.
/// `Unmeetable` means the environment can't be fixed automatically and is
/// terminal for the dep. `Error` is a hook that ran and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Check passed / action succeeded
    Success,
    /// Check failed / action didn't fix it
    Unmet,
    /// Cannot be fixed automatically
    Unmeetable { reason: String },
    /// The hook itself failed
    Error { message: String },
}

impl Outcome {
    /// Build an `Unmeetable` outcome
    pub fn unmeetable(reason: impl Into<String>) -> Self {
        Self::Unmeetable {
            reason: reason.into(),
        }
    }

    /// Build an `Error` outcome
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Check if the outcome is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the outcome ends the dep (unmeetable or error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unmeetable { .. } | Self::Error { .. })
    }
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Unmet }
    }
}

/// How a dep is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Check and, when unmet, try to meet
    Meet,
    /// Only run met? checks; never mutate the system
    CheckOnly,
}

impl Mode {
    /// Whether this mode may run prepare/before/meet/after
    pub fn attempts_to_meet(&self) -> bool {
        matches!(self, Self::Meet)
    }
}

/// Why a dep failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// A hook declared the dep unmeetable
    Unmeetable,
    /// A hook returned an error
    Error,
    /// met? was still false after meeting
    StillUnmet,
    /// Unmet and there's no meet hook
    NothingToDo,
    /// prepare or before declined to continue
    HookRefused,
    /// The dep (or its source) isn't loaded
    NotFound,
    /// A parameter couldn't be resolved
    Parameter,
}

impl FailureKind {
    /// Short user-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unmeetable => "unmeetable",
            Self::Error => "error",
            Self::StillUnmet => "still unmet",
            Self::NothingToDo => "nothing to do",
            Self::HookRefused => "refused",
            Self::NotFound => "not found",
            Self::Parameter => "bad parameter",
        }
    }
}

/// The deepest point of a failure: which dep, which hook, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Requirement that failed, as displayed (`source:name(args)`)
    pub dep: String,
    /// Hook that produced the failure, if any
    pub hook: Option<HookKind>,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(
        dep: impl Into<String>,
        hook: Option<HookKind>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            dep: dep.into(),
            hook,
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure was a deliberate "can't be fixed here"
    pub fn is_unmeetable(&self) -> bool {
        self.kind == FailureKind::Unmeetable
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hook {
            Some(hook) => write!(
                f,
                "{} ({} in {}): {}",
                self.dep,
                self.kind.label(),
                hook,
                self.message
            ),
            None => write!(f, "{} ({}): {}", self.dep, self.kind.label(), self.message),
        }
    }
}

/// Final state of one resolved dep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepResult {
    /// met? holds; `changed` when meet ran to get there
    Met { changed: bool },
    /// Currently unmet (check-only resolution, not an error)
    Unmet,
    /// Failed, with the deepest cause
    Failed(Failure),
}

impl DepResult {
    /// The boolean the engine caches and propagates
    pub fn is_met(&self) -> bool {
        matches!(self, Self::Met { .. })
    }

    /// Check if the result represents a change to the system
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Met { changed: true })
    }

    /// The failure, if there is one
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Result for one root dep of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootReport {
    pub requirement: DepRequirement,
    pub result: DepResult,
}

/// Summary of a `process()` call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// One report per root, in the order the roots were given
    pub roots: Vec<RootReport>,
}

impl RunSummary {
    /// Logical AND across all roots (true for an empty run)
    pub fn is_success(&self) -> bool {
        self.roots.iter().all(|r| r.result.is_met())
    }

    /// Roots that were met
    pub fn met(&self) -> usize {
        self.roots.iter().filter(|r| r.result.is_met()).count()
    }

    /// Roots where meet ran and succeeded
    pub fn changed(&self) -> usize {
        self.roots.iter().filter(|r| r.result.is_change()).count()
    }

    /// Roots that didn't end up met
    pub fn unmet(&self) -> usize {
        self.roots.len() - self.met()
    }

    /// Deepest failure for each failed root
    pub fn failures(&self) -> impl Iterator<Item = (&DepRequirement, &Failure)> {
        self.roots
            .iter()
            .filter_map(|r| r.result.failure().map(|f| (&r.requirement, f)))
    }
}

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Only check met?, never meet
    pub dry_run: bool,
    /// Ignore cached results for the root deps
    pub force: bool,
    /// Take defaults instead of prompting; fail when there's no default
    pub defaults: bool,
    /// Number of root trees resolved in parallel
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            defaults: false,
            jobs: 1,
        }
    }
}

impl RunOptions {
    /// The mode root deps are resolved in
    pub fn mode(&self) -> Mode {
        if self.dry_run {
            Mode::CheckOnly
        } else {
            Mode::Meet
        }
    }
}

/// How a hook wants a shell command run
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Run through sudo
    pub sudo: bool,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl CommandOptions {
    /// Options for a privileged command
    pub fn sudo() -> Self {
        Self {
            sudo: true,
            ..Default::default()
        }
    }
}

/// Output from a command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
