//! # Depkit
//!
//! A dependency-graph engine for declarative system setup.
//!
//! A dep pairs a check (`met?`) with a fix (`meet`). Deps require other
//! deps; resolving a dep resolves its requirements depth-first, checks it,
//! and meets it only when the check fails, then checks again. Each bound
//! requirement runs at most once per run, however many deps share it.
//!
//! ## Core Concepts
//!
//! - **DepDefinition**: Declared requirements, parameters and hooks, built with [`DepBuilder`]
//! - **Registry**: Definitions grouped by source, with template flattening
//! - **DepRequirement**: A dep name plus bound arguments; the result cache key
//! - **Runner**: Resolves root deps, sharing a result cache across them
//!
//! ## Example
//!
//! ```ignore
//! use depkit::{DepDefinition, Outcome, Providers, Registry, RunOptions, Runner};
//! use std::collections::BTreeMap;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     DepDefinition::builder("homebrew")
//!         .met(|ctx| Ok(ctx.run_ok("which brew")?.into()))
//!         .meet(|ctx| Ok(ctx.run_ok("./install-homebrew.sh")?.into()))
//!         .build(),
//! )?;
//! registry.register(
//!     DepDefinition::builder("ripgrep")
//!         .requires("homebrew")
//!         .met(|ctx| Ok(ctx.run_ok("which rg")?.into()))
//!         .meet(|ctx| Ok(ctx.run_ok("brew install ripgrep")?.into()))
//!         .build(),
//! )?;
//!
//! let runner = Runner::new(&registry, providers, RunOptions::default());
//! let summary = runner.process(&["ripgrep"], &BTreeMap::new())?;
//! assert!(summary.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The engine never touches the system itself. Hooks reach the outside
//! world through:
//!
//! - [`CommandRunner`]: Runs shell commands
//! - [`Prompter`]: Asks for parameter values
//! - [`Reporter`]: Receives progress as deps resolve
//!
//! so the crate carries no terminal, shell or prompt dependencies.

mod cache;
pub mod context;
pub mod definition;
mod dep;
pub mod error;
pub mod parameter;
pub mod registry;
pub mod requirement;
pub mod runner;
mod task;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use context::{
    AskOptions, CancelToken, CommandRunner, HookContext, NoCommands, NoReport, NonInteractive,
    Prompter, Providers, Reporter,
};
pub use definition::{DepBuilder, DepDefinition, Hook, Hooks, ResolvedDep};
pub use error::{DepError, ParamError, Result};
pub use parameter::{Choice, ParamSet, ParamSpec, Parameter};
pub use registry::{DEFAULT_SOURCE, MAX_TEMPLATE_DEPTH, Registry, Source};
pub use requirement::{ArgValue, DepName, DepRequirement, RequirementSpec, Target, TargetArg};
pub use runner::Runner;
pub use types::{
    CommandOptions, CommandOutput, DepResult, Failure, FailureKind, HookKind, Mode, Outcome,
    RootReport, RunOptions, RunSummary,
};
pub use version::{Version, VersionError, VersionOf, VersionOp, VersionSpec};
