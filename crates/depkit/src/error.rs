//! Error types for dep resolution.
//!
//! Errors are split into two groups. Configuration errors describe a bug in
//! the dep declarations (duplicates, cycles, bad references) and abort the
//! whole run. Everything else that can go wrong inside a hook is turned into
//! a failed [`DepResult`](crate::types::DepResult) at the dep boundary and
//! never reaches this type.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DepError>;

/// Errors raised by the registry, requirement binding and the runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DepError {
    /// A definition with this name already exists in the source
    #[error("dep '{name}' is already defined in source '{source_name}'")]
    DuplicateDep {
        /// Name of the dep that was registered twice
        name: String,
        /// Source the existing definition belongs to
        source_name: String,
    },

    /// No definition with this name in any loaded source
    #[error("dep not found: {name}")]
    NotFound {
        /// The name as it was requested
        name: String,
    },

    /// A qualified name referenced a source that isn't loaded
    #[error("source not found: {name}")]
    SourceNotFound {
        /// Source part of the qualified name
        name: String,
    },

    /// A definition names a template that isn't registered
    #[error("template '{template}' (used by '{dep}') not found")]
    TemplateNotFound {
        /// Dep whose template chain is broken
        dep: String,
        /// The missing template name
        template: String,
    },

    /// Template chain is longer than the allowed depth (or loops)
    #[error("template chain for '{dep}' exceeds {max_depth} levels")]
    TemplateDepthExceeded {
        /// Dep whose template chain was being flattened
        dep: String,
        /// The configured bound
        max_depth: usize,
    },

    /// Unqualified name matches definitions in more than one source
    #[error("'{name}' is ambiguous, found in: {}", candidates.join(", "))]
    AmbiguousDep {
        /// The unqualified name
        name: String,
        /// Qualified candidates (`source:name`)
        candidates: Vec<String>,
    },

    /// Positional arguments don't match the declared parameters
    #[error("'{dep}' takes {expected} argument(s) but {given} were supplied")]
    ArgumentArity {
        /// Dep being bound
        dep: String,
        /// Number of declared parameters
        expected: usize,
        /// Number of supplied arguments
        given: usize,
    },

    /// A named argument doesn't correspond to any declared parameter
    #[error("'{dep}' has no parameter named '{param}'")]
    UnknownArgument {
        /// Dep being bound
        dep: String,
        /// The offending argument name
        param: String,
    },

    /// A target typed by the user isn't `name` or `name(args)`
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// The target as given
        target: String,
        /// What is wrong with it
        reason: String,
    },

    /// A requirement appeared twice on the active call stack
    #[error("cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency {
        /// Requirements from the first occurrence back to the repeat
        chain: Vec<String>,
    },

    /// The run's cancel token was triggered
    #[error("run cancelled")]
    Cancelled,

    /// A parameter could not be resolved
    #[error(transparent)]
    Parameter(#[from] ParamError),
}

impl DepError {
    /// Whether this error indicates a bug in the dep declarations.
    ///
    /// Configuration errors are fatal and abort the whole run. Lookup and
    /// parameter errors are not: they fail the dep that hit them, the same
    /// way an unloaded source just leaves its deps unresolvable.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Self::NotFound { .. } | Self::SourceNotFound { .. } | Self::Parameter(_) | Self::Cancelled
        )
    }

    /// Whether this error stops the run (configuration errors and cancellation).
    pub fn is_fatal(&self) -> bool {
        self.is_configuration() || matches!(self, Self::Cancelled)
    }
}

/// Errors from resolving a [`Parameter`](crate::parameter::Parameter).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParamError {
    /// The dep doesn't declare a parameter with this name
    #[error("no parameter named '{name}'")]
    Unknown {
        /// The requested name
        name: String,
    },

    /// No value, no default and prompting isn't allowed
    #[error("no value for '{name}' and prompting is disabled")]
    Unresolvable {
        /// Parameter name
        name: String,
    },

    /// A supplied or answered value isn't one of the allowed choices
    #[error("'{value}' is not a valid choice for '{name}' (expected one of: {})", choices.join(", "))]
    InvalidChoice {
        /// Parameter name
        name: String,
        /// The rejected value
        value: String,
        /// The allowed values
        choices: Vec<String>,
    },

    /// A value was already resolved and can't change for this run
    #[error("'{name}' is already set to '{value}'")]
    AlreadyResolved {
        /// Parameter name
        name: String,
        /// The fixed value
        value: String,
    },

    /// The prompter failed
    #[error("prompt for '{name}' failed: {message}")]
    Prompt {
        /// Parameter name
        name: String,
        /// Error reported by the prompter
        message: String,
    },
}
