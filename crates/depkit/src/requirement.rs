//! Requirement edges between deps
//!
//! A definition declares its edges as [`RequirementSpec`]s, whose arguments
//! may forward the declaring dep's own parameters. When the edge is walked,
//! those parameters are resolved and the requirement becomes a [`DepRequirement`]:
//! a plain value object that is compared by name and arguments and serves
//! as the key for the per-run result cache.

use crate::error::DepError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dep name, optionally qualified with its source (`source:name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepName {
    pub source: Option<String>,
    pub name: String,
}

impl DepName {
    /// Split `source:name`; anything without a colon is unqualified.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.split_once(':') {
            Some((source, name)) if !source.is_empty() => Self {
                source: Some(source.to_string()),
                name: name.to_string(),
            },
            Some((_, name)) => Self::unqualified(name),
            None => Self::unqualified(input),
        }
    }

    /// A name without a source
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            source: None,
            name: name.into(),
        }
    }

    /// A name pinned to a source
    pub fn qualified(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            name: name.into(),
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.source.is_some()
    }
}

impl fmt::Display for DepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}", source, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for DepName {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// An argument in a declared requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgValue {
    /// A fixed value
    Literal(String),
    /// The declaring dep's parameter of this name, resolved when the edge is walked
    Param(String),
}

/// A requirement as declared on a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub dep: DepName,
    pub args: Vec<ArgValue>,
}

impl RequirementSpec {
    /// A requirement with no arguments
    pub fn new(name: &str) -> Self {
        Self {
            dep: DepName::parse(name),
            args: Vec::new(),
        }
    }

    /// Append a literal argument
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(ArgValue::Literal(value.into()));
        self
    }

    /// Append an argument forwarded from the declaring dep's parameter
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgValue::Param(name.into()));
        self
    }
}

impl From<&str> for RequirementSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for RequirementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dep)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|a| match a {
                    ArgValue::Literal(v) => v.clone(),
                    ArgValue::Param(p) => format!("{{{{{p}}}}}"),
                })
                .collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// A dep reference with bound argument values
///
/// Two requirements are equal iff their names and arguments are equal, which
/// is what makes this the cache key for at-most-once execution. An argument
/// slot of `None` is left for the dep to resolve itself (default or prompt).
/// An empty argument list means every slot is unbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepRequirement {
    pub dep: DepName,
    pub args: Vec<Option<String>>,
}

impl DepRequirement {
    /// Reference a dep by (optionally qualified) name with no arguments
    pub fn new(name: &str) -> Self {
        Self {
            dep: DepName::parse(name),
            args: Vec::new(),
        }
    }

    /// Reference a dep with positional argument values
    pub fn with_args<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dep: DepName::parse(name),
            args: args.into_iter().map(|a| Some(a.into())).collect(),
        }
    }

    /// Build from parts, used after binding
    pub fn from_parts(dep: DepName, args: Vec<Option<String>>) -> Self {
        Self { dep, args }
    }

    /// The requirement with every slot unbound
    pub fn is_unbound(&self) -> bool {
        self.args.iter().all(Option::is_none)
    }
}

impl From<&str> for DepRequirement {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<DepName> for DepRequirement {
    fn from(dep: DepName) -> Self {
        Self {
            dep,
            args: Vec::new(),
        }
    }
}

impl fmt::Display for DepRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dep)?;
        if !self.is_unbound() {
            let args: Vec<&str> = self
                .args
                .iter()
                .map(|a| a.as_deref().unwrap_or("_"))
                .collect();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// An argument written inside a target's parentheses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetArg {
    /// Fills the next parameter slot; `_` leaves it unbound
    Positional(Option<String>),
    /// Binds the parameter with this name
    Named { name: String, value: String },
}

/// A root as typed on the command line: `git`, `gem(rake, 13.0)`,
/// `core:gem(name=rails)`
///
/// Positional arguments come first. Binding the arguments to slots needs the
/// dep's declared parameters, so that happens in the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub dep: DepName,
    pub args: Vec<TargetArg>,
}

impl Target {
    pub fn parse(input: &str) -> Result<Self, DepError> {
        let input = input.trim();
        let invalid = |reason: &str| DepError::InvalidTarget {
            target: input.to_string(),
            reason: reason.to_string(),
        };

        let Some((head, rest)) = input.split_once('(') else {
            if input.contains(')') {
                return Err(invalid("unbalanced ')'"));
            }
            if DepName::parse(input).name.is_empty() {
                return Err(invalid("missing dep name"));
            }
            return Ok(Self {
                dep: DepName::parse(input),
                args: Vec::new(),
            });
        };

        let dep = DepName::parse(head);
        if dep.name.is_empty() {
            return Err(invalid("missing dep name"));
        }
        let inner = rest
            .strip_suffix(')')
            .ok_or_else(|| invalid("expected ')' at the end"))?;
        if inner.contains(['(', ')']) {
            return Err(invalid("nested parentheses"));
        }
        if inner.trim().is_empty() {
            return Ok(Self { dep, args: Vec::new() });
        }

        let mut args = Vec::new();
        for piece in inner.split(',').map(str::trim) {
            let arg = match piece.split_once('=') {
                _ if piece.is_empty() => return Err(invalid("empty argument")),
                Some((name, value)) if is_identifier(name.trim()) => TargetArg::Named {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                },
                _ if piece == "_" => TargetArg::Positional(None),
                _ => TargetArg::Positional(Some(piece.to_string())),
            };
            if matches!(arg, TargetArg::Positional(_))
                && matches!(args.last(), Some(TargetArg::Named { .. }))
            {
                return Err(invalid("positional argument after a named one"));
            }
            args.push(arg);
        }
        Ok(Self { dep, args })
    }

    pub fn positional(&self) -> impl Iterator<Item = Option<&str>> {
        self.args.iter().filter_map(|arg| match arg {
            TargetArg::Positional(value) => Some(value.as_deref()),
            TargetArg::Named { .. } => None,
        })
    }

    pub fn named(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().filter_map(|arg| match arg {
            TargetArg::Named { name, value } => Some((name.as_str(), value.as_str())),
            TargetArg::Positional(_) => None,
        })
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_qualified_name() {
        assert_eq!(DepName::parse("core:git"), DepName::qualified("core", "git"));
        assert_eq!(DepName::parse("git"), DepName::unqualified("git"));
        assert_eq!(DepName::parse(":git"), DepName::unqualified("git"));
        assert_eq!(DepName::parse(" core:git ").to_string(), "core:git");
    }

    #[test]
    fn test_requirement_equality_is_value_based() {
        let a = DepRequirement::with_args("gem", ["rake"]);
        let b = DepRequirement::with_args("gem", ["rake".to_string()]);
        let c = DepRequirement::with_args("gem", ["rspec"]);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let keys: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_requirement_display() {
        assert_eq!(DepRequirement::new("core:git").to_string(), "core:git");
        assert_eq!(
            DepRequirement::with_args("gem", ["rake", "13.0"]).to_string(),
            "gem(rake, 13.0)"
        );
        let partial =
            DepRequirement::from_parts(DepName::unqualified("pkg"), vec![None, Some("x".into())]);
        assert_eq!(partial.to_string(), "pkg(_, x)");
        let unbound = DepRequirement::from_parts(DepName::unqualified("pkg"), vec![None]);
        assert!(unbound.is_unbound());
        assert_eq!(unbound.to_string(), "pkg");
    }

    #[test]
    fn test_spec_display() {
        let spec = RequirementSpec::new("gem").arg("rake").param("version");
        assert_eq!(spec.to_string(), "gem(rake, {{version}})");
    }

    #[test]
    fn test_target_positional_args() {
        let target = Target::parse("core:gem(rake, _, 13.0)").unwrap();
        assert_eq!(target.dep, DepName::qualified("core", "gem"));
        assert_eq!(
            target.positional().collect::<Vec<_>>(),
            vec![Some("rake"), None, Some("13.0")]
        );
        assert_eq!(target.named().count(), 0);

        let bare = Target::parse(" git ").unwrap();
        assert_eq!(bare.dep, DepName::unqualified("git"));
        assert!(bare.args.is_empty());
        assert!(Target::parse("git()").unwrap().args.is_empty());
    }

    #[test]
    fn test_target_named_args() {
        let target = Target::parse("gem(rails, version = 7.1)").unwrap();
        assert_eq!(target.positional().collect::<Vec<_>>(), vec![Some("rails")]);
        assert_eq!(target.named().collect::<Vec<_>>(), vec![("version", "7.1")]);

        // Only a plain identifier before '=' names a parameter
        let url = Target::parse("fetch(https://x.test/?a=b)").unwrap();
        assert_eq!(
            url.positional().collect::<Vec<_>>(),
            vec![Some("https://x.test/?a=b")]
        );
    }

    #[test]
    fn test_target_rejects_malformed() {
        for bad in ["gem(rake", "gem)", "(rake)", "gem(a,,b)", "gem((a))", "gem(name=x, y)", ""] {
            assert!(
                matches!(Target::parse(bad), Err(DepError::InvalidTarget { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
