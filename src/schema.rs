//! On-disk format of dep files
//!
//! A source directory holds `*.toml` files, each declaring one or more deps:
//!
//! ```toml
//! [dep.ripgrep]
//! requires = ["homebrew"]
//! met = "which rg"
//! meet = "brew install ripgrep"
//!
//! [dep.gem]
//! params = ["name", { name = "version", default = ">= 0" }]
//! version_command = "gem list -e {{name}}"
//! version = "{{version}}"
//! meet = "gem install {{name}}"
//!
//! [dep.rails-app]
//! params = [{ name = "framework", default = "rails", force_default = true }]
//! requires = [{ dep = "gem", args = ["{{framework}}", ">= 7"] }]
//! ```

use anyhow::{Result, bail};
use depkit::{ArgValue, Choice, DepName, ParamSpec, RequirementSpec, VersionSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Dep File Schema
// ============================================================================

/// A parsed dep file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepFile {
    #[serde(default)]
    pub dep: BTreeMap<String, DepSpec>,
}

/// One `[dep.<name>]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepSpec {
    #[serde(default)]
    pub description: Option<String>,

    /// Dep to inherit hooks and requirements from
    #[serde(default)]
    pub template: Option<String>,

    /// Positional parameters, in order
    #[serde(default)]
    pub params: Vec<ParamEntry>,

    #[serde(default)]
    pub requires: Vec<RequirementEntry>,

    /// Only walked when the dep is unmet and about to be met
    #[serde(default)]
    pub requires_when_unmet: Vec<RequirementEntry>,

    // Hook commands, run with `sh -c` after `{{param}}` interpolation
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub met: Option<String>,
    #[serde(default)]
    pub prepare: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub meet: Option<String>,
    #[serde(default)]
    pub after: Option<String>,

    /// Run the meet command through sudo
    #[serde(default)]
    pub sudo: bool,

    /// Command whose output contains the installed version
    #[serde(default)]
    pub version_command: Option<String>,

    /// Version requirement (`>= 1.2`, `~> 3.0`) checked against `version_command`
    #[serde(default)]
    pub version: Option<String>,
}

/// `"name"` or a full parameter table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamEntry {
    Name(String),
    Full(ParamDecl),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    /// Take the default without prompting
    #[serde(default)]
    pub force_default: bool,
    #[serde(default)]
    pub ask: Option<String>,
    #[serde(default)]
    pub choices: Option<Choices>,
}

/// `["a", "b"]` or `{ a = "description", b = "description" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choices {
    List(Vec<String>),
    Described(BTreeMap<String, String>),
}

/// `"name"`, `"source:name"` or `{ dep = "name", args = [...] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementEntry {
    Name(String),
    Full {
        dep: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

// ============================================================================
// Conversion
// ============================================================================

impl ParamEntry {
    pub fn to_spec(&self) -> ParamSpec {
        match self {
            Self::Name(name) => ParamSpec::new(name.as_str()),
            Self::Full(decl) => {
                let mut spec = ParamSpec::new(decl.name.as_str());
                spec.default = decl.default.clone();
                spec.force_default = decl.force_default;
                spec.ask = decl.ask.clone();
                spec.choices = match &decl.choices {
                    None => Vec::new(),
                    Some(Choices::List(values)) => values.iter().map(Choice::new).collect(),
                    Some(Choices::Described(values)) => values
                        .iter()
                        .map(|(value, description)| Choice::described(value, description))
                        .collect(),
                };
                spec
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Full(decl) => &decl.name,
        }
    }
}

impl RequirementEntry {
    pub fn to_spec(&self) -> RequirementSpec {
        match self {
            Self::Name(name) => RequirementSpec::new(name),
            Self::Full { dep, args } => RequirementSpec {
                dep: DepName::parse(dep),
                args: args.iter().map(|a| parse_arg(a)).collect(),
            },
        }
    }
}

/// `"{{name}}"` forwards the declaring dep's parameter; anything else is literal
fn parse_arg(arg: &str) -> ArgValue {
    let trimmed = arg.trim();
    match trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
    {
        Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
            ArgValue::Param(name.to_string())
        }
        _ => ArgValue::Literal(arg.to_string()),
    }
}

// ============================================================================
// Validation
// ============================================================================

impl DepSpec {
    /// Check what the type system can't
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(':') || name.contains(char::is_whitespace) {
            bail!("invalid dep name '{name}' (no spaces or ':' allowed)");
        }

        let mut seen = Vec::new();
        for param in &self.params {
            let param_name = param.name();
            if param_name.is_empty() {
                bail!("'{name}' has a parameter with no name");
            }
            if seen.contains(&param_name) {
                bail!("'{name}' declares parameter '{param_name}' twice");
            }
            seen.push(param_name);

            if let ParamEntry::Full(ParamDecl {
                default: Some(default),
                choices: Some(choices),
                ..
            }) = param
                && !choice_values(choices).any(|c| c == default)
            {
                bail!("default '{default}' of '{name}.{param_name}' is not one of its choices");
            }
        }

        match (&self.version_command, &self.version) {
            (Some(_), None) => bail!("'{name}' has version_command but no version"),
            (None, Some(_)) => bail!("'{name}' has version but no version_command"),
            (Some(_), Some(_)) if self.met.is_some() => {
                bail!("'{name}' sets both met and version_command; use one")
            }
            (Some(_), Some(version)) if !version.contains("{{") => {
                VersionSpec::parse(version)
                    .map_err(|e| anyhow::anyhow!("'{name}' has an invalid version: {e}"))?;
            }
            _ => {}
        }

        if self.sudo && self.meet.is_none() {
            bail!("'{name}' sets sudo but has no meet command");
        }

        Ok(())
    }
}

fn choice_values(choices: &Choices) -> Box<dyn Iterator<Item = &String> + '_> {
    match choices {
        Choices::List(values) => Box::new(values.iter()),
        Choices::Described(values) => Box::new(values.keys()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> DepFile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_parse_dep_file() {
        let file = parse(
            r#"
            [dep.ripgrep]
            description = "Fast grep"
            requires = ["homebrew", "core:path-setup"]
            met = "which rg"
            meet = "brew install ripgrep"

            [dep.gem]
            params = ["name", { name = "version", default = ">= 0" }]
            version_command = "gem list -e {{name}}"
            version = "{{version}}"
            meet = "gem install {{name}}"
            "#,
        );

        assert_eq!(file.dep.len(), 2);
        let ripgrep = &file.dep["ripgrep"];
        assert_eq!(ripgrep.requires.len(), 2);
        assert_eq!(
            ripgrep.requires[1].to_spec().dep,
            DepName::qualified("core", "path-setup")
        );

        let gem = &file.dep["gem"];
        let params: Vec<_> = gem.params.iter().map(ParamEntry::to_spec).collect();
        assert_eq!(params[0].name, "name");
        assert_eq!(params[1].default.as_deref(), Some(">= 0"));
        assert!(!params[1].force_default);
        gem.validate("gem").unwrap();
    }

    #[test]
    fn test_requirement_args_forward_params() {
        let entry = RequirementEntry::Full {
            dep: "gem".into(),
            args: vec!["{{ framework }}".into(), ">= 7".into(), "{{}}".into()],
        };
        let spec = entry.to_spec();
        assert_eq!(
            spec.args,
            vec![
                ArgValue::Param("framework".into()),
                ArgValue::Literal(">= 7".into()),
                ArgValue::Literal("{{}}".into()),
            ]
        );
    }

    #[test]
    fn test_described_choices() {
        let file = parse(
            r#"
            [dep.shell]
            params = [{ name = "login", ask = "Login shell?", choices = { zsh = "Z shell", fish = "Friendly" } }]
            "#,
        );
        let spec = file.dep["shell"].params[0].to_spec();
        assert_eq!(spec.ask.as_deref(), Some("Login shell?"));
        assert_eq!(spec.choices.len(), 2);
        assert_eq!(spec.choices[0].value, "fish");
        assert_eq!(spec.choices[0].description.as_deref(), Some("Friendly"));
    }

    #[test]
    fn test_validation_errors() {
        let bad_default = parse(
            r#"
            [dep.shell]
            params = [{ name = "login", default = "tcsh", choices = ["zsh", "bash"] }]
            "#,
        );
        assert!(bad_default.dep["shell"].validate("shell").is_err());

        let half_version = DepSpec {
            version_command: Some("ruby -v".into()),
            ..Default::default()
        };
        assert!(half_version.validate("ruby").is_err());

        let bad_version = DepSpec {
            version_command: Some("ruby -v".into()),
            version: Some(">= banana".into()),
            ..Default::default()
        };
        assert!(bad_version.validate("ruby").is_err());

        let twice = DepSpec {
            params: vec![ParamEntry::Name("a".into()), ParamEntry::Name("a".into())],
            ..Default::default()
        };
        assert!(twice.validate("x").is_err());

        assert!(DepSpec::default().validate("core:git").is_err());
        assert!(
            DepSpec {
                sudo: true,
                ..Default::default()
            }
            .validate("x")
            .is_err()
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<DepFile>("[dep.x]\nmeat = \"true\"\n").is_err());
    }
}
