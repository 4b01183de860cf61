//! Lazily-resolved dep parameters
//!
//! A dep declares [`ParamSpec`]s; each resolution of the dep gets its own
//! [`ParamSet`] of [`Parameter`]s. A parameter resolves on first read, in
//! this order:
//!
//! 1. a value bound by the caller (argument or `set_param` from setup)
//! 2. a forced default (`default!`), taken without prompting
//! 3. non-interactive: the default, or [`ParamError::Unresolvable`]
//! 4. interactive: ask the [`Prompter`], offering the default and choices
//!
//! Once resolved, the value is fixed for the rest of the resolution.

use crate::context::{AskOptions, Prompter};
use crate::error::ParamError;
use serde::{Deserialize, Serialize};

/// An allowed value, optionally with a description for prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub description: Option<String>,
}

impl Choice {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    pub fn described(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: Some(description.into()),
        }
    }
}

/// Declaration of a parameter on a dep definition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub default: Option<String>,
    /// Take the default without asking, even when interactive
    pub force_default: bool,
    /// Prompt message (the name is used when absent)
    pub ask: Option<String>,
    /// Allowed values; empty means anything goes
    pub choices: Vec<Choice>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Default offered when prompting, used as-is with `--defaults`
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self.force_default = false;
        self
    }

    /// Default used without prompting
    pub fn forced_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self.force_default = true;
        self
    }

    pub fn ask(mut self, message: impl Into<String>) -> Self {
        self.ask = Some(message.into());
        self
    }

    /// Restrict to a list of values
    pub fn choices<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = values.into_iter().map(Choice::new).collect();
        self
    }

    /// Restrict to values with descriptions
    pub fn described_choices<I, V, D>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (V, D)>,
        V: Into<String>,
        D: Into<String>,
    {
        self.choices = values
            .into_iter()
            .map(|(v, d)| Choice::described(v, d))
            .collect();
        self
    }

    fn allows(&self, value: &str) -> bool {
        self.choices.is_empty() || self.choices.iter().any(|c| c.value == value)
    }

    fn check_choice(&self, value: &str) -> Result<(), ParamError> {
        if self.allows(value) {
            Ok(())
        } else {
            Err(ParamError::InvalidChoice {
                name: self.name.clone(),
                value: value.to_string(),
                choices: self.choices.iter().map(|c| c.value.clone()).collect(),
            })
        }
    }
}

impl From<&str> for ParamSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A parameter owned by one dep resolution
#[derive(Debug, Clone)]
pub struct Parameter {
    spec: ParamSpec,
    value: Option<String>,
}

impl Parameter {
    pub fn new(spec: ParamSpec) -> Self {
        Self { spec, value: None }
    }

    /// A parameter with a bound value, checked against the choices
    pub fn with_value(spec: ParamSpec, value: impl Into<String>) -> Result<Self, ParamError> {
        let value = value.into();
        spec.check_choice(&value)?;
        Ok(Self {
            spec,
            value: Some(value),
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ParamSpec {
        &self.spec
    }

    /// The value, if already resolved
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    /// Bind a value; fails once the parameter is resolved
    pub fn set(&mut self, value: impl Into<String>) -> Result<(), ParamError> {
        self.ensure_unresolved()?;
        let value = value.into();
        self.spec.check_choice(&value)?;
        self.value = Some(value);
        Ok(())
    }

    /// Change the default offered when prompting
    pub fn set_default(&mut self, value: impl Into<String>) -> Result<(), ParamError> {
        self.ensure_unresolved()?;
        self.spec.default = Some(value.into());
        Ok(())
    }

    /// Change the default and take it without prompting
    pub fn set_forced_default(&mut self, value: impl Into<String>) -> Result<(), ParamError> {
        self.set_default(value)?;
        self.spec.force_default = true;
        Ok(())
    }

    pub fn set_ask(&mut self, message: impl Into<String>) -> Result<(), ParamError> {
        self.ensure_unresolved()?;
        self.spec.ask = Some(message.into());
        Ok(())
    }

    pub fn set_choices(&mut self, choices: Vec<Choice>) -> Result<(), ParamError> {
        self.ensure_unresolved()?;
        self.spec.choices = choices;
        Ok(())
    }

    fn ensure_unresolved(&self) -> Result<(), ParamError> {
        match &self.value {
            Some(value) => Err(ParamError::AlreadyResolved {
                name: self.spec.name.clone(),
                value: value.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Resolve the value, prompting if allowed and needed
    pub fn resolve(
        &mut self,
        prompter: &dyn Prompter,
        interactive: bool,
    ) -> Result<&str, ParamError> {
        if self.value.is_none() {
            let value = self.obtain(prompter, interactive)?;
            self.spec.check_choice(&value)?;
            log::debug!("parameter '{}' resolved to '{}'", self.spec.name, value);
            self.value = Some(value);
        }
        Ok(self.value.as_deref().unwrap_or_default())
    }

    fn obtain(&self, prompter: &dyn Prompter, interactive: bool) -> Result<String, ParamError> {
        if let Some(default) = &self.spec.default
            && (self.spec.force_default || !interactive)
        {
            return Ok(default.clone());
        }

        if !interactive {
            return Err(ParamError::Unresolvable {
                name: self.spec.name.clone(),
            });
        }

        let message = self.spec.ask.as_deref().unwrap_or(&self.spec.name);
        let options = AskOptions {
            default: self.spec.default.clone(),
            choices: self.spec.choices.clone(),
        };
        prompter
            .ask(message, &options)
            .map_err(|e| ParamError::Prompt {
                name: self.spec.name.clone(),
                message: e.to_string(),
            })
    }
}

/// All parameters of one dep resolution, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    params: Vec<Parameter>,
}

impl ParamSet {
    /// Build from specs and positional values (`None` leaves a slot unbound)
    pub fn bind(specs: &[ParamSpec], values: &[Option<String>]) -> Result<Self, ParamError> {
        let params = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| match values.get(i).cloned().flatten() {
                Some(value) => Parameter::with_value(spec.clone(), value),
                None => Ok(Parameter::new(spec.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { params })
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Parameter, ParamError> {
        self.params
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| ParamError::Unknown {
                name: name.to_string(),
            })
    }

    /// Resolve one parameter by name
    pub fn resolve(
        &mut self,
        name: &str,
        prompter: &dyn Prompter,
        interactive: bool,
    ) -> Result<String, ParamError> {
        self.get_mut(name)?
            .resolve(prompter, interactive)
            .map(str::to_string)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Parameter::name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NonInteractive;
    use std::sync::Mutex;

    /// Prompter that answers from a script and records the questions
    struct Scripted {
        answers: Mutex<Vec<String>>,
        asked: Mutex<Vec<(String, AskOptions)>>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                asked: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> usize {
            self.asked.lock().unwrap().len()
        }
    }

    impl Prompter for Scripted {
        fn ask(&self, message: &str, options: &AskOptions) -> anyhow::Result<String> {
            self.asked
                .lock()
                .unwrap()
                .push((message.to_string(), options.clone()));
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("out of answers"))
        }
    }

    #[test]
    fn test_bound_value_wins() {
        let prompter = Scripted::new(&[]);
        let mut p = Parameter::with_value(ParamSpec::new("path").default_value("/usr/local"), "/opt").unwrap();
        assert_eq!(p.resolve(&prompter, true).unwrap(), "/opt");
        assert_eq!(prompter.asked(), 0);
    }

    #[test]
    fn test_defaults_mode_never_prompts() {
        let prompter = Scripted::new(&[]);

        let mut soft = Parameter::new(ParamSpec::new("path").default_value("/usr/local"));
        let mut forced = Parameter::new(ParamSpec::new("path").forced_default("/usr/local"));

        assert_eq!(soft.resolve(&prompter, false).unwrap(), "/usr/local");
        assert_eq!(forced.resolve(&prompter, false).unwrap(), "/usr/local");
        assert_eq!(prompter.asked(), 0);
    }

    #[test]
    fn test_forced_default_skips_prompt_when_interactive() {
        let prompter = Scripted::new(&["/elsewhere"]);
        let mut forced = Parameter::new(ParamSpec::new("path").forced_default("/usr/local"));
        assert_eq!(forced.resolve(&prompter, true).unwrap(), "/usr/local");
        assert_eq!(prompter.asked(), 0);
    }

    #[test]
    fn test_interactive_prompts_with_default() {
        let prompter = Scripted::new(&["/srv"]);
        let mut p = Parameter::new(ParamSpec::new("path").default_value("/usr/local").ask("Install where?"));
        assert_eq!(p.resolve(&prompter, true).unwrap(), "/srv");

        let asked = prompter.asked.lock().unwrap();
        assert_eq!(asked[0].0, "Install where?");
        assert_eq!(asked[0].1.default.as_deref(), Some("/usr/local"));
    }

    #[test]
    fn test_resolved_value_is_fixed() {
        let prompter = Scripted::new(&["first", "second"]);
        let mut p = Parameter::new(ParamSpec::new("name"));
        assert_eq!(p.resolve(&prompter, true).unwrap(), "first");
        assert_eq!(p.resolve(&prompter, true).unwrap(), "first");
        assert_eq!(prompter.asked(), 1);
        assert!(matches!(p.set("other"), Err(ParamError::AlreadyResolved { .. })));
        assert!(p.set_default("other").is_err());
    }

    #[test]
    fn test_unresolvable_without_default() {
        let mut p = Parameter::new(ParamSpec::new("token"));
        assert_eq!(
            p.resolve(&NonInteractive, false).unwrap_err(),
            ParamError::Unresolvable {
                name: "token".into()
            }
        );
    }

    #[test]
    fn test_choices_are_enforced() {
        let spec = ParamSpec::new("shell").choices(["bash", "zsh"]);
        assert!(Parameter::with_value(spec.clone(), "zsh").is_ok());
        assert!(matches!(
            Parameter::with_value(spec.clone(), "fish"),
            Err(ParamError::InvalidChoice { .. })
        ));

        let prompter = Scripted::new(&["tcsh"]);
        let mut p = Parameter::new(spec);
        assert!(matches!(
            p.resolve(&prompter, true),
            Err(ParamError::InvalidChoice { .. })
        ));
        assert!(!p.is_resolved());
    }

    #[test]
    fn test_described_choices_reach_prompter() {
        let prompter = Scripted::new(&["stable"]);
        let mut p = Parameter::new(
            ParamSpec::new("channel").described_choices([("stable", "Tested releases"), ("nightly", "Daily builds")]),
        );
        assert_eq!(p.resolve(&prompter, true).unwrap(), "stable");
        let asked = prompter.asked.lock().unwrap();
        assert_eq!(asked[0].1.choices.len(), 2);
        assert_eq!(asked[0].1.choices[1].description.as_deref(), Some("Daily builds"));
    }

    #[test]
    fn test_param_set_binding() {
        let specs = [ParamSpec::new("name"), ParamSpec::new("version").default_value("latest")];
        let mut set = ParamSet::bind(&specs, &[Some("rake".into()), None]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("name").unwrap().value(), Some("rake"));
        assert!(!set.get("version").unwrap().is_resolved());
        assert_eq!(set.resolve("version", &NonInteractive, false).unwrap(), "latest");
        assert!(matches!(
            set.resolve("missing", &NonInteractive, false),
            Err(ParamError::Unknown { .. })
        ));
        assert_eq!(set.names().collect::<Vec<_>>(), ["name", "version"]);
    }
}
