//! Dep definitions and the builder used to declare them
//!
//! A [`DepDefinition`] is built once at load time and handed to the
//! [`Registry`](crate::registry::Registry), after which it never changes.
//!
//! ```ignore
//! use depkit::{DepDefinition, Outcome, ParamSpec};
//!
//! let ripgrep = DepDefinition::builder("ripgrep")
//!     .requires("homebrew")
//!     .met(|ctx| Ok(ctx.run_ok("which rg")?.into()))
//!     .meet(|ctx| Ok(ctx.run_ok("brew install ripgrep")?.into()))
//!     .build();
//!
//! let gem = DepDefinition::builder("gem")
//!     .param(ParamSpec::new("name"))
//!     .param(ParamSpec::new("version").default_value(">= 0"))
//!     .met(|ctx| {
//!         let name = ctx.param("name")?;
//!         Ok(ctx.run_ok(&format!("gem list -i {name}"))?.into())
//!     })
//!     .build();
//! ```

use crate::context::HookContext;
use crate::parameter::ParamSpec;
use crate::requirement::{DepName, RequirementSpec};
use crate::types::{HookKind, Outcome};
use std::fmt;
use std::sync::Arc;

/// A lifecycle hook
pub type Hook = Arc<dyn Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync>;

/// The hook table of a definition
#[derive(Clone, Default)]
pub struct Hooks {
    pub setup: Option<Hook>,
    pub met: Option<Hook>,
    pub prepare: Option<Hook>,
    pub before: Option<Hook>,
    pub meet: Option<Hook>,
    pub after: Option<Hook>,
}

impl Hooks {
    pub fn get(&self, kind: HookKind) -> Option<&Hook> {
        match kind {
            HookKind::Setup => self.setup.as_ref(),
            HookKind::Met => self.met.as_ref(),
            HookKind::Prepare => self.prepare.as_ref(),
            HookKind::Before => self.before.as_ref(),
            HookKind::Meet => self.meet.as_ref(),
            HookKind::After => self.after.as_ref(),
        }
    }

    fn slot(&mut self, kind: HookKind) -> &mut Option<Hook> {
        match kind {
            HookKind::Setup => &mut self.setup,
            HookKind::Met => &mut self.met,
            HookKind::Prepare => &mut self.prepare,
            HookKind::Before => &mut self.before,
            HookKind::Meet => &mut self.meet,
            HookKind::After => &mut self.after,
        }
    }

    pub fn has(&self, kind: HookKind) -> bool {
        self.get(kind).is_some()
    }

    /// Hooks declared here, in lifecycle order
    pub fn declared(&self) -> Vec<HookKind> {
        HookKind::ALL.into_iter().filter(|k| self.has(*k)).collect()
    }

    /// Fill every slot this table leaves empty from `parent`
    pub fn inherit_from(&mut self, parent: &Hooks) {
        for kind in HookKind::ALL {
            let slot = self.slot(kind);
            if slot.is_none() {
                *slot = parent.get(kind).cloned();
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.declared()).finish()
    }
}

/// A declared dep: requirements, parameters and hooks, optionally based on a template
#[derive(Debug, Clone)]
pub struct DepDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Definition whose hooks and requirements this one builds on
    pub template: Option<DepName>,
    pub params: Vec<ParamSpec>,
    pub requires: Vec<RequirementSpec>,
    /// Only walked when the dep is unmet and about to be met
    pub requires_when_unmet: Vec<RequirementSpec>,
    pub hooks: Hooks,
}

impl DepDefinition {
    pub fn builder(name: impl Into<String>) -> DepBuilder {
        DepBuilder::new(name)
    }
}

/// Fluent builder for [`DepDefinition`]
pub struct DepBuilder {
    def: DepDefinition,
}

impl DepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: DepDefinition {
                name: name.into(),
                description: None,
                template: None,
                params: Vec::new(),
                requires: Vec::new(),
                requires_when_unmet: Vec::new(),
                hooks: Hooks::default(),
            },
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.def.description = Some(text.into());
        self
    }

    /// Base this dep on another definition (`name` or `source:name`)
    pub fn template(mut self, name: &str) -> Self {
        self.def.template = Some(DepName::parse(name));
        self
    }

    pub fn param(mut self, spec: impl Into<ParamSpec>) -> Self {
        self.def.params.push(spec.into());
        self
    }

    pub fn params<I, P>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParamSpec>,
    {
        self.def.params.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn requires(mut self, requirement: impl Into<RequirementSpec>) -> Self {
        self.def.requires.push(requirement.into());
        self
    }

    pub fn requires_when_unmet(mut self, requirement: impl Into<RequirementSpec>) -> Self {
        self.def.requires_when_unmet.push(requirement.into());
        self
    }

    /// Set any hook by kind
    pub fn hook(mut self, kind: HookKind, hook: Hook) -> Self {
        *self.def.hooks.slot(kind) = Some(hook);
        self
    }

    pub fn setup<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::Setup, Arc::new(f))
    }

    pub fn met<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::Met, Arc::new(f))
    }

    pub fn prepare<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::Prepare, Arc::new(f))
    }

    pub fn before<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::Before, Arc::new(f))
    }

    pub fn meet<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::Meet, Arc::new(f))
    }

    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&mut HookContext<'_, '_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.hook(HookKind::After, Arc::new(f))
    }

    pub fn build(self) -> DepDefinition {
        self.def
    }
}

/// A definition with its template chain flattened, ready to run
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    /// Qualified name (`source:name`)
    pub name: DepName,
    pub description: Option<String>,
    pub params: Vec<ParamSpec>,
    /// Template requirements first, then the dep's own
    pub requires: Vec<RequirementSpec>,
    pub requires_when_unmet: Vec<RequirementSpec>,
    pub hooks: Hooks,
    /// Templates applied, nearest first
    pub templates: Vec<DepName>,
}

impl ResolvedDep {
    /// Start from a definition with no template applied yet
    pub(crate) fn from_leaf(source: &str, def: &DepDefinition) -> Self {
        Self {
            name: DepName::qualified(source, &def.name),
            description: def.description.clone(),
            params: def.params.clone(),
            requires: def.requires.clone(),
            requires_when_unmet: def.requires_when_unmet.clone(),
            hooks: def.hooks.clone(),
            templates: Vec::new(),
        }
    }

    /// Layer a template underneath what is already here
    ///
    /// Hooks already present win; requirements are prepended; parameters the
    /// template declares that the dep doesn't are added in front.
    pub(crate) fn inherit(&mut self, template_name: DepName, template: &DepDefinition) {
        self.hooks.inherit_from(&template.hooks);

        let mut requires = template.requires.clone();
        requires.append(&mut self.requires);
        self.requires = requires;

        let mut when_unmet = template.requires_when_unmet.clone();
        when_unmet.append(&mut self.requires_when_unmet);
        self.requires_when_unmet = when_unmet;

        let mut params: Vec<ParamSpec> = template
            .params
            .iter()
            .filter(|p| !self.params.iter().any(|own| own.name == p.name))
            .cloned()
            .collect();
        params.append(&mut self.params);
        self.params = params;

        if self.description.is_none() {
            self.description = template.description.clone();
        }
        self.templates.push(template_name);
    }

    pub fn source(&self) -> &str {
        self.name.source.as_deref().unwrap_or_default()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_everything() {
        let def = DepDefinition::builder("ruby")
            .description("Ruby interpreter")
            .template("core:pkg")
            .param("version")
            .requires("homebrew")
            .requires(RequirementSpec::new("openssl").arg("3"))
            .requires_when_unmet("xcode-cli")
            .met(|_| Ok(Outcome::Success))
            .meet(|_| Ok(Outcome::Success))
            .build();

        assert_eq!(def.template, Some(DepName::qualified("core", "pkg")));
        assert_eq!(def.params.len(), 1);
        assert_eq!(def.requires.len(), 2);
        assert_eq!(def.requires_when_unmet.len(), 1);
        assert_eq!(def.hooks.declared(), [HookKind::Met, HookKind::Meet]);
    }

    #[test]
    fn test_inherit_prefers_leaf_hooks() {
        let template = DepDefinition::builder("pkg")
            .param("name")
            .requires("pkg-manager")
            .met(|_| Ok(Outcome::Unmet))
            .meet(|_| Ok(Outcome::Success))
            .build();
        let leaf = DepDefinition::builder("ripgrep")
            .template("pkg")
            .param(ParamSpec::new("name").default_value("ripgrep"))
            .requires("path-setup")
            .met(|_| Ok(Outcome::Success))
            .build();

        let mut resolved = ResolvedDep::from_leaf("personal", &leaf);
        resolved.inherit(DepName::qualified("personal", "pkg"), &template);

        assert_eq!(resolved.name.to_string(), "personal:ripgrep");
        assert_eq!(resolved.hooks.declared(), [HookKind::Met, HookKind::Meet]);
        let requires: Vec<_> = resolved.requires.iter().map(ToString::to_string).collect();
        assert_eq!(requires, ["pkg-manager", "path-setup"]);
        assert_eq!(resolved.param_names(), ["name"]);
        assert_eq!(resolved.params[0].default.as_deref(), Some("ripgrep"));
        assert_eq!(resolved.templates.len(), 1);
    }
}
