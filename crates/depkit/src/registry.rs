//! Registry of dep definitions, grouped by source
//!
//! Every definition belongs to a source (a directory of dep files, or the
//! default source for definitions registered directly). Names are unique
//! within a source; the same name in two sources is allowed but must then
//! be qualified (`source:name`) wherever it would be ambiguous.
//!
//! The registry is filled during loading and only read while deps run.

use crate::definition::{DepDefinition, ResolvedDep};
use crate::error::{DepError, Result};
use crate::requirement::DepName;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source used by [`Registry::register`]
pub const DEFAULT_SOURCE: &str = "local";

/// Longest template chain [`Registry::resolve_template`] will follow
pub const MAX_TEMPLATE_DEPTH: usize = 16;

/// A named group of definitions
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub name: String,
    deps: BTreeMap<String, Arc<DepDefinition>>,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deps: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DepDefinition>> {
        self.deps.get(name)
    }

    /// Definitions in name order
    pub fn deps(&self) -> impl Iterator<Item = &Arc<DepDefinition>> {
        self.deps.values()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

/// Mapping from dep name to definition, across sources
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sources: Vec<Source>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an (empty) source if it isn't there yet
    pub fn add_source(&mut self, name: &str) -> &mut Source {
        let index = match self.sources.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sources.push(Source::new(name));
                self.sources.len() - 1
            }
        };
        &mut self.sources[index]
    }

    /// Register a definition in the default source
    pub fn register(&mut self, definition: DepDefinition) -> Result<()> {
        self.register_in(DEFAULT_SOURCE, definition)
    }

    /// Register a definition in a named source
    pub fn register_in(&mut self, source: &str, definition: DepDefinition) -> Result<()> {
        let target = self.add_source(source);
        if target.deps.contains_key(&definition.name) {
            return Err(DepError::DuplicateDep {
                name: definition.name,
                source_name: source.to_string(),
            });
        }
        log::debug!("registered {}:{}", source, definition.name);
        target
            .deps
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Look up a definition by plain or qualified name
    pub fn lookup(&self, name: &str) -> Result<Arc<DepDefinition>> {
        self.find(&DepName::parse(name), None)
            .map(|(_, def)| Arc::clone(def))
    }

    /// Find a definition, returning the source it lives in
    ///
    /// A qualified name only looks in its source. An unqualified name is
    /// looked up in `prefer_source` first (the source of the dep asking),
    /// then across all sources, where more than one match is ambiguous.
    pub fn find(
        &self,
        dep: &DepName,
        prefer_source: Option<&str>,
    ) -> Result<(&str, &Arc<DepDefinition>)> {
        if let Some(source_name) = &dep.source {
            let source = self
                .source(source_name)
                .ok_or_else(|| DepError::SourceNotFound {
                    name: source_name.clone(),
                })?;
            return source
                .get(&dep.name)
                .map(|def| (source.name.as_str(), def))
                .ok_or_else(|| DepError::NotFound {
                    name: dep.to_string(),
                });
        }

        if let Some(preferred) = prefer_source.and_then(|s| self.source(s))
            && let Some(def) = preferred.get(&dep.name)
        {
            return Ok((preferred.name.as_str(), def));
        }

        let matches: Vec<(&str, &Arc<DepDefinition>)> = self
            .sources
            .iter()
            .filter_map(|s| s.get(&dep.name).map(|def| (s.name.as_str(), def)))
            .collect();

        match matches.as_slice() {
            [] => Err(DepError::NotFound {
                name: dep.name.clone(),
            }),
            [only] => Ok(*only),
            many => Err(DepError::AmbiguousDep {
                name: dep.name.clone(),
                candidates: many
                    .iter()
                    .map(|(source, _)| format!("{}:{}", source, dep.name))
                    .collect(),
            }),
        }
    }

    /// Look up a definition and flatten its template chain
    pub fn resolve_template(&self, name: &str) -> Result<ResolvedDep> {
        self.resolve(&DepName::parse(name), None)
    }

    /// Find a definition (see [`find`](Self::find)) and flatten its templates
    ///
    /// Hooks from the most specific definition win; requirement lists are
    /// concatenated with the template's first. Template names resolve like
    /// requirements, preferring the source of the definition naming them.
    pub fn resolve(&self, dep: &DepName, prefer_source: Option<&str>) -> Result<ResolvedDep> {
        let (source, leaf) = self.find(dep, prefer_source)?;
        let mut resolved = ResolvedDep::from_leaf(source, leaf);

        let mut next = leaf.template.clone();
        let mut current_source = source;
        let mut depth = 0;

        while let Some(template_name) = next {
            depth += 1;
            if depth > MAX_TEMPLATE_DEPTH {
                return Err(DepError::TemplateDepthExceeded {
                    dep: resolved.name.to_string(),
                    max_depth: MAX_TEMPLATE_DEPTH,
                });
            }

            let (template_source, template) = self
                .find(&template_name, Some(current_source))
                .map_err(|e| match e {
                    DepError::NotFound { .. } | DepError::SourceNotFound { .. } => {
                        DepError::TemplateNotFound {
                            dep: resolved.name.to_string(),
                            template: template_name.to_string(),
                        }
                    }
                    other => other,
                })?;

            log::debug!(
                "{} inherits from {}:{}",
                resolved.name,
                template_source,
                template.name
            );
            resolved.inherit(DepName::qualified(template_source, &template.name), template);
            next = template.template.clone();
            current_source = template_source;
        }

        Ok(resolved)
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Sources in the order they were added
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Every definition with its source, sources in load order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<DepDefinition>)> {
        self.sources
            .iter()
            .flat_map(|s| s.deps().map(move |d| (s.name.as_str(), d)))
    }

    /// Total number of definitions
    pub fn len(&self) -> usize {
        self.sources.iter().map(Source::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every source and definition
    pub fn clear(&mut self) {
        self.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HookKind, Outcome};

    fn dep(name: &str) -> DepDefinition {
        DepDefinition::builder(name).build()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = Registry::new();
        registry.register(dep("git")).unwrap();
        assert_eq!(
            registry.register(dep("git")).unwrap_err(),
            DepError::DuplicateDep {
                name: "git".into(),
                source_name: DEFAULT_SOURCE.into()
            }
        );
        // Same name in another source is fine
        registry.register_in("personal", dep("git")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_qualified_and_plain() {
        let mut registry = Registry::new();
        registry.register_in("core", dep("git")).unwrap();
        registry.register_in("personal", dep("dotfiles")).unwrap();

        assert_eq!(registry.lookup("git").unwrap().name, "git");
        assert_eq!(registry.lookup("personal:dotfiles").unwrap().name, "dotfiles");
        assert_eq!(
            registry.lookup("personal:git").unwrap_err(),
            DepError::NotFound {
                name: "personal:git".into()
            }
        );
        assert_eq!(
            registry.lookup("nope:git").unwrap_err(),
            DepError::SourceNotFound { name: "nope".into() }
        );
        assert!(matches!(
            registry.lookup("missing"),
            Err(DepError::NotFound { .. })
        ));
    }

    #[test]
    fn test_ambiguous_names_list_candidates() {
        let mut registry = Registry::new();
        registry.register_in("core", dep("git")).unwrap();
        registry.register_in("personal", dep("git")).unwrap();

        assert_eq!(
            registry.lookup("git").unwrap_err(),
            DepError::AmbiguousDep {
                name: "git".into(),
                candidates: vec!["core:git".into(), "personal:git".into()]
            }
        );
        // Preferring the asking dep's source settles it
        let (source, _) = registry
            .find(&DepName::unqualified("git"), Some("personal"))
            .unwrap();
        assert_eq!(source, "personal");
    }

    #[test]
    fn test_template_chain_is_flattened() {
        let mut registry = Registry::new();
        registry
            .register(
                DepDefinition::builder("base")
                    .requires("a")
                    .met(|_| Ok(Outcome::Unmet))
                    .after(|_| Ok(Outcome::Success))
                    .build(),
            )
            .unwrap();
        registry
            .register(
                DepDefinition::builder("pkg")
                    .template("base")
                    .requires("b")
                    .meet(|_| Ok(Outcome::Success))
                    .build(),
            )
            .unwrap();
        registry
            .register(
                DepDefinition::builder("tool")
                    .template("pkg")
                    .requires("c")
                    .met(|_| Ok(Outcome::Success))
                    .build(),
            )
            .unwrap();

        let resolved = registry.resolve_template("tool").unwrap();
        let requires: Vec<_> = resolved.requires.iter().map(ToString::to_string).collect();
        assert_eq!(requires, ["a", "b", "c"]);
        assert_eq!(
            resolved.hooks.declared(),
            [HookKind::Met, HookKind::Meet, HookKind::After]
        );
        assert_eq!(
            resolved
                .templates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            ["local:pkg", "local:base"]
        );
    }

    #[test]
    fn test_missing_template() {
        let mut registry = Registry::new();
        registry
            .register(DepDefinition::builder("tool").template("ghost").build())
            .unwrap();
        assert_eq!(
            registry.resolve_template("tool").unwrap_err(),
            DepError::TemplateNotFound {
                dep: "local:tool".into(),
                template: "ghost".into()
            }
        );
    }

    #[test]
    fn test_template_loop_is_bounded() {
        let mut registry = Registry::new();
        registry
            .register(DepDefinition::builder("a").template("b").build())
            .unwrap();
        registry
            .register(DepDefinition::builder("b").template("a").build())
            .unwrap();
        assert!(matches!(
            registry.resolve_template("a"),
            Err(DepError::TemplateDepthExceeded { .. })
        ));
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::new();
        registry.register(dep("git")).unwrap();
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.sources().is_empty());
    }
}
