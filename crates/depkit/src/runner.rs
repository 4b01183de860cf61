//! Runs root deps against a registry
//!
//! A [`Runner`] holds everything one process-lifetime of runs shares: the
//! registry, the providers, the options and the result caches. Each call to
//! [`Runner::process`] walks every root in its own [`Task`], sequentially or
//! on a rayon pool, and the roots meet in the shared cache.
//!
//! Results are cached for the lifetime of the runner; call
//! [`Runner::reset`] to forget them.

use crate::cache::ResultCache;
use crate::context::{CancelToken, Providers};
use crate::error::{DepError, Result};
use crate::registry::Registry;
use crate::requirement::{DepRequirement, Target};
use crate::task::Task;
use crate::types::{DepResult, Mode, RootReport, RunOptions, RunSummary};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Runner<'a> {
    registry: &'a Registry,
    providers: Providers<'a>,
    options: RunOptions,
    cancel: CancelToken,
    /// Set when one tree hits a fatal error, so the others stop early
    abort: CancelToken,
    meet_cache: ResultCache,
    /// Results of check-only resolution, never read by meeting runs
    check_cache: ResultCache,
    next_tree: AtomicUsize,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a Registry, providers: Providers<'a>, options: RunOptions) -> Self {
        Self {
            registry,
            providers,
            options,
            cancel: CancelToken::new(),
            abort: CancelToken::new(),
            meet_cache: ResultCache::new(),
            check_cache: ResultCache::new(),
            next_tree: AtomicUsize::new(0),
        }
    }

    /// Observe an externally owned cancel token (e.g. one set from SIGINT)
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn providers(&self) -> Providers<'a> {
        self.providers
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.abort.is_cancelled()
    }

    /// Stop every tree at its next dep boundary after a fatal error
    pub(crate) fn abort(&self, error: &DepError) {
        if !self.abort.is_cancelled() {
            log::debug!("aborting run: {error}");
            self.abort.cancel();
        }
    }

    pub(crate) fn cache_for(&self, mode: Mode) -> &ResultCache {
        match mode {
            Mode::Meet => &self.meet_cache,
            Mode::CheckOnly => &self.check_cache,
        }
    }

    /// Forget every cached result
    pub fn reset(&self) {
        self.meet_cache.clear();
        self.check_cache.clear();
    }

    /// Resolve root deps by name, binding `args` to their parameters by name
    ///
    /// Every key in `args` must name a parameter of at least one root. The
    /// summary is successful iff every root ended up met.
    pub fn process<S: AsRef<str>>(
        &self,
        roots: &[S],
        args: &BTreeMap<String, String>,
    ) -> Result<RunSummary> {
        let requirements = self.bind_roots(roots, args)?;
        self.process_requirements(&requirements)
    }

    /// Resolve already-bound root requirements
    pub fn process_requirements(&self, roots: &[DepRequirement]) -> Result<RunSummary> {
        self.abort.reset();
        let jobs = self.options.jobs.max(1);
        log::info!(
            "processing {} root(s), {} job(s), mode {:?}",
            roots.len(),
            jobs,
            self.options.mode()
        );

        let results = if jobs == 1 || roots.len() < 2 {
            self.process_sequential(roots)
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| {
                    roots
                        .par_iter()
                        .map(|root| self.process_root(root))
                        .collect::<Vec<_>>()
                }),
                Err(e) => {
                    log::warn!("could not start {jobs} workers ({e}), running sequentially");
                    self.process_sequential(roots)
                }
            }
        };

        // Report the error that started it rather than the cancellations it caused
        if let Some(err) = first_error(&results) {
            return Err(err);
        }

        Ok(RunSummary {
            roots: roots
                .iter()
                .cloned()
                .zip(results.into_iter().flatten())
                .map(|(requirement, result)| RootReport { requirement, result })
                .collect(),
        })
    }

    /// Check a requirement without meeting anything
    pub fn check(&self, requirement: &DepRequirement) -> Result<DepResult> {
        self.resolve(requirement, Mode::CheckOnly)
    }

    /// Resolve a single requirement in `mode`, using the run cache
    pub fn resolve(&self, requirement: &DepRequirement, mode: Mode) -> Result<DepResult> {
        self.abort.reset();
        let tree = self.next_tree.fetch_add(1, Ordering::Relaxed);
        Task::new(self, tree).resolve(requirement, None, mode, 0, false)
    }

    fn process_sequential(&self, roots: &[DepRequirement]) -> Vec<Result<DepResult>> {
        let mut results = Vec::with_capacity(roots.len());
        for root in roots {
            let result = self.process_root(root);
            let fatal = result.is_err();
            results.push(result);
            if fatal {
                break;
            }
        }
        results
    }

    fn process_root(&self, root: &DepRequirement) -> Result<DepResult> {
        let tree = self.next_tree.fetch_add(1, Ordering::Relaxed);
        Task::new(self, tree).resolve(root, None, self.options.mode(), 0, self.options.force)
    }

    /// Turn root targets plus run-wide named arguments into requirements
    ///
    /// Arguments written in a target (`gem(rake)`, `gem(version=2)`) bind
    /// that root only and win over the run-wide ones.
    fn bind_roots<S: AsRef<str>>(
        &self,
        roots: &[S],
        args: &BTreeMap<String, String>,
    ) -> Result<Vec<DepRequirement>> {
        let mut used = vec![false; args.len()];
        let mut requirements = Vec::with_capacity(roots.len());

        for root in roots {
            let target = Target::parse(root.as_ref())?;
            if target.args.is_empty() && args.is_empty() {
                requirements.push(DepRequirement::from(target.dep));
                continue;
            }

            let dep = match self.registry.resolve(&target.dep, None) {
                Ok(dep) => dep,
                Err(e) if e.is_fatal() => return Err(e),
                // Left for the task to report as a failed root
                Err(_) => {
                    let args = target.positional().map(|a| a.map(str::to_string)).collect();
                    requirements.push(DepRequirement::from_parts(target.dep, args));
                    continue;
                }
            };

            let mut slots: Vec<Option<String>> = vec![None; dep.params.len()];
            let given = target.positional().count();
            if given > slots.len() {
                return Err(DepError::ArgumentArity {
                    dep: dep.name.to_string(),
                    expected: slots.len(),
                    given,
                });
            }
            for (slot, value) in slots.iter_mut().zip(target.positional()) {
                *slot = value.map(str::to_string);
            }
            for (name, value) in target.named() {
                let index = dep
                    .params
                    .iter()
                    .position(|p| p.name == name)
                    .ok_or_else(|| DepError::UnknownArgument {
                        dep: dep.name.to_string(),
                        param: name.to_string(),
                    })?;
                if slots[index].is_some() {
                    return Err(DepError::InvalidTarget {
                        target: root.as_ref().trim().to_string(),
                        reason: format!("'{name}' is given twice"),
                    });
                }
                slots[index] = Some(value.to_string());
            }
            for (param, slot) in dep.params.iter().zip(slots.iter_mut()) {
                if let Some(index) = args.keys().position(|k| *k == param.name) {
                    used[index] = true;
                    if slot.is_none() {
                        *slot = args.get(&param.name).cloned();
                    }
                }
            }

            let requirement = if slots.iter().any(Option::is_some) {
                DepRequirement::from_parts(target.dep, slots)
            } else {
                DepRequirement::from(target.dep)
            };
            requirements.push(requirement);
        }

        if let Some(name) = args
            .keys()
            .zip(&used)
            .find_map(|(name, used)| (!*used).then_some(name))
        {
            return Err(DepError::UnknownArgument {
                dep: roots
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(", "),
                param: name.clone(),
            });
        }
        Ok(requirements)
    }
}

/// First error that isn't a knock-on cancellation, else the first error
fn first_error(results: &[Result<DepResult>]) -> Option<DepError> {
    let errors = results.iter().filter_map(|r| r.as_ref().err());
    errors
        .clone()
        .find(|e| **e != DepError::Cancelled)
        .or_else(|| errors.clone().next())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DepDefinition;
    use crate::parameter::ParamSpec;
    use crate::types::Outcome;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                DepDefinition::builder("gem")
                    .param("name")
                    .param(ParamSpec::new("version").default_value("latest"))
                    .met(|_| Ok(Outcome::Success))
                    .build(),
            )
            .unwrap();
        registry
            .register(DepDefinition::builder("plain").met(|_| Ok(Outcome::Success)).build())
            .unwrap();
        registry
    }

    #[test]
    fn test_named_args_bind_by_parameter() {
        let registry = registry();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default());
        let args = BTreeMap::from([("name".to_string(), "rake".to_string())]);

        let roots = runner.bind_roots(&["gem", "plain"], &args).unwrap();
        assert_eq!(roots[0].args, vec![Some("rake".to_string()), None]);
        assert!(roots[1].args.is_empty());
    }

    #[test]
    fn test_target_args_bind_per_root() {
        let registry = registry();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default());
        let args = BTreeMap::from([("version".to_string(), "2.0".to_string())]);

        let roots = runner
            .bind_roots(&["gem(rake)", "local:gem(rails, version=7.1)", "gem(_, 1.0)"], &args)
            .unwrap();
        assert_eq!(roots[0].args, vec![Some("rake".to_string()), Some("2.0".to_string())]);
        assert_eq!(roots[0].to_string(), "gem(rake, 2.0)");
        assert_eq!(roots[1].args, vec![Some("rails".to_string()), Some("7.1".to_string())]);
        assert_eq!(roots[2].args, vec![None, Some("1.0".to_string())]);
    }

    #[test]
    fn test_target_args_are_checked() {
        let registry = registry();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default());
        let none = BTreeMap::new();

        assert!(matches!(
            runner.bind_roots(&["gem(a, b, c)"], &none).unwrap_err(),
            DepError::ArgumentArity { expected: 2, given: 3, .. }
        ));
        assert!(matches!(
            runner.bind_roots(&["gem(colour=blue)"], &none).unwrap_err(),
            DepError::UnknownArgument { .. }
        ));
        assert!(matches!(
            runner.bind_roots(&["gem(rake, name=rails)"], &none).unwrap_err(),
            DepError::InvalidTarget { .. }
        ));
        assert!(matches!(
            runner.process(&["gem(rake"], &none).unwrap_err(),
            DepError::InvalidTarget { .. }
        ));

        // Unknown deps keep their arguments and fail as roots
        let roots = runner.bind_roots(&["nope(x)"], &none).unwrap();
        assert_eq!(roots[0].args, vec![Some("x".to_string())]);
    }

    #[test]
    fn test_target_args_meet_with_bound_values() {
        let registry = registry();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default());

        let summary = runner.process(&["gem(rake)"], &BTreeMap::new()).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.roots[0].requirement.args[0].as_deref(), Some("rake"));
    }

    #[test]
    fn test_unknown_named_arg() {
        let registry = registry();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default());
        let args = BTreeMap::from([("colour".to_string(), "blue".to_string())]);

        assert_eq!(
            runner.process(&["gem"], &args).unwrap_err(),
            DepError::UnknownArgument {
                dep: "gem".into(),
                param: "colour".into()
            }
        );
    }

    #[test]
    fn test_first_error_skips_cancellations() {
        let results = vec![
            Ok(DepResult::Unmet),
            Err(DepError::Cancelled),
            Err(DepError::CyclicDependency {
                chain: vec!["a".into(), "a".into()],
            }),
        ];
        assert!(matches!(
            first_error(&results),
            Some(DepError::CyclicDependency { .. })
        ));
        assert_eq!(first_error(&[Err(DepError::Cancelled)]), Some(DepError::Cancelled));
        assert_eq!(first_error(&[Ok(DepResult::Unmet)]), None);
    }

    #[test]
    fn test_cancelled_run_stops_before_first_dep() {
        let registry = registry();
        let token = CancelToken::new();
        let runner = Runner::new(&registry, Providers::silent(), RunOptions::default())
            .with_cancel_token(token.clone());
        token.cancel();
        assert_eq!(
            runner.process(&["plain"], &BTreeMap::new()).unwrap_err(),
            DepError::Cancelled
        );
    }
}
