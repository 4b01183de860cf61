//! One root tree of a run
//!
//! A [`Task`] owns the call stack for a single root requirement and walks
//! its requirement graph depth-first. Every dereference goes through
//! [`Task::resolve`], which binds the requirement, checks the stack for
//! cycles and consults the run's shared cache before handing the dep to
//! [`DepInstance`](crate::dep::DepInstance).

use crate::cache::{Claim, ClaimGuard, TreeId};
use crate::definition::ResolvedDep;
use crate::dep::DepInstance;
use crate::error::{DepError, Result};
use crate::requirement::DepRequirement;
use crate::runner::Runner;
use crate::types::{DepResult, Failure, FailureKind, Mode};

pub(crate) struct Task<'r> {
    runner: &'r Runner<'r>,
    tree: TreeId,
    stack: Vec<DepRequirement>,
}

impl<'r> Task<'r> {
    pub(crate) fn new(runner: &'r Runner<'r>, tree: TreeId) -> Self {
        Self {
            runner,
            tree,
            stack: Vec::new(),
        }
    }

    pub(crate) fn runner(&self) -> &'r Runner<'r> {
        self.runner
    }

    /// Whether parameters may be prompted for
    pub(crate) fn is_interactive(&self) -> bool {
        !self.runner.options().defaults && self.runner.providers().prompter.is_interactive()
    }

    /// Resolve a requirement in `mode`, at most once per run
    ///
    /// `from_source` is the source of the dep declaring the edge, used to
    /// settle unqualified names. `bypass_cache` re-resolves even when a
    /// result is stored (used for forced roots).
    ///
    /// Any error here is fatal to the run. It is signalled before the
    /// failing requirement's claim is released, so trees waiting on that
    /// claim stop instead of resolving it again.
    pub(crate) fn resolve(
        &mut self,
        requirement: &DepRequirement,
        from_source: Option<&str>,
        mode: Mode,
        depth: usize,
        bypass_cache: bool,
    ) -> Result<DepResult> {
        let result = self.resolve_once(requirement, from_source, mode, depth, bypass_cache);
        if let Err(e) = &result {
            self.runner.abort(e);
        }
        result
    }

    fn resolve_once(
        &mut self,
        requirement: &DepRequirement,
        from_source: Option<&str>,
        mode: Mode,
        depth: usize,
        bypass_cache: bool,
    ) -> Result<DepResult> {
        if self.runner.is_cancelled() {
            return Err(DepError::Cancelled);
        }

        let dep = match self.runner.registry().resolve(&requirement.dep, from_source) {
            Ok(dep) => dep,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(self.unresolvable(requirement, depth, &e)),
        };
        let key = bind(&dep, requirement)?;

        if let Some(start) = self.stack.iter().position(|k| *k == key) {
            let chain = self.stack[start..]
                .iter()
                .chain(std::iter::once(&key))
                .map(ToString::to_string)
                .collect();
            return Err(DepError::CyclicDependency { chain });
        }

        let cache = self.runner.cache_for(mode);
        if mode == Mode::CheckOnly
            && let Some(result) = self.runner.cache_for(Mode::Meet).peek(&key)
        {
            self.report_cached(&key, &result, depth);
            return Ok(result);
        }
        if let Claim::Cached(result) = cache.claim(&key, self.tree, bypass_cache)? {
            self.report_cached(&key, &result, depth);
            return Ok(result);
        }
        // Released with no result on every early return or unwind
        let claim = ClaimGuard::new(cache, &key);

        // The owner may have aborted the run while this tree waited
        if self.runner.is_cancelled() {
            return Err(DepError::Cancelled);
        }

        self.stack.push(key.clone());
        let outcome = DepInstance::new(&dep, &key, mode, depth).process(self);
        self.stack.pop();

        if let Err(e) = &outcome {
            self.runner.abort(e);
        }
        claim.complete(outcome.as_ref().ok());

        // Something changed on the system, so earlier checks may be stale
        if mode == Mode::Meet && outcome.as_ref().is_ok_and(DepResult::is_change) {
            self.runner.cache_for(Mode::CheckOnly).clear();
        }
        outcome
    }

    fn report_cached(&self, key: &DepRequirement, result: &DepResult, depth: usize) {
        log::debug!("{key}: cached ({result:?})");
        self.runner
            .providers()
            .reporter
            .report_cached(&key.to_string(), result, depth);
    }

    /// Name didn't resolve to a loaded dep: the dep fails, the run goes on
    fn unresolvable(&self, requirement: &DepRequirement, depth: usize, error: &DepError) -> DepResult {
        let kind = match error {
            DepError::Parameter(_) => FailureKind::Parameter,
            _ => FailureKind::NotFound,
        };
        let name = requirement.to_string();
        let result = DepResult::Failed(Failure::new(&name, None, kind, error.to_string()));
        let reporter = self.runner.providers().reporter;
        reporter.enter_dep(&name, depth);
        reporter.report_result(&name, &result, depth);
        result
    }
}

/// Turn a requirement into its cache key: qualified name, one slot per parameter
fn bind(dep: &ResolvedDep, requirement: &DepRequirement) -> Result<DepRequirement> {
    let expected = dep.params.len();
    let args = if requirement.args.is_empty() {
        vec![None; expected]
    } else if requirement.args.len() == expected {
        requirement.args.clone()
    } else {
        return Err(DepError::ArgumentArity {
            dep: dep.name.to_string(),
            expected,
            given: requirement.args.len(),
        });
    };
    Ok(DepRequirement::from_parts(dep.name.clone(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DepDefinition;
    use crate::requirement::DepName;

    fn resolved(params: &[&str]) -> ResolvedDep {
        let def = DepDefinition::builder("gem")
            .params(params.iter().copied())
            .build();
        ResolvedDep::from_leaf("core", &def)
    }

    #[test]
    fn test_bind_fills_unbound_slots() {
        let key = bind(&resolved(&["name", "version"]), &DepRequirement::new("gem")).unwrap();
        assert_eq!(key.dep, DepName::qualified("core", "gem"));
        assert_eq!(key.args, vec![None, None]);

        // Unqualified and qualified spellings share a key
        let other = bind(&resolved(&["name", "version"]), &DepRequirement::new("core:gem")).unwrap();
        assert_eq!(key, other);
    }

    #[test]
    fn test_bind_keeps_positional_args() {
        let dep = resolved(&["name"]);
        let key = bind(&dep, &DepRequirement::with_args("gem", ["rake"])).unwrap();
        assert_eq!(key.args, vec![Some("rake".to_string())]);
        assert_eq!(key.to_string(), "core:gem(rake)");
    }

    #[test]
    fn test_bind_rejects_wrong_arity() {
        let dep = resolved(&["name"]);
        let err = bind(&dep, &DepRequirement::with_args("gem", ["rake", "13"])).unwrap_err();
        assert_eq!(
            err,
            DepError::ArgumentArity {
                dep: "core:gem".into(),
                expected: 1,
                given: 2
            }
        );
        assert!(err.is_fatal());

        let none = resolved(&[]);
        assert!(bind(&none, &DepRequirement::with_args("gem", ["x"])).is_err());
    }
}
