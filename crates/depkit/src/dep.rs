//! The per-dep resolution state machine
//!
//! ```text
//! setup -> requires -> met? --yes--> Met
//!                        |
//!                        no --(check only)--> Unmet
//!                        |
//!          requires_when_unmet -> prepare -> before -> meet -> after -> met? again
//! ```
//!
//! Any failing requirement stops the dep before its own met? runs, and its
//! [`Failure`] is passed up unchanged so the root reports the deepest cause.
//! Hook errors are caught here and turned into failed results, except fatal
//! [`DepError`]s (cycles and other declaration bugs, cancellation), which
//! abort the run.

use crate::context::HookContext;
use crate::definition::ResolvedDep;
use crate::error::{DepError, ParamError, Result};
use crate::parameter::ParamSet;
use crate::requirement::{ArgValue, DepRequirement, RequirementSpec};
use crate::task::Task;
use crate::types::{DepResult, Failure, FailureKind, HookKind, Mode, Outcome};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// What happened when the engine tried to call a hook
enum HookRun {
    /// The dep doesn't declare it
    Absent,
    /// The hook returned
    Done(Outcome),
    /// The hook raised a (non-fatal) error
    Raised(Failure),
}

/// A dep bound to one requirement, resolved once
pub(crate) struct DepInstance<'d> {
    dep: &'d ResolvedDep,
    key: &'d DepRequirement,
    name: String,
    mode: Mode,
    depth: usize,
}

impl<'d> DepInstance<'d> {
    pub(crate) fn new(dep: &'d ResolvedDep, key: &'d DepRequirement, mode: Mode, depth: usize) -> Self {
        Self {
            dep,
            key,
            name: key.to_string(),
            mode,
            depth,
        }
    }

    /// Run the state machine and report the result
    pub(crate) fn process(&self, task: &mut Task<'_>) -> Result<DepResult> {
        let reporter = task.runner().providers().reporter;
        reporter.enter_dep(&self.name, self.depth);

        let result = self.run(task)?;

        log::debug!("{}: {:?}", self.name, result);
        reporter.report_result(&self.name, &result, self.depth);
        Ok(result)
    }

    fn run(&self, task: &mut Task<'_>) -> Result<DepResult> {
        let mut params = match ParamSet::bind(&self.dep.params, &self.key.args) {
            Ok(params) => params,
            Err(e) => return Ok(self.failed(None, FailureKind::Parameter, e.to_string())),
        };

        // Setup can stop the dep but never marks it met
        match self.run_hook(task, &mut params, HookKind::Setup)? {
            HookRun::Raised(failure) => return Ok(DepResult::Failed(failure)),
            HookRun::Done(outcome) if outcome.is_terminal() => {
                return Ok(self.from_outcome(HookKind::Setup, &outcome));
            }
            _ => {}
        }

        if let Some(stop) = self.walk(task, &mut params, &self.dep.requires, self.mode)? {
            return Ok(stop);
        }

        match self.run_hook(task, &mut params, HookKind::Met)? {
            HookRun::Done(Outcome::Success) => return Ok(DepResult::Met { changed: false }),
            HookRun::Done(Outcome::Unmet) => {}
            HookRun::Done(outcome) => return Ok(self.from_outcome(HookKind::Met, &outcome)),
            HookRun::Raised(failure) => return Ok(DepResult::Failed(failure)),
            HookRun::Absent => {
                log::debug!("{}: no met? check, treating as unmet", self.name);
            }
        }

        if !self.mode.attempts_to_meet() {
            return Ok(DepResult::Unmet);
        }

        if let Some(stop) = self.walk(task, &mut params, &self.dep.requires_when_unmet, self.mode)? {
            return Ok(stop);
        }

        if !self.dep.hooks.has(HookKind::Meet) {
            task.runner()
                .providers()
                .reporter
                .warn(&format!("{}: unmet, nothing to do", self.name), self.depth + 1);
            return Ok(self.failed(
                None,
                FailureKind::NothingToDo,
                "unmet and there is no meet step",
            ));
        }

        for kind in [HookKind::Prepare, HookKind::Before] {
            match self.run_hook(task, &mut params, kind)? {
                HookRun::Absent | HookRun::Done(Outcome::Success) => {}
                HookRun::Done(Outcome::Unmet) => {
                    return Ok(self.failed(Some(kind), FailureKind::HookRefused, "declined to continue"));
                }
                HookRun::Done(outcome) => return Ok(self.from_outcome(kind, &outcome)),
                HookRun::Raised(failure) => return Ok(DepResult::Failed(failure)),
            }
        }

        let meet = self.run_hook(task, &mut params, HookKind::Meet)?;

        // After runs once meet has started, whatever meet did
        match self.run_hook(task, &mut params, HookKind::After)? {
            HookRun::Absent | HookRun::Done(Outcome::Success) => {}
            HookRun::Done(Outcome::Unmet) => self.warn(task, "after step reported unmet"),
            HookRun::Done(Outcome::Unmeetable { reason: message } | Outcome::Error { message }) => {
                self.warn(task, &format!("after step failed: {message}"));
            }
            HookRun::Raised(failure) => {
                self.warn(task, &format!("after step failed: {}", failure.message));
            }
        }

        let met_by_meet = match meet {
            HookRun::Raised(failure) => return Ok(DepResult::Failed(failure)),
            HookRun::Done(outcome) if outcome.is_terminal() => {
                return Ok(self.from_outcome(HookKind::Meet, &outcome));
            }
            HookRun::Done(outcome) => outcome.is_success(),
            HookRun::Absent => false,
        };

        match self.run_hook(task, &mut params, HookKind::Met)? {
            HookRun::Done(Outcome::Success) => Ok(DepResult::Met { changed: true }),
            HookRun::Done(Outcome::Unmet) => Ok(self.failed(
                Some(HookKind::Met),
                FailureKind::StillUnmet,
                "still unmet after meeting",
            )),
            HookRun::Done(outcome) => Ok(self.from_outcome(HookKind::Met, &outcome)),
            HookRun::Raised(failure) => Ok(DepResult::Failed(failure)),
            HookRun::Absent if met_by_meet => Ok(DepResult::Met { changed: true }),
            HookRun::Absent => Ok(self.failed(
                Some(HookKind::Meet),
                FailureKind::StillUnmet,
                "meet did not succeed",
            )),
        }
    }

    /// Resolve requirements in order; `Some` is the result this dep stops with
    fn walk(
        &self,
        task: &mut Task<'_>,
        params: &mut ParamSet,
        requirements: &[RequirementSpec],
        mode: Mode,
    ) -> Result<Option<DepResult>> {
        for spec in requirements {
            let requirement = match self.bind_edge(task, params, spec) {
                Ok(requirement) => requirement,
                Err(e) => {
                    return Ok(Some(self.failed(None, FailureKind::Parameter, e.to_string())));
                }
            };

            match task.resolve(&requirement, Some(self.dep.source()), mode, self.depth + 1, false)? {
                DepResult::Met { .. } => {}
                DepResult::Unmet => return Ok(Some(DepResult::Unmet)),
                failed @ DepResult::Failed(_) => return Ok(Some(failed)),
            }
        }
        Ok(None)
    }

    /// Resolve forwarded parameters so the edge becomes a concrete requirement
    fn bind_edge(
        &self,
        task: &Task<'_>,
        params: &mut ParamSet,
        spec: &RequirementSpec,
    ) -> std::result::Result<DepRequirement, ParamError> {
        let interactive = task.is_interactive();
        let prompter = task.runner().providers().prompter;
        let args = spec
            .args
            .iter()
            .map(|arg| match arg {
                ArgValue::Literal(value) => Ok(Some(value.clone())),
                ArgValue::Param(name) => params.resolve(name, prompter, interactive).map(Some),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(DepRequirement::from_parts(spec.dep.clone(), args))
    }

    fn run_hook(&self, task: &mut Task<'_>, params: &mut ParamSet, kind: HookKind) -> Result<HookRun> {
        let Some(hook) = self.dep.hooks.get(kind) else {
            return Ok(HookRun::Absent);
        };
        task.runner()
            .providers()
            .reporter
            .hook(&self.name, kind, self.depth);

        let mut ctx = HookContext {
            task,
            requirement: self.key,
            source: self.dep.source(),
            params,
            hook: kind,
            depth: self.depth,
            mode: self.mode,
        };

        let returned = panic::catch_unwind(AssertUnwindSafe(|| hook(&mut ctx)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))));

        match returned {
            Ok(outcome) => {
                log::debug!("{} {}: {:?}", self.name, kind, outcome);
                Ok(HookRun::Done(outcome))
            }
            Err(err) => {
                if let Some(fatal) = err.downcast_ref::<DepError>().filter(|e| e.is_fatal()) {
                    return Err(fatal.clone());
                }
                let failure_kind = if err.downcast_ref::<ParamError>().is_some()
                    || matches!(err.downcast_ref::<DepError>(), Some(DepError::Parameter(_)))
                {
                    FailureKind::Parameter
                } else {
                    FailureKind::Error
                };
                log::warn!("{} {} failed: {:#}", self.name, kind, err);
                Ok(HookRun::Raised(Failure::new(
                    &self.name,
                    Some(kind),
                    failure_kind,
                    format!("{err:#}"),
                )))
            }
        }
    }

    fn from_outcome(&self, hook: HookKind, outcome: &Outcome) -> DepResult {
        match outcome {
            Outcome::Success => DepResult::Met { changed: false },
            Outcome::Unmet => self.failed(Some(hook), FailureKind::StillUnmet, "unmet"),
            Outcome::Unmeetable { reason } => self.failed(Some(hook), FailureKind::Unmeetable, reason),
            Outcome::Error { message } => self.failed(Some(hook), FailureKind::Error, message),
        }
    }

    fn failed(&self, hook: Option<HookKind>, kind: FailureKind, message: impl Into<String>) -> DepResult {
        DepResult::Failed(Failure::new(&self.name, hook, kind, message))
    }

    fn warn(&self, task: &Task<'_>, message: &str) {
        log::warn!("{}: {}", self.name, message);
        task.runner()
            .providers()
            .reporter
            .warn(message, self.depth + 1);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
