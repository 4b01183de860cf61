//! Per-run result cache
//!
//! Maps a bound [`DepRequirement`] to its [`DepResult`]. A requirement is
//! claimed by one root tree while it resolves; other trees asking for it
//! block until the owner completes it, then read the stored result. This is
//! what makes a requirement run at most once even with parallel roots.
//!
//! Two trees waiting on each other's in-flight requirements can only happen
//! when the requirement graph has a cycle spanning both trees, so the
//! wait-for graph is checked before blocking and the cycle reported instead.

use crate::error::{DepError, Result};
use crate::requirement::DepRequirement;
use crate::types::DepResult;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Identifies one root tree of a run
pub(crate) type TreeId = usize;

/// Outcome of [`ResultCache::claim`]
#[derive(Debug)]
pub(crate) enum Claim {
    /// Already resolved in this run
    Cached(DepResult),
    /// The caller now owns the requirement and must [`complete`](ResultCache::complete) it
    Claimed,
}

#[derive(Debug, Default)]
struct CacheState {
    results: HashMap<DepRequirement, DepResult>,
    in_flight: HashMap<DepRequirement, TreeId>,
    /// Requirement each blocked tree is waiting for
    waiting: HashMap<TreeId, DepRequirement>,
}

#[derive(Debug, Default)]
pub(crate) struct ResultCache {
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl ResultCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Poisoning only means some tree panicked; the maps stay consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of `key` for `tree`, or return its cached result
    ///
    /// With `bypass`, a stored result is ignored and the requirement is
    /// resolved again (it still waits for another tree that holds it).
    pub(crate) fn claim(&self, key: &DepRequirement, tree: TreeId, bypass: bool) -> Result<Claim> {
        let mut state = self.lock();
        loop {
            if !bypass && let Some(result) = state.results.get(key) {
                return Ok(Claim::Cached(result.clone()));
            }

            let Some(&owner) = state.in_flight.get(key) else {
                state.in_flight.insert(key.clone(), tree);
                return Ok(Claim::Claimed);
            };

            if owner == tree {
                return Err(DepError::CyclicDependency {
                    chain: vec![key.to_string(), key.to_string()],
                });
            }
            if let Some(chain) = wait_cycle(&state, key, tree) {
                return Err(DepError::CyclicDependency { chain });
            }

            log::debug!("tree {tree} waiting for {key} (held by tree {owner})");
            state.waiting.insert(tree, key.clone());
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiting.remove(&tree);

            // Resolved by another tree while we waited, so it's fresh for this run
            if bypass && !state.in_flight.contains_key(key) && state.results.contains_key(key) {
                return Ok(Claim::Cached(state.results[key].clone()));
            }
        }
    }

    /// Release `key`, storing its result when there is one
    pub(crate) fn complete(&self, key: &DepRequirement, result: Option<&DepResult>) {
        let mut state = self.lock();
        state.in_flight.remove(key);
        if let Some(result) = result {
            state.results.insert(key.clone(), result.clone());
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Stored result, without claiming or waiting
    pub(crate) fn peek(&self, key: &DepRequirement) -> Option<DepResult> {
        self.lock().results.get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.results.clear();
    }
}

/// Owner's handle on a claimed requirement
///
/// Completing stores the result; dropping it any other way (an early
/// return, an unwinding panic) releases the claim without one, so trees
/// waiting on the requirement wake up instead of blocking forever.
#[derive(Debug)]
pub(crate) struct ClaimGuard<'c> {
    cache: &'c ResultCache,
    key: &'c DepRequirement,
    released: bool,
}

impl<'c> ClaimGuard<'c> {
    pub(crate) fn new(cache: &'c ResultCache, key: &'c DepRequirement) -> Self {
        Self {
            cache,
            key,
            released: false,
        }
    }

    pub(crate) fn complete(mut self, result: Option<&DepResult>) {
        self.released = true;
        self.cache.complete(self.key, result);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            log::debug!("releasing unfinished claim on {}", self.key);
            self.cache.complete(self.key, None);
        }
    }
}

/// Follow the wait-for graph from `key`; `Some(chain)` if it leads back to `tree`
fn wait_cycle(state: &CacheState, key: &DepRequirement, tree: TreeId) -> Option<Vec<String>> {
    let mut chain = vec![key.to_string()];
    let mut current = key;
    // Each tree waits on at most one key, so this terminates within the tree count
    for _ in 0..=state.waiting.len() {
        let owner = *state.in_flight.get(current)?;
        if owner == tree {
            return Some(chain);
        }
        current = state.waiting.get(&owner)?;
        chain.push(current.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn key(name: &str) -> DepRequirement {
        DepRequirement::new(name)
    }

    #[test]
    fn test_claim_then_cached() {
        let cache = ResultCache::new();
        assert!(matches!(cache.claim(&key("a"), 0, false), Ok(Claim::Claimed)));
        cache.complete(&key("a"), Some(&DepResult::Met { changed: true }));

        match cache.claim(&key("a"), 1, false).unwrap() {
            Claim::Cached(result) => assert_eq!(result, DepResult::Met { changed: true }),
            Claim::Claimed => panic!("expected cached result"),
        }
        assert_eq!(cache.peek(&key("a")), Some(DepResult::Met { changed: true }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bypass_reclaims() {
        let cache = ResultCache::new();
        cache.claim(&key("a"), 0, false).unwrap();
        cache.complete(&key("a"), Some(&DepResult::Unmet));
        assert!(matches!(cache.claim(&key("a"), 0, true), Ok(Claim::Claimed)));
    }

    #[test]
    fn test_release_without_result() {
        let cache = ResultCache::new();
        cache.claim(&key("a"), 0, false).unwrap();
        cache.complete(&key("a"), None);
        assert_eq!(cache.peek(&key("a")), None);
        assert!(matches!(cache.claim(&key("a"), 1, false), Ok(Claim::Claimed)));
    }

    #[test]
    fn test_waiter_gets_owner_result() {
        let cache = Arc::new(ResultCache::new());
        cache.claim(&key("shared"), 0, false).unwrap();

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.claim(&key("shared"), 1, false))
        };
        thread::sleep(Duration::from_millis(50));
        cache.complete(&key("shared"), Some(&DepResult::Met { changed: false }));

        match waiter.join().unwrap().unwrap() {
            Claim::Cached(result) => assert!(result.is_met()),
            Claim::Claimed => panic!("waiter should see the owner's result"),
        }
    }

    #[test]
    fn test_cross_tree_wait_cycle_is_reported() {
        let cache = Arc::new(ResultCache::new());
        // Tree 0 holds x, tree 1 holds y
        cache.claim(&key("x"), 0, false).unwrap();
        cache.claim(&key("y"), 1, false).unwrap();

        // Tree 1 blocks on x
        let blocked = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.claim(&key("x"), 1, false))
        };
        thread::sleep(Duration::from_millis(50));

        // Tree 0 asking for y would deadlock
        let err = cache.claim(&key("y"), 0, false).unwrap_err();
        assert!(matches!(err, DepError::CyclicDependency { .. }));

        cache.complete(&key("x"), None);
        assert!(matches!(blocked.join().unwrap(), Ok(Claim::Claimed)));
    }

    #[test]
    fn test_dropped_guard_releases_waiters() {
        let cache = Arc::new(ResultCache::new());
        let shared = key("shared");
        assert!(matches!(cache.claim(&shared, 0, false), Ok(Claim::Claimed)));

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.claim(&key("shared"), 1, false))
        };
        thread::sleep(Duration::from_millis(50));

        // The owner unwinds without completing
        let owner = thread::scope(|s| {
            s.spawn(|| {
                let _guard = ClaimGuard::new(&cache, &shared);
                panic!("hook blew up");
            })
            .join()
        });
        assert!(owner.is_err());

        assert!(matches!(waiter.join().unwrap(), Ok(Claim::Claimed)));
        assert_eq!(cache.peek(&shared), None);
    }

    #[test]
    fn test_completed_guard_stores_result() {
        let cache = ResultCache::new();
        let a = key("a");
        cache.claim(&a, 0, false).unwrap();
        ClaimGuard::new(&cache, &a).complete(Some(&DepResult::Unmet));
        assert_eq!(cache.peek(&a), Some(DepResult::Unmet));
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::new();
        cache.claim(&key("a"), 0, false).unwrap();
        cache.complete(&key("a"), Some(&DepResult::Unmet));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
