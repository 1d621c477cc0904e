//! The contract the front-end relies on from the inference layer.
//!
//! The inference engine itself lives outside this workspace; what is fixed
//! here is its error kind and the memoized-lookup discipline: evaluations
//! are keyed by argument tuples, the computation for a key logically runs
//! once, and every caller observes the same cached result or the same
//! structured error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

use nabla_ir::Symbol;
use thiserror::Error;

/// A structured inference failure.
///
/// Carries the message plus the IR references involved (e.g. the symbols
/// whose types failed to match), for diagnostic rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InferenceError {
    /// What went wrong
    pub message: String,
    /// IR references involved in the failure
    pub refs: Vec<Symbol>,
}

impl InferenceError {
    /// An error with no involved references.
    pub fn new(message: impl Into<String>) -> Self {
        InferenceError {
            message: message.into(),
            refs: Vec::new(),
        }
    }

    /// An error naming the references involved.
    pub fn with_refs(message: impl Into<String>, refs: Vec<Symbol>) -> Self {
        InferenceError {
            message: message.into(),
            refs,
        }
    }
}

/// Result alias for inference lookups.
pub type InferResult<T> = Result<T, InferenceError>;

#[derive(Debug, Clone)]
enum Entry<V> {
    /// The computation for this key is currently running
    InFlight,
    /// The computation finished; everyone gets this outcome
    Done(InferResult<V>),
}

/// Memoized evaluation cache keyed by argument tuples.
///
/// `lookup_or_compute` runs the computation for a key at most once; repeated
/// lookups for the same key return the cached outcome, successful or not. A
/// lookup re-entering a key whose computation is still running is a
/// dependency cycle and fails with a structured error rather than diverging.
#[derive(Debug, Default)]
pub struct EvaluationCache<K, V> {
    entries: RefCell<HashMap<K, Entry<V>>>,
}

impl<K, V> EvaluationCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        EvaluationCache {
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// The cached outcome for a key, if its computation finished.
    pub fn get(&self, key: &K) -> Option<InferResult<V>> {
        match self.entries.borrow().get(key) {
            Some(Entry::Done(outcome)) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Return the cached outcome for `key`, computing it first if this is
    /// the first lookup.
    pub fn lookup_or_compute(
        &self,
        key: K,
        compute: impl FnOnce() -> InferResult<V>,
    ) -> InferResult<V> {
        {
            let mut entries = self.entries.borrow_mut();
            match entries.get(&key) {
                Some(Entry::Done(outcome)) => return outcome.clone(),
                Some(Entry::InFlight) => {
                    return Err(InferenceError::new(
                        "cyclic dependency during inference",
                    ))
                }
                None => {
                    entries.insert(key.clone(), Entry::InFlight);
                }
            }
        }
        let outcome = compute();
        self.entries
            .borrow_mut()
            .insert(key, Entry::Done(outcome.clone()));
        outcome
    }

    /// Number of finished entries.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|e| matches!(e, Entry::Done(_)))
            .count()
    }

    /// Check if the cache has no finished entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
