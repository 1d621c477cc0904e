//! The global definition table.

use crate::node::Lambda;
use crate::symbol::{GenSym, Symbol};

/// The append-only table of top-level function definitions for one
/// compilation unit.
///
/// Every committing translator of a unit shares one `ParseEnv`; discarding
/// translators get a private scratch one. The env owns its own symbol
/// generator for global function labels. Entries are kept in definition
/// order and are never removed.
#[derive(Debug)]
pub struct ParseEnv {
    /// Namespace string of the unit (e.g. its source path)
    pub namespace: String,
    /// Generator for global function labels
    pub gen: GenSym,
    bindings: Vec<(Symbol, Lambda)>,
}

impl ParseEnv {
    /// Create an empty table for one unit.
    pub fn new(namespace: impl Into<String>) -> Self {
        ParseEnv {
            namespace: namespace.into(),
            gen: GenSym::new(),
            bindings: Vec::new(),
        }
    }

    /// Append a definition. Symbols are unique, so a reference is only ever
    /// defined once.
    pub fn define(&mut self, reference: Symbol, lambda: Lambda) {
        debug_assert!(self.get(&reference).is_none());
        self.bindings.push((reference, lambda));
    }

    /// Look up a definition by its reference symbol.
    pub fn get(&self, reference: &Symbol) -> Option<&Lambda> {
        self.bindings
            .iter()
            .find(|(sym, _)| sym == reference)
            .map(|(_, lambda)| lambda)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterate over definitions in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, Lambda)> {
        self.bindings.iter()
    }

    /// Iterate mutably, for post-translation transforms that rewrite bodies.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (Symbol, Lambda)> {
        self.bindings.iter_mut()
    }
}
