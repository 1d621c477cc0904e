//! Definition sinks: where translated lambdas get registered.
//!
//! The dry/committing distinction is a capability chosen once at translator
//! construction, not a runtime flag: a committing translator holds a
//! [`SharedDefs`] writing into the unit's shared table, a discarding
//! translator holds a [`ScratchDefs`] writing into a private table that is
//! dropped with it. Both expose the same append interface.

use nabla_ir::{Lambda, ParseEnv, Symbol};
use std::cell::RefCell;
use std::rc::Rc;

/// Append interface to a definition table, plus the table's label generator.
pub trait DefSink {
    /// Register a definition under its reference symbol.
    fn define(&self, lambda: Lambda);

    /// Issue a fresh global label.
    fn fresh(&self, base: &str) -> Symbol;

    /// Issue a fresh global label derived from a parent symbol and a tag.
    fn derive(&self, parent: &Symbol, tag: &str) -> Symbol;
}

/// Committing sink: appends into the shared table of the unit.
pub struct SharedDefs {
    env: Rc<RefCell<ParseEnv>>,
}

impl SharedDefs {
    /// Create a sink over the unit's shared table.
    pub fn new(env: Rc<RefCell<ParseEnv>>) -> Self {
        SharedDefs { env }
    }
}

impl DefSink for SharedDefs {
    fn define(&self, lambda: Lambda) {
        self.env.borrow_mut().define(lambda.reference.clone(), lambda);
    }

    fn fresh(&self, base: &str) -> Symbol {
        self.env.borrow().gen.fresh(base)
    }

    fn derive(&self, parent: &Symbol, tag: &str) -> Symbol {
        self.env.borrow().gen.derive(parent, tag)
    }
}

/// Discarding sink: appends into a private table nobody else can see, so a
/// dry translation run has no effect on the shared table.
pub struct ScratchDefs {
    env: RefCell<ParseEnv>,
}

impl ScratchDefs {
    /// Create a sink over a fresh private table.
    pub fn new() -> Self {
        ScratchDefs {
            env: RefCell::new(ParseEnv::new("scratch")),
        }
    }
}

impl Default for ScratchDefs {
    fn default() -> Self {
        Self::new()
    }
}

impl DefSink for ScratchDefs {
    fn define(&self, lambda: Lambda) {
        self.env.borrow_mut().define(lambda.reference.clone(), lambda);
    }

    fn fresh(&self, base: &str) -> Symbol {
        self.env.borrow().gen.fresh(base)
    }

    fn derive(&self, parent: &Symbol, tag: &str) -> Symbol {
        self.env.borrow().gen.derive(parent, tag)
    }
}
