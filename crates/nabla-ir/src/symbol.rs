//! IR symbols and the symbol generator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Namespace of a symbol.
///
/// `Global` symbols are named references resolved outside the compilation
/// unit (user globals and builtins); their name is their identity. Generated
/// symbols live in the namespace of the generator that produced them, so two
/// generators can issue the same display name without ever colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Named reference into the global namespace
    Global,
    /// Produced by the generator with this id
    Gen(u32),
}

/// A unique IR identifier for a variable or function.
///
/// Equality is derived over name, version, and namespace; for generated
/// symbols the (namespace, name, version) triple is the uniqueness token.
/// Shadowing always allocates a new version, hence a new symbol — versions
/// are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    /// Display name
    pub name: String,
    /// Version within the generator namespace; 0 for global references
    pub version: u32,
    /// Owning namespace
    pub namespace: Namespace,
}

impl Symbol {
    /// A named reference into the global namespace.
    pub fn global(name: impl Into<String>) -> Self {
        Symbol {
            name: name.into(),
            version: 0,
            namespace: Namespace::Global,
        }
    }

    /// Check whether this is a global named reference.
    pub fn is_global(&self) -> bool {
        self.namespace == Namespace::Global
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.version > 1 {
            write!(f, "{}#{}", self.name, self.version)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

static NEXT_GEN_ID: AtomicU32 = AtomicU32::new(1);

/// Generator of fresh symbols.
///
/// Every generator owns a process-unique namespace id, so symbols from
/// different generators never compare equal even when their display names
/// match. Within a generator, each base name carries a version counter.
#[derive(Debug)]
pub struct GenSym {
    id: u32,
    versions: RefCell<HashMap<String, u32>>,
}

impl GenSym {
    /// Create a generator with a fresh namespace.
    pub fn new() -> Self {
        GenSym {
            id: NEXT_GEN_ID.fetch_add(1, Ordering::Relaxed),
            versions: RefCell::new(HashMap::new()),
        }
    }

    /// Issue a fresh symbol for `base`. Repeated calls with the same base
    /// name return distinct symbols with increasing versions.
    pub fn fresh(&self, base: &str) -> Symbol {
        let mut versions = self.versions.borrow_mut();
        let version = versions
            .entry(base.to_string())
            .and_modify(|v| *v += 1)
            .or_insert(1);
        Symbol {
            name: base.to_string(),
            version: *version,
            namespace: Namespace::Gen(self.id),
        }
    }

    /// Issue a fresh symbol whose name derives from `parent` plus a
    /// discriminating tag, for synthetic branch/loop labels.
    pub fn derive(&self, parent: &Symbol, tag: &str) -> Symbol {
        self.fresh(&format!("{}:{}", parent.name, tag))
    }
}

impl Default for GenSym {
    fn default() -> Self {
        Self::new()
    }
}
