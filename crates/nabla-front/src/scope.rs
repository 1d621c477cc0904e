//! Lexical scope tracking.
//!
//! Scopes form a parent chain, but frames are stored in an arena indexed by
//! id rather than linked by reference, so a child translator's frame can
//! outlive the borrow of its parent translator. All translators of one unit
//! share the arena.

use nabla_ir::Symbol;

/// Index of a frame in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug)]
struct Frame {
    parent: Option<ScopeId>,
    bindings: Vec<(String, Symbol)>,
}

/// Arena of scope frames for one compilation unit.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    /// Create an empty arena.
    pub fn new() -> Self {
        Scopes { frames: Vec::new() }
    }

    /// Allocate a frame with no parent.
    pub fn root(&mut self) -> ScopeId {
        self.push(None)
    }

    /// Allocate a frame whose lookups continue in `parent`.
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.push(Some(parent))
    }

    fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.frames.len());
        self.frames.push(Frame {
            parent,
            bindings: Vec::new(),
        });
        id
    }

    /// Bind `name` in the innermost frame, replacing any binding the frame
    /// already holds for it.
    pub fn bind(&mut self, scope: ScopeId, name: &str, symbol: Symbol) {
        let frame = &mut self.frames[scope.0];
        if let Some(slot) = frame.bindings.iter_mut().find(|(n, _)| n == name) {
            slot.1 = symbol;
        } else {
            frame.bindings.push((name.to_string(), symbol));
        }
    }

    /// Walk the chain starting at `scope`. Returns the symbol and whether it
    /// was found above the starting frame (i.e. the name is free there).
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<(bool, Symbol)> {
        let mut current = Some(scope);
        let mut free = false;
        while let Some(id) = current {
            let frame = &self.frames[id.0];
            if let Some((_, sym)) = frame.bindings.iter().find(|(n, _)| n == name) {
                return Some((free, sym.clone()));
            }
            free = true;
            current = frame.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nabla_ir::GenSym;

    #[test]
    fn innermost_binding_wins() {
        let gen = GenSym::new();
        let mut scopes = Scopes::new();
        let outer = scopes.root();
        let inner = scopes.child(outer);

        let a = gen.fresh("x");
        let b = gen.fresh("x");
        scopes.bind(outer, "x", a.clone());
        scopes.bind(inner, "x", b.clone());

        assert_eq!(scopes.resolve(inner, "x"), Some((false, b)));
        assert_eq!(scopes.resolve(outer, "x"), Some((false, a)));
    }

    #[test]
    fn parent_hit_is_free() {
        let gen = GenSym::new();
        let mut scopes = Scopes::new();
        let outer = scopes.root();
        let inner = scopes.child(outer);

        let a = gen.fresh("x");
        scopes.bind(outer, "x", a.clone());

        assert_eq!(scopes.resolve(inner, "x"), Some((true, a)));
    }

    #[test]
    fn absent_everywhere_is_none() {
        let mut scopes = Scopes::new();
        let outer = scopes.root();
        let inner = scopes.child(outer);
        assert_eq!(scopes.resolve(inner, "x"), None);
    }

    #[test]
    fn rebinding_replaces_within_a_frame() {
        let gen = GenSym::new();
        let mut scopes = Scopes::new();
        let scope = scopes.root();

        let first = gen.fresh("x");
        let second = gen.fresh("x");
        scopes.bind(scope, "x", first);
        scopes.bind(scope, "x", second.clone());

        assert_eq!(scopes.resolve(scope, "x"), Some((false, second)));
    }
}
