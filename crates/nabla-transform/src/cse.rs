//! Common subexpression elimination.
//!
//! The IR is pure, so two structurally identical let-bound values inside one
//! lambda always compute the same thing. Later duplicates are dropped and
//! every use is redirected to the first representative. Deduplication never
//! crosses lambda boundaries, and a binding is only reused while it is in
//! scope (within the body of the `Let` that introduced it).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use nabla_ir::{Namespace, Node, NodeKind, Lambda, ParseEnv, Symbol};

/// Apply CSE to every definition in the table. Returns whether anything
/// changed.
pub fn cse_env(env: &mut ParseEnv) -> bool {
    let mut changed = false;
    for (_, lambda) in env.iter_mut() {
        changed |= cse_lambda(lambda);
    }
    changed
}

/// Apply CSE to one lambda body. Returns whether anything changed.
pub fn cse_lambda(lambda: &mut Lambda) -> bool {
    let mut pass = Pass::default();
    let body = std::mem::replace(&mut lambda.body, Node::tuple(vec![]));
    lambda.body = pass.rewrite(body);
    if pass.changed {
        log::debug!("cse: rewrote {}", lambda.reference);
    }
    pass.changed
}

#[derive(Default)]
struct Pass {
    /// In-scope representatives: structural key, the value it stands for
    /// (kept to rule out hash collisions), and the bound symbol.
    seen: Vec<(u64, Node, Symbol)>,
    /// Dropped symbol -> representative symbol
    subst: HashMap<Symbol, Symbol>,
    changed: bool,
}

impl Pass {
    fn rewrite(&mut self, node: Node) -> Node {
        let loc = node.loc;
        let kind = match node.kind {
            NodeKind::Symbol(sym) => NodeKind::Symbol(self.resolve(sym)),
            NodeKind::Value(v) => NodeKind::Value(v),
            NodeKind::Tuple(elts) => {
                NodeKind::Tuple(elts.into_iter().map(|e| self.rewrite(e)).collect())
            }
            NodeKind::Apply {
                func,
                args,
                cannot_fail,
            } => NodeKind::Apply {
                func: Box::new(self.rewrite(*func)),
                args: args.into_iter().map(|a| self.rewrite(a)).collect(),
                cannot_fail,
            },
            NodeKind::Begin(stmts) => {
                NodeKind::Begin(stmts.into_iter().map(|s| self.rewrite(s)).collect())
            }
            NodeKind::Closure { func, captures } => NodeKind::Closure {
                func,
                captures: captures.into_iter().map(|c| self.rewrite(c)).collect(),
            },
            NodeKind::Let { bindings, body } => {
                let mark = self.seen.len();
                let mut kept: Vec<(Symbol, Node)> = Vec::new();
                for (sym, value) in bindings {
                    let value = self.rewrite(value);
                    let key = node_key(&value);
                    match self
                        .seen
                        .iter()
                        .find(|(k, v, _)| *k == key && node_eq(v, &value))
                    {
                        Some((_, _, representative)) => {
                            self.subst.insert(sym, representative.clone());
                            self.changed = true;
                        }
                        None => {
                            self.seen.push((key, value.clone(), sym.clone()));
                            kept.push((sym, value));
                        }
                    }
                }
                let body = self.rewrite(*body);
                self.seen.truncate(mark);
                if kept.is_empty() {
                    return body.at(loc);
                }
                NodeKind::Let {
                    bindings: kept,
                    body: Box::new(body),
                }
            }
        };
        Node { kind, loc }
    }

    fn resolve(&self, sym: Symbol) -> Symbol {
        let mut current = sym;
        while let Some(next) = self.subst.get(&current) {
            current = next.clone();
        }
        current
    }
}

/// Structural hash of a node, ignoring source locations.
fn node_key(node: &Node) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_node(node, &mut hasher);
    hasher.finish()
}

fn hash_node(node: &Node, hasher: &mut DefaultHasher) {
    match &node.kind {
        NodeKind::Symbol(sym) => {
            0u8.hash(hasher);
            hash_symbol(sym, hasher);
        }
        NodeKind::Value(v) => {
            1u8.hash(hasher);
            match v {
                nabla_ir::Value::None => 0u8.hash(hasher),
                nabla_ir::Value::Bool(b) => (1u8, b).hash(hasher),
                nabla_ir::Value::Int(i) => (2u8, i).hash(hasher),
                nabla_ir::Value::Float(x) => (3u8, x.to_bits()).hash(hasher),
                nabla_ir::Value::Str(s) => (4u8, s).hash(hasher),
            }
        }
        NodeKind::Tuple(elts) => {
            2u8.hash(hasher);
            elts.len().hash(hasher);
            for e in elts {
                hash_node(e, hasher);
            }
        }
        NodeKind::Apply {
            func,
            args,
            cannot_fail,
        } => {
            3u8.hash(hasher);
            cannot_fail.hash(hasher);
            hash_node(func, hasher);
            args.len().hash(hasher);
            for a in args {
                hash_node(a, hasher);
            }
        }
        NodeKind::Let { bindings, body } => {
            4u8.hash(hasher);
            bindings.len().hash(hasher);
            for (sym, value) in bindings {
                hash_symbol(sym, hasher);
                hash_node(value, hasher);
            }
            hash_node(body, hasher);
        }
        NodeKind::Begin(stmts) => {
            5u8.hash(hasher);
            stmts.len().hash(hasher);
            for s in stmts {
                hash_node(s, hasher);
            }
        }
        NodeKind::Closure { func, captures } => {
            6u8.hash(hasher);
            hash_symbol(func, hasher);
            captures.len().hash(hasher);
            for c in captures {
                hash_node(c, hasher);
            }
        }
    }
}

fn hash_symbol(sym: &Symbol, hasher: &mut DefaultHasher) {
    sym.name.hash(hasher);
    sym.version.hash(hasher);
    match sym.namespace {
        Namespace::Global => 0u32.hash(hasher),
        Namespace::Gen(id) => (1u32, id).hash(hasher),
    }
}

/// Structural equality ignoring source locations.
fn node_eq(a: &Node, b: &Node) -> bool {
    match (&a.kind, &b.kind) {
        (NodeKind::Symbol(x), NodeKind::Symbol(y)) => x == y,
        (NodeKind::Value(x), NodeKind::Value(y)) => x == y,
        (NodeKind::Tuple(xs), NodeKind::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| node_eq(x, y))
        }
        (
            NodeKind::Apply {
                func: fa,
                args: aa,
                cannot_fail: ca,
            },
            NodeKind::Apply {
                func: fb,
                args: ab,
                cannot_fail: cb,
            },
        ) => {
            ca == cb
                && node_eq(fa, fb)
                && aa.len() == ab.len()
                && aa.iter().zip(ab).all(|(x, y)| node_eq(x, y))
        }
        (
            NodeKind::Let {
                bindings: ba,
                body: xa,
            },
            NodeKind::Let {
                bindings: bb,
                body: xb,
            },
        ) => {
            ba.len() == bb.len()
                && ba
                    .iter()
                    .zip(bb)
                    .all(|((sa, va), (sb, vb))| sa == sb && node_eq(va, vb))
                && node_eq(xa, xb)
        }
        (NodeKind::Begin(xs), NodeKind::Begin(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| node_eq(x, y))
        }
        (
            NodeKind::Closure {
                func: fa,
                captures: ca,
            },
            NodeKind::Closure {
                func: fb,
                captures: cb,
            },
        ) => {
            fa == fb && ca.len() == cb.len() && ca.iter().zip(cb).all(|(x, y)| node_eq(x, y))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nabla_ir::{builtins, GenSym, Value};

    fn apply_add(a: &Symbol, b: &Symbol) -> Node {
        Node::apply(
            Node::symbol(builtins::add()),
            vec![Node::symbol(a.clone()), Node::symbol(b.clone())],
        )
    }

    fn lambda_with_body(gen: &GenSym, body: Node) -> Lambda {
        let reference = gen.fresh("f");
        Lambda {
            reference,
            params: vec![],
            body,
            loc: None,
        }
    }

    #[test]
    fn duplicate_bindings_collapse_to_one() {
        let gen = GenSym::new();
        let a = gen.fresh("a");
        let b = gen.fresh("b");
        let x = gen.fresh("x");
        let y = gen.fresh("y");
        let z = gen.fresh("z");

        // x = a + b; y = a + b; z = y + 1 -> y drops, z reads x
        let body = Node::let_(
            vec![
                (x.clone(), apply_add(&a, &b)),
                (y.clone(), apply_add(&a, &b)),
                (
                    z.clone(),
                    Node::apply(
                        Node::symbol(builtins::add()),
                        vec![Node::symbol(y.clone()), Node::value(Value::Int(1))],
                    ),
                ),
            ],
            Node::symbol(z.clone()),
        );
        let mut lambda = lambda_with_body(&gen, body);

        assert!(cse_lambda(&mut lambda));
        match &lambda.body.kind {
            NodeKind::Let { bindings, .. } => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].0, x);
                assert_eq!(bindings[1].0, z);
                match &bindings[1].1.kind {
                    NodeKind::Apply { args, .. } => {
                        assert_eq!(args[0].kind, NodeKind::Symbol(x.clone()));
                    }
                    other => panic!("expected apply, got {:?}", other),
                }
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn out_of_scope_bindings_are_not_reused() {
        let gen = GenSym::new();
        let a = gen.fresh("a");
        let b = gen.fresh("b");
        let x = gen.fresh("x");
        let y = gen.fresh("y");

        // begin (let ((x (add a b))) x) (let ((y (add a b))) y): the first
        // binding is out of scope in the second let, so nothing merges
        let body = Node::begin(vec![
            Node::let_(vec![(x.clone(), apply_add(&a, &b))], Node::symbol(x)),
            Node::let_(vec![(y.clone(), apply_add(&a, &b))], Node::symbol(y)),
        ]);
        let mut lambda = lambda_with_body(&gen, body);

        assert!(!cse_lambda(&mut lambda));
    }

    #[test]
    fn definitions_never_merge_across_lambdas() {
        let gen = GenSym::new();
        let a = gen.fresh("a");
        let b = gen.fresh("b");
        let mut env = ParseEnv::new("unit");

        for _ in 0..2 {
            let x = gen.fresh("x");
            let reference = env.gen.fresh("f");
            env.define(
                reference.clone(),
                Lambda {
                    reference,
                    params: vec![a.clone(), b.clone()],
                    body: Node::let_(
                        vec![(x.clone(), apply_add(&a, &b))],
                        Node::symbol(x),
                    ),
                    loc: None,
                },
            );
        }

        // each lambda keeps its own binding
        assert!(!cse_env(&mut env));
        for (_, lambda) in env.iter() {
            match &lambda.body.kind {
                NodeKind::Let { bindings, .. } => assert_eq!(bindings.len(), 1),
                other => panic!("expected let, got {:?}", other),
            }
        }
    }

    #[test]
    fn constant_bindings_deduplicate() {
        let gen = GenSym::new();
        let x = gen.fresh("x");
        let y = gen.fresh("y");

        let body = Node::let_(
            vec![
                (x.clone(), Node::value(Value::Int(42))),
                (y.clone(), Node::value(Value::Int(42))),
            ],
            Node::tuple(vec![Node::symbol(x.clone()), Node::symbol(y)]),
        );
        let mut lambda = lambda_with_body(&gen, body);

        assert!(cse_lambda(&mut lambda));
        match &lambda.body.kind {
            NodeKind::Let { bindings, body } => {
                assert_eq!(bindings.len(), 1);
                match &body.kind {
                    NodeKind::Tuple(elts) => {
                        assert_eq!(elts[0].kind, NodeKind::Symbol(x.clone()));
                        assert_eq!(elts[1].kind, NodeKind::Symbol(x));
                    }
                    other => panic!("expected tuple, got {:?}", other),
                }
            }
            other => panic!("expected let, got {:?}", other),
        }
    }
}
