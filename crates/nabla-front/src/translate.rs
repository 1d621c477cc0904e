//! Syntax-directed translation from the host AST to the IR.
//!
//! The translator walks the host AST recursively, eagerly closure-converting
//! every nested scope so the IR stays lexically flat. One translator instance
//! handles one function body; nested bodies (closures, conditional branches,
//! loop functions) get child translators whose scope frames chain to the
//! parent's. All translators of one unit share the definition sink, except
//! the discarding ones used for loop-variable discovery.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use nabla_ast as ast;
use nabla_diagnostics::{Location, Span};
use nabla_ir::{builtins, GenSym, Lambda, Node, Symbol, Value};

use crate::defs::{DefSink, ScratchDefs};
use crate::error::{Result, TranslateError};
use crate::locate::Locator;
use crate::scope::{ScopeId, Scopes};

/// Message carried by translators whose context forbids `return`.
const RETURN_IN_LOOP: &str = "return is not allowed inside a while loop";

/// A macro callback: receives the already-translated argument nodes and
/// returns the replacement node for the whole call.
pub type MacroFn = Rc<dyn Fn(Vec<Node>) -> Node>;

/// Table mapping literal call-target names to macro callbacks.
#[derive(Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroFn>,
}

impl MacroTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro under a call-target name.
    pub fn insert(&mut self, name: impl Into<String>, f: impl Fn(Vec<Node>) -> Node + 'static) {
        self.macros.insert(name.into(), Rc::new(f));
    }

    /// Look up a macro by call-target name.
    pub fn get(&self, name: &str) -> Option<&MacroFn> {
        self.macros.get(name)
    }
}

/// What one statement translates to: either an assignment record that will
/// become a `Let` binding, or a plain expression node. Contiguous assignment
/// runs merge into one `Let`; anything else breaks a run into `Begin`.
enum Chunk {
    Assign {
        sym: Symbol,
        value: Node,
        loc: Option<Location>,
    },
    Expr(Node),
}

/// A translated statement block, grouped by assignment contiguity and not
/// yet folded into a single node. Folding is deferred so conditional and
/// loop bodies can be finished with a context-dependent tail (the
/// "finalizer": a packed assignment result or a recursive call).
struct Block {
    groups: Vec<(bool, Vec<Chunk>)>,
}

fn group_contiguous<T>(items: Vec<T>, pred: impl Fn(&T) -> bool) -> Vec<(bool, Vec<T>)> {
    let mut groups: Vec<(bool, Vec<T>)> = Vec::new();
    for item in items {
        let flag = pred(&item);
        match groups.last_mut() {
            Some((f, group)) if *f == flag => group.push(item),
            _ => groups.push((flag, vec![item])),
        }
    }
    groups
}

/// Fold grouped chunks into one node. When a `finalizer` is given it is the
/// value of the whole block (trailing plain expressions are sequenced before
/// it); without one the block's value is its trailing expression, and a
/// block ending in assignments has no value and is an error.
fn wrap_groups(mut groups: Vec<(bool, Vec<Chunk>)>, finalizer: Option<Node>) -> Result<Node> {
    if groups.is_empty() {
        return finalizer
            .ok_or_else(|| TranslateError::translation("missing return statement", None));
    }
    let rest = groups.split_off(1);
    let (is_assign, group) = groups.pop().expect("groups checked non-empty");

    if is_assign {
        let last_loc = group.last().and_then(|c| match c {
            Chunk::Assign { loc, .. } => *loc,
            Chunk::Expr(node) => node.loc,
        });
        let bindings: Vec<(Symbol, Node)> = group
            .into_iter()
            .map(|c| match c {
                Chunk::Assign { sym, value, .. } => (sym, value),
                Chunk::Expr(_) => unreachable!("assignment group holds only assignments"),
            })
            .collect();
        if rest.is_empty() {
            match finalizer {
                Some(result) => Ok(Node::let_(bindings, result)),
                None => Err(TranslateError::translation(
                    "missing return statement",
                    last_loc,
                )),
            }
        } else {
            Ok(Node::let_(bindings, wrap_groups(rest, finalizer)?))
        }
    } else {
        let mut nodes: Vec<Node> = group
            .into_iter()
            .map(|c| match c {
                Chunk::Expr(node) => node,
                Chunk::Assign { .. } => unreachable!("plain group holds no assignments"),
            })
            .collect();
        if rest.is_empty() {
            if let Some(result) = finalizer {
                nodes.push(result);
            }
            if nodes.len() == 1 {
                Ok(nodes.pop().expect("length checked"))
            } else {
                Ok(Node::begin(nodes))
            }
        } else {
            nodes.push(wrap_groups(rest, finalizer)?);
            Ok(Node::begin(nodes))
        }
    }
}

/// One conditional branch ready to be closed over.
struct Branch {
    translator: Translator,
    block: Block,
    finalizer: Option<Node>,
}

/// The syntax-directed translation engine for one function body.
pub struct Translator {
    locator: Rc<Locator>,
    defs: Rc<dyn DefSink>,
    gen: Rc<GenSym>,
    macros: Rc<MacroTable>,
    scopes: Rc<RefCell<Scopes>>,
    scope: ScopeId,
    /// When set, free variables get fresh local aliases recorded in
    /// `free_variables` (closure-body mode).
    pull_free_variables: bool,
    /// Top-level bodies keep their function labels unmangled and may carry
    /// decorators.
    top_level: bool,
    /// When set, any `return` fails with this message.
    return_error: Option<String>,
    /// Destination symbol of the body being translated; synthetic branch and
    /// loop labels derive from it.
    dest: Symbol,
    /// Free names encountered in this body, in first-encounter order, mapped
    /// to the symbol a capture parameter will be created for.
    free_variables: Vec<(String, Symbol)>,
    /// Names this body assigns, in first-assignment order.
    local_assignments: Vec<String>,
    /// Whether this body has hit a `return`.
    returns: bool,
}

impl Translator {
    /// Create the root translator of a compilation unit.
    pub(crate) fn top_level(
        locator: Rc<Locator>,
        defs: Rc<dyn DefSink>,
        gen: Rc<GenSym>,
        macros: Rc<MacroTable>,
    ) -> Self {
        let scopes = Rc::new(RefCell::new(Scopes::new()));
        let scope = scopes.borrow_mut().root();
        let dest = gen.fresh("#lambda");
        Translator {
            locator,
            defs,
            gen,
            macros,
            scopes,
            scope,
            pull_free_variables: false,
            top_level: true,
            return_error: None,
            dest,
            free_variables: Vec::new(),
            local_assignments: Vec::new(),
            returns: false,
        }
    }

    /// Derive a child translator. Names bound in this translator are free in
    /// the child. `return_error` overrides the inherited one when given.
    fn sub_translator(
        &self,
        dest: Option<Symbol>,
        pull_free_variables: bool,
        return_error: Option<String>,
    ) -> Translator {
        let scope = self.scopes.borrow_mut().child(self.scope);
        let gen = Rc::new(GenSym::new());
        let dest = dest.unwrap_or_else(|| gen.fresh("#lambda"));
        Translator {
            locator: self.locator.clone(),
            defs: self.defs.clone(),
            gen,
            macros: self.macros.clone(),
            scopes: self.scopes.clone(),
            scope,
            pull_free_variables,
            top_level: false,
            return_error: return_error.or_else(|| self.return_error.clone()),
            dest,
            free_variables: Vec::new(),
            local_assignments: Vec::new(),
            returns: false,
        }
    }

    /// Derive a discarding child translator for a discovery pass: same scope
    /// chain, private definition table.
    fn dry_translator(&self, return_error: Option<String>) -> Translator {
        let mut child = self.sub_translator(None, false, return_error);
        child.defs = Rc::new(ScratchDefs::new());
        child
    }

    fn locate(&self, span: Span) -> Option<Location> {
        self.locator.locate(span)
    }

    fn bind(&mut self, name: &str, sym: Symbol) {
        self.scopes.borrow_mut().bind(self.scope, name, sym);
    }

    fn resolve(&self, name: &str) -> Option<(bool, Symbol)> {
        self.scopes.borrow().resolve(self.scope, name)
    }

    /// Strict lookup: the name must be bound somewhere in the chain.
    fn binding(&self, name: &str) -> Result<Symbol> {
        self.resolve(name)
            .map(|(_, sym)| sym)
            .ok_or_else(|| TranslateError::undeclared(name, None))
    }

    /// Allocate a fresh symbol for `name` and bind it in the innermost
    /// frame. The previous binding, if any, is shadowed, never mutated.
    fn new_variable(&mut self, name: &str) -> Symbol {
        let sym = self.gen.fresh(name);
        self.bind(name, sym.clone());
        sym
    }

    fn record_free(&mut self, name: &str, sym: Symbol) {
        if let Some(slot) = self.free_variables.iter_mut().find(|(n, _)| n == name) {
            slot.1 = sym;
        } else {
            self.free_variables.push((name.to_string(), sym));
        }
    }

    fn record_assignment(&mut self, name: &str) {
        if !self.local_assignments.iter().any(|n| n == name) {
            self.local_assignments.push(name.to_string());
        }
    }

    /// Assignment of `value` to `name`: always a brand-new symbol.
    fn make_assign(&mut self, name: &str, value: Node, loc: Option<Location>) -> Chunk {
        let sym = self.new_variable(name);
        self.record_assignment(name);
        Chunk::Assign { sym, value, loc }
    }

    /// Assign a tuple-returning expression to a temporary and unpack each
    /// component into a fresh symbol. The component indexing is proved safe
    /// at translation time, so the generated applies carry the
    /// statically-safe tag.
    fn multi_assign(&mut self, names: &[String], value: Node) -> Vec<Chunk> {
        let tmp = self.gen.fresh("#tmp");
        let mut chunks = vec![Chunk::Assign {
            sym: tmp.clone(),
            value,
            loc: None,
        }];
        for (i, name) in names.iter().enumerate() {
            let component = Node::apply_safe(
                Node::symbol(builtins::index()),
                vec![Node::symbol(tmp.clone()), Node::value(Value::Int(i as i64))],
            );
            chunks.push(self.make_assign(name, component, None));
        }
        chunks
    }

    /// Resolve a name read. Free variables get recorded (and aliased when
    /// pulling); names absent from the whole chain become global references.
    fn translate_variable(&mut self, name: &str, loc: Option<Location>) -> Node {
        match self.resolve(name) {
            Some((free, sym)) => {
                let sym = if free {
                    let sym = if self.pull_free_variables {
                        self.new_variable(name)
                    } else {
                        sym
                    };
                    self.record_free(name, sym.clone());
                    sym
                } else {
                    sym
                };
                Node::symbol(sym).at(loc)
            }
            None => Node::symbol(Symbol::global(name)).at(loc),
        }
    }

    fn register_lambda(
        &self,
        reference: Symbol,
        params: Vec<Symbol>,
        body: Node,
        loc: Option<Location>,
    ) {
        self.defs.define(Lambda {
            reference,
            params,
            body,
            loc,
        });
    }

    // ---- closure conversion ----

    /// Child translator for a closure body, pulling free variables, with the
    /// destination bound to `bind_name` in the child scope so the body can
    /// refer to itself.
    fn prepare_closure(&self, bind_name: Option<&str>, reference: Option<Symbol>) -> Translator {
        let reference =
            reference.unwrap_or_else(|| self.defs.fresh(bind_name.unwrap_or("#lambda")));
        let mut child = self.sub_translator(Some(reference), true, None);
        if let Some(name) = bind_name {
            let dest = child.dest.clone();
            child.bind(name, dest);
        }
        child
    }

    /// Close over a translated child body: the child's free variables become
    /// the leading parameters, their values are resolved in this (parent)
    /// translator, and the lambda is registered at the child's destination.
    /// With no captures the closure collapses to the bare reference.
    fn construct_closure(
        &mut self,
        child: Translator,
        formals: Vec<Symbol>,
        body: Node,
        loc: Option<Location>,
    ) -> Node {
        let mut params: Vec<Symbol> =
            child.free_variables.iter().map(|(_, s)| s.clone()).collect();
        let capture_values: Vec<Node> = child
            .free_variables
            .iter()
            .map(|(name, _)| self.translate_variable(name, None))
            .collect();
        let has_captures = !params.is_empty();
        params.extend(formals);

        let reference = child.dest.clone();
        log::debug!(
            "registering {} ({} params, {} captured)",
            reference,
            params.len(),
            capture_values.len()
        );
        self.register_lambda(reference.clone(), params, body, loc);

        if has_captures {
            Node::closure(reference, capture_values).at(loc)
        } else {
            Node::symbol(reference).at(loc)
        }
    }

    /// Build a closure for a function definition or lambda expression.
    fn make_closure(
        &mut self,
        args: &[ast::Arg],
        body: FnBody<'_>,
        loc: Option<Location>,
        bind_name: Option<&str>,
        reference: Option<Symbol>,
    ) -> Result<Node> {
        let mut child = self.prepare_closure(bind_name, reference);
        let formals: Vec<Symbol> = args.iter().map(|a| child.new_variable(&a.name)).collect();
        let body_node = match body {
            FnBody::Stmts(stmts) => child.translate_body(stmts)?,
            FnBody::Expr(expr) => child.translate_expr(expr)?,
        };
        Ok(self.construct_closure(child, formals, body_node, loc))
    }

    // ---- statements ----

    /// Translate a statement block, checking for dead code after `return`.
    fn translate_block(&mut self, stmts: &[ast::Stmt]) -> Result<Block> {
        let mut chunks = Vec::new();
        for stmt in stmts {
            if self.returns {
                return Err(TranslateError::translation(
                    "there should be no statements after return",
                    self.locate(stmt.span()),
                ));
            }
            chunks.extend(self.translate_stmt(stmt, false)?);
        }
        Ok(Block {
            groups: group_contiguous(chunks, |c| matches!(c, Chunk::Assign { .. })),
        })
    }

    /// Translate a closure body to its value node.
    fn translate_body(&mut self, stmts: &[ast::Stmt]) -> Result<Node> {
        let block = self.translate_block(stmts)?;
        wrap_groups(block.groups, None)
    }

    fn translate_stmt(&mut self, stmt: &ast::Stmt, allow_decorator: bool) -> Result<Vec<Chunk>> {
        let loc = self.locate(stmt.span());
        match stmt {
            ast::Stmt::FunctionDef {
                name,
                params,
                body,
                decorators,
                ..
            } => self
                .translate_function_def(name, params, body, decorators, loc, allow_decorator)
                .map(|c| vec![c]),
            ast::Stmt::Return { value, .. } => {
                if let Some(message) = &self.return_error {
                    return Err(TranslateError::translation(message.clone(), loc));
                }
                self.returns = true;
                let node = match value {
                    Some(expr) => self.translate_expr(expr)?,
                    None => Node::value(Value::None),
                }
                .at(loc);
                Ok(vec![Chunk::Expr(node)])
            }
            ast::Stmt::Assign { target, value, .. } => self.translate_assign(target, value, loc),
            ast::Stmt::AugAssign {
                target, op, value, ..
            } => self.translate_aug_assign(target, *op, value, loc),
            ast::Stmt::If {
                test, body, orelse, ..
            } => self.translate_if(test, body, orelse, loc),
            ast::Stmt::While { test, body, .. } => self.translate_while(test, body, loc),
            ast::Stmt::Expr { value, .. } => {
                Ok(vec![Chunk::Expr(self.translate_expr(value)?)])
            }
            ast::Stmt::For { .. }
            | ast::Stmt::Break { .. }
            | ast::Stmt::Continue { .. }
            | ast::Stmt::Try { .. }
            | ast::Stmt::Raise { .. }
            | ast::Stmt::Pass { .. } => Err(TranslateError::translation(
                format!("unsupported construct: {}", stmt.kind_name()),
                loc,
            )),
        }
    }

    fn translate_function_def(
        &mut self,
        name: &str,
        params: &ast::Params,
        body: &[ast::Stmt],
        decorators: &[ast::Expr],
        loc: Option<Location>,
        allow_decorator: bool,
    ) -> Result<Chunk> {
        check_params(params, loc)?;
        if !allow_decorator && !decorators.is_empty() {
            return Err(TranslateError::translation(
                "functions should not have decorators",
                loc,
            ));
        }

        let label = if self.top_level {
            name.to_string()
        } else {
            format!("#:{}", name)
        };
        let reference = self.defs.fresh(&label);
        let sym = self.new_variable(name);
        let closure = self.make_closure(
            &params.args,
            FnBody::Stmts(body),
            loc,
            Some(name),
            Some(reference),
        )?;
        Ok(Chunk::Assign {
            sym,
            value: closure,
            loc,
        })
    }

    fn translate_assign(
        &mut self,
        target: &ast::Target,
        value: &ast::Expr,
        loc: Option<Location>,
    ) -> Result<Vec<Chunk>> {
        match target {
            ast::Target::Tuple { .. } => Err(TranslateError::translation(
                "destructuring assignment is not supported",
                loc,
            )),
            ast::Target::Subscript {
                value: base, index, ..
            } => {
                let base_name = match base.as_ref() {
                    ast::Expr::Name { id, .. } => id.clone(),
                    _ => {
                        return Err(TranslateError::translation(
                            "a slice can only be set on a variable",
                            loc,
                        ))
                    }
                };
                let val = self.translate_expr(value)?;
                let obj = self.translate_expr(base)?;
                let idx = self.translate_index(index)?;
                let updated = Node::apply(
                    Node::symbol(builtins::setslice()),
                    vec![obj, idx, val],
                )
                .at(loc);
                Ok(vec![self.make_assign(&base_name, updated, loc)])
            }
            ast::Target::Name { id, .. } => {
                let val = self.translate_expr(value)?;
                Ok(vec![self.make_assign(id, val, loc)])
            }
            ast::Target::Attribute { .. } => Err(TranslateError::translation(
                "unsupported assignment target: attribute",
                loc,
            )),
        }
    }

    fn translate_aug_assign(
        &mut self,
        target: &ast::Target,
        op: ast::BinaryOp,
        value: &ast::Expr,
        loc: Option<Location>,
    ) -> Result<Vec<Chunk>> {
        let name = match target {
            ast::Target::Name { id, .. } => id.clone(),
            _ => {
                return Err(TranslateError::translation(
                    "augmented assignment target must be a variable",
                    loc,
                ))
            }
        };
        let aug = self.translate_expr(value)?;
        // resolve first so free-variable pulling applies before the read
        self.translate_variable(&name, loc);
        let prev = self.binding(&name).map_err(|e| e.at(loc))?;
        let val = Node::apply(
            Node::symbol(binary_operator(op)).at(loc),
            vec![Node::symbol(prev), aug],
        )
        .at(loc);
        Ok(vec![self.make_assign(&name, val, loc)])
    }

    // ---- conditionals ----

    fn translate_if(
        &mut self,
        test: &ast::Expr,
        body: &[ast::Stmt],
        orelse: &[ast::Stmt],
        loc: Option<Location>,
    ) -> Result<Vec<Chunk>> {
        let then_ref = self.defs.derive(&self.dest, "then");
        let mut p1 = self.prepare_closure(None, Some(then_ref));
        let then_block = p1.translate_block(body)?;

        let else_ref = self.defs.derive(&self.dest, "else");
        let mut p2 = self.prepare_closure(None, Some(else_ref));
        let else_block = p2.translate_block(orelse)?;

        if p1.returns != p2.returns {
            return Err(TranslateError::translation(
                "either none or all branches of an if statement must return a value",
                loc,
            ));
        }
        let then_set: BTreeSet<&str> = p1.local_assignments.iter().map(String::as_str).collect();
        let else_set: BTreeSet<&str> = p2.local_assignments.iter().map(String::as_str).collect();
        if then_set != else_set {
            let join = |set: &BTreeSet<&str>| set.iter().copied().collect::<Vec<_>>().join(" ");
            return Err(TranslateError::translation(
                format!(
                    "all branches of an if statement must assign to the same set of variables \
                     (true branch sets: {}; else branch sets: {})",
                    join(&then_set),
                    join(&else_set)
                ),
                loc,
            ));
        }

        let branches_return = p1.returns;
        // pack order for multi-name merges: first-assignment order of the
        // first-visited (true) branch, applied to both branches
        let assigned = p1.local_assignments.clone();

        if branches_return {
            let app = self.build_switch(
                test,
                Branch {
                    translator: p1,
                    block: then_block,
                    finalizer: None,
                },
                Branch {
                    translator: p2,
                    block: else_block,
                    finalizer: None,
                },
                loc,
            )?;
            self.returns = true;
            Ok(vec![Chunk::Expr(app)])
        } else if assigned.is_empty() {
            let app = self.build_switch(
                test,
                Branch {
                    translator: p1,
                    block: then_block,
                    finalizer: Some(Node::tuple(vec![])),
                },
                Branch {
                    translator: p2,
                    block: else_block,
                    finalizer: Some(Node::tuple(vec![])),
                },
                loc,
            )?;
            let tmp = self.gen.fresh("#tmp");
            Ok(vec![Chunk::Assign {
                sym: tmp,
                value: app,
                loc: None,
            }])
        } else if assigned.len() == 1 {
            let name = &assigned[0];
            let then_fin = Node::symbol(p1.binding(name)?);
            let else_fin = Node::symbol(p2.binding(name)?);
            let app = self.build_switch(
                test,
                Branch {
                    translator: p1,
                    block: then_block,
                    finalizer: Some(then_fin),
                },
                Branch {
                    translator: p2,
                    block: else_block,
                    finalizer: Some(else_fin),
                },
                loc,
            )?;
            Ok(vec![self.make_assign(name, app, None)])
        } else {
            let pack = |p: &Translator| -> Result<Node> {
                let parts: Vec<Node> = assigned
                    .iter()
                    .map(|n| p.binding(n).map(Node::symbol))
                    .collect::<Result<_>>()?;
                Ok(Node::tuple(parts))
            };
            let then_fin = pack(&p1)?;
            let else_fin = pack(&p2)?;
            let app = self.build_switch(
                test,
                Branch {
                    translator: p1,
                    block: then_block,
                    finalizer: Some(then_fin),
                },
                Branch {
                    translator: p2,
                    block: else_block,
                    finalizer: Some(else_fin),
                },
                loc,
            )?;
            Ok(self.multi_assign(&assigned, app))
        }
    }

    /// Close both branches over their finished bodies, then build the
    /// selection: the `switch` apply picks a branch closure and the outer
    /// zero-argument apply invokes it.
    fn build_switch(
        &mut self,
        test: &ast::Expr,
        then_branch: Branch,
        else_branch: Branch,
        loc: Option<Location>,
    ) -> Result<Node> {
        let then_body = wrap_groups(then_branch.block.groups, then_branch.finalizer)?;
        let then_loc = then_body.loc.or(loc);
        let then_fn = self.construct_closure(then_branch.translator, vec![], then_body, then_loc);

        let else_body = wrap_groups(else_branch.block.groups, else_branch.finalizer)?;
        let else_loc = else_body.loc.or(loc);
        let else_fn = self.construct_closure(else_branch.translator, vec![], else_body, else_loc);

        let test_node = self.translate_expr(test)?;
        let select = Node::apply(
            Node::symbol(builtins::switch()),
            vec![test_node, then_fn, else_fn],
        )
        .at(loc);
        Ok(Node::apply(select, vec![]).at(loc))
    }

    // ---- loops ----

    /// Dry discovery pass over a loop's test and body: computes the names
    /// that must be threaded through the recursion (`in_vars`: read before
    /// local assignment, union everything assigned) and the names the loop
    /// produces (`out_vars`: everything assigned). Runs on a discarding
    /// translator, so the shared table is untouched.
    fn explore_loop_vars(
        &self,
        test: &ast::Expr,
        body: &[ast::Stmt],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut probe = self.dry_translator(Some(RETURN_IN_LOOP.to_string()));
        probe.translate_expr(test)?;
        probe.translate_block(body)?;

        let mut in_vars: Vec<String> =
            probe.free_variables.iter().map(|(n, _)| n.clone()).collect();
        for name in &probe.local_assignments {
            if !in_vars.contains(name) {
                in_vars.push(name.clone());
            }
        }
        Ok((in_vars, probe.local_assignments))
    }

    /// Lower a `while` loop into two mutually referential functions: the
    /// loop function tests the condition and either calls the continue
    /// function (one more iteration) or returns the tuple of pre-loop
    /// `out_var` values unchanged.
    fn translate_while(
        &mut self,
        test: &ast::Expr,
        body: &[ast::Stmt],
        loc: Option<Location>,
    ) -> Result<Vec<Chunk>> {
        let loop_ref = self.defs.derive(&self.dest, "loop");
        let continue_ref = self.defs.derive(&self.dest, "body");

        let (in_vars, out_vars) = self.explore_loop_vars(test, body)?;
        log::debug!(
            "loop {}: in [{}] out [{}]",
            loop_ref,
            in_vars.join(" "),
            out_vars.join(" ")
        );

        // resolve each threaded name here first, so it registers as free
        // (and gets captured) through any enclosing closure chain
        for name in &in_vars {
            self.translate_variable(name, None);
        }

        let mut p = self.sub_translator(
            Some(loop_ref.clone()),
            false,
            Some(RETURN_IN_LOOP.to_string()),
        );
        let in_syms: Vec<Symbol> = in_vars.iter().map(|v| p.new_variable(v)).collect();
        // snapshot before the body shadows them: the zero-iteration result
        let initial_values: Vec<Symbol> = out_vars
            .iter()
            .map(|v| p.binding(v))
            .collect::<Result<_>>()?;
        let test_node = p.translate_expr(test)?;
        let body_block = p.translate_block(body)?;

        // continue function: translated body ending in the recursive call
        // with the current (possibly re-bound) value of every threaded name
        let rec_args: Vec<Node> = in_vars
            .iter()
            .map(|v| p.binding(v).map(Node::symbol))
            .collect::<Result<_>>()?;
        let rec_call = Node::apply(Node::symbol(loop_ref.clone()), rec_args).at(loc);
        let continue_body = wrap_groups(body_block.groups, Some(rec_call))?.at(loc);
        let continue_loc = continue_body.loc;
        self.register_lambda(
            continue_ref.clone(),
            in_syms.clone(),
            continue_body,
            continue_loc,
        );

        let select = Node::apply(
            Node::symbol(builtins::switch()),
            vec![
                test_node,
                Node::closure(
                    continue_ref,
                    in_syms.iter().cloned().map(Node::symbol).collect(),
                ),
                Node::closure(
                    builtins::identity(),
                    vec![Node::tuple(
                        initial_values.into_iter().map(Node::symbol).collect(),
                    )],
                ),
            ],
        );
        let loop_body = Node::apply(select, vec![]);
        self.register_lambda(loop_ref.clone(), in_syms, loop_body, loc);

        let call_args: Vec<Node> = in_vars
            .iter()
            .map(|v| self.binding(v).map(|s| Node::symbol(s)))
            .collect::<Result<_>>()?;
        let value = Node::apply(Node::symbol(loop_ref), call_args).at(loc);
        Ok(self.multi_assign(&out_vars, value))
    }

    // ---- expressions ----

    fn translate_expr(&mut self, expr: &ast::Expr) -> Result<Node> {
        let loc = self.locate(expr.span());
        match expr {
            ast::Expr::Name { id, .. } => Ok(self.translate_variable(id, loc)),
            ast::Expr::Literal { value, .. } => Ok(Node::value(literal_value(value)).at(loc)),
            ast::Expr::Tuple { elts, .. } => {
                let parts: Vec<Node> = elts
                    .iter()
                    .map(|e| self.translate_expr(e))
                    .collect::<Result<_>>()?;
                Ok(Node::tuple(parts).at(loc))
            }
            ast::Expr::BinOp {
                left, op, right, ..
            } => {
                let l = self.translate_expr(left)?;
                let r = self.translate_expr(right)?;
                Ok(Node::apply(
                    Node::symbol(binary_operator(*op)).at(loc),
                    vec![l, r],
                )
                .at(loc))
            }
            ast::Expr::UnaryOp { op, operand, .. } => {
                let operand = self.translate_expr(operand)?;
                Ok(Node::apply(
                    Node::symbol(unary_operator(*op)).at(loc),
                    vec![operand],
                )
                .at(loc))
            }
            ast::Expr::Compare {
                left,
                ops,
                comparators,
                ..
            } => {
                if ops.len() != 1 || comparators.len() != 1 {
                    return Err(TranslateError::translation(
                        "comparisons must have a maximum of two operands",
                        loc,
                    ));
                }
                let op = compare_operator(ops[0]).ok_or_else(|| {
                    TranslateError::translation("unsupported comparison operator", loc)
                })?;
                let l = self.translate_expr(left)?;
                let r = self.translate_expr(&comparators[0])?;
                Ok(Node::apply(Node::symbol(op), vec![l, r]).at(loc))
            }
            ast::Expr::Call {
                func,
                args,
                keywords,
                ..
            } => {
                if !keywords.is_empty() {
                    return Err(TranslateError::translation(
                        "keyword arguments are not allowed",
                        loc,
                    ));
                }
                let arg_nodes: Vec<Node> = args
                    .iter()
                    .map(|a| self.translate_expr(a))
                    .collect::<Result<_>>()?;
                if let ast::Expr::Name { id, .. } = func.as_ref() {
                    if let Some(expand) = self.macros.get(id) {
                        let expand = expand.clone();
                        return Ok(expand(arg_nodes));
                    }
                }
                let f = self.translate_expr(func)?;
                Ok(Node::apply(f, arg_nodes).at(loc))
            }
            ast::Expr::Attribute { value, attr, .. } => {
                let obj = self.translate_expr(value)?;
                Ok(Node::apply(
                    Node::symbol(builtins::getattr()).at(loc),
                    vec![obj, Node::value(Value::Str(attr.clone())).at(loc)],
                )
                .at(loc))
            }
            ast::Expr::Subscript { value, index, .. } => {
                let obj = self.translate_expr(value)?;
                let idx = self.translate_index(index)?;
                Ok(Node::apply(Node::symbol(builtins::index()), vec![obj, idx]).at(loc))
            }
            ast::Expr::Lambda { params, body, .. } => {
                check_params(params, loc)?;
                self.make_closure(&params.args, FnBody::Expr(body), loc, None, None)
            }
            ast::Expr::List { .. }
            | ast::Expr::BoolOp { .. }
            | ast::Expr::IfExp { .. }
            | ast::Expr::ListComp { .. }
            | ast::Expr::Yield { .. } => Err(TranslateError::translation(
                format!("unsupported construct: {}", expr.kind_name()),
                loc,
            )),
        }
    }

    /// Translate a subscript index. Omitted slice bounds default to start 0,
    /// open stop, step 1.
    fn translate_index(&mut self, index: &ast::Index) -> Result<Node> {
        match index {
            ast::Index::Expr(expr) => self.translate_expr(expr),
            ast::Index::Slice {
                lower,
                upper,
                step,
                span,
            } => {
                let loc = self.locate(*span);
                let lower = self.bound_or(lower.as_deref(), Value::Int(0))?;
                let upper = self.bound_or(upper.as_deref(), Value::None)?;
                let step = self.bound_or(step.as_deref(), Value::Int(1))?;
                Ok(Node::apply(
                    Node::symbol(builtins::slice()),
                    vec![lower, upper, step],
                )
                .at(loc))
            }
            ast::Index::Tuple { elts, span } => {
                let parts: Vec<Node> = elts
                    .iter()
                    .map(|i| self.translate_index(i))
                    .collect::<Result<_>>()?;
                Ok(Node::tuple(parts).at(self.locate(*span)))
            }
        }
    }

    fn bound_or(&mut self, bound: Option<&ast::Expr>, default: Value) -> Result<Node> {
        match bound {
            Some(expr) => self.translate_expr(expr),
            None => Ok(Node::value(default)),
        }
    }

    // ---- entry ----

    /// Translate a whole unit: exactly one top-level function definition,
    /// which may carry decorators. Returns the entry-point symbol.
    pub(crate) fn translate_module(&mut self, module: &ast::Module) -> Result<Symbol> {
        let mut chunks = Vec::new();
        for stmt in &module.body {
            chunks.extend(self.translate_stmt(stmt, true)?);
        }
        let shape_error = || {
            TranslateError::translation(
                "translation unit must contain exactly one top-level function definition",
                self.locate(module.span),
            )
        };
        if chunks.len() != 1 {
            return Err(shape_error());
        }
        match chunks.pop().expect("length checked") {
            Chunk::Assign { value, .. } => {
                value.as_symbol().cloned().ok_or_else(shape_error)
            }
            Chunk::Expr(_) => Err(shape_error()),
        }
    }
}

/// A closure body: statement list (function definition) or single
/// expression (lambda).
enum FnBody<'a> {
    Stmts(&'a [ast::Stmt]),
    Expr(&'a ast::Expr),
}

fn check_params(params: &ast::Params, loc: Option<Location>) -> Result<()> {
    if params.vararg.is_some() || params.kwarg.is_some() {
        return Err(TranslateError::translation("varargs are not allowed", loc));
    }
    if !params.kwonly.is_empty() {
        return Err(TranslateError::translation(
            "keyword-only arguments are not allowed",
            loc,
        ));
    }
    if !params.defaults.is_empty() {
        return Err(TranslateError::translation(
            "default arguments are not allowed",
            loc,
        ));
    }
    Ok(())
}

fn literal_value(value: &ast::LiteralValue) -> Value {
    match value {
        ast::LiteralValue::None => Value::None,
        ast::LiteralValue::Bool(b) => Value::Bool(*b),
        ast::LiteralValue::Int(i) => Value::Int(*i),
        ast::LiteralValue::Float(x) => Value::Float(*x),
        ast::LiteralValue::Str(s) => Value::Str(s.clone()),
    }
}

fn binary_operator(op: ast::BinaryOp) -> Symbol {
    match op {
        ast::BinaryOp::Add => builtins::add(),
        ast::BinaryOp::Sub => builtins::sub(),
        ast::BinaryOp::Mult => builtins::mul(),
        ast::BinaryOp::Div => builtins::div(),
        ast::BinaryOp::FloorDiv => builtins::floordiv(),
        ast::BinaryOp::Mod => builtins::modulo(),
        ast::BinaryOp::Pow => builtins::pow(),
    }
}

fn unary_operator(op: ast::UnaryOp) -> Symbol {
    match op {
        ast::UnaryOp::UAdd => builtins::pos(),
        ast::UnaryOp::USub => builtins::neg(),
        ast::UnaryOp::Not => builtins::not_(),
        ast::UnaryOp::Invert => builtins::invert(),
    }
}

fn compare_operator(op: ast::CompareOp) -> Option<Symbol> {
    match op {
        ast::CompareOp::Eq => Some(builtins::eq()),
        ast::CompareOp::NotEq => Some(builtins::ne()),
        ast::CompareOp::Lt => Some(builtins::lt()),
        ast::CompareOp::LtE => Some(builtins::le()),
        ast::CompareOp::Gt => Some(builtins::gt()),
        ast::CompareOp::GtE => Some(builtins::ge()),
        ast::CompareOp::Is
        | ast::CompareOp::IsNot
        | ast::CompareOp::In
        | ast::CompareOp::NotIn => None,
    }
}
