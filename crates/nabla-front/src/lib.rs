//! Front-end translator from the host AST to the nabla IR.
//!
//! The entry points take a parsed host module together with its source text
//! (for diagnostics only) and produce the unit's entry-point symbol plus the
//! table of every top-level function definition the translation created —
//! the sole artifact handed to downstream inference and compilation stages.

pub mod defs;
pub mod error;
pub mod locate;
pub mod scope;
pub mod translate;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use nabla_ast as ast;
use nabla_diagnostics::{DiagnosticEmitter, SourceCache, TerminalEmitter};
use nabla_ir::{GenSym, Node, ParseEnv, Symbol, Value};

pub use defs::{DefSink, ScratchDefs, SharedDefs};
pub use error::{Result, TranslateError};
pub use locate::Locator;
pub use translate::{MacroFn, MacroTable, Translator};

/// Optional knobs for a translation run.
#[derive(Default)]
pub struct TranslateOptions {
    /// Macros consulted for literal call-target names
    pub macros: MacroTable,
    /// Reusable symbol generator for the root translator
    pub gen: Option<Rc<GenSym>>,
}

/// Translate one unit.
///
/// `source` is the host source text the module was parsed from; it is cached
/// for diagnostics only. `start_line` is the line of `path` at which the
/// excerpt starts. Returns the entry-point symbol and the shared definition
/// table, populated with every function the translation registered.
pub fn translate_source(
    cache: &mut SourceCache,
    path: &str,
    start_line: u32,
    source: &str,
    module: &ast::Module,
    options: TranslateOptions,
) -> Result<(Symbol, Rc<RefCell<ParseEnv>>)> {
    let file_id = cache.add_file(path, source.to_string(), start_line);
    let locator = Rc::new(Locator::new(file_id, source, start_line));
    let env = Rc::new(RefCell::new(ParseEnv::new(path)));
    let sink: Rc<dyn DefSink> = Rc::new(SharedDefs::new(env.clone()));
    let gen = options.gen.unwrap_or_else(|| Rc::new(GenSym::new()));

    let mut translator = Translator::top_level(locator, sink, gen, Rc::new(options.macros));
    let entry = translator.translate_module(module)?;
    Ok((entry, env))
}

/// The sentinel a translated function is registered as.
///
/// The host-visible function is replaced by this value: direct invocation is
/// rejected, and the compiled IR, the definition table, and the originating
/// namespace are exposed as inspectable metadata for later pipeline stages.
#[derive(Debug)]
pub struct CompiledFunction {
    /// Display name of the entry point
    pub name: String,
    /// Entry-point symbol into the definition table
    pub entry: Symbol,
    /// Every definition of the unit
    pub env: Rc<RefCell<ParseEnv>>,
    /// Namespace the unit was translated under
    pub namespace: String,
}

impl CompiledFunction {
    /// Direct invocation always fails; the artifact is input for the rest of
    /// the pipeline, not a callable.
    pub fn invoke(&self, _args: &[Value]) -> Result<Node> {
        Err(TranslateError::translation(
            format!("function {} is for internal use only", self.name),
            None,
        ))
    }

    /// The definition table, shared with downstream stages.
    pub fn definitions(&self) -> Rc<RefCell<ParseEnv>> {
        self.env.clone()
    }
}

/// Translate a unit and wrap the result in its registration sentinel.
pub fn register_function(
    cache: &mut SourceCache,
    path: &str,
    start_line: u32,
    source: &str,
    module: &ast::Module,
    options: TranslateOptions,
) -> Result<CompiledFunction> {
    let (entry, env) = translate_source(cache, path, start_line, source, module, options)?;
    let namespace = env.borrow().namespace.clone();
    Ok(CompiledFunction {
        name: entry.name.clone(),
        entry,
        env,
        namespace,
    })
}

/// Render an error for the user: translation errors get the rich rendering
/// (kind, message, and a source excerpt when a location is known); every
/// other error kind falls back to its plain display chain.
pub fn report_error<W: Write>(
    error: &anyhow::Error,
    cache: &SourceCache,
    mut writer: W,
) -> std::io::Result<()> {
    match error.downcast_ref::<TranslateError>() {
        Some(err) => TerminalEmitter::new(writer, false).emit(&err.to_diagnostic(), cache),
        None => writeln!(writer, "{:#}", error),
    }
}
