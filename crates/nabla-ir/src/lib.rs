//! The closure-based intermediate representation produced by translation.
//!
//! The IR is lexically flat: function bodies never contain nested function
//! definitions. Nested scopes in the host language are closure-converted
//! during translation, so a body only ever refers to its own parameters,
//! its own let-bindings, and global symbols.

pub mod builtins;
pub mod env;
pub mod node;
pub mod symbol;

pub use env::ParseEnv;
pub use node::{Lambda, Node, NodeKind, Value};
pub use symbol::{GenSym, Namespace, Symbol};
