//! Transformations over the translated IR.
//!
//! These run after translation, on the definition table the front-end
//! produced, and before the table is handed to inference.

pub mod cse;

pub use cse::{cse_env, cse_lambda};
