//! Stylesheet compiler for kiln.
//!
//! Lowers an SCSS subset (imports, partials, variables, nesting and mixins) to
//! plain CSS, then validates and prints it with lightningcss.

pub mod compiler;
pub mod error;
pub mod eval;
pub mod parser;

pub use compiler::{is_partial, StyleCompiler, StyleOptions};
pub use error::StyleError;
