//! Style compilation errors.

/// Errors that can occur while compiling a stylesheet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StyleError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("{path}:{line}: {message}")]
    SyntaxError {
        path: String,
        line: usize,
        message: String,
    },

    #[error("{path}:{line}: Can't find stylesheet to import: {target}")]
    ImportNotFound {
        path: String,
        line: usize,
        target: String,
    },

    #[error("Import cycle detected: {0}")]
    ImportCycle(String),

    #[error("{path}:{line}: Undefined variable: ${name}")]
    UndefinedVariable {
        path: String,
        line: usize,
        name: String,
    },

    #[error("{path}:{line}: Undefined mixin: {name}")]
    UndefinedMixin {
        path: String,
        line: usize,
        name: String,
    },

    #[error("CSS error in {path}: {message}")]
    CssError { path: String, message: String },
}
