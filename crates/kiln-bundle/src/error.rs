//! Bundling errors.

/// Errors that can occur while bundling scripts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BundleError {
    #[error("Entry script not found: {0}")]
    EntryNotFound(String),

    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Syntax error in {path}: {message}")]
    SyntaxError { path: String, message: String },

    #[error("Cannot find module '{specifier}' from '{from}'")]
    ResolveError { specifier: String, from: String },

    #[error("Invalid JSON in {path}: {message}")]
    JsonError { path: String, message: String },
}
