//! Build tasks that do real work.

mod copy;
mod generate;
mod scripts;
mod styles;

use std::fs;
use std::path::Path;

pub use copy::{CopyFonts, CopyHtml};
pub use generate::GenerateSite;
pub use scripts::BundleScripts;
pub use styles::CompileStyles;

use crate::error::TaskError;

/// Write a file, creating parent directories as needed.
pub(crate) fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    let write_error = |e: std::io::Error| TaskError::WriteError {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

/// Copy a file, creating parent directories as needed.
pub(crate) fn copy_file(from: &Path, to: &Path) -> Result<(), TaskError> {
    let write_error = |e: std::io::Error| TaskError::WriteError {
        path: to.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::copy(from, to).map_err(write_error)?;
    Ok(())
}

/// Run blocking work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, TaskError>
where
    F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            std::panic::resume_unwind(e.into_panic());
        }
        Err(e) => Err(TaskError::Panicked(e.to_string())),
    }
}
