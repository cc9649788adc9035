//! Development server with live reload for kiln.
//!
//! Serves the build output, rebuilds when sources change and tells connected
//! browsers to reload over a WebSocket.

pub mod livereload;
pub mod server;
pub mod watcher;

pub use livereload::{ReloadHub, ReloadMessage};
pub use server::{DevServer, DevServerConfig, Rebuilder, ServerError};
pub use watcher::{FileWatcher, WatchFilter};
