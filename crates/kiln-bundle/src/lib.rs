//! CommonJS script bundler for kiln.
//!
//! Starts from a single entry script, follows its static `require` graph and
//! emits one self-contained bundle holding exactly the reachable modules.

pub mod bundler;
pub mod error;
pub mod module;
pub mod resolve;
pub mod sourcemap;

pub use bundler::{Bundle, BundleOptions, Bundler};
pub use error::BundleError;
pub use resolve::Resolver;
pub use sourcemap::SourceMap;
