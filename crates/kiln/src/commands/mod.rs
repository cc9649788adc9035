//! CLI commands.

pub mod build;
pub mod init;
pub mod list;
pub mod run;
pub mod serve;
