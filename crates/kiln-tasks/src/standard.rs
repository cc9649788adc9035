//! The standard site build graph.

use std::sync::Arc;

use crate::config::BuildConfig;
use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::leaf::{BundleScripts, CompileStyles, CopyFonts, CopyHtml, GenerateSite};

pub const GENERATE_SITE: &str = "generate-site";
pub const COMPILE_STYLES: &str = "compile-styles";
pub const BUNDLE_SCRIPTS: &str = "bundle-scripts";
pub const COPY_HTML: &str = "copy-html";
pub const COPY_FONTS: &str = "copy-fonts";
pub const BUILD: &str = "build";
pub const DEFAULT: &str = "default";

/// Register the five build leaves plus `build` and `default`.
pub fn standard_graph(config: Arc<BuildConfig>) -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();

    graph.register(GENERATE_SITE, GenerateSite::new(Arc::clone(&config)), &[])?;
    graph.register(COMPILE_STYLES, CompileStyles::new(Arc::clone(&config)), &[])?;
    graph.register(BUNDLE_SCRIPTS, BundleScripts::new(Arc::clone(&config)), &[])?;
    graph.register(COPY_HTML, CopyHtml::new(Arc::clone(&config)), &[])?;
    graph.register(COPY_FONTS, CopyFonts::new(config), &[])?;

    graph.composite(
        BUILD,
        &[GENERATE_SITE, COMPILE_STYLES, BUNDLE_SCRIPTS, COPY_HTML, COPY_FONTS],
    )?;
    graph.composite(DEFAULT, &[BUILD])?;

    Ok(graph)
}
