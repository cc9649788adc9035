//! Bundle assembly.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BundleError;
use crate::module::{analyze, strip_comments};
use crate::resolve::Resolver;
use crate::sourcemap::SourceMap;

/// Options for bundling scripts.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Extensions tried when resolving specifiers
    pub extensions: Vec<String>,

    /// Strip non-legal comments from module sources
    pub minify: bool,

    /// Append an inline source map
    pub debug: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            extensions: vec![".js".to_string(), ".jsx".to_string()],
            minify: false,
            debug: false,
        }
    }
}

/// A finished bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Bundle source
    pub code: String,

    /// Included modules, indexed by module id (the entry is 0)
    pub modules: Vec<PathBuf>,
}

/// A module waiting to be written into the bundle.
#[derive(Debug, Default)]
struct ModuleRecord {
    path: PathBuf,
    source: String,
    code: String,
    deps: BTreeMap<String, usize>,
}

/// CommonJS bundler.
pub struct Bundler {
    options: BundleOptions,
    resolver: Resolver,
}

impl Bundler {
    /// Create a new bundler.
    pub fn new(options: BundleOptions) -> Self {
        let resolver = Resolver::new(&options.extensions);
        Self { options, resolver }
    }

    /// Bundle everything reachable from `entry`.
    pub fn bundle(&self, entry: &Path) -> Result<Bundle, BundleError> {
        if !entry.is_file() {
            return Err(BundleError::EntryNotFound(entry.display().to_string()));
        }
        let entry = fs::canonicalize(entry).unwrap_or_else(|_| entry.to_path_buf());

        let mut graph = ModuleGraph::default();
        self.visit(&entry, &mut graph)?;

        let base = entry.parent().unwrap_or(Path::new(""));
        let code = render(&graph.modules, base, self.options.debug);
        Ok(Bundle {
            code,
            modules: graph.modules.into_iter().map(|m| m.path).collect(),
        })
    }

    /// Load a module and its dependencies depth-first, returning its id.
    fn visit(&self, path: &Path, graph: &mut ModuleGraph) -> Result<usize, BundleError> {
        if let Some(&id) = graph.ids.get(path) {
            return Ok(id);
        }

        let id = graph.modules.len();
        graph.ids.insert(path.to_path_buf(), id);
        graph.modules.push(ModuleRecord {
            path: path.to_path_buf(),
            ..Default::default()
        });

        let source = fs::read_to_string(path).map_err(|e| BundleError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str::<serde_json::Value>(&source).map_err(|e| {
                BundleError::JsonError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            })?;
            let record = &mut graph.modules[id];
            record.code = format!("module.exports = {};", source.trim());
            record.source = source;
            return Ok(id);
        }

        let analysis = analyze(&source, path)?;

        let mut deps = BTreeMap::new();
        for specifier in &analysis.requires {
            let resolved = self.resolver.resolve(specifier, path).ok_or_else(|| {
                BundleError::ResolveError {
                    specifier: specifier.clone(),
                    from: path.display().to_string(),
                }
            })?;
            let dep_id = self.visit(&resolved, graph)?;
            deps.insert(specifier.clone(), dep_id);
        }

        let record = &mut graph.modules[id];
        record.deps = deps;
        record.code = if self.options.minify {
            strip_comments(&source, &analysis.comments)
        } else {
            source.clone()
        };
        record.source = source;

        Ok(id)
    }
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new(BundleOptions::default())
    }
}

#[derive(Debug, Default)]
struct ModuleGraph {
    ids: HashMap<PathBuf, usize>,
    modules: Vec<ModuleRecord>,
}

const PRELUDE: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = cache[id] = { exports: {} };
    var definition = modules[id];
    definition[0].call(module.exports, function (name) {
      var target = definition[1][name];
      if (target === undefined) throw new Error("Cannot find module '" + name + "'");
      return load(target);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({
"#;

/// Render modules into a browserify-style bundle. With `debug`, a source
/// map with paths relative to `base` is appended.
fn render(modules: &[ModuleRecord], base: &Path, debug: bool) -> String {
    let mut out = String::from(PRELUDE);
    let mut map = SourceMap::new();
    map.skip_lines(PRELUDE.matches('\n').count());

    for (id, module) in modules.iter().enumerate() {
        let deps = serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!("{}: [function (require, module, exports) {{\n", id));
        map.skip_lines(1);

        out.push_str(&module.code);
        let mut lines = module.code.matches('\n').count();
        if !module.code.ends_with('\n') {
            out.push('\n');
            lines += 1;
        }
        let source = map.add_source(source_name(&module.path, base), module.source.clone());
        map.map_lines(source, lines);

        out.push_str(&format!("}}, {}]", deps));
        if id + 1 < modules.len() {
            out.push(',');
        }
        out.push('\n');
        map.skip_lines(1);
    }

    out.push_str("}, 0);\n");
    map.skip_lines(1);

    if debug {
        out.push_str(&map.inline_comment());
    }
    out
}

/// Slash-separated path of a module relative to the entry directory.
fn source_name(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
