//! Module source analysis backed by oxc.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, CallExpression, Expression};
use oxc_ast::Comment;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::SourceType;

use crate::error::BundleError;

/// Byte range of a comment in module source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSpan {
    pub start: usize,
    pub end: usize,

    /// `/*! ... */`, `@license` or `@preserve` comments survive minification
    pub legal: bool,
}

/// What the bundler needs to know about a module.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Literal `require` specifiers, in source order, without duplicates
    pub requires: Vec<String>,

    /// Comment ranges, in source order
    pub comments: Vec<CommentSpan>,
}

/// Parse a module and collect its dependencies.
///
/// Modules are parsed as CommonJS scripts: each one ends up inside a
/// function wrapper, so a top-level `return` is allowed.
pub fn analyze(source: &str, path: &Path) -> Result<Analysis, BundleError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path)
        .unwrap_or_default()
        .with_script(true);
    let ret = Parser::new(&allocator, source, source_type)
        .with_options(ParseOptions {
            allow_return_outside_function: true,
            ..ParseOptions::default()
        })
        .parse();

    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser aborted".to_string());
        return Err(BundleError::SyntaxError {
            path: path.display().to_string(),
            message,
        });
    }

    let comments: Vec<CommentSpan> = ret
        .program
        .comments
        .iter()
        .map(|c| comment_span(source, c))
        .collect();

    let mut collector = RequireCollector::default();
    collector.visit_program(&ret.program);

    Ok(Analysis {
        requires: collector.requires,
        comments,
    })
}

/// Collects `require('literal')` calls from the syntax tree.
#[derive(Default)]
struct RequireCollector {
    requires: Vec<String>,
}

impl<'a> Visit<'a> for RequireCollector {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Some(specifier) = literal_require(call) {
            if !self.requires.iter().any(|r| r == specifier) {
                self.requires.push(specifier.to_string());
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// The specifier of `require("x")`, if `call` is one.
fn literal_require<'b>(call: &'b CallExpression<'_>) -> Option<&'b str> {
    let Expression::Identifier(callee) = &call.callee else {
        return None;
    };
    if callee.name.as_str() != "require" || call.arguments.len() != 1 {
        return None;
    }
    match call.arguments.first()? {
        Argument::StringLiteral(literal) => Some(literal.value.as_str()),
        _ => None,
    }
}

/// Remove every non-legal comment.
pub fn strip_comments(source: &str, comments: &[CommentSpan]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for comment in comments.iter().filter(|c| !c.legal) {
        if comment.start < last {
            continue;
        }
        out.push_str(&source[last..comment.start]);
        // Keep tokens on either side of a block comment apart, and keep its
        // line breaks so line numbers still match the source
        let text = &source[comment.start..comment.end];
        if text.starts_with("/*") {
            out.push(' ');
            out.extend(text.chars().filter(|&c| c == '\n'));
        }
        last = comment.end;
    }

    out.push_str(&source[last..]);
    out
}

fn comment_span(source: &str, comment: &Comment) -> CommentSpan {
    let mut start = comment.span.start as usize;
    let mut end = (comment.span.end as usize).min(source.len());

    // Some spans cover only the comment body
    let delimited = |at: usize| {
        source
            .get(at..)
            .is_some_and(|s| s.starts_with("//") || s.starts_with("/*"))
    };
    if !delimited(start) && start >= 2 && delimited(start - 2) {
        start -= 2;
        if source[start..].starts_with("/*") {
            end = (end + 2).min(source.len());
        }
    }

    let text = source.get(start..end).unwrap_or_default();
    let legal = text.starts_with("/*!") || text.contains("@license") || text.contains("@preserve");

    CommentSpan { start, end, legal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_literal_requires() {
        let source = r#"
var a = require('./a');
const b = require("./b");
var again = require('./a');
obj.require('./not-a-dependency');
"#;

        let analysis = analyze(source, Path::new("index.js")).unwrap();

        assert_eq!(analysis.requires, vec!["./a".to_string(), "./b".to_string()]);
    }

    #[test]
    fn ignores_requires_in_comments() {
        let source = "// require('./commented')\n/* require('./blocked') */\nrequire('./real');\n";

        let analysis = analyze(source, Path::new("index.js")).unwrap();

        assert_eq!(analysis.requires, vec!["./real".to_string()]);
        assert_eq!(analysis.comments.len(), 2);
    }

    #[test]
    fn ignores_requires_in_strings() {
        let source = r#"
var help = "call require('./unused') to load";
var tpl = `require('./templated')`;
var real = require('./real');
"#;

        let analysis = analyze(source, Path::new("index.js")).unwrap();

        assert_eq!(analysis.requires, vec!["./real".to_string()]);
    }

    #[test]
    fn finds_nested_and_dynamic_requires() {
        let source = "module.exports = function () { return require('./lazy'); };\nrequire(name);\n";

        let analysis = analyze(source, Path::new("index.js")).unwrap();

        assert_eq!(analysis.requires, vec!["./lazy".to_string()]);
    }

    #[test]
    fn allows_top_level_return() {
        let source = "if (typeof window === 'undefined') return;\nmodule.exports = 1;\n";

        assert!(analyze(source, Path::new("index.js")).is_ok());
    }

    #[test]
    fn parses_jsx_modules_as_scripts() {
        let source = "var React = require('react');\nmodule.exports = <div>hi</div>;\n";

        let analysis = analyze(source, Path::new("view.jsx")).unwrap();

        assert_eq!(analysis.requires, vec!["react".to_string()]);
    }

    #[test]
    fn reports_syntax_errors() {
        let err = analyze("var = ;", Path::new("broken.js")).unwrap_err();

        assert!(matches!(err, BundleError::SyntaxError { path, .. } if path == "broken.js"));
    }

    #[test]
    fn strips_comments_but_keeps_legal_ones() {
        let source = "/*! MIT licensed */\n// helper\nvar x = 1; /* inline */ var y = 2;\n";
        let analysis = analyze(source, Path::new("index.js")).unwrap();

        let stripped = strip_comments(source, &analysis.comments);

        assert!(stripped.contains("/*! MIT licensed */"));
        assert!(!stripped.contains("helper"));
        assert!(!stripped.contains("inline"));
        assert!(stripped.contains("var x = 1;"));
        assert!(stripped.contains("var y = 2;"));
    }

    #[test]
    fn stripping_keeps_line_count() {
        let source = "var a = 1;\n/* two\nlines */\nvar b = 2;\n";
        let analysis = analyze(source, Path::new("index.js")).unwrap();

        let stripped = strip_comments(source, &analysis.comments);

        assert_eq!(stripped.lines().count(), source.lines().count());
        assert_eq!(stripped.lines().nth(3), Some("var b = 2;"));
    }
}
