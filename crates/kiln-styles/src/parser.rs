//! Parser for the SCSS subset understood by kiln.
//!
//! Produces a tree of [`Node`]s. Line comments are dropped while scanning,
//! block comments survive at statement level.

use std::path::Path;
use std::sync::Arc;

use crate::error::StyleError;

/// Source location of a node, used for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// File the node was parsed from
    pub file: Arc<Path>,

    /// 1-based line number
    pub line: usize,
}

impl Origin {
    /// Build a syntax error at this location.
    pub fn error(&self, message: impl Into<String>) -> StyleError {
        StyleError::SyntaxError {
            path: self.file.display().to_string(),
            line: self.line,
            message: message.into(),
        }
    }
}

/// A mixin parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name without the leading `$`
    pub name: String,

    /// Default value expression
    pub default: Option<String>,
}

/// A parsed stylesheet node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `selector { ... }`
    Rule {
        selector: String,
        children: Vec<Node>,
        origin: Origin,
    },

    /// `property: value;`
    Declaration {
        property: String,
        value: String,
        origin: Origin,
    },

    /// `$name: value [!default] [!global];`
    Variable {
        name: String,
        value: String,
        default: bool,
        global: bool,
        origin: Origin,
    },

    /// Any other at-rule, with or without a block.
    AtRule {
        name: String,
        prelude: String,
        block: Option<Vec<Node>>,
        origin: Origin,
    },

    /// `@import` / `@use` with raw (possibly quoted) targets.
    Import { targets: Vec<String>, origin: Origin },

    /// `@mixin name($a, $b: default) { ... }`
    Mixin {
        name: String,
        params: Vec<Param>,
        body: Vec<Node>,
        origin: Origin,
    },

    /// `@include name(args);`
    Include {
        name: String,
        args: Vec<String>,
        origin: Origin,
    },

    /// `/* ... */`
    Comment(String),
}

/// Parse stylesheet source into nodes.
pub fn parse(source: &str, file: &Path) -> Result<Vec<Node>, StyleError> {
    let mut parser = Parser {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        file: Arc::from(file),
    };

    let nodes = parser.parse_items()?;
    if parser.peek().is_some() {
        return Err(parser.origin().error("unexpected `}`"));
    }

    Ok(nodes)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    file: Arc<Path>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    /// Advance over one full UTF-8 character.
    fn bump_char(&mut self) {
        self.bump();
        while self.peek().is_some_and(|b| b & 0xC0 == 0x80) {
            self.pos += 1;
        }
    }

    fn origin(&self) -> Origin {
        Origin {
            file: Arc::clone(&self.file),
            line: self.line,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.bump();
        }
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|b| b != b'\n') {
            self.bump();
        }
    }

    fn block_comment(&mut self) -> Result<String, StyleError> {
        let origin = self.origin();
        let start = self.pos;
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                None => return Err(origin.error("unterminated comment")),
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.bump();
                    self.bump();
                    return Ok(self.src[start..self.pos].to_string());
                }
                Some(_) => self.bump_char(),
            }
        }
    }

    fn skip_string(&mut self, quote: u8) -> Result<(), StyleError> {
        let origin = self.origin();
        self.bump();
        loop {
            match self.peek() {
                None => return Err(origin.error("unterminated string")),
                Some(b'\\') => {
                    self.bump();
                    self.bump_char();
                }
                Some(b) if b == quote => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => self.bump_char(),
            }
        }
    }

    fn skip_interpolation(&mut self) -> Result<(), StyleError> {
        let origin = self.origin();
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                None => return Err(origin.error("unterminated interpolation")),
                Some(b'}') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => self.bump_char(),
            }
        }
    }

    /// Parse items until a closing brace (not consumed) or end of input.
    fn parse_items(&mut self) -> Result<Vec<Node>, StyleError> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(b'}') => return Ok(nodes),
                Some(b';') => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let comment = self.block_comment()?;
                    nodes.push(Node::Comment(comment));
                }
                Some(_) => nodes.push(self.parse_item()?),
            }
        }
    }

    fn parse_item(&mut self) -> Result<Node, StyleError> {
        let origin = self.origin();
        let (head, terminator) = self.read_head()?;
        let head = head.trim().to_string();

        if terminator == Some(b'{') {
            self.bump();
            let children = self.parse_items()?;
            if self.bump() != Some(b'}') {
                return Err(origin.error("unclosed block"));
            }
            return block_node(head, children, origin);
        }

        if terminator == Some(b';') {
            self.bump();
        }
        statement_node(head, origin)
    }

    /// Read a selector, prelude or statement up to `{`, `;` or `}`.
    fn read_head(&mut self) -> Result<(String, Option<u8>), StyleError> {
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let Some(b) = self.peek() else {
                return Ok((text, None));
            };

            match b {
                b'{' | b';' | b'}' if depth == 0 => return Ok((text, Some(b))),
                b'"' | b'\'' => {
                    let start = self.pos;
                    self.skip_string(b)?;
                    text.push_str(&self.src[start..self.pos]);
                }
                b'#' if self.peek_at(1) == Some(b'{') => {
                    let start = self.pos;
                    self.skip_interpolation()?;
                    text.push_str(&self.src[start..self.pos]);
                }
                // `//` inside url(...) is part of the value
                b'/' if depth == 0 && self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.block_comment()?;
                    text.push(' ');
                }
                b'(' | b'[' => {
                    depth += 1;
                    self.bump();
                    text.push(b as char);
                }
                b')' | b']' => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                    text.push(b as char);
                }
                _ => {
                    let start = self.pos;
                    self.bump_char();
                    text.push_str(&self.src[start..self.pos]);
                }
            }
        }
    }
}

fn block_node(head: String, children: Vec<Node>, origin: Origin) -> Result<Node, StyleError> {
    if head.is_empty() {
        return Err(origin.error("expected selector before `{`"));
    }

    let Some(rest) = head.strip_prefix('@') else {
        return Ok(Node::Rule {
            selector: collapse_whitespace(&head),
            children,
            origin,
        });
    };

    let (name, prelude) = split_at_rule(rest);
    match name.as_str() {
        "mixin" => {
            let (name, params) = parse_signature(&prelude, &origin)?;
            Ok(Node::Mixin {
                name,
                params,
                body: children,
                origin,
            })
        }
        "include" => Err(origin.error("`@include` with a content block is not supported")),
        "if" | "else" | "each" | "for" | "while" | "function" => Err(origin.error(format!(
            "control directive `@{}` is not supported",
            name
        ))),
        _ => Ok(Node::AtRule {
            name,
            prelude: collapse_whitespace(&prelude),
            block: Some(children),
            origin,
        }),
    }
}

fn statement_node(head: String, origin: Origin) -> Result<Node, StyleError> {
    if head.is_empty() {
        return Err(origin.error("expected declaration"));
    }

    if let Some(rest) = head.strip_prefix('$') {
        return variable_node(rest, origin);
    }

    if let Some(rest) = head.strip_prefix('@') {
        let (name, prelude) = split_at_rule(rest);
        return match name.as_str() {
            "import" | "use" | "forward" => Ok(Node::Import {
                targets: import_targets(&prelude),
                origin,
            }),
            "include" => {
                let (name, args) = parse_call(&prelude);
                Ok(Node::Include { name, args, origin })
            }
            "mixin" => Err(origin.error("`@mixin` requires a block")),
            _ => Ok(Node::AtRule {
                name,
                prelude: collapse_whitespace(&prelude),
                block: None,
                origin,
            }),
        };
    }

    let Some((property, value)) = head.split_once(':') else {
        return Err(origin.error(format!("expected `:` in declaration `{}`", head)));
    };

    let property = property.trim().to_string();
    let value = value.trim().to_string();
    if value.is_empty() && !property.starts_with("--") {
        return Err(origin.error(format!("expected value for `{}`", property)));
    }

    Ok(Node::Declaration {
        property,
        value,
        origin,
    })
}

fn variable_node(rest: &str, origin: Origin) -> Result<Node, StyleError> {
    let Some((name, value)) = rest.split_once(':') else {
        return Err(origin.error(format!("expected `:` after `${}`", rest.trim())));
    };

    let mut value = value.trim();
    let mut default = false;
    let mut global = false;
    loop {
        if let Some(v) = value.strip_suffix("!default") {
            default = true;
            value = v.trim_end();
        } else if let Some(v) = value.strip_suffix("!global") {
            global = true;
            value = v.trim_end();
        } else {
            break;
        }
    }

    if value.is_empty() {
        return Err(origin.error(format!("expected value for `${}`", name.trim())));
    }

    Ok(Node::Variable {
        name: name.trim().to_string(),
        value: value.to_string(),
        default,
        global,
        origin,
    })
}

/// Split `name rest` of an at-rule.
fn split_at_rule(rest: &str) -> (String, String) {
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    (rest[..end].to_string(), rest[end..].trim().to_string())
}

fn import_targets(prelude: &str) -> Vec<String> {
    // `@use "x" as y` and `@use "x" with (...)` only need the target
    let prelude = match prelude.find(" as ").or_else(|| prelude.find(" with ")) {
        Some(idx) if prelude.starts_with(['"', '\'']) => &prelude[..idx],
        _ => prelude,
    };

    split_top_level(prelude, ',')
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parse `name(arg, arg)` into its name and arguments.
fn parse_call(text: &str) -> (String, Vec<String>) {
    match text.find('(') {
        Some(open) => {
            let close = text.rfind(')').unwrap_or(text.len());
            let inner = if close > open { &text[open + 1..close] } else { "" };
            let args = split_top_level(inner, ',')
                .into_iter()
                .filter(|a| !a.is_empty())
                .collect();
            (text[..open].trim().to_string(), args)
        }
        None => (text.trim().to_string(), Vec::new()),
    }
}

fn parse_signature(text: &str, origin: &Origin) -> Result<(String, Vec<Param>), StyleError> {
    let (name, raw) = parse_call(text);
    if name.is_empty() {
        return Err(origin.error("expected mixin name"));
    }

    let mut params = Vec::new();
    for param in raw {
        let Some(param) = param.strip_prefix('$') else {
            return Err(origin.error(format!("invalid mixin parameter `{}`", param)));
        };
        let param = match param.split_once(':') {
            Some((n, d)) => Param {
                name: n.trim().to_string(),
                default: Some(d.trim().to_string()),
            },
            None => Param {
                name: param.trim().to_string(),
                default: None,
            },
        };
        params.push(param);
    }

    Ok((name, params))
}

/// Split on `sep` outside of quotes, parentheses and brackets.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                c if c == sep && depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    parts.push(current.trim().to_string());
    parts
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_str(source: &str) -> Vec<Node> {
        parse(source, Path::new("test.scss")).unwrap()
    }

    #[test]
    fn parses_nested_rules() {
        let nodes = parse_str(".nav {\n  color: red;\n  a { margin: 0; }\n}");

        let Node::Rule {
            selector, children, ..
        } = &nodes[0]
        else {
            panic!("Expected rule");
        };
        assert_eq!(selector, ".nav");
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], Node::Rule { selector, .. } if selector == "a"));
    }

    #[test]
    fn drops_line_comments_but_keeps_urls() {
        let nodes = parse_str("// header\n.a { background: url(//cdn.example.com/x.png); }");

        let Node::Rule { children, .. } = &nodes[0] else {
            panic!("Expected rule");
        };
        let Node::Declaration { value, .. } = &children[0] else {
            panic!("Expected declaration");
        };
        assert_eq!(value, "url(//cdn.example.com/x.png)");
    }

    #[test]
    fn parses_variable_flags() {
        let nodes = parse_str("$gap: 4px !default;");

        assert!(matches!(
            &nodes[0],
            Node::Variable { name, value, default: true, global: false, .. }
                if name == "gap" && value == "4px"
        ));
    }

    #[test]
    fn parses_imports_and_mixins() {
        let nodes = parse_str(
            "@import 'base', 'theme';\n@mixin pad($x, $y: 2px) { padding: $x $y; }\n.a { @include pad(1px); }",
        );

        assert!(matches!(&nodes[0], Node::Import { targets, .. } if targets.len() == 2));
        let Node::Mixin { name, params, .. } = &nodes[1] else {
            panic!("Expected mixin");
        };
        assert_eq!(name, "pad");
        assert_eq!(params[1].default.as_deref(), Some("2px"));
    }

    #[test]
    fn reports_line_of_unclosed_block() {
        let err = parse(".a {\n  color: red;\n", Path::new("x.scss")).unwrap_err();

        assert!(matches!(err, StyleError::SyntaxError { line: 1, .. }));
    }

    #[test]
    fn rejects_declaration_without_colon() {
        let err = parse(".a {\n  color red;\n}", Path::new("x.scss")).unwrap_err();

        assert!(matches!(err, StyleError::SyntaxError { line: 2, .. }));
    }

    #[test]
    fn splits_outside_parentheses() {
        assert_eq!(
            split_top_level(":is(a, b), c", ','),
            vec![":is(a, b)".to_string(), "c".to_string()]
        );
    }
}
