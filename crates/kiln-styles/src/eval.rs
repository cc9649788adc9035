//! Evaluation of parsed stylesheets into flat CSS.
//!
//! Resolves variables and mixins, then flattens nested rules into plain
//! selectors. Conditional at-rules nested in a rule are hoisted and wrap the
//! parent selector.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::StyleError;
use crate::parser::{split_top_level, Node, Origin, Param};

const MAX_INCLUDE_DEPTH: usize = 64;

static INTERPOLATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{([^}]*)\}").expect("Invalid interpolation regex"));

/// A flattened CSS item.
#[derive(Debug, Clone, PartialEq)]
pub enum CssItem {
    /// `selectors { declarations }`
    Style {
        selectors: Vec<String>,
        declarations: Vec<String>,
    },

    /// `@head;` or `@head { body }`
    AtRule {
        head: String,
        body: Option<Vec<CssItem>>,
    },

    /// A bare declaration inside an at-rule such as `@font-face`.
    Declaration(String),

    /// A top-level block comment.
    Comment(String),
}

/// Where a block is being evaluated.
#[derive(Debug, Clone, Copy)]
enum Context<'a> {
    /// Stylesheet root, declarations are not allowed.
    Root,

    /// Inside a style rule with the given resolved selectors.
    Rule(&'a [String]),

    /// Inside a non-conditional at-rule; nested rules are not prefixed.
    Raw,
}

#[derive(Debug, Default)]
struct Body {
    declarations: Vec<String>,
    items: Vec<CssItem>,
}

#[derive(Debug, Clone)]
struct MixinDef {
    params: Vec<Param>,
    body: Vec<Node>,
}

/// Evaluate nodes into flat CSS items.
pub fn evaluate(nodes: &[Node]) -> Result<Vec<CssItem>, StyleError> {
    let mut evaluator = Evaluator {
        scopes: vec![HashMap::new()],
        mixins: HashMap::new(),
        depth: 0,
    };

    let body = evaluator.eval_body(nodes, Context::Root)?;
    Ok(body.items)
}

/// Serialize CSS items to text.
pub fn serialize(items: &[CssItem]) -> String {
    let mut out = String::new();
    write_items(&mut out, items, 0);
    out
}

struct Evaluator {
    scopes: Vec<HashMap<String, String>>,
    mixins: HashMap<String, MixinDef>,
    depth: usize,
}

impl Evaluator {
    fn eval_body(&mut self, nodes: &[Node], ctx: Context<'_>) -> Result<Body, StyleError> {
        let mut body = Body::default();
        for node in nodes {
            self.eval_node(node, ctx, &mut body)?;
        }
        Ok(body)
    }

    /// Evaluate `nodes` in a fresh variable scope.
    fn eval_scoped(&mut self, nodes: &[Node], ctx: Context<'_>) -> Result<Body, StyleError> {
        self.scopes.push(HashMap::new());
        let result = self.eval_body(nodes, ctx);
        self.scopes.pop();
        result
    }

    fn eval_node(&mut self, node: &Node, ctx: Context<'_>, body: &mut Body) -> Result<(), StyleError> {
        match node {
            Node::Comment(text) => {
                if matches!(ctx, Context::Root) {
                    body.items.push(CssItem::Comment(text.clone()));
                }
            }

            Node::Variable {
                name,
                value,
                default,
                global,
                origin,
            } => {
                if *default && self.lookup(name).is_some() {
                    return Ok(());
                }
                let value = self.resolve_value(value, origin)?;
                let scope = if *global {
                    self.scopes.first_mut()
                } else {
                    self.scopes.last_mut()
                };
                if let Some(scope) = scope {
                    scope.insert(normalize_name(name), value);
                }
            }

            Node::Declaration {
                property,
                value,
                origin,
            } => {
                if matches!(ctx, Context::Root) {
                    return Err(origin.error(format!(
                        "declaration `{}` is not inside a rule",
                        property
                    )));
                }
                let property = self.interpolate(property, origin)?;
                let value = self.resolve_value(value, origin)?;
                body.declarations.push(format!("{}: {}", property, value));
            }

            Node::Rule {
                selector,
                children,
                origin,
            } => {
                let selector = self.interpolate(selector, origin)?;
                let selectors = match ctx {
                    Context::Rule(parents) => combine_selectors(parents, &selector),
                    Context::Root | Context::Raw => {
                        if selector.contains('&') {
                            return Err(origin.error("`&` used outside of a rule"));
                        }
                        split_top_level(&selector, ',')
                    }
                };

                let inner = self.eval_scoped(children, Context::Rule(&selectors))?;
                if !inner.declarations.is_empty() {
                    body.items.push(CssItem::Style {
                        selectors,
                        declarations: inner.declarations,
                    });
                }
                body.items.extend(inner.items);
            }

            Node::AtRule {
                name,
                prelude,
                block,
                origin,
            } => {
                let prelude = self.resolve_value(prelude, origin)?;
                let head = if prelude.is_empty() {
                    format!("@{}", name)
                } else {
                    format!("@{} {}", name, prelude)
                };

                let Some(children) = block else {
                    body.items.push(CssItem::AtRule { head, body: None });
                    return Ok(());
                };

                let mut items = Vec::new();
                if is_conditional(name) {
                    let inner = self.eval_scoped(children, ctx)?;
                    if !inner.declarations.is_empty() {
                        match ctx {
                            Context::Rule(parents) => items.push(CssItem::Style {
                                selectors: parents.to_vec(),
                                declarations: inner.declarations,
                            }),
                            Context::Root | Context::Raw => items
                                .extend(inner.declarations.into_iter().map(CssItem::Declaration)),
                        }
                    }
                    items.extend(inner.items);
                } else {
                    let inner = self.eval_scoped(children, Context::Raw)?;
                    items.extend(inner.declarations.into_iter().map(CssItem::Declaration));
                    items.extend(inner.items);
                }

                body.items.push(CssItem::AtRule {
                    head,
                    body: Some(items),
                });
            }

            Node::Import { origin, .. } => {
                return Err(origin.error("import was not resolved before evaluation"));
            }

            Node::Mixin {
                name, params, body: mixin_body, ..
            } => {
                self.mixins.insert(
                    normalize_name(name),
                    MixinDef {
                        params: params.clone(),
                        body: mixin_body.clone(),
                    },
                );
            }

            Node::Include { name, args, origin } => {
                let Some(mixin) = self.mixins.get(&normalize_name(name)).cloned() else {
                    return Err(StyleError::UndefinedMixin {
                        path: origin.file.display().to_string(),
                        line: origin.line,
                        name: name.clone(),
                    });
                };
                if self.depth >= MAX_INCLUDE_DEPTH {
                    return Err(origin.error(format!("mixin `{}` nests too deeply", name)));
                }

                let (positional, named) = self.resolve_arguments(args, origin)?;

                // Mixin bodies see globals and their own arguments, not the
                // includer's locals
                let locals = self.scopes.split_off(1);
                self.depth += 1;
                let result = self.expand_mixin(name, &mixin, positional, named, ctx, body, origin);
                self.depth -= 1;
                self.scopes.extend(locals);
                result?;
            }
        }

        Ok(())
    }

    /// Resolve include arguments in the includer's scope.
    fn resolve_arguments(
        &self,
        args: &[String],
        origin: &Origin,
    ) -> Result<(Vec<String>, HashMap<String, String>), StyleError> {
        let mut positional = Vec::new();
        let mut named = HashMap::new();
        for arg in args {
            match keyword_argument(arg) {
                Some((key, value)) => {
                    named.insert(normalize_name(key), self.resolve_value(value, origin)?);
                }
                None => positional.push(self.resolve_value(arg, origin)?),
            }
        }
        Ok((positional, named))
    }

    /// Bind arguments to parameters in a new scope and evaluate the body.
    #[allow(clippy::too_many_arguments)]
    fn expand_mixin(
        &mut self,
        name: &str,
        mixin: &MixinDef,
        positional: Vec<String>,
        mut named: HashMap<String, String>,
        ctx: Context<'_>,
        body: &mut Body,
        origin: &Origin,
    ) -> Result<(), StyleError> {
        if positional.len() > mixin.params.len() {
            return Err(origin.error(format!(
                "mixin `{}` takes {} arguments but {} were given",
                name,
                mixin.params.len(),
                positional.len()
            )));
        }

        self.scopes.push(HashMap::new());
        let result = self.bind_parameters(name, mixin, positional, &mut named, origin).and_then(|()| {
            mixin
                .body
                .iter()
                .try_for_each(|node| self.eval_node(node, ctx, body))
        });
        self.scopes.pop();
        result
    }

    /// Fill the innermost scope with parameter values. Defaults may refer to
    /// earlier parameters.
    fn bind_parameters(
        &mut self,
        name: &str,
        mixin: &MixinDef,
        positional: Vec<String>,
        named: &mut HashMap<String, String>,
        origin: &Origin,
    ) -> Result<(), StyleError> {
        for (i, param) in mixin.params.iter().enumerate() {
            let key = normalize_name(&param.name);
            let value = if let Some(v) = positional.get(i) {
                v.clone()
            } else if let Some(v) = named.remove(&key) {
                v
            } else if let Some(default) = &param.default {
                self.resolve_value(default, origin)?
            } else {
                return Err(origin.error(format!(
                    "missing argument `${}` for mixin `{}`",
                    param.name, name
                )));
            };

            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(key, value);
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&String> {
        let key = normalize_name(name);
        self.scopes.iter().rev().find_map(|scope| scope.get(&key))
    }

    fn resolve_value(&self, value: &str, origin: &Origin) -> Result<String, StyleError> {
        let value = self.interpolate(value, origin)?;
        self.substitute_variables(&value, origin)
    }

    /// Replace `#{...}` with the unquoted value of its expression.
    fn interpolate(&self, text: &str, origin: &Origin) -> Result<String, StyleError> {
        if !text.contains("#{") {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in INTERPOLATION_RE.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            let value = self.substitute_variables(inner.as_str().trim(), origin)?;
            out.push_str(unquote(&value));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Replace `$name` references outside of quoted strings.
    fn substitute_variables(&self, text: &str, origin: &Origin) -> Result<String, StyleError> {
        if !text.contains('$') {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut chars = text.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                out.push(c);
                continue;
            }

            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    out.push(c);
                }
                '$' => {
                    let mut name = String::new();
                    while let Some(&(_, n)) = chars.peek() {
                        if n.is_alphanumeric() || n == '-' || n == '_' {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        out.push('$');
                        continue;
                    }
                    let Some(value) = self.lookup(&name) else {
                        return Err(StyleError::UndefinedVariable {
                            path: origin.file.display().to_string(),
                            line: origin.line,
                            name,
                        });
                    };
                    out.push_str(value);
                }
                _ => out.push(c),
            }
        }

        Ok(out)
    }
}

/// Combine parent selectors with a nested selector list.
fn combine_selectors(parents: &[String], selector: &str) -> Vec<String> {
    let children = split_top_level(selector, ',');
    let mut combined = Vec::with_capacity(parents.len() * children.len());

    for parent in parents {
        for child in &children {
            if child.contains('&') {
                combined.push(child.replace('&', parent));
            } else {
                combined.push(format!("{} {}", parent, child));
            }
        }
    }

    combined
}

fn is_conditional(name: &str) -> bool {
    matches!(
        name,
        "media" | "supports" | "container" | "layer" | "document" | "scope" | "starting-style"
    )
}

/// Sass treats `-` and `_` in names as the same character.
fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('$').replace('_', "-")
}

fn keyword_argument(arg: &str) -> Option<(&str, &str)> {
    let rest = arg.strip_prefix('$')?;
    let (key, value) = rest.split_once(':')?;
    Some((key.trim(), value.trim()))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn write_items(out: &mut String, items: &[CssItem], indent: usize) {
    let pad = "  ".repeat(indent);

    for item in items {
        match item {
            CssItem::Style {
                selectors,
                declarations,
            } => {
                out.push_str(&pad);
                out.push_str(&selectors.join(", "));
                out.push_str(" {\n");
                for declaration in declarations {
                    out.push_str(&pad);
                    out.push_str("  ");
                    out.push_str(declaration);
                    out.push_str(";\n");
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
            CssItem::AtRule { head, body: None } => {
                out.push_str(&pad);
                out.push_str(head);
                out.push_str(";\n");
            }
            CssItem::AtRule {
                head,
                body: Some(body),
            } => {
                out.push_str(&pad);
                out.push_str(head);
                out.push_str(" {\n");
                write_items(out, body, indent + 1);
                out.push_str(&pad);
                out.push_str("}\n");
            }
            CssItem::Declaration(declaration) => {
                out.push_str(&pad);
                out.push_str(declaration);
                out.push_str(";\n");
            }
            CssItem::Comment(text) => {
                out.push_str(&pad);
                out.push_str(text);
                out.push('\n');
            }
        }
    }
}
