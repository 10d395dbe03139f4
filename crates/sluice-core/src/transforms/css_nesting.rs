//! Flattening of nested style rules into plain CSS
//!
//! Stylesheets without nesting pass through byte for byte; only files that
//! actually nest rules are re-emitted.

use crate::error::{CoreError, CoreResult};
use crate::record::FileRecord;
use crate::stream::RecordTransform;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Declaration(String),
    Comment(String),
    Rule { selector: String, body: Vec<Node> },
    AtRule { prelude: String, body: Option<Vec<Node>> },
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    /// Parse items until the matching `}` (or end of input at the top level)
    fn block(&mut self, top_level: bool) -> Result<Vec<Node>, String> {
        let mut nodes = Vec::new();
        let mut buf = String::new();
        let mut parens = 0usize;

        while let Some(c) = self.chars.next() {
            match c {
                '/' if self.chars.peek() == Some(&'*') => {
                    self.chars.next();
                    let comment = self.comment()?;
                    if buf.trim().is_empty() {
                        buf.clear();
                        nodes.push(Node::Comment(comment));
                    } else {
                        buf.push_str(&comment);
                    }
                }
                '"' | '\'' => {
                    buf.push(c);
                    self.string(c, &mut buf)?;
                }
                '(' => {
                    parens += 1;
                    buf.push(c);
                }
                ')' => {
                    parens = parens.saturating_sub(1);
                    buf.push(c);
                }
                ';' if parens == 0 => {
                    let text = buf.trim().to_string();
                    buf.clear();
                    if text.starts_with('@') {
                        nodes.push(Node::AtRule {
                            prelude: text,
                            body: None,
                        });
                    } else if !text.is_empty() {
                        nodes.push(Node::Declaration(text));
                    }
                }
                '{' if parens == 0 => {
                    let prelude = buf.trim().to_string();
                    buf.clear();
                    let body = self.block(false)?;
                    if prelude.starts_with('@') {
                        nodes.push(Node::AtRule {
                            prelude,
                            body: Some(body),
                        });
                    } else {
                        nodes.push(Node::Rule {
                            selector: prelude,
                            body,
                        });
                    }
                }
                '}' if parens == 0 => {
                    if top_level {
                        return Err("unexpected '}'".to_string());
                    }
                    let text = buf.trim();
                    if !text.is_empty() {
                        nodes.push(Node::Declaration(text.to_string()));
                    }
                    return Ok(nodes);
                }
                _ => buf.push(c),
            }
        }

        if !top_level {
            return Err("unclosed block".to_string());
        }
        let text = buf.trim();
        if !text.is_empty() {
            nodes.push(Node::Declaration(text.to_string()));
        }
        Ok(nodes)
    }

    fn comment(&mut self) -> Result<String, String> {
        let mut text = String::from("/*");
        while let Some(c) = self.chars.next() {
            text.push(c);
            if c == '*' && self.chars.peek() == Some(&'/') {
                self.chars.next();
                text.push('/');
                return Ok(text);
            }
        }
        Err("unclosed comment".to_string())
    }

    fn string(&mut self, quote: char, buf: &mut String) -> Result<(), String> {
        while let Some(c) = self.chars.next() {
            buf.push(c);
            if c == '\\' {
                if let Some(escaped) = self.chars.next() {
                    buf.push(escaped);
                }
            } else if c == quote {
                return Ok(());
            }
        }
        Err("unclosed string".to_string())
    }
}

fn has_nesting(nodes: &[Node], inside_rule: bool) -> bool {
    nodes.iter().any(|node| match node {
        Node::Rule { body, .. } => inside_rule || has_nesting(body, true),
        Node::AtRule { body: Some(body), .. } => inside_rule || has_nesting(body, inside_rule),
        _ => false,
    })
}

/// Split a selector list on commas outside parentheses and strings
fn split_selectors(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in selector.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') | (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') | (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn resolve(selector: &str, parents: &[String]) -> Vec<String> {
    let selectors = split_selectors(selector);
    if parents.is_empty() {
        return selectors;
    }
    let mut resolved = Vec::with_capacity(parents.len() * selectors.len());
    for parent in parents {
        for child in &selectors {
            if child.contains('&') {
                resolved.push(child.replace('&', parent));
            } else {
                resolved.push(format!("{} {}", parent, child));
            }
        }
    }
    resolved
}

fn emit(nodes: &[Node], parents: &[String], out: &mut String) {
    let own: Vec<&Node> = nodes
        .iter()
        .filter(|n| matches!(n, Node::Declaration(_) | Node::Comment(_)))
        .collect();

    if !own.is_empty() {
        if parents.is_empty() {
            for node in &own {
                emit_leaf(node, "", out);
            }
        } else {
            out.push_str(&parents.join(", "));
            out.push_str(" {\n");
            for node in &own {
                emit_leaf(node, "\t", out);
            }
            out.push_str("}\n");
        }
    }

    for node in nodes {
        match node {
            Node::Rule { selector, body } => {
                let resolved = resolve(selector, parents);
                emit(body, &resolved, out);
            }
            Node::AtRule {
                prelude,
                body: Some(body),
            } => {
                out.push_str(prelude);
                out.push_str(" {\n");
                emit(body, parents, out);
                out.push_str("}\n");
            }
            Node::AtRule { prelude, body: None } => {
                out.push_str(prelude);
                out.push_str(";\n");
            }
            _ => {}
        }
    }
}

fn emit_leaf(node: &Node, indent: &str, out: &mut String) {
    match node {
        Node::Declaration(text) => {
            out.push_str(indent);
            out.push_str(text);
            out.push_str(";\n");
        }
        Node::Comment(text) => {
            out.push_str(indent);
            out.push_str(text);
            out.push('\n');
        }
        _ => {}
    }
}

/// Flatten nested rules in `text`; `None` when there is nothing to flatten
pub fn flatten_nesting(text: &str) -> Result<Option<String>, String> {
    let nodes = Parser::new(text).block(true)?;
    if !has_nesting(&nodes, false) {
        return Ok(None);
    }
    let mut out = String::with_capacity(text.len());
    emit(&nodes, &[], &mut out);
    Ok(Some(out))
}

/// Per-record CSS nesting pre-processor
pub struct CssNesting;

impl RecordTransform for CssNesting {
    fn name(&self) -> &str {
        "css-nesting"
    }

    fn apply(&self, mut record: FileRecord) -> CoreResult<Vec<FileRecord>> {
        let Some(text) = record.contents_str() else {
            return Ok(vec![record]);
        };
        let flattened = flatten_nesting(text).map_err(|message| CoreError::Stylesheet {
            path: record.relative().to_string(),
            message,
        })?;
        if let Some(flattened) = flattened {
            trace!("Flattened nested rules in {}", record.relative());
            record.contents = flattened.into_bytes();
        }
        Ok(vec![record])
    }
}
