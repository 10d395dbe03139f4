//! Top-level exported declarations of a TypeScript module, reshaped into the
//! form they take inside an ambient declaration file
//!
//! This is a scanner, not a parser: it tracks bracket depth while skipping
//! comments, strings, templates and regex literals, and relies on top-level
//! statements starting at column zero.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Interface,
    TypeAlias,
    Enum,
    Class,
    Function,
    Variable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// Declaration-file text, lines separated by `\n`, leading doc comment included
    pub text: String,
}

/// Everything a module exports, in source order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleDeclarations {
    declarations: Vec<Declaration>,
}

impl ModuleDeclarations {
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Declaration> + 'a {
        self.declarations.iter().filter(move |d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named(name).next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            b'\n' if quote != b'`' => return j,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn starts_regex(bytes: &[u8], i: usize) -> bool {
    let mut j = i;
    while j > 0 && bytes[j - 1].is_ascii_whitespace() {
        j -= 1;
    }
    if j == 0 {
        return true;
    }
    if b"(,=:[!&|?{};+-*%<>~^".contains(&bytes[j - 1]) {
        return true;
    }
    let mut word_start = j;
    while word_start > 0 && is_ident(bytes[word_start - 1]) {
        word_start -= 1;
    }
    matches!(&bytes[word_start..j], b"return" | b"typeof" | b"case" | b"in" | b"of")
}

fn skip_regex(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    let mut in_class = false;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => {
                j += 2;
                continue;
            }
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                j += 1;
                while j < bytes.len() && is_ident(bytes[j]) {
                    j += 1;
                }
                return j;
            }
            b'\n' => return j,
            _ => {}
        }
        j += 1;
    }
    bytes.len()
}

/// If a comment or literal starts at `i`, the index just past it
///
/// Line comments stop before their newline so line-based rules still see it.
fn skip_literal(bytes: &[u8], i: usize) -> Option<usize> {
    let next = bytes.get(i + 1).copied();
    match bytes[i] {
        b'/' if next == Some(b'/') => Some(find_seq(bytes, i + 2, b"\n").unwrap_or(bytes.len())),
        b'/' if next == Some(b'*') => Some(find_seq(bytes, i + 2, b"*/").map_or(bytes.len(), |e| e + 2)),
        b'/' if starts_regex(bytes, i) => Some(skip_regex(bytes, i)),
        quote @ (b'\'' | b'"' | b'`') => Some(skip_quoted(bytes, i, quote)),
        _ => None,
    }
}

/// Code bytes of a source, literals and comments skipped
struct Code<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Code<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }
}

impl Iterator for Code<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<(usize, u8)> {
        while self.pos < self.bytes.len() {
            if let Some(end) = skip_literal(self.bytes, self.pos) {
                self.pos = end;
                continue;
            }
            let i = self.pos;
            self.pos += 1;
            return Some((i, self.bytes[i]));
        }
        None
    }
}

/// After a closing brace: the statement end if only `;`, spaces or a line comment follow on this line
fn closes_line(bytes: &[u8], from: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
        j += 1;
    }
    let mut end = from;
    if bytes.get(j) == Some(&b';') {
        j += 1;
        end = j;
    }
    while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
        j += 1;
    }
    match bytes.get(j) {
        None | Some(b'\n') | Some(b'\r') => Some(end),
        Some(b'/') if bytes.get(j + 1) == Some(&b'/') => Some(end),
        _ => None,
    }
}

fn starts_new_statement(bytes: &[u8], at: usize) -> bool {
    match bytes.get(at) {
        None => true,
        Some(b'/') => matches!(bytes.get(at + 1), Some(b'/') | Some(b'*')),
        Some(b) if b.is_ascii_whitespace() => false,
        Some(b) => !b"|&?:=.)]}>,+-*".contains(b),
    }
}

fn statement_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, b) in Code::new(bytes, start) {
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && b == b'}' {
                    if let Some(end) = closes_line(bytes, i + 1) {
                        return end;
                    }
                }
            }
            b';' if depth == 0 => return i + 1,
            b'\n' if depth == 0 && starts_new_statement(bytes, i + 1) => return i,
            _ => {}
        }
    }
    bytes.len()
}

fn matching_open(bytes: &[u8], close: usize) -> Option<usize> {
    let mut stack = Vec::new();
    for (i, b) in Code::new(bytes, 0) {
        if i > close {
            break;
        }
        match b {
            b'{' => stack.push(i),
            b'}' => {
                let open = stack.pop();
                if i == close {
                    return open;
                }
            }
            _ => {}
        }
    }
    None
}

/// Position of a top-level `=` that starts an initializer
fn initializer(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in Code::new(bytes, 0) {
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let next = bytes.get(i + 1).copied();
                let prev = if i > 0 { Some(bytes[i - 1]) } else { None };
                let compound = matches!(next, Some(b'=') | Some(b'>'))
                    || matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>'));
                if !compound {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the opening brace of a trailing `{ ... }` block, if the text ends with one
fn trailing_block(text: &str) -> Option<usize> {
    let trimmed = text.trim_end().trim_end_matches(';').trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }
    matching_open(trimmed.as_bytes(), trimmed.len() - 1)
}

fn next_word(text: &str, from: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    let mut start = from;
    while start < bytes.len() && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    let mut end = start;
    while end < bytes.len() && is_ident(bytes[end]) {
        end += 1;
    }
    (end > start).then(|| (&text[start..end], end))
}

fn parse_header(text: &str) -> Option<(DeclarationKind, String)> {
    let (export, mut pos) = next_word(text, 0)?;
    if export != "export" {
        return None;
    }

    let kind = loop {
        let (word, next) = next_word(text, pos)?;
        pos = next;
        match word {
            "declare" | "abstract" | "async" => continue,
            "interface" => break DeclarationKind::Interface,
            "type" => break DeclarationKind::TypeAlias,
            "enum" => break DeclarationKind::Enum,
            "class" => break DeclarationKind::Class,
            "function" => {
                if text[pos..].trim_start().starts_with('*') {
                    pos = text[pos..].find('*').map_or(pos, |p| pos + p + 1);
                }
                break DeclarationKind::Function;
            }
            "const" => match next_word(text, pos) {
                Some(("enum", next)) => {
                    pos = next;
                    break DeclarationKind::Enum;
                }
                _ => break DeclarationKind::Variable,
            },
            "let" | "var" => break DeclarationKind::Variable,
            _ => return None,
        }
    };

    let (name, _) = next_word(text, pos)?;
    Some((kind, name.to_string()))
}

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^export\s+(?:declare\s+)?(?:async\s+)?(?:const\s+(enum\b))?").expect("static regex"))
}

fn parameter_modifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@\w+(?:\([^()]*\))?\s+|\b(?:public|private|protected|readonly|override)\s+").expect("static regex")
    })
}

/// Split leading comments off a member, returning them and the code after
fn leading_comments(raw: &str) -> (Vec<&str>, &str) {
    let mut comments = Vec::new();
    let mut rest = raw.trim_start();
    loop {
        if rest.starts_with("//") {
            let end = rest.find('\n').unwrap_or(rest.len());
            comments.push(&rest[..end]);
            rest = rest[end..].trim_start();
        } else if rest.starts_with("/*") {
            let end = rest.find("*/").map_or(rest.len(), |e| e + 2);
            comments.push(&rest[..end]);
            rest = rest[end..].trim_start();
        } else {
            return (comments, rest.trim_end());
        }
    }
}

fn indent_member(comments: &[&str], code: &str) -> String {
    let mut lines = Vec::new();
    for comment in comments {
        for line in comment.lines() {
            let line = line.trim();
            if line.starts_with('*') {
                lines.push(format!("\t {}", line));
            } else {
                lines.push(format!("\t{}", line));
            }
        }
    }
    for (idx, line) in code.lines().enumerate() {
        let line = if idx == 0 {
            line.trim_start()
        } else {
            line.strip_prefix('\t').unwrap_or(line).trim_end()
        };
        lines.push(format!("\t{}", line));
    }
    lines.join("\n")
}

fn massage_member(raw: &str) -> Option<String> {
    let (comments, code) = leading_comments(raw);
    if code.is_empty() || code == ";" {
        return None;
    }
    let first = next_word(code, 0).map(|(w, _)| w).unwrap_or_default();
    if code.starts_with('#') || first == "private" || (first == "static" && code[6..].trim_start().starts_with('{')) {
        return None;
    }

    let mut signature = if let Some(eq) = initializer(code.as_bytes()) {
        format!("{};", code[..eq].trim_end())
    } else if let Some(open) = trailing_block(code).filter(|open| code[..*open].contains('(')) {
        format!("{};", code[..open].trim_end())
    } else if code.ends_with(';') {
        code.to_string()
    } else {
        format!("{};", code)
    };

    if first == "constructor" {
        signature = parameter_modifier_regex().replace_all(&signature, "").into_owned();
    }
    Some(indent_member(&comments, &signature))
}

fn class_members(body: &str) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut code = Code::new(bytes, 0);

    while let Some((i, b)) = code.next() {
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && b == b'}' {
                    if let Some(end) = closes_line(bytes, i + 1) {
                        members.extend(massage_member(&body[start..end]));
                        start = end;
                        code.pos = end;
                    }
                }
            }
            b';' if depth == 0 => {
                members.extend(massage_member(&body[start..=i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    members.extend(massage_member(&body[start..]));
    members
}

fn massage(kind: DeclarationKind, decl: &str) -> (String, bool) {
    let decl = prefix_regex().replace(decl.trim_end(), |caps: &regex::Captures<'_>| {
        if caps.get(1).is_some() {
            "export enum".to_string()
        } else {
            "export ".to_string()
        }
    });
    let decl = decl.as_ref();

    match kind {
        DeclarationKind::Function => match trailing_block(decl) {
            Some(open) => (format!("{};", decl[..open].trim_end()), true),
            None => (decl.to_string(), false),
        },
        DeclarationKind::Variable => match initializer(decl.as_bytes()) {
            Some(eq) => (format!("{};", decl[..eq].trim_end()), false),
            None if decl.ends_with(';') => (decl.to_string(), false),
            None => (format!("{};", decl), false),
        },
        DeclarationKind::Class => {
            let Some(open) = trailing_block(decl) else {
                return (decl.to_string(), false);
            };
            let close = decl.trim_end_matches(';').trim_end().len() - 1;
            let members = class_members(&decl[open + 1..close]);
            let mut text = format!("{} {{\n", decl[..open].trim_end());
            for member in members {
                text.push_str(&member);
                text.push('\n');
            }
            text.push('}');
            (text, true)
        }
        _ => (decl.to_string(), true),
    }
}

/// Start of the doc comment directly above `decl_start`, or `decl_start` itself
fn doc_start(src: &str, decl_start: usize) -> usize {
    let before = src[..decl_start].trim_end();
    if !before.ends_with("*/") {
        return decl_start;
    }
    let Some(open) = before.rfind("/**") else {
        return decl_start;
    };
    let line_start = before[..open].rfind('\n').map_or(0, |n| n + 1);
    if before[line_start..open].trim().is_empty() {
        line_start
    } else {
        decl_start
    }
}

/// Scan `src` for its top-level exported declarations
pub fn parse_module(src: &str) -> ModuleDeclarations {
    let bytes = src.as_bytes();
    let mut declarations: Vec<Declaration> = Vec::new();
    let mut depth = 0usize;
    let mut code = Code::new(bytes, 0);

    while let Some((i, b)) = code.next() {
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';
        if depth == 0 && at_line_start && b == b'e' {
            if let Some((kind, name)) = parse_header(&src[i..]) {
                let end = statement_end(bytes, i);
                let (body, has_body) = massage(kind, &src[i..end]);
                let doc = src[doc_start(src, i)..i].trim_end();

                let overloaded = kind == DeclarationKind::Function
                    && has_body
                    && declarations
                        .iter()
                        .any(|d| d.kind == DeclarationKind::Function && d.name == name);
                if !overloaded {
                    let text = if doc.is_empty() {
                        body
                    } else {
                        format!("{}\n{}", doc, body)
                    };
                    declarations.push(Declaration { name, kind, text });
                }
                code.pos = end;
                continue;
            }
        }
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    ModuleDeclarations { declarations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_of(module: &ModuleDeclarations, name: &str) -> String {
        module.named(name).next().unwrap().text.clone()
    }

    #[test]
    fn test_interfaces_and_types_are_kept_verbatim() {
        let src = "import { x } from './x';\n\n/**\n * A position.\n */\nexport interface IPosition {\n\treadonly line: number;\n}\n\nexport type Handler = (e: string) => void;\nconst internal = 1;\n";
        let module = parse_module(src);

        assert_eq!(module.len(), 2);
        assert_eq!(
            text_of(&module, "IPosition"),
            "/**\n * A position.\n */\nexport interface IPosition {\n\treadonly line: number;\n}"
        );
        assert_eq!(text_of(&module, "Handler"), "export type Handler = (e: string) => void;");
    }

    #[test]
    fn test_const_enums_become_enums() {
        let module = parse_module("export const enum Severity {\n\tError = 1,\n\tWarning = 2\n}\n");
        let decl = module.named("Severity").next().unwrap();
        assert_eq!(decl.kind, DeclarationKind::Enum);
        assert_eq!(decl.text, "export enum Severity {\n\tError = 1,\n\tWarning = 2\n}");
    }

    #[test]
    fn test_functions_and_constants_lose_bodies() {
        let src = "export function isEmpty(s: string): boolean {\n\treturn s.length === 0 || /^\\s*$/.test(s);\n}\nexport const MAX: number = 10;\n";
        let module = parse_module(src);
        assert_eq!(text_of(&module, "isEmpty"), "export function isEmpty(s: string): boolean;");
        assert_eq!(text_of(&module, "MAX"), "export const MAX: number;");
    }

    #[test]
    fn test_overloads_hide_implementation() {
        let src = "export function f(a: string): string;\nexport function f(a: number): number;\nexport function f(a: any): any {\n\treturn a;\n}\n";
        let texts: Vec<_> = parse_module(src).named("f").map(|d| d.text.clone()).collect();
        assert_eq!(
            texts,
            vec!["export function f(a: string): string;", "export function f(a: number): number;"]
        );
    }

    #[test]
    fn test_class_members_are_reduced_to_signatures() {
        let src = concat!(
            "export class Range {\n",
            "\tprivate _cache: string = '';\n",
            "\t/**\n\t * Start line.\n\t */\n",
            "\tpublic readonly startLine: number;\n",
            "\tconstructor(@IFoo private readonly foo: IFoo, startLine: number) {\n",
            "\t\tthis.startLine = startLine;\n",
            "\t}\n",
            "\tpublic isEmpty(): boolean {\n",
            "\t\treturn this.startLine === 0 && '}' !== '{';\n",
            "\t}\n",
            "\tstatic readonly EMPTY = new Range(null!, 0);\n",
            "}\n",
        );
        let module = parse_module(src);
        assert_eq!(
            text_of(&module, "Range"),
            concat!(
                "export class Range {\n",
                "\t/**\n\t * Start line.\n\t */\n",
                "\tpublic readonly startLine: number;\n",
                "\tconstructor(foo: IFoo, startLine: number);\n",
                "\tpublic isEmpty(): boolean;\n",
                "\tstatic readonly EMPTY;\n",
                "}",
            )
        );
    }

    #[test]
    fn test_nested_exports_are_not_top_level() {
        let src = "namespace N {\nexport const inner = 1;\n}\nexport declare const outer: string;\n";
        let module = parse_module(src);
        assert!(!module.contains("inner"));
        assert_eq!(text_of(&module, "outer"), "export const outer: string;");
    }
}
