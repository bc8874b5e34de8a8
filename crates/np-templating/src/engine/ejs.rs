//! EJS-dialect evaluation on top of MiniJinja.
//!
//! [`transpile`] rewrites a template's remaining tags into MiniJinja
//! syntax. Text between tags is copied as is, quoted as a string
//! expression where it contains MiniJinja delimiters.
//!
//! Supported scriptlets:
//!
//! - `if (c) {`, `} else if (c) {`, `} else {`, `}`
//! - `for (const x of xs) {` and `xs.forEach((x) => {` ... `})`
//! - `const x = e`, `let x`, `x = e`, `x += e`
//! - calls evaluated for their side effects: `f(x)`
//!
//! Anything else is a [`RenderError::TemplateError`].

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use np_tags::{split_tag, Modifier, Token, Tokenizer};
use once_cell::sync::Lazy;
use regex::Regex;

use super::expr::{string_literal, translate};
use super::TemplateEngine;
use crate::error::RenderError;
use crate::syntax::CodeBytes;

const IDENT: &str = r"[A-Za-z_$][\w$]*";

static ELSE_IF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\}\s*else\s+if\s*\((.*)\)\s*\{$").expect("else-if pattern is valid")
});

static ELSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\}\s*else\s*\{$").expect("else pattern is valid"));

static IF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^if\s*\((.*)\)\s*\{$").expect("if pattern is valid"));

static FOR_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^for\s*\(\s*(?:(?:const|let|var)\s+)?({IDENT})\s+of\s+(.*)\)\s*\{{$"
    ))
    .expect("for-of pattern is valid")
});

static FOR_EACH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(.+)\.forEach\(\s*(?:async\s*)?(?:\(\s*({IDENT})\s*\)|({IDENT}))\s*=>\s*\{{$"
    ))
    .expect("forEach pattern is valid")
});

static CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\}\s*(\))?$").expect("close pattern is valid"));

static DECLARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?:const|let|var)\s+({IDENT})(?:\s*=\s*(.+))?$"))
        .expect("declare pattern is valid")
});

static ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^({IDENT})\s*([+\-*/]?)=\s*([^=].*)$")).expect("assign pattern is valid")
});

static CALL_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?:await\s+)?{IDENT}(?:\.{IDENT})*\s*\(.*\)$"))
        .expect("call statement pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    For,
    ForEach,
}

/// Splits scriptlet code into statements.
///
/// Statements end at `;` and newlines, after a block-opening `{` and around
/// a block-closing `}`. `} else` stays together.
fn statements(code: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_start = 0;
    let mut depth = 0i32;
    let mut braces = 0i32;
    let mut skip_until = 0;

    for (i, b) in CodeBytes::new(code) {
        if i < skip_until {
            continue;
        }
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b';' | b'\n' if depth <= 0 && braces == 0 => {
                push(&mut result, &code[current_start..i]);
                current_start = i + 1;
            }
            b'{' if depth <= 0 => {
                let head = code[current_start..i].trim_end();
                if head.ends_with(')') || head.ends_with("else") || head.ends_with("=>") {
                    push(&mut result, &code[current_start..=i]);
                    current_start = i + 1;
                } else {
                    braces += 1;
                }
            }
            b'}' if depth <= 0 && braces > 0 => braces -= 1,
            b'}' if depth <= 0 => {
                push(&mut result, &code[current_start..i]);
                current_start = i;

                let rest = &code[i + 1..];
                let trimmed = rest.trim_start();
                let gap = rest.len() - trimmed.len();
                if trimmed.starts_with("else") {
                    continue;
                }
                let end = if trimmed.starts_with(')') {
                    i + 1 + gap + 1
                } else {
                    i + 1
                };
                push(&mut result, &code[i..end]);
                current_start = end;
                skip_until = end;
            }
            _ => {}
        }
    }

    push(&mut result, &code[current_start..]);
    result
}

fn push(result: &mut Vec<String>, statement: &str) {
    let statement = statement.trim().trim_end_matches(';').trim();
    if !statement.is_empty() {
        result.push(statement.to_string());
    }
}

fn pop(blocks: &mut Vec<Block>, statement: &str) -> Result<Block, RenderError> {
    blocks
        .pop()
        .ok_or_else(|| RenderError::TemplateError(format!("unmatched `{}`", statement)))
}

fn scriptlet(code: &str, blocks: &mut Vec<Block>, out: &mut String) -> Result<(), RenderError> {
    for statement in statements(code) {
        let s = statement.as_str();

        if let Some(caps) = ELSE_IF.captures(s) {
            match blocks.last() {
                Some(Block::If) => out.push_str(&format!("{{% elif {} %}}", translate(&caps[1])?)),
                _ => return Err(RenderError::TemplateError(format!("`{}` without `if`", s))),
            }
        } else if ELSE.is_match(s) {
            match blocks.last() {
                Some(Block::If) => out.push_str("{% else %}"),
                _ => return Err(RenderError::TemplateError(format!("`{}` without `if`", s))),
            }
        } else if let Some(caps) = IF.captures(s) {
            out.push_str(&format!("{{% if {} %}}", translate(&caps[1])?));
            blocks.push(Block::If);
        } else if let Some(caps) = FOR_OF.captures(s) {
            out.push_str(&format!("{{% for {} in {} %}}", &caps[1], translate(&caps[2])?));
            blocks.push(Block::For);
        } else if let Some(caps) = FOR_EACH.captures(s) {
            let item = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("item");
            out.push_str(&format!("{{% for {} in {} %}}", item, translate(&caps[1])?));
            blocks.push(Block::ForEach);
        } else if let Some(caps) = CLOSE.captures(s) {
            let block = pop(blocks, s)?;
            let closes_call = caps.get(1).is_some();
            match (block, closes_call) {
                (Block::If, false) => out.push_str("{% endif %}"),
                (Block::For, false) | (Block::ForEach, true) => out.push_str("{% endfor %}"),
                _ => return Err(RenderError::TemplateError(format!("mismatched `{}`", s))),
            }
        } else if let Some(caps) = DECLARE.captures(s) {
            let value = match caps.get(2) {
                Some(value) => translate(value.as_str())?,
                None => "none".to_string(),
            };
            out.push_str(&format!("{{% set {} = {} %}}", &caps[1], value));
        } else if let Some(caps) = ASSIGN.captures(s) {
            let name = &caps[1];
            let value = translate(&caps[3])?;
            match &caps[2] {
                "" => out.push_str(&format!("{{% set {} = {} %}}", name, value)),
                op => out.push_str(&format!("{{% set {} = {} {} ({}) %}}", name, name, op, value)),
            }
        } else if CALL_STATEMENT.is_match(s) {
            out.push_str(&format!("{{% set _ = {} %}}", translate(s)?));
        } else {
            return Err(RenderError::TemplateError(format!("unsupported statement `{}`", s)));
        }
    }
    Ok(())
}

/// Whether a text chunk would form a MiniJinja delimiter, either on its own
/// or together with the `{{`/`{%` and `}}`/`%}` emitted for adjacent tags.
fn needs_quoting(text: &str) -> bool {
    text.contains("{{")
        || text.contains("{%")
        || text.contains("{#")
        || text.ends_with('{')
        || text.starts_with('}')
}

/// Rewrites EJS-dialect template text into a MiniJinja template.
///
/// ```rust
/// use np_templating::engine::transpile;
///
/// let jinja = transpile("<% if (done) { %>Done, <%= name %>.<% } %>").unwrap();
/// assert_eq!(jinja, "{% if done %}Done, {{ (name)|output|escape }}.{% endif %}");
/// ```
pub fn transpile(template: &str) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut blocks: Vec<Block> = Vec::new();
    let mut trim_newline = false;

    for token in Tokenizer::new(template) {
        match token {
            Token::Text { text, .. } => {
                let text = if trim_newline {
                    text.strip_prefix("\r\n")
                        .or_else(|| text.strip_prefix('\n'))
                        .unwrap_or(text)
                } else {
                    text
                };
                trim_newline = false;

                if text.is_empty() {
                    continue;
                }
                if needs_quoting(text) {
                    out.push_str(&format!("{{{{ {} }}}}", string_literal(text)));
                } else {
                    out.push_str(text);
                }
            }
            Token::Tag(span) => {
                let parts = split_tag(span.text).ok_or_else(|| {
                    RenderError::TemplateError(format!("malformed tag `{}`", span.text))
                })?;
                trim_newline = parts.trims_newline();
                let content = parts.content.trim();

                match parts.modifier {
                    Some(Modifier::Comment) => {}
                    _ if content.is_empty() => {}
                    Some(Modifier::Escaped) => {
                        out.push_str(&format!("{{{{ ({})|output|escape }}}}", translate(content)?))
                    }
                    Some(Modifier::Raw) => {
                        out.push_str(&format!("{{{{ ({})|output }}}}", translate(content)?))
                    }
                    Some(Modifier::Trim) => {
                        out.push_str(&format!("{{{{ ({})|output|trim }}}}", translate(content)?))
                    }
                    None => scriptlet(content, &mut blocks, &mut out)?,
                }
            }
            Token::Unclosed { start, .. } => {
                return Err(RenderError::TemplateError(format!(
                    "unclosed tag at byte {}",
                    start
                )));
            }
        }
    }

    if let Some(block) = blocks.last() {
        return Err(RenderError::TemplateError(format!(
            "unclosed `{}` block",
            match block {
                Block::If => "if",
                Block::For | Block::ForEach => "for",
            }
        )));
    }

    Ok(out)
}

/// The default expression evaluator.
///
/// Remaining tags are transpiled with [`transpile`] and rendered by a
/// MiniJinja environment with strict undefined handling, so a reference to
/// a variable that does not exist is an error rather than empty output.
///
/// # Example
///
/// ```rust
/// use np_templating::{EjsEngine, TemplateEngine};
/// use serde_json::json;
///
/// let mut engine = EjsEngine::new();
/// engine
///     .environment_mut()
///     .add_function("shout", |s: String| s.to_uppercase());
///
/// let out = engine
///     .render_template("<%= shout(name) %>!", &json!({"name": "hey"}))
///     .unwrap();
/// assert_eq!(out, "HEY!");
/// ```
pub struct EjsEngine {
    env: Environment<'static>,
}

impl EjsEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        register_filters(&mut env);
        Self { env }
    }

    /// Returns the MiniJinja environment, for registering functions and
    /// filters that templates call.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl Default for EjsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for EjsEngine {
    fn render_template(&self, template: &str, data: &serde_json::Value) -> Result<String, RenderError> {
        let source = transpile(template)?;
        tracing::trace!(%source, "transpiled template");
        let value = Value::from_serialize(data);
        Ok(self.env.render_str(&source, value)?)
    }
}

/// Registers the filters transpiled templates rely on.
///
/// `output` prints `none` as nothing, the way EJS prints `null`, and
/// rejects undefined values.
pub fn register_filters(env: &mut Environment<'static>) {
    env.add_filter("output", |value: Value| -> Result<String, Error> {
        if value.is_undefined() {
            Err(Error::new(ErrorKind::UndefinedError, "value is undefined"))
        } else if value.is_none() {
            Ok(String::new())
        } else {
            Ok(value.to_string())
        }
    });
}
