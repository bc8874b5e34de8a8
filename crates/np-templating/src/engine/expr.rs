//! Translation of JavaScript-like expressions into MiniJinja expressions.
//!
//! Only the subset template authors use in output tags is covered:
//!
//! | JavaScript            | MiniJinja                 |
//! |-----------------------|---------------------------|
//! | `a === b`, `a !== b`  | `a == b`, `a != b`        |
//! | `a && b`, `a \|\| b`  | `a and b`, `a or b`       |
//! | `!a`                  | `not a`                   |
//! | `null`, `undefined`   | `none`                    |
//! | `c ? a : b`           | `(a if c else b)`         |
//! | `` `x ${y}` ``        | `("x " ~ (y))`            |
//! | `s.length`            | `s\|length`               |
//! | `s.toUpperCase()`     | `s\|upper`                |
//! | `await f()`           | `f()`                     |
//!
//! Anything else is passed through and left for MiniJinja to accept or
//! reject.

use crate::error::RenderError;
use crate::syntax::CodeBytes;

/// String methods and properties that map onto filters.
///
/// The flag says whether the call's argument list is kept.
const METHOD_FILTERS: &[(&str, &str, bool)] = &[
    ("toUpperCase", "upper", false),
    ("toLowerCase", "lower", false),
    ("trim", "trim", false),
    ("join", "join", true),
];

/// Translates one expression.
pub(crate) fn translate(expr: &str) -> Result<String, RenderError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(RenderError::TemplateError("empty expression".to_string()));
    }

    if let Some((cond, yes, no)) = split_ternary(expr) {
        return Ok(format!(
            "({} if {} else {})",
            translate(yes)?,
            translate(cond)?,
            translate(no)?
        ));
    }

    translate_tokens(expr)
}

/// Splits `c ? a : b` at its top-level operators.
fn split_ternary(s: &str) -> Option<(&str, &str, &str)> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut question: Option<usize> = None;
    let mut nested = 0usize;

    for (i, b) in CodeBytes::new(s) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'?' if depth == 0 => {
                let next = bytes.get(i + 1).copied();
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                if next == Some(b'.') || next == Some(b'?') || prev == Some(b'?') {
                    continue;
                }
                if question.is_none() {
                    question = Some(i);
                } else {
                    nested += 1;
                }
            }
            b':' if depth == 0 => {
                if let Some(q) = question {
                    if nested == 0 {
                        return Some((&s[..q], &s[q + 1..i], &s[i + 1..]));
                    }
                    nested -= 1;
                }
            }
            _ => {}
        }
    }
    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Index of the quote closing the string that opens at `start`.
fn string_end(chars: &[char], start: usize) -> Result<usize, RenderError> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Ok(i),
            _ => i += 1,
        }
    }
    Err(RenderError::TemplateError("unterminated string literal".to_string()))
}

/// A MiniJinja double-quoted string literal holding `text`.
pub(crate) fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Converts the template literal opening at `start`.
///
/// Returns the translation and the index of the closing backtick.
fn template_literal(chars: &[char], start: usize) -> Result<(String, usize), RenderError> {
    let mut parts: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            '`' => {
                if !text.is_empty() || parts.is_empty() {
                    parts.push(string_literal(&text));
                }
                return Ok((format!("({})", parts.join(" ~ ")), i));
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                if !text.is_empty() {
                    parts.push(string_literal(&std::mem::take(&mut text)));
                }
                let (inner, end) = substitution(chars, i + 2)?;
                parts.push(format!("({})", translate(&inner)?));
                i = end + 1;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(RenderError::TemplateError("unterminated template literal".to_string()))
}

/// Reads a `${ ... }` body starting after the `${`.
fn substitution(chars: &[char], start: usize) -> Result<(String, usize), RenderError> {
    let mut depth = 0usize;
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => i = string_end(chars, i)?,
            '`' => i = template_literal(chars, i)?.1,
            '{' => depth += 1,
            '}' if depth == 0 => return Ok((chars[start..i].iter().collect(), i)),
            '}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    Err(RenderError::TemplateError("unterminated substitution".to_string()))
}

fn starts_with_at(chars: &[char], i: usize, pat: &str) -> bool {
    pat.chars().enumerate().all(|(k, p)| chars.get(i + k) == Some(&p))
}

fn translate_tokens(expr: &str) -> Result<String, RenderError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let end = string_end(&chars, i)?;
                out.extend(&chars[i..=end]);
                i = end + 1;
            }
            '`' => {
                let (literal, end) = template_literal(&chars, i)?;
                out.push_str(&literal);
                i = end + 1;
            }
            '=' if starts_with_at(&chars, i, "===") => {
                out.push_str("==");
                i += 3;
            }
            '!' if starts_with_at(&chars, i, "!==") => {
                out.push_str("!=");
                i += 3;
            }
            '!' if starts_with_at(&chars, i, "!=") => {
                out.push_str("!=");
                i += 2;
            }
            '!' => {
                out.push_str(" not ");
                i += 1;
            }
            '&' if starts_with_at(&chars, i, "&&") => {
                out.push_str(" and ");
                i += 2;
            }
            '|' if starts_with_at(&chars, i, "||") => {
                out.push_str(" or ");
                i += 2;
            }
            '.' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let name_start = i + 1;
                let mut end = name_start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[name_start..end].iter().collect();

                if name == "length" {
                    out.push_str("|length");
                    i = end;
                } else if let Some((_, filter, keeps_args)) =
                    METHOD_FILTERS.iter().find(|(method, _, _)| *method == name)
                {
                    out.push('|');
                    out.push_str(filter);
                    i = end;
                    if !keeps_args && starts_with_at(&chars, i, "()") {
                        i += 2;
                    }
                } else {
                    out.push('.');
                    out.push_str(&name);
                    i = end;
                }
            }
            c if is_ident_start(c) => {
                let mut end = i;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                i = end;
                match word.as_str() {
                    "null" | "undefined" => out.push_str("none"),
                    "await" => {
                        while i < chars.len() && chars[i].is_whitespace() {
                            i += 1;
                        }
                    }
                    _ => out.push_str(&word),
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out.trim().to_string())
}
