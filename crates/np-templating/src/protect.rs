//! Placeholder protection for text that later passes must not touch.
//!
//! Two kinds of text are swapped out for placeholders and put back later:
//!
//! - Template literals (backtick strings) inside a tag's code, before the
//!   statement rewriter splits on semicolons and newlines.
//! - Fenced code blocks marked with an ignore comment, before final
//!   evaluation, so their content comes out byte for byte.
//!
//! Placeholders are built from a prefix that does not occur in the input,
//! and are restored left to right, so restoration is exact.

use np_tags::{ignored_blocks, IgnoreMarker};

const LITERAL_PREFIX: &str = "__NP_LITERAL_";
const BLOCK_PREFIX: &str = "__NP_IGNORED_BLOCK_";

/// A placeholder and the text it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    pub placeholder: String,
    pub original: String,
}

fn unique_prefix(text: &str, base: &str) -> String {
    let mut prefix = base.to_string();
    while text.contains(&prefix) {
        prefix.push('X');
    }
    prefix
}

/// Byte index of the backtick closing the literal that opens `s`.
///
/// Handles escapes and `${ ... }` substitutions, including literals nested
/// inside them.
fn literal_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'`' if depth == 0 => return Some(i),
            b'`' => {
                i += literal_end(&s[i..])? + 1;
                continue;
            }
            b'$' if depth == 0 && bytes.get(i + 1) == Some(&b'{') => {
                depth = 1;
                i += 2;
                continue;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    None
}

/// Replaces every backtick template literal in `code` with a placeholder.
///
/// An unterminated backtick is left as it is.
pub fn protect_template_literals(code: &str) -> (String, Vec<Protected>) {
    let prefix = unique_prefix(code, LITERAL_PREFIX);
    let mut output = String::with_capacity(code.len());
    let mut literals = Vec::new();
    let mut rest = code;

    while let Some(start) = rest.find('`') {
        let Some(len) = literal_end(&rest[start..]) else {
            break;
        };
        let end = start + len + 1;
        let placeholder = format!("{}{}__", prefix, literals.len());

        output.push_str(&rest[..start]);
        output.push_str(&placeholder);
        literals.push(Protected {
            placeholder,
            original: rest[start..end].to_string(),
        });
        rest = &rest[end..];
    }

    output.push_str(rest);
    (output, literals)
}

/// Puts protected text back in place of its placeholders.
///
/// Placeholders are searched for in order, each after the previous one.
/// One that has gone missing is skipped.
pub fn restore(text: &str, protected: &[Protected]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    for item in protected {
        if let Some(pos) = rest.find(&item.placeholder) {
            output.push_str(&rest[..pos]);
            output.push_str(&item.original);
            rest = &rest[pos + item.placeholder.len()..];
        }
    }

    output.push_str(rest);
    output
}

/// Alias of [`restore`] for template literal maps.
pub fn restore_template_literals(code: &str, literals: &[Protected]) -> String {
    restore(code, literals)
}

/// Every fenced block carrying an ignore marker, as it appears in `text`.
pub fn extract_ignored_blocks(text: &str) -> Vec<&str> {
    ignored_blocks(text).into_iter().map(|block| block.text).collect()
}

/// Protects ignored code blocks ahead of evaluation.
///
/// Blocks ignored by a comment inside them become placeholders and are
/// returned for [`restore_ignored_blocks`]. Blocks whose fence declares
/// `: ignore` are removed together with their trailing newline and are not
/// returned.
pub fn temp_protect_ignored_blocks(text: &str) -> (String, Vec<Protected>) {
    let prefix = unique_prefix(text, BLOCK_PREFIX);
    let mut output = String::with_capacity(text.len());
    let mut saved = Vec::new();
    let mut last = 0;

    for block in ignored_blocks(text) {
        output.push_str(&text[last..block.start]);
        last = block.end;

        match block.ignore_marker() {
            Some(IgnoreMarker::Comment) => {
                let placeholder = format!("{}{}__", prefix, saved.len());
                output.push_str(&placeholder);
                saved.push(Protected {
                    placeholder,
                    original: block.text.to_string(),
                });
            }
            Some(IgnoreMarker::Fence) => {
                let tail = &text[last..];
                if tail.starts_with("\r\n") {
                    last += 2;
                } else if tail.starts_with('\n') {
                    last += 1;
                }
            }
            None => output.push_str(block.text),
        }
    }

    output.push_str(&text[last..]);
    (output, saved)
}

/// Restores blocks saved by [`temp_protect_ignored_blocks`].
pub fn restore_ignored_blocks(text: &str, saved: &[Protected]) -> String {
    restore(text, saved)
}
