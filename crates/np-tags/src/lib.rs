//! Scanner for EJS-style template tags.
//!
//! This crate finds `<% ... %>` tags in template text, splits them into
//! their delimiter, modifier and content parts, classifies what a tag is
//! for, and locates fenced code blocks so that blocks marked as "ignore"
//! are never scanned.
//!
//! # Example
//!
//! ```rust
//! use np_tags::{classify, get_tags, TagConfig, TagKind};
//!
//! let text = "Hello <%= name %>!\n<%# a comment %>\n<%- include('header') %>";
//! let tags = get_tags(text);
//! assert_eq!(tags, vec!["<%= name %>", "<%# a comment %>", "<%- include('header') %>"]);
//!
//! let config = TagConfig::default();
//! assert_eq!(classify(tags[1], &config), TagKind::Comment);
//! assert_eq!(classify(tags[2], &config), TagKind::Include);
//! ```
//!
//! # Tag Syntax
//!
//! A tag runs from an opening `<%` to the *next* `%>`, across newlines. The
//! character right after `<%` may be a [`Modifier`]:
//!
//! | Open  | Meaning                       |
//! |-------|-------------------------------|
//! | `<%`  | scriptlet (code, no output)   |
//! | `<%=` | escaped output                |
//! | `<%-` | raw output                    |
//! | `<%~` | trimmed output                |
//! | `<%#` | comment                       |
//!
//! Closing with `-%>` instead of `%>` trims the newline that follows the tag.
//!
//! # Ignored Code Blocks
//!
//! Fenced blocks carrying an ignore marker (see [`fence`]) are skipped by
//! [`scan_tags`] and [`validate`], so template syntax quoted inside them is
//! neither processed nor reported.

mod classify;
pub mod fence;

use std::fmt;
use std::ops::Range;

pub use classify::{
    call_name, classify, is_code, is_comment_tag, is_prompt_tag, is_return_tag,
    is_template_module, is_variable_tag, TagConfig, TagKind, DEFAULT_PROMPT_FUNCTIONS,
    DEFAULT_TEMPLATE_MODULES, MIN_CODE_TAG_LEN,
};
pub use fence::{code_blocks, ignored_blocks, ignored_ranges, CodeBlock, IgnoreMarker};

/// Opening tag delimiter.
pub const OPEN_DELIMITER: &str = "<%";

/// Closing tag delimiter.
pub const CLOSE_DELIMITER: &str = "%>";

/// Modifier character following the opening delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `<%#` - the tag is a comment and produces nothing.
    Comment,
    /// `<%-` - output the value without escaping.
    Raw,
    /// `<%=` - output the value HTML-escaped.
    Escaped,
    /// `<%~` - output the value with surrounding whitespace trimmed.
    Trim,
}

impl Modifier {
    /// Maps a modifier character to its [`Modifier`].
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '#' => Some(Modifier::Comment),
            '-' => Some(Modifier::Raw),
            '=' => Some(Modifier::Escaped),
            '~' => Some(Modifier::Trim),
            _ => None,
        }
    }

    /// The character that introduces this modifier.
    pub fn as_char(self) -> char {
        match self {
            Modifier::Comment => '#',
            Modifier::Raw => '-',
            Modifier::Escaped => '=',
            Modifier::Trim => '~',
        }
    }

    /// Whether the tag writes a value into the output.
    pub fn is_output(self) -> bool {
        matches!(self, Modifier::Raw | Modifier::Escaped | Modifier::Trim)
    }
}

/// A tag found in template text, with its byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpan<'a> {
    /// The full tag, delimiters included.
    pub text: &'a str,
    /// Byte offset of the opening delimiter.
    pub start: usize,
    /// Byte offset just past the closing delimiter.
    pub end: usize,
}

impl TagSpan<'_> {
    /// The byte range covered by the tag.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A tag broken into delimiters, modifier and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagParts<'a> {
    /// Opening delimiter including the modifier character, e.g. `<%-`.
    pub open: &'a str,
    /// Modifier following `<%`, if any.
    pub modifier: Option<Modifier>,
    /// Everything between the opening and closing delimiters, untrimmed.
    pub content: &'a str,
    /// Closing delimiter, `%>` or `-%>`.
    pub close: &'a str,
}

impl TagParts<'_> {
    /// Whether the tag swallows the newline that follows it.
    pub fn trims_newline(&self) -> bool {
        self.close == "-%>"
    }
}

/// Splits a tag into its parts.
///
/// Returns `None` when `tag` does not start with `<%` and end with `%>`.
pub fn split_tag(tag: &str) -> Option<TagParts<'_>> {
    let inner = tag
        .strip_prefix(OPEN_DELIMITER)?
        .strip_suffix(CLOSE_DELIMITER)?;

    let modifier = inner.chars().next().and_then(Modifier::from_char);
    let open_len = OPEN_DELIMITER.len() + usize::from(modifier.is_some());
    let body = &tag[open_len..tag.len() - CLOSE_DELIMITER.len()];

    let close_len = if body.ends_with('-') {
        CLOSE_DELIMITER.len() + 1
    } else {
        CLOSE_DELIMITER.len()
    };
    let content_end = tag.len() - close_len;

    Some(TagParts {
        open: &tag[..open_len],
        modifier,
        content: &tag[open_len..content_end.max(open_len)],
        close: &tag[content_end.max(open_len)..],
    })
}

/// Returns the trimmed content of a tag, or `""` if it is not a tag.
pub fn tag_content(tag: &str) -> &str {
    split_tag(tag).map(|parts| parts.content.trim()).unwrap_or("")
}

/// Token types produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Plain text between tags.
    Text { text: &'a str, start: usize },
    /// A complete tag.
    Tag(TagSpan<'a>),
    /// An opening delimiter with no closing delimiter after it. Holds the
    /// rest of the input.
    Unclosed { text: &'a str, start: usize },
}

/// Splits template text into text and tag tokens.
///
/// Each tag is the shortest span from `<%` to the next `%>`, so a tag may
/// cover several lines.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }

        let start = self.pos;
        let remaining = &self.input[start..];

        match remaining.find(OPEN_DELIMITER) {
            Some(0) => {
                let after_open = OPEN_DELIMITER.len();
                match remaining[after_open..].find(CLOSE_DELIMITER) {
                    Some(offset) => {
                        let len = after_open + offset + CLOSE_DELIMITER.len();
                        self.pos += len;
                        Some(Token::Tag(TagSpan {
                            text: &remaining[..len],
                            start,
                            end: start + len,
                        }))
                    }
                    None => {
                        self.pos = self.input.len();
                        Some(Token::Unclosed {
                            text: remaining,
                            start,
                        })
                    }
                }
            }
            Some(offset) => {
                self.pos += offset;
                Some(Token::Text {
                    text: &remaining[..offset],
                    start,
                })
            }
            None => {
                self.pos = self.input.len();
                Some(Token::Text {
                    text: remaining,
                    start,
                })
            }
        }
    }
}

fn in_ranges(pos: usize, ranges: &[Range<usize>]) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Finds every tag in `text`, in order, skipping ignored code blocks.
pub fn scan_tags(text: &str) -> Vec<TagSpan<'_>> {
    let ignored = ignored_ranges(text);
    Tokenizer::new(text)
        .filter_map(|token| match token {
            Token::Tag(span) if !in_ranges(span.start, &ignored) => Some(span),
            _ => None,
        })
        .collect()
}

/// Convenience wrapper around [`scan_tags`] returning only the tag text.
pub fn get_tags(text: &str) -> Vec<&str> {
    scan_tags(text).into_iter().map(|span| span.text).collect()
}

/// What went wrong in a [`TagSyntaxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSyntaxErrorKind {
    /// `<%` without a following `%>`.
    UnclosedTag,
    /// `%>` without a preceding `<%`.
    UnmatchedClose,
}

/// Unbalanced tag delimiters, located by line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSyntaxError {
    pub kind: TagSyntaxErrorKind,
    /// 1-based line of the offending delimiter.
    pub line: usize,
    /// 1-based column (in characters) of the offending delimiter.
    pub column: usize,
    /// Numbered source lines around the error, offending line marked `>`.
    pub context: String,
}

impl fmt::Display for TagSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TagSyntaxErrorKind::UnclosedTag => write!(
                f,
                "Template has an unclosed tag: `{}` at line {}, column {} has no matching `{}`",
                OPEN_DELIMITER, self.line, self.column, CLOSE_DELIMITER
            )?,
            TagSyntaxErrorKind::UnmatchedClose => write!(
                f,
                "Template has an unmatched closing tag: `{}` at line {}, column {} has no matching `{}`",
                CLOSE_DELIMITER, self.line, self.column, OPEN_DELIMITER
            )?,
        }
        write!(f, "\n\n{}", self.context)
    }
}

impl std::error::Error for TagSyntaxError {}

/// Number of lines shown on each side of the offending line.
const CONTEXT_LINES: usize = 2;

impl TagSyntaxError {
    fn at(kind: TagSyntaxErrorKind, text: &str, pos: usize) -> Self {
        let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
        let line = text[..pos].matches('\n').count() + 1;
        let column = text[line_start..pos].chars().count() + 1;

        let lines: Vec<&str> = text.lines().collect();
        let first = line.saturating_sub(CONTEXT_LINES).max(1);
        let last = (line + CONTEXT_LINES).min(lines.len().max(1));
        let width = last.to_string().len();

        let context = (first..=last)
            .map(|n| {
                let marker = if n == line { '>' } else { ' ' };
                let source = lines.get(n - 1).copied().unwrap_or("");
                format!("{} {:>width$} | {}", marker, n, source, width = width)
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            kind,
            line,
            column,
            context,
        }
    }
}

/// Checks that every `<%` is closed by a `%>` before the next `<%`, and that
/// no `%>` appears on its own.
///
/// Delimiters inside ignored code blocks are not checked.
pub fn validate(text: &str) -> Result<(), TagSyntaxError> {
    let ignored = ignored_ranges(text);
    let bytes = text.as_bytes();
    let mut open: Option<usize> = None;
    let mut i = 0;

    while i + 1 < bytes.len() {
        let pair = &bytes[i..i + 2];
        if pair == OPEN_DELIMITER.as_bytes() && !in_ranges(i, &ignored) {
            if let Some(start) = open {
                return Err(TagSyntaxError::at(
                    TagSyntaxErrorKind::UnclosedTag,
                    text,
                    start,
                ));
            }
            open = Some(i);
            i += 2;
        } else if pair == CLOSE_DELIMITER.as_bytes() && !in_ranges(i, &ignored) {
            if open.take().is_none() {
                return Err(TagSyntaxError::at(
                    TagSyntaxErrorKind::UnmatchedClose,
                    text,
                    i,
                ));
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    match open {
        Some(start) => Err(TagSyntaxError::at(
            TagSyntaxErrorKind::UnclosedTag,
            text,
            start,
        )),
        None => Ok(()),
    }
}
