//! Fenced code block detection.
//!
//! A fenced block opens with a line starting with three backticks (indented
//! by at most three spaces) and closes at the next line holding only three
//! backticks. An opening fence with no closing fence is not a block.
//!
//! # Ignore Markers
//!
//! A block opts out of template processing in one of two ways:
//!
//! - [`IgnoreMarker::Comment`]: its body (or the rest of its fence line)
//!   contains `/* ignore */` or `// ignore`. The block is kept verbatim.
//! - [`IgnoreMarker::Fence`]: its fence declares `<language>: ignore`, with
//!   any spacing around the colon. The block is dropped from the output.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE_IGNORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\w-]*\s*:\s*ignore\b").expect("fence ignore pattern is valid")
});

static COMMENT_IGNORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/\*\s*ignore\s*\*/|//\s*ignore\b").expect("comment ignore pattern is valid")
});

const FENCE: &str = "```";
const MAX_FENCE_INDENT: usize = 3;

/// How a block marks itself as ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreMarker {
    /// An ignore comment inside the block.
    Comment,
    /// An ignore declaration on the opening fence.
    Fence,
}

/// A fenced code block and its location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlock<'a> {
    /// The whole block from the opening fence to the closing fence, without
    /// the newline after the closing fence.
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// Everything after the opening backticks, trimmed.
    pub info: &'a str,
    /// Lines between the fences, without the final newline.
    pub body: &'a str,
}

impl CodeBlock<'_> {
    /// The language named on the opening fence, if any.
    pub fn language(&self) -> &str {
        self.info
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()
            .unwrap_or("")
    }

    pub fn ignore_marker(&self) -> Option<IgnoreMarker> {
        if FENCE_IGNORE.is_match(self.info) {
            Some(IgnoreMarker::Fence)
        } else if COMMENT_IGNORE.is_match(self.info) || COMMENT_IGNORE.is_match(self.body) {
            Some(IgnoreMarker::Comment)
        } else {
            None
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

fn fence_info(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > MAX_FENCE_INDENT {
        return None;
    }
    line[indent..].strip_prefix(FENCE)
}

/// Finds every closed fenced code block in `text`.
pub fn code_blocks(text: &str) -> Vec<CodeBlock<'_>> {
    let mut blocks = Vec::new();
    // (block start, info, body start)
    let mut open: Option<(usize, &str, usize)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);

        let Some(rest) = fence_info(content) else {
            continue;
        };

        match open {
            None => open = Some((line_start, rest.trim(), offset)),
            Some((start, info, body_start)) if rest.trim().is_empty() => {
                let body_end = if line_start > body_start {
                    line_start - 1
                } else {
                    body_start
                };
                let body = text[body_start..body_end].trim_end_matches('\r');
                let end = line_start + content.len();
                blocks.push(CodeBlock {
                    text: &text[start..end],
                    start,
                    end,
                    info,
                    body,
                });
                open = None;
            }
            Some(_) => {}
        }
    }

    blocks
}

/// Blocks carrying either kind of ignore marker.
pub fn ignored_blocks(text: &str) -> Vec<CodeBlock<'_>> {
    code_blocks(text)
        .into_iter()
        .filter(|block| block.ignore_marker().is_some())
        .collect()
}

/// Byte ranges of all ignored blocks.
pub fn ignored_ranges(text: &str) -> Vec<Range<usize>> {
    ignored_blocks(text).iter().map(CodeBlock::range).collect()
}
