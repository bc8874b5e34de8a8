//! Quote-aware scanning helpers for the JavaScript-like code inside tags.
//!
//! None of this is a parser. It only answers questions like "where is the
//! next top-level comma" while skipping over string literals.

/// Iterates over the bytes of `s` that are outside string literals.
///
/// Quotes (`'`, `"`, backtick) and everything between them are skipped,
/// honouring backslash escapes.
pub(crate) struct CodeBytes<'a> {
    bytes: &'a [u8],
    pos: usize,
    quote: Option<u8>,
}

impl<'a> CodeBytes<'a> {
    pub(crate) fn new(s: &'a str) -> Self {
        Self {
            bytes: s.as_bytes(),
            pos: 0,
            quote: None,
        }
    }
}

impl Iterator for CodeBytes<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.bytes.len() {
            let i = self.pos;
            let b = self.bytes[i];
            self.pos += 1;

            match self.quote {
                Some(_) if b == b'\\' => self.pos += 1,
                Some(q) if b == q => self.quote = None,
                Some(_) => {}
                None if matches!(b, b'\'' | b'"' | b'`') => self.quote = Some(b),
                None => return Some((i, b)),
            }
        }
        None
    }
}

/// Which brackets nest when splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Nesting {
    /// `(` and `[` only. Used for statements, so `{` blocks still split.
    Parens,
    /// `(`, `[` and `{`. Used for argument lists.
    All,
}

/// Splits `s` on `sep` where it appears outside strings and brackets.
pub(crate) fn split_top_level(s: &str, sep: u8, nesting: Nesting) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, b) in CodeBytes::new(s) {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b'{' if nesting == Nesting::All => depth += 1,
            b'}' if nesting == Nesting::All => depth -= 1,
            _ if b == sep && depth <= 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    parts.push(&s[start..]);
    parts
}

/// Index of the bracket closing the one at `open`.
pub(crate) fn matching_close(s: &str, open: usize) -> Option<usize> {
    let opener = *s.as_bytes().get(open)?;
    let closer = match opener {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        _ => return None,
    };

    let mut depth = 0i32;
    for (i, b) in CodeBytes::new(&s[open..]) {
        if b == opener {
            depth += 1;
        } else if b == closer {
            depth -= 1;
            if depth == 0 {
                return Some(open + i);
            }
        }
    }
    None
}

/// Net count of unclosed `(` and `[` outside strings.
pub(crate) fn open_brackets(s: &str) -> i32 {
    CodeBytes::new(s).fold(0, |depth, (_, b)| match b {
        b'(' | b'[' => depth + 1,
        b')' | b']' => depth - 1,
        _ => depth,
    })
}

/// Whether `s` contains a conditional `? :` outside strings.
///
/// Optional chaining (`?.`) and nullish coalescing (`??`) do not count.
pub(crate) fn is_ternary(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut question = false;

    for (i, b) in CodeBytes::new(s) {
        match b {
            b'?' => {
                let next = bytes.get(i + 1).copied();
                let prev = i.checked_sub(1).and_then(|p| bytes.get(p)).copied();
                if next != Some(b'.') && next != Some(b'?') && prev != Some(b'?') {
                    question = true;
                }
            }
            b':' if question => return true,
            _ => {}
        }
    }
    false
}

/// Strips one pair of matching quotes (`'`, `"` or backticks).
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['\'', '"', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Whether `s` is a single quoted string literal.
pub(crate) fn is_quoted(s: &str) -> bool {
    let s = s.trim();
    let Some(first) = s.bytes().next() else {
        return false;
    };
    if !matches!(first, b'\'' | b'"' | b'`') || s.len() < 2 || !s.ends_with(first as char) {
        return false;
    }
    // The closing quote must be the last byte outside any string.
    CodeBytes::new(s).next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_string_contents() {
        let outside: String = CodeBytes::new(r#"a('b;c', "d\"e") f"#)
            .map(|(_, b)| b as char)
            .collect();
        assert_eq!(outside, "a(, ) f");
    }

    #[test]
    fn splits_on_top_level_commas() {
        let parts = split_top_level("'a,b', f(1, 2), [3, 4], {x: 1, y: 2}", b',', Nesting::All);
        assert_eq!(parts, vec!["'a,b'", " f(1, 2)", " [3, 4]", " {x: 1, y: 2}"]);
    }

    #[test]
    fn statement_split_keeps_for_header() {
        let parts = split_top_level("for (let i = 0; i < 3; i++) { a(); b() }", b';', Nesting::Parens);
        assert_eq!(parts, vec!["for (let i = 0; i < 3; i++) { a()", " b() }"]);
    }

    #[test]
    fn finds_matching_paren() {
        let s = "f(a, (b), ')') + 1";
        assert_eq!(matching_close(s, 1), Some(13));
        assert_eq!(matching_close("f(", 1), None);
    }

    #[test]
    fn ternary_detection() {
        assert!(is_ternary("a ? b : c"));
        assert!(!is_ternary("a?.b"));
        assert!(!is_ternary("a ?? b"));
        assert!(!is_ternary("'a ? b : c'"));
        assert!(!is_ternary("{ key: value }"));
    }

    #[test]
    fn unquoting() {
        assert_eq!(unquote("'name'"), "name");
        assert_eq!(unquote(" \"name\" "), "name");
        assert_eq!(unquote("`name`"), "name");
        assert_eq!(unquote("'mixed\""), "'mixed\"");
        assert_eq!(unquote("bare"), "bare");
    }

    #[test]
    fn quoted_literals() {
        assert!(is_quoted("'test'"));
        assert!(is_quoted("\"a 'b' c\""));
        assert!(!is_quoted("'a' + 'b'"));
        assert!(!is_quoted("name"));
        assert!(!is_quoted("'"));
    }
}
