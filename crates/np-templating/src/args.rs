//! Structured parsing of call-style tags.
//!
//! Tags such as `<%- include('header', { title }) %>` or
//! `<% const body = await template('Daily') %>` are parsed into a
//! [`TagCall`] holding the function name, the raw argument texts and the
//! variable the result is assigned to, if any.

use np_tags::split_tag;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::syntax::{matching_close, split_top_level, Nesting};

pub use crate::syntax::unquote;

static CALL_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*)?(?:await\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(",
    )
    .expect("call head pattern is valid")
});

/// A function call written inside a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCall {
    pub function_name: String,
    /// Argument texts, trimmed but otherwise as written.
    pub args: Vec<String>,
    /// Variable the call's result is assigned to.
    pub assignment: Option<String>,
}

impl TagCall {
    /// Parses a whole tag, delimiters included.
    ///
    /// Returns `None` if the tag's content is not a single call, for
    /// example when the parentheses are unbalanced or code follows the
    /// closing parenthesis.
    ///
    /// ```rust
    /// use np_templating::TagCall;
    ///
    /// let call = TagCall::parse("<% const h = await include('header', 'x, y') %>").unwrap();
    /// assert_eq!(call.function_name, "include");
    /// assert_eq!(call.args, vec!["'header'", "'x, y'"]);
    /// assert_eq!(call.assignment.as_deref(), Some("h"));
    /// ```
    pub fn parse(tag: &str) -> Option<TagCall> {
        let parts = split_tag(tag)?;
        Self::parse_code(parts.content)
    }

    /// Parses bare code such as `include('header')`.
    pub fn parse_code(code: &str) -> Option<TagCall> {
        let code = code.trim().trim_end_matches(';').trim_end();
        let caps = CALL_HEAD.captures(code)?;
        let open = caps.get(0)?.end() - 1;
        let close = matching_close(code, open)?;
        if !code[close + 1..].trim().is_empty() {
            return None;
        }

        let inner = &code[open + 1..close];
        let args = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top_level(inner, b',', Nesting::All)
                .into_iter()
                .map(|arg| arg.trim().to_string())
                .collect()
        };

        Some(TagCall {
            function_name: caps[2].to_string(),
            args,
            assignment: caps.get(1).map(|m| m.as_str().to_string()),
        })
    }

    /// The first argument with its quotes removed.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|arg| unquote(arg)).filter(|arg| !arg.is_empty())
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_call() {
        let call = TagCall::parse("<%- include('header') %>").unwrap();
        assert_eq!(call.function_name, "include");
        assert_eq!(call.args, vec!["'header'"]);
        assert_eq!(call.first_arg(), Some("header"));
        assert_eq!(call.assignment, None);
    }

    #[test]
    fn nested_parens_and_brackets() {
        let call = TagCall::parse("<% template(name(1, 2), [a, b], { x: f(3, 4) }) %>").unwrap();
        assert_eq!(call.args, vec!["name(1, 2)", "[a, b]", "{ x: f(3, 4) }"]);
    }

    #[test]
    fn quoted_commas_and_parens() {
        let call = TagCall::parse(r#"<%- note("a, (b)") %>"#).unwrap();
        assert_eq!(call.first_arg(), Some("a, (b)"));
    }

    #[test]
    fn template_literal_argument() {
        let call = TagCall::parse("<%- import(`templates/${month}`) %>").unwrap();
        assert_eq!(call.function_name, "import");
        assert_eq!(call.first_arg(), Some("templates/${month}"));
    }

    #[test]
    fn assignment_and_await() {
        let call = TagCall::parse("<% let body = await include('x'); %>").unwrap();
        assert_eq!(call.assignment.as_deref(), Some("body"));
        assert_eq!(call.function_name, "include");
    }

    #[test]
    fn dotted_function_name() {
        let call = TagCall::parse("<%- date.format('YYYY') %>").unwrap();
        assert_eq!(call.function_name, "date.format");
    }

    #[test]
    fn empty_argument_list() {
        let call = TagCall::parse("<%- include() %>").unwrap();
        assert!(call.args.is_empty());
        assert_eq!(call.first_arg(), None);
    }

    #[test]
    fn rejects_non_calls() {
        assert_eq!(TagCall::parse("<%= name %>"), None);
        assert_eq!(TagCall::parse("<%- include('a' %>"), None);
        assert_eq!(TagCall::parse("<%- include('a') + more %>"), None);
        assert_eq!(TagCall::parse("not a tag"), None);
    }
}
