//! Statement rewriting for code tags.
//!
//! Host functions listed in [`TemplatingConfig::async_functions`] return
//! promises, and template authors routinely forget to `await` them. The
//! rewriter inserts the missing `await` in front of those calls and leaves
//! everything else exactly as written.
//!
//! ```rust
//! use np_templating::{rewrite::process_code_tag, TemplatingConfig};
//!
//! let config = TemplatingConfig::default();
//! assert_eq!(
//!     process_code_tag("<% const w = web.weather() %>", &config),
//!     "<% const w = await web.weather() %>",
//! );
//! assert_eq!(
//!     process_code_tag("<% if (ready) { %>", &config),
//!     "<% if (ready) { %>",
//! );
//! ```
//!
//! The rewriter works line by line and statement by statement. It is a set
//! of heuristics over JavaScript-like text, not a parser, so it errs on the
//! side of leaving a statement alone.

use np_tags::split_tag;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::TemplatingConfig;
use crate::protect::{protect_template_literals, restore_template_literals};
use crate::syntax::{is_ternary, matching_close, open_brackets, split_top_level, Nesting};

static AWAIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bawait\b").expect("await pattern is valid"));

static CONTROL_FLOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\}\s*)?(?:if|else|for|while|do|switch|case|default|try|catch|finally|return|break|continue|throw)\b",
    )
    .expect("control flow pattern is valid")
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:const|let|var)\s+[^=]+?|[A-Za-z_$][\w$.]*)\s*=\s*([^=>].*)$")
        .expect("declaration pattern is valid")
});

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(").expect("call pattern is valid")
});

/// Line endings that leave a statement open.
const CONTINUING_ENDINGS: &[&str] = &[
    "(", "[", ",", "=", "+", "-", "*", "/", "&&", "||", "?", ":", ".", "=>",
];

/// Line starts that continue the previous statement.
const CONTINUING_STARTS: &[&str] = &[".", "?", ":", ")", "]", "&&", "||", "+", "*", ",", "=>"];

fn call_name(statement: &str) -> Option<&str> {
    CALL.captures(statement)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn needs_await(name: &str, config: &TemplatingConfig) -> bool {
    config.is_async_function(name) && !config.is_prompt_function(name)
}

/// `(...)(...)`: a parenthesised expression that is called straight away.
fn is_immediately_invoked(statement: &str) -> bool {
    matching_close(statement, 0)
        .map(|close| statement[close + 1..].trim_start().starts_with('('))
        .unwrap_or(false)
}

fn leaves_alone(trimmed: &str) -> bool {
    trimmed.is_empty()
        || AWAIT.is_match(trimmed)
        || CONTROL_FLOW.is_match(trimmed)
        || trimmed.starts_with('{')
        || trimmed.starts_with('}')
        || is_ternary(trimmed)
}

/// Inserts `await` before an allowlisted call in a single statement.
///
/// Statements that already await, control flow, ternaries and
/// parenthesised expressions are returned unchanged. For a declaration or
/// assignment, `await` goes in front of the right-hand side. Leading
/// whitespace is kept.
pub fn add_await_if_needed(statement: &str, config: &TemplatingConfig) -> String {
    let trimmed = statement.trim_start();
    let indent = &statement[..statement.len() - trimmed.len()];

    if leaves_alone(trimmed.trim_end()) {
        return statement.to_string();
    }

    if trimmed.starts_with('(') {
        if is_immediately_invoked(trimmed) {
            return format!("{}await {}", indent, trimmed);
        }
        return statement.to_string();
    }

    if let Some(rhs) = DECLARATION.captures(trimmed).and_then(|caps| caps.get(1)) {
        let value = rhs.as_str();
        if value.starts_with('`') {
            return statement.to_string();
        }
        return match call_name(value) {
            Some(name) if needs_await(name, config) => {
                let at = indent.len() + rhs.start();
                format!("{}await {}", &statement[..at], &statement[at..])
            }
            _ => statement.to_string(),
        };
    }

    match call_name(trimmed) {
        Some(name) if needs_await(name, config) => format!("{}await {}", indent, trimmed),
        _ => statement.to_string(),
    }
}

fn process_line(line: &str, config: &TemplatingConfig) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.bytes().all(|b| b == b';') {
        return line.to_string();
    }

    let indent = &line[..line.len() - line.trim_start().len()];
    let statements: Vec<String> = split_top_level(trimmed, b';', Nesting::Parens)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| add_await_if_needed(s, config))
        .collect();

    let mut output = format!("{}{}", indent, statements.join("; "));
    if trimmed.ends_with(';') {
        output.push(';');
    }
    output
}

/// Rewrites every statement of a (possibly multi-line) code fragment.
///
/// Each line is split on top-level semicolons, each statement passed
/// through [`add_await_if_needed`], and the statements joined again with
/// `"; "`. Blank lines stay blank and a line ending in `;` keeps it.
pub fn process_statements(code: &str, config: &TemplatingConfig) -> String {
    code.split('\n')
        .map(|line| process_line(line, config))
        .collect::<Vec<_>>()
        .join("\n")
}

fn continues(current: &str, next: Option<&str>) -> bool {
    let line = current.trim();
    if line.is_empty() || line.starts_with("//") {
        return false;
    }
    if line.ends_with(';') || line.ends_with('{') || line.ends_with('}') {
        return false;
    }
    if open_brackets(line) > 0 {
        return true;
    }
    if !line.ends_with("++")
        && !line.ends_with("--")
        && CONTINUING_ENDINGS.iter().any(|end| line.ends_with(end))
    {
        return true;
    }

    let Some(next) = next.map(str::trim) else {
        return false;
    };
    !next.starts_with("//")
        && !next.starts_with("++")
        && !next.starts_with("--")
        && CONTINUING_STARTS.iter().any(|start| next.starts_with(start))
}

fn join_continuation(current: &mut String, next: &str) {
    let glued = current.ends_with('(')
        || current.ends_with('[')
        || next.starts_with('.')
        || next.starts_with(')')
        || next.starts_with(']');
    if !glued {
        current.push(' ');
    }
    current.push_str(next);
}

/// Joins statements that were broken over several lines.
///
/// A line continues into the next one when it leaves a bracket open, ends
/// with an operator, or the next line starts with one (`.then(...)`,
/// `? a`, `: b`). Blank lines inside a broken statement are dropped.
pub fn merge_multi_line_statements(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    let mut merged: Vec<String> = Vec::with_capacity(lines.len());
    let mut current: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let next = lines[i + 1..].iter().copied().find(|l| !l.trim().is_empty());

        let candidate = match current.take() {
            Some(mut open) => {
                if line.trim().is_empty() {
                    current = Some(open);
                    continue;
                }
                join_continuation(&mut open, line.trim());
                open
            }
            None => line.trim_end().to_string(),
        };

        if next.is_some() && continues(&candidate, next) {
            current = Some(candidate);
        } else if candidate.trim().is_empty() {
            merged.push(String::new());
        } else {
            merged.push(candidate);
        }
    }

    if let Some(open) = current {
        merged.push(open);
    }
    merged.join("\n")
}

/// Rewrites a whole code tag, returning it with its delimiters.
///
/// Template literals are protected before statements are split and put back
/// afterwards, so semicolons and newlines inside them are never touched.
pub fn process_code_tag(tag: &str, config: &TemplatingConfig) -> String {
    let Some(parts) = split_tag(tag) else {
        return tag.to_string();
    };

    let (code, literals) = protect_template_literals(parts.content);

    let rewritten = if code.contains('\n') {
        process_statements(&merge_multi_line_statements(&code), config)
    } else if code.trim().is_empty() {
        code.clone()
    } else {
        // Keep the padding inside the delimiters.
        let lead = &code[..code.len() - code.trim_start().len()];
        let trail = &code[code.trim_end().len()..];
        format!("{}{}{}", lead, process_line(code.trim(), config), trail)
    };

    let restored = restore_template_literals(&rewritten, &literals);
    format!("{}{}{}", parts.open, restored, parts.close)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TemplatingConfig {
        TemplatingConfig::default()
    }

    mod statements {
        use super::*;

        #[test]
        fn bare_async_call_is_awaited() {
            assert_eq!(
                add_await_if_needed("getNote('Daily')", &config()),
                "await getNote('Daily')"
            );
        }

        #[test]
        fn indentation_is_kept() {
            assert_eq!(add_await_if_needed("    fetch(url)", &config()), "    await fetch(url)");
        }

        #[test]
        fn declaration_awaits_right_hand_side() {
            assert_eq!(
                add_await_if_needed("const quote = web.quote()", &config()),
                "const quote = await web.quote()"
            );
            assert_eq!(
                add_await_if_needed("let { a, b } = getNotes()", &config()),
                "let { a, b } = await getNotes()"
            );
        }

        #[test]
        fn plain_assignment_awaits_right_hand_side() {
            assert_eq!(
                add_await_if_needed("result = DataStore.invokePluginCommandByName('x', 'y')", &config()),
                "result = await DataStore.invokePluginCommandByName('x', 'y')"
            );
        }

        #[test]
        fn existing_await_is_never_doubled() {
            let s = "const n = await getNote('x')";
            assert_eq!(add_await_if_needed(s, &config()), s);
        }

        #[test]
        fn unknown_functions_are_left_alone() {
            assert_eq!(add_await_if_needed("date.now()", &config()), "date.now()");
            assert_eq!(add_await_if_needed("const x = format(y)", &config()), "const x = format(y)");
        }

        #[test]
        fn control_flow_is_left_alone() {
            for s in [
                "if (getNote('x')) {",
                "} else if (fetch(u)) {",
                "for (const n of getNotes()) {",
                "while (fetch(u)) {",
                "return getNote('x')",
                "}",
                "{",
            ] {
                assert_eq!(add_await_if_needed(s, &config()), s);
            }
        }

        #[test]
        fn ternaries_are_left_alone() {
            let s = "const n = ready ? getNote('a') : getNote('b')";
            assert_eq!(add_await_if_needed(s, &config()), s);
        }

        #[test]
        fn template_literal_values_are_left_alone() {
            let s = "const t = `${getNote('a')}`";
            assert_eq!(add_await_if_needed(s, &config()), s);
        }

        #[test]
        fn parenthesised_expressions_are_left_alone() {
            let s = "(getNote('x'))";
            assert_eq!(add_await_if_needed(s, &config()), s);
        }

        #[test]
        fn immediately_invoked_expressions_are_awaited() {
            assert_eq!(
                add_await_if_needed("(async () => { x() })()", &config()),
                "await (async () => { x() })()"
            );
        }

        #[test]
        fn prompt_functions_are_never_awaited() {
            let config = config().with_async_functions(["prompt", "fetch"]);
            assert_eq!(add_await_if_needed("prompt('name')", &config), "prompt('name')");
        }

        #[test]
        fn comparison_is_not_a_declaration() {
            let s = "x == getNote('y')";
            assert_eq!(add_await_if_needed(s, &config()), s);
        }
    }

    mod lines {
        use super::*;

        #[test]
        fn semicolon_separated_statements() {
            assert_eq!(
                process_statements("getNote('a'); date.now();", &config()),
                "await getNote('a'); date.now();"
            );
        }

        #[test]
        fn semicolons_in_strings_do_not_split() {
            assert_eq!(
                process_statements("fetch('a;b')", &config()),
                "await fetch('a;b')"
            );
        }

        #[test]
        fn blank_lines_and_bare_semicolons_survive() {
            assert_eq!(
                process_statements("  fetch(u)\n\n;;", &config()),
                "  await fetch(u)\n\n;;"
            );
        }

        #[test]
        fn empty_statements_are_dropped() {
            assert_eq!(process_statements("a();;b()", &config()), "a(); b()");
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn method_chains_are_joined() {
            let code = "const notes = getNotes()\n  .filter(n => n)\n  .map(n => n.title)";
            assert_eq!(
                merge_multi_line_statements(code),
                "const notes = getNotes().filter(n => n).map(n => n.title)"
            );
        }

        #[test]
        fn open_parens_are_joined() {
            let code = "fetch(\n  url,\n  opts\n)";
            assert_eq!(merge_multi_line_statements(code), "fetch(url, opts)");
        }

        #[test]
        fn complete_lines_stay_separate() {
            let code = "const a = 1;\nconst b = 2\nif (a) {\n  b\n}";
            assert_eq!(merge_multi_line_statements(code), code);
        }

        #[test]
        fn blank_lines_inside_a_statement_are_dropped() {
            let code = "fetch(\n\n  url)\n\nnext()";
            assert_eq!(merge_multi_line_statements(code), "fetch(url)\n\nnext()");
        }

        #[test]
        fn postfix_increment_does_not_continue() {
            let code = "i++\nfetch(u)";
            assert_eq!(merge_multi_line_statements(code), code);
        }
    }

    mod tags {
        use super::*;

        #[test]
        fn single_line_tag_keeps_padding() {
            assert_eq!(
                process_code_tag("<%- web.advice() %>", &config()),
                "<%- await web.advice() %>"
            );
            assert_eq!(process_code_tag("<%fetch(u)-%>", &config()), "<%await fetch(u)-%>");
        }

        #[test]
        fn multi_line_tag() {
            let tag = "<%\n  const a = getNote('x')\n  const b = a.title\n%>";
            assert_eq!(
                process_code_tag(tag, &config()),
                "<%\n  const a = await getNote('x')\n  const b = a.title\n%>"
            );
        }

        #[test]
        fn literal_contents_are_untouched() {
            let tag = "<% const s = `a; getNote('b')\nc`; fetch(u) %>";
            assert_eq!(
                process_code_tag(tag, &config()),
                "<% const s = `a; getNote('b')\nc`; await fetch(u) %>"
            );
        }

        #[test]
        fn non_tags_pass_through() {
            assert_eq!(process_code_tag("fetch(u)", &config()), "fetch(u)");
        }
    }
}
