//! Tag processors.
//!
//! Pre-processing walks the tags of a template once, after comments have
//! been stripped, and decides per tag what happens to it:
//!
//! | Tag                         | Result                                         |
//! |-----------------------------|------------------------------------------------|
//! | `note(...)`, `calendar(...)`| replaced by the note's text                    |
//! | `include(...)`              | replaced by the rendered template              |
//! | `const x = include(...)`    | removed, rendered text stored in `x`           |
//! | `import(...)`               | replaced by the template body, unrendered      |
//! | `:return:` / `:CR:`         | removed                                        |
//! | code with a call            | rewritten to await host functions              |
//! | `const x = "literal"`       | removed, value stored in `x`                   |
//!
//! Everything else is left for the prompt resolver and the expression
//! evaluator. A lookup that fails puts a bold error marker into the text
//! instead of failing the render.

use np_tags::{classify, scan_tags, split_tag, TagKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::args::TagCall;
use crate::context::{display_value, lookup_path, ProcessingContext, SessionData};
use crate::error::TemplatingError;
use crate::frontmatter;
use crate::pipeline::{RenderOptions, RenderOutcome, Templating};
use crate::rewrite::process_code_tag;
use crate::source::is_calendar_date;
use crate::syntax::{is_quoted, split_top_level, unquote, Nesting};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\}")
        .expect("placeholder pattern is valid")
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(.+)$")
        .expect("declaration pattern is valid")
});

/// Whether pre-processing should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessFlow {
    Continue,
    /// A prompt inside an included template was cancelled.
    Cancelled,
}

/// What to do with one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TagAction {
    Keep,
    Replace(String),
    /// Drop the tag, and the newline after it for a `-%>` tag.
    Remove,
    Cancel,
}

/// Inline marker for a failed lookup.
pub fn error_marker(message: impl AsRef<str>) -> String {
    format!("**{}**", message.as_ref())
}

/// Fills `${name}` and `${a.b}` placeholders from session data.
///
/// Unknown names are left as written.
///
/// ```rust
/// use np_templating::{processors::substitute_placeholders, SessionData};
///
/// let mut session = SessionData::new();
/// session.insert("month".into(), "July".into());
/// assert_eq!(substitute_placeholders("t/${month}", &session), "t/July");
/// assert_eq!(substitute_placeholders("t/${day}", &session), "t/${day}");
/// ```
pub fn substitute_placeholders(text: &str, session: &SessionData) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            lookup_path(session, &caps[1])
                .map(display_value)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// A single `const|let|var name = value` declaration in a tag.
fn declaration(tag: &str) -> Option<(String, String)> {
    let content = split_tag(tag)?.content.trim();
    let statements: Vec<&str> = split_top_level(content, b';', Nesting::All)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let [statement] = statements.as_slice() else {
        return None;
    };

    let caps = DECLARATION.captures(statement)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

/// Applies actions to the tags of `text`, front to back.
fn apply(text: &str, actions: Vec<(usize, usize, bool, TagAction)>) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for (start, end, trims_newline, action) in actions {
        output.push_str(&text[last..start]);
        last = end;
        match action {
            // Cancellation ends processing before actions are applied.
            TagAction::Keep | TagAction::Cancel => output.push_str(&text[start..end]),
            TagAction::Replace(replacement) => output.push_str(&replacement),
            TagAction::Remove => {
                if trims_newline {
                    let rest = &text[last..];
                    if rest.starts_with("\r\n") {
                        last += 2;
                    } else if rest.starts_with('\n') {
                        last += 1;
                    }
                }
            }
        }
    }

    output.push_str(&text[last..]);
    output
}

/// Removes every comment tag.
pub fn strip_comments(text: &str) -> String {
    let actions = scan_tags(text)
        .into_iter()
        .filter(|span| np_tags::is_comment_tag(span.text))
        .map(|span| {
            let trims = split_tag(span.text).is_some_and(|parts| parts.trims_newline());
            (span.start, span.end, trims, TagAction::Remove)
        })
        .collect();
    apply(text, actions)
}

impl Templating {
    /// Runs the tag processors over `ctx.template_text`.
    ///
    /// Comments are stripped first. Session data and overrides collected
    /// from the tags are stored in `ctx`.
    pub fn pre_process_tags(&self, ctx: &mut ProcessingContext) -> Result<ProcessFlow, TemplatingError> {
        let text = strip_comments(&ctx.template_text);
        let tag_config = self.config.tag_config();

        let mut actions = Vec::new();
        for span in scan_tags(&text) {
            let kind = classify(span.text, &tag_config);
            let action = self.process_tag(span.text, kind, ctx)?;
            if action == TagAction::Cancel {
                tracing::debug!(tag = span.text, "cancelled inside include");
                return Ok(ProcessFlow::Cancelled);
            }
            let trims = split_tag(span.text).is_some_and(|parts| parts.trims_newline());
            actions.push((span.start, span.end, trims, action));
        }

        ctx.template_text = apply(&text, actions);
        Ok(ProcessFlow::Continue)
    }

    fn process_tag(
        &self,
        tag: &str,
        kind: TagKind,
        ctx: &mut ProcessingContext,
    ) -> Result<TagAction, TemplatingError> {
        let action = match kind {
            TagKind::Note => self.process_note(tag, false),
            TagKind::Calendar => self.process_note(tag, true),
            TagKind::Include => self.process_include(tag, ctx)?,
            TagKind::Import => {
                let session = ctx.merged_session();
                TagAction::Replace(self.resolve_import(tag, &session, &[]))
            }
            TagKind::Return => TagAction::Remove,
            TagKind::Code | TagKind::Module if tag.contains('(') => {
                let rewritten = process_code_tag(tag, &self.config);
                if rewritten == tag {
                    TagAction::Keep
                } else {
                    TagAction::Replace(rewritten)
                }
            }
            TagKind::Variable => process_variable(tag, ctx),
            _ => TagAction::Keep,
        };
        Ok(action)
    }

    fn process_note(&self, tag: &str, calendar: bool) -> TagAction {
        let kind = if calendar { "calendar note" } else { "note" };
        let Some(call) = TagCall::parse(tag) else {
            return TagAction::Replace(error_marker(format!("Unable to parse {}", kind)));
        };
        let Some(name) = call.first_arg() else {
            return TagAction::Replace(error_marker(format!("Unable to parse {}", kind)));
        };

        let text = if calendar {
            self.notes.calendar_note_text(name)
        } else {
            self.notes.note_text(name)
        };
        TagAction::Replace(text.unwrap_or_else(|| {
            error_marker(format!("Unable to locate {} \"{}\"", kind, name))
        }))
    }

    fn process_include(
        &self,
        tag: &str,
        ctx: &mut ProcessingContext,
    ) -> Result<TagAction, TemplatingError> {
        let Some(call) = TagCall::parse(tag) else {
            return Ok(TagAction::Replace(error_marker("Unable to parse include")));
        };
        let Some(name) = call.first_arg().map(str::to_string) else {
            return Ok(TagAction::Replace(error_marker("Unable to parse include")));
        };

        let rendered = if is_calendar_date(&name) {
            match self.notes.calendar_note_text(&name) {
                Some(text) => text,
                None => error_marker(format!("Unable to locate calendar note \"{}\"", name)),
            }
        } else if ctx.is_including(&name) {
            let mut chain = ctx.include_stack.clone();
            chain.push(name.clone());
            tracing::warn!(chain = %chain.join(" > "), "include cycle");
            error_marker(format!("Include cycle detected: {}", chain.join(" > ")))
        } else if ctx.include_depth() >= self.config.max_include_depth {
            tracing::warn!(template = %name, depth = ctx.include_depth(), "include depth exceeded");
            error_marker(format!(
                "Maximum include depth ({}) exceeded at \"{}\"",
                self.config.max_include_depth, name
            ))
        } else {
            match self.templates.template_text(&name, false) {
                None => error_marker(format!("Unable to locate template \"{}\"", name)),
                Some(text) => {
                    let mut session = ctx.merged_session();
                    if let Some(data) = call.arg(1).and_then(|arg| include_data(arg, &session)) {
                        crate::context::merge_session(&mut session, &data);
                    }
                    let mut stack = ctx.include_stack.clone();
                    stack.push(name.clone());

                    tracing::debug!(template = %name, depth = stack.len(), "including");
                    match self.run(&text, session, &RenderOptions::default(), stack) {
                        Ok(RenderOutcome::Rendered(output)) => output,
                        Ok(RenderOutcome::Cancelled) => return Ok(TagAction::Cancel),
                        Err(err) => self.error_text(&err),
                    }
                }
            }
        };

        Ok(match call.assignment {
            Some(variable) => {
                ctx.overrides.insert(variable, Value::String(rendered));
                TagAction::Remove
            }
            None => TagAction::Replace(rendered),
        })
    }

    /// The text an import tag is replaced with, its own imports spliced in.
    ///
    /// `chain` holds the names of the imports being expanded around this one.
    fn resolve_import(&self, tag: &str, session: &SessionData, chain: &[String]) -> String {
        let Some(name) = TagCall::parse(tag).and_then(|call| call.first_arg().map(str::to_string))
        else {
            return error_marker("Unable to parse import");
        };
        let name = substitute_placeholders(&name, session);

        if chain.contains(&name) {
            let cycle = [chain, std::slice::from_ref(&name)].concat().join(" > ");
            tracing::warn!(chain = %cycle, "import cycle");
            return error_marker(format!("Import cycle detected: {}", cycle));
        }
        if chain.len() >= self.config.max_include_depth {
            tracing::warn!(template = %name, depth = chain.len(), "import depth exceeded");
            return error_marker(format!(
                "Maximum import depth ({}) exceeded at \"{}\"",
                self.config.max_include_depth, name
            ));
        }

        match self.templates.template_text(&name, false) {
            Some(text) => {
                let mut chain = chain.to_vec();
                chain.push(name);
                self.expand_imports(&frontmatter::body(&text), session, &chain)
            }
            None => error_marker(format!("Unable to locate import \"{}\"", name)),
        }
    }

    fn expand_imports(&self, text: &str, session: &SessionData, chain: &[String]) -> String {
        let tag_config = self.config.tag_config();
        let actions = scan_tags(text)
            .into_iter()
            .filter(|span| classify(span.text, &tag_config) == TagKind::Import)
            .map(|span| {
                let replacement = self.resolve_import(span.text, session, chain);
                (span.start, span.end, false, TagAction::Replace(replacement))
            })
            .collect();
        apply(text, actions)
    }

    /// Splices imported templates into `text`.
    ///
    /// Imported bodies are inserted with their frontmatter removed. Imports
    /// inside them are spliced in the same way; nothing else in them is
    /// processed. A template that imports itself, directly or through
    /// others, gets an error marker in place of the repeated import.
    pub fn import_templates(&self, text: &str, session: &SessionData) -> String {
        self.expand_imports(text, session, &[])
    }
}

/// Data passed as the second argument of an include.
///
/// Either a session variable holding an object, or an object literal.
fn include_data(arg: &str, session: &SessionData) -> Option<SessionData> {
    let arg = arg.trim();
    if let Some(Value::Object(map)) = lookup_path(session, arg) {
        return Some(map.clone());
    }
    if !arg.starts_with('{') {
        return None;
    }

    // JSON, or a flow mapping such as `{ title: 'x' }`.
    let value: Value = serde_json::from_str(arg)
        .ok()
        .or_else(|| serde_yaml::from_str(arg).ok())?;
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn process_variable(tag: &str, ctx: &mut ProcessingContext) -> TagAction {
    let Some((name, value)) = declaration(tag) else {
        return TagAction::Keep;
    };

    let literal = is_quoted(&value) && !(value.starts_with('`') && value.contains("${"));
    let stored = if literal {
        unquote(&value).to_string()
    } else {
        value
    };
    ctx.session_data.insert(name, Value::String(stored));

    if literal {
        TagAction::Remove
    } else {
        TagAction::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(text: &str) -> ProcessingContext {
        ProcessingContext::new(text, SessionData::new())
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(strip_comments("a<%# note %>b"), "ab");
        assert_eq!(strip_comments("<%# note -%>\nb"), "b");
        assert_eq!(strip_comments("<%# note %>\nb"), "\nb");
    }

    #[test]
    fn declarations() {
        assert_eq!(
            declaration("<% const x = \"test\" %>"),
            Some(("x".to_string(), "\"test\"".to_string()))
        );
        assert_eq!(declaration("<% let a = 1; let b = 2 %>"), None);
        assert_eq!(declaration("<% } %>"), None);
    }

    #[test]
    fn string_variables_are_stored_and_removed() {
        let mut c = ctx("");
        assert_eq!(process_variable("<% const x = \"test\" %>", &mut c), TagAction::Remove);
        assert_eq!(c.session_data["x"], json!("test"));
    }

    #[test]
    fn other_variables_are_stored_raw_and_kept() {
        let mut c = ctx("");
        assert_eq!(process_variable("<% const list = [1, 2] %>", &mut c), TagAction::Keep);
        assert_eq!(c.session_data["list"], json!("[1, 2]"));

        assert_eq!(process_variable("<% let n = 5 %>", &mut c), TagAction::Keep);
        assert_eq!(c.session_data["n"], json!("5"));

        assert_eq!(process_variable("<% const t = `a ${b}` %>", &mut c), TagAction::Keep);
    }

    #[test]
    fn include_data_from_session_or_literal() {
        let mut session = SessionData::new();
        session.insert("meta".into(), json!({"title": "T"}));
        assert_eq!(include_data("meta", &session).unwrap()["title"], json!("T"));
        assert_eq!(include_data("{\"a\": 1}", &session).unwrap()["a"], json!(1));
        assert_eq!(include_data("{ a: 'x' }", &session).unwrap()["a"], json!("x"));
        assert!(include_data("missing", &session).is_none());
    }

    #[test]
    fn placeholders() {
        let mut session = SessionData::new();
        session.insert("user".into(), json!({"name": "Ada"}));
        assert_eq!(substitute_placeholders("${user.name}/${ user.name }", &session), "Ada/Ada");
        assert_eq!(substitute_placeholders("${nope}", &session), "${nope}");
    }

    #[test]
    fn markers_are_bold() {
        assert_eq!(error_marker("oops"), "**oops**");
    }
}
