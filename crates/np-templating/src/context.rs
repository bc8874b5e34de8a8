//! Session data and the per-render processing context.
//!
//! [`SessionData`] is the variable scope handed to the expression
//! evaluator. It is assembled in a fixed order, later sources overwriting
//! earlier keys of the same name:
//!
//! 1. frontmatter attributes
//! 2. caller-supplied data
//! 3. prompt results
//! 4. explicit overrides (variables assigned from `include(...)`)
//!
//! [`ProcessingContext`] carries the template text being rewritten together
//! with the session data and overrides while tags are pre-processed. One is
//! created per render call and never shared.

use serde_json::{Map, Value};

/// Variables visible to expression evaluation.
pub type SessionData = Map<String, Value>;

/// Converts any serializable value into session data.
///
/// Non-object values produce an empty session.
pub fn session_from<T: serde::Serialize + ?Sized>(data: &T) -> Result<SessionData, serde_json::Error> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        _ => Ok(SessionData::new()),
    }
}

/// Copies every entry of `from` into `into`, overwriting on collision.
pub fn merge_session(into: &mut SessionData, from: &SessionData) {
    for (key, value) in from {
        into.insert(key.clone(), value.clone());
    }
}

/// Looks up a dotted path such as `data.user.name`.
///
/// Array elements are addressed by index: `items.0`.
pub fn lookup_path<'a>(data: &'a SessionData, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Formats a value the way it would be spliced into text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Mutable state shared by the tag processors during one render.
#[derive(Debug, Clone, Default)]
pub struct ProcessingContext {
    /// The template text being rewritten.
    pub template_text: String,
    /// Variables collected so far.
    pub session_data: SessionData,
    /// Variables that win over everything else when merged.
    pub overrides: SessionData,
    /// Names of templates currently being included, outermost first.
    pub(crate) include_stack: Vec<String>,
}

impl ProcessingContext {
    pub fn new(template_text: impl Into<String>, session_data: SessionData) -> Self {
        Self {
            template_text: template_text.into(),
            session_data,
            overrides: SessionData::new(),
            include_stack: Vec::new(),
        }
    }

    pub(crate) fn with_include_stack(mut self, stack: Vec<String>) -> Self {
        self.include_stack = stack;
        self
    }

    /// Session data with overrides applied on top.
    pub fn merged_session(&self) -> SessionData {
        let mut merged = self.session_data.clone();
        merge_session(&mut merged, &self.overrides);
        merged
    }

    pub fn include_depth(&self) -> usize {
        self.include_stack.len()
    }

    pub fn is_including(&self, name: &str) -> bool {
        self.include_stack.iter().any(|n| n == name)
    }
}
