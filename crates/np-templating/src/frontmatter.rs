//! Frontmatter parsing.
//!
//! A template may start with a metadata block between two `---` lines:
//!
//! ```text
//! ---
//! title: Daily Note
//! tags:
//!   - journal
//! ---
//! # <%= title %>
//! ```
//!
//! The block is parsed as YAML. Values rendered from template tags often
//! are not valid YAML (unbalanced quotes, stray colons), so when YAML
//! parsing fails a tolerant line scan salvages top-level `key: value`
//! pairs and simple `- item` lists instead.
//!
//! Text without frontmatter has no attributes and is all body. Callers never
//! need to check first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::context::SessionData;
use crate::syntax::unquote;

/// The separator line opening and closing a frontmatter block.
pub const SEPARATOR: &str = "---";

static ATTRIBUTE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\s:#\-][^:]*?)\s*:(?:\s+(.*))?$").expect("attribute line pattern is valid")
});

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-\s+(.*)$").expect("list item pattern is valid"));

/// A frontmatter block located in template text, not yet parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterParts<'a> {
    /// Text between the separator lines, without them.
    pub block: &'a str,
    /// Everything after the closing separator line.
    pub body: &'a str,
    /// Byte offset of `body` in the original text.
    pub body_offset: usize,
}

/// Parsed frontmatter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub attributes: SessionData,
    pub body: String,
    pub body_offset: usize,
}

fn is_separator(line: &str) -> bool {
    line.trim_end() == SEPARATOR
}

/// Locates the first two separator lines.
///
/// The opening separator must be the first line. Any later `---` lines
/// belong to the body.
pub fn split(text: &str) -> Option<FrontmatterParts<'_>> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if !is_separator(first) || !first.ends_with('\n') {
        return None;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if is_separator(line) {
            let body_offset = offset + line.len();
            return Some(FrontmatterParts {
                block: &text[block_start..offset],
                body: &text[body_offset..],
                body_offset,
            });
        }
        offset += line.len();
    }

    None
}

fn yaml_to_json(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => Value::Object(
            map.iter()
                .filter_map(|(k, v)| yaml_key(k).map(|k| (k, yaml_to_json(v))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Bool(b) => Some(b.to_string()),
        Yaml::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn empty_to_string(value: Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        other => other,
    }
}

fn parse_yaml(block: &str) -> Option<SessionData> {
    let value: serde_yaml::Value = serde_yaml::from_str(block).ok()?;
    let serde_yaml::Value::Mapping(map) = value else {
        return None;
    };

    let attributes: SessionData = map
        .iter()
        .filter_map(|(k, v)| yaml_key(k).map(|k| (k, empty_to_string(yaml_to_json(v)))))
        .collect();
    (!attributes.is_empty()).then_some(attributes)
}

/// Salvages top-level attributes line by line.
fn scan_attributes(block: &str) -> SessionData {
    let mut attributes = Map::new();
    let mut list_key: Option<String> = None;

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(key) = &list_key {
            if let Some(caps) = LIST_ITEM.captures(line) {
                let item = Value::String(unquote(&caps[1]).to_string());
                match attributes.get_mut(key) {
                    Some(Value::Array(items)) => items.push(item),
                    _ => {
                        attributes.insert(key.clone(), Value::Array(vec![item]));
                    }
                }
                continue;
            }
        }

        if line.starts_with(char::is_whitespace) {
            continue;
        }

        list_key = None;
        if let Some(caps) = ATTRIBUTE_LINE.captures(line) {
            let key = caps[1].to_string();
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if value.is_empty() {
                list_key = Some(key.clone());
            }
            attributes.insert(key, Value::String(unquote(value).to_string()));
        }
    }

    attributes
}

fn block_attributes(block: &str) -> SessionData {
    parse_yaml(block).unwrap_or_else(|| {
        tracing::debug!("frontmatter is not valid YAML, scanning lines instead");
        scan_attributes(block)
    })
}

/// True iff `text` opens with a frontmatter block holding at least one
/// attribute.
///
/// Two separator lines with nothing parseable between them are not
/// frontmatter.
pub fn is_frontmatter_template(text: &str) -> bool {
    split(text).is_some_and(|parts| !block_attributes(parts.block).is_empty())
}

/// Splits `text` into attributes and body.
///
/// Empty attribute values become `""`. Without frontmatter, the attributes
/// are empty and the body is the whole text.
pub fn parse(text: &str) -> Frontmatter {
    if let Some(parts) = split(text) {
        let attributes = block_attributes(parts.block);
        if !attributes.is_empty() {
            return Frontmatter {
                attributes,
                body: parts.body.to_string(),
                body_offset: parts.body_offset,
            };
        }
    }

    Frontmatter {
        attributes: SessionData::new(),
        body: text.to_string(),
        body_offset: 0,
    }
}

/// The text after the frontmatter block, or all of `text`.
pub fn body(text: &str) -> String {
    parse(text).body
}

/// The frontmatter attributes, or an empty map.
pub fn attributes(text: &str) -> SessionData {
    parse(text).attributes
}

/// Frontmatter attributes as exposed to expressions.
///
/// The attributes are merged into the session flat, and again under a
/// reserved namespace key. With `has_render_methods` set, the namespace
/// value also carries `attributes` and `body` entries, mirroring a module
/// object with accessor methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontmatterScope {
    pub attributes: SessionData,
    pub body: String,
    pub has_render_methods: bool,
}

impl FrontmatterScope {
    pub fn new(attributes: SessionData) -> Self {
        Self {
            attributes,
            body: String::new(),
            has_render_methods: false,
        }
    }

    pub fn from_frontmatter(frontmatter: &Frontmatter) -> Self {
        Self {
            attributes: frontmatter.attributes.clone(),
            body: frontmatter.body.clone(),
            has_render_methods: false,
        }
    }

    pub fn with_render_methods(mut self, enabled: bool) -> Self {
        self.has_render_methods = enabled;
        self
    }

    /// The value stored under the namespace key.
    pub fn namespace_value(&self) -> Value {
        let mut map = self.attributes.clone();
        if self.has_render_methods {
            map.insert("attributes".into(), Value::Object(self.attributes.clone()));
            map.insert("body".into(), Value::String(self.body.clone()));
        }
        Value::Object(map)
    }

    /// Adds the attributes to `session` without replacing existing keys, and
    /// sets the namespace key.
    pub fn merge_into(&self, session: &mut SessionData, namespace: &str) {
        for (key, value) in &self.attributes {
            session.entry(key.clone()).or_insert_with(|| value.clone());
        }
        session.insert(namespace.to_string(), self.namespace_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DAILY: &str = "---\ntitle: Daily\ntags:\n  - journal\n  - work\n---\n# Body\n";

    mod detection {
        use super::*;

        #[test]
        fn attributes_make_frontmatter() {
            assert!(is_frontmatter_template(DAILY));
        }

        #[test]
        fn empty_block_is_not_frontmatter() {
            assert!(!is_frontmatter_template("---\n---\nbody"));
            assert!(!is_frontmatter_template("---\n\n---\nbody"));
        }

        #[test]
        fn missing_closing_separator() {
            assert!(!is_frontmatter_template("---\ntitle: x\nbody"));
        }

        #[test]
        fn separator_must_open_the_text() {
            assert!(!is_frontmatter_template("intro\n---\ntitle: x\n---\n"));
        }

        #[test]
        fn plain_prose_between_rules_is_not_frontmatter() {
            assert!(!is_frontmatter_template("---\njust some words\n---\n"));
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn yaml_attributes_and_body() {
            let fm = parse(DAILY);
            assert_eq!(fm.attributes["title"], json!("Daily"));
            assert_eq!(fm.attributes["tags"], json!(["journal", "work"]));
            assert_eq!(fm.body, "# Body\n");
            assert_eq!(&DAILY[fm.body_offset..], fm.body);
        }

        #[test]
        fn nested_mappings() {
            let fm = parse("---\nauthor:\n  name: Ada\n  id: 7\n---\n");
            assert_eq!(fm.attributes["author"], json!({"name": "Ada", "id": 7}));
        }

        #[test]
        fn empty_values_become_empty_strings() {
            let fm = parse("---\ntitle: x\nsubtitle:\n---\n");
            assert_eq!(fm.attributes["subtitle"], json!(""));
        }

        #[test]
        fn horizontal_rules_in_body_are_body() {
            let text = "---\ntitle: x\n---\nabove\n---\nbelow\n";
            assert_eq!(body(text), "above\n---\nbelow\n");
        }

        #[test]
        fn no_frontmatter_means_whole_text() {
            let text = "# Just a note\n---\nmore";
            assert!(attributes(text).is_empty());
            assert_eq!(body(text), text);
        }

        #[test]
        fn crlf_separators() {
            let fm = parse("---\r\ntitle: x\r\n---\r\nbody");
            assert_eq!(fm.attributes["title"], json!("x"));
            assert_eq!(fm.body, "body");
        }
    }

    mod fallback {
        use super::*;

        const BROKEN: &str = "---\ntitle: <%- prompt('t', 'a: b') %>\nquote: \"unbalanced\nlist:\n  - 'one'\n  - two\n---\nBody\n";

        #[test]
        fn broken_yaml_still_finds_body() {
            assert_eq!(body(BROKEN), "Body\n");
        }

        #[test]
        fn broken_yaml_salvages_attributes() {
            let attrs = attributes(BROKEN);
            assert_eq!(attrs["title"], json!("<%- prompt('t', 'a: b') %>"));
            assert_eq!(attrs["quote"], json!("\"unbalanced"));
            assert_eq!(attrs["list"], json!(["one", "two"]));
        }
    }

    mod scope {
        use super::*;

        fn attrs() -> SessionData {
            let mut map = SessionData::new();
            map.insert("title".into(), json!("Daily"));
            map
        }

        #[test]
        fn merges_flat_and_namespaced() {
            let mut session = SessionData::new();
            session.insert("title".into(), json!("From caller"));
            FrontmatterScope::new(attrs()).merge_into(&mut session, "frontmatter");
            assert_eq!(session["title"], json!("From caller"));
            assert_eq!(session["frontmatter"]["title"], json!("Daily"));
        }

        #[test]
        fn render_methods_expose_attributes_and_body() {
            let scope = FrontmatterScope {
                attributes: attrs(),
                body: "text".into(),
                has_render_methods: true,
            };
            let value = scope.namespace_value();
            assert_eq!(value["attributes"]["title"], json!("Daily"));
            assert_eq!(value["body"], json!("text"));
            assert_eq!(value["title"], json!("Daily"));
        }
    }
}
