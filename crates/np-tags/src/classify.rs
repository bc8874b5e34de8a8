//! Tag classification.
//!
//! All predicates are pure functions of a single tag's text. The sets of
//! names they recognise come from a [`TagConfig`] supplied by the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{split_tag, Modifier};

/// Built-in template module names, recognised as the root of `module.method` access.
pub const DEFAULT_TEMPLATE_MODULES: &[&str] = &[
    "date",
    "time",
    "user",
    "calendar",
    "note",
    "system",
    "frontmatter",
    "utility",
    "tasks",
];

/// Functions resolved by the prompt resolver rather than by the tag processors.
pub const DEFAULT_PROMPT_FUNCTIONS: &[&str] = &[
    "prompt",
    "promptKey",
    "promptDate",
    "promptDateInterval",
    "promptTag",
    "promptMention",
];

/// Shortest tag that can hold code: both delimiters plus one character.
pub const MIN_CODE_TAG_LEN: usize = 5;

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(").expect("call pattern is valid")
});

static DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:const|let|var)\s").expect("declaration pattern is valid"));

static LEADING_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:const|let|var)\s+[\w$]+\s*=\s*)?(?:await\s+)?([A-Za-z_$][\w$.]*)\s*\(")
        .expect("leading call pattern is valid")
});

static MODULE_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:await\s+)?([A-Za-z_$][\w$]*)\.").expect("module root pattern is valid")
});

/// Names the classifier treats specially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConfig {
    /// Roots of `module.method` expressions handled by template modules.
    pub template_modules: Vec<String>,
    /// Functions whose tags belong to the prompt resolver.
    pub prompt_functions: Vec<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            template_modules: DEFAULT_TEMPLATE_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            prompt_functions: DEFAULT_PROMPT_FUNCTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TagConfig {
    /// Replaces the template module names.
    pub fn with_template_modules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.template_modules = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the prompt function names.
    pub fn with_prompt_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt_functions = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_prompt_function(&self, name: &str) -> bool {
        self.prompt_functions.iter().any(|f| f == name)
    }
}

/// What a tag is for, as seen by the tag processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<%# ... %>`
    Comment,
    /// `<% :return: %>` or `<% :CR: %>`
    Return,
    /// A call to one of the prompt functions.
    Prompt,
    /// `import(...)`
    Import,
    /// `include(...)` or `template(...)`, possibly assigned to a variable.
    Include,
    /// `note(...)`
    Note,
    /// `calendar(...)`
    Calendar,
    /// `module.method` access on a template module.
    Module,
    /// Code containing a call that may need awaiting.
    Code,
    /// A variable declaration without calls.
    Variable,
    /// Any other output tag.
    Output,
    /// Anything else.
    Other,
}

fn content(tag: &str) -> &str {
    split_tag(tag).map(|parts| parts.content.trim()).unwrap_or("")
}

/// True iff the tag opens with the comment modifier.
pub fn is_comment_tag(tag: &str) -> bool {
    split_tag(tag).is_some_and(|parts| parts.modifier == Some(Modifier::Comment))
}

/// True iff the tag is a whitespace-control return marker.
pub fn is_return_tag(tag: &str) -> bool {
    let content = content(tag);
    content.eq_ignore_ascii_case(":return:") || content.eq_ignore_ascii_case(":cr:")
}

/// True iff the tag calls one of the configured prompt functions.
///
/// Only bare calls count: `CommandBar.prompt(...)` is ordinary code.
pub fn is_prompt_tag(tag: &str, config: &TagConfig) -> bool {
    CALL.captures_iter(content(tag))
        .any(|caps| config.is_prompt_function(&caps[1]))
}

/// True iff the tag holds code the processors may need to rewrite.
///
/// Code is a call with a closing parenthesis, a variable declaration, or a
/// trim-modifier tag. Empty tags, tags too short to hold anything, comments
/// and prompt tags are never code.
pub fn is_code(tag: &str, config: &TagConfig) -> bool {
    if tag.len() < MIN_CODE_TAG_LEN {
        return false;
    }
    let Some(parts) = split_tag(tag) else {
        return false;
    };
    let content = parts.content.trim();
    if content.is_empty() || parts.modifier == Some(Modifier::Comment) {
        return false;
    }
    if is_prompt_tag(tag, config) {
        return false;
    }

    (CALL.is_match(content) && content.contains(')'))
        || DECLARATION.is_match(content)
        || parts.modifier == Some(Modifier::Trim)
}

/// True iff the tag's dotted-access root is a configured template module.
pub fn is_template_module(tag: &str, config: &TagConfig) -> bool {
    MODULE_ROOT
        .captures(content(tag))
        .is_some_and(|caps| config.template_modules.iter().any(|m| *m == caps[1]))
}

/// True iff the tag declares a variable or contains braces.
pub fn is_variable_tag(tag: &str) -> bool {
    let content = content(tag);
    DECLARATION.is_match(content) || content.contains('{') || content.contains('}')
}

/// Name of the function a tag calls first, looking through a leading
/// declaration and `await`.
///
/// ```rust
/// use np_tags::call_name;
///
/// assert_eq!(call_name("<% const x = await include('a') %>"), Some("include"));
/// assert_eq!(call_name("<%= name %>"), None);
/// ```
pub fn call_name(tag: &str) -> Option<&str> {
    LEADING_CALL
        .captures(content(tag))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Classifies a tag for dispatch to a processor.
pub fn classify(tag: &str, config: &TagConfig) -> TagKind {
    if is_comment_tag(tag) {
        return TagKind::Comment;
    }
    if is_return_tag(tag) {
        return TagKind::Return;
    }
    if is_prompt_tag(tag, config) {
        return TagKind::Prompt;
    }

    match call_name(tag) {
        Some("import") => return TagKind::Import,
        Some("include") | Some("template") => return TagKind::Include,
        Some("note") => return TagKind::Note,
        Some("calendar") => return TagKind::Calendar,
        _ => {}
    }

    if is_template_module(tag, config) {
        return TagKind::Module;
    }
    if is_code(tag, config) && content(tag).contains('(') {
        return TagKind::Code;
    }
    if is_variable_tag(tag) {
        return TagKind::Variable;
    }

    match split_tag(tag).and_then(|parts| parts.modifier) {
        Some(modifier) if modifier.is_output() => TagKind::Output,
        _ => TagKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TagConfig {
        TagConfig::default()
    }

    #[test]
    fn comment_tags() {
        assert!(is_comment_tag("<%# note to self %>"));
        assert!(!is_comment_tag("<% # not a comment %>"));
        assert!(!is_comment_tag("<%- value %>"));
    }

    #[test]
    fn code_requires_call_declaration_or_trim() {
        let c = config();
        assert!(is_code("<% doSomething() %>", &c));
        assert!(is_code("<%- web.weather() %>", &c));
        assert!(is_code("<% let x = 1 %>", &c));
        assert!(is_code("<%~ name %>", &c));
        assert!(!is_code("<%= name %>", &c));
    }

    #[test]
    fn open_call_without_close_is_not_code() {
        assert!(!is_code("<% foo( %>", &config()));
    }

    #[test]
    fn empty_and_short_tags_are_not_code() {
        let c = config();
        assert!(!is_code("<%  %>", &c));
        assert!(!is_code("<%\n\t%>", &c));
        assert!(!is_code("<%%>", &c));
        assert!(!is_code("<%>", &c));
    }

    #[test]
    fn prompt_tags_are_not_code() {
        let c = config();
        assert!(is_prompt_tag("<%- prompt('name', 'Your name?') %>", &c));
        assert!(!is_code("<%- prompt('name', 'Your name?') %>", &c));
        assert!(!is_prompt_tag("<% await CommandBar.prompt('x') %>", &c));
        assert!(is_code("<% await CommandBar.prompt('x') %>", &c));
    }

    #[test]
    fn custom_prompt_functions() {
        let c = TagConfig::default().with_prompt_functions(["ask"]);
        assert!(is_prompt_tag("<%- ask('q') %>", &c));
        assert!(!is_prompt_tag("<%- prompt('q') %>", &c));
    }

    #[test]
    fn template_modules() {
        let c = config();
        assert!(is_template_module("<%- date.now('YYYY') %>", &c));
        assert!(is_template_module("<%- await tasks.open() %>", &c));
        assert!(!is_template_module("<%- web.weather() %>", &c));
        assert!(!is_template_module("<%- dateNow() %>", &c));

        let custom = TagConfig::default().with_template_modules(["web"]);
        assert!(is_template_module("<%- web.weather() %>", &custom));
    }

    #[test]
    fn variable_tags() {
        assert!(is_variable_tag("<% const x = 'a' %>"));
        assert!(is_variable_tag("<% if (x) { %>"));
        assert!(is_variable_tag("<% } %>"));
        assert!(!is_variable_tag("<%= constant %>"));
    }

    #[test]
    fn return_tags() {
        assert!(is_return_tag("<% :return: %>"));
        assert!(is_return_tag("<% :CR: %>"));
        assert!(!is_return_tag("<% return %>"));
    }

    #[test]
    fn classification_order() {
        let c = config();
        assert_eq!(classify("<%# include('x') %>", &c), TagKind::Comment);
        assert_eq!(classify("<% :cr: %>", &c), TagKind::Return);
        assert_eq!(classify("<%- prompt('a') %>", &c), TagKind::Prompt);
        assert_eq!(classify("<%- import('a') %>", &c), TagKind::Import);
        assert_eq!(classify("<%- include('a') %>", &c), TagKind::Include);
        assert_eq!(classify("<%- template('a') %>", &c), TagKind::Include);
        assert_eq!(
            classify("<% const body = include('a') %>", &c),
            TagKind::Include
        );
        assert_eq!(classify("<%- note('Title') %>", &c), TagKind::Note);
        assert_eq!(classify("<%- calendar('20240101') %>", &c), TagKind::Calendar);
        assert_eq!(classify("<%- date.now() %>", &c), TagKind::Module);
        assert_eq!(classify("<% doThing() %>", &c), TagKind::Code);
        assert_eq!(classify("<% const x = 'test' %>", &c), TagKind::Variable);
        assert_eq!(classify("<%= name %>", &c), TagKind::Output);
        assert_eq!(classify("<% name %>", &c), TagKind::Other);
    }

    #[test]
    fn note_call_must_be_exact() {
        let c = config();
        assert_ne!(classify("<%- getnote('x') %>", &c), TagKind::Note);
        assert_eq!(classify("<%- getnote('x') %>", &c), TagKind::Code);
    }
}
