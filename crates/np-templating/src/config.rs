//! Pipeline configuration.
//!
//! Everything the scanner and the statement rewriter treat as "known" lives
//! here rather than in module state, so tests and embedders can supply
//! their own lists.
//!
//! ```rust
//! use np_templating::TemplatingConfig;
//!
//! let config = TemplatingConfig::from_yaml(r#"
//! async_functions:
//!   - fetchWeather
//!   - web.*
//! max_include_depth: 4
//! "#).unwrap();
//!
//! assert!(config.is_async_function("web.quote"));
//! assert_eq!(config.max_include_depth, 4);
//! // Unlisted fields keep their defaults.
//! assert!(config.template_modules.iter().any(|m| m == "date"));
//! ```

use std::path::Path;

use np_tags::{TagConfig, DEFAULT_PROMPT_FUNCTIONS, DEFAULT_TEMPLATE_MODULES};
use serde::Deserialize;

use crate::error::ConfigError;

/// Host functions that return a promise and need an `await` in front of them.
pub const DEFAULT_ASYNC_FUNCTIONS: &[&str] = &[
    "CommandBar.chooseOption",
    "CommandBar.prompt",
    "CommandBar.textPrompt",
    "DataStore.invokePluginCommandByName",
    "DataStore.projectNoteByFilename",
    "DataStore.calendarNoteByDate",
    "DataStore.updateCache",
    "Editor.openNoteByFilename",
    "Editor.openNoteByTitle",
    "Editor.openNoteByDate",
    "invokePluginCommandByName",
    "getNote",
    "getNotes",
    "fetch",
    "web.advice",
    "web.affirmation",
    "web.quote",
    "web.verse",
    "web.weather",
    "web.journalingQuestion",
    "web.services",
];

/// Reserved session key holding frontmatter attributes.
pub const DEFAULT_FRONTMATTER_NAMESPACE: &str = "frontmatter";

/// Default limit on nested includes.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplatingConfig {
    /// Call names that get an `await`. An entry ending in `.*` matches every
    /// method of that object.
    pub async_functions: Vec<String>,
    /// Roots of `module.method` expressions provided by template modules.
    pub template_modules: Vec<String>,
    /// Functions handled by the prompt resolver.
    pub prompt_functions: Vec<String>,
    /// Maximum nesting of includes before an error marker is emitted.
    pub max_include_depth: usize,
    /// Session key under which frontmatter attributes are exposed.
    pub frontmatter_namespace: String,
    /// Also expose `attributes` and `body` under the namespace key.
    pub frontmatter_render_methods: bool,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for TemplatingConfig {
    fn default() -> Self {
        Self {
            async_functions: owned(DEFAULT_ASYNC_FUNCTIONS),
            template_modules: owned(DEFAULT_TEMPLATE_MODULES),
            prompt_functions: owned(DEFAULT_PROMPT_FUNCTIONS),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            frontmatter_namespace: DEFAULT_FRONTMATTER_NAMESPACE.to_string(),
            frontmatter_render_methods: false,
        }
    }
}

impl TemplatingConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Replaces the async function allowlist.
    pub fn with_async_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.async_functions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Whether a call to `name` should be awaited.
    pub fn is_async_function(&self, name: &str) -> bool {
        self.async_functions.iter().any(|entry| match entry.strip_suffix(".*") {
            Some(object) => name
                .strip_prefix(object)
                .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1),
            None => entry == name,
        })
    }

    pub fn is_prompt_function(&self, name: &str) -> bool {
        self.prompt_functions.iter().any(|f| f == name)
    }

    /// The subset of this configuration the tag classifier needs.
    pub fn tag_config(&self) -> TagConfig {
        TagConfig::default()
            .with_template_modules(self.template_modules.iter().cloned())
            .with_prompt_functions(self.prompt_functions.iter().cloned())
    }
}
