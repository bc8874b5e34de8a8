//! # np-templating - EJS-style note templates
//!
//! `np-templating` renders note templates written with `<% ... %>` tags.
//! Before any expression is evaluated, a template is pre-processed: its
//! frontmatter is rendered and parsed, other templates are imported or
//! included, notes are spliced in, literal variable declarations are
//! hoisted into the session, calls to asynchronous host functions get an
//! `await`, and prompts are resolved. What is left is evaluated by a
//! [`TemplateEngine`].
//!
//! ## Quick Start
//!
//! ```rust
//! use np_templating::{InMemorySource, RenderOptions, Templating};
//! use serde_json::json;
//!
//! let source = InMemorySource::new()
//!     .with_template("header", "# <%= title %>");
//! let templating = Templating::new(source);
//!
//! let template = "\
//! ---
//! title: Weekly Review
//! ---
//! <%- include('header') %>
//! <% const owner = \"Ana\" -%>
//! Owner: <%= owner %>, week <%= week %>";
//!
//! let out = templating
//!     .render(template, &json!({"week": 42}), &RenderOptions::default())
//!     .unwrap();
//! assert_eq!(out, "# Weekly Review\nOwner: Ana, week 42");
//! ```
//!
//! ## Pipeline
//!
//! | Stage            | Done by                                       |
//! |------------------|-----------------------------------------------|
//! | validate         | [`np_tags::validate`]                         |
//! | normalize        | [`normalize_tags`]                            |
//! | frontmatter      | [`Templating::process_frontmatter_tags`]      |
//! | imports          | [`Templating::import_templates`]              |
//! | code blocks      | [`convert_templatejs_blocks`]                 |
//! | tag processing   | [`Templating::pre_process_tags`]              |
//! | prompts          | [`PromptResolver`]                            |
//! | evaluation       | [`TemplateEngine`]                            |
//!
//! ## Collaborators
//!
//! Template and note text come from a [`TemplateSource`] and a
//! [`NoteSource`]. [`InMemorySource`] serves both from maps and
//! [`DirectorySource`] reads them from a folder tree. Prompts go through a
//! [`PromptResolver`]; the default, [`NoPrompts`], leaves prompt tags in
//! place, and [`ScriptedPromptResolver`] answers them from a fixed table.
//!
//! ## Configuration
//!
//! [`TemplatingConfig`] lists the host functions that need an `await`, the
//! module and prompt function names, the include depth limit and the
//! frontmatter namespace. It can be loaded from YAML.

mod args;
mod config;
mod context;
pub mod engine;
mod error;
pub mod frontmatter;
mod pipeline;
pub mod processors;
mod prompt;
mod protect;
pub mod rewrite;
mod source;
mod syntax;

pub use args::{unquote, TagCall};
pub use config::{
    TemplatingConfig, DEFAULT_ASYNC_FUNCTIONS, DEFAULT_FRONTMATTER_NAMESPACE,
    DEFAULT_MAX_INCLUDE_DEPTH,
};
pub use context::{
    display_value, lookup_path, merge_session, session_from, ProcessingContext, SessionData,
};
pub use engine::{EjsEngine, TemplateEngine};
pub use error::{ConfigError, RenderError, TemplatingError, REQUIRED_DATA_MARKER};
pub use pipeline::{
    convert_templatejs_blocks, normalize_tags, strip_diagnostics, RenderOptions, RenderOutcome,
    Templating, ERROR_PREFIX, TEMPLATEJS_LANGUAGE,
};
pub use processors::ProcessFlow;
pub use prompt::{NoPrompts, PromptOutcome, PromptResolver, ScriptedPromptResolver};
pub use protect::{
    extract_ignored_blocks, protect_template_literals, restore, restore_ignored_blocks,
    restore_template_literals, temp_protect_ignored_blocks, Protected,
};
pub use source::{
    is_calendar_date, normalize_date_key, DirectorySource, InMemorySource, NoteSource,
    TemplateSource, TEMPLATE_EXTENSIONS,
};

// Tag scanning, re-exported for callers that inspect templates directly
pub use np_tags::{
    classify, get_tags, validate, TagConfig, TagKind, TagSyntaxError, CLOSE_DELIMITER,
    OPEN_DELIMITER,
};
