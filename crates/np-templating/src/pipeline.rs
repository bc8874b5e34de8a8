//! The render pipeline.
//!
//! [`Templating`] runs a template through a fixed sequence of stages:
//!
//! 1. validate tag delimiters
//! 2. normalize smart quotes and legacy prompt tags
//! 3. render and strip frontmatter
//! 4. splice imports
//! 5. turn `templatejs` code blocks into scriptlets
//! 6. run the tag processors
//! 7. resolve prompts
//! 8. protect ignored code blocks
//! 9. evaluate the remaining tags
//! 10. clean up diagnostics and restore protected blocks

use std::sync::Arc;

use np_tags::{code_blocks, scan_tags, validate, CLOSE_DELIMITER, OPEN_DELIMITER};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::TemplatingConfig;
use crate::context::{lookup_path, merge_session, session_from, ProcessingContext, SessionData};
use crate::engine::{EjsEngine, TemplateEngine};
use crate::error::TemplatingError;
use crate::frontmatter::{self, FrontmatterScope, SEPARATOR};
use crate::processors::ProcessFlow;
use crate::prompt::{NoPrompts, PromptOutcome, PromptResolver};
use crate::protect::{restore_ignored_blocks, temp_protect_ignored_blocks};
use crate::source::{InMemorySource, NoteSource, TemplateSource};

/// Language of fenced blocks that hold template code.
pub const TEMPLATEJS_LANGUAGE: &str = "templatejs";

/// Prefix of the short message returned for a failed render.
pub const ERROR_PREFIX: &str = "**Template Error:**";

const LEGACY_PROMPT_OPEN: &str = "<%@";

static DIAGNOSTIC_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*\(in [^()\n]*:\d+\)").expect("diagnostic location pattern is valid")
});

/// Options for a single render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Stop after frontmatter and return the body unevaluated.
    pub frontmatter_only: bool,
    /// Dotted session paths that must have a value before evaluation.
    pub required: Vec<String>,
}

impl RenderOptions {
    pub fn frontmatter_only() -> Self {
        Self {
            frontmatter_only: true,
            ..Self::default()
        }
    }

    pub fn require<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// How a render ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(String),
    /// The user cancelled a prompt.
    Cancelled,
}

impl RenderOutcome {
    /// The rendered text, or `""` when cancelled.
    pub fn into_text(self) -> String {
        match self {
            RenderOutcome::Rendered(text) => text,
            RenderOutcome::Cancelled => String::new(),
        }
    }
}

/// Replaces typographic quotes with straight ones.
fn straighten_quotes(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// Normalizes tags before any other processing.
///
/// Smart quotes inside tags become straight quotes; prose keeps them. The
/// legacy `<%@` prompt shorthand becomes `<%- prompt`.
///
/// ```rust
/// use np_templating::normalize_tags;
///
/// assert_eq!(
///     normalize_tags("“Hi” <%- prompt(‘name’) %> <%@('title') %>"),
///     "“Hi” <%- prompt('name') %> <%- prompt('title') %>",
/// );
/// ```
pub fn normalize_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for span in scan_tags(text) {
        output.push_str(&text[last..span.start]);
        last = span.end;

        let tag = straighten_quotes(span.text);
        match tag.strip_prefix(LEGACY_PROMPT_OPEN) {
            Some(rest) => {
                output.push_str("<%- prompt");
                output.push_str(rest);
            }
            None => output.push_str(&tag),
        }
    }

    output.push_str(&text[last..]);
    output
}

/// Turns fenced `templatejs` blocks into scriptlet tags.
///
/// Blocks with an ignore marker, and blocks that already contain tags, are
/// left alone.
pub fn convert_templatejs_blocks(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for block in code_blocks(text) {
        if !block.language().eq_ignore_ascii_case(TEMPLATEJS_LANGUAGE)
            || block.ignore_marker().is_some()
            || block.body.contains(OPEN_DELIMITER)
        {
            continue;
        }
        output.push_str(&text[last..block.start]);
        output.push_str(&format!("{}\n{}\n-{}", OPEN_DELIMITER, block.body, CLOSE_DELIMITER));
        last = block.end;
    }

    output.push_str(&text[last..]);
    output
}

/// Removes evaluator diagnostics from an error message.
///
/// Location suffixes such as `(in <string>:3)` and any debug sections after
/// a `----` line are dropped.
pub fn strip_diagnostics(message: &str) -> String {
    let head = message
        .lines()
        .take_while(|line| !line.trim_start().starts_with("----"))
        .collect::<Vec<_>>()
        .join("\n");
    DIAGNOSTIC_LOCATION.replace_all(&head, "").trim().to_string()
}

/// The template pipeline.
///
/// # Example
///
/// ```rust
/// use np_templating::{InMemorySource, RenderOptions, Templating};
/// use serde_json::json;
///
/// let source = InMemorySource::new().with_template("sig", "-- <%- name %>");
/// let templating = Templating::new(source);
///
/// let out = templating
///     .render(
///         "Hello, <%= name %>!\n<%- include('sig') %>",
///         &json!({"name": "World"}),
///         &RenderOptions::default(),
///     )
///     .unwrap();
/// assert_eq!(out, "Hello, World!\n-- World");
/// ```
///
/// # Errors
///
/// [`render`](Templating::render) reports nearly every failure in its
/// output rather than as an `Err`: a syntax error comes back as a formatted
/// message with source context, any other failure as a short error string
/// starting with [`ERROR_PREFIX`], and a cancelled prompt as empty output.
/// The single exception is [`TemplatingError::MissingRequiredData`], which
/// callers need to tell apart from other failures.
///
/// [`render_detailed`](Templating::render_detailed) returns every error and
/// reports cancellation explicitly.
pub struct Templating {
    pub(crate) templates: Arc<dyn TemplateSource>,
    pub(crate) notes: Arc<dyn NoteSource>,
    pub(crate) prompts: Arc<dyn PromptResolver>,
    pub(crate) engine: Arc<dyn TemplateEngine>,
    pub(crate) config: TemplatingConfig,
}

impl Templating {
    /// Creates a pipeline reading templates from `source`.
    ///
    /// Notes default to none, prompts are left unresolved and the
    /// expression evaluator is [`EjsEngine`].
    pub fn new(source: impl TemplateSource + 'static) -> Self {
        Self {
            templates: Arc::new(source),
            notes: Arc::new(InMemorySource::new()),
            prompts: Arc::new(NoPrompts),
            engine: Arc::new(EjsEngine::new()),
            config: TemplatingConfig::default(),
        }
    }

    pub fn with_notes(mut self, notes: impl NoteSource + 'static) -> Self {
        self.notes = Arc::new(notes);
        self
    }

    pub fn with_prompts(mut self, prompts: impl PromptResolver + 'static) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_config(mut self, config: TemplatingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TemplatingConfig {
        &self.config
    }

    /// Renders `template` with `data` as the caller's session data.
    ///
    /// Returns `Err` only for [`TemplatingError::MissingRequiredData`].
    pub fn render<T: Serialize + ?Sized>(
        &self,
        template: &str,
        data: &T,
        options: &RenderOptions,
    ) -> Result<String, TemplatingError> {
        match self.render_detailed(template, data, options) {
            Ok(outcome) => Ok(outcome.into_text()),
            Err(err) if err.is_required_data() => Err(err),
            Err(err) => Ok(self.error_text(&err)),
        }
    }

    /// Renders `template`, returning every error and reporting cancellation.
    pub fn render_detailed<T: Serialize + ?Sized>(
        &self,
        template: &str,
        data: &T,
        options: &RenderOptions,
    ) -> Result<RenderOutcome, TemplatingError> {
        let session = session_from(data)?;
        self.run(template, session, options, Vec::new())
    }

    /// The text a failed render produces.
    pub(crate) fn error_text(&self, err: &TemplatingError) -> String {
        match err {
            TemplatingError::Syntax(syntax) => syntax.to_string(),
            other => {
                tracing::error!(error = %other, debug = ?other, "template render failed");
                format!("{} {}", ERROR_PREFIX, strip_diagnostics(&other.to_string()))
            }
        }
    }

    /// Renders the frontmatter block's own tags, merges the attributes into
    /// `session` and returns the body.
    ///
    /// Text without frontmatter is returned unchanged.
    pub fn process_frontmatter_tags(
        &self,
        text: &str,
        session: &mut SessionData,
    ) -> Result<RenderOutcome, TemplatingError> {
        self.frontmatter_stage(text, session, &[])
    }

    fn frontmatter_stage(
        &self,
        text: &str,
        session: &mut SessionData,
        include_stack: &[String],
    ) -> Result<RenderOutcome, TemplatingError> {
        let Some(parts) = frontmatter::split(text) else {
            return Ok(RenderOutcome::Rendered(text.to_string()));
        };
        if !frontmatter::is_frontmatter_template(text) {
            return Ok(RenderOutcome::Rendered(text.to_string()));
        }

        let mut block = if parts.block.contains(OPEN_DELIMITER) {
            tracing::debug!("rendering frontmatter tags");
            let mut block_session = session.clone();
            let block = match self.run_in(
                parts.block,
                &mut block_session,
                &RenderOptions::default(),
                include_stack.to_vec(),
            )? {
                RenderOutcome::Rendered(block) => block,
                RenderOutcome::Cancelled => return Ok(RenderOutcome::Cancelled),
            };
            // Prompt answers given in the block stay in scope for the body.
            merge_session(session, &block_session);
            block
        } else {
            parts.block.to_string()
        };
        if !block.ends_with('\n') {
            block.push('\n');
        }

        let rebuilt = format!("{SEPARATOR}\n{block}{SEPARATOR}\n{}", parts.body);
        let parsed = frontmatter::parse(&rebuilt);
        FrontmatterScope::from_frontmatter(&parsed)
            .with_render_methods(self.config.frontmatter_render_methods)
            .merge_into(session, &self.config.frontmatter_namespace);
        Ok(RenderOutcome::Rendered(parsed.body))
    }

    /// Every stage, in order, propagating errors.
    pub(crate) fn run(
        &self,
        template: &str,
        mut session: SessionData,
        options: &RenderOptions,
        include_stack: Vec<String>,
    ) -> Result<RenderOutcome, TemplatingError> {
        self.run_in(template, &mut session, options, include_stack)
    }

    /// Like [`run`](Self::run), leaving the final session data in `session`
    /// once the template renders.
    fn run_in(
        &self,
        template: &str,
        session: &mut SessionData,
        options: &RenderOptions,
        include_stack: Vec<String>,
    ) -> Result<RenderOutcome, TemplatingError> {
        validate(template)?;

        let text = normalize_tags(template);

        let text = match self.frontmatter_stage(&text, session, &include_stack)? {
            RenderOutcome::Rendered(body) => body,
            RenderOutcome::Cancelled => return Ok(RenderOutcome::Cancelled),
        };
        if options.frontmatter_only {
            return Ok(RenderOutcome::Rendered(text));
        }

        let text = self.import_templates(&text, session);
        let text = convert_templatejs_blocks(&text);

        let mut ctx =
            ProcessingContext::new(text, session.clone()).with_include_stack(include_stack);
        if self.pre_process_tags(&mut ctx)? == ProcessFlow::Cancelled {
            return Ok(RenderOutcome::Cancelled);
        }
        tracing::debug!(depth = ctx.include_depth(), "tags pre-processed");

        let (text, resolved) = match self.prompts.resolve_prompts(
            &ctx.template_text,
            &ctx.merged_session(),
            OPEN_DELIMITER,
            CLOSE_DELIMITER,
        )? {
            PromptOutcome::Resolved { text, session_data } => (text, session_data),
            PromptOutcome::Cancelled => {
                tracing::debug!("prompt cancelled, rendering nothing");
                return Ok(RenderOutcome::Cancelled);
            }
        };
        *session = resolved;
        merge_session(session, &ctx.overrides);

        let missing: Vec<String> = options
            .required
            .iter()
            .filter(|path| lookup_path(session, path).map_or(true, Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TemplatingError::MissingRequiredData(missing));
        }

        let (text, saved) = temp_protect_ignored_blocks(&text);
        let rendered = self
            .engine
            .render_template(&text, &Value::Object(session.clone()))?;

        Ok(RenderOutcome::Rendered(restore_ignored_blocks(&rendered, &saved)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_quotes_only_inside_tags() {
        let text = "‘prose’ <%= “a” %>";
        assert_eq!(normalize_tags(text), "‘prose’ <%= \"a\" %>");
    }

    #[test]
    fn legacy_prompt_shorthand() {
        assert_eq!(normalize_tags("<%@ ('x') %>"), "<%- prompt ('x') %>");
    }

    #[test]
    fn templatejs_blocks_become_scriptlets() {
        let text = "a\n```templatejs\nconst x = 1\n```\nb";
        assert_eq!(convert_templatejs_blocks(text), "a\n<%\nconst x = 1\n-%>\nb");
    }

    #[test]
    fn templatejs_blocks_with_tags_or_markers_stay() {
        let with_tags = "```templatejs\n<% x %>\n```";
        assert_eq!(convert_templatejs_blocks(with_tags), with_tags);
        let ignored = "```templatejs\n// ignore\nx\n```";
        assert_eq!(convert_templatejs_blocks(ignored), ignored);
        let other = "```js\nx\n```";
        assert_eq!(convert_templatejs_blocks(other), other);
    }

    #[test]
    fn diagnostics_are_stripped() {
        assert_eq!(
            strip_diagnostics("undefined value (in <string>:3)\n---- Template Source ----\nx"),
            "undefined value"
        );
        assert_eq!(strip_diagnostics("plain"), "plain");
    }

    #[test]
    fn options_builder() {
        let options = RenderOptions::default().require(["data.title"]);
        assert_eq!(options.required, vec!["data.title".to_string()]);
        assert!(RenderOptions::frontmatter_only().frontmatter_only);
    }

    #[test]
    fn outcome_text() {
        assert_eq!(RenderOutcome::Cancelled.into_text(), "");
        assert_eq!(RenderOutcome::Rendered("x".into()).into_text(), "x");
    }
}
