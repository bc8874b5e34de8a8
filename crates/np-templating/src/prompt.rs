//! Prompt resolution.
//!
//! Tags calling a prompt function (`prompt`, `promptDate`, ...) ask the
//! user for a value. Asking is up to the embedder: the pipeline hands the
//! text to a [`PromptResolver`] and continues with whatever it returns.
//!
//! Cancellation is a normal outcome, not an error: a resolver returns
//! [`PromptOutcome::Cancelled`] and the render produces empty output.

use std::collections::HashMap;

use np_tags::DEFAULT_PROMPT_FUNCTIONS;

use crate::args::TagCall;
use crate::context::{display_value, SessionData};
use crate::error::TemplatingError;

/// Result of resolving the prompts in a text.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome {
    /// Prompts answered. `text` has the prompt tags resolved and
    /// `session_data` holds the answers.
    Resolved {
        text: String,
        session_data: SessionData,
    },
    /// The user aborted.
    Cancelled,
}

/// Resolves prompt tags against the user.
pub trait PromptResolver: Send + Sync {
    /// Resolves every prompt tag in `text`.
    ///
    /// `open` and `close` are the tag delimiters in use. Returns an error
    /// only for a failure; a user abort is [`PromptOutcome::Cancelled`].
    fn resolve_prompts(
        &self,
        text: &str,
        session_data: &SessionData,
        open: &str,
        close: &str,
    ) -> Result<PromptOutcome, TemplatingError>;
}

/// Leaves the text and session data as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompts;

impl PromptResolver for NoPrompts {
    fn resolve_prompts(
        &self,
        text: &str,
        session_data: &SessionData,
        _open: &str,
        _close: &str,
    ) -> Result<PromptOutcome, TemplatingError> {
        Ok(PromptOutcome::Resolved {
            text: text.to_string(),
            session_data: session_data.clone(),
        })
    }
}

/// Answers prompts from a fixed script, keyed by variable name.
///
/// A prompt's variable is the name it is assigned to, or else its first
/// argument. Variables already in the session data are not asked again.
/// A prompt with no scripted answer, or one scripted to cancel, cancels the
/// whole render.
///
/// # Example
///
/// ```rust
/// use np_templating::{PromptOutcome, PromptResolver, ScriptedPromptResolver, SessionData};
///
/// let resolver = ScriptedPromptResolver::new().answer("name", "Ada");
/// let outcome = resolver
///     .resolve_prompts("Hi <%- prompt('name', 'Who?') %>", &SessionData::new(), "<%", "%>")
///     .unwrap();
///
/// match outcome {
///     PromptOutcome::Resolved { text, session_data } => {
///         assert_eq!(text, "Hi Ada");
///         assert_eq!(session_data["name"], "Ada");
///     }
///     PromptOutcome::Cancelled => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedPromptResolver {
    answers: HashMap<String, Option<String>>,
    prompt_functions: Vec<String>,
}

impl Default for ScriptedPromptResolver {
    fn default() -> Self {
        Self {
            answers: HashMap::new(),
            prompt_functions: DEFAULT_PROMPT_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One prompt tag found in the text.
struct PromptTag<'a> {
    start: usize,
    end: usize,
    output: bool,
    call: TagCall,
    raw: &'a str,
}

impl ScriptedPromptResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the answer for a variable.
    pub fn answer(mut self, variable: impl Into<String>, value: impl Into<String>) -> Self {
        self.answers.insert(variable.into(), Some(value.into()));
        self
    }

    /// Scripts a cancellation when the variable is asked for.
    pub fn cancel(mut self, variable: impl Into<String>) -> Self {
        self.answers.insert(variable.into(), None);
        self
    }

    pub fn with_prompt_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt_functions = names.into_iter().map(Into::into).collect();
        self
    }

    fn find_prompts<'a>(&self, text: &'a str, open: &str, close: &str) -> Vec<PromptTag<'a>> {
        let mut found = Vec::new();
        let mut pos = 0;

        while let Some(offset) = text[pos..].find(open) {
            let start = pos + offset;
            let Some(close_offset) = text[start + open.len()..].find(close) else {
                break;
            };
            let end = start + open.len() + close_offset + close.len();
            pos = end;

            let inner = &text[start + open.len()..end - close.len()];
            let (output, code) = match inner.chars().next() {
                Some('#') => continue,
                Some(c @ ('-' | '=' | '~')) => (true, &inner[c.len_utf8()..]),
                _ => (false, inner),
            };
            let code = code.strip_suffix('-').unwrap_or(code);

            if let Some(call) = TagCall::parse_code(code) {
                if self.prompt_functions.iter().any(|f| *f == call.function_name) {
                    found.push(PromptTag {
                        start,
                        end,
                        output,
                        call,
                        raw: &text[start..end],
                    });
                }
            }
        }

        found
    }
}

impl PromptResolver for ScriptedPromptResolver {
    fn resolve_prompts(
        &self,
        text: &str,
        session_data: &SessionData,
        open: &str,
        close: &str,
    ) -> Result<PromptOutcome, TemplatingError> {
        let mut session = session_data.clone();
        let mut output = String::with_capacity(text.len());
        let mut last = 0;

        for tag in self.find_prompts(text, open, close) {
            let variable = match &tag.call.assignment {
                Some(name) => name.clone(),
                None => tag
                    .call
                    .first_arg()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        TemplatingError::Prompt(format!("prompt has no variable name: {}", tag.raw))
                    })?,
            };

            let answer = match session.get(&variable) {
                Some(existing) => display_value(existing),
                None => match self.answers.get(&variable) {
                    Some(Some(answer)) => answer.clone(),
                    Some(None) | None => {
                        tracing::debug!(variable = %variable, "prompt cancelled");
                        return Ok(PromptOutcome::Cancelled);
                    }
                },
            };
            session
                .entry(variable)
                .or_insert_with(|| answer.clone().into());

            output.push_str(&text[last..tag.start]);
            last = tag.end;
            if tag.output {
                output.push_str(&answer);
            } else if tag.raw.ends_with(&format!("-{}", close)) {
                let rest = &text[last..];
                if rest.starts_with("\r\n") {
                    last += 2;
                } else if rest.starts_with('\n') {
                    last += 1;
                }
            }
        }

        output.push_str(&text[last..]);
        Ok(PromptOutcome::Resolved {
            text: output,
            session_data: session,
        })
    }
}
