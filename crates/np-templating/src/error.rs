//! Error types for template processing.
//!
//! [`RenderError`] is what a [`TemplateEngine`](crate::engine::TemplateEngine)
//! returns; it hides the underlying engine's error type. [`TemplatingError`]
//! is the pipeline's error, most of which [`Templating::render`] turns into a
//! short message in the output instead of returning it.
//!
//! [`Templating::render`]: crate::Templating::render

use std::fmt;

use np_tags::TagSyntaxError;

/// Stable prefix of the [`TemplatingError::MissingRequiredData`] message.
///
/// Callers match on this to tell missing input apart from other failures.
pub const REQUIRED_DATA_MARKER: &str = "Missing required data:";

/// Error returned by expression evaluation.
#[derive(Debug)]
pub enum RenderError {
    /// Template syntax error or unsupported construct.
    TemplateError(String),

    /// A referenced value does not exist. The message already names the
    /// error kind.
    UndefinedValue(String),

    /// Data serialization error.
    SerializationError(String),

    /// Other operational error.
    OperationError(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::TemplateError(msg) => write!(f, "template error: {}", msg),
            RenderError::UndefinedValue(msg) => write!(f, "{}", msg),
            RenderError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            RenderError::OperationError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        use minijinja::ErrorKind;

        match err.kind() {
            ErrorKind::UndefinedError => RenderError::UndefinedValue(err.to_string()),
            ErrorKind::SyntaxError
            | ErrorKind::BadEscape
            | ErrorKind::UnknownTest
            | ErrorKind::UnknownFunction
            | ErrorKind::UnknownFilter
            | ErrorKind::UnknownMethod => RenderError::TemplateError(err.to_string()),
            ErrorKind::BadSerialization => RenderError::SerializationError(err.to_string()),
            _ => RenderError::OperationError(err.to_string()),
        }
    }
}

/// Errors raised while processing a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplatingError {
    /// Unbalanced tag delimiters.
    #[error(transparent)]
    Syntax(#[from] TagSyntaxError),

    /// Session data lacks values the caller declared as required.
    #[error("{} {}", REQUIRED_DATA_MARKER, .0.join(", "))]
    MissingRequiredData(Vec<String>),

    /// Expression evaluation failed.
    #[error("{0}")]
    Render(#[from] RenderError),

    /// The prompt resolver failed (as opposed to being cancelled).
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Session data could not be converted.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TemplatingError {
    /// Whether this error must reach the caller instead of being rendered
    /// into the output.
    pub fn is_required_data(&self) -> bool {
        matches!(self, TemplatingError::MissingRequiredData(_))
    }
}

/// Errors loading a [`TemplatingConfig`](crate::TemplatingConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
