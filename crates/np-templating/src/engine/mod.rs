//! Expression evaluation.
//!
//! After pre-processing, the remaining output and scriptlet tags are handed
//! to a [`TemplateEngine`] together with the assembled session data. The
//! default is [`EjsEngine`]. Embedders with their own evaluator implement
//! the trait and pass it to [`Templating::with_engine`].
//!
//! [`Templating::with_engine`]: crate::Templating::with_engine

mod ejs;
mod expr;

pub use ejs::{register_filters, transpile, EjsEngine};

use crate::error::RenderError;

/// Evaluates the expression tags left in a template.
pub trait TemplateEngine: Send + Sync {
    /// Renders `template` against `data`, which is a JSON object of session
    /// variables.
    fn render_template(&self, template: &str, data: &serde_json::Value) -> Result<String, RenderError>;
}

impl<T: TemplateEngine + ?Sized> TemplateEngine for Box<T> {
    fn render_template(&self, template: &str, data: &serde_json::Value) -> Result<String, RenderError> {
        (**self).render_template(template, data)
    }
}
