//! Message templating for exception notifications.
//!
//! The template file lives under `email_templates/` and is rendered with
//! minijinja against a [`NotificationPayload`](crate::payload::NotificationPayload).
//! Variable substitution (`{{ exception.message }}`) works like Mustache;
//! conditional blocks use `{% if request_data %} ... {% endif %}`.
//!
//! Outgoing mail is plain text, so any HTML entity produced by the engine's
//! auto-escaping (enabled for `*.html` templates) is decoded after rendering.
//!
//! # Example
//!
//! ```ignore
//! use exception_notifier::template::TemplateEngine;
//! use serde_json::json;
//!
//! let engine = TemplateEngine::from_source("notification.txt", "Error: {{ exception.message }}")?;
//! let text = engine.render(&json!({"exception": {"message": "boom"}}))?;
//! assert_eq!(text, "Error: boom");
//! ```

use crate::config::validate_template;
use crate::error::{ConfigError, TemplateError};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::Path;

/// A validated notification template.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    /// File name; its extension selects auto-escaping.
    name: String,
    source: String,
}

impl TemplateEngine {
    /// Load and validate a template file.
    ///
    /// # Errors
    /// Returns [`ConfigError::TemplateNotFound`] if the file does not exist.
    /// Returns [`ConfigError::InvalidTemplate`] if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let source = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::TemplateNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::InvalidTemplate {
                    name: name.clone(),
                    message: format!("cannot read {}: {}", path.display(), e),
                }
            }
        })?;

        tracing::debug!(template = %name, path = %path.display(), "Template loaded");
        Self::from_source(name, source)
    }

    /// Build a template from its source text.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTemplate`] on syntax errors or unknown filters.
    pub fn from_source(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let source = source.into();
        validate_template(&source).map_err(|message| ConfigError::InvalidTemplate {
            name: name.clone(),
            message,
        })?;
        Ok(Self { name, source })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the template with `context`, returning plain text.
    ///
    /// Undefined variables render as empty strings.
    pub fn render<S: Serialize>(&self, context: &S) -> Result<String, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_template(&self.name, &self.source)
            .map_err(|e| TemplateError::RenderFailed {
                message: e.to_string(),
            })?;

        let tmpl = env
            .get_template(&self.name)
            .map_err(|_| TemplateError::NotFound {
                name: self.name.clone(),
            })?;

        let rendered = tmpl
            .render(context)
            .map_err(|e| TemplateError::RenderFailed {
                message: e.to_string(),
            })?;

        tracing::trace!(
            template = %self.name,
            len = rendered.len(),
            "Template rendered successfully"
        );
        Ok(unescape_html(&rendered))
    }
}

/// Decode HTML character references (`&amp;`, `&lt;`, `&#x27;`, `&eacute;`, ...).
pub fn unescape_html(input: &str) -> String {
    html_escape::decode_html_entities(input).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exception_context(message: &str) -> serde_json::Value {
        json!({
            "from": "a@x.com",
            "exception": {"class": "RuntimeError", "message": message}
        })
    }

    #[test]
    fn render_substitutes_nested_fields() {
        let engine = TemplateEngine::from_source(
            "notification.txt",
            "From: {{ from }}\n\n{{ exception.class }}: {{ exception.message }}",
        )
        .unwrap();

        let text = engine.render(&exception_context("boom")).unwrap();
        assert_eq!(text, "From: a@x.com\n\nRuntimeError: boom");
    }

    #[test]
    fn render_missing_fields_as_empty() {
        let engine =
            TemplateEngine::from_source("notification.txt", "[{{ request_data.url }}]").unwrap();
        let text = engine.render(&exception_context("boom")).unwrap();
        assert_eq!(text, "[]");
    }

    #[test]
    fn render_conditional_section() {
        let engine = TemplateEngine::from_source(
            "notification.txt",
            "{% if request_data %}URL: {{ request_data.url }}{% else %}no request{% endif %}",
        )
        .unwrap();

        assert_eq!(
            engine.render(&exception_context("boom")).unwrap(),
            "no request"
        );
        let with_request = json!({"request_data": {"url": "/orders"}});
        assert_eq!(engine.render(&with_request).unwrap(), "URL: /orders");
    }

    #[test]
    fn html_template_output_is_unescaped() {
        let engine =
            TemplateEngine::from_source("notification.html", "{{ exception.message }}").unwrap();

        let text = engine
            .render(&exception_context("expected <tag> & \"quote\" in 'a/b'"))
            .unwrap();
        assert_eq!(text, "expected <tag> & \"quote\" in 'a/b'");
    }

    #[test]
    fn text_template_is_not_escaped() {
        let engine =
            TemplateEngine::from_source("notification.txt", "{{ exception.message }}").unwrap();
        let text = engine.render(&exception_context("a < b")).unwrap();
        assert_eq!(text, "a < b");
    }

    #[test]
    fn invalid_syntax_rejected() {
        let err = TemplateEngine::from_source("broken.txt", "{% if unclosed").unwrap_err();
        match err {
            ConfigError::InvalidTemplate { name, .. } => assert_eq!(name, "broken.txt"),
            e => panic!("Expected InvalidTemplate, got {:?}", e),
        }
    }

    #[test]
    fn load_missing_file_returns_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.txt");
        match TemplateEngine::load(&path).unwrap_err() {
            ConfigError::TemplateNotFound { path: p } => assert_eq!(p, path),
            e => panic!("Expected TemplateNotFound, got {:?}", e),
        }
    }

    #[test]
    fn load_uses_file_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notification.txt");
        std::fs::write(&path, "{{ exception.message }}").unwrap();

        let engine = TemplateEngine::load(&path).unwrap();
        assert_eq!(engine.name(), "notification.txt");
    }

    #[test]
    fn unescape_named_and_numeric_references() {
        assert_eq!(unescape_html("&lt;b&gt; &amp; &quot;x&quot;"), "<b> & \"x\"");
        assert_eq!(unescape_html("it&#x27;s &#39;ok&#39; &#x2f;"), "it's 'ok' /");
        assert_eq!(unescape_html("caf&eacute; &copy;"), "caf\u{e9} \u{a9}");
        assert_eq!(unescape_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn unescape_keeps_plain_text() {
        assert_eq!(unescape_html("a & b"), "a & b");
        assert_eq!(unescape_html("no entities"), "no entities");
    }

    #[test]
    fn literal_entities_in_template_are_decoded() {
        let engine = TemplateEngine::from_source(
            "notification.txt",
            "Error&nbsp;report: {{ exception.message }} &mdash; see log",
        )
        .unwrap();
        let text = engine.render(&exception_context("boom")).unwrap();
        assert_eq!(text, "Error\u{a0}report: boom \u{2014} see log");
    }
}
