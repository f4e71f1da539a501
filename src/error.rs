//! Centralized error types for the exception notifier using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist. Fatal at startup.
    #[error(
        "configuration file not found: {path}. Create 'exception-email.yml' in the application's \
         'config/' directory with 'server', 'template', 'header.from' and 'header.to' entries"
    )]
    Missing { path: PathBuf },
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("environment '{name}' not found in {path}")]
    MissingEnvironment { name: String, path: PathBuf },
    #[error("invalid {field} address '{address}': {message}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        message: String,
    },
    #[error("template file not found: {path}")]
    TemplateNotFound { path: PathBuf },
    #[error("invalid template '{name}': {message}")]
    InvalidTemplate { name: String, message: String },
}

/// Errors related to template rendering.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{name}' not found")]
    NotFound { name: String },
    #[error("template render failed: {message}")]
    RenderFailed { message: String },
}

/// Errors raised while building or sending a notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("failed to send notification: {0}")]
    SendFailed(String),
}
