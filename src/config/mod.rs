//! Configuration loading and validation for the exception notifier.
//!
//! This module handles loading the YAML configuration file from the
//! application's `config/` directory, validation, and resolving
//! environment variables for SMTP credentials.

mod env;
mod secret;
mod types;
mod validation;

// Re-exports publics
pub use env::resolve_env_vars;
pub use secret::SecretString;
pub use types::{
    AppPaths, CONFIG_DIR, CONFIG_FILE_NAME, Config, DEFAULT_SMTP_PORT, HeaderConfig, Recipients,
    TEMPLATES_DIR, TlsMode,
};
pub use validation::validate_template;

pub(crate) use types::parse_mailbox;
