//! Core configuration types and loading.

use super::env::resolve_env_vars;
use super::secret::SecretString;
use crate::error::ConfigError;
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory, relative to the application root, holding the configuration file.
pub const CONFIG_DIR: &str = "config";

/// Name of the configuration file inside [`CONFIG_DIR`].
pub const CONFIG_FILE_NAME: &str = "exception-email.yml";

/// Directory, relative to the application root, holding email templates.
pub const TEMPLATES_DIR: &str = "email_templates";

/// Standard SMTP submission port used when `port` is not configured.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Well-known locations under an application root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/config/exception-email.yml`
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// `<root>/email_templates`
    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    /// Path of a template file named in the configuration.
    pub fn template(&self, name: &str) -> PathBuf {
        self.templates_dir().join(name)
    }
}

/// Main configuration structure, read once at startup and immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SMTP host.
    pub server: String,
    /// Envelope addresses plus any extra template-visible fields.
    pub header: HeaderConfig,
    /// Template file name under `email_templates/`.
    pub template: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: TlsMode,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    /// SMTP username (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password (supports `${ENV_VAR}` substitution).
    #[serde(default)]
    pub password: Option<SecretString>,
}

/// The `header` section: `from`/`to` drive the SMTP envelope, every key
/// (including the extras) is visible to the template.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeaderConfig {
    pub from: String,
    pub to: Recipients,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One recipient or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            Recipients::One(addr) => vec![addr.as_str()],
            Recipients::Many(addrs) => addrs.iter().map(String::as_str).collect(),
        }
    }
}

/// TLS mode for the SMTP connection.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    None,
    Starttls,
    Tls,
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_true() -> bool {
    true
}

/// Parse an address as written in the configuration (`a@x.com` or `Name <a@x.com>`).
pub(crate) fn parse_mailbox(field: &'static str, address: &str) -> Result<Mailbox, ConfigError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| ConfigError::InvalidAddress {
            field,
            address: address.to_string(),
            message: e.to_string(),
        })
}

impl Config {
    /// Load the configuration of an application root.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] if `config/exception-email.yml` does not exist.
    pub fn load_from_root(paths: &AppPaths, environment: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(&paths.config_file(), environment)
    }

    /// Load configuration from a file path.
    ///
    /// With `environment` set, the document is treated as a mapping from
    /// environment name to configuration and the named section is selected.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] if the file does not exist.
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::MissingEnvironment`] if the section is absent.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path, environment: Option<&str>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::LoadError(format!("{}: {}", path.display(), e))
            }
        })?;

        let document: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let section = match environment {
            Some(name) => document
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnvironment {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                })?,
            None => document,
        };

        let config: Config = serde_yaml::from_value(section)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            environment = environment.unwrap_or("-"),
            server = %config.server,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate addresses and SMTP settings.
    ///
    /// # Errors
    /// Returns a `Vec<ConfigError>` containing all validation errors found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.server.trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "server must not be empty".to_string(),
            ));
        }

        if self.template.trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "template must not be empty".to_string(),
            ));
        }

        if let Err(e) = parse_mailbox("header.from", &self.header.from) {
            errors.push(e);
        }

        let recipients = self.header.to.addresses();
        if recipients.is_empty() {
            errors.push(ConfigError::ValidationError(
                "header.to must contain at least one address".to_string(),
            ));
        }
        for addr in recipients {
            if let Err(e) = parse_mailbox("header.to", addr) {
                errors.push(e);
            }
        }

        if let Err(e) = self.credentials() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve SMTP credentials, substituting `${ENV_VAR}` references.
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] if only one of username/password
    /// is set or a referenced variable is undefined.
    pub fn credentials(&self) -> Result<Option<(String, SecretString)>, ConfigError> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let user = resolve_env_vars(user)
                    .map_err(|e| ConfigError::ValidationError(format!("username: {}", e)))?;
                let pass = resolve_env_vars(pass.expose())
                    .map_err(|e| ConfigError::ValidationError(format!("password: {}", e)))?;
                Ok(Some((user, SecretString::new(pass))))
            }
            (Some(_), None) => Err(ConfigError::ValidationError(
                "password required when username is set".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::ValidationError(
                "username required when password is set".to_string(),
            )),
            (None, None) => Ok(None),
        }
    }
}
