//! Environment variable substitution.

use crate::error::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Resolves `${VAR_NAME}` patterns in a string.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut result = value.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_PATTERN.captures_iter(value) {
        let var_name = &cap[1];

        match std::env::var(var_name) {
            Ok(var_value) => {
                result = result.replace(&cap[0], &var_value);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if errors.len() > 1 { "s" } else { "" },
            errors.join(", ")
        )))
    }
}
