//! Template validation utilities.

use minijinja::{Environment, UndefinedBehavior};

/// Validates a template by parsing it and performing a test render with empty data.
///
/// Detects syntax errors as well as runtime errors like unknown filters.
/// Missing variables are allowed, matching how notifications are rendered.
///
/// # Errors
/// Returns an error string if the template syntax is invalid or uses unknown filters.
pub fn validate_template(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.add_template("_validate", source)
        .map_err(|e| e.to_string())?;

    let tmpl = env.get_template("_validate").map_err(|e| e.to_string())?;
    tmpl.render(serde_json::json!({}))
        .map_err(|e| e.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_template_detects_syntax_errors() {
        let result = validate_template("{% if unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn validate_template_detects_unknown_filter() {
        let result = validate_template("{{ exception.message | truncate(50) }}");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("truncate"));
    }

    #[test]
    fn validate_template_allows_builtin_filters() {
        let result = validate_template("{{ exception.class | upper | default('unknown') }}");
        assert!(result.is_ok());
    }

    #[test]
    fn validate_template_allows_missing_variables() {
        let result = validate_template(
            "{{ exception.message }}{% if request_data %}{{ request_data.url }}{% endif %}",
        );
        assert!(result.is_ok());
    }
}
