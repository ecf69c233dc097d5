//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Range checks against the bounds in schema.rs
//! - Cross-field checks (timeout must stay below TTL)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Token values are redacted in every message
//! - Optional hardening checks are gated by environment variables so default
//!   behavior stays compatible with permissive backends

use std::fmt;

use crate::config::schema::{
    PlaneConfig, MAX_NAMESPACE_LEN, MAX_RETRY_TIMES, MAX_TIMEOUT_SECS, MAX_TOKEN_LEN, MAX_TTL_SECS,
    MAX_WEIGHT, MIN_RETRY_TIMES, MIN_TIMEOUT_SECS, MIN_TOKEN_LEN, MIN_TTL_SECS, MIN_WEIGHT,
};

const TOKEN_COMPLEXITY_ENV: &str = "PLANEGUARD_ENABLE_TOKEN_COMPLEXITY_CHECK";
const SENSITIVE_DISABLE_ENV: &str = "PLANEGUARD_DISABLE_NAMESPACE_SENSITIVE_CHECK";
const SENSITIVE_WORDS_ENV: &str = "PLANEGUARD_NAMESPACE_SENSITIVE_WORDS";

const DEFAULT_SENSITIVE_WORDS: &[&str] = &["admin", "root", "system", "internal"];

/// One failed check; `field` identifies the offending option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &PlaneConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_namespace(config, &mut errors);
    validate_token(config, &mut errors);
    validate_ranges(config, &mut errors);
    validate_dependencies(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn push(errors: &mut Vec<ValidationError>, field: &'static str, message: impl ToString) {
    errors.push(ValidationError {
        field,
        message: message.to_string(),
    });
}

fn validate_namespace(config: &PlaneConfig, errors: &mut Vec<ValidationError>) {
    let namespace = &config.namespace;
    if namespace.is_empty() {
        push(errors, "namespace", "namespace cannot be empty");
        return;
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        push(
            errors,
            "namespace",
            format!("length must not exceed {} characters", MAX_NAMESPACE_LEN),
        );
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        push(
            errors,
            "namespace",
            "only letters, numbers, underscores and hyphens are allowed",
        );
    }

    if sensitive_check_disabled() {
        return;
    }
    let lowered = namespace.to_lowercase();
    for word in sensitive_words() {
        if !word.is_empty() && lowered.contains(&word) {
            push(
                errors,
                "namespace",
                format!("must not contain sensitive word: {}", word),
            );
            return;
        }
    }
}

fn validate_token(config: &PlaneConfig, errors: &mut Vec<ValidationError>) {
    let Some(token) = config.token.as_deref() else {
        return;
    };
    // Messages must never echo the token itself.
    if token.len() < MIN_TOKEN_LEN {
        push(
            errors,
            "token",
            format!("must be at least {} characters long", MIN_TOKEN_LEN),
        );
    }
    if token.len() > MAX_TOKEN_LEN {
        push(
            errors,
            "token",
            format!("length must not exceed {} characters", MAX_TOKEN_LEN),
        );
    }

    if std::env::var(TOKEN_COMPLEXITY_ENV).as_deref() == Ok("1") {
        let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = token.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            push(
                errors,
                "token",
                format!(
                    "must contain both letters and digits ({}=1)",
                    TOKEN_COMPLEXITY_ENV
                ),
            );
        }
    }
}

fn validate_ranges(config: &PlaneConfig, errors: &mut Vec<ValidationError>) {
    if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&config.weight) {
        push(
            errors,
            "weight",
            format!(
                "must be between {} and {} (got {})",
                MIN_WEIGHT, MAX_WEIGHT, config.weight
            ),
        );
    }
    if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&config.ttl_secs) {
        push(
            errors,
            "ttl_secs",
            format!(
                "must be between {} and {} seconds (got {})",
                MIN_TTL_SECS, MAX_TTL_SECS, config.ttl_secs
            ),
        );
    }
    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&config.timeout_secs) {
        push(
            errors,
            "timeout_secs",
            format!(
                "must be between {} and {} seconds (got {})",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, config.timeout_secs
            ),
        );
    }
    if !(MIN_RETRY_TIMES..=MAX_RETRY_TIMES).contains(&config.max_retry_times) {
        push(
            errors,
            "max_retry_times",
            format!(
                "must be between {} and {} (got {})",
                MIN_RETRY_TIMES, MAX_RETRY_TIMES, config.max_retry_times
            ),
        );
    }
}

fn validate_dependencies(config: &PlaneConfig, errors: &mut Vec<ValidationError>) {
    // The call timeout must stay below the registration TTL, otherwise a
    // single slow call can outlive the registration it refreshes.
    if config.timeout_secs >= config.ttl_secs && config.ttl_secs > 0 {
        push(
            errors,
            "timeout_secs",
            format!(
                "must be less than ttl_secs ({} >= {})",
                config.timeout_secs, config.ttl_secs
            ),
        );
    }
}

fn sensitive_check_disabled() -> bool {
    matches!(
        std::env::var(SENSITIVE_DISABLE_ENV).as_deref(),
        Ok("1") | Ok("true")
    )
}

fn sensitive_words() -> Vec<String> {
    match std::env::var(SENSITIVE_WORDS_ENV) {
        Ok(raw) if !raw.is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect(),
        _ => DEFAULT_SENSITIVE_WORDS
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PlaneConfig {
        PlaneConfig {
            namespace: "test-namespace".to_string(),
            token: Some("token-1234".to_string()),
            ..PlaneConfig::default()
        }
    }

    #[test]
    fn default_like_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn collects_multiple_errors() {
        let config = PlaneConfig {
            namespace: String::new(),
            weight: 0,
            ttl_secs: 0,
            ..PlaneConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"namespace"));
        assert!(fields.contains(&"weight"));
        assert!(fields.contains(&"ttl_secs"));
    }

    #[test]
    fn namespace_format_enforced() {
        let mut config = valid();
        config.namespace = "bad namespace!".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "namespace");
    }

    #[test]
    fn short_token_rejected_without_echoing_value() {
        let mut config = valid();
        config.token = Some("short".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "token");
        assert!(!errors[0].message.contains("short"));
    }

    #[test]
    fn timeout_must_stay_below_ttl() {
        let mut config = valid();
        config.timeout_secs = 30;
        config.ttl_secs = 30;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "timeout_secs"));
    }

    #[test]
    fn sensitive_namespace_word_rejected() {
        let mut config = valid();
        config.namespace = "prod-admin".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "namespace"));
    }
}
