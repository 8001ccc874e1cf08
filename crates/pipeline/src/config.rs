//! Process-wide credentials.
//!
//! Both services need the same two secrets. They are loaded once at start-up
//! and their absence is carried as a value, because each invocation must
//! report it and answer rather than the process refusing to start.

use secrecy::SecretString;

use crate::errors::ConfigError;

/// Environment variable holding the source-control access token.
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";
/// Environment variable holding the webhook signing secret.
pub const WEBHOOK_SECRET_VAR: &str = "GITHUB_WEBHOOK_SECRET";

/// The secrets shared by the listener and the deployer.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub github_token: SecretString,
    pub webhook_secret: SecretString,
}

impl Credentials {
    pub fn new(github_token: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            github_token: SecretString::from(github_token.into()),
            webhook_secret: SecretString::from(webhook_secret.into()),
        }
    }

    /// Loads credentials through `lookup`, treating empty values as missing.
    ///
    /// The token is checked first, so when both are absent the error names
    /// the token.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let github_token = read(GITHUB_TOKEN_VAR)?;
        let webhook_secret = read(WEBHOOK_SECRET_VAR)?;
        Ok(Self::new(github_token, webhook_secret))
    }

    /// Loads credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_both_present() {
        let creds = Credentials::from_lookup(lookup(&[
            (GITHUB_TOKEN_VAR, "ghp_x"),
            (WEBHOOK_SECRET_VAR, "s3cret"),
        ]))
        .unwrap();
        assert_eq!(creds.github_token.expose_secret(), "ghp_x");
        assert_eq!(creds.webhook_secret.expose_secret(), "s3cret");
    }

    #[test]
    fn test_missing_token_is_named_first() {
        let err = Credentials::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(GITHUB_TOKEN_VAR));
    }

    #[test]
    fn test_empty_secret_counts_as_missing() {
        let err = Credentials::from_lookup(lookup(&[
            (GITHUB_TOKEN_VAR, "ghp_x"),
            (WEBHOOK_SECRET_VAR, ""),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(WEBHOOK_SECRET_VAR));
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let creds = Credentials::new("ghp_visible", "secret_visible");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("ghp_visible"));
        assert!(!rendered.contains("secret_visible"));
    }
}
