//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start against a local
//! development server with no configuration at all.

use std::time::Duration;

use palaver_shared::constants::DEFAULT_SERVER_URI;

use crate::retry::RetryPolicy;
use crate::store::DuplicateJoinPolicy;

/// The identity the client asserts to the server.
///
/// Nothing verifies it; the server takes the client at its word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nick_name: String,
    pub email: String,
}

impl Identity {
    pub fn new(nick_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            nick_name: nick_name.into(),
            email: email.into(),
        }
    }
}

/// Sync client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the chat server; endpoints are resolved relative to it.
    /// Env: `PALAVER_SERVER_URI`
    /// Default: `http://localhost:8080/`
    pub server_uri: String,

    /// Env: `PALAVER_NICKNAME`, `PALAVER_EMAIL`
    /// Default: `anonymous`, empty email.
    pub identity: Identity,

    /// Client-side ceiling on a single long-poll. Should exceed the server's
    /// own hold time.
    /// Env: `PALAVER_POLL_TIMEOUT_SECS`
    /// Default: 60 s
    pub poll_timeout: Duration,

    /// Timeout for the short `join` and `message` requests.
    /// Env: `PALAVER_REQUEST_TIMEOUT_SECS`
    /// Default: 10 s
    pub request_timeout: Duration,

    /// Backoff between failed attempts.
    /// Env: `PALAVER_RETRY_BASE_MS`, `PALAVER_RETRY_MAX_MS`
    /// Default: 500 ms doubling up to 30 s
    pub retry: RetryPolicy,

    /// Give up joining after this many attempts (`None` = keep trying).
    /// Env: `PALAVER_JOIN_MAX_ATTEMPTS`
    /// Default: unlimited
    pub join_max_attempts: Option<u32>,

    /// What to do when a nickname joins twice without parting.
    /// Env: `PALAVER_DEDUPE_JOINS` (true/false)
    /// Default: keep both entries
    pub duplicate_joins: DuplicateJoinPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_uri: DEFAULT_SERVER_URI.to_string(),
            identity: Identity::new("anonymous", ""),
            poll_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            join_max_attempts: None,
            duplicate_joins: DuplicateJoinPolicy::Allow,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(uri) = lookup("PALAVER_SERVER_URI") {
            if !uri.trim().is_empty() {
                config.server_uri = uri.trim().to_string();
            }
        }

        if let Some(nick) = lookup("PALAVER_NICKNAME") {
            if !nick.is_empty() {
                config.identity.nick_name = nick;
            }
        }

        if let Some(email) = lookup("PALAVER_EMAIL") {
            config.identity.email = email;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "PALAVER_POLL_TIMEOUT_SECS") {
            config.poll_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "PALAVER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }

        let base = parse_var::<u64>(&lookup, "PALAVER_RETRY_BASE_MS")
            .unwrap_or(config.retry.base_delay_ms);
        let max = parse_var::<u64>(&lookup, "PALAVER_RETRY_MAX_MS")
            .unwrap_or(config.retry.max_delay_ms);
        config.retry = RetryPolicy::new(base, max);

        if let Some(attempts) = parse_var::<u32>(&lookup, "PALAVER_JOIN_MAX_ATTEMPTS") {
            config.join_max_attempts = (attempts > 0).then_some(attempts);
        }

        if let Some(val) = lookup("PALAVER_DEDUPE_JOINS") {
            config.duplicate_joins = if val == "true" || val == "1" {
                DuplicateJoinPolicy::Ignore
            } else {
                DuplicateJoinPolicy::Allow
            };
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_uri, "http://localhost:8080/");
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.retry, RetryPolicy::new(500, 30_000));
        assert_eq!(config.join_max_attempts, None);
        assert_eq!(config.duplicate_joins, DuplicateJoinPolicy::Allow);
    }

    #[test]
    fn test_reads_identity_and_server() {
        let config = config_from(&[
            ("PALAVER_SERVER_URI", "http://10.0.1.114:8080/"),
            ("PALAVER_NICKNAME", "Alice"),
            ("PALAVER_EMAIL", "alice@example.org"),
        ]);
        assert_eq!(config.server_uri, "http://10.0.1.114:8080/");
        assert_eq!(config.identity, Identity::new("Alice", "alice@example.org"));
    }

    #[test]
    fn test_reads_timing_settings() {
        let config = config_from(&[
            ("PALAVER_POLL_TIMEOUT_SECS", "90"),
            ("PALAVER_RETRY_BASE_MS", "100"),
            ("PALAVER_RETRY_MAX_MS", "2000"),
            ("PALAVER_JOIN_MAX_ATTEMPTS", "5"),
            ("PALAVER_DEDUPE_JOINS", "true"),
        ]);
        assert_eq!(config.poll_timeout, Duration::from_secs(90));
        assert_eq!(config.retry, RetryPolicy::new(100, 2_000));
        assert_eq!(config.join_max_attempts, Some(5));
        assert_eq!(config.duplicate_joins, DuplicateJoinPolicy::Ignore);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PALAVER_POLL_TIMEOUT_SECS", "soon"),
            ("PALAVER_RETRY_BASE_MS", "-1"),
            ("PALAVER_JOIN_MAX_ATTEMPTS", "0"),
            ("PALAVER_NICKNAME", ""),
        ]);
        assert_eq!(config.poll_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.join_max_attempts, None);
        assert_eq!(config.identity.nick_name, "anonymous");
    }
}
