// Shared runtime configuration, read from the environment

use std::env;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub redis_url: String,
    pub result_ttl_seconds: u64,
    /// BLPOP timeout; bounds how long shutdown waits on an idle worker
    pub poll_timeout_seconds: f64,
    pub api_addr: String,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            result_ttl_seconds: 86400,
            poll_timeout_seconds: 5.0,
            api_addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

impl ArenaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            result_ttl_seconds: lookup("ARENA_RESULT_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.result_ttl_seconds),
            poll_timeout_seconds: lookup("ARENA_POLL_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_timeout_seconds),
            api_addr: lookup("ARENA_API_ADDR").unwrap_or(defaults.api_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = ArenaConfig::from_lookup(|_| None);
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.result_ttl_seconds, 86400);
        assert_eq!(config.api_addr, DEFAULT_API_ADDR);
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let vars: HashMap<&str, &str> = [
            ("REDIS_URL", "redis://cache:6379"),
            ("ARENA_RESULT_TTL_SECONDS", "60"),
            ("ARENA_POLL_TIMEOUT_SECONDS", "soon"),
        ]
        .into_iter()
        .collect();

        let config = ArenaConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.result_ttl_seconds, 60);
        assert_eq!(config.poll_timeout_seconds, 5.0);
    }
}
