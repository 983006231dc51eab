//! Process settings read from the environment (after `dotenvy::dotenv()` in the binary).

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid {
                key: "APP_ENV",
                value: s.to_string(),
            }),
        }
    }
}

/// Fixed-window limit: `max_requests` per `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct ChatSettings {
    /// Requests to the chat endpoint fail with 500 while this is unset.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub practice_name: String,
    pub practice_phone: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub environment: Environment,
    pub session_ttl: Duration,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    pub api_rate_limit: RateLimitSettings,
    pub chat_rate_limit: RateLimitSettings,
    pub chat: ChatSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let environment = match get("APP_ENV") {
            Some(v) => v.parse()?,
            None => Environment::Production,
        };
        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/dental".into()),
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            environment,
            session_ttl: Duration::from_secs(parse_or(&get, "SESSION_TTL_SECS", 86_400)?),
            cors_allowed_origins,
            api_rate_limit: RateLimitSettings {
                max_requests: parse_or(&get, "API_RATE_LIMIT_MAX", 100)?,
                window: Duration::from_secs(parse_or(&get, "API_RATE_LIMIT_WINDOW_SECS", 60)?),
            },
            chat_rate_limit: RateLimitSettings {
                max_requests: parse_or(&get, "CHAT_RATE_LIMIT_MAX", 10)?,
                window: Duration::from_secs(parse_or(&get, "CHAT_RATE_LIMIT_WINDOW_SECS", 60)?),
            },
            chat: ChatSettings {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".into()),
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".into()),
                practice_name: get("PRACTICE_NAME").unwrap_or_else(|| "Hardik Dental Practice".into()),
                practice_phone: get("PRACTICE_PHONE").unwrap_or_else(|| "(808) 095-0921".into()),
                timeout: Duration::from_secs(parse_or(&get, "GEMINI_TIMEOUT_SECS", 30)?),
            },
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.environment, Environment::Production);
        assert_eq!(s.session_ttl, Duration::from_secs(86_400));
        assert_eq!(s.chat_rate_limit.max_requests, 10);
        assert_eq!(s.api_rate_limit.window, Duration::from_secs(60));
        assert!(s.cors_allowed_origins.is_empty());
        assert!(s.chat.api_key.is_none());
    }

    #[test]
    fn reads_overrides() {
        let s = settings(&[
            ("APP_ENV", "development"),
            ("SESSION_TTL_SECS", "60"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:8080, http://localhost:5173"),
            ("GEMINI_API_KEY", "k"),
        ])
        .unwrap();
        assert!(s.is_development());
        assert_eq!(s.session_ttl, Duration::from_secs(60));
        assert_eq!(s.cors_allowed_origins, vec!["http://localhost:8080", "http://localhost:5173"]);
        assert_eq!(s.chat.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = settings(&[("CHAT_RATE_LIMIT_MAX", "ten")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CHAT_RATE_LIMIT_MAX", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = settings(&[("BIND_ADDR", "  ")]).unwrap();
        assert_eq!(s.bind_addr, "0.0.0.0:8000");
    }
}
