//! Environment configuration
//!
//! Read once at startup (after `dotenv`). Malformed values are reported,
//! never swapped for defaults.

use std::time::Duration;

use crate::assistant::AssistantConfig;
use crate::error::FinanceError;
use crate::llm::gemini::DEFAULT_MODEL;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Option<String>,
    pub database_url: Option<String>,
    /// JSON seed of transactions per user, used when no database is configured
    pub transactions_file: Option<String>,
    pub message_ttl: Option<Duration>,
    pub llm_timeout: Duration,
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| FinanceError::ConfigError(format!("invalid PORT: {}", raw)))?,
            None => 8080,
        };

        let message_ttl = get("AI_TTL").map(|raw| parse_duration(&raw)).transpose()?;

        let llm_timeout = match get("LLM_TIMEOUT") {
            Some(raw) => parse_duration(&raw)?,
            None => Duration::from_secs(30),
        };
        if llm_timeout.is_zero() {
            return Err(FinanceError::ConfigError("LLM_TIMEOUT must be positive".to_string()));
        }

        let history_limit = match get("AI_HISTORY_LIMIT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| FinanceError::ConfigError(format!("invalid AI_HISTORY_LIMIT: {}", raw)))?,
            None => 8,
        };

        Ok(Self {
            port,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL"),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            transactions_file: get("TRANSACTIONS_FILE"),
            message_ttl,
            llm_timeout,
            history_limit,
        })
    }

    pub fn assistant(&self) -> AssistantConfig {
        AssistantConfig {
            history_limit: self.history_limit,
            message_ttl: self.message_ttl,
            llm_timeout: self.llm_timeout,
            ..Default::default()
        }
    }
}

/// Parse `90s`, `30m`, `24h`, `7d`. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || FinanceError::ConfigError(format!("invalid duration: {:?}", raw));

    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let seconds_per_unit = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.database_url, None);
        assert_eq!(config.transactions_file, None);
        assert_eq!(config.message_ttl, None);
        assert_eq!(config.llm_timeout, Duration::from_secs(30));
        assert_eq!(config.history_limit, 8);
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let config = config(&[
            ("API_PORT", "9090"),
            ("POSTGRES_URL", "postgres://localhost/ai"),
            ("AI_TTL", "24h"),
            ("LLM_TIMEOUT", "45s"),
            ("AI_HISTORY_LIMIT", "12"),
            ("GEMINI_API_KEY", "secret"),
            ("TRANSACTIONS_FILE", "seed/transactions.json"),
        ])
        .unwrap();
        assert_eq!(config.transactions_file.as_deref(), Some("seed/transactions.json"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ai"));
        assert_eq!(config.message_ttl, Some(Duration::from_secs(86_400)));
        assert_eq!(config.llm_timeout, Duration::from_secs(45));
        assert_eq!(config.history_limit, 12);

        let assistant = config.assistant();
        assert_eq!(assistant.history_limit, 12);
        assert_eq!(assistant.message_ttl, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_port_takes_precedence() {
        let config = config(&[("PORT", "3000"), ("API_PORT", "9090")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_blank_ttl_means_no_expiry() {
        assert_eq!(config(&[("AI_TTL", "  ")]).unwrap().message_ttl, None);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(matches!(config(&[("PORT", "http")]), Err(FinanceError::ConfigError(_))));
        assert!(matches!(config(&[("AI_TTL", "soon")]), Err(FinanceError::ConfigError(_))));
        assert!(matches!(config(&[("LLM_TIMEOUT", "0s")]), Err(FinanceError::ConfigError(_))));
        assert!(matches!(
            config(&[("AI_HISTORY_LIMIT", "-1")]),
            Err(FinanceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("h").is_err());
    }
}
