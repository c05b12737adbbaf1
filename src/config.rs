//! Configuration types. Everything heuristic (phrase lists, routing
//! keywords) lives here so it can be replaced without touching the engine.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Credentials and model name for one LLM backend.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the local database file.
    pub db_path: String,
    /// Port for the chat HTTP surface.
    pub http_port: u16,
    /// Knowledge/resident backend (Anthropic messages API).
    pub knowledge_model: ModelConfig,
    /// Traveler backend (OpenAI-style chat completions).
    pub traveler_model: ModelConfig,
    /// Google Places / distance API key, optional — external search is
    /// skipped entirely when absent.
    pub places_api_key: Option<SecretString>,
    /// Bound on a single model call; an overrun is upstream_unavailable.
    pub model_timeout: Duration,
    /// Heuristic phrase lists.
    pub keywords: KeywordConfig,
}

impl AppConfig {
    /// Read configuration from the environment. Missing required keys fail
    /// here, before anything is constructed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let knowledge_key = require_env("TRAVEL_ASSIST_KNOWLEDGE_API_KEY")?;
        let traveler_key = require_env("TRAVEL_ASSIST_TRAVELER_API_KEY")?;

        let http_port = match std::env::var("TRAVEL_ASSIST_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRAVEL_ASSIST_PORT".into(),
                message: format!("not a port number: {v}"),
            })?,
            Err(_) => 8080,
        };

        let timeout_secs: u64 = match std::env::var("TRAVEL_ASSIST_MODEL_TIMEOUT_SECS") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRAVEL_ASSIST_MODEL_TIMEOUT_SECS".into(),
                message: format!("not a number of seconds: {v}"),
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            db_path: std::env::var("TRAVEL_ASSIST_DB_PATH")
                .unwrap_or_else(|_| "./data/travel-assist.db".to_string()),
            http_port,
            knowledge_model: ModelConfig {
                api_key: SecretString::from(knowledge_key),
                model: std::env::var("TRAVEL_ASSIST_KNOWLEDGE_MODEL")
                    .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
                base_url: std::env::var("TRAVEL_ASSIST_KNOWLEDGE_BASE_URL").ok(),
            },
            traveler_model: ModelConfig {
                api_key: SecretString::from(traveler_key),
                model: std::env::var("TRAVEL_ASSIST_TRAVELER_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                base_url: std::env::var("TRAVEL_ASSIST_TRAVELER_BASE_URL").ok(),
            },
            places_api_key: std::env::var("TRAVEL_ASSIST_PLACES_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            model_timeout: Duration::from_secs(timeout_secs),
            keywords: KeywordConfig::default(),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Phrase lists driving the dialog analyzer and the model router.
///
/// These are Penghu-specific heuristics, not structure: swap the lists to
/// retarget the assistant at another destination.
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    /// Self-declarations that satisfy the first-turn identity gate.
    pub identity_phrases: Vec<String>,
    /// Triggers for the merchant setup flow (checked before traveler).
    pub merchant_keywords: Vec<String>,
    /// Triggers for the traveler memory flow.
    pub traveler_keywords: Vec<String>,
    /// Triggers for a distance query (independent of the other two).
    pub distance_keywords: Vec<String>,
    /// Routes a message to the resident/knowledge backend.
    pub resident_keywords: Vec<String>,
    /// Routes a message to the traveler backend.
    pub traveler_routing_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            identity_phrases: strings(&[
                "居民",
                "在地人",
                "我住",
                "來過",
                "我去過",
                "想來",
                "我想去",
                "計畫來",
            ]),
            merchant_keywords: strings(&[
                "我是店家",
                "我開店",
                "我的店",
                "上架",
                "商家登錄",
                "老闆想",
            ]),
            traveler_keywords: strings(&[
                "回憶",
                "上次來",
                "之前來",
                "那時候去",
                "旅行的時候",
                "玩過的",
            ]),
            distance_keywords: strings(&["多遠", "距離", "怎麼去", "開車要多久", "到"]),
            resident_keywords: strings(&["在地", "巷仔內", "老店", "傳統", "菜市場", "漁港"]),
            traveler_routing_keywords: strings(&["行程", "景點", "住宿", "機票", "船票", "浮潛"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keywords_nonempty() {
        let kw = KeywordConfig::default();
        assert!(!kw.identity_phrases.is_empty());
        assert!(!kw.merchant_keywords.is_empty());
        assert!(!kw.traveler_keywords.is_empty());
        assert!(!kw.distance_keywords.is_empty());
        assert!(!kw.resident_keywords.is_empty());
        assert!(!kw.traveler_routing_keywords.is_empty());
    }
}
