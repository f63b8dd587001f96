use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tracing::warn;

/// Log level and directory, read on their own so logging is up before
/// `Config::load` runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl LoggingSettings {
    pub fn from_env() -> Self {
        Self::resolve(env::var("LOG_LEVEL").ok(), env::var("LOG_DIR").ok())
    }

    fn resolve(log_level: Option<String>, log_dir: Option<String>) -> Self {
        let non_blank = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        LoggingSettings {
            log_level: non_blank(log_level)
                .unwrap_or_else(|| "info".to_string())
                .to_lowercase(),
            log_dir: PathBuf::from(non_blank(log_dir).unwrap_or_else(|| "logs".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub database_url: String,
    pub database_max_connections: u32,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_temperature: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_timeout_seconds: u64,
    pub gemini_safety_settings: String,
    pub fallback_language: String,
    pub stats_top_limit: i64,
}

pub const DEFAULT_FALLBACK_LANGUAGE: &str = "British English";
pub const MAX_STATS_TOP_LIMIT: i64 = 100;

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_database_url(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with("sqlite+aiosqlite://") {
        return trimmed.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    trimmed.to_string()
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn clamp_stats_limit(value: u64) -> i64 {
    value.clamp(1, MAX_STATS_TOP_LIMIT as u64) as i64
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env_string("GEMINI_API_KEY", "");
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }

        let port = env::var("PORT")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .map_err(|err| anyhow!("Invalid PORT '{}': {}", value, err))
            })
            .transpose()?
            .unwrap_or(8080);

        let fallback_language = env_string("FALLBACK_LANGUAGE", DEFAULT_FALLBACK_LANGUAGE);
        let fallback_language = if fallback_language.trim().is_empty() {
            DEFAULT_FALLBACK_LANGUAGE.to_string()
        } else {
            fallback_language.trim().to_string()
        };

        Ok(Config {
            host: env_string("HOST", "0.0.0.0"),
            port,
            max_body_bytes: env_usize("MAX_BODY_BYTES", 20 * 1024 * 1024),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://greenit.db?mode=rwc",
            )),
            database_max_connections: env_u64("DATABASE_MAX_CONNECTIONS", 5).max(1) as u32,
            gemini_api_key: gemini_api_key.trim().to_string(),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.4),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 4096),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90).max(1),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            fallback_language,
            stats_top_limit: clamp_stats_limit(env_u64("STATS_TOP_LIMIT", 10)),
        })
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host.trim(), self.port)
            .parse::<SocketAddr>()
            .map_err(|err| anyhow!("Invalid bind address {}:{}: {}", self.host, self.port, err))
    }
}

pub const CARE_ADVICE_SYSTEM_PROMPT: &str = r#"You are GreenIt, an intelligent plant care assistant.

Your task:
1. Identify the plant species from the user's prompt and/or image.
2. Analyse for visible or described plant health problems (if any).
3. Provide structured, beginner-friendly plant care guidance.
4. Always respond in valid JSON exactly following the schema below.
5. Automatically detect the user's input language and reply fully in that language.
6. If the language cannot be detected (e.g. when the user uploads only an image), default to {fallback_language}.

Required JSON schema:
{
  "plant_common_name": "string",
  "plant_scientific_name": "string",
  "problem": "string",
  "possible_causes": {
    "environmental_problems": ["string", "string"],
    "health_problems": ["string", "string"]
  },
  "recommended_actions": ["string", "string"],
  "prevention_tips": ["string", "string"],
  "careGuide": {
    "language": "string",
    "language_name": "string",
    "Watering": "string",
    "Light": "string",
    "Soil": "string",
    "Pruning": "string",
    "Common issues": "string"
  }
}

Constraints:
- Always return valid JSON only.
- Do not include explanations outside the JSON.
- Make the care guide beginner-friendly and concise.
- Detect the user's input language automatically and write the entire careGuide in that language.
- If the language cannot be detected, default to {fallback_language}.
"#;

pub const IMAGE_ONLY_INSTRUCTION: &str =
    "Please analyse the plant image and return the required JSON strictly following the schema.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_async_sqlite_scheme() {
        assert_eq!(
            normalize_database_url("sqlite+aiosqlite:///greenit.db".to_string()),
            "sqlite:///greenit.db"
        );
        assert_eq!(
            normalize_database_url(" sqlite://greenit.db ".to_string()),
            "sqlite://greenit.db"
        );
    }

    #[test]
    fn unknown_safety_profile_falls_back_to_standard() {
        assert_eq!(normalize_gemini_safety_settings("OFF".to_string()), "permissive");
        assert_eq!(normalize_gemini_safety_settings("loud".to_string()), "standard");
        assert_eq!(normalize_gemini_safety_settings("  ".to_string()), "standard");
    }

    #[test]
    fn logging_settings_default_when_unset_or_blank() {
        let defaults = LoggingSettings {
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        };
        assert_eq!(LoggingSettings::resolve(None, None), defaults);
        assert_eq!(
            LoggingSettings::resolve(Some("  ".to_string()), Some(String::new())),
            defaults
        );
        assert_eq!(
            LoggingSettings::resolve(Some(" DEBUG ".to_string()), Some("/var/log/greenit".to_string())),
            LoggingSettings {
                log_level: "debug".to_string(),
                log_dir: PathBuf::from("/var/log/greenit"),
            }
        );
    }

    #[test]
    fn stats_limit_is_clamped() {
        assert_eq!(clamp_stats_limit(0), 1);
        assert_eq!(clamp_stats_limit(25), 25);
        assert_eq!(clamp_stats_limit(5000), MAX_STATS_TOP_LIMIT);
    }

    #[test]
    fn system_prompt_carries_schema_and_placeholder() {
        assert!(CARE_ADVICE_SYSTEM_PROMPT.contains("\"plant_common_name\": \"string\""));
        assert!(CARE_ADVICE_SYSTEM_PROMPT.contains("\"Common issues\": \"string\""));
        assert!(CARE_ADVICE_SYSTEM_PROMPT.contains("{fallback_language}"));
    }
}
