use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:7b";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_TZ_OFFSET: &str = "+05:30";
const DEFAULT_TZ_NAME: &str = "Asia/Kolkata";

/// Which language model service answers oracle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleBackend {
    OpenAi,
    Ollama,
}

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub oracle_backend: OracleBackend,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub ollama_url: String,
    pub oracle_timeout_ms: u64,
    /// Offset every resolved date-time is expressed in.
    pub tz_offset: FixedOffset,
    /// IANA zone name attached to calendar event times.
    pub tz_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            oracle_backend: OracleBackend::OpenAi,
            openai_api_key: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            oracle_timeout_ms: 15000,
            tz_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or(Utc.fix()),
            tz_name: DEFAULT_TZ_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind) = lookup("PROMPTDESK_BIND") {
            config.bind_addr = bind;
        }

        config.oracle_backend = match lookup("PROMPTDESK_ORACLE").as_deref() {
            None | Some("openai") => OracleBackend::OpenAi,
            Some("ollama") => OracleBackend::Ollama,
            Some(other) => return Err(anyhow!("unknown oracle backend: {}", other)),
        };

        config.openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());

        config.model = match (lookup("PROMPTDESK_MODEL"), config.oracle_backend) {
            (Some(model), _) => model,
            (None, OracleBackend::OpenAi) => DEFAULT_OPENAI_MODEL.to_string(),
            (None, OracleBackend::Ollama) => DEFAULT_OLLAMA_MODEL.to_string(),
        };

        if let Some(url) = lookup("OLLAMA_URL") {
            config.ollama_url = url.trim_end_matches('/').to_string();
        }

        if let Some(ms) = lookup("PROMPTDESK_ORACLE_TIMEOUT_MS") {
            config.oracle_timeout_ms = ms
                .parse()
                .with_context(|| format!("invalid PROMPTDESK_ORACLE_TIMEOUT_MS: {}", ms))?;
        }

        let offset = lookup("PROMPTDESK_TZ_OFFSET").unwrap_or_else(|| DEFAULT_TZ_OFFSET.to_string());
        config.tz_offset = parse_offset(&offset)
            .ok_or_else(|| anyhow!("invalid PROMPTDESK_TZ_OFFSET: {}", offset))?;

        if let Some(name) = lookup("PROMPTDESK_TZ_NAME") {
            config.tz_name = name;
        }

        Ok(config)
    }
}

/// Parse "+05:30", "-04:00" or "Z".
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.chars().next()? {
        '+' => (1, &value[1..]),
        '-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.oracle_backend, OracleBackend::OpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.tz_offset.local_minus_utc(), 19800);
    }

    #[test]
    fn ollama_backend_switches_default_model() {
        let config = Config::from_lookup(lookup_from(&[
            ("PROMPTDESK_ORACLE", "ollama"),
            ("OLLAMA_URL", "http://gpu-box:11434/"),
        ]))
        .unwrap();
        assert_eq!(config.oracle_backend, OracleBackend::Ollama);
        assert_eq!(config.model, "qwen2.5:7b");
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
    }

    #[test]
    fn rejects_unknown_backend_and_bad_offset() {
        assert!(Config::from_lookup(lookup_from(&[("PROMPTDESK_ORACLE", "bard")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PROMPTDESK_TZ_OFFSET", "IST")])).is_err());
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("-04:00").unwrap().local_minus_utc(), -4 * 3600);
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("+25:00").is_none());
    }
}
