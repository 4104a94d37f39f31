use anyhow::{anyhow, bail, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0125";

/// What the moderation gate does when the classifier answers without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationFailMode {
    /// Treat a missing verdict as "not flagged".
    Open,
    /// Treat a missing verdict as "flagged".
    Closed,
}

impl FromStr for ModerationFailMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("expected `open` or `closed`, got `{}`", other)),
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub app_secret: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub rate_sweep_threshold: usize,
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
    pub stream_timeout: Duration,
    pub moderation_fail_mode: ModerationFailMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", key))
        };

        let rate_limit: u32 = parse_var(&lookup, "RATE_LIMIT", 60)?;
        if rate_limit == 0 {
            bail!("RATE_LIMIT must be greater than zero");
        }
        let rate_window_secs: u64 = parse_var(&lookup, "RATE_WINDOW_SECS", 60)?;
        if rate_window_secs == 0 {
            bail!("RATE_WINDOW_SECS must be greater than zero");
        }

        let openai_base_url = lookup("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var(&lookup, "PORT", 8080)?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url,
            app_secret: required("APP_SHARED_SECRET")?,
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_var(&lookup, "TEMPERATURE", 0.8)?,
            max_tokens: parse_var(&lookup, "MAX_TOKENS", 180)?,
            rate_limit,
            rate_window: Duration::from_secs(rate_window_secs),
            rate_sweep_threshold: parse_var(&lookup, "RATE_SWEEP_THRESHOLD", 10_000)?,
            max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES", 256 * 1024)?,
            upstream_timeout: Duration::from_secs(parse_var(&lookup, "UPSTREAM_TIMEOUT_SECS", 30)?),
            stream_timeout: Duration::from_secs(parse_var(&lookup, "STREAM_TIMEOUT_SECS", 300)?),
            moderation_fail_mode: parse_var(&lookup, "MODERATION_FAIL_MODE", ModerationFailMode::Open)?,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}
