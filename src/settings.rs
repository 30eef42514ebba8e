use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const MAX_ITERATIONS_LIMIT: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// Settings supplied when a conversation is started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GlobalConfigDefaults {
    pub default_model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub max_iterations: Option<u32>,
}

/// Per-message overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSettings {
    pub model: String,
    pub model_params: ModelParams,
    pub max_iterations: u32,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        resolve_effective_settings(&GlobalConfigDefaults::default(), &SessionSettings::default(), &RequestOverrides::default())
    }
}

pub fn resolve_effective_settings(
    global: &GlobalConfigDefaults,
    session: &SessionSettings,
    request: &RequestOverrides,
) -> EffectiveSettings {
    let model = request
        .model
        .clone()
        .or_else(|| session.default_model.clone())
        .or_else(|| global.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let model_params = ModelParams {
        temperature: request
            .model_params
            .as_ref()
            .and_then(|p| p.temperature)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.temperature))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.temperature)),
        max_tokens: request
            .model_params
            .as_ref()
            .and_then(|p| p.max_tokens)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.max_tokens))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.max_tokens)),
        top_p: request
            .model_params
            .as_ref()
            .and_then(|p| p.top_p)
            .or_else(|| session.model_params.as_ref().and_then(|p| p.top_p))
            .or_else(|| global.model_params.as_ref().and_then(|p| p.top_p)),
    };

    let max_iterations = request
        .max_iterations
        .or(session.max_iterations)
        .or(global.max_iterations)
        .unwrap_or(DEFAULT_MAX_ITERATIONS)
        .clamp(1, MAX_ITERATIONS_LIMIT);

    EffectiveSettings { model, model_params, max_iterations }
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub listen: String,
    pub graph_api_base: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_iterations: u32,
    pub session_max_age_hours: i64,
    pub sweep_interval_secs: u64,
    pub summary_cache_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v.trim().parse().with_context(|| format!("invalid {key}: {v}")),
                None => Ok(default),
            }
        }
        let text = |key: &str, default: &str| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string());

        Ok(Self {
            listen: text("ASSISTANT_LISTEN", "127.0.0.1:3001"),
            graph_api_base: text("GRAPH_API_BASE", "http://127.0.0.1:8000"),
            openai_base_url: text("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()),
            model: text("ASSISTANT_MODEL", DEFAULT_MODEL),
            temperature: parsed(&lookup, "ASSISTANT_TEMPERATURE", 0.7)?,
            max_iterations: parsed(&lookup, "MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?,
            session_max_age_hours: parsed(&lookup, "SESSION_MAX_AGE_HOURS", 24)?,
            sweep_interval_secs: parsed(&lookup, "SESSION_SWEEP_INTERVAL_SECS", 3600)?,
            summary_cache_ttl_secs: parsed(&lookup, "SUMMARY_CACHE_TTL_SECS", 300)?,
        })
    }

    pub fn defaults(&self) -> GlobalConfigDefaults {
        GlobalConfigDefaults {
            default_model: Some(self.model.clone()),
            model_params: Some(ModelParams { temperature: Some(self.temperature), ..ModelParams::default() }),
            max_iterations: Some(self.max_iterations),
        }
    }
}
