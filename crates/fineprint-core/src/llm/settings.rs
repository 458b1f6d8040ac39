use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

use super::ProviderKind;

/// Resolved configuration for the model backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Optional values read from a configuration file; environment variables
/// take precedence over them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LlmSettingsFile {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl LlmSettings {
    pub const PROVIDER_ENV: &'static str = "FINEPRINT_PROVIDER";
    pub const API_KEY_ENV: &'static str = "FINEPRINT_API_KEY";
    pub const ENDPOINT_ENV: &'static str = "FINEPRINT_ENDPOINT";
    pub const MODEL_ENV: &'static str = "FINEPRINT_MODEL";
    pub const TIMEOUT_ENV: &'static str = "FINEPRINT_TIMEOUT_SECS";

    /// Layered load: `overrides` beat the environment, which beats `file`.
    ///
    /// * `FINEPRINT_PROVIDER`: `gemini` (default), `openai` or `noop`.
    /// * `FINEPRINT_API_KEY`: API key (required unless provider is `noop`).
    /// * `FINEPRINT_ENDPOINT`: optional base URL override.
    /// * `FINEPRINT_MODEL`: optional model identifier.
    /// * `FINEPRINT_TIMEOUT_SECS`: optional HTTP timeout.
    pub fn layered(overrides: LlmSettingsFile, file: LlmSettingsFile) -> Result<Self> {
        Self::resolve(apply_overrides(std::env::vars().collect(), overrides), file)
    }

    fn resolve(vars: HashMap<String, String>, file: LlmSettingsFile) -> Result<Self> {
        let pick = |key: &str, fallback: Option<String>| {
            vars.get(key)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .or(fallback.filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        };

        let provider: ProviderKind = pick(Self::PROVIDER_ENV, file.provider)
            .as_deref()
            .unwrap_or("gemini")
            .parse()?;
        let api_key = match provider {
            ProviderKind::Noop => pick(Self::API_KEY_ENV, file.api_key).unwrap_or_default(),
            _ => pick(Self::API_KEY_ENV, file.api_key).with_context(|| {
                format!(
                    "environment variable {} must be set to call the analysis service",
                    Self::API_KEY_ENV
                )
            })?,
        };
        let endpoint = pick(Self::ENDPOINT_ENV, file.endpoint);
        let model = pick(Self::MODEL_ENV, file.model);
        let timeout_secs = vars
            .get(Self::TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .or(file.timeout_secs);

        Ok(Self {
            provider,
            api_key,
            endpoint,
            model,
            timeout_secs,
        })
    }

    /// Configured model, or the provider's default.
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

fn apply_overrides(
    mut vars: HashMap<String, String>,
    overrides: LlmSettingsFile,
) -> HashMap<String, String> {
    let pairs = [
        (LlmSettings::PROVIDER_ENV, overrides.provider),
        (LlmSettings::API_KEY_ENV, overrides.api_key),
        (LlmSettings::ENDPOINT_ENV, overrides.endpoint),
        (LlmSettings::MODEL_ENV, overrides.model),
        (
            LlmSettings::TIMEOUT_ENV,
            overrides.timeout_secs.map(|secs| secs.to_string()),
        ),
    ];
    for (key, value) in pairs {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            vars.insert(key.to_string(), value);
        }
    }
    vars
}
