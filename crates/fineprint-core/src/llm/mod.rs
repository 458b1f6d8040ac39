mod gemini;
mod openai;
mod settings;

use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use settings::{LlmSettings, LlmSettingsFile};

/// Everything a text-generation service needs for one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: String,
    pub prompt: String,
    /// JSON Schema the reply must conform to.
    pub response_schema: Value,
}

/// Capability for invoking a hosted model once.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Return the reply text, or `None` when the service produced no payload.
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>>;
}

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Noop,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenAi => "gpt-4o-mini",
            Self::Noop => "noop",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "noop" => Ok(Self::Noop),
            other => bail!("unsupported provider `{other}` (expected gemini, openai or noop)"),
        }
    }
}

/// Construct the backend selected by `settings`.
pub fn build_backend(settings: &LlmSettings) -> Result<Box<dyn ModelBackend>> {
    match settings.provider {
        ProviderKind::Gemini => Ok(Box::new(GeminiBackend::new(settings)?)),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiBackend::new(settings)?)),
        ProviderKind::Noop => Ok(Box::new(NoopBackend)),
    }
}

/// Offline backend that never contacts a service. Useful for wiring checks.
#[derive(Debug, Default, Clone)]
pub struct NoopBackend;

const NOOP_REPLY: &str = r#"{"score":50,"verdict":"ACCEPTABLE","recommendation":"No model consulted","summary":"The noop provider is configured, so no clauses were evaluated. Configure a real provider for an actual analysis.","items":[]}"#;

#[async_trait]
impl ModelBackend for NoopBackend {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Option<String>> {
        Ok(Some(NOOP_REPLY.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" OPENAI ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("noop".parse::<ProviderKind>().unwrap(), ProviderKind::Noop);
        let err = "anthropic".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[tokio::test]
    async fn noop_reply_is_schema_conformant() {
        let request = GenerationRequest {
            model: "noop".into(),
            system_instruction: String::new(),
            prompt: String::new(),
            response_schema: Value::Null,
        };
        let reply = NoopBackend.generate(&request).await.unwrap().unwrap();
        let result = crate::analyzer::parse_payload(&reply, 0).unwrap();
        assert!(result.items.is_empty());
    }
}
