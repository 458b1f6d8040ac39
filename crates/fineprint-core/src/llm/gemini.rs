use super::{GenerationRequest, LlmSettings, ModelBackend};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: Client,
    base: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("Gemini API key must be provided via FINEPRINT_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
        let mut builder = Client::builder().user_agent("fineprint/0.3");
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base, model)
    }

    /// The key travels in a header so it never shows up in a request URL,
    /// which reqwest embeds in its error messages.
    fn post(&self, model: &str) -> RequestBuilder {
        self.http
            .post(self.url(model))
            .header(API_KEY_HEADER, &self.api_key)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        let payload = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: request.system_instruction.clone(),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: to_gemini_schema(&request.response_schema),
            },
        };

        let response = self
            .post(&request.model)
            .json(&payload)
            .send()
            .await
            .context("failed to call Gemini generateContent API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini API error ({}): {}", status, body);
        }

        let message: GeminiResponse = response
            .json()
            .await
            .context("failed to parse Gemini response")?;
        let text = message
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.map(|c| c.parts).unwrap_or_default())
            .find_map(|part| part.text);
        if text.is_none() {
            warn!("Gemini response carried no text part");
        }
        Ok(text)
    }
}

/// Gemini's OpenAPI subset spells type names in upper case.
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", Value::String(kind)) => Value::String(kind.to_ascii_uppercase()),
                        _ => to_gemini_schema(value),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}
