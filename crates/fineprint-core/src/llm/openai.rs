use super::{GenerationRequest, LlmSettings, ModelBackend};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: Client,
    url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("OpenAI API key must be provided via FINEPRINT_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        let mut builder = Client::builder().user_agent("fineprint/0.3");
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        let payload = ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_instruction.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            temperature: 0.2,
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "tos_analysis",
                    "strict": false,
                    "schema": request.response_schema,
                }
            }),
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call OpenAI chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API error ({}): {}", status, body);
        }

        let chat: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse OpenAI response")?;
        Ok(chat
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use httpmock::prelude::*;

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn sends_schema_and_reads_message_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("\"json_schema\"");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "{}" } }]
            }));
        });

        let settings = LlmSettings {
            provider: ProviderKind::OpenAi,
            api_key: "test-key".into(),
            endpoint: Some(server.base_url()),
            model: None,
            timeout_secs: Some(5),
        };
        let backend = OpenAiBackend::new(&settings).unwrap();
        let request = GenerationRequest {
            model: "gpt-test".into(),
            system_instruction: "sys".into(),
            prompt: "prompt".into(),
            response_schema: json!({"type": "object"}),
        };
        let text = backend.generate(&request).await.unwrap();
        assert_eq!(text.as_deref(), Some("{}"));
        mock.assert();
    }
}
