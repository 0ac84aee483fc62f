use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::{resolve_api_key, ModelConfig};
use crate::error::{PrepError, Result};

pub const CHAT_API_KEY_ENV: &str = "CHAT_API_KEY";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[async_trait]
pub trait QueryExpander {
    async fn expand(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct ChatClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl ChatClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let api_key = resolve_api_key(&config.api_key, CHAT_API_KEY_ENV)?;

        Ok(Self {
            endpoint: format!(
                "{}{CHAT_COMPLETIONS_PATH}",
                base.as_str().trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
            client: Client::new(),
        })
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PrepError::ServiceResponse {
                service: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        reply_from_payload(&parsed)
    }
}

#[async_trait]
impl QueryExpander for ChatClient {
    async fn expand(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await
    }
}

fn reply_from_payload(payload: &Value) -> Result<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PrepError::ServiceResponse {
            service: "chat".to_string(),
            details: "response has no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{reply_from_payload, ChatClient, CHAT_API_KEY_ENV};
    use crate::config::ModelConfig;
    use crate::error::PrepError;
    use serde_json::json;
    use std::path::PathBuf;

    fn sample_config() -> ModelConfig {
        ModelConfig {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "secret".to_string(),
            model: "qwen2.5".to_string(),
            data_path: PathBuf::from("data"),
            prompts_path: PathBuf::from("prompts/prompts.json"),
            subsets: Vec::new(),
        }
    }

    #[test]
    fn reply_is_read_from_the_first_choice() {
        let payload = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "rewritten query" } }
            ]
        });

        assert_eq!(
            reply_from_payload(&payload).expect("payload has content"),
            "rewritten query"
        );
    }

    #[test]
    fn payload_without_content_is_rejected() {
        let payload = json!({ "choices": [] });
        let err = reply_from_payload(&payload).expect_err("no choices to read");
        assert!(matches!(err, PrepError::ServiceResponse { service, .. } if service == "chat"));
    }

    #[test]
    fn construction_normalizes_the_endpoint() {
        std::env::remove_var(CHAT_API_KEY_ENV);
        let client = ChatClient::new(&sample_config()).expect("config is valid");
        assert_eq!(client.endpoint, "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn malformed_base_url_fails_at_construction() {
        let config = ModelConfig {
            base_url: "not a url".to_string(),
            ..sample_config()
        };
        assert!(matches!(
            ChatClient::new(&config),
            Err(PrepError::Url(_))
        ));
    }
}
