use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{resolve_api_key, timeout_from_secs, EmbeddingConfig};
use crate::error::{PrepError, Result};

pub const EMBEDDING_API_KEY_ENV: &str = "EMBEDDING_API_KEY";

const EMBEDDINGS_PATH: &str = "/embeddings";

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
    dimensions: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

pub struct EmbeddingClient {
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = Url::parse(&config.url)?;
        let api_key = resolve_api_key(&config.api_key, EMBEDDING_API_KEY_ENV)?;
        let client = Client::builder()
            .timeout(timeout_from_secs(config.timeout_secs)?)
            .build()?;

        Ok(Self {
            endpoint: format!("{}{EMBEDDINGS_PATH}", base.as_str().trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            client,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            dimensions: self.dimensions,
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
                service: "embedding".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        vectors_from_response(parsed, texts.len())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| PrepError::ServiceResponse {
            service: "embedding".to_string(),
            details: "response contained no embedding".to_string(),
        })
    }
}

fn vectors_from_response(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut rows = response.data;

    if rows.len() != expected {
        return Err(PrepError::ServiceResponse {
            service: "embedding".to_string(),
            details: format!("expected {expected} embeddings, got {}", rows.len()),
        });
    }

    rows.sort_unstable_by_key(|row| row.index);
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::{
        vectors_from_response, EmbeddingClient, EmbeddingResponse, EmbeddingRow,
        EMBEDDING_API_KEY_ENV,
    };
    use crate::config::{EmbeddingConfig, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL};
    use crate::error::PrepError;

    fn sample_config() -> EmbeddingConfig {
        EmbeddingConfig {
            url: "http://localhost:9997/v1".to_string(),
            api_key: "secret".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout_secs: 10.0,
        }
    }

    #[test]
    fn vectors_are_reordered_by_request_index() {
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingRow {
                    index: 1,
                    embedding: vec![1.0],
                },
                EmbeddingRow {
                    index: 0,
                    embedding: vec![0.0],
                },
            ],
        };

        let vectors = vectors_from_response(response, 2).expect("counts match");
        assert_eq!(vectors, vec![vec![0.0], vec![1.0]]);
    }

    #[test]
    fn short_responses_are_rejected() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingRow {
                index: 0,
                embedding: vec![0.5],
            }],
        };

        let err = vectors_from_response(response, 3).expect_err("one of three came back");
        assert!(
            matches!(err, PrepError::ServiceResponse { service, .. } if service == "embedding")
        );
    }

    #[test]
    fn construction_normalizes_the_endpoint() {
        std::env::remove_var(EMBEDDING_API_KEY_ENV);
        let client = EmbeddingClient::new(&sample_config()).expect("config is valid");
        assert_eq!(client.endpoint, "http://localhost:9997/v1/embeddings");
        assert_eq!(client.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn malformed_url_fails_at_construction() {
        let config = EmbeddingConfig {
            url: "::nope::".to_string(),
            ..sample_config()
        };
        assert!(matches!(
            EmbeddingClient::new(&config),
            Err(PrepError::Url(_))
        ));
    }

    #[test]
    fn negative_timeout_fails_at_construction() {
        let config = EmbeddingConfig {
            timeout_secs: -1.0,
            ..sample_config()
        };
        assert!(matches!(
            EmbeddingClient::new(&config),
            Err(PrepError::InvalidArgument(_))
        ));
    }
}
