use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::config::{resolve_api_key, timeout_from_secs, RerankerConfig};
use crate::error::{PrepError, Result};

pub const RERANKER_API_KEY_ENV: &str = "RERANKER_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub score: f64,
    pub document: Option<String>,
}

pub struct RerankClient {
    endpoint: String,
    api_key: String,
    model: String,
    top_n: usize,
    client: Client,
}

impl RerankClient {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.url)?;
        let api_key = resolve_api_key(&config.api_key, RERANKER_API_KEY_ENV)?;
        let client = Client::builder()
            .timeout(timeout_from_secs(config.timeout_secs)?)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            model: config.model.clone(),
            top_n: config.top_n,
            client,
        })
    }

    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankHit>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "documents": documents,
                "return_documents": true,
                "raw_scores": true,
                "model": self.model,
                "top_n": self.top_n,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PrepError::ServiceResponse {
                service: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(hits_from_payload(&parsed))
    }
}

fn hits_from_payload(payload: &Value) -> Vec<RerankHit> {
    let results = payload
        .pointer("/results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hits = Vec::new();
    for result in results {
        let index = result
            .pointer("/index")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize;
        let score = result
            .pointer("/relevance_score")
            .or_else(|| result.pointer("/score"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let document = result
            .pointer("/document/text")
            .or_else(|| result.pointer("/document"))
            .and_then(Value::as_str)
            .map(str::to_string);

        hits.push(RerankHit {
            index,
            score,
            document,
        });
    }

    hits
}
