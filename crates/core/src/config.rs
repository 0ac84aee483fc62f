use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PrepError, Result};

pub const MODEL_CONFIG_FILE: &str = "model.yaml";
pub const EMBEDDING_CONFIG_FILE: &str = "embedding.yaml";
pub const RERANKER_CONFIG_FILE: &str = "reranker.yaml";

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/bge-large-zh-v1.5";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;
pub const DEFAULT_RERANK_MODEL: &str = "models/bge-reranker-large";
pub const DEFAULT_RERANK_TOP_N: usize = 1;
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub data_path: PathBuf,
    pub prompts_path: PathBuf,
    #[serde(default)]
    pub subsets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankerConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

fn default_rerank_model() -> String {
    DEFAULT_RERANK_MODEL.to_string()
}

fn default_rerank_top_n() -> usize {
    DEFAULT_RERANK_TOP_N
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

impl ModelConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        load_yaml_config(&config_dir.join(MODEL_CONFIG_FILE))
    }
}

impl EmbeddingConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        load_yaml_config(&config_dir.join(EMBEDDING_CONFIG_FILE))
    }
}

impl RerankerConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        load_yaml_config(&config_dir.join(RERANKER_CONFIG_FILE))
    }
}

pub fn load_yaml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(PrepError::ConfigNotFound(path.display().to_string()));
    }

    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|source| PrepError::YamlParse {
        path: path.display().to_string(),
        source,
    })
}

pub fn resolve_api_key(configured: &str, env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ if !configured.trim().is_empty() => Ok(configured.to_string()),
        _ => Err(PrepError::MissingApiKey(env_var.to_string())),
    }
}

pub fn timeout_from_secs(timeout_secs: f64) -> Result<Duration> {
    if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
        return Err(PrepError::InvalidArgument(format!(
            "timeout_secs must be a positive number of seconds, got {timeout_secs}"
        )));
    }

    Duration::try_from_secs_f64(timeout_secs).map_err(|_| {
        PrepError::InvalidArgument(format!("timeout_secs {timeout_secs} is out of range"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_config_fills_service_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            dir.path().join(EMBEDDING_CONFIG_FILE),
            "url: http://localhost:9997/v1\napi_key: k\n",
        )
        .expect("write config");

        let config = EmbeddingConfig::load(dir.path()).expect("load config");
        assert_eq!(config.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.dimensions, DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn model_config_reads_dataset_layout() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            dir.path().join(MODEL_CONFIG_FILE),
            concat!(
                "base_url: http://localhost:8000/v1\n",
                "api_key: k\n",
                "model: qwen2.5\n",
                "data_path: data/datasets\n",
                "prompts_path: prompts/prompts.json\n",
                "subsets:\n  - finance\n  - law\n",
            ),
        )
        .expect("write config");

        let config = ModelConfig::load(dir.path()).expect("load config");
        assert_eq!(config.data_path, PathBuf::from("data/datasets"));
        assert_eq!(config.subsets, vec!["finance", "law"]);
    }

    #[test]
    fn missing_config_file_is_reported_by_path() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = RerankerConfig::load(dir.path()).expect_err("no reranker.yaml");
        assert!(matches!(err, PrepError::ConfigNotFound(path) if path.contains("reranker.yaml")));
    }

    #[test]
    fn malformed_yaml_names_the_offending_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(dir.path().join(MODEL_CONFIG_FILE), "base_url: [unclosed\n")
            .expect("write config");

        let err = ModelConfig::load(dir.path()).expect_err("yaml is malformed");
        assert!(matches!(err, PrepError::YamlParse { path, .. } if path.contains("model.yaml")));
    }

    #[test]
    fn environment_overrides_configured_api_key() {
        std::env::set_var("CORPUS_PREP_TEST_KEY_A", "from-env");
        let key = resolve_api_key("from-file", "CORPUS_PREP_TEST_KEY_A").expect("resolve key");
        assert_eq!(key, "from-env");
        std::env::remove_var("CORPUS_PREP_TEST_KEY_A");
    }

    #[test]
    fn configured_api_key_is_the_fallback() {
        let key = resolve_api_key("from-file", "CORPUS_PREP_TEST_KEY_B").expect("resolve key");
        assert_eq!(key, "from-file");
    }

    #[test]
    fn blank_api_key_everywhere_is_an_error() {
        let err = resolve_api_key("  ", "CORPUS_PREP_TEST_KEY_C").expect_err("no key anywhere");
        assert!(matches!(err, PrepError::MissingApiKey(var) if var == "CORPUS_PREP_TEST_KEY_C"));
    }

    #[test]
    fn timeouts_must_be_positive_and_finite() {
        assert_eq!(
            timeout_from_secs(10.0).expect("valid timeout"),
            Duration::from_secs(10)
        );

        for bad in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                timeout_from_secs(bad),
                Err(PrepError::InvalidArgument(_))
            ));
        }
    }
}
