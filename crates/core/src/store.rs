use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::write_jsonl;
use crate::error::{PrepError, Result};
use crate::models::Chunk;

#[async_trait]
pub trait ChunkStore {
    async fn persist(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

pub struct JsonlChunkStore {
    path: PathBuf,
}

impl JsonlChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ChunkStore for JsonlChunkStore {
    async fn persist(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(PrepError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let rows = chunks
            .iter()
            .zip(embeddings.iter())
            .enumerate()
            .map(|(index, (chunk, embedding))| StoredChunk {
                chunk_id: chunk_id_for(index, &chunk.content),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding: embedding.clone(),
            })
            .collect::<Vec<_>>();

        write_jsonl(&self.path, &rows)
    }
}

pub fn chunk_id_for(index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
