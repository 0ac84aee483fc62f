pub mod chat;
pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod prep;
pub mod rerank;
pub mod segmenter;
pub mod splitter;
pub mod store;

pub use chat::{ChatClient, QueryExpander};
pub use config::{
    load_yaml_config, resolve_api_key, timeout_from_secs, EmbeddingConfig, ModelConfig,
    RerankerConfig,
};
pub use dataset::{copy_corpus, digest_file, discover_subsets, load_prompt, read_jsonl, write_jsonl};
pub use embeddings::EmbeddingClient;
pub use error::{PrepError, SegmentError};
pub use models::{Chunk, DatasetRecord};
pub use prep::{expand_queries, pre_retrieve, PrepReport, SkippedSubset};
pub use rerank::{RerankClient, RerankHit};
pub use segmenter::{
    BlockKind, DroppedBlock, InlineMasker, MarkdownSegmenter, SegmentReport, SegmenterOptions,
};
pub use splitter::{
    CharacterWindowSplitter, RecursiveSplitter, Splitter, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use store::{ChunkStore, JsonlChunkStore, StoredChunk};
