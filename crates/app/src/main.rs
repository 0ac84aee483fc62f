use clap::{Parser, Subcommand};
use chrono::Utc;
use corpus_prep_core::{
    pre_retrieve, read_jsonl, ChatClient, ChunkStore, DatasetRecord, EmbeddingClient,
    EmbeddingConfig, InlineMasker, JsonlChunkStore, MarkdownSegmenter, ModelConfig, RerankClient,
    RerankerConfig, SegmenterOptions, Splitter,
};
use corpus_prep_core::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter, prelude::*};

#[derive(Parser)]
#[command(name = "corpus-prep", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding model.yaml, embedding.yaml, and reranker.yaml.
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Expand dataset queries through the chat model and stage corpus copies.
    Prepare,
    /// Split a Markdown file into structure-aware chunks.
    Segment {
        /// Markdown file to segment.
        #[arg(long)]
        file: PathBuf,
        /// Splitting strategy: markdown-header, recursive, or character-window.
        #[arg(long, default_value = "markdown-header")]
        strategy: String,
        /// Target chunk size in characters (non-markdown strategies).
        #[arg(long, default_value = "512")]
        chunk_size: usize,
        /// Overlap between adjacent chunks in characters.
        #[arg(long, default_value = "51")]
        chunk_overlap: usize,
        /// Keep heading lines inside the emitted chunk text.
        #[arg(long, default_value_t = false)]
        keep_headers: bool,
        /// Replace inline math and code spans in prose chunks with placeholders.
        #[arg(long, default_value_t = false)]
        mask_inline: bool,
        /// Print chunks as JSON lines instead of a text listing.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Segment a Markdown file, embed every chunk, and store the vectors.
    Embed {
        /// Markdown file to embed.
        #[arg(long)]
        file: PathBuf,
        /// Output JSONL file for the embedded chunks.
        #[arg(long, default_value = "embedded_chunks.jsonl")]
        output: PathBuf,
        /// Splitting strategy: markdown-header, recursive, or character-window.
        #[arg(long, default_value = "markdown-header")]
        strategy: String,
    },
    /// Rerank candidate documents from a JSONL file against a query.
    Rerank {
        /// Query to score the candidates against.
        #[arg(long)]
        query: String,
        /// JSONL file of candidate records.
        #[arg(long)]
        file: PathBuf,
        /// Number of top hits to request.
        #[arg(long, default_value = "5")]
        top_n: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "corpus-prep boot"
    );

    match cli.command {
        Command::Prepare => {
            let config = ModelConfig::load(&cli.config_dir)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let chat =
                ChatClient::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let report = pre_retrieve(&chat, &config)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if !report.skipped.is_empty() {
                warn!(count = report.skipped.len(), "subsets were skipped");
                for skipped in &report.skipped {
                    warn!(subset = %skipped.subset, reason = %skipped.reason, "skipped subset");
                }
            }

            println!(
                "{} subset(s) prepared at {}",
                report.prepared.len(),
                report.finished_at.to_rfc3339()
            );
        }
        Command::Segment {
            file,
            strategy,
            chunk_size,
            chunk_overlap,
            keep_headers,
            mask_inline,
            json,
        } => {
            let text = tokio::fs::read_to_string(&file).await?;

            let (mut chunks, dropped_count) = if strategy == "markdown-header" {
                let options = SegmenterOptions {
                    strip_headers: !keep_headers,
                    ..SegmenterOptions::default()
                };
                let segmenter = MarkdownSegmenter::new(options)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                let report = segmenter.segment_report(&text);
                (report.chunks, report.dropped_blocks.len())
            } else {
                let splitter = Splitter::for_name(&strategy, chunk_size, chunk_overlap)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                (splitter.split(&text), 0)
            };

            if mask_inline {
                let masker =
                    InlineMasker::new().map_err(|error| anyhow::anyhow!(error.to_string()))?;
                masker.mask_chunks(&mut chunks);
            }

            if dropped_count > 0 {
                warn!(
                    count = dropped_count,
                    file = %file.display(),
                    "unterminated blocks were dropped"
                );
            }

            if json {
                for chunk in &chunks {
                    println!("{}", serde_json::to_string(chunk)?);
                }
            } else {
                for (index, chunk) in chunks.iter().enumerate() {
                    println!("--- chunk {index} ---");
                    if !chunk.metadata.is_empty() {
                        let labels = chunk
                            .metadata
                            .iter()
                            .map(|(key, value)| format!("{key}={value}"))
                            .collect::<Vec<_>>()
                            .join(" ");
                        println!("[{labels}]");
                    }
                    print!("{}", chunk.content);
                    if !chunk.content.ends_with('\n') {
                        println!();
                    }
                }
                println!("{} chunks from {}", chunks.len(), file.display());
            }
        }
        Command::Embed {
            file,
            output,
            strategy,
        } => {
            let config = EmbeddingConfig::load(&cli.config_dir)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let client = EmbeddingClient::new(&config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let text = tokio::fs::read_to_string(&file).await?;
            let splitter = Splitter::for_name(&strategy, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let chunks = splitter.split(&text);

            if chunks.is_empty() {
                println!("0 chunks embedded (input was empty)");
                return Ok(());
            }

            info!(file = %file.display(), chunk_count = chunks.len(), "embedding chunks");

            let texts = chunks
                .iter()
                .map(|chunk| chunk.content.clone())
                .collect::<Vec<_>>();
            let embeddings = client
                .embed_batch(&texts)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let store = JsonlChunkStore::new(&output);
            store
                .persist(&chunks, &embeddings)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} chunks embedded into {} at {}",
                chunks.len(),
                output.display(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Rerank { query, file, top_n } => {
            let mut config = RerankerConfig::load(&cli.config_dir)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            config.top_n = top_n;
            let client =
                RerankClient::new(&config).map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let records: Vec<DatasetRecord> =
                read_jsonl(&file).map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let documents = records
                .iter()
                .map(|record| record.text.clone())
                .collect::<Vec<_>>();

            let hits = client
                .rerank(&query, &documents)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            for hit in hits {
                let document_id = records
                    .get(hit.index)
                    .map(|record| record.id.as_str())
                    .unwrap_or_default();
                println!(
                    "[{}] score={:.4} document_id={}",
                    hit.index, hit.score, document_id
                );
                if let Some(document) = &hit.document {
                    println!("  text: {document}");
                }
            }
        }
    }

    Ok(())
}
