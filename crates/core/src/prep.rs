use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::chat::QueryExpander;
use crate::config::ModelConfig;
use crate::dataset::{
    copy_corpus, discover_subsets, load_prompt, read_jsonl, write_jsonl, EXPANDED_QUERIES_FILE,
    QUERIES_FILE,
};
use crate::error::{PrepError, Result};
use crate::models::DatasetRecord;

pub const QUERY_EXPANSION_PROMPT_KEY: &str = "query_expansion";

#[derive(Debug, Serialize)]
pub struct SkippedSubset {
    pub subset: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PrepReport {
    pub prepared: Vec<String>,
    pub skipped: Vec<SkippedSubset>,
    pub finished_at: DateTime<Utc>,
}

pub async fn expand_queries<E: QueryExpander + Sync>(
    expander: &E,
    data_path: &Path,
    prompts_path: &Path,
    subset: &str,
) -> Result<()> {
    let subset_dir = data_path.join(subset);
    let target = subset_dir.join(EXPANDED_QUERIES_FILE);

    if target.exists() {
        info!(subset, "expanded queries already present, skipping");
        return Ok(());
    }

    let template = load_prompt(prompts_path, QUERY_EXPANSION_PROMPT_KEY, subset)?;
    let queries: Vec<DatasetRecord> = read_jsonl(&subset_dir.join(QUERIES_FILE))?;

    let mut expanded = Vec::with_capacity(queries.len());
    for query in queries {
        let prompt = format!("{template}{}", query.text);
        let reply = expander.expand(&prompt).await?;

        expanded.push(DatasetRecord {
            text: format!("{reply}\n\n{}", query.text),
            ..query
        });
    }

    write_jsonl(&target, &expanded)?;
    info!(subset, count = expanded.len(), "expanded queries written");
    Ok(())
}

pub async fn pre_retrieve<E: QueryExpander + Sync>(
    expander: &E,
    config: &ModelConfig,
) -> Result<PrepReport> {
    let subsets = if config.subsets.is_empty() {
        discover_subsets(&config.data_path)
    } else {
        config.subsets.clone()
    };

    if subsets.is_empty() {
        return Err(PrepError::InvalidArgument(format!(
            "no subsets found in {}",
            config.data_path.display()
        )));
    }

    let mut prepared = Vec::new();
    let mut skipped = Vec::new();

    for subset in subsets {
        let outcome = expand_queries(expander, &config.data_path, &config.prompts_path, &subset)
            .await
            .and_then(|()| copy_corpus(&config.data_path, &subset).map(|_| ()));

        match outcome {
            Ok(()) => prepared.push(subset),
            Err(error) => {
                warn!(subset, error = %error, "skipping subset");
                skipped.push(SkippedSubset {
                    subset,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(PrepReport {
        prepared,
        skipped,
        finished_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::{expand_queries, pre_retrieve, QUERY_EXPANSION_PROMPT_KEY};
    use crate::chat::QueryExpander;
    use crate::config::ModelConfig;
    use crate::dataset::{read_jsonl, CORPUS_FILE, EXPANDED_QUERIES_FILE, QUERIES_FILE};
    use crate::error::{PrepError, Result};
    use crate::models::DatasetRecord;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeExpander {
        reply: String,
        calls: AtomicUsize,
    }

    impl FakeExpander {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl QueryExpander for FakeExpander {
        async fn expand(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn write_subset(data_path: &Path, subset: &str, with_corpus: bool) {
        let dir = data_path.join(subset);
        fs::create_dir_all(&dir).expect("create subset dir");
        fs::write(
            dir.join(QUERIES_FILE),
            "{\"_id\":\"q1\",\"text\":\"what is margin\"}\n",
        )
        .expect("write queries");

        if with_corpus {
            fs::write(dir.join(CORPUS_FILE), "{\"_id\":\"d1\",\"text\":\"doc\"}\n")
                .expect("write corpus");
        }
    }

    fn write_prompts(path: &Path, subsets: &[&str]) {
        let entries = subsets
            .iter()
            .map(|subset| format!("\"{subset}\":\"Expand this query: \""))
            .collect::<Vec<_>>()
            .join(",");
        fs::write(
            path,
            format!("{{\"pre_retrieval\":{{\"{QUERY_EXPANSION_PROMPT_KEY}\":{{{entries}}}}}}}"),
        )
        .expect("write prompts");
    }

    #[tokio::test]
    async fn expansion_prefixes_model_reply_and_keeps_the_original() {
        let dir = tempdir().expect("create temp dir");
        let data_path = dir.path().join("data");
        let prompts_path = dir.path().join("prompts.json");
        write_subset(&data_path, "finance", false);
        write_prompts(&prompts_path, &["finance"]);

        let expander = FakeExpander::replying("margin call, collateral");
        expand_queries(&expander, &data_path, &prompts_path, "finance")
            .await
            .expect("expansion succeeds");

        let expanded: Vec<DatasetRecord> =
            read_jsonl(&data_path.join("finance").join(EXPANDED_QUERIES_FILE))
                .expect("expanded file exists");
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].id, "q1");
        assert_eq!(expanded[0].text, "margin call, collateral\n\nwhat is margin");
        assert_eq!(expander.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_expansion_is_not_redone() {
        let dir = tempdir().expect("create temp dir");
        let data_path = dir.path().join("data");
        let prompts_path = dir.path().join("prompts.json");
        write_subset(&data_path, "finance", false);
        write_prompts(&prompts_path, &["finance"]);

        let target = data_path.join("finance").join(EXPANDED_QUERIES_FILE);
        fs::write(&target, "{\"_id\":\"q1\",\"text\":\"already done\"}\n")
            .expect("write prior expansion");

        let expander = FakeExpander::replying("unused");
        expand_queries(&expander, &data_path, &prompts_path, "finance")
            .await
            .expect("skip is not an error");

        assert_eq!(expander.calls.load(Ordering::SeqCst), 0);
        let kept: Vec<DatasetRecord> = read_jsonl(&target).expect("file untouched");
        assert_eq!(kept[0].text, "already done");
    }

    #[tokio::test]
    async fn preparation_continues_past_broken_subsets() {
        let dir = tempdir().expect("create temp dir");
        let data_path = dir.path().join("data");
        let prompts_path = dir.path().join("prompts.json");
        write_subset(&data_path, "finance", true);
        write_subset(&data_path, "law", false);
        write_prompts(&prompts_path, &["finance", "law"]);

        let config = ModelConfig {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "k".to_string(),
            model: "qwen2.5".to_string(),
            data_path: data_path.clone(),
            prompts_path,
            subsets: Vec::new(),
        };

        let expander = FakeExpander::replying("broader terms");
        let report = pre_retrieve(&expander, &config)
            .await
            .expect("preparation runs");

        assert_eq!(report.prepared, vec!["finance"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].subset, "law");
        assert!(report.skipped[0].reason.contains(CORPUS_FILE));
        assert!(data_path.join("finance").join("corpus_prep.jsonl").exists());
    }

    #[tokio::test]
    async fn empty_dataset_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let config = ModelConfig {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "k".to_string(),
            model: "qwen2.5".to_string(),
            data_path: dir.path().join("data"),
            prompts_path: dir.path().join("prompts.json"),
            subsets: Vec::new(),
        };

        let expander = FakeExpander::replying("unused");
        let err = pre_retrieve(&expander, &config)
            .await
            .expect_err("nothing to prepare");
        assert!(matches!(err, PrepError::InvalidArgument(_)));
    }
}
