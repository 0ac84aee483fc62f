use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PrepError, Result};

pub const QUERIES_FILE: &str = "queries.jsonl";
pub const EXPANDED_QUERIES_FILE: &str = "expanded_queries.jsonl";
pub const CORPUS_FILE: &str = "corpus.jsonl";
pub const PREPARED_CORPUS_FILE: &str = "corpus_prep.jsonl";

pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(PrepError::MissingFile(path.display().to_string()));
    }

    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }

    fs::write(path, out)?;
    Ok(())
}

pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn copy_corpus(data_path: &Path, subset: &str) -> Result<PathBuf> {
    let source = data_path.join(subset).join(CORPUS_FILE);
    if !source.exists() {
        return Err(PrepError::MissingFile(source.display().to_string()));
    }

    let target = data_path.join(subset).join(PREPARED_CORPUS_FILE);
    fs::copy(&source, &target)?;

    if digest_file(&source)? != digest_file(&target)? {
        return Err(PrepError::CopyMismatch(target.display().to_string()));
    }

    Ok(target)
}

pub fn discover_subsets(data_path: &Path) -> Vec<String> {
    let mut subsets = Vec::new();

    for entry in WalkDir::new(data_path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }

        if !entry.path().join(QUERIES_FILE).exists() {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            subsets.push(name.to_string());
        }
    }

    subsets.sort_unstable();
    subsets
}

pub fn load_prompt(prompts_path: &Path, key: &str, subset: &str) -> Result<String> {
    if !prompts_path.exists() {
        return Err(PrepError::MissingFile(prompts_path.display().to_string()));
    }

    let raw = fs::read_to_string(prompts_path)?;
    let prompts: Value = serde_json::from_str(&raw)?;

    prompts
        .pointer(&format!("/pre_retrieval/{key}/{subset}"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PrepError::MissingPrompt(format!("pre_retrieval/{key}/{subset}")))
}
