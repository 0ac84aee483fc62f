use crate::error::SegmentError;
use crate::models::Chunk;
use crate::segmenter::{MarkdownSegmenter, SegmenterOptions};

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 51;

#[derive(Debug, Clone)]
pub struct CharacterWindowSplitter {
    separator: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterWindowSplitter {
    pub fn new(
        separator: impl Into<String>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, SegmentError> {
        validate_sizes(chunk_size, chunk_overlap)?;
        Ok(Self {
            separator: separator.into(),
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if self.separator.is_empty() {
            return window_chars(text, self.chunk_size, self.chunk_overlap);
        }

        let pieces = text
            .split(self.separator.as_str())
            .filter(|piece| !piece.is_empty())
            .collect::<Vec<_>>();

        let separator_len = self.separator.chars().count();
        let mut merged = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            let piece_len = piece.chars().count();

            if current.is_empty() {
                current.push_str(piece);
            } else if current.chars().count() + separator_len + piece_len <= self.chunk_size {
                current.push_str(&self.separator);
                current.push_str(piece);
            } else {
                merged.push(std::mem::take(&mut current));
                current.push_str(piece);
            }
        }

        if !current.is_empty() {
            merged.push(current);
        }

        let mut sized = Vec::new();
        for chunk in merged {
            if chunk.chars().count() <= self.chunk_size {
                sized.push(chunk);
            } else {
                sized.extend(window_chars(&chunk, self.chunk_size, self.chunk_overlap));
            }
        }

        sized
    }
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SegmentError> {
        validate_sizes(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: ["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", ""]
                .iter()
                .map(|separator| (*separator).to_string())
                .collect(),
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        if text.chars().count() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let Some((separator, finer)) = separators.split_first() else {
            return vec![text.to_string()];
        };

        if separator.is_empty() {
            return window_chars(text, self.chunk_size, self.chunk_overlap);
        }

        let separator_len = separator.chars().count();
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in text.split(separator.as_str()) {
            let piece_len = piece.chars().count();

            if piece_len > self.chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(self.split_with(piece, finer));
                continue;
            }

            if current.is_empty() {
                current.push_str(piece);
            } else if current.chars().count() + separator_len + piece_len <= self.chunk_size {
                current.push_str(separator);
                current.push_str(piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                current.push_str(piece);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

fn window_chars(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

fn validate_sizes(chunk_size: usize, chunk_overlap: usize) -> Result<(), SegmentError> {
    if chunk_size == 0 {
        return Err(SegmentError::InvalidSplitterConfig(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(SegmentError::InvalidSplitterConfig(format!(
            "chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"
        )));
    }
    Ok(())
}

pub enum Splitter {
    CharacterWindow(CharacterWindowSplitter),
    Recursive(RecursiveSplitter),
    MarkdownHeader(MarkdownSegmenter),
}

impl Splitter {
    pub fn for_name(
        name: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, SegmentError> {
        match name {
            "character-window" => Ok(Self::CharacterWindow(CharacterWindowSplitter::new(
                "",
                chunk_size,
                chunk_overlap,
            )?)),
            "recursive" => Ok(Self::Recursive(RecursiveSplitter::new(
                chunk_size,
                chunk_overlap,
            )?)),
            "markdown-header" => Ok(Self::MarkdownHeader(MarkdownSegmenter::new(
                SegmenterOptions::default(),
            )?)),
            other => Err(SegmentError::UnknownSplitter(other.to_string())),
        }
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        match self {
            Self::CharacterWindow(splitter) => plain_chunks(splitter.split_text(text)),
            Self::Recursive(splitter) => plain_chunks(splitter.split_text(text)),
            Self::MarkdownHeader(segmenter) => segmenter.segment(text),
        }
    }
}

fn plain_chunks(pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .map(Chunk::plain)
        .collect()
}
