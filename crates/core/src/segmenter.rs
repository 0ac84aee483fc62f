use std::collections::BTreeMap;

use regex::Regex;
use tracing::warn;

use crate::error::SegmentError;
use crate::models::Chunk;

pub const DEFAULT_HEADER_KEYS: [(&str, &str); 6] = [
    ("#", "Header 1"),
    ("##", "Header 2"),
    ("###", "Header 3"),
    ("####", "Header 4"),
    ("#####", "Header 5"),
    ("######", "Header 6"),
];

pub const TYPE_KEY: &str = "type";

#[derive(Debug, Clone)]
pub struct SegmenterOptions {
    pub headers_to_split_on: Vec<(String, String)>,
    pub strip_headers: bool,
}

impl Default for SegmenterOptions {
    fn default() -> Self {
        Self {
            headers_to_split_on: DEFAULT_HEADER_KEYS
                .iter()
                .map(|(key, label)| ((*key).to_string(), (*label).to_string()))
                .collect(),
            strip_headers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Math,
    Code,
}

impl BlockKind {
    fn as_str(self) -> &'static str {
        match self {
            BlockKind::Math => "math",
            BlockKind::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedBlock {
    pub kind: BlockKind,
    pub opened_at: usize, // 1-based
}

#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub chunks: Vec<Chunk>,
    pub dropped_blocks: Vec<DroppedBlock>,
}

pub struct MarkdownSegmenter {
    labels: [Option<String>; 6],
    strip_headers: bool,
    header_re: Regex,
    math_head_re: Regex,
    math_tail_re: Regex,
    fence_re: Regex,
    rule_re: Regex,
}

impl MarkdownSegmenter {
    pub fn new(options: SegmenterOptions) -> Result<Self, SegmentError> {
        let mut labels: [Option<String>; 6] = Default::default();
        for (key, label) in &options.headers_to_split_on {
            let depth = key.len();
            if depth == 0 || depth > 6 || !key.chars().all(|mark| mark == '#') {
                return Err(SegmentError::InvalidHeaderKey(key.clone()));
            }
            labels[depth - 1] = Some(label.clone());
        }

        Ok(Self {
            labels,
            strip_headers: options.strip_headers,
            header_re: Regex::new(r"^(#{1,6}) (.*)")?,
            math_head_re: Regex::new(r"^(?:\$\$|```math)")?,
            math_tail_re: Regex::new(r"^(?:\$\$|```)")?,
            fence_re: Regex::new(r"^(?:```|~~~)")?,
            rule_re: Regex::new(r"^(?:\*{3,}|-{3,}|_{3,})$")?,
        })
    }

    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        self.segment_report(text).chunks
    }

    pub fn segment_report(&self, text: &str) -> SegmentReport {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut chunks = Vec::new();
        let mut dropped_blocks = Vec::new();
        let mut header_stack: Vec<(usize, String)> = Vec::new();
        let mut pending = String::new();
        let mut cursor = 0;

        while cursor < lines.len() {
            let line = lines[cursor];
            cursor += 1;

            if let Some((depth, title)) = self.match_header(line) {
                self.complete_chunk(&mut pending, BTreeMap::new(), &header_stack, &mut chunks);
                if !self.strip_headers {
                    pending.push_str(&title);
                    pending.push('\n');
                }
                resolve_header_stack(&mut header_stack, depth, title);
            } else if self.math_head_re.is_match(line) {
                let opened_at = cursor;
                self.complete_chunk(&mut pending, BTreeMap::new(), &header_stack, &mut chunks);
                match collect_block(&lines, &mut cursor, &self.math_tail_re) {
                    Some(body) => {
                        pending = body;
                        let metadata =
                            BTreeMap::from([(TYPE_KEY.to_string(), "math".to_string())]);
                        self.complete_chunk(&mut pending, metadata, &header_stack, &mut chunks);
                    }
                    None => {
                        drop_block(BlockKind::Math, opened_at, &mut dropped_blocks);
                    }
                }
            } else if self.fence_re.is_match(line) {
                let opened_at = cursor;
                self.complete_chunk(&mut pending, BTreeMap::new(), &header_stack, &mut chunks);
                match collect_block(&lines, &mut cursor, &self.fence_re) {
                    Some(body) => {
                        pending = body;
                        let metadata =
                            BTreeMap::from([(TYPE_KEY.to_string(), "code".to_string())]);
                        self.complete_chunk(&mut pending, metadata, &header_stack, &mut chunks);
                    }
                    None => {
                        drop_block(BlockKind::Code, opened_at, &mut dropped_blocks);
                    }
                }
            } else if self.rule_re.is_match(line.trim_end_matches(['\r', '\n'])) {
                // Rules are pure separators; the line and any blank lines
                // directly after it join no chunk.
                self.complete_chunk(&mut pending, BTreeMap::new(), &header_stack, &mut chunks);
                while cursor < lines.len() && lines[cursor].trim().is_empty() {
                    cursor += 1;
                }
            } else {
                pending.push_str(line);
            }
        }

        self.complete_chunk(&mut pending, BTreeMap::new(), &header_stack, &mut chunks);

        SegmentReport {
            chunks,
            dropped_blocks,
        }
    }

    fn match_header(&self, line: &str) -> Option<(usize, String)> {
        let caps = self.header_re.captures(line)?;
        let depth = caps[1].len();
        self.labels[depth - 1].as_ref()?;
        Some((depth, caps[2].trim_end().to_string()))
    }

    fn complete_chunk(
        &self,
        pending: &mut String,
        mut metadata: BTreeMap<String, String>,
        header_stack: &[(usize, String)],
        output: &mut Vec<Chunk>,
    ) {
        let content = std::mem::take(pending);
        if content.trim().is_empty() {
            return;
        }

        for (depth, title) in header_stack {
            if let Some(label) = &self.labels[depth - 1] {
                metadata.insert(label.clone(), title.clone());
            }
        }

        output.push(Chunk { content, metadata });
    }
}

fn resolve_header_stack(stack: &mut Vec<(usize, String)>, depth: usize, title: String) {
    while stack.last().is_some_and(|(top, _)| *top >= depth) {
        stack.pop();
    }
    stack.push((depth, title));
}

fn collect_block(lines: &[&str], cursor: &mut usize, closer: &Regex) -> Option<String> {
    let mut body = String::new();
    while *cursor < lines.len() {
        let line = lines[*cursor];
        *cursor += 1;
        if closer.is_match(line) {
            return Some(body);
        }
        body.push_str(line);
    }
    None
}

fn drop_block(kind: BlockKind, opened_at: usize, dropped: &mut Vec<DroppedBlock>) {
    warn!(
        kind = kind.as_str(),
        opened_at, "block never closed before end of input; dropping it"
    );
    dropped.push(DroppedBlock { kind, opened_at });
}

pub const INLINE_MATH_PLACEHOLDER: &str = "[inline-math]";
pub const INLINE_CODE_PLACEHOLDER: &str = "[inline-code]";

pub struct InlineMasker {
    inline_math_re: Regex,
    inline_code_re: Regex,
}

impl InlineMasker {
    pub fn new() -> Result<Self, SegmentError> {
        Ok(Self {
            inline_math_re: Regex::new(r"\$.*?\$")?,
            inline_code_re: Regex::new(r"`.*?`")?,
        })
    }

    pub fn mask(&self, text: &str) -> String {
        let masked = self.inline_math_re.replace_all(text, INLINE_MATH_PLACEHOLDER);
        self.inline_code_re
            .replace_all(&masked, INLINE_CODE_PLACEHOLDER)
            .into_owned()
    }

    // Type-tagged chunks keep their raw bodies.
    pub fn mask_chunks(&self, chunks: &mut [Chunk]) {
        for chunk in chunks.iter_mut() {
            if !chunk.metadata.contains_key(TYPE_KEY) {
                chunk.content = self.mask(&chunk.content);
            }
        }
    }
}
