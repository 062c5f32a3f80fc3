use crate::error::IngestError;
use crate::models::{Chunk, PageText};
use regex::Regex;
use serde::{Deserialize, Serialize};

const PARAGRAPH_BREAK: &str = r"\n[ \t]*\n\s*";
const SENTENCE_END: &str = r#"[.!?]["')\]]*\s+"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            overlap_chars: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

struct Boundaries {
    paragraph: Regex,
    sentence: Regex,
}

impl Boundaries {
    fn compile() -> Result<Self, IngestError> {
        Ok(Self {
            paragraph: Regex::new(PARAGRAPH_BREAK)?,
            sentence: Regex::new(SENTENCE_END)?,
        })
    }
}

/// Splits pages into overlapping chunks, numbered in page order then split order.
pub fn chunk_pages(pages: &[PageText], config: ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;
    let boundaries = Boundaries::compile()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        if page.number == 0 {
            return Err(IngestError::InvalidArgument(
                "page numbers start at 1".to_string(),
            ));
        }

        for segment in split_page(&page.text, config, &boundaries) {
            chunks.push(Chunk {
                text: segment.to_string(),
                page: page.number,
                index: cursor,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

/// Every segment is a slice of `text`; segment `n + 1` starts with the last
/// `overlap_chars` characters of segment `n`.
fn split_page<'a>(text: &'a str, config: ChunkingConfig, boundaries: &Boundaries) -> Vec<&'a str> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let mut segments = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + config.max_chars).min(char_count);
        if end < char_count {
            if let Some(found) = preferred_break(text, &offsets, start, end, config, boundaries) {
                end = found;
            }
        }

        let segment = &text[offsets[start]..offsets[end]];
        if !segment.trim().is_empty() {
            segments.push(segment);
        }

        if end == char_count {
            break;
        }
        start = end - config.overlap_chars;
    }

    segments
}

/// Last paragraph break, else last sentence end, in the back half of the
/// window. Returned as a char position strictly past `start + overlap_chars`.
fn preferred_break(
    text: &str,
    offsets: &[usize],
    start: usize,
    end: usize,
    config: ChunkingConfig,
    boundaries: &Boundaries,
) -> Option<usize> {
    let window_start = offsets[start];
    let window = &text[window_start..offsets[end]];
    let earliest = start + config.overlap_chars.max(config.max_chars / 2) + 1;

    [&boundaries.paragraph, &boundaries.sentence]
        .into_iter()
        .find_map(|pattern| {
            pattern
                .find_iter(window)
                .map(|found| {
                    let absolute = window_start + found.end();
                    offsets
                        .binary_search(&absolute)
                        .unwrap_or_else(|position| position)
                })
                .filter(|position| *position >= earliest && *position <= end)
                .last()
        })
}
