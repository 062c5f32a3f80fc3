//! Lexical matching between a generated answer and a fixed image catalog.

use crate::error::IngestError;
use crate::models::ImageRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const CATALOG_MANIFEST: &str = "metadata.json";

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

const STOP_WORDS: [&str; 48] = [
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "why", "when", "where", "who", "does",
    "do", "can", "into", "about", "these", "those", "than", "then", "also",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMatchConfig {
    /// A best score at or below this returns no image.
    pub threshold: f64,
    pub answer_weight: f64,
    pub question_weight: f64,
}

impl Default for ImageMatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            answer_weight: 1.0,
            question_weight: 0.5,
        }
    }
}

/// Ordered image records with unique filenames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCatalog {
    records: Vec<ImageRecord>,
}

impl ImageCatalog {
    /// Keeps the first record for each filename.
    pub fn new(records: Vec<ImageRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| {
                let fresh = seen.insert(record.filename.clone());
                if !fresh {
                    warn!(filename = %record.filename, "duplicate image filename in catalog");
                }
                fresh
            })
            .collect();
        Self { records }
    }

    /// Reads `metadata.json` from `folder` if present, otherwise derives
    /// records from the image files found under it. A missing folder is an
    /// empty catalog.
    pub fn discover(folder: &Path) -> Result<Self, IngestError> {
        if !folder.is_dir() {
            warn!(folder = %folder.display(), "image folder not found");
            return Ok(Self::default());
        }

        let manifest = folder.join(CATALOG_MANIFEST);
        let catalog = if manifest.is_file() {
            let bytes = fs::read(&manifest)?;
            let mut records: Vec<ImageRecord> =
                serde_json::from_slice(&bytes).map_err(|error| {
                    IngestError::InvalidArgument(format!("{}: {error}", manifest.display()))
                })?;
            for record in records.iter_mut().filter(|record| record.id.is_empty()) {
                record.id = Path::new(&record.filename)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(&record.filename)
                    .to_string();
            }
            Self::new(records)
        } else {
            Self::new(
                discover_image_files(folder)
                    .iter()
                    .filter_map(|path| record_from_path(folder, path))
                    .collect(),
            )
        };

        info!(folder = %folder.display(), image_count = catalog.len(), "loaded image catalog");
        Ok(catalog)
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn discover_image_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMAGE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    files
}

fn record_from_path(folder: &Path, path: &Path) -> Option<ImageRecord> {
    let filename = path.strip_prefix(folder).ok()?.to_str()?.replace('\\', "/");
    let stem = path.file_stem()?.to_str()?;

    let words: Vec<&str> = stem
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let title = words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    Some(ImageRecord {
        id: stem.to_string(),
        filename,
        title,
        description: None,
        keywords: words.iter().map(|word| word.to_lowercase()).collect(),
    })
}

/// Every lowercased alphanumeric token of `text`.
pub fn token_set(text: &str, pattern: &Regex) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    pattern
        .find_iter(&lowered)
        .map(|token| token.as_str().to_string())
        .collect()
}

/// Lowercased alphanumeric tokens of three or more characters, minus stop words.
pub fn keyword_set(text: &str, pattern: &Regex) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    pattern
        .find_iter(&lowered)
        .map(|token| token.as_str())
        .filter(|token| token.chars().count() > 2 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

pub struct ImageRetriever {
    catalog: ImageCatalog,
    config: ImageMatchConfig,
    token_pattern: Regex,
}

impl ImageRetriever {
    pub fn new(config: ImageMatchConfig) -> Result<Self, IngestError> {
        Ok(Self {
            catalog: ImageCatalog::default(),
            config,
            token_pattern: Regex::new(r"[\p{L}\p{N}]+")?,
        })
    }

    /// Replaces the active catalog.
    pub fn load_catalog(&mut self, catalog: ImageCatalog) {
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    /// Terms an image is matched on. Curated keywords are taken whole, however
    /// short; records without keywords fall back to the content words of their
    /// title and description.
    pub fn record_terms(&self, record: &ImageRecord) -> BTreeSet<String> {
        let keywords: BTreeSet<String> = record
            .keywords
            .iter()
            .flat_map(|keyword| token_set(keyword, &self.token_pattern))
            .collect();
        if !keywords.is_empty() {
            return keywords;
        }

        let text = match &record.description {
            Some(description) => format!("{} {description}", record.title),
            None => record.title.clone(),
        };
        keyword_set(&text, &self.token_pattern)
    }

    /// Weighted share of the record's terms found in the answer (full
    /// weight) or only in the question (reduced weight). 1.0 at most.
    pub fn score(
        &self,
        record: &ImageRecord,
        answer_terms: &BTreeSet<String>,
        question_terms: &BTreeSet<String>,
    ) -> f64 {
        let record_terms = self.record_terms(record);
        if record_terms.is_empty() {
            return 0.0;
        }

        let weighted: f64 = record_terms
            .iter()
            .map(|term| {
                if answer_terms.contains(term) {
                    self.config.answer_weight
                } else if question_terms.contains(term) {
                    self.config.question_weight
                } else {
                    0.0
                }
            })
            .sum();

        weighted / record_terms.len() as f64
    }

    /// Best-scoring image, earliest in the catalog on ties, or `None` when
    /// nothing clears the threshold.
    pub fn find_relevant(&self, answer: &str, question: &str) -> Option<&ImageRecord> {
        self.find_relevant_in(&self.catalog, answer, question)
    }

    /// Same scoring against a catalog other than the active one.
    pub fn find_relevant_in<'a>(
        &self,
        catalog: &'a ImageCatalog,
        answer: &str,
        question: &str,
    ) -> Option<&'a ImageRecord> {
        let answer_terms = token_set(answer, &self.token_pattern);
        let question_terms = token_set(question, &self.token_pattern);

        let mut best: Option<(f64, &ImageRecord)> = None;
        for record in catalog.records() {
            let score = self.score(record, &answer_terms, &question_terms);
            debug!(filename = %record.filename, score, "scored image");
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, record));
            }
        }

        match best {
            Some((score, record)) if score > self.config.threshold => {
                info!(filename = %record.filename, score, "matched image");
                Some(record)
            }
            _ => {
                debug!(threshold = self.config.threshold, "no image above threshold");
                None
            }
        }
    }
}
