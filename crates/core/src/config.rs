use crate::chunking::ChunkingConfig;
use crate::error::IngestError;
use crate::images::ImageMatchConfig;
use crate::index::DistanceMetric;
use crate::store::DEFAULT_MAX_RESIDENT_TOPICS;
use crate::synthesizer::DEFAULT_MAX_CONTEXT_CHARS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Directory holding one `<topic_id>.json` snapshot per topic.
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub metric: DistanceMetric,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub image_match: ImageMatchConfig,
    pub max_resident_topics: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/embeddings"),
            chunking: ChunkingConfig::default(),
            metric: DistanceMetric::default(),
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            image_match: ImageMatchConfig::default(),
            max_resident_topics: DEFAULT_MAX_RESIDENT_TOPICS,
        }
    }
}

impl TutorConfig {
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, IngestError> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|error| {
            IngestError::InvalidArgument(format!("{}: {error}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(IngestError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        let image_match = &self.image_match;
        for (name, value) in [
            ("threshold", image_match.threshold),
            ("answer_weight", image_match.answer_weight),
            ("question_weight", image_match.question_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(IngestError::InvalidArgument(format!(
                    "image {name} {value} is outside 0..=1"
                )));
            }
        }
        Ok(())
    }
}
