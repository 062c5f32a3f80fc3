//! Per-topic embedding indices and their on-disk snapshots.
//!
//! Indices live in memory keyed by topic id, so building one topic never
//! disturbs another. Each topic persists to `<data_dir>/<topic_id>.json`,
//! written to a temporary file first and renamed into place.

use crate::embeddings::Embedder;
use crate::error::{IngestError, StoreError};
use crate::index::{chunk_fingerprint, DistanceMetric, FlatIndex};
use crate::models::{Chunk, ImageRecord};
use crate::topic::TopicId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_RESIDENT_TOPICS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuild {
    /// Every chunk was embedded again.
    Built,
    /// The resident index already matched the chunk set.
    Reused,
    /// Vectors came from the persisted snapshot.
    Loaded,
}

#[derive(Debug, Clone)]
pub struct RestoredTopic {
    pub chunks: Vec<Chunk>,
    pub images: Vec<ImageRecord>,
    pub build: IndexBuild,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTopic {
    topic_id: TopicId,
    embedding_model: String,
    dimensions: usize,
    saved_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
    images: Vec<ImageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vectors: Option<Vec<Vec<f32>>>,
}

#[derive(Deserialize)]
struct PersistedOwner {
    topic_id: String,
}

pub struct EmbeddingStore<E> {
    embedder: E,
    metric: DistanceMetric,
    data_dir: PathBuf,
    max_resident: usize,
    resident: HashMap<TopicId, FlatIndex>,
    recency: VecDeque<TopicId>,
}

impl<E: Embedder> EmbeddingStore<E> {
    pub fn new(embedder: E, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            metric: DistanceMetric::default(),
            data_dir: data_dir.into(),
            max_resident: DEFAULT_MAX_RESIDENT_TOPICS,
            resident: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_max_resident_topics(mut self, max_resident: usize) -> Self {
        self.max_resident = max_resident.max(1);
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index(&self, topic: &TopicId) -> Option<&FlatIndex> {
        self.resident.get(topic)
    }

    /// Resident topics, least recently used first.
    pub fn resident_topics(&self) -> Vec<TopicId> {
        self.recency.iter().cloned().collect()
    }

    /// Embeds `chunks` into the topic's index unless an identical one is resident
    /// and `regenerate` is false. A failed build leaves the old index in place.
    pub async fn build_index(
        &mut self,
        topic: &TopicId,
        chunks: &[Chunk],
        regenerate: bool,
    ) -> Result<IndexBuild, IngestError> {
        if !regenerate && self.is_current(topic, chunks) {
            self.touch(topic);
            debug!(topic = %topic, "reusing resident index");
            return Ok(IndexBuild::Reused);
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embedder.embed_all(&texts).await?;
        let index = FlatIndex::build(chunks, vectors, self.embedder.dimensions(), self.metric)?;

        info!(
            topic = %topic,
            chunk_count = chunks.len(),
            model = self.embedder.model_name(),
            "built vector index"
        );
        self.install(topic.clone(), index);
        Ok(IndexBuild::Built)
    }

    pub fn evict(&mut self, topic: &TopicId) -> bool {
        self.recency.retain(|resident| resident != topic);
        self.resident.remove(topic).is_some()
    }

    /// Writes chunks and images for `topic`, plus vectors when the resident
    /// index was built from exactly these chunks.
    pub fn persist(
        &self,
        topic: &TopicId,
        chunks: &[Chunk],
        images: &[ImageRecord],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.topic_path(topic);

        if let Some(owner) = read_owner(&path) {
            if owner != topic.as_str() {
                return Err(StoreError::TopicConflict {
                    path: path.display().to_string(),
                    existing: owner,
                });
            }
        }

        let vectors = self
            .resident
            .get(topic)
            .filter(|index| index.fingerprint() == chunk_fingerprint(chunks))
            .map(FlatIndex::vectors);

        let document = PersistedTopic {
            topic_id: topic.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
            saved_at: Utc::now(),
            chunks: chunks.to_vec(),
            images: images.to_vec(),
            vectors,
        };

        let json = serde_json::to_vec_pretty(&document)?;
        write_atomically(&path, &json)?;

        info!(
            topic = %topic,
            path = %path.display(),
            chunk_count = chunks.len(),
            image_count = images.len(),
            with_vectors = document.vectors.is_some(),
            "persisted topic"
        );
        Ok(())
    }

    /// `None` for unknown topics and for snapshots that cannot be read back.
    pub fn load(&self, topic: &TopicId) -> Option<(Vec<Chunk>, Vec<ImageRecord>)> {
        self.read_persisted(topic)
            .map(|document| (document.chunks, document.images))
    }

    /// Loads the snapshot and makes its index resident, reusing persisted
    /// vectors when they came from the same embedding model.
    pub async fn restore(
        &mut self,
        topic: &TopicId,
        regenerate: bool,
    ) -> Result<Option<RestoredTopic>, IngestError> {
        let Some(document) = self.read_persisted(topic) else {
            return Ok(None);
        };

        let build = if !regenerate && self.is_current(topic, &document.chunks) {
            self.touch(topic);
            IndexBuild::Reused
        } else if let Some(index) = (!regenerate)
            .then(|| self.index_from_snapshot(&document))
            .flatten()
        {
            info!(topic = %topic, chunk_count = index.len(), "loaded persisted vectors");
            self.install(topic.clone(), index);
            IndexBuild::Loaded
        } else {
            self.build_index(topic, &document.chunks, true).await?
        };

        Ok(Some(RestoredTopic {
            chunks: document.chunks,
            images: document.images,
            build,
        }))
    }

    /// Removes the snapshot and any resident index. `false` if nothing was on disk.
    pub fn delete(&mut self, topic: &TopicId) -> Result<bool, StoreError> {
        self.evict(topic);
        match fs::remove_file(self.topic_path(topic)) {
            Ok(()) => {
                info!(topic = %topic, "deleted topic");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn topic_path(&self, topic: &TopicId) -> PathBuf {
        self.data_dir.join(format!("{topic}.json"))
    }

    fn is_current(&self, topic: &TopicId, chunks: &[Chunk]) -> bool {
        self.resident.get(topic).is_some_and(|index| {
            index.dimensions() == self.embedder.dimensions()
                && index.metric() == self.metric
                && index.fingerprint() == chunk_fingerprint(chunks)
        })
    }

    fn index_from_snapshot(&self, document: &PersistedTopic) -> Option<FlatIndex> {
        let vectors = document.vectors.clone()?;
        if document.embedding_model != self.embedder.model_name()
            || document.dimensions != self.embedder.dimensions()
        {
            debug!(
                topic = %document.topic_id,
                stored_model = %document.embedding_model,
                "persisted vectors come from another model"
            );
            return None;
        }

        match FlatIndex::build(&document.chunks, vectors, document.dimensions, self.metric) {
            Ok(index) => Some(index),
            Err(error) => {
                warn!(topic = %document.topic_id, %error, "discarding persisted vectors");
                None
            }
        }
    }

    fn read_persisted(&self, topic: &TopicId) -> Option<PersistedTopic> {
        let path = self.topic_path(topic);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(topic = %topic, path = %path.display(), %error, "unreadable topic snapshot");
                return None;
            }
        };

        let document: PersistedTopic = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(error) => {
                warn!(topic = %topic, path = %path.display(), %error, "corrupt topic snapshot");
                return None;
            }
        };

        if document.topic_id != *topic {
            warn!(
                topic = %topic,
                stored = %document.topic_id,
                "topic snapshot belongs to another topic"
            );
            return None;
        }

        Some(document)
    }

    fn install(&mut self, topic: TopicId, index: FlatIndex) {
        self.resident.insert(topic.clone(), index);
        self.touch(&topic);

        while self.resident.len() > self.max_resident {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            self.resident.remove(&oldest);
            debug!(topic = %oldest, "evicted resident index");
        }
    }

    fn touch(&mut self, topic: &TopicId) {
        self.recency.retain(|resident| resident != topic);
        self.recency.push_back(topic.clone());
    }
}

/// Writes `<path>.tmp` and renames it over `path`. On failure the temporary
/// file is removed and `path` keeps its previous contents.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    let written = fs::write(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path));
    if let Err(error) = written {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(path = %tmp_path.display(), error = %cleanup, "temporary snapshot left behind");
            }
        }
        return Err(error.into());
    }
    Ok(())
}

fn read_owner(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice::<PersistedOwner>(&bytes)
        .ok()
        .map(|owner| owner.topic_id)
}
