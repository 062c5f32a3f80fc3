use crate::chunking::chunk_pages;
use crate::config::TutorConfig;
use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError, StoreError};
use crate::images::{ImageCatalog, ImageRetriever};
use crate::models::{ChatAnswer, ImageRecord, PageText, UploadReport};
use crate::store::EmbeddingStore;
use crate::synthesizer::AnswerSynthesizer;
use crate::topic::TopicId;
use crate::traits::TextGenerator;
use tracing::{info, warn};

/// Upload and chat flows over one embedding store, one generator and the
/// active image catalog. Mutating calls take `&mut self`; share it behind a
/// mutex when several tasks need it.
pub struct TutorPipeline<E, G> {
    store: EmbeddingStore<E>,
    synthesizer: AnswerSynthesizer<G>,
    images: ImageRetriever,
    config: TutorConfig,
}

impl<E, G> TutorPipeline<E, G>
where
    E: Embedder,
    G: TextGenerator,
{
    pub fn new(embedder: E, generator: G, config: TutorConfig) -> Result<Self, IngestError> {
        config.validate()?;

        Ok(Self {
            store: EmbeddingStore::new(embedder, config.data_dir.clone())
                .with_metric(config.metric)
                .with_max_resident_topics(config.max_resident_topics),
            synthesizer: AnswerSynthesizer::new(generator)
                .with_max_context_chars(config.max_context_chars),
            images: ImageRetriever::new(config.image_match)?,
            config,
        })
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn store(&self) -> &EmbeddingStore<E> {
        &self.store
    }

    pub fn catalog(&self) -> &ImageCatalog {
        self.images.catalog()
    }

    /// Swaps in a new image catalog for later uploads and questions.
    pub fn refresh_catalog(&mut self, catalog: ImageCatalog) {
        info!(image_count = catalog.len(), "image catalog refreshed");
        self.images.load_catalog(catalog);
    }

    /// Chunks, embeds and persists a document under its filename-derived topic.
    /// Uploading the same filename again replaces the topic.
    pub async fn upload(
        &mut self,
        filename: &str,
        pages: &[PageText],
    ) -> Result<UploadReport, IngestError> {
        let topic = TopicId::from_filename(filename);
        let chunks = chunk_pages(pages, self.config.chunking)?;
        info!(
            filename,
            topic = %topic,
            page_count = pages.len(),
            chunk_count = chunks.len(),
            "chunked upload"
        );
        if chunks.is_empty() {
            warn!(topic = %topic, "document has no text; questions will retrieve nothing");
        }

        self.store.build_index(&topic, &chunks, true).await?;
        self.store
            .persist(&topic, &chunks, self.images.catalog().records())?;

        Ok(UploadReport {
            topic_id: topic.to_string(),
            chunks_created: chunks.len(),
        })
    }

    pub async fn ask(&mut self, topic: &TopicId, question: &str) -> Result<ChatAnswer, SearchError> {
        let top_k = self.config.top_k;
        self.ask_with_top_k(topic, question, top_k).await
    }

    /// Restores the topic, retrieves passages, generates the answer and picks
    /// an image. The active catalog wins; the topic's own snapshot is used
    /// when no catalog is loaded.
    pub async fn ask_with_top_k(
        &mut self,
        topic: &TopicId,
        question: &str,
        top_k: usize,
    ) -> Result<ChatAnswer, SearchError> {
        let restored = self
            .store
            .restore(topic, false)
            .await?
            .ok_or_else(|| SearchError::TopicNotFound(topic.to_string()))?;
        info!(
            topic = %topic,
            chunk_count = restored.chunks.len(),
            build = ?restored.build,
            "topic ready"
        );

        let retrieved = self.store.retrieve(topic, question, top_k).await?;
        let answer = self.synthesizer.synthesize(question, &retrieved).await?;

        let image = if self.images.catalog().is_empty() {
            let snapshot = ImageCatalog::new(restored.images);
            self.images
                .find_relevant_in(&snapshot, &answer, question)
                .cloned()
        } else {
            self.images.find_relevant(&answer, question).cloned()
        };

        let sources = ChatAnswer::source_labels(&retrieved);
        info!(
            topic = %topic,
            image = image.as_ref().map_or("none", |record| record.filename.as_str()),
            sources = %sources.join(", "),
            "chat response ready"
        );

        Ok(ChatAnswer {
            answer,
            image,
            sources,
        })
    }

    /// Image metadata persisted with the topic.
    pub fn topic_images(&self, topic: &TopicId) -> Result<Vec<ImageRecord>, SearchError> {
        self.store
            .load(topic)
            .map(|(_, images)| images)
            .ok_or_else(|| SearchError::TopicNotFound(topic.to_string()))
    }

    pub fn delete_topic(&mut self, topic: &TopicId) -> Result<bool, StoreError> {
        self.store.delete(topic)
    }
}
