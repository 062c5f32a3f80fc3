use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::RetrievedChunk;
use crate::store::EmbeddingStore;
use crate::topic::TopicId;
use tracing::debug;

impl<E: Embedder> EmbeddingStore<E> {
    /// Top `top_k` chunks of a resident topic for `question`, closest first.
    pub async fn retrieve(
        &self,
        topic: &TopicId,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::Request("question is empty".to_string()));
        }
        if top_k == 0 {
            return Err(SearchError::Request("top_k must be at least 1".to_string()));
        }

        let index = self
            .index(topic)
            .ok_or_else(|| SearchError::TopicNotFound(topic.to_string()))?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder().embed(question).await?;
        let hits = index.search(&query_vector, top_k)?;

        debug!(
            topic = %topic,
            requested = top_k,
            returned = hits.len(),
            best_distance = ?hits.first().map(|hit| hit.distance),
            "retrieved chunks"
        );
        Ok(hits)
    }
}
