pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod images;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod retriever;
pub mod store;
pub mod synthesizer;
pub mod topic;
pub mod traits;

pub use chunking::{chunk_pages, normalize_whitespace, ChunkingConfig};
pub use config::{TutorConfig, DEFAULT_TOP_K};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError, ServiceError, StoreError};
pub use images::{ImageCatalog, ImageMatchConfig, ImageRetriever};
pub use index::{DistanceMetric, FlatIndex};
pub use models::{
    ChatAnswer, Chunk, EmbeddingRecord, ImageRecord, PageText, RetrievedChunk, UploadReport,
};
pub use orchestrator::TutorPipeline;
pub use providers::{OllamaEmbedder, OllamaEndpoint, OllamaGenerator};
pub use store::{EmbeddingStore, IndexBuild, RestoredTopic};
pub use synthesizer::{build_prompt, AnswerSynthesizer};
pub use topic::TopicId;
pub use traits::TextGenerator;
