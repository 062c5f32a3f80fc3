use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Text of one PDF page as handed over by the extraction layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// A bounded segment of one page, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub page: u32,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(default)]
    pub id: String,
    pub filename: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl ImageRecord {
    pub fn new<I, S>(
        id: impl Into<String>,
        filename: impl Into<String>,
        title: impl Into<String>,
        keywords: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            filename: filename.into(),
            title: title.into(),
            description: None,
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub topic_id: String,
    pub chunks_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub image: Option<ImageRecord>,
    pub sources: Vec<String>,
}

impl ChatAnswer {
    /// `"Page N"` labels in retrieval order, each page listed once.
    pub fn source_labels(chunks: &[RetrievedChunk]) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for retrieved in chunks {
            let label = format!("Page {}", retrieved.chunk.page);
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(page: u32, index: u64) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                text: format!("chunk {index}"),
                page,
                index,
            },
            distance: 0.0,
        }
    }

    #[test]
    fn source_labels_keep_first_occurrence_order() {
        let labels =
            ChatAnswer::source_labels(&[retrieved(3, 5), retrieved(1, 0), retrieved(3, 6)]);
        assert_eq!(labels, vec!["Page 3".to_string(), "Page 1".to_string()]);
    }

    #[test]
    fn image_record_without_optional_fields_deserializes() {
        let record: ImageRecord =
            serde_json::from_str(r#"{"id":"leaf","filename":"leaf.png","title":"Leaf"}"#)
                .expect("record should parse");
        assert!(record.keywords.is_empty());
        assert!(record.description.is_none());
    }
}
