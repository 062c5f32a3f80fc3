use crate::chunking::normalize_whitespace;
use crate::error::ServiceError;
use crate::models::RetrievedChunk;
use crate::traits::TextGenerator;
use tracing::info;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6_000;

/// Longer questions are cut to this many characters inside the prompt.
pub const MAX_QUESTION_CHARS: usize = 1_000;

const PASSAGE_SEPARATOR: &str = "\n\n";

const NO_PASSAGES: &str = "(no passages from the document matched this question)";

/// Prompt assembly plus a single call to the generation service.
pub struct AnswerSynthesizer<G> {
    generator: G,
    max_context_chars: usize,
}

impl<G: TextGenerator> AnswerSynthesizer<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars.max(1);
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub async fn synthesize(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<String, ServiceError> {
        let prompt = build_prompt(question, chunks, self.max_context_chars);
        let answer = self.generator.generate(&prompt).await?;

        info!(
            model = self.generator.model_name(),
            prompt_chars = prompt.chars().count(),
            answer_chars = answer.chars().count(),
            "generated answer"
        );
        Ok(answer)
    }
}

/// Passages in retrieval order, each tagged with its page, until
/// `max_context_chars` (separators included) is used up. The first passage is
/// always included, truncated if needed. The question is capped at
/// `MAX_QUESTION_CHARS`, so the prompt length is bounded.
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk], max_context_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (position, retrieved) in chunks.iter().enumerate() {
        let passage = format!(
            "[Page {}]\n{}",
            retrieved.chunk.page,
            normalize_whitespace(&retrieved.chunk.text)
        );
        let separator = if position == 0 { "" } else { PASSAGE_SEPARATOR };
        let length = separator.len() + passage.chars().count();

        if used + length > max_context_chars {
            if position == 0 {
                context.extend(passage.chars().take(max_context_chars));
            }
            break;
        }

        context.push_str(separator);
        context.push_str(&passage);
        used += length;
    }

    if context.is_empty() {
        context.push_str(NO_PASSAGES);
    }

    let question: String = question.chars().take(MAX_QUESTION_CHARS).collect();

    format!(
        "You are a patient tutor answering questions about a document the student uploaded.\n\
         Answer using only the passages below and mention the pages you relied on.\n\
         If the passages do not contain the answer, say so plainly.\n\n\
         PASSAGES:\n{context}\n\n\
         QUESTION: {question}\n\n\
         ANSWER:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(ServiceError::BackendResponse {
                    backend: "recording".to_string(),
                    details: "500 Internal Server Error".to_string(),
                });
            }
            Ok("Chlorophyll absorbs light (page 2).".to_string())
        }
    }

    fn retrieved(page: u32, index: u64, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                text: text.to_string(),
                page,
                index,
            },
            distance: 0.1,
        }
    }

    #[test]
    fn prompt_tags_pages_and_ends_with_question() {
        let chunks = vec![
            retrieved(2, 1, "Chlorophyll   absorbs\nlight."),
            retrieved(1, 0, "Photosynthesis converts light to energy."),
        ];
        let prompt = build_prompt("What absorbs light?", &chunks, 1_000);

        let second_page = prompt.find("[Page 1]").unwrap();
        let first_page = prompt.find("[Page 2]\nChlorophyll absorbs light.").unwrap();
        assert!(first_page < second_page);
        assert!(prompt.contains("QUESTION: What absorbs light?"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[test]
    fn context_is_bounded() {
        let long = "word ".repeat(400);
        let chunks = vec![retrieved(1, 0, &long), retrieved(2, 1, "short tail")];

        let prompt = build_prompt("q", &chunks, 100);
        let context_start = prompt.find("PASSAGES:\n").unwrap() + "PASSAGES:\n".len();
        let context_end = prompt.find("\n\nQUESTION:").unwrap();

        assert_eq!(prompt[context_start..context_end].chars().count(), 100);
        assert!(!prompt.contains("[Page 2]"));
    }

    #[test]
    fn separators_count_toward_the_bound() {
        // two 20-char passages fit in 40 only without the blank line between them
        let chunks = vec![
            retrieved(1, 0, "aaaaaaaaaaa"),
            retrieved(2, 1, "bbbbbbbbbbb"),
        ];
        let prompt = build_prompt("q", &chunks, 40);

        assert!(prompt.contains("[Page 1]\naaaaaaaaaaa"));
        assert!(!prompt.contains("[Page 2]"));
    }

    #[test]
    fn long_questions_are_capped() {
        let question = "why ".repeat(2_000);
        let short = build_prompt("", &[], 100);
        let prompt = build_prompt(&question, &[], 100);

        assert_eq!(
            prompt.chars().count(),
            short.chars().count() + MAX_QUESTION_CHARS
        );
    }

    #[test]
    fn empty_retrieval_still_produces_a_prompt() {
        let prompt = build_prompt("Why is the sky blue?", &[], 1_000);
        assert!(prompt.contains(NO_PASSAGES));
    }

    #[tokio::test]
    async fn generator_is_called_exactly_once() {
        let synthesizer = AnswerSynthesizer::new(RecordingGenerator::default());
        let answer = synthesizer
            .synthesize("What absorbs light?", &[retrieved(2, 1, "Chlorophyll absorbs light.")])
            .await
            .unwrap();

        assert_eq!(answer, "Chlorophyll absorbs light (page 2).");
        assert_eq!(synthesizer.generator().prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generator_failure_is_not_retried() {
        let synthesizer = AnswerSynthesizer::new(RecordingGenerator {
            fail: true,
            ..Default::default()
        });

        let error = synthesizer.synthesize("q", &[]).await.unwrap_err();

        assert!(matches!(error, ServiceError::BackendResponse { .. }));
        assert_eq!(synthesizer.generator().prompts.lock().unwrap().len(), 1);
    }
}
