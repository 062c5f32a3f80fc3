use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

const MAX_SLUG_CHARS: usize = 48;
const MAX_ID_CHARS: usize = 64;

/// Stable identifier for one uploaded document. Always a safe file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId(String);

impl TopicId {
    /// Same filename, same id: a re-upload overwrites the previous topic.
    pub fn from_filename(filename: &str) -> Self {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(filename);

        let mut slug = String::new();
        for ch in stem.to_lowercase().chars() {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                slug.push(ch);
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        let slug: String = slug.trim_matches('_').chars().take(MAX_SLUG_CHARS).collect();

        let mut hasher = Sha256::new();
        hasher.update(filename.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        if slug.is_empty() {
            Self(format!("topic-{}", &digest[..8]))
        } else {
            Self(format!("{slug}-{}", &digest[..8]))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_ID_CHARS
            && raw
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::InvalidTopicId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TopicId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TopicId> for String {
    fn from(value: TopicId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::TopicId;

    #[test]
    fn id_is_deterministic_per_filename() {
        let first = TopicId::from_filename("Biology Notes.pdf");
        let second = TopicId::from_filename("Biology Notes.pdf");
        let other = TopicId::from_filename("biology notes.pdf");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.as_str().starts_with("biology_notes-"));
    }

    #[test]
    fn derived_ids_always_parse() {
        for name in ["../../etc/passwd.pdf", "Ünïcode ☃.pdf", ".pdf", "a/b\\c.PDF"] {
            let id = TopicId::from_filename(name);
            assert_eq!(TopicId::parse(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn unsafe_ids_are_rejected() {
        let too_long = "x".repeat(65);
        for raw in ["", "../secret", "UPPER", "with space", too_long.as_str()] {
            assert!(TopicId::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
