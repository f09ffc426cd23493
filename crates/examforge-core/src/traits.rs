//! Collaborator traits: LLM generation backends, exam persistence and
//! document storage.
//!
//! Backends are implemented in `examforge-providers`; stores in
//! `examforge-store`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Exam, ExamRecord};

// ---------------------------------------------------------------------------
// Generation backend
// ---------------------------------------------------------------------------

/// An LLM vendor API that turns prompts into text.
///
/// Failures should be typed as [`crate::error::ProviderError`] wherever the
/// backend can tell quota and unknown-model failures apart; the model
/// resolver classifies everything else by its message.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Human-readable backend name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Number of credentials the backend rotates through.
    fn credential_count(&self) -> usize {
        1
    }

    /// Generate text with one specific model.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// Enumerate the model identities the vendor currently serves.
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>>;
}

/// Request to generate text from one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier without vendor prefix (e.g. "gemini-2.5-flash").
    pub model: String,
    /// The full prompt.
    pub prompt: String,
    /// Binary documents sent inline with the prompt.
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            attachments: Vec::new(),
        }
    }
}

/// A document attached to a generation request.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Response from a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response text.
    pub text: String,
    /// Model that produced the response.
    pub model: String,
    /// 0-based index of the credential that succeeded, if the backend
    /// rotates credentials.
    #[serde(default)]
    pub credential_index: Option<usize>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Coarse model modality as reported by the vendor listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Speech,
    Embedding,
    Robotics,
    Other,
}

impl Modality {
    /// Guess the modality from a model id and display name.
    pub fn infer(id: &str, display_name: &str) -> Self {
        let haystack = format!("{id} {display_name}").to_lowercase();
        if haystack.contains("embedding") || haystack.contains("aqa") {
            Modality::Embedding
        } else if haystack.contains("tts") || haystack.contains("speech") || haystack.contains("audio")
        {
            Modality::Speech
        } else if haystack.contains("robotics") {
            Modality::Robotics
        } else if haystack.contains("imagen") || haystack.contains("image-generation") {
            Modality::Image
        } else {
            Modality::Text
        }
    }

    /// Modalities that can never produce an exam paper or report.
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            Modality::Speech | Modality::Embedding | Modality::Robotics
        )
    }
}

/// One model identity from the vendor listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier. May carry a "models/" prefix.
    pub id: String,
    /// Whether the model supports content generation.
    pub supports_generation: bool,
    pub modality: Modality,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Transactional store for exam aggregates.
///
/// Writers are serialized per exam through `commit`, which succeeds only when
/// the record's `version` still matches the stored one.
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Persist a new exam. Fails if the id already exists.
    async fn insert(&self, record: ExamRecord) -> Result<()>;

    /// Load an exam aggregate, or `NotFound`.
    async fn load(&self, exam_id: Uuid) -> Result<ExamRecord>;

    /// Compare-and-swap commit. Returns the stored record with its bumped
    /// version, or `Conflict` if another writer committed first.
    async fn commit(&self, record: ExamRecord) -> Result<ExamRecord>;

    /// Delete an exam with its questions, answers and file rows. Returns the
    /// deleted record, if any.
    async fn delete(&self, exam_id: Uuid) -> Result<Option<ExamRecord>>;

    /// All exams, newest first.
    async fn list(&self) -> Result<Vec<Exam>>;
}

/// Document storage keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a name derived from `suggested_name`; returns the
    /// storage path.
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    async fn remove(&self, path: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_inference() {
        assert_eq!(
            Modality::infer("models/text-embedding-004", "Text Embedding 004"),
            Modality::Embedding
        );
        assert_eq!(
            Modality::infer("models/gemini-2.5-flash-preview-tts", ""),
            Modality::Speech
        );
        assert_eq!(
            Modality::infer("models/gemini-robotics-er-1.5-preview", ""),
            Modality::Robotics
        );
        assert_eq!(
            Modality::infer("models/gemini-2.5-pro", "Gemini 2.5 Pro"),
            Modality::Text
        );
        assert!(Modality::Speech.is_excluded());
        assert!(!Modality::Image.is_excluded());
    }
}
