use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which pipeline stage a prompt belongs to. Carried for logging and so that
/// substitute models can answer each stage differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    TripletExtraction,
    KeywordExtraction,
    Summarize,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::TripletExtraction => "triplet_extraction",
            PromptKind::KeywordExtraction => "keyword_extraction",
            PromptKind::Summarize => "summarize",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub kind: PromptKind,
    pub system: Option<String>,
    pub text: String,
}

impl Prompt {
    pub fn new(kind: PromptKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            system: None,
            text: text.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Remote text generation. Stateless: each call stands alone.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Remote text embedding into a fixed-length vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding for a search query. Models with asymmetric query/document
    /// encodings override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}
