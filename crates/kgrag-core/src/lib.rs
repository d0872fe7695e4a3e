pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod llm;
pub mod query;
pub mod similarity;

pub use config::AppConfig;
pub use document::{Document, DocumentLoader, DocumentMetadata};
pub use error::{KgError, Result};
pub use graph::{ChunkRecord, GraphConnector, GraphStore, RelPath, ScoredChunk, Triplet};
pub use llm::{EmbeddingModel, LanguageModel, Prompt, PromptKind};
pub use query::{QueryResponse, SourceNode};
