use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_path: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_size: u64,
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            metadata,
        }
    }

    /// Shorthand for tests and in-memory sources that have no backing file.
    pub fn from_text(name: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(
            content.clone(),
            DocumentMetadata {
                file_path: name.to_string(),
                file_name: name.to_string(),
                file_type: None,
                file_size: content.len() as u64,
                last_modified_date: None,
            },
        )
    }
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Human-readable description of where documents come from, for logs.
    fn source(&self) -> String;

    /// Read every document. Any failure aborts the whole load.
    async fn load(&self) -> Result<Vec<Document>>;
}
