use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Relationship type used when a predicate has no usable characters.
pub const FALLBACK_RELATION: &str = "RELATED_TO";

/// A `(subject, predicate, object)` fact, stored as an edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Graph relationship type for the predicate: upper-case, words joined by `_`.
    pub fn relation_label(&self) -> String {
        relation_label(&self.predicate)
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

pub fn relation_label(predicate: &str) -> String {
    let mut label = String::with_capacity(predicate.len());
    for c in predicate.trim().chars() {
        if c.is_alphanumeric() {
            label.extend(c.to_uppercase());
        } else if !label.ends_with('_') && !label.is_empty() {
            label.push('_');
        }
    }
    let label = label.trim_end_matches('_').to_string();
    if label.is_empty() {
        FALLBACK_RELATION.to_string()
    } else {
        label
    }
}

/// A slice of a document as persisted in the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub doc_id: Uuid,
    pub source: String,
    pub position: usize,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// A walk from a matched entity through up to `depth` outgoing relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelPath {
    pub subject: String,
    /// `(relationship type, node reached)` per hop.
    pub hops: Vec<(String, String)>,
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)?;
        for (rel, object) in &self.hops {
            write!(f, " -[{rel}]-> {object}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Persist one chunk, its entities, its triplets and the chunk→entity
    /// mentions as a single unit of work.
    async fn store_chunk(&self, chunk: &ChunkRecord, triplets: &[Triplet]) -> Result<()>;

    /// Relationship paths starting at entities whose id matches one of
    /// `subjects`, compared case-insensitively.
    async fn get_rel_map(&self, subjects: &[String], depth: u32, limit: usize)
        -> Result<Vec<RelPath>>;

    /// Chunks that mention any of `subjects`, compared case-insensitively.
    async fn chunks_mentioning(&self, subjects: &[String], limit: usize)
        -> Result<Vec<ChunkRecord>>;

    /// The `top_k` embedded chunks closest to `embedding` by cosine similarity,
    /// best first.
    async fn similar_chunks(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    async fn entity_count(&self) -> Result<u64>;
    async fn relationship_count(&self) -> Result<u64>;
}

/// Opens a graph store. One attempt per call, no retries.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn connect(&self) -> Result<Arc<dyn GraphStore>>;
}
