use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kgrag_core::error::{KgError, Result};
use kgrag_core::graph::{GraphStore, RelPath};
use kgrag_core::llm::{EmbeddingModel, LanguageModel};
use kgrag_core::query::SourceNode;

use crate::engine::QueryOptions;
use crate::keywords::KeywordExtractor;

/// Text of the single context node used when retrieval finds nothing.
pub const NO_RELATIONSHIPS_FOUND: &str = "No relationships found.";

/// Which retrieval branches run for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// Keyword lookup in the graph only.
    Keyword,
    /// Embedding similarity over chunks only.
    Embedding,
    #[default]
    Hybrid,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingMode::Keyword => "keyword",
            EmbeddingMode::Embedding => "embedding",
            EmbeddingMode::Hybrid => "hybrid",
        }
    }

    pub fn uses_keywords(&self) -> bool {
        matches!(self, EmbeddingMode::Keyword | EmbeddingMode::Hybrid)
    }

    pub fn uses_embeddings(&self) -> bool {
        matches!(self, EmbeddingMode::Embedding | EmbeddingMode::Hybrid)
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingMode {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(EmbeddingMode::Keyword),
            "embedding" => Ok(EmbeddingMode::Embedding),
            "hybrid" => Ok(EmbeddingMode::Hybrid),
            other => Err(KgError::Config(format!(
                "unknown embedding mode '{other}' (expected keyword, embedding or hybrid)"
            ))),
        }
    }
}

fn knowledge_sequence_text(paths: &[RelPath], depth: u32) -> String {
    let mut text = format!(
        "The following are knowledge sequence in max depth {depth} \
         in the form of `subject -[RELATION]-> object`:\n"
    );
    for path in paths {
        text.push_str(&path.to_string());
        text.push('\n');
    }
    text
}

/// Collects context for one question from the graph store.
pub struct HybridRetriever<'a> {
    store: &'a Arc<dyn GraphStore>,
    llm: &'a Arc<dyn LanguageModel>,
    embed_model: &'a Arc<dyn EmbeddingModel>,
    options: &'a QueryOptions,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(
        store: &'a Arc<dyn GraphStore>,
        llm: &'a Arc<dyn LanguageModel>,
        embed_model: &'a Arc<dyn EmbeddingModel>,
        options: &'a QueryOptions,
    ) -> Self {
        Self {
            store,
            llm,
            embed_model,
            options,
        }
    }

    /// Similarity hits first, then keyword-matched chunks, then one node with
    /// the relationship paths. Never empty.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SourceNode>> {
        let mode = self.options.embedding_mode;
        let mut nodes: Vec<SourceNode> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();

        // ------------------------------------------------------------
        // Embedding branch
        // ------------------------------------------------------------
        if mode.uses_embeddings() && self.options.similarity_top_k > 0 {
            let query_embedding = self.embed_model.embed_query(question).await?;
            let hits = self
                .store
                .similar_chunks(&query_embedding, self.options.similarity_top_k)
                .await?;

            tracing::debug!(hits = hits.len(), "Embedding retrieval complete");

            for hit in hits {
                if seen.insert(hit.chunk.id) {
                    nodes.push(SourceNode {
                        chunk_id: Some(hit.chunk.id),
                        text: hit.chunk.text,
                        score: Some(hit.score),
                    });
                }
            }
        }

        // ------------------------------------------------------------
        // Keyword / graph branch
        // ------------------------------------------------------------
        let mut paths = Vec::new();
        if mode.uses_keywords() {
            let keywords = KeywordExtractor::new(self.llm.clone(), self.options.max_keywords)
                .extract(question)
                .await?;

            if !keywords.is_empty() {
                paths = self
                    .store
                    .get_rel_map(
                        &keywords,
                        self.options.graph_store_query_depth,
                        self.options.max_knowledge_sequence,
                    )
                    .await?;

                if self.options.include_text {
                    let chunks = self
                        .store
                        .chunks_mentioning(&keywords, self.options.max_chunks_per_query)
                        .await?;
                    for chunk in chunks {
                        if seen.insert(chunk.id) {
                            nodes.push(SourceNode {
                                chunk_id: Some(chunk.id),
                                text: chunk.text,
                                score: None,
                            });
                        }
                    }
                }
            }

            tracing::debug!(
                keywords = keywords.len(),
                paths = paths.len(),
                "Keyword retrieval complete"
            );
        }

        if !paths.is_empty() {
            nodes.push(SourceNode {
                chunk_id: None,
                text: knowledge_sequence_text(&paths, self.options.graph_store_query_depth),
                score: None,
            });
        }

        if nodes.is_empty() {
            tracing::info!(question = %question, "No context retrieved for question");
            nodes.push(SourceNode {
                chunk_id: None,
                text: NO_RELATIONSHIPS_FOUND.to_string(),
                score: None,
            });
        }

        Ok(nodes)
    }
}
