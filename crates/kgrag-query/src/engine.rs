use std::sync::Arc;

use tracing::{debug, info, instrument};

use kgrag_core::error::{KgError, Result};
use kgrag_core::graph::GraphStore;
use kgrag_core::llm::{EmbeddingModel, LanguageModel};
use kgrag_core::query::QueryResponse;
use kgrag_extraction::KnowledgeGraphIndex;

use crate::keywords::DEFAULT_MAX_KEYWORDS;
use crate::retriever::{EmbeddingMode, HybridRetriever};
use crate::summarize::{TreeSummarizer, DEFAULT_CONTEXT_WINDOW};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Add the text of chunks mentioning matched entities to the context.
    pub include_text: bool,
    pub embedding_mode: EmbeddingMode,
    pub similarity_top_k: usize,
    /// Maximum hops followed from a matched entity.
    pub graph_store_query_depth: u32,
    /// Maximum relationship paths in the context.
    pub max_knowledge_sequence: usize,
    pub max_keywords: usize,
    /// Maximum keyword-matched chunks in the context.
    pub max_chunks_per_query: usize,
    /// Prompt size budget for answer synthesis, in characters.
    pub context_window: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            include_text: true,
            embedding_mode: EmbeddingMode::Hybrid,
            similarity_top_k: 5,
            graph_store_query_depth: 2,
            max_knowledge_sequence: 30,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            max_chunks_per_query: 10,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

// ---------------------------------------------------------------------------
// KgQueryEngine
// ---------------------------------------------------------------------------

/// Answers questions from a knowledge graph. Holds no per-query state, so
/// every call to [`KgQueryEngine::query`] is independent of earlier ones.
pub struct KgQueryEngine {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    embed_model: Arc<dyn EmbeddingModel>,
    options: QueryOptions,
}

impl KgQueryEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LanguageModel>,
        embed_model: Arc<dyn EmbeddingModel>,
        options: QueryOptions,
    ) -> Self {
        Self {
            store,
            llm,
            embed_model,
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    #[instrument(skip(self), fields(mode = %self.options.embedding_mode))]
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KgError::Query("question is empty".to_string()));
        }

        info!(question = %question, "Answering question");

        let source_nodes =
            HybridRetriever::new(&self.store, &self.llm, &self.embed_model, &self.options)
                .retrieve(question)
                .await?;

        debug!(nodes = source_nodes.len(), "Retrieved context");

        let texts: Vec<String> = source_nodes.iter().map(|n| n.text.clone()).collect();
        let answer = TreeSummarizer::new(self.llm.clone(), self.options.context_window)
            .summarize(question, &texts)
            .await?;

        info!(
            answer_len = answer.len(),
            sources = source_nodes.len(),
            "Question answered"
        );

        Ok(QueryResponse {
            answer,
            source_nodes,
        })
    }
}

/// Builds a query engine over an index, reusing the index's models and store.
pub trait AsQueryEngine {
    fn as_query_engine(&self, options: QueryOptions) -> KgQueryEngine;
}

impl AsQueryEngine for KnowledgeGraphIndex {
    fn as_query_engine(&self, options: QueryOptions) -> KgQueryEngine {
        KgQueryEngine::new(
            self.store().clone(),
            self.llm().clone(),
            self.embed_model().clone(),
            options,
        )
    }
}
