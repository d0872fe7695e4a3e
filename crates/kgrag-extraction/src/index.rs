use std::sync::Arc;

use uuid::Uuid;

use kgrag_core::document::Document;
use kgrag_core::error::Result;
use kgrag_core::graph::{ChunkRecord, GraphStore};
use kgrag_core::llm::{EmbeddingModel, LanguageModel};

use crate::chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::triplets::{TripletExtractor, DEFAULT_MAX_TRIPLETS_PER_CHUNK};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_triplets_per_chunk: usize,
    /// Embed every chunk and store the vector alongside it.
    pub include_embeddings: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_triplets_per_chunk: DEFAULT_MAX_TRIPLETS_PER_CHUNK,
            include_embeddings: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub triplets: usize,
    pub embeddings: usize,
}

/// A knowledge graph built from documents and held in a [`GraphStore`],
/// together with the models that built it so queries can reuse them.
pub struct KnowledgeGraphIndex {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    embed_model: Arc<dyn EmbeddingModel>,
    stats: IndexStats,
}

impl KnowledgeGraphIndex {
    /// Chunk, extract and persist every document, one chunk at a time.
    ///
    /// Each chunk is written as soon as it is processed, so a failure part-way
    /// leaves the chunks before it in the store. The first error aborts the build.
    pub async fn from_documents(
        documents: &[Document],
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LanguageModel>,
        embed_model: Arc<dyn EmbeddingModel>,
        options: &IndexOptions,
    ) -> Result<Self> {
        let chunker = Chunker::new(options.chunk_size, options.chunk_overlap)?;
        let extractor = TripletExtractor::new(llm.clone(), options.max_triplets_per_chunk);

        tracing::info!(
            documents = documents.len(),
            backend = store.backend(),
            chunk_size = options.chunk_size,
            max_triplets_per_chunk = options.max_triplets_per_chunk,
            include_embeddings = options.include_embeddings,
            "Building knowledge graph index"
        );

        let mut stats = IndexStats {
            documents: documents.len(),
            ..IndexStats::default()
        };

        for document in documents {
            let pieces = chunker.split(&document.content);
            tracing::debug!(
                doc_id = %document.id,
                file = %document.metadata.file_name,
                chunks = pieces.len(),
                "Chunked document"
            );

            for (position, text) in pieces.into_iter().enumerate() {
                let triplets = extractor.extract(text).await?;

                let embedding = if options.include_embeddings {
                    Some(embed_model.embed(text).await?)
                } else {
                    None
                };

                let chunk = ChunkRecord {
                    id: Uuid::new_v4(),
                    doc_id: document.id,
                    source: document.metadata.file_name.clone(),
                    position,
                    text: text.to_string(),
                    embedding,
                };
                store.store_chunk(&chunk, &triplets).await?;

                stats.chunks += 1;
                stats.triplets += triplets.len();
                if chunk.embedding.is_some() {
                    stats.embeddings += 1;
                }
            }
        }

        tracing::info!(
            documents = stats.documents,
            chunks = stats.chunks,
            triplets = stats.triplets,
            embeddings = stats.embeddings,
            "Knowledge graph index built"
        );

        Ok(Self {
            store,
            llm,
            embed_model,
            stats,
        })
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    pub fn embed_model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embed_model
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kgrag_core::document::DocumentMetadata;
    use kgrag_core::error::KgError;
    use kgrag_core::llm::Prompt;
    use kgrag_graph::InMemoryGraphStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLlm;

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            Ok("(Alice, wrote, Graph Paper)\n(Bob, reviewed, Graph Paper)\n(Carol, edited, Graph Paper)"
                .to_string())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LanguageModel for FailingLlm {
        fn model_id(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            Err(KgError::Model {
                model: "failing".into(),
                message: "throttled".into(),
            })
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingModel for CountingEmbedder {
        fn model_id(&self) -> &str {
            "counting"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.5, 0.5])
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("Alice wrote Graph Paper.", DocumentMetadata::default()),
            Document::new("Bob reviewed it.", DocumentMetadata::default()),
        ]
    }

    #[tokio::test]
    async fn test_build_caps_triplets_and_embeds_each_chunk() {
        let store = Arc::new(InMemoryGraphStore::new());
        let embedder = Arc::new(CountingEmbedder::default());

        let index = KnowledgeGraphIndex::from_documents(
            &docs(),
            store.clone(),
            Arc::new(ScriptedLlm),
            embedder.clone(),
            &IndexOptions::default(),
        )
        .await
        .unwrap();

        let stats = index.stats();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.triplets, 4);
        assert_eq!(stats.embeddings, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        // Carol's triplet is beyond the per-chunk cap.
        assert_eq!(store.entity_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_build_without_embeddings_never_embeds() {
        let embedder = Arc::new(CountingEmbedder::default());
        let options = IndexOptions {
            include_embeddings: false,
            ..IndexOptions::default()
        };

        let index = KnowledgeGraphIndex::from_documents(
            &docs(),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(ScriptedLlm),
            embedder.clone(),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(index.stats().embeddings, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_build_propagates_model_failure() {
        let result = KnowledgeGraphIndex::from_documents(
            &docs(),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(FailingLlm),
            Arc::new(CountingEmbedder::default()),
            &IndexOptions::default(),
        )
        .await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("throttled"));
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let index = KnowledgeGraphIndex::from_documents(
            &[],
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(ScriptedLlm),
            Arc::new(CountingEmbedder::default()),
            &IndexOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(index.stats(), IndexStats::default());
    }
}
