#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kgrag_core::document::{Document, DocumentLoader};
use kgrag_core::error::{KgError, Result};
use kgrag_core::graph::{GraphConnector, GraphStore};
use kgrag_core::llm::{EmbeddingModel, LanguageModel, Prompt, PromptKind};
use kgrag_graph::InMemoryGraphStore;

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Answers every stage deterministically and counts calls per stage.
///
/// Triplet extraction always yields two triplets, keyword extraction yields
/// `alice, graph paper`, and summaries echo the query they were asked.
#[derive(Default)]
pub struct FakeLlm {
    calls: Mutex<HashMap<PromptKind, usize>>,
    fail_on: Option<PromptKind>,
}

impl FakeLlm {
    pub fn failing_on(kind: PromptKind) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: Some(kind),
        }
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.calls
            .lock()
            .expect("call counter poisoned")
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("call counter poisoned").values().sum()
    }
}

fn query_of(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Query: "))
        .unwrap_or("")
}

#[async_trait]
impl LanguageModel for FakeLlm {
    fn model_id(&self) -> &str {
        "fake-llm"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        *self
            .calls
            .lock()
            .expect("call counter poisoned")
            .entry(prompt.kind)
            .or_insert(0) += 1;

        if self.fail_on == Some(prompt.kind) {
            return Err(KgError::Model {
                model: "fake-llm".to_string(),
                message: format!("{} unavailable", prompt.kind.as_str()),
            });
        }

        Ok(match prompt.kind {
            PromptKind::TripletExtraction => {
                "(Alice, wrote, Graph Paper)\n(Graph Paper, published in, 2021)".to_string()
            }
            PromptKind::KeywordExtraction => "KEYWORDS: alice, graph paper".to_string(),
            PromptKind::Summarize => format!("Answer for: {}", query_of(&prompt.text)),
        })
    }
}

// ---------------------------------------------------------------------------
// Embedding model
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeEmbedder {
    pub documents: AtomicUsize,
    pub queries: AtomicUsize,
}

impl FakeEmbedder {
    pub fn document_calls(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    fn model_id(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.documents.fetch_add(1, Ordering::SeqCst);
        Ok(vec![text.len() as f32, 1.0])
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 1.0])
    }
}

/// Fails every document embedding with an I/O error, as a dropped socket would.
pub struct IoFailingEmbedder;

#[async_trait]
impl EmbeddingModel for IoFailingEmbedder {
    fn model_id(&self) -> &str {
        "io-failing-embedder"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(KgError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "embedding socket reset",
        )))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}

// ---------------------------------------------------------------------------
// Document loaders
// ---------------------------------------------------------------------------

pub struct StaticLoader(pub Vec<Document>);

#[async_trait]
impl DocumentLoader for StaticLoader {
    fn source(&self) -> String {
        "static".to_string()
    }

    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }
}

pub fn two_documents() -> Vec<Document> {
    vec![
        Document::from_text("alice.txt", "Alice wrote Graph Paper in 2021."),
        Document::from_text("bob.txt", "Bob reviewed Graph Paper for the journal."),
    ]
}

// ---------------------------------------------------------------------------
// Graph connectors
// ---------------------------------------------------------------------------

/// Hands out one shared in-memory store and counts connection attempts.
#[derive(Default, Clone)]
pub struct CountingConnector {
    pub store: InMemoryGraphStore,
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl GraphConnector for CountingConnector {
    fn backend(&self) -> &'static str {
        "Fake"
    }

    async fn connect(&self) -> Result<Arc<dyn GraphStore>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.store.clone()))
    }
}

pub struct UnreachableConnector;

#[async_trait]
impl GraphConnector for UnreachableConnector {
    fn backend(&self) -> &'static str {
        "Neo4j"
    }

    async fn connect(&self) -> Result<Arc<dyn GraphStore>> {
        Err(KgError::Graph(
            "Failed to connect to bolt://localhost:7687: connection refused".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Accepts `capacity` bytes, then fails every write with a broken pipe.
pub struct BrokenWriter {
    pub written: Vec<u8>,
    pub capacity: usize,
}

impl BrokenWriter {
    pub fn after(capacity: usize) -> Self {
        Self {
            written: Vec::new(),
            capacity,
        }
    }
}

impl io::Write for BrokenWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written.len() + buf.len() > self.capacity {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn output(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}
