use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use kgrag_core::error::Result;
use kgrag_core::graph::{ChunkRecord, GraphConnector, GraphStore, RelPath, ScoredChunk, Triplet};
use kgrag_core::similarity;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Edge {
    subject: String,
    label: String,
    object: String,
}

#[derive(Default)]
struct MemoryState {
    chunks: Vec<ChunkRecord>,
    /// Entity ids in first-seen order.
    entities: Vec<String>,
    entity_set: HashSet<String>,
    edges: Vec<Edge>,
    edge_set: HashSet<Edge>,
    mentions: HashMap<Uuid, HashSet<String>>,
}

impl MemoryState {
    fn add_entity(&mut self, id: &str) {
        if self.entity_set.insert(id.to_string()) {
            self.entities.push(id.to_string());
        }
    }

    fn add_edge(&mut self, edge: Edge) {
        if self.edge_set.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }

    fn matching_entities(&self, subjects: &[String]) -> Vec<&String> {
        let wanted: HashSet<String> = subjects.iter().map(|s| s.to_lowercase()).collect();
        self.entities
            .iter()
            .filter(|e| wanted.contains(&e.to_lowercase()))
            .collect()
    }

    /// Depth-first walk emitting every path of 1..=depth hops. An edge is used
    /// at most once per path, matching Cypher's variable-length semantics.
    fn walk(
        &self,
        root: &str,
        from: &str,
        depth: u32,
        path: &mut Vec<usize>,
        out: &mut Vec<RelPath>,
        limit: usize,
    ) {
        if depth == 0 {
            return;
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            if out.len() >= limit {
                return;
            }
            if edge.subject != from || path.contains(&idx) {
                continue;
            }
            path.push(idx);
            out.push(RelPath {
                subject: root.to_string(),
                hops: path
                    .iter()
                    .map(|&i| (self.edges[i].label.clone(), self.edges[i].object.clone()))
                    .collect(),
            });
            self.walk(root, &edge.object, depth - 1, path, out, limit);
            path.pop();
        }
    }
}

/// Process-local graph store. Holds everything behind one lock; contents are
/// lost when the process exits.
#[derive(Default, Clone)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.chunks.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn store_chunk(&self, chunk: &ChunkRecord, triplets: &[Triplet]) -> Result<()> {
        let mut state = self.state.write().await;

        match state.chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk.clone(),
            None => state.chunks.push(chunk.clone()),
        }

        for triplet in triplets {
            state.add_entity(&triplet.subject);
            state.add_entity(&triplet.object);
            state.add_edge(Edge {
                subject: triplet.subject.clone(),
                label: triplet.relation_label(),
                object: triplet.object.clone(),
            });
            let mentioned = state.mentions.entry(chunk.id).or_default();
            mentioned.insert(triplet.subject.clone());
            mentioned.insert(triplet.object.clone());
        }

        tracing::debug!(
            chunk_id = %chunk.id,
            triplets = triplets.len(),
            "Stored chunk in memory"
        );
        Ok(())
    }

    async fn get_rel_map(
        &self,
        subjects: &[String],
        depth: u32,
        limit: usize,
    ) -> Result<Vec<RelPath>> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for root in state.matching_entities(subjects) {
            if out.len() >= limit {
                break;
            }
            let mut path = Vec::new();
            state.walk(root, root, depth.max(1), &mut path, &mut out, limit);
        }
        Ok(out)
    }

    async fn chunks_mentioning(&self, subjects: &[String], limit: usize) -> Result<Vec<ChunkRecord>> {
        let state = self.state.read().await;
        let wanted: HashSet<String> = subjects.iter().map(|s| s.to_lowercase()).collect();

        Ok(state
            .chunks
            .iter()
            .filter(|chunk| {
                state
                    .mentions
                    .get(&chunk.id)
                    .map(|ents| ents.iter().any(|e| wanted.contains(&e.to_lowercase())))
                    .unwrap_or(false)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn similar_chunks(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        let candidates: Vec<&ChunkRecord> = state.chunks.iter().collect();

        Ok(
            similarity::top_k(embedding, candidates, top_k, |c| c.embedding.as_deref())
                .into_iter()
                .map(|(chunk, score)| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
                .collect(),
        )
    }

    async fn entity_count(&self) -> Result<u64> {
        Ok(self.state.read().await.entities.len() as u64)
    }

    async fn relationship_count(&self) -> Result<u64> {
        Ok(self.state.read().await.edges.len() as u64)
    }
}

/// Hands out a shared [`InMemoryGraphStore`]; every `connect` sees the same data.
#[derive(Default, Clone)]
pub struct InMemoryConnector {
    store: InMemoryGraphStore,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &InMemoryGraphStore {
        &self.store
    }
}

#[async_trait]
impl GraphConnector for InMemoryConnector {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn connect(&self) -> Result<Arc<dyn GraphStore>> {
        Ok(Arc::new(self.store.clone()))
    }
}
