use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, DetachedRowStream, Graph, Row};
use tokio::sync::OnceCell;
use uuid::Uuid;

use kgrag_core::config::{
    require, AppConfig, ENV_NEO4J_PASSWORD, ENV_NEO4J_URI, ENV_NEO4J_USERNAME,
};
use kgrag_core::error::{KgError, Result};
use kgrag_core::graph::{ChunkRecord, GraphConnector, GraphStore, RelPath, ScoredChunk, Triplet};
use kgrag_core::similarity;

/// Timeout for all Neo4j operations (seconds).
const NEO4J_TIMEOUT_SECS: u64 = 30;

/// Database the connector targets when none is given explicitly.
pub const DEFAULT_DATABASE: &str = "neo4j";

const SCHEMA_STATEMENTS: [&str; 2] = [
    "CREATE CONSTRAINT kgrag_entity_id IF NOT EXISTS FOR (n:Entity) REQUIRE n.id IS UNIQUE",
    "CREATE CONSTRAINT kgrag_chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.id IS UNIQUE",
];

const VECTOR_INDEX: &str = "kgrag_chunk_embedding";

/// Chunks with the nearest embeddings according to the vector index.
const VECTOR_SEARCH_CYPHER: &str = "CALL db.index.vector.queryNodes($index, $k, $embedding) \
     YIELD node AS c, score \
     RETURN c.id AS id, c.doc_id AS doc_id, c.source AS source, \
            c.position AS position, c.text AS text, c.embedding AS embedding";

/// Every embedded chunk, for ranking on the client.
const EMBEDDING_SCAN_CYPHER: &str = "MATCH (c:Chunk) WHERE c.embedding IS NOT NULL \
     RETURN c.id AS id, c.doc_id AS doc_id, c.source AS source, \
            c.position AS position, c.text AS text, c.embedding AS embedding";

fn vector_index_statement(dimensions: usize) -> String {
    format!(
        "CREATE VECTOR INDEX {VECTOR_INDEX} IF NOT EXISTS \
         FOR (c:Chunk) ON (c.embedding) \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {dimensions}, \
         `vector.similarity_function`: 'cosine'}}}}"
    )
}

pub struct Neo4jGraphStore {
    graph: Graph,
    /// Whether the chunk vector index exists, settled on first use.
    vector_index: OnceCell<bool>,
}

/// A source of rows that can fail part way through.
#[async_trait]
trait RowSource: Send {
    type Item: Send;

    async fn next_row(&mut self) -> std::result::Result<Option<Self::Item>, String>;
}

#[async_trait]
impl RowSource for DetachedRowStream {
    type Item = Row;

    async fn next_row(&mut self) -> std::result::Result<Option<Row>, String> {
        self.next().await.map_err(|e| e.to_string())
    }
}

/// Read a result stream to the end. A failure mid-stream is an error, not a
/// short result.
async fn drain_rows<S: RowSource>(stream: &mut S, what: &str) -> Result<Vec<S::Item>> {
    let mut rows = Vec::new();
    loop {
        match timed(stream.next_row()).await? {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => return Ok(rows),
            Err(e) => {
                tracing::warn!(what, read = rows.len(), error = %e, "Neo4j result stream failed");
                return Err(KgError::Graph(format!(
                    "Failed reading {what} after {} rows: {e}",
                    rows.len()
                )));
            }
        }
    }
}

fn chunks_from_rows(rows: Vec<Row>) -> Vec<ChunkRecord> {
    rows.iter()
        .filter_map(|row| match chunk_from_row(row) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed chunk row");
                None
            }
        })
        .collect()
}

/// Wrap any async operation with a timeout, converting timeout to KgError::Graph.
async fn timed<T, F: Future<Output = T>>(op: F) -> std::result::Result<T, KgError> {
    tokio::time::timeout(std::time::Duration::from_secs(NEO4J_TIMEOUT_SECS), op)
        .await
        .map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS);
            KgError::Graph(format!(
                "Neo4j operation timed out after {}s",
                NEO4J_TIMEOUT_SECS
            ))
        })
}

fn lowered(subjects: &[String]) -> Vec<String> {
    subjects.iter().map(|s| s.to_lowercase()).collect()
}

/// Backtick-quote a relationship type so predicates can never break out of the query.
fn quoted_label(triplet: &Triplet) -> String {
    format!("`{}`", triplet.relation_label().replace('`', ""))
}

fn rel_path_from_parts(subject: String, rels: Vec<String>, objects: Vec<String>) -> RelPath {
    RelPath {
        subject,
        hops: rels.into_iter().zip(objects).collect(),
    }
}

fn chunk_from_row(row: &Row) -> Result<ChunkRecord> {
    let field = |name: &str| -> Result<String> {
        row.get::<String>(name)
            .map_err(|e| KgError::Graph(format!("Missing {name} on chunk row: {e}")))
    };
    let parse_id = |name: &str| -> Result<Uuid> {
        let raw = field(name)?;
        Uuid::parse_str(&raw).map_err(|e| KgError::Graph(format!("Invalid UUID {raw}: {e}")))
    };

    let position: i64 = row.get("position").unwrap_or(0);
    let embedding: Option<Vec<f32>> = row
        .get::<Vec<f64>>("embedding")
        .ok()
        .map(|v| v.into_iter().map(|x| x as f32).collect());

    Ok(ChunkRecord {
        id: parse_id("id")?,
        doc_id: parse_id("doc_id")?,
        source: field("source").unwrap_or_default(),
        position: position.max(0) as usize,
        text: field("text")?,
        embedding,
    })
}

impl Neo4jGraphStore {
    /// Connect once, verify the connection with a round trip, and ensure the
    /// uniqueness constraints exist.
    pub async fn connect(uri: &str, user: &str, password: &str, database: &str) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .db(database)
            .build()
            .map_err(|e| KgError::Graph(format!("Invalid Neo4j configuration: {e}")))?;

        let graph = timed(Graph::connect(config))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to connect to {uri}: {e}")))?;

        timed(graph.run(query("RETURN 1")))
            .await?
            .map_err(|e| KgError::Graph(format!("Neo4j at {uri} did not answer: {e}")))?;

        tracing::info!(uri = %uri, database = %database, "Connected to Neo4j");

        let store = Self {
            graph,
            vector_index: OnceCell::new(),
        };
        store.ensure_schema().await;
        Ok(store)
    }

    async fn ensure_schema(&self) {
        for statement in SCHEMA_STATEMENTS {
            match timed(self.graph.run(query(statement))).await {
                Ok(Ok(())) => tracing::debug!(statement, "Ensured schema constraint"),
                Ok(Err(e)) => {
                    tracing::warn!(statement, error = %e, "Could not create schema constraint")
                }
                Err(e) => tracing::warn!(statement, error = %e, "Schema constraint timed out"),
            }
        }
    }

    /// Create the chunk vector index once per store. Servers without vector
    /// index support leave similarity search on the client-side scan.
    async fn ensure_vector_index(&self, dimensions: usize) -> bool {
        *self
            .vector_index
            .get_or_init(|| async {
                let statement = vector_index_statement(dimensions);
                match timed(self.graph.run(query(&statement))).await {
                    Ok(Ok(())) => {
                        tracing::debug!(index = VECTOR_INDEX, dimensions, "Ensured vector index");
                        true
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(index = VECTOR_INDEX, error = %e, "Could not create vector index");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(index = VECTOR_INDEX, error = %e, "Vector index creation timed out");
                        false
                    }
                }
            })
            .await
    }

    async fn fetch_chunks(&self, q: neo4rs::Query, what: &str) -> Result<Vec<ChunkRecord>> {
        let mut stream = timed(self.graph.execute(q))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to fetch {what}: {e}")))?;
        let rows = drain_rows(&mut stream, what).await?;
        Ok(chunks_from_rows(rows))
    }

    async fn count(&self, cypher: &str, what: &str) -> Result<u64> {
        let mut stream = timed(self.graph.execute(query(cypher)))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to count {what}: {e}")))?;

        match stream.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| KgError::Graph(format!("Failed to get count: {e}")))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(KgError::Graph(format!("Error counting {what}: {e}"))),
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn store_chunk(&self, chunk: &ChunkRecord, triplets: &[Triplet]) -> Result<()> {
        // Schema changes must not run inside the write transaction below.
        if let Some(embedding) = &chunk.embedding {
            self.ensure_vector_index(embedding.len()).await;
        }

        let mut txn = timed(self.graph.start_txn())
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to start transaction: {e}")))?;

        let chunk_cypher = if chunk.embedding.is_some() {
            "MERGE (c:Chunk {id: $id}) \
             SET c.doc_id = $doc_id, c.source = $source, c.position = $position, \
                 c.text = $text, c.embedding = $embedding"
        } else {
            "MERGE (c:Chunk {id: $id}) \
             SET c.doc_id = $doc_id, c.source = $source, c.position = $position, \
                 c.text = $text \
             REMOVE c.embedding"
        };

        let mut q = query(chunk_cypher)
            .param("id", chunk.id.to_string())
            .param("doc_id", chunk.doc_id.to_string())
            .param("source", chunk.source.clone())
            .param("position", chunk.position as i64)
            .param("text", chunk.text.clone());
        if let Some(embedding) = &chunk.embedding {
            let as_f64: Vec<f64> = embedding.iter().map(|x| f64::from(*x)).collect();
            q = q.param("embedding", as_f64);
        }

        txn.run(q)
            .await
            .map_err(|e| KgError::Graph(format!("Failed to store chunk {}: {e}", chunk.id)))?;

        for triplet in triplets {
            let cypher = format!(
                "MERGE (s:Entity {{id: $subject}}) ON CREATE SET s.name_lower = toLower($subject) \
                 MERGE (o:Entity {{id: $object}}) ON CREATE SET o.name_lower = toLower($object) \
                 MERGE (s)-[:{}]->(o) \
                 WITH s, o \
                 MATCH (c:Chunk {{id: $chunk_id}}) \
                 MERGE (c)-[:MENTIONS]->(s) \
                 MERGE (c)-[:MENTIONS]->(o)",
                quoted_label(triplet)
            );

            let q = query(&cypher)
                .param("subject", triplet.subject.clone())
                .param("object", triplet.object.clone())
                .param("chunk_id", chunk.id.to_string());

            txn.run(q)
                .await
                .map_err(|e| KgError::Graph(format!("Failed to store triplet {triplet}: {e}")))?;

            tracing::debug!(
                chunk_id = %chunk.id,
                subject = %triplet.subject,
                relation = %triplet.relation_label(),
                object = %triplet.object,
                "Stored triplet"
            );
        }

        txn.commit()
            .await
            .map_err(|e| KgError::Graph(format!("Failed to commit transaction: {e}")))?;

        tracing::debug!(
            chunk_id = %chunk.id,
            triplets = triplets.len(),
            embedded = chunk.embedding.is_some(),
            "Stored chunk"
        );

        Ok(())
    }

    async fn get_rel_map(
        &self,
        subjects: &[String],
        depth: u32,
        limit: usize,
    ) -> Result<Vec<RelPath>> {
        if subjects.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let cypher = format!(
            "MATCH p = (n1:Entity)-[*1..{}]->(m:Entity) \
             WHERE n1.name_lower IN $subjects \
             RETURN n1.id AS subject, \
                    [r IN relationships(p) | type(r)] AS rels, \
                    [n IN tail(nodes(p)) | n.id] AS objects \
             LIMIT $limit",
            depth.max(1)
        );
        let q = query(&cypher)
            .param("subjects", lowered(subjects))
            .param("limit", limit as i64);

        let mut stream = timed(self.graph.execute(q))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to fetch relationship map: {e}")))?;

        let rows = drain_rows(&mut stream, "relationship map").await?;
        let mut paths = Vec::new();
        for row in rows {
            let subject: String = match row.get("subject") {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping relationship row without subject");
                    continue;
                }
            };
            let rels: Vec<String> = row.get("rels").unwrap_or_default();
            let objects: Vec<String> = row.get("objects").unwrap_or_default();
            paths.push(rel_path_from_parts(subject, rels, objects));
        }

        tracing::debug!(
            subjects = subjects.len(),
            depth = depth,
            paths = paths.len(),
            "Fetched relationship map"
        );

        Ok(paths)
    }

    async fn chunks_mentioning(&self, subjects: &[String], limit: usize) -> Result<Vec<ChunkRecord>> {
        if subjects.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let q = query(
            "MATCH (c:Chunk)-[:MENTIONS]->(e:Entity) \
             WHERE e.name_lower IN $subjects \
             WITH DISTINCT c \
             RETURN c.id AS id, c.doc_id AS doc_id, c.source AS source, \
                    c.position AS position, c.text AS text \
             ORDER BY doc_id, position \
             LIMIT $limit",
        )
        .param("subjects", lowered(subjects))
        .param("limit", limit as i64);

        self.fetch_chunks(q, "chunks").await
    }

    async fn similar_chunks(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = None;
        if self.ensure_vector_index(embedding.len()).await {
            let as_f64: Vec<f64> = embedding.iter().map(|x| f64::from(*x)).collect();
            let q = query(VECTOR_SEARCH_CYPHER)
                .param("index", VECTOR_INDEX)
                .param("k", top_k as i64)
                .param("embedding", as_f64);
            match self.fetch_chunks(q, "nearest chunks").await {
                Ok(found) => candidates = Some(found),
                Err(e) => {
                    tracing::warn!(error = %e, "Vector index search failed, scanning embeddings")
                }
            }
        }
        let candidates = match candidates {
            Some(found) => found,
            None => {
                self.fetch_chunks(query(EMBEDDING_SCAN_CYPHER), "chunk embeddings")
                    .await?
            }
        };

        // Scores are recomputed as plain cosine; the index reports (1 + cos) / 2.
        let considered = candidates.len();
        let ranked: Vec<ScoredChunk> =
            similarity::top_k(embedding, candidates, top_k, |c| c.embedding.as_deref())
                .into_iter()
                .map(|(chunk, score)| ScoredChunk { chunk, score })
                .collect();

        tracing::debug!(
            considered = considered,
            returned = ranked.len(),
            "Ranked chunks by embedding similarity"
        );

        Ok(ranked)
    }

    async fn entity_count(&self) -> Result<u64> {
        self.count("MATCH (n:Entity) RETURN count(n) AS cnt", "entities")
            .await
    }

    async fn relationship_count(&self) -> Result<u64> {
        self.count(
            "MATCH (:Entity)-[r]->(:Entity) RETURN count(r) AS cnt",
            "relationships",
        )
        .await
    }
}

/// Connection settings for [`Neo4jGraphStore`], resolved lazily from [`AppConfig`]
/// so missing variables surface when connecting.
#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: String,
}

impl Neo4jConnector {
    pub fn from_config(config: &AppConfig, database: impl Into<String>) -> Self {
        Self {
            uri: config.neo4j_uri.clone(),
            user: config.neo4j_username.clone(),
            password: config.neo4j_password.clone(),
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    fn backend(&self) -> &'static str {
        "Neo4j"
    }

    async fn connect(&self) -> Result<Arc<dyn GraphStore>> {
        let uri = require(&self.uri, ENV_NEO4J_URI)?;
        let user = require(&self.user, ENV_NEO4J_USERNAME)?;
        let password = require(&self.password, ENV_NEO4J_PASSWORD)?;

        let store = Neo4jGraphStore::connect(uri, user, password, &self.database).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_label_strips_backticks() {
        let t = Triplet::new("a", "is`) DETACH DELETE (n", "b");
        let label = quoted_label(&t);
        assert!(label.starts_with('`') && label.ends_with('`'));
        assert_eq!(label.matches('`').count(), 2);
    }

    #[test]
    fn test_rel_path_from_parts_zips_hops() {
        let path = rel_path_from_parts(
            "Alice".into(),
            vec!["WROTE".into(), "CITES".into()],
            vec!["Paper A".into(), "Paper B".into()],
        );
        assert_eq!(path.to_string(), "Alice -[WROTE]-> Paper A -[CITES]-> Paper B");
    }

    #[test]
    fn test_lowered_subjects() {
        assert_eq!(
            lowered(&["Alice".to_string(), "GRAPH".to_string()]),
            vec!["alice", "graph"]
        );
    }

    struct ScriptedRows {
        rows: Vec<std::result::Result<Option<u32>, String>>,
    }

    #[async_trait]
    impl RowSource for ScriptedRows {
        type Item = u32;

        async fn next_row(&mut self) -> std::result::Result<Option<u32>, String> {
            if self.rows.is_empty() {
                Ok(None)
            } else {
                self.rows.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_drain_rows_reads_to_end() {
        let mut stream = ScriptedRows {
            rows: vec![Ok(Some(1)), Ok(Some(2)), Ok(None), Ok(Some(3))],
        };
        assert_eq!(drain_rows(&mut stream, "numbers").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_drain_rows_surfaces_mid_stream_failure() {
        let mut stream = ScriptedRows {
            rows: vec![Ok(Some(1)), Err("connection reset".to_string()), Ok(Some(2))],
        };
        let err = drain_rows(&mut stream, "chunks").await.unwrap_err();
        assert!(matches!(err, KgError::Graph(_)));
        let message = err.to_string();
        assert!(message.contains("after 1 rows"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn test_vector_index_statement() {
        let statement = vector_index_statement(1536);
        assert!(statement.starts_with("CREATE VECTOR INDEX kgrag_chunk_embedding IF NOT EXISTS"));
        assert!(statement.contains("`vector.dimensions`: 1536"));
        assert!(statement.contains("'cosine'"));
        assert!(VECTOR_SEARCH_CYPHER.contains("db.index.vector.queryNodes"));
    }

    #[tokio::test]
    async fn test_connector_requires_uri() {
        let connector = Neo4jConnector::from_config(&AppConfig::default(), DEFAULT_DATABASE);
        let err = connector.connect().await.err().unwrap();
        assert!(err.to_string().contains("NEO4J_URI"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Neo4j instance
    async fn test_store_and_query_roundtrip() {
        let config = AppConfig::from_env();
        let store = Neo4jConnector::from_config(&config, DEFAULT_DATABASE)
            .connect()
            .await
            .unwrap();

        let chunk = ChunkRecord {
            id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
            source: "test".into(),
            position: 0,
            text: "Ada Lovelace wrote the first program.".into(),
            embedding: Some(vec![1.0, 0.0]),
        };
        store
            .store_chunk(&chunk, &[Triplet::new("Ada Lovelace", "wrote", "first program")])
            .await
            .unwrap();

        let paths = store
            .get_rel_map(&["ada lovelace".to_string()], 2, 30)
            .await
            .unwrap();
        assert!(paths.iter().any(|p| p.to_string().contains("WROTE")));

        let nearest = store.similar_chunks(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(nearest.len(), 1);
        assert!(nearest[0].score > 0.99);
    }
}
