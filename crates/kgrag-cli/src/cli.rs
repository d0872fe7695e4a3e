use std::path::PathBuf;

use clap::Parser;

use kgrag_extraction::{
    IndexOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TRIPLETS_PER_CHUNK,
};
use kgrag_graph::DEFAULT_DATABASE;
use kgrag_loader::DEFAULT_DATA_DIR;
use kgrag_query::{EmbeddingMode, QueryOptions};

use crate::pipeline::DEFAULT_QUESTIONS;

#[derive(Debug, Parser)]
#[command(name = "kgrag")]
#[command(about = "Build a knowledge graph from local documents and query it", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory to load documents from
    #[arg(long, env = "KGRAG_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Also load documents from subdirectories
    #[arg(long, env = "KGRAG_RECURSIVE")]
    pub recursive: bool,

    /// Question to ask (repeatable); defaults to the built-in pair
    #[arg(short, long = "question")]
    pub questions: Vec<String>,

    /// Chunk size in cl100k tokens
    #[arg(long, env = "KGRAG_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Tokens shared by neighbouring chunks
    #[arg(long, env = "KGRAG_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    #[arg(long, env = "KGRAG_MAX_TRIPLETS_PER_CHUNK", default_value_t = DEFAULT_MAX_TRIPLETS_PER_CHUNK)]
    pub max_triplets_per_chunk: usize,

    /// Do not embed chunks while indexing
    #[arg(long, env = "KGRAG_NO_EMBEDDINGS")]
    pub no_embeddings: bool,

    /// Retrieval mode: keyword, embedding or hybrid
    #[arg(long, env = "KGRAG_EMBEDDING_MODE", default_value_t = EmbeddingMode::Hybrid)]
    pub embedding_mode: EmbeddingMode,

    #[arg(long, env = "KGRAG_SIMILARITY_TOP_K", default_value_t = 5)]
    pub similarity_top_k: usize,

    /// Neo4j database name
    #[arg(long, env = "KGRAG_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Keep the graph in process memory instead of Neo4j
    #[arg(long, env = "KGRAG_MEMORY_GRAPH")]
    pub memory_graph: bool,

    /// Exit with status 1 when indexing or querying fails
    #[arg(long, env = "KGRAG_STRICT_EXIT")]
    pub strict_exit: bool,
}

impl Cli {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            max_triplets_per_chunk: self.max_triplets_per_chunk,
            include_embeddings: !self.no_embeddings,
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            embedding_mode: self.embedding_mode,
            similarity_top_k: self.similarity_top_k,
            ..QueryOptions::default()
        }
    }

    pub fn questions(&self) -> Vec<String> {
        if self.questions.is_empty() {
            DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
        } else {
            self.questions.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let cli = Cli::try_parse_from(["kgrag"]).unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("data/"));
        assert_eq!(cli.index_options(), IndexOptions::default());
        assert_eq!(cli.query_options(), QueryOptions::default());
        assert_eq!(cli.questions().len(), 2);
        assert_eq!(cli.database, "neo4j");
        assert!(!cli.strict_exit);
        assert!(!cli.memory_graph);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "kgrag",
            "--data-dir",
            "papers",
            "-q",
            "Who?",
            "--question",
            "What?",
            "--no-embeddings",
            "--embedding-mode",
            "keyword",
            "--max-triplets-per-chunk",
            "5",
            "--strict-exit",
        ])
        .unwrap();

        assert_eq!(cli.questions(), vec!["Who?", "What?"]);
        assert!(!cli.index_options().include_embeddings);
        assert_eq!(cli.index_options().max_triplets_per_chunk, 5);
        assert_eq!(cli.query_options().embedding_mode, EmbeddingMode::Keyword);
        assert!(cli.strict_exit);
    }

    #[test]
    fn test_unknown_embedding_mode_rejected() {
        assert!(Cli::try_parse_from(["kgrag", "--embedding-mode", "vector"]).is_err());
    }
}
