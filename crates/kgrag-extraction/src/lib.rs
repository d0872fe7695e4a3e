//! Turning documents into a knowledge graph: chunking, LLM triplet
//! extraction, optional chunk embeddings, and persistence into a graph store.

mod chunker;
mod index;
mod triplets;

pub use chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use index::{IndexOptions, IndexStats, KnowledgeGraphIndex};
pub use triplets::{
    parse_triplets, TripletExtractor, DEFAULT_MAX_TRIPLETS_PER_CHUNK, MAX_TRIPLET_MEMBER_LEN,
};
