mod engine;
mod keywords;
mod retriever;
mod summarize;

pub use engine::{AsQueryEngine, KgQueryEngine, QueryOptions};
pub use keywords::{expand_with_subwords, parse_keywords, KeywordExtractor, DEFAULT_MAX_KEYWORDS};
pub use retriever::{EmbeddingMode, HybridRetriever, NO_RELATIONSHIPS_FOUND};
pub use summarize::{TreeSummarizer, DEFAULT_CONTEXT_WINDOW};
