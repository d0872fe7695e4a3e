use std::sync::Arc;

use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};
use tiktoken_rs::CoreBPE;

use kgrag_core::error::{KgError, Result};

/// Chunk budget in cl100k tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Counts cl100k_base tokens, the encoding used by the default sentence splitter.
#[derive(Clone)]
struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| KgError::Internal(format!("failed to load cl100k tokenizer: {e}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl ChunkSizer for TokenCounter {
    fn size(&self, chunk: &str) -> usize {
        self.count(chunk)
    }
}

/// Token-budget text splitter. Prefers paragraph, sentence and word
/// boundaries before cutting inside a word.
pub struct Chunker {
    splitter: TextSplitter<TokenCounter>,
    counter: TokenCounter,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(KgError::Config("chunk size must be > 0".to_string()));
        }
        let counter = TokenCounter::cl100k()?;
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| {
                KgError::Config(format!(
                    "invalid chunk overlap {chunk_overlap} for chunk size {chunk_size}: {e}"
                ))
            })?
            .with_sizer(counter.clone());

        Ok(Self {
            splitter: TextSplitter::new(config),
            counter,
        })
    }

    /// Non-blank chunks of `text`, in document order.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.splitter
            .chunks(text)
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    pub fn token_count(&self, text: &str) -> usize {
        self.counter.count(text)
    }
}
