use std::sync::Arc;

use kgrag_core::error::Result;
use kgrag_core::llm::{LanguageModel, Prompt, PromptKind};

/// Largest prompt handed to the model in one call, in characters.
pub const DEFAULT_CONTEXT_WINDOW: usize = 12_000;

/// Merge levels before the remaining partial answers are truncated to one pack.
const MAX_MERGE_LEVELS: usize = 3;

/// Context packs never shrink below this, however long the question.
const MIN_PACK_CHARS: usize = 256;

const SEPARATOR: &str = "\n\n";

const SUMMARIZE_TEMPLATE: &str = "Context information from multiple sources is below.
---------------------
{context}
---------------------
Given the information from multiple sources and not prior knowledge, answer the query.
Query: {query}
Answer: ";

/// Split `text` into pieces of at most `budget` characters.
fn split_chars(text: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(budget.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Greedily pack texts into strings of at most `budget` characters.
fn pack(texts: &[String], budget: usize) -> Vec<String> {
    let mut packs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let sep_len = SEPARATOR.chars().count();

    for text in texts {
        for piece in split_chars(text, budget) {
            let len = piece.chars().count();
            let needed = if current.is_empty() { len } else { len + sep_len };
            if !current.is_empty() && current_len + needed > budget {
                packs.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push_str(SEPARATOR);
                current_len += sep_len;
            }
            current.push_str(&piece);
            current_len += len;
        }
    }
    if !current.is_empty() {
        packs.push(current);
    }
    packs
}

/// Tree-summarize answer synthesis: one call when the context fits, otherwise
/// summarize each pack and merge the partial answers level by level.
pub struct TreeSummarizer {
    llm: Arc<dyn LanguageModel>,
    context_window: usize,
}

impl TreeSummarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, context_window: usize) -> Self {
        Self {
            llm,
            context_window,
        }
    }

    fn pack_budget(&self, query: &str) -> usize {
        let overhead = SUMMARIZE_TEMPLATE.chars().count() + query.chars().count();
        self.context_window
            .saturating_sub(overhead)
            .max(MIN_PACK_CHARS)
    }

    fn build_prompt(query: &str, context: &str) -> Prompt {
        let text = SUMMARIZE_TEMPLATE
            .replace("{context}", context)
            .replace("{query}", query);
        Prompt::new(PromptKind::Summarize, text)
    }

    async fn summarize_pack(&self, query: &str, context: &str) -> Result<String> {
        let answer = self
            .llm
            .complete(&Self::build_prompt(query, context))
            .await?;
        Ok(answer.trim().to_string())
    }

    pub async fn summarize(&self, query: &str, texts: &[String]) -> Result<String> {
        let budget = self.pack_budget(query);
        let mut current: Vec<String> = texts.to_vec();
        let mut level = 0;

        loop {
            let mut packs = pack(&current, budget);
            if packs.is_empty() {
                packs.push(String::new());
            }

            if packs.len() == 1 || level >= MAX_MERGE_LEVELS {
                if packs.len() > 1 {
                    tracing::warn!(
                        dropped = packs.len() - 1,
                        level = level,
                        "Partial answers still exceed the context window, truncating"
                    );
                }
                tracing::debug!(level = level, "Summarizing final pack");
                return self.summarize_pack(query, &packs[0]).await;
            }

            tracing::debug!(level = level, packs = packs.len(), "Summarizing packs");
            let mut partials = Vec::with_capacity(packs.len());
            for context in &packs {
                partials.push(self.summarize_pack(query, context).await?);
            }
            current = partials;
            level += 1;
        }
    }
}
