use std::sync::Arc;

use kgrag_core::error::Result;
use kgrag_core::graph::Triplet;
use kgrag_core::llm::{LanguageModel, Prompt, PromptKind};

pub const DEFAULT_MAX_TRIPLETS_PER_CHUNK: usize = 2;

/// Longest accepted subject, predicate or object, in bytes.
pub const MAX_TRIPLET_MEMBER_LEN: usize = 128;

const TRIPLET_PROMPT: &str = "Some text is provided below. Given the text, extract up to \
{max_triplets} knowledge triplets in the form of (subject, predicate, object). Avoid stopwords.
---------------------
Example:
Text: Alice is Bob's mother.
Triplets:
(Alice, is mother of, Bob)
Text: Philz is a coffee shop founded in Berkeley in 1982.
Triplets:
(Philz, is, coffee shop)
(Philz, founded in, Berkeley)
(Philz, founded in, 1982)
---------------------
Text: {text}
Triplets:
";

fn clean_member(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if cleaned.is_empty() || cleaned.len() > MAX_TRIPLET_MEMBER_LEN {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Parse `(subject, predicate, object)` lines from a model response.
///
/// Lines without parentheses, with a member count other than three, or with
/// an empty or oversized member are skipped. At most `max` triplets are
/// returned even if the model produced more.
pub fn parse_triplets(response: &str, max: usize) -> Vec<Triplet> {
    let mut triplets = Vec::new();

    for line in response.lines() {
        if triplets.len() >= max {
            break;
        }
        let (Some(open), Some(close)) = (line.find('('), line.rfind(')')) else {
            continue;
        };
        if close <= open {
            continue;
        }

        let members: Vec<&str> = line[open + 1..close].split(',').collect();
        if members.len() != 3 {
            tracing::debug!(line = %line.trim(), "Skipping triplet line with wrong arity");
            continue;
        }

        match (
            clean_member(members[0]),
            clean_member(members[1]),
            clean_member(members[2]),
        ) {
            (Some(s), Some(p), Some(o)) => triplets.push(Triplet::new(s, p, o)),
            _ => tracing::debug!(line = %line.trim(), "Skipping malformed triplet line"),
        }
    }

    triplets
}

/// Asks the language model for knowledge triplets contained in a chunk.
pub struct TripletExtractor {
    llm: Arc<dyn LanguageModel>,
    max_triplets: usize,
}

impl TripletExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, max_triplets: usize) -> Self {
        Self { llm, max_triplets }
    }

    pub fn build_prompt(&self, text: &str) -> Prompt {
        let text = TRIPLET_PROMPT
            .replace("{max_triplets}", &self.max_triplets.to_string())
            .replace("{text}", text);
        Prompt::new(PromptKind::TripletExtraction, text)
    }

    pub async fn extract(&self, text: &str) -> Result<Vec<Triplet>> {
        if self.max_triplets == 0 {
            return Ok(Vec::new());
        }

        let response = self.llm.complete(&self.build_prompt(text)).await?;
        let triplets = parse_triplets(&response, self.max_triplets);

        tracing::debug!(
            model = %self.llm.model_id(),
            response_len = response.len(),
            triplets = triplets.len(),
            "Extracted triplets from chunk"
        );

        Ok(triplets)
    }
}
