use std::collections::HashSet;
use std::sync::Arc;

use kgrag_core::error::Result;
use kgrag_core::llm::{LanguageModel, Prompt, PromptKind};

pub const DEFAULT_MAX_KEYWORDS: usize = 10;

const KEYWORDS_MARKER: &str = "KEYWORDS:";

const KEYWORD_PROMPT: &str = "A question is provided below. Given the question, extract up to \
{max_keywords} keywords from the text. Focus on extracting the keywords that we can use to best \
lookup answers to the question. Avoid stopwords.
---------------------
{question}
---------------------
Provide keywords in the following comma-separated format: 'KEYWORDS: <keywords>'
";

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "out", "that", "the", "their", "this", "to", "was", "were",
    "what", "which", "who", "with",
];

/// Keywords from a `KEYWORDS: a, b, c` response, lower-cased and de-duplicated.
///
/// Only the first line after the marker is read. A response without the
/// marker is treated as a bare comma-separated list.
pub fn parse_keywords(response: &str, max: usize) -> Vec<String> {
    let upper = response.to_ascii_uppercase();
    let list = match upper.find(KEYWORDS_MARKER) {
        Some(pos) => &response[pos + KEYWORDS_MARKER.len()..],
        None => response,
    };
    let list = list.trim_start().lines().next().unwrap_or("");

    let mut seen = HashSet::new();
    list.split(',')
        .map(|k| {
            k.trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '<' || c == '>')
                .trim()
                .to_lowercase()
        })
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .take(max)
        .collect()
}

/// Adds the individual words of multi-word keywords, skipping stopwords and
/// anything already present.
pub fn expand_with_subwords(keywords: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = keywords.iter().cloned().collect();
    let mut expanded = keywords.to_vec();

    for keyword in keywords {
        for word in keyword.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            if seen.insert(word.clone()) {
                expanded.push(word);
            }
        }
    }

    expanded
}

pub struct KeywordExtractor {
    llm: Arc<dyn LanguageModel>,
    max_keywords: usize,
}

impl KeywordExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, max_keywords: usize) -> Self {
        Self { llm, max_keywords }
    }

    fn build_prompt(&self, question: &str) -> Prompt {
        let text = KEYWORD_PROMPT
            .replace("{max_keywords}", &self.max_keywords.to_string())
            .replace("{question}", question);
        Prompt::new(PromptKind::KeywordExtraction, text)
    }

    /// Model-extracted keywords plus their sub-words.
    pub async fn extract(&self, question: &str) -> Result<Vec<String>> {
        let response = self.llm.complete(&self.build_prompt(question)).await?;
        let keywords = expand_with_subwords(&parse_keywords(&response, self.max_keywords));

        tracing::debug!(question = %question, keywords = ?keywords, "Extracted query keywords");
        Ok(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_with_marker() {
        let response = "Sure! KEYWORDS: Authors, research paper, Authors\nThanks";
        assert_eq!(parse_keywords(response, 10), vec!["authors", "research paper"]);
    }

    #[test]
    fn test_parse_keywords_case_insensitive_marker() {
        assert_eq!(parse_keywords("keywords: graph, 'RAG'.", 10), vec!["graph", "rag"]);
    }

    #[test]
    fn test_parse_keywords_without_marker_and_cap() {
        assert_eq!(parse_keywords("a1, b2, c3", 2), vec!["a1", "b2"]);
        assert!(parse_keywords("KEYWORDS:", 10).is_empty());
    }

    #[test]
    fn test_expand_with_subwords() {
        let expanded = expand_with_subwords(&[
            "research paper title".to_string(),
            "paper".to_string(),
            "list of authors".to_string(),
        ]);
        assert_eq!(
            expanded,
            vec![
                "research paper title",
                "paper",
                "list of authors",
                "research",
                "title",
                "list",
                "authors",
            ]
        );
    }
}
