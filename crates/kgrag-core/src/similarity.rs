//! Vector similarity helpers shared by the graph stores.

use std::cmp::Ordering;

/// Cosine similarity of two vectors. Mismatched lengths and zero-magnitude
/// vectors score `0.0` so they sort last instead of failing a whole query.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> f32 {
    if v1.len() != v2.len() || v1.is_empty() {
        return 0.0;
    }

    let dot: f32 = v1.iter().zip(v2).map(|(a, b)| a * b).sum();
    let mag1 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag2 = v2.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    dot / (mag1 * mag2)
}

/// Score every candidate against `query` and keep the best `k`, highest first.
/// Ties keep their input order.
pub fn top_k<T, F>(query: &[f32], candidates: Vec<T>, k: usize, embedding_of: F) -> Vec<(T, f32)>
where
    F: Fn(&T) -> Option<&[f32]>,
{
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .filter_map(|c| {
            let score = embedding_of(&c).map(|e| cosine_similarity(query, e))?;
            Some((c, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_top_k_orders_and_truncates() {
        let candidates = vec![
            ("far", Some(vec![0.0, 1.0])),
            ("none", None),
            ("near", Some(vec![1.0, 0.1])),
            ("mid", Some(vec![1.0, 1.0])),
        ];

        let ranked = top_k(&[1.0, 0.0], candidates, 2, |c| c.1.as_deref());
        let names: Vec<&str> = ranked.iter().map(|(c, _)| c.0).collect();
        assert_eq!(names, vec!["near", "mid"]);
    }
}
