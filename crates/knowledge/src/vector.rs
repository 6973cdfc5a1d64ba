//! Vector similarity utilities.

use parley_core::KnowledgeEntry;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for mismatched lengths, empty input or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank entries by cosine similarity to a query embedding.
///
/// Entries without an embedding are skipped. Survivors score at least
/// `min_score` and come back sorted by descending similarity, at most
/// `limit` of them.
pub fn vector_search<'a>(
    entries: &'a [KnowledgeEntry],
    query_embedding: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<(f32, &'a KnowledgeEntry)> {
    let mut scored: Vec<(f32, &KnowledgeEntry)> = entries
        .iter()
        .filter_map(|entry| {
            let emb = entry.embedding.as_ref()?;
            let sim = cosine_similarity(emb, query_embedding);
            (sim >= min_score).then_some((sim, entry))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, embedding: Option<Vec<f32>>) -> KnowledgeEntry {
        KnowledgeEntry {
            id,
            title: format!("Entry {id}"),
            content: format!("Content for {id}"),
            keywords: String::new(),
            category: None,
            embedding,
            active: true,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn search_sorts_descending_and_applies_threshold() {
        let entries = vec![
            entry(1, Some(vec![0.0, 1.0])),  // orthogonal
            entry(2, Some(vec![1.0, 0.1])),  // close
            entry(3, None),                  // no embedding
            entry(4, Some(vec![1.0, 1.0])),  // ~0.707
            entry(5, Some(vec![1.0, 0.0])),  // identical
        ];
        let results = vector_search(&entries, &[1.0, 0.0], 10, 0.3);
        let ids: Vec<i64> = results.iter().map(|(_, e)| e.id).collect();
        assert_eq!(ids, vec![5, 2, 4]);
        assert!(results.windows(2).all(|w| w[0].0 > w[1].0));
        assert!(results.iter().all(|(s, _)| *s >= 0.3));
    }

    #[test]
    fn search_respects_limit() {
        let entries: Vec<KnowledgeEntry> =
            (0..10).map(|i| entry(i, Some(vec![1.0, i as f32 * 0.01]))).collect();
        assert_eq!(vector_search(&entries, &[1.0, 0.0], 3, 0.3).len(), 3);
    }
}
