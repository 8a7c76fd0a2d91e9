use crate::cache::EmbeddingIndex;

/// Score given to vectors whose similarity is undefined
pub const FLOOR_SCORE: f32 = -1.0;

/// One ranked entry: position in the index and its cosine score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedMatch {
  pub index: usize,
  pub score: f32,
}

/// Calculate cosine similarity between two embedding vectors
///
/// Returns a value between -1 and 1, where:
/// - 1 = identical direction (high similarity)
/// - 0 = orthogonal (no similarity)
/// - -1 = opposite direction
///
/// Zero-norm, mismatched or non-finite inputs score [`FLOOR_SCORE`].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return FLOOR_SCORE;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if norm_a == 0.0 || norm_b == 0.0 {
    return FLOOR_SCORE;
  }

  let similarity = dot_product / (norm_a * norm_b);
  if similarity.is_finite() {
    similarity.clamp(-1.0, 1.0)
  } else {
    FLOOR_SCORE
  }
}

/// Score every indexed vector against `query` and keep the best `top_k`.
///
/// Sorting is stable, so equal scores keep ascending index order.
pub fn rank(query: &[f32], index: &EmbeddingIndex, top_k: usize) -> Vec<RankedMatch> {
  if top_k == 0 || index.is_empty() {
    return Vec::new();
  }

  let mut ranked: Vec<RankedMatch> = index
    .vectors
    .iter()
    .enumerate()
    .map(|(i, vector)| RankedMatch { index: i, score: cosine_similarity(query, vector) })
    .collect();

  ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
  ranked.truncate(top_k);

  tracing::debug!(candidates = index.len(), returned = ranked.len(), "ranked corpus");
  ranked
}

/// Round a score for presentation (3 decimal places)
pub fn round_score(score: f32) -> f32 {
  (score * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
  use super::*;

  fn index_of(vectors: Vec<Vec<f32>>) -> EmbeddingIndex {
    let n = vectors.len();
    EmbeddingIndex::for_tests(
      (0..n).map(|i| format!("song{i}")).collect(),
      vectors,
    )
  }

  #[test]
  fn test_cosine_similarity() {
    // Identical vectors
    let similarity = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
    assert!((similarity - 1.0).abs() < 0.001, "Identical vectors should have similarity 1.0");

    // Orthogonal vectors
    let orthogonal = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
    assert!(orthogonal.abs() < 0.001, "Orthogonal vectors should have similarity 0.0");

    // Opposite vectors
    let opposite = cosine_similarity(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]);
    assert!((opposite + 1.0).abs() < 0.001, "Opposite vectors should have similarity -1.0");
  }

  #[test]
  fn test_degenerate_vectors_score_floor() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), FLOOR_SCORE);
    assert_eq!(cosine_similarity(&[], &[]), FLOOR_SCORE);
    assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), FLOOR_SCORE);
    assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), FLOOR_SCORE);
  }

  #[test]
  fn test_rank_orders_by_descending_score() {
    let index = index_of(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]);
    let ranked = rank(&[1.0, 0.0], &index, 3);

    let order: Vec<usize> = ranked.iter().map(|m| m.index).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
  }

  #[test]
  fn test_rank_breaks_ties_by_index() {
    let index = index_of(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]]);
    let ranked = rank(&[1.0, 0.0], &index, 4);

    let order: Vec<usize> = ranked.iter().map(|m| m.index).collect();
    assert_eq!(order, vec![1, 3, 0, 2]);
  }

  #[test]
  fn test_rank_puts_zero_vectors_last() {
    let index = index_of(vec![vec![0.0, 0.0], vec![-1.0, 0.0]]);
    let ranked = rank(&[1.0, 0.0], &index, 2);

    // Both score -1; the tie keeps index order.
    assert_eq!(ranked[0].index, 0);
    assert_eq!(ranked[0].score, FLOOR_SCORE);
    assert_eq!(ranked[1].score, FLOOR_SCORE);
  }

  #[test]
  fn test_rank_truncates_and_handles_zero_k() {
    let index = index_of(vec![vec![1.0], vec![1.0], vec![1.0]]);

    assert_eq!(rank(&[1.0], &index, 2).len(), 2);
    assert_eq!(rank(&[1.0], &index, 10).len(), 3);
    assert!(rank(&[1.0], &index, 0).is_empty());
    assert!(rank(&[1.0], &index_of(vec![]), 5).is_empty());
  }

  #[test]
  fn test_round_score() {
    assert_eq!(round_score(0.123_456), 0.123);
    assert_eq!(round_score(0.9876), 0.988);
    assert_eq!(round_score(-1.0), -1.0);
  }
}
