//! Maximum Marginal Relevance: greedy selection trading relevance for
//! diversity. Operates purely on vectors; the caller decides what score is
//! ultimately reported for each selected index (the MMR value itself is
//! never substituted for a hit's returned score).

use crate::simd::dot;

/// Greedily select `target` indices from `candidates` (each `(index, unit
/// vector)`, already in the caller's preferred tie-break order) maximizing
/// `λ·⟨q, p_j⟩ − (1−λ)·max_{r∈R} ⟨p_r, p_j⟩` at each step. Ties are broken by
/// the candidates' input order, so pass them pre-sorted by descending fused
/// score with chunk-index tie-breaks.
pub fn select(query: &[f32], candidates: &[(u32, Vec<f32>)], target: usize, lambda: f32) -> Vec<u32> {
    let target = target.min(candidates.len());
    let mut selected: Vec<usize> = Vec::with_capacity(target);
    let mut selected_vectors: Vec<&Vec<f32>> = Vec::with_capacity(target);

    while selected.len() < target {
        let mut best_idx = None;
        let mut best_value = f32::NEG_INFINITY;

        for (pos, (_, vector)) in candidates.iter().enumerate() {
            if selected.contains(&pos) {
                continue;
            }
            let relevance = dot(query, vector);
            let diversity = if selected_vectors.is_empty() {
                0.0
            } else {
                selected_vectors
                    .iter()
                    .map(|r| dot(r, vector))
                    .fold(f32::NEG_INFINITY, f32::max)
            };
            let value = lambda * relevance - (1.0 - lambda) * diversity;
            if value > best_value {
                best_value = value;
                best_idx = Some(pos);
            }
        }

        let Some(pos) = best_idx else { break };
        selected.push(pos);
        selected_vectors.push(&candidates[pos].1);
    }

    selected.into_iter().map(|pos| candidates[pos].0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let n = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
        v.into_iter().map(|x| x / n).collect()
    }

    #[test]
    fn lambda_one_disables_diversity_and_matches_pure_relevance_order() {
        let q = unit(vec![1.0, 0.0]);
        let candidates = vec![
            (0, unit(vec![1.0, 0.0])),
            (1, unit(vec![0.9, 0.1])),
            (2, unit(vec![0.0, 1.0])),
        ];
        let selected = select(&q, &candidates, 3, 1.0);
        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[test]
    fn diversity_term_demotes_near_duplicates() {
        let q = unit(vec![1.0, 0.0]);
        // Candidate 1 is nearly identical to candidate 0; candidate 2 is
        // orthogonal but still somewhat relevant. With lambda=0.3 diversity
        // dominates enough that candidate 2 should be preferred over the
        // near-duplicate once candidate 0 is selected.
        let candidates = vec![
            (0, unit(vec![1.0, 0.01])),
            (1, unit(vec![1.0, 0.0])),
            (2, unit(vec![0.5, 0.5])),
        ];
        let selected = select(&q, &candidates, 2, 0.3);
        assert_eq!(selected[0], 0);
        assert_eq!(selected[1], 2);
    }

    #[test]
    fn target_larger_than_pool_returns_whole_pool() {
        let q = unit(vec![1.0, 0.0]);
        let candidates = vec![(0, unit(vec![1.0, 0.0]))];
        assert_eq!(select(&q, &candidates, 5, 0.5), vec![0]);
    }
}
