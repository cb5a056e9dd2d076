//! Standard IR metrics over ranked retrieval results (A8). Pure functions,
//! no IO — grounded on `original_source/apps/backend/eval/metrics.py`.
//!
//! Conventions: `retrieved` is an ordered list of chunk ids (best first),
//! `relevant` is the set of ids considered relevant for that query. Both
//! are parallel, one entry per query.

use std::collections::BTreeSet;

fn validate_parallel(retrieved: &[Vec<String>], relevant: &[BTreeSet<String>]) {
    assert_eq!(
        retrieved.len(),
        relevant.len(),
        "retrieved and relevant must have the same length"
    );
}

/// Mean Reciprocal Rank: for each query, `1 / rank` of the first relevant
/// hit (0 if none found), averaged across queries.
pub fn mean_reciprocal_rank(retrieved: &[Vec<String>], relevant: &[BTreeSet<String>]) -> f64 {
    validate_parallel(retrieved, relevant);
    if retrieved.is_empty() {
        return 0.0;
    }
    let total: f64 = retrieved
        .iter()
        .zip(relevant)
        .map(|(ret, rel)| {
            ret.iter()
                .enumerate()
                .find(|(_, id)| rel.contains(*id))
                .map(|(rank, _)| 1.0 / (rank as f64 + 1.0))
                .unwrap_or(0.0)
        })
        .sum();
    total / retrieved.len() as f64
}

/// Recall@k: fraction of relevant ids found in the top-k results,
/// averaged across queries. A query with an empty relevant set scores 0.
pub fn recall_at_k(retrieved: &[Vec<String>], relevant: &[BTreeSet<String>], k: usize) -> f64 {
    validate_parallel(retrieved, relevant);
    assert!(k > 0, "k must be > 0");
    if retrieved.is_empty() {
        return 0.0;
    }
    let total: f64 = retrieved
        .iter()
        .zip(relevant)
        .map(|(ret, rel)| {
            if rel.is_empty() {
                return 0.0;
            }
            let hits = ret.iter().take(k).filter(|id| rel.contains(*id)).count();
            hits as f64 / rel.len() as f64
        })
        .sum();
    total / retrieved.len() as f64
}

/// Hit@1 (Success@1): fraction of queries whose top result is relevant.
pub fn hit_at_1(retrieved: &[Vec<String>], relevant: &[BTreeSet<String>]) -> f64 {
    validate_parallel(retrieved, relevant);
    if retrieved.is_empty() {
        return 0.0;
    }
    let hits = retrieved
        .iter()
        .zip(relevant)
        .filter(|(ret, rel)| ret.first().is_some_and(|id| rel.contains(id)))
        .count();
    hits as f64 / retrieved.len() as f64
}

/// NDCG@k with binary relevance: actual DCG over the ideal DCG (all
/// relevant ids ranked first), averaged across queries with a nonzero
/// ideal (queries with no relevant ids contribute 0).
pub fn ndcg_at_k(retrieved: &[Vec<String>], relevant: &[BTreeSet<String>], k: usize) -> f64 {
    validate_parallel(retrieved, relevant);
    assert!(k > 0, "k must be > 0");
    if retrieved.is_empty() {
        return 0.0;
    }

    fn dcg(ranked: &[String], rel: &BTreeSet<String>, limit: usize) -> f64 {
        ranked
            .iter()
            .take(limit)
            .enumerate()
            .filter(|(_, id)| rel.contains(*id))
            .map(|(i, _)| 1.0 / (i as f64 + 2.0).log2())
            .sum()
    }

    let total: f64 = retrieved
        .iter()
        .zip(relevant)
        .map(|(ret, rel)| {
            let ideal_count = rel.len().min(k);
            let idcg: f64 = (0..ideal_count).map(|i| 1.0 / (i as f64 + 2.0).log2()).sum();
            if idcg > 0.0 {
                dcg(ret, rel, k) / idcg
            } else {
                0.0
            }
        })
        .sum();
    total / retrieved.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn ranked(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mrr_averages_reciprocal_rank_of_first_hit() {
        let retrieved = vec![ranked(&["a", "b", "c"]), ranked(&["x", "y", "b"])];
        let relevant = vec![set(&["b"]), set(&["b"])];
        let mrr = mean_reciprocal_rank(&retrieved, &relevant);
        assert!((mrr - ((1.0 / 2.0 + 1.0 / 3.0) / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn mrr_is_zero_when_nothing_relevant_is_found() {
        let retrieved = vec![ranked(&["a", "b"])];
        let relevant = vec![set(&["z"])];
        assert_eq!(mean_reciprocal_rank(&retrieved, &relevant), 0.0);
    }

    #[test]
    fn recall_at_k_counts_fraction_of_relevant_found() {
        let retrieved = vec![ranked(&["a", "b", "c", "d"])];
        let relevant = vec![set(&["b", "d", "z"])];
        let recall = recall_at_k(&retrieved, &relevant, 3);
        assert!((recall - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn hit_at_1_only_checks_top_result() {
        let retrieved = vec![ranked(&["a", "b"]), ranked(&["b", "a"])];
        let relevant = vec![set(&["b"]), set(&["b"])];
        assert_eq!(hit_at_1(&retrieved, &relevant), 0.5);
    }

    #[test]
    fn ndcg_is_one_for_a_perfectly_ranked_hit() {
        let retrieved = vec![ranked(&["a", "b"])];
        let relevant = vec![set(&["a"])];
        assert!((ndcg_at_k(&retrieved, &relevant, 2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ndcg_rewards_earlier_hits_over_later_ones() {
        let early = ndcg_at_k(&[ranked(&["a", "b", "c"])], &[set(&["a"])], 3);
        let late = ndcg_at_k(&[ranked(&["c", "b", "a"])], &[set(&["a"])], 3);
        assert!(early > late);
    }

    #[test]
    fn empty_inputs_yield_zero_for_every_metric() {
        assert_eq!(mean_reciprocal_rank(&[], &[]), 0.0);
        assert_eq!(recall_at_k(&[], &[], 5), 0.0);
        assert_eq!(hit_at_1(&[], &[]), 0.0);
        assert_eq!(ndcg_at_k(&[], &[], 5), 0.0);
    }
}
