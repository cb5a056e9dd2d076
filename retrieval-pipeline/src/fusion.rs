//! Rank Fusion (C10): Reciprocal Rank Fusion across independent rankings
//! (dense, sparse, ...) over the same chunk pool.

use std::collections::HashMap;

use common::domain::chunk::ScoredChunk;
use uuid::Uuid;

pub const DEFAULT_RRF_K: u32 = 60;

struct FusionEntry {
    chunk: ScoredChunk,
    rrf_score: f32,
    dense_rank: Option<usize>,
    insertion_order: usize,
}

/// Fuses any number of rankings over the same chunk pool with Reciprocal
/// Rank Fusion: `score(d) = sum over rankings of 1 / (k + rank)`, rank
/// 1-based. A chunk missing from a ranking contributes zero for it.
/// `rankings[0]` is treated as the dense ranking for tie-breaking: when two
/// chunks land on the same fused score, the one ranked higher there wins;
/// chunks absent from the dense ranking sort after those present, in the
/// order they were first seen.
pub fn reciprocal_rank_fusion(rankings: &[Vec<ScoredChunk>], k: u32) -> Vec<ScoredChunk> {
    let mut entries: HashMap<Uuid, FusionEntry> = HashMap::new();
    let mut next_insertion = 0usize;

    for (ranking_idx, ranking) in rankings.iter().enumerate() {
        for (rank, scored) in ranking.iter().enumerate() {
            let contribution = 1.0_f32 / (k as f32 + (rank + 1) as f32);
            match entries.get_mut(&scored.chunk.id) {
                Some(entry) => {
                    entry.rrf_score += contribution;
                    if ranking_idx == 0 {
                        entry.dense_rank = Some(rank);
                    }
                }
                None => {
                    let dense_rank = if ranking_idx == 0 { Some(rank) } else { None };
                    entries.insert(
                        scored.chunk.id,
                        FusionEntry {
                            chunk: scored.clone(),
                            rrf_score: contribution,
                            dense_rank,
                            insertion_order: next_insertion,
                        },
                    );
                    next_insertion += 1;
                }
            }
        }
    }

    let mut fused: Vec<FusionEntry> = entries.into_values().collect();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| match (a.dense_rank, b.dense_rank) {
                (Some(ar), Some(br)) => ar.cmp(&br),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.insertion_order.cmp(&b.insertion_order),
            })
    });

    fused
        .into_iter()
        .map(|entry| ScoredChunk {
            chunk: entry.chunk.chunk,
            score: entry.rrf_score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use uuid::Uuid;

    fn chunk(workspace: Uuid, doc: Uuid, idx: i32, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: common::domain::Chunk::new(
                doc,
                workspace,
                idx,
                format!("chunk {idx}"),
                None,
                StdHashMap::new(),
            ),
            score,
        }
    }

    #[test]
    fn empty_rankings_yield_empty_output() {
        assert!(reciprocal_rank_fusion(&[], DEFAULT_RRF_K).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()], DEFAULT_RRF_K).is_empty());
    }

    #[test]
    fn chunk_present_in_both_rankings_outranks_single_ranking_hits() {
        let ws = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let a = chunk(ws, doc, 0, 0.9);
        let b = chunk(ws, doc, 1, 0.8);
        let c = chunk(ws, doc, 2, 0.7);

        let dense = vec![a.clone(), b.clone(), c.clone()];
        // `b` also ranks first in the sparse ranking, so it accumulates
        // contributions from both and should come out on top.
        let sparse = vec![b.clone(), a.clone()];

        let fused = reciprocal_rank_fusion(&[dense, sparse], DEFAULT_RRF_K);
        assert_eq!(fused.first().unwrap().chunk.id, b.chunk.id);
    }

    #[test]
    fn ties_break_by_dense_rank() {
        let ws = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let a = chunk(ws, doc, 0, 0.9);
        let b = chunk(ws, doc, 1, 0.5);

        // Each appears in exactly one ranking at the same rank, so their
        // RRF scores tie; `a` should win because it's ranked first in the
        // dense ranking (rankings[0]).
        let dense = vec![a.clone()];
        let sparse = vec![b.clone()];

        let fused = reciprocal_rank_fusion(&[dense, sparse], DEFAULT_RRF_K);
        assert_eq!(fused.first().unwrap().chunk.id, a.chunk.id);
    }

    #[test]
    fn missing_from_a_ranking_contributes_zero() {
        let ws = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let only_dense = chunk(ws, doc, 0, 0.9);
        let fused = reciprocal_rank_fusion(&[vec![only_dense.clone()], vec![]], DEFAULT_RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / (DEFAULT_RRF_K as f32 + 1.0)).abs() < 1e-6);
    }
}
