//! Weighted rank fusion of semantic and lexical candidate lists.
//!
//! Each list contributes a normalized positional score `1/(rank+1)`; a
//! document's fused score is `alpha * semantic + (1 - alpha) * lexical` with
//! a missing side contributing zero. The sort is stable, so ties keep
//! first-seen insertion order.

use std::collections::HashMap;

use common::storage::chunks::ChunkRecord;

use crate::ScoredChunk;

/// Stable identity for cross-list fusion: chunk id, then source path, then
/// doc id, then a positional fallback.
pub fn stable_doc_key(chunk: &ChunkRecord, idx: usize) -> String {
    if !chunk.id.is_empty() {
        return chunk.id.clone();
    }
    if !chunk.source_path.is_empty() {
        return chunk.source_path.clone();
    }
    if !chunk.doc_id.is_empty() {
        return chunk.doc_id.clone();
    }
    format!("idx_{idx}")
}

struct FusionSlot {
    chunk: ChunkRecord,
    semantic: f32,
    lexical: f32,
}

/// Fuses the two ranked lists and returns the top `final_top_k` by fused
/// score, ties resolved by insertion order (semantic list first).
pub fn fuse(
    semantic: &[ScoredChunk],
    lexical: &[ChunkRecord],
    alpha: f32,
    final_top_k: usize,
) -> Vec<ScoredChunk> {
    let mut order: Vec<String> = Vec::new();
    let mut slots: HashMap<String, FusionSlot> = HashMap::new();

    for (rank, scored) in semantic.iter().enumerate() {
        let key = stable_doc_key(&scored.chunk, rank);
        let norm = 1.0 / (rank as f32 + 1.0);
        slots
            .entry(key.clone())
            .and_modify(|slot| slot.semantic = slot.semantic.max(norm))
            .or_insert_with(|| {
                order.push(key.clone());
                FusionSlot {
                    chunk: scored.chunk.clone(),
                    semantic: norm,
                    lexical: 0.0,
                }
            });
    }

    for (rank, chunk) in lexical.iter().enumerate() {
        let key = stable_doc_key(chunk, rank);
        let norm = 1.0 / (rank as f32 + 1.0);
        slots
            .entry(key.clone())
            .and_modify(|slot| slot.lexical = slot.lexical.max(norm))
            .or_insert_with(|| {
                order.push(key.clone());
                FusionSlot {
                    chunk: chunk.clone(),
                    semantic: 0.0,
                    lexical: norm,
                }
            });
    }

    let mut fused: Vec<ScoredChunk> = order
        .iter()
        .filter_map(|key| slots.get(key))
        .map(|slot| {
            let score = alpha.mul_add(slot.semantic, (1.0 - alpha) * slot.lexical);
            ScoredChunk::new(slot.chunk.clone(), score)
        })
        .collect();

    // Vec::sort_by is stable; equal scores keep insertion order.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(final_top_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::hashing::sha256_hex;

    fn chunk(id: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            doc_id: id.split('#').next().unwrap_or_default().to_string(),
            source_path: format!("seed/{id}.md"),
            source_type: "md".to_string(),
            page: None,
            heading_path: Vec::new(),
            text: format!("text for {id}"),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            hash: sha256_hex(id.as_bytes()),
        }
    }

    fn scored(ids: &[&str]) -> Vec<ScoredChunk> {
        ids.iter()
            .enumerate()
            .map(|(rank, id)| ScoredChunk::new(chunk(id), 1.0 - rank as f32 * 0.1))
            .collect()
    }

    fn ids(fused: &[ScoredChunk]) -> Vec<String> {
        fused.iter().map(|s| s.chunk.id.clone()).collect()
    }

    #[test]
    fn identical_rankings_at_half_alpha_keep_order() {
        let semantic = scored(&["a#0", "b#0", "c#0"]);
        let lexical: Vec<ChunkRecord> = semantic.iter().map(|s| s.chunk.clone()).collect();
        let fused = fuse(&semantic, &lexical, 0.5, 3);
        assert_eq!(ids(&fused), vec!["a#0", "b#0", "c#0"]);
    }

    #[test]
    fn alpha_one_reproduces_semantic_order() {
        let semantic = scored(&["a#0", "b#0", "c#0"]);
        let lexical = vec![chunk("c#0"), chunk("a#0"), chunk("b#0")];
        let fused = fuse(&semantic, &lexical, 1.0, 3);
        assert_eq!(ids(&fused), vec!["a#0", "b#0", "c#0"]);
    }

    #[test]
    fn alpha_zero_reproduces_lexical_order() {
        let semantic = scored(&["a#0", "b#0", "c#0"]);
        let lexical = vec![chunk("c#0"), chunk("a#0"), chunk("b#0")];
        let fused = fuse(&semantic, &lexical, 0.0, 3);
        assert_eq!(ids(&fused), vec!["c#0", "a#0", "b#0"]);
    }

    #[test]
    fn missing_side_contributes_zero() {
        let semantic = scored(&["a#0"]);
        let lexical = vec![chunk("b#0")];
        let fused = fuse(&semantic, &lexical, 0.75, 2);
        assert_eq!(ids(&fused), vec!["a#0", "b#0"]);
        assert!((fused[0].score - 0.75).abs() < 1e-6);
        assert!((fused[1].score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn truncates_to_final_top_k() {
        let semantic = scored(&["a#0", "b#0", "c#0", "d#0"]);
        let fused = fuse(&semantic, &[], 1.0, 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn fallback_key_applies_when_ids_missing() {
        let mut anon = chunk("x#0");
        anon.id = String::new();
        anon.source_path = String::new();
        anon.doc_id = String::new();
        assert_eq!(stable_doc_key(&anon, 4), "idx_4");
    }
}
