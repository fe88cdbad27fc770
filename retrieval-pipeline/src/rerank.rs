//! Optional LLM-as-judge rerank stage.
//!
//! The judge sees the question plus id/preview pairs and must answer with a
//! strict JSON array of `{id, score}` in [0, 1]. The stage is best-effort
//! throughout: unparseable output keeps the fused order with zeroed scores,
//! and the timeout is soft (an overrun is logged, the result still used).

use std::{collections::HashMap, time::Instant};

use serde_json::{json, Value};
use tracing::warn;

use common::{
    llm::{ChatMessage, ChatModel},
    utils::config::RerankSettings,
};

use crate::{fusion::stable_doc_key, ScoredChunk};

const RERANK_SYSTEM_PROMPT: &str = "You are a strict relevance judge for an energy-efficiency \
assistant. You receive a user question and a JSON array of candidate context snippets, each \
with an \"id\" and a \"preview\". Score how relevant each candidate is to the question. Return \
ONLY a JSON array of objects {\"id\": <string>, \"score\": <float in [0,1]>}, one per candidate, \
with no extra text.";

/// Reranks the fused candidates, returning the top `final_top_k`.
pub async fn rerank(
    model: &dyn ChatModel,
    model_name: &str,
    settings: &RerankSettings,
    question: &str,
    fused: Vec<ScoredChunk>,
    final_top_k: usize,
) -> Vec<ScoredChunk> {
    if fused.is_empty() {
        return fused;
    }

    let candidate_count = settings.top_n.min(fused.len());
    let mut candidates: Vec<ScoredChunk> = fused.iter().take(candidate_count).cloned().collect();
    let tail: Vec<ScoredChunk> = fused.into_iter().skip(candidate_count).collect();

    let started = Instant::now();
    let mut scores: HashMap<String, f32> = HashMap::new();
    let batch_size = settings.batch_size.max(1);
    for batch in candidates.chunks(batch_size) {
        let payload = judge_payload(question, batch, settings.preview_chars);
        let messages = [
            ChatMessage::system(RERANK_SYSTEM_PROMPT),
            ChatMessage::user(payload),
        ];
        match model.invoke(model_name, &messages, false).await {
            Ok(raw) => match parse_judge_scores(&raw) {
                Some(batch_scores) => scores.extend(batch_scores),
                None => {
                    warn!("Rerank judge returned non-JSON output; keeping fused order with zero scores");
                }
            },
            Err(err) => {
                warn!(error = %err, "Rerank judge call failed; keeping fused order with zero scores");
            }
        }
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if elapsed_ms > settings.timeout_ms {
        warn!(
            elapsed_ms,
            timeout_ms = settings.timeout_ms,
            "Rerank exceeded soft timeout; result still accepted"
        );
    }

    rescale_unit_interval(&mut scores);

    for (idx, candidate) in candidates.iter_mut().enumerate() {
        let key = stable_doc_key(&candidate.chunk, idx);
        candidate.score = scores.get(&key).copied().unwrap_or(0.0);
    }

    // Stable sort: all-equal judge scores preserve the fused input order.
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.extend(tail);
    candidates.truncate(final_top_k);
    candidates
}

fn judge_payload(question: &str, candidates: &[ScoredChunk], preview_chars: usize) -> String {
    let entries: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let preview: String = candidate.chunk.text.chars().take(preview_chars).collect();
            json!({
                "id": stable_doc_key(&candidate.chunk, idx),
                "preview": preview,
            })
        })
        .collect();
    json!({ "question": question, "candidates": entries }).to_string()
}

/// Parses the judge response exactly once: fences stripped, trimmed to the
/// outermost bracket pair, each entry's score coerced to a float.
fn parse_judge_scores(raw: &str) -> Option<HashMap<String, f32>> {
    let stripped = common::utils::json_extract::strip_code_fences(raw);
    let start = stripped.find('[')?;
    let end = stripped.rfind(']')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(stripped.get(start..=end)?).ok()?;
    let entries = value.as_array()?;

    let mut scores = HashMap::new();
    for entry in entries {
        let Some(id) = entry.get("id").and_then(Value::as_str) else {
            continue;
        };
        let score = entry
            .get("score")
            .and_then(|raw_score| match raw_score {
                Value::Number(num) => num.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            })
            .unwrap_or(0.0);
        scores.insert(id.to_string(), score as f32);
    }
    Some(scores)
}

/// Scores in (1, 10] are read as a 0-10 scale and uniformly divided by 10;
/// everything is clamped to [0, 1] afterwards.
fn rescale_unit_interval(scores: &mut HashMap<String, f32>) {
    let max = scores
        .values()
        .copied()
        .fold(0.0f32, f32::max);
    if max > 1.0 && max <= 10.0 {
        for score in scores.values_mut() {
            *score /= 10.0;
        }
    }
    for score in scores.values_mut() {
        *score = score.clamp(0.0, 1.0);
    }
}
