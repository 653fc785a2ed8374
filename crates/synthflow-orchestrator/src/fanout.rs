//! Chunked fan-out with partial-failure aggregation.
//!
//! A collection is split into chunks, every chunk is dispatched at once, and
//! the join waits for all of them. One chunk failing never cancels or blocks
//! its siblings; the failure is recorded against its 1-based chunk number
//! and the successful payloads are kept in dispatch order.

use futures::future::join_all;
use serde_json::Value;
use std::future::Future;

use synthflow_session::SubTaskRecord;
use synthflow_utils::error::GatewayError;

/// Fixed-size chunks of at most `size` items.
#[must_use]
pub fn chunk_fixed<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// A first chunk of at most `first` items, then chunks of at most `rest`.
#[must_use]
pub fn chunk_asymmetric<T: Clone>(items: &[T], first: usize, rest: usize) -> Vec<Vec<T>> {
    let split = first.max(1).min(items.len());
    let (head, tail) = items.split_at(split);
    let mut chunks = Vec::with_capacity(1 + tail.len().div_ceil(rest.max(1)));
    if !head.is_empty() {
        chunks.push(head.to_vec());
    }
    chunks.extend(chunk_fixed(tail, rest));
    chunks
}

/// Joined outcome of one sub-task.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutResult {
    pub chunks_total: usize,
    /// Successful payloads, flattened, in dispatch order.
    pub items: Vec<Value>,
    /// `(chunk_number, error)` for every failed chunk.
    pub failures: Vec<(usize, String)>,
}

impl FanOutResult {
    /// Fold per-chunk outcomes, given in dispatch order.
    #[must_use]
    pub fn aggregate(outcomes: Vec<Result<Value, GatewayError>>) -> Self {
        let chunks_total = outcomes.len();
        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(Value::Array(list)) => items.extend(list),
                Ok(other) => items.push(other),
                Err(e) => failures.push((index + 1, e.to_string())),
            }
        }
        Self {
            chunks_total,
            items,
            failures,
        }
    }

    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.chunks_total > 0 && self.failures.len() == self.chunks_total
    }

    /// `"Chunk 1: ...; Chunk 3: ..."`, or `None` if nothing failed.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|(n, e)| format!("Chunk {n}: {e}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The resolved sub-task record. A sub-task whose every chunk failed
    /// still resolves, carrying only the error.
    #[must_use]
    pub fn into_record(self) -> SubTaskRecord {
        let error = self.error_summary();
        let payload = (!self.all_failed()).then(|| Value::Array(self.items));
        SubTaskRecord {
            dispatched: true,
            completed: true,
            error,
            chunks_total: self.chunks_total,
            chunks_failed: self.failures.iter().map(|(n, _)| *n).collect(),
            payload,
        }
    }
}

/// Dispatch every chunk concurrently and wait for all of them.
///
/// `dispatch` receives `(chunk_number, total_chunks, chunk)`.
pub async fn fan_out<T, F, Fut>(chunks: Vec<T>, dispatch: F) -> FanOutResult
where
    F: Fn(usize, usize, T) -> Fut,
    Fut: Future<Output = Result<Value, GatewayError>>,
{
    let total = chunks.len();
    let pending = chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| dispatch(index + 1, total, chunk));
    FanOutResult::aggregate(join_all(pending).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn lens(chunks: &[Vec<u32>]) -> Vec<usize> {
        chunks.iter().map(Vec::len).collect()
    }

    #[test]
    fn test_fixed_chunks() {
        let items: Vec<u32> = (0..7).collect();
        assert_eq!(lens(&chunk_fixed(&items, 3)), vec![3, 3, 1]);
        assert!(chunk_fixed::<u32>(&[], 3).is_empty());
    }

    #[test]
    fn test_asymmetric_chunks() {
        let items: Vec<u32> = (0..11).collect();
        assert_eq!(lens(&chunk_asymmetric(&items, 4, 3)), vec![4, 3, 3, 1]);
        assert_eq!(lens(&chunk_asymmetric(&items[..2], 4, 3)), vec![2]);
        assert!(chunk_asymmetric::<u32>(&[], 4, 3).is_empty());
    }

    proptest! {
        #[test]
        fn prop_fixed_chunk_count_and_order(n in 0usize..50) {
            let items: Vec<usize> = (0..n).collect();
            let chunks = chunk_fixed(&items, 3);
            prop_assert_eq!(chunks.len(), n.div_ceil(3));
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 3));
            prop_assert_eq!(chunks.concat(), items);
        }

        #[test]
        fn prop_asymmetric_chunks_cover_input(n in 0usize..50) {
            let items: Vec<usize> = (0..n).collect();
            let chunks = chunk_asymmetric(&items, 4, 3);
            prop_assert!(chunks.first().is_none_or(|c| c.len() <= 4));
            prop_assert!(chunks.iter().skip(1).all(|c| !c.is_empty() && c.len() <= 3));
            prop_assert_eq!(chunks.concat(), items);
        }
    }

    #[test]
    fn test_aggregate_partial_failure() {
        let result = FanOutResult::aggregate(vec![
            Ok(json!([{"t": 1}, {"t": 2}])),
            Err(GatewayError::NoResponse {
                call: "Stage 3 paper analysis".to_string(),
            }),
            Ok(json!({"t": 3})),
        ]);

        assert_eq!(result.chunks_total, 3);
        assert_eq!(result.items, vec![json!({"t": 1}), json!({"t": 2}), json!({"t": 3})]);
        assert!(!result.all_failed());

        let record = result.into_record();
        assert!(record.completed);
        assert_eq!(record.chunks_failed, vec![2]);
        assert_eq!(
            record.error.as_deref(),
            Some("Chunk 2: Stage 3 paper analysis: no response received")
        );
        assert_eq!(record.payload.unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_all_failed_still_resolves() {
        let err = || GatewayError::Validation("bad".to_string());
        let record = FanOutResult::aggregate(vec![Err(err()), Err(err())]).into_record();

        assert!(record.completed);
        assert!(record.payload.is_none());
        assert_eq!(
            record.error.as_deref(),
            Some("Chunk 1: Validation failed: bad; Chunk 2: Validation failed: bad")
        );
    }

    #[test]
    fn test_zero_chunks_resolve_empty() {
        let record = FanOutResult::aggregate(Vec::new()).into_record();
        assert!(record.completed);
        assert_eq!(record.chunks_total, 0);
        assert_eq!(record.payload, Some(json!([])));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_fan_out_preserves_dispatch_order() {
        let chunks = vec![vec![1u64], vec![2], vec![3]];
        let result = fan_out(chunks, |n, total, chunk| async move {
            assert_eq!(total, 3);
            // later chunks finish first
            tokio::time::sleep(Duration::from_millis(30 * (4 - n as u64))).await;
            Ok(json!([{"chunk": n, "item": chunk[0]}]))
        })
        .await;

        let order: Vec<u64> = result
            .items
            .iter()
            .map(|v| v["item"].as_u64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fan_out_waits_for_every_chunk() {
        let (release, gate) = oneshot::channel::<()>();
        let gate = std::sync::Mutex::new(Some(gate));

        let joined = fan_out(vec![1, 2], |n, _, _| {
            let waiter = if n == 2 {
                gate.lock().unwrap().take()
            } else {
                None
            };
            async move {
                if let Some(waiter) = waiter {
                    let _ = waiter.await;
                }
                Ok(json!({"chunk": n}))
            }
        });
        tokio::pin!(joined);

        let early = tokio::time::timeout(Duration::from_millis(50), &mut joined).await;
        assert!(early.is_err(), "join resolved before the gated chunk");

        release.send(()).unwrap();
        let result = joined.await;
        assert_eq!(result.items.len(), 2);
        assert!(result.failures.is_empty());
    }
}
