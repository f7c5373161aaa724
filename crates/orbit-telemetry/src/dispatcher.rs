//! Flush / retry state machine.
//!
//! Owns the single-flight invariant and the failure policy:
//!
//! - One boolean flag under the state mutex guarantees at most one send in
//!   flight per pipeline; concurrent `flush()` calls are no-ops.
//! - The batch is physically removed from the queue before the await point,
//!   so records enqueued while a send is suspended can never corrupt the
//!   in-flight batch.
//! - 2xx resets the retry counter. 4xx drops the batch (the request itself
//!   is malformed; retrying cannot help). 5xx and transport errors restore
//!   the batch to the queue head and back off exponentially
//!   (`base * 2^(n-1)`), up to the retry budget; exhaustion drops the batch.
//! - A non-empty queue after a pass is processed as a follow-up batch on the
//!   next scheduler tick, never by growing the call stack.
//! - The flush future can be dropped at its send await (the debounce and
//!   retry timer tasks are abortable), so the guard is released by
//!   [`FlushGuard`]'s `Drop`, which also restores the extracted batch.
//!
//! Nothing here returns errors to callers: every outcome is logged on the
//! debug channel and absorbed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::errors::TransportError;
use crate::pipeline::{PipelineInner, PipelineState};
use crate::record::EventRecord;
use crate::transport::{SendReceipt, TrackRequest};

/// Classified outcome of one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// 2xx: the collector accepted the batch.
    Accepted,
    /// 4xx: malformed request; retrying is pointless. Drop the batch.
    Permanent(u16),
    /// 5xx or transport-level failure: worth retrying.
    Transient(String),
}

/// Map a transport result onto the failure taxonomy.
pub(crate) fn classify(result: Result<SendReceipt, TransportError>) -> Delivery {
    match result {
        Ok(receipt) if (200..300).contains(&receipt.status) => Delivery::Accepted,
        Ok(receipt) if (400..500).contains(&receipt.status) => Delivery::Permanent(receipt.status),
        Ok(receipt) => Delivery::Transient(format!("HTTP {}", receipt.status)),
        Err(error) => Delivery::Transient(error.to_string()),
    }
}

/// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX))
}

/// Owns the extracted batch and the single-flight flag while a send is in
/// flight.
///
/// Flush futures run inside abortable tasks, so straight-line release after
/// the await is not enough: a task aborted mid-send would otherwise leak the
/// batch and leave `flushing` set, wedging every later flush. `Drop` puts an
/// unhandled batch back at the queue head and clears the flag.
struct FlushGuard {
    inner: Arc<PipelineInner>,
    batch: Vec<EventRecord>,
}

impl FlushGuard {
    /// Hand the batch over for outcome handling; `Drop` becomes a no-op.
    fn finish(mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.batch)
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        let count = batch.len();
        let mut state = self.inner.state.lock();
        let dropped = state
            .queue
            .restore_to_front(batch, self.inner.tuning.max_failed_events);
        state.flushing = false;
        debug!(count, dropped, "flush cancelled mid-send, batch restored");
    }
}

/// Drain the queue: send batches until it is empty, a retry is scheduled,
/// or another flush holds the single-flight guard.
///
/// Boxed so the retry timer task can re-enter it without a recursive future
/// type; follow-up batches within one call are handled by the loop, yielding
/// to the scheduler between batches.
pub(crate) fn run_flush(inner: Arc<PipelineInner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        loop {
            let batch = {
                let mut state = inner.state.lock();
                // The debounce no longer needs to fire; this flush covers it.
                if let Some(timer) = state.debounce.take() {
                    timer.abort();
                }
                if state.flushing || state.queue.is_empty() {
                    return;
                }
                state.flushing = true;
                state.queue.extract_batch(inner.tuning.max_batch_size)
            };
            let guard = FlushGuard {
                inner: Arc::clone(&inner),
                batch,
            };

            let request = TrackRequest {
                endpoint: &inner.config.endpoint,
                api_key: &inner.config.api_key,
                events: &guard.batch,
            };
            let outcome = classify(inner.transport.send(request).await);
            let batch = guard.finish();

            let follow_up = {
                let mut state = inner.state.lock();
                match outcome {
                    Delivery::Accepted => {
                        debug!(count = batch.len(), "batch delivered");
                        state.retry_count = 0;
                    }
                    Delivery::Permanent(status) => {
                        debug!(status, count = batch.len(), "non-retryable failure, dropping batch");
                        state.retry_count = 0;
                    }
                    Delivery::Transient(reason) => {
                        handle_transient(&inner, &mut state, batch, &reason);
                    }
                }
                state.flushing = false;

                !state.queue.is_empty()
                    && state.retry_timer.is_none()
                    && !inner.shutdown.is_cancelled()
            };

            if !follow_up {
                return;
            }
            // Defer the next batch to a fresh tick so a large backlog is a
            // sequence of small passes, not a growing stack.
            tokio::task::yield_now().await;
        }
    })
}

/// Retryable-failure arm: restore, back off, or give up.
fn handle_transient(
    inner: &Arc<PipelineInner>,
    state: &mut PipelineState,
    batch: Vec<EventRecord>,
    reason: &str,
) {
    if inner.shutdown.is_cancelled() {
        // No retries once shutdown has begun.
        debug!(count = batch.len(), "shutdown in progress, dropping batch");
        state.retry_count = 0;
        return;
    }

    if state.retry_count >= inner.tuning.max_retries {
        debug!(
            count = batch.len(),
            max = inner.tuning.max_retries,
            "retry budget exhausted, dropping batch"
        );
        state.retry_count = 0;
        return;
    }

    let dropped = state
        .queue
        .restore_to_front(batch, inner.tuning.max_failed_events);
    if dropped > 0 {
        debug!(dropped, "retry buffer full, dropping overflow");
    }

    state.retry_count += 1;
    let delay = backoff_delay(inner.tuning.retry_base_delay, state.retry_count);
    debug!(
        attempt = state.retry_count,
        max = inner.tuning.max_retries,
        ?delay,
        reason,
        "scheduling retry"
    );
    schedule_retry(inner, state, delay);
}

/// Arm (or re-arm) the retry timer.
fn schedule_retry(inner: &Arc<PipelineInner>, state: &mut PipelineState, delay: Duration) {
    if let Some(timer) = state.retry_timer.take() {
        timer.abort();
    }

    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task_inner.state.lock().retry_timer = None;
        run_flush(task_inner).await;
    });
    state.retry_timer = Some(handle.abort_handle());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
