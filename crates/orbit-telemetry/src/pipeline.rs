//! Pipeline instance: the public `track()` entry point.
//!
//! [`Telemetry`] owns every piece of mutable pipeline state (queue, throttle
//! window, timers, retry counter) behind one instance, constructed once and
//! disposed with [`Telemetry::shutdown`]. `track()` is fire-and-forget: it
//! never blocks, never returns an error, and never panics on caller input.
//!
//! Flow: `track()` checks the cached enabled state, sanitizes params,
//! enriches from the identity cache, and admits the record through the
//! throttle into the queue. Enqueuing re-arms a debounce timer; hitting the
//! soft cap triggers an immediate flush instead. Delivery and retry live in
//! the dispatcher.
//!
//! `track()` and the timers spawn tasks, so a `Telemetry` must live inside a
//! tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ConfigSummary, TelemetryConfig};
use crate::dispatcher;
use crate::identity::{IdentityCache, IdentityProvider};
use crate::lifecycle::{self, FlushStrategy, LifecycleSignals, SandboxPolicy};
use crate::queue::EventQueue;
use crate::record::{EventRecord, sanitize_params};
use crate::throttle::RateLimiter;
use crate::transport::Transport;

/// Tuning knobs for the pipeline. Production uses the defaults; tests
/// shrink the windows.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Debounce delay before an enqueue-triggered flush.
    pub flush_delay: Duration,
    /// Queue length that forces an immediate flush (soft cap).
    pub max_queue_size: usize,
    /// Most records delivered in one batch.
    pub max_batch_size: usize,
    /// Retry attempts before a failed batch is dropped.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Hard bound on queue length during failed-batch restoration.
    pub max_failed_events: usize,
    /// Sliding throttle window length.
    pub throttle_window: Duration,
    /// Admissions allowed per throttle window.
    pub max_events_per_window: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_millis(500),
            max_queue_size: 50,
            max_batch_size: 100,
            max_retries: 5,
            retry_base_delay: Duration::from_millis(1000),
            max_failed_events: 500,
            throttle_window: Duration::from_secs(60),
            max_events_per_window: 200,
        }
    }
}

/// Mutable pipeline state, guarded by one mutex.
///
/// Lock scopes are short and never held across an await; mutual exclusion
/// for delivery itself is the `flushing` single-flight flag.
pub(crate) struct PipelineState {
    pub(crate) queue: EventQueue,
    pub(crate) throttle: RateLimiter,
    pub(crate) debounce: Option<AbortHandle>,
    pub(crate) retry_timer: Option<AbortHandle>,
    pub(crate) retry_count: u32,
    pub(crate) flushing: bool,
}

/// Shared core behind `Telemetry` handles and pipeline tasks.
pub(crate) struct PipelineInner {
    pub(crate) config: TelemetryConfig,
    /// `config.is_active()` resolved once at construction.
    pub(crate) active: bool,
    pub(crate) tuning: PipelineTuning,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) identity: IdentityCache,
    pub(crate) state: Mutex<PipelineState>,
    pub(crate) shutdown: CancellationToken,
    initialized: AtomicBool,
    strategy: OnceLock<Arc<dyn FlushStrategy>>,
}

/// Telemetry pipeline handle. Cheap to clone; all clones share one pipeline.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<PipelineInner>,
}

impl Telemetry {
    /// Create a pipeline with default tuning.
    pub fn new(
        config: TelemetryConfig,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self::with_tuning(config, transport, identity, PipelineTuning::default())
    }

    /// Create a pipeline with explicit tuning.
    pub fn with_tuning(
        config: TelemetryConfig,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
        tuning: PipelineTuning,
    ) -> Self {
        let active = config.is_active();
        let state = PipelineState {
            queue: EventQueue::new(),
            throttle: RateLimiter::new(tuning.throttle_window, tuning.max_events_per_window),
            debounce: None,
            retry_timer: None,
            retry_count: 0,
            flushing: false,
        };
        Self {
            inner: Arc::new(PipelineInner {
                config,
                active,
                tuning,
                transport,
                identity: IdentityCache::new(identity),
                state: Mutex::new(state),
                shutdown: CancellationToken::new(),
                initialized: AtomicBool::new(false),
                strategy: OnceLock::new(),
            }),
        }
    }

    /// Initialize the pipeline: preload identity fields in parallel and
    /// register exactly one lifecycle flush strategy for `sandbox`.
    ///
    /// Idempotent; a second call does nothing.
    pub async fn init(&self, signals: &dyn LifecycleSignals, sandbox: SandboxPolicy) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.identity.preload().await;

        let strategy = lifecycle::select_strategy(sandbox);
        let _ = self.inner.strategy.set(Arc::clone(&strategy));

        let mut rx = signals.subscribe();
        let inner = Arc::clone(&self.inner);
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Ok(event) => strategy.on_signal(&inner, event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "lifecycle receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    () = inner.shutdown.cancelled() => break,
                }
            }
        }));
    }

    /// Record an event. Fire-and-forget: never blocks, never fails.
    ///
    /// No-op when telemetry is disabled, after shutdown, for an empty event
    /// name, or when the throttle denies admission.
    pub fn track(&self, event: &str, params: Value) {
        if !self.inner.active || self.inner.shutdown.is_cancelled() {
            return;
        }
        if event.is_empty() {
            debug!("empty event name ignored");
            return;
        }

        let params = sanitize_params(params);
        let record = EventRecord::new(event, &self.inner.identity.snapshot(), params);
        self.admit(record);
    }

    /// Throttle-gated admission into the queue, plus timer management.
    fn admit(&self, record: EventRecord) {
        let soft_cap_hit = {
            let mut state = self.inner.state.lock();
            if !state.throttle.admit(Instant::now()) {
                debug!(event = %record.event, "event throttled, dropping");
                return;
            }
            state.queue.enqueue(record);

            // Debounce: each enqueue restarts the quiet-period timer.
            if let Some(timer) = state.debounce.take() {
                timer.abort();
            }
            let task_inner = Arc::clone(&self.inner);
            let delay = self.inner.tuning.flush_delay;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                {
                    task_inner.state.lock().debounce = None;
                }
                dispatcher::run_flush(task_inner).await;
            });
            state.debounce = Some(handle.abort_handle());

            state.queue.len() >= self.inner.tuning.max_queue_size
        };

        if soft_cap_hit {
            drop(tokio::spawn(dispatcher::run_flush(Arc::clone(&self.inner))));
        }
    }

    /// Deliver pending events now, bypassing the debounce delay.
    ///
    /// Idempotent and re-entrant-safe: while a flush is in flight, further
    /// calls are no-ops; the in-flight flush picks up whatever remains.
    pub async fn flush(&self) {
        dispatcher::run_flush(Arc::clone(&self.inner)).await;
    }

    /// Dispose of the pipeline: cancel all timers, stop scheduling retries,
    /// and make one best-effort flush attempt using the strategy selected at
    /// init. Subsequent `track()` calls are no-ops.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if let Some(timer) = state.debounce.take() {
                timer.abort();
            }
            if let Some(timer) = state.retry_timer.take() {
                timer.abort();
            }
        }
        self.inner.shutdown.cancel();

        if let Some(strategy) = self.inner.strategy.get() {
            strategy.teardown(&self.inner).await;
        } else {
            dispatcher::run_flush(Arc::clone(&self.inner)).await;
        }
    }

    /// Whether telemetry is active (enabled flag and API key both present).
    pub fn is_enabled(&self) -> bool {
        self.inner.active
    }

    /// Number of records currently queued. Diagnostic helper.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Drop all queued records, cancel pending timers, and reset retry and
    /// single-flight state. Diagnostic/test helper.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.queue.clear();
        if let Some(timer) = state.debounce.take() {
            timer.abort();
        }
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        state.retry_count = 0;
        state.flushing = false;
    }

    /// Redacted configuration snapshot for diagnostics.
    pub fn config_summary(&self) -> ConfigSummary {
        self.inner.config.summary()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{IdentityError, TransportError};
    use crate::transport::{SendReceipt, TrackRequest};
    use async_trait::async_trait;
    use serde_json::json;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _request: TrackRequest<'_>) -> Result<SendReceipt, TransportError> {
            Ok(SendReceipt {
                status: 200,
                body: Value::Null,
            })
        }
    }

    struct StaticIdentity;

    #[async_trait]
    impl IdentityProvider for StaticIdentity {
        async fn device_id(&self) -> Result<String, IdentityError> {
            Ok("dev-test".to_string())
        }
        async fn platform(&self) -> Result<String, IdentityError> {
            Ok("linux-x86_64".to_string())
        }
        async fn app_version(&self) -> Result<String, IdentityError> {
            Ok("0.1.0".to_string())
        }
    }

    fn enabled_config() -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            api_key: "k".to_string(),
            endpoint: "http://127.0.0.1:0/track".to_string(),
        }
    }

    fn pipeline(config: TelemetryConfig) -> Telemetry {
        Telemetry::new(config, Arc::new(NullTransport), Arc::new(StaticIdentity))
    }

    #[tokio::test]
    async fn disabled_pipeline_tracks_nothing() {
        let telemetry = pipeline(TelemetryConfig::default());
        assert!(!telemetry.is_enabled());
        telemetry.track("x", json!({"a": 1}));
        assert_eq!(telemetry.queue_len(), 0);
    }

    #[tokio::test]
    async fn missing_api_key_disables() {
        let telemetry = pipeline(TelemetryConfig {
            enabled: true,
            ..Default::default()
        });
        telemetry.track("x", json!({}));
        assert_eq!(telemetry.queue_len(), 0);
    }

    #[tokio::test]
    async fn empty_event_name_is_ignored() {
        let telemetry = pipeline(enabled_config());
        telemetry.track("", json!({}));
        assert_eq!(telemetry.queue_len(), 0);
    }

    #[tokio::test]
    async fn track_enqueues_enriched_record() {
        let telemetry = pipeline(enabled_config());
        telemetry.track("message_send", json!({"mode": "auto"}));
        assert_eq!(telemetry.queue_len(), 1);
    }

    #[tokio::test]
    async fn clear_resets_queue_and_timers() {
        let telemetry = pipeline(enabled_config());
        telemetry.track("a", json!({}));
        telemetry.track("b", json!({}));
        assert_eq!(telemetry.queue_len(), 2);

        telemetry.clear();
        assert_eq!(telemetry.queue_len(), 0);
        let state = telemetry.inner.state.lock();
        assert!(state.debounce.is_none());
        assert!(state.retry_timer.is_none());
        assert_eq!(state.retry_count, 0);
        assert!(!state.flushing);
    }

    #[tokio::test]
    async fn track_after_shutdown_is_noop() {
        let telemetry = pipeline(enabled_config());
        telemetry.shutdown().await;
        telemetry.track("late", json!({}));
        assert_eq!(telemetry.queue_len(), 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let telemetry = pipeline(enabled_config());
        telemetry.shutdown().await;
        telemetry.shutdown().await;
    }

    #[tokio::test]
    async fn config_summary_is_redacted() {
        let telemetry = pipeline(enabled_config());
        let summary = telemetry.config_summary();
        assert!(summary.enabled);
        assert!(summary.has_api_key);
    }
}
