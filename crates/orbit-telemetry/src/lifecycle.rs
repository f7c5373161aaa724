//! Lifecycle signals and shutdown-flush strategies.
//!
//! The host environment emits [`LifecycleEvent`]s (application hidden, about
//! to terminate); the pipeline only subscribes. Exactly one flush strategy is
//! registered at `init()`, chosen by sandbox capability:
//!
//! - [`SandboxPolicy::Restricted`] (sandboxed desktop runtime, no network
//!   during teardown): an ordinary asynchronous flush when the application
//!   becomes hidden. Termination signals are ignored; the hidden flush is the
//!   last safe opportunity.
//! - [`SandboxPolicy::Unrestricted`] (plain browser-like environment): a
//!   best-effort fire-and-forget send on termination, with the hidden-flush
//!   behavior kept as a fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::dispatcher;
use crate::pipeline::PipelineInner;
use crate::transport::send_detached;

/// Host lifecycle transitions relevant to telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application window became hidden.
    Hidden,
    /// The host is about to terminate; no further code may run after this.
    AboutToTerminate,
}

/// Source of lifecycle events. The pipeline subscribes, never emits.
pub trait LifecycleSignals: Send + Sync {
    /// Obtain a fresh receiver for lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent>;
}

/// What the execution sandbox permits during teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxPolicy {
    /// Synchronous network calls during teardown are forbidden.
    Restricted,
    /// Teardown-time fire-and-forget requests are allowed.
    Unrestricted,
}

/// Simple broadcast-backed [`LifecycleSignals`] implementation for hosts
/// (and tests) to emit events through.
pub struct LifecycleHub {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleHub {
    /// Create a hub with a small buffered channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Emit an event to all subscribers. Lossy when nobody listens.
    pub fn emit(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for LifecycleHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSignals for LifecycleHub {
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flush strategies
// ─────────────────────────────────────────────────────────────────────────────

/// A shutdown-flush behavior, selected once at init.
#[async_trait]
pub(crate) trait FlushStrategy: Send + Sync {
    /// React to a lifecycle event.
    async fn on_signal(&self, inner: &Arc<PipelineInner>, event: LifecycleEvent);
    /// One best-effort delivery during explicit pipeline shutdown.
    async fn teardown(&self, inner: &Arc<PipelineInner>);
}

/// Restricted sandboxes: asynchronous flush on hidden, nothing on terminate.
pub(crate) struct AsyncVisibilityFlush;

#[async_trait]
impl FlushStrategy for AsyncVisibilityFlush {
    async fn on_signal(&self, inner: &Arc<PipelineInner>, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Hidden => dispatcher::run_flush(Arc::clone(inner)).await,
            LifecycleEvent::AboutToTerminate => {
                debug!("termination signal ignored in restricted sandbox");
            }
        }
    }

    async fn teardown(&self, inner: &Arc<PipelineInner>) {
        dispatcher::run_flush(Arc::clone(inner)).await;
    }
}

/// Unrestricted environments: fire-and-forget on terminate, with the hidden
/// flush kept as a fallback.
pub(crate) struct BestEffortUnloadFlush;

#[async_trait]
impl FlushStrategy for BestEffortUnloadFlush {
    async fn on_signal(&self, inner: &Arc<PipelineInner>, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Hidden => dispatcher::run_flush(Arc::clone(inner)).await,
            LifecycleEvent::AboutToTerminate => detached_flush(inner),
        }
    }

    async fn teardown(&self, inner: &Arc<PipelineInner>) {
        detached_flush(inner);
    }
}

/// Extract one batch and hand it to the transport without waiting.
///
/// Bypasses the single-flight guard and retry machinery on purpose: there
/// will be no later opportunity to retry, and a guard held by an in-flight
/// flush must not silently discard the teardown attempt.
fn detached_flush(inner: &Arc<PipelineInner>) {
    let batch = {
        let mut state = inner.state.lock();
        state.queue.extract_batch(inner.tuning.max_batch_size)
    };
    if batch.is_empty() {
        return;
    }
    debug!(count = batch.len(), "best-effort teardown send");
    send_detached(
        &inner.transport,
        inner.config.endpoint.clone(),
        inner.config.api_key.clone(),
        batch,
    );
}

/// Pick the strategy for a sandbox policy.
pub(crate) fn select_strategy(policy: SandboxPolicy) -> Arc<dyn FlushStrategy> {
    match policy {
        SandboxPolicy::Restricted => Arc::new(AsyncVisibilityFlush),
        SandboxPolicy::Unrestricted => Arc::new(BestEffortUnloadFlush),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
