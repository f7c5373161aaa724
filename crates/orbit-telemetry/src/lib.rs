//! # orbit-telemetry
//!
//! Client-side telemetry event pipeline: accepts application events,
//! rate-limits and batches them, and delivers them to a remote collector
//! under unreliable network conditions — without blocking the caller or
//! growing memory without bound.
//!
//! Pipeline shape:
//!
//! ```text
//! track() -> [enabled? sanitize? throttle?] -> queue -> (debounce | soft cap)
//!         -> flush -> transport -> retry w/ exponential backoff -> requeue/drop
//! ```
//!
//! Delivery is best-effort: events may be dropped under throttling, on
//! non-retryable collector errors, or after the retry budget is exhausted.
//! Nothing in this crate ever propagates an error to the `track()` caller.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use orbit_telemetry::{
//!     HttpTransport, LifecycleHub, SandboxPolicy, SystemIdentity, Telemetry,
//!     TelemetryConfig,
//! };
//!
//! # async fn example() {
//! let transport = Arc::new(HttpTransport::direct().unwrap());
//! let identity = Arc::new(SystemIdentity::new("/home/me/.orbit", "1.4.0"));
//! let telemetry = Telemetry::new(TelemetryConfig::from_env(), transport, identity);
//!
//! let lifecycle = LifecycleHub::new();
//! telemetry.init(&lifecycle, SandboxPolicy::Restricted).await;
//!
//! telemetry.track("message_send", serde_json::json!({ "mode": "auto" }));
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
mod dispatcher;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod throttle;
pub mod transport;

pub use config::{ConfigSummary, DEFAULT_ENDPOINT, TelemetryConfig};
pub use errors::{IdentityError, TransportError};
pub use identity::{IdentityProvider, IdentitySnapshot, SystemIdentity};
pub use lifecycle::{LifecycleEvent, LifecycleHub, LifecycleSignals, SandboxPolicy};
pub use pipeline::{PipelineTuning, Telemetry};
pub use record::{EventParams, EventRecord, sanitize_params};
pub use transport::{HttpTransport, SendReceipt, TrackRequest, Transport, send_detached};
