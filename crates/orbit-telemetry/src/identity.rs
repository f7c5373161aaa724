//! Device identity enrichment.
//!
//! Every record carries a device id, platform string, and app version. The
//! three values come from an [`IdentityProvider`] and are resolved once per
//! process: `init()` preloads them in parallel, after which [`IdentityCache`]
//! serves synchronous reads for the per-event hot path.
//!
//! If a read happens before preload completes (or preload failed), the cache
//! falls back to a process-temporary device id / `unknown` strings and pins
//! that fallback for the rest of the process, so a given process never emits
//! two different identities.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

use crate::errors::IdentityError;

/// File under the data dir holding the persisted device id.
const DEVICE_ID_FILE: &str = "device_id";

/// Supplies the enrichment fields stamped onto every event.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable device identifier.
    async fn device_id(&self) -> Result<String, IdentityError>;
    /// Platform string, e.g. `darwin-aarch64`.
    async fn platform(&self) -> Result<String, IdentityError>;
    /// Application version.
    async fn app_version(&self) -> Result<String, IdentityError>;
}

/// Cached identity values cloned onto each record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySnapshot {
    /// Stable device identifier.
    pub device_id: String,
    /// Platform string.
    pub platform: String,
    /// Application version.
    pub app_version: String,
}

/// Once-per-process cache in front of an [`IdentityProvider`].
pub(crate) struct IdentityCache {
    provider: Arc<dyn IdentityProvider>,
    device_id: OnceCell<String>,
    platform: OnceCell<String>,
    app_version: OnceCell<String>,
}

impl IdentityCache {
    pub(crate) fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            device_id: OnceCell::new(),
            platform: OnceCell::new(),
            app_version: OnceCell::new(),
        }
    }

    /// Resolve all three fields in parallel and cache them.
    pub(crate) async fn preload(&self) {
        let _ = tokio::join!(
            self.device_id.get_or_init(|| async {
                self.provider.device_id().await.unwrap_or_else(|error| {
                    warn!(%error, "device id unavailable, using temporary id");
                    temp_device_id()
                })
            }),
            self.platform.get_or_init(|| async {
                self.provider.platform().await.unwrap_or_else(|error| {
                    warn!(%error, "platform unavailable");
                    "unknown".to_string()
                })
            }),
            self.app_version.get_or_init(|| async {
                self.provider.app_version().await.unwrap_or_else(|error| {
                    warn!(%error, "app version unavailable");
                    "unknown".to_string()
                })
            }),
        );
    }

    /// Synchronous read of the cached values.
    ///
    /// Fields read before preload settle on a fallback value, which is then
    /// cached so subsequent snapshots agree.
    pub(crate) fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            device_id: cached_or(&self.device_id, temp_device_id),
            platform: cached_or(&self.platform, || "unknown".to_string()),
            app_version: cached_or(&self.app_version, || "unknown".to_string()),
        }
    }
}

fn cached_or(cell: &OnceCell<String>, fallback: impl FnOnce() -> String) -> String {
    if let Some(value) = cell.get() {
        return value.clone();
    }
    let value = fallback();
    // A concurrent preload may have won the race; prefer whatever stuck.
    let _ = cell.set(value.clone());
    cell.get().cloned().unwrap_or(value)
}

/// Process-temporary device id used when persistence is unavailable.
fn temp_device_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("temp-{millis}-{suffix}")
}

// ─────────────────────────────────────────────────────────────────────────────
// SystemIdentity — default provider
// ─────────────────────────────────────────────────────────────────────────────

/// Default provider: file-persisted device id, compile-time platform,
/// caller-supplied app version.
///
/// The device id is a UUID v4 stored at `<data_dir>/device_id`, created on
/// first use and reused across runs.
pub struct SystemIdentity {
    data_dir: PathBuf,
    app_version: String,
}

impl SystemIdentity {
    /// Create a provider rooted at `data_dir`, reporting `app_version`.
    pub fn new(data_dir: impl Into<PathBuf>, app_version: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            app_version: app_version.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SystemIdentity {
    async fn device_id(&self) -> Result<String, IdentityError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.data_dir.join(DEVICE_ID_FILE);

        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        let id = Uuid::new_v4().to_string();
        tokio::fs::write(&path, &id).await?;
        Ok(id)
    }

    async fn platform(&self) -> Result<String, IdentityError> {
        Ok(platform_string())
    }

    async fn app_version(&self) -> Result<String, IdentityError> {
        Ok(self.app_version.clone())
    }
}

/// `<os>-<arch>` using release-artifact os names (`darwin`, not `macos`).
fn platform_string() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        "" => "unknown",
        other => other,
    };
    format!("{os}-{}", std::env::consts::ARCH)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn device_id(&self) -> Result<String, IdentityError> {
            Err(IdentityError::Unavailable("no store".to_string()))
        }
        async fn platform(&self) -> Result<String, IdentityError> {
            Err(IdentityError::Unavailable("no store".to_string()))
        }
        async fn app_version(&self) -> Result<String, IdentityError> {
            Err(IdentityError::Unavailable("no store".to_string()))
        }
    }

    #[tokio::test]
    async fn system_identity_persists_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SystemIdentity::new(dir.path(), "1.0.0");

        let first = provider.device_id().await.unwrap();
        let second = provider.device_id().await.unwrap();
        assert_eq!(first, second, "same dir must yield the same id");
        assert!(Uuid::parse_str(&first).is_ok());

        let on_disk = std::fs::read_to_string(dir.path().join(DEVICE_ID_FILE)).unwrap();
        assert_eq!(on_disk.trim(), first);
    }

    #[tokio::test]
    async fn system_identity_fresh_dirs_differ() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id_a = SystemIdentity::new(a.path(), "1").device_id().await.unwrap();
        let id_b = SystemIdentity::new(b.path(), "1").device_id().await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn system_identity_reports_version_and_platform() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SystemIdentity::new(dir.path(), "3.1.4");
        assert_eq!(provider.app_version().await.unwrap(), "3.1.4");

        let platform = provider.platform().await.unwrap();
        assert!(platform.contains('-'));
        assert!(!platform.starts_with("macos"), "macos maps to darwin");
    }

    #[tokio::test]
    async fn cache_preload_resolves_all_fields_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IdentityCache::new(Arc::new(SystemIdentity::new(dir.path(), "9.9.9")));
        cache.preload().await;

        let snap1 = cache.snapshot();
        let snap2 = cache.snapshot();
        assert_eq!(snap1, snap2);
        assert_eq!(snap1.app_version, "9.9.9");
        assert!(Uuid::parse_str(&snap1.device_id).is_ok());
    }

    #[tokio::test]
    async fn cache_falls_back_and_pins_fallback() {
        let cache = IdentityCache::new(Arc::new(FailingProvider));
        cache.preload().await;

        let snap1 = cache.snapshot();
        let snap2 = cache.snapshot();
        assert!(snap1.device_id.starts_with("temp-"));
        assert_eq!(snap1.device_id, snap2.device_id, "fallback id must be stable");
        assert_eq!(snap1.platform, "unknown");
        assert_eq!(snap1.app_version, "unknown");
    }

    #[tokio::test]
    async fn snapshot_before_preload_is_stable() {
        let cache = IdentityCache::new(Arc::new(FailingProvider));
        let early = cache.snapshot();
        let later = cache.snapshot();
        assert_eq!(early.device_id, later.device_id);
    }
}
