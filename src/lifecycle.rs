//! Adapter lifecycle: init and release with unbounded, de-duplicated retry.
//!
//! Callers get a completion signal that never carries a fatal error; a venue
//! that fails to come up keeps retrying in the background on the configured
//! cadence until the process exits. Exactly one retry loop runs per
//! (operation, venue) at any time.

use dashmap::DashMap;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::RawCache;
use crate::metrics;
use crate::registry::DexRegistry;
use crate::settings::PricingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleOp {
    Initialize(u64),
    Release,
}

impl LifecycleOp {
    fn name(&self) -> &'static str {
        match self {
            LifecycleOp::Initialize(_) => "initialize",
            LifecycleOp::Release => "release",
        }
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    registry: Arc<DexRegistry>,
    cache: Arc<dyn RawCache>,
    /// Only the master process invalidates shared cache keys; replicas
    /// rebuild from whatever the master left behind.
    is_master: bool,
    retry_timeout: Duration,
    pending_retries: Arc<DashMap<(&'static str, String), ()>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<DexRegistry>, cache: Arc<dyn RawCache>, settings: &PricingSettings) -> Self {
        Self {
            registry,
            cache,
            is_master: !settings.is_slave,
            retry_timeout: settings.setup_retry_timeout(),
            pending_retries: Arc::new(DashMap::new()),
        }
    }

    /// Initializes every venue in `keys` concurrently. Returns when each
    /// venue has either initialized or had a retry scheduled.
    pub async fn initialize(&self, block_number: u64, keys: &[String]) {
        self.run(LifecycleOp::Initialize(block_number), keys).await;
    }

    /// Releases every venue in `keys` concurrently, mirroring `initialize`.
    pub async fn release_resources(&self, keys: &[String]) {
        self.run(LifecycleOp::Release, keys).await;
    }

    async fn run(&self, op: LifecycleOp, keys: &[String]) {
        let tasks = keys.iter().map(|key| {
            let key = key.clone();
            async move {
                // unknown keys are permanent, retrying cannot fix them
                if let Err(e) = self.registry.dex_by_key(&key) {
                    warn!("{key}: skipping {}: {e}", op.name());
                    return;
                }
                match self.attempt(op, &key).await {
                    Ok(()) => info!("{key}: {} complete", op.name()),
                    Err(e) => {
                        error!("{key}: {} failed: {e}, scheduling retry", op.name());
                        self.schedule_retry(op, key);
                    }
                }
            }
        });
        join_all(tasks).await;
    }

    async fn attempt(&self, op: LifecycleOp, key: &str) -> anyhow::Result<()> {
        let adapter = self.registry.dex_by_key(key)?;
        if !adapter.supports_pricing_lifecycle() {
            return Ok(());
        }
        match op {
            LifecycleOp::Initialize(block_number) => {
                if self.is_master {
                    if let Some(cache_key) = adapter.cache_state_key() {
                        // best-effort hint invalidation, not correctness-critical
                        if let Err(e) = self.cache.rawdel(&cache_key).await {
                            warn!("{key}: failed to invalidate cache key {cache_key}: {e}");
                        }
                    }
                }
                adapter.initialize_pricing(block_number).await
            }
            LifecycleOp::Release => adapter.release_resources().await,
        }
    }

    /// Spawns the background retry loop unless one is already running for
    /// this (operation, venue). The loop survives caller cancellation and
    /// only stops on success.
    fn schedule_retry(&self, op: LifecycleOp, key: String) {
        if self
            .pending_retries
            .insert((op.name(), key.clone()), ())
            .is_some()
        {
            debug!("{key}: {} retry already scheduled", op.name());
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(manager.retry_timeout).await;
                metrics::increment_lifecycle_retry(op.name(), &key);
                match manager.attempt(op, &key).await {
                    Ok(()) => {
                        info!("{key}: {} retry succeeded", op.name());
                        manager.pending_retries.remove(&(op.name(), key.clone()));
                        break;
                    }
                    Err(e) => warn!("{key}: {} retry failed: {e}", op.name()),
                }
            }
        });
    }
}
