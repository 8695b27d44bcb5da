//! Metric persistence keyed by block nonce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use valence_core::metrics::{
    METRIC_COUNT_ACCEPTED_BLOCKS, METRIC_COUNT_CONSENSUS, METRIC_COUNT_LEADER, METRIC_NONCE,
    METRIC_SYNCHRONIZED_ROUND,
};
use valence_core::{Marshalizer, StatusHandler, Storer};

/// One stored metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    /// Unsigned counter or gauge.
    U64(u64),
    /// Signed gauge.
    I64(i64),
    /// Free-form string.
    Str(String),
}

/// Status handler that persists its metric map.
///
/// Only the pre-seeded persistent keys are tracked; updates for unknown
/// keys are dropped, matching the advisory nature of metrics. The map is
/// written to storage under the big-endian nonce whenever
/// [`METRIC_NONCE`] advances, once the startup grace period elapsed.
pub struct PersistentStatusHandler<S, M> {
    store: S,
    marshalizer: M,
    metrics: RwLock<HashMap<String, MetricValue>>,
    save_enabled: Arc<AtomicBool>,
}

impl<S, M> PersistentStatusHandler<S, M>
where
    S: Storer,
    M: Marshalizer,
{
    /// Create a handler over the given store. Persistence arms itself one
    /// second after construction so restart bursts do not thrash storage.
    pub fn new(store: S, marshalizer: M) -> Self {
        let mut metrics = HashMap::new();
        for key in [
            METRIC_NONCE,
            METRIC_SYNCHRONIZED_ROUND,
            METRIC_COUNT_CONSENSUS,
            METRIC_COUNT_LEADER,
            METRIC_COUNT_ACCEPTED_BLOCKS,
        ] {
            metrics.insert(key.to_string(), MetricValue::U64(0));
        }

        let save_enabled = Arc::new(AtomicBool::new(false));
        let armed = Arc::clone(&save_enabled);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            armed.store(true, Ordering::Release);
        });

        Self {
            store,
            marshalizer,
            metrics: RwLock::new(metrics),
            save_enabled,
        }
    }

    /// Snapshot of the tracked metrics.
    pub fn snapshot(&self) -> HashMap<String, MetricValue> {
        self.metrics.read().clone()
    }

    /// Load the metric map persisted for a nonce, when present.
    pub fn load(&self, nonce: u64) -> Option<HashMap<String, MetricValue>> {
        let bytes = self.store.get(&nonce.to_be_bytes()).ok()?;
        self.marshalizer.unmarshal(&bytes).ok()
    }

    fn save_metrics(&self, nonce: u64) {
        let snapshot = self.metrics.read().clone();
        let encoded = match self.marshalizer.marshal(&snapshot) {
            Ok(encoded) => encoded,
            Err(e) => {
                debug!(error = %e, "cannot marshal metrics map");
                return;
            }
        };
        if let Err(e) = self.store.put(&nonce.to_be_bytes(), &encoded) {
            debug!(error = %e, "cannot save metrics map in storage");
        }
    }
}

impl<S, M> StatusHandler for PersistentStatusHandler<S, M>
where
    S: Storer,
    M: Marshalizer,
{
    fn set_int64_value(&self, key: &str, value: i64) {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(key) {
            metrics.insert(key.to_string(), MetricValue::I64(value));
        }
    }

    fn set_uint64_value(&self, key: &str, value: u64) {
        let previous = {
            let mut metrics = self.metrics.write();
            if !metrics.contains_key(key) {
                return;
            }
            let previous = metrics.get(key).cloned();
            metrics.insert(key.to_string(), MetricValue::U64(value));
            previous
        };

        // the map is flushed every time a block is committed successfully
        if key != METRIC_NONCE {
            return;
        }
        if let Some(MetricValue::U64(prev)) = previous {
            if value < prev {
                return;
            }
        }
        if !self.save_enabled.load(Ordering::Acquire) {
            return;
        }
        self.save_metrics(value);
    }

    fn set_string_value(&self, key: &str, value: &str) {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(key) {
            metrics.insert(key.to_string(), MetricValue::Str(value.to_string()));
        }
    }

    fn increment(&self, key: &str) {
        self.add_uint64(key, 1);
    }

    fn decrement(&self, key: &str) {
        let mut metrics = self.metrics.write();
        if let Some(MetricValue::U64(value)) = metrics.get_mut(key) {
            *value = value.saturating_sub(1);
        }
    }

    fn add_uint64(&self, key: &str, value: u64) {
        let mut metrics = self.metrics.write();
        if let Some(MetricValue::U64(current)) = metrics.get_mut(key) {
            *current += value;
        }
    }
}
