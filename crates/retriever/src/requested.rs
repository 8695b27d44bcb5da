//! Time cache of in-flight request keys.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Default lifetime of a requested-item entry.
pub const DEFAULT_SWEEP_SPAN: Duration = Duration::from_secs(1);

/// Lock-protected set of request keys with insertion timestamps.
///
/// The first `add` of a key within the sweep span wins; `has` reports the
/// key as in flight until a `sweep` removes entries older than the span.
#[derive(Debug)]
pub struct RequestedItems {
    entries: RwLock<HashMap<String, Instant>>,
    span: Duration,
}

impl RequestedItems {
    /// Cache with the default one-second span.
    pub fn new() -> Self {
        Self::with_span(DEFAULT_SWEEP_SPAN)
    }

    /// Cache with a custom span.
    pub fn with_span(span: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            span,
        }
    }

    /// Record a request attempt for `key`. Re-adding refreshes nothing:
    /// the original timestamp stands until swept.
    pub fn add(&self, key: &str) {
        self.entries
            .write()
            .entry(key.to_string())
            .or_insert_with(Instant::now);
    }

    /// Whether `key` was requested within the current window.
    pub fn has(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every entry older than the span.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .retain(|_, added| now.duration_since(*added) <= self.span);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for RequestedItems {
    fn default() -> Self {
        Self::new()
    }
}
