//! Status metrics seam.

/// Sink for node metrics.
///
/// Implementations must be safe for concurrent updates; all operations are
/// advisory and must never fail the caller.
pub trait StatusHandler: Send + Sync {
    /// Set a signed integer metric.
    fn set_int64_value(&self, key: &str, value: i64);

    /// Set an unsigned integer metric.
    fn set_uint64_value(&self, key: &str, value: u64);

    /// Set a string metric.
    fn set_string_value(&self, key: &str, value: &str);

    /// Increment a counter by one.
    fn increment(&self, key: &str);

    /// Decrement a counter by one, saturating at zero.
    fn decrement(&self, key: &str);

    /// Add to a counter.
    fn add_uint64(&self, key: &str, value: u64);
}

/// A status handler that drops every update; the default collaborator when
/// no metric sink is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilStatusHandler;

impl StatusHandler for NilStatusHandler {
    fn set_int64_value(&self, _key: &str, _value: i64) {}
    fn set_uint64_value(&self, _key: &str, _value: u64) {}
    fn set_string_value(&self, _key: &str, _value: &str) {}
    fn increment(&self, _key: &str) {}
    fn decrement(&self, _key: &str) {}
    fn add_uint64(&self, _key: &str, _value: u64) {}
}
