//! Wall-clock effect.

/// Source of the current time. Synchronous so the pure calculator can be fed
/// from any context.
pub trait Clock: Send + Sync {
    /// Unix milliseconds.
    fn now_ms(&self) -> u64;

    /// Unix seconds.
    fn now_secs(&self) -> u64 {
        self.now_ms() / 1_000
    }
}
