//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Wavegraph kernel.
//!
//! These are compiled into the binary and immutable at runtime.

/// Default history window for signal derivation: 30 days of seconds.
pub const DEFAULT_HISTORY_WINDOW_SECS: f64 = 86_400.0 * 30.0;

/// Maximum number of recent points the deriver considers.
pub const MAX_DERIVE_POINTS: usize = 10;

/// Number of interval endpoints sampled for the average period.
///
/// The anchor time counts as the first endpoint, so at most
/// `INTERVAL_SAMPLE_ENDPOINTS - 1` points contribute gaps.
pub const INTERVAL_SAMPLE_ENDPOINTS: usize = 5;

/// Fixed decay rate applied to every derived wave function.
pub const DERIVED_DECAY: f64 = 0.2;

/// The single named basis shape currently supported: a normalized
/// cosine-derived oscillator. The historical wire name is "sin".
pub const BASIS_SIN: &str = "sin";

/// Wire protocol version carried in every signal envelope.
pub const ENVELOPE_VERSION: &str = "0.01";

/// Signal logs retain only the most recent entry (latest-value channel).
pub const SIGNAL_LOG_MAXLEN: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_thirty_days() {
        assert!((DEFAULT_HISTORY_WINDOW_SECS - 2_592_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn signal_log_is_latest_value_only() {
        assert_eq!(SIGNAL_LOG_MAXLEN, 1);
    }
}
