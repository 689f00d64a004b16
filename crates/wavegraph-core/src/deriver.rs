//! # Signal Deriver
//!
//! Turns a node's recent point history into a wave function. Pure: the
//! caller fetches history and supplies timestamps.
//!
//! The derivation reads the rhythm off the newest few events: the mean gap
//! between the anchor and the most recent timestamps becomes the period,
//! the newest timestamp becomes the reference time, and the decay constant
//! is fixed. Zero-length gaps (duplicate timestamps, or a newest point that
//! coincides with the anchor) carry no rhythm and are skipped rather than
//! dragging the period toward zero.

use crate::primitives::{
    BASIS_SIN, DERIVED_DECAY, INTERVAL_SAMPLE_ENDPOINTS, MAX_DERIVE_POINTS,
};
use crate::wave::{BasisTerm, WaveFunc};

/// Derive a wave function from point timestamps, newest first.
///
/// Returns `None` when fewer than two points exist in the window, or when
/// every sampled gap is zero.
#[must_use]
pub fn derive_signal(timestamps_newest_first: &[f64], anchor: f64) -> Option<WaveFunc> {
    let recent = &timestamps_newest_first
        [..timestamps_newest_first.len().min(MAX_DERIVE_POINTS)];
    if recent.len() < 2 {
        return None;
    }

    // Anchor-led endpoint chain, newest to oldest.
    let mut endpoints = Vec::with_capacity(INTERVAL_SAMPLE_ENDPOINTS);
    endpoints.push(anchor);
    endpoints.extend(
        recent
            .iter()
            .copied()
            .take(INTERVAL_SAMPLE_ENDPOINTS - 1),
    );

    let gaps: Vec<f64> = endpoints
        .windows(2)
        .map(|pair| pair[0] - pair[1])
        .filter(|gap| *gap > 0.0)
        .collect();
    if gaps.is_empty() {
        return None;
    }

    let period = gaps.iter().sum::<f64>() / gaps.len() as f64;

    Some(WaveFunc {
        ref_time: recent[0],
        period,
        decay: DERIVED_DECAY,
        funcs: vec![BasisTerm::named(BASIS_SIN)],
    })
}

// =============================================================================
// TESTS
// =============================================================================
