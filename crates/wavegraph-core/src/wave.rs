//! # Wave-Function Signal Algebra
//!
//! Pure computation of a decaying periodic scalar from parameters; no I/O.
//!
//! A [`WaveFunc`] is anchored at `ref_time`, repeats every `period` seconds,
//! and is attenuated by `exp(-decay * age / period)` as the anchor ages.
//! Basis terms are either named oscillators or nested wave functions; the
//! mean of all terms gives the in-period position.
//!
//! The gated variant ([`GatedWaveFunc`]) splits one period into equal
//! sub-periods and is non-zero only inside the active ones.
//!
//! ## Decay convention
//!
//! `resolve(t) = compute_pos(fraction, t) * exp(-decay * age / period)` —
//! the signal strictly decays toward 0 as the last event ages. The envelope
//! alone is available through `resolve_max`.

use crate::WavegraphError;
use crate::primitives::BASIS_SIN;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::PI;

// =============================================================================
// BASE OSCILLATOR
// =============================================================================

/// Map a normalized position to one full oscillation.
///
/// `x` is clamped to [0, 1]; the result is `(cos(2πx) + 1) / 2`, also in
/// [0, 1], peaking at the period boundaries.
#[must_use]
pub fn base_position(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    ((x * 2.0 * PI).cos() + 1.0) / 2.0
}

// =============================================================================
// WAVE FUNCTION
// =============================================================================

/// In-period decomposition of an instant, produced by `compute_periods`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Periods {
    /// Seconds since `ref_time` (may be negative for instants before it).
    pub age: f64,
    /// Seconds into the current period, in [0, period).
    pub partial: f64,
    /// `partial / period`, in [0, 1).
    pub fraction: f64,
}

/// One basis term: a named oscillator or a nested wave function, with a
/// phase offset. The phase is carried through serialization but not applied
/// during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisTerm {
    pub func: Basis,
    pub phase: f64,
}

impl BasisTerm {
    /// A named oscillator term at phase 0.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            func: Basis::Named(name.to_string()),
            phase: 0.0,
        }
    }

    /// A nested wave-function term at phase 0.
    #[must_use]
    pub fn composite(expr: WaveExpr) -> Self {
        Self {
            func: Basis::Composite(Box::new(expr)),
            phase: 0.0,
        }
    }
}

/// Tagged basis variant, resolved by pattern match. On the wire a named
/// term is a bare string, a nested term the serialized child object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Basis {
    Named(String),
    Composite(Box<WaveExpr>),
}

/// A periodic, decaying scalar signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveFunc {
    /// Epoch-seconds anchor, normally the newest event time.
    pub ref_time: f64,
    /// Period length in seconds; must be > 0 to resolve.
    pub period: f64,
    /// Non-negative decay rate per period.
    pub decay: f64,
    /// Ordered basis terms, averaged.
    pub funcs: Vec<BasisTerm>,
}

impl WaveFunc {
    /// Build a wave function over the given basis terms.
    #[must_use]
    pub fn new(ref_time: f64, period: f64, decay: f64, funcs: Vec<BasisTerm>) -> Self {
        Self {
            ref_time,
            period,
            decay,
            funcs,
        }
    }

    /// Decompose an instant into age, partial period, and fraction.
    pub fn compute_periods(&self, t: f64) -> Result<Periods, WavegraphError> {
        if self.period <= 0.0 {
            return Err(WavegraphError::InvalidParameter(format!(
                "period must be positive, got {}",
                self.period
            )));
        }

        let age = t - self.ref_time;
        // rem_euclid keeps the fraction in [0, 1) for instants before the
        // anchor as well.
        let partial = age.rem_euclid(self.period);
        let fraction = partial / self.period;

        Ok(Periods {
            age,
            partial,
            fraction,
        })
    }

    /// Average of each basis term at the given fraction.
    ///
    /// Named terms evaluate at `fraction`; nested wave functions resolve at
    /// the instant `t` against their own anchor and period.
    pub fn compute_pos(&self, fraction: f64, t: f64) -> Result<f64, WavegraphError> {
        if self.funcs.is_empty() {
            return Err(WavegraphError::EmptyBasis);
        }

        let mut total = 0.0;
        for term in &self.funcs {
            total += match &term.func {
                Basis::Named(name) => {
                    if name != BASIS_SIN {
                        return Err(WavegraphError::InvalidParameter(format!(
                            "unknown basis function: {name}"
                        )));
                    }
                    base_position(fraction)
                }
                Basis::Composite(expr) => expr.resolve(t)?,
            };
        }

        Ok(total / self.funcs.len() as f64)
    }

    /// Attenuation for an instant `age` seconds past the anchor.
    pub fn decay_factor(&self, age: f64) -> Result<f64, WavegraphError> {
        if self.period <= 0.0 {
            return Err(WavegraphError::InvalidParameter(format!(
                "period must be positive, got {}",
                self.period
            )));
        }
        Ok((-self.decay * age / self.period).exp())
    }

    /// The signal value at instant `t`.
    pub fn resolve(&self, t: f64) -> Result<f64, WavegraphError> {
        let periods = self.compute_periods(t)?;
        let pos = self.compute_pos(periods.fraction, t)?;
        Ok(pos * self.decay_factor(periods.age)?)
    }

    /// Peak-envelope probe: the value assuming the fractional position is
    /// exactly 1.0, decayed by age from `ref_time` to `t`.
    pub fn resolve_max(&self, t: f64) -> Result<f64, WavegraphError> {
        let age = t - self.ref_time;
        let pos = self.compute_pos(1.0, t)?;
        Ok(pos * self.decay_factor(age)?)
    }
}

// =============================================================================
// GATED WAVE FUNCTION
// =============================================================================

/// A wave function active only during specific sub-intervals of its period.
///
/// One period is partitioned into `num_int_periods` equal sub-periods; the
/// signal is non-zero only when the sub-period index is in
/// `int_periods_active`. `int_phase` is retained for serialization fidelity
/// and not used by computation.
///
/// The extra wire keys (`IntPhase` and friends) keep the historical
/// capitalization of the persisted format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedWaveFunc {
    #[serde(flatten)]
    pub wave: WaveFunc,
    #[serde(rename = "IntPhase")]
    pub int_phase: f64,
    #[serde(rename = "IntPeriod")]
    pub int_period: f64,
    #[serde(rename = "NumIntPeriods")]
    pub num_int_periods: u32,
    #[serde(rename = "IntPeriodsActive")]
    pub int_periods_active: BTreeSet<u32>,
}

impl GatedWaveFunc {
    /// Build a gated wave function over a base one.
    pub fn new(
        wave: WaveFunc,
        int_phase: f64,
        num_int_periods: u32,
        int_periods_active: BTreeSet<u32>,
    ) -> Result<Self, WavegraphError> {
        if num_int_periods == 0 {
            return Err(WavegraphError::InvalidParameter(
                "num_int_periods must be positive".to_string(),
            ));
        }

        let int_period = wave.period / f64::from(num_int_periods);
        Ok(Self {
            wave,
            int_phase,
            int_period,
            num_int_periods,
            int_periods_active,
        })
    }

    /// The signal value at instant `t`: 0 outside active sub-periods,
    /// otherwise the basis mean at the sub-period-local fraction, decayed
    /// by the outer age.
    pub fn resolve(&self, t: f64) -> Result<f64, WavegraphError> {
        let periods = self.wave.compute_periods(t)?;

        if self.int_period <= 0.0 {
            return Err(WavegraphError::InvalidParameter(format!(
                "int_period must be positive, got {}",
                self.int_period
            )));
        }

        let index = (periods.partial / self.int_period).floor();
        let int_partial = periods.partial - index * self.int_period;

        if index < 0.0 || !self.int_periods_active.contains(&(index as u32)) {
            return Ok(0.0);
        }

        let int_fraction = int_partial / self.int_period;
        let pos = self.wave.compute_pos(int_fraction, t)?;
        Ok(pos * self.wave.decay_factor(periods.age)?)
    }

    /// Peak-envelope probe, identical to the base variant.
    pub fn resolve_max(&self, t: f64) -> Result<f64, WavegraphError> {
        self.wave.resolve_max(t)
    }
}

// =============================================================================
// WAVE EXPRESSION (serialization root)
// =============================================================================

/// A wave function of either variant. This is the shape stored in signal
/// logs and pushed over the wire; the gated variant is recognized by its
/// extra keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaveExpr {
    Gated(GatedWaveFunc),
    Base(WaveFunc),
}

impl WaveExpr {
    /// The signal value at instant `t`.
    pub fn resolve(&self, t: f64) -> Result<f64, WavegraphError> {
        match self {
            Self::Gated(gated) => gated.resolve(t),
            Self::Base(wave) => wave.resolve(t),
        }
    }

    /// Peak-envelope probe at instant `t`.
    pub fn resolve_max(&self, t: f64) -> Result<f64, WavegraphError> {
        match self {
            Self::Gated(gated) => gated.resolve_max(t),
            Self::Base(wave) => wave.resolve_max(t),
        }
    }

    /// The underlying parameter block.
    #[must_use]
    pub fn wave(&self) -> &WaveFunc {
        match self {
            Self::Gated(gated) => &gated.wave,
            Self::Base(wave) => wave,
        }
    }
}

impl From<WaveFunc> for WaveExpr {
    fn from(wave: WaveFunc) -> Self {
        Self::Base(wave)
    }
}

impl From<GatedWaveFunc> for WaveExpr {
    fn from(gated: GatedWaveFunc) -> Self {
        Self::Gated(gated)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sin_wave(ref_time: f64, period: f64, decay: f64) -> WaveFunc {
        WaveFunc::new(ref_time, period, decay, vec![BasisTerm::named(BASIS_SIN)])
    }

    #[test]
    fn base_position_bounds_and_peaks() {
        assert!((base_position(0.0) - 1.0).abs() < 1e-12);
        assert!((base_position(1.0) - 1.0).abs() < 1e-12);
        assert!(base_position(0.5).abs() < 1e-12);
        // Out-of-range input clamps
        assert!((base_position(-3.0) - 1.0).abs() < 1e-12);
        assert!((base_position(7.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn resolve_at_anchor_is_one() {
        let wave = sin_wave(1000.0, 600.0, 0.2);
        let val = wave.resolve(1000.0).expect("resolve");
        assert!((val - 1.0).abs() < 1e-12);
    }

    #[test]
    fn resolve_decays_with_age() {
        let wave = sin_wave(0.0, 600.0, 0.2);
        // Sample at whole periods so the oscillation term is constant
        let mut last = f64::INFINITY;
        for k in 0..10 {
            let val = wave.resolve(600.0 * f64::from(k)).expect("resolve");
            assert!(val < last);
            last = val;
        }
    }

    #[test]
    fn periodicity_up_to_envelope() {
        let wave = sin_wave(0.0, 600.0, 0.0);
        for k in 0..5 {
            let offset = 123.4;
            let a = wave.resolve(offset).expect("resolve");
            let b = wave.resolve(offset + 600.0 * f64::from(k)).expect("resolve");
            assert!((a - b).abs() < 1e-9, "k={k}: {a} vs {b}");
        }
    }

    #[test]
    fn resolve_max_is_pure_envelope() {
        let wave = sin_wave(0.0, 100.0, 0.5);
        // At fraction 1.0 the oscillator contributes exactly 1
        let val = wave.resolve_max(250.0).expect("resolve_max");
        assert!((val - (-0.5_f64 * 2.5).exp()).abs() < 1e-12);
    }

    #[test]
    fn instant_before_anchor_keeps_fraction_in_range() {
        let wave = sin_wave(1000.0, 600.0, 0.0);
        let periods = wave.compute_periods(700.0).expect("periods");
        assert!(periods.age < 0.0);
        assert!((0.0..1.0).contains(&periods.fraction));
    }

    #[test]
    fn zero_period_is_invalid() {
        let wave = sin_wave(0.0, 0.0, 0.2);
        let err = wave.resolve(10.0).expect_err("must fail");
        assert!(matches!(err, WavegraphError::InvalidParameter(_)));
    }

    #[test]
    fn empty_basis_is_an_explicit_error() {
        let wave = WaveFunc::new(0.0, 600.0, 0.2, Vec::new());
        let err = wave.resolve(10.0).expect_err("must fail");
        assert!(matches!(err, WavegraphError::EmptyBasis));
    }

    #[test]
    fn unknown_basis_name_rejected() {
        let wave = WaveFunc::new(0.0, 600.0, 0.0, vec![BasisTerm::named("sawtooth")]);
        let err = wave.resolve(10.0).expect_err("must fail");
        assert!(matches!(err, WavegraphError::InvalidParameter(_)));
    }

    #[test]
    fn composite_terms_resolve_at_instant_not_fraction() {
        let inner = sin_wave(0.0, 100.0, 0.0);
        let expected_inner = inner.resolve(130.0).expect("inner");

        // Outer period differs wildly; the nested term must still see t.
        let outer = WaveFunc::new(
            0.0,
            7.0,
            0.0,
            vec![BasisTerm::composite(WaveExpr::Base(inner))],
        );
        let val = outer.resolve(130.0).expect("outer");
        assert!((val - expected_inner).abs() < 1e-12);
    }

    #[test]
    fn mixed_basis_averages_terms() {
        let inner = sin_wave(0.0, 100.0, 0.0);
        let inner_val = inner.resolve(40.0).expect("inner");

        let outer = WaveFunc::new(
            0.0,
            100.0,
            0.0,
            vec![
                BasisTerm::named(BASIS_SIN),
                BasisTerm::composite(WaveExpr::Base(inner)),
            ],
        );
        let named_val = base_position(0.4);
        let val = outer.resolve(40.0).expect("outer");
        assert!((val - (named_val + inner_val) / 2.0).abs() < 1e-12);
    }

    // -------------------------------------------------------------------------
    // Gated variant
    // -------------------------------------------------------------------------

    fn gated(active: &[u32]) -> GatedWaveFunc {
        GatedWaveFunc::new(
            sin_wave(0.0, 1000.0, 0.0),
            0.0,
            10,
            active.iter().copied().collect(),
        )
        .expect("gated")
    }

    #[test]
    fn gated_zero_outside_active_sub_periods() {
        let gw = gated(&[2, 5]);
        // t=50 falls in sub-period 0 (inactive)
        assert_eq!(gw.resolve(50.0).expect("resolve"), 0.0);
        // t=250 falls in sub-period 2 (active), local fraction 0.5
        let val = gw.resolve(250.0).expect("resolve");
        assert!((val - base_position(0.5)).abs() < 1e-12);
    }

    #[test]
    fn gated_uses_sub_period_local_fraction() {
        let gw = gated(&[5]);
        // Start of sub-period 5: local fraction 0 -> oscillator peak
        let val = gw.resolve(500.0).expect("resolve");
        assert!((val - 1.0).abs() < 1e-12);
    }

    #[test]
    fn gated_decays_by_outer_age() {
        let mut gw = gated(&[0]);
        gw.wave.decay = 1.0;
        // Sub-period 0 of consecutive outer periods, same local fraction
        let first = gw.resolve(10.0).expect("resolve");
        let later = gw.resolve(1010.0).expect("resolve");
        assert!(later < first);
        assert!((later / first - (-1.0_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn gated_rejects_zero_sub_periods() {
        let err = GatedWaveFunc::new(sin_wave(0.0, 100.0, 0.0), 0.0, 0, BTreeSet::new())
            .expect_err("must fail");
        assert!(matches!(err, WavegraphError::InvalidParameter(_)));
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    #[test]
    fn base_wire_shape() {
        let wave = sin_wave(123.0, 600.0, 0.2);
        let json = serde_json::to_value(WaveExpr::Base(wave)).expect("serialize");
        assert_eq!(json["ref_time"], 123.0);
        assert_eq!(json["period"], 600.0);
        assert_eq!(json["funcs"][0]["func"], "sin");
        assert_eq!(json["funcs"][0]["phase"], 0.0);
    }

    #[test]
    fn gated_wire_shape_keeps_historical_keys() {
        let json = serde_json::to_value(WaveExpr::Gated(gated(&[1, 3]))).expect("serialize");
        assert_eq!(json["NumIntPeriods"], 10);
        assert_eq!(json["IntPeriod"], 100.0);
        assert_eq!(json["IntPhase"], 0.0);
        assert_eq!(json["IntPeriodsActive"][0], 1);
    }

    #[test]
    fn round_trip_preserves_resolution() {
        let inner = gated(&[0, 4, 9]);
        let outer = WaveFunc::new(
            50.0,
            3600.0,
            0.3,
            vec![
                BasisTerm::named(BASIS_SIN),
                BasisTerm::composite(WaveExpr::Gated(inner)),
            ],
        );
        let expr = WaveExpr::Base(outer);

        let json = serde_json::to_string(&expr).expect("serialize");
        let restored: WaveExpr = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored, expr);
        for t in [0.0, 51.0, 123.456, 9999.0] {
            let a = expr.resolve(t).expect("resolve");
            let b = restored.resolve(t).expect("resolve");
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn gated_json_deserializes_as_gated_variant() {
        let json = serde_json::to_string(&WaveExpr::Gated(gated(&[2]))).expect("serialize");
        let restored: WaveExpr = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(restored, WaveExpr::Gated(_)));
    }
}
