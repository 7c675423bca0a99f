//! Bühlmann ZHL-16C tissue model with gradient factors.
//!
//! Implements a 16-compartment tissue model using the Schreiner equation so
//! that both constant-depth intervals and linear ascents/descents load the
//! tissues correctly. On top of the tissue loads it derives the ceiling, the
//! no-decompression time, the stop ladder and the desaturation time.

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use super::{wrong_effect, zero_crossing, EffectState, PhysioEffect};
use crate::environment::DiveSiteEnv;
use crate::error::StateError;
use crate::gas::{GasLimits, GasMix, AIR};

pub const NAME: &str = "NDT";

// ============================================================================
// Physical Constants
// ============================================================================

/// Water vapour pressure in the lungs (bar), at 37°C.
const P_WATER_VAPOR: f64 = 0.0627;

/// Distance between two stops of the ladder (m).
pub const PHASE_M: f64 = 3.0;

/// Ascent speed used for travel between stops (m/min).
pub const ASCENT_RATE_M_MIN: f64 = 10.0;

const SAFETY_STOP_DEPTH_M: f64 = 5.0;
const SAFETY_STOP_SECONDS: f64 = 180.0;

/// Gradient factor scale of the "lightly loaded" ceiling that triggers a safety stop.
const SAFETY_GF_SCALE: f64 = 0.5;

/// Hold increment while waiting at a stop (s).
const STOP_STEP_SECONDS: f64 = 60.0;

/// Upper bound on the total time spent at stops (s).
const MAX_STOP_SECONDS: f64 = 24.0 * 3600.0;

/// Forward-simulation step (min).
const SIM_STEP_MINUTES: f64 = 10.0;

/// Step (min) used inside the coarse step that crosses the NDL.
const FINE_STEP_MINUTES: f64 = 1.0;

const NDL_HORIZON_MINUTES: f64 = 360.0;
const DESAT_HORIZON_MINUTES: f64 = 1440.0;

/// Leading compartment saturation (%) considered fully desaturated.
const DESATURATED_PERCENT: f64 = 5.0;

const PRESSURE_EPSILON: f64 = 1e-9;

// ============================================================================
// ZHL-16C Compartment Constants (Bühlmann / Baker)
// ============================================================================

/// Number of tissue compartments.
pub const NUM_COMPARTMENTS: usize = 16;

/// N2 half-times in minutes for compartments 1–16 (ZHL-16C).
const N2_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    5.0, 8.0, 12.5, 18.5, 27.0, 38.3, 54.3, 77.0, 109.0, 146.0, 187.0, 239.0, 305.0, 390.0, 498.0,
    635.0,
];

/// He half-times in minutes for compartments 1–16 (ZHL-16C).
const HE_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    1.88, 3.02, 4.72, 6.99, 10.21, 14.48, 20.53, 29.11, 41.20, 55.19, 70.69, 90.34, 115.29, 147.42,
    188.24, 240.03,
];

/// N2 'a' coefficients (bar) for ZHL-16C.
const A_N2: [f64; NUM_COMPARTMENTS] = [
    1.1696, 1.0000, 0.8618, 0.7562, 0.6200, 0.5043, 0.4410, 0.4000, 0.3750, 0.3500, 0.3295, 0.3065,
    0.2835, 0.2610, 0.2480, 0.2327,
];

/// N2 'b' coefficients (dimensionless) for ZHL-16C.
const B_N2: [f64; NUM_COMPARTMENTS] = [
    0.5578, 0.6514, 0.7222, 0.7825, 0.8126, 0.8434, 0.8693, 0.8910, 0.9092, 0.9222, 0.9319, 0.9403,
    0.9477, 0.9544, 0.9602, 0.9653,
];

/// He 'a' coefficients (bar) for ZHL-16C.
const A_HE: [f64; NUM_COMPARTMENTS] = [
    1.6189, 1.3830, 1.1919, 1.0458, 0.9220, 0.8205, 0.7305, 0.6502, 0.5950, 0.5545, 0.5333, 0.5189,
    0.5181, 0.5176, 0.5172, 0.5119,
];

/// He 'b' coefficients (dimensionless) for ZHL-16C.
const B_HE: [f64; NUM_COMPARTMENTS] = [
    0.4770, 0.5747, 0.6527, 0.7223, 0.7582, 0.7957, 0.8279, 0.8553, 0.8757, 0.8903, 0.8997, 0.9073,
    0.9122, 0.9171, 0.9217, 0.9267,
];

// ============================================================================
// Public Types
// ============================================================================

/// Gradient factor pair (fractions, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientFactors {
    /// Applied at the first (deepest) stop.
    pub low: f64,
    /// Applied at the surface.
    pub high: f64,
}

impl Default for GradientFactors {
    fn default() -> Self {
        Self {
            low: 0.4,
            high: 1.0,
        }
    }
}

impl GradientFactors {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Conventional notation, e.g. `GF 40/85`.
    pub fn description(&self) -> String {
        format!(
            "GF {}/{}",
            (self.low * 100.0).round(),
            (self.high * 100.0).round()
        )
    }
}

/// A single entry of the stop ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Absolute pressure of the stop (bar).
    pub pressure: f64,
    /// Stop depth (m).
    pub depth: f64,
    /// Time to hold (s).
    pub seconds: f64,
    /// Safety stop rather than a mandatory one.
    pub optional: bool,
    /// Mix to breathe at this stop.
    pub mix: GasMix,
    /// Gradient factor that must be satisfied before leaving.
    pub gf: f64,
}

// ============================================================================
// Tissue State
// ============================================================================

/// State of the 16 tissue compartments.
#[derive(Debug, Clone, PartialEq)]
struct TissueState {
    /// N2 partial pressure in each compartment (bar).
    p_n2: [f64; NUM_COMPARTMENTS],
    /// He partial pressure in each compartment (bar).
    p_he: [f64; NUM_COMPARTMENTS],
}

impl TissueState {
    /// Initialise tissues at surface equilibrium (breathing air).
    fn surface_equilibrium(surface_pressure: f64) -> Self {
        TissueState {
            p_n2: [equilibrium_n2(surface_pressure); NUM_COMPARTMENTS],
            p_he: [0.0; NUM_COMPARTMENTS],
        }
    }

    /// Update all compartments for an interval during which ambient pressure
    /// moves linearly from `p_start` to `p_end`.
    fn update(&mut self, dt_sec: f64, p_start: f64, p_end: f64, mix: &GasMix) {
        if dt_sec <= 0.0 || !dt_sec.is_finite() {
            return;
        }
        let minutes = dt_sec / 60.0;
        let ambient_rate = (p_end - p_start) / minutes;
        for i in 0..NUM_COMPARTMENTS {
            self.p_n2[i] = schreiner(
                self.p_n2[i],
                p_start,
                ambient_rate,
                mix.n2(),
                N2_HALF_TIMES[i],
                minutes,
            );
            self.p_he[i] = schreiner(
                self.p_he[i],
                p_start,
                ambient_rate,
                mix.he(),
                HE_HALF_TIMES[i],
                minutes,
            );
        }
    }

    fn total(&self, i: usize) -> f64 {
        self.p_n2[i] + self.p_he[i]
    }

    /// Bühlmann a/b of a compartment, weighted by its N2/He loads.
    fn coefficients(&self, i: usize) -> (f64, f64) {
        let p_total = self.total(i);
        if p_total > 1e-10 {
            let a = (A_N2[i] * self.p_n2[i] + A_HE[i] * self.p_he[i]) / p_total;
            let b = (B_N2[i] * self.p_n2[i] + B_HE[i] * self.p_he[i]) / p_total;
            (a, b)
        } else {
            (A_N2[i], B_N2[i])
        }
    }

    /// Tolerated ambient pressure of a compartment at gradient factor `gf`.
    fn tolerated(&self, i: usize, gf: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        (self.total(i) - a * gf) / (gf / b + 1.0 - gf)
    }

    /// Gradient factor of a compartment at the given ambient pressure (%).
    fn compartment_gf(&self, i: usize, ambient_pressure: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        let m_value = a + ambient_pressure / b;
        let denom = m_value - ambient_pressure;
        if denom > 1e-10 {
            ((self.total(i) - ambient_pressure) / denom) * 100.0
        } else {
            0.0
        }
    }

    /// Loading of a compartment between surface equilibrium (0 %) and its
    /// surface M-value (100 %).
    fn saturation(&self, i: usize, surface_pressure: f64) -> f64 {
        let (a, b) = self.coefficients(i);
        let equilibrium = equilibrium_n2(surface_pressure);
        let m_value = a + surface_pressure / b;
        let span = m_value - equilibrium;
        if span > 1e-10 {
            ((self.total(i) - equilibrium) / span * 100.0).max(0.0)
        } else {
            0.0
        }
    }

    /// Index of the compartment with the highest saturation.
    fn leading(&self, surface_pressure: f64) -> (usize, f64) {
        let mut leading = 0;
        let mut max = 0.0;
        for i in 0..NUM_COMPARTMENTS {
            let saturation = self.saturation(i, surface_pressure);
            if saturation > max {
                max = saturation;
                leading = i;
            }
        }
        (leading, max)
    }
}

fn equilibrium_n2(surface_pressure: f64) -> f64 {
    (surface_pressure - P_WATER_VAPOR) * AIR.n2()
}

/// Schreiner equation for one inert gas of one compartment.
///
/// `p0` is the compartment pressure, `ambient_start` the ambient pressure at
/// the start of the interval, `ambient_rate` its change in bar/min.
fn schreiner(
    p0: f64,
    ambient_start: f64,
    ambient_rate: f64,
    fraction: f64,
    half_time: f64,
    minutes: f64,
) -> f64 {
    let k = LN_2 / half_time;
    let inspired = ((ambient_start - P_WATER_VAPOR) * fraction).max(0.0);
    let r = ambient_rate * fraction;
    let p = inspired + r * (minutes - 1.0 / k) - (inspired - p0 - r / k) * (-k * minutes).exp();
    p.max(0.0)
}

fn phase_ceil(depth: f64) -> f64 {
    (depth / PHASE_M - 1e-9).ceil().max(0.0) * PHASE_M
}

/// Richest mix breathable at `p_abs` if its MOD is shallower than the current one.
fn shallower_mix(current: &GasMix, p_abs: f64, mixes: &[GasMix], limits: &GasLimits) -> GasMix {
    mixes
        .iter()
        .filter(|m| m.is_breathable(p_abs, limits))
        .min_by(|a, b| a.mod_pressure(limits).total_cmp(&b.mod_pressure(limits)))
        .filter(|best| best.mod_pressure(limits) < current.mod_pressure(limits))
        .copied()
        .unwrap_or(*current)
}

// ============================================================================
// Deco Model
// ============================================================================

/// Inert gas loading of the body and everything derived from it.
#[derive(Debug, Clone)]
pub struct DecoModel {
    env: DiveSiteEnv,
    gf: GradientFactors,
    tissues: TissueState,
    last_pressure: Option<f64>,
    mix: GasMix,
}

impl DecoModel {
    /// A model at surface equilibrium for the given site.
    pub fn new(env: DiveSiteEnv, gf: GradientFactors) -> Self {
        Self {
            tissues: TissueState::surface_equilibrium(env.surface_pressure()),
            env,
            gf,
            last_pressure: None,
            mix: AIR,
        }
    }

    pub fn env(&self) -> &DiveSiteEnv {
        &self.env
    }

    pub fn gradient_factors(&self) -> GradientFactors {
        self.gf
    }

    /// Mix breathed during the last change.
    pub fn mix(&self) -> &GasMix {
        &self.mix
    }

    pub fn current_pressure(&self) -> f64 {
        self.last_pressure
            .unwrap_or_else(|| self.env.surface_pressure())
    }

    /// Shallowest tolerated ambient pressure (bar) at gradient factor `gf`.
    pub fn ceiling(&self, gf: f64) -> f64 {
        (0..NUM_COMPARTMENTS)
            .map(|i| self.tissues.tolerated(i, gf))
            .fold(0.0, f64::max)
    }

    /// Depth (m) of the ceiling at GF low, i.e. where the first stop anchors.
    pub fn ceiling_depth(&self) -> f64 {
        self.env.depth_at(self.ceiling(self.gf.low))
    }

    /// Whether a direct ascent to the surface respects GF high.
    pub fn can_ascend(&self) -> bool {
        self.surface_margin() >= 0.0
    }

    fn surface_margin(&self) -> f64 {
        self.env.surface_pressure() - self.ceiling(self.gf.high)
    }

    /// Gradient factor allowed at `p_abs`, ramping from GF low at the first
    /// stop to GF high at the surface.
    pub fn gf_at(&self, p_abs: f64, first_stop: f64) -> f64 {
        let sp = self.env.surface_pressure();
        if first_stop <= sp + PRESSURE_EPSILON {
            return self.gf.high;
        }
        let fraction = ((p_abs - sp) / (first_stop - sp)).clamp(0.0, 1.0);
        self.gf.high + (self.gf.low - self.gf.high) * fraction
    }

    /// Saturation (%) of the leading compartment; 0 at surface equilibrium,
    /// 100 at its surface M-value.
    pub fn saturation(&self) -> f64 {
        self.tissues.leading(self.env.surface_pressure()).1
    }

    pub fn leading_compartment(&self) -> usize {
        self.tissues.leading(self.env.surface_pressure()).0
    }

    /// Gradient factor (%) the diver would surface with right now.
    pub fn surface_gf(&self) -> f64 {
        let sp = self.env.surface_pressure();
        (0..NUM_COMPARTMENTS)
            .map(|i| self.tissues.compartment_gf(i, sp))
            .fold(0.0, f64::max)
    }

    fn travel_to(&mut self, p_abs: f64, mix: &GasMix) {
        let distance = (self.current_pressure() - p_abs).abs() / self.env.specific_weight();
        let seconds = distance / ASCENT_RATE_M_MIN * 60.0;
        self.add_change(p_abs, seconds, mix);
    }

    /// Pressure (bar) of the first stop the GF ramp anchors on, `None` when
    /// a direct ascent is allowed.
    pub fn first_stop_pressure(&self) -> Option<f64> {
        if self.can_ascend() {
            return None;
        }
        let depth = phase_ceil(self.ceiling_depth()).max(PHASE_M);
        Some(self.env.pressure_at(depth))
    }

    /// Stop ladder for an ascent from the current state, switching to the
    /// shallowest-MOD usable mix of `mixes` along the way.
    pub fn stops(&self, mixes: &[GasMix], limits: &GasLimits) -> Vec<Stop> {
        self.stops_anchored(mixes, limits, None)
    }

    /// Like [`DecoModel::stops`], with the GF ramp anchored on `anchor` (bar)
    /// when that is deeper than the model's own first stop. A dive in
    /// progress keeps the anchor of its deepest first stop so the ramp does
    /// not slide shallower as stops are served.
    pub fn stops_anchored(
        &self,
        mixes: &[GasMix],
        limits: &GasLimits,
        anchor: Option<f64>,
    ) -> Vec<Stop> {
        let sp = self.env.surface_pressure();
        let mut stops = Vec::new();

        if let Some(own) = self.first_stop_pressure() {
            let mut sim = self.clone();
            let first_stop = anchor.map_or(own, |a| a.max(own));
            let gf_start = self.gf_at(own, first_stop);
            let first_depth = phase_ceil(self.env.depth_at(self.ceiling(gf_start))).max(PHASE_M);
            let mut mix = self.mix;
            let mut depth = first_depth;
            let mut held = 0.0;

            while depth > 0.0 {
                let p = self.env.pressure_at(depth);
                sim.travel_to(p, &mix);
                mix = shallower_mix(&mix, p, mixes, limits);

                let next_depth = (depth - PHASE_M).max(0.0);
                let next_p = self.env.pressure_at(next_depth);
                let gf = self.gf_at(next_p, first_stop);
                let mut seconds = 0.0;
                while sim.ceiling(gf) > next_p + PRESSURE_EPSILON && held < MAX_STOP_SECONDS {
                    sim.add_change(p, STOP_STEP_SECONDS, &mix);
                    seconds += STOP_STEP_SECONDS;
                    held += STOP_STEP_SECONDS;
                }
                if seconds > 0.0 {
                    stops.push(Stop {
                        pressure: p,
                        depth,
                        seconds,
                        optional: false,
                        mix,
                        gf,
                    });
                }
                depth = next_depth;
            }
        }

        if stops.is_empty() && self.ceiling(self.gf.high * SAFETY_GF_SCALE) > sp {
            stops.push(Stop {
                pressure: self.env.pressure_at(SAFETY_STOP_DEPTH_M),
                depth: SAFETY_STOP_DEPTH_M,
                seconds: SAFETY_STOP_SECONDS,
                optional: true,
                mix: self.mix,
                gf: self.gf.high,
            });
        }
        stops
    }

    /// Time to surface (min): mandatory stops plus travel at the ascent rate.
    pub fn tts(&self, mixes: &[GasMix], limits: &GasLimits) -> f64 {
        let stop_seconds: f64 = self
            .stops(mixes, limits)
            .iter()
            .filter(|s| !s.optional)
            .map(|s| s.seconds)
            .sum();
        let depth = self.env.depth_at(self.current_pressure());
        stop_seconds / 60.0 + depth / ASCENT_RATE_M_MIN
    }
}

impl PhysioEffect for DecoModel {
    fn name(&self) -> &'static str {
        NAME
    }

    fn surface_pressure(&self) -> f64 {
        self.env.surface_pressure()
    }

    fn last_pressure(&self) -> Option<f64> {
        self.last_pressure
    }

    fn add_change(&mut self, p_abs: f64, dt_seconds: f64, mix: &GasMix) {
        let p_abs = p_abs.max(0.0);
        let start = self.last_pressure.unwrap_or(p_abs);
        self.tissues.update(dt_seconds, start, p_abs, mix);
        self.last_pressure = Some(p_abs);
        self.mix = *mix;
    }

    /// No-decompression time at the current pressure and mix.
    ///
    /// Steps forward coarsely, then walks the step that crosses the limit
    /// minute by minute before interpolating.
    fn time_left(&self) -> f64 {
        let mut margin = self.surface_margin();
        if margin <= 0.0 {
            return 0.0;
        }
        let p = self.current_pressure();
        let mut sim = self.clone();
        let mut t = 0.0;
        let mut step = SIM_STEP_MINUTES;
        while t < NDL_HORIZON_MINUTES {
            let mut next_sim = sim.clone();
            next_sim.add_change(p, step * 60.0, &self.mix);
            let next = next_sim.surface_margin();
            if next < 0.0 {
                if step > FINE_STEP_MINUTES {
                    step = FINE_STEP_MINUTES;
                    continue;
                }
                return zero_crossing(t, margin, t + step, next);
            }
            sim = next_sim;
            margin = next;
            t += step;
        }
        f64::INFINITY
    }

    /// Surface time until the leading compartment is back near equilibrium.
    fn reset_after(&self) -> f64 {
        let mut excess = self.saturation() - DESATURATED_PERCENT;
        if excess <= 0.0 {
            return 0.0;
        }
        let sp = self.env.surface_pressure();
        let mut sim = self.clone();
        sim.last_pressure = Some(sp);
        let mut t = 0.0;
        while t < DESAT_HORIZON_MINUTES {
            sim.add_change(sp, SIM_STEP_MINUTES * 60.0, &AIR);
            let next = sim.saturation() - DESATURATED_PERCENT;
            if next <= 0.0 {
                return zero_crossing(t, excess, t + SIM_STEP_MINUTES, next);
            }
            excess = next;
            t += SIM_STEP_MINUTES;
        }
        DESAT_HORIZON_MINUTES
    }

    fn apply_si(&mut self, minutes: f64) {
        let sp = self.env.surface_pressure();
        self.last_pressure = Some(sp);
        self.add_change(sp, minutes.max(0.0) * 60.0, &AIR);
    }

    fn state(&self) -> EffectState {
        EffectState::Deco {
            n2: self.tissues.p_n2.to_vec(),
            he: self.tissues.p_he.to_vec(),
            last_pressure: self.last_pressure,
            mix: self.mix,
        }
    }

    fn restore(&mut self, state: &EffectState) -> Result<(), StateError> {
        let EffectState::Deco {
            n2,
            he,
            last_pressure,
            mix,
        } = state
        else {
            return Err(wrong_effect(NAME, state));
        };
        let p_n2: [f64; NUM_COMPARTMENTS] =
            n2.as_slice()
                .try_into()
                .map_err(|_| StateError::Compartments {
                    expected: NUM_COMPARTMENTS,
                    found: n2.len(),
                })?;
        let p_he: [f64; NUM_COMPARTMENTS] =
            he.as_slice()
                .try_into()
                .map_err(|_| StateError::Compartments {
                    expected: NUM_COMPARTMENTS,
                    found: he.len(),
                })?;
        self.tissues = TissueState { p_n2, p_he };
        self.last_pressure = *last_pressure;
        self.mix = *mix;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DecoModel {
        DecoModel::new(DiveSiteEnv::default(), GradientFactors::default())
    }

    /// Square profile: instant descent, then `minutes` at `depth`.
    fn square(depth: f64, minutes: f64, mix: &GasMix) -> DecoModel {
        let mut m = model();
        let p = m.env().pressure_at(depth);
        m.add_change(p, minutes * 60.0, mix);
        m
    }

    fn ean50() -> GasMix {
        GasMix::new(0.5, 0.0).unwrap()
    }

    #[test]
    fn test_surface_equilibrium() {
        let m = model();
        assert!(m.saturation().abs() < 1e-9);
        assert!(m.can_ascend());
        assert!(m.time_left().is_infinite());
        assert_eq!(m.reset_after(), 0.0);
        assert!(m.stops(&[AIR], &GasLimits::default()).is_empty());
    }

    #[test]
    fn test_schreiner_constant_matches_haldane() {
        // With no pressure change Schreiner collapses to the Haldane equation.
        let p = schreiner(0.75, 4.0, 0.0, 0.79, 5.0, 5.0);
        let inspired = (4.0 - P_WATER_VAPOR) * 0.79;
        let expected = inspired + (0.75 - inspired) * 0.5;
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn test_descent_ramp_loads_less_than_step() {
        let env = DiveSiteEnv::default();
        let p30 = env.pressure_at(30.0);

        let mut ramp = model();
        ramp.add_change(env.surface_pressure(), 0.0, &AIR);
        ramp.add_change(p30, 180.0, &AIR);

        let step = square(30.0, 3.0, &AIR);
        assert!(
            ramp.saturation() < step.saturation(),
            "a 3 minute descent should load less than 3 minutes at depth"
        );
    }

    #[test]
    fn test_square_profile_30m_30min_air() {
        let m = square(30.0, 30.0, &AIR);
        assert!(!m.can_ascend());
        assert!(m.surface_gf() > 100.0, "surface GF was {}", m.surface_gf());
        assert_eq!(m.time_left(), 0.0);
        assert!(m.ceiling_depth() > 0.0);
    }

    #[test]
    fn test_ndl_18m_fresh() {
        // Closed form for a square profile on ZHL-16C at GF 100: 58.39 min.
        let ndl = square(18.0, 0.0, &AIR).time_left();
        assert!((ndl - 58.39).abs() < 0.05, "18 m air NDL was {ndl}");
    }

    #[test]
    fn test_ndl_boundary_18m_56min() {
        // The 56 min air table limit sits 2.4 min inside the ZHL-16C limit.
        let left = square(18.0, 56.0, &AIR).time_left();
        assert!((left - 2.39).abs() < 0.05, "18 m / 56 min left {left}");

        let past = square(18.0, 58.5, &AIR);
        assert_eq!(past.time_left(), 0.0);
        assert!(!past.can_ascend());
    }

    #[test]
    fn test_ndl_shrinks_with_depth() {
        let shallow = square(12.0, 0.0, &AIR).time_left();
        let deep = square(30.0, 0.0, &AIR).time_left();
        assert!(deep < shallow);
    }

    #[test]
    fn test_trimix_loads_helium() {
        let tx = GasMix::new(0.21, 0.35).unwrap();
        let m = square(60.0, 20.0, &tx);
        assert!(m.tissues.p_he[0] > 1.0);
        assert!(!m.can_ascend());
    }

    #[test]
    fn test_altitude_raises_surface_gf() {
        let mut sea = model();
        let mut lake = DecoModel::new(DiveSiteEnv::new(1800.0, false), GradientFactors::default());
        sea.add_change(sea.env().pressure_at(30.0), 20.0 * 60.0, &AIR);
        lake.add_change(lake.env().pressure_at(30.0), 20.0 * 60.0, &AIR);
        assert!(lake.surface_gf() > sea.surface_gf());
    }

    #[test]
    fn test_safety_stop_only() {
        let m = square(18.0, 30.0, &AIR);
        let stops = m.stops(&[AIR], &GasLimits::default());
        assert_eq!(stops.len(), 1);
        assert!(stops[0].optional);
        assert_eq!(stops[0].depth, 5.0);
        assert_eq!(stops[0].seconds, 180.0);
    }

    #[test]
    fn test_no_stop_for_short_shallow_dive() {
        let m = square(10.0, 20.0, &AIR);
        assert!(m.stops(&[AIR], &GasLimits::default()).is_empty());
    }

    #[test]
    fn test_deco_ladder() {
        let m = square(40.0, 30.0, &AIR);
        let stops = m.stops(&[AIR], &GasLimits::default());
        assert!(!stops.is_empty());
        assert!(stops.iter().all(|s| !s.optional && s.seconds > 0.0));
        for pair in stops.windows(2) {
            assert!(pair[0].depth > pair[1].depth, "stops must get shallower");
        }
        for stop in &stops {
            assert!((stop.depth / PHASE_M).fract().abs() < 1e-9);
        }
        assert_eq!(stops.last().map(|s| s.depth), Some(3.0));
        // GF ramps towards GF high as the ladder gets shallower.
        assert!(stops[0].gf <= stops[stops.len() - 1].gf);
        assert!(m.tts(&[AIR], &GasLimits::default()) > 4.0);
    }

    #[test]
    fn test_deeper_anchor_relaxes_shallow_stops() {
        let limits = GasLimits::default();
        let deep = square(45.0, 25.0, &AIR);
        let anchor = deep.first_stop_pressure().unwrap();
        assert!((deep.env().depth_at(anchor) - 21.0).abs() < 1e-6);

        // Slow ascent to 12 m and a short hold: the own first stop moves up.
        let mut m = deep.clone();
        let p12 = m.env().pressure_at(12.0);
        m.add_change(p12, 600.0, &AIR);
        m.add_change(p12, 300.0, &AIR);
        let own = m.first_stop_pressure().unwrap();
        assert!(own < anchor);

        let anchored = m.stops_anchored(&[AIR], &limits, Some(anchor));
        let reanchored = m.stops(&[AIR], &limits);
        assert!(!anchored.is_empty());
        assert!(anchored.iter().all(|s| s.pressure <= own + 1e-9));
        let total = |stops: &[Stop]| stops.iter().map(|s| s.seconds).sum::<f64>();
        assert!(
            total(&anchored) <= total(&reanchored),
            "anchored {} vs re-anchored {}",
            total(&anchored),
            total(&reanchored)
        );
        // A shallower anchor than the own first stop changes nothing.
        assert_eq!(m.stops_anchored(&[AIR], &limits, Some(m.env().surface_pressure())), reanchored);
    }

    #[test]
    fn test_deco_gas_switch_shortens_ladder() {
        let limits = GasLimits::new(1.6, true);
        let m = square(40.0, 30.0, &AIR);
        let air_only: f64 = m.stops(&[AIR], &limits).iter().map(|s| s.seconds).sum();
        let with_ean50 = m.stops(&[AIR, ean50()], &limits);
        let switched: f64 = with_ean50.iter().map(|s| s.seconds).sum();
        assert!(switched < air_only);
        assert!(with_ean50.iter().any(|s| s.mix == ean50()));
        for stop in with_ean50.iter().filter(|s| s.mix == ean50()) {
            assert!(stop.pressure <= ean50().mod_pressure(&limits) + 1e-9);
        }
    }

    #[test]
    fn test_reset_after_dive() {
        let mut m = square(30.0, 20.0, &AIR);
        m.add_change(m.env().surface_pressure(), 180.0, &AIR);
        let reset = m.reset_after();
        assert!(reset > 60.0 && reset <= DESAT_HORIZON_MINUTES, "reset after {reset}");

        let mut rested = m.clone();
        rested.apply_si(reset + SIM_STEP_MINUTES);
        assert!(rested.saturation() <= DESATURATED_PERCENT);
        assert!(rested.reset_after() < 1e-9);
    }

    #[test]
    fn test_state_round_trip() {
        let original = square(25.0, 25.0, &GasMix::new(0.32, 0.0).unwrap());
        let mut restored = model();
        restored.restore(&original.state()).unwrap();
        assert_eq!(restored.time_left(), original.time_left());
        assert_eq!(restored.reset_after(), original.reset_after());
        assert_eq!(restored.mix(), original.mix());
    }

    #[test]
    fn test_restore_rejects_bad_state() {
        let mut m = model();
        let short = EffectState::Deco {
            n2: vec![0.7; 3],
            he: vec![0.0; 16],
            last_pressure: None,
            mix: AIR,
        };
        assert!(matches!(
            m.restore(&short),
            Err(StateError::Compartments { found: 3, .. })
        ));
        let cns = EffectState::Cns {
            value: 0.0,
            last_pressure: None,
            mix: AIR,
        };
        assert!(matches!(
            m.restore(&cns),
            Err(StateError::WrongEffect { .. })
        ));
    }

    #[test]
    fn test_gf_description() {
        assert_eq!(GradientFactors::new(0.3, 0.85).description(), "GF 30/85");
        assert_eq!(GradientFactors::default().description(), "GF 40/100");
    }
}
