//! Central nervous system oxygen toxicity.
//!
//! The accumulation rate is an exponential fit of the NOAA single-exposure
//! limits, in two bands above the 0.5 bar threshold. At the surface the
//! accumulated fraction decays with a 90 minute half-life.

use super::{wrong_effect, EffectState, PhysioEffect};
use crate::environment::DiveSiteEnv;
use crate::error::StateError;
use crate::gas::{GasMix, AIR};

pub const NAME: &str = "CNS";

/// pO2 (bar) at or below which no toxicity accumulates.
const THRESHOLD_PPO2: f64 = 0.5;

/// pO2 (bar) separating the two exponential bands.
const BAND_SPLIT_PPO2: f64 = 1.5;

const LOW_BAND: (f64, f64) = (-11.7853, 1.93873);
const HIGH_BAND: (f64, f64) = (-23.5943, 9.8083);

const HALF_LIFE_MINUTES: f64 = 90.0;

/// Fraction below which the clock is considered cleared.
const RESIDUAL: f64 = 0.01;

const PRESSURE_EPSILON: f64 = 1e-6;

/// Fraction of the single-exposure limit consumed per second at `ppo2`.
pub fn rate_per_second(ppo2: f64) -> f64 {
    if ppo2 <= THRESHOLD_PPO2 {
        return 0.0;
    }
    let (a, b) = if ppo2 <= BAND_SPLIT_PPO2 {
        LOW_BAND
    } else {
        HIGH_BAND
    };
    (a + b * ppo2).exp()
}

/// CNS clock as a fraction of the limit (1.0 = 100 %).
#[derive(Debug, Clone)]
pub struct Cns {
    value: f64,
    surface_pressure: f64,
    last_pressure: Option<f64>,
    mix: GasMix,
}

impl Cns {
    pub fn new(env: &DiveSiteEnv) -> Self {
        Self {
            value: 0.0,
            surface_pressure: env.surface_pressure(),
            last_pressure: None,
            mix: AIR,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn percent(&self) -> f64 {
        self.value * 100.0
    }

    fn decay(&mut self, minutes: f64) {
        self.value *= 0.5_f64.powf(minutes.max(0.0) / HALF_LIFE_MINUTES);
    }
}

impl PhysioEffect for Cns {
    fn name(&self) -> &'static str {
        NAME
    }

    fn surface_pressure(&self) -> f64 {
        self.surface_pressure
    }

    fn last_pressure(&self) -> Option<f64> {
        self.last_pressure
    }

    fn add_change(&mut self, p_abs: f64, dt_seconds: f64, mix: &GasMix) {
        let p_abs = p_abs.max(0.0);
        let start = self.last_pressure.unwrap_or(p_abs);
        self.last_pressure = Some(p_abs);
        self.mix = *mix;
        if dt_seconds <= 0.0 || !dt_seconds.is_finite() {
            return;
        }
        let avg = (start + p_abs) / 2.0;
        if avg <= self.surface_pressure + PRESSURE_EPSILON {
            self.decay(dt_seconds / 60.0);
        } else {
            self.value += rate_per_second(mix.ppo2(avg)) * dt_seconds;
        }
    }

    /// Minutes until the clock reaches 100 % at the current pO2; negative once
    /// the limit has been exceeded, even where nothing accumulates.
    fn time_left(&self) -> f64 {
        let p = self.last_pressure.unwrap_or(self.surface_pressure);
        let rate = if p <= self.surface_pressure + PRESSURE_EPSILON {
            0.0
        } else {
            rate_per_second(self.mix.ppo2(p))
        };
        if rate <= 0.0 {
            return if self.value > 1.0 {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        (1.0 - self.value) / rate / 60.0
    }

    fn reset_after(&self) -> f64 {
        if self.value <= RESIDUAL {
            return 0.0;
        }
        HALF_LIFE_MINUTES * (self.value / RESIDUAL).log2()
    }

    fn apply_si(&mut self, minutes: f64) {
        self.decay(minutes);
        self.last_pressure = Some(self.surface_pressure);
        self.mix = AIR;
    }

    fn state(&self) -> EffectState {
        EffectState::Cns {
            value: self.value,
            last_pressure: self.last_pressure,
            mix: self.mix,
        }
    }

    fn restore(&mut self, state: &EffectState) -> Result<(), StateError> {
        let EffectState::Cns {
            value,
            last_pressure,
            mix,
        } = state
        else {
            return Err(wrong_effect(NAME, state));
        };
        self.value = value.max(0.0);
        self.last_pressure = *last_pressure;
        self.mix = *mix;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::OXYGEN;

    #[test]
    fn test_noaa_limits() {
        // 1.5 bar: 120 min, 1.6 bar: 45 min.
        assert!((1.0 / rate_per_second(1.5) / 60.0 - 120.0).abs() < 1.0);
        assert!((1.0 / rate_per_second(1.6) / 60.0 - 45.0).abs() < 0.1);
        // 1.0 bar: 300 min within a few percent.
        assert!((1.0 / rate_per_second(1.0) / 60.0 - 300.0).abs() < 20.0);
        assert_eq!(rate_per_second(0.5), 0.0);
        assert_eq!(rate_per_second(0.21), 0.0);
    }

    #[test]
    fn test_oxygen_at_1_6_bar_for_45_minutes() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(1.6, 45.0 * 60.0, &OXYGEN);
        assert!(cns.time_left().abs() < 0.5, "time left {}", cns.time_left());
        assert!((cns.percent() - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_time_left_goes_negative_past_limit() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(1.6, 50.0 * 60.0, &OXYGEN);
        assert!(cns.time_left() < 0.0);
    }

    #[test]
    fn test_exceeded_limit_stays_exceeded_on_air() {
        let env = DiveSiteEnv::default();
        let mut cns = Cns::new(&env);
        cns.add_change(1.6, 50.0 * 60.0, &OXYGEN);
        assert!(cns.value() > 1.1);
        cns.add_change(env.pressure_at(9.0), 60.0, &AIR);
        assert!(cns.value() > 1.1, "no decay below the surface");
        assert!(cns.time_left() < 0.0, "time left {}", cns.time_left());

        // Back under the limit, nothing binds on air.
        cns.apply_si(60.0);
        cns.add_change(env.pressure_at(9.0), 60.0, &AIR);
        assert!(cns.value() < 1.0);
        assert!(cns.time_left().is_infinite() && cns.time_left() > 0.0);
    }

    #[test]
    fn test_no_accumulation_on_air_in_shallow_water() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(2.0, 3600.0, &AIR);
        assert_eq!(cns.value(), 0.0);
        assert!(cns.time_left().is_infinite());
    }

    #[test]
    fn test_surface_half_life() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(1.6, 45.0 * 60.0, &OXYGEN);
        let before = cns.value();
        cns.apply_si(90.0);
        assert!((cns.value() - before / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_after_inverts_decay() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(1.4, 60.0 * 60.0, &OXYGEN);
        let reset = cns.reset_after();
        assert!(reset > 0.0);
        cns.apply_si(reset);
        assert!((cns.value() - RESIDUAL).abs() < 1e-9);
        assert!(cns.reset_after() < 1e-6);
    }

    #[test]
    fn test_state_round_trip() {
        let mut cns = Cns::new(&DiveSiteEnv::default());
        cns.add_change(1.4, 600.0, &OXYGEN);
        let mut restored = Cns::new(&DiveSiteEnv::default());
        restored.restore(&cns.state()).unwrap();
        assert_eq!(restored.value(), cns.value());
        assert_eq!(restored.time_left(), cns.time_left());
    }
}
