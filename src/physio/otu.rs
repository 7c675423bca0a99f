//! Pulmonary oxygen toxicity units.
//!
//! One OTU is a minute of breathing pure oxygen at 1 bar. Exposure below
//! 0.5 bar pO2 does not count. At the surface the dose recovers linearly so
//! that a full daily dose clears within 24 hours.

use super::{wrong_effect, EffectState, PhysioEffect};
use crate::environment::DiveSiteEnv;
use crate::error::StateError;
use crate::gas::{GasMix, AIR};

pub const NAME: &str = "OTU";

/// Daily dose (OTU) treated as the exposure limit.
pub const OTU_DAILY_CAP: f64 = 300.0;

const THRESHOLD_PPO2: f64 = 0.5;
const EXPONENT: f64 = 5.0 / 6.0;

/// Surface recovery (OTU per minute).
const RECOVERY_PER_MINUTE: f64 = OTU_DAILY_CAP / 1440.0;

const PRESSURE_EPSILON: f64 = 1e-6;

/// OTU per minute at a constant pO2.
pub fn rate_per_minute(ppo2: f64) -> f64 {
    if ppo2 <= THRESHOLD_PPO2 {
        return 0.0;
    }
    ((ppo2 - THRESHOLD_PPO2) / THRESHOLD_PPO2).powf(EXPONENT)
}

/// Dose for `minutes` while pO2 moves linearly from `p0` to `p1`. The part of
/// the segment spent at or below the threshold contributes nothing.
fn segment_dose(p0: f64, p1: f64, minutes: f64) -> f64 {
    if minutes <= 0.0 {
        return 0.0;
    }
    let (lo, hi) = if p0 <= p1 { (p0, p1) } else { (p1, p0) };
    if hi <= THRESHOLD_PPO2 {
        return 0.0;
    }
    if hi - lo < PRESSURE_EPSILON {
        return minutes * rate_per_minute(hi);
    }
    let lo_clipped = lo.max(THRESHOLD_PPO2);
    let minutes = minutes * (hi - lo_clipped) / (hi - lo);
    let x = |p: f64| ((p - THRESHOLD_PPO2) / THRESHOLD_PPO2).powf(11.0 / 6.0);
    3.0 / 11.0 * minutes / (hi - lo_clipped) * (x(hi) - x(lo_clipped))
}

/// Accumulated pulmonary dose.
#[derive(Debug, Clone)]
pub struct Otu {
    value: f64,
    surface_pressure: f64,
    last_pressure: Option<f64>,
    mix: GasMix,
}

impl Otu {
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

    /// Dose as a percentage of the daily cap.
    pub fn percent(&self) -> f64 {
        self.value / OTU_DAILY_CAP * 100.0
    }

    fn recover(&mut self, minutes: f64) {
        self.value = (self.value - RECOVERY_PER_MINUTE * minutes.max(0.0)).max(0.0);
    }
}

impl PhysioEffect for Otu {
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
        let minutes = dt_seconds / 60.0;
        if (start + p_abs) / 2.0 <= self.surface_pressure + PRESSURE_EPSILON {
            self.recover(minutes);
        } else {
            self.value += segment_dose(mix.ppo2(start), mix.ppo2(p_abs), minutes);
        }
    }

    /// Minutes until the daily cap at the current pO2; negative once the cap
    /// has been passed.
    fn time_left(&self) -> f64 {
        let p = self.last_pressure.unwrap_or(self.surface_pressure);
        let rate = if p <= self.surface_pressure + PRESSURE_EPSILON {
            0.0
        } else {
            rate_per_minute(self.mix.ppo2(p))
        };
        if rate <= 0.0 {
            return if self.value > OTU_DAILY_CAP {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        (OTU_DAILY_CAP - self.value) / rate
    }

    fn reset_after(&self) -> f64 {
        self.value / RECOVERY_PER_MINUTE
    }

    fn apply_si(&mut self, minutes: f64) {
        self.recover(minutes);
        self.last_pressure = Some(self.surface_pressure);
        self.mix = AIR;
    }

    fn state(&self) -> EffectState {
        EffectState::Otu {
            value: self.value,
            last_pressure: self.last_pressure,
            mix: self.mix,
        }
    }

    fn restore(&mut self, state: &EffectState) -> Result<(), StateError> {
        let EffectState::Otu {
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
