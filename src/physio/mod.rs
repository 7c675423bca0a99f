//! Physiological effects of breathing gas under pressure.
//!
//! Every effect follows the same capability set ([`PhysioEffect`]) so that
//! [`crate::body::BodyState`] can advance them uniformly:
//!
//! - [`DecoModel`]: Bühlmann ZHL-16C inert gas loading with gradient factors.
//! - [`Cns`]: central nervous system oxygen toxicity.
//! - [`Otu`]: pulmonary oxygen toxicity units.
//!
//! Pressure handling is shared: each effect remembers the last ambient
//! pressure it saw and `add_change(p, dt)` ramps linearly from there to `p`.
//! A fresh effect has no last pressure and treats the interval as constant.

pub mod buhlmann;
pub mod cns;
pub mod otu;

pub use buhlmann::{DecoModel, GradientFactors, Stop};
pub use cns::Cns;
pub use otu::Otu;

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::gas::GasMix;

/// Serializable state of a single effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectState {
    Deco {
        n2: Vec<f64>,
        he: Vec<f64>,
        last_pressure: Option<f64>,
        mix: GasMix,
    },
    Cns {
        value: f64,
        last_pressure: Option<f64>,
        mix: GasMix,
    },
    Otu {
        value: f64,
        last_pressure: Option<f64>,
        mix: GasMix,
    },
}

impl EffectState {
    pub fn kind(&self) -> &'static str {
        match self {
            EffectState::Deco { .. } => buhlmann::NAME,
            EffectState::Cns { .. } => cns::NAME,
            EffectState::Otu { .. } => otu::NAME,
        }
    }
}

/// Common capability set of the physiological trackers.
pub trait PhysioEffect: Clone {
    fn name(&self) -> &'static str;

    /// Surface pressure of the site the effect was created for.
    fn surface_pressure(&self) -> f64;

    /// Last ambient pressure recorded, if any.
    fn last_pressure(&self) -> Option<f64>;

    /// Advance by `dt_seconds` while ambient pressure moves linearly from the
    /// last pressure to `p_abs`, breathing `mix`.
    fn add_change(&mut self, p_abs: f64, dt_seconds: f64, mix: &GasMix);

    /// Advance by `dt_seconds` at the last recorded pressure.
    fn add_time(&mut self, dt_seconds: f64, mix: &GasMix) {
        let p = self
            .last_pressure()
            .unwrap_or_else(|| self.surface_pressure());
        self.add_change(p, dt_seconds, mix);
    }

    /// Minutes until this effect becomes binding at the current pressure and
    /// mix; `f64::INFINITY` when it never does.
    fn time_left(&self) -> f64;

    /// Minutes at the surface until this effect has cleared.
    fn reset_after(&self) -> f64;

    /// Apply a surface interval of `minutes` breathing air.
    fn apply_si(&mut self, minutes: f64);

    fn state(&self) -> EffectState;

    fn restore(&mut self, state: &EffectState) -> Result<(), StateError>;
}

/// Linear interpolation of the time at which `margin` crosses zero between two
/// samples `(t0, m0)` and `(t1, m1)` with `m0 > 0 >= m1`.
pub(crate) fn zero_crossing(t0: f64, m0: f64, t1: f64, m1: f64) -> f64 {
    let span = m0 - m1;
    if span <= 0.0 {
        return t1;
    }
    t0 + (t1 - t0) * (m0 / span)
}

pub(crate) fn wrong_effect(expected: &'static str, state: &EffectState) -> StateError {
    StateError::WrongEffect {
        expected,
        found: state.kind(),
    }
}
