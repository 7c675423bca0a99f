//! Breathing gas mixes and their operating limits.
//!
//! A [`GasMix`] is an immutable set of O2/He/N2 fractions. All limits are
//! expressed as absolute pressures in bar; converting them to depths is the job
//! of [`crate::environment::DiveSiteEnv`].
//!
//! # Example
//!
//! ```
//! use dive_computer_core::gas::{GasLimits, GasMix};
//!
//! let ean32: GasMix = "EAN32".parse().expect("valid designation");
//! let limits = GasLimits::default();
//! assert!((ean32.mod_pressure(&limits) - 1.4 / 0.32).abs() < 1e-9);
//! assert_eq!(ean32.name(), "EAN32");
//! ```

pub mod parser;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MixError;

/// Lowest O2 partial pressure (bar) considered breathable.
pub const MIN_PPO2: f64 = 0.18;

/// Default highest O2 partial pressure (bar) during the working phase.
pub const DEFAULT_MAX_PPO2: f64 = 1.4;

/// Absolute pressure (bar) of the equivalent narcotic depth limit, air at 30 m.
const END_LIMIT_PRESSURE: f64 = 4.0;

const AIR_O2: f64 = 0.21;
const AIR_N2: f64 = 0.79;

/// Tolerance on fraction sums and pressure comparisons.
const EPSILON: f64 = 1e-6;

/// Breathing air.
pub const AIR: GasMix = GasMix { o2: AIR_O2, he: 0.0 };

/// Pure oxygen.
pub const OXYGEN: GasMix = GasMix { o2: 1.0, he: 0.0 };

/// Configured gas limits shared by every mix of a dive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasLimits {
    /// Maximum O2 partial pressure (bar).
    pub max_ppo2: f64,
    /// Minimum O2 partial pressure (bar).
    pub min_ppo2: f64,
    /// Whether O2 counts towards the narcotic fraction of a mix.
    pub o2_narcotic: bool,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            max_ppo2: DEFAULT_MAX_PPO2,
            min_ppo2: MIN_PPO2,
            o2_narcotic: true,
        }
    }
}

impl GasLimits {
    pub fn new(max_ppo2: f64, o2_narcotic: bool) -> Self {
        Self {
            max_ppo2,
            o2_narcotic,
            ..Self::default()
        }
    }

    /// Narcotic fraction of air under these limits.
    pub fn air_narcotic_fraction(&self) -> f64 {
        if self.o2_narcotic {
            1.0
        } else {
            AIR_N2
        }
    }

    /// Highest tolerated narcotic partial pressure (bar).
    pub fn max_narcotic_pressure(&self) -> f64 {
        END_LIMIT_PRESSURE * self.air_narcotic_fraction()
    }
}

/// A breathing gas defined by its O2 and He fractions; N2 makes up the rest.
///
/// Two mixes are equal when they carry the same [`name`](GasMix::name).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "MixRepr")]
pub struct GasMix {
    o2: f64,
    he: f64,
}

/// Accepted configuration forms of a mix: a designation or explicit fractions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MixRepr {
    Designation(String),
    Fractions {
        o2: f64,
        #[serde(default)]
        he: f64,
    },
}

impl TryFrom<MixRepr> for GasMix {
    type Error = MixError;

    fn try_from(repr: MixRepr) -> Result<Self, Self::Error> {
        match repr {
            MixRepr::Designation(name) => name.parse(),
            MixRepr::Fractions { o2, he } => GasMix::new(o2, he),
        }
    }
}

impl GasMix {
    /// Create a mix from O2 and He fractions (0.0–1.0).
    pub fn new(o2: f64, he: f64) -> Result<Self, MixError> {
        let valid = o2.is_finite()
            && he.is_finite()
            && o2 > 0.0
            && he >= 0.0
            && o2 + he <= 1.0 + EPSILON;
        if !valid {
            return Err(MixError::Invalid { o2, he });
        }
        Ok(Self { o2, he })
    }

    /// Create a mix from whole-percent O2 and He figures.
    pub fn from_percent(o2: u32, he: u32) -> Result<Self, MixError> {
        Self::new(f64::from(o2) / 100.0, f64::from(he) / 100.0)
    }

    pub fn o2(&self) -> f64 {
        self.o2
    }

    pub fn he(&self) -> f64 {
        self.he
    }

    pub fn n2(&self) -> f64 {
        (1.0 - self.o2 - self.he).max(0.0)
    }

    /// Stable display name, a pure function of the rounded (o2, he) percentages.
    pub fn name(&self) -> String {
        let o2 = percent(self.o2);
        let he = percent(self.he);
        match (o2, he) {
            (100, 0) => "O2".to_string(),
            (21, 0) => "Air".to_string(),
            (o2, 0) => format!("EAN{o2}"),
            (o2, he) if o2 + he >= 100 => format!("Heliox {o2}/{he}"),
            (o2, he) => format!("Tx{o2}/{he}"),
        }
    }

    /// O2 partial pressure at an absolute pressure.
    pub fn ppo2(&self, p_abs: f64) -> f64 {
        self.o2 * p_abs
    }

    /// Minimum breathing pressure, below which the mix is hypoxic.
    pub fn mbd(&self, limits: &GasLimits) -> f64 {
        limits.min_ppo2 / self.o2
    }

    /// Maximum operating pressure, above which the mix is hyperoxic.
    pub fn mod_pressure(&self, limits: &GasLimits) -> f64 {
        limits.max_ppo2 / self.o2
    }

    /// Narcotic fraction: N2, plus O2 when O2 is considered narcotic.
    pub fn narcotic_fraction(&self, limits: &GasLimits) -> f64 {
        if limits.o2_narcotic {
            self.n2() + self.o2
        } else {
            self.n2()
        }
    }

    /// Maximum narcotic pressure; infinite for non-narcotic mixes.
    pub fn mnd(&self, limits: &GasLimits) -> f64 {
        let narcotic = self.narcotic_fraction(limits);
        if narcotic <= EPSILON {
            f64::INFINITY
        } else {
            limits.max_narcotic_pressure() / narcotic
        }
    }

    /// Multiply an absolute pressure by this factor to get the equivalent air pressure.
    pub fn ead_factor(&self) -> f64 {
        self.n2() / AIR_N2
    }

    /// Multiply an absolute pressure by this factor to get the equivalent narcotic pressure.
    pub fn end_factor(&self, limits: &GasLimits) -> f64 {
        self.narcotic_fraction(limits) / limits.air_narcotic_fraction()
    }

    pub fn is_breathable(&self, p_abs: f64, limits: &GasLimits) -> bool {
        p_abs + EPSILON >= self.mbd(limits) && p_abs <= self.mod_pressure(limits) + EPSILON
    }

    /// Best mix for an absolute pressure: the richest O2 within `max_ppo2`,
    /// topped up with helium so the narcotic load stays at the END limit.
    pub fn best_mix(p_abs: f64, limits: &GasLimits) -> GasMix {
        let p_abs = p_abs.max(EPSILON);
        let o2 = floor_percent((limits.max_ppo2 / p_abs).min(1.0)).max(0.01);
        let allowed_narcotic = (limits.max_narcotic_pressure() / p_abs).min(1.0);
        let n2 = if limits.o2_narcotic {
            allowed_narcotic - o2
        } else {
            allowed_narcotic
        };
        let n2 = floor_percent(n2.clamp(0.0, 1.0 - o2));
        let he = ((1.0 - o2 - n2) * 100.0).round() / 100.0;
        GasMix { o2, he: he.max(0.0) }
    }
}

fn percent(fraction: f64) -> u32 {
    (fraction * 100.0).round().max(0.0) as u32
}

fn floor_percent(fraction: f64) -> f64 {
    (fraction * 100.0 + EPSILON).floor() / 100.0
}

impl PartialEq for GasMix {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for GasMix {}

impl Hash for GasMix {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Display for GasMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for GasMix {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_designation(s)
    }
}
