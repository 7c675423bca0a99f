//! Stateless entry points exported to mobile hosts.

use std::sync::Arc;

use crate::clock::SystemClock;
use crate::computer::{DiveComputer, PlanReport, PlannedDive};
use crate::environment::DiveSiteEnv;
use crate::error::{MixError, SettingsError};
use crate::gas::{GasLimits, GasMix};
use crate::settings::Settings;
use crate::storage::StoreNotConfigured;

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ComputeError {
    #[error("invalid gas mix: {message}")]
    InvalidMix { message: String },

    #[error("invalid settings: {message}")]
    InvalidSettings { message: String },
}

impl From<MixError> for ComputeError {
    fn from(e: MixError) -> Self {
        ComputeError::InvalidMix {
            message: e.to_string(),
        }
    }
}

impl From<SettingsError> for ComputeError {
    fn from(e: SettingsError) -> Self {
        ComputeError::InvalidSettings {
            message: e.to_string(),
        }
    }
}

/// Operating limits of a mix at sea level in salt water.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct MixLimits {
    pub name: String,
    pub o2: f64,
    pub he: f64,
    pub n2: f64,
    /// Minimum breathing depth in meters
    pub mbd_m: f64,
    /// Maximum operating depth in meters
    pub mod_m: f64,
    /// Maximum narcotic depth in meters; infinite for non-narcotic mixes
    pub mnd_m: f64,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PlanEntry {
    pub depth_m: f64,
    pub duration_min: f64,
    pub limiting_factor: String,
    pub ascent_min: f64,
    pub recommended_mix: String,
    pub depth_class: String,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PlanSummary {
    pub mix: String,
    pub tank_count: u32,
    pub mod_m: f64,
    pub mnd_m: f64,
    pub ppo2: f64,
    pub rmv: f64,
    pub water: String,
    pub surface_pressure: f64,
    pub cns_pct: f64,
    pub otu_pct: f64,
    pub saturation_pct: f64,
    pub gf_description: String,
    pub no_dive_minutes: f64,
    pub dives: Vec<PlanEntry>,
    pub break_reason: Option<String>,
}

impl From<&PlannedDive> for PlanEntry {
    fn from(dive: &PlannedDive) -> Self {
        Self {
            depth_m: dive.depth,
            duration_min: dive.duration_min,
            limiting_factor: dive.limiting_factor.label().to_string(),
            ascent_min: dive.ascent_min,
            recommended_mix: dive.recommended_mix.name(),
            depth_class: dive.depth_class.to_string(),
        }
    }
}

impl From<PlanReport> for PlanSummary {
    fn from(report: PlanReport) -> Self {
        Self {
            mix: report.mix.name(),
            tank_count: u32::try_from(report.tank_count).unwrap_or(u32::MAX),
            mod_m: report.mod_m,
            mnd_m: report.mnd_m,
            ppo2: report.ppo2,
            rmv: report.rmv,
            water: report.water,
            surface_pressure: report.surface_pressure,
            cns_pct: report.cns_pct,
            otu_pct: report.otu_pct,
            saturation_pct: report.saturation_pct,
            gf_description: report.gf_description,
            no_dive_minutes: report.no_dive_minutes,
            dives: report.dives.iter().map(PlanEntry::from).collect(),
            break_reason: report.break_reason,
        }
    }
}

/// Limits of a mix given by its designation, e.g. `"EAN32"` or `"Tx18/45"`.
#[uniffi::export]
pub fn mix_limits(
    designation: String,
    max_ppo2: f64,
    o2_narcotic: bool,
) -> Result<MixLimits, ComputeError> {
    let mix: GasMix = designation.parse()?;
    let limits = GasLimits::new(max_ppo2, o2_narcotic);
    let env = DiveSiteEnv::default();
    Ok(MixLimits {
        name: mix.name(),
        o2: mix.o2(),
        he: mix.he(),
        n2: mix.n2(),
        mbd_m: env.depth_at(mix.mbd(&limits)),
        mod_m: env.depth_at(mix.mod_pressure(&limits)),
        mnd_m: env.depth_at(mix.mnd(&limits)),
    })
}

/// Planning sweep for a diver with no previous dive, from settings JSON.
#[uniffi::export]
pub fn plan_dives(settings_json: String) -> Result<PlanSummary, ComputeError> {
    let settings = Settings::from_json(&settings_json)?;
    let computer = DiveComputer::new(
        settings,
        Box::new(StoreNotConfigured),
        Arc::new(SystemClock),
    );
    Ok(computer.plan().into())
}
