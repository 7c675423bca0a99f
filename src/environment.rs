//! Depth/pressure conversion for a dive site.

use serde::{Deserialize, Serialize};

/// Surface pressure (bar) at sea level.
pub const SEA_LEVEL_PRESSURE: f64 = 1.013;

/// Scale height (m) of the barometric altitude formula.
const ALTITUDE_SCALE_M: f64 = 7800.0;

/// Pressure increase per metre of sea water (bar/m).
pub const SALT_WATER_BAR_PER_M: f64 = 0.101043;

/// Pressure increase per metre of fresh water (bar/m).
pub const FRESH_WATER_BAR_PER_M: f64 = 0.0981;

/// Location of a dive site as reported by the tracking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiveSite {
    pub lat: f64,
    pub lon: f64,
    /// Altitude above sea level (m).
    pub alt: f64,
}

impl DiveSite {
    pub fn env(&self, salt: bool) -> DiveSiteEnv {
        DiveSiteEnv::new(self.alt, salt)
    }
}

/// Fixed affine map between depth (m) and absolute pressure (bar).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiveSiteEnv {
    surface_pressure: f64,
    salt: bool,
    altitude: f64,
}

impl Default for DiveSiteEnv {
    fn default() -> Self {
        Self::new(0.0, true)
    }
}

impl DiveSiteEnv {
    pub fn new(altitude: f64, salt: bool) -> Self {
        Self {
            surface_pressure: SEA_LEVEL_PRESSURE * (-altitude / ALTITUDE_SCALE_M).exp(),
            salt,
            altitude,
        }
    }

    pub fn surface_pressure(&self) -> f64 {
        self.surface_pressure
    }

    pub fn salt(&self) -> bool {
        self.salt
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn water(&self) -> &'static str {
        if self.salt {
            "salt"
        } else {
            "fresh"
        }
    }

    /// Pressure increase per metre of depth (bar/m).
    pub fn specific_weight(&self) -> f64 {
        if self.salt {
            SALT_WATER_BAR_PER_M
        } else {
            FRESH_WATER_BAR_PER_M
        }
    }

    /// Absolute pressure at a depth; negative depths clamp to the surface.
    pub fn pressure_at(&self, depth_m: f64) -> f64 {
        self.surface_pressure + self.specific_weight() * depth_m.max(0.0)
    }

    /// Depth at an absolute pressure; pressures below the surface clamp to 0 m.
    pub fn depth_at(&self, p_abs: f64) -> f64 {
        ((p_abs - self.surface_pressure) / self.specific_weight()).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level_salt() {
        let env = DiveSiteEnv::default();
        assert!((env.surface_pressure() - 1.013).abs() < 1e-12);
        assert!((env.pressure_at(10.0) - 2.02343).abs() < 1e-9);
        assert!((env.depth_at(env.pressure_at(18.0)) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_water_is_lighter() {
        let salt = DiveSiteEnv::new(0.0, true);
        let fresh = DiveSiteEnv::new(0.0, false);
        assert!(fresh.pressure_at(30.0) < salt.pressure_at(30.0));
        assert_eq!(fresh.water(), "fresh");
    }

    #[test]
    fn test_altitude_lowers_surface_pressure() {
        let lake = DiveSite {
            lat: 46.5,
            lon: 8.0,
            alt: 1800.0,
        }
        .env(false);
        assert!((lake.surface_pressure() - 0.8042).abs() < 1e-3);
        assert_eq!(lake.depth_at(lake.surface_pressure()), 0.0);
    }

    #[test]
    fn test_clamping() {
        let env = DiveSiteEnv::default();
        assert_eq!(env.pressure_at(-5.0), env.surface_pressure());
        assert_eq!(env.depth_at(0.5), 0.0);
    }
}
