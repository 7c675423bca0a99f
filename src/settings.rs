//! Static configuration of the dive computer.

use serde::{Deserialize, Serialize};

use crate::environment::DiveSiteEnv;
use crate::error::SettingsError;
use crate::gas::{GasLimits, GasMix, AIR, DEFAULT_MAX_PPO2};
use crate::physio::GradientFactors;
use crate::tank::Tank;

/// A configured cylinder.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TankConfig {
    /// Water volume in liters
    pub volume_l: f64,
    /// Fill pressure in bar
    pub start_bar: f64,
    /// Mix, as `{"o2": .., "he": ..}` or a designation such as `"EAN32"`
    pub mix: GasMix,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            volume_l: 12.0,
            start_bar: 200.0,
            mix: AIR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Tanks in the order they are breathed
    #[serde(default = "default_tanks")]
    pub tanks: Vec<TankConfig>,
    /// Maximum pO2 in bar (1.4-1.6)
    #[serde(default = "default_max_ppo2")]
    pub max_ppo2: f64,
    /// Salt or fresh water
    #[serde(default = "default_salt")]
    pub salt: bool,
    /// Surface respiratory minute volume in L/min
    #[serde(default = "default_rmv")]
    pub rmv: f64,
    /// Gradient factor low (0.0-0.9)
    #[serde(default = "default_gf_low")]
    pub gf_low: f64,
    /// Gradient factor high (gf_low-1.0)
    #[serde(default = "default_gf_high")]
    pub gf_high: f64,
    /// Whether O2 counts as narcotic
    #[serde(default = "default_o2_narcotic")]
    pub o2_narcotic: bool,
    /// Altitude of the dive site in meters
    #[serde(default)]
    pub altitude: f64,
}

fn default_tanks() -> Vec<TankConfig> {
    vec![TankConfig::default()]
}

fn default_max_ppo2() -> f64 {
    DEFAULT_MAX_PPO2
}

fn default_salt() -> bool {
    true
}

fn default_rmv() -> f64 {
    20.0
}

fn default_gf_low() -> f64 {
    0.40
}

fn default_gf_high() -> f64 {
    1.0
}

fn default_o2_narcotic() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tanks: default_tanks(),
            max_ppo2: default_max_ppo2(),
            salt: default_salt(),
            rmv: default_rmv(),
            gf_low: default_gf_low(),
            gf_high: default_gf_high(),
            o2_narcotic: default_o2_narcotic(),
            altitude: 0.0,
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SettingsError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl Settings {
    /// Parse and validate settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range("max_ppo2", self.max_ppo2, 1.4, 1.6)?;
        check_range("gf_low", self.gf_low, 0.0, 0.9)?;
        check_range("gf_high", self.gf_high, self.gf_low, 1.0)?;
        check_range("rmv", self.rmv, 5.0, 60.0)?;
        check_range("altitude", self.altitude, -500.0, 5000.0)?;

        if self.tanks.is_empty() {
            return Err(SettingsError::NoTanks);
        }
        for (index, tank) in self.tanks.iter().enumerate() {
            if !(tank.volume_l.is_finite() && tank.volume_l > 0.0) {
                return Err(SettingsError::Tank {
                    index,
                    message: format!("volume must be positive, got {}", tank.volume_l),
                });
            }
            if !(tank.start_bar.is_finite() && tank.start_bar > 0.0 && tank.start_bar <= 350.0) {
                return Err(SettingsError::Tank {
                    index,
                    message: format!("fill pressure out of range: {}", tank.start_bar),
                });
            }
        }
        Ok(())
    }

    pub fn env(&self) -> DiveSiteEnv {
        DiveSiteEnv::new(self.altitude, self.salt)
    }

    pub fn limits(&self) -> GasLimits {
        GasLimits::new(self.max_ppo2, self.o2_narcotic)
    }

    pub fn gradient_factors(&self) -> GradientFactors {
        GradientFactors::new(self.gf_low, self.gf_high)
    }

    /// Full tanks for a new dive.
    pub fn build_tanks(&self) -> Vec<Tank> {
        self.tanks
            .iter()
            .map(|t| Tank::new(t.mix, t.volume_l, t.start_bar, self.rmv))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tanks.len(), 1);
        assert_eq!(settings.tanks[0].mix, AIR);
        assert_eq!(settings.gradient_factors().description(), "GF 40/100");
        assert!(settings.env().salt());
    }

    #[test]
    fn test_parse_tanks() {
        let json = r#"{
            "tanks": [
                {"volume_l": 12, "start_bar": 210, "mix": "Tx21/35"},
                {"volume_l": 7, "start_bar": 200, "mix": {"o2": 0.5}}
            ],
            "max_ppo2": 1.6,
            "salt": false,
            "rmv": 18,
            "gf_low": 0.3,
            "gf_high": 0.8,
            "o2_narcotic": false
        }"#;
        let settings = Settings::from_json(json).unwrap();
        let tanks = settings.build_tanks();
        assert_eq!(tanks.len(), 2);
        assert_eq!(tanks[0].mix().name(), "Tx21/35");
        assert_eq!(tanks[1].mix().name(), "EAN50");
        assert!((tanks[1].rate() - 18.0 / 7.0).abs() < 1e-12);
        assert_eq!(settings.limits(), GasLimits::new(1.6, false));
        assert_eq!(settings.env().water(), "fresh");
    }

    #[test]
    fn test_out_of_range() {
        let err = Settings::from_json(r#"{"max_ppo2": 1.8}"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::OutOfRange {
                field: "max_ppo2",
                ..
            }
        ));
        let err = Settings::from_json(r#"{"gf_low": 0.5, "gf_high": 0.4}"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::OutOfRange {
                field: "gf_high",
                ..
            }
        ));
    }

    #[test]
    fn test_bad_tanks() {
        assert!(matches!(
            Settings::from_json(r#"{"tanks": []}"#),
            Err(SettingsError::NoTanks)
        ));
        let err = Settings::from_json(r#"{"tanks": [{"volume_l": 0, "start_bar": 200, "mix": "Air"}]}"#)
            .unwrap_err();
        assert!(matches!(err, SettingsError::Tank { index: 0, .. }));
        assert!(matches!(
            Settings::from_json(r#"{"tanks": [{"volume_l": 12, "start_bar": 200, "mix": "EAN120"}]}"#),
            Err(SettingsError::Json(_))
        ));
    }
}
