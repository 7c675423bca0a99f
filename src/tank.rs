//! Gas supply of a single cylinder.

use serde::{Deserialize, Serialize};

use crate::gas::{GasLimits, GasMix};

/// A cylinder of a given mix, volume and fill, drained by breathing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    mix: GasMix,
    /// Water volume (L).
    volume: f64,
    /// Fill pressure at the start of the dive (bar).
    start: f64,
    /// Remaining pressure (bar).
    end: f64,
    /// Pressure drop per minute at 1 bar ambient (bar/min).
    rate: f64,
}

impl Tank {
    /// `rmv` is the diver's surface respiratory minute volume (L/min).
    pub fn new(mix: GasMix, volume_l: f64, start_bar: f64, rmv: f64) -> Self {
        let volume = volume_l.max(f64::EPSILON);
        let start = start_bar.max(0.0);
        Self {
            mix,
            volume,
            start,
            end: start,
            rate: rmv.max(0.0) / volume,
        }
    }

    pub fn mix(&self) -> &GasMix {
        &self.mix
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Pressure consumed so far (bar).
    pub fn used(&self) -> f64 {
        self.start - self.end
    }

    /// Free gas left at the surface (L).
    pub fn liters_left(&self) -> f64 {
        self.end * self.volume
    }

    pub fn is_empty(&self) -> bool {
        self.end <= 0.0
    }

    /// Breathe for `dt_seconds` at an average absolute pressure. Never drops
    /// below zero; non-positive intervals are ignored.
    pub fn consume(&mut self, avg_pressure: f64, dt_seconds: f64) {
        if dt_seconds <= 0.0 || !dt_seconds.is_finite() {
            return;
        }
        let drop = self.rate * avg_pressure.max(0.0) * (dt_seconds / 60.0);
        self.end = (self.end - drop).max(0.0);
    }

    /// Whole minutes of gas left at an absolute pressure, or -1 once empty.
    pub fn time_left(&self, p_abs: f64) -> f64 {
        if self.is_empty() {
            return -1.0;
        }
        let per_minute = self.rate * p_abs;
        if per_minute <= 0.0 {
            return f64::INFINITY;
        }
        (self.end / per_minute).floor()
    }

    pub fn is_usable_at(&self, p_abs: f64, limits: &GasLimits) -> bool {
        !self.is_empty() && self.mix.is_breathable(p_abs, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::AIR;

    #[test]
    fn test_rate() {
        let tank = Tank::new(AIR, 12.0, 200.0, 20.0);
        assert!((tank.rate() - 20.0 / 12.0).abs() < 1e-12);
        assert!((tank.liters_left() - 2400.0).abs() < 1e-9);
    }

    #[test]
    fn test_consume_is_monotonic() {
        let mut tank = Tank::new(AIR, 12.0, 200.0, 20.0);
        let mut last = tank.end();
        for (pressure, dt) in [(2.0, 60.0), (3.0, 0.0), (4.0, 120.0), (4.0, -30.0), (1.0, 600.0)] {
            tank.consume(pressure, dt);
            assert!(tank.end() <= last, "end must never increase");
            assert!(tank.end() >= 0.0);
            last = tank.end();
        }
        assert!(tank.used() > 0.0);
    }

    #[test]
    fn test_time_left() {
        let tank = Tank::new(AIR, 10.0, 200.0, 20.0);
        // 200 bar / (2 bar/min * 4 bar) = 25 min
        assert_eq!(tank.time_left(4.0), 25.0);
        assert_eq!(tank.time_left(3.0), 33.0);
    }

    #[test]
    fn test_exhausted_tank() {
        let mut tank = Tank::new(AIR, 10.0, 50.0, 20.0);
        tank.consume(4.0, 3600.0);
        assert_eq!(tank.end(), 0.0);
        assert!(tank.is_empty());
        assert_eq!(tank.time_left(4.0), -1.0);
        assert!(!tank.is_usable_at(1.0, &GasLimits::default()));
    }

    #[test]
    fn test_usable_respects_mod() {
        let tank = Tank::new(GasMix::new(0.5, 0.0).unwrap(), 7.0, 200.0, 20.0);
        let limits = GasLimits::new(1.6, true);
        assert!(tank.is_usable_at(3.1, &limits));
        assert!(!tank.is_usable_at(3.5, &limits));
    }
}
