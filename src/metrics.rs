//! Running depth statistics of a dive.
//!
//! Statistics are updated incrementally, one interval at a time, so they can
//! be read at any point of a live dive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Depth (m) below which time counts as bottom time.
const BOTTOM_THRESHOLD_M: f64 = 3.0;

/// Training depth band a dive falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthClass {
    OpenWater,
    Advanced,
    Deep,
    Technical,
}

impl DepthClass {
    /// Deepest depth (m) of each band; anything deeper is technical.
    const BANDS: [(f64, DepthClass); 3] = [
        (18.0, DepthClass::OpenWater),
        (30.0, DepthClass::Advanced),
        (40.0, DepthClass::Deep),
    ];

    pub fn of(depth_m: f64) -> Self {
        Self::BANDS
            .iter()
            .find(|(limit, _)| depth_m <= *limit)
            .map_or(DepthClass::Technical, |&(_, class)| class)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepthClass::OpenWater => "open water",
            DepthClass::Advanced => "advanced",
            DepthClass::Deep => "deep",
            DepthClass::Technical => "technical",
        }
    }
}

impl fmt::Display for DepthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth statistics accumulated over the intervals of a dive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthStats {
    /// Latest depth (m).
    pub current_m: f64,
    /// Deepest depth reached (m).
    pub max_m: f64,
    /// Time-weighted average depth (m).
    pub avg_m: f64,
    /// Vertical speed over the last interval (m/min, positive descending).
    pub speed_m_min: f64,
    /// Time covered by the recorded intervals (s).
    pub duration_sec: f64,
    /// Time spent deeper than 3 m (s).
    pub bottom_time_sec: f64,
}

impl DepthStats {
    /// Record an interval of `dt_seconds` ending at `depth_m`. The depth is
    /// assumed to change linearly from the previous sample. Intervals with
    /// `dt_seconds <= 0` only move the current depth.
    pub fn record(&mut self, depth_m: f64, dt_seconds: f64) {
        let depth_m = depth_m.max(0.0);
        let previous = self.current_m;
        self.current_m = depth_m;
        self.max_m = self.max_m.max(depth_m);

        if dt_seconds <= 0.0 || !dt_seconds.is_finite() {
            return;
        }

        let interval_avg = (previous + depth_m) / 2.0;
        let total = self.duration_sec + dt_seconds;
        self.avg_m = (self.avg_m * self.duration_sec + interval_avg * dt_seconds) / total;
        self.duration_sec = total;
        self.speed_m_min = (depth_m - previous) / dt_seconds * 60.0;
        if interval_avg > BOTTOM_THRESHOLD_M {
            self.bottom_time_sec += dt_seconds;
        }
    }

    pub fn depth_class(&self) -> DepthClass {
        DepthClass::of(self.max_m)
    }

    /// Ascent speed (m/min), zero while descending or level.
    pub fn ascent_rate(&self) -> f64 {
        (-self.speed_m_min).max(0.0)
    }

    /// Descent speed (m/min), zero while ascending or level.
    pub fn descent_rate(&self) -> f64 {
        self.speed_m_min.max(0.0)
    }
}
