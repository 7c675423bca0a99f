//! Live stop ladder of a dive.
//!
//! The ladder is derived from the deco model but only recomputed when the
//! diver moves away from the tracked stop by at least [`BAND_M`]; small depth
//! noise around a stop keeps its depth and remaining time stable. The stop
//! countdown is driven explicitly through [`DecoStops::tick`].

use tracing::debug;

use crate::gas::{GasLimits, GasMix};
use crate::physio::buhlmann::PHASE_M;
use crate::physio::{DecoModel, Stop};

/// Depth deviation (m) that triggers a recomputation.
pub const BAND_M: f64 = PHASE_M - 1.0;

const EPSILON: f64 = 1e-6;

/// Snapshot of the stop the diver should be at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentStop {
    pub depth: f64,
    /// Time still to hold (s).
    pub seconds: f64,
    pub optional: bool,
    /// The diver is shallower than this mandatory stop.
    pub missed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DecoStops {
    stops: Vec<Stop>,
    cursor: usize,
    /// Countdown of the stop at `cursor` (s).
    remaining: f64,
    /// Depth (m) of the diver at the last update.
    depth: f64,
    /// Deepest first-stop pressure (bar) seen, anchoring the GF ramp.
    gf_anchor: Option<f64>,
    /// Depth (m) of the last mandatory stop counted down to zero.
    last_served: Option<f64>,
    initialized: bool,
    missed: bool,
    any_missed: bool,
    ever_needed: bool,
    ever_required: bool,
    safety_done: bool,
    frozen: bool,
}

impl DecoStops {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh ladder whose GF ramp keeps an existing anchor.
    pub fn with_anchor(anchor: Option<f64>) -> Self {
        Self {
            gf_anchor: anchor,
            ..Self::default()
        }
    }

    pub fn anchor(&self) -> Option<f64> {
        self.gf_anchor
    }

    fn active(&self) -> Option<&Stop> {
        self.stops.get(self.cursor)
    }

    fn needs_recompute(&self, depth: f64) -> bool {
        match self.active() {
            Some(stop) if self.initialized => (depth - stop.depth).abs() >= BAND_M,
            _ => true,
        }
    }

    /// Track the diver at `depth` and recompute the ladder from `deco` when
    /// required. Returns the stops that were not part of the previous ladder.
    pub fn update(
        &mut self,
        depth: f64,
        deco: &DecoModel,
        mixes: &[GasMix],
        limits: &GasLimits,
    ) -> Vec<Stop> {
        if self.frozen {
            return Vec::new();
        }
        self.depth = depth.max(0.0);
        if self
            .last_served
            .is_some_and(|served| self.depth > served + BAND_M)
        {
            self.last_served = None;
        }

        let mut added = Vec::new();
        if self.needs_recompute(self.depth) {
            if let Some(first) = deco.first_stop_pressure() {
                self.gf_anchor = Some(self.gf_anchor.map_or(first, |a| a.max(first)));
            }
            let mut ladder = deco.stops_anchored(mixes, limits, self.gf_anchor);
            if let Some(served) = self.last_served {
                ladder.retain(|s| s.optional || s.depth < served - EPSILON);
            }
            // The safety stop follows a no-deco dive and is never a descent.
            ladder.retain(|s| !s.optional || s.depth - self.depth < BAND_M);
            if (self.safety_done || self.ever_required) && ladder.iter().all(|s| s.optional) {
                ladder.clear();
            }
            added = ladder
                .iter()
                .filter(|s| !self.remaining_stops().any(|old| old.depth == s.depth))
                .cloned()
                .collect();
            debug!(
                depth = self.depth,
                stops = ladder.len(),
                added = added.len(),
                "stop ladder recomputed"
            );
            self.remaining = ladder.first().map(|s| s.seconds).unwrap_or(0.0);
            self.stops = ladder;
            self.cursor = 0;
            self.initialized = true;
        }

        if !self.stops.is_empty() {
            self.ever_needed = true;
        }
        if self.stops.iter().any(|s| !s.optional) {
            self.ever_required = true;
        }
        self.missed = self
            .active()
            .is_some_and(|s| !s.optional && self.depth < s.depth - BAND_M);
        self.any_missed |= self.missed;
        added
    }

    /// Count down the active stop while the diver holds its depth band.
    pub fn tick(&mut self, seconds: f64, depth: f64) {
        if self.frozen || seconds <= 0.0 {
            return;
        }
        let Some((stop_depth, optional)) = self.active().map(|s| (s.depth, s.optional)) else {
            return;
        };
        if (depth - stop_depth).abs() >= BAND_M {
            return;
        }
        self.remaining -= seconds;
        if self.remaining <= 0.0 {
            if optional {
                self.safety_done = true;
            } else {
                self.last_served = Some(stop_depth);
            }
            self.cursor += 1;
            self.remaining = self.active().map(|s| s.seconds).unwrap_or(0.0);
        }
    }

    pub fn current(&self) -> Option<CurrentStop> {
        self.active().map(|s| CurrentStop {
            depth: s.depth,
            seconds: self.remaining.max(0.0),
            optional: s.optional,
            missed: self.missed,
        })
    }

    fn remaining_stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter().skip(self.cursor)
    }

    /// Stops still ahead, the active one carrying its remaining time.
    pub fn remaining(&self) -> Vec<Stop> {
        self.remaining_stops()
            .enumerate()
            .map(|(i, s)| {
                let mut stop = s.clone();
                if i == 0 {
                    stop.seconds = self.remaining.max(0.0);
                }
                stop
            })
            .collect()
    }

    /// Whether no stop, mandatory or optional, has ever been needed.
    pub fn no_deco(&self) -> bool {
        !self.ever_needed
    }

    /// Whether a mandatory stop has ever been needed.
    pub fn deco_required(&self) -> bool {
        self.ever_required
    }

    /// Whether a mandatory stop is currently pending.
    pub fn in_deco(&self) -> bool {
        self.remaining_stops().any(|s| !s.optional)
    }

    pub fn missed(&self) -> bool {
        self.missed
    }

    pub fn any_missed(&self) -> bool {
        self.any_missed
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
