//! A single dive: lifecycle, sampling, gas and alerts.
//!
//! A [`Dive`] goes `NotStarted -> Active -> Ended` exactly once. Every
//! mutating call returns the [`DiveEvent`]s it produced; calls on a dive
//! that is not active are silent no-ops.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::body::BodyState;
use crate::clock::{seconds_between, Clock};
use crate::environment::DiveSiteEnv;
use crate::gas::{GasLimits, GasMix, AIR};
use crate::metrics::{DepthClass, DepthStats};
use crate::physio::buhlmann::{ASCENT_RATE_M_MIN, PHASE_M};
use crate::physio::{GradientFactors, PhysioEffect, Stop};
use crate::stops::{CurrentStop, DecoStops};
use crate::surface::SurfaceInterval;
use crate::tank::Tank;

/// Ideal descent speed (m/min) used when a sample carries no interval.
pub const DESCENT_RATE_M_MIN: f64 = 18.0;

/// Descent speed (m/min) above which the descent alert fires.
const DESCENT_RATE_LIMIT: f64 = 30.0;

/// Time left (min) at or below which the low time alert fires.
const TIME_LEFT_LOW_MINUTES: f64 = 3.0;

/// Longest time left (min) ever reported.
const TIME_LEFT_HORIZON_MINUTES: f64 = 360.0;

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiveStatus {
    NotStarted,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlertKind {
    MissedStop,
    Ppo2High,
    Ppo2Low,
    Narcosis,
    AscentRate,
    DescentRate,
    TimeLeftLow,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::MissedStop => "missed stop",
            AlertKind::Ppo2High => "pO2 high",
            AlertKind::Ppo2Low => "pO2 low",
            AlertKind::Narcosis => "narcosis",
            AlertKind::AscentRate => "ascent rate",
            AlertKind::DescentRate => "descent rate",
            AlertKind::TimeLeftLow => "time left low",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DiveEvent {
    Start {
        at: DateTime<Utc>,
    },
    End {
        at: DateTime<Utc>,
        duration_sec: f64,
        max_depth_m: f64,
        depth_class: DepthClass,
    },
    Sample {
        depth: f64,
        runtime_sec: f64,
    },
    TankBegin {
        index: usize,
        mix: GasMix,
    },
    TankEnd {
        index: usize,
        end_bar: f64,
    },
    Alert {
        kind: AlertKind,
        active: bool,
    },
    DecoStopAdded(Stop),
}

pub struct Dive {
    env: DiveSiteEnv,
    limits: GasLimits,
    gf: GradientFactors,
    clock: Arc<dyn Clock>,
    status: DiveStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    last_sample_at: Option<DateTime<Utc>>,
    runtime: f64,
    stats: DepthStats,
    tanks: Vec<Tank>,
    current: Option<usize>,
    body: BodyState,
    stops: DecoStops,
    alerts: BTreeSet<AlertKind>,
    repetitive: bool,
}

impl fmt::Debug for Dive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dive")
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .field("runtime", &self.runtime)
            .field("stats", &self.stats)
            .field("current", &self.current)
            .field("alerts", &self.alerts)
            .finish_non_exhaustive()
    }
}

impl Clone for Dive {
    /// Deep copy with a ladder freshly derived from the copied body.
    fn clone(&self) -> Self {
        let mut dive = Self {
            env: self.env,
            limits: self.limits,
            gf: self.gf,
            clock: Arc::clone(&self.clock),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            last_sample_at: self.last_sample_at,
            runtime: self.runtime,
            stats: self.stats.clone(),
            tanks: self.tanks.clone(),
            current: self.current,
            body: self.body.clone(),
            stops: DecoStops::with_anchor(self.stops.anchor()),
            alerts: self.alerts.clone(),
            repetitive: self.repetitive,
        };
        if dive.is_active() {
            dive.update_stops();
        }
        dive
    }
}

impl Dive {
    pub fn new(
        env: DiveSiteEnv,
        limits: GasLimits,
        gf: GradientFactors,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            env,
            limits,
            gf,
            clock,
            status: DiveStatus::NotStarted,
            started_at: None,
            ended_at: None,
            last_sample_at: None,
            runtime: 0.0,
            stats: DepthStats::default(),
            tanks: Vec::new(),
            current: None,
            body: BodyState::new(env, gf),
            stops: DecoStops::new(),
            alerts: BTreeSet::new(),
            repetitive: false,
        }
    }

    /// Start the dive on the first of `tanks`, seeding the body from the
    /// previous surface interval.
    pub fn start(&mut self, tanks: Vec<Tank>, surface: &SurfaceInterval) -> Vec<DiveEvent> {
        let repetitive = surface.si().is_some();
        let body = surface.body_state(self.env, self.gf);
        self.start_with_body(tanks, body, repetitive)
    }

    /// Start the dive from an explicit body state.
    pub fn start_with_body(
        &mut self,
        tanks: Vec<Tank>,
        body: BodyState,
        repetitive: bool,
    ) -> Vec<DiveEvent> {
        if self.status != DiveStatus::NotStarted {
            return Vec::new();
        }
        let now = self.clock.now();
        self.status = DiveStatus::Active;
        self.started_at = Some(now);
        self.last_sample_at = Some(now);
        self.tanks = tanks;
        self.body = body;
        self.repetitive = repetitive;

        let mut events = vec![DiveEvent::Start { at: now }];
        if !self.tanks.is_empty() {
            self.current = Some(0);
            events.push(DiveEvent::TankBegin {
                index: 0,
                mix: *self.tanks[0].mix(),
            });
        }
        let mix = self.mix();
        self.body.add_change(self.env.surface_pressure(), 0.0, &mix);
        info!(
            tanks = self.tanks.len(),
            mix = %mix,
            repetitive,
            "dive started"
        );
        events
    }

    /// Switch to the tank at `index`.
    pub fn change_tank(&mut self, index: usize) -> Vec<DiveEvent> {
        if !self.is_active() || index >= self.tanks.len() || self.current == Some(index) {
            return Vec::new();
        }
        let mut events = Vec::new();
        if let Some(previous) = self.current {
            events.push(DiveEvent::TankEnd {
                index: previous,
                end_bar: self.tanks[previous].end(),
            });
        }
        self.current = Some(index);
        let mix = *self.tanks[index].mix();
        debug!(index, mix = %mix, depth = self.stats.current_m, "tank switch");
        events.push(DiveEvent::TankBegin { index, mix });
        events
    }

    /// Record the diver at `depth_m`. Without `dt_seconds` the interval is
    /// derived from the ideal descent/ascent speed, or from wall time when
    /// the depth did not change.
    pub fn add_sample(&mut self, depth_m: f64, dt_seconds: Option<f64>) -> Vec<DiveEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        let depth = depth_m.max(0.0);
        let now = self.clock.now();
        let dt = match dt_seconds {
            Some(dt) => dt.max(0.0),
            None => self.ideal_interval(depth, now),
        };
        self.last_sample_at = Some(now);
        self.advance(depth, dt);

        let mut events: Vec<DiveEvent> = self
            .update_stops()
            .into_iter()
            .map(DiveEvent::DecoStopAdded)
            .collect();
        events.push(DiveEvent::Sample {
            depth,
            runtime_sec: self.runtime,
        });
        events.extend(self.refresh_alerts());
        events
    }

    /// Count down the active stop by `seconds`.
    pub fn tick(&mut self, seconds: f64) -> Vec<DiveEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        self.stops.tick(seconds, self.stats.current_m);
        self.refresh_alerts()
    }

    /// Finish the dive: close the tank and freeze the stop ladder.
    pub fn end(&mut self) -> Vec<DiveEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        let now = self.clock.now();
        self.status = DiveStatus::Ended;
        self.ended_at = Some(now);
        self.stops.freeze();

        let mut events = Vec::new();
        if let Some(index) = self.current {
            events.push(DiveEvent::TankEnd {
                index,
                end_bar: self.tanks[index].end(),
            });
        }
        let duration_sec = self.duration();
        let depth_class = self.stats.depth_class();
        events.push(DiveEvent::End {
            at: now,
            duration_sec,
            max_depth_m: self.stats.max_m,
            depth_class,
        });
        info!(
            duration_sec,
            max_depth = self.stats.max_m,
            %depth_class,
            missed_stop = self.stops.any_missed(),
            "dive ended"
        );
        events
    }

    fn ideal_interval(&self, depth: f64, now: DateTime<Utc>) -> f64 {
        let delta = depth - self.stats.current_m;
        if delta > EPSILON {
            delta / DESCENT_RATE_M_MIN * 60.0
        } else if delta < -EPSILON {
            -delta / ASCENT_RATE_M_MIN * 60.0
        } else {
            self.last_sample_at
                .or(self.started_at)
                .map(|last| seconds_between(last, now).max(0.0))
                .unwrap_or(0.0)
        }
    }

    /// Physics of one interval: statistics, body and gas.
    fn advance(&mut self, depth: f64, dt: f64) {
        let p_start = self.env.pressure_at(self.stats.current_m);
        let p_end = self.env.pressure_at(depth);
        let mix = self.mix();
        self.stats.record(depth, dt);
        self.runtime += dt;
        self.body.add_change(p_end, dt, &mix);
        if let Some(tank) = self.current.and_then(|i| self.tanks.get_mut(i)) {
            tank.consume((p_start + p_end) / 2.0, dt);
        }
    }

    fn update_stops(&mut self) -> Vec<Stop> {
        let mixes = self.usable_mixes();
        self.stops
            .update(self.stats.current_m, self.body.deco(), &mixes, &self.limits)
    }

    fn refresh_alerts(&mut self) -> Vec<DiveEvent> {
        let now = self.alerts();
        let mut events: Vec<DiveEvent> = self
            .alerts
            .difference(&now)
            .map(|&kind| DiveEvent::Alert {
                kind,
                active: false,
            })
            .collect();
        events.extend(
            now.difference(&self.alerts)
                .map(|&kind| DiveEvent::Alert { kind, active: true }),
        );
        self.alerts = now;
        events
    }

    /// Mixes of the tanks that still hold gas.
    pub fn usable_mixes(&self) -> Vec<GasMix> {
        let mixes: Vec<GasMix> = self
            .tanks
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| *t.mix())
            .collect();
        if mixes.is_empty() {
            vec![self.mix()]
        } else {
            mixes
        }
    }

    /// Index of the tank with the lowest MOD that is usable at `p_abs`.
    pub fn best_tank_at(&self, p_abs: f64) -> Option<usize> {
        self.tanks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_usable_at(p_abs, &self.limits))
            .min_by(|(_, a), (_, b)| {
                a.mix()
                    .mod_pressure(&self.limits)
                    .total_cmp(&b.mix().mod_pressure(&self.limits))
            })
            .map(|(i, _)| i)
    }

    /// Absolute pressure at the current depth.
    pub fn pressure(&self) -> f64 {
        self.env.pressure_at(self.stats.current_m)
    }

    /// Mix breathed right now; air when no tank is open.
    pub fn mix(&self) -> GasMix {
        self.current_tank().map(|t| *t.mix()).unwrap_or(AIR)
    }

    /// Minutes the diver may stay at the current depth so that the full
    /// ascent, stops included, still fits the gas and oxygen budgets.
    pub fn time_left(&self) -> f64 {
        if !self.is_active() {
            return f64::INFINITY;
        }
        let tank = self
            .current_tank()
            .map(|t| t.time_left(self.pressure()))
            .unwrap_or(f64::INFINITY);
        let naive = tank
            .min(self.body.nearest_effect().time)
            .min(TIME_LEFT_HORIZON_MINUTES);
        if naive < 0.0 {
            return naive;
        }
        let mut candidate = naive.floor();
        while candidate > 0.0 && !self.survives(candidate) {
            candidate -= 1.0;
        }
        candidate
    }

    fn within_budget(&self) -> bool {
        let tank_ok = self
            .current_tank()
            .map_or(true, |t| t.time_left(self.pressure()) >= 0.0);
        tank_ok && self.body.cns().time_left() >= 0.0 && self.body.otu().time_left() >= 0.0
    }

    /// Whether staying `minutes` longer and then ascending through the
    /// ladder keeps every budget non-negative.
    fn survives(&self, minutes: f64) -> bool {
        let mut sim = self.clone();
        let depth = sim.stats.current_m;
        sim.advance(depth, minutes * 60.0);
        if !sim.within_budget() {
            return false;
        }
        let mut ladder = DecoStops::with_anchor(self.stops.anchor());
        ladder.update(depth, sim.body.deco(), &sim.usable_mixes(), &sim.limits);
        for stop in ladder.remaining() {
            if !sim.ascend_to(stop.depth) {
                return false;
            }
            sim.advance(stop.depth, stop.seconds);
            if !sim.within_budget() {
                return false;
            }
        }
        sim.ascend_to(0.0)
    }

    /// Ascend to `depth` one stop spacing at a time, switching to the best
    /// usable tank at every level. False as soon as a budget runs out.
    fn ascend_to(&mut self, depth: f64) -> bool {
        self.switch_to_best_tank();
        while self.stats.current_m - depth > EPSILON {
            let from = self.stats.current_m;
            let level = ((from - EPSILON) / PHASE_M).floor() * PHASE_M;
            let to = level.max(depth);
            self.advance(to, (from - to) / ASCENT_RATE_M_MIN * 60.0);
            if !self.within_budget() {
                return false;
            }
            self.switch_to_best_tank();
        }
        true
    }

    fn switch_to_best_tank(&mut self) {
        let best = self.best_tank_at(self.pressure());
        if best.is_some() && best != self.current {
            self.current = best;
        }
    }

    /// Alerts that apply to the current state.
    pub fn alerts(&self) -> BTreeSet<AlertKind> {
        let mut alerts = BTreeSet::new();
        if !self.is_active() {
            return alerts;
        }
        let p = self.pressure();
        let mix = self.mix();
        if self.stops.missed() {
            alerts.insert(AlertKind::MissedStop);
        }
        if mix.ppo2(p) > self.limits.max_ppo2 + EPSILON {
            alerts.insert(AlertKind::Ppo2High);
        }
        if mix.ppo2(p) < self.limits.min_ppo2 - EPSILON {
            alerts.insert(AlertKind::Ppo2Low);
        }
        if mix.narcotic_fraction(&self.limits) * p > self.limits.max_narcotic_pressure() + EPSILON
        {
            alerts.insert(AlertKind::Narcosis);
        }
        if self.stats.ascent_rate() > ASCENT_RATE_M_MIN + EPSILON {
            alerts.insert(AlertKind::AscentRate);
        }
        if self.stats.descent_rate() > DESCENT_RATE_LIMIT + EPSILON {
            alerts.insert(AlertKind::DescentRate);
        }
        if !self.in_deco() && self.stats.current_m > 0.0 && self.time_left() <= TIME_LEFT_LOW_MINUTES
        {
            alerts.insert(AlertKind::TimeLeftLow);
        }
        alerts
    }

    pub fn status(&self) -> DiveStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == DiveStatus::Active
    }

    pub fn was_started(&self) -> bool {
        self.status != DiveStatus::NotStarted
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Simulated time covered by the samples (s).
    pub fn runtime(&self) -> f64 {
        self.runtime
    }

    /// Wall time from start to end, or to now while active (s).
    pub fn duration(&self) -> f64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => seconds_between(start, end),
            (Some(start), None) => seconds_between(start, self.clock.now()),
            _ => 0.0,
        }
    }

    pub fn depth_stats(&self) -> &DepthStats {
        &self.stats
    }

    pub fn current_tank(&self) -> Option<&Tank> {
        self.current.and_then(|i| self.tanks.get(i))
    }

    pub fn current_tank_index(&self) -> Option<usize> {
        self.current
    }

    pub fn tanks(&self) -> &[Tank] {
        &self.tanks
    }

    pub fn body(&self) -> &BodyState {
        &self.body
    }

    pub fn stops(&self) -> &DecoStops {
        &self.stops
    }

    pub fn current_stop(&self) -> Option<CurrentStop> {
        self.stops.current()
    }

    /// Whether a mandatory stop is pending.
    pub fn in_deco(&self) -> bool {
        self.stops.in_deco()
    }

    pub fn env(&self) -> &DiveSiteEnv {
        &self.env
    }

    pub fn limits(&self) -> &GasLimits {
        &self.limits
    }

    pub fn gradient_factors(&self) -> GradientFactors {
        self.gf
    }

    /// Started while a previous surface interval was still running.
    pub fn is_repetitive(&self) -> bool {
        self.repetitive
    }

    /// Whether a direct ascent is allowed by the deco model.
    pub fn can_ascend(&self) -> bool {
        self.body.deco().can_ascend()
    }

    /// Minutes at the surface until the body has cleared.
    pub fn reset_after(&self) -> f64 {
        self.body.reset_after()
    }

    /// No-decompression time of the deco model alone (min).
    pub fn ndl(&self) -> f64 {
        self.body.deco().time_left()
    }
}
