//! The dive computer: turns a depth stream into dives and plans the next one.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::body::BodyState;
use crate::clock::Clock;
use crate::dive::{Dive, DiveEvent, DESCENT_RATE_M_MIN};
use crate::environment::{DiveSite, DiveSiteEnv};
use crate::gas::{GasMix, AIR};
use crate::metrics::DepthClass;
use crate::physio::{cns, otu};
use crate::settings::Settings;
use crate::storage::KeyValueStore;
use crate::surface::SurfaceInterval;
use crate::tank::Tank;

/// Depth (m) at which a dive starts, and above which it may end.
pub const DIVE_THRESHOLD_M: f64 = 1.0;

/// Time (s) spent above the threshold before a dive ends.
pub const SURFACE_END_SECONDS: f64 = 180.0;

/// Runtime (s) between saves of a running dive.
pub const SAVE_INTERVAL_SECONDS: f64 = 60.0;

const PLAN_FIRST_DEPTH_M: f64 = 10.0;
const PLAN_STEP_M: f64 = 3.0;
const PLAN_MAX_ENTRIES: usize = 20;

/// What bounds the bottom time of a planned dive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LimitingFactor {
    Gas,
    Ndl,
    Cns,
    Otu,
}

impl LimitingFactor {
    fn from_effect(name: &str) -> Self {
        match name {
            cns::NAME => LimitingFactor::Cns,
            otu::NAME => LimitingFactor::Otu,
            _ => LimitingFactor::Ndl,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LimitingFactor::Gas => "gas",
            LimitingFactor::Ndl => "no-decompression time",
            LimitingFactor::Cns => "CNS",
            LimitingFactor::Otu => "OTU",
        }
    }
}

impl fmt::Display for LimitingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One candidate depth of the planning sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedDive {
    pub depth: f64,
    /// Bottom time available at `depth` (min).
    pub duration_min: f64,
    pub limiting_factor: LimitingFactor,
    /// Time to surface after the bottom time (min).
    pub ascent_min: f64,
    /// Best mix for `depth` under the configured limits.
    pub recommended_mix: GasMix,
    pub depth_class: DepthClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub mix: GasMix,
    pub tank_count: usize,
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
    pub dives: Vec<PlannedDive>,
    pub break_reason: Option<String>,
}

pub struct DiveComputer {
    settings: Settings,
    env: DiveSiteEnv,
    clock: Arc<dyn Clock>,
    surface: SurfaceInterval,
    dive: Option<Dive>,
    /// Time spent above the threshold during the active dive (s).
    surface_time: f64,
    /// Dive runtime at the last save of the running dive (s).
    saved_at_runtime: f64,
}

impl fmt::Debug for DiveComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiveComputer")
            .field("env", &self.env)
            .field("dive", &self.dive)
            .field("surface_time", &self.surface_time)
            .finish_non_exhaustive()
    }
}

impl DiveComputer {
    pub fn new(settings: Settings, store: Box<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            env: settings.env(),
            surface: SurfaceInterval::new(store, Arc::clone(&clock)),
            settings,
            clock,
            dive: None,
            surface_time: 0.0,
            saved_at_runtime: 0.0,
        }
    }

    /// Move to another site; ignored while a dive is running.
    pub fn set_site(&mut self, site: &DiveSite) {
        if !self.is_diving() {
            self.env = site.env(self.settings.salt);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn env(&self) -> &DiveSiteEnv {
        &self.env
    }

    /// The running dive, or the last one once it ended.
    pub fn dive(&self) -> Option<&Dive> {
        self.dive.as_ref()
    }

    pub fn surface(&self) -> &SurfaceInterval {
        &self.surface
    }

    pub fn is_diving(&self) -> bool {
        self.dive.as_ref().is_some_and(Dive::is_active)
    }

    fn new_dive(&self) -> Dive {
        Dive::new(
            self.env,
            self.settings.limits(),
            self.settings.gradient_factors(),
            Arc::clone(&self.clock),
        )
    }

    /// Feed one depth sample. Starts a dive at the threshold depth and ends
    /// it after [`SURFACE_END_SECONDS`] above it.
    pub fn sample(&mut self, depth_m: f64, dt_seconds: Option<f64>) -> Vec<DiveEvent> {
        let depth = depth_m.max(0.0);
        let mut events = Vec::new();

        if !self.is_diving() {
            if depth < DIVE_THRESHOLD_M {
                return events;
            }
            if let Err(e) = self.surface.prune() {
                warn!(error = %e, "could not prune surface interval");
            }
            let mut dive = self.new_dive();
            events.extend(dive.start(self.settings.build_tanks(), &self.surface));
            self.dive = Some(dive);
            self.surface_time = 0.0;
            self.saved_at_runtime = 0.0;
        }

        let Some(dive) = self.dive.as_mut() else {
            return events;
        };
        let before = dive.runtime();
        events.extend(dive.add_sample(depth, dt_seconds));
        let dt = dive.runtime() - before;

        if depth < DIVE_THRESHOLD_M {
            self.surface_time += dt;
            if self.surface_time >= SURFACE_END_SECONDS {
                events.extend(self.end_dive());
            }
        } else {
            self.surface_time = 0.0;
        }
        self.checkpoint();
        events
    }

    /// Save the running dive once per [`SAVE_INTERVAL_SECONDS`] of runtime
    /// so a restart mid-dive still finds the body state.
    fn checkpoint(&mut self) {
        let Some(dive) = self.dive.as_ref().filter(|d| d.is_active()) else {
            return;
        };
        if dive.runtime() - self.saved_at_runtime < SAVE_INTERVAL_SECONDS {
            return;
        }
        self.saved_at_runtime = dive.runtime();
        if let Err(e) = self.surface.save(dive) {
            warn!(error = %e, "running dive not saved");
        }
    }

    /// Advance the stop countdown of the running dive.
    pub fn tick(&mut self, seconds: f64) -> Vec<DiveEvent> {
        match self.dive.as_mut() {
            Some(dive) => dive.tick(seconds),
            None => Vec::new(),
        }
    }

    /// End the running dive and persist the surface interval.
    pub fn end_dive(&mut self) -> Vec<DiveEvent> {
        let Some(dive) = self.dive.as_mut() else {
            return Vec::new();
        };
        let events = dive.end();
        if !events.is_empty() {
            if let Err(e) = self.surface.save(dive) {
                warn!(error = %e, "surface interval not saved");
            }
        }
        self.surface_time = 0.0;
        events
    }

    /// Body state a dive started now would begin with.
    fn current_body(&self) -> BodyState {
        self.surface
            .body_state(self.env, self.settings.gradient_factors())
    }

    /// Sweep target depths and report the bottom time available at each.
    pub fn plan(&self) -> PlanReport {
        let limits = self.settings.limits();
        let tanks = self.settings.build_tanks();
        let body = self.current_body();
        let mix = tanks.first().map(|t| *t.mix()).unwrap_or(AIR);

        let mut report = PlanReport {
            mix,
            tank_count: tanks.len(),
            mod_m: self.env.depth_at(mix.mod_pressure(&limits)),
            mnd_m: self.env.depth_at(mix.mnd(&limits)),
            ppo2: limits.max_ppo2,
            rmv: self.settings.rmv,
            water: self.env.water().to_string(),
            surface_pressure: self.env.surface_pressure(),
            cns_pct: body.cns().percent(),
            otu_pct: body.otu().percent(),
            saturation_pct: body.deco().saturation(),
            gf_description: self.settings.gradient_factors().description(),
            no_dive_minutes: self.surface.no_dive(),
            dives: Vec::new(),
            break_reason: None,
        };

        if report.no_dive_minutes > 0.0 {
            report.break_reason = Some(format!(
                "no-dive restriction active for {:.0} min",
                report.no_dive_minutes.ceil()
            ));
            return report;
        }
        if tanks.is_empty() {
            report.break_reason = Some("no tanks configured".to_string());
            return report;
        }
        if mix.mbd(&limits) > self.env.surface_pressure() {
            report.break_reason = Some(format!("{mix} is hypoxic at the surface"));
            return report;
        }

        let repetitive = self.surface.si().is_some();
        let mut depth = PLAN_FIRST_DEPTH_M;
        while report.dives.len() < PLAN_MAX_ENTRIES {
            match self.plan_depth(depth, &tanks, &body, repetitive) {
                Ok(planned) => report.dives.push(planned),
                Err(reason) => {
                    report.break_reason = Some(reason);
                    break;
                }
            }
            depth += PLAN_STEP_M;
        }
        info!(
            entries = report.dives.len(),
            break_reason = report.break_reason.as_deref().unwrap_or(""),
            "dive plan computed"
        );
        report
    }

    /// Simulate a dive to `depth` on the configured tanks.
    fn plan_depth(
        &self,
        depth: f64,
        tanks: &[Tank],
        body: &BodyState,
        repetitive: bool,
    ) -> Result<PlannedDive, String> {
        let mut dive = self.new_dive();
        dive.start_with_body(tanks.to_vec(), body.clone(), repetitive);
        let limits = *dive.limits();

        // Descend tank by tank, switching at each tank's MOD.
        let mut reached = 0.0;
        while reached < depth {
            let mix = dive.mix();
            let mod_depth = self.env.depth_at(mix.mod_pressure(&limits)).floor();
            let leg = depth.min(mod_depth);
            if leg > reached {
                dive.add_sample(leg, Some((leg - reached) / DESCENT_RATE_M_MIN * 60.0));
                reached = leg;
            }
            if reached < depth {
                let p = dive.pressure();
                let after = dive.current_tank_index().map_or(0, |i| i + 1);
                let Some(next) = (after..dive.tanks().len())
                    .find(|&i| dive.tanks()[i].is_usable_at(p, &limits))
                else {
                    return Err(format!("MOD of {mix} exceeded at {depth} m"));
                };
                dive.change_tank(next);
            }
        }

        let p = dive.pressure();
        let mix = dive.mix();
        if !mix.is_breathable(p, &limits) {
            return Err(format!("{mix} is not breathable at {depth} m"));
        }

        let tank_left = dive
            .current_tank()
            .map_or(f64::INFINITY, |t| t.time_left(p));
        let nearest = dive.body().nearest_effect();
        let duration = dive.time_left();
        // A candidate shortened by the ascent check is short of ascent gas.
        let shortened = duration < tank_left.min(nearest.time).floor();
        let limiting_factor = if tank_left <= nearest.time || shortened {
            LimitingFactor::Gas
        } else {
            LimitingFactor::from_effect(nearest.name)
        };
        if duration <= 0.0 {
            return Err(format!("{limiting_factor} exhausted at {depth} m"));
        }

        dive.add_sample(depth, Some(duration * 60.0));
        let ascent_min = dive
            .body()
            .deco()
            .tts(&dive.usable_mixes(), &limits);

        Ok(PlannedDive {
            depth,
            duration_min: duration,
            limiting_factor,
            ascent_min,
            recommended_mix: GasMix::best_mix(p, &limits),
            depth_class: DepthClass::of(depth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::TankConfig;
    use crate::storage::MemoryStore;

    fn computer(settings: Settings) -> (DiveComputer, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::default());
        let dc = DiveComputer::new(settings, Box::new(store.clone()), clock.clone());
        (dc, store, clock)
    }

    fn feed(dc: &mut DiveComputer, clock: &ManualClock, samples: &[(f64, f64)]) -> Vec<DiveEvent> {
        let mut events = Vec::new();
        for &(depth, dt) in samples {
            clock.advance_secs(dt);
            events.extend(dc.sample(depth, Some(dt)));
        }
        events
    }

    fn count(events: &[DiveEvent], pred: impl Fn(&DiveEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_single_dive_from_stream() {
        let (mut dc, store, clock) = computer(Settings::default());
        let samples = [
            (1.0, 60.0),
            (10.0, 120.0),
            (15.0, 120.0),
            (10.0, 120.0),
            (5.0, 120.0),
            (0.0, 200.0),
        ];
        let mut events = Vec::new();
        for (i, &(depth, dt)) in samples.iter().enumerate() {
            clock.advance_secs(dt);
            let produced = dc.sample(depth, Some(dt));
            if i == 0 {
                assert!(matches!(produced[0], DiveEvent::Start { .. }));
            }
            events.extend(produced);
        }
        assert_eq!(count(&events, |e| matches!(e, DiveEvent::Start { .. })), 1);
        assert_eq!(count(&events, |e| matches!(e, DiveEvent::End { .. })), 1);
        assert!(matches!(events.last(), Some(DiveEvent::End { .. })));
        assert!(!dc.is_diving());
        assert!(!store.is_empty());
        assert_eq!(dc.dive().map(|d| d.depth_stats().max_m), Some(15.0));
    }

    #[test]
    fn test_running_dive_is_saved_periodically() {
        let (mut dc, store, clock) = computer(Settings::default());
        feed(&mut dc, &clock, &[(10.0, 30.0), (10.0, 20.0)]);
        assert!(store.is_empty());

        feed(&mut dc, &clock, &[(12.0, 20.0)]);
        let record = dc.surface().record().unwrap();
        assert!(record.still_active);
        assert!(record.no_dive_minutes == 0.0);

        feed(&mut dc, &clock, &[(0.0, 80.0), (0.0, 180.0)]);
        assert!(!dc.is_diving());
        let record = dc.surface().record().unwrap();
        assert!(!record.still_active);
    }

    #[test]
    fn test_shallow_samples_do_not_start_a_dive() {
        let (mut dc, _, clock) = computer(Settings::default());
        let events = feed(&mut dc, &clock, &[(0.3, 60.0), (0.9, 60.0)]);
        assert!(events.is_empty());
        assert!(dc.dive().is_none());
    }

    #[test]
    fn test_brief_surfacing_keeps_dive() {
        let (mut dc, _, clock) = computer(Settings::default());
        let events = feed(
            &mut dc,
            &clock,
            &[(5.0, 60.0), (0.5, 60.0), (0.0, 100.0), (6.0, 60.0), (0.0, 179.0)],
        );
        assert_eq!(count(&events, |e| matches!(e, DiveEvent::End { .. })), 0);
        assert!(dc.is_diving());
        let events = feed(&mut dc, &clock, &[(0.0, 1.0)]);
        assert_eq!(count(&events, |e| matches!(e, DiveEvent::End { .. })), 1);
    }

    #[test]
    fn test_second_dive_is_repetitive() {
        let (mut dc, _, clock) = computer(Settings::default());
        let profile = [(12.0, 60.0), (12.0, 900.0), (0.0, 90.0), (0.0, 180.0)];
        feed(&mut dc, &clock, &profile);
        clock.advance_minutes(45.0);
        let events = feed(&mut dc, &clock, &profile[..2]);
        assert_eq!(count(&events, |e| matches!(e, DiveEvent::Start { .. })), 1);
        assert!(dc.dive().is_some_and(|d| d.is_repetitive()));
        assert!(dc.surface().si().is_some());
    }

    #[test]
    fn test_tick_reaches_the_dive() {
        let (mut dc, _, clock) = computer(Settings::default());
        assert!(dc.tick(1.0).is_empty());
        feed(&mut dc, &clock, &[(18.0, 60.0), (18.0, 1800.0), (5.0, 80.0)]);
        let stop = dc.dive().and_then(|d| d.current_stop()).unwrap();
        assert!(stop.optional);
        dc.tick(60.0);
        let after = dc.dive().and_then(|d| d.current_stop()).unwrap();
        assert_eq!(after.seconds, stop.seconds - 60.0);
    }

    #[test]
    fn test_plan_with_defaults() {
        let (dc, _, _) = computer(Settings::default());
        let report = dc.plan();
        assert_eq!(report.mix.name(), "Air");
        assert_eq!(report.tank_count, 1);
        assert_eq!(report.gf_description, "GF 40/100");
        assert_eq!(report.water, "salt");
        assert!((report.mod_m - 55.95).abs() < 0.1, "mod {}", report.mod_m);
        assert_eq!(report.cns_pct, 0.0);
        assert!(report.break_reason.is_some());

        let dives = &report.dives;
        assert!(dives.len() > 5 && dives.len() < PLAN_MAX_ENTRIES);
        assert_eq!(dives[0].depth, 10.0);
        assert_eq!(dives[0].limiting_factor, LimitingFactor::Gas);
        assert_eq!(dives[0].depth_class, DepthClass::OpenWater);
        for pair in dives.windows(2) {
            assert!(pair[1].depth_class >= pair[0].depth_class);
        }
        for pair in dives.windows(2) {
            assert_eq!(pair[1].depth - pair[0].depth, PLAN_STEP_M);
            assert!(pair[1].duration_min <= pair[0].duration_min);
        }
        assert!(dives.iter().any(|d| d.limiting_factor == LimitingFactor::Ndl));
        assert!(dives.iter().all(|d| d.duration_min > 0.0 && d.ascent_min > 0.0));
    }

    #[test]
    fn test_plan_switches_tanks_at_mod() {
        let settings = Settings {
            tanks: vec![
                TankConfig {
                    volume_l: 7.0,
                    start_bar: 200.0,
                    mix: "EAN50".parse().unwrap(),
                },
                TankConfig::default(),
            ],
            ..Settings::default()
        };
        let (dc, _, _) = computer(settings);
        let report = dc.plan();
        assert_eq!(report.tank_count, 2);
        assert!(report.dives.iter().any(|d| d.depth > 20.0));
    }

    #[test]
    fn test_plan_break_names_the_mix_at_its_mod() {
        let tank = |mix: &str| TankConfig {
            mix: mix.parse().unwrap(),
            ..TankConfig::default()
        };
        let settings = Settings {
            tanks: vec![tank("EAN32"), tank("EAN50")],
            ..Settings::default()
        };
        let (dc, _, _) = computer(settings);
        let report = dc.plan();
        // EAN32 reaches 33.3 m at pO2 1.4; EAN50 is no use below 17.7 m.
        assert_eq!(report.dives.last().map(|d| d.depth), Some(31.0));
        assert_eq!(
            report.break_reason.as_deref(),
            Some("MOD of EAN32 exceeded at 34 m")
        );
    }

    #[test]
    fn test_plan_breaks_on_hypoxic_first_mix() {
        let settings = Settings {
            tanks: vec![TankConfig {
                mix: "Tx10/70".parse().unwrap(),
                ..TankConfig::default()
            }],
            ..Settings::default()
        };
        let (dc, _, _) = computer(settings);
        let report = dc.plan();
        assert!(report.dives.is_empty());
        assert!(report
            .break_reason
            .is_some_and(|r| r.contains("hypoxic")));
    }

    #[test]
    fn test_plan_blocked_by_no_dive() {
        let (mut dc, _, clock) = computer(Settings::default());
        // Surface straight out of a deco dive.
        feed(
            &mut dc,
            &clock,
            &[(40.0, 120.0), (40.0, 1800.0), (0.0, 240.0), (0.0, 180.0)],
        );
        assert!(!dc.is_diving());
        let report = dc.plan();
        assert!(report.no_dive_minutes > 0.0);
        assert!(report.dives.is_empty());
        assert!(report
            .break_reason
            .is_some_and(|r| r.starts_with("no-dive")));
    }
}
