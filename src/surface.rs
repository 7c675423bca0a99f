//! Surface interval between dives.
//!
//! At the end of a dive the body state is written to the key-value store
//! together with the no-fly and no-dive times. The next dive reads it back
//! and lets the body off-gas for the time spent at the surface. Persistence
//! is best effort: anything that cannot be read is treated as a diver who has
//! not been in the water for more than a day.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::body::{BodyState, BodyStateSnapshot};
use crate::clock::{seconds_between, Clock};
use crate::dive::Dive;
use crate::environment::DiveSiteEnv;
use crate::error::StoreError;
use crate::physio::GradientFactors;
use crate::storage::KeyValueStore;

const STORE_KEY: &str = "surface_interval";

/// Surface interval (min) after which a previous dive no longer counts.
pub const SI_HORIZON_MINUTES: f64 = 1440.0;

const NO_FLY_SINGLE_MINUTES: f64 = 12.0 * 60.0;
const NO_FLY_REPETITIVE_MINUTES: f64 = 18.0 * 60.0;

/// What is persisted at the end of a dive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRecord {
    pub ended_at: DateTime<Utc>,
    pub body: BodyStateSnapshot,
    /// No-fly time counted from `ended_at` (min).
    pub no_fly_minutes: f64,
    /// No-dive time counted from `ended_at` (min).
    pub no_dive_minutes: f64,
    /// Saved while the dive was still running.
    pub still_active: bool,
}

pub struct SurfaceInterval {
    store: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SurfaceInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceInterval")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl SurfaceInterval {
    pub fn new(store: Box<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist the state of `dive`. Dives that never started are ignored.
    pub fn save(&mut self, dive: &Dive) -> Result<(), StoreError> {
        if !dive.was_started() {
            return Ok(());
        }
        let reset_after = dive.reset_after();
        let missed = dive.stops().any_missed();
        let base = if dive.is_repetitive() {
            NO_FLY_REPETITIVE_MINUTES
        } else {
            NO_FLY_SINGLE_MINUTES
        };
        let no_fly_minutes = if missed || !dive.can_ascend() {
            base.max(reset_after)
        } else {
            base
        };
        let no_dive_minutes = if missed || dive.stops().deco_required() {
            reset_after
        } else {
            0.0
        };

        let record = SurfaceRecord {
            ended_at: dive.ended_at().unwrap_or_else(|| self.clock.now()),
            body: dive.body().state(),
            no_fly_minutes,
            no_dive_minutes,
            still_active: dive.is_active(),
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Unavailable(format!("encoding surface record: {e}")))?;
        self.store.set(STORE_KEY, bytes)?;
        info!(
            no_fly_minutes,
            no_dive_minutes,
            still_active = record.still_active,
            "surface interval saved"
        );
        Ok(())
    }

    /// The persisted record, if it can be read.
    pub fn record(&self) -> Option<SurfaceRecord> {
        let bytes = match self.store.get(STORE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "surface interval unavailable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "discarding corrupt surface interval");
                None
            }
        }
    }

    fn elapsed(&self, record: &SurfaceRecord) -> f64 {
        (seconds_between(record.ended_at, self.clock.now()) / 60.0).max(0.0)
    }

    /// Minutes since the previous dive ended; `None` when there is none
    /// within the last 24 hours.
    pub fn si(&self) -> Option<f64> {
        self.record()
            .map(|r| self.elapsed(&r))
            .filter(|&minutes| minutes <= SI_HORIZON_MINUTES)
    }

    /// Drop a record that no longer counts: expired or unreadable.
    pub fn prune(&mut self) -> Result<(), StoreError> {
        if self.store.get(STORE_KEY).ok().flatten().is_some() && self.si().is_none() {
            self.store.remove(STORE_KEY)?;
        }
        Ok(())
    }

    /// Body state at the start of the next dive: the saved body after
    /// off-gassing for the surface interval, or a fresh one.
    pub fn body_state(&self, env: DiveSiteEnv, gf: GradientFactors) -> BodyState {
        let Some(record) = self.record() else {
            return BodyState::new(env, gf);
        };
        let minutes = self.elapsed(&record);
        if minutes > SI_HORIZON_MINUTES {
            return BodyState::new(env, gf);
        }
        match BodyState::from_snapshot(env, gf, &record.body) {
            Ok(mut body) => {
                body.apply_si(minutes);
                body
            }
            Err(e) => {
                warn!(error = %e, "surface interval body state rejected");
                BodyState::new(env, gf)
            }
        }
    }

    /// No-fly time still to wait (min).
    pub fn no_fly(&self) -> f64 {
        self.remaining(|r| r.no_fly_minutes)
    }

    /// No-dive time still to wait (min).
    pub fn no_dive(&self) -> f64 {
        self.remaining(|r| r.no_dive_minutes)
    }

    fn remaining(&self, deadline: impl Fn(&SurfaceRecord) -> f64) -> f64 {
        self.record()
            .map(|r| (deadline(&r) - self.elapsed(&r)).max(0.0))
            .unwrap_or(0.0)
    }
}
