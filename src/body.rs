//! The diver's body: decompression, CNS and OTU advanced together.

use serde::{Deserialize, Serialize};

use crate::environment::DiveSiteEnv;
use crate::error::StateError;
use crate::gas::GasMix;
use crate::physio::{Cns, DecoModel, EffectState, GradientFactors, Otu, PhysioEffect};

/// The effect that will become binding first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestEffect {
    /// Minutes left; `f64::INFINITY` when nothing binds.
    pub time: f64,
    pub name: &'static str,
}

/// Serializable snapshot of a [`BodyState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyStateSnapshot {
    pub deco: EffectState,
    pub cns: EffectState,
    pub otu: EffectState,
}

#[derive(Debug, Clone)]
pub struct BodyState {
    deco: DecoModel,
    cns: Cns,
    otu: Otu,
}

impl BodyState {
    pub fn new(env: DiveSiteEnv, gf: GradientFactors) -> Self {
        Self {
            deco: DecoModel::new(env, gf),
            cns: Cns::new(&env),
            otu: Otu::new(&env),
        }
    }

    /// Rebuild a body from a snapshot taken at a site with the same env.
    pub fn from_snapshot(
        env: DiveSiteEnv,
        gf: GradientFactors,
        snapshot: &BodyStateSnapshot,
    ) -> Result<Self, StateError> {
        let mut body = Self::new(env, gf);
        body.restore(snapshot)?;
        Ok(body)
    }

    pub fn deco(&self) -> &DecoModel {
        &self.deco
    }

    pub fn cns(&self) -> &Cns {
        &self.cns
    }

    pub fn otu(&self) -> &Otu {
        &self.otu
    }

    pub fn env(&self) -> &DiveSiteEnv {
        self.deco.env()
    }

    pub fn add_change(&mut self, p_abs: f64, dt_seconds: f64, mix: &GasMix) {
        self.deco.add_change(p_abs, dt_seconds, mix);
        self.cns.add_change(p_abs, dt_seconds, mix);
        self.otu.add_change(p_abs, dt_seconds, mix);
    }

    pub fn add_time(&mut self, dt_seconds: f64, mix: &GasMix) {
        self.deco.add_time(dt_seconds, mix);
        self.cns.add_time(dt_seconds, mix);
        self.otu.add_time(dt_seconds, mix);
    }

    pub fn apply_si(&mut self, minutes: f64) {
        self.deco.apply_si(minutes);
        self.cns.apply_si(minutes);
        self.otu.apply_si(minutes);
    }

    pub fn nearest_effect(&self) -> NearestEffect {
        [
            (self.deco.time_left(), self.deco.name()),
            (self.cns.time_left(), self.cns.name()),
            (self.otu.time_left(), self.otu.name()),
        ]
        .into_iter()
        .fold(
            NearestEffect {
                time: f64::INFINITY,
                name: self.deco.name(),
            },
            |nearest, (time, name)| {
                if time < nearest.time {
                    NearestEffect { time, name }
                } else {
                    nearest
                }
            },
        )
    }

    /// Minutes at the surface until every effect has cleared.
    pub fn reset_after(&self) -> f64 {
        self.deco
            .reset_after()
            .max(self.cns.reset_after())
            .max(self.otu.reset_after())
    }

    pub fn state(&self) -> BodyStateSnapshot {
        BodyStateSnapshot {
            deco: self.deco.state(),
            cns: self.cns.state(),
            otu: self.otu.state(),
        }
    }

    /// Restore all three effects; on error the body is left untouched.
    pub fn restore(&mut self, snapshot: &BodyStateSnapshot) -> Result<(), StateError> {
        let mut deco = self.deco.clone();
        let mut cns = self.cns.clone();
        let mut otu = self.otu.clone();
        deco.restore(&snapshot.deco)?;
        cns.restore(&snapshot.cns)?;
        otu.restore(&snapshot.otu)?;
        self.deco = deco;
        self.cns = cns;
        self.otu = otu;
        Ok(())
    }
}
