//! Excitation models: pluck, hammer, bow.
//!
//! An exciter is bound to one point of one resonator. Each sample it runs in
//! two passes, driven by the instrument:
//!
//! 1. `prepare`: state-changing triggers (impose a pluck profile, launch a
//!    hammer). Runs for every exciter before any force is computed, so every
//!    later `predict` sees the same grid.
//! 2. `excite`: solve the interaction against the resonator's predicted next
//!    value and add the resulting force.

pub mod bow;
pub mod hammer;
pub mod pluck;

pub use bow::{Bow, BowParams};
pub use hammer::{Hammer, HammerParams};
pub use pluck::{Pluck, PluckParams};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::instrument::ModuleId;
use crate::resonator::{Location, ResonatorModel};
use crate::solver::SolverSettings;

/// Exciter type plus its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExciterParams {
    Pluck(PluckParams),
    Hammer(HammerParams),
    Bow(BowParams),
}

/// One exciter as it appears in an instrument description.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExciterConfig {
    /// Index of the target module in the instrument's module list.
    pub target: usize,
    #[serde(default)]
    pub location: Location,
    pub model: ExciterParams,
}

/// A trigger addressed to one exciter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    Pluck,
    /// Launch the hammer upward at this speed, m/s.
    Strike { velocity: f64 },
    BowOn,
    BowOff,
    SetBowVelocity(f64),
    SetBowForce(f64),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pluck => "pluck",
            Self::Strike { .. } => "strike",
            Self::BowOn => "start bowing",
            Self::BowOff => "stop bowing",
            Self::SetBowVelocity(_) => "set bow velocity",
            Self::SetBowForce(_) => "set bow force",
        }
    }

    /// Range-check the payload.
    pub fn validate(&self) -> ConfigResult<()> {
        match *self {
            Self::Strike { velocity } if !(velocity.is_finite() && velocity > 0.0) => {
                Err(ConfigError::invalid(
                    "velocity",
                    format!("strike velocity must be positive, got {velocity}"),
                ))
            }
            Self::SetBowVelocity(v) if !v.is_finite() => Err(ConfigError::invalid(
                "velocity",
                format!("bow velocity must be finite, got {v}"),
            )),
            Self::SetBowForce(f) if !(f.is_finite() && f >= 0.0) => Err(ConfigError::invalid(
                "force",
                format!("bow force must be zero or positive, got {f}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Outcome of one `excite` call, for the guard-rail counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Excitation {
    /// Nothing applied this sample.
    Idle,
    Applied,
    /// The solver missed its budget; the previous force was reused.
    Fallback,
    /// The force came out non-finite and was zeroed.
    NonFinite,
}

#[derive(Clone, Debug)]
pub enum ExciterKind {
    Pluck(Pluck),
    Hammer(Hammer),
    Bow(Bow),
}

#[derive(Clone, Debug)]
pub struct Exciter {
    target: ModuleId,
    location: Location,
    index: usize,
    kind: ExciterKind,
}

impl Exciter {
    /// Bind an exciter to `model`, which must be the resonator behind `target`.
    pub fn new(
        params: &ExciterParams,
        location: Location,
        target: ModuleId,
        model: &dyn ResonatorModel,
    ) -> ConfigResult<Self> {
        let index = model.index_of(location)?;
        let kind = match params {
            ExciterParams::Pluck(p) => ExciterKind::Pluck(Pluck::new(*p, model, index)?),
            ExciterParams::Hammer(p) => ExciterKind::Hammer(Hammer::new(*p)?),
            ExciterParams::Bow(p) => ExciterKind::Bow(Bow::new(*p)?),
        };
        Ok(Self {
            target,
            location,
            index,
            kind,
        })
    }

    pub fn target(&self) -> ModuleId {
        self.target
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Grid index the exciter acts on.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &ExciterKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ExciterKind::Pluck(_) => "pluck",
            ExciterKind::Hammer(_) => "hammer",
            ExciterKind::Bow(_) => "bow",
        }
    }

    pub fn params(&self) -> ExciterParams {
        match &self.kind {
            ExciterKind::Pluck(p) => ExciterParams::Pluck(*p.params()),
            ExciterKind::Hammer(h) => ExciterParams::Hammer(*h.params()),
            ExciterKind::Bow(b) => ExciterParams::Bow(b.current_params()),
        }
    }

    pub fn accepts(&self, action: &Action) -> bool {
        matches!(
            (&self.kind, action),
            (ExciterKind::Pluck(_), Action::Pluck)
                | (ExciterKind::Hammer(_), Action::Strike { .. })
                | (
                    ExciterKind::Bow(_),
                    Action::BowOn
                        | Action::BowOff
                        | Action::SetBowVelocity(_)
                        | Action::SetBowForce(_)
                )
        )
    }

    /// Apply a trigger. Returns false if the action does not fit this kind.
    pub fn trigger(&mut self, action: Action) -> bool {
        match (&mut self.kind, action) {
            (ExciterKind::Pluck(p), Action::Pluck) => p.trigger(),
            (ExciterKind::Hammer(h), Action::Strike { velocity }) => h.strike(velocity),
            (ExciterKind::Bow(b), Action::BowOn) => b.start(),
            (ExciterKind::Bow(b), Action::BowOff) => b.stop(),
            (ExciterKind::Bow(b), Action::SetBowVelocity(v)) => b.set_velocity(v),
            (ExciterKind::Bow(b), Action::SetBowForce(f)) => b.set_force(f),
            _ => return false,
        }
        true
    }

    /// First pass: state-changing triggers.
    pub fn prepare(&mut self, model: &mut dyn ResonatorModel, k: f64) {
        match &mut self.kind {
            ExciterKind::Pluck(p) => p.prepare(model),
            ExciterKind::Hammer(h) => h.prepare(model, self.index, k),
            ExciterKind::Bow(_) => {}
        }
    }

    /// Second pass: solve and apply the interaction force.
    pub fn excite(
        &mut self,
        model: &mut dyn ResonatorModel,
        k: f64,
        settings: &SolverSettings,
    ) -> Excitation {
        match &mut self.kind {
            ExciterKind::Pluck(_) => Excitation::Idle,
            ExciterKind::Hammer(h) => h.excite(model, self.index, k, settings),
            ExciterKind::Bow(b) => b.excite(model, self.index, k, settings),
        }
    }

    /// Drop any motion state, e.g. after the target was reset.
    pub fn reset(&mut self) {
        match &mut self.kind {
            ExciterKind::Pluck(p) => p.reset(),
            ExciterKind::Hammer(h) => h.reset(),
            ExciterKind::Bow(b) => b.reset(),
        }
    }
}
