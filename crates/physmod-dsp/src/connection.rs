//! Couplings between two resonators, or between a resonator and a fixed
//! anchor.
//!
//! Each point pair is solved on its own. With η = u₁ − u₂ and a force F that
//! pushes endpoint one by −F and endpoint two by +F:
//!
//!   η⁺ = η_free − (J₁ + J₂)·F
//!
//! where η_free comes from both resonators' `predict`. Rigid pairs solve
//! η⁺ = 0 exactly; springs solve their force law against the same relation.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, non_negative, positive};
use crate::instrument::ModuleId;
use crate::resonator::{Location, ResonatorModel};
use crate::solver::{PowerLaw, SolverSettings, newton};

/// Allowed deviation of the pair weights from a unit sum.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

fn default_exponent() -> f64 {
    3.0
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Coupling {
    /// Both points share one displacement.
    Rigid,
    LinearSpring {
        /// N/m
        stiffness: f64,
        /// N·s/m
        #[serde(default)]
        damping: f64,
    },
    /// K₁η + K₃|η|^p·sgn(η), plus damping.
    NonlinearSpring {
        #[serde(default)]
        linear: f64,
        stiffness: f64,
        #[serde(default = "default_exponent")]
        exponent: f64,
        #[serde(default)]
        damping: f64,
    },
}

impl Coupling {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rigid => "rigid",
            Self::LinearSpring { .. } => "linear spring",
            Self::NonlinearSpring { .. } => "nonlinear spring",
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        match *self {
            Self::Rigid => Ok(()),
            Self::LinearSpring { stiffness, damping } => {
                non_negative("stiffness", stiffness)?;
                non_negative("damping", damping)?;
                Ok(())
            }
            Self::NonlinearSpring {
                linear,
                stiffness,
                exponent,
                damping,
            } => {
                non_negative("linear", linear)?;
                positive("stiffness", stiffness)?;
                non_negative("damping", damping)?;
                if !(exponent.is_finite() && exponent >= 1.0) {
                    return Err(ConfigError::invalid(
                        "exponent",
                        format!("must be at least 1, got {exponent}"),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// One side of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Index of the module in the instrument's module list.
    pub module: usize,
    #[serde(default)]
    pub location: Location,
}

/// One weighted point pair of a distributed connection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointPair {
    pub first: Location,
    #[serde(default)]
    pub second: Location,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub first: Endpoint,
    /// `None` anchors the first endpoint to zero displacement.
    #[serde(default)]
    pub second: Option<Endpoint>,
    pub coupling: Coupling,
    /// Distributed connection. Absent means one pair at the endpoint
    /// locations with weight 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<PointPair>>,
}

/// Read and force access to resonators by id.
pub trait ModelStore {
    fn model(&self, id: ModuleId) -> Option<&dyn ResonatorModel>;
    fn model_mut(&mut self, id: ModuleId) -> Option<&mut dyn ResonatorModel>;
}

/// Guard-rail tallies from one `apply`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CouplingReport {
    pub fallbacks: u32,
    pub non_finite: u32,
}

/// Predicted value, previous value and force gain at one grid point.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PointState {
    free: f64,
    previous: f64,
    gain: f64,
}

impl PointState {
    /// A fixed anchor: never moves, never yields.
    const ANCHOR: Self = Self {
        free: 0.0,
        previous: 0.0,
        gain: 0.0,
    };

    fn read(model: &dyn ResonatorModel, index: usize) -> Self {
        Self {
            free: model.predict(index),
            previous: model.previous(index),
            gain: model.force_gain(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Pair {
    first: usize,
    /// `None` for an anchor.
    second: Option<usize>,
    weight: f64,
    /// Force of the last step; fallback when a solve fails.
    force: f64,
    /// Last solved η⁺ − η⁻; warm start for the nonlinear spring.
    guess: f64,
}

#[derive(Clone, Debug)]
pub struct Connection {
    config: ConnectionConfig,
    first: ModuleId,
    second: Option<ModuleId>,
    pairs: Vec<Pair>,
}

impl Connection {
    /// Resolve grid points and check weights. `first_model` and
    /// `second_model` must be the resonators behind the two endpoints.
    pub fn new(
        config: &ConnectionConfig,
        first: (ModuleId, &dyn ResonatorModel),
        second: Option<(ModuleId, &dyn ResonatorModel)>,
    ) -> ConfigResult<Self> {
        config.coupling.validate()?;

        let single;
        let points: &[PointPair] = match &config.points {
            Some(points) if points.is_empty() => return Err(ConfigError::EmptyPointList),
            Some(points) => points,
            None => {
                single = [PointPair {
                    first: config.first.location,
                    second: config.second.map(|e| e.location).unwrap_or_default(),
                    weight: 1.0,
                }];
                &single
            }
        };

        let mut sum = 0.0;
        for p in points {
            positive("weight", p.weight)?;
            sum += p.weight;
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        let (first_id, first_model) = first;
        let mut pairs = Vec::with_capacity(points.len());
        for p in points {
            let i1 = first_model.index_of(p.first)?;
            let i2 = match second {
                Some((second_id, second_model)) => {
                    let i2 = second_model.index_of(p.second)?;
                    if second_id == first_id && i2 == i1 {
                        return Err(ConfigError::DegenerateConnection { index: i1 });
                    }
                    Some(i2)
                }
                None => None,
            };
            pairs.push(Pair {
                first: i1,
                second: i2,
                weight: p.weight,
                force: 0.0,
                guess: 0.0,
            });
        }

        Ok(Self {
            config: config.clone(),
            first: first_id,
            second: second.map(|(id, _)| id),
            pairs,
        })
    }

    pub fn first(&self) -> ModuleId {
        self.first
    }

    pub fn second(&self) -> Option<ModuleId> {
        self.second
    }

    pub fn touches(&self, module: ModuleId) -> bool {
        self.first == module || self.second == Some(module)
    }

    pub fn coupling(&self) -> &Coupling {
        &self.config.coupling
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Description with module references rewritten by `slot`.
    pub fn to_config(&self, slot: impl Fn(ModuleId) -> usize) -> ConnectionConfig {
        let mut config = self.config.clone();
        config.first.module = slot(self.first);
        if let (Some(endpoint), Some(id)) = (config.second.as_mut(), self.second) {
            endpoint.module = slot(id);
        }
        config
    }

    /// Solve every pair and add its forces. A missing endpoint module skips
    /// the connection.
    pub fn apply<S: ModelStore + ?Sized>(
        &mut self,
        store: &mut S,
        k: f64,
        settings: &SolverSettings,
    ) -> CouplingReport {
        let mut report = CouplingReport::default();
        let coupling = self.config.coupling;
        for pair in &mut self.pairs {
            let Some(a) = store.model(self.first) else {
                return report;
            };
            let s1 = PointState::read(a, pair.first);
            let s2 = match (self.second, pair.second) {
                (Some(id), Some(i2)) => match store.model(id) {
                    Some(b) => PointState::read(b, i2),
                    None => return report,
                },
                _ => PointState::ANCHOR,
            };

            let mut force = match solve(&coupling, pair, s1, s2, k, settings) {
                Some(f) => f,
                None => {
                    report.fallbacks += 1;
                    pair.force
                }
            };
            if !force.is_finite() {
                report.non_finite += 1;
                force = 0.0;
            }
            pair.force = force;

            if let Some(a) = store.model_mut(self.first) {
                a.add_force(pair.first, -force);
            }
            if let (Some(id), Some(i2)) = (self.second, pair.second) {
                if let Some(b) = store.model_mut(id) {
                    b.add_force(i2, force);
                }
            }
        }
        report
    }

    /// Energy stored in the springs at the current time level. Rigid
    /// connections store none.
    pub fn energy<S: ModelStore + ?Sized>(&self, store: &S) -> f64 {
        let Some(a) = store.model(self.first) else {
            return 0.0;
        };
        let mut total = 0.0;
        for pair in &self.pairs {
            let (mut eta, mut eta_prev) = (a.displacement(pair.first), a.previous(pair.first));
            if let (Some(id), Some(i2)) = (self.second, pair.second) {
                let Some(b) = store.model(id) else {
                    return 0.0;
                };
                eta -= b.displacement(i2);
                eta_prev -= b.previous(i2);
            }
            if let Some(law) = spring_law(&self.config.coupling, pair.weight) {
                total += 0.5 * (law.energy(eta) + law.energy(eta_prev));
            }
        }
        total
    }
}

/// Potential of a spring coupling, scaled by the pair weight.
fn spring_law(coupling: &Coupling, weight: f64) -> Option<PowerLaw> {
    match *coupling {
        Coupling::Rigid => None,
        Coupling::LinearSpring { stiffness, .. } => {
            Some(PowerLaw::spring(stiffness * weight, 0.0, 1.0))
        }
        Coupling::NonlinearSpring {
            linear,
            stiffness,
            exponent,
            ..
        } => Some(PowerLaw::spring(linear * weight, stiffness * weight, exponent)),
    }
}

/// Force on the pair, or `None` if the nonlinear solve failed.
fn solve(
    coupling: &Coupling,
    pair: &mut Pair,
    s1: PointState,
    s2: PointState,
    k: f64,
    settings: &SolverSettings,
) -> Option<f64> {
    let eta_free = s1.free - s2.free;
    let eta_prev = s1.previous - s2.previous;
    let gain = s1.gain + s2.gain;
    let w = pair.weight;

    match *coupling {
        Coupling::Rigid => Some(eta_free / gain),
        Coupling::LinearSpring { stiffness, damping } => {
            let half_k = 0.5 * stiffness * w;
            let r = damping * w / (2.0 * k);
            Some(
                (half_k * (eta_free + eta_prev) + r * (eta_free - eta_prev))
                    / (1.0 + gain * (half_k + r)),
            )
        }
        Coupling::NonlinearSpring {
            linear,
            stiffness,
            exponent,
            damping,
        } => {
            let law = PowerLaw::spring(linear * w, stiffness * w, exponent);
            let r_damp = damping * w / (2.0 * k);
            let b = eta_free - eta_prev;
            let sol = newton(pair.guess, settings, |r| {
                let (q, dq) = law.quotient(eta_prev, r);
                (r + gain * (q + r_damp * r) - b, 1.0 + gain * (dq + r_damp))
            });
            if !sol.converged {
                return None;
            }
            pair.guess = sol.value;
            let (q, _) = law.quotient(eta_prev, sol.value);
            Some(q + r_damp * sol.value)
        }
    }
}
