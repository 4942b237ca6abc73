//! Resonating objects: strings, bars, membranes and plates.
//!
//! Every variant owns a grid of displacement samples and advances it with an
//! explicit finite-difference scheme. The 1-D variants share the [`Line`]
//! kernel, the 2-D variants share [`Surface`]; a variant only turns its
//! physical parameters into the kernel's coefficients.
//!
//! Interaction models never see the scheme itself. They ask for the value a
//! point will take at the next step (`predict`), how far one newton moves it
//! (`force_gain`), and then add their force. That is enough to solve any
//! implicit point interaction exactly against the explicit grid update.

pub mod bar;
pub mod line;
pub mod membrane;
pub mod stiff_membrane;
pub mod stiff_string;
pub mod surface;
pub mod thin_plate;

pub use bar::{Bar, BarParams};
pub use line::Line;
pub use membrane::{Membrane, MembraneParams};
pub use stiff_membrane::{StiffMembrane, StiffMembraneParams};
pub use stiff_string::{StiffString, StringParams};
pub use surface::Surface;
pub use thin_plate::{PlateParams, ThinPlate};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Any displacement at or beyond this magnitude counts as divergence.
pub const DIVERGENCE_LIMIT: f64 = 1e6;

/// Boundary condition at one end (1-D) or on all edges (2-D).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Zero displacement and zero slope.
    Clamped,
    /// Zero displacement and zero curvature.
    #[default]
    SimplySupported,
    /// Zero moment and zero shear. Bars only.
    Free,
}

impl Boundary {
    pub fn name(self) -> &'static str {
        match self {
            Self::Clamped => "clamped",
            Self::SimplySupported => "simply supported",
            Self::Free => "free",
        }
    }

    /// Whether the boundary point itself is held at zero.
    pub fn is_fixed(self) -> bool {
        !matches!(self, Self::Free)
    }
}

/// Normalized position on a module, `[0, 1]` along each axis.
///
/// `y` is ignored by 1-D modules.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A point along a 1-D module.
    pub fn along(x: f64) -> Self {
        Self { x, y: 0.5 }
    }

    pub(crate) fn check_x(self) -> ConfigResult<f64> {
        if self.x.is_finite() && (0.0..=1.0).contains(&self.x) {
            Ok(self.x)
        } else {
            Err(ConfigError::LocationOutOfRange {
                x: self.x,
                y: self.y,
            })
        }
    }

    pub(crate) fn check_xy(self) -> ConfigResult<(f64, f64)> {
        let x = self.check_x()?;
        if self.y.is_finite() && (0.0..=1.0).contains(&self.y) {
            Ok((x, self.y))
        } else {
            Err(ConfigError::LocationOutOfRange {
                x: self.x,
                y: self.y,
            })
        }
    }
}

/// What an output tap reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Displacement,
    /// (uⁿ − uⁿ⁻¹) / k
    Velocity,
}

/// Grid shape, row-major: `index = row * columns + column`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDims {
    pub columns: usize,
    pub rows: usize,
}

/// The per-sample contract every resonator kernel implements.
///
/// Within one sample the orchestrator calls, in order: any number of
/// `predict`/`add_force` pairs (exciters, then connections), one
/// `calculate_scheme`, one `update_states`.
pub trait ResonatorModel {
    fn point_count(&self) -> usize;

    fn dims(&self) -> GridDims;

    /// Realised grid spacing in metres.
    fn spacing(&self) -> f64;

    /// Stability number of the realised grid; at most 1.
    fn courant(&self) -> f64;

    /// Nearest updated grid point. Points on a fixed boundary are pulled one
    /// step inward.
    fn index_of(&self, location: Location) -> ConfigResult<usize>;

    fn location_of(&self, index: usize) -> Location;

    /// Boundary point held at zero by a clamped or simply supported edge.
    fn is_fixed(&self, index: usize) -> bool;

    /// Accumulate a force (newtons) acting at `index` during this step.
    fn add_force(&mut self, index: usize, force: f64);

    /// Next-level displacement produced at a point by one newton of force.
    fn force_gain(&self) -> f64;

    /// Next-level value at `index` given the current state and every force
    /// added so far. Matches `calculate_scheme` exactly.
    fn predict(&self, index: usize) -> f64;

    /// Fill the next level. Returns false if any new value is non-finite or
    /// beyond [`DIVERGENCE_LIMIT`].
    fn calculate_scheme(&mut self) -> bool;

    /// Advance the time levels and clear accumulated forces.
    fn update_states(&mut self);

    fn displacement(&self, index: usize) -> f64;

    fn previous(&self, index: usize) -> f64;

    fn output(&self, index: usize, kind: OutputKind) -> f64;

    /// Current level, read-only.
    fn state(&self) -> &[f64];

    /// Set one point at both the current and previous level.
    fn impose(&mut self, index: usize, value: f64);

    /// Zero every level and any pending force.
    fn clear(&mut self);

    /// Discrete energy of the lossless scheme, conserved when σ0 = σ1 = 0.
    fn energy(&self) -> f64;
}

/// Resonator type plus its physical parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResonatorConfig {
    StiffString(StringParams),
    Bar(BarParams),
    Membrane(MembraneParams),
    ThinPlate(PlateParams),
    StiffMembrane(StiffMembraneParams),
}

/// One built resonator of any variant.
#[derive(Clone, Debug)]
pub enum Resonator {
    StiffString(StiffString),
    Bar(Bar),
    Membrane(Membrane),
    ThinPlate(ThinPlate),
    StiffMembrane(StiffMembrane),
}

impl Resonator {
    pub fn from_config(config: &ResonatorConfig, sample_rate: f64) -> ConfigResult<Self> {
        Ok(match config {
            ResonatorConfig::StiffString(p) => {
                Self::StiffString(StiffString::new(*p, sample_rate)?)
            }
            ResonatorConfig::Bar(p) => Self::Bar(Bar::new(*p, sample_rate)?),
            ResonatorConfig::Membrane(p) => Self::Membrane(Membrane::new(*p, sample_rate)?),
            ResonatorConfig::ThinPlate(p) => Self::ThinPlate(ThinPlate::new(*p, sample_rate)?),
            ResonatorConfig::StiffMembrane(p) => {
                Self::StiffMembrane(StiffMembrane::new(*p, sample_rate)?)
            }
        })
    }

    pub fn to_config(&self) -> ResonatorConfig {
        match self {
            Self::StiffString(r) => ResonatorConfig::StiffString(*r.params()),
            Self::Bar(r) => ResonatorConfig::Bar(*r.params()),
            Self::Membrane(r) => ResonatorConfig::Membrane(*r.params()),
            Self::ThinPlate(r) => ResonatorConfig::ThinPlate(*r.params()),
            Self::StiffMembrane(r) => ResonatorConfig::StiffMembrane(*r.params()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::StiffString(_) => "stiff string",
            Self::Bar(_) => "bar",
            Self::Membrane(_) => "membrane",
            Self::ThinPlate(_) => "thin plate",
            Self::StiffMembrane(_) => "stiff membrane",
        }
    }

    pub fn model(&self) -> &dyn ResonatorModel {
        match self {
            Self::StiffString(r) => r.line(),
            Self::Bar(r) => r.line(),
            Self::Membrane(r) => r.surface(),
            Self::ThinPlate(r) => r.surface(),
            Self::StiffMembrane(r) => r.surface(),
        }
    }

    pub fn model_mut(&mut self) -> &mut dyn ResonatorModel {
        match self {
            Self::StiffString(r) => r.line_mut(),
            Self::Bar(r) => r.line_mut(),
            Self::Membrane(r) => r.surface_mut(),
            Self::ThinPlate(r) => r.surface_mut(),
            Self::StiffMembrane(r) => r.surface_mut(),
        }
    }
}
