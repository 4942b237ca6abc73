//! physmod DSP library: finite-difference physical modeling.
//!
//! Pure simulation math with no audio framework dependencies. An
//! [`Instrument`] owns resonators (strings, bars, membranes, plates), the
//! exciters that drive them and the connections between them, and advances
//! all of them one sample at a time.

// Numerics shared by every model
pub mod error;
pub mod solver;
pub mod state;

// Vibrating objects and what drives or couples them
pub mod connection;
pub mod exciter;
pub mod io;
pub mod resonator;

// Orchestration and output
pub mod config;
pub mod diagnostics;
pub mod filters;
pub mod instrument;
pub mod presets;

pub use config::{InstrumentConfig, ModuleConfig, OutputConfig};
pub use connection::{ConnectionConfig, Coupling, Endpoint, PointPair};
pub use diagnostics::GuardStats;
pub use error::{ConfigError, ConfigResult};
pub use exciter::{Action, ExciterConfig, ExciterParams};
pub use instrument::{
    ConnectionId, Edit, Event, ExciterId, Frame, Instrument, ModuleId, Phase, SlotId, StateView,
};
pub use io::{Channel, IoPoint};
pub use resonator::{Boundary, Location, OutputKind, ResonatorConfig};
pub use solver::SolverSettings;
