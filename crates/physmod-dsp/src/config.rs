//! Instrument description: the loader/saver contract.
//!
//! `Instrument::from_config` builds from an [`InstrumentConfig`] and
//! `Instrument::to_config` produces one back. Module, exciter and connection
//! references are indices into the lists here. The text encoding is up to the
//! host; the renderer uses JSON.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;
use crate::exciter::ExciterConfig;
use crate::io::IoPoint;
use crate::resonator::ResonatorConfig;
use crate::solver::SolverSettings;

fn default_sample_rate() -> f64 {
    44100.0
}

/// One resonator plus its output taps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub name: String,
    pub resonator: ResonatorConfig,
    #[serde(default)]
    pub outputs: Vec<IoPoint>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, resonator: ResonatorConfig) -> Self {
        Self {
            name: name.into(),
            resonator,
            outputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, point: IoPoint) -> Self {
        self.outputs.push(point);
        self
    }
}

/// Output stage settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Linear gain applied to the summed taps.
    pub gain: f64,
    /// High-pass each channel at a few Hz.
    pub dc_block: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            dc_block: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub exciters: Vec<ExciterConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl InstrumentConfig {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            modules: Vec::new(),
            exciters: Vec::new(),
            connections: Vec::new(),
            output: OutputConfig::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::new(default_sample_rate())
    }
}
