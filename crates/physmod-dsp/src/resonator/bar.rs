//! Bar: bending-dominated beam, no tension. Any boundary at either end.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::line::{Line, LinePhysics};
use super::Boundary;
use crate::error::{ConfigResult, non_negative, positive};

const MODULE: &str = "bar";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarParams {
    pub length: f64,
    pub density: f64,
    pub area: f64,
    pub youngs_modulus: f64,
    pub inertia: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundaries: [Boundary; 2],
}

impl Default for BarParams {
    /// 0.5 m steel rod, 1 cm diameter, free at both ends.
    fn default() -> Self {
        let r: f64 = 0.005;
        Self {
            length: 0.5,
            density: 7850.0,
            area: PI * r * r,
            youngs_modulus: 2e11,
            inertia: PI * r.powi(4) / 4.0,
            sigma0: 0.5,
            sigma1: 0.001,
            boundaries: [Boundary::Free; 2],
        }
    }
}

impl BarParams {
    pub fn physics(&self) -> ConfigResult<LinePhysics> {
        let linear_density = positive("density", self.density)? * positive("area", self.area)?;
        Ok(LinePhysics {
            length: positive("length", self.length)?,
            linear_density,
            tension: 0.0,
            bending_stiffness: positive("youngs_modulus", self.youngs_modulus)?
                * positive("inertia", self.inertia)?,
            sigma0: non_negative("sigma0", self.sigma0)?,
            sigma1: non_negative("sigma1", self.sigma1)?,
            boundaries: self.boundaries,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Bar {
    params: BarParams,
    line: Line,
}

impl Bar {
    pub fn new(params: BarParams, sample_rate: f64) -> ConfigResult<Self> {
        let line = Line::new(MODULE, params.physics()?, sample_rate)?;
        Ok(Self { params, line })
    }

    pub fn params(&self) -> &BarParams {
        &self.params
    }

    pub fn line(&self) -> &Line {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut Line {
        &mut self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonator::{Location, ResonatorModel};

    #[test]
    fn test_free_bar_ends_move() {
        let mut bar = Bar::new(BarParams::default(), 44100.0).unwrap();
        let line = bar.line_mut();
        let n = line.intervals();
        assert!(!line.is_fixed(0) && !line.is_fixed(n));
        assert_eq!(line.index_of(Location::along(0.0)).unwrap(), 0);

        let mid = line.index_of(Location::along(0.5)).unwrap();
        line.impose(mid, 1e-4);
        for _ in 0..400 {
            line.calculate_scheme();
            line.update_states();
        }
        assert!(line.displacement(0).abs() > 0.0, "free end never moved");
    }

    #[test]
    fn test_bar_requires_stiffness() {
        let params = BarParams {
            youngs_modulus: 0.0,
            ..BarParams::default()
        };
        assert!(Bar::new(params, 44100.0).is_err());
    }

    #[test]
    fn test_clamped_free_bar_builds() {
        let params = BarParams {
            boundaries: [Boundary::Clamped, Boundary::Free],
            ..BarParams::default()
        };
        let bar = Bar::new(params, 48000.0).unwrap();
        assert!(bar.line().is_fixed(0));
        assert!(!bar.line().is_fixed(bar.line().intervals()));
    }
}
