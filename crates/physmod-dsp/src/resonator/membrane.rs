//! Membrane: 2-D wave equation under uniform tension.
//!
//! The stability bound on a fast, light membrane asks for far more grid
//! points than a real-time budget allows, so the grid is capped at
//! `max_points` and the spacing widened to fit.

use serde::{Deserialize, Serialize};

use super::Boundary;
use super::surface::{Surface, SurfacePhysics};
use crate::error::{ConfigResult, non_negative, positive};

const MODULE: &str = "membrane";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembraneParams {
    /// Extent along x, m
    pub width: f64,
    /// Extent along y, m
    pub height: f64,
    /// Tension per unit length, N/m
    pub tension: f64,
    /// kg/m³
    pub density: f64,
    /// m
    pub thickness: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundary: Boundary,
    pub max_points: usize,
}

impl Default for MembraneParams {
    /// 30 cm square mylar drum head.
    fn default() -> Self {
        Self {
            width: 0.3,
            height: 0.3,
            tension: 400.0,
            density: 1400.0,
            thickness: 0.00019,
            sigma0: 2.0,
            sigma1: 0.0005,
            boundary: Boundary::Clamped,
            max_points: 1600,
        }
    }
}

impl MembraneParams {
    pub fn physics(&self) -> ConfigResult<SurfacePhysics> {
        Ok(SurfacePhysics {
            width: positive("width", self.width)?,
            height: positive("height", self.height)?,
            areal_density: positive("density", self.density)?
                * positive("thickness", self.thickness)?,
            tension: positive("tension", self.tension)?,
            rigidity: 0.0,
            sigma0: non_negative("sigma0", self.sigma0)?,
            sigma1: non_negative("sigma1", self.sigma1)?,
            boundary: self.boundary,
            max_points: self.max_points,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Membrane {
    params: MembraneParams,
    surface: Surface,
}

impl Membrane {
    pub fn new(params: MembraneParams, sample_rate: f64) -> ConfigResult<Self> {
        let surface = Surface::new(MODULE, params.physics()?, sample_rate)?;
        Ok(Self { params, surface })
    }

    pub fn params(&self) -> &MembraneParams {
        &self.params
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}
