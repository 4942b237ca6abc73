//! Stiff membrane: tension and bending together.

use serde::{Deserialize, Serialize};

use super::Boundary;
use super::surface::{Surface, SurfacePhysics};
use super::thin_plate::flexural_rigidity;
use crate::error::{ConfigResult, non_negative, positive};

const MODULE: &str = "stiff membrane";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StiffMembraneParams {
    pub width: f64,
    pub height: f64,
    /// N/m
    pub tension: f64,
    pub density: f64,
    pub thickness: f64,
    pub youngs_modulus: f64,
    pub poisson: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundary: Boundary,
    pub max_points: usize,
}

impl Default for StiffMembraneParams {
    /// Thick polyester head: audible stiffening of the upper modes.
    fn default() -> Self {
        Self {
            width: 0.3,
            height: 0.3,
            tension: 1000.0,
            density: 1200.0,
            thickness: 0.0005,
            youngs_modulus: 3.5e9,
            poisson: 0.35,
            sigma0: 1.5,
            sigma1: 0.0005,
            boundary: Boundary::Clamped,
            max_points: 1600,
        }
    }
}

impl StiffMembraneParams {
    pub fn physics(&self) -> ConfigResult<SurfacePhysics> {
        let thickness = positive("thickness", self.thickness)?;
        Ok(SurfacePhysics {
            width: positive("width", self.width)?,
            height: positive("height", self.height)?,
            areal_density: positive("density", self.density)? * thickness,
            tension: positive("tension", self.tension)?,
            rigidity: flexural_rigidity(
                positive("youngs_modulus", self.youngs_modulus)?,
                thickness,
                self.poisson,
            )?,
            sigma0: non_negative("sigma0", self.sigma0)?,
            sigma1: non_negative("sigma1", self.sigma1)?,
            boundary: self.boundary,
            max_points: self.max_points,
        })
    }
}

#[derive(Clone, Debug)]
pub struct StiffMembrane {
    params: StiffMembraneParams,
    surface: Surface,
}

impl StiffMembrane {
    pub fn new(params: StiffMembraneParams, sample_rate: f64) -> ConfigResult<Self> {
        let surface = Surface::new(MODULE, params.physics()?, sample_rate)?;
        Ok(Self { params, surface })
    }

    pub fn params(&self) -> &StiffMembraneParams {
        &self.params
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonator::membrane::MembraneParams;
    use crate::resonator::ResonatorModel;

    #[test]
    fn test_bending_needs_coarser_grid_than_tension_alone() {
        let p = StiffMembraneParams::default();
        let with_bending = p.physics().unwrap().min_spacing(1.0 / 44100.0);
        let tension_only = MembraneParams {
            tension: p.tension,
            density: p.density,
            thickness: p.thickness,
            sigma1: p.sigma1,
            ..MembraneParams::default()
        }
        .physics()
        .unwrap()
        .min_spacing(1.0 / 44100.0);
        assert!(with_bending > tension_only, "{with_bending} <= {tension_only}");
    }

    #[test]
    fn test_default_builds_within_budget() {
        let m = StiffMembrane::new(StiffMembraneParams::default(), 44100.0).unwrap();
        assert!(m.surface().point_count() <= 1600);
        assert!(m.surface().courant() <= 1.0 + 1e-12);
    }
}
