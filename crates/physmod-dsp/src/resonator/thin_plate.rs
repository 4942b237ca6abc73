//! Kirchhoff thin plate: bending stiffness only.

use serde::{Deserialize, Serialize};

use super::Boundary;
use super::surface::{Surface, SurfacePhysics};
use crate::error::{ConfigError, ConfigResult, non_negative, positive};

const MODULE: &str = "thin plate";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateParams {
    pub width: f64,
    pub height: f64,
    pub density: f64,
    pub thickness: f64,
    pub youngs_modulus: f64,
    /// ν, in [0, 0.5)
    pub poisson: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundary: Boundary,
    pub max_points: usize,
}

impl Default for PlateParams {
    /// 50 x 40 cm steel sheet, 2 mm thick.
    fn default() -> Self {
        Self {
            width: 0.5,
            height: 0.4,
            density: 7850.0,
            thickness: 0.002,
            youngs_modulus: 2e11,
            poisson: 0.3,
            sigma0: 1.0,
            sigma1: 0.005,
            boundary: Boundary::SimplySupported,
            max_points: 1600,
        }
    }
}

/// D = EH³ / (12(1 − ν²))
pub(crate) fn flexural_rigidity(
    youngs_modulus: f64,
    thickness: f64,
    poisson: f64,
) -> ConfigResult<f64> {
    if !(poisson.is_finite() && (0.0..0.5).contains(&poisson)) {
        return Err(ConfigError::invalid(
            "poisson",
            format!("must lie in [0, 0.5), got {poisson}"),
        ));
    }
    Ok(youngs_modulus * thickness.powi(3) / (12.0 * (1.0 - poisson * poisson)))
}

impl PlateParams {
    pub fn physics(&self) -> ConfigResult<SurfacePhysics> {
        let thickness = positive("thickness", self.thickness)?;
        Ok(SurfacePhysics {
            width: positive("width", self.width)?,
            height: positive("height", self.height)?,
            areal_density: positive("density", self.density)? * thickness,
            tension: 0.0,
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
pub struct ThinPlate {
    params: PlateParams,
    surface: Surface,
}

impl ThinPlate {
    pub fn new(params: PlateParams, sample_rate: f64) -> ConfigResult<Self> {
        let surface = Surface::new(MODULE, params.physics()?, sample_rate)?;
        Ok(Self { params, surface })
    }

    pub fn params(&self) -> &PlateParams {
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
    use crate::resonator::ResonatorModel;

    #[test]
    fn test_rigidity_of_steel_sheet() {
        let d = flexural_rigidity(2e11, 0.002, 0.3).unwrap();
        assert!((d - 146.52).abs() < 0.01, "D = {d}");
    }

    #[test]
    fn test_poisson_range() {
        assert!(flexural_rigidity(2e11, 0.002, 0.5).is_err());
        assert!(flexural_rigidity(2e11, 0.002, -0.1).is_err());
    }

    #[test]
    fn test_default_plate_grid() {
        let p = ThinPlate::new(PlateParams::default(), 44100.0).unwrap();
        let (nx, ny) = p.surface().intervals();
        assert!(nx > ny, "wider plate should have more columns: {nx} x {ny}");
        assert!(p.surface().point_count() <= 1600);
    }
}
