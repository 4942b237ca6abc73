//! Pluck: a raised-cosine displacement imposed at trigger time.
//!
//! The profile is written into both the current and the previous level, so
//! the string starts from rest in that shape and no force is applied
//! afterwards. Triggering again simply rewrites the same shape.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::resonator::ResonatorModel;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluckParams {
    /// Peak displacement, m
    pub amplitude: f64,
    /// Full width of the raised cosine, normalized to the module size.
    pub width: f64,
}

impl Default for PluckParams {
    fn default() -> Self {
        Self {
            amplitude: 1e-3,
            width: 0.1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Pluck {
    params: PluckParams,
    /// (grid index, displacement) for every point under the profile.
    profile: Vec<(usize, f64)>,
    armed: bool,
}

impl Pluck {
    pub fn new(
        params: PluckParams,
        model: &dyn ResonatorModel,
        center: usize,
    ) -> ConfigResult<Self> {
        if !params.amplitude.is_finite() {
            return Err(ConfigError::invalid("amplitude", "must be finite"));
        }
        if !(params.width.is_finite() && params.width > 0.0 && params.width <= 1.0) {
            return Err(ConfigError::invalid(
                "width",
                format!("must lie in (0, 1], got {}", params.width),
            ));
        }

        let c = model.location_of(center);
        let planar = model.dims().rows > 1;
        let half = 0.5 * params.width;
        let mut profile = Vec::new();
        for i in 0..model.point_count() {
            if model.is_fixed(i) {
                continue;
            }
            let p = model.location_of(i);
            let d = if planar {
                ((p.x - c.x).powi(2) + (p.y - c.y).powi(2)).sqrt()
            } else {
                (p.x - c.x).abs()
            };
            if d < half {
                let v = 0.5 * params.amplitude * (1.0 + (PI * d / half).cos());
                profile.push((i, v));
            }
        }

        Ok(Self {
            params,
            profile,
            armed: false,
        })
    }

    pub fn params(&self) -> &PluckParams {
        &self.params
    }

    /// Points touched by the profile.
    pub fn span(&self) -> usize {
        self.profile.len()
    }

    pub fn trigger(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn prepare(&mut self, model: &mut dyn ResonatorModel) {
        if !self.armed {
            return;
        }
        for &(i, v) in &self.profile {
            model.impose(i, v);
        }
        self.armed = false;
    }

    pub fn reset(&mut self) {
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonator::{Location, Membrane, MembraneParams, StiffString, StringParams};

    #[test]
    fn test_profile_peaks_at_center() {
        let mut s = StiffString::new(StringParams::default(), 44100.0).unwrap();
        let center = s.line().index_of(Location::along(0.3)).unwrap();
        let params = PluckParams {
            amplitude: 1.0,
            width: 0.2,
        };
        let mut pluck = Pluck::new(params, s.line(), center).unwrap();
        assert!(pluck.span() > 3, "span {}", pluck.span());

        pluck.trigger();
        pluck.prepare(s.line_mut());
        let line = s.line();
        assert_eq!(line.displacement(center), 1.0);
        assert_eq!(line.previous(center), 1.0);
        let peak = line.state().iter().cloned().fold(0.0, f64::max);
        assert_eq!(peak, 1.0);
        assert!(!pluck.is_armed());
    }

    #[test]
    fn test_retrigger_is_idempotent() {
        let mut s = StiffString::new(StringParams::default(), 44100.0).unwrap();
        let center = s.line().index_of(Location::along(0.5)).unwrap();
        let mut pluck = Pluck::new(PluckParams::default(), s.line(), center).unwrap();
        pluck.trigger();
        pluck.prepare(s.line_mut());
        let once = s.line().state().to_vec();
        pluck.trigger();
        pluck.trigger();
        pluck.prepare(s.line_mut());
        assert_eq!(s.line().state(), once.as_slice());
    }

    #[test]
    fn test_unarmed_prepare_does_nothing() {
        let mut s = StiffString::new(StringParams::default(), 44100.0).unwrap();
        let mut pluck = Pluck::new(PluckParams::default(), s.line(), 20).unwrap();
        pluck.prepare(s.line_mut());
        assert!(s.line().state().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_profile_on_membrane_is_round() {
        let m = Membrane::new(MembraneParams::default(), 44100.0).unwrap();
        let center = m.surface().index_of(Location::new(0.5, 0.5)).unwrap();
        let pluck = Pluck::new(PluckParams::default(), m.surface(), center).unwrap();
        // A disc of radius 0.05 on a ~39 x 39 grid covers a handful of points.
        assert!(pluck.span() >= 5, "span {}", pluck.span());
    }

    #[test]
    fn test_width_validation() {
        let s = StiffString::new(StringParams::default(), 44100.0).unwrap();
        for width in [0.0, -0.1, 1.5, f64::NAN] {
            let params = PluckParams { amplitude: 1e-3, width };
            assert!(Pluck::new(params, s.line(), 10).is_err(), "width {width} accepted");
        }
    }
}
