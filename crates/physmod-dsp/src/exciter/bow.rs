//! Bow: velocity-dependent friction at one point.
//!
//! Soft friction law (dimensionless friction coefficient, peak 1 at
//! η = 1/√(2a)):
//!
//!   φ(η) = √(2a)·η·exp(−aη² + ½)
//!
//! η is the relative velocity string − bow at the next step, taken as the
//! centred difference (u⁺ − u⁻)/2k. The string feels −F_B·φ(η), so
//! u⁺ = u_free − J·F_B·φ(η) and η solves
//!
//!   η + β·φ(η) − q = 0,   q = (u_free − u⁻)/2k − v_B,   β = J·F_B/2k
//!
//! which has a single root while β·min φ' > −1.

use serde::{Deserialize, Serialize};

use super::Excitation;
use crate::error::{ConfigError, ConfigResult, non_negative, positive};
use crate::resonator::ResonatorModel;
use crate::solver::{SolverSettings, newton};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BowParams {
    /// Normal force F_B, N
    pub force: f64,
    /// Bow speed v_B, m/s
    pub velocity: f64,
    /// Friction curve sharpness a, s²/m²
    pub sharpness: f64,
    /// Start bowing as soon as the instrument runs.
    pub active: bool,
}

impl Default for BowParams {
    fn default() -> Self {
        Self {
            force: 0.2,
            velocity: 0.2,
            sharpness: 100.0,
            active: false,
        }
    }
}

/// φ(η) and φ'(η).
pub fn friction(sharpness: f64, eta: f64) -> (f64, f64) {
    let scale = (2.0 * sharpness).sqrt();
    let e = (-sharpness * eta * eta + 0.5).exp();
    (
        scale * eta * e,
        scale * e * (1.0 - 2.0 * sharpness * eta * eta),
    )
}

#[derive(Clone, Debug)]
pub struct Bow {
    params: BowParams,
    bowing: bool,
    force_b: f64,
    velocity_b: f64,
    /// Relative velocity from the last solve; warm start for the next.
    eta: f64,
    /// Force applied at the last step, N.
    force: f64,
}

impl Bow {
    pub fn new(params: BowParams) -> ConfigResult<Self> {
        non_negative("force", params.force)?;
        positive("sharpness", params.sharpness)?;
        if !params.velocity.is_finite() {
            return Err(ConfigError::invalid("velocity", "must be finite"));
        }
        Ok(Self {
            params,
            bowing: params.active,
            force_b: params.force,
            velocity_b: params.velocity,
            eta: -params.velocity,
            force: 0.0,
        })
    }

    pub fn params(&self) -> &BowParams {
        &self.params
    }

    /// Parameters reflecting the live force, speed and on/off state.
    pub fn current_params(&self) -> BowParams {
        BowParams {
            force: self.force_b,
            velocity: self.velocity_b,
            sharpness: self.params.sharpness,
            active: self.bowing,
        }
    }

    pub fn is_bowing(&self) -> bool {
        self.bowing
    }

    pub fn start(&mut self) {
        if !self.bowing {
            self.bowing = true;
            self.eta = -self.velocity_b;
            self.force = 0.0;
        }
    }

    pub fn stop(&mut self) {
        self.bowing = false;
        self.force = 0.0;
    }

    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity_b = velocity;
    }

    pub fn set_force(&mut self, force: f64) {
        self.force_b = force;
    }

    /// Force applied at the last step, N.
    pub fn force(&self) -> f64 {
        self.force
    }

    pub fn excite(
        &mut self,
        model: &mut dyn ResonatorModel,
        index: usize,
        k: f64,
        settings: &SolverSettings,
    ) -> Excitation {
        if !self.bowing || self.force_b == 0.0 {
            return Excitation::Idle;
        }
        let u_free = model.predict(index);
        let q = (u_free - model.previous(index)) / (2.0 * k) - self.velocity_b;
        let beta = model.force_gain() * self.force_b / (2.0 * k);
        let a = self.params.sharpness;

        let sol = newton(self.eta, settings, |eta| {
            let (phi, dphi) = friction(a, eta);
            (eta + beta * phi - q, 1.0 + beta * dphi)
        });
        let mut outcome = Excitation::Applied;
        let force = if sol.converged {
            self.eta = sol.value;
            -self.force_b * friction(a, sol.value).0
        } else {
            outcome = Excitation::Fallback;
            self.force
        };
        let force = if force.is_finite() {
            force
        } else {
            outcome = Excitation::NonFinite;
            self.eta = -self.velocity_b;
            0.0
        };
        self.force = force;
        model.add_force(index, force);
        outcome
    }

    pub fn reset(&mut self) {
        self.eta = -self.velocity_b;
        self.force = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonator::{Location, StiffString, StringParams};

    #[test]
    fn test_friction_peak_is_one() {
        let a = 100.0;
        let eta_peak = 1.0 / (2.0_f64 * a).sqrt();
        let (phi, dphi) = friction(a, eta_peak);
        assert!((phi - 1.0).abs() < 1e-12, "peak {phi}");
        assert!(dphi.abs() < 1e-12, "slope at peak {dphi}");
        assert_eq!(friction(a, 0.0).0, 0.0);
        assert!(friction(a, -eta_peak).0 < 0.0, "friction must oppose sliding");
    }

    #[test]
    fn test_friction_derivative() {
        let (a, eta, eps) = (80.0, 0.031, 1e-7);
        let fd = (friction(a, eta + eps).0 - friction(a, eta - eps).0) / (2.0 * eps);
        let (_, d) = friction(a, eta);
        assert!((fd - d).abs() < 1e-6 * d.abs().max(1.0), "fd {fd} vs {d}");
    }

    #[test]
    fn test_solved_velocity_satisfies_friction_law() {
        let sr = 44100.0;
        let k = 1.0 / sr;
        let mut s = StiffString::new(StringParams::default(), sr).unwrap();
        let index = s.line().index_of(Location::along(0.11)).unwrap();
        let mut bow = Bow::new(BowParams {
            active: true,
            ..BowParams::default()
        })
        .unwrap();
        let settings = SolverSettings::default();
        for n in 0..2000 {
            let outcome = bow.excite(s.line_mut(), index, k, &settings);
            let line = s.line_mut();
            assert_eq!(outcome, Excitation::Applied, "sample {n}");
            let before = line.previous(index);
            line.calculate_scheme();
            line.update_states();
            // (u⁺ − u⁻)/2k − v_B must equal the η used for the force.
            let eta =
                (line.displacement(index) - before) / (2.0 * k) - bow.current_params().velocity;
            let expected = -bow.current_params().force * friction(100.0, eta).0;
            assert!(
                (bow.force() - expected).abs() < 1e-6 * bow.current_params().force,
                "sample {n}: force {} vs law {expected}",
                bow.force()
            );
        }
    }

    #[test]
    fn test_idle_until_started() {
        let mut s = StiffString::new(StringParams::default(), 44100.0).unwrap();
        let mut bow = Bow::new(BowParams::default()).unwrap();
        let settings = SolverSettings::default();
        assert_eq!(bow.excite(s.line_mut(), 10, 1.0 / 44100.0, &settings), Excitation::Idle);
        bow.start();
        assert_eq!(bow.excite(s.line_mut(), 10, 1.0 / 44100.0, &settings), Excitation::Applied);
        bow.stop();
        assert!(!bow.is_bowing());
        assert_eq!(bow.force(), 0.0);
    }

    #[test]
    fn test_live_settings_in_params() {
        let mut bow = Bow::new(BowParams::default()).unwrap();
        bow.set_force(0.3);
        bow.set_velocity(-0.1);
        bow.start();
        let p = bow.current_params();
        assert_eq!((p.force, p.velocity, p.active), (0.3, -0.1, true));
        assert_eq!(bow.params().force, 0.2);
    }
}
