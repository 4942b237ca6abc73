//! Hammer / mallet: a lumped mass colliding with the resonator.
//!
//! The hammer moves along +u. Penetration α = w − u at the contact point; the
//! contact force is the discrete gradient of Φ(α) = K/(p+1)·[α]₊^(p+1) plus
//! Hunt-Crossley damping K·λ·[α]₊^p·δt·α, so the collision neither creates
//! nor (for λ = 0) destroys energy.
//!
//! Unknown r = α⁺ − α⁻. With the resonator's predicted next value u_free and
//! force gain J:
//!
//!   w⁺ = 2w − w⁻ − k²F/M
//!   u⁺ = u_free + J·F
//!   ⇒ r + (k²/M + J)·F(r) − [(2w − w⁻ − u_free) − α⁻] = 0
//!
//! F(r) is non-decreasing in r, so the scalar equation has one root.

use serde::{Deserialize, Serialize};

use super::Excitation;
use crate::error::{ConfigError, ConfigResult, non_negative, positive};
use crate::resonator::ResonatorModel;
use crate::solver::{PowerLaw, SolverSettings, newton};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammerParams {
    /// kg
    pub mass: f64,
    /// K, N/m^p
    pub stiffness: f64,
    /// p ≥ 1
    pub exponent: f64,
    /// Hunt-Crossley λ, s/m
    pub damping: f64,
}

impl Default for HammerParams {
    /// Small felt piano hammer.
    fn default() -> Self {
        Self {
            mass: 0.005,
            stiffness: 1e9,
            exponent: 2.3,
            damping: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flight {
    Resting,
    /// `touched` once the first contact happened.
    Flying { touched: bool },
}

#[derive(Clone, Debug)]
pub struct Hammer {
    params: HammerParams,
    contact: PowerLaw,
    /// w at the current and previous step.
    position: f64,
    position_prev: f64,
    force: f64,
    guess: f64,
    pending: Option<f64>,
    flight: Flight,
}

impl Hammer {
    pub fn new(params: HammerParams) -> ConfigResult<Self> {
        positive("mass", params.mass)?;
        positive("stiffness", params.stiffness)?;
        non_negative("damping", params.damping)?;
        if !(params.exponent.is_finite() && params.exponent >= 1.0) {
            return Err(ConfigError::invalid(
                "exponent",
                format!("must be at least 1, got {}", params.exponent),
            ));
        }
        Ok(Self {
            params,
            contact: PowerLaw::contact(params.stiffness, params.exponent),
            position: 0.0,
            position_prev: 0.0,
            force: 0.0,
            guess: 0.0,
            pending: None,
            flight: Flight::Resting,
        })
    }

    pub fn params(&self) -> &HammerParams {
        &self.params
    }

    /// Queue a strike; the hammer launches at the next `prepare`.
    pub fn strike(&mut self, velocity: f64) {
        self.pending = Some(velocity);
    }

    pub fn is_active(&self) -> bool {
        matches!(self.flight, Flight::Flying { .. })
    }

    /// Contact force applied during the last step, N.
    pub fn force(&self) -> f64 {
        self.force
    }

    /// Hammer displacement, m.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Launch a queued strike from just below the surface, two steps away.
    pub fn prepare(&mut self, model: &dyn ResonatorModel, index: usize, k: f64) {
        let Some(velocity) = self.pending.take() else {
            return;
        };
        let step = velocity * k;
        self.position = model.displacement(index) - 2.0 * step;
        self.position_prev = self.position - step;
        self.force = 0.0;
        self.guess = 0.0;
        self.flight = Flight::Flying { touched: false };
    }

    /// Kinetic energy of the mass plus the energy stored in the contact,
    /// matching the resonator's energy at the same time level.
    pub fn energy(&self, model: &dyn ResonatorModel, index: usize, k: f64) -> f64 {
        let v = (self.position - self.position_prev) / k;
        let alpha = self.position - model.displacement(index);
        let alpha_prev = self.position_prev - model.previous(index);
        0.5 * self.params.mass * v * v
            + 0.5 * (self.contact.energy(alpha) + self.contact.energy(alpha_prev))
    }

    pub fn excite(
        &mut self,
        model: &mut dyn ResonatorModel,
        index: usize,
        k: f64,
        settings: &SolverSettings,
    ) -> Excitation {
        let Flight::Flying { touched } = self.flight else {
            return Excitation::Idle;
        };

        let u_free = model.predict(index);
        let alpha_prev = self.position_prev - model.previous(index);
        let alpha_cur = self.position - model.displacement(index);
        let inertia = k * k / self.params.mass;
        let w_free = 2.0 * self.position - self.position_prev;
        // r if no force acts
        let b = w_free - u_free - alpha_prev;

        let mut outcome = Excitation::Applied;
        let force = if alpha_prev <= 0.0 && b + alpha_prev <= 0.0 {
            0.0
        } else {
            let m = inertia + model.force_gain();
            let damping = self.params.stiffness
                * self.params.damping
                * alpha_cur.max(0.0).powf(self.params.exponent)
                / (2.0 * k);
            let contact = self.contact;
            let guess = if self.force > 0.0 { self.guess } else { b };
            let sol = newton(guess, settings, |r| {
                let (q, dq) = contact.quotient(alpha_prev, r);
                (r + m * (q + damping * r) - b, 1.0 + m * (dq + damping))
            });
            if sol.converged {
                self.guess = sol.value;
                let (q, _) = contact.quotient(alpha_prev, sol.value);
                (q + damping * sol.value).max(0.0)
            } else {
                outcome = Excitation::Fallback;
                self.force
            }
        };
        let force = if force.is_finite() {
            force
        } else {
            outcome = Excitation::NonFinite;
            0.0
        };

        let next = w_free - inertia * force;
        let moving_down = next < self.position;
        self.position_prev = self.position;
        self.position = next;
        self.force = force;

        if force > 0.0 {
            model.add_force(index, force);
            self.flight = Flight::Flying { touched: true };
        } else if touched && moving_down {
            // rebounded and separated
            self.flight = Flight::Resting;
        }
        if force == 0.0 && outcome == Excitation::Applied {
            Excitation::Idle
        } else {
            outcome
        }
    }

    pub fn reset(&mut self) {
        self.flight = Flight::Resting;
        self.pending = None;
        self.force = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonator::{Location, StiffString, StringParams};

    const SR: f64 = 44100.0;

    fn lossless_string() -> StiffString {
        let params = StringParams {
            sigma0: 0.0,
            sigma1: 0.0,
            ..StringParams::default()
        };
        StiffString::new(params, SR).unwrap()
    }

    /// Step string and hammer together until the hammer comes to rest.
    fn strike(
        string: &mut StiffString,
        hammer: &mut Hammer,
        index: usize,
        velocity: f64,
        mut each: impl FnMut(&StiffString, &Hammer),
    ) -> usize {
        let k = 1.0 / SR;
        let settings = SolverSettings::default();
        hammer.strike(velocity);
        for n in 0..SR as usize {
            hammer.prepare(string.line(), index, k);
            let outcome = hammer.excite(string.line_mut(), index, k, &settings);
            assert_ne!(outcome, Excitation::Fallback, "solver failed at sample {n}");
            let line = string.line_mut();
            line.calculate_scheme();
            line.update_states();
            each(string, hammer);
            if !hammer.is_active() {
                return n;
            }
        }
        panic!("hammer never left the string");
    }

    #[test]
    fn test_contact_force_never_pulls() {
        let mut string = lossless_string();
        let index = string.line().index_of(Location::along(0.12)).unwrap();
        let mut hammer = Hammer::new(HammerParams::default()).unwrap();
        let mut peak_force = 0.0f64;
        let mut peak_u = 0.0f64;
        strike(&mut string, &mut hammer, index, 2.0, |s, h| {
            assert!(h.force() >= 0.0, "negative contact force {}", h.force());
            peak_force = peak_force.max(h.force());
            peak_u = peak_u.max(s.line().displacement(index));
        });
        assert!(peak_force > 0.0, "hammer never touched the string");
        assert!(peak_u > 0.0, "string was not pushed along +u");
    }

    #[test]
    fn test_strike_conserves_energy() {
        let k = 1.0 / SR;
        let mut string = lossless_string();
        let index = string.line().index_of(Location::along(0.12)).unwrap();
        let params = HammerParams::default();
        let mut hammer = Hammer::new(params).unwrap();
        let velocity = 1.5;
        let initial = 0.5 * params.mass * velocity * velocity;
        strike(&mut string, &mut hammer, index, velocity, |s, h| {
            let total = s.line().energy() + h.energy(s.line(), index, k);
            assert!(
                ((total - initial) / initial).abs() < 1e-6,
                "energy {total} vs launched {initial}"
            );
        });
        assert!(
            string.line().energy() > 0.1 * initial,
            "string took almost no energy"
        );
    }

    #[test]
    fn test_rests_until_struck() {
        let mut string = lossless_string();
        let mut hammer = Hammer::new(HammerParams::default()).unwrap();
        let outcome = hammer.excite(string.line_mut(), 10, 1.0 / SR, &SolverSettings::default());
        assert_eq!(outcome, Excitation::Idle);
        assert!(!hammer.is_active());
    }

    #[test]
    fn test_parameter_validation() {
        for params in [
            HammerParams { mass: 0.0, ..HammerParams::default() },
            HammerParams { exponent: 0.5, ..HammerParams::default() },
            HammerParams { damping: -1.0, ..HammerParams::default() },
        ] {
            assert!(Hammer::new(params).is_err(), "{params:?} accepted");
        }
    }
}
