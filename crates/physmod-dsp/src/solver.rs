//! Bounded Newton-Raphson and the power-law potentials used by the
//! implicit interaction models (hammer contact, nonlinear springs).
//!
//! Every solve runs at most `max_iterations` steps so the per-sample cost is
//! fixed. The caller gets the last iterate plus a convergence flag and decides
//! the fallback.
//!
//! Interaction forces are written as discrete gradients of a potential Φ:
//!
//!   F = (Φ(a + r) - Φ(a)) / r,   r = x^{n+1} - x^{n-1},  a = x^{n-1}
//!
//! which makes the coupled update energy-consistent and turns the force law
//! into a scalar equation in `r`.

use serde::{Deserialize, Serialize};

/// Iteration budget and tolerances for every implicit solve in an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Relative step tolerance.
    pub tolerance: f64,
    /// Absolute step tolerance (guards iterates near zero).
    pub abs_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-10,
            abs_tolerance: 1e-15,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    pub value: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// Newton-Raphson on a scalar equation.
///
/// `residual(x)` returns `(g(x), g'(x))`. Stops when the step falls below
/// `abs_tolerance + tolerance * |x|`, when the derivative vanishes, or when
/// the budget is spent.
pub fn newton<F>(guess: f64, settings: &SolverSettings, mut residual: F) -> Solution
where
    F: FnMut(f64) -> (f64, f64),
{
    let mut x = guess;
    for i in 0..settings.max_iterations {
        let (g, dg) = residual(x);
        if !(g.is_finite() && dg.is_finite()) || dg == 0.0 {
            return Solution {
                value: x,
                iterations: i,
                converged: false,
            };
        }
        let step = g / dg;
        x -= step;
        if step.abs() <= settings.abs_tolerance + settings.tolerance * x.abs() {
            return Solution {
                value: x,
                iterations: i + 1,
                converged: x.is_finite(),
            };
        }
    }
    Solution {
        value: x,
        iterations: settings.max_iterations,
        converged: false,
    }
}

/// Φ(x) = linear·x²/2 + stiffness·|x|^(p+1)/(p+1)
///
/// One-sided potentials only act for x > 0 (collisions): the nonlinear part
/// uses [x]₊ and the linear part is ignored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerLaw {
    pub linear: f64,
    pub stiffness: f64,
    pub exponent: f64,
    pub one_sided: bool,
}

impl PowerLaw {
    /// Collision potential K/(p+1)·[x]₊^(p+1).
    pub fn contact(stiffness: f64, exponent: f64) -> Self {
        Self {
            linear: 0.0,
            stiffness,
            exponent,
            one_sided: true,
        }
    }

    /// Two-sided spring potential K₁x²/2 + K₃|x|^(p+1)/(p+1).
    pub fn spring(linear: f64, stiffness: f64, exponent: f64) -> Self {
        Self {
            linear,
            stiffness,
            exponent,
            one_sided: false,
        }
    }

    pub fn energy(&self, x: f64) -> f64 {
        let p = self.exponent;
        if self.one_sided {
            let c = x.max(0.0);
            self.stiffness * c.powf(p + 1.0) / (p + 1.0)
        } else {
            0.5 * self.linear * x * x + self.stiffness * x.abs().powf(p + 1.0) / (p + 1.0)
        }
    }

    /// Φ'(x)
    pub fn force(&self, x: f64) -> f64 {
        let p = self.exponent;
        if self.one_sided {
            self.stiffness * x.max(0.0).powf(p)
        } else {
            self.linear * x + self.stiffness * x.signum() * x.abs().powf(p)
        }
    }

    /// Φ''(x)
    pub fn curvature(&self, x: f64) -> f64 {
        let p = self.exponent;
        if self.one_sided {
            if x > 0.0 {
                self.stiffness * p * x.powf(p - 1.0)
            } else {
                0.0
            }
        } else if x == 0.0 && p > 1.0 {
            self.linear
        } else {
            self.linear + self.stiffness * p * x.abs().powf(p - 1.0)
        }
    }

    /// Discrete gradient q(r) = (Φ(a + r) - Φ(a)) / r and its derivative dq/dr.
    ///
    /// Falls back to a second-order Taylor expansion when `r` is small
    /// relative to `a`: there the difference quotient loses most of its
    /// digits to cancellation while the truncation error is O((r/a)²).
    pub fn quotient(&self, a: f64, r: f64) -> (f64, f64) {
        if r.abs() <= 1e-6 * a.abs() + 1e-18 {
            let c = self.curvature(a);
            return (self.force(a) + 0.5 * c * r, 0.5 * c);
        }
        let delta = self.energy(a + r) - self.energy(a);
        let q = delta / r;
        let dq = (self.force(a + r) * r - delta) / (r * r);
        (q, dq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newton_finds_cube_root() {
        let s = SolverSettings::default();
        let sol = newton(1.0, &s, |x| (x * x * x - 27.0, 3.0 * x * x));
        assert!(sol.converged);
        assert!((sol.value - 3.0).abs() < 1e-9, "got {}", sol.value);
        assert!(sol.iterations <= 10, "took {} iterations", sol.iterations);
    }

    #[test]
    fn test_newton_respects_budget() {
        let s = SolverSettings {
            max_iterations: 3,
            ..SolverSettings::default()
        };
        // No real root: x² + 1 = 0
        let sol = newton(0.5, &s, |x| (x * x + 1.0, 2.0 * x));
        assert!(!sol.converged);
        assert!(sol.iterations <= 3);
    }

    #[test]
    fn test_newton_flags_zero_derivative() {
        let s = SolverSettings::default();
        let sol = newton(0.0, &s, |x| (x * x - 1.0, 2.0 * x));
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn test_contact_is_one_sided() {
        let c = PowerLaw::contact(1e9, 2.3);
        assert_eq!(c.energy(-1e-3), 0.0);
        assert_eq!(c.force(-1e-3), 0.0);
        assert!(c.force(1e-3) > 0.0);
        // Discrete gradient of a non-decreasing potential is never negative.
        for &(a, r) in &[(-1e-4, 2e-4), (1e-4, -3e-4), (5e-5, 1e-6), (-2e-4, 1e-4)] {
            let (q, _) = c.quotient(a, r);
            assert!(q >= 0.0, "negative contact force {q} at a={a} r={r}");
        }
    }

    #[test]
    fn test_quotient_tends_to_force() {
        let s = PowerLaw::spring(1000.0, 1e7, 3.0);
        let a = 2e-3;
        let (q, _) = s.quotient(a, 1e-13);
        let f = s.force(a);
        assert!((q - f).abs() <= 1e-6 * f.abs(), "q={q} f={f}");
    }

    #[test]
    fn test_quotient_derivative_matches_finite_difference() {
        let s = PowerLaw::spring(500.0, 2e6, 2.5);
        let (a, r, eps) = (1e-3, 4e-4, 1e-9);
        let (_, dq) = s.quotient(a, r);
        let (q_hi, _) = s.quotient(a, r + eps);
        let (q_lo, _) = s.quotient(a, r - eps);
        let fd = (q_hi - q_lo) / (2.0 * eps);
        assert!((dq - fd).abs() <= 1e-4 * fd.abs(), "dq={dq} fd={fd}");
    }

    #[test]
    fn test_linear_spring_quotient_is_midpoint_force() {
        let s = PowerLaw::spring(800.0, 0.0, 1.0);
        let (a, r) = (0.01, 0.004);
        let (q, dq) = s.quotient(a, r);
        assert!((q - 800.0 * (a + 0.5 * r)).abs() < 1e-9);
        assert!((dq - 400.0).abs() < 1e-6);
    }
}
