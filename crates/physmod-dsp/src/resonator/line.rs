//! 1-D kernel shared by the stiff string and the bar.
//!
//! ρA·u_tt = T·u_xx − EI·u_xxxx − 2σ0ρA·u_t + 2σ1ρA·u_txx
//!
//! Explicit scheme with the σ1 term on a backward time difference:
//!
//!   u⁺ = [2u − (1 − σ0k)u⁻ + λ²δxx u − μ²δxxxx u + 2S(δxx u − δxx u⁻)] / (1 + σ0k)
//!        + J·F
//!
//!   λ² = c²k²/h²   μ² = κ²k²/h⁴   S = σ1k/h²   J = k² / (ρA·h·(1 + σ0k))
//!
//! Boundaries are realised with ghost points outside the grid, so every
//! updated point uses the same stencil. A free end has two sets: the
//! tension term sees a zero-slope mirror, the bending term sees zero moment
//! and zero shear.

use super::{Boundary, DIVERGENCE_LIMIT, GridDims, Location, OutputKind, ResonatorModel};
use crate::error::{ConfigError, ConfigResult};
use crate::state::StateLevels;

/// Finer grids than this are refused rather than allocated.
const MAX_LINE_POINTS: usize = 65_536;

/// Physical inputs of the 1-D equation, in SI units.
#[derive(Clone, Copy, Debug)]
pub struct LinePhysics {
    pub length: f64,
    /// ρA, kg/m
    pub linear_density: f64,
    /// T, N
    pub tension: f64,
    /// EI, N·m²
    pub bending_stiffness: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundaries: [Boundary; 2],
}

impl LinePhysics {
    /// Smallest stable grid spacing at time step `k`.
    pub fn min_spacing(&self, k: f64) -> f64 {
        let c_sq = self.tension / self.linear_density;
        let kappa_sq = self.bending_stiffness / self.linear_density;
        let a = c_sq * k * k + 4.0 * self.sigma1 * k;
        ((a + (a * a + 16.0 * kappa_sq * k * k).sqrt()) / 2.0).sqrt()
    }
}

/// Coefficients and boundary handling. Copied out of [`Line`] so the update
/// loop can read them while the state levels are mutably borrowed.
#[derive(Clone, Copy, Debug)]
struct Stencil {
    intervals: usize,
    boundaries: [Boundary; 2],
    lambda_sq: f64,
    mu_sq: f64,
    s1: f64,
    loss: f64,
    inv_denom: f64,
    force_gain: f64,
}

impl Stencil {
    /// Value at grid index `l`, reaching into ghost points past either end.
    #[inline]
    fn at(&self, u: &[f64], l: isize) -> f64 {
        let n = self.intervals as isize;
        if (0..=n).contains(&l) {
            return u[l as usize];
        }
        let (boundary, edge, inward) = if l < 0 {
            (self.boundaries[0], 0, 1)
        } else {
            (self.boundaries[1], n, -1)
        };
        let depth = (l - edge).abs();
        let p = |i: isize| u[(edge + inward * i) as usize];
        match (boundary, depth) {
            (Boundary::Clamped, d) => p(d),
            (Boundary::SimplySupported, d) => -p(d),
            // zero moment
            (Boundary::Free, 1) => 2.0 * p(0) - p(1),
            // zero shear
            (Boundary::Free, _) => p(2) - 4.0 * p(1) + 4.0 * p(0),
        }
    }

    /// Like [`at`](Self::at), but a free end mirrors its neighbour.
    #[inline]
    fn at_tension(&self, u: &[f64], l: isize) -> f64 {
        let n = self.intervals as isize;
        match l {
            -1 if self.boundaries[0] == Boundary::Free => u[1],
            l if l == n + 1 && self.boundaries[1] == Boundary::Free => u[self.intervals - 1],
            l => self.at(u, l),
        }
    }

    /// Second difference with the bending ghosts; zero at a free end.
    #[inline]
    fn d2(&self, u: &[f64], l: usize) -> f64 {
        let i = l as isize;
        self.at(u, i + 1) - 2.0 * u[l] + self.at(u, i - 1)
    }

    /// Second difference seen by the tension and σ1 terms.
    #[inline]
    fn d2_tension(&self, u: &[f64], l: usize) -> f64 {
        let i = l as isize;
        self.at_tension(u, i + 1) - 2.0 * u[l] + self.at_tension(u, i - 1)
    }

    #[inline]
    fn d4(&self, u: &[f64], l: usize) -> f64 {
        let i = l as isize;
        self.at(u, i + 2) - 4.0 * self.at(u, i + 1) + 6.0 * u[l] - 4.0 * self.at(u, i - 1)
            + self.at(u, i - 2)
    }

    /// Next-level value at one point.
    #[inline]
    fn step(&self, cur: &[f64], prev: &[f64], force: f64, l: usize) -> f64 {
        let d2 = self.d2_tension(cur, l);
        let mut acc = 2.0 * cur[l] - (1.0 - self.loss) * prev[l] + self.lambda_sq * d2;
        if self.mu_sq != 0.0 {
            acc -= self.mu_sq * self.d4(cur, l);
        }
        if self.s1 != 0.0 {
            acc += 2.0 * self.s1 * (d2 - self.d2_tension(prev, l));
        }
        acc * self.inv_denom + self.force_gain * force
    }
}

#[derive(Clone, Debug)]
pub struct Line {
    physics: LinePhysics,
    stencil: Stencil,
    spacing: f64,
    k: f64,
    /// First and last updated index; fixed ends are excluded.
    first: usize,
    last: usize,
    states: StateLevels,
    forces: Vec<f64>,
}

impl Line {
    /// Derive the grid and update coefficients. Refuses grids that would be
    /// unstable or degenerate.
    pub fn new(module: &'static str, physics: LinePhysics, sample_rate: f64) -> ConfigResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        let k = 1.0 / sample_rate;
        let h_min = physics.min_spacing(k);
        if !(h_min.is_finite() && h_min > 0.0) {
            return Err(ConfigError::Unstable {
                module,
                message: format!("minimum grid spacing is {h_min}"),
            });
        }
        let intervals = (physics.length / h_min).floor();
        if !(intervals >= 2.0) {
            return Err(ConfigError::Unstable {
                module,
                message: format!(
                    "length {} m holds fewer than two intervals of {h_min:.4e} m",
                    physics.length
                ),
            });
        }
        if intervals >= MAX_LINE_POINTS as f64 {
            return Err(ConfigError::Unstable {
                module,
                message: format!("{intervals} intervals exceeds the {MAX_LINE_POINTS} point limit"),
            });
        }
        let n = intervals as usize;
        let h = physics.length / n as f64;

        let c_sq = physics.tension / physics.linear_density;
        let kappa_sq = physics.bending_stiffness / physics.linear_density;
        let loss = physics.sigma0 * k;
        let inv_denom = 1.0 / (1.0 + loss);
        let stencil = Stencil {
            intervals: n,
            boundaries: physics.boundaries,
            lambda_sq: c_sq * k * k / (h * h),
            mu_sq: kappa_sq * k * k / (h * h * h * h),
            s1: physics.sigma1 * k / (h * h),
            loss,
            inv_denom,
            force_gain: k * k / (physics.linear_density * h) * inv_denom,
        };

        let first = if physics.boundaries[0].is_fixed() { 1 } else { 0 };
        let last = if physics.boundaries[1].is_fixed() { n - 1 } else { n };

        Ok(Self {
            physics,
            stencil,
            spacing: h,
            k,
            first,
            last,
            states: StateLevels::new(n + 1),
            forces: vec![0.0; n + 1],
        })
    }

    pub fn intervals(&self) -> usize {
        self.stencil.intervals
    }

    pub fn physics(&self) -> &LinePhysics {
        &self.physics
    }
}

impl ResonatorModel for Line {
    fn point_count(&self) -> usize {
        self.stencil.intervals + 1
    }

    fn dims(&self) -> GridDims {
        GridDims {
            columns: self.point_count(),
            rows: 1,
        }
    }

    fn spacing(&self) -> f64 {
        self.spacing
    }

    fn courant(&self) -> f64 {
        let s = &self.stencil;
        s.lambda_sq + 4.0 * s.mu_sq + 4.0 * s.s1
    }

    fn index_of(&self, location: Location) -> ConfigResult<usize> {
        let x = location.check_x()?;
        let l = (x * self.stencil.intervals as f64).round() as usize;
        Ok(l.clamp(self.first, self.last))
    }

    fn location_of(&self, index: usize) -> Location {
        Location::along(index as f64 / self.stencil.intervals as f64)
    }

    fn is_fixed(&self, index: usize) -> bool {
        index < self.first || index > self.last
    }

    fn add_force(&mut self, index: usize, force: f64) {
        if !self.is_fixed(index) {
            self.forces[index] += force;
        }
    }

    fn force_gain(&self) -> f64 {
        self.stencil.force_gain
    }

    fn predict(&self, index: usize) -> f64 {
        if self.is_fixed(index) {
            return 0.0;
        }
        self.stencil.step(
            self.states.current(),
            self.states.previous(),
            self.forces[index],
            index,
        )
    }

    fn calculate_scheme(&mut self) -> bool {
        let stencil = self.stencil;
        let forces = &self.forces;
        let (next, cur, prev) = self.states.split_mut();
        let mut healthy = true;
        for l in self.first..=self.last {
            let v = stencil.step(cur, prev, forces[l], l);
            next[l] = v;
            healthy &= v.abs() < DIVERGENCE_LIMIT;
        }
        healthy
    }

    fn update_states(&mut self) {
        self.states.rotate();
        self.forces.fill(0.0);
    }

    fn displacement(&self, index: usize) -> f64 {
        self.states.current()[index]
    }

    fn previous(&self, index: usize) -> f64 {
        self.states.previous()[index]
    }

    fn output(&self, index: usize, kind: OutputKind) -> f64 {
        match kind {
            OutputKind::Displacement => self.states.current()[index],
            OutputKind::Velocity => {
                (self.states.current()[index] - self.states.previous()[index]) / self.k
            }
        }
    }

    fn state(&self) -> &[f64] {
        self.states.current()
    }

    fn impose(&mut self, index: usize, value: f64) {
        if !self.is_fixed(index) {
            self.states.impose(index, value);
        }
    }

    fn clear(&mut self) {
        self.states.clear();
        self.forces.fill(0.0);
    }

    /// Kinetic, tension and bending terms on the trapezoid-weighted grid.
    /// With the mirror ghost the tension term at a free end reduces to the
    /// interval sum; the bending term at a free end is zero by the
    /// zero-moment ghost.
    fn energy(&self) -> f64 {
        let s = &self.stencil;
        let (cur, prev) = (self.states.current(), self.states.previous());
        let (h, k, n) = (self.spacing, self.k, s.intervals);
        let end_weight = |l: usize| if l == 0 || l == n { 0.5 } else { 1.0 };

        let mut kinetic = 0.0;
        let mut bending = 0.0;
        for l in 0..=n {
            let v = (cur[l] - prev[l]) / k;
            kinetic += end_weight(l) * v * v;
            if self.physics.bending_stiffness != 0.0 {
                bending += end_weight(l) * s.d2(cur, l) * s.d2(prev, l);
            }
        }
        let mut stretch = 0.0;
        for l in 0..n {
            stretch += (cur[l + 1] - cur[l]) * (prev[l + 1] - prev[l]);
        }

        0.5 * self.physics.linear_density * h * kinetic
            + 0.5 * self.physics.tension * stretch / h
            + 0.5 * self.physics.bending_stiffness * bending / (h * h * h)
    }
}
