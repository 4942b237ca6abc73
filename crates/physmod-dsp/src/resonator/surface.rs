//! 2-D kernel shared by the membrane, the thin plate and the stiff membrane.
//!
//! ρH·u_tt = T·Δu − D·ΔΔu − 2σ0ρH·u_t + 2σ1ρH·Δu_t
//!
//!   u⁺ = [2u − (1 − σ0k)u⁻ + λ²Δu − μ²ΔΔu + 2S(Δu − Δu⁻)] / (1 + σ0k) + J·F
//!
//!   λ² = c²k²/h²   μ² = κ²k²/h⁴   S = σ1k/h²   J = k² / (ρH·h²·(1 + σ0k))
//!
//! Δ is the five-point Laplacian and ΔΔ is Δ applied to the Laplacian field.
//! Edge points are held at zero; the ghost row beyond an edge mirrors the
//! first interior row (clamped) or its negative (simply supported).

use super::{Boundary, DIVERGENCE_LIMIT, GridDims, Location, OutputKind, ResonatorModel};
use crate::error::{ConfigError, ConfigResult};
use crate::state::StateLevels;

/// Upper bound accepted for `max_points`.
pub const POINT_LIMIT: usize = 1 << 20;

/// Physical inputs of the 2-D equation, in SI units.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePhysics {
    pub width: f64,
    pub height: f64,
    /// ρH, kg/m²
    pub areal_density: f64,
    /// T, N/m
    pub tension: f64,
    /// D = EH³ / (12(1 − ν²)), N·m
    pub rigidity: f64,
    pub sigma0: f64,
    pub sigma1: f64,
    pub boundary: Boundary,
    pub max_points: usize,
}

impl SurfacePhysics {
    /// Smallest stable grid spacing at time step `k`.
    pub fn min_spacing(&self, k: f64) -> f64 {
        let c_sq = self.tension / self.areal_density;
        let kappa_sq = self.rigidity / self.areal_density;
        let a = c_sq * k * k + 4.0 * self.sigma1 * k;
        (a + (a * a + 16.0 * kappa_sq * k * k).sqrt()).sqrt()
    }
}

#[derive(Clone, Copy, Debug)]
struct Stencil {
    nx: usize,
    ny: usize,
    /// +1 clamped, −1 simply supported.
    ghost_sign: f64,
    lambda_sq: f64,
    mu_sq: f64,
    s1: f64,
    loss: f64,
    inv_denom: f64,
    force_gain: f64,
}

impl Stencil {
    #[inline]
    fn stride(&self) -> usize {
        self.nx + 1
    }

    /// Value at (l, m), one ghost row/column beyond each edge.
    #[inline]
    fn value(&self, u: &[f64], l: isize, m: isize) -> f64 {
        let (nx, ny) = (self.nx as isize, self.ny as isize);
        let mut sign = 1.0;
        let l = if l < 0 {
            sign *= self.ghost_sign;
            -l
        } else if l > nx {
            sign *= self.ghost_sign;
            2 * nx - l
        } else {
            l
        };
        let m = if m < 0 {
            sign *= self.ghost_sign;
            -m
        } else if m > ny {
            sign *= self.ghost_sign;
            2 * ny - m
        } else {
            m
        };
        sign * u[m as usize * self.stride() + l as usize]
    }

    /// Five-point Laplacian at (l, m), without the 1/h² factor.
    #[inline]
    fn lap(&self, u: &[f64], l: usize, m: usize) -> f64 {
        let (li, mi) = (l as isize, m as isize);
        self.value(u, li + 1, mi)
            + self.value(u, li - 1, mi)
            + self.value(u, li, mi + 1)
            + self.value(u, li, mi - 1)
            - 4.0 * u[m * self.stride() + l]
    }

    /// Next-level value from the local terms.
    #[inline]
    fn combine(
        &self,
        cur: f64,
        prev: f64,
        lap_cur: f64,
        lap_prev: f64,
        bilap: f64,
        force: f64,
    ) -> f64 {
        let mut acc = 2.0 * cur - (1.0 - self.loss) * prev + self.lambda_sq * lap_cur;
        if self.mu_sq != 0.0 {
            acc -= self.mu_sq * bilap;
        }
        if self.s1 != 0.0 {
            acc += 2.0 * self.s1 * (lap_cur - lap_prev);
        }
        acc * self.inv_denom + self.force_gain * force
    }
}

#[derive(Clone, Debug)]
pub struct Surface {
    physics: SurfacePhysics,
    stencil: Stencil,
    spacing: f64,
    k: f64,
    states: StateLevels,
    forces: Vec<f64>,
    /// Laplacian of the current level over the whole grid, refilled every step
    /// when the bending term is active.
    lap_scratch: Vec<f64>,
}

impl Surface {
    pub fn new(
        module: &'static str,
        physics: SurfacePhysics,
        sample_rate: f64,
    ) -> ConfigResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        let ghost_sign = match physics.boundary {
            Boundary::Clamped => 1.0,
            Boundary::SimplySupported => -1.0,
            Boundary::Free => {
                return Err(ConfigError::UnsupportedBoundary {
                    module,
                    boundary: Boundary::Free.name(),
                });
            }
        };
        if !(9..=POINT_LIMIT).contains(&physics.max_points) {
            return Err(ConfigError::invalid(
                "max_points",
                format!("must be between 9 and {POINT_LIMIT}, got {}", physics.max_points),
            ));
        }

        let k = 1.0 / sample_rate;
        let h_min = physics.min_spacing(k);
        if !(h_min.is_finite() && h_min > 0.0) {
            return Err(ConfigError::Unstable {
                module,
                message: format!("minimum grid spacing is {h_min}"),
            });
        }

        let fits = |h: f64| {
            let nx = (physics.width / h).floor();
            let ny = (physics.height / h).floor();
            ((nx + 1.0) * (ny + 1.0) <= physics.max_points as f64).then_some((nx, ny))
        };
        let mut h = h_min;
        let (nx, ny) = match fits(h) {
            Some(n) => n,
            None => {
                h = h.max((physics.width * physics.height / physics.max_points as f64).sqrt());
                loop {
                    if let Some(n) = fits(h) {
                        break n;
                    }
                    h *= 1.01;
                }
            }
        };
        if h > h_min {
            tracing::debug!(
                module,
                h_min,
                h,
                max_points = physics.max_points,
                "grid coarsened to fit the point budget"
            );
        }
        if !(nx >= 2.0 && ny >= 2.0) {
            return Err(ConfigError::Unstable {
                module,
                message: format!(
                    "{} x {} m with spacing {h:.4e} m gives a {nx} x {ny} grid, need at least 2 x 2",
                    physics.width, physics.height
                ),
            });
        }
        let (nx, ny) = (nx as usize, ny as usize);
        let h = (physics.width / nx as f64).min(physics.height / ny as f64);

        let c_sq = physics.tension / physics.areal_density;
        let kappa_sq = physics.rigidity / physics.areal_density;
        let loss = physics.sigma0 * k;
        let inv_denom = 1.0 / (1.0 + loss);
        let stencil = Stencil {
            nx,
            ny,
            ghost_sign,
            lambda_sq: c_sq * k * k / (h * h),
            mu_sq: kappa_sq * k * k / (h * h * h * h),
            s1: physics.sigma1 * k / (h * h),
            loss,
            inv_denom,
            force_gain: k * k / (physics.areal_density * h * h) * inv_denom,
        };
        let points = (nx + 1) * (ny + 1);

        Ok(Self {
            physics,
            stencil,
            spacing: h,
            k,
            states: StateLevels::new(points),
            forces: vec![0.0; points],
            lap_scratch: vec![0.0; points],
        })
    }

    /// Intervals along x and y.
    pub fn intervals(&self) -> (usize, usize) {
        (self.stencil.nx, self.stencil.ny)
    }

    pub fn physics(&self) -> &SurfacePhysics {
        &self.physics
    }

    #[inline]
    fn coords(&self, index: usize) -> (usize, usize) {
        let stride = self.stencil.stride();
        (index % stride, index / stride)
    }
}

impl ResonatorModel for Surface {
    fn point_count(&self) -> usize {
        (self.stencil.nx + 1) * (self.stencil.ny + 1)
    }

    fn dims(&self) -> GridDims {
        GridDims {
            columns: self.stencil.nx + 1,
            rows: self.stencil.ny + 1,
        }
    }

    fn spacing(&self) -> f64 {
        self.spacing
    }

    fn courant(&self) -> f64 {
        let s = &self.stencil;
        2.0 * s.lambda_sq + 16.0 * s.mu_sq + 8.0 * s.s1
    }

    fn index_of(&self, location: Location) -> ConfigResult<usize> {
        let (x, y) = location.check_xy()?;
        let (nx, ny) = (self.stencil.nx, self.stencil.ny);
        let l = ((x * nx as f64).round() as usize).clamp(1, nx - 1);
        let m = ((y * ny as f64).round() as usize).clamp(1, ny - 1);
        Ok(m * self.stencil.stride() + l)
    }

    fn location_of(&self, index: usize) -> Location {
        let (l, m) = self.coords(index);
        Location::new(
            l as f64 / self.stencil.nx as f64,
            m as f64 / self.stencil.ny as f64,
        )
    }

    fn is_fixed(&self, index: usize) -> bool {
        let (l, m) = self.coords(index);
        l == 0 || m == 0 || l == self.stencil.nx || m == self.stencil.ny
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
        let s = &self.stencil;
        let (cur, prev) = (self.states.current(), self.states.previous());
        let (l, m) = self.coords(index);
        let lap_cur = s.lap(cur, l, m);
        let bilap = if s.mu_sq != 0.0 {
            s.lap(cur, l + 1, m) + s.lap(cur, l - 1, m) + s.lap(cur, l, m + 1)
                + s.lap(cur, l, m - 1)
                - 4.0 * lap_cur
        } else {
            0.0
        };
        let lap_prev = if s.s1 != 0.0 { s.lap(prev, l, m) } else { 0.0 };
        s.combine(cur[index], prev[index], lap_cur, lap_prev, bilap, self.forces[index])
    }

    fn calculate_scheme(&mut self) -> bool {
        let s = self.stencil;
        let stride = s.stride();
        let forces = &self.forces;
        let scratch = &mut self.lap_scratch;
        let (next, cur, prev) = self.states.split_mut();

        let bending = s.mu_sq != 0.0;
        if bending {
            for m in 0..=s.ny {
                for l in 0..=s.nx {
                    scratch[m * stride + l] = s.lap(cur, l, m);
                }
            }
        }

        let mut healthy = true;
        for m in 1..s.ny {
            for l in 1..s.nx {
                let i = m * stride + l;
                let (lap_cur, bilap) = if bending {
                    let c = scratch[i];
                    let b = scratch[i + 1] + scratch[i - 1] + scratch[i + stride]
                        + scratch[i - stride]
                        - 4.0 * c;
                    (c, b)
                } else {
                    (s.lap(cur, l, m), 0.0)
                };
                let lap_prev = if s.s1 != 0.0 { s.lap(prev, l, m) } else { 0.0 };
                let v = s.combine(cur[i], prev[i], lap_cur, lap_prev, bilap, forces[i]);
                next[i] = v;
                healthy &= v.abs() < DIVERGENCE_LIMIT;
            }
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
        self.lap_scratch.fill(0.0);
    }

    fn energy(&self) -> f64 {
        let s = &self.stencil;
        let (cur, prev) = (self.states.current(), self.states.previous());
        let (h, k, stride) = (self.spacing, self.k, s.stride());

        let mut kinetic = 0.0;
        let mut stretch = 0.0;
        let mut bending = 0.0;
        for m in 0..=s.ny {
            for l in 0..=s.nx {
                let i = m * stride + l;
                let v = (cur[i] - prev[i]) / k;
                kinetic += v * v;
                if l < s.nx {
                    stretch += (cur[i + 1] - cur[i]) * (prev[i + 1] - prev[i]);
                }
                if m < s.ny {
                    stretch += (cur[i + stride] - cur[i]) * (prev[i + stride] - prev[i]);
                }
                if self.physics.rigidity != 0.0 {
                    let on_edge = l == 0 || m == 0 || l == s.nx || m == s.ny;
                    let w = if on_edge { 0.5 } else { 1.0 };
                    bending += w * s.lap(cur, l, m) * s.lap(prev, l, m);
                }
            }
        }

        0.5 * self.physics.areal_density * h * h * kinetic
            + 0.5 * self.physics.tension * stretch
            + 0.5 * self.physics.rigidity * bending / (h * h)
    }
}
