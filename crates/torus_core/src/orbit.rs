use crate::error::{DynamicsError, Result};
use crate::solvers::{Dopri5, OdeOptions, RK4};
use crate::traits::{DynamicalSystem, Potential, Steppable};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A point in galactocentric cylindrical phase space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpace {
    /// Galactocentric radius.
    pub r: f64,
    /// Radial velocity (outward positive).
    pub vr: f64,
    /// Azimuthal (tangential) velocity.
    pub vt: f64,
    /// Height above the plane.
    pub z: f64,
    /// Vertical velocity.
    pub vz: f64,
    /// Azimuth.
    pub phi: f64,
}

impl PhaseSpace {
    /// A point in the plane (z = vz = phi = 0).
    pub fn planar(r: f64, vr: f64, vt: f64) -> Self {
        Self {
            r,
            vr,
            vt,
            z: 0.0,
            vz: 0.0,
            phi: 0.0,
        }
    }

    /// Rectangular-frame view (x, y, z, vx, vy, vz).
    pub fn to_rectangular(&self) -> [f64; 6] {
        let (s, c) = self.phi.sin_cos();
        [
            self.r * c,
            self.r * s,
            self.z,
            self.vr * c - self.vt * s,
            self.vr * s + self.vt * c,
            self.vz,
        ]
    }

    fn is_finite(&self) -> bool {
        self.r.is_finite()
            && self.vr.is_finite()
            && self.vt.is_finite()
            && self.z.is_finite()
            && self.vz.is_finite()
            && self.phi.is_finite()
    }
}

/// Equations of motion in cylindrical coordinates.
///
/// The internal ODE state is (R, vR, phi, dphi/dt, z, vz): angular momentum
/// propagates more naturally through the angular rate than through the
/// tangential velocity. No special handling exists for R -> 0.
struct CylindricalEom<'a, P: Potential + ?Sized> {
    pot: &'a P,
}

impl<P: Potential + ?Sized> DynamicalSystem<f64> for CylindricalEom<'_, P> {
    fn dimension(&self) -> usize {
        6
    }

    fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) {
        let (r, vr, phi, vphi, z, vz) = (y[0], y[1], y[2], y[3], y[4], y[5]);
        let l = r * r * vphi;
        out[0] = vr;
        out[1] = l * l / (r * r * r) + self.pot.r_force(r, z, phi);
        out[2] = vphi;
        out[3] = (self.pot.phi_force(r, z, phi) - 2.0 * r * vr * vphi) / (r * r);
        out[4] = vz;
        out[5] = self.pot.z_force(r, z, phi);
    }
}

/// Integration method for `FullOrbit::integrate`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OdeMethod {
    /// Fixed-step RK4 with the given number of substeps per output interval.
    Rk4 { substeps: usize },
    /// Adaptive Dormand-Prince 5(4).
    Dopri5(OdeOptions),
}

impl Default for OdeMethod {
    fn default() -> Self {
        OdeMethod::Dopri5(OdeOptions::default())
    }
}

/// An integrated orbit: one phase-space sample per requested time, stored
/// as a row of (R, vR, vT, z, vz, phi). Read-only after integration.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Vec<f64>,
    states: DMatrix<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn time(&self, index: usize) -> f64 {
        self.times[index]
    }

    /// The full sample table, one row per time.
    pub fn states(&self) -> &DMatrix<f64> {
        &self.states
    }

    pub fn state(&self, index: usize) -> PhaseSpace {
        PhaseSpace {
            r: self.states[(index, 0)],
            vr: self.states[(index, 1)],
            vt: self.states[(index, 2)],
            z: self.states[(index, 3)],
            vz: self.states[(index, 4)],
            phi: self.states[(index, 5)],
        }
    }

    /// Total energy E(t) = Phi(R, z) + (vR^2 + vT^2 + vz^2)/2 per sample.
    pub fn energy<P: Potential + ?Sized>(&self, pot: &P) -> Vec<f64> {
        (0..self.len())
            .map(|i| {
                let s = self.state(i);
                pot.value(s.r, s.z) + (s.vr * s.vr + s.vt * s.vt + s.vz * s.vz) / 2.0
            })
            .collect()
    }

    /// Vertical energy E_z(t) = Phi(R, z) - Phi(R, 0) + vz^2/2 per sample.
    pub fn vertical_energy<P: Potential + ?Sized>(&self, pot: &P) -> Vec<f64> {
        (0..self.len())
            .map(|i| {
                let s = self.state(i);
                pot.value(s.r, s.z) - pot.value(s.r, 0.0) + s.vz * s.vz / 2.0
            })
            .collect()
    }
}

/// A particle orbit in a full 3D potential.
#[derive(Debug)]
pub struct FullOrbit {
    init: PhaseSpace,
    trajectory: Option<Trajectory>,
}

impl FullOrbit {
    pub fn new(init: PhaseSpace) -> Result<Self> {
        if !init.is_finite() {
            return Err(DynamicsError::Config(format!(
                "initial condition must be finite, got {init:?}"
            )));
        }
        if init.r <= 0.0 {
            return Err(DynamicsError::Config(format!(
                "galactocentric radius must be positive, got {}",
                init.r
            )));
        }
        Ok(Self {
            init,
            trajectory: None,
        })
    }

    pub fn initial(&self) -> PhaseSpace {
        self.init
    }

    /// The integrated trajectory, if `integrate` has been called.
    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.trajectory.as_ref()
    }

    /// Integrates the orbit through `pot`, sampling at `times`.
    ///
    /// The time grid must be strictly increasing and start at exactly 0,
    /// which doubles as the initial sample.
    pub fn integrate<P: Potential + ?Sized>(
        &mut self,
        times: &[f64],
        pot: &P,
        method: OdeMethod,
    ) -> Result<&Trajectory> {
        if times.is_empty() {
            return Err(DynamicsError::Config(
                "time grid must not be empty".to_string(),
            ));
        }
        if times[0] != 0.0 {
            return Err(DynamicsError::Config(format!(
                "time grid must start at 0, got {}",
                times[0]
            )));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(DynamicsError::Config(
                "time grid must be finite".to_string(),
            ));
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DynamicsError::Config(
                "time grid must be strictly increasing".to_string(),
            ));
        }

        let system = CylindricalEom { pot };
        let mut y = [
            self.init.r,
            self.init.vr,
            self.init.phi,
            self.init.vt / self.init.r,
            self.init.z,
            self.init.vz,
        ];
        let mut states = DMatrix::zeros(times.len(), 6);
        write_sample(&mut states, 0, &y);

        match method {
            OdeMethod::Rk4 { substeps } => {
                if substeps == 0 {
                    return Err(DynamicsError::Config(
                        "RK4 substep count must be at least 1".to_string(),
                    ));
                }
                let mut stepper = RK4::new(6);
                let mut t = 0.0;
                for k in 1..times.len() {
                    let dt = (times[k] - times[k - 1]) / substeps as f64;
                    for _ in 0..substeps {
                        stepper.step(&system, &mut t, &mut y, dt);
                    }
                    write_sample(&mut states, k, &y);
                }
            }
            OdeMethod::Dopri5(opts) => {
                let mut stepper = Dopri5::new(6);
                let mut t = 0.0;
                for k in 1..times.len() {
                    stepper.advance(&system, &mut t, &mut y, times[k], &opts)?;
                    write_sample(&mut states, k, &y);
                }
            }
        }

        Ok(self.trajectory.insert(Trajectory {
            times: times.to_vec(),
            states,
        }))
    }
}

/// Reorders the internal ODE state (R, vR, phi, dphi/dt, z, vz) back into
/// an output row (R, vR, vT = R * dphi/dt, z, vz, phi).
fn write_sample(states: &mut DMatrix<f64>, row: usize, y: &[f64; 6]) {
    states[(row, 0)] = y[0];
    states[(row, 1)] = y[1];
    states[(row, 2)] = y[0] * y[3];
    states[(row, 3)] = y[4];
    states[(row, 4)] = y[5];
    states[(row, 5)] = y[2];
}
