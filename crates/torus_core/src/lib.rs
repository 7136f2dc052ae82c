//! The `torus_core` crate computes conserved dynamical quantities for test
//! particles in axisymmetric gravitational potentials and integrates full
//! 3D orbits.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `Potential`
//!   (potential/force evaluation seam), `DynamicalSystem`/`Steppable`
//!   (ODE right-hand sides and steppers).
//! - **Action-angle calculator**: turning points, radial action, periods,
//!   and angle variables, memoized per phase-space point.
//! - **Quadrature**: adaptive Gauss-Kronrod integration with error
//!   estimates, used on the singularity-cancelling transformed integrands.
//! - **Orbit**: adaptive (Dormand-Prince) and fixed-step (RK4) integration
//!   of the cylindrical equations of motion.
//!
//! Everything is synchronous and single-threaded per instance; potentials
//! are read-only during evaluation and safe to share.

pub mod actionangle;
pub mod error;
pub mod orbit;
pub mod potential;
pub mod quadrature;
pub mod roots;
pub mod solvers;
pub mod traits;
