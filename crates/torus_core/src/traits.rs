use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the ODE steppers.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A gravitational potential evaluated in cylindrical coordinates.
///
/// Evaluation is read-only and side-effect free, so a potential may be
/// shared across any number of calculators and orbits.
pub trait Potential {
    /// Potential value Phi(R, z).
    fn value(&self, r: f64, z: f64) -> f64;

    /// Radial force F_R(R, z, phi). Attractive potentials return negative
    /// values for positive R.
    fn r_force(&self, r: f64, z: f64, phi: f64) -> f64;

    /// Vertical force F_z(R, z, phi).
    fn z_force(&self, r: f64, z: f64, phi: f64) -> f64;

    /// Azimuthal force F_phi(R, z, phi). Zero for axisymmetric models.
    fn phi_force(&self, _r: f64, _z: f64, _phi: f64) -> f64 {
        0.0
    }

    /// Circular speed at radius R in the plane, v_c^2 = -R * F_R(R, 0).
    fn circular_velocity(&self, r: f64) -> f64 {
        (-r * self.r_force(r, 0.0, 0.0)).sqrt()
    }
}

impl<P: Potential + ?Sized> Potential for &P {
    fn value(&self, r: f64, z: f64) -> f64 {
        (**self).value(r, z)
    }

    fn r_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).r_force(r, z, phi)
    }

    fn z_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).z_force(r, z, phi)
    }

    fn phi_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).phi_force(r, z, phi)
    }
}

impl<P: Potential + ?Sized> Potential for Box<P> {
    fn value(&self, r: f64, z: f64) -> f64 {
        (**self).value(r, z)
    }

    fn r_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).r_force(r, z, phi)
    }

    fn z_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).z_force(r, z, phi)
    }

    fn phi_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        (**self).phi_force(r, z, phi)
    }
}

/// An ordered collection of potentials evaluates as the elementwise sum of
/// its members' contributions.
impl<P: Potential> Potential for [P] {
    fn value(&self, r: f64, z: f64) -> f64 {
        self.iter().map(|p| p.value(r, z)).sum()
    }

    fn r_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.iter().map(|p| p.r_force(r, z, phi)).sum()
    }

    fn z_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.iter().map(|p| p.z_force(r, z, phi)).sum()
    }

    fn phi_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.iter().map(|p| p.phi_force(r, z, phi)).sum()
    }
}

impl<P: Potential> Potential for Vec<P> {
    fn value(&self, r: f64, z: f64) -> f64 {
        self.as_slice().value(r, z)
    }

    fn r_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.as_slice().r_force(r, z, phi)
    }

    fn z_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.as_slice().z_force(r, z, phi)
    }

    fn phi_force(&self, r: f64, z: f64, phi: f64) -> f64 {
        self.as_slice().phi_force(r, z, phi)
    }
}

/// Represents a first-order ODE system dy/dt = f(t, y).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the right-hand side.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for steppers that can advance a system by a fixed step.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
