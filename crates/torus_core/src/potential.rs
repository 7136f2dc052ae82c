use crate::error::{DynamicsError, Result};
use crate::traits::Potential;
use serde::{Deserialize, Serialize};

/// Spherical potential generated by a power-law density profile,
/// rho(r) = amp / r^alpha.
///
/// For alpha = 2 this is the logarithmic potential of a flat rotation
/// curve: Phi(r) = amp * ln(r), with v_c(r) = sqrt(amp) at every radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSphericalPotential {
    amp: f64,
    alpha: f64,
}

impl PowerSphericalPotential {
    /// Creates a power-law potential with the given amplitude and inner
    /// power. `amp` must be finite and positive; `alpha` finite.
    pub fn new(amp: f64, alpha: f64) -> Result<Self> {
        if !amp.is_finite() || amp <= 0.0 {
            return Err(DynamicsError::Config(format!(
                "potential amplitude must be finite and positive, got {amp}"
            )));
        }
        if !alpha.is_finite() {
            return Err(DynamicsError::Config(format!(
                "power-law index must be finite, got {alpha}"
            )));
        }
        Ok(Self { amp, alpha })
    }

    /// The logarithmic potential, normalized so that v_c(1) = 1.
    pub fn logarithmic() -> Self {
        Self {
            amp: 1.0,
            alpha: 2.0,
        }
    }

    pub fn amp(&self) -> f64 {
        self.amp
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Potential for PowerSphericalPotential {
    fn value(&self, r: f64, z: f64) -> f64 {
        let r2 = r * r + z * z;
        if self.alpha == 2.0 {
            self.amp * r2.ln() / 2.0
        } else {
            self.amp * r2.powf(1.0 - self.alpha / 2.0) / (2.0 - self.alpha)
        }
    }

    fn r_force(&self, r: f64, z: f64, _phi: f64) -> f64 {
        let r2 = r * r + z * z;
        -self.amp * r / r2.powf(self.alpha / 2.0)
    }

    fn z_force(&self, r: f64, z: f64, _phi: f64) -> f64 {
        let r2 = r * r + z * z;
        -self.amp * z / r2.powf(self.alpha / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::PowerSphericalPotential;
    use crate::traits::Potential;

    #[test]
    fn rejects_bad_parameters() {
        assert!(PowerSphericalPotential::new(0.0, 2.0).is_err());
        assert!(PowerSphericalPotential::new(-1.0, 2.0).is_err());
        assert!(PowerSphericalPotential::new(1.0, f64::NAN).is_err());
    }

    #[test]
    fn logarithmic_potential_has_unit_circular_speed() {
        let pot = PowerSphericalPotential::logarithmic();
        assert_eq!(pot.value(1.0, 0.0), 0.0);
        assert_eq!(pot.r_force(1.0, 0.0, 0.0), -1.0);
        assert!((pot.circular_velocity(1.0) - 1.0).abs() < 1e-15);
        assert!((pot.circular_velocity(3.7) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn forces_match_potential_gradient() {
        for &alpha in &[1.0, 2.0, 2.5] {
            let pot = PowerSphericalPotential::new(1.3, alpha).unwrap();
            let h = 1e-6;
            for &(r, z) in &[(1.0, 0.0), (0.7, 0.3), (2.5, -1.1)] {
                let fr = -(pot.value(r + h, z) - pot.value(r - h, z)) / (2.0 * h);
                let fz = -(pot.value(r, z + h) - pot.value(r, z - h)) / (2.0 * h);
                assert!(
                    (pot.r_force(r, z, 0.0) - fr).abs() < 1e-6,
                    "radial force mismatch at alpha={alpha}, (R,z)=({r},{z})"
                );
                assert!(
                    (pot.z_force(r, z, 0.0) - fz).abs() < 1e-6,
                    "vertical force mismatch at alpha={alpha}, (R,z)=({r},{z})"
                );
            }
        }
    }

    #[test]
    fn composite_potentials_sum_elementwise() {
        let a = PowerSphericalPotential::new(1.0, 2.0).unwrap();
        let b = PowerSphericalPotential::new(0.5, 1.0).unwrap();
        let both = vec![a, b];
        let (r, z) = (1.4, 0.2);
        assert!((both.value(r, z) - (a.value(r, z) + b.value(r, z))).abs() < 1e-15);
        assert!(
            (both.r_force(r, z, 0.0) - (a.r_force(r, z, 0.0) + b.r_force(r, z, 0.0))).abs()
                < 1e-15
        );
        assert!(
            (both.z_force(r, z, 0.0) - (a.z_force(r, z, 0.0) + b.z_force(r, z, 0.0))).abs()
                < 1e-15
        );
        assert_eq!(both.phi_force(r, z, 0.5), 0.0);
    }

    #[test]
    fn boxed_trait_objects_compose() {
        let pots: Vec<Box<dyn Potential>> = vec![
            Box::new(PowerSphericalPotential::logarithmic()),
            Box::new(PowerSphericalPotential::new(2.0, 1.5).unwrap()),
        ];
        let single = PowerSphericalPotential::logarithmic().value(2.0, 0.0)
            + PowerSphericalPotential::new(2.0, 1.5).unwrap().value(2.0, 0.0);
        assert!((pots.value(2.0, 0.0) - single).abs() < 1e-15);
    }
}
