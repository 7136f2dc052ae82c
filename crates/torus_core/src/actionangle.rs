use crate::error::{DynamicsError, Result};
use crate::quadrature::{adaptive_quadrature, Quad, QuadratureOptions};
use crate::roots::{brentq, newton, RootSettings};
use crate::traits::Potential;
use std::f64::consts::PI;

/// Halvings/doublings allowed when hunting for a turning-point bracket.
/// Covers a dynamic range of 2^64 in radius; an orbit whose turning point
/// lies beyond that is reported as a numerical failure instead of hanging.
const BRACKET_MAX_ITER: usize = 64;

/// Which turning point a bracket search is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketSide {
    Pericenter,
    Apocenter,
}

/// Energy and angular momentum of a planar phase-space point,
/// E = Phi(R, 0) + vR^2/2 + vT^2/2 and L = R * vT.
pub fn calc_el<P: Potential + ?Sized>(r: f64, vr: f64, vt: f64, pot: &P) -> (f64, f64) {
    (
        pot.value(r, 0.0) + vr * vr / 2.0 + vt * vt / 2.0,
        r * vt,
    )
}

/// The vR = 0 equation whose roots are the turning points:
/// E - Phi(r) - L^2 / 2r^2.
pub fn effective_equation<P: Potential + ?Sized>(r: f64, e: f64, l: f64, pot: &P) -> f64 {
    e - pot.value(r, 0.0) - l * l / (2.0 * r * r)
}

/// Closed-form radial derivative of the turning-point equation,
/// F_R(r) + L^2 / r^3.
pub fn effective_equation_deriv<P: Potential + ?Sized>(r: f64, l: f64, pot: &P) -> f64 {
    pot.r_force(r, 0.0, 0.0) + l * l / (r * r * r)
}

/// Radial momentum p(r) = sqrt(2(E - Phi(r)) - L^2/r^2).
///
/// The argument is clamped at zero: round-off at the exact turning points
/// can push it slightly negative, where the true value is zero.
pub fn radial_momentum<P: Potential + ?Sized>(r: f64, e: f64, l: f64, pot: &P) -> f64 {
    (2.0 * (e - pot.value(r, 0.0)) - l * l / (r * r)).max(0.0).sqrt()
}

/// Finds a radius bracketing the requested turning point by exponential
/// contraction (pericenter side, starting from R/2) or expansion (apocenter
/// side, starting from 2R) until the turning-point equation becomes
/// non-positive.
pub fn find_bracket<P: Potential + ?Sized>(
    r: f64,
    e: f64,
    l: f64,
    pot: &P,
    side: BracketSide,
    max_iter: usize,
) -> Result<f64> {
    let mut rtry = match side {
        BracketSide::Pericenter => r / 2.0,
        BracketSide::Apocenter => 2.0 * r,
    };
    for _ in 0..max_iter {
        if effective_equation(rtry, e, l, pot) <= 0.0 {
            return Ok(rtry);
        }
        rtry = match side {
            BracketSide::Pericenter => rtry / 2.0,
            BracketSide::Apocenter => rtry * 2.0,
        };
    }
    Err(DynamicsError::Numerical(format!(
        "no sign change found for the {side:?} bracket within {max_iter} iterations \
         (last radius {rtry}); the orbit may be unbound"
    )))
}

/// Action-angle calculator for a planar phase-space point in an
/// axisymmetric potential.
///
/// The phase-space point (R, vR, vT) is immutable after construction and
/// every derived quantity is memoized on first computation; build a new
/// calculator for a different point. Taking `&mut self` in the accessors
/// makes a concurrent first computation unrepresentable.
#[derive(Debug)]
pub struct ActionAngleAxi<'a, P: Potential + ?Sized> {
    r: f64,
    vr: f64,
    vt: f64,
    pot: &'a P,
    quad_opts: QuadratureOptions,
    root_settings: RootSettings,
    el: Option<(f64, f64)>,
    turning: Option<(f64, f64)>,
    jr: Option<Quad>,
    tr: Option<Quad>,
    tphi: Option<Quad>,
    ratio: Option<Quad>,
    angle_r: Option<Quad>,
}

impl<'a, P: Potential + ?Sized> ActionAngleAxi<'a, P> {
    /// Builds a calculator with default quadrature tolerances.
    pub fn new(r: f64, vr: f64, vt: f64, pot: &'a P) -> Result<Self> {
        Self::with_options(r, vr, vt, pot, QuadratureOptions::default())
    }

    /// Builds a calculator with explicit quadrature tolerances. The options
    /// are fixed for the lifetime of the calculator, so cached quantities
    /// are always consistent with them.
    pub fn with_options(
        r: f64,
        vr: f64,
        vt: f64,
        pot: &'a P,
        quad_opts: QuadratureOptions,
    ) -> Result<Self> {
        if !r.is_finite() || !vr.is_finite() || !vt.is_finite() {
            return Err(DynamicsError::Config(format!(
                "phase-space point must be finite, got (R, vR, vT) = ({r}, {vr}, {vt})"
            )));
        }
        if r <= 0.0 {
            return Err(DynamicsError::Config(format!(
                "galactocentric radius must be positive, got {r}"
            )));
        }
        Ok(Self {
            r,
            vr,
            vt,
            pot,
            quad_opts,
            root_settings: RootSettings::default(),
            el: None,
            turning: None,
            jr: None,
            tr: None,
            tphi: None,
            ratio: None,
            angle_r: None,
        })
    }

    /// Energy and angular momentum (E, L). Cached.
    pub fn calc_el(&mut self) -> (f64, f64) {
        if let Some(el) = self.el {
            return el;
        }
        let el = calc_el(self.r, self.vr, self.vt, self.pot);
        self.el = Some(el);
        el
    }

    /// Pericenter and apocenter radii (r_peri, r_apo). Cached.
    ///
    /// A point with vR = 0 is dispatched on its tangential speed against the
    /// local circular speed: equal means a circular orbit (both turning
    /// points are R), faster means R is the pericenter, slower means R is
    /// the apocenter. Otherwise both roots are bracketed and solved.
    pub fn calc_rap_rperi(&mut self) -> Result<(f64, f64)> {
        if let Some(tp) = self.turning {
            return Ok(tp);
        }
        if self.vt == 0.0 {
            return Err(DynamicsError::Unsupported(
                "purely radial orbits (vT = 0) have no pericenter to solve for".to_string(),
            ));
        }
        let (e, l) = self.calc_el();
        let pot = self.pot;
        let r = self.r;
        let vc = pot.circular_velocity(r);
        let settings = self.root_settings;

        let tp = if self.vr == 0.0 && self.vt == vc {
            (r, r)
        } else if self.vr == 0.0 && self.vt > vc {
            let rend = find_bracket(r, e, l, pot, BracketSide::Apocenter, BRACKET_MAX_ITER)?;
            let rap = newton(
                |x| effective_equation(x, e, l, pot),
                |x| effective_equation_deriv(x, l, pot),
                rend,
                settings,
            )?;
            (r, rap)
        } else if self.vr == 0.0 && self.vt < vc {
            let rstart = find_bracket(r, e, l, pot, BracketSide::Pericenter, BRACKET_MAX_ITER)?;
            let rperi = newton(
                |x| effective_equation(x, e, l, pot),
                |x| effective_equation_deriv(x, l, pot),
                rstart,
                settings,
            )?;
            (rperi, r)
        } else {
            let rstart = find_bracket(r, e, l, pot, BracketSide::Pericenter, BRACKET_MAX_ITER)?;
            let rperi = brentq(|x| effective_equation(x, e, l, pot), rstart, r, settings)?;
            let rend = find_bracket(r, e, l, pot, BracketSide::Apocenter, BRACKET_MAX_ITER)?;
            let rap = brentq(|x| effective_equation(x, e, l, pot), r, rend, settings)?;
            (rperi, rap)
        };

        self.turning = Some(tp);
        Ok(tp)
    }

    /// Azimuthal action J_phi = R * vT. Exact, no quadrature.
    pub fn jphi(&self) -> Quad {
        Quad {
            value: self.r * self.vt,
            error: 0.0,
        }
    }

    /// Radial action, 2 * integral of the radial momentum between the
    /// turning points. Cached.
    pub fn jr(&mut self) -> Result<Quad> {
        if let Some(q) = self.jr {
            return Ok(q);
        }
        let (e, l) = self.calc_el();
        let (rperi, rap) = self.calc_rap_rperi()?;
        let pot = self.pot;
        let q = adaptive_quadrature(
            |x| radial_momentum(x, e, l, pot),
            rperi,
            rap,
            &self.quad_opts,
        )?;
        let q = Quad {
            value: 2.0 * q.value,
            error: 2.0 * q.error,
        };
        self.jr = Some(q);
        Ok(q)
    }

    /// Radial period T_R. Cached.
    ///
    /// The 1/p(r) integrand diverges like an inverse square root at each
    /// turning point; substituting r = r_peri + t^2 on the inner half and
    /// r = r_apo - t^2 on the outer half multiplies it by 2t and cancels
    /// the divergence. The halves meet at the geometric-mean radius.
    ///
    /// An exactly circular orbit has no radial excursion to integrate over;
    /// its period comes from the epicyclic frequency instead.
    pub fn tr(&mut self) -> Result<Quad> {
        if let Some(q) = self.tr {
            return Ok(q);
        }
        let (e, l) = self.calc_el();
        let (rperi, rap) = self.calc_rap_rperi()?;
        let pot = self.pot;

        let q = if rperi == rap {
            let kappa_sq = epicyclic_frequency_squared(self.r, l, pot);
            if kappa_sq <= 0.0 {
                return Err(DynamicsError::Numerical(format!(
                    "epicyclic frequency is not real (kappa^2 = {kappa_sq}); \
                     the circular orbit at R = {} is unstable",
                    self.r
                )));
            }
            Quad {
                value: 2.0 * PI / kappa_sq.sqrt(),
                error: 0.0,
            }
        } else {
            let rmean = (rperi * rap).sqrt();
            let mut total = Quad::ZERO;
            if rmean > rperi {
                let inner = adaptive_quadrature(
                    |t| {
                        let x = rperi + t * t;
                        2.0 * t / radial_momentum(x, e, l, pot)
                    },
                    0.0,
                    (rmean - rperi).sqrt(),
                    &self.quad_opts,
                )?;
                total.value += inner.value;
                total.error += inner.error;
            }
            if rmean < rap {
                let outer = adaptive_quadrature(
                    |t| {
                        let x = rap - t * t;
                        2.0 * t / radial_momentum(x, e, l, pot)
                    },
                    0.0,
                    (rap - rmean).sqrt(),
                    &self.quad_opts,
                )?;
                total.value += outer.value;
                total.error += outer.error;
            }
            Quad {
                value: 2.0 * total.value,
                error: 2.0 * total.error,
            }
        };

        self.tr = Some(q);
        Ok(q)
    }

    /// The ratio I between the radial and azimuthal motions,
    /// L * integral of 1/(r^2 p(r)) over the same transformed halves as
    /// `tr`. Cached.
    pub fn i(&mut self) -> Result<Quad> {
        if let Some(q) = self.ratio {
            return Ok(q);
        }
        let (rperi, rap) = self.calc_rap_rperi()?;

        let q = if rperi == rap {
            // Both factors are closed-form or epicyclic here, so the order
            // of the calls cannot recurse back into i().
            let tr = self.tr()?;
            let tphi = self.tphi()?;
            Quad {
                value: tr.value / tphi.value,
                error: 0.0,
            }
        } else {
            let (e, l) = self.calc_el();
            let pot = self.pot;
            let rmean = (rperi * rap).sqrt();
            let mut total = Quad::ZERO;
            if rmean > rperi {
                let inner = adaptive_quadrature(
                    |t| {
                        let x = rperi + t * t;
                        2.0 * t / radial_momentum(x, e, l, pot) / (x * x)
                    },
                    0.0,
                    (rmean - rperi).sqrt(),
                    &self.quad_opts,
                )?;
                total.value += inner.value;
                total.error += inner.error;
            }
            if rmean < rap {
                let outer = adaptive_quadrature(
                    |t| {
                        let x = rap - t * t;
                        2.0 * t / radial_momentum(x, e, l, pot) / (x * x)
                    },
                    0.0,
                    (rap - rmean).sqrt(),
                    &self.quad_opts,
                )?;
                total.value += outer.value;
                total.error += outer.error;
            }
            let l_scale = self.r * self.vt;
            Quad {
                value: total.value * l_scale,
                error: total.error * l_scale.abs(),
            }
        };

        self.ratio = Some(q);
        Ok(q)
    }

    /// Azimuthal period T_phi. Cached.
    ///
    /// Exactly 2*pi*R/vT for a circular orbit; otherwise pi*T_R/I with the
    /// relative errors of T_R and I combined in quadrature.
    pub fn tphi(&mut self) -> Result<Quad> {
        if let Some(q) = self.tphi {
            return Ok(q);
        }
        let (rperi, rap) = self.calc_rap_rperi()?;

        let q = if rperi == rap {
            Quad {
                value: 2.0 * PI * self.r / self.vt,
                error: 0.0,
            }
        } else {
            let tr = self.tr()?;
            let ratio = self.i()?;
            let value = tr.value / ratio.value * PI;
            let error = value.abs()
                * ((ratio.error / ratio.value).powi(2) + (tr.error / tr.value).powi(2)).sqrt();
            Quad { value, error }
        };

        self.tphi = Some(q);
        Ok(q)
    }

    /// Radial angle w_R in [0, 2*pi). Cached.
    ///
    /// The angle is measured from pericenter: exactly pi at pericenter,
    /// exactly 0 at apocenter, and in between it maps the transformed
    /// quadrature through whichever turning point anchors the current
    /// radius. An inward-moving point (vR < 0) sits half a cycle away from
    /// the outward-moving point at the same radius.
    pub fn angle_r(&mut self) -> Result<Quad> {
        if let Some(q) = self.angle_r {
            return Ok(q);
        }
        let (rperi, rap) = self.calc_rap_rperi()?;
        if rperi == rap {
            let q = Quad::ZERO;
            self.angle_r = Some(q);
            return Ok(q);
        }

        let tr = self.tr()?.value;
        let (e, l) = self.calc_el();
        let pot = self.pot;
        let r = self.r;
        let rmean = (rperi * rap).sqrt();

        let mut w = if r < rmean {
            if r > rperi {
                let q = adaptive_quadrature(
                    |t| {
                        let x = rperi + t * t;
                        2.0 * t / radial_momentum(x, e, l, pot)
                    },
                    0.0,
                    (r - rperi).sqrt(),
                    &self.quad_opts,
                )?;
                Quad {
                    value: 2.0 * PI / tr * q.value + PI,
                    error: 2.0 * PI / tr * q.error,
                }
            } else {
                Quad {
                    value: PI,
                    error: 0.0,
                }
            }
        } else if r < rap {
            let q = adaptive_quadrature(
                |t| {
                    let x = rap - t * t;
                    2.0 * t / radial_momentum(x, e, l, pot)
                },
                0.0,
                (rap - r).sqrt(),
                &self.quad_opts,
            )?;
            Quad {
                value: -2.0 * PI / tr * q.value,
                error: 2.0 * PI / tr * q.error,
            }
        } else {
            Quad::ZERO
        };

        if self.vr < 0.0 {
            w.value += PI;
        }
        w.value = w.value.rem_euclid(2.0 * PI);

        self.angle_r = Some(w);
        Ok(w)
    }
}

/// Squared epicyclic frequency about a circular orbit at radius R,
/// kappa^2 = -dF_R/dR + 3 L^2 / R^4, with a central finite difference for
/// the force derivative.
fn epicyclic_frequency_squared<P: Potential + ?Sized>(r: f64, l: f64, pot: &P) -> f64 {
    let h = 1e-5 * r;
    let dfr = (pot.r_force(r + h, 0.0, 0.0) - pot.r_force(r - h, 0.0, 0.0)) / (2.0 * h);
    -dfr + 3.0 * l * l / (r * r * r * r)
}

#[cfg(test)]
mod tests {
    use super::{
        calc_el, effective_equation, find_bracket, ActionAngleAxi, BracketSide,
        BRACKET_MAX_ITER,
    };
    use crate::error::DynamicsError;
    use crate::potential::PowerSphericalPotential;
    use std::f64::consts::PI;

    fn log_potential() -> PowerSphericalPotential {
        PowerSphericalPotential::logarithmic()
    }

    #[test]
    fn rejects_non_finite_and_non_positive_input() {
        let pot = log_potential();
        assert!(matches!(
            ActionAngleAxi::new(f64::NAN, 0.0, 1.0, &pot).unwrap_err(),
            DynamicsError::Config(_)
        ));
        assert!(matches!(
            ActionAngleAxi::new(-1.0, 0.0, 1.0, &pot).unwrap_err(),
            DynamicsError::Config(_)
        ));
    }

    #[test]
    fn energy_and_momentum_of_the_reference_point() {
        let pot = log_potential();
        let (e, l) = calc_el(1.0, 0.1, 1.1, &pot);
        assert_eq!(l, 1.1);
        // Phi(1, 0) = 0 for the logarithmic potential.
        assert!((e - (0.01 + 1.21) / 2.0).abs() < 1e-15);
    }

    #[test]
    fn circular_orbit_turning_points_collapse_to_r() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.0, 1.0, &pot).unwrap();
        let (rperi, rap) = aa.calc_rap_rperi().unwrap();
        assert_eq!(rperi, 1.0);
        assert_eq!(rap, 1.0);
    }

    #[test]
    fn circular_orbit_invariants() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.0, 1.0, &pot).unwrap();
        assert_eq!(aa.jphi().value, 1.0);
        assert_eq!(aa.jr().unwrap().value, 0.0);
        assert!((aa.tphi().unwrap().value - 2.0 * PI).abs() < 1e-15);
        assert_eq!(aa.angle_r().unwrap().value, 0.0);
        // Flat rotation curve: kappa = sqrt(2) * Omega, so T_R = pi*sqrt(2).
        assert!((aa.tr().unwrap().value - PI * 2.0_f64.sqrt()).abs() < 1e-6);
        assert!((aa.i().unwrap().value - 1.0 / 2.0_f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn eccentric_orbit_brackets_the_current_radius() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.1, 1.1, &pot).unwrap();
        let (e, l) = aa.calc_el();
        let (rperi, rap) = aa.calc_rap_rperi().unwrap();
        assert!(rperi < 1.0 && 1.0 < rap, "({rperi}, {rap})");
        assert!(effective_equation(rperi, e, l, &pot).abs() < 1e-8);
        assert!(effective_equation(rap, e, l, &pot).abs() < 1e-8);
    }

    #[test]
    fn eccentric_orbit_actions_and_periods_are_positive() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.1, 1.1, &pot).unwrap();
        let jr = aa.jr().unwrap();
        assert!(jr.value > 0.0 && jr.value < 1.0, "JR = {}", jr.value);
        let tr = aa.tr().unwrap();
        assert!(tr.value > 0.0);
        let tphi = aa.tphi().unwrap();
        // Close to the circular azimuthal period for a mildly eccentric
        // orbit in the flat-rotation-curve potential.
        assert!(tphi.value > 4.0 && tphi.value < 9.0, "Tphi = {}", tphi.value);
        assert!(tphi.error < 1e-4);
        let w = aa.angle_r().unwrap().value;
        assert!((0.0..2.0 * PI).contains(&w));
    }

    #[test]
    fn point_at_pericenter_keeps_r_as_inner_turning_point() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.0, 1.2, &pot).unwrap();
        let (e, l) = aa.calc_el();
        let (rperi, rap) = aa.calc_rap_rperi().unwrap();
        assert_eq!(rperi, 1.0);
        assert!(rap > 1.0);
        assert!(effective_equation(rap, e, l, &pot).abs() < 1e-8);
        assert_eq!(aa.angle_r().unwrap().value, PI);
    }

    #[test]
    fn point_at_apocenter_keeps_r_as_outer_turning_point() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.0, 0.8, &pot).unwrap();
        let (rperi, rap) = aa.calc_rap_rperi().unwrap();
        assert!(rperi < 1.0);
        assert_eq!(rap, 1.0);
        assert_eq!(aa.angle_r().unwrap().value, 0.0);
    }

    #[test]
    fn inward_motion_shifts_the_radial_angle_by_half_a_cycle() {
        let pot = log_potential();
        let mut outward = ActionAngleAxi::new(1.0, 0.1, 1.1, &pot).unwrap();
        let mut inward = ActionAngleAxi::new(1.0, -0.1, 1.1, &pot).unwrap();
        let w_out = outward.angle_r().unwrap().value;
        let w_in = inward.angle_r().unwrap().value;
        assert!((w_in - (w_out + PI).rem_euclid(2.0 * PI)).abs() < 1e-8);
    }

    #[test]
    fn bracket_search_finds_non_positive_equation_value() {
        let pot = log_potential();
        let (e, l) = calc_el(1.0, 0.1, 1.1, &pot);
        let inner =
            find_bracket(1.0, e, l, &pot, BracketSide::Pericenter, BRACKET_MAX_ITER).unwrap();
        assert!(inner < 1.0);
        assert!(effective_equation(inner, e, l, &pot) <= 0.0);
        let outer =
            find_bracket(1.0, e, l, &pot, BracketSide::Apocenter, BRACKET_MAX_ITER).unwrap();
        assert!(outer > 1.0);
        assert!(effective_equation(outer, e, l, &pot) <= 0.0);
    }

    #[test]
    fn unbound_orbit_reports_numerical_failure() {
        // alpha > 2 gives a potential that flattens to zero at infinity, so
        // a point with E > 0 has no apocenter and the outward bracket search
        // must give up instead of hanging.
        let pot = PowerSphericalPotential::new(1.0, 2.5).unwrap();
        let mut aa = ActionAngleAxi::new(1.0, 2.0, 1.0, &pot).unwrap();
        let err = aa.calc_rap_rperi().unwrap_err();
        assert!(matches!(err, DynamicsError::Numerical(_)));
        assert!(format!("{err}").contains("unbound"));
    }

    #[test]
    fn radial_orbit_is_an_unsupported_configuration() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.5, 0.0, &pot).unwrap();
        assert!(matches!(
            aa.calc_rap_rperi().unwrap_err(),
            DynamicsError::Unsupported(_)
        ));
    }

    #[test]
    fn memoized_quantities_are_stable_across_calls() {
        let pot = log_potential();
        let mut aa = ActionAngleAxi::new(1.0, 0.1, 1.1, &pot).unwrap();
        let first = aa.jr().unwrap();
        let second = aa.jr().unwrap();
        assert_eq!(first, second);
        let tp1 = aa.calc_rap_rperi().unwrap();
        let tp2 = aa.calc_rap_rperi().unwrap();
        assert_eq!(tp1, tp2);
    }
}
