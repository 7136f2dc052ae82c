use crate::error::{DynamicsError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RootSettings {
    pub max_steps: usize,
    pub tolerance: f64,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            tolerance: 1e-12,
        }
    }
}

/// Brent's method on a bracketing interval [a, b].
///
/// Requires f(a) and f(b) to have opposite signs. Combines inverse
/// quadratic interpolation, the secant step, and bisection; derivative-free.
pub fn brentq(f: impl Fn(f64) -> f64, a: f64, b: f64, settings: RootSettings) -> Result<f64> {
    let (mut a, mut b) = (a, b);
    let mut fa = f(a);
    let mut fb = f(b);
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(DynamicsError::Config(format!(
            "brentq requires a sign change: f({a}) = {fa}, f({b}) = {fb}"
        )));
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..settings.max_steps {
        if fb.signum() == fc.signum() {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * settings.tolerance;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol1 || fb == 0.0 {
            return Ok(b);
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            // Attempt inverse quadratic interpolation (secant if a == c).
            let s = fb / fa;
            let mut p;
            let mut q;
            if a == c {
                p = 2.0 * xm * s;
                q = 1.0 - s;
            } else {
                let t = fa / fc;
                let r = fb / fc;
                p = s * (2.0 * xm * t * (t - r) - (b - a) * (r - 1.0));
                q = (t - 1.0) * (r - 1.0) * (s - 1.0);
            }
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                // Interpolation accepted.
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        if d.abs() > tol1 {
            b += d;
        } else {
            b += tol1.copysign(xm);
        }
        fb = f(b);
    }

    Err(DynamicsError::Numerical(format!(
        "brentq failed to converge in {} iterations (last estimate {b}, residual {fb})",
        settings.max_steps
    )))
}

/// Newton's method with a supplied derivative and an iteration cap.
pub fn newton(
    f: impl Fn(f64) -> f64,
    fprime: impl Fn(f64) -> f64,
    x0: f64,
    settings: RootSettings,
) -> Result<f64> {
    let mut x = x0;
    for _ in 0..settings.max_steps {
        let fx = f(x);
        let dfx = fprime(x);
        if dfx == 0.0 {
            return Err(DynamicsError::Numerical(format!(
                "Newton refinement hit a vanishing derivative at x = {x}"
            )));
        }
        let dx = fx / dfx;
        x -= dx;
        if dx.abs() <= settings.tolerance * (1.0 + x.abs()) {
            return Ok(x);
        }
    }
    Err(DynamicsError::Numerical(format!(
        "Newton refinement failed to converge in {} steps (last estimate {x})",
        settings.max_steps
    )))
}
