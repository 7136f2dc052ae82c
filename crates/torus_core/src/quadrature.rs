use crate::error::{DynamicsError, Result};
use serde::{Deserialize, Serialize};

/// A quadrature estimate: the integral value and an error estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub value: f64,
    pub error: f64,
}

impl Quad {
    pub const ZERO: Quad = Quad {
        value: 0.0,
        error: 0.0,
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuadratureOptions {
    /// Absolute tolerance on the summed error estimate.
    pub atol: f64,
    /// Relative tolerance on the summed error estimate.
    pub rtol: f64,
    /// Subdivision budget before reporting a convergence failure.
    pub max_subdivisions: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            atol: 1.49e-8,
            rtol: 1.49e-8,
            max_subdivisions: 50,
        }
    }
}

// Gauss-Kronrod 7-15 pair. Kronrod abscissae (positive half) and weights,
// plus the embedded 7-point Gauss weights for the shared nodes.
const XGK: [f64; 8] = [
    0.991455371120813,
    0.949107912342759,
    0.864864423359769,
    0.741531185599394,
    0.586087235467691,
    0.405845151377397,
    0.207784955007898,
    0.0,
];
const WGK: [f64; 8] = [
    0.022935322010529,
    0.063092092629979,
    0.104790010322250,
    0.140653259715525,
    0.169004726639267,
    0.190350578064785,
    0.204432940075298,
    0.209482141084728,
];
const WG: [f64; 4] = [
    0.129484966168870,
    0.279705391489277,
    0.381830050505119,
    0.417959183673469,
];

/// Single G7K15 panel over [a, b]. The error estimate is the difference
/// between the 15-point Kronrod and the embedded 7-point Gauss results.
fn gk15(f: &impl Fn(f64) -> f64, a: f64, b: f64) -> Quad {
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let fc = f(center);
    let mut resk = WGK[7] * fc;
    let mut resg = WG[3] * fc;
    for (j, &x) in XGK.iter().enumerate().take(7) {
        let dx = half * x;
        let fsum = f(center - dx) + f(center + dx);
        resk += WGK[j] * fsum;
        if j % 2 == 1 {
            resg += WG[j / 2] * fsum;
        }
    }

    Quad {
        value: resk * half,
        error: ((resk - resg) * half).abs(),
    }
}

/// Adaptive Gauss-Kronrod integration of f over [a, b].
///
/// Bisects the interval with the worst panel error until the summed error
/// estimate meets max(atol, rtol * |value|), or the subdivision budget runs
/// out. Integrable endpoint behavior (e.g. square-root turning points) is
/// handled by the subdivision; the panel never evaluates f at the endpoints.
pub fn adaptive_quadrature(
    f: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    opts: &QuadratureOptions,
) -> Result<Quad> {
    if !(opts.atol > 0.0) || !(opts.rtol > 0.0) {
        return Err(DynamicsError::Config(format!(
            "quadrature tolerances must be positive, got atol = {}, rtol = {}",
            opts.atol, opts.rtol
        )));
    }
    if opts.max_subdivisions == 0 {
        return Err(DynamicsError::Config(
            "max_subdivisions must be at least 1".to_string(),
        ));
    }
    if a == b {
        return Ok(Quad::ZERO);
    }

    let mut panels: Vec<(f64, f64, Quad)> = vec![(a, b, gk15(&f, a, b))];
    loop {
        let value: f64 = panels.iter().map(|p| p.2.value).sum();
        let error: f64 = panels.iter().map(|p| p.2.error).sum();
        if error <= opts.atol.max(opts.rtol * value.abs()) {
            return Ok(Quad { value, error });
        }
        if panels.len() >= opts.max_subdivisions {
            return Err(DynamicsError::Numerical(format!(
                "quadrature failed to reach tolerance after {} subdivisions \
                 (value {value}, error estimate {error})",
                opts.max_subdivisions
            )));
        }

        let worst = panels
            .iter()
            .enumerate()
            .max_by(|(_, x), (_, y)| x.2.error.total_cmp(&y.2.error))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let (pa, pb, _) = panels.swap_remove(worst);
        let mid = 0.5 * (pa + pb);
        panels.push((pa, mid, gk15(&f, pa, mid)));
        panels.push((mid, pb, gk15(&f, mid, pb)));
    }
}
