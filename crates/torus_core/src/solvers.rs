use crate::error::{DynamicsError, Result};
use crate::traits::{DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};

/// Classic Runge-Kutta 4th order stepper (fixed step).
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * half * self.k1[i];
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * half * self.k2[i];
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Controls for the adaptive Dormand-Prince stepper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OdeOptions {
    /// Relative tolerance per component.
    pub rtol: f64,
    /// Absolute tolerance per component.
    pub atol: f64,
    /// Safety factor applied to the step-size update.
    pub safety: f64,
    /// Smallest allowed shrink factor per step.
    pub min_factor: f64,
    /// Largest allowed growth factor per step.
    pub max_factor: f64,
    /// Step budget for a single `advance` call.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 5.0,
            max_steps: 100_000,
        }
    }
}

/// Dormand-Prince 5(4) embedded pair with proportional step-size control.
pub struct Dopri5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    proposal: Vec<T>,
}

impl<T: Scalar> Dopri5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            proposal: vec![z; dim],
        }
    }

    /// One trial step of size h. Fills `self.proposal` with the 5th-order
    /// solution and returns the scaled error norm of the embedded 4th-order
    /// difference (acceptable when <= 1).
    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        h: T,
        opts: &OdeOptions,
    ) -> T {
        let c = |v: f64| T::from_f64(v).unwrap();

        let c2 = c(1.0 / 5.0);
        let c3 = c(3.0 / 10.0);
        let c4 = c(4.0 / 5.0);
        let c5 = c(8.0 / 9.0);

        let a21 = c(1.0 / 5.0);
        let a31 = c(3.0 / 40.0);
        let a32 = c(9.0 / 40.0);
        let a41 = c(44.0 / 45.0);
        let a42 = c(-56.0 / 15.0);
        let a43 = c(32.0 / 9.0);
        let a51 = c(19372.0 / 6561.0);
        let a52 = c(-25360.0 / 2187.0);
        let a53 = c(64448.0 / 6561.0);
        let a54 = c(-212.0 / 729.0);
        let a61 = c(9017.0 / 3168.0);
        let a62 = c(-355.0 / 33.0);
        let a63 = c(46732.0 / 5247.0);
        let a64 = c(49.0 / 176.0);
        let a65 = c(-5103.0 / 18656.0);

        // 5th-order weights (also the last stage row).
        let b1 = c(35.0 / 384.0);
        let b3 = c(500.0 / 1113.0);
        let b4 = c(125.0 / 192.0);
        let b5 = c(-2187.0 / 6784.0);
        let b6 = c(11.0 / 84.0);

        // 5th minus 4th order weights, for the error estimate.
        let e1 = c(71.0 / 57600.0);
        let e3 = c(-71.0 / 16695.0);
        let e4 = c(71.0 / 1920.0);
        let e5 = c(-17253.0 / 339200.0);
        let e6 = c(22.0 / 525.0);
        let e7 = c(-1.0 / 40.0);

        let n = state.len();

        system.apply(t, state, &mut self.k1);

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a21 * self.k1[i]);
        }
        system.apply(t + c2 * h, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t + c3 * h, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = state[i] + h * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t + c4 * h, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = state[i]
                + h * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t + c5 * h, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = state[i]
                + h * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t + h, &self.tmp, &mut self.k6);

        for i in 0..n {
            self.proposal[i] = state[i]
                + h * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.apply(t + h, &self.proposal, &mut self.k7);

        let atol = c(opts.atol);
        let rtol = c(opts.rtol);
        let mut err_sq = T::from_f64(0.0).unwrap();
        for i in 0..n {
            let diff = h
                * (e1 * self.k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
            let scale = atol + rtol * state[i].abs().max(self.proposal[i].abs());
            let ratio = diff / scale;
            err_sq = err_sq + ratio * ratio;
        }
        (err_sq / T::from_usize(n).unwrap()).sqrt()
    }

    /// Advances `state` from `*t` to `t_end` with adaptive steps, never
    /// overshooting `t_end`.
    pub fn advance(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        t_end: T,
        opts: &OdeOptions,
    ) -> Result<()> {
        if !(opts.rtol > 0.0) || !(opts.atol > 0.0) {
            return Err(DynamicsError::Config(format!(
                "ODE tolerances must be positive, got rtol = {}, atol = {}",
                opts.rtol, opts.atol
            )));
        }
        if !(opts.safety > 0.0 && opts.safety < 1.0) {
            return Err(DynamicsError::Config(format!(
                "ODE safety factor must lie in (0, 1), got {}",
                opts.safety
            )));
        }
        if opts.max_steps == 0 {
            return Err(DynamicsError::Config(
                "ODE step budget must be at least 1".to_string(),
            ));
        }

        let zero = T::from_f64(0.0).unwrap();
        let one = T::from_f64(1.0).unwrap();
        let safety = T::from_f64(opts.safety).unwrap();
        let min_factor = T::from_f64(opts.min_factor).unwrap();
        let max_factor = T::from_f64(opts.max_factor).unwrap();
        let order_exp = T::from_f64(-0.2).unwrap();

        if t_end <= *t {
            return Ok(());
        }

        let mut h = t_end - *t;
        for _ in 0..opts.max_steps {
            if *t >= t_end {
                return Ok(());
            }
            if h > t_end - *t {
                h = t_end - *t;
            }
            if *t + h == *t {
                return Err(DynamicsError::Numerical(format!(
                    "adaptive step size underflow at t = {:?}",
                    *t
                )));
            }

            let err = self.trial_step(system, *t, state, h, opts);
            if err <= one {
                state.copy_from_slice(&self.proposal);
                *t = *t + h;
                let factor = if err == zero {
                    max_factor
                } else {
                    (safety * err.powf(order_exp)).max(min_factor).min(max_factor)
                };
                h = h * factor;
            } else {
                h = h * (safety * err.powf(order_exp)).max(min_factor).min(one);
            }
        }

        Err(DynamicsError::Numerical(format!(
            "adaptive integration exceeded {} steps before reaching t = {:?}",
            opts.max_steps, t_end
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{Dopri5, OdeOptions, RK4};
    use crate::error::DynamicsError;
    use crate::traits::{DynamicalSystem, Steppable};

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    #[test]
    fn rk4_tracks_exponential_decay() {
        let system = Decay { rate: 1.0 };
        let mut stepper = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..1000 {
            stepper.step(&system, &mut t, &mut state, 1e-3);
        }
        assert!((state[0] - (-1.0_f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn dopri5_meets_tolerance_on_oscillator() {
        let mut stepper = Dopri5::new(2);
        let mut t = 0.0;
        let mut state = [1.0, 0.0];
        let period = 2.0 * std::f64::consts::PI;
        stepper
            .advance(&Oscillator, &mut t, &mut state, period, &OdeOptions::default())
            .unwrap();
        assert!((t - period).abs() < 1e-12);
        assert!((state[0] - 1.0).abs() < 1e-6);
        assert!(state[1].abs() < 1e-6);
    }

    #[test]
    fn dopri5_reports_step_budget_exhaustion() {
        let mut stepper = Dopri5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let opts = OdeOptions {
            max_steps: 1,
            rtol: 1e-14,
            ..OdeOptions::default()
        };
        let err = stepper
            .advance(&Decay { rate: 1.0 }, &mut t, &mut state, 100.0, &opts)
            .unwrap_err();
        assert!(matches!(err, DynamicsError::Numerical(_)));
    }

    #[test]
    fn dopri5_rejects_invalid_options() {
        let mut stepper = Dopri5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let opts = OdeOptions {
            rtol: 0.0,
            ..OdeOptions::default()
        };
        let err = stepper
            .advance(&Decay { rate: 1.0 }, &mut t, &mut state, 1.0, &opts)
            .unwrap_err();
        assert!(matches!(err, DynamicsError::Config(_)));
    }
}
