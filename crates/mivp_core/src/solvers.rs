use crate::traits::{Scalar, Steppable, VectorField};

/// Classic Runge-Kutta 4th Order Stepper
///
/// Fixed step size, no error estimate. Used when the caller asks for
/// `Method::Rk4`; the adaptive driver falls back to a uniform grid.
pub struct Rk4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Rk4<T> {
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

impl<T: Scalar> Steppable<T> for Rk4<T> {
    fn step(&mut self, field: &impl VectorField<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::from_f64(0.5).unwrap();
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let two = T::from_f64(2.0).unwrap();

        let t0 = *t;

        // k1 = f(t, y)
        field.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        field.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        field.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        field.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Dormand-Prince 5(4) Stepper
///
/// Embedded pair with FSAL: the derivative at the accepted endpoint is the
/// first stage of the next step, so the caller passes the derivative at the
/// step start and receives the derivative at the candidate endpoint. The
/// returned scaled RMS error norm is <= 1 when the step is acceptable.
pub struct Dopri5<T: Scalar> {
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Dopri5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            tmp: vec![z; dim],
        }
    }

    /// Attempts one step of size dt from (t, y) where f0 = f(t, y).
    /// Writes the 5th-order candidate into y_new and f(t + dt, y_new) into
    /// f_new, and returns the error norm scaled by atol + rtol * max(|y|, |y_new|).
    #[allow(clippy::too_many_arguments)]
    pub fn try_step(
        &mut self,
        field: &impl VectorField<T>,
        t: T,
        y: &[T],
        f0: &[T],
        dt: T,
        y_new: &mut [T],
        f_new: &mut [T],
        atol: T,
        rtol: T,
    ) -> T {
        let c2 = T::from_f64(1.0 / 5.0).unwrap();
        let c3 = T::from_f64(3.0 / 10.0).unwrap();
        let c4 = T::from_f64(4.0 / 5.0).unwrap();
        let c5 = T::from_f64(8.0 / 9.0).unwrap();

        let a21 = T::from_f64(1.0 / 5.0).unwrap();

        let a31 = T::from_f64(3.0 / 40.0).unwrap();
        let a32 = T::from_f64(9.0 / 40.0).unwrap();

        let a41 = T::from_f64(44.0 / 45.0).unwrap();
        let a42 = T::from_f64(-56.0 / 15.0).unwrap();
        let a43 = T::from_f64(32.0 / 9.0).unwrap();

        let a51 = T::from_f64(19372.0 / 6561.0).unwrap();
        let a52 = T::from_f64(-25360.0 / 2187.0).unwrap();
        let a53 = T::from_f64(64448.0 / 6561.0).unwrap();
        let a54 = T::from_f64(-212.0 / 729.0).unwrap();

        let a61 = T::from_f64(9017.0 / 3168.0).unwrap();
        let a62 = T::from_f64(-355.0 / 33.0).unwrap();
        let a63 = T::from_f64(46732.0 / 5247.0).unwrap();
        let a64 = T::from_f64(49.0 / 176.0).unwrap();
        let a65 = T::from_f64(-5103.0 / 18656.0).unwrap();

        // b coefficients (5th order); b2 = 0
        let b1 = T::from_f64(35.0 / 384.0).unwrap();
        let b3 = T::from_f64(500.0 / 1113.0).unwrap();
        let b4 = T::from_f64(125.0 / 192.0).unwrap();
        let b5 = T::from_f64(-2187.0 / 6784.0).unwrap();
        let b6 = T::from_f64(11.0 / 84.0).unwrap();

        // b - bhat, the embedded 4th-order error weights; e2 = 0
        let e1 = T::from_f64(71.0 / 57600.0).unwrap();
        let e3 = T::from_f64(-71.0 / 16695.0).unwrap();
        let e4 = T::from_f64(71.0 / 1920.0).unwrap();
        let e5 = T::from_f64(-17253.0 / 339200.0).unwrap();
        let e6 = T::from_f64(22.0 / 525.0).unwrap();
        let e7 = T::from_f64(-1.0 / 40.0).unwrap();

        let dim = y.len();

        // k2
        for i in 0..dim {
            self.tmp[i] = y[i] + dt * (a21 * f0[i]);
        }
        field.apply(t + c2 * dt, &self.tmp, &mut self.k2);

        // k3
        for i in 0..dim {
            self.tmp[i] = y[i] + dt * (a31 * f0[i] + a32 * self.k2[i]);
        }
        field.apply(t + c3 * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..dim {
            self.tmp[i] = y[i] + dt * (a41 * f0[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        field.apply(t + c4 * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..dim {
            self.tmp[i] = y[i]
                + dt * (a51 * f0[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        field.apply(t + c5 * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..dim {
            self.tmp[i] = y[i]
                + dt * (a61 * f0[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        field.apply(t + dt, &self.tmp, &mut self.k6);

        // 5th order candidate; the a7j row equals b, so k7 = f(t + dt, y_new)
        for i in 0..dim {
            y_new[i] = y[i]
                + dt * (b1 * f0[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        field.apply(t + dt, y_new, f_new);

        // Scaled RMS of the embedded error estimate
        let zero = T::from_f64(0.0).unwrap();
        let mut acc = zero;
        for i in 0..dim {
            let err = dt
                * (e1 * f0[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * f_new[i]);
            let scale = atol + rtol * y[i].abs().max(y_new[i].abs());
            let ratio = err / scale;
            acc = acc + ratio * ratio;
        }
        (acc / T::from_usize(dim).unwrap()).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sho;

    impl VectorField<f64> for Sho {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = y[1];
            dydt[1] = -y[0];
        }
    }

    #[test]
    fn rk4_tracks_harmonic_oscillator() {
        let field = Sho;
        let mut stepper = Rk4::new(2);
        let mut t = 0.0;
        let mut y = [1.0, 0.0];
        let dt = 1e-3;
        while t < 1.0 - 0.5 * dt {
            stepper.step(&field, &mut t, &mut y, dt);
        }
        assert!((y[0] - t.cos()).abs() < 1e-9);
        assert!((y[1] + t.sin()).abs() < 1e-9);
    }

    #[test]
    fn dopri5_error_norm_shrinks_with_step_size() {
        let field = Sho;
        let mut stepper = Dopri5::new(2);
        let y = [1.0, 0.0];
        let mut f0 = [0.0; 2];
        field.apply(0.0, &y, &mut f0);

        let mut y_new = [0.0; 2];
        let mut f_new = [0.0; 2];
        let coarse = stepper.try_step(
            &field, 0.0, &y, &f0, 0.5, &mut y_new, &mut f_new, 1e-12, 1e-12,
        );
        let fine = stepper.try_step(
            &field, 0.0, &y, &f0, 0.05, &mut y_new, &mut f_new, 1e-12, 1e-12,
        );
        assert!(fine < coarse);
        // One small accepted step stays close to the analytic solution.
        assert!((y_new[0] - 0.05f64.cos()).abs() < 1e-9);
        assert!((y_new[1] + 0.05f64.sin()).abs() < 1e-9);
    }
}
