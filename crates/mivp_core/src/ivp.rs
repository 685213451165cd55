//! Initial value problem driver.
//!
//! Wraps the fixed-step and embedded steppers in `solvers` behind a narrow
//! solve-one-trajectory contract: callers hand over a vector field, an initial
//! state, a time span, and options, and get back a [`Trajectory`] or an
//! [`Error::IntegrationFailure`]. Nothing here is retried internally.

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::solvers::{Dopri5, Rk4};
use crate::traits::{Steppable, VectorField};

const SAFETY: f64 = 0.9;
const MIN_SHRINK: f64 = 0.2;
const MAX_GROWTH: f64 = 5.0;
const REJECT_SHRINK: f64 = 0.1;
const DEFAULT_FIRST_STEP_FRACTION: f64 = 1e-2;
const DEFAULT_RK4_STEPS: usize = 100;
const STEP_UNDERFLOW_FRACTION: f64 = 1e-14;
const SEGMENT_SLACK_FRACTION: f64 = 1e-9;

/// Integration method forwarded to the stepper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Fixed-step classic Runge-Kutta; step size from `first_step` or a
    /// uniform 100-step grid.
    Rk4,
    /// Adaptive Dormand-Prince 5(4) with embedded error control.
    Dopri5,
}

/// Options forwarded to the trajectory solver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IvpOptions {
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// Initial step size (Dopri5) or fixed step size (Rk4).
    pub first_step: Option<f64>,
    /// Budget of attempted steps before the solver gives up.
    pub max_steps: usize,
    /// Retain per-step interpolation data so [`Trajectory::position`] can
    /// answer at arbitrary times within the span.
    pub dense_output: bool,
}

impl Default for IvpOptions {
    fn default() -> Self {
        Self {
            method: Method::Dopri5,
            rtol: 1e-6,
            atol: 1e-9,
            first_step: None,
            max_steps: 100_000,
            dense_output: false,
        }
    }
}

/// One accepted step with endpoint states and derivatives, enough for a
/// cubic Hermite interpolant over [t0, t1].
#[derive(Debug, Clone)]
struct DenseSegment {
    t0: f64,
    t1: f64,
    y0: DVector<f64>,
    y1: DVector<f64>,
    f0: DVector<f64>,
    f1: DVector<f64>,
}

impl DenseSegment {
    fn interpolate(&self, t: f64) -> DVector<f64> {
        let h = self.t1 - self.t0;
        let theta = (t - self.t0) / h;
        let t2 = theta * theta;
        let t3 = t2 * theta;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + theta;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        &self.y0 * h00 + &self.f0 * (h10 * h) + &self.y1 * h01 + &self.f1 * (h11 * h)
    }
}

/// The result of integrating one initial value problem over a time span.
///
/// `t` and `y` hold the sampled output: the requested evaluation grid when
/// one was given, the accepted step points otherwise.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub y: Vec<DVector<f64>>,
    segments: Vec<DenseSegment>,
    span: (f64, f64),
}

impl Trajectory {
    /// The integrated time span (start, end).
    pub fn span(&self) -> (f64, f64) {
        self.span
    }

    /// Whether dense interpolation data was retained.
    pub fn has_dense_output(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Evaluates the solution at an arbitrary time within the span.
    ///
    /// Requires `dense_output` to have been set when solving; queries outside
    /// the span fail with [`Error::TimeOutOfSpan`].
    pub fn position(&self, t: f64) -> Result<DVector<f64>> {
        if self.segments.is_empty() {
            return Err(Error::IntegrationFailure(
                "trajectory was solved without dense output; \
                 set IvpOptions::dense_output to query arbitrary times"
                    .to_string(),
            ));
        }
        eval_segments(&self.segments, self.span, t).ok_or(Error::TimeOutOfSpan {
            t,
            start: self.span.0,
            end: self.span.1,
        })
    }
}

fn eval_segments(segments: &[DenseSegment], span: (f64, f64), t: f64) -> Option<DVector<f64>> {
    let slack = SEGMENT_SLACK_FRACTION * (span.1 - span.0).abs().max(1.0);
    let first = segments.first()?;
    if t < first.t0 - slack {
        return None;
    }
    let idx = segments.partition_point(|seg| seg.t1 < t);
    if idx == segments.len() {
        let last = segments.last()?;
        if t - last.t1 <= slack {
            return Some(last.y1.clone());
        }
        return None;
    }
    let seg = &segments[idx];
    Some(seg.interpolate(t.clamp(seg.t0, seg.t1)))
}

fn validate_inputs(
    dim: usize,
    t_span: (f64, f64),
    y0: &[f64],
    t_eval: Option<&[f64]>,
    options: &IvpOptions,
) -> Result<()> {
    if dim == 0 {
        return Err(Error::IntegrationFailure(
            "vector field dimension must be greater than zero".to_string(),
        ));
    }
    if y0.len() != dim {
        return Err(Error::IntegrationFailure(format!(
            "initial state dimension mismatch: expected {}, got {}",
            dim,
            y0.len()
        )));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(Error::IntegrationFailure(
            "initial state contains non-finite components".to_string(),
        ));
    }
    if !(t_span.0.is_finite() && t_span.1.is_finite()) {
        return Err(Error::IntegrationFailure(
            "time span must be finite".to_string(),
        ));
    }
    if t_span.0 >= t_span.1 {
        return Err(Error::IntegrationFailure(format!(
            "degenerate time span: start {} >= end {}",
            t_span.0, t_span.1
        )));
    }
    if !(options.atol >= 0.0 && options.rtol >= 0.0 && options.atol + options.rtol > 0.0) {
        return Err(Error::IntegrationFailure(
            "tolerances must be non-negative and not both zero".to_string(),
        ));
    }
    if options.max_steps == 0 {
        return Err(Error::IntegrationFailure(
            "max_steps must be greater than zero".to_string(),
        ));
    }
    if let Some(step) = options.first_step {
        if !(step.is_finite() && step > 0.0) {
            return Err(Error::IntegrationFailure(
                "first_step must be finite and positive".to_string(),
            ));
        }
    }
    if let Some(grid) = t_eval {
        if grid.is_empty() {
            return Err(Error::IntegrationFailure(
                "evaluation grid must not be empty".to_string(),
            ));
        }
        if grid.iter().any(|t| !t.is_finite()) {
            return Err(Error::IntegrationFailure(
                "evaluation grid contains non-finite times".to_string(),
            ));
        }
        if grid.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::IntegrationFailure(
                "evaluation grid must be strictly increasing".to_string(),
            ));
        }
        if grid[0] < t_span.0 || grid[grid.len() - 1] > t_span.1 {
            return Err(Error::IntegrationFailure(format!(
                "evaluation grid [{}, {}] exceeds time span [{}, {}]",
                grid[0],
                grid[grid.len() - 1],
                t_span.0,
                t_span.1
            )));
        }
    }
    Ok(())
}

/// Integrates one initial value problem over `t_span`.
///
/// With `t_eval = Some(grid)` the output samples are restricted to the grid;
/// otherwise every accepted step is reported. Failures of the underlying
/// method (step-size underflow on stiff or singular dynamics, step budget
/// exhausted) propagate as [`Error::IntegrationFailure`].
pub fn solve_ivp<F: VectorField<f64>>(
    field: &F,
    t_span: (f64, f64),
    y0: &[f64],
    t_eval: Option<&[f64]>,
    options: &IvpOptions,
) -> Result<Trajectory> {
    let dim = field.dimension();
    validate_inputs(dim, t_span, y0, t_eval, options)?;

    let segments = match options.method {
        Method::Dopri5 => integrate_dopri5(field, t_span, y0, options)?,
        Method::Rk4 => integrate_rk4(field, t_span, y0, options)?,
    };

    let (t, y) = match t_eval {
        Some(grid) => {
            let mut samples = Vec::with_capacity(grid.len());
            for &t in grid {
                let value =
                    eval_segments(&segments, t_span, t).ok_or_else(|| Error::IntegrationFailure(
                        format!("internal interpolation gap at t = {t}"),
                    ))?;
                samples.push(value);
            }
            (grid.to_vec(), samples)
        }
        None => {
            let mut t = Vec::with_capacity(segments.len() + 1);
            let mut y = Vec::with_capacity(segments.len() + 1);
            t.push(t_span.0);
            y.push(DVector::from_column_slice(y0));
            for seg in &segments {
                t.push(seg.t1);
                y.push(seg.y1.clone());
            }
            (t, y)
        }
    };

    Ok(Trajectory {
        t,
        y,
        segments: if options.dense_output { segments } else { Vec::new() },
        span: t_span,
    })
}

fn integrate_dopri5<F: VectorField<f64>>(
    field: &F,
    t_span: (f64, f64),
    y0: &[f64],
    options: &IvpOptions,
) -> Result<Vec<DenseSegment>> {
    let dim = field.dimension();
    let (t_start, t_end) = t_span;
    let span_len = t_end - t_start;
    let min_step = STEP_UNDERFLOW_FRACTION * span_len;

    let mut stepper = Dopri5::new(dim);
    let mut t = t_start;
    let mut y = y0.to_vec();
    let mut f = vec![0.0; dim];
    field.apply(t, &y, &mut f);
    if f.iter().any(|v| !v.is_finite()) {
        return Err(Error::IntegrationFailure(format!(
            "vector field is non-finite at the initial state (t = {t})"
        )));
    }

    let mut dt = options
        .first_step
        .unwrap_or(DEFAULT_FIRST_STEP_FRACTION * span_len)
        .min(span_len);
    let mut y_new = vec![0.0; dim];
    let mut f_new = vec![0.0; dim];
    let mut segments = Vec::new();
    let mut attempts = 0usize;

    while t < t_end {
        if attempts >= options.max_steps {
            return Err(Error::IntegrationFailure(format!(
                "step budget of {} exhausted at t = {t}",
                options.max_steps
            )));
        }
        if dt < min_step {
            return Err(Error::IntegrationFailure(format!(
                "step size underflow at t = {t}; the problem may be stiff or singular"
            )));
        }
        dt = dt.min(t_end - t);

        let err = stepper.try_step(
            field,
            t,
            &y,
            &f,
            dt,
            &mut y_new,
            &mut f_new,
            options.atol,
            options.rtol,
        );
        attempts += 1;

        if err.is_finite() && err <= 1.0 {
            segments.push(DenseSegment {
                t0: t,
                t1: t + dt,
                y0: DVector::from_column_slice(&y),
                y1: DVector::from_column_slice(&y_new),
                f0: DVector::from_column_slice(&f),
                f1: DVector::from_column_slice(&f_new),
            });
            t += dt;
            y.copy_from_slice(&y_new);
            f.copy_from_slice(&f_new);
            // Rounding can leave a sub-resolution sliver before t_end; the
            // interpolation slack covers it.
            if t_end - t < min_step {
                break;
            }
            let growth = if err == 0.0 {
                MAX_GROWTH
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_SHRINK, MAX_GROWTH)
            };
            dt *= growth;
        } else if err.is_finite() {
            dt *= (SAFETY * err.powf(-0.2)).clamp(MIN_SHRINK, 1.0);
        } else {
            // Non-finite error estimate: the candidate left the domain where
            // the field is well-behaved. Retreat hard.
            dt *= REJECT_SHRINK;
        }
    }

    debug!(
        "dopri5: integrated [{t_start}, {t_end}] in {} accepted steps ({} attempts)",
        segments.len(),
        attempts
    );
    Ok(segments)
}

fn integrate_rk4<F: VectorField<f64>>(
    field: &F,
    t_span: (f64, f64),
    y0: &[f64],
    options: &IvpOptions,
) -> Result<Vec<DenseSegment>> {
    let dim = field.dimension();
    let (t_start, t_end) = t_span;
    let span_len = t_end - t_start;

    let n_steps = match options.first_step {
        Some(h) => (span_len / h).ceil() as usize,
        None => DEFAULT_RK4_STEPS,
    }
    .max(1);
    if n_steps > options.max_steps {
        return Err(Error::IntegrationFailure(format!(
            "fixed-step grid of {n_steps} steps exceeds the budget of {}",
            options.max_steps
        )));
    }

    let mut stepper = Rk4::new(dim);
    let mut t = t_start;
    let mut y = y0.to_vec();
    let mut f = vec![0.0; dim];
    field.apply(t, &y, &mut f);

    let mut segments = Vec::with_capacity(n_steps);
    let mut f_new = vec![0.0; dim];
    for i in 0..n_steps {
        // Land exactly on the grid regardless of rounding in t.
        let t_next = t_start + span_len * ((i + 1) as f64) / (n_steps as f64);
        let y_prev = DVector::from_column_slice(&y);
        let f_prev = DVector::from_column_slice(&f);
        let mut t_step = t;
        stepper.step(field, &mut t_step, &mut y, t_next - t);
        if y.iter().any(|v| !v.is_finite()) {
            return Err(Error::IntegrationFailure(format!(
                "state became non-finite at t = {t_next}"
            )));
        }
        field.apply(t_next, &y, &mut f_new);
        segments.push(DenseSegment {
            t0: t,
            t1: t_next,
            y0: y_prev,
            y1: DVector::from_column_slice(&y),
            f0: f_prev,
            f1: DVector::from_column_slice(&f_new),
        });
        t = t_next;
        f.copy_from_slice(&f_new);
    }

    Ok(segments)
}

/// Integrates one trajectory per initial state, in input order.
///
/// The computations are mutually independent; the first failure aborts the
/// whole batch.
pub fn solve_batch<F: VectorField<f64>>(
    field: &F,
    y0s: &[Vec<f64>],
    t_span: (f64, f64),
    t_eval: Option<&[f64]>,
    options: &IvpOptions,
) -> Result<Vec<Trajectory>> {
    let mut trajectories = Vec::with_capacity(y0s.len());
    for y0 in y0s {
        trajectories.push(solve_ivp(field, t_span, y0, t_eval, options)?);
    }
    Ok(trajectories)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay;

    impl VectorField<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = -y[0];
        }
    }

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

    fn assert_failure_contains(result: Result<Trajectory>, needle: &str) {
        match result {
            Err(Error::IntegrationFailure(message)) => assert!(
                message.contains(needle),
                "expected failure to contain \"{needle}\", got \"{message}\""
            ),
            other => panic!("expected IntegrationFailure, got {other:?}"),
        }
    }

    #[test]
    fn dopri5_matches_exponential_decay() {
        let traj = solve_ivp(&Decay, (0.0, 2.0), &[1.0], None, &IvpOptions::default())
            .expect("solve should succeed");
        let last = traj.y.last().expect("trajectory has samples");
        assert!((last[0] - (-2.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let options = IvpOptions {
            method: Method::Rk4,
            ..IvpOptions::default()
        };
        let traj =
            solve_ivp(&Decay, (0.0, 2.0), &[1.0], None, &options).expect("solve should succeed");
        assert_eq!(traj.t.len(), 101);
        let last = traj.y.last().expect("trajectory has samples");
        assert!((last[0] - (-2.0f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn output_restricted_to_evaluation_grid() {
        let grid = [0.0, 0.5, 1.0, 1.5, 2.0];
        let traj = solve_ivp(&Decay, (0.0, 2.0), &[1.0], Some(&grid), &IvpOptions::default())
            .expect("solve should succeed");
        assert_eq!(traj.t, grid.to_vec());
        assert_eq!(traj.y.len(), grid.len());
        for (t, y) in traj.t.iter().zip(traj.y.iter()) {
            assert!((y[0] - (-t).exp()).abs() < 1e-6, "mismatch at t = {t}");
        }
    }

    #[test]
    fn dense_output_answers_arbitrary_times() {
        let options = IvpOptions {
            dense_output: true,
            ..IvpOptions::default()
        };
        let traj = solve_ivp(&Sho, (0.0, 6.0), &[1.0, 0.0], None, &options)
            .expect("solve should succeed");
        assert!(traj.has_dense_output());
        for &t in &[0.0, 0.3, 1.7, std::f64::consts::PI, 5.999] {
            let y = traj.position(t).expect("time is inside the span");
            assert!((y[0] - t.cos()).abs() < 5e-5, "mismatch at t = {t}");
            assert!((y[1] + t.sin()).abs() < 5e-5, "mismatch at t = {t}");
        }
    }

    #[test]
    fn position_rejects_times_outside_span() {
        let options = IvpOptions {
            dense_output: true,
            ..IvpOptions::default()
        };
        let traj = solve_ivp(&Sho, (0.0, 1.0), &[1.0, 0.0], None, &options)
            .expect("solve should succeed");
        match traj.position(2.0) {
            Err(Error::TimeOutOfSpan { t, start, end }) => {
                assert_eq!(t, 2.0);
                assert_eq!((start, end), (0.0, 1.0));
            }
            other => panic!("expected TimeOutOfSpan, got {other:?}"),
        }
    }

    #[test]
    fn position_requires_dense_output() {
        let traj = solve_ivp(&Sho, (0.0, 1.0), &[1.0, 0.0], None, &IvpOptions::default())
            .expect("solve should succeed");
        assert!(!traj.has_dense_output());
        assert!(matches!(
            traj.position(0.5),
            Err(Error::IntegrationFailure(_))
        ));
    }

    #[test]
    fn degenerate_time_span_is_rejected() {
        assert_failure_contains(
            solve_ivp(&Decay, (1.0, 1.0), &[1.0], None, &IvpOptions::default()),
            "degenerate time span",
        );
        assert_failure_contains(
            solve_ivp(&Decay, (2.0, 1.0), &[1.0], None, &IvpOptions::default()),
            "degenerate time span",
        );
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        assert_failure_contains(
            solve_ivp(&Sho, (0.0, 1.0), &[1.0], None, &IvpOptions::default()),
            "dimension mismatch",
        );
    }

    #[test]
    fn unsorted_evaluation_grid_is_rejected() {
        let grid = [0.0, 0.7, 0.5];
        assert_failure_contains(
            solve_ivp(&Decay, (0.0, 1.0), &[1.0], Some(&grid), &IvpOptions::default()),
            "strictly increasing",
        );
    }

    #[test]
    fn exhausted_step_budget_is_reported() {
        let options = IvpOptions {
            max_steps: 3,
            ..IvpOptions::default()
        };
        assert_failure_contains(
            solve_ivp(&Sho, (0.0, 100.0), &[1.0, 0.0], None, &options),
            "step budget",
        );
    }

    #[test]
    fn batch_preserves_input_order_and_initial_states() {
        let y0s = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![-1.5, 0.5]];
        let grid = [0.0, 0.5, 1.0];
        let trajectories = solve_batch(&Sho, &y0s, (0.0, 1.0), Some(&grid), &IvpOptions::default())
            .expect("batch should succeed");
        assert_eq!(trajectories.len(), y0s.len());
        for (traj, y0) in trajectories.iter().zip(y0s.iter()) {
            assert_eq!(traj.y[0].as_slice(), y0.as_slice());
        }
    }

    #[test]
    fn batch_aborts_on_first_failure() {
        let y0s = vec![vec![1.0, 0.0], vec![f64::NAN, 0.0], vec![0.0, 1.0]];
        let result = solve_batch(&Sho, &y0s, (0.0, 1.0), None, &IvpOptions::default());
        assert!(matches!(result, Err(Error::IntegrationFailure(_))));
    }
}
