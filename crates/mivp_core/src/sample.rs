use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::ivp::Trajectory;

/// Time-major tensor of positions: `data[k]` holds one `dim x n` matrix of
/// the n tracked states at `times[k]`, column order following the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Frames {
    pub times: Vec<f64>,
    pub data: Vec<DMatrix<f64>>,
}

impl Frames {
    /// Number of output times.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Extracts a time-major position tensor from independently solved dense
/// trajectories.
///
/// Pure and side-effect free. Fails with [`Error::TimeOutOfSpan`] if any
/// requested time falls outside any trajectory's span, and with
/// [`Error::IntegrationFailure`] if a trajectory was solved without dense
/// output or the trajectories disagree on the state dimension.
pub fn sample_flow(trajectories: &[Trajectory], times: &[f64]) -> Result<Frames> {
    let first = trajectories.first().ok_or_else(|| {
        Error::IntegrationFailure("no trajectories to sample".to_string())
    })?;
    let dim = first.y[0].len();
    for traj in trajectories {
        if traj.y[0].len() != dim {
            return Err(Error::IntegrationFailure(format!(
                "trajectory dimension mismatch: expected {}, got {}",
                dim,
                traj.y[0].len()
            )));
        }
    }

    let mut data = Vec::with_capacity(times.len());
    for &t in times {
        let mut frame = DMatrix::zeros(dim, trajectories.len());
        for (col, traj) in trajectories.iter().enumerate() {
            let position = traj.position(t)?;
            frame.column_mut(col).copy_from(&position);
        }
        data.push(frame);
    }

    Ok(Frames {
        times: times.to_vec(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ivp::{solve_batch, solve_ivp, IvpOptions};
    use crate::traits::VectorField;

    struct Drift;

    impl VectorField<f64> for Drift {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, _y: &[f64], dydt: &mut [f64]) {
            dydt[0] = 1.0;
            dydt[1] = -1.0;
        }
    }

    fn dense_options() -> IvpOptions {
        IvpOptions {
            dense_output: true,
            ..IvpOptions::default()
        }
    }

    #[test]
    fn samples_match_known_linear_drift() {
        let y0s = vec![vec![0.0, 0.0], vec![1.0, 2.0]];
        let trajectories =
            solve_batch(&Drift, &y0s, (0.0, 2.0), None, &dense_options()).expect("batch solves");
        let times = [0.0, 0.5, 1.25, 2.0];
        let frames = sample_flow(&trajectories, &times).expect("sampling succeeds");

        assert_eq!(frames.len(), times.len());
        for (k, &t) in times.iter().enumerate() {
            let frame = &frames.data[k];
            assert_eq!(frame.shape(), (2, 2));
            for (col, y0) in y0s.iter().enumerate() {
                assert!((frame[(0, col)] - (y0[0] + t)).abs() < 1e-9);
                assert!((frame[(1, col)] - (y0[1] - t)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn rejects_times_outside_any_span() {
        let traj = solve_ivp(&Drift, (0.0, 1.0), &[0.0, 0.0], None, &dense_options())
            .expect("solve succeeds");
        let result = sample_flow(&[traj], &[0.5, 1.5]);
        assert!(matches!(result, Err(Error::TimeOutOfSpan { .. })));
    }

    #[test]
    fn rejects_empty_trajectory_set() {
        let result = sample_flow(&[], &[0.0]);
        assert!(matches!(result, Err(Error::IntegrationFailure(_))));
    }
}
