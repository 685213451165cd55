//! Adaptive boundary tracking.
//!
//! Tracks the image of a closed curve of initial states under the flow of a
//! vector field. The curve is sampled on a parameter mesh over [0, 1], every
//! mesh point is integrated over the full time span, and the mesh is refined
//! wherever two adjacent trajectories drift further apart than the error
//! envelope allows, at any output time. The result is a polygon snapshot per
//! output time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ivp::{solve_ivp, IvpOptions};
use crate::sample::Frames;
use crate::traits::VectorField;

/// Smallest mesh that supports a meaningful adjacency error metric.
const MIN_MESH_POINTS: usize = 4;

/// A one-parameter family of initial states: a curve in state space
/// parameterized over [0, 1].
///
/// Must be evaluable at any parameter value, including midpoints that only
/// appear during refinement. For a closed boundary the states at 0 and 1
/// should coincide.
pub trait BoundaryCurve {
    fn state_at(&self, s: f64) -> Result<Vec<f64>>;
}

impl<F> BoundaryCurve for F
where
    F: Fn(f64) -> Vec<f64>,
{
    fn state_at(&self, s: f64) -> Result<Vec<f64>> {
        Ok(self(s))
    }
}

/// Settings for the adaptive refinement loop.
///
/// The admissible edge length between adjacent polygon vertices is
/// `atol + rtol * d`, where `d` is the earlier vertex's distance from the
/// state-space origin. `max_mesh_points` bounds the mesh so pathological
/// flows fail with [`Error::RefinementDidNotConverge`] instead of looping
/// forever.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RefinementSettings {
    pub atol: f64,
    pub rtol: f64,
    pub initial_mesh_points: usize,
    pub max_mesh_points: usize,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            atol: 0.01,
            rtol: 0.1,
            initial_mesh_points: MIN_MESH_POINTS,
            max_mesh_points: 10_000,
        }
    }
}

/// Cloneable cancellation flag checked between refinement iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The converged result: the final parameter mesh and one polygon snapshot
/// per output time.
#[derive(Debug, Clone)]
pub struct BoundaryFlow {
    pub mesh: Vec<f64>,
    pub frames: Frames,
}

/// The (pair, output time) location with the largest adjacent distance.
#[derive(Debug, Clone, Copy)]
struct WorstEdge {
    pair: usize,
    time_index: usize,
    distance: f64,
}

/// Outcome of one measurement pass over the full time history.
enum Measurement {
    Converged,
    Refine(WorstEdge),
}

/// Drives the adaptive boundary-tracking refinement for one vector field and
/// boundary curve.
pub struct BoundaryTracker<'a, F, C> {
    field: &'a F,
    curve: &'a C,
    settings: RefinementSettings,
    ivp: IvpOptions,
    cancel: Option<CancelToken>,
}

impl<'a, F, C> BoundaryTracker<'a, F, C>
where
    F: VectorField<f64>,
    C: BoundaryCurve,
{
    pub fn new(field: &'a F, curve: &'a C, settings: RefinementSettings, ivp: IvpOptions) -> Self {
        Self {
            field,
            curve,
            settings,
            ivp,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs the refinement loop until the joint convergence test passes at
    /// every output time and every mesh-adjacent pair.
    ///
    /// `t_eval` must be strictly increasing; its first and last entries
    /// define the integration span. The loop alternates measurement and
    /// refinement: each iteration inserts exactly one mesh point at the
    /// parameter midpoint of the worst edge and integrates one new
    /// trajectory. Identical inputs produce identical output, including the
    /// tie-break on equally bad edges (first occurrence scanning output
    /// times, then pairs).
    pub fn track(&self, t_eval: &[f64]) -> Result<BoundaryFlow> {
        if t_eval.is_empty() {
            return Err(Error::IntegrationFailure(
                "evaluation grid must not be empty".to_string(),
            ));
        }
        let t_span = (t_eval[0], t_eval[t_eval.len() - 1]);

        let initial = self.settings.initial_mesh_points.max(MIN_MESH_POINTS);
        let ceiling = self.settings.max_mesh_points.max(initial);

        let mut mesh: Vec<f64> = (0..initial)
            .map(|i| i as f64 / (initial - 1) as f64)
            .collect();
        let mut columns = Vec::with_capacity(initial);
        for &s in &mesh {
            columns.push(self.integrate_from(s, t_span, t_eval)?);
        }

        loop {
            let worst = match measure(&columns, self.settings.atol, self.settings.rtol) {
                Measurement::Converged => break,
                Measurement::Refine(worst) => worst,
            };
            if mesh.len() >= ceiling {
                return Err(Error::RefinementDidNotConverge {
                    mesh_size: mesh.len(),
                    worst_edge: worst.distance,
                });
            }
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            let s_new = 0.5 * (mesh[worst.pair] + mesh[worst.pair + 1]);
            debug!(
                "refining mesh: size {}, worst edge {:.3e} at pair {} / time index {}, inserting s = {s_new}",
                mesh.len(),
                worst.distance,
                worst.pair,
                worst.time_index
            );
            let column = self.integrate_from(s_new, t_span, t_eval)?;
            mesh.insert(worst.pair + 1, s_new);
            columns.insert(worst.pair + 1, column);
        }

        debug!("boundary tracking converged with {} mesh points", mesh.len());
        Ok(BoundaryFlow {
            frames: assemble_frames(t_eval, &columns),
            mesh,
        })
    }

    /// Evaluates the boundary curve at `s` and integrates the resulting
    /// initial state over the span, sampled on the output grid.
    fn integrate_from(
        &self,
        s: f64,
        t_span: (f64, f64),
        t_eval: &[f64],
    ) -> Result<Vec<DVector<f64>>> {
        let state = self.curve.state_at(s)?;
        let dim = self.field.dimension();
        if state.len() != dim {
            return Err(Error::InvalidBoundaryCurve(format!(
                "state at s = {s} has dimension {}, expected {dim}",
                state.len()
            )));
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidBoundaryCurve(format!(
                "state at s = {s} has non-finite components"
            )));
        }
        let trajectory = solve_ivp(self.field, t_span, &state, Some(t_eval), &self.ivp)?;
        Ok(trajectory.y)
    }
}

/// Scans every output time and every mesh-adjacent pair, jointly over the
/// full time history. A pair of trajectories may diverge early and
/// re-converge later (or the reverse), so no time may be skipped.
fn measure(columns: &[Vec<DVector<f64>>], atol: f64, rtol: f64) -> Measurement {
    let n_times = columns[0].len();
    let mut converged = true;
    let mut worst: Option<WorstEdge> = None;

    for k in 0..n_times {
        for i in 0..columns.len() - 1 {
            let mut dd = adjacent_distance(&columns[i][k], &columns[i + 1][k]);
            if dd.is_nan() {
                dd = f64::INFINITY;
            }
            let allowed = atol + rtol * columns[i][k].norm();
            if !(dd <= allowed) {
                converged = false;
            }
            let is_worse = match &worst {
                None => true,
                Some(w) => dd > w.distance,
            };
            if is_worse {
                worst = Some(WorstEdge {
                    pair: i,
                    time_index: k,
                    distance: dd,
                });
            }
        }
    }

    match (converged, worst) {
        (false, Some(worst)) => Measurement::Refine(worst),
        _ => Measurement::Converged,
    }
}

fn adjacent_distance(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let mut acc = 0.0;
    for i in 0..a.len() {
        let diff = b[i] - a[i];
        acc += diff * diff;
    }
    acc.sqrt()
}

fn assemble_frames(t_eval: &[f64], columns: &[Vec<DVector<f64>>]) -> Frames {
    let dim = columns[0][0].len();
    let data = (0..t_eval.len())
        .map(|k| DMatrix::from_fn(dim, columns.len(), |r, c| columns[c][k][r]))
        .collect();
    Frames {
        times: t_eval.to_vec(),
        data,
    }
}

/// Tracks a boundary curve with default integrator options.
pub fn track_boundary<F, C>(
    field: &F,
    curve: &C,
    t_eval: &[f64],
    settings: RefinementSettings,
) -> Result<BoundaryFlow>
where
    F: VectorField<f64>,
    C: BoundaryCurve,
{
    BoundaryTracker::new(field, curve, settings, IvpOptions::default()).track(t_eval)
}
