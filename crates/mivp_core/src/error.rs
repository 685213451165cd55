use thiserror::Error;

/// Failure taxonomy for the multi-IVP pipeline.
///
/// Every failure aborts the whole operation; there is no partial-result
/// recovery. Callers can match on the variant to tell which stage failed:
/// integration, boundary-curve evaluation, refinement, sampling, or export.
#[derive(Debug, Error)]
pub enum Error {
    /// The numerical integrator could not produce a trajectory
    /// (invalid input, stiffness, step-size underflow, step budget exceeded).
    #[error("integration failed: {0}")]
    IntegrationFailure(String),

    /// The boundary curve returned a malformed or non-finite state.
    #[error("invalid boundary curve: {0}")]
    InvalidBoundaryCurve(String),

    /// The mesh ceiling was reached before the joint convergence test passed.
    #[error(
        "refinement did not converge: mesh size {mesh_size} reached with worst edge {worst_edge}"
    )]
    RefinementDidNotConverge { mesh_size: usize, worst_edge: f64 },

    /// A dense-output query fell outside a trajectory's valid span.
    #[error("time {t} outside trajectory span [{start}, {end}]")]
    TimeOutOfSpan { t: f64, start: f64, end: f64 },

    /// Cancellation was requested between refinement iterations.
    #[error("operation cancelled")]
    Cancelled,

    /// The frame exporter could not write its output.
    #[error("export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, Error>;
