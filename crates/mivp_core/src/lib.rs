//! The `mivp_core` crate tracks families of initial value problems: given a
//! vector field and a closed curve of initial states, it computes, for a
//! sequence of output times, a polygon approximating the image of that curve
//! under the flow, refining the parameter sampling adaptively until the
//! polygon stays within a prescribed error envelope at every output time.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `VectorField` (flows),
//!   `Steppable` (steppers).
//! - **Solvers**: fixed-step RK4 and adaptive Dormand-Prince 5(4) steppers.
//! - **Ivp**: the one-trajectory and batch solve drivers with dense output.
//! - **Boundary**: the adaptive boundary-tracking refiner.
//! - **Sample**: extraction of time-major position tensors.
//! - **Export**: the narrow visualization sink consumed by external renderers.
pub mod boundary;
pub mod error;
pub mod export;
pub mod ivp;
pub mod sample;
pub mod solvers;
pub mod traits;

pub use boundary::{
    track_boundary, BoundaryCurve, BoundaryFlow, BoundaryTracker, CancelToken, RefinementSettings,
};
pub use error::{Error, Result};
pub use ivp::{solve_batch, solve_ivp, IvpOptions, Method, Trajectory};
pub use sample::{sample_flow, Frames};
pub use traits::{Scalar, Steppable, VectorField};
