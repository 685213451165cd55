use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our vector fields.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A time-dependent vector field on a fixed-dimension state space.
pub trait VectorField<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// y: current state
    /// dydt: buffer to write the state derivative
    fn apply(&self, t: T, y: &[T], dydt: &mut [T]);
}

/// A trait for steppers that can advance a state forward in time.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, field: &impl VectorField<T>, t: &mut T, state: &mut [T], dt: T);
}
