//! Tracks a ring of initial conditions of a damped pendulum.

use std::f64::consts::TAU;

use anyhow::Result;
use mivp_core::export::{write_frames_to_path, MovieOptions};
use mivp_core::{track_boundary, RefinementSettings, VectorField};

struct Pendulum {
    mass: f64,
    damping: f64,
    length: f64,
    gravity: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self {
            mass: 1.0,
            damping: 0.1,
            length: 1.0,
            gravity: 9.81,
        }
    }
}

impl VectorField<f64> for Pendulum {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let (theta, omega) = (y[0], y[1]);
        let inertia = self.mass * self.length * self.length;
        dydt[0] = omega;
        dydt[1] = -self.gravity / self.length * theta.sin() - self.damping / inertia * omega;
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let pendulum = Pendulum::default();
    // Small ring of initial (angle, angular velocity) states.
    let curve = |s: f64| {
        let angle = TAU * s;
        vec![2.0 + 0.5 * angle.cos(), 0.5 * angle.sin()]
    };
    let times: Vec<f64> = (0..=600).map(|i| i as f64 / 60.0).collect();

    let flow = track_boundary(&pendulum, &curve, &times, RefinementSettings::default())?;
    println!(
        "converged with {} mesh points over {} frames",
        flow.mesh.len(),
        flow.frames.len()
    );

    let options = MovieOptions {
        path: "pendulum_frames.json".to_string(),
        ..MovieOptions::default()
    };
    write_frames_to_path(&flow.frames, &options)?;
    println!("frames written to {}", options.path);
    Ok(())
}
