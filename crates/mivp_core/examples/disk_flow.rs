//! Tracks a disk boundary under a globally attracting linear flow and writes
//! the frames for an external renderer.
//!
//! Run with `RUST_LOG=debug` to watch the refinement loop work.

use std::f64::consts::TAU;

use anyhow::Result;
use mivp_core::export::{write_frames_to_path, MovieOptions};
use mivp_core::{track_boundary, RefinementSettings, VectorField};

/// dx = -2x + y, dy = -2y + x
struct Attracting;

impl VectorField<f64> for Attracting {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = -2.0 * y[0] + y[1];
        dydt[1] = -2.0 * y[1] + y[0];
    }
}

fn main() -> Result<()> {
    env_logger::init();

    // Radius-2 circle centered at (2.5, 0).
    let curve = |s: f64| {
        let angle = TAU * s;
        vec![2.5 + 2.0 * angle.cos(), 2.0 * angle.sin()]
    };
    let times: Vec<f64> = (0..=600).map(|i| i as f64 / 60.0).collect();
    let settings = RefinementSettings {
        atol: 0.1,
        rtol: 0.0,
        ..RefinementSettings::default()
    };

    let flow = track_boundary(&Attracting, &curve, &times, settings)?;
    println!(
        "converged with {} mesh points over {} frames",
        flow.mesh.len(),
        flow.frames.len()
    );

    let options = MovieOptions {
        path: "disk_flow_frames.json".to_string(),
        fps: 60,
        ..MovieOptions::default()
    };
    write_frames_to_path(&flow.frames, &options)?;
    println!("frames written to {}", options.path);
    Ok(())
}
