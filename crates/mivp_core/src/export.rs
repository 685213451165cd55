//! Visualization export boundary.
//!
//! Rendering and video encoding live outside this crate; the contract here is
//! a narrow sink that consumes the time-major position tensor plus explicit
//! rendering options. [`JsonFrameWriter`] is the one concrete sink: it emits
//! machine-readable frame records for an external renderer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sample::Frames;

/// Rendering options handed across the export boundary.
///
/// Replaces the process-wide style state of earlier tooling: everything the
/// renderer needs travels in this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieOptions {
    pub path: String,
    pub fps: u32,
    pub fill_color: String,
    pub alpha: f64,
}

impl Default for MovieOptions {
    fn default() -> Self {
        Self {
            path: "boundary.json".to_string(),
            fps: 60,
            fill_color: "#1f77b4".to_string(),
            alpha: 1.0,
        }
    }
}

/// Consumer of finished frame tensors.
pub trait FrameSink {
    fn write_frames(&mut self, frames: &Frames, options: &MovieOptions) -> Result<()>;
}

#[derive(Serialize)]
struct Header<'a> {
    fps: u32,
    fill_color: &'a str,
    alpha: f64,
    frame_count: usize,
}

#[derive(Serialize)]
struct FrameRecord {
    t: f64,
    /// One row per state coordinate, mesh order within each row.
    coords: Vec<Vec<f64>>,
}

/// Writes one JSON record per line: a header with the rendering options,
/// then one record per output time.
pub struct JsonFrameWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonFrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonFrameWriter<W> {
    fn write_frames(&mut self, frames: &Frames, options: &MovieOptions) -> Result<()> {
        let header = Header {
            fps: options.fps,
            fill_color: &options.fill_color,
            alpha: options.alpha,
            frame_count: frames.len(),
        };
        write_record(&mut self.writer, &header)?;

        for (k, frame) in frames.data.iter().enumerate() {
            let record = FrameRecord {
                t: frames.times[k],
                coords: (0..frame.nrows())
                    .map(|r| frame.row(r).iter().copied().collect())
                    .collect(),
            };
            write_record(&mut self.writer, &record)?;
        }
        self.writer
            .flush()
            .map_err(|e| Error::Export(e.to_string()))
    }
}

fn write_record<W: Write, T: Serialize>(writer: &mut W, record: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, record).map_err(|e| Error::Export(e.to_string()))?;
    writer
        .write_all(b"\n")
        .map_err(|e| Error::Export(e.to_string()))
}

/// Convenience wrapper: writes the frames to `options.path`.
pub fn write_frames_to_path(frames: &Frames, options: &MovieOptions) -> Result<()> {
    let file = File::create(Path::new(&options.path)).map_err(|e| Error::Export(e.to_string()))?;
    JsonFrameWriter::new(BufWriter::new(file)).write_frames(frames, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn json_writer_emits_header_and_one_record_per_frame() {
        let frames = Frames {
            times: vec![0.0, 0.5],
            data: vec![
                DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
                DMatrix::from_row_slice(2, 3, &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]),
            ],
        };
        let options = MovieOptions {
            fps: 30,
            ..MovieOptions::default()
        };

        let mut sink = JsonFrameWriter::new(Vec::new());
        sink.write_frames(&frames, &options).expect("write succeeds");
        let output = String::from_utf8(sink.into_inner()).expect("valid utf8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);

        let header: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json");
        assert_eq!(header["fps"], 30);
        assert_eq!(header["frame_count"], 2);

        let frame: serde_json::Value = serde_json::from_str(lines[1]).expect("valid json");
        assert_eq!(frame["t"], 0.0);
        assert_eq!(frame["coords"][0][2], 2.0);
        assert_eq!(frame["coords"][1][0], 3.0);
    }
}
