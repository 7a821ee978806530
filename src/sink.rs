// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{error::Error, pipeline::Detection};
use serde_json::json;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Column names of the detection CSV, also used as JSON keys.
pub const FIELDS: [&str; 12] = [
    "timestamp",
    "radar_id",
    "frame_number",
    "angle",
    "distance",
    "velocity",
    "x",
    "y",
    "z",
    "peak_val",
    "range_idx",
    "doppler_idx",
];

/// One console line per detection.
pub fn format_detection(detection: &Detection) -> String {
    let obj = &detection.object;
    format!(
        "R{}: {:6.1}° {:6.1}cm vel:{:5.1} peak:{}",
        obj.source_id, obj.angle_deg, obj.range_cm, obj.radial_velocity_mps, obj.peak_amplitude
    )
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
    #[default]
    Csv,
    /// One JSON object per line.
    Jsonl,
}

enum Encoder<W: Write> {
    Csv(csv::Writer<W>),
    Jsonl(W),
}

/// Persists detections in the selected [`OutputFormat`].
pub struct DetectionWriter<W: Write> {
    encoder: Encoder<W>,
    written: u64,
}

impl DetectionWriter<BufWriter<File>> {
    /// Creates or truncates `path`.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self, Error> {
        let file = File::create(path)?;
        DetectionWriter::new(BufWriter::new(file), format)
    }
}

impl<W: Write> DetectionWriter<W> {
    /// Wraps `writer`.  The CSV header is written immediately.
    pub fn new(writer: W, format: OutputFormat) -> Result<Self, Error> {
        let encoder = match format {
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(writer);
                writer.write_record(FIELDS)?;
                Encoder::Csv(writer)
            }
            OutputFormat::Jsonl => Encoder::Jsonl(writer),
        };

        Ok(DetectionWriter {
            encoder,
            written: 0,
        })
    }

    pub fn write(&mut self, detection: &Detection) -> Result<(), Error> {
        let obj = &detection.object;

        match &mut self.encoder {
            Encoder::Csv(writer) => writer.write_record(&[
                format!("{:.6}", detection.capture_time),
                obj.source_id.to_string(),
                obj.frame_number.to_string(),
                obj.angle_deg.to_string(),
                obj.range_cm.to_string(),
                obj.radial_velocity_mps.to_string(),
                obj.x_m.to_string(),
                obj.y_m.to_string(),
                obj.z_m.to_string(),
                obj.peak_amplitude.to_string(),
                obj.range_bin_index.to_string(),
                obj.doppler_bin_index.to_string(),
            ])?,
            Encoder::Jsonl(writer) => {
                let line = json!({
                    "timestamp": detection.capture_time,
                    "radar_id": obj.source_id,
                    "frame_number": obj.frame_number,
                    "angle": obj.angle_deg,
                    "distance": obj.range_cm,
                    "velocity": obj.radial_velocity_mps,
                    "x": obj.x_m,
                    "y": obj.y_m,
                    "z": obj.z_m,
                    "peak_val": obj.peak_amplitude,
                    "range_idx": obj.range_bin_index,
                    "doppler_idx": obj.doppler_bin_index,
                });
                serde_json::to_writer(&mut *writer, &line)?;
                writer.write_all(b"\n")?;
            }
        }

        self.written += 1;
        Ok(())
    }

    pub fn write_batch(&mut self, batch: &[Detection]) -> Result<(), Error> {
        for detection in batch {
            self.write(detection)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        match &mut self.encoder {
            Encoder::Csv(writer) => writer.flush()?,
            Encoder::Jsonl(writer) => writer.flush()?,
        }
        Ok(())
    }

    /// Detections written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, Error> {
        match self.encoder {
            Encoder::Csv(writer) => writer.into_inner().map_err(|err| Error::Io(err.into_error())),
            Encoder::Jsonl(mut writer) => {
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::DetectedObject;

    fn detection(source_id: u32, x_m: f64, y_m: f64) -> Detection {
        Detection {
            capture_time: 1700000000.25,
            object: DetectedObject {
                source_id,
                frame_number: 42,
                angle_deg: y_m.atan2(x_m).to_degrees(),
                range_cm: (x_m * x_m + y_m * y_m).sqrt() * 100.0,
                radial_velocity_mps: -1.5,
                x_m,
                y_m,
                z_m: 0.5,
                peak_amplitude: 900,
                range_bin_index: 17,
                doppler_bin_index: -15,
            },
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            format_detection(&detection(1, 3.0, 4.0)),
            "R1:   53.1°  500.0cm vel: -1.5 peak:900"
        );
        assert_eq!(
            format_detection(&detection(0, 10.0, 0.0)),
            "R0:    0.0° 1000.0cm vel: -1.5 peak:900"
        );
    }

    #[test]
    fn test_csv() {
        let mut writer = DetectionWriter::new(Vec::new(), OutputFormat::Csv).unwrap();
        writer
            .write_batch(&[detection(0, 2.0, 0.0), detection(1, 0.0, 1.0)])
            .unwrap();
        assert_eq!(writer.written(), 2);

        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,radar_id,frame_number,angle,distance,velocity,x,y,z,peak_val,range_idx,doppler_idx"
        );
        assert_eq!(lines[1], "1700000000.250000,0,42,0,200,-1.5,2,0,0.5,900,17,-15");
        assert_eq!(lines[2], "1700000000.250000,1,42,90,100,-1.5,0,1,0.5,900,17,-15");
    }

    #[test]
    fn test_csv_header_only() {
        let writer = DetectionWriter::new(Vec::new(), OutputFormat::Csv).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_jsonl() {
        let mut writer = DetectionWriter::new(Vec::new(), OutputFormat::Jsonl).unwrap();
        writer
            .write_batch(&[detection(2, 2.0, 0.0), detection(3, 2.0, 0.0)])
            .unwrap();

        let out = writer.into_inner().unwrap();
        let values: Vec<serde_json::Value> = out
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["radar_id"], 2);
        assert_eq!(values[1]["radar_id"], 3);
        assert_eq!(values[0]["distance"], 200.0);
        assert_eq!(values[0]["doppler_idx"], -15);
        for field in FIELDS {
            assert!(values[0].get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.csv");

        let mut writer = DetectionWriter::create(&path, OutputFormat::Csv).unwrap();
        writer.write(&detection(0, 1.0, 0.0)).unwrap();
        writer.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("1700000000.250000,0,42,"));
    }
}
