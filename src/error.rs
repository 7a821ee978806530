// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, io, path::PathBuf};

/// Errors raised by the control surface and the source/sink collaborators.
///
/// The decoder and the queues never return errors; malformed input and
/// overload are absorbed locally and only show up in the drop counters.
#[derive(Debug)]
pub enum Error {
    /// I/O error from a file, device or thread spawn.
    Io(io::Error),
    /// Serial port could not be opened or configured.
    #[cfg(feature = "serial")]
    Serial(serialport::Error),
    /// CSV encoding error from the detection writer.
    Csv(csv::Error),
    /// JSON encoding error from the detection writer.
    Json(serde_json::Error),
    /// No source is registered under this id.
    UnknownSource(u32),
    /// `start()` called on a component that is already running.
    AlreadyRunning,
    /// Replay speed multiplier must be strictly positive.
    InvalidSpeed(f64),
    /// Replay file does not exist.
    FileNotFound(PathBuf),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Error {
        Error::Serial(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Error {
        Error::Csv(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            #[cfg(feature = "serial")]
            Error::Serial(err) => write!(f, "serial error: {}", err),
            Error::Csv(err) => write!(f, "csv error: {}", err),
            Error::Json(err) => write!(f, "json error: {}", err),
            Error::UnknownSource(id) => write!(f, "unknown radar source: {}", id),
            Error::AlreadyRunning => write!(f, "already running"),
            Error::InvalidSpeed(speed) => write!(f, "invalid replay speed: {}", speed),
            Error::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
        }
    }
}
