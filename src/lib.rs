// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! RadarLog Library
//!
//! This library ingests the UART data stream of TI mmWave radar sensors
//! (AWR1843 out-of-box demo format), recovers frames from arbitrarily
//! chunked bytes and decodes the detected points they carry.
//!
//! # Features
//!
//! - **Frame Decoder** - Self-synchronising magic word search and TLV
//!   parsing with Q-format to metric conversion
//! - **Ingestion Pipeline** - Lossy bounded queues per radar, drained by a
//!   single decoding thread into a bounded output queue
//! - **Sources** - Live serial ports and paced replay of recordings
//! - **Sinks** - Console lines, CSV and JSON lines detection logs
//!
//! Overload never blocks a producer: every full queue evicts its oldest
//! element and counts the drop.

/// Crate error type
pub mod error;

/// Common utilities
pub mod common;

/// Frame and TLV decoding of the mmWave UART protocol
pub mod tlv;

/// Bounded queue evicting the oldest element on overflow
pub mod queue;

/// Registered radar sources and their queues
pub mod registry;

/// Decoding thread moving chunks to detections
pub mod pipeline;

/// Byte producers feeding the registry
pub mod source;

/// Detection output formats
pub mod sink;
