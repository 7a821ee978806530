// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fmt, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use radarlog::{
    pipeline::PipelineConfig,
    queue::{DEFAULT_OUTPUT_CAPACITY, DEFAULT_SOURCE_CAPACITY},
    sink::OutputFormat,
    tlv::ResyncPolicy,
};
use tracing::level_filters::LevelFilter;

/// File format of the detection log.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Format {
    Csv,
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => OutputFormat::Csv,
            Format::Jsonl => OutputFormat::Jsonl,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::Csv => write!(f, "csv"),
            Format::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Where the decoder resumes scanning after a frame candidate.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Resync {
    /// Retry one byte past an abandoned marker.
    NextByte,
    /// Always skip the 40 byte header.
    SkipHeader,
}

impl From<Resync> for ResyncPolicy {
    fn from(resync: Resync) -> Self {
        match resync {
            Resync::NextByte => ResyncPolicy::NextByte,
            Resync::SkipHeader => ResyncPolicy::SkipHeader,
        }
    }
}

impl fmt::Display for Resync {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Resync::NextByte => write!(f, "next-byte"),
            Resync::SkipHeader => write!(f, "skip-header"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Serial ports of live radars, assigned ids from 0.
    #[arg(long, env, num_args = 1.., value_delimiter = ' ')]
    pub live: Vec<String>,

    /// Recorded .bin files to replay, assigned ids after the live radars.
    #[arg(long, env, num_args = 1.., value_delimiter = ' ')]
    pub replay: Vec<PathBuf>,

    /// Replay speed multiplier relative to the serial line rate.
    #[arg(long, env, default_value = "2.0")]
    pub speed: f64,

    /// Restart replays from the beginning when they reach the end.
    #[arg(long, env)]
    pub loop_replay: bool,

    /// Write detections to this file.
    #[arg(long, env)]
    pub output: Option<PathBuf>,

    /// Detection file format.
    #[arg(long, env, default_value = "csv")]
    pub format: Format,

    /// Disable printing detections to stdout.
    #[arg(long, env)]
    pub no_console: bool,

    /// Radar ids to deactivate after startup.
    #[arg(long, env, num_args = 1.., value_delimiter = ' ')]
    pub deactivate_radar: Vec<u32>,

    /// Radar ids to reactivate after startup, applied after deactivation.
    #[arg(long, env, num_args = 1.., value_delimiter = ' ')]
    pub activate_radar: Vec<u32>,

    /// Raw chunks buffered per radar before the oldest are dropped.
    #[arg(long, env, default_value_t = DEFAULT_SOURCE_CAPACITY)]
    pub source_capacity: usize,

    /// Detections buffered before the oldest are dropped.
    #[arg(long, env, default_value_t = DEFAULT_OUTPUT_CAPACITY)]
    pub output_capacity: usize,

    /// Pipeline sleep in microseconds when no data was available.
    #[arg(long, env, default_value = "500")]
    pub idle_sleep_us: u64,

    /// Decoder resynchronisation policy.
    #[arg(long, env, default_value = "next-byte")]
    pub resync: Resync,

    /// Serial baud rate of live radars.
    #[arg(long, env, default_value = "921600")]
    pub baud: u32,

    /// Interval in seconds between performance reports, 0 to disable.
    #[arg(long, env, default_value = "3")]
    pub stats_interval: u64,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,
}

impl From<&Args> for PipelineConfig {
    fn from(args: &Args) -> Self {
        PipelineConfig {
            source_capacity: args.source_capacity,
            output_capacity: args.output_capacity,
            idle_sleep: Duration::from_micros(args.idle_sleep_us),
            resync: args.resync.into(),
        }
    }
}
