// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{common::set_thread_priority, error::Error, registry::SourceHandle};
use log::{debug, error, info, warn};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Bytes requested from a source per read.
pub const CHUNK_SIZE: usize = 4096;

/// Default UART rate of the radar data port.
pub const DEFAULT_BAUD: u32 = 921600;

const INACTIVE_SLEEP: Duration = Duration::from_millis(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of a single [`ChunkSource::produce_chunk`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Produced {
    /// `n` bytes were written to the start of the buffer.
    Chunk(usize),
    /// Nothing available yet, call again.
    Idle,
    /// The source is exhausted and will not produce again.
    Finished,
}

/// A producer of raw radar bytes, driven by a [`SourceWorker`].
pub trait ChunkSource: Send {
    /// Reads at most `buf.len()` bytes.  May block for a bounded time.
    fn produce_chunk(&mut self, buf: &mut [u8]) -> Result<Produced, Error>;

    /// Drops any open device so the next call reconnects.
    fn reset(&mut self) {}

    /// Whether the reader thread should request real-time scheduling.
    fn realtime(&self) -> bool {
        false
    }

    fn describe(&self) -> String;
}

/// Reads a recorded byte stream back at a multiple of the serial line
/// rate.
#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    file: File,
    speed: f64,
    looping: bool,
    pending: Duration,
}

impl ReplaySource {
    /// Bytes per second at the default baud rate.
    pub const LINE_RATE: f64 = DEFAULT_BAUD as f64 / 8.0;

    pub fn open<P: AsRef<Path>>(path: P, speed: f64, looping: bool) -> Result<ReplaySource, Error> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(Error::InvalidSpeed(speed));
        }

        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::FileNotFound(path));
        }

        let file = File::open(&path)?;
        Ok(ReplaySource {
            path,
            file,
            speed,
            looping,
            pending: Duration::ZERO,
        })
    }

    /// Delay emulating the transfer of `len` bytes over the serial line.
    pub fn pacing(&self, len: usize) -> Duration {
        Duration::from_secs_f64(len as f64 / Self::LINE_RATE / self.speed)
    }
}

impl ChunkSource for ReplaySource {
    fn produce_chunk(&mut self, buf: &mut [u8]) -> Result<Produced, Error> {
        if !self.pending.is_zero() {
            thread::sleep(self.pending);
            self.pending = Duration::ZERO;
        }

        let mut n = read_full(&mut self.file, buf)?;
        if n == 0 && self.looping {
            debug!("rewinding {}", self.path.display());
            self.file.seek(SeekFrom::Start(0))?;
            n = read_full(&mut self.file, buf)?;
        }

        if n == 0 {
            return Ok(Produced::Finished);
        }

        self.pending = self.pacing(n);
        Ok(Produced::Chunk(n))
    }

    fn describe(&self) -> String {
        format!("replay {} at {}x", self.path.display(), self.speed)
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Live radar data port.  The port is opened lazily and reopened after
/// [`ChunkSource::reset`].
#[cfg(feature = "serial")]
pub struct SerialSource {
    port_name: String,
    baud: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[cfg(feature = "serial")]
impl SerialSource {
    pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

    pub fn new(port_name: &str, baud: u32) -> SerialSource {
        SerialSource {
            port_name: port_name.to_string(),
            baud,
            port: None,
        }
    }

    pub fn open(&self) -> Result<Box<dyn serialport::SerialPort>, Error> {
        let port = serialport::new(&self.port_name, self.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Self::READ_TIMEOUT)
            .open()?;
        info!("opened {} at {} baud", self.port_name, self.baud);
        Ok(port)
    }
}

#[cfg(feature = "serial")]
impl ChunkSource for SerialSource {
    fn produce_chunk(&mut self, buf: &mut [u8]) -> Result<Produced, Error> {
        if self.port.is_none() {
            self.port = Some(self.open()?);
        }

        let Some(port) = self.port.as_mut() else {
            return Ok(Produced::Idle);
        };

        match port.read(buf) {
            Ok(0) => Ok(Produced::Idle),
            Ok(n) => Ok(Produced::Chunk(n)),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(Produced::Idle),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(Produced::Idle),
            Err(err) => Err(err.into()),
        }
    }

    fn reset(&mut self) {
        self.port = None;
    }

    fn realtime(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("serial {} at {} baud", self.port_name, self.baud)
    }
}

/// Drives a [`ChunkSource`] on its own thread, pushing every chunk into
/// the source's queue.
pub struct SourceWorker {
    handle: SourceHandle,
    source: Option<Box<dyn ChunkSource>>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<Box<dyn ChunkSource>>>,
}

impl SourceWorker {
    pub fn new(handle: SourceHandle, source: Box<dyn ChunkSource>) -> SourceWorker {
        SourceWorker {
            handle,
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn source_id(&self) -> u32 {
        self.handle.source_id()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// True once the source reported [`Produced::Finished`].
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn start(&mut self) -> Result<(), Error> {
        if self.thread.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let source = match self.source.take() {
            Some(source) => source,
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "source lost after reader panic",
                )))
            }
        };

        self.running.store(true, Ordering::Release);
        self.finished.store(false, Ordering::Release);

        let handle = self.handle.clone();
        let running = self.running.clone();
        let finished = self.finished.clone();

        // The closure owns the source, so a failed spawn loses it.
        let thread = thread::Builder::new()
            .name(format!("source-{}", handle.source_id()))
            .spawn(move || read_loop(handle, source, running, finished));

        match thread {
            Ok(thread) => {
                self.thread = Some(thread);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Signals the reader and takes the source back once it exits, so
    /// the worker can be started again.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => error!("radar {} reader panicked", self.source_id()),
            }
        }
    }
}

impl Drop for SourceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    handle: SourceHandle,
    mut source: Box<dyn ChunkSource>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) -> Box<dyn ChunkSource> {
    let id = handle.source_id();
    info!("radar {} reading from {}", id, source.describe());

    if source.realtime() {
        set_thread_priority();
    }

    let mut buf = vec![0u8; CHUNK_SIZE];

    while running.load(Ordering::Acquire) {
        if !handle.is_active() {
            thread::sleep(INACTIVE_SLEEP);
            continue;
        }

        match source.produce_chunk(&mut buf) {
            Ok(Produced::Chunk(n)) => handle.push(buf[..n].to_vec()),
            Ok(Produced::Idle) => {}
            Ok(Produced::Finished) => {
                info!("radar {} finished", id);
                finished.store(true, Ordering::Release);
                break;
            }
            Err(err) => {
                warn!("radar {} read error: {}", id, err);
                source.reset();
                sleep_while(&running, RETRY_DELAY);
            }
        }
    }

    source
}

fn sleep_while(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(INACTIVE_SLEEP));
    }
}
