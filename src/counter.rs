//! Byte-rate counter shared by concurrent transfer streams
//!
//! A single [`RateCounter`] instruments every stream of one download or
//! upload test. Downloads push received chunks through [`RateCounter::write`];
//! uploads pull their request body through [`RateCounter::read`], which
//! replays a fixed random payload from offset 0 every time a full cycle has
//! been consumed.

use crate::error::{AppError, Result};
use crate::types::UnitBase;
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tokio::time::Instant;

/// Payload length used when none is configured (1 MiB)
pub const DEFAULT_CYCLE_SIZE: usize = 1024 * 1024;

/// Seekable byte source an upload body is drawn from
pub trait PayloadSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> PayloadSource for T {}

/// Endless reader over the OS entropy source.
///
/// Seeking is a no-op, so cycling the counter costs nothing but every byte
/// is generated on demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSource;

impl Read for RandomSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        OsRng.try_fill_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }
}

impl Seek for RandomSource {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Ok(0)
    }
}

struct CounterState {
    start: Option<Instant>,
    position: usize,
    total: u64,
    payload: Option<Arc<[u8]>>,
    source: Option<Box<dyn PayloadSource>>,
}

/// Thread-safe transferred-bytes counter with rate reporting
pub struct RateCounter {
    state: Mutex<CounterState>,
    cycle_size: usize,
    unit: UnitBase,
}

impl RateCounter {
    /// Create a counter with the default 1 MiB cycle
    pub fn new(unit: UnitBase) -> Self {
        Self::with_cycle_size(unit, DEFAULT_CYCLE_SIZE)
    }

    /// Create a counter whose source restarts every `cycle_size` bytes
    pub fn with_cycle_size(unit: UnitBase, cycle_size: usize) -> Self {
        Self {
            state: Mutex::new(CounterState {
                start: None,
                position: 0,
                total: 0,
                payload: None,
                source: None,
            }),
            cycle_size,
            unit,
        }
    }

    pub fn unit(&self) -> UnitBase {
        self.unit
    }

    pub fn cycle_size(&self) -> usize {
        self.cycle_size
    }

    /// Fill a `size`-byte buffer with OS randomness and read from it.
    ///
    /// The returned error is fatal: without payload data no upload traffic
    /// can be produced.
    pub fn generate_payload(&self, size: usize) -> Result<()> {
        let mut payload = vec![0u8; size];
        OsRng
            .try_fill_bytes(&mut payload)
            .map_err(|e| AppError::random_source(format!("Failed to generate random data: {}", e)))?;

        let payload: Arc<[u8]> = payload.into();
        let mut state = self.state.lock();
        state.source = Some(Box::new(Cursor::new(payload.clone())));
        state.payload = Some(payload);
        state.position = 0;
        Ok(())
    }

    /// Bind an arbitrary source, e.g. [`RandomSource`] when pre-allocation is off
    pub fn bind_source<S: PayloadSource + 'static>(&self, source: S) {
        let mut state = self.state.lock();
        state.source = Some(Box::new(source));
        state.payload = None;
        state.position = 0;
    }

    /// The pre-generated payload, if one was generated
    pub fn payload(&self) -> Option<Arc<[u8]>> {
        self.state.lock().payload.clone()
    }

    /// Start the rate clock. Only the first call has an effect.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.start.is_none() {
            state.start = Some(Instant::now());
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().start.is_some()
    }

    /// Record an outbound or received chunk; never fails
    pub fn write(&self, chunk: &[u8]) -> usize {
        self.add(chunk.len())
    }

    /// Record `n` bytes without a buffer
    pub fn add(&self, n: usize) -> usize {
        self.state.lock().total += n as u64;
        n
    }

    /// Pull bytes from the bound source, counting them and cycling the source.
    ///
    /// Errors and EOF from the source are returned unchanged.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let source = state
            .source
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no payload source bound"))?;

        let n = source.read(buf)?;
        state.total += n as u64;
        state.position += n;
        if self.cycle_size > 0 && state.position >= self.cycle_size {
            source.seek(SeekFrom::Start(0))?;
            state.position = 0;
        }
        Ok(n)
    }

    /// Bytes transferred since creation
    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total
    }

    /// Bytes consumed from the current payload cycle
    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    /// Average bytes per second since [`start`](Self::start).
    ///
    /// Returns `0.0` before the clock is started or when no time has elapsed.
    pub fn average_rate_bytes_per_sec(&self) -> f64 {
        let (total, start) = {
            let state = self.state.lock();
            (state.total, state.start)
        };

        let Some(start) = start else {
            return 0.0;
        };
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        total as f64 / elapsed
    }

    /// Average megabits per second (or mebibit-based with a binary unit base)
    pub fn average_rate_mbps(&self) -> f64 {
        self.average_rate_bytes_per_sec() / self.unit.megabit_divisor()
    }

    /// Average rate scaled to the largest fitting byte unit
    pub fn humanized_rate(&self) -> String {
        humanize_bytes_per_sec(self.average_rate_bytes_per_sec(), self.unit)
    }
}

impl std::fmt::Debug for RateCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RateCounter")
            .field("total", &state.total)
            .field("position", &state.position)
            .field("started", &state.start.is_some())
            .field("cycle_size", &self.cycle_size)
            .field("unit", &self.unit)
            .finish()
    }
}

impl Read for &RateCounter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        RateCounter::read(self, buf)
    }
}

impl Write for &RateCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(RateCounter::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Format a bytes/second value as bytes, kilo-, mega- or giga-bytes per second
pub fn humanize_bytes_per_sec(value: f64, unit: UnitBase) -> String {
    let base = unit.step();
    let labels = match unit {
        UnitBase::Decimal => ["KB/s", "MB/s", "GB/s"],
        UnitBase::Binary => ["KiB/s", "MiB/s", "GiB/s"],
    };

    if value < base {
        format!("{:.2} bytes/s", value)
    } else if value / base < base {
        format!("{:.2} {}", value / base, labels[0])
    } else if value / base / base < base {
        format!("{:.2} {}", value / base / base, labels[1])
    } else {
        format!("{:.2} {}", value / base / base / base, labels[2])
    }
}
