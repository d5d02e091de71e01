//! Emulated TTTR device - generates record streams for testing and demos
//!
//! Produces the same wire format a real instrument delivers: photon and
//! marker records interleaved with overflow records whenever the truncated
//! local time field would wrap. Emitted streams therefore decode to
//! monotonically increasing absolute times.

use super::{Device, DeviceError, RecordBatch, StatusFlags};
use crate::decoder::{encode_t2, encode_t3, RecordMode, DTIME_BINS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use std::time::Duration;
use tracing::debug;

/// Emulator configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Record encoding to emit
    pub mode: RecordMode,
    /// Number of regular input channels (hardware numbering 0..N-1)
    pub channels: u8,
    /// Duration of one local time unit in picoseconds
    /// (T2: base resolution; T3: sync period)
    pub unit_ps: f64,
    /// Mean spacing between events in local time units
    pub mean_interval: f64,
    /// Probability that a generated event is a marker record
    pub marker_probability: f64,
    /// Mean of the exponential T3 delay distribution, in resolution units
    pub dtime_mean: f64,
    /// Upper bound on records served per read
    pub records_per_batch: usize,
    /// Records still delivered after the acquisition time has elapsed
    /// (exercises the Draining transition)
    pub residual_records: usize,
    /// Report a FIFO overrun after this many records (never, if None)
    pub overrun_after: Option<u64>,
    /// RNG seed for reproducible streams
    pub seed: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            mode: RecordMode::T2,
            channels: 4,
            unit_ps: 80.0,
            mean_interval: 50_000.0,
            marker_probability: 0.001,
            dtime_mean: 2000.0,
            records_per_batch: 4096,
            residual_records: 0,
            overrun_after: None,
            seed: None,
        }
    }
}

/// Software stand-in for a TTTR instrument
pub struct Emulator {
    config: EmulatorConfig,
    rng: StdRng,
    interval: Exp<f64>,
    dtime: Exp<f64>,
    running: bool,
    /// Absolute emulated clock in local time units
    clock: u64,
    /// Local-unit count at which the acquisition time elapses
    end_of_time: u64,
    /// Overflow periods already represented by emitted overflow records
    overflow_periods: u64,
    records_emitted: u64,
    residual_left: usize,
    /// Records generated but not yet served by `read_batch`
    pending: std::collections::VecDeque<u32>,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let interval = Exp::new(1.0 / config.mean_interval.max(1.0))
            .unwrap_or_else(|_| Exp::new(1.0).unwrap());
        let dtime =
            Exp::new(1.0 / config.dtime_mean.max(1.0)).unwrap_or_else(|_| Exp::new(1.0).unwrap());
        let residual_left = config.residual_records;
        Self {
            config,
            rng,
            interval,
            dtime,
            running: false,
            clock: 0,
            end_of_time: 0,
            overflow_periods: 0,
            records_emitted: 0,
            residual_left,
            pending: std::collections::VecDeque::new(),
        }
    }

    fn wraparound(&self) -> u64 {
        self.config.mode.wraparound()
    }

    fn overrun_reached(&self) -> bool {
        matches!(self.config.overrun_after, Some(n) if self.records_emitted >= n)
    }

    /// Generate overflow records covering the next clock advance, then one
    /// event record, into the pending queue
    fn generate_event(&mut self) {
        let step = self.interval.sample(&mut self.rng).max(1.0) as u64;
        self.clock += step;

        let periods = self.clock / self.wraparound();
        if periods > self.overflow_periods {
            // The repeat count shares the local time field, so long gaps are
            // covered by several overflow records.
            let field_max = match self.config.mode {
                RecordMode::T2 => (1u64 << 25) - 1,
                RecordMode::T3 => (1u64 << 10) - 1,
            };
            let mut count = periods - self.overflow_periods;
            while count > 0 {
                let chunk = count.min(field_max);
                let raw = match self.config.mode {
                    RecordMode::T2 => encode_t2(chunk as u32, 63, true),
                    RecordMode::T3 => encode_t3(chunk as u16, 0, 63, true),
                };
                self.pending.push_back(raw);
                count -= chunk;
            }
            self.overflow_periods = periods;
        }

        let local = self.clock - self.overflow_periods * self.wraparound();
        let raw = if self.rng.gen_bool(self.config.marker_probability) {
            let bits = self.rng.gen_range(1..=15u8);
            match self.config.mode {
                RecordMode::T2 => encode_t2(local as u32, bits, true),
                RecordMode::T3 => encode_t3(local as u16, 0, bits, true),
            }
        } else {
            let channel = self.rng.gen_range(0..self.config.channels.max(1));
            match self.config.mode {
                RecordMode::T2 => encode_t2(local as u32, channel, false),
                RecordMode::T3 => {
                    let dt = (self.dtime.sample(&mut self.rng) as usize).min(DTIME_BINS - 1);
                    encode_t3(local as u16, dt as u16, channel, false)
                }
            }
        };
        self.pending.push_back(raw);
    }
}

impl Device for Emulator {
    fn start_acquisition(&mut self, duration: Duration) -> Result<(), DeviceError> {
        if self.running {
            return Err(DeviceError::new(-1, "acquisition already running"));
        }
        let unit_ps = self.config.unit_ps.max(f64::MIN_POSITIVE);
        self.end_of_time = (duration.as_nanos() as f64 * 1000.0 / unit_ps) as u64;
        self.clock = 0;
        self.overflow_periods = 0;
        self.records_emitted = 0;
        self.residual_left = self.config.residual_records;
        self.pending.clear();
        self.running = true;
        debug!(
            mode = %self.config.mode,
            end_of_time = self.end_of_time,
            "emulator acquisition started"
        );
        Ok(())
    }

    fn read_batch(&mut self, max_records: usize) -> Result<RecordBatch, DeviceError> {
        if !self.running {
            return Err(DeviceError::new(-6, "acquisition not started"));
        }

        let mut batch = RecordBatch::new();
        if self.overrun_reached() {
            // Hardware reports the overrun via the status flags; reads
            // return nothing once the FIFO has tipped over.
            return Ok(batch);
        }

        let budget = max_records.min(self.config.records_per_batch);
        while batch.len() < budget {
            if let Some(raw) = self.pending.pop_front() {
                batch.push(raw);
                self.records_emitted += 1;
                continue;
            }
            if self.clock >= self.end_of_time {
                if self.residual_left == 0 {
                    break;
                }
                self.residual_left -= 1;
            }
            self.generate_event();
        }
        Ok(batch)
    }

    fn poll_status(&mut self) -> Result<StatusFlags, DeviceError> {
        Ok(StatusFlags {
            fifo_overrun: self.overrun_reached(),
            acquisition_time_elapsed: self.clock >= self.end_of_time,
        })
    }

    fn stop_acquisition(&mut self) -> Result<(), DeviceError> {
        self.running = false;
        Ok(())
    }
}
