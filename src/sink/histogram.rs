//! Live T3 delay histogram sink
//!
//! Accumulates photon counts per (channel, delay bin) over the full 15-bit
//! delay range. The table lives for one acquisition session: cleared at
//! construction, serialized only in `finish` after acquisition stops.

use super::{EventSink, SinkError};
use crate::decoder::{DecodedEvent, EventKind, DTIME_BINS};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct HistogramSink<W: Write> {
    writer: Option<W>,
    /// channel-major: bins[channel * DTIME_BINS + dtime]
    bins: Vec<u32>,
    channels: usize,
}

impl HistogramSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, channels: usize) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), channels))
    }
}

impl<W: Write> HistogramSink<W> {
    pub fn new(writer: W, channels: usize) -> Self {
        Self {
            writer: Some(writer),
            bins: vec![0u32; channels * DTIME_BINS],
            channels,
        }
    }

    /// Count in a given (channel, delay) cell; channel is 1-based as reported
    pub fn count(&self, channel: usize, dtime: usize) -> u32 {
        self.bins[(channel - 1) * DTIME_BINS + dtime]
    }

    fn write_table(&mut self) -> Result<(), SinkError> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Ok(()),
        };
        for ch in 0..self.channels {
            write!(writer, "  ch{:2} ", ch)?;
        }
        writeln!(writer)?;
        for bin in 0..DTIME_BINS {
            for ch in 0..self.channels {
                write!(writer, "{:6} ", self.bins[ch * DTIME_BINS + bin])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write> EventSink for HistogramSink<W> {
    fn on_event(&mut self, event: &DecodedEvent) -> Result<(), SinkError> {
        if let EventKind::Photon {
            channel,
            dtime: Some(dt),
        } = event.kind
        {
            if channel == 0 {
                return Ok(());
            }
            let idx = (channel as usize - 1) * DTIME_BINS + dt as usize;
            if let Some(cell) = self.bins.get_mut(idx) {
                *cell = cell.saturating_add(1);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.write_table()?;
        // Serialize once, even if finish is called again on a failure path
        self.writer = None;
        Ok(())
    }
}
