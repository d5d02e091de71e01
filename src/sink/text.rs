//! Text event log sink
//!
//! Reproduces the instrument vendor's line format, one line per event:
//! `CH <channel> <time>` for photons, `MK <bitfield> <time>` for markers.
//! T2 times are printed in picoseconds with no decimal places; T3 lines
//! carry the absolute sync time in seconds (8 decimal places) and the delay
//! in picoseconds.

use super::{EventSink, SinkError};
use crate::decoder::{DecodedEvent, EventKind, RecordMode};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct TextSink<W: Write> {
    writer: W,
    mode: RecordMode,
    /// Base resolution in picoseconds
    resolution_ps: f64,
    /// Sync period in seconds (meaningful in T3 mode only)
    sync_period_s: f64,
}

impl TextSink<BufWriter<File>> {
    pub fn create(
        path: impl AsRef<Path>,
        mode: RecordMode,
        resolution_ps: f64,
        sync_period_s: f64,
    ) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), mode, resolution_ps, sync_period_s)
    }
}

impl<W: Write> TextSink<W> {
    pub fn new(
        mut writer: W,
        mode: RecordMode,
        resolution_ps: f64,
        sync_period_s: f64,
    ) -> Result<Self, SinkError> {
        match mode {
            RecordMode::T2 => writeln!(writer, "ev chn       time/ps\n")?,
            RecordMode::T3 => writeln!(writer, "ev chn  ttag/s   dtime/ps\n")?,
        }
        Ok(Self {
            writer,
            mode,
            resolution_ps,
            sync_period_s,
        })
    }
}

impl<W: Write> EventSink for TextSink<W> {
    fn on_event(&mut self, event: &DecodedEvent) -> Result<(), SinkError> {
        match (self.mode, event.kind) {
            (RecordMode::T2, EventKind::Photon { channel, .. }) => {
                writeln!(
                    self.writer,
                    "CH {:2} {:14.0}",
                    channel,
                    event.time as f64 * self.resolution_ps
                )?;
            }
            (RecordMode::T2, EventKind::Marker { bits }) => {
                writeln!(
                    self.writer,
                    "MK {:2} {:14.0}",
                    bits,
                    event.time as f64 * self.resolution_ps
                )?;
            }
            (RecordMode::T3, EventKind::Photon { channel, dtime }) => {
                writeln!(
                    self.writer,
                    "CH {:2} {:10.8} {:8.0}",
                    channel,
                    event.time as f64 * self.sync_period_s,
                    dtime.unwrap_or(0) as f64 * self.resolution_ps
                )?;
            }
            (RecordMode::T3, EventKind::Marker { bits }) => {
                writeln!(
                    self.writer,
                    "MK {:2} {:10.8}",
                    bits,
                    event.time as f64 * self.sync_period_s
                )?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photon(mode: RecordMode, time: u64, channel: u8, dtime: Option<u16>) -> DecodedEvent {
        DecodedEvent {
            mode,
            time,
            kind: EventKind::Photon { channel, dtime },
        }
    }

    fn marker(mode: RecordMode, time: u64, bits: u8) -> DecodedEvent {
        DecodedEvent {
            mode,
            time,
            kind: EventKind::Marker { bits },
        }
    }

    fn lines(buf: &[u8]) -> Vec<String> {
        String::from_utf8(buf.to_vec())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_t2_photon_line() {
        let mut buf = Vec::new();
        {
            let mut sink = TextSink::new(&mut buf, RecordMode::T2, 1000.0, 0.0).unwrap();
            let time = 2 * crate::decoder::T2_WRAPAROUND + 100;
            sink.on_event(&photon(RecordMode::T2, time, 4, None)).unwrap();
            sink.finish().unwrap();
        }
        let lines = lines(&buf);
        assert_eq!(lines[0], "ev chn       time/ps");
        // 67108964 base units at 1000 ps each
        assert_eq!(lines[2], "CH  4    67108964000");
    }

    #[test]
    fn test_t2_marker_line() {
        let mut buf = Vec::new();
        {
            let mut sink = TextSink::new(&mut buf, RecordMode::T2, 250.0, 0.0).unwrap();
            sink.on_event(&marker(RecordMode::T2, 8, 5)).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(lines(&buf)[2], "MK  5           2000");
    }

    #[test]
    fn test_t3_photon_line() {
        let mut buf = Vec::new();
        {
            let mut sink = TextSink::new(&mut buf, RecordMode::T3, 80.0, 1.25e-8).unwrap();
            sink.on_event(&photon(RecordMode::T3, 4000, 2, Some(100)))
                .unwrap();
            sink.finish().unwrap();
        }
        let lines = lines(&buf);
        assert_eq!(lines[0], "ev chn  ttag/s   dtime/ps");
        // 4000 sync periods * 12.5 ns = 0.00005 s; 100 * 80 ps = 8000 ps
        assert_eq!(lines[2], "CH  2 0.00005000     8000");
    }

    #[test]
    fn test_t3_marker_line() {
        let mut buf = Vec::new();
        {
            let mut sink = TextSink::new(&mut buf, RecordMode::T3, 80.0, 1.25e-8).unwrap();
            sink.on_event(&marker(RecordMode::T3, 4000, 3)).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(lines(&buf)[2], "MK  3 0.00005000");
    }
}
