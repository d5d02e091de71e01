//! Raw record passthrough sink
//!
//! Persists each read batch verbatim as fixed-width 4-byte little-endian
//! unsigned integers, no framing header. The resulting file is the exact
//! record stream the hardware delivered and can be re-decoded offline.

use super::{EventSink, SinkError};
use crate::decoder::DecodedEvent;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct RawSink<W: Write> {
    writer: W,
}

impl RawSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> RawSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for RawSink<W> {
    fn on_batch(&mut self, records: &[u32]) -> Result<(), SinkError> {
        for &record in records {
            self.writer.write_all(&record.to_le_bytes())?;
        }
        Ok(())
    }

    fn on_event(&mut self, _event: &DecodedEvent) -> Result<(), SinkError> {
        // Passthrough only; decoded events are not re-encoded
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
