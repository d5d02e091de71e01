//! Event sinks and fan-out dispatch
//!
//! Decoded events are routed to every registered sink in registration order,
//! at most once per event, before the next record is processed. Sinks own
//! their private accumulation state (e.g. the histogram); they never touch
//! shared decode state. A write failure is fatal to the stream's session but
//! must not corrupt output already written.

mod histogram;
mod raw;
mod text;

pub use histogram::HistogramSink;
pub use raw::RawSink;
pub use text::TextSink;

use crate::decoder::DecodedEvent;
use thiserror::Error;

/// Sink write failure (disk full, closed pipe, ...)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A consumer of decoded events.
///
/// `on_batch` sees each raw read batch before its records are decoded; only
/// passthrough sinks use it. `finish` flushes and writes any deferred output
/// (histogram table); it is called exactly once at session end, on error
/// paths too.
pub trait EventSink {
    fn on_batch(&mut self, _records: &[u32]) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_event(&mut self, event: &DecodedEvent) -> Result<(), SinkError>;

    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Ordered fan-out over the registered sinks of one stream
#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register(&mut self, sink: Box<dyn EventSink + Send>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver a raw batch to every sink, in registration order
    pub fn dispatch_batch(&mut self, records: &[u32]) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.on_batch(records)?;
        }
        Ok(())
    }

    /// Deliver one event to every sink, in registration order
    pub fn dispatch(&mut self, event: &DecodedEvent) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.on_event(event)?;
        }
        Ok(())
    }

    /// Finalize every sink. All sinks are finalized even if one fails; the
    /// first error is returned.
    pub fn finish(&mut self) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
