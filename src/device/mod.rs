//! Device transport interface
//!
//! The acquisition core talks to the instrument through this trait only.
//! Discovery, trigger configuration and calibration belong to the transport
//! implementation behind it. One `Device` instance corresponds to one
//! hardware stream; multi-device setups hand the loop one instance each.

pub mod emulator;

pub use emulator::{Emulator, EmulatorConfig};

use std::time::Duration;
use thiserror::Error;

/// Largest number of records one FIFO read can return.
///
/// This is the hardware read-block maximum; [`RecordBatch`] is bounded by it
/// so the overrun-detection contract stays testable regardless of how a
/// transport allocates its buffers.
pub const READ_FIFO_MAX: usize = 131_072;

/// Transport error as reported by the device collaborator
#[derive(Debug, Clone, Error)]
#[error("device error {code}: {description}")]
pub struct DeviceError {
    pub code: i32,
    pub description: String,
}

impl DeviceError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Transport status flags, polled once per loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    /// The hardware FIFO filled faster than the host drained it. Records
    /// were lost upstream; fatal for the session.
    pub fifo_overrun: bool,
    /// The requested acquisition duration has elapsed. Records may still be
    /// queued in hardware.
    pub acquisition_time_elapsed: bool,
}

/// An ordered batch of raw 32-bit records, at most [`READ_FIFO_MAX`] long
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    records: Vec<u32>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Wrap a record sequence, truncating at the FIFO read maximum
    pub fn from_records(mut records: Vec<u32>) -> Self {
        records.truncate(READ_FIFO_MAX);
        Self { records }
    }

    pub fn push(&mut self, record: u32) -> bool {
        if self.records.len() >= READ_FIFO_MAX {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[u32] {
        &self.records
    }
}

/// The transport operations the acquisition loop consumes.
///
/// Every call is expected to return promptly (bounded by the transport's own
/// timeout); `read_batch` may return fewer records than requested, including
/// none.
pub trait Device {
    fn start_acquisition(&mut self, duration: Duration) -> Result<(), DeviceError>;

    fn read_batch(&mut self, max_records: usize) -> Result<RecordBatch, DeviceError>;

    fn poll_status(&mut self) -> Result<StatusFlags, DeviceError>;

    fn stop_acquisition(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_bounded_capacity() {
        let batch = RecordBatch::from_records(vec![0u32; READ_FIFO_MAX + 10]);
        assert_eq!(batch.len(), READ_FIFO_MAX);

        let mut batch = RecordBatch::from_records(vec![0u32; READ_FIFO_MAX]);
        assert!(!batch.push(1), "push past capacity must be rejected");
        assert_eq!(batch.len(), READ_FIFO_MAX);
    }

    #[test]
    fn test_batch_preserves_order() {
        let mut batch = RecordBatch::new();
        for i in 0..10u32 {
            assert!(batch.push(i));
        }
        assert_eq!(batch.records(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new(-15, "communication error");
        let msg = err.to_string();
        assert!(msg.contains("-15"));
        assert!(msg.contains("communication error"));
    }
}
