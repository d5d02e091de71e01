//! Acquisition error taxonomy
//!
//! Decode and correction are total functions and never fail; every error in
//! this pipeline originates at the transport, the sinks, or configuration.
//! All variants are fatal to the affected stream, and the loop still runs
//! its stop-and-cleanup transition before propagating them.

use crate::device::DeviceError;
use crate::sink::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Communication fault with the device collaborator (read, start, stop
    /// or poll failed)
    #[error("transport error: {0}")]
    Transport(#[from] DeviceError),

    /// The hardware FIFO overran: records were lost upstream of this core.
    /// Distinct from Transport because the link itself is healthy.
    #[error("FIFO overrun: records lost in hardware")]
    Overrun,

    /// A sink write failed; the stream stops cleanly without corrupting
    /// already-written output
    #[error("output error: {0}")]
    Output(#[from] SinkError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AcquisitionError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias for the acquisition pipeline
pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_device_error() {
        let err: AcquisitionError = DeviceError::new(-15, "communication error").into();
        assert!(err.to_string().contains("transport error"));
        assert!(err.to_string().contains("communication error"));
    }

    #[test]
    fn test_overrun_distinct_from_transport() {
        let overrun = AcquisitionError::Overrun;
        assert!(overrun.to_string().contains("FIFO overrun"));
        assert!(!matches!(overrun, AcquisitionError::Transport(_)));
    }

    #[test]
    fn test_output_from_sink_error() {
        let io = std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full");
        let err: AcquisitionError = SinkError::Io(io).into();
        assert!(err.to_string().contains("output error"));
    }

    #[test]
    fn test_config_error() {
        let err = AcquisitionError::config("missing sync period");
        assert!(err.to_string().contains("missing sync period"));
    }
}
