//! Shared infrastructure: errors, CLI and shutdown handling

pub mod cli;
pub mod error;
pub mod shutdown;

pub use cli::AcquireArgs;
pub use error::{AcquisitionError, AcquisitionResult};
pub use shutdown::{setup_shutdown, ShutdownReceiver, ShutdownSender};
