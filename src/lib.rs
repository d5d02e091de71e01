//! TTTR-DAQ: acquisition pipeline for time-tagged time-resolved photon counting
//!
//! This crate decodes the 32-bit TTTR record stream of a photon counting
//! instrument, reconstructs absolute arrival times across counter overflows,
//! and fans the decoded events out to logging and histogramming sinks.

pub mod acquisition;
pub mod common;
pub mod config;
pub mod decoder;
pub mod device;
pub mod sink;
