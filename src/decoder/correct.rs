//! Overflow correction and record classification
//!
//! The hardware time fields are truncated to 25 bits (T2) or 10 bits (T3)
//! and wrap many times per second. Dedicated overflow records carry a repeat
//! count; accumulating them reconstructs a monotonic absolute time. This
//! targets the V2-style convention where the count field holds the number of
//! overflows (older V1-generation hardware always encodes 1; not supported).

use super::{RawFields, RecordMode, MARKER_CHANNEL_MAX, OVERFLOW_CHANNEL};

/// Per-stream overflow accumulator.
///
/// Exclusively owned by one stream's decode path. Reset at the start of
/// every acquisition session; only overflow records advance it, so it is
/// monotonic non-decreasing for the lifetime of a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverflowState {
    accumulator: u64,
}

impl OverflowState {
    pub fn new() -> Self {
        Self { accumulator: 0 }
    }

    /// Zero the accumulator for a new session
    pub fn reset(&mut self) {
        self.accumulator = 0;
    }

    /// Current correction in local time units
    pub fn accumulated(&self) -> u64 {
        self.accumulator
    }
}

/// One decoded, overflow-corrected event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    pub mode: RecordMode,
    /// Absolute time: corrected timetag (T2) or corrected sync index (T3)
    pub time: u64,
    pub kind: EventKind,
}

/// Event classification after correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Photon arrival. Channel 0 is the sync channel (T2 only); regular
    /// channels are reported 1..=N. T3 events carry the intra-period delay,
    /// which is not subject to overflow correction.
    Photon { channel: u8, dtime: Option<u16> },
    /// Marker input(s). Several markers can share one record, so the raw
    /// bitfield is reported whole.
    Marker { bits: u8 },
}

/// Apply overflow correction to one record's fields and classify it.
///
/// Returns `None` for records that carry no event: overflow records (which
/// only advance the accumulator) and reserved special patterns, which are
/// ignored exactly as the instrument vendor's reference processing does.
pub fn correct(state: &mut OverflowState, fields: RawFields) -> Option<DecodedEvent> {
    match fields {
        RawFields::T2(f) => {
            if f.special {
                if f.channel == OVERFLOW_CHANNEL {
                    // timetag holds the overflow repeat count
                    state.accumulator += RecordMode::T2.wraparound() * f.timetag as u64;
                    return None;
                }
                if (1..=MARKER_CHANNEL_MAX).contains(&f.channel) {
                    return Some(DecodedEvent {
                        mode: RecordMode::T2,
                        time: state.accumulator + f.timetag as u64,
                        kind: EventKind::Marker { bits: f.channel },
                    });
                }
                if f.channel == 0 {
                    // Sync edge, reported as a photon on channel 0
                    return Some(DecodedEvent {
                        mode: RecordMode::T2,
                        time: state.accumulator + f.timetag as u64,
                        kind: EventKind::Photon {
                            channel: 0,
                            dtime: None,
                        },
                    });
                }
                // Reserved special channels 16..=62
                return None;
            }
            Some(DecodedEvent {
                mode: RecordMode::T2,
                time: state.accumulator + f.timetag as u64,
                kind: EventKind::Photon {
                    // Hardware counts channels 0..N-1; report 1..N
                    channel: f.channel + 1,
                    dtime: None,
                },
            })
        }
        RawFields::T3(f) => {
            if f.special {
                if f.channel == OVERFLOW_CHANNEL {
                    // nsync holds the overflow repeat count
                    state.accumulator += RecordMode::T3.wraparound() * f.nsync as u64;
                    return None;
                }
                if (1..=MARKER_CHANNEL_MAX).contains(&f.channel) {
                    return Some(DecodedEvent {
                        mode: RecordMode::T3,
                        time: state.accumulator + f.nsync as u64,
                        kind: EventKind::Marker { bits: f.channel },
                    });
                }
                // Channel 0 and 16..=62 are reserved in T3
                return None;
            }
            Some(DecodedEvent {
                mode: RecordMode::T3,
                time: state.accumulator + f.nsync as u64,
                kind: EventKind::Photon {
                    channel: f.channel + 1,
                    dtime: Some(f.dtime),
                },
            })
        }
    }
}
