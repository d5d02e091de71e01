//! TTTR record decoder
//!
//! Unpacks one 32-bit time-tagged record into its raw fields, for either of
//! the two hardware encodings (T2, T3). The layout is fixed by the
//! instrument's wire format, so extraction is done with explicit mask/shift
//! constants rather than any language-level bit-field mechanism.

pub mod correct;

pub use correct::{correct, DecodedEvent, EventKind, OverflowState};

/// TTTR record layout constants (32-bit records)
mod constants {
    // T2: timetag(25) | channel(6) | special(1)
    pub const T2_TIMETAG_MASK: u32 = 0x01FF_FFFF;

    // T3: nsync(10) | dtime(15) | channel(6) | special(1)
    pub const T3_NSYNC_MASK: u32 = 0x3FF;
    pub const T3_DTIME_SHIFT: u32 = 10;
    pub const T3_DTIME_MASK: u32 = 0x7FFF;

    // Channel and special bit are at the same position in both encodings
    pub const CHANNEL_SHIFT: u32 = 25;
    pub const CHANNEL_MASK: u32 = 0x3F;
    pub const SPECIAL_SHIFT: u32 = 31;
}

/// Counter wraparound per overflow record in T2 mode (2^25 timetag units)
pub const T2_WRAPAROUND: u64 = 33_554_432;

/// Counter wraparound per overflow record in T3 mode (2^10 sync periods)
pub const T3_WRAPAROUND: u64 = 1024;

/// Channel value marking an overflow record (together with the special bit)
pub const OVERFLOW_CHANNEL: u8 = 63;

/// Highest channel value that denotes a marker record
pub const MARKER_CHANNEL_MAX: u8 = 15;

/// Number of delay bins in T3 mode (dtime has 15 bits)
pub const DTIME_BINS: usize = 32_768;

/// Record encoding, fixed for the lifetime of an acquisition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum RecordMode {
    /// Absolute arrival times in base resolution units
    T2,
    /// Sync period index plus intra-period delay
    T3,
}

impl std::fmt::Display for RecordMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordMode::T2 => write!(f, "T2"),
            RecordMode::T3 => write!(f, "T3"),
        }
    }
}

impl RecordMode {
    /// Time units added to the accumulator per overflow count
    pub fn wraparound(&self) -> u64 {
        match self {
            RecordMode::T2 => T2_WRAPAROUND,
            RecordMode::T3 => T3_WRAPAROUND,
        }
    }
}

/// Unpacked T2 record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct T2Fields {
    /// Local arrival time in base resolution units (25 bits)
    pub timetag: u32,
    /// Raw channel field (6 bits, 0..=63)
    pub channel: u8,
    /// Special-record flag
    pub special: bool,
}

/// Unpacked T3 record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct T3Fields {
    /// Sync periods elapsed (10 bits)
    pub nsync: u16,
    /// Delay after the most recent sync, in resolution units (15 bits)
    pub dtime: u16,
    /// Raw channel field (6 bits, 0..=63)
    pub channel: u8,
    /// Special-record flag
    pub special: bool,
}

/// Raw fields of one record, tagged by encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFields {
    T2(T2Fields),
    T3(T3Fields),
}

impl RawFields {
    pub fn mode(&self) -> RecordMode {
        match self {
            RawFields::T2(_) => RecordMode::T2,
            RawFields::T3(_) => RecordMode::T3,
        }
    }

    /// True for overflow records, which advance the time accumulator but
    /// never produce an event
    pub fn is_overflow(&self) -> bool {
        match self {
            RawFields::T2(f) => f.special && f.channel == OVERFLOW_CHANNEL,
            RawFields::T3(f) => f.special && f.channel == OVERFLOW_CHANNEL,
        }
    }
}

/// Unpack one raw 32-bit record.
///
/// Total over all inputs: reserved bit patterns are extracted structurally,
/// never rejected. Interpretation happens in [`correct`].
pub fn decode(raw: u32, mode: RecordMode) -> RawFields {
    let channel = ((raw >> constants::CHANNEL_SHIFT) & constants::CHANNEL_MASK) as u8;
    let special = (raw >> constants::SPECIAL_SHIFT) != 0;

    match mode {
        RecordMode::T2 => RawFields::T2(T2Fields {
            timetag: raw & constants::T2_TIMETAG_MASK,
            channel,
            special,
        }),
        RecordMode::T3 => RawFields::T3(T3Fields {
            nsync: (raw & constants::T3_NSYNC_MASK) as u16,
            dtime: ((raw >> constants::T3_DTIME_SHIFT) & constants::T3_DTIME_MASK) as u16,
            channel,
            special,
        }),
    }
}

/// Pack T2 fields into a raw record (fixture construction, exercised in tests
/// and by the emulator).
pub fn encode_t2(timetag: u32, channel: u8, special: bool) -> u32 {
    (timetag & constants::T2_TIMETAG_MASK)
        | ((channel as u32 & constants::CHANNEL_MASK) << constants::CHANNEL_SHIFT)
        | ((special as u32) << constants::SPECIAL_SHIFT)
}

/// Pack T3 fields into a raw record.
pub fn encode_t3(nsync: u16, dtime: u16, channel: u8, special: bool) -> u32 {
    (nsync as u32 & constants::T3_NSYNC_MASK)
        | ((dtime as u32 & constants::T3_DTIME_MASK) << constants::T3_DTIME_SHIFT)
        | ((channel as u32 & constants::CHANNEL_MASK) << constants::CHANNEL_SHIFT)
        | ((special as u32) << constants::SPECIAL_SHIFT)
}
