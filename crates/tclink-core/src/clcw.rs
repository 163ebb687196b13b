//! Communications Link Control Word model and wire format.
//!
//! The CLCW is the receiver's 4-byte feedback report, carried in the
//! operational control field of downlink frames. Layout per CCSDS 232.0:
//!
//! ```text
//! bit  0      control word type (0 = CLCW)
//! bits 1-2    version (00)
//! bits 3-5    status field
//! bits 6-7    COP in effect (01 = COP-1)
//! bits 8-13   virtual channel identifier
//! bits 14-15  spare
//! bit  16     no RF available
//! bit  17     no bit lock
//! bit  18     lockout
//! bit  19     wait
//! bit  20     retransmit
//! bits 21-22  FARM-B counter
//! bit  23     spare
//! bits 24-31  report value N(R)
//! ```

use crate::error::ClcwError;

/// The COP in effect on the reporting virtual channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopInEffect {
    /// No COP in effect.
    None,
    /// COP-1 in effect. Only these CLCWs drive the FOP-1 engine.
    Cop1,
    /// Reserved encoding (10 or 11).
    Reserved(u8),
}

impl CopInEffect {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => CopInEffect::None,
            1 => CopInEffect::Cop1,
            other => CopInEffect::Reserved(other),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            CopInEffect::None => 0,
            CopInEffect::Cop1 => 1,
            CopInEffect::Reserved(other) => other & 0x03,
        }
    }
}

/// A decoded Communications Link Control Word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clcw {
    pub status_field: u8,
    pub cop_in_effect: CopInEffect,
    pub virtual_channel_id: u8,
    pub no_rf_available: bool,
    pub no_bit_lock: bool,
    pub lockout: bool,
    pub wait: bool,
    pub retransmit: bool,
    pub farm_b_counter: u8,
    /// The receiver's next expected frame sequence number N(R).
    pub report_value: u8,
}

impl Clcw {
    /// A nominal COP-1 report for the given virtual channel: all flags clear,
    /// N(R) as given. Useful as a baseline for builders and tests.
    pub fn report(virtual_channel_id: u8, report_value: u8) -> Self {
        Self {
            status_field: 0,
            cop_in_effect: CopInEffect::Cop1,
            virtual_channel_id,
            no_rf_available: false,
            no_bit_lock: false,
            lockout: false,
            wait: false,
            retransmit: false,
            farm_b_counter: 0,
            report_value,
        }
    }

    /// Encode into the 4-byte wire word.
    pub fn encode(&self) -> [u8; 4] {
        let mut word: u32 = 0;
        word |= u32::from(self.status_field & 0x07) << 26;
        word |= u32::from(self.cop_in_effect.to_bits()) << 24;
        word |= u32::from(self.virtual_channel_id & 0x3F) << 18;
        if self.no_rf_available {
            word |= 1 << 15;
        }
        if self.no_bit_lock {
            word |= 1 << 14;
        }
        if self.lockout {
            word |= 1 << 13;
        }
        if self.wait {
            word |= 1 << 12;
        }
        if self.retransmit {
            word |= 1 << 11;
        }
        word |= u32::from(self.farm_b_counter & 0x03) << 9;
        word |= u32::from(self.report_value);
        word.to_be_bytes()
    }

    /// Decode from the 4-byte wire word.
    pub fn decode(data: &[u8]) -> Result<Self, ClcwError> {
        if data.len() != 4 {
            return Err(ClcwError::TooShort { actual: data.len() });
        }
        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if word & (1 << 31) != 0 {
            return Err(ClcwError::NotAClcw);
        }
        let version = ((word >> 29) & 0x03) as u8;
        if version != 0 {
            return Err(ClcwError::UnsupportedVersion(version));
        }
        Ok(Self {
            status_field: ((word >> 26) & 0x07) as u8,
            cop_in_effect: CopInEffect::from_bits(((word >> 24) & 0x03) as u8),
            virtual_channel_id: ((word >> 18) & 0x3F) as u8,
            no_rf_available: word & (1 << 15) != 0,
            no_bit_lock: word & (1 << 14) != 0,
            lockout: word & (1 << 13) != 0,
            wait: word & (1 << 12) != 0,
            retransmit: word & (1 << 11) != 0,
            farm_b_counter: ((word >> 9) & 0x03) as u8,
            report_value: (word & 0xFF) as u8,
        })
    }
}
