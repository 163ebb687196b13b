//! TC transfer frame model and primary-header wire format.
//!
//! The frame is the unit handed between the sender virtual channel, the
//! FOP-1 engine, and the lower procedures. The primary header follows
//! CCSDS 232.0: 5 bytes of `version(2) || bypass(1) || control(1) ||
//! spare(2) || scid(10) || vcid(6) || length(10) || sequence(8)`, followed
//! by the frame data field. The engine never looks inside the payload.

use crate::error::FrameError;

/// Primary header size in bytes.
pub const PRIMARY_HEADER_LEN: usize = 5;

/// Maximum total frame length encodable in the 10-bit length field.
pub const MAX_FRAME_LEN: usize = 1024;

/// The three TC frame types, encoded in the bypass/control flag pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Type-AD: sequence-controlled data frame, acknowledged by the receiver.
    Ad,
    /// Type-BD: expedited data frame, not acknowledged.
    Bd,
    /// Type-BC: control frame carrying an Unlock or Set V(R) command.
    Bc,
}

impl FrameType {
    /// The (bypass, control) flag pair for this type.
    fn flags(self) -> (bool, bool) {
        match self {
            FrameType::Ad => (false, false),
            FrameType::Bd => (true, false),
            FrameType::Bc => (true, true),
        }
    }

    fn from_flags(bypass: bool, control: bool) -> Result<Self, FrameError> {
        match (bypass, control) {
            (false, false) => Ok(FrameType::Ad),
            (true, false) => Ok(FrameType::Bd),
            (true, true) => Ok(FrameType::Bc),
            (false, true) => Err(FrameError::InvalidFlagCombination { bypass, control }),
        }
    }
}

/// A control command carried in a Type-BC frame data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Reset the receiver's lockout condition. Encoded as a single `0x00`.
    Unlock,
    /// Set the receiver's V(R). Encoded as `0x82 0x00 vr`.
    SetVr(u8),
}

impl ControlCommand {
    /// Encode the command into the BC frame data field.
    pub fn encode(self) -> Vec<u8> {
        match self {
            ControlCommand::Unlock => vec![0x00],
            ControlCommand::SetVr(vr) => vec![0x82, 0x00, vr],
        }
    }

    /// Decode a BC frame data field.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        match data {
            [0x00] => Ok(ControlCommand::Unlock),
            [0x82, 0x00, vr] => Ok(ControlCommand::SetVr(*vr)),
            _ => Err(FrameError::InvalidControlCommand),
        }
    }
}

/// A TC transfer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcTransferFrame {
    /// Spacecraft identifier (10 bits).
    pub spacecraft_id: u16,
    /// Virtual channel identifier (6 bits).
    pub virtual_channel_id: u8,
    /// Frame type, from the bypass/control flag pair.
    pub frame_type: FrameType,
    /// Frame sequence number N(S). Meaningful for Type-AD frames only;
    /// zero for BD and BC frames.
    pub sequence_number: u8,
    /// Frame data field. Opaque to the link layer.
    pub payload: Vec<u8>,
}

impl TcTransferFrame {
    /// Build a Type-AD frame with the given sequence number.
    pub fn new_ad(spacecraft_id: u16, virtual_channel_id: u8, ns: u8, payload: Vec<u8>) -> Self {
        Self {
            spacecraft_id,
            virtual_channel_id,
            frame_type: FrameType::Ad,
            sequence_number: ns,
            payload,
        }
    }

    /// Build a Type-BD frame.
    pub fn new_bd(spacecraft_id: u16, virtual_channel_id: u8, payload: Vec<u8>) -> Self {
        Self {
            spacecraft_id,
            virtual_channel_id,
            frame_type: FrameType::Bd,
            sequence_number: 0,
            payload,
        }
    }

    /// Build a Type-BC frame carrying a control command.
    pub fn new_bc(spacecraft_id: u16, virtual_channel_id: u8, command: ControlCommand) -> Self {
        Self {
            spacecraft_id,
            virtual_channel_id,
            frame_type: FrameType::Bc,
            sequence_number: 0,
            payload: command.encode(),
        }
    }

    /// The control command of a Type-BC frame, if this is one.
    pub fn control_command(&self) -> Option<ControlCommand> {
        match self.frame_type {
            FrameType::Bc => ControlCommand::decode(&self.payload).ok(),
            _ => None,
        }
    }

    /// Total encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        PRIMARY_HEADER_LEN + self.payload.len()
    }

    /// Encode the frame into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let total = self.encoded_len();
        if total > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(total));
        }
        let (bypass, control) = self.frame_type.flags();
        let length_field = (total - 1) as u16;

        let mut buf = Vec::with_capacity(total);
        let mut word0 = self.spacecraft_id & 0x03FF;
        if bypass {
            word0 |= 1 << 13;
        }
        if control {
            word0 |= 1 << 12;
        }
        buf.extend_from_slice(&word0.to_be_bytes());
        let word1 = ((self.virtual_channel_id as u16 & 0x3F) << 10) | (length_field & 0x03FF);
        buf.extend_from_slice(&word1.to_be_bytes());
        buf.push(self.sequence_number);
        buf.extend_from_slice(&self.payload);

        tracing::trace!(
            frame_type = ?self.frame_type,
            ns = self.sequence_number,
            len = total,
            "encoded TC frame"
        );

        Ok(buf)
    }

    /// Decode a frame from its wire representation.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < PRIMARY_HEADER_LEN {
            return Err(FrameError::TooShort {
                min: PRIMARY_HEADER_LEN,
                actual: data.len(),
            });
        }

        let word0 = u16::from_be_bytes([data[0], data[1]]);
        let version = (word0 >> 14) as u8;
        if version != 0 {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let bypass = word0 & (1 << 13) != 0;
        let control = word0 & (1 << 12) != 0;
        let frame_type = FrameType::from_flags(bypass, control)?;
        let spacecraft_id = word0 & 0x03FF;

        let word1 = u16::from_be_bytes([data[2], data[3]]);
        let virtual_channel_id = (word1 >> 10) as u8;
        let length_field = (word1 & 0x03FF) as usize + 1;
        if length_field != data.len() {
            return Err(FrameError::LengthMismatch {
                header_says: length_field,
                actual: data.len(),
            });
        }

        Ok(Self {
            spacecraft_id,
            virtual_channel_id,
            frame_type,
            sequence_number: data[4],
            payload: data[PRIMARY_HEADER_LEN..].to_vec(),
        })
    }
}
