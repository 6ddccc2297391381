// src/frame.rs
//
// Logical CAN messages and the wire-level fields of a CAN 2.0 A/B data or
// remote frame, plus the display helpers shared by the encoder and the
// decoder reports.
//
// Wire order (unstuffed):
//   SOF | ID[11] | RTR or SRR | IDE | (EXT_ID[18] | RTR | r1)? | r0 | DLC[4] |
//   DATA[0..64] | CRC[15] | CRC_D | ACK | ACK_D | EOF[7] | IFS[3]

use serde::{Deserialize, Serialize};

use crate::bits::Bit;
use crate::error::{CodecError, CodecResult};

// ============================================================================
// Constants
// ============================================================================

pub const ID_BITS: u32 = 11;
pub const EXT_ID_BITS: u32 = 18;
pub const DLC_BITS: u32 = 4;
pub const CRC_BITS: u32 = 15;
pub const ACK_BITS: u32 = 2;
pub const EOF_BITS: u32 = 7;
pub const IFS_BITS: u32 = 3;

/// Maximum payload of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

pub const MAX_STANDARD_ID: u32 = 0x7FF;
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Upper 11 bits of a 29-bit identifier (sent in the base ID field).
pub const EXT_ID_UPPER_MASK: u32 = 0x1FFC_0000;
/// Lower 18 bits of a 29-bit identifier (sent in the extended ID field).
pub const EXT_ID_LOWER_MASK: u32 = 0x0003_FFFF;

// ============================================================================
// Logical Message
// ============================================================================

/// What a CAN frame means, independent of how it is laid out on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogicalMessage {
    /// Standard (11 bit) or extended (29 bit) identifier
    pub identifier: u32,
    pub is_extended: bool,
    pub is_remote_request: bool,
    /// Payload. Always empty for remote requests.
    pub data: Vec<u8>,
}

impl LogicalMessage {
    /// Build a message, choosing extended framing when the identifier does
    /// not fit in 11 bits.
    pub fn new(identifier: u32, is_remote_request: bool, data: Vec<u8>) -> CodecResult<Self> {
        Self::build(identifier, identifier > MAX_STANDARD_ID, is_remote_request, data)
    }

    /// Build a message that is always sent with extended framing, even when
    /// the identifier is small.
    pub fn extended(identifier: u32, is_remote_request: bool, data: Vec<u8>) -> CodecResult<Self> {
        Self::build(identifier, true, is_remote_request, data)
    }

    fn build(
        identifier: u32,
        is_extended: bool,
        is_remote_request: bool,
        data: Vec<u8>,
    ) -> CodecResult<Self> {
        let msg = LogicalMessage {
            identifier,
            is_extended,
            is_remote_request,
            // Remote requests carry no payload
            data: if is_remote_request { Vec::new() } else { data },
        };
        msg.validate()?;
        Ok(msg)
    }

    /// Check the invariants the constructors enforce. Useful for messages
    /// assembled field by field (e.g. deserialized ones).
    pub fn validate(&self) -> CodecResult<()> {
        if self.identifier > MAX_EXTENDED_ID {
            return Err(CodecError::InvalidIdentifier(self.identifier));
        }
        if !self.is_extended && self.identifier > MAX_STANDARD_ID {
            return Err(CodecError::StandardIdentifierTooLarge(self.identifier));
        }
        if self.data.len() > MAX_DATA_LEN {
            return Err(CodecError::TooMuchData(self.data.len()));
        }
        if self.is_remote_request && !self.data.is_empty() {
            return Err(CodecError::RemoteRequestWithData(self.data.len()));
        }
        Ok(())
    }

    /// Data length code this message is sent with.
    pub fn data_length(&self) -> u8 {
        if self.is_remote_request {
            0
        } else {
            self.data.len() as u8
        }
    }
}

// ============================================================================
// Wire Fields
// ============================================================================

/// Fields only present in extended (IDE = 1) frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtendedFields {
    /// Lower 18 bits of the identifier
    pub extended_id: u32,
    pub rtr: Bit,
    pub r1: Bit,
}

/// Every field of a frame as it appears on the wire (after destuffing).
///
/// The decoder fills this in as bits arrive, so a partially decoded frame
/// is just a `FrameFields` with trailing fields left at zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameFields {
    pub sof: Bit,
    /// Standard identifier, or the upper 11 bits of an extended one
    pub base_id: u16,
    /// RTR in standard frames, SRR in extended frames
    pub rtr_or_srr: Bit,
    pub ide: Bit,
    pub extended: Option<ExtendedFields>,
    pub r0: Bit,
    /// Data length code as sent, 0..=15
    pub dlc: u8,
    pub data: Vec<u8>,
    pub crc: u16,
    pub crc_delimiter: Bit,
    pub ack_slot: Bit,
    pub ack_delimiter: Bit,
    pub eof: u8,
    pub ifs: u8,
}

/// Names of the frame fields, as used in the annotated presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sof,
    Id,
    Srr,
    Rtr,
    Ide,
    ExtId,
    R1,
    R0,
    Dlc,
    /// Data byte with its index
    Data(usize),
    Crc,
    CrcDelimiter,
    Ack,
    Eof,
    Ifs,
}

impl Field {
    /// Label printed under the field. Only the first data byte is labelled.
    pub fn label(self) -> &'static str {
        match self {
            Field::Sof => "SOF",
            Field::Id => "ID",
            Field::Srr => "SRR",
            Field::Rtr => "RTR",
            Field::Ide => "IDE",
            Field::ExtId => "EXT_ID",
            Field::R1 => "r1",
            Field::R0 => "r0",
            Field::Dlc => "DLC",
            Field::Data(0) => "DATA",
            Field::Data(_) => "",
            Field::Crc => "CRC",
            Field::CrcDelimiter => "CRC_D",
            Field::Ack => "ACK",
            Field::Eof => "EOF",
            Field::Ifs => "IFS",
        }
    }

    /// Size of the digit groups the field is printed in.
    pub fn group_size(self) -> u32 {
        match self {
            Field::Id => ID_BITS,
            Field::Data(_) => 8,
            Field::Eof => EOF_BITS,
            Field::Ifs => IFS_BITS,
            _ => 4,
        }
    }
}

/// One field value with its width in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldValue {
    pub field: Field,
    pub value: u32,
    pub width: u32,
}

impl FieldValue {
    fn new(field: Field, value: u32, width: u32) -> Self {
        FieldValue { field, value, width }
    }

    fn bit(field: Field, bit: Bit) -> Self {
        FieldValue::new(field, bit.value(), 1)
    }
}

impl FrameFields {
    /// Wire fields for `msg`. The CRC is left at zero for the encoder to fill.
    pub fn from_message(msg: &LogicalMessage) -> Self {
        let rtr = if msg.is_remote_request {
            Bit::Recessive
        } else {
            Bit::Dominant
        };
        let data = if msg.is_remote_request {
            Vec::new()
        } else {
            msg.data.clone()
        };

        let (base_id, rtr_or_srr, ide, extended) = if msg.is_extended {
            (
                ((msg.identifier & EXT_ID_UPPER_MASK) >> EXT_ID_BITS) as u16,
                Bit::Recessive,
                Bit::Recessive,
                Some(ExtendedFields {
                    extended_id: msg.identifier & EXT_ID_LOWER_MASK,
                    rtr,
                    r1: Bit::Dominant,
                }),
            )
        } else {
            (msg.identifier as u16, rtr, Bit::Dominant, None)
        };

        FrameFields {
            sof: Bit::Dominant,
            base_id,
            rtr_or_srr,
            ide,
            extended,
            r0: Bit::Dominant,
            dlc: data.len() as u8,
            data,
            crc: 0,
            crc_delimiter: Bit::Recessive,
            ack_slot: Bit::Recessive,
            ack_delimiter: Bit::Recessive,
            eof: 0x7F,
            ifs: 0x07,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extended.is_some()
    }

    pub fn is_remote_request(&self) -> bool {
        let rtr = match &self.extended {
            Some(ext) => ext.rtr,
            None => self.rtr_or_srr,
        };
        rtr.is_recessive()
    }

    /// Full identifier: base ID alone, or base and extended ID joined.
    pub fn identifier(&self) -> u32 {
        match &self.extended {
            Some(ext) => ((self.base_id as u32) << EXT_ID_BITS) | ext.extended_id,
            None => self.base_id as u32,
        }
    }

    /// Number of data bytes the DLC announces, clamped to 8.
    pub fn data_length(&self) -> usize {
        (self.dlc as usize).min(MAX_DATA_LEN)
    }

    /// The message this frame carries. Data bits read after a remote
    /// request's DLC stay in `data` but are not part of the message.
    pub fn to_message(&self) -> LogicalMessage {
        let is_remote_request = self.is_remote_request();
        LogicalMessage {
            identifier: self.identifier(),
            is_extended: self.is_extended(),
            is_remote_request,
            data: if is_remote_request {
                Vec::new()
            } else {
                self.data.clone()
            },
        }
    }

    /// Copy the bits that carry no logical meaning (reserved bits, SRR and
    /// the raw DLC) from `other`.
    pub fn copy_reserved_bits(&mut self, other: &FrameFields) {
        self.r0 = other.r0;
        self.dlc = other.dlc;
        if let (Some(ours), Some(theirs)) = (self.extended.as_mut(), other.extended.as_ref()) {
            ours.r1 = theirs.r1;
            self.rtr_or_srr = other.rtr_or_srr;
        }
    }

    /// The CRC-covered fields (SOF through the last data byte) in wire order.
    pub fn crc_fields(&self) -> Vec<FieldValue> {
        let mut fields = Vec::with_capacity(10 + self.data.len());
        fields.push(FieldValue::bit(Field::Sof, self.sof));
        fields.push(FieldValue::new(Field::Id, self.base_id as u32, ID_BITS));

        match &self.extended {
            Some(ext) => {
                fields.push(FieldValue::bit(Field::Srr, self.rtr_or_srr));
                fields.push(FieldValue::bit(Field::Ide, self.ide));
                fields.push(FieldValue::new(Field::ExtId, ext.extended_id, EXT_ID_BITS));
                fields.push(FieldValue::bit(Field::Rtr, ext.rtr));
                fields.push(FieldValue::bit(Field::R1, ext.r1));
            }
            None => {
                fields.push(FieldValue::bit(Field::Rtr, self.rtr_or_srr));
                fields.push(FieldValue::bit(Field::Ide, self.ide));
            }
        }

        fields.push(FieldValue::bit(Field::R0, self.r0));
        fields.push(FieldValue::new(Field::Dlc, self.dlc as u32, DLC_BITS));
        for (i, &byte) in self.data.iter().enumerate() {
            fields.push(FieldValue::new(Field::Data(i), byte as u32, 8));
        }
        fields
    }
}

// ============================================================================
// Display Helpers
// ============================================================================

/// `0x7f3c (32572)`
pub fn hex_and_decimal(value: u64) -> String {
    format!("0x{:x} ({})", value, value)
}

/// `1 (true)`
pub fn bit_and_bool(bit: Bit) -> String {
    format!("{} ({})", bit, bit.is_recessive())
}

/// Binary digits of the low `width` bits of `value`, grouped in `group`s
/// counted from the least significant end.
///
/// `readable_bits(0x7F3C, 15, 4)` gives `"111 1111 0011 1100"`.
pub fn readable_bits(value: u32, width: u32, group: u32) -> String {
    let group = group.max(1);
    let mut out = String::with_capacity((width + width / group) as usize);
    for shift in (0..width.min(32)).rev() {
        out.push(Bit::from_lsb(value >> shift).as_char());
        if shift > 0 && shift % group == 0 {
            out.push(' ');
        }
    }
    out
}
