// src/encoder.rs
//
// Frame encoder: logical message -> stuffed bit string.
//
// The encoder walks the same field sequence the decoder consumes, computes
// the CRC over it, stuffs SOF through CRC and appends the fixed-form tail.
// Alongside the compact bit strings it builds a two-line presentation that
// lines each field's bits up with its name:
//
//   0   00100100011 0   0   0  00y10 10101011 11001101 ...
//   SOF ID          RTR IDE r0 DLC   DATA              ...

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CodecConfig;
use crate::crc::CrcEngine;
use crate::error::CodecResult;
use crate::frame::{
    readable_bits, Field, FrameFields, LogicalMessage, CRC_BITS, EOF_BITS, IFS_BITS,
};
use crate::stuffing::Stuffer;

// ============================================================================
// Presentation
// ============================================================================

/// Field values over field labels, padded so every label sits under its
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub values: String,
    pub labels: String,
}

impl Presentation {
    /// Append a field, then pad the shorter line so both stay aligned.
    pub fn push(&mut self, label: &str, value: &str) {
        self.labels.push_str(label);
        self.labels.push(' ');
        self.values.push_str(value);
        self.values.push(' ');

        let (labels_len, values_len) = (self.labels.chars().count(), self.values.chars().count());
        if labels_len < values_len {
            self.labels.push_str(&" ".repeat(values_len - labels_len));
        } else if values_len < labels_len {
            self.values.push_str(&" ".repeat(labels_len - values_len));
        }
    }

    /// The value line with all spacing removed.
    pub fn compact(&self) -> String {
        self.values.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.values.trim_end())?;
        write!(f, "{}", self.labels.trim_end())
    }
}

/// Replace stuff bit annotations with the plain bits they stand for.
pub fn strip_stuff_annotations(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'x' | 'X' => '0',
            'y' | 'Y' => '1',
            other => other,
        })
        .collect()
}

// ============================================================================
// Encoded Frame
// ============================================================================

/// Everything the encoder produces for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFrame {
    pub fields: FrameFields,
    pub presentation: Presentation,
    /// Stuffed bits with stuff bits written as `x`/`y`
    pub stuffed_xy: String,
    /// Stuffed bits as plain `0`/`1`, ready for the bus
    pub stuffed_01: String,
    /// Inserted stuff bits, indexed by polarity
    pub stuff_counts: [u32; 2],
}

impl fmt::Display for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.presentation)?;
        writeln!(f)?;
        writeln!(f, "Raw [x|y] stuff bits: {}", self.stuffed_xy)?;
        write!(f, "Raw [0|1] stuff bits: {}", self.stuffed_01)
    }
}

// ============================================================================
// Encoder
// ============================================================================

#[derive(Debug, Clone)]
pub struct FrameEncoder {
    polynomial: u32,
    stuff_trigger: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        FrameEncoder::new(&CodecConfig::default())
    }
}

impl FrameEncoder {
    pub fn new(config: &CodecConfig) -> Self {
        FrameEncoder {
            polynomial: config.crc_polynomial,
            stuff_trigger: config.stuff_trigger,
        }
    }

    /// Encode a message.
    ///
    /// Fails only when the message itself is invalid (identifier too large
    /// or more than 8 data bytes).
    pub fn encode(&self, msg: &LogicalMessage) -> CodecResult<EncodedFrame> {
        let fields = self.fields_for(msg)?;
        Ok(self.render(fields))
    }

    /// Wire fields for `msg`, CRC included.
    pub fn fields_for(&self, msg: &LogicalMessage) -> CodecResult<FrameFields> {
        msg.validate()?;
        let mut fields = FrameFields::from_message(msg);
        fields.crc = self.crc_for(&fields);
        Ok(fields)
    }

    /// CRC over the CRC-covered fields of `fields`.
    pub fn crc_for(&self, fields: &FrameFields) -> u16 {
        let mut crc = CrcEngine::new(self.polynomial);
        for field in fields.crc_fields() {
            crc.consume_field(field.value, field.width);
        }
        crc.finalize() as u16
    }

    /// Lay out `fields` as stuffed bits. The CRC field is taken as given.
    pub fn render(&self, fields: FrameFields) -> EncodedFrame {
        let mut stuffer = Stuffer::new(self.stuff_trigger);
        let mut presentation = Presentation::default();

        for field in fields.crc_fields() {
            let bits = readable_bits(field.value, field.width, field.field.group_size());
            presentation.push(field.field.label(), &stuffer.stuff_text(&bits));
        }
        let crc = readable_bits(fields.crc as u32, CRC_BITS, Field::Crc.group_size());
        presentation.push(Field::Crc.label(), &stuffer.stuff_text(&crc));

        // Fixed-form tail, never stuffed
        presentation.push(
            Field::CrcDelimiter.label(),
            &fields.crc_delimiter.as_char().to_string(),
        );
        let ack = format!("{}{}", fields.ack_slot, fields.ack_delimiter);
        presentation.push(Field::Ack.label(), &ack);
        presentation.push(
            Field::Eof.label(),
            &readable_bits(fields.eof as u32, EOF_BITS, Field::Eof.group_size()),
        );
        presentation.push(
            Field::Ifs.label(),
            &readable_bits(fields.ifs as u32, IFS_BITS, Field::Ifs.group_size()),
        );

        let stuffed_xy = presentation.compact();
        let stuffed_01 = strip_stuff_annotations(&stuffed_xy);

        EncodedFrame {
            fields,
            presentation,
            stuffed_xy,
            stuffed_01,
            stuff_counts: stuffer.stuffed_counts(),
        }
    }
}
