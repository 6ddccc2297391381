// src/stream.rs
//
// Decoding of whole text streams: zero or more frames back to back, each
// turned into a numbered report.

use serde::Serialize;
use std::fmt;

use crate::bits::{BitSource, FramePosition};
use crate::config::{ByteOrder, CodecConfig};
use crate::decoder::{DecodeOutcome, DecodedFrame, FrameDecoder};
use crate::frame::{bit_and_bool, hex_and_decimal, FrameFields};

// ============================================================================
// Frame Report
// ============================================================================

/// Everything known about one frame of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// 1-based position of the frame in the stream
    pub number: usize,
    pub start: FramePosition,
    /// Input text from the SOF through the last bit read for the frame
    pub raw: String,
    /// Bits as received, stuff bits shown as `x`/`y`
    pub stuffed: String,
    /// Bits delivered to the state machine
    pub destuffed: String,
    pub fields: FrameFields,
    /// Stuff bits removed, indexed by polarity
    pub stuff_counts: [u32; 2],
    pub outcome: DecodeOutcome,
    /// Display order of the data bytes
    #[serde(skip)]
    pub data_byte_order: ByteOrder,
}

impl FrameReport {
    fn new(number: usize, text: &str, frame: DecodedFrame, data_byte_order: ByteOrder) -> Self {
        FrameReport {
            number,
            start: frame.start,
            raw: text.get(frame.text_range).unwrap_or_default().to_string(),
            stuffed: frame.stuffed,
            destuffed: frame.destuffed,
            fields: frame.fields,
            stuff_counts: frame.stuff_counts,
            outcome: frame.outcome,
            data_byte_order,
        }
    }

    /// Data bytes in display order.
    pub fn display_data(&self) -> Vec<u8> {
        let mut data = self.fields.data.clone();
        if self.data_byte_order == ByteOrder::Little {
            data.reverse();
        }
        data
    }

    fn write_fields(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = &self.fields;
        writeln!(f, "base_id = {}", hex_and_decimal(fields.base_id as u64))?;
        if let Some(ext) = &fields.extended {
            writeln!(f, "extended_id = {}", hex_and_decimal(ext.extended_id as u64))?;
        }
        writeln!(f, "identifier = {}", hex_and_decimal(fields.identifier() as u64))?;
        writeln!(f, "is_extended = {}", bit_and_bool(fields.ide))?;
        match &fields.extended {
            Some(ext) => {
                writeln!(f, "srr = {}", fields.rtr_or_srr)?;
                writeln!(f, "is_rtr = {}", bit_and_bool(ext.rtr))?;
                writeln!(f, "r1 = {}", ext.r1)?;
            }
            None => writeln!(f, "is_rtr = {}", bit_and_bool(fields.rtr_or_srr))?,
        }
        writeln!(f, "r0 = {}", fields.r0)?;
        writeln!(f, "dlc = {}", hex_and_decimal(fields.dlc as u64))?;

        let data = self.display_data();
        if !data.is_empty() {
            let bytes: Vec<String> = data
                .iter()
                .map(|b| format!("[{}]", hex_and_decimal(*b as u64)))
                .collect();
            writeln!(f, "data = {}", bytes.join(" "))?;
            writeln!(f, "data (hex) = {}", hex::encode(&data))?;
        }
        writeln!(f, "crc = {}", hex_and_decimal(fields.crc as u64))?;
        write!(
            f,
            "stuffed 0s = {}, stuffed 1s = {}",
            self.stuff_counts[0], self.stuff_counts[1]
        )
    }
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CAN Message #{}", self.number)?;
        writeln!(f, "SOF starts at line:column {}", self.start)?;
        writeln!(f, "Raw:       {}", self.raw.trim_end())?;
        writeln!(f, "Stuffed:   {}", self.stuffed)?;
        writeln!(f, "Destuffed: {}", self.destuffed)?;
        writeln!(f, "Outcome:   {}", self.outcome.tag())?;

        match &self.outcome {
            DecodeOutcome::Success { diagnostics, .. } => {
                if let Some(presentation) = &diagnostics.presentation {
                    writeln!(f, "{}", presentation)?;
                }
            }
            DecodeOutcome::SoftFailure { violations, .. } => {
                for violation in violations {
                    writeln!(f, "  - {}", violation)?;
                }
            }
            DecodeOutcome::FatalFailure {
                violations, resync, ..
            } => {
                for violation in violations {
                    writeln!(f, "  - {}", violation)?;
                }
                match resync {
                    Some(position) => writeln!(f, "Resynchronized at line:column {}", position)?,
                    None => writeln!(f, "Stream ended before resynchronization")?,
                }
            }
            DecodeOutcome::InternalError { reason } => {
                writeln!(f, "  - internal error: {}", reason)?;
            }
        }

        self.write_fields(f)
    }
}

// ============================================================================
// Stream Decoder
// ============================================================================

/// Iterator over the frames of a text stream.
pub struct StreamDecoder<'a> {
    text: &'a str,
    source: BitSource<'a>,
    decoder: FrameDecoder,
    frames_seen: usize,
    finished: bool,
}

impl<'a> StreamDecoder<'a> {
    pub fn new(text: &'a str, config: CodecConfig) -> Self {
        StreamDecoder {
            text,
            source: BitSource::new(text),
            decoder: FrameDecoder::new(config),
            frames_seen: 0,
            finished: false,
        }
    }

    fn report(&mut self, frame: DecodedFrame) -> FrameReport {
        self.frames_seen += 1;
        let report = FrameReport::new(
            self.frames_seen,
            self.text,
            frame,
            self.decoder.config().data_byte_order,
        );
        tlog!(
            "[stream] Frame #{} at {}: {}",
            report.number,
            report.start,
            report.outcome.tag()
        );
        report
    }
}

impl Iterator for StreamDecoder<'_> {
    type Item = FrameReport;

    fn next(&mut self) -> Option<FrameReport> {
        if self.finished {
            return None;
        }

        while let Some(bit) = self.source.next() {
            if let Some(frame) = self.decoder.push(bit) {
                return Some(self.report(frame));
            }
        }

        self.finished = true;
        let frame = self.decoder.finish()?;
        Some(self.report(frame))
    }
}

/// Decode every frame in `text`.
pub fn decode_stream(text: &str, config: &CodecConfig) -> Vec<FrameReport> {
    StreamDecoder::new(text, config.clone()).collect()
}
