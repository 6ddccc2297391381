// src/decoder.rs
//
// Frame decoder state machine.
//
// Bits are pushed in one at a time. Each frame gets a fresh
// `FrameParseState` holding its own CRC and destuffing state; the state is
// explicit so the decoder can be fed from a text stream or from bits that
// trickle in off hardware.
//
// Violations are collected per frame. Soft violations (bad CRC, dominant
// ACK, ...) let the frame finish parsing. Fatal ones (stuffing errors,
// dominant EOF/IFS bits) abandon the frame: the decoder drops to HARD_FAIL
// and skips raw bits until it sees enough recessive bits in a row to be
// sure the bus is idle again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::bits::{Bit, FramePosition, SourceBit};
use crate::config::CodecConfig;
use crate::crc::CrcEngine;
use crate::encoder::{FrameEncoder, Presentation};
use crate::frame::{
    ExtendedFields, FrameFields, LogicalMessage, CRC_BITS, DLC_BITS, EOF_BITS, EXT_ID_BITS,
    ID_BITS, IFS_BITS,
};
use crate::roundtrip::check_round_trip;
use crate::stuffing::{Destuffer, StuffViolation};

// ============================================================================
// Stages
// ============================================================================

/// Position of the state machine within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Idle, waiting for a dominant start bit
    Sof,
    ArbitrationId,
    RtrOrSrr,
    Ide,
    ExtendedId,
    Rtr,
    R1,
    R0,
    Dlc,
    Data,
    Crc,
    CrcDelimiter,
    AckSlot,
    AckDelimiter,
    Eof,
    Ifs,
    /// Frame abandoned, waiting for the bus to go idle
    HardFail,
    Ended,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Sof => "SOF",
            Stage::ArbitrationId => "ARBITRATION_ID",
            Stage::RtrOrSrr => "RTR_OR_SRR",
            Stage::Ide => "IDE",
            Stage::ExtendedId => "EXTENDED_ID",
            Stage::Rtr => "RTR",
            Stage::R1 => "r1",
            Stage::R0 => "r0",
            Stage::Dlc => "DLC",
            Stage::Data => "DATA",
            Stage::Crc => "CRC",
            Stage::CrcDelimiter => "CRC_DELIMITER",
            Stage::AckSlot => "ACK_SLOT",
            Stage::AckDelimiter => "ACK_DELIMITER",
            Stage::Eof => "EOF",
            Stage::Ifs => "IFS",
            Stage::HardFail => "HARD_FAIL",
            Stage::Ended => "ENDED",
        }
    }

    /// Stages whose bits are covered by the CRC.
    pub fn is_crc_covered(self) -> bool {
        matches!(
            self,
            Stage::Sof
                | Stage::ArbitrationId
                | Stage::RtrOrSrr
                | Stage::Ide
                | Stage::ExtendedId
                | Stage::Rtr
                | Stage::R1
                | Stage::R0
                | Stage::Dlc
                | Stage::Data
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Violations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Frame is still parsed to the end
    Soft,
    /// Frame is abandoned
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    #[error("{0}")]
    Stuffing(StuffViolation),

    #[error("expected DLC value of 0 for RTR frames (got {dlc})")]
    RemoteRequestWithLength { dlc: u8 },

    #[error("expected RECESSIVE (1) CRC delimiter but got DOMINANT (0)")]
    CrcDelimiterDominant,

    #[error("calculated CRC does not match sender's CRC (0x{computed:x} <> 0x{received:x})")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("expected RECESSIVE (1) ACK slot but got DOMINANT (0)")]
    AckSlotDominant,

    #[error("expected RECESSIVE (1) ACK delimiter but got DOMINANT (0)")]
    AckDelimiterDominant,

    #[error("expected RECESSIVE (1) EOF bit {index} but got DOMINANT (0)")]
    EofDominant { index: u32 },

    #[error("expected RECESSIVE (1) IFS bit {index} but got DOMINANT (0)")]
    IfsDominant { index: u32 },

    #[error("bit annotated as a stuff bit is not a stuff bit")]
    FalseStuffAnnotation,

    #[error("stream ended before frame was complete")]
    StreamEnded,
}

impl ViolationKind {
    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::Stuffing(_)
            | ViolationKind::EofDominant { .. }
            | ViolationKind::IfsDominant { .. }
            | ViolationKind::StreamEnded => Severity::Fatal,
            ViolationKind::RemoteRequestWithLength { .. }
            | ViolationKind::CrcDelimiterDominant
            | ViolationKind::CrcMismatch { .. }
            | ViolationKind::AckSlotDominant
            | ViolationKind::AckDelimiterDominant
            | ViolationKind::FalseStuffAnnotation => Severity::Soft,
        }
    }
}

/// A protocol violation found in one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Human-readable form of `kind`
    pub message: String,
    pub severity: Severity,
    /// Stage the state machine was in when the violation was found
    pub stage: Stage,
    /// Position of the offending bit
    pub position: FramePosition,
}

impl Violation {
    pub fn new(kind: ViolationKind, stage: Stage, position: FramePosition) -> Self {
        Violation {
            message: kind.to_string(),
            severity: kind.severity(),
            kind,
            stage,
            position,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}); stage = {}",
            self.message, self.position, self.stage
        )
    }
}

/// A defect in the codec itself. Never caused by the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum InternalFault {
    #[error("state machine reached unreachable stage {0}")]
    UnreachableStage(Stage),

    #[error("round trip mismatch\n  collected: {collected}\n  generated: {generated}")]
    RoundTripMismatch { collected: String, generated: String },

    #[error("decoded frame could not be re-encoded: {0}")]
    Reencode(String),
}

// ============================================================================
// Outcomes
// ============================================================================

/// Extra information attached to a successful decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Stuff bits removed, indexed by polarity
    pub stuff_counts: [u32; 2],
    /// Label/value presentation regenerated by the round-trip check
    pub presentation: Option<Presentation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecodeOutcome {
    Success {
        message: LogicalMessage,
        diagnostics: Diagnostics,
    },
    SoftFailure {
        /// Possibly partial message
        message: LogicalMessage,
        violations: Vec<Violation>,
    },
    FatalFailure {
        /// The violation that abandoned the frame
        violation: Violation,
        /// Where the decoder found the bus idle again. `None` when the
        /// stream ended first.
        resync: Option<FramePosition>,
        /// Every violation in the frame, in order
        violations: Vec<Violation>,
    },
    InternalError {
        reason: InternalFault,
    },
}

impl DecodeOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            DecodeOutcome::Success { .. } => "Success",
            DecodeOutcome::SoftFailure { .. } => "SoftFailure",
            DecodeOutcome::FatalFailure { .. } => "FatalFailure",
            DecodeOutcome::InternalError { .. } => "InternalError",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DecodeOutcome::Success { .. })
    }

    /// The decoded message, when the frame was parsed to the end.
    pub fn message(&self) -> Option<&LogicalMessage> {
        match self {
            DecodeOutcome::Success { message, .. } | DecodeOutcome::SoftFailure { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            DecodeOutcome::SoftFailure { violations, .. }
            | DecodeOutcome::FatalFailure { violations, .. } => violations,
            _ => &[],
        }
    }
}

/// One frame as handed back by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Position of the SOF bit
    pub start: FramePosition,
    /// Byte range of the frame in the input text
    pub text_range: Range<usize>,
    /// Bits as received, stuff bits shown as `x`/`y`
    pub stuffed: String,
    /// Bits delivered to the state machine
    pub destuffed: String,
    /// Fields as decoded, partial on failure
    pub fields: FrameFields,
    pub stuff_counts: [u32; 2],
    pub outcome: DecodeOutcome,
}

// ============================================================================
// Frame Parse State
// ============================================================================

/// Working memory for decoding one frame.
#[derive(Debug, Clone)]
pub struct FrameParseState {
    stage: Stage,
    fields: FrameFields,
    /// Bits consumed in the current stage
    field_bits: u32,
    /// Data bits announced by the DLC (after clamping)
    data_bits: u32,
    crc: CrcEngine,
    computed_crc: Option<u16>,
    stuffing: Destuffer,
    violations: Vec<Violation>,
    internal: Option<InternalFault>,
    resync_run: u32,
    resync_point: Option<FramePosition>,
    start: FramePosition,
    last_position: FramePosition,
    text_range: Range<usize>,
    stuffed_text: String,
    destuffed_text: String,
}

impl FrameParseState {
    pub fn new(config: &CodecConfig) -> Self {
        FrameParseState {
            stage: Stage::Sof,
            fields: FrameFields::default(),
            field_bits: 0,
            data_bits: 0,
            crc: CrcEngine::new(config.crc_polynomial),
            computed_crc: None,
            stuffing: Destuffer::new(config.stuff_trigger),
            violations: Vec::new(),
            internal: None,
            resync_run: 0,
            resync_point: None,
            start: FramePosition::default(),
            last_position: FramePosition::default(),
            text_range: 0..0,
            stuffed_text: String::new(),
            destuffed_text: String::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn fields(&self) -> &FrameFields {
        &self.fields
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Bits collected so far, stuff bits shown as `x`/`y`.
    pub fn stuffed_text(&self) -> &str {
        &self.stuffed_text
    }

    fn feed(&mut self, input: SourceBit, resync_bits: u32) {
        match self.stage {
            Stage::Sof => {
                // Idle bus, keep waiting for a dominant start bit
                if input.bit.is_recessive() {
                    return;
                }
                self.start = input.position;
                self.text_range = input.offset..input.offset + 1;
                self.stuffing.seed(input.bit);
                self.accept(input);
            }
            Stage::HardFail => {
                self.note_position(&input);
                self.stuffed_text.push(input.bit.as_char());
                self.scan_for_idle(input, resync_bits);
            }
            Stage::Ended => self.internal_fault(InternalFault::UnreachableStage(Stage::Ended)),
            _ => {
                self.note_position(&input);
                match self.stuffing.is_stuff_bit(input.bit) {
                    Ok(true) => self.stuffed_text.push(input.bit.stuff_char()),
                    Ok(false) => self.accept(input),
                    Err(violation) => {
                        self.stuffed_text.push(input.bit.as_char());
                        self.fail(ViolationKind::Stuffing(violation), input.position);
                    }
                }
            }
        }
    }

    fn note_position(&mut self, input: &SourceBit) {
        self.last_position = input.position;
        self.text_range.end = input.offset + 1;
    }

    /// Deliver a frame bit (not a stuff bit) to the state machine.
    fn accept(&mut self, input: SourceBit) {
        if input.annotated_stuff {
            self.record(ViolationKind::FalseStuffAnnotation, input.position);
        }

        let bit = input.bit;
        self.last_position = input.position;
        self.stuffed_text.push(bit.as_char());
        self.destuffed_text.push(bit.as_char());
        if self.stage.is_crc_covered() {
            self.crc.consume_bit(bit);
        }
        self.step(bit, input.position);
    }

    fn step(&mut self, bit: Bit, position: FramePosition) {
        match self.stage {
            Stage::Sof => {
                self.fields.sof = bit;
                self.advance(Stage::ArbitrationId);
            }
            Stage::ArbitrationId => {
                self.fields.base_id = (self.fields.base_id << 1) | bit.value() as u16;
                if self.field_complete(ID_BITS) {
                    self.advance(Stage::RtrOrSrr);
                }
            }
            Stage::RtrOrSrr => {
                self.fields.rtr_or_srr = bit;
                self.advance(Stage::Ide);
            }
            Stage::Ide => {
                self.fields.ide = bit;
                if bit.is_recessive() {
                    self.fields.extended = Some(ExtendedFields::default());
                    self.advance(Stage::ExtendedId);
                } else {
                    self.advance(Stage::R0);
                }
            }
            Stage::ExtendedId | Stage::Rtr | Stage::R1 => self.step_extended(bit),
            Stage::R0 => {
                self.fields.r0 = bit;
                self.advance(Stage::Dlc);
            }
            Stage::Dlc => {
                self.fields.dlc = (self.fields.dlc << 1) | bit.value() as u8;
                if self.field_complete(DLC_BITS) {
                    self.end_control_field(position);
                }
            }
            Stage::Data => {
                if self.field_bits % 8 == 0 {
                    self.fields.data.push(0);
                }
                if let Some(byte) = self.fields.data.last_mut() {
                    *byte = (*byte << 1) | bit.value() as u8;
                }
                if self.field_complete(self.data_bits) {
                    self.advance(Stage::Crc);
                }
            }
            Stage::Crc => {
                // Everything the CRC covers has been consumed by now
                if self.computed_crc.is_none() {
                    self.computed_crc = Some(self.crc.finalize() as u16);
                }
                self.fields.crc = (self.fields.crc << 1) | bit.value() as u16;
                if self.field_complete(CRC_BITS) {
                    self.stuffing.close_region();
                    self.advance(Stage::CrcDelimiter);
                }
            }
            Stage::CrcDelimiter => {
                self.fields.crc_delimiter = bit;
                if bit.is_dominant() {
                    self.record(ViolationKind::CrcDelimiterDominant, position);
                }
                match self.computed_crc {
                    Some(computed) if computed != self.fields.crc => self.record(
                        ViolationKind::CrcMismatch {
                            computed,
                            received: self.fields.crc,
                        },
                        position,
                    ),
                    Some(_) => {}
                    None => {
                        return self.internal_fault(InternalFault::UnreachableStage(self.stage))
                    }
                }
                self.advance(Stage::AckSlot);
            }
            Stage::AckSlot => {
                self.fields.ack_slot = bit;
                if bit.is_dominant() {
                    self.record(ViolationKind::AckSlotDominant, position);
                }
                self.advance(Stage::AckDelimiter);
            }
            Stage::AckDelimiter => {
                self.fields.ack_delimiter = bit;
                if bit.is_dominant() {
                    self.record(ViolationKind::AckDelimiterDominant, position);
                }
                self.advance(Stage::Eof);
            }
            Stage::Eof => {
                if bit.is_dominant() {
                    let index = self.field_bits + 1;
                    return self.fail(ViolationKind::EofDominant { index }, position);
                }
                self.fields.eof = (self.fields.eof << 1) | 1;
                if self.field_complete(EOF_BITS) {
                    self.advance(Stage::Ifs);
                }
            }
            Stage::Ifs => {
                if bit.is_dominant() {
                    let index = self.field_bits + 1;
                    return self.fail(ViolationKind::IfsDominant { index }, position);
                }
                self.fields.ifs = (self.fields.ifs << 1) | 1;
                if self.field_complete(IFS_BITS) {
                    self.advance(Stage::Ended);
                }
            }
            Stage::HardFail | Stage::Ended => {
                self.internal_fault(InternalFault::UnreachableStage(self.stage))
            }
        }
    }

    /// EXTENDED_ID, RTR and r1 only exist once IDE selected an extended frame.
    fn step_extended(&mut self, bit: Bit) {
        let stage = self.stage;
        let ext = match self.fields.extended.as_mut() {
            Some(ext) => ext,
            None => return self.internal_fault(InternalFault::UnreachableStage(stage)),
        };

        match stage {
            Stage::ExtendedId => {
                ext.extended_id = (ext.extended_id << 1) | bit.value();
                if self.field_complete(EXT_ID_BITS) {
                    self.advance(Stage::Rtr);
                }
            }
            Stage::Rtr => {
                ext.rtr = bit;
                self.advance(Stage::R1);
            }
            _ => {
                ext.r1 = bit;
                self.advance(Stage::R0);
            }
        }
    }

    fn end_control_field(&mut self, position: FramePosition) {
        if self.fields.is_remote_request() && self.fields.dlc > 0 {
            self.record(
                ViolationKind::RemoteRequestWithLength {
                    dlc: self.fields.dlc,
                },
                position,
            );
        }

        // DLC 9..=15 still means 8 bytes
        self.data_bits = self.fields.data_length() as u32 * 8;
        if self.data_bits > 0 {
            self.advance(Stage::Data);
        } else {
            self.advance(Stage::Crc);
        }
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        self.field_bits = 0;
    }

    /// Count one more bit of the current field. True once `width` bits are in.
    fn field_complete(&mut self, width: u32) -> bool {
        self.field_bits += 1;
        self.field_bits >= width
    }

    fn record(&mut self, kind: ViolationKind, position: FramePosition) {
        self.violations
            .push(Violation::new(kind, self.stage, position));
    }

    fn fail(&mut self, kind: ViolationKind, position: FramePosition) {
        let violation = Violation::new(kind, self.stage, position);
        tlog!("[decoder] Frame at {} abandoned: {}", self.start, violation);
        self.violations.push(violation);
        self.stuffing.disable();
        self.resync_run = 0;
        self.advance(Stage::HardFail);
    }

    fn internal_fault(&mut self, fault: InternalFault) {
        tlog!("[decoder] Internal fault: {}", fault);
        self.internal.get_or_insert(fault);
        self.advance(Stage::Ended);
    }

    fn scan_for_idle(&mut self, input: SourceBit, resync_bits: u32) {
        if input.bit.is_recessive() {
            self.resync_run += 1;
        } else {
            self.resync_run = 0;
        }
        if self.resync_run >= resync_bits {
            self.resync_point = Some(input.position);
            self.advance(Stage::Ended);
        }
    }

    /// The input ran out. Finish the frame in whatever state it is in.
    fn end_of_stream(&mut self) {
        match self.stage {
            Stage::Sof | Stage::Ended => {}
            Stage::HardFail => self.advance(Stage::Ended),
            _ => {
                self.fail(ViolationKind::StreamEnded, self.last_position);
                self.advance(Stage::Ended);
            }
        }
    }

    fn outcome(&self, encoder: &FrameEncoder, round_trip_check: bool) -> DecodeOutcome {
        if let Some(reason) = &self.internal {
            return DecodeOutcome::InternalError {
                reason: reason.clone(),
            };
        }

        if let Some(fatal) = self.violations.iter().find(|v| v.is_fatal()) {
            return DecodeOutcome::FatalFailure {
                violation: fatal.clone(),
                resync: self.resync_point,
                violations: self.violations.clone(),
            };
        }

        let message = self.fields.to_message();
        if !self.violations.is_empty() {
            return DecodeOutcome::SoftFailure {
                message,
                violations: self.violations.clone(),
            };
        }

        let presentation = if round_trip_check {
            match check_round_trip(&self.fields, &self.stuffed_text, encoder) {
                Ok(presentation) => Some(presentation),
                Err(reason) => {
                    tlog!("[decoder] Round trip failed for frame at {}: {}", self.start, reason);
                    return DecodeOutcome::InternalError { reason };
                }
            }
        } else {
            None
        };

        DecodeOutcome::Success {
            message,
            diagnostics: Diagnostics {
                stuff_counts: self.stuffing.stuffed_counts(),
                presentation,
            },
        }
    }

    fn into_decoded(self, encoder: &FrameEncoder, round_trip_check: bool) -> DecodedFrame {
        let outcome = self.outcome(encoder, round_trip_check);
        DecodedFrame {
            start: self.start,
            text_range: self.text_range,
            stuff_counts: self.stuffing.stuffed_counts(),
            stuffed: self.stuffed_text,
            destuffed: self.destuffed_text,
            fields: self.fields,
            outcome,
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Incremental frame decoder. Feed bits with [`FrameDecoder::push`]; every
/// finished frame is handed back and the decoder starts over.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    config: CodecConfig,
    encoder: FrameEncoder,
    frame: FrameParseState,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new(CodecConfig::default())
    }
}

impl FrameDecoder {
    pub fn new(config: CodecConfig) -> Self {
        FrameDecoder {
            encoder: FrameEncoder::new(&config),
            frame: FrameParseState::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.frame.stage()
    }

    /// State of the frame currently being decoded.
    pub fn frame(&self) -> &FrameParseState {
        &self.frame
    }

    /// Consume one bit. Returns the frame once it has ended.
    pub fn push(&mut self, input: SourceBit) -> Option<DecodedFrame> {
        self.frame.feed(input, self.config.resync_recessive_bits);
        if self.frame.stage() == Stage::Ended {
            Some(self.take_frame())
        } else {
            None
        }
    }

    /// Signal end of stream. Returns the frame in progress, if any.
    pub fn finish(&mut self) -> Option<DecodedFrame> {
        if self.frame.stage() == Stage::Sof {
            return None;
        }
        self.frame.end_of_stream();
        Some(self.take_frame())
    }

    /// Drop the frame in progress.
    pub fn reset(&mut self) {
        self.frame = FrameParseState::new(&self.config);
    }

    fn take_frame(&mut self) -> DecodedFrame {
        let frame = std::mem::replace(&mut self.frame, FrameParseState::new(&self.config));
        frame.into_decoded(&self.encoder, self.config.round_trip_check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitSource;

    const STANDARD_01: &str =
        "00010010001100000110101010111100110111110111001111001111111111111";
    const STANDARD_XY: &str =
        "00010010001100000y1010101011110011011111x111001111001111111111111";

    fn decode_all(text: &str) -> Vec<DecodedFrame> {
        let mut decoder = FrameDecoder::default();
        let mut frames: Vec<DecodedFrame> =
            BitSource::new(text).filter_map(|bit| decoder.push(bit)).collect();
        frames.extend(decoder.finish());
        frames
    }

    fn decode_one(text: &str) -> DecodedFrame {
        let mut frames = decode_all(text);
        assert_eq!(frames.len(), 1, "expected exactly one frame");
        frames.remove(0)
    }

    fn replace_bit(text: &str, index: usize, c: char) -> String {
        text.chars()
            .enumerate()
            .map(|(i, old)| if i == index { c } else { old })
            .collect()
    }

    #[test]
    fn test_decodes_standard_frame() {
        let frame = decode_one(STANDARD_01);
        let message = frame.outcome.message().unwrap();
        assert_eq!(message.identifier, 0x123);
        assert!(!message.is_extended);
        assert!(!message.is_remote_request);
        assert_eq!(message.data, vec![0xAB, 0xCD]);
        assert_eq!(frame.fields.crc, 0x7F3C);
        assert_eq!(frame.stuffed, STANDARD_XY);
        assert_eq!(frame.stuff_counts, [1, 1]);
        assert_eq!(frame.start, FramePosition::new(1, 1));

        match &frame.outcome {
            DecodeOutcome::Success { diagnostics, .. } => {
                assert!(diagnostics.presentation.is_some());
                assert_eq!(diagnostics.stuff_counts, [1, 1]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_annotated_stuff_bits_are_accepted() {
        let frame = decode_one(STANDARD_XY);
        assert!(frame.outcome.is_success());
    }

    #[test]
    fn test_false_stuff_annotation_is_soft() {
        // Bit 1 is an ordinary ID bit
        let frame = decode_one(&replace_bit(STANDARD_01, 1, 'x'));
        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::FalseStuffAnnotation);
        assert_eq!(violations[0].stage, Stage::ArbitrationId);
    }

    #[test]
    fn test_skips_leading_idle_bits() {
        let text = format!("1111\n  {}", STANDARD_01);
        let frame = decode_one(&text);
        assert!(frame.outcome.is_success());
        assert_eq!(frame.start, FramePosition::new(2, 3));
        assert_eq!(&text[frame.text_range.clone()], STANDARD_01);
    }

    #[test]
    fn test_decodes_extended_frame() {
        let frame = decode_one(
            "00000y110101011111x10011011110111100000y000100110101110101111111111111",
        );
        let message = frame.outcome.message().unwrap();
        assert_eq!(message.identifier, 0x1ABC_DEF);
        assert!(message.is_extended);
        assert!(frame.outcome.is_success());
        assert_eq!(frame.fields.base_id, 0x6A);
        assert_eq!(frame.fields.extended.unwrap().extended_id, 0x3CDEF);
    }

    #[test]
    fn test_crc_mismatch_is_soft() {
        // Valid framing and stuffing, wrong sender CRC
        let encoder = FrameEncoder::default();
        let msg = LogicalMessage::new(0x123, false, vec![0xAB, 0xCD]).unwrap();
        let mut fields = encoder.fields_for(&msg).unwrap();
        fields.crc ^= 1;
        let frame = decode_one(&encoder.render(fields).stuffed_01);

        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].kind,
            ViolationKind::CrcMismatch {
                computed: 0x7F3C,
                received: 0x7F3D
            }
        );
        assert_eq!(violations[0].stage, Stage::CrcDelimiter);
        // The frame is still parsed to the end
        assert_eq!(frame.outcome.message(), Some(&msg));
    }

    #[test]
    fn test_dominant_ack_slot_is_soft() {
        // CRC delimiter, ACK slot, ACK delimiter start 13 bits from the end
        let index = STANDARD_01.len() - 12;
        let frame = decode_one(&replace_bit(STANDARD_01, index, '0'));
        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::AckSlotDominant);
        assert_eq!(violations[0].position, FramePosition::new(1, index as u32 + 1));
    }

    #[test]
    fn test_dominant_crc_delimiter_is_soft() {
        let index = STANDARD_01.len() - 13;
        let frame = decode_one(&replace_bit(STANDARD_01, index, '0'));
        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::CrcDelimiterDominant);
        assert_eq!(violations[0].stage, Stage::CrcDelimiter);
        assert_eq!(violations[0].position, FramePosition::new(1, index as u32 + 1));
    }

    #[test]
    fn test_dominant_ack_delimiter_is_soft() {
        let index = STANDARD_01.len() - 11;
        let frame = decode_one(&replace_bit(STANDARD_01, index, '0'));
        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::AckDelimiterDominant);
        assert_eq!(violations[0].stage, Stage::AckDelimiter);
    }

    #[test]
    fn test_dominant_ifs_bit_is_fatal() {
        let index = STANDARD_01.len() - 2;
        let frame = decode_one(&replace_bit(STANDARD_01, index, '0'));
        match &frame.outcome {
            DecodeOutcome::FatalFailure {
                violation, resync, ..
            } => {
                assert_eq!(violation.stage, Stage::Ifs);
                assert_eq!(violation.kind, ViolationKind::IfsDominant { index: 2 });
                assert_eq!(violation.position, FramePosition::new(1, index as u32 + 1));
                // A single recessive bit is left, too few to resync
                assert_eq!(*resync, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_dominant_eof_bit_is_fatal() {
        let index = STANDARD_01.len() - 10 + 2;
        let frame = decode_one(&replace_bit(STANDARD_01, index, '0'));
        match &frame.outcome {
            DecodeOutcome::FatalFailure {
                violation, resync, ..
            } => {
                assert_eq!(violation.stage, Stage::Eof);
                assert_eq!(violation.kind, ViolationKind::EofDominant { index: 3 });
                // Only seven recessive bits follow before the input ends
                assert_eq!(*resync, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_stuff_violation_resyncs_on_idle_bus() {
        let text = format!("0111111{}", &STANDARD_01[7..]);
        let frames = decode_all(&text);
        assert_eq!(frames.len(), 1);
        match &frames[0].outcome {
            DecodeOutcome::FatalFailure {
                violation, resync, ..
            } => {
                assert_eq!(violation.stage, Stage::ArbitrationId);
                assert!(violation.message.contains("too many sequential 1s"));
                assert_eq!(violation.position, FramePosition::new(1, 7));
                // Tenth bit of the recessive tail
                assert_eq!(*resync, Some(FramePosition::new(1, 62)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_stream_ending_mid_frame_is_fatal() {
        let frame = decode_one(&STANDARD_01[..30]);
        match &frame.outcome {
            DecodeOutcome::FatalFailure {
                violation, resync, ..
            } => {
                assert_eq!(violation.kind, ViolationKind::StreamEnded);
                assert_eq!(violation.stage, Stage::Data);
                assert_eq!(violation.position, FramePosition::new(1, 30));
                assert_eq!(*resync, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            frame.outcome.violations()[0].to_string(),
            "stream ended before frame was complete (line 1:30); stage = DATA"
        );
    }

    #[test]
    fn test_remote_request_with_length_is_soft() {
        // Remote frame for 0x123 with DLC 1 and one data byte, built by hand
        let encoder = FrameEncoder::default();
        let mut fields = FrameFields::from_message(&LogicalMessage::new(0x123, true, vec![]).unwrap());
        fields.dlc = 1;
        fields.data = vec![0x5A];
        fields.crc = encoder.crc_for(&fields);
        let frame = decode_one(&encoder.render(fields).stuffed_01);

        assert_eq!(frame.outcome.tag(), "SoftFailure");
        let violations = frame.outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].kind,
            ViolationKind::RemoteRequestWithLength { dlc: 1 }
        );
        assert_eq!(violations[0].stage, Stage::Dlc);
        // The byte is kept on the wire fields but not in the message
        assert_eq!(frame.fields.data, vec![0x5A]);
        let message = frame.outcome.message().unwrap();
        assert!(message.is_remote_request);
        assert!(message.data.is_empty());
    }

    #[test]
    fn test_dlc_above_eight_is_clamped() {
        let encoder = FrameEncoder::default();
        let msg = LogicalMessage::new(0x42, false, (1..=8).collect()).unwrap();
        let mut fields = encoder.fields_for(&msg).unwrap();
        fields.dlc = 15;
        fields.crc = encoder.crc_for(&fields);
        let frame = decode_one(&encoder.render(fields).stuffed_01);

        assert!(frame.outcome.is_success(), "{:?}", frame.outcome);
        assert_eq!(frame.fields.dlc, 15);
        assert_eq!(frame.outcome.message().unwrap().data, (1..=8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_back_to_back_frames() {
        let text = format!("{}\n{}\n", STANDARD_01, STANDARD_XY);
        let frames = decode_all(&text);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.outcome.is_success()));
        assert_eq!(frames[1].start, FramePosition::new(2, 1));
    }

    #[test]
    fn test_incremental_push() {
        let mut decoder = FrameDecoder::default();
        let bits: Vec<SourceBit> = BitSource::new(STANDARD_01).collect();
        let (last, head) = bits.split_last().unwrap();

        for bit in head {
            assert!(decoder.push(*bit).is_none());
        }
        assert_eq!(decoder.stage(), Stage::Ifs);
        let frame = decoder.push(*last).unwrap();
        assert!(frame.outcome.is_success());
        assert_eq!(decoder.stage(), Stage::Sof);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_stage_progression() {
        let mut decoder = FrameDecoder::default();
        let mut stages = vec![decoder.stage()];
        for bit in BitSource::new(STANDARD_01) {
            if decoder.push(bit).is_some() {
                break;
            }
            if stages.last() != Some(&decoder.stage()) {
                stages.push(decoder.stage());
            }
        }
        assert_eq!(
            stages,
            vec![
                Stage::Sof,
                Stage::ArbitrationId,
                Stage::RtrOrSrr,
                Stage::Ide,
                Stage::R0,
                Stage::Dlc,
                Stage::Data,
                Stage::Crc,
                Stage::CrcDelimiter,
                Stage::AckSlot,
                Stage::AckDelimiter,
                Stage::Eof,
                Stage::Ifs,
            ]
        );
    }

    #[test]
    fn test_round_trip_can_be_disabled() {
        let config = CodecConfig {
            round_trip_check: false,
            ..CodecConfig::default()
        };
        let mut decoder = FrameDecoder::new(config);
        let mut frames: Vec<DecodedFrame> = BitSource::new(STANDARD_01)
            .filter_map(|bit| decoder.push(bit))
            .collect();
        match frames.remove(0).outcome {
            DecodeOutcome::Success { diagnostics, .. } => assert!(diagnostics.presentation.is_none()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_violation_serializes_with_message() {
        let violation = Violation::new(
            ViolationKind::CrcMismatch {
                computed: 0x1,
                received: 0x2,
            },
            Stage::CrcDelimiter,
            FramePosition::new(3, 4),
        );
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["kind"]["type"], "crc_mismatch");
        assert_eq!(json["stage"], "CRC_DELIMITER");
        assert_eq!(json["severity"], "soft");
        assert_eq!(
            json["message"],
            "calculated CRC does not match sender's CRC (0x1 <> 0x2)"
        );
    }
}
