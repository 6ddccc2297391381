// src/roundtrip.rs
//
// Round-trip self-check: re-encode a decoded frame and compare the result
// with the bits that were actually received. A difference means the decoder
// and encoder disagree, which is a codec defect rather than a bad frame.

use crate::decoder::InternalFault;
use crate::encoder::{FrameEncoder, Presentation};
use crate::frame::FrameFields;

/// Bit text with all whitespace removed and stuff annotations lowercased,
/// so `X`/`Y` and `x`/`y` compare equal.
pub fn normalize_bit_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Re-encode `decoded` and compare it with `collected`, the stuffed bits
/// received for the frame.
///
/// The message carried by the frame is rebuilt from scratch. Bits that carry
/// no logical meaning (r0, r1, SRR and the raw DLC) are taken from the
/// decoded frame, then the CRC is recomputed. On a match the regenerated
/// presentation is returned.
pub fn check_round_trip(
    decoded: &FrameFields,
    collected: &str,
    encoder: &FrameEncoder,
) -> Result<Presentation, InternalFault> {
    let message = decoded.to_message();
    let mut fields = encoder
        .fields_for(&message)
        .map_err(|e| InternalFault::Reencode(e.to_string()))?;
    fields.copy_reserved_bits(decoded);
    fields.crc = encoder.crc_for(&fields);

    let encoded = encoder.render(fields);
    let generated = normalize_bit_text(&encoded.stuffed_xy);
    let collected = normalize_bit_text(collected);

    if generated != collected {
        return Err(InternalFault::RoundTripMismatch {
            collected,
            generated,
        });
    }
    Ok(encoded.presentation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::LogicalMessage;

    fn fields_of(msg: &LogicalMessage) -> FrameFields {
        FrameEncoder::default().fields_for(msg).unwrap()
    }

    #[test]
    fn test_normalize_bit_text() {
        assert_eq!(normalize_bit_text(" 0 1\nX y\tY "), "01xyy");
    }

    #[test]
    fn test_matching_frame_passes() {
        let msg = LogicalMessage::new(0x123, false, vec![0xAB, 0xCD]).unwrap();
        let collected = "0 00100100011 0 0 0 00Y10 10101011 11001101 111 1X111 0011 1100 1 11 1111111 111";
        let presentation =
            check_round_trip(&fields_of(&msg), collected, &FrameEncoder::default()).unwrap();
        assert!(presentation.labels.starts_with("SOF ID"));
    }

    #[test]
    fn test_mismatch_is_reported() {
        let msg = LogicalMessage::new(0x123, false, vec![0xAB, 0xCD]).unwrap();
        let err = check_round_trip(&fields_of(&msg), "0001", &FrameEncoder::default()).unwrap_err();
        match err {
            InternalFault::RoundTripMismatch {
                collected,
                generated,
            } => {
                assert_eq!(collected, "0001");
                assert!(generated.starts_with("00010010001100000y"));
            }
            other => panic!("unexpected fault {:?}", other),
        }
    }

    #[test]
    fn test_reserved_bits_are_carried_over() {
        let encoder = FrameEncoder::default();
        let msg = LogicalMessage::extended(0x7, false, vec![0x01]).unwrap();
        let mut wire = encoder.fields_for(&msg).unwrap();
        wire.r0 = crate::bits::Bit::Recessive;
        wire.crc = encoder.crc_for(&wire);
        let collected = encoder.render(wire.clone()).stuffed_xy;

        assert!(check_round_trip(&wire, &collected, &encoder).is_ok());
    }
}
