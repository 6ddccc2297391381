// src/glossary.rs
//
// Short description of every frame field, in transmission order.

/// One line per field for a standard or extended frame, followed by a note
/// on bit stuffing.
pub fn field_glossary(is_extended: bool, stuff_trigger: u8) -> String {
    const RTR: &str =
        "RTR:    Remote Transmission Request. DOMINANT (0) for data frames, RECESSIVE (1) to request data.";

    let mut lines: Vec<String> = vec![
        "GLOSSARY".to_string(),
        "SOF:    Start Of Frame. A single DOMINANT (0) bit on an idle bus.".to_string(),
        "ID:     11-bit identifier. Lower identifiers win arbitration.".to_string(),
    ];

    if is_extended {
        lines.push("SRR:    Substitute Remote Request. Always RECESSIVE (1) in extended frames.".to_string());
    } else {
        lines.push(RTR.to_string());
    }
    lines.push(
        "IDE:    Identifier Extension. DOMINANT (0) for 11-bit, RECESSIVE (1) for 29-bit identifiers."
            .to_string(),
    );
    if is_extended {
        lines.push("EXT_ID: Lower 18 bits of the 29-bit extended identifier.".to_string());
        lines.push(RTR.to_string());
        lines.push("r1:     Reserved, sent DOMINANT (0).".to_string());
    }

    lines.extend(
        [
            "r0:     Reserved, sent DOMINANT (0).",
            "DLC:    Data Length Code, 0-8 bytes. Values 9-15 also mean 8 bytes.",
            "DATA:   0-8 data bytes. Remote requests carry none.",
            "CRC:    15-bit Cyclic Redundancy Check over SOF through DATA.",
            "CRC_D:  CRC delimiter, RECESSIVE (1). Bit stuffing ends before it.",
            "ACK:    ACK slot and ACK delimiter. Receivers drive the slot DOMINANT (0) to acknowledge.",
            "EOF:    End Of Frame, 7 RECESSIVE (1) bits.",
            "IFS:    Inter Frame Space, 3 RECESSIVE (1) bits.",
            "",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    lines.push(format!(
        "After {} identical bits the transmitter inserts one stuff bit of the opposite polarity \
         so receivers can resynchronize. Receivers remove it again.",
        stuff_trigger
    ));
    lines.push("Stuff bits are shown as x (a stuffed 0) and y (a stuffed 1).".to_string());
    lines.push("Stuffing covers SOF through the last CRC bit; CRC_D onwards is never stuffed.".to_string());

    lines.join("\n")
}
