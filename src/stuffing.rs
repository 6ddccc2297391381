// src/stuffing.rs
//
// Bit stuffing engine.
//
// CAN has no shared clock, so after `trigger` (5) consecutive bits of the
// same polarity the transmitter inserts one bit of the opposite polarity.
// The stuff bit counts towards the next run. The receiver removes it again.
// Stuffing covers SOF through the end of the CRC sequence; the CRC
// delimiter, ACK, EOF and IFS are never stuffed.

use serde::Serialize;

use crate::bits::Bit;

// ============================================================================
// Constants
// ============================================================================

/// Number of identical bits after which a stuff bit is inserted.
pub const DEFAULT_STUFF_TRIGGER: u8 = 5;

// ============================================================================
// Types
// ============================================================================

/// A run of identical bits longer than the stuffing rule allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("too many sequential {repeated}s (expected a stuffed {expected})")]
pub struct StuffViolation {
    /// Polarity of the offending run
    pub repeated: Bit,
    /// The stuff bit that should have been there
    pub expected: Bit,
    /// Length of the run including the offending bit
    pub run: u8,
}

/// Per-polarity run counters shared by both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunCounters {
    runs: [u8; 2],
    prev: Option<Bit>,
}

impl RunCounters {
    /// Start a new run of `bit`.
    fn restart(&mut self, bit: Bit) {
        self.runs = [0, 0];
        self.runs[bit.index()] = 1;
        self.prev = Some(bit);
    }

    fn run(&self, bit: Bit) -> u8 {
        self.runs[bit.index()]
    }
}

// ============================================================================
// Decode Direction
// ============================================================================

/// Receiver side of bit stuffing. Decides, bit by bit, whether an incoming
/// bit is a stuff bit that must be dropped.
#[derive(Debug, Clone)]
pub struct Destuffer {
    counters: RunCounters,
    stuffed: [u32; 2],
    enabled: bool,
    closing: bool,
    trigger: u8,
}

impl Destuffer {
    pub fn new(trigger: u8) -> Self {
        Destuffer {
            counters: RunCounters::default(),
            stuffed: [0, 0],
            enabled: true,
            closing: false,
            trigger,
        }
    }

    /// Seed the counters with the SOF bit, which counts as a run of one.
    pub fn seed(&mut self, sof: Bit) {
        self.counters.restart(sof);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn stuffing off for the rest of the frame.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.closing = false;
    }

    /// Mark the end of the stuffed region (the last CRC bit has been read).
    ///
    /// If that bit completed a full run, the transmitter still inserted one
    /// stuff bit after it, so the next bit is checked before stuffing turns
    /// off.
    pub fn close_region(&mut self) {
        if self.counters.runs.iter().any(|&run| run >= self.trigger) {
            self.closing = true;
        } else {
            self.disable();
        }
    }

    /// Stuff bits removed so far, indexed by polarity.
    pub fn stuffed_counts(&self) -> [u32; 2] {
        self.stuffed
    }

    /// Length of the current run of `bit`.
    pub fn run_length(&self, bit: Bit) -> u8 {
        self.counters.run(bit)
    }

    /// Classify the next received bit.
    ///
    /// Returns `Ok(true)` for a stuff bit, `Ok(false)` for a bit that belongs
    /// to the frame, and an error when a run exceeds the trigger count.
    pub fn is_stuff_bit(&mut self, bit: Bit) -> Result<bool, StuffViolation> {
        if !self.enabled {
            return Ok(false);
        }

        let prev = match self.counters.prev {
            Some(prev) => prev,
            None => {
                self.seed(bit);
                return Ok(false);
            }
        };

        let result = if bit != prev {
            let is_stuffed = self.counters.run(!bit) >= self.trigger;
            if is_stuffed {
                self.stuffed[bit.index()] += 1;
            }
            self.counters.restart(bit);
            Ok(is_stuffed)
        } else if self.counters.run(bit) >= self.trigger {
            Err(StuffViolation {
                repeated: bit,
                expected: !bit,
                run: self.counters.run(bit).saturating_add(1),
            })
        } else {
            self.counters.runs[bit.index()] += 1;
            Ok(false)
        };

        if self.closing {
            self.disable();
        }
        result
    }
}

// ============================================================================
// Encode Direction
// ============================================================================

/// Transmitter side of bit stuffing.
#[derive(Debug, Clone)]
pub struct Stuffer {
    counters: RunCounters,
    stuffed: [u32; 2],
    trigger: u8,
}

impl Stuffer {
    pub fn new(trigger: u8) -> Self {
        Stuffer {
            counters: RunCounters::default(),
            stuffed: [0, 0],
            trigger,
        }
    }

    /// Record an emitted bit. Returns the stuff bit that must follow it, if any.
    pub fn push(&mut self, bit: Bit) -> Option<Bit> {
        if self.counters.prev == Some(bit) {
            self.counters.runs[bit.index()] += 1;
        } else {
            self.counters.restart(bit);
        }

        if self.counters.run(bit) >= self.trigger {
            let stuff = !bit;
            self.stuffed[stuff.index()] += 1;
            self.counters.restart(stuff);
            Some(stuff)
        } else {
            None
        }
    }

    /// Stuff a formatted bit string. Bit characters are counted, stuff bits
    /// are inserted as `x`/`y`, and anything else (spacing) passes through.
    pub fn stuff_text(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 4);
        for c in text.chars() {
            out.push(c);
            if let Some((bit, _)) = Bit::from_char(c) {
                if let Some(stuff) = self.push(bit) {
                    out.push(stuff.stuff_char());
                }
            }
        }
        out
    }

    /// Stuff bits inserted so far, indexed by polarity.
    pub fn stuffed_counts(&self) -> [u32; 2] {
        self.stuffed
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

/// Stuff a whole bit sequence.
pub fn stuff_bits(bits: &[Bit], trigger: u8) -> Vec<Bit> {
    let mut stuffer = Stuffer::new(trigger);
    let mut out = Vec::with_capacity(bits.len() + bits.len() / trigger.max(1) as usize);
    for &bit in bits {
        out.push(bit);
        if let Some(stuff) = stuffer.push(bit) {
            out.push(stuff);
        }
    }
    out
}

/// Remove stuff bits from a whole bit sequence.
pub fn destuff_bits(bits: &[Bit], trigger: u8) -> Result<Vec<Bit>, StuffViolation> {
    let mut destuffer = Destuffer::new(trigger);
    let mut out = Vec::with_capacity(bits.len());
    for &bit in bits {
        if !destuffer.is_stuff_bit(bit)? {
            out.push(bit);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Bit> {
        text.chars().filter_map(Bit::from_char).map(|(b, _)| b).collect()
    }

    fn longest_run(bits: &[Bit]) -> usize {
        let mut longest = 0;
        let mut current = 0;
        let mut prev = None;
        for &bit in bits {
            current = if prev == Some(bit) { current + 1 } else { 1 };
            longest = longest.max(current);
            prev = Some(bit);
        }
        longest
    }

    #[test]
    fn test_stuff_text_zeros() {
        let mut stuffer = Stuffer::new(DEFAULT_STUFF_TRIGGER);
        assert_eq!(stuffer.stuff_text("0"), "0");
        assert_eq!(stuffer.stuff_text("00000000000"), "0000y00000y00");
        assert_eq!(stuffer.stuffed_counts(), [0, 2]);
    }

    #[test]
    fn test_stuff_text_passes_spacing_through() {
        let mut stuffer = Stuffer::new(DEFAULT_STUFF_TRIGGER);
        assert_eq!(stuffer.stuff_text("1111 1111"), "1111 1x111");
    }

    #[test]
    fn test_stuff_bit_counts_towards_next_run() {
        // 11111 -> stuff 0, then four more 0s make a run of five
        let stuffed = stuff_bits(&parse("1111100001"), DEFAULT_STUFF_TRIGGER);
        assert_eq!(stuffed, parse("111110000011"));
        let stuffed = stuff_bits(&parse("111110000"), DEFAULT_STUFF_TRIGGER);
        assert_eq!(stuffed, parse("11111000001"));
    }

    #[test]
    fn test_destuffer_drops_stuff_bits() {
        let bits = destuff_bits(&parse("0000010000"), DEFAULT_STUFF_TRIGGER).unwrap();
        assert_eq!(bits, parse("000000000"));
    }

    #[test]
    fn test_destuffer_rejects_sixth_identical_bit() {
        let err = destuff_bits(&parse("0111111"), DEFAULT_STUFF_TRIGGER).unwrap_err();
        assert_eq!(err.repeated, Bit::Recessive);
        assert_eq!(err.run, 6);
        assert!(err.to_string().contains("too many sequential 1s"));
        assert!(err.to_string().contains("expected a stuffed 0"));
    }

    #[test]
    fn test_destuffer_seed_counts_sof() {
        let mut destuffer = Destuffer::new(DEFAULT_STUFF_TRIGGER);
        destuffer.seed(Bit::Dominant);
        for _ in 0..4 {
            assert_eq!(destuffer.is_stuff_bit(Bit::Dominant), Ok(false));
        }
        assert_eq!(destuffer.run_length(Bit::Dominant), 5);
        assert_eq!(destuffer.is_stuff_bit(Bit::Recessive), Ok(true));
        assert_eq!(destuffer.stuffed_counts(), [0, 1]);
    }

    #[test]
    fn test_close_region_without_pending_run() {
        let mut destuffer = Destuffer::new(DEFAULT_STUFF_TRIGGER);
        destuffer.seed(Bit::Dominant);
        assert_eq!(destuffer.is_stuff_bit(Bit::Recessive), Ok(false));
        destuffer.close_region();
        assert!(!destuffer.is_enabled());
        // Long runs are legal once stuffing is off
        for _ in 0..10 {
            assert_eq!(destuffer.is_stuff_bit(Bit::Recessive), Ok(false));
        }
    }

    #[test]
    fn test_close_region_checks_one_trailing_stuff_bit() {
        let mut destuffer = Destuffer::new(DEFAULT_STUFF_TRIGGER);
        destuffer.seed(Bit::Recessive);
        for _ in 0..4 {
            assert_eq!(destuffer.is_stuff_bit(Bit::Recessive), Ok(false));
        }
        destuffer.close_region();
        assert!(destuffer.is_enabled());
        assert_eq!(destuffer.is_stuff_bit(Bit::Dominant), Ok(true));
        assert!(!destuffer.is_enabled());
        assert_eq!(destuffer.is_stuff_bit(Bit::Dominant), Ok(false));
    }

    #[test]
    fn test_disabled_destuffer_passes_everything() {
        let mut destuffer = Destuffer::new(DEFAULT_STUFF_TRIGGER);
        destuffer.disable();
        for _ in 0..12 {
            assert_eq!(destuffer.is_stuff_bit(Bit::Dominant), Ok(false));
        }
        assert_eq!(destuffer.stuffed_counts(), [0, 0]);
    }

    #[test]
    fn test_destuff_inverts_stuff() {
        // Every 12-bit pattern, plus long runs of each polarity
        let mut inputs: Vec<Vec<Bit>> = (0u32..4096)
            .map(|v| (0..12).map(|i| Bit::from_lsb(v >> i)).collect())
            .collect();
        inputs.push(vec![Bit::Dominant; 40]);
        inputs.push(vec![Bit::Recessive; 40]);

        for bits in inputs {
            let stuffed = stuff_bits(&bits, DEFAULT_STUFF_TRIGGER);
            assert!(longest_run(&stuffed) <= DEFAULT_STUFF_TRIGGER as usize);
            assert_eq!(destuff_bits(&stuffed, DEFAULT_STUFF_TRIGGER), Ok(bits));
        }
    }

    #[test]
    fn test_other_trigger_counts() {
        let bits = vec![Bit::Recessive; 9];
        let stuffed = stuff_bits(&bits, 3);
        assert_eq!(stuffed, parse("111011101110"));
        assert_eq!(destuff_bits(&stuffed, 3), Ok(bits));
    }
}
