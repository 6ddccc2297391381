// src/bits.rs
//
// Bit polarity, input positions and the text bit source.
//
// The bit source walks free text and yields the frame bits it contains,
// together with the (line, column) they were found at. Accepted bit
// characters are `0`/`1` plus `x`/`X` and `y`/`Y`, which are a 0 or 1 the
// author has already marked as a stuff bit.

use std::fmt;
use std::iter::Peekable;
use std::ops::Not;
use std::str::CharIndices;

use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// Bus level of a single bit.
///
/// DOMINANT (logical 0) always wins arbitration over RECESSIVE (logical 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bit {
    #[default]
    Dominant = 0,
    Recessive = 1,
}

impl Bit {
    /// Bit from the least significant bit of `value`.
    pub fn from_lsb(value: u32) -> Self {
        if value & 1 == 0 {
            Bit::Dominant
        } else {
            Bit::Recessive
        }
    }

    /// Logical value, 0 or 1.
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Index into per-polarity counter pairs.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_dominant(self) -> bool {
        self == Bit::Dominant
    }

    pub fn is_recessive(self) -> bool {
        self == Bit::Recessive
    }

    /// `0` or `1`.
    pub fn as_char(self) -> char {
        match self {
            Bit::Dominant => '0',
            Bit::Recessive => '1',
        }
    }

    /// `x` or `y`, the notation for a stuff bit of this polarity.
    pub fn stuff_char(self) -> char {
        match self {
            Bit::Dominant => 'x',
            Bit::Recessive => 'y',
        }
    }

    /// Parse a bit character. Returns the bit and whether it was annotated
    /// as a stuff bit.
    pub fn from_char(c: char) -> Option<(Bit, bool)> {
        match c {
            '0' => Some((Bit::Dominant, false)),
            '1' => Some((Bit::Recessive, false)),
            'x' | 'X' => Some((Bit::Dominant, true)),
            'y' | 'Y' => Some((Bit::Recessive, true)),
            _ => None,
        }
    }
}

impl Not for Bit {
    type Output = Bit;

    fn not(self) -> Bit {
        match self {
            Bit::Dominant => Bit::Recessive,
            Bit::Recessive => Bit::Dominant,
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 1-based (line, column) of a character in the input text.
/// Used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FramePosition {
    pub line: u32,
    pub column: u32,
}

impl FramePosition {
    pub fn new(line: u32, column: u32) -> Self {
        FramePosition { line, column }
    }
}

impl fmt::Display for FramePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One bit read from the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceBit {
    pub bit: Bit,
    /// Written as `x`/`y` in the input
    pub annotated_stuff: bool,
    pub position: FramePosition,
    /// Byte offset of the bit character in the input
    pub offset: usize,
}

impl SourceBit {
    /// A plain, unannotated bit. Handy for callers feeding bits off hardware.
    pub fn plain(bit: Bit, position: FramePosition) -> Self {
        SourceBit {
            bit,
            annotated_stuff: false,
            position,
            offset: 0,
        }
    }
}

// ============================================================================
// Bit Source
// ============================================================================

/// Lazy, finite sequence of the bits found in a piece of text.
///
/// Newlines (`\r`, `\n`, `\r\n`, `\n\r`) advance the line and reset the
/// column. Other whitespace advances the column only. Any other character
/// is ignored.
pub struct BitSource<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
}

impl<'a> BitSource<'a> {
    pub fn new(text: &'a str) -> Self {
        BitSource {
            chars: text.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Position the next character would be read at.
    pub fn current_position(&self) -> FramePosition {
        FramePosition::new(self.line, self.column)
    }
}

impl Iterator for BitSource<'_> {
    type Item = SourceBit;

    fn next(&mut self) -> Option<SourceBit> {
        while let Some((offset, c)) = self.chars.next() {
            match c {
                '\r' | '\n' => {
                    // CRLF and LFCR count as a single newline
                    let pair = if c == '\r' { '\n' } else { '\r' };
                    if matches!(self.chars.peek(), Some((_, next)) if *next == pair) {
                        self.chars.next();
                    }
                    self.line += 1;
                    self.column = 1;
                }
                _ => {
                    if let Some((bit, annotated_stuff)) = Bit::from_char(c) {
                        let position = self.current_position();
                        self.column += 1;
                        return Some(SourceBit {
                            bit,
                            annotated_stuff,
                            position,
                            offset,
                        });
                    } else if c.is_whitespace() {
                        self.column += 1;
                    }
                }
            }
        }
        None
    }
}
