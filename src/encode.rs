use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::{Pos, Tok};

/// Output encoding of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// One `HHLL;` line per word.
    #[default]
    Hex,
    /// Two raw bytes per word, high byte first.
    Bin,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" | "X" | "hex" | "HEX" => Ok(Self::Hex),
            "b" | "B" | "bin" | "BIN" => Ok(Self::Bin),
            _ => Err(format!("unknown output format `{s}`, expected `hex` or `bin`")),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex => f.write_str("hex"),
            Self::Bin => f.write_str("bin"),
        }
    }
}

/// The bit fields of one instruction word.
///
/// ```text
///  15      9 8 7       0
/// | opcode |d|   data   |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub opcode: u8,
    pub dst: u8,
    pub data: u8,
}

impl Word {
    pub fn pack(self) -> [u8; 2] {
        [((self.opcode & 0x0F) << 1) | (self.dst & 1), self.data]
    }

    pub fn unpack(bytes: [u8; 2]) -> Self {
        Self {
            opcode: (bytes[0] >> 1) & 0x0F,
            dst: bytes[0] & 1,
            data: bytes[1],
        }
    }
}

/// An encoded instruction and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ins<'a> {
    pub mne: Tok,
    pub word: Word,
    pub addr: u32,
    pub pos: Pos<'a>,
}

/// Collects encoded words in the selected [`Format`].
#[derive(Debug)]
pub struct Emitter {
    format: Format,
    data: Vec<u8>,
    words: usize,
    pad: Option<(u64, u16)>,
}

impl Emitter {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            data: Vec::new(),
            words: 0,
            pad: None,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Words emitted so far, padding excluded.
    pub fn words(&self) -> usize {
        self.words
    }

    pub fn word(&mut self, bytes: [u8; 2]) {
        match self.format {
            Format::Bin => self.data.extend_from_slice(&bytes),
            Format::Hex => self
                .data
                .extend_from_slice(format!("{:02X}{:02X};\n", bytes[0], bytes[1]).as_bytes()),
        }
        self.words += 1;
    }

    /// `PUT`: `count` copies of a raw 16-bit word.
    pub fn put(&mut self, value: u16, count: u64) {
        for _ in 0..count {
            self.word(value.to_be_bytes());
        }
    }

    /// Records a `PAD` request. Returns false if one was already recorded.
    pub fn set_pad(&mut self, len: u64, fill: u16) -> bool {
        if self.pad.is_some() {
            return false;
        }
        self.pad = Some((len, fill));
        true
    }

    /// Apply any pending padding and hand back the encoded bytes with the final word count.
    pub fn finish(mut self) -> (Vec<u8>, usize) {
        if let Some((len, fill)) = self.pad.take() {
            let missing = len.saturating_sub(self.words as u64);
            tracing::debug!("padding {missing} words with {fill:#06X}");
            self.put(fill, missing);
        }
        (self.data, self.words)
    }
}
