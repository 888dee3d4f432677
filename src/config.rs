use std::{error::Error, fs, path::Path};

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer};
use serde_derive::Deserialize;

use crate::{parse_int, Tok, MNEMONICS};

/// The 4-bit opcode assigned to each instruction mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcodes([u8; MNEMONICS.len()]);

impl Default for Opcodes {
    #[rustfmt::skip]
    fn default() -> Self {
        let mut opcodes = Self([0; MNEMONICS.len()]);
        opcodes.set(Tok::CALL, 0b0110);
        opcodes.set(Tok::RET,  0b0100);
        opcodes.set(Tok::BZ,   0b0010);
        opcodes.set(Tok::JMP,  0b1100);
        opcodes.set(Tok::ADD,  0b0011);
        opcodes.set(Tok::SUB,  0b1111);
        opcodes.set(Tok::LD,   0b0101);
        opcodes.set(Tok::IN,   0b0111);
        opcodes.set(Tok::OUT,  0b1010);
        opcodes.set(Tok::AND,  0b0000);
        opcodes
    }
}

impl Opcodes {
    fn index(mne: Tok) -> usize {
        debug_assert!(mne.is_instruction());
        (mne.0 - Tok::CALL.0) as usize
    }

    pub fn get(&self, mne: Tok) -> u8 {
        self.0[Self::index(mne)]
    }

    pub fn set(&mut self, mne: Tok, opcode: u8) {
        self.0[Self::index(mne)] = opcode & 0x0F;
    }

    /// Mnemonics sharing an opcode with an earlier mnemonic.
    pub fn collisions(&self) -> Vec<(Tok, Tok)> {
        let mut found = Vec::new();
        for (i, (_, a)) in MNEMONICS.iter().enumerate() {
            for (_, b) in &MNEMONICS[i + 1..] {
                if self.get(*a) == self.get(*b) {
                    found.push((*a, *b));
                }
            }
        }
        found
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, deserialize_with = "deserialize_opcodes")]
    opcodes: IndexMap<String, u8>,
}

/// Assembler settings read from a TOML file.
///
/// ```toml
/// [opcodes]
/// CALL = "0b0110"
/// JMP = "0xC"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub opcodes: Opcodes,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cant open file {}: {e}", path.display()))?;
        Self::parse(&text).map_err(|e| format!("{}: {e}", path.display()).into())
    }

    pub fn parse(text: &str) -> Result<Self, Box<dyn Error>> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut opcodes = Opcodes::default();
        for (name, opcode) in &file.opcodes {
            let mne = MNEMONICS
                .iter()
                .find_map(|(s, tok)| (*s == name.as_str()).then_some(*tok))
                .ok_or_else(|| format!("unknown instruction `{name}` in [opcodes]"))?;
            opcodes.set(mne, *opcode);
        }
        for (a, b) in opcodes.collisions() {
            tracing::warn!("`{a}` and `{b}` share opcode {:#06b}", opcodes.get(a));
        }
        Ok(Self { opcodes })
    }
}

fn deserialize_opcodes<'de, D>(deserializer: D) -> Result<IndexMap<String, u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let string_map = IndexMap::<String, String>::deserialize(deserializer)?;
    let mut map = IndexMap::new();
    for (name, buf) in string_map {
        let value = parse_int(&buf)
            .ok_or_else(|| de::Error::custom(format!("{buf} is not a valid opcode for {name}")))?;
        if value > 0x0F {
            return Err(de::Error::custom(format!(
                "opcode {buf} for {name} does not fit in 4 bits"
            )));
        }
        map.insert(name, value as u8);
    }
    Ok(map)
}
