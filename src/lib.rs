use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, ErrorKind},
};

pub mod asm;
pub mod config;
pub mod encode;
pub mod expr;
pub mod lexer;
pub mod store;

pub use asm::{assemble, Asm, Assembly};
pub use config::{Config, Opcodes};
pub use encode::{Emitter, Format, Ins, Word};
pub use lexer::Lexer;
pub use store::{Cursor, Label, Labels, TokenStore};

/// Parse an integer in the assembler's literal syntax: `0x` hex, `0b` binary or decimal.
pub fn parse_int(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(digits, 16).ok()
    } else if let Some(digits) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(digits, 2).ok()
    } else {
        s.parse().ok()
    }
}

pub fn parse_define(s: &str) -> Result<(String, u64), Box<dyn Error + Send + Sync + 'static>> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid SYMBOL=value: no `=` found in `{s}`"))?;
    let name = &s[..pos];
    if name.is_empty()
        || !name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'_')
    {
        return Err(format!("invalid symbol name `{name}`").into());
    }
    let value = &s[pos + 1..];
    let value = parse_int(value).ok_or_else(|| format!("`{value}` is not a valid integer"))?;
    Ok((name.to_string(), value))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tok(pub u8);

impl Tok {
    pub const LPAREN: Self = Self(b'(');
    pub const RPAREN: Self = Self(b')');
    pub const COMMA: Self = Self(b',');
    pub const PLUS: Self = Self(b'+');
    pub const MINUS: Self = Self(b'-');
    pub const STAR: Self = Self(b'*');
    pub const SOLIDUS: Self = Self(b'/');
    pub const MODULUS: Self = Self(b'%');
    pub const AMP: Self = Self(b'&');
    pub const PIPE: Self = Self(b'|');
    pub const CARET: Self = Self(b'^');
    pub const TILDE: Self = Self(b'~');

    pub const EOF: Self = Self(0x80);
    pub const NUM: Self = Self(0x81);
    pub const LABEL: Self = Self(0x82);
    pub const REF: Self = Self(0x83);
    pub const R0: Self = Self(0x84);
    pub const R1: Self = Self(0x85);

    pub const PAD: Self = Self(0x90);
    pub const PUT: Self = Self(0x91);

    // instruction mnemonics occupy a contiguous range
    pub const CALL: Self = Self(0xA0);
    pub const RET: Self = Self(0xA1);
    pub const BZ: Self = Self(0xA2);
    pub const JMP: Self = Self(0xA3);
    pub const ADD: Self = Self(0xA4);
    pub const SUB: Self = Self(0xA5);
    pub const LD: Self = Self(0xA6);
    pub const IN: Self = Self(0xA7);
    pub const OUT: Self = Self(0xA8);
    pub const AND: Self = Self(0xA9);

    pub const ASL: Self = Self(0xC0); // <<
    pub const ASR: Self = Self(0xC1); // >>

    pub fn is_instruction(self) -> bool {
        (Self::CALL.0..=Self::AND.0).contains(&self.0)
    }

    pub fn is_directive(self) -> bool {
        matches!(self, Self::PAD | Self::PUT)
    }

    pub fn name(self) -> &'static str {
        if let Some((name, _)) = MNEMONICS
            .iter()
            .chain(DIRECTIVES)
            .find(|(_, tok)| *tok == self)
        {
            return *name;
        }
        match self {
            Self::LPAREN => "(",
            Self::RPAREN => ")",
            Self::COMMA => ",",
            Self::PLUS => "+",
            Self::MINUS => "-",
            Self::STAR => "*",
            Self::SOLIDUS => "/",
            Self::MODULUS => "%",
            Self::AMP => "&",
            Self::PIPE => "|",
            Self::CARET => "^",
            Self::TILDE => "~",
            Self::ASL => "<<",
            Self::ASR => ">>",
            Self::EOF => "end of input",
            Self::NUM => "integer literal",
            Self::LABEL => "label declaration",
            Self::REF => "label reference",
            Self::R0 => "R0",
            Self::R1 => "R1",
            _ => "?",
        }
    }
}

impl Display for Tok {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const MNEMONICS: &[(&str, Tok)] = &[
    ("CALL", Tok::CALL),
    ("RET", Tok::RET),
    ("BZ", Tok::BZ),
    ("JMP", Tok::JMP),
    ("ADD", Tok::ADD),
    ("SUB", Tok::SUB),
    ("LD", Tok::LD),
    ("IN", Tok::IN),
    ("OUT", Tok::OUT),
    ("AND", Tok::AND),
];

pub const DIRECTIVES: &[(&str, Tok)] = &[("PAD", Tok::PAD), ("PUT", Tok::PUT)];

/// Identifier that evaluates to the address of the statement being assembled.
pub const THIS: &str = "THIS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos<'a> {
    pub file: &'a str,
    pub line: usize,
    pub column: usize,
}

impl<'a> Pos<'a> {
    pub fn err(&self, msg: &str) -> io::Error {
        io::Error::new(ErrorKind::InvalidData, format!("{self}: {msg}"))
    }
}

impl<'a> Display for Pos<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Num(u64),
    Str(String),
}

/// A lexed token. The payload always agrees with the kind: `NUM` carries a number,
/// `LABEL` and `REF` carry the identifier, everything else carries nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    tok: Tok,
    value: Value,
    pos: Pos<'a>,
    addr: Option<u32>,
}

impl<'a> Token<'a> {
    pub fn new(tok: Tok, pos: Pos<'a>) -> Self {
        debug_assert!(!matches!(tok, Tok::NUM | Tok::LABEL | Tok::REF));
        Self {
            tok,
            value: Value::None,
            pos,
            addr: None,
        }
    }

    pub fn num(value: u64, pos: Pos<'a>) -> Self {
        Self {
            tok: Tok::NUM,
            value: Value::Num(value),
            pos,
            addr: None,
        }
    }

    pub fn label(string: String, pos: Pos<'a>) -> Self {
        Self {
            tok: Tok::LABEL,
            value: Value::Str(string),
            pos,
            addr: None,
        }
    }

    pub fn label_ref(string: String, pos: Pos<'a>) -> Self {
        Self {
            tok: Tok::REF,
            value: Value::Str(string),
            pos,
            addr: None,
        }
    }

    pub fn tok(&self) -> Tok {
        self.tok
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn pos(&self) -> Pos<'a> {
        self.pos
    }

    pub fn addr(&self) -> Option<u32> {
        self.addr
    }

    pub fn stamp(&mut self, addr: u32) {
        self.addr = Some(addr);
    }

    pub fn num_value(&self) -> u64 {
        match self.value {
            Value::Num(value) => value,
            _ => unreachable!(),
        }
    }

    pub fn str(&self) -> &str {
        match &self.value {
            Value::Str(string) => string,
            _ => unreachable!(),
        }
    }

    pub fn into_string(self) -> String {
        match self.value {
            Value::Str(string) => string,
            _ => unreachable!(),
        }
    }
}

impl<'a> Display for Token<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Num(value) => write!(f, "{value}"),
            Value::Str(string) if self.tok == Tok::LABEL => write!(f, "{string}:"),
            Value::Str(string) => write!(f, "${string}"),
            Value::None => write!(f, "{}", self.tok),
        }
    }
}
