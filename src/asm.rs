use std::io::{self, Read};

use crate::{
    encode::{Emitter, Format, Ins, Word},
    expr, Cursor, Labels, Lexer, Opcodes, Pos, Tok, Token, TokenStore,
};

/// Largest `PUT` count or `PAD` length: every word a 16-bit address can reach.
const WORD_SPACE: u64 = 1 << 16;

/// Counts real instructions. Starts before the first one, so the first gets address 0.
#[derive(Debug, Default)]
struct AddrCounter {
    next: u32,
}

impl AddrCounter {
    fn tick(&mut self) -> u32 {
        let addr = self.next;
        self.next = self.next.wrapping_add(1);
        addr
    }

    /// The address the next instruction will receive.
    fn peek(&self) -> u32 {
        self.next
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// Output of a successful run.
#[derive(Debug)]
pub struct Assembly<'a> {
    pub data: Vec<u8>,
    pub words: usize,
    pub listing: Vec<Ins<'a>>,
    pub labels: Labels<'a>,
}

/// Two-pass assembler state.
///
/// [`Asm::collect`] lexes the whole source once, stamping instruction addresses and
/// filling the label table. [`Asm::rewind`] then resets the read position and address
/// counter, and [`Asm::emit`] walks the stored tokens again to encode them.
pub struct Asm<'a> {
    file: &'a str,
    opcodes: Opcodes,
    verbosity: u8,
    store: TokenStore<'a>,
    labels: Labels<'a>,
    addr: AddrCounter,
    emitter: Emitter,
    listing: Vec<Ins<'a>>,
}

impl<'a> Asm<'a> {
    pub fn new(file: &'a str, opcodes: Opcodes, format: Format) -> Self {
        Self {
            file,
            opcodes,
            verbosity: 0,
            store: TokenStore::new(),
            labels: Labels::new(),
            addr: AddrCounter::default(),
            emitter: Emitter::new(format),
            listing: Vec::new(),
        }
    }

    /// 2 logs each declared label, 3 also logs every raw token.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Pre-seed the label table, as if `name` had been declared with `value`.
    pub fn define(&mut self, name: &str, value: u64) -> io::Result<()> {
        let pos = Pos {
            file: "__DEFINES__",
            line: 1,
            column: 1,
        };
        if self.verbosity > 1 {
            tracing::info!("define {name}: {value:#06X}");
        }
        self.labels.declare(name.to_string(), value, pos)
    }

    pub fn labels(&self) -> &Labels<'a> {
        &self.labels
    }

    pub fn store(&self) -> &TokenStore<'a> {
        &self.store
    }

    /// Pass 1: lex everything, assign instruction addresses and collect labels.
    pub fn collect<R: Read>(&mut self, reader: R) -> io::Result<()> {
        tracing::trace!("starting pass 1");
        let mut lexer = Lexer::new(reader, self.file);
        loop {
            lexer.skip()?;
            let mut tok = lexer.next()?;
            if tok.tok().is_instruction() {
                tok.stamp(self.addr.tick());
            }
            if tok.tok() == Tok::LABEL {
                let addr = self.addr.peek();
                if self.verbosity > 1 {
                    tracing::info!("label {}: {addr:#04X}", tok.str());
                }
                let pos = tok.pos();
                self.labels.declare(tok.into_string(), addr as u64, pos)?;
                continue;
            }
            if self.verbosity > 2 {
                tracing::info!("token {tok} at {}", tok.pos());
            }
            let eof = tok.tok() == Tok::EOF;
            self.store.push(tok);
            if eof {
                break;
            }
        }
        tracing::debug!(
            "collected {} tokens, {} labels, {} instructions",
            self.store.len(),
            self.labels.len(),
            self.addr.peek()
        );
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.addr.reset();
        self.emitter = Emitter::new(self.emitter.format());
        self.listing.clear();
    }

    /// Pass 2: read statements back from the token store and encode them.
    pub fn emit(&mut self) -> io::Result<()> {
        tracing::trace!("starting pass 2");
        let Self {
            file,
            opcodes,
            store,
            labels,
            addr,
            emitter,
            listing,
            ..
        } = self;
        if !store.is_terminated() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{file}: nothing collected, run pass 1 first"),
            ));
        }
        let mut cursor = store.cursor();
        loop {
            let tok = cursor.advance();
            match tok.tok() {
                Tok::EOF => break,
                mne if mne.is_instruction() => {
                    let this = addr.tick();
                    debug_assert_eq!(tok.addr(), Some(this));
                    let ins = instruction(&mut cursor, labels, opcodes, tok, this)?;
                    emitter.word(ins.word.pack());
                    listing.push(ins);
                }
                Tok::PUT => {
                    let this = addr.peek();
                    let value = expr::eval(&mut cursor, labels, this)?;
                    let count = if optional_comma(&mut cursor) {
                        expr::eval(&mut cursor, labels, this)?
                    } else {
                        // no count: a single copy of the value
                        1
                    };
                    if count > WORD_SPACE {
                        return Err(tok
                            .pos()
                            .err(&format!("PUT count out of range: {count:#X}")));
                    }
                    emitter.put(value as u16, count);
                }
                Tok::PAD => {
                    let this = addr.peek();
                    let len = expr::eval(&mut cursor, labels, this)?;
                    let fill = if optional_comma(&mut cursor) {
                        expr::eval(&mut cursor, labels, this)?
                    } else {
                        // no fill: pad with zero words
                        0
                    };
                    if len > WORD_SPACE {
                        return Err(tok
                            .pos()
                            .err(&format!("PAD length out of range: {len:#X}")));
                    }
                    if !emitter.set_pad(len, fill as u16) {
                        return Err(tok.pos().err("only one PAD directive is allowed"));
                    }
                }
                _ => {
                    return Err(tok
                        .pos()
                        .err(&format!("expected instruction keyword, found `{tok}`")))
                }
            }
        }
        Ok(())
    }

    /// Apply padding and hand back the encoded output.
    pub fn finish(self) -> Assembly<'a> {
        let (data, words) = self.emitter.finish();
        tracing::debug!(
            "emitted {words} words ({} instructions), {} bytes",
            self.listing.len(),
            data.len()
        );
        Assembly {
            data,
            words,
            listing: self.listing,
            labels: self.labels,
        }
    }
}

fn instruction<'a>(
    cursor: &mut Cursor<'_, 'a>,
    labels: &Labels<'_>,
    opcodes: &Opcodes,
    tok: &Token<'a>,
    this: u32,
) -> io::Result<Ins<'a>> {
    let mne = tok.tok();
    let (dst, data) = match mne {
        Tok::CALL | Tok::BZ | Tok::JMP => (0, expr::eval(cursor, labels, this)?),
        Tok::RET => (0, 0),
        Tok::ADD | Tok::SUB | Tok::AND | Tok::LD => {
            let dst = register(cursor)?;
            expect(cursor, Tok::COMMA)?;
            (dst, expr::eval(cursor, labels, this)?)
        }
        Tok::IN | Tok::OUT => (register(cursor)?, 0),
        _ => unreachable!(),
    };
    Ok(Ins {
        mne,
        word: Word {
            opcode: opcodes.get(mne),
            dst,
            data: data as u8,
        },
        addr: this,
        pos: tok.pos(),
    })
}

fn register(cursor: &mut Cursor<'_, '_>) -> io::Result<u8> {
    let tok = cursor.advance();
    match tok.tok() {
        Tok::R0 => Ok(0),
        Tok::R1 => Ok(1),
        _ => Err(tok
            .pos()
            .err(&format!("expected register R0 or R1, found `{tok}`"))),
    }
}

fn expect(cursor: &mut Cursor<'_, '_>, expected: Tok) -> io::Result<()> {
    let tok = cursor.advance();
    if tok.tok() != expected {
        return Err(tok
            .pos()
            .err(&format!("expected `{expected}`, found `{tok}`")));
    }
    Ok(())
}

fn optional_comma(cursor: &mut Cursor<'_, '_>) -> bool {
    if cursor.peek().tok() == Tok::COMMA {
        cursor.advance();
        return true;
    }
    false
}

/// Run both passes over `reader` and return the encoded program.
pub fn assemble<'a, R: Read>(
    reader: R,
    file: &'a str,
    opcodes: Opcodes,
    format: Format,
) -> io::Result<Assembly<'a>> {
    let mut asm = Asm::new(file, opcodes, format);
    asm.collect(reader)?;
    asm.rewind();
    asm.emit()?;
    Ok(asm.finish())
}
