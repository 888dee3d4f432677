use std::io::{self, Read};

use crate::{Pos, Tok, Token, DIRECTIVES, MNEMONICS};

const DIGRAPHS: &[(&[u8; 2], Tok)] = &[(b"<<", Tok::ASL), (b">>", Tok::ASR)];

const PUNCTUATION: &[u8] = b"(),+-*/%&|^~";

/// Turns a byte stream into tokens, one per call to [`Lexer::next`].
///
/// Insignificant input (whitespace, newlines and `;` comments) is only consumed by
/// [`Lexer::skip`], so the caller decides where it may appear.
pub struct Lexer<'a, R> {
    reader: PeekReader<R>,
    string: String,
    file: &'a str,
}

impl<'a, R: Read> Lexer<'a, R> {
    pub fn new(reader: R, file: &'a str) -> Self {
        Self {
            reader: PeekReader::new(reader),
            string: String::new(),
            file,
        }
    }

    pub fn pos(&self) -> Pos<'a> {
        Pos {
            file: self.file,
            line: self.reader.line,
            column: self.reader.column,
        }
    }

    pub fn skip(&mut self) -> io::Result<()> {
        loop {
            match self.reader.peek()? {
                Some(b' ' | b'\t' | b'\r' | b'\x0C' | b'\n') => self.reader.eat(),
                Some(b';') => {
                    while !matches!(self.reader.peek()?, Some(b'\n') | None) {
                        self.reader.eat();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next(&mut self) -> io::Result<Token<'a>> {
        let pos = self.pos();
        self.string.clear();
        match self.reader.peek()? {
            None => Ok(Token::new(Tok::EOF, pos)),
            Some(b'$') => {
                self.reader.eat();
                self.word()?;
                if self.string.is_empty() {
                    return Err(pos.err("invalid label reference: expected identifier after `$`"));
                }
                Ok(Token::label_ref(self.string.clone(), pos))
            }
            Some(c) if c.is_ascii_digit() => Ok(Token::num(self.number()?, pos)),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                self.word()?;
                if let Some(tok) = MNEMONICS
                    .iter()
                    .chain(DIRECTIVES)
                    .find_map(|(s, tok)| (*s == self.string).then_some(*tok))
                {
                    return Ok(Token::new(tok, pos));
                }
                match self.string.as_str() {
                    "R0" => return Ok(Token::new(Tok::R0, pos)),
                    "R1" => return Ok(Token::new(Tok::R1, pos)),
                    _ => {}
                }
                // label declarations need the colon right after the name
                if self.reader.peek()? != Some(b':') {
                    return Err(pos.err(&format!(
                        "unexpected token `{}`: expected `:` after a label or `$` before a label reference",
                        self.string
                    )));
                }
                self.reader.eat();
                Ok(Token::label(self.string.clone(), pos))
            }
            Some(c) => {
                self.reader.eat();
                if let Some(nc) = self.reader.peek()? {
                    if let Some(tok) = DIGRAPHS
                        .iter()
                        .find_map(|(bs, tok)| (**bs == [c, nc]).then_some(*tok))
                    {
                        self.reader.eat();
                        return Ok(Token::new(tok, pos));
                    }
                }
                if PUNCTUATION.contains(&c) {
                    return Ok(Token::new(Tok(c), pos));
                }
                Err(pos.err(&format!(
                    "unsupported character sequence `{}`",
                    c.escape_ascii()
                )))
            }
        }
    }

    fn word(&mut self) -> io::Result<()> {
        while let Some(c) = self.reader.peek()? {
            if !c.is_ascii_alphanumeric() && c != b'_' {
                break;
            }
            self.string.push(c as char);
            self.reader.eat();
        }
        Ok(())
    }

    fn number(&mut self) -> io::Result<u64> {
        let first = match self.reader.peek()? {
            Some(c) => c,
            None => return Ok(0),
        };
        self.reader.eat();
        if first == b'0' {
            match self.reader.peek()? {
                Some(b'x' | b'X') => {
                    self.reader.eat();
                    return self.digits(0, 16);
                }
                Some(b'b' | b'B') => {
                    self.reader.eat();
                    return self.digits(0, 2);
                }
                _ => {}
            }
        }
        // anything else continues as decimal from the digit already read
        self.digits((first - b'0') as u64, 10)
    }

    fn digits(&mut self, mut value: u64, radix: u32) -> io::Result<u64> {
        while let Some(c) = self.reader.peek()? {
            let Some(digit) = (c as char).to_digit(radix) else {
                break;
            };
            value = value.wrapping_mul(radix as u64).wrapping_add(digit as u64);
            self.reader.eat();
        }
        Ok(value)
    }
}

struct PeekReader<R> {
    inner: R,
    line: usize,
    column: usize,
    stash: Option<u8>,
}

impl<R: Read> PeekReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: reader,
            line: 1,
            column: 1,
            stash: None,
        }
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.stash.is_none() {
            let mut buf = [0];
            self.stash = self
                .inner
                .read(&mut buf)
                .map(|n| if n == 0 { None } else { Some(buf[0]) })?;
        }
        Ok(self.stash)
    }

    fn eat(&mut self) {
        self.column += 1;
        if let Some(b'\n') = self.stash.take() {
            self.line += 1;
            self.column = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> io::Result<Vec<Token<'static>>> {
        let mut lexer = Lexer::new(src.as_bytes(), "test.s");
        let mut toks = Vec::new();
        loop {
            lexer.skip()?;
            let tok = lexer.next()?;
            let eof = tok.tok() == Tok::EOF;
            toks.push(tok);
            if eof {
                return Ok(toks);
            }
        }
    }

    fn kinds(src: &str) -> Vec<Tok> {
        lex(src).unwrap().iter().map(Token::tok).collect()
    }

    #[test]
    fn lexes_instruction_line() {
        assert_eq!(
            kinds("ADD R1, $loop ; trailing comment\n"),
            vec![Tok::ADD, Tok::R1, Tok::COMMA, Tok::REF, Tok::EOF]
        );
    }

    #[test]
    fn keywords_need_the_whole_word() {
        // shares a prefix with ADD/AND but is neither
        let toks = lex("ANDY: ADDR: AND ADD").unwrap();
        assert_eq!(toks[0].tok(), Tok::LABEL);
        assert_eq!(toks[0].str(), "ANDY");
        assert_eq!(toks[1].tok(), Tok::LABEL);
        assert_eq!(toks[1].str(), "ADDR");
        assert_eq!(toks[2].tok(), Tok::AND);
        assert_eq!(toks[3].tok(), Tok::ADD);
    }

    #[test]
    fn lexes_literals() {
        let toks = lex("10 0x1F 0XfF 0b101 0B11 0 07 0x").unwrap();
        let values: Vec<u64> = toks[..8].iter().map(Token::num_value).collect();
        assert_eq!(values, vec![10, 31, 255, 5, 3, 0, 7, 0]);
    }

    #[test]
    fn binary_literal_stops_at_non_binary_digit() {
        let toks = lex("0b1012").unwrap();
        assert_eq!(toks[0].num_value(), 5);
        assert_eq!(toks[1].num_value(), 2);
    }

    #[test]
    fn literals_wrap_instead_of_failing() {
        let toks = lex("18446744073709551616").unwrap();
        assert_eq!(toks[0].num_value(), 0);
    }

    #[test]
    fn lexes_operators() {
        assert_eq!(
            kinds("(1 << 2) >> 3 + - * / % & | ^ ~"),
            vec![
                Tok::LPAREN,
                Tok::NUM,
                Tok::ASL,
                Tok::NUM,
                Tok::RPAREN,
                Tok::ASR,
                Tok::NUM,
                Tok::PLUS,
                Tok::MINUS,
                Tok::STAR,
                Tok::SOLIDUS,
                Tok::MODULUS,
                Tok::AMP,
                Tok::PIPE,
                Tok::CARET,
                Tok::TILDE,
                Tok::EOF
            ]
        );
    }

    #[test]
    fn lexes_directives_and_registers() {
        assert_eq!(
            kinds("PAD 16, 0\nPUT 0xFFFF\nIN R0\nOUT R1"),
            vec![
                Tok::PAD,
                Tok::NUM,
                Tok::COMMA,
                Tok::NUM,
                Tok::PUT,
                Tok::NUM,
                Tok::IN,
                Tok::R0,
                Tok::OUT,
                Tok::R1,
                Tok::EOF
            ]
        );
    }

    #[test]
    fn tracks_positions() {
        let toks = lex("RET\n  ; comment\n\tCALL $main").unwrap();
        assert_eq!((toks[0].pos().line, toks[0].pos().column), (1, 1));
        assert_eq!((toks[1].pos().line, toks[1].pos().column), (3, 2));
        assert_eq!((toks[2].pos().line, toks[2].pos().column), (3, 7));
    }

    #[test]
    fn comment_at_end_of_input() {
        assert_eq!(kinds("RET ; no newline"), vec![Tok::RET, Tok::EOF]);
    }

    #[test]
    fn label_requires_colon() {
        let err = lex("LD R0, 1\nFOO\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("test.s:2:1: unexpected token `FOO`"), "{msg}");
    }

    #[test]
    fn colon_must_follow_immediately() {
        assert!(lex("main :").is_err());
    }

    #[test]
    fn empty_label_reference() {
        let err = lex("JMP $ 5").unwrap_err();
        assert!(err.to_string().starts_with("test.s:1:5: invalid label reference"));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = lex("LD R0, 1 < 2").unwrap_err();
        assert!(err.to_string().contains("unsupported character sequence `<`"));
        assert!(lex("LD R0, #1").is_err());
    }
}
