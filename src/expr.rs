//! Operand expressions, evaluated directly off the token cursor.
//!
//! Precedence, lowest first:
//! - `|`
//! - `^`
//! - `&`
//! - `<<`, `>>`
//! - `+`, `-`
//! - `*`, `/`, `%`
//! - unary `~`, `-`
//! - literals, `$label`, `$THIS` and `( ... )`

use std::io;

use crate::{Cursor, Labels, Tok, Token, THIS};

/// Evaluate one expression starting at the cursor. `this` is what `$THIS` resolves to.
///
/// The cursor is left on the first token that is not part of the expression.
pub fn eval(cursor: &mut Cursor<'_, '_>, labels: &Labels<'_>, this: u32) -> io::Result<u64> {
    Eval {
        labels,
        this,
        depth: 0,
    }
    .or(cursor)
}

/// Deepest nesting of parentheses and unary operators accepted in one expression.
pub const MAX_DEPTH: usize = 256;

struct Eval<'c, 'l> {
    labels: &'c Labels<'l>,
    this: u32,
    depth: usize,
}

/// Consume the next token if it is one of `ops`, otherwise put it back.
fn accept<'s, 'a>(cursor: &mut Cursor<'s, 'a>, ops: &[Tok]) -> Option<&'s Token<'a>> {
    let tok = cursor.advance();
    if ops.contains(&tok.tok()) {
        Some(tok)
    } else {
        cursor.putback();
        None
    }
}

impl<'c, 'l> Eval<'c, 'l> {
    fn nest(&mut self, tok: &Token<'_>) -> io::Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(tok.pos().err("expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.xor(cursor)?;
        while accept(cursor, &[Tok::PIPE]).is_some() {
            value |= self.xor(cursor)?;
        }
        Ok(value)
    }

    fn xor(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.and(cursor)?;
        while accept(cursor, &[Tok::CARET]).is_some() {
            value ^= self.and(cursor)?;
        }
        Ok(value)
    }

    fn and(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.shift(cursor)?;
        while accept(cursor, &[Tok::AMP]).is_some() {
            value &= self.shift(cursor)?;
        }
        Ok(value)
    }

    fn shift(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.add(cursor)?;
        while let Some(op) = accept(cursor, &[Tok::ASL, Tok::ASR]) {
            let rhs = self.add(cursor)?;
            // shifting every bit out leaves zero
            let amount = u32::try_from(rhs).ok();
            value = match op.tok() {
                Tok::ASL => amount.and_then(|n| value.checked_shl(n)).unwrap_or(0),
                _ => amount.and_then(|n| value.checked_shr(n)).unwrap_or(0),
            };
        }
        Ok(value)
    }

    fn add(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.mul(cursor)?;
        while let Some(op) = accept(cursor, &[Tok::PLUS, Tok::MINUS]) {
            let rhs = self.mul(cursor)?;
            value = match op.tok() {
                Tok::PLUS => value.wrapping_add(rhs),
                _ => value.wrapping_sub(rhs),
            };
        }
        Ok(value)
    }

    fn mul(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let mut value = self.unary(cursor)?;
        while let Some(op) = accept(cursor, &[Tok::STAR, Tok::SOLIDUS, Tok::MODULUS]) {
            let rhs = self.unary(cursor)?;
            value = match op.tok() {
                Tok::STAR => value.wrapping_mul(rhs),
                Tok::SOLIDUS => value
                    .checked_div(rhs)
                    .ok_or_else(|| op.pos().err("division by zero"))?,
                _ => value
                    .checked_rem(rhs)
                    .ok_or_else(|| op.pos().err("division by zero"))?,
            };
        }
        Ok(value)
    }

    fn unary(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        if let Some(op) = accept(cursor, &[Tok::TILDE, Tok::MINUS]) {
            self.nest(op)?;
            let value = self.unary(cursor)?;
            self.depth -= 1;
            return Ok(match op.tok() {
                Tok::TILDE => !value,
                _ => value.wrapping_neg(),
            });
        }
        self.primary(cursor)
    }

    fn primary(&mut self, cursor: &mut Cursor<'_, '_>) -> io::Result<u64> {
        let tok = cursor.advance();
        match tok.tok() {
            Tok::NUM => Ok(tok.num_value()),
            Tok::REF => self.resolve(tok),
            Tok::LPAREN => {
                self.nest(tok)?;
                let value = self.or(cursor)?;
                self.depth -= 1;
                let close = cursor.advance();
                if close.tok() != Tok::RPAREN {
                    return Err(tok
                        .pos()
                        .err(&format!("unmatched parenthesis, found `{close}` at {}", close.pos())));
                }
                Ok(value)
            }
            _ => Err(tok
                .pos()
                .err(&format!("expected expression, found `{tok}`"))),
        }
    }

    fn resolve(&self, tok: &Token<'_>) -> io::Result<u64> {
        let name = tok.str();
        if name == THIS {
            return Ok(self.this as u64);
        }
        self.labels
            .get(name)
            .map(|label| label.value)
            .ok_or_else(|| tok.pos().err(&format!("use of undeclared label `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lexer, Pos, TokenStore};

    fn labels() -> Labels<'static> {
        let pos = Pos {
            file: "labels.s",
            line: 1,
            column: 1,
        };
        let mut labels = Labels::new();
        labels.declare("start".into(), 0, pos).unwrap();
        labels.declare("loop".into(), 2, pos).unwrap();
        labels.declare("end".into(), 9, pos).unwrap();
        labels
    }

    fn store(src: &str) -> TokenStore<'static> {
        let mut lexer = Lexer::new(src.as_bytes(), "test.s");
        let mut store = TokenStore::new();
        loop {
            lexer.skip().unwrap();
            let tok = lexer.next().unwrap();
            let eof = tok.tok() == Tok::EOF;
            store.push(tok);
            if eof {
                return store;
            }
        }
    }

    fn eval_at(src: &str, this: u32) -> io::Result<u64> {
        let store = store(src);
        let mut cursor = store.cursor();
        let value = eval(&mut cursor, &labels(), this)?;
        assert_eq!(cursor.peek().tok(), Tok::EOF, "trailing tokens in `{src}`");
        Ok(value)
    }

    fn eval_str(src: &str) -> u64 {
        eval_at(src, 0).unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(eval_str("1|2&3"), 3);
        assert_eq!(eval_str("(1|2)&3"), 3);
        assert_eq!(eval_str("(1|2)&1"), 1);
        assert_eq!(eval_str("1 + 2 * 3"), 7);
        assert_eq!(eval_str("(1 + 2) * 3"), 9);
        assert_eq!(eval_str("1 << 2 + 1"), 8);
        assert_eq!(eval_str("6 ^ 3 & 1"), 7);
        assert_eq!(eval_str("0xF0 | 0x0F ^ 0xFF"), 0xF0);
    }

    #[test]
    fn left_associative() {
        assert_eq!(eval_str("10 - 3 - 2"), 5);
        assert_eq!(eval_str("64 / 4 / 2"), 8);
        assert_eq!(eval_str("17 % 5 % 3"), 2);
        assert_eq!(eval_str("256 >> 2 >> 1"), 32);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval_str("-1"), u64::MAX);
        assert_eq!(eval_str("~0 & 0xFF"), 0xFF);
        assert_eq!(eval_str("--5"), 5);
        assert_eq!(eval_str("-2 * 3") as u8, 0xFA);
        assert_eq!(eval_str("~(1 << 3) & 0xF"), 7);
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(eval_str("0 - 1"), u64::MAX);
        assert_eq!(eval_str("0xFFFFFFFFFFFFFFFF + 2"), 1);
        assert_eq!(eval_str("1 << 64"), 0);
        assert_eq!(eval_str("1 << 63"), 1 << 63);
        assert_eq!(eval_str("0x8000 >> 100"), 0);
    }

    #[test]
    fn label_references() {
        assert_eq!(eval_str("$loop"), 2);
        assert_eq!(eval_str("$end - $loop"), 7);
        assert_eq!(eval_str("($start + 1) * $end"), 9);
    }

    #[test]
    fn this_is_the_current_address() {
        assert_eq!(eval_at("$THIS", 5).unwrap(), 5);
        assert_eq!(eval_at("$THIS + 2", 40).unwrap(), 42);
    }

    #[test]
    fn undeclared_label() {
        let err = eval_at("1 + $nowhere", 0).unwrap_err();
        assert_eq!(err.to_string(), "test.s:1:5: use of undeclared label `nowhere`");
    }

    #[test]
    fn division_by_zero() {
        let err = eval_at("4 / (2 - 2)", 0).unwrap_err();
        assert_eq!(err.to_string(), "test.s:1:3: division by zero");
        assert!(eval_at("4 % 0", 0).is_err());
    }

    #[test]
    fn unmatched_parenthesis() {
        let err = eval_at("(1 + 2", 0).unwrap_err();
        assert!(err.to_string().starts_with("test.s:1:1: unmatched parenthesis"));
    }

    #[test]
    fn missing_operand() {
        let err = eval_at("1 +", 0).unwrap_err();
        assert!(err.to_string().contains("expected expression, found `end of input`"));
        assert!(eval_at(")", 0).is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let depth = MAX_DEPTH;
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(eval_str(&src), 1);
        assert_eq!(eval_str(&format!("{}5", "-".repeat(depth))), 5);

        let src = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = eval_at(&src, 0).unwrap_err();
        assert_eq!(err.to_string(), format!("test.s:1:{}: expression nested too deeply", depth + 1));
        let err = eval_at(&"~".repeat(10_000), 0).unwrap_err();
        assert!(err.to_string().ends_with("expression nested too deeply"));
    }

    #[test]
    fn stops_at_first_foreign_token() {
        let store = store("3 + 4, 9");
        let mut cursor = store.cursor();
        assert_eq!(eval(&mut cursor, &labels(), 0).unwrap(), 7);
        assert_eq!(cursor.peek().tok(), Tok::COMMA);
        cursor.advance();
        assert_eq!(eval(&mut cursor, &labels(), 0).unwrap(), 9);
    }
}
