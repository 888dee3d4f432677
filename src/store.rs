use std::io;

use indexmap::IndexMap;

use crate::{Pos, Tok, Token, THIS};

/// All tokens of one source, in order, minus label declarations.
#[derive(Debug, Default)]
pub struct TokenStore<'a> {
    toks: Vec<Token<'a>>,
}

impl<'a> TokenStore<'a> {
    pub fn new() -> Self {
        Self { toks: Vec::new() }
    }

    pub fn push(&mut self, tok: Token<'a>) {
        self.toks.push(tok);
    }

    pub fn len(&self) -> usize {
        self.toks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toks.is_empty()
    }

    /// True once the end-of-input token has been stored.
    pub fn is_terminated(&self) -> bool {
        self.toks.last().is_some_and(|tok| tok.tok() == Tok::EOF)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token<'a>> {
        self.toks.iter()
    }

    /// A read cursor at the first token. The store must be terminated.
    pub fn cursor(&self) -> Cursor<'_, 'a> {
        debug_assert!(self.is_terminated());
        Cursor {
            toks: &self.toks,
            index: 0,
        }
    }
}

/// Reads a terminated [`TokenStore`] front to back with one token of pushback.
///
/// Reading past the end keeps returning the final `EOF` token.
#[derive(Debug, Clone)]
pub struct Cursor<'s, 'a> {
    toks: &'s [Token<'a>],
    index: usize,
}

impl<'s, 'a> Cursor<'s, 'a> {
    pub fn peek(&self) -> &'s Token<'a> {
        &self.toks[self.index.min(self.toks.len() - 1)]
    }

    pub fn advance(&mut self) -> &'s Token<'a> {
        let tok = self.peek();
        if self.index < self.toks.len() {
            self.index += 1;
        }
        tok
    }

    /// Undo the last [`Cursor::advance`].
    pub fn putback(&mut self) {
        debug_assert!(self.index > 0);
        self.index = self.index.saturating_sub(1);
    }

    pub fn rewind(&mut self) {
        self.index = 0;
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label<'a> {
    pub value: u64,
    pub pos: Pos<'a>,
}

/// Label table, in declaration order. Names are unique.
#[derive(Debug, Default)]
pub struct Labels<'a> {
    map: IndexMap<String, Label<'a>>,
}

impl<'a> Labels<'a> {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    pub fn declare(&mut self, name: String, value: u64, pos: Pos<'a>) -> io::Result<()> {
        if name == THIS {
            return Err(pos.err(&format!("`{THIS}` is reserved and cannot be declared")));
        }
        if let Some(prev) = self.map.get(&name) {
            return Err(pos.err(&format!(
                "label `{name}` already declared at {}",
                prev.pos
            )));
        }
        self.map.insert(name, Label { value, pos });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Label<'a>> {
        self.map.get(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Label<'a>)> {
        self.map.iter().map(|(name, label)| (name.as_str(), label))
    }
}
