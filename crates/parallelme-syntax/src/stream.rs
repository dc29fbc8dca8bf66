//! Token stream with byte-accurate source recovery.
//!
//! The stream owns the original source text and every lexed token's byte
//! range. Token indices are the coordinate system for [`TokenAddress`]
//! ranges; the byte ranges let a rewriter reproduce unedited regions
//! byte-identically, including the whitespace and comments logos skipped
//! (each token's *leading trivia*).

use crate::address::TokenAddress;
use crate::token::Token;
use logos::Logos;
use std::fmt;

/// A lexed token with its byte range and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexedToken {
    /// Token class
    pub token: Token,
    /// Byte offset of the first character
    pub start: u32,
    /// Byte offset one past the last character
    pub end: u32,
    /// 1-based line of the first character
    pub line: u32,
    /// 1-based column of the first character
    pub column: u32,
}

/// Lexing failure with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// 1-based line of the offending character
    pub line: u32,
    /// 1-based column of the offending character
    pub column: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token at {}:{}", self.line, self.column)
    }
}

impl std::error::Error for LexError {}

/// Full token stream over one source file.
#[derive(Debug, Clone)]
pub struct TokenStream {
    source: String,
    tokens: Vec<LexedToken>,
}

impl TokenStream {
    /// Lex a source string into a token stream.
    pub fn lex(source: &str) -> Result<TokenStream, LexError> {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(source);
        while let Some(result) = lexer.next() {
            let span = lexer.span();
            let (line, column) = position_of(source, span.start);
            match result {
                Ok(token) => tokens.push(LexedToken {
                    token,
                    start: span.start as u32,
                    end: span.end as u32,
                    line,
                    column,
                }),
                Err(()) => return Err(LexError { line, column }),
            }
        }
        Ok(TokenStream {
            source: source.to_string(),
            tokens,
        })
    }

    /// Original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the stream holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at `index`, if in bounds.
    pub fn get(&self, index: u32) -> Option<&LexedToken> {
        self.tokens.get(index as usize)
    }

    /// Spelling of the token at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn text(&self, index: u32) -> &str {
        let tok = &self.tokens[index as usize];
        &self.source[tok.start as usize..tok.end as usize]
    }

    /// Verbatim source covered by a token range, from the first token's first
    /// byte to the last token's last byte (inner trivia included).
    pub fn slice(&self, address: &TokenAddress) -> &str {
        let first = &self.tokens[address.start as usize];
        let last = &self.tokens[address.stop as usize];
        &self.source[first.start as usize..last.end as usize]
    }

    /// Trivia (whitespace/comments) between the previous token and the token
    /// at `index`. For the first token this is the file prefix.
    pub fn leading_trivia(&self, index: u32) -> &str {
        let start = if index == 0 {
            0
        } else {
            self.tokens[index as usize - 1].end as usize
        };
        let end = self.tokens[index as usize].start as usize;
        &self.source[start..end]
    }

    /// Trivia after the last token up to end of file.
    pub fn trailing_trivia(&self) -> &str {
        match self.tokens.last() {
            Some(tok) => &self.source[tok.end as usize..],
            None => &self.source,
        }
    }

    /// One-token address for the token at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn address_of(&self, index: u32) -> TokenAddress {
        let tok = &self.tokens[index as usize];
        TokenAddress::new(index, index, tok.line, tok.column)
    }

    /// Address spanning the tokens `start..=stop`.
    pub fn address(&self, start: u32, stop: u32) -> TokenAddress {
        let tok = &self.tokens[start as usize];
        TokenAddress::new(start, stop, tok.line, tok.column)
    }
}

/// 1-based (line, column) of a byte offset.
fn position_of(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut column = 1u32;
    for (idx, ch) in source.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}
