// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Host-language front end for the ParallelME compiler.
//!
//! This crate supplies the compiler core with everything it needs from the
//! analyzed language: a logos lexer over the Java subset the user library
//! lives in, a [`TokenStream`] that keeps byte-accurate trivia so the token
//! rewriter can reproduce unedited source verbatim, [`TokenAddress`] ranges
//! as the universal source coordinate, and a hand-written recursive descent
//! parser producing shallow parse trees.
//!
//! # Design
//!
//! - `token` — logos token definitions
//! - `address` — inclusive token ranges with diagnostics positions
//! - `stream` — lexing plus trivia-preserving source recovery
//! - `ast` — parse trees, every node addressed
//! - `parser` — recursive descent over the stream

pub mod address;
pub mod ast;
pub mod parser;
pub mod stream;
pub mod token;

pub use address::TokenAddress;
pub use parser::{parse, ParseError, ParseErrorKind};
pub use stream::{LexError, LexedToken, TokenStream};
pub use token::Token;
