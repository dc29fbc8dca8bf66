// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Core of the ParallelME source-to-source compiler.
//!
//! Users annotate ordinary host-language classes with a small user library
//! of collections (`BitmapImage`, `HDRImage`, `Array`) and higher-order
//! operations (`foreach`, `map`, `reduce`, `filter`). This crate detects
//! those usages, lifts the user functions into standalone kernels for two
//! target runtimes (RenderScript and the ParallelME C++ runtime), and
//! rewrites the original source so the class delegates to a generated
//! wrapper that picks the best available target at load time.
//!
//! # Pipeline
//!
//! ```text
//! lex/parse (parallelme-syntax)
//!     → collect   first pass: scoped symbol table
//!     → extract   second pass: IR (binds, operations, method calls)
//!     → classify  parallel vs. sequential per operation
//!     → codegen   wrapper interface/classes + kernels per target
//!     → rewrite   token-level edits of the host source
//! ```
//!
//! The [`Compiler`] drives the whole pipeline; the individual passes are
//! public for tests and tooling.

pub mod catalog;
pub mod codegen;
pub mod collect;
pub mod compile;
pub mod ctrans;
pub mod error;
pub mod extract;
pub mod ir;
pub mod rewrite;
pub mod symbols;
pub mod template;

pub use catalog::UserLibraryCatalog;
pub use compile::{CompilationSummary, Compiler};
pub use ctrans::{CTranslator, DefaultCTranslator};
pub use error::{CompilationError, CompilationResult};
