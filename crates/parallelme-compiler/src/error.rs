//! Compilation errors.
//!
//! Every fatal condition the compiler core can surface is a variant of
//! [`CompilationError`]. The orchestrator records the failing file and moves
//! on to the next one; nothing in the core swallows a fatal error.
//!
//! The one non-fatal diagnostic — an operation demoted to sequential because
//! it captures a non-final variable — is a `tracing` warning emitted by the
//! classifier, not an error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for compilation operations.
pub type CompilationResult<T> = std::result::Result<T, CompilationError>;

/// Fatal compilation failure.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// The source file failed to lex or parse.
    ///
    /// The host-language front end is strict about the subset it accepts;
    /// anything outside it surfaces here with the offending position.
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        /// 1-based line
        line: u32,
        /// 1-based column
        column: u32,
        /// Front-end message
        message: String,
    },

    /// A user-library method is recognized by the catalog but has no
    /// translator for the selected target runtime.
    #[error("method '{method}' is not supported by the {target} runtime")]
    UnsupportedMethod {
        /// User-library method name
        method: String,
        /// Target runtime name
        target: String,
    },

    /// A bind argument is neither a literal, a variable nor an opaque
    /// expression (e.g. a nested creator or a lambda).
    #[error("unsupported argument in user-library bind at line {line}")]
    UnsupportedArgumentShape {
        /// 1-based line of the bind statement
        line: u32,
    },

    /// An operation reached the translation phase in a shape the translators
    /// cannot accept. Indicates an internal invariant break.
    #[error("invalid operation: {detail}")]
    InvalidOperation {
        /// What went wrong
        detail: String,
    },

    /// Two symbols of the same kind and identifier were declared in one
    /// scope during the first pass.
    #[error("duplicate symbol '{name}' in scope at line {line}")]
    DuplicateInScope {
        /// Symbol name
        name: String,
        /// 1-based line of the second declaration
        line: u32,
    },

    /// A file-system error while reading an input or emitting generated
    /// artifacts. Other files may have been partially written; the core does
    /// not roll back.
    #[error("i/o failure at {path}: {source}")]
    GenerationIo {
        /// Path the compiler was writing
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl From<parallelme_syntax::LexError> for CompilationError {
    fn from(err: parallelme_syntax::LexError) -> Self {
        CompilationError::Syntax {
            line: err.line,
            column: err.column,
            message: err.to_string(),
        }
    }
}

impl From<parallelme_syntax::ParseError> for CompilationError {
    fn from(err: parallelme_syntax::ParseError) -> Self {
        CompilationError::Syntax {
            line: err.line,
            column: err.column,
            message: err.message,
        }
    }
}
