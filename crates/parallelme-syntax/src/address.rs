//! Token-range source locations.
//!
//! Every construct the compiler may edit or remove is located by a
//! `TokenAddress`: an inclusive `[start, stop]` pair of token-stream indices
//! plus the line/column of the first token for diagnostics. Byte offsets
//! never appear in the compiler core; all source editing is token based.

use serde::{Deserialize, Serialize};

/// Inclusive token range with the start token's line and column.
///
/// `start` and `stop` index into the owning file's token stream. A one-token
/// range has `start == stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAddress {
    /// Index of the first token of the range
    pub start: u32,
    /// Index of the last token of the range (inclusive)
    pub stop: u32,
    /// 1-based line of the start token
    pub line: u32,
    /// 1-based column of the start token
    pub column: u32,
}

impl TokenAddress {
    /// Create a new token address.
    ///
    /// # Panics
    /// Panics if `stop < start` (malformed range).
    pub fn new(start: u32, stop: u32, line: u32, column: u32) -> Self {
        assert!(
            stop >= start,
            "malformed token address: stop ({}) < start ({})",
            stop,
            start
        );
        Self {
            start,
            stop,
            line,
            column,
        }
    }

    /// Number of tokens covered by this range.
    pub fn len(&self) -> u32 {
        self.stop - self.start + 1
    }

    /// An inclusive range is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Range covering both `self` and `other`, keeping `self`'s position info
    /// when it starts first.
    pub fn cover(&self, other: &TokenAddress) -> TokenAddress {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        TokenAddress {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
            line,
            column,
        }
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &TokenAddress) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Whether the two ranges share at least one token.
    pub fn overlaps(&self, other: &TokenAddress) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }
}
