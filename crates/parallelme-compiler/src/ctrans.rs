//! The host-to-C expression translator boundary.
//!
//! Lowering the statements inside a user function to the kernel C dialect is
//! the job of an external collaborator, modeled as a pure function behind
//! the [`CTranslator`] trait. The compiler core never inspects the result;
//! it only applies its own variable and accessor substitutions afterwards.

use crate::template::replace_identifier;

/// Pure host-fragment to C-fragment translator.
pub trait CTranslator {
    /// Translate a host-language code fragment to the kernel C dialect.
    fn translate(&self, code: &str) -> String;
}

/// Default translator covering the deltas between the accepted host subset
/// and kernel C: modifier removal and primitive spelling.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCTranslator;

impl CTranslator for DefaultCTranslator {
    fn translate(&self, code: &str) -> String {
        let code = replace_identifier(code, "final", "");
        let code = replace_identifier(&code, "boolean", "bool");
        replace_identifier(&code, "String", "const char *")
    }
}
