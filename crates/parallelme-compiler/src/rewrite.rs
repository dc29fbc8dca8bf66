//! Token-stream rewriter.
//!
//! Source edits are expressed as an append-only list of
//! `(range, action, text)` records against the original token stream and
//! resolved in a single pass at render time. Non-edited tokens are emitted
//! verbatim together with their leading trivia, so everything outside the
//! edited ranges survives byte-identically.
//!
//! Overlap discipline: replace/delete ranges may overlap only by strict
//! containment, in which case the outer edit wins and the inner ones
//! (including inserts strictly inside the range) are discarded. Partial
//! overlap is a caller bug and panics.

use parallelme_syntax::{TokenAddress, TokenStream};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditAction {
    Replace,
    Delete,
}

#[derive(Debug, Clone)]
struct SpanEdit {
    range: TokenAddress,
    action: EditAction,
    text: String,
}

/// Append-only rewriter over one file's token stream.
#[derive(Debug)]
pub struct TokenRewriter<'a> {
    stream: &'a TokenStream,
    spans: Vec<SpanEdit>,
    inserts_before: Vec<(u32, String)>,
    inserts_after: Vec<(u32, String)>,
}

impl<'a> TokenRewriter<'a> {
    /// Create a rewriter with no edits.
    pub fn new(stream: &'a TokenStream) -> Self {
        Self {
            stream,
            spans: Vec::new(),
            inserts_before: Vec::new(),
            inserts_after: Vec::new(),
        }
    }

    /// Insert `text` immediately before the token at `index` (after its
    /// leading trivia).
    pub fn insert_before(&mut self, index: u32, text: impl Into<String>) {
        self.inserts_before.push((index, text.into()));
    }

    /// Insert `text` immediately after the token at `index`.
    pub fn insert_after(&mut self, index: u32, text: impl Into<String>) {
        self.inserts_after.push((index, text.into()));
    }

    /// Replace the tokens of `range` with `text`.
    pub fn replace(&mut self, range: TokenAddress, text: impl Into<String>) {
        self.spans.push(SpanEdit {
            range,
            action: EditAction::Replace,
            text: text.into(),
        });
    }

    /// Delete the tokens of `range`.
    pub fn delete(&mut self, range: TokenAddress) {
        self.spans.push(SpanEdit {
            range,
            action: EditAction::Delete,
            text: String::new(),
        });
    }

    /// Resolve all edits into the rewritten source.
    ///
    /// # Panics
    /// Panics if two replace/delete ranges overlap without one strictly
    /// containing the other.
    pub fn render(&self) -> String {
        let outer = self.effective_spans();
        let by_start: HashMap<u32, &SpanEdit> =
            outer.iter().map(|edit| (edit.range.start, *edit)).collect();

        let mut before: HashMap<u32, Vec<&str>> = HashMap::new();
        for (index, text) in &self.inserts_before {
            before.entry(*index).or_default().push(text);
        }
        let mut after: HashMap<u32, Vec<&str>> = HashMap::new();
        for (index, text) in &self.inserts_after {
            after.entry(*index).or_default().push(text);
        }

        let mut output = String::with_capacity(self.stream.source().len());
        let mut i: u32 = 0;
        let len = self.stream.len() as u32;
        while i < len {
            output.push_str(self.stream.leading_trivia(i));
            if let Some(texts) = before.get(&i) {
                for text in texts {
                    output.push_str(text);
                }
            }
            if let Some(edit) = by_start.get(&i) {
                if edit.action == EditAction::Replace {
                    output.push_str(&edit.text);
                }
                let stop = edit.range.stop;
                if let Some(texts) = after.get(&stop) {
                    for text in texts {
                        output.push_str(text);
                    }
                }
                i = stop + 1;
            } else {
                output.push_str(self.stream.text(i));
                if let Some(texts) = after.get(&i) {
                    for text in texts {
                        output.push_str(text);
                    }
                }
                i += 1;
            }
        }
        output.push_str(self.stream.trailing_trivia());
        output
    }

    /// Sort spans and drop those strictly contained in an earlier (outer)
    /// span; panic on partial overlap.
    fn effective_spans(&self) -> Vec<&SpanEdit> {
        let mut sorted: Vec<&SpanEdit> = self.spans.iter().collect();
        sorted.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(b.range.stop.cmp(&a.range.stop))
        });
        let mut outer: Vec<&SpanEdit> = Vec::new();
        for edit in sorted {
            if let Some(last) = outer.last() {
                if edit.range.start <= last.range.stop {
                    assert!(
                        last.range.contains(&edit.range),
                        "overlapping edits without containment: [{}, {}] vs [{}, {}]",
                        last.range.start,
                        last.range.stop,
                        edit.range.start,
                        edit.range.stop
                    );
                    continue; // inner edit, outer wins
                }
            }
            outer.push(edit);
        }
        outer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(source: &str) -> TokenStream {
        TokenStream::lex(source).expect("lexing should succeed")
    }

    #[test]
    fn test_no_edits_is_identity() {
        let source = "  int a = 1; // keep\n";
        let s = stream(source);
        let rewriter = TokenRewriter::new(&s);
        assert_eq!(rewriter.render(), source);
    }

    #[test]
    fn test_replace_preserves_surroundings() {
        let s = stream("int a = 1;\nint b = 2;\n");
        let mut rewriter = TokenRewriter::new(&s);
        // Replace `int a = 1;` (tokens 0..=4)
        rewriter.replace(s.address(0, 4), "float a = 1.0f;");
        assert_eq!(rewriter.render(), "float a = 1.0f;\nint b = 2;\n");
    }

    #[test]
    fn test_delete_keeps_leading_trivia() {
        let s = stream("int a;\n  int b;\n");
        let mut rewriter = TokenRewriter::new(&s);
        // Delete `int b;` (tokens 3..=5); its leading newline+indent stays.
        rewriter.delete(s.address(3, 5));
        assert_eq!(rewriter.render(), "int a;\n  \n");
    }

    #[test]
    fn test_insert_before_and_after() {
        let s = stream("class A { }");
        let mut rewriter = TokenRewriter::new(&s);
        rewriter.insert_before(0, "import x.Y;\n");
        rewriter.insert_after(2, "\n\tint n;");
        assert_eq!(rewriter.render(), "import x.Y;\nclass A {\n\tint n; }");
    }

    #[test]
    fn test_adjacent_delete_and_replace() {
        let s = stream("BitmapImage image = new BitmapImage(bitmap);");
        let mut rewriter = TokenRewriter::new(&s);
        // `BitmapImage image =` deleted, `new BitmapImage(bitmap);` replaced.
        rewriter.delete(s.address(0, 2));
        rewriter.replace(s.address(3, 8), "$parallelME.inputBind1(bitmap);");
        assert_eq!(rewriter.render(), " $parallelME.inputBind1(bitmap);");
    }

    #[test]
    fn test_containment_outer_wins() {
        let s = stream("a = b + c;");
        let mut rewriter = TokenRewriter::new(&s);
        rewriter.replace(s.address(2, 4), "x");
        rewriter.replace(s.address(0, 5), "done();");
        assert_eq!(rewriter.render(), "done();");
    }

    #[test]
    fn test_ordering_of_disjoint_edits_is_positional() {
        let s = stream("a; b; c;");
        let mut rewriter = TokenRewriter::new(&s);
        rewriter.replace(s.address(4, 5), "C;");
        rewriter.replace(s.address(0, 1), "A;");
        assert_eq!(rewriter.render(), "A; b; C;");
    }

    #[test]
    #[should_panic(expected = "overlapping edits")]
    fn test_partial_overlap_panics() {
        let s = stream("a = b + c;");
        let mut rewriter = TokenRewriter::new(&s);
        rewriter.replace(s.address(0, 3), "x");
        rewriter.replace(s.address(2, 5), "y");
        let _ = rewriter.render();
    }
}
