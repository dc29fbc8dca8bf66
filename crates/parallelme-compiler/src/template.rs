//! Minimal text templating for generated code.
//!
//! A [`Template`] replaces named `<placeholder>` occurrences with scalar
//! values or with the concatenation of appended list items. That is the
//! whole feature set: the templating layer knows nothing about host-language
//! or kernel-language syntax, and unregistered `<...>` text (generics,
//! comparison operators) passes through untouched.

use std::collections::HashMap;

/// A text template with named placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
    values: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl Template {
    /// Create a template from its text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: HashMap::new(),
            lists: HashMap::new(),
        }
    }

    /// Set a scalar placeholder value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Append an item to a list placeholder. Items render concatenated in
    /// insertion order; separators belong to the items themselves.
    pub fn push(&mut self, key: &str, item: impl Into<String>) -> &mut Self {
        self.lists.entry(key.to_string()).or_default().push(item.into());
        self
    }

    /// Render the template. Only registered placeholders are substituted; a
    /// list placeholder with no items renders empty.
    pub fn render(&self) -> String {
        let mut output = self.text.clone();
        for (key, value) in &self.values {
            output = output.replace(&format!("<{}>", key), value);
        }
        for (key, items) in &self.lists {
            output = output.replace(&format!("<{}>", key), &items.concat());
        }
        output
    }
}

/// Replace whole-identifier occurrences of `from` with `to`.
///
/// Unlike plain string replacement this never rewrites inside a longer
/// identifier (`k` does not match `kernel`) and never rewrites member names
/// (`k` does not match `obj.k`).
pub fn replace_identifier(code: &str, from: &str, to: &str) -> String {
    let bytes = code.as_bytes();
    let mut output = String::with_capacity(code.len());
    let mut i = 0;
    while let Some(offset) = code[i..].find(from) {
        let start = i + offset;
        let end = start + from.len();
        let before = start.checked_sub(1).map(|p| bytes[p] as char);
        let after = if end < bytes.len() {
            Some(bytes[end] as char)
        } else {
            None
        };
        let boundary_before = !matches!(before, Some(c) if is_identifier_char(c) || c == '.');
        let boundary_after = !matches!(after, Some(c) if is_identifier_char(c));
        output.push_str(&code[i..start]);
        if boundary_before && boundary_after {
            output.push_str(to);
        } else {
            output.push_str(from);
        }
        i = end;
    }
    output.push_str(&code[i..]);
    output
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_substitution() {
        let mut template = Template::new("public interface <interfaceName> { }");
        template.set("interfaceName", "ImageOpsWrapper");
        assert_eq!(template.render(), "public interface ImageOpsWrapper { }");
    }

    #[test]
    fn test_list_aggregation() {
        let mut template = Template::new("<imports>class A { }");
        template
            .push("imports", "import a.B;\n")
            .push("imports", "import a.C;\n");
        assert_eq!(template.render(), "import a.B;\nimport a.C;\nclass A { }");
    }

    #[test]
    fn test_empty_list_renders_empty() {
        let mut template = Template::new("<lines>done");
        template.lists.insert("lines".to_string(), Vec::new());
        assert_eq!(template.render(), "done");
    }

    #[test]
    fn test_unregistered_angle_text_untouched() {
        let mut template = Template::new("if (a < b) { Array<Int32> x; <name> }");
        template.set("name", "run();");
        assert_eq!(template.render(), "if (a < b) { Array<Int32> x; run(); }");
    }

    #[test]
    fn test_replace_identifier_respects_boundaries() {
        assert_eq!(replace_identifier("k + kernel", "k", "PM"), "PM + kernel");
        assert_eq!(replace_identifier("obj.k + k", "k", "PM"), "obj.k + PM");
        assert_eq!(replace_identifier("akb k;", "k", "q"), "akb q;");
    }

    #[test]
    fn test_replace_identifier_member_chain() {
        let code = "pixel.rgba.red = pixel.rgba.red * k;";
        let replaced = replace_identifier(code, "pixel", "PM_in");
        assert_eq!(replaced, "PM_in.rgba.red = PM_in.rgba.red * k;");
    }
}
