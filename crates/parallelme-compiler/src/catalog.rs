//! The user-library catalog.
//!
//! Enumerates the user-library classes the compiler recognizes, their valid
//! methods, creator shapes and kernel-C type mappings. Built once at startup
//! and passed by reference through every pass — there is no global registry.
//!
//! Unknown type names pass through the catalog untouched: `recognizes`
//! returns false and the compiler leaves the construct alone.

use crate::ir::OperationKind;
use indexmap::IndexMap;

/// What a valid user-library method means to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSemantics {
    /// Higher-order operation taking a user function
    Operation(OperationKind),
    /// Materializes the collection back to host data
    OutputBind,
    /// Plain accessor; the wrapper returns a value of the given host type
    Accessor(&'static str),
}

/// The three collection families the back ends know how to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// 2D image backed by an Android bitmap, `float3` elements
    BitmapImage,
    /// 2D RGBE-encoded HDR image, `float4` elements
    HdrImage,
    /// 1D numeric array, element type from the type parameter
    Array,
}

/// One registered user-library class.
#[derive(Debug, Clone)]
pub struct UserLibraryClass {
    /// Whether the class is parametric over an element type
    pub typed: bool,
    /// Collection family, None for element/value classes
    pub collection: Option<CollectionKind>,
    /// Valid methods with their semantics
    pub methods: IndexMap<&'static str, MethodSemantics>,
}

/// Immutable registry of user-library classes.
#[derive(Debug, Clone)]
pub struct UserLibraryCatalog {
    classes: IndexMap<&'static str, UserLibraryClass>,
}

impl UserLibraryCatalog {
    /// Build the fixed registry.
    pub fn new() -> Self {
        let mut classes = IndexMap::new();

        let image_methods = |out: &'static str| {
            let mut methods = IndexMap::new();
            methods.insert("foreach", MethodSemantics::Operation(OperationKind::Foreach));
            methods.insert("map", MethodSemantics::Operation(OperationKind::Map));
            methods.insert(out, MethodSemantics::OutputBind);
            methods.insert("getWidth", MethodSemantics::Accessor("int"));
            methods.insert("getHeight", MethodSemantics::Accessor("int"));
            methods
        };
        classes.insert(
            "BitmapImage",
            UserLibraryClass {
                typed: false,
                collection: Some(CollectionKind::BitmapImage),
                methods: image_methods("toBitmap"),
            },
        );
        classes.insert(
            "HDRImage",
            UserLibraryClass {
                typed: false,
                collection: Some(CollectionKind::HdrImage),
                methods: image_methods("toBitmap"),
            },
        );

        let mut array_methods = IndexMap::new();
        array_methods.insert("foreach", MethodSemantics::Operation(OperationKind::Foreach));
        array_methods.insert("map", MethodSemantics::Operation(OperationKind::Map));
        array_methods.insert("reduce", MethodSemantics::Operation(OperationKind::Reduce));
        array_methods.insert("filter", MethodSemantics::Operation(OperationKind::Filter));
        array_methods.insert("toArray", MethodSemantics::OutputBind);
        array_methods.insert("getLength", MethodSemantics::Accessor("int"));
        classes.insert(
            "Array",
            UserLibraryClass {
                typed: true,
                collection: Some(CollectionKind::Array),
                methods: array_methods,
            },
        );

        for element in ["Pixel", "RGB", "RGBA", "Int16", "Int32", "Float32"] {
            classes.insert(
                element,
                UserLibraryClass {
                    typed: false,
                    collection: None,
                    methods: IndexMap::new(),
                },
            );
        }

        Self { classes }
    }

    /// Whether `type_name` is a user-library class.
    pub fn recognizes(&self, type_name: &str) -> bool {
        self.classes.contains_key(type_name)
    }

    /// The registered class, if any.
    pub fn class(&self, type_name: &str) -> Option<&UserLibraryClass> {
        self.classes.get(type_name)
    }

    /// Whether `type_name` is a collection class.
    pub fn is_collection(&self, type_name: &str) -> bool {
        self.class(type_name)
            .map(|class| class.collection.is_some())
            .unwrap_or(false)
    }

    /// Collection family of `type_name`, if it is a collection class.
    pub fn collection_kind(&self, type_name: &str) -> Option<CollectionKind> {
        self.class(type_name).and_then(|class| class.collection)
    }

    /// Semantics of `method_name` on `type_name`, if valid.
    pub fn valid_method(&self, type_name: &str, method_name: &str) -> Option<MethodSemantics> {
        self.class(type_name)
            .and_then(|class| class.methods.get(method_name).copied())
    }

    /// Kernel-C type for a host or user-library type name. Unknown names
    /// pass through untouched.
    pub fn c_type<'a>(&self, type_name: &'a str) -> &'a str {
        match type_name {
            // Host primitives
            "boolean" => "bool",
            "byte" => "uchar",
            "char" => "char",
            "short" => "short",
            "int" => "int",
            "long" => "long",
            "float" => "float",
            "double" => "double",
            // Boxed primitives
            "Boolean" => "bool",
            "Character" => "char",
            "Short" => "short",
            "Integer" => "int",
            "Long" => "long",
            "Float" => "float",
            "Double" => "double",
            // User-library element types
            "Pixel" => "float3",
            "RGB" => "float3",
            "RGBA" => "float4",
            "Int16" => "short",
            "Int32" => "int",
            "Float32" => "float",
            other => other,
        }
    }

    /// Kernel-C element type of a collection instance.
    pub fn element_c_type<'a>(
        &'a self,
        kind: CollectionKind,
        type_parameter: Option<&'a str>,
    ) -> &'a str {
        match kind {
            CollectionKind::BitmapImage => "float3",
            CollectionKind::HdrImage => "float4",
            CollectionKind::Array => self.c_type(type_parameter.unwrap_or("Float32")),
        }
    }

    /// Host-language primitive behind a numeric box type.
    pub fn java_primitive(&self, type_name: &str) -> Option<&'static str> {
        match type_name {
            "Int16" => Some("short"),
            "Int32" => Some("int"),
            "Float32" => Some("float"),
            _ => None,
        }
    }

    /// Host-language type of the `index`-th creator parameter of a
    /// collection, used for generated wrapper signatures.
    pub fn creator_parameter_type(
        &self,
        kind: CollectionKind,
        type_parameter: Option<&str>,
        index: usize,
    ) -> Option<String> {
        match kind {
            CollectionKind::BitmapImage => (index == 0).then(|| "Bitmap".to_string()),
            CollectionKind::HdrImage => match index {
                0 => Some("byte[]".to_string()),
                1 | 2 => Some("int".to_string()),
                _ => None,
            },
            CollectionKind::Array => (index == 0).then(|| {
                let element = type_parameter
                    .and_then(|param| self.java_primitive(param))
                    .unwrap_or("float");
                format!("{}[]", element)
            }),
        }
    }

    /// Whether `type_name` is a valid user-function element type: a
    /// primitive, a boxed primitive, `Pixel`, or a numeric box class.
    pub fn valid_function_argument_type(&self, type_name: &str) -> bool {
        matches!(
            type_name,
            "boolean"
                | "byte"
                | "char"
                | "short"
                | "int"
                | "long"
                | "float"
                | "double"
                | "Boolean"
                | "Character"
                | "Short"
                | "Integer"
                | "Long"
                | "Float"
                | "Double"
                | "Pixel"
                | "Int16"
                | "Int32"
                | "Float32"
        )
    }
}

impl Default for UserLibraryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_collections_and_elements() {
        let catalog = UserLibraryCatalog::new();
        assert!(catalog.recognizes("BitmapImage"));
        assert!(catalog.recognizes("Array"));
        assert!(catalog.recognizes("Pixel"));
        assert!(!catalog.recognizes("ArrayList"));
        assert!(catalog.is_collection("HDRImage"));
        assert!(!catalog.is_collection("Int32"));
    }

    #[test]
    fn test_valid_methods() {
        let catalog = UserLibraryCatalog::new();
        assert_eq!(
            catalog.valid_method("BitmapImage", "foreach"),
            Some(MethodSemantics::Operation(OperationKind::Foreach))
        );
        assert_eq!(
            catalog.valid_method("Array", "reduce"),
            Some(MethodSemantics::Operation(OperationKind::Reduce))
        );
        assert_eq!(
            catalog.valid_method("Array", "toArray"),
            Some(MethodSemantics::OutputBind)
        );
        assert_eq!(
            catalog.valid_method("BitmapImage", "getWidth"),
            Some(MethodSemantics::Accessor("int"))
        );
        assert_eq!(catalog.valid_method("BitmapImage", "blur"), None);
    }

    #[test]
    fn test_c_type_mapping() {
        let catalog = UserLibraryCatalog::new();
        assert_eq!(catalog.c_type("Pixel"), "float3");
        assert_eq!(catalog.c_type("Int32"), "int");
        assert_eq!(catalog.c_type("Float32"), "float");
        assert_eq!(catalog.c_type("boolean"), "bool");
        assert_eq!(catalog.c_type("SomethingElse"), "SomethingElse");
    }

    #[test]
    fn test_element_c_type() {
        let catalog = UserLibraryCatalog::new();
        assert_eq!(
            catalog.element_c_type(CollectionKind::BitmapImage, None),
            "float3"
        );
        assert_eq!(catalog.element_c_type(CollectionKind::HdrImage, None), "float4");
        assert_eq!(
            catalog.element_c_type(CollectionKind::Array, Some("Int32")),
            "int"
        );
    }

    #[test]
    fn test_creator_parameter_types() {
        let catalog = UserLibraryCatalog::new();
        assert_eq!(
            catalog.creator_parameter_type(CollectionKind::BitmapImage, None, 0),
            Some("Bitmap".to_string())
        );
        assert_eq!(
            catalog.creator_parameter_type(CollectionKind::Array, Some("Int32"), 0),
            Some("int[]".to_string())
        );
        assert_eq!(
            catalog.creator_parameter_type(CollectionKind::HdrImage, None, 2),
            Some("int".to_string())
        );
        assert_eq!(
            catalog.creator_parameter_type(CollectionKind::BitmapImage, None, 1),
            None
        );
    }
}
