//! Target-neutral code generation definitions.
//!
//! Naming, type mapping, accessor substitution and user-function assembly
//! shared by both target runtimes. Per-target emission lives in
//! [`renderscript`] and [`runtime`]; the generated Java wrapper layer in
//! [`wrapper`]. Dispatch is by plain matching on
//! `(target, collection, operation kind)` — shared behavior is free
//! functions, not base classes.
//!
//! Naming scheme: generated members on the Java side carry a `$` prefix
//! (`$parallelME`, `$imageIn`, `$imageOut`); kernel-scope and generated
//! local names carry `PM_` (`PM_in`, `PM_kernel`, `PM_g1_input`). User
//! functions are `function<n>` and wrapper operation methods `<kind><n>`,
//! numbered in discovery order per class.

pub mod renderscript;
pub mod runtime;
pub mod wrapper;

use crate::catalog::{CollectionKind, UserLibraryCatalog};
use crate::ctrans::CTranslator;
use crate::error::{CompilationError, CompilationResult};
use crate::ir::{
    InputBind, MethodCall, Operation, OperationKind, OutputBind, Parameter, Variable,
};
use crate::template::replace_identifier;

/// A concrete parallel execution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRuntime {
    /// GPU-style kernels through the RenderScript dialect
    RenderScript,
    /// The custom C++ runtime reached over JNI
    ParallelME,
}

impl TargetRuntime {
    /// Human-readable runtime name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TargetRuntime::RenderScript => "RenderScript",
            TargetRuntime::ParallelME => "ParallelME",
        }
    }

    /// Suffix of the generated wrapper implementation class.
    pub fn class_suffix(self) -> &'static str {
        match self {
            TargetRuntime::RenderScript => "RS",
            TargetRuntime::ParallelME => "PM",
        }
    }
}

/// Shared state for one class's translation.
pub struct EmitContext<'a> {
    pub catalog: &'a UserLibraryCatalog,
    pub c_translator: &'a dyn CTranslator,
    pub package_name: &'a str,
    pub class_name: &'a str,
}

/// Name of the wrapper field injected into the rewritten host class.
pub const OBJECT_NAME: &str = "$parallelME";
/// Prefix for kernel-scope and generated local names.
pub const PREFIX: &str = "PM_";
/// Name of the ScriptC field in RenderScript wrappers.
pub const KERNEL_FIELD: &str = "PM_kernel";
/// Name of the RenderScript context parameter.
pub const RS_CONTEXT: &str = "PM_mRS";

/// Header placed at the top of every generated file.
pub fn header_comment() -> &'static str {
    "/* File generated by the ParallelME compiler. Do not edit. */"
}

pub fn wrapper_interface_name(class_name: &str) -> String {
    format!("{}Wrapper", class_name)
}

pub fn wrapper_class_name(class_name: &str, target: TargetRuntime) -> String {
    format!("{}Wrapper{}", class_name, target.class_suffix())
}

/// Kernel user-function name for operation `number`.
pub fn function_name(number: u32) -> String {
    format!("function{}", number)
}

/// Wrapper method (and driver kernel) name of an operation.
pub fn operation_name(operation: &Operation) -> String {
    format!("{}{}", operation.kind.name(), operation.number)
}

pub fn input_bind_name(bind: &InputBind) -> String {
    format!("inputBind{}", bind.sequence_index)
}

pub fn output_bind_name(bind: &OutputBind) -> String {
    format!("outputBind{}", bind.sequence_index)
}

pub fn method_call_name(call: &MethodCall) -> String {
    format!("{}{}", call.method_name, call.sequence_index)
}

/// Java-side allocation holding a variable's input data.
pub fn variable_in_name(variable: &Variable) -> String {
    format!("${}In", variable.name)
}

/// Java-side allocation holding a variable's working/output data.
pub fn variable_out_name(variable: &Variable) -> String {
    format!("${}Out", variable.name)
}

/// Per-operation global name in kernel files (`PM_g<n>_<what>`).
pub fn operation_global(operation: &Operation, what: &str) -> String {
    format!("{}g{}_{}", PREFIX, operation.number, what)
}

/// Render bind arguments at a call site.
pub fn comma_separated(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(Parameter::call_text)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Kernel-C element type of the collection an operation or bind refers to.
pub fn element_c_type<'c>(catalog: &'c UserLibraryCatalog, variable: &'c Variable) -> &'c str {
    match catalog.collection_kind(&variable.type_name) {
        Some(kind) => catalog.element_c_type(kind, variable.type_parameter.as_deref()),
        None => catalog.c_type(&variable.type_name),
    }
}

/// Whether a target implements an operation kind on a collection family.
///
/// Arrays support all four kinds on both targets; images only `foreach`.
/// Anything else is a recognized method with no translator and fails.
pub fn ensure_supported(
    target: TargetRuntime,
    collection: CollectionKind,
    kind: OperationKind,
) -> CompilationResult<()> {
    match (collection, kind) {
        (CollectionKind::Array, _) => Ok(()),
        (_, OperationKind::Foreach) => Ok(()),
        (_, other) => Err(CompilationError::UnsupportedMethod {
            method: other.name().to_string(),
            target: target.name().to_string(),
        }),
    }
}

/// Renamed kernel parameter names of a user function: `PM_in`, or
/// `PM_in1`/`PM_in2` for the two-argument reduce combiner.
pub fn user_function_parameter_names(operation: &Operation) -> Vec<String> {
    if operation.user_function.arguments.len() == 2 {
        vec![format!("{}in1", PREFIX), format!("{}in2", PREFIX)]
    } else {
        vec![format!("{}in", PREFIX)]
    }
}

/// Apply the accessor substitutions for one user-function variable.
///
/// `Pixel` variables lose their coordinate wrappers (`p.x` → `x`,
/// `p.rgba.red` → `p.s0`, ...); numeric boxes collapse (`n.value` → `n`);
/// primitive and boxed type spellings become their C types.
pub fn translate_variable(catalog: &UserLibraryCatalog, variable_name: &str, type_name: &str, code: &str) -> String {
    match type_name {
        "Pixel" => {
            let code = replace_identifier(code, type_name, catalog.c_type(type_name));
            let code = code.replace(&format!("{}.rgba.red", variable_name), &format!("{}.s0", variable_name));
            let code = code.replace(&format!("{}.rgba.green", variable_name), &format!("{}.s1", variable_name));
            let code = code.replace(&format!("{}.rgba.blue", variable_name), &format!("{}.s2", variable_name));
            let code = code.replace(&format!("{}.rgba.alpha", variable_name), &format!("{}.s3", variable_name));
            let code = code.replace(&format!("{}.x", variable_name), "x");
            code.replace(&format!("{}.y", variable_name), "y")
        }
        "Int16" | "Int32" | "Float32" => {
            let code = replace_identifier(code, type_name, catalog.c_type(type_name));
            code.replace(&format!("{}.value", variable_name), variable_name)
        }
        other => replace_identifier(code, other, catalog.c_type(other)),
    }
}

/// Assemble the translated body of an operation's user function, braces
/// included.
///
/// `foreach` and `map` bodies mutate their element in place, so the
/// generated function returns the (renamed) element; `reduce` and `filter`
/// bodies already return. When `pointer_externals` is set, non-final
/// external variables are rewritten to dereferences so the single-element
/// write-back protocol of sequential lowering works.
pub fn assemble_user_function_body(
    ctx: &EmitContext<'_>,
    operation: &Operation,
    pointer_externals: bool,
) -> String {
    let mut code = operation.user_function.code.clone();
    if matches!(operation.kind, OperationKind::Foreach | OperationKind::Map) {
        if let Some(index) = code.rfind('}') {
            let argument = &operation.user_function.variable_argument().name;
            code = format!("{}\treturn {};\n}}", &code[..index], argument);
        }
    }
    code = ctx.c_translator.translate(&code);
    let renamed = user_function_parameter_names(operation);
    for (argument, new_name) in operation.user_function.arguments.iter().zip(&renamed) {
        code = replace_identifier(&code, &argument.name, new_name);
        code = translate_variable(ctx.catalog, new_name, &argument.type_name, &code);
    }
    if pointer_externals {
        for external in &operation.external_variables {
            if !external.is_final() {
                code = replace_identifier(&code, &external.name, &format!("(*{})", external.name));
            }
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrans::DefaultCTranslator;
    use crate::ir::{ExecutionType, UserFunction};
    use parallelme_syntax::ast::Modifier;
    use parallelme_syntax::TokenAddress;

    fn catalog() -> UserLibraryCatalog {
        UserLibraryCatalog::new()
    }

    fn variable(name: &str, type_name: &str, modifier: Modifier) -> Variable {
        Variable {
            name: name.to_string(),
            type_name: type_name.to_string(),
            type_parameter: None,
            modifier,
            identifier: 0,
        }
    }

    fn foreach_operation(code: &str) -> Operation {
        Operation {
            variable: variable("image", "BitmapImage", Modifier::None),
            number: 1,
            kind: OperationKind::Foreach,
            user_function: UserFunction {
                code: code.to_string(),
                arguments: vec![variable("pixel", "Pixel", Modifier::None)],
            },
            external_variables: vec![variable("k", "float", Modifier::Final)],
            statement_range: TokenAddress::new(0, 1, 1, 1),
            execution: ExecutionType::Parallel,
        }
    }

    #[test]
    fn test_naming() {
        assert_eq!(wrapper_interface_name("ImageOps"), "ImageOpsWrapper");
        assert_eq!(
            wrapper_class_name("ImageOps", TargetRuntime::RenderScript),
            "ImageOpsWrapperRS"
        );
        assert_eq!(
            wrapper_class_name("ImageOps", TargetRuntime::ParallelME),
            "ImageOpsWrapperPM"
        );
        assert_eq!(function_name(3), "function3");
        let op = foreach_operation("{ }");
        assert_eq!(operation_name(&op), "foreach1");
        assert_eq!(variable_in_name(&op.variable), "$imageIn");
        assert_eq!(variable_out_name(&op.variable), "$imageOut");
        assert_eq!(operation_global(&op, "input"), "PM_g1_input");
    }

    #[test]
    fn test_pixel_substitutions() {
        let code = "p.rgba.red = p.rgba.red * k; p.rgba.alpha = 255; int c = p.x + p.y;";
        let translated = translate_variable(&catalog(), "p", "Pixel", code);
        assert_eq!(
            translated,
            "p.s0 = p.s0 * k; p.s3 = 255; int c = x + y;"
        );
        assert!(!translated.contains(".rgba."));
    }

    #[test]
    fn test_numeric_substitution() {
        let code = "n.value = n.value + 1;";
        assert_eq!(
            translate_variable(&catalog(), "n", "Int32", code),
            "n = n + 1;"
        );
    }

    #[test]
    fn test_assemble_foreach_body_renames_and_returns() {
        let catalog = catalog();
        let translator = DefaultCTranslator;
        let ctx = EmitContext {
            catalog: &catalog,
            c_translator: &translator,
            package_name: "org.sample",
            class_name: "ImageOps",
        };
        let op = foreach_operation("{\n\tpixel.rgba.red = pixel.rgba.red * k;\n}");
        let body = assemble_user_function_body(&ctx, &op, false);
        assert!(body.contains("PM_in.s0 = PM_in.s0 * k;"));
        assert!(body.contains("return PM_in;"));
        assert!(!body.contains("pixel"));
    }

    #[test]
    fn test_assemble_pointer_externals() {
        let catalog = catalog();
        let translator = DefaultCTranslator;
        let ctx = EmitContext {
            catalog: &catalog,
            c_translator: &translator,
            package_name: "org.sample",
            class_name: "ImageOps",
        };
        let mut op = foreach_operation("{\n\tpixel.rgba.red = pixel.rgba.red * k;\n}");
        op.external_variables = vec![variable("k", "float", Modifier::None)];
        let body = assemble_user_function_body(&ctx, &op, true);
        assert!(body.contains("PM_in.s0 * (*k);"));
    }

    #[test]
    fn test_ensure_supported() {
        assert!(ensure_supported(
            TargetRuntime::RenderScript,
            CollectionKind::Array,
            OperationKind::Filter
        )
        .is_ok());
        assert!(ensure_supported(
            TargetRuntime::RenderScript,
            CollectionKind::BitmapImage,
            OperationKind::Foreach
        )
        .is_ok());
        let err = ensure_supported(
            TargetRuntime::ParallelME,
            CollectionKind::BitmapImage,
            OperationKind::Map,
        )
        .unwrap_err();
        assert!(matches!(err, CompilationError::UnsupportedMethod { .. }));
    }
}
