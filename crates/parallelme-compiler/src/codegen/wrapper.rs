//! Generated Java wrapper layer.
//!
//! For each analyzed class the compiler emits a back-end-neutral interface
//! (`<Class>Wrapper`) with one method per input bind, operation, output bind
//! and accessor call, plus one implementation class per target runtime. The
//! rewritten host class holds a `$parallelME` field of the interface type and
//! a constructor that instantiates the ParallelME implementation, falling
//! back to RenderScript when it reports invalid.

use super::*;
use crate::catalog::MethodSemantics;
use crate::ir::{ExecutionType, OperationsAndBinds};
use crate::template::Template;
use std::collections::BTreeSet;

const INTERFACE_TEMPLATE: &str = "<header>\n\n\
     package <packageName>;\n\n\
     <imports>\n\
     public interface <interfaceName> {\n\
     \tpublic boolean isValid();\n\
     <methods>}\n";

const CLASS_TEMPLATE: &str = "<header>\n\n\
     package <packageName>;\n\n\
     <imports>\n\
     public class <className> implements <interfaceName> {\n\
     <classDeclarations>\n\
     \tpublic boolean isValid() {\n\
     \t\t<isValidBody>\n\
     \t}\n\
     <methods>}\n";

const INITIALIZATION_TEMPLATE: &str = "\n\n\
     \tprivate <interfaceName> <objectName>;\n\n\
     \tpublic <className>(RenderScript PM_mRS) {\n\
     \t\tthis.<objectName> = new <preferredClassName>();\n\
     \t\tif (!this.<objectName>.isValid())\n\
     \t\t\tthis.<objectName> = new <fallbackClassName>(PM_mRS);\n\
     \t}\n";

/// Signature of an input-bind wrapper method.
fn input_bind_signature(ctx: &EmitContext<'_>, bind: &InputBind) -> String {
    let kind = ctx
        .catalog
        .collection_kind(&bind.variable.type_name)
        .expect("input binds always target collections");
    let parameters = bind
        .arguments
        .iter()
        .enumerate()
        .map(|(index, argument)| {
            let type_name = ctx
                .catalog
                .creator_parameter_type(kind, bind.variable.type_parameter.as_deref(), index)
                .unwrap_or_else(|| "Object".to_string());
            let name = match argument {
                Parameter::Variable(variable) => variable.name.clone(),
                _ => format!("PM_param{}", index + 1),
            };
            format!("{} {}", type_name, name)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("public void {}({})", input_bind_name(bind), parameters)
}

/// Signature of an operation wrapper method. External variables become
/// parameters; non-final externals are single-element arrays so sequential
/// lowering can write back.
fn operation_signature(operation: &Operation) -> String {
    let parameters = operation
        .external_variables
        .iter()
        .map(|external| {
            if external.is_final() {
                format!("{} {}", external.type_name, external.name)
            } else {
                format!("{}[] {}", external.type_name, external.name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("public void {}({})", operation_name(operation), parameters)
}

fn output_bind_signature(bind: &OutputBind) -> String {
    format!(
        "public void {}({} {})",
        output_bind_name(bind),
        bind.destination.type_name,
        bind.destination.name
    )
}

fn method_call_signature(ctx: &EmitContext<'_>, call: &MethodCall) -> String {
    let return_type = match ctx
        .catalog
        .valid_method(&call.variable.type_name, &call.method_name)
    {
        Some(MethodSemantics::Accessor(return_type)) => return_type,
        _ => "void",
    };
    format!("public {} {}()", return_type, method_call_name(call))
}

/// Accessor calls deduplicated by wrapper slot, in first-appearance order.
fn unique_method_calls<'m>(method_calls: &'m [MethodCall]) -> Vec<&'m MethodCall> {
    let mut seen = std::collections::HashSet::new();
    method_calls
        .iter()
        .filter(|call| seen.insert(call.sequence_index))
        .collect()
}

/// Whether any bind or call touches an image collection.
fn uses_images(
    ctx: &EmitContext<'_>,
    operations_and_binds: &OperationsAndBinds,
    method_calls: &[MethodCall],
) -> bool {
    let is_image = |variable: &Variable| {
        matches!(
            ctx.catalog.collection_kind(&variable.type_name),
            Some(CollectionKind::BitmapImage) | Some(CollectionKind::HdrImage)
        )
    };
    operations_and_binds.input_binds.iter().any(|b| is_image(&b.variable))
        || operations_and_binds.output_binds.iter().any(|b| is_image(&b.variable))
        || method_calls.iter().any(|c| is_image(&c.variable))
}

fn render_imports(imports: &BTreeSet<String>) -> String {
    imports
        .iter()
        .map(|import| format!("import {};\n", import))
        .collect()
}

/// The back-end-neutral wrapper interface source.
pub fn interface_source(
    ctx: &EmitContext<'_>,
    operations_and_binds: &OperationsAndBinds,
    method_calls: &[MethodCall],
) -> String {
    let mut template = Template::new(INTERFACE_TEMPLATE);
    template
        .set("header", header_comment())
        .set("packageName", ctx.package_name)
        .set("interfaceName", wrapper_interface_name(ctx.class_name));
    let mut imports = BTreeSet::new();
    if uses_images(ctx, operations_and_binds, method_calls) {
        imports.insert("android.graphics.Bitmap".to_string());
    }
    template.set("imports", render_imports(&imports));
    for bind in &operations_and_binds.input_binds {
        template.push(
            "methods",
            format!("\n\t{};\n", input_bind_signature(ctx, bind)),
        );
    }
    for operation in &operations_and_binds.operations {
        template.push("methods", format!("\n\t{};\n", operation_signature(operation)));
    }
    for bind in &operations_and_binds.output_binds {
        template.push("methods", format!("\n\t{};\n", output_bind_signature(bind)));
    }
    for call in unique_method_calls(method_calls) {
        template.push(
            "methods",
            format!("\n\t{};\n", method_call_signature(ctx, call)),
        );
    }
    template.render()
}

fn indent_body(body: &str) -> String {
    body.lines()
        .map(|line| {
            if line.is_empty() {
                line.to_string()
            } else {
                format!("\t\t{}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_method(template: &mut Template, signature: String, body: String) {
    template.push(
        "methods",
        format!("\n\t{} {{\n{}\n\t}}\n", signature, indent_body(&body)),
    );
}

/// One target runtime's wrapper implementation class source.
pub fn implementation_source(
    ctx: &EmitContext<'_>,
    target: TargetRuntime,
    operations_and_binds: &OperationsAndBinds,
    method_calls: &[MethodCall],
) -> String {
    let mut template = Template::new(CLASS_TEMPLATE);
    template
        .set("header", header_comment())
        .set("packageName", ctx.package_name)
        .set("interfaceName", wrapper_interface_name(ctx.class_name))
        .set("className", wrapper_class_name(ctx.class_name, target));

    let images = uses_images(ctx, operations_and_binds, method_calls);
    let mut imports: BTreeSet<String> = match target {
        TargetRuntime::RenderScript => renderscript::imports(images).into_iter().collect(),
        TargetRuntime::ParallelME => runtime::imports(images).into_iter().collect(),
    };
    if images {
        imports.insert("android.graphics.Bitmap".to_string());
    }
    template.set("imports", render_imports(&imports));

    let declarations: Vec<String> = match target {
        TargetRuntime::RenderScript => {
            let mut lines = renderscript::initialization(ctx);
            lines.push(String::new());
            for bind in &operations_and_binds.input_binds {
                lines.push(renderscript::input_bind_declaration(bind));
            }
            lines
        }
        TargetRuntime::ParallelME => {
            runtime::class_declarations(ctx, operations_and_binds, method_calls)
        }
    };
    template.set(
        "classDeclarations",
        declarations
            .iter()
            .map(|line| {
                if line.is_empty() {
                    "\n".to_string()
                } else {
                    format!("\t{}\n", line)
                }
            })
            .collect::<String>(),
    );
    template.set(
        "isValidBody",
        match target {
            TargetRuntime::RenderScript => renderscript::is_valid_body(),
            TargetRuntime::ParallelME => runtime::is_valid_body(),
        },
    );

    for bind in &operations_and_binds.input_binds {
        let body = match target {
            TargetRuntime::RenderScript => renderscript::input_bind_creation(ctx, bind),
            TargetRuntime::ParallelME => runtime::input_bind_creation(ctx, bind),
        };
        push_method(&mut template, input_bind_signature(ctx, bind), body);
    }
    for operation in &operations_and_binds.operations {
        let body = match target {
            TargetRuntime::RenderScript => renderscript::operation_call(ctx, operation),
            TargetRuntime::ParallelME => runtime::operation_call(operation),
        };
        push_method(&mut template, operation_signature(operation), body);
    }
    for bind in &operations_and_binds.output_binds {
        let body = match target {
            TargetRuntime::RenderScript => renderscript::output_bind_call(ctx, bind),
            TargetRuntime::ParallelME => runtime::output_bind_call(bind),
        };
        push_method(&mut template, output_bind_signature(bind), body);
    }
    for call in unique_method_calls(method_calls) {
        let body = match target {
            TargetRuntime::RenderScript => renderscript::method_call_body(ctx, call),
            TargetRuntime::ParallelME => runtime::method_call_body(call),
        };
        push_method(&mut template, method_call_signature(ctx, call), body);
    }
    template.render()
}

// === Host-source rewrite fragments ===

/// Field and selector constructor inserted into the rewritten host class:
/// prefer the ParallelME runtime, fall back to RenderScript.
pub fn host_initialization(ctx: &EmitContext<'_>) -> String {
    let mut template = Template::new(INITIALIZATION_TEMPLATE);
    template
        .set("interfaceName", wrapper_interface_name(ctx.class_name))
        .set("objectName", OBJECT_NAME)
        .set("className", ctx.class_name)
        .set(
            "preferredClassName",
            wrapper_class_name(ctx.class_name, TargetRuntime::ParallelME),
        )
        .set(
            "fallbackClassName",
            wrapper_class_name(ctx.class_name, TargetRuntime::RenderScript),
        );
    template.render()
}

/// Host-side call replacing an input-bind creation.
pub fn host_input_bind_call(bind: &InputBind) -> String {
    format!(
        "{}.{}({});",
        OBJECT_NAME,
        input_bind_name(bind),
        comma_separated(&bind.arguments)
    )
}

/// Host-side call replacing an operation statement. Sequential operations
/// wrap each non-final external into a single-element array and read it back
/// after the call.
pub fn host_operation_call(operation: &Operation) -> String {
    if operation.execution == ExecutionType::Parallel {
        let arguments = operation
            .external_variables
            .iter()
            .map(|external| external.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        return format!("{}.{}({});", OBJECT_NAME, operation_name(operation), arguments);
    }
    let mut declarations = String::new();
    let mut recover = String::new();
    let mut arguments = Vec::new();
    for external in &operation.external_variables {
        if external.is_final() {
            arguments.push(external.name.clone());
        } else {
            let array = format!("{}{}", PREFIX, external.name);
            declarations.push_str(&format!(
                "{type_name}[] {array} = new {type_name}[1];\n{array}[0] = {name};\n",
                type_name = external.type_name,
                name = external.name
            ));
            recover.push_str(&format!("\n{} = {}[0];", external.name, array));
            arguments.push(array);
        }
    }
    format!(
        "{}{}.{}({});{}",
        declarations,
        OBJECT_NAME,
        operation_name(operation),
        arguments.join(", "),
        recover
    )
}

/// Host-side statement replacing an output bind. Declarative assignments
/// re-declare the destination before delegating.
pub fn host_output_bind_call(bind: &OutputBind) -> String {
    let call = format!(
        "{}.{}({});",
        OBJECT_NAME,
        output_bind_name(bind),
        bind.destination.name
    );
    match bind.kind {
        crate::ir::OutputBindKind::DeclarativeAssignment => format!(
            "{} {};\n{}",
            bind.destination.type_name, bind.destination.name, call
        ),
        crate::ir::OutputBindKind::Assignment => call,
    }
}

/// Host-side expression replacing an accessor call.
pub fn host_method_call(call: &MethodCall) -> String {
    format!("{}.{}()", OBJECT_NAME, method_call_name(call))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrans::DefaultCTranslator;
    use crate::ir::{OutputBindKind, UserFunction};
    use parallelme_syntax::ast::Modifier;
    use parallelme_syntax::TokenAddress;

    fn context<'a>(
        catalog: &'a UserLibraryCatalog,
        translator: &'a DefaultCTranslator,
    ) -> EmitContext<'a> {
        EmitContext {
            catalog,
            c_translator: translator,
            package_name: "org.sample",
            class_name: "ImageOps",
        }
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

    fn sample(execution: ExecutionType, modifier: Modifier) -> OperationsAndBinds {
        let image = variable("image", "BitmapImage", Modifier::None);
        OperationsAndBinds {
            input_binds: vec![InputBind {
                variable: image.clone(),
                sequence_index: 1,
                arguments: vec![Parameter::Variable(variable(
                    "bitmap",
                    "Bitmap",
                    Modifier::None,
                ))],
                declaration_range: TokenAddress::new(0, 1, 1, 1),
                creation_range: TokenAddress::new(2, 3, 1, 1),
            }],
            operations: vec![Operation {
                variable: image.clone(),
                number: 1,
                kind: OperationKind::Foreach,
                user_function: UserFunction {
                    code: "{ pixel.rgba.red = pixel.rgba.red * k; }".to_string(),
                    arguments: vec![variable("pixel", "Pixel", Modifier::None)],
                },
                external_variables: vec![variable("k", "float", modifier)],
                statement_range: TokenAddress::new(4, 5, 2, 1),
                execution,
            }],
            output_binds: vec![OutputBind {
                variable: image,
                destination: variable("bitmap", "Bitmap", Modifier::None),
                sequence_index: 1,
                statement_range: TokenAddress::new(6, 7, 3, 1),
                kind: OutputBindKind::Assignment,
            }],
        }
    }

    #[test]
    fn test_interface_declares_every_method() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let oab = sample(ExecutionType::Parallel, Modifier::Final);
        let source = interface_source(&ctx, &oab, &[]);
        assert!(source.contains("public interface ImageOpsWrapper {"));
        assert!(source.contains("public boolean isValid();"));
        assert!(source.contains("public void inputBind1(Bitmap bitmap);"));
        assert!(source.contains("public void foreach1(float k);"));
        assert!(source.contains("public void outputBind1(Bitmap bitmap);"));
        assert!(source.contains("import android.graphics.Bitmap;"));
        assert!(source.contains("package org.sample;"));
    }

    #[test]
    fn test_sequential_signature_takes_array() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let oab = sample(ExecutionType::Sequential, Modifier::None);
        let source = interface_source(&ctx, &oab, &[]);
        assert!(source.contains("public void foreach1(float[] k);"));
    }

    #[test]
    fn test_renderscript_implementation() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let oab = sample(ExecutionType::Parallel, Modifier::Final);
        let source = implementation_source(&ctx, TargetRuntime::RenderScript, &oab, &[]);
        assert!(source.contains("public class ImageOpsWrapperRS implements ImageOpsWrapper {"));
        assert!(source.contains("import android.support.v8.renderscript.*;"));
        assert!(source.contains("private ScriptC_ImageOps PM_kernel;"));
        assert!(source.contains("public ImageOpsWrapperRS(RenderScript PM_mRS) {"));
        assert!(source.contains("private Allocation $imageIn, $imageOut;"));
        assert!(source.contains("PM_kernel.set_k(k);"));
        assert!(source.contains("PM_kernel.forEach_foreach1($imageOut, $imageOut);"));
        assert!(source.contains("return ParallelMEValidation.hasRenderScriptSupport();"));
    }

    #[test]
    fn test_parallelme_implementation() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let oab = sample(ExecutionType::Parallel, Modifier::Final);
        let source = implementation_source(&ctx, TargetRuntime::ParallelME, &oab, &[]);
        assert!(source.contains("public class ImageOpsWrapperPM implements ImageOpsWrapper {"));
        assert!(source.contains("System.loadLibrary(\"ParallelMEGenerated\")"));
        assert!(source.contains("private long $imagePtr;"));
        assert!(source.contains("private native long nativeInputBind1(Bitmap bitmap);"));
        assert!(source.contains("$imagePtr = nativeInputBind1(bitmap);"));
        assert!(source.contains("nativeForeach1($imagePtr, k);"));
        assert!(source.contains("return PM_libraryLoaded;"));
    }

    #[test]
    fn test_host_initialization_prefers_parallelme() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let init = host_initialization(&ctx);
        assert!(init.contains("private ImageOpsWrapper $parallelME;"));
        assert!(init.contains("this.$parallelME = new ImageOpsWrapperPM();"));
        assert!(init.contains("if (!this.$parallelME.isValid())"));
        assert!(init.contains("this.$parallelME = new ImageOpsWrapperRS(PM_mRS);"));
    }

    #[test]
    fn test_host_sequential_operation_wraps_externals() {
        let oab = sample(ExecutionType::Sequential, Modifier::None);
        let call = host_operation_call(&oab.operations[0]);
        assert!(call.contains("float[] PM_k = new float[1];"));
        assert!(call.contains("PM_k[0] = k;"));
        assert!(call.contains("$parallelME.foreach1(PM_k);"));
        assert!(call.contains("k = PM_k[0];"));
    }

    #[test]
    fn test_host_output_bind_declarative() {
        let mut oab = sample(ExecutionType::Parallel, Modifier::Final);
        oab.output_binds[0].kind = OutputBindKind::DeclarativeAssignment;
        let call = host_output_bind_call(&oab.output_binds[0]);
        assert!(call.starts_with("Bitmap bitmap;\n"));
        assert!(call.contains("$parallelME.outputBind1(bitmap);"));
    }
}
