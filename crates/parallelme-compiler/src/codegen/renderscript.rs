//! RenderScript target: kernel emission and wrapper method bodies.
//!
//! Each class gets one `.rs` file opened by the RenderScript pragmas and
//! holding, in discovery order: the per-type input-bind conversion kernels,
//! every operation's user function and driver(s), and the per-type
//! output-bind kernels. Final external variables become script globals the
//! wrapper sets before launching; non-final externals of sequential
//! operations live in single-element allocations so mutation reaches the
//! caller.

use super::*;
use crate::ir::{ExecutionType, OperationsAndBinds};
use crate::template::Template;
use std::collections::HashSet;

/// Java-side `Element` factory name for a kernel C element type.
fn java_element(c_type: &str) -> &'static str {
    match c_type {
        "float3" => "F32_3",
        "float4" => "F32_4",
        "float" => "F32",
        "int" => "I32",
        "short" => "I16",
        "bool" | "uchar" => "U8",
        _ => "F32",
    }
}

fn is_image(ctx: &EmitContext<'_>, variable: &Variable) -> bool {
    matches!(
        ctx.catalog.collection_kind(&variable.type_name),
        Some(CollectionKind::BitmapImage) | Some(CollectionKind::HdrImage)
    )
}

/// Extra parameter list for a user function's sequential externals
/// (`, float *k` per non-final external).
fn external_parameters(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    operation
        .external_variables
        .iter()
        .filter(|v| !v.is_final())
        .map(|v| format!(", {} *{}", ctx.catalog.c_type(&v.type_name), v.name))
        .collect()
}

/// Matching arguments at the call site inside a sequential driver.
fn external_arguments(operation: &Operation) -> String {
    operation
        .external_variables
        .iter()
        .filter(|v| !v.is_final())
        .map(|v| format!(", &{}", v.name))
        .collect()
}

/// Loads/write-backs bracketing a sequential driver body.
fn external_frame(ctx: &EmitContext<'_>, operation: &Operation) -> (String, String) {
    let mut loads = String::new();
    let mut stores = String::new();
    for external in &operation.external_variables {
        if external.is_final() {
            continue;
        }
        let c_type = ctx.catalog.c_type(&external.type_name);
        let global = operation_global(operation, &external.name);
        loads.push_str(&format!(
            "\t{} {} = rsGetElementAt_{}({}, 0);\n",
            c_type, external.name, c_type, global
        ));
        stores.push_str(&format!(
            "\trsSetElementAt_{}({}, {}, 0);\n",
            c_type, global, external.name
        ));
    }
    (loads, stores)
}

/// Globals an operation needs, deduplicating plain final-external globals
/// across the whole file via `declared`.
fn operation_globals(
    ctx: &EmitContext<'_>,
    operation: &Operation,
    declared: &mut HashSet<String>,
) -> String {
    let mut globals = String::new();
    for external in &operation.external_variables {
        if external.is_final() {
            if declared.insert(external.name.clone()) {
                globals.push_str(&format!(
                    "{} {};\n",
                    ctx.catalog.c_type(&external.type_name),
                    external.name
                ));
            }
        } else {
            globals.push_str(&format!(
                "rs_allocation {};\n",
                operation_global(operation, &external.name)
            ));
        }
    }
    let sequential = operation.execution == ExecutionType::Sequential;
    let per_op: &[&str] = match (operation.kind, sequential) {
        (OperationKind::Foreach, false) => &[],
        (OperationKind::Foreach, true) => &["input"],
        (OperationKind::Map, false) => &[],
        (OperationKind::Map, true) => &["input", "output"],
        (OperationKind::Reduce, false) => {
            &["input", "tiles", "tileSize", "tileCount", "length", "output"]
        }
        (OperationKind::Reduce, true) => &["input", "length", "output"],
        (OperationKind::Filter, false) => &["input", "flags", "output", "outputLength", "length"],
        (OperationKind::Filter, true) => &["input", "output", "outputLength", "length"],
    };
    for name in per_op {
        let declaration = match *name {
            "tileSize" | "tileCount" | "length" => "int",
            _ => "rs_allocation",
        };
        globals.push_str(&format!(
            "{} {};\n",
            declaration,
            operation_global(operation, name)
        ));
    }
    globals
}

/// The operation's user function.
fn user_function(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let sequential = operation.execution == ExecutionType::Sequential;
    let element = element_c_type(ctx.catalog, &operation.variable);
    let body = assemble_user_function_body(ctx, operation, sequential);
    let externals = if sequential {
        external_parameters(ctx, operation)
    } else {
        String::new()
    };
    let parameters = match operation.kind {
        OperationKind::Reduce => format!("{} PM_in1, {} PM_in2", element, element),
        _ if is_image(ctx, &operation.variable) => {
            format!("{} PM_in, uint32_t x, uint32_t y", element)
        }
        _ => format!("{} PM_in", element),
    };
    let return_type = match operation.kind {
        OperationKind::Filter => "bool".to_string(),
        _ => element.to_string(),
    };
    format!(
        "static {} {}({}{}) {}",
        return_type,
        function_name(operation.number),
        parameters,
        externals,
        body
    )
}

/// User function plus driver kernels for one operation.
pub fn operation_kernels(
    ctx: &EmitContext<'_>,
    operation: &Operation,
    declared_globals: &mut HashSet<String>,
) -> CompilationResult<Vec<String>> {
    let collection = ctx
        .catalog
        .collection_kind(&operation.variable.type_name)
        .ok_or_else(|| CompilationError::InvalidOperation {
            detail: format!(
                "operation on non-collection type '{}'",
                operation.variable.type_name
            ),
        })?;
    ensure_supported(TargetRuntime::RenderScript, collection, operation.kind)?;

    let mut kernels = Vec::new();
    let globals = operation_globals(ctx, operation, declared_globals);
    if !globals.is_empty() {
        kernels.push(globals);
    }
    // C functions must be declared before use: the user function comes first.
    kernels.push(user_function(ctx, operation));
    let parallel = operation.execution == ExecutionType::Parallel;
    match operation.kind {
        OperationKind::Foreach | OperationKind::Map if parallel => {
            kernels.push(transform_kernel(ctx, operation));
        }
        OperationKind::Foreach => kernels.push(foreach_sequential(ctx, operation)),
        OperationKind::Map => kernels.push(map_sequential(ctx, operation)),
        OperationKind::Reduce => {
            if parallel {
                kernels.push(reduce_tile(ctx, operation));
            }
            kernels.push(reduce_final(ctx, operation, parallel));
        }
        OperationKind::Filter => {
            if parallel {
                kernels.push(filter_tile(ctx, operation));
            }
            kernels.push(filter_final(ctx, operation, parallel));
        }
    }
    Ok(kernels)
}

/// Parallel per-element kernel for `foreach` (in place) and `map` (the
/// wrapper directs the output to a fresh allocation).
fn transform_kernel(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let name = operation_name(operation);
    let function = function_name(operation.number);
    if is_image(ctx, &operation.variable) {
        format!(
            "{element} __attribute__((kernel)) {name}({element} PM_in, uint32_t x, uint32_t y) {{\n\
             \treturn {function}(PM_in, x, y);\n\
             }}"
        )
    } else {
        format!(
            "{element} __attribute__((kernel)) {name}({element} PM_in, uint32_t x) {{\n\
             \treturn {function}(PM_in);\n\
             }}"
        )
    }
}

fn foreach_sequential(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let input = operation_global(operation, "input");
    let function = function_name(operation.number);
    let (loads, stores) = external_frame(ctx, operation);
    let arguments = external_arguments(operation);
    let mut template = if is_image(ctx, &operation.variable) {
        Template::new(
            "void <name>() {\n\
             <loads>\
             \tfor (uint32_t PM_y = 0; PM_y < rsAllocationGetDimY(<input>); ++PM_y) {\n\
             \t\tfor (uint32_t PM_x = 0; PM_x < rsAllocationGetDimX(<input>); ++PM_x) {\n\
             \t\t\t<element> PM_value = rsGetElementAt_<element>(<input>, PM_x, PM_y);\n\
             \t\t\trsSetElementAt_<element>(<input>, <function>(PM_value, PM_x, PM_y<arguments>), PM_x, PM_y);\n\
             \t\t}\n\
             \t}\n\
             <stores>\
             }",
        )
    } else {
        Template::new(
            "void <name>() {\n\
             <loads>\
             \tfor (uint32_t PM_x = 0; PM_x < rsAllocationGetDimX(<input>); ++PM_x) {\n\
             \t\t<element> PM_value = rsGetElementAt_<element>(<input>, PM_x);\n\
             \t\trsSetElementAt_<element>(<input>, <function>(PM_value<arguments>), PM_x);\n\
             \t}\n\
             <stores>\
             }",
        )
    };
    template
        .set("name", operation_name(operation))
        .set("element", element)
        .set("input", input)
        .set("function", function)
        .set("loads", loads)
        .set("stores", stores)
        .set("arguments", arguments);
    template.render()
}

fn map_sequential(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let (loads, stores) = external_frame(ctx, operation);
    let mut template = Template::new(
        "void <name>() {\n\
         <loads>\
         \tfor (uint32_t PM_x = 0; PM_x < rsAllocationGetDimX(<input>); ++PM_x) {\n\
         \t\trsSetElementAt_<element>(<output>, <function>(rsGetElementAt_<element>(<input>, PM_x)<arguments>), PM_x);\n\
         \t}\n\
         <stores>\
         }",
    );
    template
        .set("name", operation_name(operation))
        .set("element", element)
        .set("input", operation_global(operation, "input"))
        .set("output", operation_global(operation, "output"))
        .set("function", function_name(operation.number))
        .set("loads", loads)
        .set("stores", stores)
        .set("arguments", external_arguments(operation));
    template.render()
}

/// Parallel reduce, stage one: each work item folds one contiguous tile
/// left to right and returns its partial result.
fn reduce_tile(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let mut template = Template::new(
        "<element> __attribute__((kernel)) <name>_tile(uint32_t x) {\n\
         \tuint32_t PM_base = x * <tileSize>;\n\
         \t<element> PM_accumulator = rsGetElementAt_<element>(<input>, PM_base);\n\
         \tfor (int PM_i = 1; PM_i < <tileSize>; ++PM_i) {\n\
         \t\tPM_accumulator = <function>(PM_accumulator, rsGetElementAt_<element>(<input>, PM_base + PM_i));\n\
         \t}\n\
         \treturn PM_accumulator;\n\
         }",
    );
    template
        .set("element", element)
        .set("name", operation_name(operation))
        .set("input", operation_global(operation, "input"))
        .set("tileSize", operation_global(operation, "tileSize"))
        .set("function", function_name(operation.number));
    template.render()
}

/// Reduce, final stage: combine tile outputs (then the tail of a ragged
/// division) left to right with the user function. The sequential variant
/// folds the whole input directly.
fn reduce_final(ctx: &EmitContext<'_>, operation: &Operation, parallel: bool) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let (loads, stores) = external_frame(ctx, operation);
    let mut template = if parallel {
        Template::new(
            "void <name>() {\n\
             \t<element> PM_accumulator = rsGetElementAt_<element>(<tiles>, 0);\n\
             \tfor (int PM_i = 1; PM_i < <tileCount>; ++PM_i) {\n\
             \t\tPM_accumulator = <function>(PM_accumulator, rsGetElementAt_<element>(<tiles>, PM_i));\n\
             \t}\n\
             \tfor (int PM_i = <tileCount> * <tileSize>; PM_i < <length>; ++PM_i) {\n\
             \t\tPM_accumulator = <function>(PM_accumulator, rsGetElementAt_<element>(<input>, PM_i));\n\
             \t}\n\
             \trsSetElementAt_<element>(<output>, PM_accumulator, 0);\n\
             }",
        )
    } else {
        Template::new(
            "void <name>() {\n\
             <loads>\
             \t<element> PM_accumulator = rsGetElementAt_<element>(<input>, 0);\n\
             \tfor (int PM_i = 1; PM_i < <length>; ++PM_i) {\n\
             \t\tPM_accumulator = <function>(PM_accumulator, rsGetElementAt_<element>(<input>, PM_i)<arguments>);\n\
             \t}\n\
             \trsSetElementAt_<element>(<output>, PM_accumulator, 0);\n\
             <stores>\
             }",
        )
    };
    template
        .set("element", element)
        .set("name", operation_name(operation))
        .set("input", operation_global(operation, "input"))
        .set("tiles", operation_global(operation, "tiles"))
        .set("tileSize", operation_global(operation, "tileSize"))
        .set("tileCount", operation_global(operation, "tileCount"))
        .set("length", operation_global(operation, "length"))
        .set("output", operation_global(operation, "output"))
        .set("function", function_name(operation.number))
        .set("loads", loads)
        .set("stores", stores)
        .set("arguments", external_arguments(operation));
    template.render()
}

/// Filter, stage one: evaluate the predicate per element into a flag array.
fn filter_tile(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let mut template = Template::new(
        "int __attribute__((kernel)) <name>_tile(uint32_t x) {\n\
         \treturn <function>(rsGetElementAt_<element>(<input>, x)) ? 1 : 0;\n\
         }",
    );
    template
        .set("element", element)
        .set("name", operation_name(operation))
        .set("input", operation_global(operation, "input"))
        .set("function", function_name(operation.number));
    template.render()
}

/// Filter, final stage: stable compaction of the flagged elements; the
/// result length lands in a one-element allocation. The sequential variant
/// evaluates the predicate inline.
fn filter_final(ctx: &EmitContext<'_>, operation: &Operation, parallel: bool) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let (loads, stores) = external_frame(ctx, operation);
    let condition = if parallel {
        format!(
            "rsGetElementAt_int({}, PM_i) != 0",
            operation_global(operation, "flags")
        )
    } else {
        format!(
            "{}(rsGetElementAt_{}({}, PM_i){})",
            function_name(operation.number),
            element,
            operation_global(operation, "input"),
            external_arguments(operation)
        )
    };
    let mut template = Template::new(
        "void <name>() {\n\
         <loads>\
         \tint PM_cursor = 0;\n\
         \tfor (int PM_i = 0; PM_i < <length>; ++PM_i) {\n\
         \t\tif (<condition>) {\n\
         \t\t\trsSetElementAt_<element>(<output>, rsGetElementAt_<element>(<input>, PM_i), PM_cursor);\n\
         \t\t\t++PM_cursor;\n\
         \t\t}\n\
         \t}\n\
         \trsSetElementAt_int(<outputLength>, PM_cursor, 0);\n\
         <stores>\
         }",
    );
    template
        .set("element", element)
        .set("name", operation_name(operation))
        .set("input", operation_global(operation, "input"))
        .set("output", operation_global(operation, "output"))
        .set("outputLength", operation_global(operation, "outputLength"))
        .set("length", operation_global(operation, "length"))
        .set("condition", condition)
        .set("loads", loads)
        .set("stores", stores);
    template.render()
}

/// Per-type input-bind conversion kernel, if the type needs one.
fn input_bind_kernel(ctx: &EmitContext<'_>, bind: &InputBind) -> Option<String> {
    match ctx.catalog.collection_kind(&bind.variable.type_name)? {
        CollectionKind::BitmapImage => Some(format!(
            "float3 __attribute__((kernel)) toFloat{}(uchar4 PM_in, uint32_t x, uint32_t y) {{\n\
             \tfloat3 PM_out;\n\
             \tPM_out.s0 = (float) PM_in.r;\n\
             \tPM_out.s1 = (float) PM_in.g;\n\
             \tPM_out.s2 = (float) PM_in.b;\n\
             \treturn PM_out;\n\
             }}",
            bind.variable.type_name
        )),
        CollectionKind::HdrImage => Some(format!(
            "float4 __attribute__((kernel)) toFloat{}(uchar4 PM_in, uint32_t x, uint32_t y) {{\n\
             \tfloat4 PM_out;\n\
             \tif (PM_in.a != 0) {{\n\
             \t\tfloat PM_scale = ldexp(1.0f, PM_in.a - (128 + 8));\n\
             \t\tPM_out.s0 = (PM_in.r + 0.5f) * PM_scale;\n\
             \t\tPM_out.s1 = (PM_in.g + 0.5f) * PM_scale;\n\
             \t\tPM_out.s2 = (PM_in.b + 0.5f) * PM_scale;\n\
             \t\tPM_out.s3 = 1.0f;\n\
             \t}} else {{\n\
             \t\tPM_out.s0 = PM_out.s1 = PM_out.s2 = 0.0f;\n\
             \t\tPM_out.s3 = 0.0f;\n\
             \t}}\n\
             \treturn PM_out;\n\
             }}",
            bind.variable.type_name
        )),
        // Arrays copy without conversion.
        CollectionKind::Array => None,
    }
}

/// Per-type output-bind kernel. Bitmap alpha is fixed at 255.
fn output_bind_kernel(ctx: &EmitContext<'_>, bind: &OutputBind) -> Option<String> {
    match ctx.catalog.collection_kind(&bind.variable.type_name)? {
        CollectionKind::BitmapImage => Some(format!(
            "uchar4 __attribute__((kernel)) toBitmap{}(float3 PM_in, uint32_t x, uint32_t y) {{\n\
             \tuchar4 PM_out;\n\
             \tPM_out.r = (uchar) (PM_in.s0);\n\
             \tPM_out.g = (uchar) (PM_in.s1);\n\
             \tPM_out.b = (uchar) (PM_in.s2);\n\
             \tPM_out.a = 255;\n\
             \treturn PM_out;\n\
             }}",
            bind.variable.type_name
        )),
        CollectionKind::HdrImage => Some(format!(
            "uchar4 __attribute__((kernel)) toBitmap{}(float4 PM_in, uint32_t x, uint32_t y) {{\n\
             \tuchar4 PM_out;\n\
             \tPM_out.r = (uchar) clamp(PM_in.s0 * 255.0f, 0.0f, 255.0f);\n\
             \tPM_out.g = (uchar) clamp(PM_in.s1 * 255.0f, 0.0f, 255.0f);\n\
             \tPM_out.b = (uchar) clamp(PM_in.s2 * 255.0f, 0.0f, 255.0f);\n\
             \tPM_out.a = 255;\n\
             \treturn PM_out;\n\
             }}",
            bind.variable.type_name
        )),
        CollectionKind::Array => None,
    }
}

/// The whole `.rs` kernel file for one class.
pub fn kernel_file(
    ctx: &EmitContext<'_>,
    operations_and_binds: &OperationsAndBinds,
) -> CompilationResult<String> {
    let mut template = Template::new("<header>\n#pragma version(1)\n#pragma rs java_package_name(<package>)\n<functions>");
    template.set("header", header_comment());
    template.set("package", ctx.package_name);
    template.push("functions", "");

    let mut bound_types = HashSet::new();
    for bind in &operations_and_binds.input_binds {
        if bound_types.insert(bind.variable.type_name.clone()) {
            if let Some(kernel) = input_bind_kernel(ctx, bind) {
                template.push("functions", format!("\n\n{}", kernel));
            }
        }
    }
    let mut declared_globals = HashSet::new();
    for operation in &operations_and_binds.operations {
        for kernel in operation_kernels(ctx, operation, &mut declared_globals)? {
            template.push("functions", format!("\n\n{}", kernel));
        }
    }
    let mut output_types = HashSet::new();
    for bind in &operations_and_binds.output_binds {
        if output_types.insert(bind.variable.type_name.clone()) {
            if let Some(kernel) = output_bind_kernel(ctx, bind) {
                template.push("functions", format!("\n\n{}", kernel));
            }
        }
    }
    Ok(template.render())
}

// === Wrapper implementation bodies ===

/// Allocation fields backing one input bind.
pub fn input_bind_declaration(bind: &InputBind) -> String {
    format!(
        "private Allocation {}, {};",
        variable_in_name(&bind.variable),
        variable_out_name(&bind.variable)
    )
}

/// Wrapper method body constructing the target allocations from host data.
pub fn input_bind_creation(ctx: &EmitContext<'_>, bind: &InputBind) -> String {
    let input = variable_in_name(&bind.variable);
    let output = variable_out_name(&bind.variable);
    match ctx.catalog.collection_kind(&bind.variable.type_name) {
        Some(CollectionKind::BitmapImage) => {
            let mut template = Template::new(
                "Type <input>DataType;\n\
                 <input> = Allocation.createFromBitmap(PM_mRS, <param>, Allocation.MipmapControl.MIPMAP_NONE, Allocation.USAGE_SCRIPT | Allocation.USAGE_SHARED);\n\
                 <input>DataType = new Type.Builder(PM_mRS, Element.F32_3(PM_mRS))\n\
                 \t.setX(<input>.getType().getX())\n\
                 \t.setY(<input>.getType().getY())\n\
                 \t.create();\n\
                 <output> = Allocation.createTyped(PM_mRS, <input>DataType);\n\
                 PM_kernel.forEach_toFloat<classType>(<input>, <output>);",
            );
            template
                .set("input", input)
                .set("output", output)
                .set("param", bind.arguments[0].call_text())
                .set("classType", &bind.variable.type_name);
            template.render()
        }
        Some(CollectionKind::HdrImage) => {
            let mut template = Template::new(
                "Type <input>DataType = new Type.Builder(PM_mRS, Element.U8_4(PM_mRS))\n\
                 \t.setX(<width>)\n\
                 \t.setY(<height>)\n\
                 \t.create();\n\
                 <input> = Allocation.createTyped(PM_mRS, <input>DataType);\n\
                 <input>.copyFrom(<data>);\n\
                 Type <output>DataType = new Type.Builder(PM_mRS, Element.F32_4(PM_mRS))\n\
                 \t.setX(<width>)\n\
                 \t.setY(<height>)\n\
                 \t.create();\n\
                 <output> = Allocation.createTyped(PM_mRS, <output>DataType);\n\
                 PM_kernel.forEach_toFloat<classType>(<input>, <output>);",
            );
            template
                .set("input", input)
                .set("output", output)
                .set("data", bind.arguments[0].call_text())
                .set(
                    "width",
                    bind.arguments.get(1).map(Parameter::call_text).unwrap_or("0"),
                )
                .set(
                    "height",
                    bind.arguments.get(2).map(Parameter::call_text).unwrap_or("0"),
                )
                .set("classType", &bind.variable.type_name);
            template.render()
        }
        _ => {
            let element = java_element(element_c_type(ctx.catalog, &bind.variable));
            let data = bind.arguments[0].call_text();
            format!(
                "{input} = Allocation.createSized(PM_mRS, Element.{element}(PM_mRS), {data}.length);\n\
                 {input}.copyFrom({data});\n\
                 {output} = {input};"
            )
        }
    }
}

/// `set_` statements for final externals of an operation.
fn set_final_externals(operation: &Operation) -> String {
    operation
        .external_variables
        .iter()
        .filter(|v| v.is_final())
        .map(|v| format!("PM_kernel.set_{}({});\n", v.name, v.name))
        .collect()
}

/// Allocation plumbing for non-final externals around a sequential launch.
fn sequential_external_plumbing(ctx: &EmitContext<'_>, operation: &Operation) -> (String, String) {
    let mut setup = String::new();
    let mut recover = String::new();
    for external in &operation.external_variables {
        if external.is_final() {
            continue;
        }
        let global = operation_global(operation, &external.name);
        let element = java_element(ctx.catalog.c_type(&external.type_name));
        setup.push_str(&format!(
            "Allocation {global}Allocation = Allocation.createSized(PM_mRS, Element.{element}(PM_mRS), 1);\n\
             {global}Allocation.copyFrom({name});\n\
             PM_kernel.set_{global}({global}Allocation);\n",
            name = external.name
        ));
        recover.push_str(&format!(
            "{global}Allocation.copyTo({});\n",
            external.name
        ));
    }
    (setup, recover)
}

/// Wrapper method body launching one operation.
pub fn operation_call(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let name = operation_name(operation);
    let output = variable_out_name(&operation.variable);
    let element = java_element(element_c_type(ctx.catalog, &operation.variable));
    if operation.execution == ExecutionType::Sequential {
        let (setup, recover) = sequential_external_plumbing(ctx, operation);
        let extra = match operation.kind {
            OperationKind::Map => format!(
                "Allocation PM_mapOut = Allocation.createTyped(PM_mRS, {output}.getType());\n\
                 PM_kernel.set_{}(PM_mapOut);\n",
                operation_global(operation, "output")
            ),
            OperationKind::Reduce => format!(
                "Allocation PM_result = Allocation.createSized(PM_mRS, Element.{element}(PM_mRS), 1);\n\
                 PM_kernel.set_{}({output}.getType().getX());\n\
                 PM_kernel.set_{}(PM_result);\n",
                operation_global(operation, "length"),
                operation_global(operation, "output")
            ),
            OperationKind::Filter => format!(
                "int PM_length = {output}.getType().getX();\n\
                 Allocation PM_filterOut = Allocation.createSized(PM_mRS, Element.{element}(PM_mRS), PM_length);\n\
                 Allocation PM_outputLength = Allocation.createSized(PM_mRS, Element.I32(PM_mRS), 1);\n\
                 PM_kernel.set_{}(PM_length);\n\
                 PM_kernel.set_{}(PM_filterOut);\n\
                 PM_kernel.set_{}(PM_outputLength);\n",
                operation_global(operation, "length"),
                operation_global(operation, "output"),
                operation_global(operation, "outputLength")
            ),
            OperationKind::Foreach => String::new(),
        };
        let takeover = match operation.kind {
            OperationKind::Map => format!("\n{output} = PM_mapOut;"),
            OperationKind::Filter => format!("\n{output} = PM_filterOut;"),
            _ => String::new(),
        };
        format!(
            "{setup}{finals}PM_kernel.set_{input}({output});\n{extra}PM_kernel.invoke_{name}();\n{recover}{takeover}",
            finals = set_final_externals(operation),
            input = operation_global(operation, "input"),
        )
        .trim_end()
        .to_string()
    } else {
        let finals = set_final_externals(operation);
        match operation.kind {
            OperationKind::Foreach => format!(
                "{finals}PM_kernel.forEach_{name}({output}, {output});"
            ),
            OperationKind::Map => format!(
                "{finals}Allocation PM_mapOut = Allocation.createTyped(PM_mRS, {output}.getType());\n\
                 PM_kernel.forEach_{name}({output}, PM_mapOut);\n\
                 {output} = PM_mapOut;"
            ),
            OperationKind::Reduce => {
                let mut template = Template::new(
                    "<finals>int PM_length = <output>.getType().getX();\n\
                     int PM_tileSize = (int) Math.floor(Math.sqrt(PM_length));\n\
                     int PM_tileCount = PM_length / PM_tileSize;\n\
                     Allocation PM_tiles = Allocation.createSized(PM_mRS, Element.<element>(PM_mRS), PM_tileCount);\n\
                     Allocation PM_result = Allocation.createSized(PM_mRS, Element.<element>(PM_mRS), 1);\n\
                     PM_kernel.set_<gInput>(<output>);\n\
                     PM_kernel.set_<gTiles>(PM_tiles);\n\
                     PM_kernel.set_<gTileSize>(PM_tileSize);\n\
                     PM_kernel.set_<gTileCount>(PM_tileCount);\n\
                     PM_kernel.set_<gLength>(PM_length);\n\
                     PM_kernel.set_<gOutput>(PM_result);\n\
                     PM_kernel.forEach_<name>_tile(PM_tiles);\n\
                     PM_kernel.invoke_<name>();",
                );
                template
                    .set("finals", finals)
                    .set("output", output)
                    .set("element", element)
                    .set("gInput", operation_global(operation, "input"))
                    .set("gTiles", operation_global(operation, "tiles"))
                    .set("gTileSize", operation_global(operation, "tileSize"))
                    .set("gTileCount", operation_global(operation, "tileCount"))
                    .set("gLength", operation_global(operation, "length"))
                    .set("gOutput", operation_global(operation, "output"))
                    .set("name", name);
                template.render()
            }
            OperationKind::Filter => {
                let mut template = Template::new(
                    "<finals>int PM_length = <output>.getType().getX();\n\
                     Allocation PM_flags = Allocation.createSized(PM_mRS, Element.I32(PM_mRS), PM_length);\n\
                     Allocation PM_filterOut = Allocation.createSized(PM_mRS, Element.<element>(PM_mRS), PM_length);\n\
                     Allocation PM_outputLength = Allocation.createSized(PM_mRS, Element.I32(PM_mRS), 1);\n\
                     PM_kernel.set_<gInput>(<output>);\n\
                     PM_kernel.set_<gFlags>(PM_flags);\n\
                     PM_kernel.set_<gOutput>(PM_filterOut);\n\
                     PM_kernel.set_<gOutputLength>(PM_outputLength);\n\
                     PM_kernel.set_<gLength>(PM_length);\n\
                     PM_kernel.forEach_<name>_tile(PM_flags);\n\
                     PM_kernel.invoke_<name>();\n\
                     <output> = PM_filterOut;",
                );
                template
                    .set("finals", finals)
                    .set("output", output)
                    .set("element", element)
                    .set("gInput", operation_global(operation, "input"))
                    .set("gFlags", operation_global(operation, "flags"))
                    .set("gOutput", operation_global(operation, "output"))
                    .set("gOutputLength", operation_global(operation, "outputLength"))
                    .set("gLength", operation_global(operation, "length"))
                    .set("name", name);
                template.render()
            }
        }
    }
}

/// Wrapper method body copying target data back to the host destination.
pub fn output_bind_call(ctx: &EmitContext<'_>, bind: &OutputBind) -> String {
    let output = variable_out_name(&bind.variable);
    let destination = &bind.destination.name;
    match ctx.catalog.collection_kind(&bind.variable.type_name) {
        Some(CollectionKind::BitmapImage) | Some(CollectionKind::HdrImage) => format!(
            "Allocation PM_bitmapOut = Allocation.createFromBitmap(PM_mRS, {destination}, Allocation.MipmapControl.MIPMAP_NONE, Allocation.USAGE_SCRIPT | Allocation.USAGE_SHARED);\n\
             PM_kernel.forEach_toBitmap{}({output}, PM_bitmapOut);\n\
             PM_bitmapOut.copyTo({destination});",
            bind.variable.type_name
        ),
        _ => format!("{output}.copy1DRangeTo(0, {destination}.length, {destination});"),
    }
}

/// Wrapper method body for an accessor call.
pub fn method_call_body(ctx: &EmitContext<'_>, call: &MethodCall) -> String {
    let accessor = match call.method_name.as_str() {
        "getHeight" => "getY",
        _ => "getX",
    };
    let allocation = if is_image(ctx, &call.variable) {
        variable_in_name(&call.variable)
    } else {
        variable_out_name(&call.variable)
    };
    format!("return {}.getType().{}();", allocation, accessor)
}

/// Field and constructor lines for the wrapper implementation class.
pub fn initialization(ctx: &EmitContext<'_>) -> Vec<String> {
    let class_name = wrapper_class_name(ctx.class_name, TargetRuntime::RenderScript);
    vec![
        "private RenderScript PM_mRS;".to_string(),
        format!("private ScriptC_{} PM_kernel;", ctx.class_name),
        String::new(),
        format!("public {}(RenderScript PM_mRS) {{", class_name),
        "\tthis.PM_mRS = PM_mRS;".to_string(),
        format!("\tthis.PM_kernel = new ScriptC_{}(PM_mRS);", ctx.class_name),
        "}".to_string(),
    ]
}

/// Imports of the RenderScript wrapper implementation.
pub fn imports(uses_images: bool) -> Vec<String> {
    let mut imports = vec![
        "android.support.v8.renderscript.*".to_string(),
        "org.parallelme.common.ParallelMEValidation".to_string(),
    ];
    if uses_images {
        imports.push("android.graphics.Bitmap".to_string());
    }
    imports
}

/// Imports the rewritten host class needs for the selector constructor.
pub fn host_imports() -> Vec<String> {
    vec!["android.support.v8.renderscript.*".to_string()]
}

pub fn is_valid_body() -> &'static str {
    "return ParallelMEValidation.hasRenderScriptSupport();"
}

/// Shared helper sources written once per destination.
pub fn internal_library() -> Vec<(&'static str, String)> {
    let validation = format!(
        "{}\n\npackage org.parallelme.common;\n\nimport android.os.Build;\n\npublic final class ParallelMEValidation {{\n\tprivate ParallelMEValidation() {{\n\t}}\n\n\tpublic static boolean hasRenderScriptSupport() {{\n\t\treturn Build.VERSION.SDK_INT >= Build.VERSION_CODES.JELLY_BEAN_MR1;\n\t}}\n}}\n",
        header_comment()
    );
    vec![("java/org/parallelme/common/ParallelMEValidation.java", validation)]
}
