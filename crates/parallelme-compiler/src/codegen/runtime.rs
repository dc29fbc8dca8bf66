//! ParallelME runtime target: C++/JNI emission and wrapper method bodies.
//!
//! Each class gets one C++ translation unit named after the JNI class
//! (`org_sample_ImageOpsWrapperPM.cpp`) holding the user functions and one
//! `JNIEXPORT` entry point per wrapper method. The Java wrapper keeps one
//! opaque data pointer per bound collection and delegates every call to a
//! `native` method. Shared runtime plumbing (`ParallelMERuntime.hpp` and its
//! JNI translation unit) is exported once per destination and listed in
//! `Android.mk` next to the generated units.

use super::*;
use crate::ir::{ExecutionType, OperationsAndBinds};
use crate::template::Template;

/// JNI class name of the generated wrapper (`org_sample_ImageOpsWrapperPM`).
pub fn jni_class_name(ctx: &EmitContext<'_>) -> String {
    let class = wrapper_class_name(ctx.class_name, TargetRuntime::ParallelME);
    if ctx.package_name.is_empty() {
        class
    } else {
        format!("{}_{}", ctx.package_name.replace('.', "_"), class)
    }
}

/// File name of the class's C++ translation unit.
pub fn translation_unit_name(ctx: &EmitContext<'_>) -> String {
    format!("{}.cpp", jni_class_name(ctx))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Java-side `native` method name behind a wrapper method.
pub fn native_name(method: &str) -> String {
    format!("native{}", capitalize(method))
}

fn jni_function(ctx: &EmitContext<'_>, method: &str) -> String {
    format!("Java_{}_{}", jni_class_name(ctx), native_name(method))
}

/// Java wrapper field holding the data pointer of a bound variable.
fn pointer_field(variable: &Variable) -> String {
    format!("${}Ptr", variable.name)
}

/// JNI parameter type of a host type.
fn jni_type(type_name: &str) -> String {
    match type_name {
        "boolean" => "jboolean".to_string(),
        "byte" => "jbyte".to_string(),
        "char" => "jchar".to_string(),
        "short" => "jshort".to_string(),
        "int" => "jint".to_string(),
        "long" => "jlong".to_string(),
        "float" => "jfloat".to_string(),
        "double" => "jdouble".to_string(),
        "boolean[]" => "jbooleanArray".to_string(),
        "byte[]" => "jbyteArray".to_string(),
        "short[]" => "jshortArray".to_string(),
        "int[]" => "jintArray".to_string(),
        "float[]" => "jfloatArray".to_string(),
        "double[]" => "jdoubleArray".to_string(),
        _ => "jobject".to_string(),
    }
}

/// JNI accessor stem of a primitive (`Float` in `GetFloatArrayElements`).
fn jni_stem(c_type: &str) -> &'static str {
    match c_type {
        "int" => "Int",
        "short" => "Short",
        "double" => "Double",
        _ => "Float",
    }
}

fn is_image(ctx: &EmitContext<'_>, variable: &Variable) -> bool {
    matches!(
        ctx.catalog.collection_kind(&variable.type_name),
        Some(CollectionKind::BitmapImage) | Some(CollectionKind::HdrImage)
    )
}

/// JNI parameter list for an operation's externals (after the data pointer).
fn external_jni_parameters(operation: &Operation) -> String {
    operation
        .external_variables
        .iter()
        .map(|external| {
            let type_name = if external.is_final() {
                jni_type(&external.type_name)
            } else {
                jni_type(&format!("{}[]", external.type_name))
            };
            format!(", {} {}", type_name, external.name)
        })
        .collect()
}

/// C parameter list of the user function for its externals.
fn external_c_parameters(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    operation
        .external_variables
        .iter()
        .map(|external| {
            let c_type = ctx.catalog.c_type(&external.type_name);
            if external.is_final() {
                format!(", {} {}", c_type, external.name)
            } else {
                format!(", {} *{}", c_type, external.name)
            }
        })
        .collect()
}

/// Pin/unpin frames for non-final externals plus call-site arguments.
struct ExternalFrame {
    pin: String,
    unpin: String,
    arguments: String,
}

fn external_frame(operation: &Operation) -> ExternalFrame {
    let mut pin = String::new();
    let mut unpin = String::new();
    let mut arguments = String::new();
    for external in &operation.external_variables {
        if external.is_final() {
            arguments.push_str(&format!(", {}", external.name));
        } else {
            let stem = jni_stem(&external.type_name);
            pin.push_str(&format!(
                "\tj{lower} *PM_{name} = PM_env->Get{stem}ArrayElements({name}, nullptr);\n",
                lower = external.type_name,
                name = external.name,
                stem = stem
            ));
            unpin.push_str(&format!(
                "\tPM_env->Release{stem}ArrayElements({name}, PM_{name}, 0);\n",
                stem = stem,
                name = external.name
            ));
            arguments.push_str(&format!(", PM_{}", external.name));
        }
    }
    ExternalFrame {
        pin,
        unpin,
        arguments,
    }
}

/// The operation's user function in C++.
fn user_function(ctx: &EmitContext<'_>, operation: &Operation) -> String {
    let element = element_c_type(ctx.catalog, &operation.variable);
    let sequential = operation.execution == ExecutionType::Sequential;
    let body = assemble_user_function_body(ctx, operation, sequential);
    let parameters = match operation.kind {
        OperationKind::Reduce => format!("{} PM_in1, {} PM_in2", element, element),
        _ if is_image(ctx, &operation.variable) => {
            format!("{} PM_in, uint32_t x, uint32_t y", element)
        }
        _ => format!("{} PM_in", element),
    };
    let return_type = match operation.kind {
        OperationKind::Filter => "bool",
        _ => element,
    };
    format!(
        "static {} {}({}{}) {}",
        return_type,
        function_name(operation.number),
        parameters,
        external_c_parameters(ctx, operation),
        body
    )
}

/// One operation's JNI entry point.
fn operation_function(ctx: &EmitContext<'_>, operation: &Operation) -> CompilationResult<String> {
    let collection = ctx
        .catalog
        .collection_kind(&operation.variable.type_name)
        .ok_or_else(|| CompilationError::InvalidOperation {
            detail: format!(
                "operation on non-collection type '{}'",
                operation.variable.type_name
            ),
        })?;
    ensure_supported(TargetRuntime::ParallelME, collection, operation.kind)?;

    let element = element_c_type(ctx.catalog, &operation.variable);
    let function = function_name(operation.number);
    let frame = external_frame(operation);
    let parallel = operation.execution == ExecutionType::Parallel;

    let body = if is_image(ctx, &operation.variable) {
        // Images only reach here as foreach.
        if parallel {
            Template::new(
                "\tauto PM_data = reinterpret_cast<ImageData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tuint32_t PM_width = PM_data->width;\n\
                 <pin>\
                 \tparallelFor(PM_data->height, [=](uint32_t PM_y) {\n\
                 \t\tfor (uint32_t PM_x = 0; PM_x < PM_width; ++PM_x) {\n\
                 \t\t\tPM_buffer[PM_y * PM_width + PM_x] = <function>(PM_buffer[PM_y * PM_width + PM_x], PM_x, PM_y<arguments>);\n\
                 \t\t}\n\
                 \t});\n\
                 <unpin>",
            )
        } else {
            Template::new(
                "\tauto PM_data = reinterpret_cast<ImageData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 <pin>\
                 \tfor (uint32_t PM_y = 0; PM_y < PM_data->height; ++PM_y) {\n\
                 \t\tfor (uint32_t PM_x = 0; PM_x < PM_data->width; ++PM_x) {\n\
                 \t\t\tPM_buffer[PM_y * PM_data->width + PM_x] = <function>(PM_buffer[PM_y * PM_data->width + PM_x], PM_x, PM_y<arguments>);\n\
                 \t\t}\n\
                 \t}\n\
                 <unpin>",
            )
        }
    } else {
        match (operation.kind, parallel) {
            (OperationKind::Foreach, true) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 <pin>\
                 \tparallelFor(PM_data->length, [=](uint32_t PM_x) {\n\
                 \t\tPM_buffer[PM_x] = <function>(PM_buffer[PM_x]<arguments>);\n\
                 \t});\n\
                 <unpin>",
            ),
            (OperationKind::Foreach, false) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 <pin>\
                 \tfor (uint32_t PM_x = 0; PM_x < PM_data->length; ++PM_x) {\n\
                 \t\tPM_buffer[PM_x] = <function>(PM_buffer[PM_x]<arguments>);\n\
                 \t}\n\
                 <unpin>",
            ),
            (OperationKind::Map, true) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tauto PM_output = static_cast<<element> *>(allocateBuffer(PM_data->length * sizeof(<element>)));\n\
                 <pin>\
                 \tparallelFor(PM_data->length, [=](uint32_t PM_x) {\n\
                 \t\tPM_output[PM_x] = <function>(PM_buffer[PM_x]<arguments>);\n\
                 \t});\n\
                 <unpin>\
                 \treplaceBuffer(*PM_data, PM_output, PM_data->length);\n",
            ),
            (OperationKind::Map, false) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tauto PM_output = static_cast<<element> *>(allocateBuffer(PM_data->length * sizeof(<element>)));\n\
                 <pin>\
                 \tfor (uint32_t PM_x = 0; PM_x < PM_data->length; ++PM_x) {\n\
                 \t\tPM_output[PM_x] = <function>(PM_buffer[PM_x]<arguments>);\n\
                 \t}\n\
                 <unpin>\
                 \treplaceBuffer(*PM_data, PM_output, PM_data->length);\n",
            ),
            (OperationKind::Reduce, true) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tsize_t PM_tileSize = tileSizeFor(PM_data->length);\n\
                 \tsize_t PM_tileCount = PM_data->length / PM_tileSize;\n\
                 \tstd::vector<<element>> PM_tiles(PM_tileCount);\n\
                 \tauto PM_tileData = PM_tiles.data();\n\
                 <pin>\
                 \tparallelFor(PM_tileCount, [=](uint32_t PM_t) {\n\
                 \t\tsize_t PM_base = PM_t * PM_tileSize;\n\
                 \t\t<element> PM_accumulator = PM_buffer[PM_base];\n\
                 \t\tfor (size_t PM_i = 1; PM_i < PM_tileSize; ++PM_i) {\n\
                 \t\t\tPM_accumulator = <function>(PM_accumulator, PM_buffer[PM_base + PM_i]<arguments>);\n\
                 \t\t}\n\
                 \t\tPM_tileData[PM_t] = PM_accumulator;\n\
                 \t});\n\
                 \t<element> PM_accumulator = PM_tiles[0];\n\
                 \tfor (size_t PM_i = 1; PM_i < PM_tileCount; ++PM_i) {\n\
                 \t\tPM_accumulator = <function>(PM_accumulator, PM_tiles[PM_i]<arguments>);\n\
                 \t}\n\
                 \tfor (size_t PM_i = PM_tileCount * PM_tileSize; PM_i < PM_data->length; ++PM_i) {\n\
                 \t\tPM_accumulator = <function>(PM_accumulator, PM_buffer[PM_i]<arguments>);\n\
                 \t}\n\
                 <unpin>\
                 \t*reinterpret_cast<<element> *>(PM_data->result) = PM_accumulator;\n",
            ),
            (OperationKind::Reduce, false) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 <pin>\
                 \t<element> PM_accumulator = PM_buffer[0];\n\
                 \tfor (size_t PM_i = 1; PM_i < PM_data->length; ++PM_i) {\n\
                 \t\tPM_accumulator = <function>(PM_accumulator, PM_buffer[PM_i]<arguments>);\n\
                 \t}\n\
                 <unpin>\
                 \t*reinterpret_cast<<element> *>(PM_data->result) = PM_accumulator;\n",
            ),
            (OperationKind::Filter, true) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tstd::vector<int> PM_flags(PM_data->length);\n\
                 \tauto PM_flagData = PM_flags.data();\n\
                 <pin>\
                 \tparallelFor(PM_data->length, [=](uint32_t PM_x) {\n\
                 \t\tPM_flagData[PM_x] = <function>(PM_buffer[PM_x]<arguments>) ? 1 : 0;\n\
                 \t});\n\
                 \tauto PM_output = static_cast<<element> *>(allocateBuffer(PM_data->length * sizeof(<element>)));\n\
                 \tsize_t PM_cursor = 0;\n\
                 \tfor (size_t PM_i = 0; PM_i < PM_data->length; ++PM_i) {\n\
                 \t\tif (PM_flags[PM_i] != 0) {\n\
                 \t\t\tPM_output[PM_cursor] = PM_buffer[PM_i];\n\
                 \t\t\t++PM_cursor;\n\
                 \t\t}\n\
                 \t}\n\
                 <unpin>\
                 \treplaceBuffer(*PM_data, PM_output, PM_cursor);\n",
            ),
            (OperationKind::Filter, false) => Template::new(
                "\tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<<element> *>(PM_data->buffer);\n\
                 \tauto PM_output = static_cast<<element> *>(allocateBuffer(PM_data->length * sizeof(<element>)));\n\
                 <pin>\
                 \tsize_t PM_cursor = 0;\n\
                 \tfor (size_t PM_i = 0; PM_i < PM_data->length; ++PM_i) {\n\
                 \t\tif (<function>(PM_buffer[PM_i]<arguments>)) {\n\
                 \t\t\tPM_output[PM_cursor] = PM_buffer[PM_i];\n\
                 \t\t\t++PM_cursor;\n\
                 \t\t}\n\
                 \t}\n\
                 <unpin>\
                 \treplaceBuffer(*PM_data, PM_output, PM_cursor);\n",
            ),
        }
    };

    let mut template = body;
    template
        .set("element", element)
        .set("function", function)
        .set("pin", frame.pin)
        .set("unpin", frame.unpin)
        .set("arguments", frame.arguments);
    Ok(format!(
        "JNIEXPORT void JNICALL {}(JNIEnv *PM_env, jobject PM_thisObject, jlong PM_dataPointer{}) {{\n{}}}",
        jni_function(ctx, &operation_name(operation)),
        external_jni_parameters(operation),
        template.render()
    ))
}

/// JNI entry point constructing target storage from host data.
fn input_bind_function(ctx: &EmitContext<'_>, bind: &InputBind) -> String {
    let name = jni_function(ctx, &input_bind_name(bind));
    match ctx.catalog.collection_kind(&bind.variable.type_name) {
        Some(CollectionKind::BitmapImage) => format!(
            "JNIEXPORT jlong JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, jobject bitmap) {{\n\
             \tAndroidBitmapInfo PM_info;\n\
             \tAndroidBitmap_getInfo(PM_env, bitmap, &PM_info);\n\
             \tvoid *PM_pixels;\n\
             \tAndroidBitmap_lockPixels(PM_env, bitmap, &PM_pixels);\n\
             \tauto PM_image = createImage(PM_info.width, PM_info.height, sizeof(float3));\n\
             \tauto PM_source = static_cast<uchar4 *>(PM_pixels);\n\
             \tauto PM_buffer = static_cast<float3 *>(PM_image->buffer);\n\
             \tfor (uint32_t PM_i = 0; PM_i < PM_info.width * PM_info.height; ++PM_i) {{\n\
             \t\tPM_buffer[PM_i].s0 = (float) PM_source[PM_i].r;\n\
             \t\tPM_buffer[PM_i].s1 = (float) PM_source[PM_i].g;\n\
             \t\tPM_buffer[PM_i].s2 = (float) PM_source[PM_i].b;\n\
             \t}}\n\
             \tAndroidBitmap_unlockPixels(PM_env, bitmap);\n\
             \treturn reinterpret_cast<jlong>(PM_image);\n\
             }}"
        ),
        Some(CollectionKind::HdrImage) => format!(
            "JNIEXPORT jlong JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, jbyteArray data, jint width, jint height) {{\n\
             \tauto PM_image = createImage(width, height, sizeof(float4));\n\
             \tjbyte *PM_bytes = PM_env->GetByteArrayElements(data, nullptr);\n\
             \tauto PM_source = reinterpret_cast<uchar4 *>(PM_bytes);\n\
             \tauto PM_buffer = static_cast<float4 *>(PM_image->buffer);\n\
             \tfor (jint PM_i = 0; PM_i < width * height; ++PM_i) {{\n\
             \t\tif (PM_source[PM_i].a != 0) {{\n\
             \t\t\tfloat PM_scale = ldexpf(1.0f, PM_source[PM_i].a - (128 + 8));\n\
             \t\t\tPM_buffer[PM_i].s0 = (PM_source[PM_i].r + 0.5f) * PM_scale;\n\
             \t\t\tPM_buffer[PM_i].s1 = (PM_source[PM_i].g + 0.5f) * PM_scale;\n\
             \t\t\tPM_buffer[PM_i].s2 = (PM_source[PM_i].b + 0.5f) * PM_scale;\n\
             \t\t\tPM_buffer[PM_i].s3 = 1.0f;\n\
             \t\t}} else {{\n\
             \t\t\tPM_buffer[PM_i].s0 = PM_buffer[PM_i].s1 = PM_buffer[PM_i].s2 = 0.0f;\n\
             \t\t\tPM_buffer[PM_i].s3 = 0.0f;\n\
             \t\t}}\n\
             \t}}\n\
             \tPM_env->ReleaseByteArrayElements(data, PM_bytes, JNI_ABORT);\n\
             \treturn reinterpret_cast<jlong>(PM_image);\n\
             }}"
        ),
        _ => {
            let element = element_c_type(ctx.catalog, &bind.variable);
            let stem = jni_stem(element);
            let array_type = jni_type(&format!(
                "{}[]",
                match element {
                    "short" => "short",
                    "int" => "int",
                    _ => "float",
                }
            ));
            format!(
                "JNIEXPORT jlong JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, {array_type} data) {{\n\
                 \tjsize PM_length = PM_env->GetArrayLength(data);\n\
                 \tauto PM_array = createArray(PM_length * sizeof({element}), PM_length);\n\
                 \tPM_env->Get{stem}ArrayRegion(data, 0, PM_length, static_cast<j{element} *>(PM_array->buffer));\n\
                 \treturn reinterpret_cast<jlong>(PM_array);\n\
                 }}"
            )
        }
    }
}

/// JNI entry point copying target data out to the host destination. Bitmap
/// alpha is fixed at 255.
fn output_bind_function(ctx: &EmitContext<'_>, bind: &OutputBind) -> String {
    let name = jni_function(ctx, &output_bind_name(bind));
    match ctx.catalog.collection_kind(&bind.variable.type_name) {
        Some(CollectionKind::BitmapImage) | Some(CollectionKind::HdrImage) => {
            let element = element_c_type(ctx.catalog, &bind.variable);
            let scale = if element == "float4" { " * 255.0f" } else { "" };
            format!(
                "JNIEXPORT void JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, jlong PM_dataPointer, jobject bitmap) {{\n\
                 \tauto PM_data = reinterpret_cast<ImageData *>(PM_dataPointer);\n\
                 \tauto PM_buffer = static_cast<{element} *>(PM_data->buffer);\n\
                 \tvoid *PM_pixels;\n\
                 \tAndroidBitmap_lockPixels(PM_env, bitmap, &PM_pixels);\n\
                 \tauto PM_target = static_cast<uchar4 *>(PM_pixels);\n\
                 \tfor (uint32_t PM_i = 0; PM_i < PM_data->width * PM_data->height; ++PM_i) {{\n\
                 \t\tPM_target[PM_i].r = (unsigned char) (PM_buffer[PM_i].s0{scale});\n\
                 \t\tPM_target[PM_i].g = (unsigned char) (PM_buffer[PM_i].s1{scale});\n\
                 \t\tPM_target[PM_i].b = (unsigned char) (PM_buffer[PM_i].s2{scale});\n\
                 \t\tPM_target[PM_i].a = 255;\n\
                 \t}}\n\
                 \tAndroidBitmap_unlockPixels(PM_env, bitmap);\n\
                 }}"
            )
        }
        _ => {
            let element = element_c_type(ctx.catalog, &bind.variable);
            let stem = jni_stem(element);
            let array_type = jni_type(&format!(
                "{}[]",
                match element {
                    "short" => "short",
                    "int" => "int",
                    _ => "float",
                }
            ));
            format!(
                "JNIEXPORT void JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, jlong PM_dataPointer, {array_type} destination) {{\n\
                 \tauto PM_data = reinterpret_cast<ArrayData *>(PM_dataPointer);\n\
                 \tjsize PM_length = PM_env->GetArrayLength(destination);\n\
                 \tPM_env->Set{stem}ArrayRegion(destination, 0, PM_length, static_cast<j{element} *>(PM_data->buffer));\n\
                 }}"
            )
        }
    }
}

/// JNI entry point for an accessor call.
fn method_call_function(ctx: &EmitContext<'_>, call: &MethodCall) -> String {
    let name = jni_function(ctx, &method_call_name(call));
    let (data_type, field) = if is_image(ctx, &call.variable) {
        (
            "ImageData",
            if call.method_name == "getHeight" {
                "height"
            } else {
                "width"
            },
        )
    } else {
        ("ArrayData", "length")
    };
    format!(
        "JNIEXPORT jint JNICALL {name}(JNIEnv *PM_env, jobject PM_thisObject, jlong PM_dataPointer) {{\n\
         \treturn (jint) reinterpret_cast<{data_type} *>(PM_dataPointer)->{field};\n\
         }}"
    )
}

/// The class's whole C++ translation unit.
pub fn translation_unit(
    ctx: &EmitContext<'_>,
    operations_and_binds: &OperationsAndBinds,
    method_calls: &[MethodCall],
) -> CompilationResult<String> {
    let mut template = Template::new(
        "<header>\n\n\
         #include <jni.h>\n\
         #include <android/bitmap.h>\n\
         #include <cmath>\n\
         #include <vector>\n\
         #include \"ParallelMERuntime.hpp\"\n\n\
         using namespace parallelme;\n<functions>",
    );
    template.set("header", header_comment());
    template.push("functions", "");
    for bind in &operations_and_binds.input_binds {
        template.push("functions", format!("\n\n{}", input_bind_function(ctx, bind)));
    }
    for operation in &operations_and_binds.operations {
        template.push("functions", format!("\n\n{}", user_function(ctx, operation)));
        template.push(
            "functions",
            format!("\n\n{}", operation_function(ctx, operation)?),
        );
    }
    for bind in &operations_and_binds.output_binds {
        template.push(
            "functions",
            format!("\n\n{}", output_bind_function(ctx, bind)),
        );
    }
    let mut seen = std::collections::HashSet::new();
    for call in method_calls {
        if seen.insert(call.sequence_index) {
            template.push(
                "functions",
                format!("\n\n{}", method_call_function(ctx, call)),
            );
        }
    }
    Ok(template.render())
}

// === Java wrapper bodies ===

/// Field, loader and `native` declarations of the Java wrapper class.
pub fn class_declarations(
    ctx: &EmitContext<'_>,
    operations_and_binds: &OperationsAndBinds,
    method_calls: &[MethodCall],
) -> Vec<String> {
    let mut lines = vec![
        "private static boolean PM_libraryLoaded;".to_string(),
        String::new(),
        "static {".to_string(),
        "\ttry {".to_string(),
        "\t\tSystem.loadLibrary(\"ParallelMEGenerated\");".to_string(),
        "\t\tPM_libraryLoaded = true;".to_string(),
        "\t} catch (UnsatisfiedLinkError PM_error) {".to_string(),
        "\t\tPM_libraryLoaded = false;".to_string(),
        "\t}".to_string(),
        "}".to_string(),
        String::new(),
    ];
    for bind in &operations_and_binds.input_binds {
        lines.push(format!("private long {};", pointer_field(&bind.variable)));
        let parameters = bind
            .arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| signature_parameter(ctx, bind, index, argument))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "private native long {}({});",
            native_name(&input_bind_name(bind)),
            parameters
        ));
    }
    for operation in &operations_and_binds.operations {
        let mut parameters = vec!["long PM_dataPointer".to_string()];
        for external in &operation.external_variables {
            if external.is_final() {
                parameters.push(format!("{} {}", external.type_name, external.name));
            } else {
                parameters.push(format!("{}[] {}", external.type_name, external.name));
            }
        }
        lines.push(format!(
            "private native void {}({});",
            native_name(&operation_name(operation)),
            parameters.join(", ")
        ));
    }
    for bind in &operations_and_binds.output_binds {
        lines.push(format!(
            "private native void {}(long PM_dataPointer, {} {});",
            native_name(&output_bind_name(bind)),
            bind.destination.type_name,
            bind.destination.name
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for call in method_calls {
        if seen.insert(call.sequence_index) {
            lines.push(format!(
                "private native int {}(long PM_dataPointer);",
                native_name(&method_call_name(call))
            ));
        }
    }
    lines
}

fn signature_parameter(
    ctx: &EmitContext<'_>,
    bind: &InputBind,
    index: usize,
    argument: &Parameter,
) -> String {
    let kind = ctx
        .catalog
        .collection_kind(&bind.variable.type_name)
        .expect("input binds always target collections");
    let type_name = ctx
        .catalog
        .creator_parameter_type(kind, bind.variable.type_parameter.as_deref(), index)
        .unwrap_or_else(|| "Object".to_string());
    let name = match argument {
        Parameter::Variable(variable) => variable.name.clone(),
        _ => format!("PM_param{}", index + 1),
    };
    format!("{} {}", type_name, name)
}

/// Wrapper method body for an input bind.
pub fn input_bind_creation(ctx: &EmitContext<'_>, bind: &InputBind) -> String {
    let arguments = bind
        .arguments
        .iter()
        .enumerate()
        .map(|(index, argument)| match argument {
            Parameter::Variable(variable) => variable.name.clone(),
            _ => format!("PM_param{}", index + 1),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} = {}({});",
        pointer_field(&bind.variable),
        native_name(&input_bind_name(bind)),
        arguments
    )
}

/// Wrapper method body for an operation.
pub fn operation_call(operation: &Operation) -> String {
    let mut arguments = vec![pointer_field(&operation.variable)];
    for external in &operation.external_variables {
        arguments.push(external.name.clone());
    }
    format!(
        "{}({});",
        native_name(&operation_name(operation)),
        arguments.join(", ")
    )
}

/// Wrapper method body for an output bind.
pub fn output_bind_call(bind: &OutputBind) -> String {
    format!(
        "{}({}, {});",
        native_name(&output_bind_name(bind)),
        pointer_field(&bind.variable),
        bind.destination.name
    )
}

/// Wrapper method body for an accessor call.
pub fn method_call_body(call: &MethodCall) -> String {
    format!(
        "return {}({});",
        native_name(&method_call_name(call)),
        pointer_field(&call.variable)
    )
}

/// Imports of the ParallelME wrapper implementation.
pub fn imports(uses_images: bool) -> Vec<String> {
    if uses_images {
        vec!["android.graphics.Bitmap".to_string()]
    } else {
        Vec::new()
    }
}

pub fn is_valid_body() -> &'static str {
    "return PM_libraryLoaded;"
}

/// `Android.mk` enumerating the shared runtime bridge plus every generated
/// C++ translation unit.
pub fn android_mk(translation_units: &[String]) -> String {
    let mut template = Template::new(
        "<header>\n\n\
         LOCAL_PATH := $(call my-dir)\n\
         include $(CLEAR_VARS)\n\
         LOCAL_MODULE := libParallelMEGenerated\n\
         LOCAL_ARM_MODE := arm\n\
         LOCAL_C_INCLUDES := $(LOCAL_PATH)/../runtime/include\n\
         LOCAL_CFLAGS := -O3 -Wall -Wextra -Werror -Wno-unused-parameter -Wno-extern-c-compat\n\
         LOCAL_CPPFLAGS := -O3 -std=c++14 -fexceptions\n\
         LOCAL_CPP_FEATURES += exceptions\n\
         LOCAL_LDLIBS := -llog -ljnigraphics\n\
         LOCAL_SHARED_LIBRARIES := libParallelMERuntime\n\
         LOCAL_SRC_FILES := <files>\n\
         include $(BUILD_SHARED_LIBRARY)\n",
    );
    template.set("header", "# File generated by the ParallelME compiler. Do not edit.");
    let mut files = vec!["org_parallelme_ParallelMERuntime.cpp".to_string()];
    files.extend(translation_units.iter().cloned());
    template.set("files", files.join(" \\\n\t"));
    template.render()
}

/// Shared runtime sources written once per destination.
pub fn internal_library() -> Vec<(&'static str, String)> {
    let header = format!(
        "{}\n\n\
         #ifndef PARALLELME_RUNTIME_HPP\n\
         #define PARALLELME_RUNTIME_HPP\n\n\
         #include <cstddef>\n\
         #include <cstdint>\n\
         #include <functional>\n\n\
         namespace parallelme {{\n\n\
         struct float3 {{ float s0, s1, s2; }};\n\
         struct float4 {{ float s0, s1, s2, s3; }};\n\
         struct uchar4 {{ unsigned char r, g, b, a; }};\n\n\
         struct ImageData {{\n\
         \tvoid *buffer;\n\
         \tuint32_t width;\n\
         \tuint32_t height;\n\
         \tsize_t elementSize;\n\
         }};\n\n\
         struct ArrayData {{\n\
         \tvoid *buffer;\n\
         \tsize_t length;\n\
         \tunsigned char result[16];\n\
         }};\n\n\
         ImageData *createImage(uint32_t width, uint32_t height, size_t elementSize);\n\
         ArrayData *createArray(size_t bytes, size_t length);\n\
         void *allocateBuffer(size_t bytes);\n\
         void replaceBuffer(ArrayData &array, void *buffer, size_t length);\n\
         size_t tileSizeFor(size_t length);\n\
         void parallelFor(size_t count, const std::function<void(uint32_t)> &body);\n\n\
         }} // namespace parallelme\n\n\
         #endif\n",
        header_comment()
    );
    let bridge = format!(
        "{}\n\n\
         #include <jni.h>\n\
         #include <cmath>\n\
         #include <cstdlib>\n\
         #include <cstring>\n\
         #include <thread>\n\
         #include <vector>\n\
         #include \"ParallelMERuntime.hpp\"\n\n\
         namespace parallelme {{\n\n\
         ImageData *createImage(uint32_t width, uint32_t height, size_t elementSize) {{\n\
         \tauto image = new ImageData();\n\
         \timage->buffer = allocateBuffer(width * height * elementSize);\n\
         \timage->width = width;\n\
         \timage->height = height;\n\
         \timage->elementSize = elementSize;\n\
         \treturn image;\n\
         }}\n\n\
         ArrayData *createArray(size_t bytes, size_t length) {{\n\
         \tauto array = new ArrayData();\n\
         \tarray->buffer = allocateBuffer(bytes);\n\
         \tarray->length = length;\n\
         \tstd::memset(array->result, 0, sizeof(array->result));\n\
         \treturn array;\n\
         }}\n\n\
         void *allocateBuffer(size_t bytes) {{\n\
         \treturn std::malloc(bytes);\n\
         }}\n\n\
         void replaceBuffer(ArrayData &array, void *buffer, size_t length) {{\n\
         \tstd::free(array.buffer);\n\
         \tarray.buffer = buffer;\n\
         \tarray.length = length;\n\
         }}\n\n\
         size_t tileSizeFor(size_t length) {{\n\
         \tsize_t size = (size_t) std::floor(std::sqrt((double) length));\n\
         \treturn size > 0 ? size : 1;\n\
         }}\n\n\
         void parallelFor(size_t count, const std::function<void(uint32_t)> &body) {{\n\
         \tsize_t workers = std::thread::hardware_concurrency();\n\
         \tif (workers == 0)\n\
         \t\tworkers = 1;\n\
         \tstd::vector<std::thread> threads;\n\
         \tfor (size_t worker = 0; worker < workers; ++worker) {{\n\
         \t\tthreads.emplace_back([=]() {{\n\
         \t\t\tfor (size_t index = worker; index < count; index += workers)\n\
         \t\t\t\tbody((uint32_t) index);\n\
         \t\t}});\n\
         \t}}\n\
         \tfor (auto &thread : threads)\n\
         \t\tthread.join();\n\
         }}\n\n\
         }} // namespace parallelme\n\n\
         extern \"C\" JNIEXPORT jint JNICALL JNI_OnLoad(JavaVM *vm, void *reserved) {{\n\
         \treturn JNI_VERSION_1_6;\n\
         }}\n",
        header_comment()
    );
    vec![
        ("jni/ParallelMERuntime.hpp", header),
        ("jni/org_parallelme_ParallelMERuntime.cpp", bridge),
    ]
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

    #[test]
    fn test_jni_naming() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        assert_eq!(jni_class_name(&ctx), "org_sample_ImageOpsWrapperPM");
        assert_eq!(
            translation_unit_name(&ctx),
            "org_sample_ImageOpsWrapperPM.cpp"
        );
        assert_eq!(native_name("foreach1"), "nativeForeach1");
        assert_eq!(
            jni_function(&ctx, "foreach1"),
            "Java_org_sample_ImageOpsWrapperPM_nativeForeach1"
        );
    }

    #[test]
    fn test_translation_unit_foreach() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let image = variable("image", "BitmapImage", Modifier::None);
        let oab = OperationsAndBinds {
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
                external_variables: vec![variable("k", "float", Modifier::Final)],
                statement_range: TokenAddress::new(4, 5, 2, 1),
                execution: ExecutionType::Parallel,
            }],
            output_binds: vec![OutputBind {
                variable: image,
                destination: variable("bitmap", "Bitmap", Modifier::None),
                sequence_index: 1,
                statement_range: TokenAddress::new(6, 7, 3, 1),
                kind: OutputBindKind::Assignment,
            }],
        };
        let unit = translation_unit(&ctx, &oab, &[]).unwrap();
        assert!(unit.contains("#include \"ParallelMERuntime.hpp\""));
        assert!(unit.contains("Java_org_sample_ImageOpsWrapperPM_nativeInputBind1"));
        assert!(unit.contains("static float3 function1(float3 PM_in, uint32_t x, uint32_t y, float k)"));
        assert!(unit.contains("PM_in.s0 = PM_in.s0 * k;"));
        assert!(unit.contains("Java_org_sample_ImageOpsWrapperPM_nativeForeach1"));
        assert!(unit.contains("jlong PM_dataPointer, jfloat k"));
        assert!(unit.contains("PM_target[PM_i].a = 255;"));
    }

    #[test]
    fn test_sequential_externals_are_arrays_with_writeback() {
        let catalog = UserLibraryCatalog::new();
        let translator = DefaultCTranslator;
        let ctx = context(&catalog, &translator);
        let operation = Operation {
            variable: variable("image", "BitmapImage", Modifier::None),
            number: 1,
            kind: OperationKind::Foreach,
            user_function: UserFunction {
                code: "{ pixel.rgba.red = pixel.rgba.red * k; }".to_string(),
                arguments: vec![variable("pixel", "Pixel", Modifier::None)],
            },
            external_variables: vec![variable("k", "float", Modifier::None)],
            statement_range: TokenAddress::new(0, 1, 1, 1),
            execution: ExecutionType::Sequential,
        };
        let function = operation_function(&ctx, &operation).unwrap();
        assert!(function.contains("jfloatArray k"));
        assert!(function.contains("GetFloatArrayElements(k, nullptr)"));
        assert!(function.contains("ReleaseFloatArrayElements(k, PM_k, 0)"));
        let user = user_function(&ctx, &operation);
        assert!(user.contains("float *k"));
        assert!(user.contains("(*k)"));
    }

    #[test]
    fn test_android_mk_lists_units() {
        let mk = android_mk(&[
            "org_sample_ImageOpsWrapperPM.cpp".to_string(),
            "org_sample_ArrayOpsWrapperPM.cpp".to_string(),
        ]);
        assert!(mk.contains("LOCAL_MODULE := libParallelMEGenerated"));
        assert!(mk.contains("org_parallelme_ParallelMERuntime.cpp"));
        assert!(mk.contains("org_sample_ImageOpsWrapperPM.cpp"));
        assert!(mk.contains("org_sample_ArrayOpsWrapperPM.cpp"));
        assert!(mk.contains("-ljnigraphics"));
    }

    #[test]
    fn test_internal_library_files() {
        let files = internal_library();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "jni/ParallelMERuntime.hpp");
        assert!(files[0].1.contains("struct ImageData"));
        assert!(files[1].1.contains("JNI_OnLoad"));
    }
}
