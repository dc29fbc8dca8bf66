// End-to-end scenarios over the full pipeline: write a host source file,
// compile it into a temporary destination and inspect the generated
// artifacts and the rewritten source.

use parallelme_compiler::{CompilationError, CompilationSummary, Compiler};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Compiled {
    _input: TempDir,
    destination: TempDir,
    summary: CompilationSummary,
}

impl Compiled {
    fn read(&self, relative: &str) -> String {
        let path = self.destination.path().join(relative);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("missing generated file {}", path.display()))
    }

    fn exists(&self, relative: &str) -> bool {
        self.destination.path().join(relative).exists()
    }
}

fn compile(file_name: &str, source: &str) -> Compiled {
    let input = TempDir::new().expect("temp input dir");
    let destination = TempDir::new().expect("temp destination dir");
    let file = input.path().join(file_name);
    std::fs::write(&file, source).expect("write input source");
    let summary = Compiler::new(destination.path()).compile(&[file]);
    Compiled {
        _input: input,
        destination,
        summary,
    }
}

const FOREACH_FINAL: &str = "package org.sample;\n\
\n\
import org.parallelme.userlibrary.image.BitmapImage;\n\
\n\
public class ImageOps {\n\
\tpublic void run(Bitmap bitmap) {\n\
\t\tfinal float k = 1.5f;\n\
\t\tBitmapImage image = new BitmapImage(bitmap);\n\
\t\timage.foreach((Pixel pixel) -> {\n\
\t\t\tpixel.rgba.red = pixel.rgba.red * k;\n\
\t\t});\n\
\t\timage.toBitmap(bitmap);\n\
\t}\n\
}\n";

const FOREACH_NON_FINAL: &str = "package org.sample;\n\
\n\
public class ImageOps {\n\
\tpublic void run(Bitmap bitmap) {\n\
\t\tfloat k = 1.5f;\n\
\t\tBitmapImage image = new BitmapImage(bitmap);\n\
\t\timage.foreach((Pixel pixel) -> {\n\
\t\t\tpixel.rgba.red = pixel.rgba.red * k;\n\
\t\t});\n\
\t}\n\
}\n";

#[test]
fn test_s1_foreach_on_pixel_all_final() {
    let compiled = compile("ImageOps.java", FOREACH_FINAL);
    assert!(compiled.summary.is_success(), "{:?}", compiled.summary.failures);
    assert_eq!(compiled.summary.compiled_classes.len(), 1);

    // Parallel kernel with the substituted user body.
    let kernels = compiled.read("ImageOps.rs");
    assert!(kernels.contains("#pragma version(1)"));
    assert!(kernels.contains("#pragma rs java_package_name(org.sample)"));
    assert!(kernels.contains("PM_in.s0 = PM_in.s0 * k;"));
    assert!(kernels.contains("return PM_in;"));
    assert!(kernels.contains("float3 __attribute__((kernel)) foreach1"));

    // The external stays a scalar parameter.
    let interface = compiled.read("java/org/sample/ImageOpsWrapper.java");
    assert!(interface.contains("public void foreach1(float k);"));
    assert!(!interface.contains("float[] k"));
}

#[test]
fn test_s2_foreach_with_non_final_capture() {
    let compiled = compile("ImageOps.java", FOREACH_NON_FINAL);
    assert!(compiled.summary.is_success(), "{:?}", compiled.summary.failures);

    let interface = compiled.read("java/org/sample/ImageOpsWrapper.java");
    assert!(interface.contains("public void foreach1(float[] k);"));

    // The rewritten call site wraps the external into a one-element array
    // and reads it back afterwards.
    let rewritten = compiled.read("java/org/sample/ImageOps.java");
    assert!(rewritten.contains("float[] PM_k = new float[1];"));
    assert!(rewritten.contains("PM_k[0] = k;"));
    assert!(rewritten.contains("$parallelME.foreach1(PM_k);"));
    assert!(rewritten.contains("k = PM_k[0];"));

    // Sequential lowering: an invokable, not a kernel.
    let kernels = compiled.read("ImageOps.rs");
    assert!(kernels.contains("void foreach1()"));
    assert!(!kernels.contains("__attribute__((kernel)) foreach1"));
}

#[test]
fn test_s3_reduce_on_int_array() {
    let source = "package org.sample;\n\
\n\
public class ArrayOps {\n\
\tpublic void total(int[] data) {\n\
\t\tArray<Int32> numbers = new Array<Int32>(data);\n\
\t\tnumbers.reduce((Int32 a, Int32 b) -> {\n\
\t\t\treturn a + b;\n\
\t\t});\n\
\t}\n\
}\n";
    let compiled = compile("ArrayOps.java", source);
    assert!(compiled.summary.is_success(), "{:?}", compiled.summary.failures);

    let kernels = compiled.read("ArrayOps.rs");
    // Two stages: tile kernel plus a final invokable combining tile outputs
    // left to right with the user function.
    assert!(kernels.contains("int __attribute__((kernel)) reduce1_tile(uint32_t x)"));
    assert!(kernels.contains("void reduce1()"));
    assert!(kernels.contains("static int function1(int PM_in1, int PM_in2)"));
    assert!(kernels.contains("return PM_in1 + PM_in2;"));
    assert!(kernels.contains("PM_accumulator = function1(PM_accumulator, rsGetElementAt_int(PM_g1_tiles, PM_i));"));

    let cpp = compiled.read("jni/org_sample_ArrayOpsWrapperPM.cpp");
    assert!(cpp.contains("tileSizeFor"));
    assert!(cpp.contains("PM_accumulator = function1(PM_accumulator, PM_tiles[PM_i]);"));
}

#[test]
fn test_s4_filter_on_float_array() {
    let source = "package org.sample;\n\
\n\
public class FilterOps {\n\
\tpublic void positives(float[] data) {\n\
\t\tArray<Float32> values = new Array<Float32>(data);\n\
\t\tvalues.filter((Float32 x) -> {\n\
\t\t\treturn x.value > 0.5f;\n\
\t\t});\n\
\t\tvalues.toArray(data);\n\
\t}\n\
}\n";
    let compiled = compile("FilterOps.java", source);
    assert!(compiled.summary.is_success(), "{:?}", compiled.summary.failures);

    let kernels = compiled.read("FilterOps.rs");
    // Predicate/flag kernel plus order-preserving compaction.
    assert!(kernels.contains("int __attribute__((kernel)) filter1_tile(uint32_t x)"));
    assert!(kernels.contains("void filter1()"));
    assert!(kernels.contains("static bool function1(float PM_in)"));
    assert!(kernels.contains("return PM_in > 0.5f;"));
    assert!(kernels.contains("++PM_cursor;"));
    assert!(kernels.contains("rsSetElementAt_int(PM_g1_outputLength, PM_cursor, 0);"));
}

#[test]
fn test_s5_width_and_height_accessors() {
    let source = "package org.sample;\n\
\n\
public class SizeOps {\n\
\tpublic int area(Bitmap bitmap) {\n\
\t\tBitmapImage image = new BitmapImage(bitmap);\n\
\t\treturn image.getWidth() * image.getHeight();\n\
\t}\n\
}\n";
    let compiled = compile("SizeOps.java", source);
    assert!(compiled.summary.is_success(), "{:?}", compiled.summary.failures);

    // No kernels for accessors.
    let kernels = compiled.read("SizeOps.rs");
    assert!(!kernels.contains("getWidth"));
    assert!(!kernels.contains("getHeight"));

    // Both wrappers answer directly from the target's size metadata.
    let rs = compiled.read("java/org/sample/SizeOpsWrapperRS.java");
    assert!(rs.contains("public int getWidth1() {"));
    assert!(rs.contains("return $imageIn.getType().getX();"));
    assert!(rs.contains("return $imageIn.getType().getY();"));
    let pm = compiled.read("java/org/sample/SizeOpsWrapperPM.java");
    assert!(pm.contains("return nativeGetWidth1($imagePtr);"));

    let rewritten = compiled.read("java/org/sample/SizeOps.java");
    assert!(rewritten.contains("$parallelME.getWidth1() * $parallelME.getHeight2()"));
}

#[test]
fn test_s6_unsupported_method() {
    let source = "package org.sample;\n\
\n\
public class BrokenOps {\n\
\tpublic void run(Bitmap bitmap) {\n\
\t\tBitmapImage image = new BitmapImage(bitmap);\n\
\t\timage.map((Pixel pixel) -> {\n\
\t\t\tpixel.rgba.red = 0f;\n\
\t\t});\n\
\t}\n\
}\n";
    let compiled = compile("BrokenOps.java", source);
    assert!(!compiled.summary.is_success());
    assert!(compiled.summary.compiled_classes.is_empty());
    let (_, failure) = &compiled.summary.failures[0];
    match failure {
        CompilationError::UnsupportedMethod { method, target } => {
            assert_eq!(method, "map");
            assert_eq!(target, "RenderScript");
        }
        other => panic!("expected UnsupportedMethod, got {:?}", other),
    }
    // The message names both the method and the target.
    let message = failure.to_string();
    assert!(message.contains("map"));
    assert!(message.contains("RenderScript"));
}

#[test]
fn test_rewritten_host_delegates_to_wrapper() {
    let compiled = compile("ImageOps.java", FOREACH_FINAL);
    let rewritten = compiled.read("java/org/sample/ImageOps.java");

    // Imports and the runtime-selector constructor are inserted.
    assert!(rewritten.contains("import android.support.v8.renderscript.*;"));
    assert!(rewritten.contains("private ImageOpsWrapper $parallelME;"));
    assert!(rewritten.contains("this.$parallelME = new ImageOpsWrapperPM();"));
    assert!(rewritten.contains("if (!this.$parallelME.isValid())"));
    assert!(rewritten.contains("this.$parallelME = new ImageOpsWrapperRS(PM_mRS);"));

    // The bind declaration is gone, the creation delegates.
    assert!(!rewritten.contains("BitmapImage image ="));
    assert!(rewritten.contains("$parallelME.inputBind1(bitmap);"));
    assert!(rewritten.contains("$parallelME.foreach1(k);"));
    assert!(rewritten.contains("$parallelME.outputBind1(bitmap);"));

    // Untouched statements survive verbatim.
    assert!(rewritten.contains("final float k = 1.5f;"));
}

#[test]
fn test_shared_artifacts_once_per_compilation() {
    let compiled = compile("ImageOps.java", FOREACH_FINAL);

    let android_mk = compiled.read("jni/Android.mk");
    assert!(android_mk.contains("LOCAL_MODULE := libParallelMEGenerated"));
    assert!(android_mk.contains("org_parallelme_ParallelMERuntime.cpp"));
    assert!(android_mk.contains("org_sample_ImageOpsWrapperPM.cpp"));

    assert!(compiled.exists("jni/ParallelMERuntime.hpp"));
    assert!(compiled.exists("jni/org_parallelme_ParallelMERuntime.cpp"));
    assert!(compiled.exists("java/org/parallelme/common/ParallelMEValidation.java"));
    assert!(compiled.exists("jni/org_sample_ImageOpsWrapperPM.cpp"));
}

fn snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    let mut files: Vec<(PathBuf, String)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let path = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let contents = std::fs::read_to_string(entry.path()).unwrap();
            (path, contents)
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_pipeline_is_deterministic() {
    let first = compile("ImageOps.java", FOREACH_FINAL);
    let second = compile("ImageOps.java", FOREACH_FINAL);
    assert_eq!(
        snapshot(first.destination.path()),
        snapshot(second.destination.path())
    );
}
