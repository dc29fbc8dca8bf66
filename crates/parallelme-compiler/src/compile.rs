//! Compilation orchestrator.
//!
//! Drives the full pipeline per input file: read, lex, parse, first pass;
//! then per class: second pass, wrapper interface and implementations,
//! kernel files for both targets, and the token-level rewrite of the host
//! source. Once per compilation it emits `Android.mk` and the shared runtime
//! helpers of each target.
//!
//! A file with no user-library references produces no artifacts. A fatal
//! error is recorded against its file and compilation continues with the
//! remaining files.

use crate::catalog::UserLibraryCatalog;
use crate::codegen::{self, wrapper, EmitContext, TargetRuntime};
use crate::collect;
use crate::ctrans::{CTranslator, DefaultCTranslator};
use crate::error::{CompilationError, CompilationResult};
use crate::extract::{self, ClassExtraction};
use crate::rewrite::TokenRewriter;
use parallelme_syntax::{parse, TokenStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Outcome of one compilation run.
#[derive(Debug, Default)]
pub struct CompilationSummary {
    /// `(package, class)` pairs that produced artifacts
    pub compiled_classes: Vec<(String, String)>,
    /// Files that failed, with their error
    pub failures: Vec<(PathBuf, CompilationError)>,
}

impl CompilationSummary {
    /// Whether every file compiled.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The ParallelME source-to-source compiler.
pub struct Compiler {
    destination: PathBuf,
    catalog: UserLibraryCatalog,
    c_translator: Box<dyn CTranslator>,
}

impl Compiler {
    /// Create a compiler writing artifacts under `destination`.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            catalog: UserLibraryCatalog::new(),
            c_translator: Box::new(DefaultCTranslator),
        }
    }

    /// Replace the host-to-C expression translator collaborator.
    pub fn with_c_translator(mut self, translator: Box<dyn CTranslator>) -> Self {
        self.c_translator = translator;
        self
    }

    /// Compile a set of input files or directories.
    pub fn compile(&self, inputs: &[PathBuf]) -> CompilationSummary {
        let mut summary = CompilationSummary::default();
        for file in discover_files(inputs) {
            info!("compiling {}", file.display());
            match self.compile_file(&file) {
                Ok(classes) => summary.compiled_classes.extend(classes),
                Err(error) => summary.failures.push((file, error)),
            }
        }
        if !summary.compiled_classes.is_empty() {
            if let Err(error) = self.finish(&summary.compiled_classes) {
                summary.failures.push((self.destination.clone(), error));
            }
        }
        summary
    }

    /// Run the whole pipeline for one file.
    fn compile_file(&self, file: &Path) -> CompilationResult<Vec<(String, String)>> {
        let source = std::fs::read_to_string(file).map_err(|source| {
            CompilationError::GenerationIo {
                path: file.to_path_buf(),
                source,
            }
        })?;
        let stream = TokenStream::lex(&source)?;
        let unit = parse(&stream)?;
        let table = collect::run(&self.catalog, &unit, &stream)?;

        let mut compiled = Vec::new();
        let mut rewriter = TokenRewriter::new(&stream);
        for class_index in 0..unit.classes.len() {
            let extraction = extract::run(&self.catalog, &unit, &stream, &table, class_index)?;
            if extraction.operations_and_binds.is_empty() && extraction.method_calls.is_empty() {
                debug!(
                    "no user-library references in class {}",
                    extraction.class_name
                );
                continue;
            }
            self.translate_class(&extraction, &mut rewriter)?;
            compiled.push((extraction.package_name.clone(), extraction.class_name.clone()));
        }

        // Write the rewritten host source once per translated class, the
        // same content under each class name.
        let rewritten = if compiled.is_empty() {
            None
        } else {
            Some(rewriter.render())
        };
        if let Some(rewritten) = rewritten {
            for (package, class) in &compiled {
                self.write_file(
                    &self.java_destination(package),
                    &format!("{}.java", class),
                    &rewritten,
                )?;
            }
        }
        Ok(compiled)
    }

    /// Emit every artifact of one class and queue its host-source edits.
    fn translate_class(
        &self,
        extraction: &ClassExtraction,
        rewriter: &mut TokenRewriter<'_>,
    ) -> CompilationResult<()> {
        let ctx = EmitContext {
            catalog: &self.catalog,
            c_translator: self.c_translator.as_ref(),
            package_name: &extraction.package_name,
            class_name: &extraction.class_name,
        };
        let oab = &extraction.operations_and_binds;
        let calls = &extraction.method_calls;
        let java_folder = self.java_destination(&extraction.package_name);

        // 1. Back-end-neutral wrapper interface.
        self.write_file(
            &java_folder,
            &format!("{}.java", codegen::wrapper_interface_name(&extraction.class_name)),
            &wrapper::interface_source(&ctx, oab, calls),
        )?;
        // 2. One implementation class per target runtime.
        for target in [TargetRuntime::RenderScript, TargetRuntime::ParallelME] {
            self.write_file(
                &java_folder,
                &format!(
                    "{}.java",
                    codegen::wrapper_class_name(&extraction.class_name, target)
                ),
                &wrapper::implementation_source(&ctx, target, oab, calls),
            )?;
        }
        // 3. Kernel files.
        self.write_file(
            &self.destination,
            &format!("{}.rs", extraction.class_name),
            &codegen::renderscript::kernel_file(&ctx, oab)?,
        )?;
        self.write_file(
            &self.jni_destination(),
            &codegen::runtime::translation_unit_name(&ctx),
            &codegen::runtime::translation_unit(&ctx, oab, calls)?,
        )?;
        // 4. Host-source edits.
        self.rewrite_host(&ctx, extraction, rewriter);
        Ok(())
    }

    /// Queue the token edits that retarget the host class at the wrapper.
    fn rewrite_host(
        &self,
        ctx: &EmitContext<'_>,
        extraction: &ClassExtraction,
        rewriter: &mut TokenRewriter<'_>,
    ) {
        let mut imports = String::new();
        for import in codegen::renderscript::host_imports() {
            imports.push_str(&format!("import {};\n", import));
        }
        imports.push('\n');
        rewriter.insert_before(extraction.class_address.start, imports);
        rewriter.insert_after(
            extraction.class_body.start,
            wrapper::host_initialization(ctx),
        );
        for bind in &extraction.operations_and_binds.input_binds {
            rewriter.delete(bind.declaration_range);
            rewriter.replace(bind.creation_range, wrapper::host_input_bind_call(bind));
        }
        for operation in &extraction.operations_and_binds.operations {
            rewriter.replace(
                operation.statement_range,
                wrapper::host_operation_call(operation),
            );
        }
        for bind in &extraction.operations_and_binds.output_binds {
            rewriter.replace(bind.statement_range, wrapper::host_output_bind_call(bind));
        }
        for call in &extraction.method_calls {
            rewriter.replace(call.expression_range, wrapper::host_method_call(call));
        }
    }

    /// Per-compilation artifacts: `Android.mk` and the targets' shared
    /// runtime helpers.
    fn finish(&self, compiled_classes: &[(String, String)]) -> CompilationResult<()> {
        let units: Vec<String> = compiled_classes
            .iter()
            .map(|(package, class)| {
                let ctx = EmitContext {
                    catalog: &self.catalog,
                    c_translator: self.c_translator.as_ref(),
                    package_name: package,
                    class_name: class,
                };
                codegen::runtime::translation_unit_name(&ctx)
            })
            .collect();
        self.write_file(
            &self.jni_destination(),
            "Android.mk",
            &codegen::runtime::android_mk(&units),
        )?;
        for (relative, contents) in codegen::renderscript::internal_library()
            .into_iter()
            .chain(codegen::runtime::internal_library())
        {
            let path = self.destination.join(relative);
            let folder = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.destination.clone());
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.write_file(&folder, &name, &contents)?;
        }
        Ok(())
    }

    fn java_destination(&self, package: &str) -> PathBuf {
        let mut folder = self.destination.join("java");
        for part in package.split('.').filter(|part| !part.is_empty()) {
            folder = folder.join(part);
        }
        folder
    }

    fn jni_destination(&self) -> PathBuf {
        self.destination.join("jni")
    }

    /// Create the folder structure and write one generated file.
    fn write_file(&self, folder: &Path, name: &str, contents: &str) -> CompilationResult<()> {
        let path = folder.join(name);
        std::fs::create_dir_all(folder).map_err(|source| CompilationError::GenerationIo {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, contents).map_err(|source| CompilationError::GenerationIo {
            path: path.clone(),
            source,
        })?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Expand directories into their `.java` files (sorted for determinism);
/// plain files pass through in argument order.
fn discover_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry.path().extension().map_or(false, |ext| ext == "java")
                })
                .map(|entry| entry.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_files_sorts_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("B.java"), "class B { }").unwrap();
        std::fs::write(dir.path().join("A.java"), "class A { }").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        let files = discover_files(&[dir.path().to_path_buf()]);
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.java", "B.java"]);
    }

    #[test]
    fn test_java_destination_layout() {
        let compiler = Compiler::new("/tmp/out");
        assert_eq!(
            compiler.java_destination("org.sample"),
            PathBuf::from("/tmp/out/java/org/sample")
        );
        assert_eq!(compiler.java_destination(""), PathBuf::from("/tmp/out/java"));
    }
}
