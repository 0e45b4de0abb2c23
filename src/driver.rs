// This module implements the program driver. Compiler::compile resolves the target first and
// fails before touching the front end when the triple is unusable. It then parses and type
// checks the named files through the Frontend collaborator, applies the import path rule,
// creates an output module bound to the target's triple and data layout and lowers every
// function into it. A root unit (import path "main") gets a synthesized native entry point;
// any other unit is handed to the exporter. The output module sits inside a ModuleGuard until
// compilation succeeds, so every early return and every panic disposes it before the failure
// surfaces. Each call builds its own arena, session, builder and symbol registry; nothing is
// shared between calls.

//! Compilation driver and owned output module.

use crate::core::config::CompilerOptions;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::frontend::ast::Package;
use crate::frontend::Frontend;
use crate::llvm::codegen::CodegenCx;
use crate::llvm::entry::create_main_function;
use crate::llvm::target::TargetSpec;
use bumpalo::Bump;
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use std::cell::Cell;
use std::fmt;

/// Import path of the program root.
pub const ROOT_IMPORT_PATH: &str = "main";

/// Output of a successful compilation.
///
/// Disposal is idempotent: after the first [`Module::dispose`] the wrapper
/// is empty and further calls do nothing.
pub struct Module<'ctx> {
    inner: Option<LlvmModule<'ctx>>,
    name: String,
}

impl<'ctx> Module<'ctx> {
    fn new(inner: LlvmModule<'ctx>) -> Self {
        let name = inner.get_name().to_string_lossy().into_owned();
        Self {
            inner: Some(inner),
            name,
        }
    }

    /// Release the backend module. Returns whether anything was released.
    pub fn dispose(&mut self) -> bool {
        match self.inner.take() {
            Some(module) => {
                drop(module);
                log::debug!("Disposed module {}", self.name);
                true
            }
            None => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_llvm(&self) -> Option<&LlvmModule<'ctx>> {
        self.inner.as_ref()
    }

    pub fn into_llvm(mut self) -> Option<LlvmModule<'ctx>> {
        self.inner.take()
    }

    /// Textual IR, or `None` once disposed.
    pub fn print_to_string(&self) -> Option<String> {
        self.inner
            .as_ref()
            .map(|module| module.print_to_string().to_string())
    }
}

impl fmt::Debug for Module<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

thread_local! {
    static FAILED_DISPOSALS: Cell<usize> = const { Cell::new(0) };
}

/// Number of modules this thread's [`ModuleGuard`]s disposed because
/// compilation did not complete.
pub fn failed_disposals() -> usize {
    FAILED_DISPOSALS.with(Cell::get)
}

/// Disposes the wrapped module on drop unless [`ModuleGuard::defuse`] ran.
pub struct ModuleGuard<'ctx> {
    module: Option<Module<'ctx>>,
}

impl<'ctx> ModuleGuard<'ctx> {
    pub fn new(module: LlvmModule<'ctx>) -> Self {
        Self {
            module: Some(Module::new(module)),
        }
    }

    pub fn module(&self) -> Option<&LlvmModule<'ctx>> {
        self.module.as_ref().and_then(Module::as_llvm)
    }

    /// Hand the module to the caller undisposed.
    pub fn defuse(mut self) -> Option<Module<'ctx>> {
        self.module.take()
    }

    /// Dispose the guarded module now. Returns whether one was disposed;
    /// a defused or already released guard returns `false`.
    pub fn release(&mut self) -> bool {
        let Some(mut module) = self.module.take() else {
            return false;
        };
        log::warn!("Compilation of {} failed, disposing module", module.name());
        let disposed = module.dispose();
        if disposed {
            FAILED_DISPOSALS.with(|count| count.set(count.get() + 1));
        }
        disposed
    }
}

impl Drop for ModuleGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whole-unit compiler over a front end.
pub struct Compiler<F> {
    options: CompilerOptions,
    frontend: F,
}

impl<F: Frontend> Compiler<F> {
    pub fn new(options: CompilerOptions, frontend: F) -> Self {
        Self { options, frontend }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    /// Compile the named source files as the package at `import_path`.
    pub fn compile<'ctx, S: AsRef<str>>(
        &self,
        context: &'ctx Context,
        filenames: &[S],
        import_path: &str,
    ) -> CompileResult<Module<'ctx>> {
        let target = TargetSpec::resolve(&self.options.target_triple)?;

        let names: Vec<&str> = filenames.iter().map(AsRef::as_ref).collect();
        let files = self.frontend.parse_files(&names)?;
        let Some(first) = files.first() else {
            return Err(CompileError::Frontend("no source files".into()));
        };
        let import_path = effective_import_path(import_path, &first.package);
        let package = self.frontend.check_package(&import_path, files)?;

        let guard = ModuleGuard::new(context.create_module(&package.path));
        let module = guard
            .module()
            .ok_or_else(|| CompileError::internal("output module missing"))?;
        target.configure_module(module);

        self.lower(context, module, &target, &package)?;

        if self.options.verify_module {
            module.verify().map_err(|message| CompileError::Verification {
                reason: message.to_string(),
            })?;
        }

        guard
            .defuse()
            .ok_or_else(|| CompileError::internal("output module missing"))
    }

    fn lower<'ctx>(
        &self,
        context: &'ctx Context,
        module: &LlvmModule<'ctx>,
        target: &TargetSpec,
        package: &Package,
    ) -> CompileResult<()> {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let builder = context.create_builder();
        let mut cx = CodegenCx::new(
            context,
            module,
            &builder,
            target.target_data(),
            &session,
            &self.options,
            &package.path,
        );

        cx.lower_package(package)?;
        cx.emit_initializers();
        cx.emit_debug_info();

        if is_root(&package.path) {
            create_main_function(&mut cx, target.rewritten_from_alias())?;
        } else {
            self.frontend.export_package(package)?;
        }

        log::info!("Compiled {} for {}: {}", package.path, target.triple(), session.stats());
        Ok(())
    }
}

/// Import path after defaulting an empty path and the `main` package.
pub fn effective_import_path(import_path: &str, package_name: &str) -> String {
    if import_path.is_empty() || package_name == ROOT_IMPORT_PATH {
        package_name.to_string()
    } else {
        import_path.to_string()
    }
}

/// Whether the unit at `import_path` is the program root.
pub fn is_root(import_path: &str) -> bool {
    import_path == ROOT_IMPORT_PATH
}
