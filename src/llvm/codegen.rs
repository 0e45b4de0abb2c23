// This module holds the per-session code generation context. CodegenCx ties together the LLVM
// context, the output module, the single shared IR builder (whose insertion point is the
// session's cursor), the type map, the memoized runtime symbol registry and the package's
// function table. lower_package declares every package function under its qualified name
// first, so bodies can reference functions declared later, then lowers each body. Package
// initializers are named <path>.init.<n>, recorded in declaration order and emitted as an
// appending runtime.ctors array in reverse order, which the runtime walks back to front.
// With debug info requested, lower_package also records one compile unit per source file in
// a sink that emit_debug_info flushes into the module.

//! Session-wide code generation context.

use crate::core::config::CompilerOptions;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::frontend::ast::{Package, Signature};
use crate::llvm::debug::{emit_compile_units, CompileUnitRecord};
use crate::llvm::lower::lower_function;
use crate::llvm::runtime::{RuntimeFn, SymbolRegistry};
use crate::llvm::types::TypeMap;
use hashbrown::HashMap;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::TargetData;
use inkwell::types::FunctionType;
use inkwell::values::{FunctionValue, GlobalValue, PointerValue};

/// Name of the appending array holding package initializers.
pub const CTORS_SYMBOL: &str = "runtime.ctors";

/// Package-level function known to the code generator.
#[derive(Debug, Clone)]
pub struct PackageFn<'ctx> {
    pub value: FunctionValue<'ctx>,
    pub signature: Signature,
}

pub struct CodegenCx<'ctx, 's> {
    context: &'ctx Context,
    module: &'s Module<'ctx>,
    builder: &'s Builder<'ctx>,
    types: TypeMap<'ctx>,
    symbols: SymbolRegistry<'ctx, 's>,
    session: &'s CompilationSession<'s>,
    options: &'s CompilerOptions,
    package_path: String,
    functions: HashMap<String, PackageFn<'ctx>>,
    initializers: Vec<FunctionValue<'ctx>>,
    debug_units: Vec<CompileUnitRecord>,
    synthesized: usize,
}

impl<'ctx, 's> CodegenCx<'ctx, 's> {
    pub fn new(
        context: &'ctx Context,
        module: &'s Module<'ctx>,
        builder: &'s Builder<'ctx>,
        target_data: &TargetData,
        session: &'s CompilationSession<'s>,
        options: &'s CompilerOptions,
        package_path: &str,
    ) -> Self {
        Self {
            context,
            module,
            builder,
            types: TypeMap::new(context, target_data),
            symbols: SymbolRegistry::new(session),
            session,
            options,
            package_path: package_path.to_string(),
            functions: HashMap::new(),
            initializers: Vec::new(),
            debug_units: Vec::new(),
            synthesized: 0,
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn module(&self) -> &'s Module<'ctx> {
        self.module
    }

    /// The session cursor. Take an [`crate::llvm::cursor::InsertionGuard`]
    /// before moving it away from the block being built.
    pub fn builder(&self) -> &'s Builder<'ctx> {
        self.builder
    }

    pub fn types(&self) -> &TypeMap<'ctx> {
        &self.types
    }

    pub fn session(&self) -> &'s CompilationSession<'s> {
        self.session
    }

    pub fn options(&self) -> &'s CompilerOptions {
        self.options
    }

    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Declaration of a runtime routine, memoized by name.
    pub fn runtime(&mut self, routine: RuntimeFn) -> CompileResult<FunctionValue<'ctx>> {
        self.symbols.runtime(self.module, &self.types, routine)
    }

    /// Declaration of an arbitrary symbol, memoized by name.
    pub fn declare(
        &mut self,
        name: &str,
        ty: FunctionType<'ctx>,
    ) -> CompileResult<FunctionValue<'ctx>> {
        self.symbols.declare(self.module, name, ty)
    }

    pub fn symbols(&self) -> &SymbolRegistry<'ctx, 's> {
        &self.symbols
    }

    /// `<package path>.<name>`.
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.package_path, name)
    }

    /// Package function by unqualified name.
    pub fn function(&self, name: &str) -> Option<&PackageFn<'ctx>> {
        self.functions.get(name)
    }

    /// Unique name for a function synthesized inside `parent`.
    pub fn fresh_name(&mut self, parent: &str, kind: &str) -> String {
        self.synthesized += 1;
        format!("{}${}{}", parent, kind, self.synthesized)
    }

    /// Add a function declaration for `signature` under `name`.
    pub fn add_function(
        &self,
        name: &str,
        signature: &Signature,
        linkage: Option<Linkage>,
    ) -> FunctionValue<'ctx> {
        self.module
            .add_function(name, self.types.function(signature), linkage)
    }

    /// Declare then lower every function of `package`.
    pub fn lower_package(&mut self, package: &Package) -> CompileResult<()> {
        if self.options.generate_debug {
            self.debug_units.extend(
                package
                    .files
                    .iter()
                    .map(|file| CompileUnitRecord::new(file, &package.path)),
            );
        }

        let mut declared = Vec::with_capacity(package.funcs.len());
        for decl in &package.funcs {
            let signature = decl.func.signature();
            let value = if decl.is_init() {
                if !signature.params.is_empty() || !signature.results.is_empty() {
                    return Err(CompileError::internal(format!(
                        "initializer in {} must be niladic",
                        package.path
                    )));
                }
                let name = self.qualified(&format!("init.{}", self.initializers.len()));
                let value = self.add_function(&name, &signature, None);
                self.initializers.push(value);
                value
            } else {
                let value = self.add_function(&self.qualified(&decl.name), &signature, None);
                self.functions.insert(
                    decl.name.clone(),
                    PackageFn {
                        value,
                        signature,
                    },
                );
                value
            };
            declared.push((value, decl));
        }

        for (value, decl) in declared {
            let name = value.get_name().to_string_lossy().into_owned();
            lower_function(self, value, &name, &decl.func, None)?;
        }
        Ok(())
    }

    /// Initializers registered so far, in declaration order.
    pub fn initializers(&self) -> &[FunctionValue<'ctx>] {
        &self.initializers
    }

    /// Compile units recorded so far, in source file order.
    pub fn debug_units(&self) -> &[CompileUnitRecord] {
        &self.debug_units
    }

    /// Emit the recorded compile units. Returns how many were emitted.
    pub fn emit_debug_info(&self) -> usize {
        emit_compile_units(self.context, self.module, &self.debug_units)
    }

    /// Emit `runtime.ctors` holding the initializers in reverse order.
    pub fn emit_initializers(&self) -> Option<GlobalValue<'ctx>> {
        if self.initializers.is_empty() {
            return None;
        }
        let ptr = self.types.ptr();
        let ctors: Vec<PointerValue<'ctx>> = self
            .initializers
            .iter()
            .rev()
            .map(|f| f.as_global_value().as_pointer_value())
            .collect();
        let array = ptr.const_array(&ctors);
        let global = self.module.add_global(
            ptr.array_type(ctors.len() as u32),
            None,
            CTORS_SYMBOL,
        );
        global.set_initializer(&array);
        global.set_linkage(Linkage::Appending);
        log::debug!("Registered {} initializers in {}", ctors.len(), CTORS_SYMBOL);
        Some(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::FuncDecl;
    use crate::llvm::target::TargetSpec;
    use bumpalo::Bump;

    fn package() -> Package {
        Package {
            name: "util".to_string(),
            path: "example.com/util".to_string(),
            files: vec!["util.src".to_string(), "internal/strings.src".to_string()],
            funcs: vec![FuncDecl::procedure("helper", vec![])],
        }
    }

    #[test]
    fn test_debug_units_follow_option() {
        let context = Context::create();
        let target = TargetSpec::resolve("x86_64-unknown-linux-gnu").unwrap();
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let builder = context.create_builder();

        let plain = CompilerOptions::new("x86_64-unknown-linux-gnu");
        let module = context.create_module("plain");
        let mut cx = CodegenCx::new(
            &context,
            &module,
            &builder,
            target.target_data(),
            &session,
            &plain,
            "example.com/util",
        );
        cx.lower_package(&package()).unwrap();
        assert!(cx.debug_units().is_empty());
        assert_eq!(cx.emit_debug_info(), 0);
        drop(cx);

        let debug = plain.clone().with_debug_info(true);
        let module = context.create_module("debug");
        let mut cx = CodegenCx::new(
            &context,
            &module,
            &builder,
            target.target_data(),
            &session,
            &debug,
            "example.com/util",
        );
        cx.lower_package(&package()).unwrap();
        let units = cx.debug_units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].file, "strings.src");
        assert_eq!(units[1].directory, "internal");
        assert_eq!(units[1].package, "example.com/util");
        assert_eq!(cx.emit_debug_info(), 2);
        assert!(module.verify().is_ok());
    }
}
