// This module owns the session's registry of runtime-support declarations. Generated code
// calls a handful of routines it does not define: runtime.pushdefer and runtime.rundefers
// for the defer stack, runtime.go for spawned calls, runtime.main for process bring-up, and
// the C++ personality routine referenced by landing pads. Declarations are memoized by name:
// the first request adds (or adopts an existing) declaration to the module, later requests
// return the identical FunctionValue, and asking for a name under a different signature is an
// internal error. Keys are interned in the session arena.

//! Memoized runtime symbol declarations.

use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::llvm::types::TypeMap;
use hashbrown::HashMap;
use inkwell::module::{Linkage, Module};
use inkwell::types::FunctionType;
use inkwell::values::FunctionValue;

/// Runtime routines the generated code refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    /// `void (closure, ptr anchor)`: push onto the anchor's LIFO list.
    PushDefer,
    /// `void (int anchor_value)`: run registered calls, newest first.
    RunDefers,
    /// `void (closure)`: start the call on a new execution unit.
    Go,
    /// `i32 (i32 argc, ptr argv, ptr envp, ptr entry)`.
    Main,
    /// `i32 (...)`: personality for landing pads, never called directly.
    Personality,
}

impl RuntimeFn {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::PushDefer => "runtime.pushdefer",
            RuntimeFn::RunDefers => "runtime.rundefers",
            RuntimeFn::Go => "runtime.go",
            RuntimeFn::Main => "runtime.main",
            RuntimeFn::Personality => "__gxx_personality_v0",
        }
    }

    pub fn fn_type<'ctx>(self, types: &TypeMap<'ctx>) -> FunctionType<'ctx> {
        let void = types.context().void_type();
        match self {
            RuntimeFn::PushDefer => void.fn_type(&[types.closure().into(), types.ptr().into()], false),
            RuntimeFn::RunDefers => void.fn_type(&[types.int().into()], false),
            RuntimeFn::Go => void.fn_type(&[types.closure().into()], false),
            RuntimeFn::Main => types.int32().fn_type(
                &[
                    types.int32().into(),
                    types.ptr().into(),
                    types.ptr().into(),
                    types.ptr().into(),
                ],
                false,
            ),
            RuntimeFn::Personality => types.int32().fn_type(&[], true),
        }
    }
}

/// Name-keyed cache of function declarations for one session.
pub struct SymbolRegistry<'ctx, 's> {
    session: &'s CompilationSession<'s>,
    decls: HashMap<&'s str, FunctionValue<'ctx>>,
}

impl<'ctx, 's> SymbolRegistry<'ctx, 's> {
    pub fn new(session: &'s CompilationSession<'s>) -> Self {
        Self {
            session,
            decls: HashMap::new(),
        }
    }

    /// Declare `name` with type `ty`, or return the earlier declaration.
    pub fn declare(
        &mut self,
        module: &Module<'ctx>,
        name: &str,
        ty: FunctionType<'ctx>,
    ) -> CompileResult<FunctionValue<'ctx>> {
        let key = self.session.intern_str(name);
        let function = match self.decls.get(key) {
            Some(&function) => function,
            None => {
                let function = match module.get_function(name) {
                    Some(existing) => existing,
                    None => {
                        self.session.record_runtime_declaration(name);
                        module.add_function(name, ty, Some(Linkage::External))
                    }
                };
                self.decls.insert(key, function);
                function
            }
        };

        if function.get_type() != ty {
            return Err(CompileError::SymbolConflict {
                name: name.to_string(),
            });
        }
        Ok(function)
    }

    pub fn runtime(
        &mut self,
        module: &Module<'ctx>,
        types: &TypeMap<'ctx>,
        routine: RuntimeFn,
    ) -> CompileResult<FunctionValue<'ctx>> {
        self.declare(module, routine.name(), routine.fn_type(types))
    }

    /// Number of distinct names requested so far.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llvm::target::TargetSpec;
    use bumpalo::Bump;
    use inkwell::context::Context;

    #[test]
    fn test_same_name_same_declaration() {
        let context = Context::create();
        let module = context.create_module("registry");
        let spec = TargetSpec::resolve("x86_64-unknown-linux-gnu").unwrap();
        let types = TypeMap::new(&context, spec.target_data());
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut registry = SymbolRegistry::new(&session);

        let first = registry
            .runtime(&module, &types, RuntimeFn::RunDefers)
            .unwrap();
        let second = registry
            .runtime(&module, &types, RuntimeFn::RunDefers)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(session.stats().runtime_declarations, 1);
        assert_eq!(module.get_functions().count(), 1);
    }

    #[test]
    fn test_existing_module_function_is_adopted() {
        let context = Context::create();
        let module = context.create_module("registry");
        let spec = TargetSpec::resolve("x86_64-unknown-linux-gnu").unwrap();
        let types = TypeMap::new(&context, spec.target_data());
        let ty = RuntimeFn::Personality.fn_type(&types);
        let existing = module.add_function(RuntimeFn::Personality.name(), ty, None);

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut registry = SymbolRegistry::new(&session);
        let found = registry
            .runtime(&module, &types, RuntimeFn::Personality)
            .unwrap();

        assert_eq!(found, existing);
        assert_eq!(session.stats().runtime_declarations, 0);
    }

    #[test]
    fn test_conflicting_signature_is_rejected() {
        let context = Context::create();
        let module = context.create_module("registry");
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut registry = SymbolRegistry::new(&session);

        let void_fn = context.void_type().fn_type(&[], false);
        let int_fn = context.i32_type().fn_type(&[], false);
        registry.declare(&module, "runtime.thing", void_fn).unwrap();
        let err = registry.declare(&module, "runtime.thing", int_fn).unwrap_err();

        assert!(matches!(err, CompileError::SymbolConflict { ref name } if name == "runtime.thing"));
        assert!(err.is_internal());
    }
}
