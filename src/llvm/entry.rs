// This module synthesizes the native program entry point for the root package. The process
// entry `main(argc, argv, envp)` is a thin wrapper: it passes its three arguments unchanged,
// together with the user entry function main.main bit-cast to the runtime's parameter type,
// to runtime.main, and returns runtime.main's result as the exit status. Both declarations go
// through the session's memoized registry. build_entry_shim produces a standalone module with
// only this wrapper and an external main.main, for programs whose entry package was compiled
// separately.

//! Native entry point synthesis.

use crate::core::config::CompilerOptions;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::frontend::ast::Signature;
use crate::llvm::codegen::CodegenCx;
use crate::llvm::cursor::InsertionGuard;
use crate::llvm::runtime::RuntimeFn;
use crate::llvm::target::TargetSpec;
use bumpalo::Bump;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue};

/// User entry function of the root package.
pub const ENTRY_SYMBOL: &str = "main.main";

/// Process entry point called by the C startup code.
pub const NATIVE_ENTRY_SYMBOL: &str = "main";

/// Build `main` around the module's `main.main`.
pub fn create_main_function<'ctx>(
    cx: &mut CodegenCx<'ctx, '_>,
    sandboxed: bool,
) -> CompileResult<FunctionValue<'ctx>> {
    let user_main = cx
        .module()
        .get_function(ENTRY_SYMBOL)
        .ok_or_else(|| CompileError::MissingEntry {
            symbol: ENTRY_SYMBOL.to_string(),
        })?;
    if user_main.count_params() != 0 || user_main.get_type().get_return_type().is_some() {
        return Err(CompileError::InvalidEntry {
            symbol: ENTRY_SYMBOL.to_string(),
        });
    }
    if sandboxed {
        log::warn!("Sandboxed entry variants are not synthesized; emitting the native entry point");
    }

    let runtime_main = cx.runtime(RuntimeFn::Main)?;
    let types = cx.types();
    let main_ty = types.int32().fn_type(
        &[types.int32().into(), types.ptr().into(), types.ptr().into()],
        false,
    );
    let main = cx.declare(NATIVE_ENTRY_SYMBOL, main_ty)?;
    if main.count_basic_blocks() != 0 {
        return Err(CompileError::internal(format!(
            "{} is already defined",
            NATIVE_ENTRY_SYMBOL
        )));
    }

    let builder = cx.builder();
    let _cursor = InsertionGuard::new(builder);
    let entry = cx.context().append_basic_block(main, "entry");
    builder.position_at_end(entry);

    let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(4);
    for (index, name) in ["argc", "argv", "envp"].into_iter().enumerate() {
        let param = main.get_nth_param(index as u32).ok_or_else(|| {
            CompileError::internal(format!("{} has no parameter {}", NATIVE_ENTRY_SYMBOL, name))
        })?;
        param.set_name(name);
        args.push(param.into());
    }

    let entry_param_ty = runtime_main
        .get_nth_param(3)
        .ok_or_else(|| {
            CompileError::internal(format!("{} takes no entry function", RuntimeFn::Main.name()))
        })?
        .get_type();
    let entry_fn = builder.build_bit_cast(
        user_main.as_global_value().as_pointer_value(),
        entry_param_ty,
        "",
    )?;
    args.push(entry_fn.into());

    let status = builder
        .build_call(runtime_main, &args, "status")?
        .try_as_basic_value()
        .left()
        .ok_or_else(|| {
            CompileError::internal(format!("{} returned no status", RuntimeFn::Main.name()))
        })?;
    builder.build_return(Some(&status))?;

    log::debug!("Synthesized {} wrapping {}", NATIVE_ENTRY_SYMBOL, ENTRY_SYMBOL);
    Ok(main)
}

/// Module containing only `main` and an external `main.main`.
pub fn build_entry_shim<'ctx>(
    context: &'ctx Context,
    target: &TargetSpec,
    options: &CompilerOptions,
) -> CompileResult<Module<'ctx>> {
    let module = context.create_module("main.shim");
    target.configure_module(&module);
    {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let builder = context.create_builder();
        let mut cx = CodegenCx::new(
            context,
            &module,
            &builder,
            target.target_data(),
            &session,
            options,
            "main",
        );
        cx.add_function(ENTRY_SYMBOL, &Signature::niladic(), Some(Linkage::External));
        create_main_function(&mut cx, target.rewritten_from_alias())?;
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_shim_forwards_process_arguments() {
        let context = Context::create();
        let target = TargetSpec::resolve("x86_64-unknown-linux-gnu").unwrap();
        let options = CompilerOptions::new("x86_64-unknown-linux-gnu");
        let module = build_entry_shim(&context, &target, &options).unwrap();

        assert!(module.verify().is_ok());
        let main = module.get_function(NATIVE_ENTRY_SYMBOL).unwrap();
        assert_eq!(main.count_params(), 3);
        assert_eq!(main.count_basic_blocks(), 1);

        let ir = module.print_to_string().to_string();
        assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv, ptr %envp)"));
        assert!(ir.contains(
            "%status = call i32 @runtime.main(i32 %argc, ptr %argv, ptr %envp, ptr @main.main)"
        ));
        assert!(ir.contains("ret i32 %status"));
        assert!(ir.contains("declare void @main.main()"));
    }

    #[test]
    fn test_entry_with_parameters_is_rejected() {
        let context = Context::create();
        let target = TargetSpec::resolve("x86_64-unknown-linux-gnu").unwrap();
        let options = CompilerOptions::new("x86_64-unknown-linux-gnu");
        let module = context.create_module("main");
        target.configure_module(&module);
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let builder = context.create_builder();
        let mut cx = CodegenCx::new(
            &context,
            &module,
            &builder,
            target.target_data(),
            &session,
            &options,
            "main",
        );
        let i64_type = context.i64_type();
        module.add_function(ENTRY_SYMBOL, i64_type.fn_type(&[i64_type.into()], false), None);

        let err = create_main_function(&mut cx, false).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEntry { .. }));
        assert_eq!(
            err.to_string(),
            "main.main must take no parameters and return no results"
        );
        assert!(module.get_function(NATIVE_ENTRY_SYMBOL).is_none());
    }
}
