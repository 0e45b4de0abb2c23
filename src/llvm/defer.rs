// This module builds the control flow behind deferred calls. make_defer_block runs once per
// function that defers, before its body is lowered: it allocates and clears the defer anchor,
// creates the defer block (and the landing pad when the body makes in-frame calls), orders them
// right after the entry block, fills the landing pad with a catch-all clause that falls into
// the defer block, and fills the defer block with the runtime.rundefers call followed by the
// function's real return. lower_defer and lower_go evaluate the callee and arguments at the
// statement, capture them in a heap context behind a generated thunk, and hand the resulting
// {thunk, context} closure to runtime.pushdefer or runtime.go.

//! Defer epilogue synthesis and defer/go statement lowering.

use crate::core::config::AnchorPolicy;
use crate::core::error::{CompileError, CompileResult};
use crate::frontend::ast::CallExpr;
use crate::llvm::cursor::InsertionGuard;
use crate::llvm::lower::{Epilogue, FunctionLowering, ResolvedCallee};
use crate::llvm::runtime::RuntimeFn;
use inkwell::module::Linkage;
use inkwell::types::{BasicTypeEnum, StructType};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, StructValue};

impl<'c, 'ctx, 's> FunctionLowering<'c, 'ctx, 's> {
    /// Create the defer anchor, defer block and, when `with_unwind`, the
    /// landing pad. Must run before any body statement is lowered.
    pub(crate) fn make_defer_block(&mut self, with_unwind: bool) -> CompileResult<()> {
        if self.fcx.epilogue.is_some() {
            return Err(CompileError::internal(format!(
                "{} already has a defer anchor",
                self.name
            )));
        }

        let builder = self.cx.builder();
        let cursor = InsertionGuard::new(builder);
        let current = cursor.saved_block().ok_or_else(|| {
            CompileError::internal(format!("no insertion block while lowering {}", self.name))
        })?;

        let types = self.cx.types();
        let anchor_ty = types.int();
        let defer_anchor = match self.cx.options().anchor_policy {
            AnchorPolicy::Frame => self.entry_alloca(anchor_ty.into(), "defer.anchor")?,
            // TODO: stack space for functions with a known small number of defers.
            AnchorPolicy::Heap => builder.build_malloc(anchor_ty, "defer.anchor")?,
        };
        builder.build_store(defer_anchor, anchor_ty.const_zero())?;

        let function = self.fcx.function;
        let context = self.cx.context();
        let defer_block = context.append_basic_block(function, "defer");
        let unwind_block = if with_unwind {
            let unwind_block = context.append_basic_block(function, "unwind");
            reorder(unwind_block.move_after(current), &self.name)?;
            reorder(defer_block.move_after(unwind_block), &self.name)?;
            Some(unwind_block)
        } else {
            reorder(defer_block.move_after(current), &self.name)?;
            None
        };

        self.fcx.epilogue = Some(Epilogue {
            defer_anchor,
            defer_block,
            unwind_block,
        });

        if let Some(unwind_block) = unwind_block {
            builder.position_at_end(unwind_block);
            let personality = self.cx.runtime(RuntimeFn::Personality)?;
            let types = self.cx.types();
            let catch_all: BasicValueEnum<'ctx> = types.ptr().const_null().into();
            builder.build_landing_pad(
                types.landing_pad(),
                personality,
                &[catch_all],
                false,
                "exception",
            )?;
            builder.build_unconditional_branch(defer_block)?;
            self.cx.session().record_landing_pad();
        }

        builder.position_at_end(defer_block);
        let run_defers = self.cx.runtime(RuntimeFn::RunDefers)?;
        let head = builder.build_load(anchor_ty, defer_anchor, "defer.head")?;
        builder.build_call(run_defers, &[head.into()], "")?;
        self.build_result_return()?;
        self.cx.session().record_defer_block();

        log::debug!(
            "Built defer block for {} ({})",
            self.name,
            if with_unwind { "with landing pad" } else { "no landing pad" }
        );
        Ok(())
    }

    /// `defer f(args)`: evaluate now, run when the activation ends.
    pub(crate) fn lower_defer(&mut self, call: &CallExpr) -> CompileResult<()> {
        let epilogue = self.fcx.epilogue.ok_or_else(|| {
            CompileError::internal(format!("defer in {} without a defer anchor", self.name))
        })?;

        let callee = self.eval_callee(&call.callee)?;
        let args = self.eval_call_args(&callee.signature, &call.args, call.spread)?;
        let closure = self.indirect_function(&callee, &args)?;

        let push_defer = self.cx.runtime(RuntimeFn::PushDefer)?;
        self.cx.builder().build_call(
            push_defer,
            &[closure.into(), epilogue.defer_anchor.into()],
            "",
        )?;
        self.cx.session().record_defer_stmt();
        Ok(())
    }

    /// `go f(args)`: evaluate now, run on a new execution unit.
    pub(crate) fn lower_go(&mut self, call: &CallExpr) -> CompileResult<()> {
        let callee = self.eval_callee(&call.callee)?;
        let args = self.eval_call_args(&callee.signature, &call.args, call.spread)?;
        let closure = self.indirect_function(&callee, &args)?;

        let go = self.cx.runtime(RuntimeFn::Go)?;
        self.cx.builder().build_call(go, &[closure.into()], "")?;
        self.cx.session().record_go_stmt();
        Ok(())
    }

    /// Package a callee and its evaluated arguments as a niladic closure.
    pub(crate) fn indirect_function(
        &mut self,
        callee: &ResolvedCallee<'ctx>,
        args: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<StructValue<'ctx>> {
        let types = self.cx.types();
        let builder = self.cx.builder();

        let mut fields: Vec<BasicTypeEnum<'ctx>> = Vec::with_capacity(args.len() + 1);
        fields.push(types.ptr().into());
        fields.extend(args.iter().map(|arg| arg.get_type()));
        let env_ty = self.cx.context().struct_type(&fields, false);

        let env = builder.build_malloc(env_ty, "closure.env")?;
        let callee_slot = builder.build_struct_gep(env_ty, env, 0, "")?;
        builder.build_store(callee_slot, callee.as_pointer())?;
        for (index, arg) in args.iter().enumerate() {
            let slot = builder.build_struct_gep(env_ty, env, index as u32 + 1, "")?;
            builder.build_store(slot, *arg)?;
        }

        let thunk = self.build_thunk(env_ty, callee)?;
        let closure = self.cx.types().closure().get_undef();
        let closure = builder
            .build_insert_value(closure, thunk.as_global_value().as_pointer_value(), 0, "")?
            .into_struct_value();
        let closure = builder
            .build_insert_value(closure, env, 1, "closure")?
            .into_struct_value();
        Ok(closure)
    }

    /// `void thunk(ptr env)`: reload the callee and arguments and call it.
    fn build_thunk(
        &mut self,
        env_ty: StructType<'ctx>,
        callee: &ResolvedCallee<'ctx>,
    ) -> CompileResult<FunctionValue<'ctx>> {
        let name = self.cx.fresh_name(&self.name, "thunk");
        let types = self.cx.types();
        let thunk_ty = self
            .cx
            .context()
            .void_type()
            .fn_type(&[types.ptr().into()], false);
        let thunk = self
            .cx
            .module()
            .add_function(&name, thunk_ty, Some(Linkage::Private));

        let builder = self.cx.builder();
        let _cursor = InsertionGuard::new(builder);
        let entry = self.cx.context().append_basic_block(thunk, "entry");
        builder.position_at_end(entry);

        let env = thunk
            .get_nth_param(0)
            .ok_or_else(|| CompileError::internal(format!("{} has no context parameter", name)))?
            .into_pointer_value();
        env.set_name("env");

        let callee_slot = builder.build_struct_gep(env_ty, env, 0, "")?;
        let callee_ptr = builder
            .build_load(types.ptr(), callee_slot, "callee")?
            .into_pointer_value();

        let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::new();
        for index in 1..env_ty.count_fields() {
            let field_ty = env_ty.get_field_type_at_index(index).ok_or_else(|| {
                CompileError::internal(format!("{} context has no field {}", name, index))
            })?;
            let slot = builder.build_struct_gep(env_ty, env, index, "")?;
            args.push(builder.build_load(field_ty, slot, "arg")?.into());
        }

        builder.build_indirect_call(callee.fn_type, callee_ptr, &args, "")?;
        builder.build_return(None)?;
        self.cx
            .session()
            .record_function_lowered(&name, thunk.count_basic_blocks() as usize);
        Ok(thunk)
    }
}

fn reorder(moved: Result<(), ()>, function: &str) -> CompileResult<()> {
    moved.map_err(|()| CompileError::internal(format!("could not order epilogue blocks of {}", function)))
}
