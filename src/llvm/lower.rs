// This module lowers one function body to LLVM IR. lower_function positions the session
// cursor in a fresh entry block (restoring the caller's cursor when done), materializes
// parameters and zero-initialised result slots as entry-block allocas, runs the epilogue
// analysis and, for bodies that defer, synthesizes the defer block and optional landing pad
// before any statement is lowered. Statements and expressions are matched exhaustively.
// Calls made in a frame that owns a landing pad become invokes unwinding to it; returns store
// into the result slots and, when the frame has a defer block, branch there instead of
// returning. Function literals become private functions lowered independently.

//! Function body lowering.

use crate::core::error::{CompileError, CompileResult};
use crate::frontend::ast::{BinaryOp, Block, CallExpr, Expr, FuncLit, Signature, Stmt, Type};
use crate::llvm::codegen::CodegenCx;
use crate::llvm::cursor::InsertionGuard;
use crate::llvm::function_analysis::EpilogueShape;
use hashbrown::{HashMap, HashSet};
use inkwell::basic_block::BasicBlock;
use inkwell::module::Linkage;
use inkwell::types::{BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, CallSiteValue, FunctionValue, PointerValue,
};
use inkwell::IntPredicate;

/// Storage for a parameter, result or local.
#[derive(Debug, Clone)]
pub struct Slot<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: Type,
}

/// Blocks and storage created by epilogue synthesis.
#[derive(Debug, Clone, Copy)]
pub struct Epilogue<'ctx> {
    /// Address-sized location holding the head of the defer list.
    pub defer_anchor: PointerValue<'ctx>,
    /// Unique exit: runs deferred calls, then returns.
    pub defer_block: BasicBlock<'ctx>,
    /// Landing pad for calls in this frame, if any can unwind.
    pub unwind_block: Option<BasicBlock<'ctx>>,
}

/// Per-function state, discarded once the function is lowered.
#[derive(Debug)]
pub struct FunctionContext<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub signature: Signature,
    pub entry_block: BasicBlock<'ctx>,
    pub results: Vec<Slot<'ctx>>,
    pub epilogue: Option<Epilogue<'ctx>>,
}

/// Evaluated expression with its source type.
#[derive(Debug, Clone)]
pub struct Operand<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy)]
pub enum Callee<'ctx> {
    Direct(FunctionValue<'ctx>),
    Indirect(PointerValue<'ctx>),
}

/// Callee evaluated to a function value, with its signature.
#[derive(Debug, Clone)]
pub struct ResolvedCallee<'ctx> {
    pub callee: Callee<'ctx>,
    pub signature: Signature,
    pub fn_type: FunctionType<'ctx>,
}

impl<'ctx> ResolvedCallee<'ctx> {
    pub fn as_pointer(&self) -> PointerValue<'ctx> {
        match self.callee {
            Callee::Direct(function) => function.as_global_value().as_pointer_value(),
            Callee::Indirect(ptr) => ptr,
        }
    }
}

/// Lower `func` into the already declared `function`.
///
/// `enclosing` holds the names visible in the enclosing function when
/// lowering a function literal; referencing one of them is a capture.
pub fn lower_function<'ctx, 's>(
    cx: &mut CodegenCx<'ctx, 's>,
    function: FunctionValue<'ctx>,
    name: &str,
    func: &FuncLit,
    enclosing: Option<HashSet<String>>,
) -> CompileResult<()> {
    let builder = cx.builder();
    let _cursor = InsertionGuard::new(builder);
    let session = cx.session();
    let _scope = session.enter_function(name);

    let entry_block = cx.context().append_basic_block(function, "entry");
    builder.position_at_end(entry_block);

    let shape = EpilogueShape::analyze(&func.body);
    log::debug!(
        "Lowering {} (defer block: {}, landing pad: {})",
        name,
        shape.defer_block,
        shape.unwind_block
    );

    let mut lowering = FunctionLowering::new(cx, function, name, func, entry_block, enclosing)?;
    if shape.defer_block {
        lowering.make_defer_block(shape.unwind_block)?;
    }
    lowering.lower_block(&func.body)?;
    lowering.finish()?;

    session.record_function_lowered(name, function.count_basic_blocks() as usize);
    Ok(())
}

pub struct FunctionLowering<'c, 'ctx, 's> {
    pub(crate) cx: &'c mut CodegenCx<'ctx, 's>,
    pub(crate) fcx: FunctionContext<'ctx>,
    pub(crate) name: String,
    scopes: Vec<HashMap<String, Slot<'ctx>>>,
    enclosing: HashSet<String>,
}

impl<'c, 'ctx, 's> FunctionLowering<'c, 'ctx, 's> {
    fn new(
        cx: &'c mut CodegenCx<'ctx, 's>,
        function: FunctionValue<'ctx>,
        name: &str,
        func: &FuncLit,
        entry_block: BasicBlock<'ctx>,
        enclosing: Option<HashSet<String>>,
    ) -> CompileResult<Self> {
        let mut lowering = Self {
            cx,
            fcx: FunctionContext {
                function,
                signature: func.signature(),
                entry_block,
                results: Vec::with_capacity(func.results.len()),
                epilogue: None,
            },
            name: name.to_string(),
            scopes: vec![HashMap::new()],
            enclosing: enclosing.unwrap_or_default(),
        };

        let builder = lowering.cx.builder();
        for (index, param) in func.params.iter().enumerate() {
            let value = function.get_nth_param(index as u32).ok_or_else(|| {
                CompileError::internal(format!("{} has no parameter {}", name, index))
            })?;
            value.set_name(&param.name);
            let ptr = lowering.entry_alloca(lowering.cx.types().basic(&param.ty), &param.name)?;
            builder.build_store(ptr, value)?;
            lowering.bind(&param.name, Slot {
                ptr,
                ty: param.ty.clone(),
            });
        }

        for result in &func.results {
            let ty = lowering.cx.types().basic(&result.ty);
            let ptr = lowering.entry_alloca(ty, &result.name)?;
            builder.build_store(ptr, ty.const_zero())?;
            let slot = Slot {
                ptr,
                ty: result.ty.clone(),
            };
            if !result.name.is_empty() {
                lowering.bind(&result.name, slot.clone());
            }
            lowering.fcx.results.push(slot);
        }

        Ok(lowering)
    }

    /// Alloca at the top of the entry block.
    pub(crate) fn entry_alloca(
        &self,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> CompileResult<PointerValue<'ctx>> {
        let builder = self.cx.builder();
        let _cursor = InsertionGuard::new(builder);
        match self.fcx.entry_block.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(self.fcx.entry_block),
        }
        Ok(builder.build_alloca(ty, name)?)
    }

    fn bind(&mut self, name: &str, slot: Slot<'ctx>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn lookup(&self, name: &str) -> CompileResult<Slot<'ctx>> {
        if let Some(slot) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(slot.clone());
        }
        if self.enclosing.contains(name) {
            return Err(CompileError::Unsupported {
                construct: format!("function literal in {} capturing {}", self.name, name),
            });
        }
        Err(CompileError::internal(format!(
            "{} refers to undefined local {}",
            self.name, name
        )))
    }

    /// Every name visible at this point, for nested literals.
    fn visible_names(&self) -> HashSet<String> {
        let mut names = self.enclosing.clone();
        for scope in &self.scopes {
            names.extend(scope.keys().cloned());
        }
        names
    }

    fn is_terminated(&self) -> bool {
        self.cx
            .builder()
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }

    fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.cx.context().append_basic_block(self.fcx.function, name)
    }

    pub(crate) fn lower_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.stmts {
            // Statements after a return are unreachable.
            if self.is_terminated() {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_scoped_block(&mut self, block: &Block) -> CompileResult<()> {
        self.scopes.push(HashMap::new());
        let result = self.lower_block(block);
        self.scopes.pop();
        result
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let builder = self.cx.builder();
        match stmt {
            Stmt::Let { name, ty, init } => {
                let llvm_ty = self.cx.types().basic(ty);
                let value = match init {
                    Some(init) => self.eval_as(init, ty)?,
                    None => llvm_ty.const_zero(),
                };
                let ptr = self.entry_alloca(llvm_ty, name)?;
                builder.build_store(ptr, value)?;
                self.bind(name, Slot {
                    ptr,
                    ty: ty.clone(),
                });
            }
            Stmt::Assign { name, value } => {
                let slot = self.lookup(name)?;
                let value = self.eval_as(value, &slot.ty)?;
                builder.build_store(slot.ptr, value)?;
            }
            Stmt::Expr(Expr::Call(call)) => {
                self.eval_call(call)?;
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Return(values) => self.lower_return(values)?,
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.lower_if(cond, then_block, else_block.as_ref())?,
            Stmt::Block(block) => self.lower_scoped_block(block)?,
            Stmt::Defer(call) => self.lower_defer(call)?,
            Stmt::Go(call) => self.lower_go(call)?,
        }
        Ok(())
    }

    fn lower_return(&mut self, values: &[Expr]) -> CompileResult<()> {
        if !values.is_empty() {
            if values.len() != self.fcx.results.len() {
                return Err(CompileError::internal(format!(
                    "{} returns {} values but declares {} results",
                    self.name,
                    values.len(),
                    self.fcx.results.len()
                )));
            }
            // Evaluate every operand before any slot is written.
            let slots = self.fcx.results.clone();
            let mut evaluated = Vec::with_capacity(values.len());
            for (value, slot) in values.iter().zip(&slots) {
                evaluated.push(self.eval_as(value, &slot.ty)?);
            }
            let builder = self.cx.builder();
            for (value, slot) in evaluated.into_iter().zip(&slots) {
                builder.build_store(slot.ptr, value)?;
            }
        }
        self.branch_to_exit()
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> CompileResult<()> {
        let cond = self.eval_as(cond, &Type::Bool)?.into_int_value();
        let builder = self.cx.builder();

        let then_bb = self.append_block("if.then");
        let else_bb = else_block.map(|_| self.append_block("if.else"));
        let end_bb = self.append_block("if.end");
        builder.build_conditional_branch(cond, then_bb, else_bb.unwrap_or(end_bb))?;

        builder.position_at_end(then_bb);
        self.lower_scoped_block(then_block)?;
        if !self.is_terminated() {
            builder.build_unconditional_branch(end_bb)?;
        }

        if let (Some(else_bb), Some(else_block)) = (else_bb, else_block) {
            builder.position_at_end(else_bb);
            self.lower_scoped_block(else_block)?;
            if !self.is_terminated() {
                builder.build_unconditional_branch(end_bb)?;
            }
        }

        builder.position_at_end(end_bb);
        Ok(())
    }

    /// Leave the function: through the defer block when there is one.
    fn branch_to_exit(&mut self) -> CompileResult<()> {
        match self.fcx.epilogue {
            Some(epilogue) => {
                self.cx
                    .builder()
                    .build_unconditional_branch(epilogue.defer_block)?;
                Ok(())
            }
            None => self.build_result_return(),
        }
    }

    /// Return the current contents of the result slots.
    pub(crate) fn build_result_return(&mut self) -> CompileResult<()> {
        let builder = self.cx.builder();
        let mut values = Vec::with_capacity(self.fcx.results.len());
        for slot in &self.fcx.results {
            let ty = self.cx.types().basic(&slot.ty);
            values.push(builder.build_load(ty, slot.ptr, "result")?);
        }
        match values.as_slice() {
            [] => builder.build_return(None)?,
            [single] => builder.build_return(Some(single))?,
            many => builder.build_aggregate_return(many)?,
        };
        Ok(())
    }

    fn finish(&mut self) -> CompileResult<()> {
        if !self.is_terminated() {
            self.branch_to_exit()?;
        }
        Ok(())
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> CompileResult<Operand<'ctx>> {
        let builder = self.cx.builder();
        match expr {
            Expr::Int(value) => Ok(Operand {
                value: self.cx.types().int().const_int(*value as u64, true).into(),
                ty: Type::Int,
            }),
            Expr::Bool(value) => Ok(Operand {
                value: self
                    .cx
                    .context()
                    .bool_type()
                    .const_int(u64::from(*value), false)
                    .into(),
                ty: Type::Bool,
            }),
            Expr::Local(name) => {
                let slot = self.lookup(name)?;
                let ty = self.cx.types().basic(&slot.ty);
                Ok(Operand {
                    value: builder.build_load(ty, slot.ptr, name)?,
                    ty: slot.ty,
                })
            }
            Expr::Func(name) => {
                let callee = self.resolve_func(name)?;
                Ok(Operand {
                    value: callee.as_pointer().into(),
                    ty: Type::Func(Box::new(callee.signature)),
                })
            }
            Expr::Call(call) => {
                let (site, signature) = self.eval_call(call)?;
                match signature.results.as_slice() {
                    [ty] => {
                        let value = site.try_as_basic_value().left().ok_or_else(|| {
                            CompileError::internal(format!("call in {} produced no value", self.name))
                        })?;
                        Ok(Operand {
                            value,
                            ty: ty.clone(),
                        })
                    }
                    results => Err(CompileError::Unsupported {
                        construct: format!(
                            "call with {} results used as a value in {}",
                            results.len(),
                            self.name
                        ),
                    }),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::FuncLit(lit) => self.lower_func_lit(lit),
        }
    }

    /// Evaluate `expr`, which the front end typed as `ty`.
    pub(crate) fn eval_as(&mut self, expr: &Expr, ty: &Type) -> CompileResult<BasicValueEnum<'ctx>> {
        let operand = self.eval(expr)?;
        if &operand.ty != ty {
            return Err(CompileError::internal(format!(
                "{}: expected {:?}, found {:?}",
                self.name, ty, operand.ty
            )));
        }
        Ok(operand.value)
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<Operand<'ctx>> {
        let lhs = self.eval(lhs)?;
        let rhs = self.eval(rhs)?;
        let integral = matches!(lhs.ty, Type::Int | Type::Int32);
        let comparable = integral || lhs.ty == Type::Bool;
        let operands_ok = lhs.ty == rhs.ty
            && match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Lt => integral,
                BinaryOp::Eq => comparable,
            };
        if !operands_ok {
            return Err(CompileError::internal(format!(
                "{}: invalid operands {:?} {:?} {:?}",
                self.name, lhs.ty, op, rhs.ty
            )));
        }

        let builder = self.cx.builder();
        let (l, r) = (lhs.value.into_int_value(), rhs.value.into_int_value());
        let (value, ty) = match op {
            BinaryOp::Add => (builder.build_int_add(l, r, "add")?, lhs.ty),
            BinaryOp::Sub => (builder.build_int_sub(l, r, "sub")?, lhs.ty),
            BinaryOp::Mul => (builder.build_int_mul(l, r, "mul")?, lhs.ty),
            BinaryOp::Lt => (
                builder.build_int_compare(IntPredicate::SLT, l, r, "lt")?,
                Type::Bool,
            ),
            BinaryOp::Eq => (
                builder.build_int_compare(IntPredicate::EQ, l, r, "eq")?,
                Type::Bool,
            ),
        };
        Ok(Operand {
            value: value.into(),
            ty,
        })
    }

    fn lower_func_lit(&mut self, lit: &FuncLit) -> CompileResult<Operand<'ctx>> {
        let signature = lit.signature();
        let name = self.cx.fresh_name(&self.name, "lit");
        let function = self
            .cx
            .add_function(&name, &signature, Some(Linkage::Private));
        let enclosing = self.visible_names();
        lower_function(&mut *self.cx, function, &name, lit, Some(enclosing))?;
        Ok(Operand {
            value: function.as_global_value().as_pointer_value().into(),
            ty: Type::Func(Box::new(signature)),
        })
    }

    fn resolve_func(&self, name: &str) -> CompileResult<ResolvedCallee<'ctx>> {
        let package_fn = self.cx.function(name).ok_or_else(|| {
            CompileError::internal(format!("{} refers to undeclared function {}", self.name, name))
        })?;
        Ok(ResolvedCallee {
            callee: Callee::Direct(package_fn.value),
            fn_type: package_fn.value.get_type(),
            signature: package_fn.signature.clone(),
        })
    }

    /// Evaluate the callee expression of a call to a function value.
    pub(crate) fn eval_callee(&mut self, callee: &Expr) -> CompileResult<ResolvedCallee<'ctx>> {
        if let Expr::Func(name) = callee {
            return self.resolve_func(name);
        }
        let operand = self.eval(callee)?;
        match operand.ty {
            Type::Func(signature) => Ok(ResolvedCallee {
                callee: Callee::Indirect(operand.value.into_pointer_value()),
                fn_type: self.cx.types().function(&signature),
                signature: *signature,
            }),
            other => Err(CompileError::internal(format!(
                "{}: calling a value of type {:?}",
                self.name, other
            ))),
        }
    }

    /// Evaluate call arguments left to right, packing variadic trailing
    /// arguments into a slice unless the call site spreads one.
    pub(crate) fn eval_call_args(
        &mut self,
        signature: &Signature,
        args: &[Expr],
        spread: bool,
    ) -> CompileResult<Vec<BasicValueEnum<'ctx>>> {
        let params = &signature.params;
        let packs_variadic = signature.variadic && !spread;
        let fixed = if packs_variadic {
            params.len().saturating_sub(1)
        } else {
            params.len()
        };
        let arity_ok = if packs_variadic {
            args.len() >= fixed
        } else {
            args.len() == params.len()
        };
        if !arity_ok || (spread && !signature.variadic) {
            return Err(CompileError::internal(format!(
                "{}: {} arguments for {} parameters",
                self.name,
                args.len(),
                params.len()
            )));
        }

        let mut values = Vec::with_capacity(params.len());
        for (arg, ty) in args.iter().zip(params).take(fixed) {
            values.push(self.eval_as(arg, ty)?);
        }

        if packs_variadic {
            let elem = match params.last() {
                Some(Type::Slice(elem)) => (**elem).clone(),
                other => {
                    return Err(CompileError::internal(format!(
                        "{}: variadic parameter of type {:?}",
                        self.name, other
                    )))
                }
            };
            let mut rest = Vec::with_capacity(args.len() - fixed);
            for arg in &args[fixed..] {
                rest.push(self.eval_as(arg, &elem)?);
            }
            values.push(self.pack_slice(&elem, &rest)?);
        }
        Ok(values)
    }

    /// Heap-allocated `{data, len}` slice of `values`.
    fn pack_slice(&mut self, elem: &Type, values: &[BasicValueEnum<'ctx>]) -> CompileResult<BasicValueEnum<'ctx>> {
        let types = self.cx.types();
        let builder = self.cx.builder();
        let int = types.int();
        if values.is_empty() {
            let empty = types
                .slice()
                .const_named_struct(&[types.ptr().const_null().into(), int.const_zero().into()]);
            return Ok(empty.into());
        }

        let elem_ty = types.basic(elem);
        let data = builder.build_malloc(elem_ty.array_type(values.len() as u32), "variadic")?;
        for (index, value) in values.iter().enumerate() {
            let slot = unsafe {
                builder.build_in_bounds_gep(elem_ty, data, &[int.const_int(index as u64, false)], "")?
            };
            builder.build_store(slot, *value)?;
        }

        let slice = types.slice().get_undef();
        let slice = builder
            .build_insert_value(slice, data, 0, "")?
            .into_struct_value();
        let len = int.const_int(values.len() as u64, false);
        let slice = builder
            .build_insert_value(slice, len, 1, "slice")?
            .into_struct_value();
        Ok(slice.into())
    }

    /// Call site for this frame: an invoke unwinding to the landing pad when
    /// the frame has one, otherwise a plain call.
    pub(crate) fn emit_call(
        &mut self,
        callee: &ResolvedCallee<'ctx>,
        args: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<CallSiteValue<'ctx>> {
        let builder = self.cx.builder();
        let unwind = self.fcx.epilogue.and_then(|epilogue| epilogue.unwind_block);
        let site = match unwind {
            Some(unwind_block) => {
                let cont = self.append_block("invoke.cont");
                let site = match callee.callee {
                    Callee::Direct(function) => {
                        builder.build_invoke(function, args, cont, unwind_block, "")?
                    }
                    Callee::Indirect(ptr) => builder.build_indirect_invoke(
                        callee.fn_type,
                        ptr,
                        args,
                        cont,
                        unwind_block,
                        "",
                    )?,
                };
                builder.position_at_end(cont);
                self.cx.session().record_invoke();
                site
            }
            None => {
                let args: Vec<BasicMetadataValueEnum<'ctx>> =
                    args.iter().map(|arg| (*arg).into()).collect();
                match callee.callee {
                    Callee::Direct(function) => builder.build_call(function, &args, "")?,
                    Callee::Indirect(ptr) => {
                        builder.build_indirect_call(callee.fn_type, ptr, &args, "")?
                    }
                }
            }
        };
        Ok(site)
    }

    fn eval_call(&mut self, call: &CallExpr) -> CompileResult<(CallSiteValue<'ctx>, Signature)> {
        let callee = self.eval_callee(&call.callee)?;
        let args = self.eval_call_args(&callee.signature, &call.args, call.spread)?;
        let site = self.emit_call(&callee, &args)?;
        Ok((site, callee.signature))
    }
}
