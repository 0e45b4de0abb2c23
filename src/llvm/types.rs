// This module maps source types onto LLVM types for one compilation session. Int is the
// target's pointer-sized integer (taken from the resolved TargetData), pointers and function
// values are opaque `ptr`, slices are `{ptr, int}`, and indirect invocation values (the
// closures handed to the defer and spawn runtime routines) are `{ptr thunk, ptr context}`.
// Signatures map to LLVM function types with void, single or aggregate returns. Mapped
// types are cached per session in a hashbrown table keyed by the source type.

//! Source type to LLVM type mapping.

use crate::frontend::ast::{Signature, Type};
use hashbrown::HashMap;
use inkwell::context::Context;
use inkwell::targets::TargetData;
use inkwell::types::{
    BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, IntType, PointerType,
    StructType,
};
use inkwell::AddressSpace;
use std::cell::RefCell;

pub struct TypeMap<'ctx> {
    context: &'ctx Context,
    int_type: IntType<'ctx>,
    cache: RefCell<HashMap<Type, BasicTypeEnum<'ctx>>>,
}

impl<'ctx> TypeMap<'ctx> {
    pub fn new(context: &'ctx Context, target_data: &TargetData) -> Self {
        Self {
            context,
            int_type: context.ptr_sized_int_type(target_data, None),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Pointer-sized integer; also the type stored in a defer anchor.
    pub fn int(&self) -> IntType<'ctx> {
        self.int_type
    }

    pub fn int32(&self) -> IntType<'ctx> {
        self.context.i32_type()
    }

    pub fn ptr(&self) -> PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    /// `{ptr data, int len}`.
    pub fn slice(&self) -> StructType<'ctx> {
        self.context
            .struct_type(&[self.ptr().into(), self.int_type.into()], false)
    }

    /// Indirect invocation value: `{ptr thunk, ptr context}`.
    pub fn closure(&self) -> StructType<'ctx> {
        self.context
            .struct_type(&[self.ptr().into(), self.ptr().into()], false)
    }

    /// Landing pad result: `{ptr exception, i32 selector}`.
    pub fn landing_pad(&self) -> StructType<'ctx> {
        self.context
            .struct_type(&[self.ptr().into(), self.int32().into()], false)
    }

    pub fn basic(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        if let Some(&cached) = self.cache.borrow().get(ty) {
            return cached;
        }
        let mapped: BasicTypeEnum<'ctx> = match ty {
            Type::Int => self.int_type.into(),
            Type::Int32 => self.int32().into(),
            Type::Bool => self.context.bool_type().into(),
            Type::Pointer | Type::Func(_) => self.ptr().into(),
            Type::Slice(_) => self.slice().into(),
        };
        self.cache.borrow_mut().insert(ty.clone(), mapped);
        mapped
    }

    /// Return type of a signature; `None` for no results.
    pub fn results(&self, sig: &Signature) -> Option<BasicTypeEnum<'ctx>> {
        match sig.results.as_slice() {
            [] => None,
            [single] => Some(self.basic(single)),
            many => {
                let fields: Vec<BasicTypeEnum<'ctx>> =
                    many.iter().map(|ty| self.basic(ty)).collect();
                Some(self.context.struct_type(&fields, false).into())
            }
        }
    }

    pub fn function(&self, sig: &Signature) -> FunctionType<'ctx> {
        let params: Vec<BasicMetadataTypeEnum<'ctx>> =
            sig.params.iter().map(|ty| self.basic(ty).into()).collect();
        match self.results(sig) {
            Some(ret) => ret.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        }
    }
}
