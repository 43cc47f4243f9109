//! Arrays, slices, maps and lengths.
//!
//! | expression       | result                                     | owned |
//! |------------------|--------------------------------------------|-------|
//! | array literal    | aggregate of the element values            | yes   |
//! | `a[i]`           | element of a static array                  | no    |
//! | `s[i]`           | element loaded from the slice buffer       | no    |
//! | `s[i:j]`         | view sharing the pool of `s`               | no    |
//! | `p[i:j]`         | fresh pool holding a copy of the range     | yes   |
//! | `make`           | fresh zeroed pool                          | yes   |
//! | `clone`          | fresh pool holding a copy of the slice     | yes   |
//! | `m[k]`           | looked-up value, zero when absent          | yes   |
//! | `k in m`         | `bool`                                     | no    |
//! | `len`            | element count, map size, or string length  | no    |
//!
//! Slice indices and ranges are not bounds checked.

use apic_backend::runtime::field;
use apic_backend::{BinOp, CastOp, RuntimeFn, TyId, Value};
use apic_ir::{Builtin, ExprId, ExprRange, TypeId, TypeKind};

use crate::cast::convert;
use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::Scope;

impl Compiler<'_> {
    pub(super) fn array_initializer(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        values: ExprRange,
    ) -> Result<Value, CodegenError> {
        let program = self.program;
        let ty = self.expr_ty(e);
        let target = self.target(ty);
        let mut array = s.b.zero(target);
        for (i, &v) in (0u32..).zip(program.exprs.list(values)) {
            let value = self.value(s, v)?;
            array = s.b.insert(&self.module.tys, array, i, value);
        }
        // The elements may be borrowed; the aggregate holds its own counts.
        self.reference(&mut s.b, array, ty);
        self.defer_release(s, array, ty);
        Ok(array)
    }

    pub(super) fn array_index(
        &mut self,
        s: &mut Scope,
        array: ExprId,
        index: ExprId,
    ) -> Result<Value, CodegenError> {
        let value = self.value(s, array)?;
        let index = self.value(s, index)?;
        let slot = s.b.alloca(&mut self.module.tys, value.ty);
        s.b.store(slot, value);
        let first = s.b.field_ptr(&mut self.module.tys, slot, 0);
        let elem = s.b.elem_ptr(first, index);
        Ok(s.b.load(&self.module.tys, elem))
    }

    /// Typed pointer to the first element of a slice's buffer.
    fn slice_base(&mut self, s: &mut Scope, slice: Value, elem: TypeId) -> Value {
        let base = s.b.extract(&self.module.tys, slice, field::SLICE_BASE);
        let storage = self.storage(elem);
        let ptr_ty = self.module.tys.pointer(storage);
        s.b.cast(CastOp::PtrToPtr, base, ptr_ty)
    }

    fn elem_size(&mut self, s: &mut Scope, elem: TypeId) -> Value {
        let storage = self.storage(elem);
        let size = self.module.tys.size_of(storage);
        s.b.const_u64(size)
    }

    fn index_value(&mut self, s: &mut Scope, e: ExprId) -> Result<Value, CodegenError> {
        let index = self.value(s, e)?;
        Ok(convert(&mut s.b, &self.module.tys, index, TyId::U64))
    }

    pub(super) fn slice_index(
        &mut self,
        s: &mut Scope,
        slice: ExprId,
        index: ExprId,
    ) -> Result<Value, CodegenError> {
        let elem = self.element_type(self.expr_ty(slice));
        let value = self.value(s, slice)?;
        let index = self.value(s, index)?;
        let base = self.slice_base(s, value, elem);
        let ptr = s.b.elem_ptr(base, index);
        Ok(self.load_storage(&mut s.b, ptr, elem))
    }

    /// `s[start:end]`; a missing bound is the start or end of `s`.
    pub(super) fn slice_range(
        &mut self,
        s: &mut Scope,
        slice: ExprId,
        start: ExprId,
        end: ExprId,
    ) -> Result<Value, CodegenError> {
        let elem = self.element_type(self.expr_ty(slice));
        let value = self.value(s, slice)?;
        let start = if start.is_valid() {
            self.index_value(s, start)?
        } else {
            s.b.const_u64(0)
        };
        let end = if end.is_valid() {
            self.index_value(s, end)?
        } else {
            s.b.extract(&self.module.tys, value, field::SLICE_COUNT)
        };

        let count = s.b.binary(BinOp::Sub, end, start);
        let elem_size = self.elem_size(s, elem);
        let size = s.b.binary(BinOp::Mul, count, elem_size);
        let base = self.slice_base(s, value, elem);
        let moved = s.b.elem_ptr(base, start);
        let moved = s.b.cast(CastOp::PtrToPtr, moved, TyId::BYTE_PTR);

        let tys = &self.module.tys;
        let view = s.b.insert(tys, value, field::SLICE_BASE, moved);
        let view = s.b.insert(tys, view, field::SLICE_SIZE, size);
        Ok(s.b.insert(tys, view, field::SLICE_COUNT, count))
    }

    pub(super) fn pointer_range(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        pointer: ExprId,
        start: ExprId,
        end: ExprId,
    ) -> Result<Value, CodegenError> {
        let elem = self.element_type(self.expr_ty(pointer));
        let ptr = self.value(s, pointer)?;
        let start = self.index_value(s, start)?;
        let end = self.index_value(s, end)?;

        let count = s.b.binary(BinOp::Sub, end, start);
        let elem_size = self.elem_size(s, elem);
        let size = s.b.binary(BinOp::Mul, count, elem_size);
        let moved = s.b.elem_ptr(ptr, start);
        let base = s.b.cast(CastOp::PtrToPtr, moved, TyId::BYTE_PTR);
        let arena = self.arena(s);
        let slice = self.runtime(
            &mut s.b,
            RuntimeFn::PointerToSlice,
            &[arena, base, size, count],
        );
        self.defer_release(s, slice, self.expr_ty(e));
        Ok(slice)
    }

    /// `{ pool, pool.buffer, size, count }` over a fresh zeroed pool of
    /// `size` bytes.
    fn fresh_slice(&mut self, s: &mut Scope, size: Value, count: Value) -> Value {
        let arena = self.arena(s);
        let pool = self.runtime(&mut s.b, RuntimeFn::MakePool, &[arena, size]);
        let buffer = s.b.load_field(&mut self.module.tys, pool, field::POOL_BUFFER);
        let tys = &self.module.tys;
        let slice = s.b.zero(self.module.rt.slice);
        let slice = s.b.insert(tys, slice, field::SLICE_POOL, pool);
        let slice = s.b.insert(tys, slice, field::SLICE_BASE, buffer);
        let slice = s.b.insert(tys, slice, field::SLICE_SIZE, size);
        s.b.insert(tys, slice, field::SLICE_COUNT, count)
    }

    pub(super) fn make(&mut self, s: &mut Scope, e: ExprId, size: ExprId) -> Result<Value, CodegenError> {
        let ty = self.expr_ty(e);
        let elem = self.element_type(ty);
        let count = self.index_value(s, size)?;
        let elem_size = self.elem_size(s, elem);
        let bytes = s.b.binary(BinOp::Mul, count, elem_size);
        let slice = self.fresh_slice(s, bytes, count);
        self.defer_release(s, slice, ty);
        Ok(slice)
    }

    pub(super) fn clone_slice(&mut self, s: &mut Scope, slice: ExprId) -> Result<Value, CodegenError> {
        let ty = self.expr_ty(slice);
        let source = self.value(s, slice)?;
        let size = s.b.extract(&self.module.tys, source, field::SLICE_SIZE);
        let count = s.b.extract(&self.module.tys, source, field::SLICE_COUNT);
        let copy = self.fresh_slice(s, size, count);
        Self::runtime_effect(&mut s.b, RuntimeFn::CopySlice, &[copy, source]);
        self.defer_release(s, copy, ty);
        Ok(copy)
    }

    /// Evaluate a map operand and a key converted to its stored form.
    fn map_operands(
        &mut self,
        s: &mut Scope,
        map: ExprId,
        key: ExprId,
    ) -> Result<(Value, Value), CodegenError> {
        let (key_ty, _) = self.map_entry_types(self.expr_ty(map));
        let map = self.value(s, map)?;
        let key = self.value(s, key)?;
        let key = self
            .types
            .to_storage(self.program, &mut self.module, &mut s.b, key, key_ty);
        Ok((map, key))
    }

    pub(super) fn map_index(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        map: ExprId,
        key: ExprId,
    ) -> Result<Value, CodegenError> {
        let sig = self.map_sig(self.expr_ty(map));
        let ty = self.expr_ty(e);
        let (map, key) = self.map_operands(s, map, key)?;
        let raw = self.runtime(&mut s.b, RuntimeFn::MapLookup(sig), &[map, key]);
        let value = self
            .types
            .to_target(self.program, &mut self.module, &mut s.b, raw, ty);
        // Lookups borrow from the map; the result outlives the entry.
        self.reference(&mut s.b, value, ty);
        self.defer_release(s, value, ty);
        Ok(value)
    }

    pub(super) fn map_contains(
        &mut self,
        s: &mut Scope,
        map: ExprId,
        key: ExprId,
    ) -> Result<Value, CodegenError> {
        let sig = self.map_sig(self.expr_ty(map));
        let (map, key) = self.map_operands(s, map, key)?;
        Ok(self.runtime(&mut s.b, RuntimeFn::MapContains(sig), &[map, key]))
    }

    pub(super) fn length(&mut self, s: &mut Scope, e: ExprId, object: ExprId) -> Result<Value, CodegenError> {
        let program = self.program;
        let ty = program.types.underlying(self.expr_ty(object));
        let len = match program.types.kind(ty) {
            TypeKind::Slice { .. } => {
                let slice = self.value(s, object)?;
                s.b.extract(&self.module.tys, slice, field::SLICE_COUNT)
            }
            TypeKind::Map { .. } => {
                let map = self.value(s, object)?;
                s.b.load_field(&mut self.module.tys, map, field::MAP_COUNT)
            }
            TypeKind::Builtin(Builtin::String) => {
                let string = self.value(s, object)?;
                s.b.load_field(&mut self.module.tys, string, field::STRING_LENGTH)
            }
            _ => {
                let ty = self.describe(ty);
                return Err(self.fail(s, ErrorKind::UnhandledLengthOperand { ty }));
            }
        };
        let dst = self.target(self.expr_ty(e));
        Ok(convert(&mut s.b, &self.module.tys, len, dst))
    }
}
