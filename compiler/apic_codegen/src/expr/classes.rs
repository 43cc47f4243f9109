//! Class construction and member access.

use apic_backend::runtime::field;
use apic_backend::{CastOp, RuntimeFn, TyId, Value};
use apic_ir::{Builtin, ExprId, ExprKind, ExprRange, Field, Name, TypeId, TypeKind};

use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::Scope;
use crate::types::REF_VALUE;

impl Compiler<'_> {
    pub(super) fn class_initializer(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        fields: ExprRange,
    ) -> Result<Value, CodegenError> {
        let value = self.class_value(s, e, fields)?;
        self.defer_release(s, value, self.expr_ty(e));
        Ok(value)
    }

    /// Build a class value holding one count of every owned field, without
    /// registering its release.
    fn class_value(&mut self, s: &mut Scope, e: ExprId, fields: ExprRange) -> Result<Value, CodegenError> {
        let program = self.program;
        let ty = self.expr_ty(e);
        let value = self.fields_value(s, ty, program.exprs.list(fields))?;
        self.reference(&mut s.b, value, ty);
        Ok(value)
    }

    /// Fields of class `ty` in declaration order: the initializer entry,
    /// else the field's declared default, else its initial value. Owned
    /// parts carry their own obligations; the result holds no counts.
    fn fields_value(&mut self, s: &mut Scope, ty: TypeId, entries: &[ExprId]) -> Result<Value, CodegenError> {
        let program = self.program;
        let target = self.target(ty);
        let mut value = s.b.zero(target);
        for (i, decl) in (0u32..).zip(program.types.class_fields(ty)) {
            let given = entries.get(i as usize).copied().filter(|x| x.is_valid());
            let v = match given.or(decl.default.is_valid().then_some(decl.default)) {
                Some(source) => self.value(s, source)?,
                None => match self.initial_value(s, decl.ty)? {
                    Some(v) => v,
                    None => continue,
                },
            };
            value = s.b.insert(&self.module.tys, value, i, v);
        }
        Ok(value)
    }

    /// Value of an uninitialized `ty` where it isn't zero: strings start out
    /// empty and class values take their field defaults.
    pub(crate) fn initial_value(&mut self, s: &mut Scope, ty: TypeId) -> Result<Option<Value>, CodegenError> {
        let program = self.program;
        match program.types.kind(program.types.underlying(ty)) {
            TypeKind::Builtin(Builtin::String) => {
                let arena = self.arena(s);
                let len = s.b.const_u64(0);
                let data = s.b.zero(TyId::BYTE_PTR);
                let string = self.runtime(&mut s.b, RuntimeFn::MakeString, &[arena, len, data]);
                self.defer_release(s, string, ty);
                Ok(Some(string))
            }
            TypeKind::Class { .. } => self.fields_value(s, ty, &[]).map(Some),
            _ => Ok(None),
        }
    }

    /// Heap-allocate `{ ref_count: 1, arena, value }` and own the pointer.
    pub(super) fn create(&mut self, s: &mut Scope, e: ExprId, init: ExprId) -> Result<Value, CodegenError> {
        let program = self.program;
        let ref_ty = self.expr_ty(e);
        let class_ty = match program.types.kind(program.types.underlying(ref_ty)) {
            TypeKind::Reference { to } => *to,
            _ => self.expr_ty(init),
        };

        let value = if let ExprKind::ClassInitializer { fields } = program.exprs.kind(init) {
            // The new object takes over the initializer's counts directly.
            let previous = self.current_expr.replace(init);
            let value = self.class_value(s, init, fields);
            self.current_expr = previous;
            value?
        } else {
            let value = self.value(s, init)?;
            self.reference(&mut s.b, value, class_ty);
            value
        };

        let ptr_ty = self.target(ref_ty);
        let header = self.module.tys.pointee(ptr_ty).unwrap_or(TyId::VOID);
        let size = self.module.tys.size_of(header);
        let align = self.module.tys.align_of(header);
        let arena = self.arena(s);
        let size = s.b.const_u64(size);
        let align = s.b.const_u64(align);
        let raw = self.runtime(&mut s.b, RuntimeFn::Alloc, &[arena, size, align]);
        let ptr = s.b.cast(CastOp::PtrToPtr, raw, ptr_ty);

        let tys = &mut self.module.tys;
        let count = s.b.field_ptr(tys, ptr, field::REF_COUNT);
        let one = s.b.const_u32(1);
        s.b.store(count, one);
        let owner = s.b.field_ptr(tys, ptr, field::ARENA);
        s.b.store(owner, arena);
        let payload = s.b.field_ptr(tys, ptr, REF_VALUE);
        self.store_storage(&mut s.b, payload, value, class_ty);

        self.defer_release(s, ptr, ref_ty);
        Ok(ptr)
    }

    pub(super) fn member(&mut self, s: &mut Scope, object: ExprId, name: Name) -> Result<Value, CodegenError> {
        let program = self.program;
        let ty = program.types.underlying(self.expr_ty(object));
        match program.types.kind(ty) {
            TypeKind::Class { fields, .. } => {
                let Some((index, _)) = find_field(fields, name) else {
                    return Err(self.unexpected_member(s, name, ty));
                };
                let value = self.value(s, object)?;
                Ok(s.b.extract(&self.module.tys, value, index))
            }
            TypeKind::Reference { to } => {
                let Some((index, decl)) = find_field(program.types.class_fields(*to), name) else {
                    return Err(self.unexpected_member(s, name, ty));
                };
                let ptr = self.value(s, object)?;
                let payload = s.b.field_ptr(&mut self.module.tys, ptr, REF_VALUE);
                let slot = s.b.field_ptr(&mut self.module.tys, payload, index);
                Ok(self.load_storage(&mut s.b, slot, decl.ty))
            }
            _ => Err(self.unexpected_member(s, name, ty)),
        }
    }

    fn unexpected_member(&self, s: &Scope, name: Name, ty: TypeId) -> CodegenError {
        let field = self.program.interner.lookup(name).to_owned();
        let ty = self.describe(ty);
        self.fail(s, ErrorKind::UnexpectedMemberOperand { field, ty })
    }
}

fn find_field(fields: &[Field], name: Name) -> Option<(u32, &Field)> {
    (0u32..).zip(fields).find(|(_, f)| f.name == name)
}
