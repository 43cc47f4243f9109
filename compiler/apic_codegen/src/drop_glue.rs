//! Drop functions for counted objects.
//!
//! `RcDec` calls the drop function of an object when its count reaches
//! zero. Each drop function takes the object pointer, releases whatever the
//! object owns, then frees the allocation through its arena:
//!
//! | object      | body                                              |
//! |-------------|---------------------------------------------------|
//! | string      | free                                              |
//! | pool        | free                                              |
//! | `ref!T`     | release the owned fields of the payload, free     |
//! | map         | `apic_free_map` (releases entries, frees header)  |
//!
//! Drop functions are cached by [`Glue`] key, and the key is inserted
//! before the body is generated so a type that owns references to itself
//! resolves to its own drop function.

use apic_backend::runtime::field;
use apic_backend::{
    CastOp, FuncId, FunctionBuilder, MapSig, Release, RuntimeFn, TyId, Value,
};
use apic_ir::{TypeId, TypeKind};

use crate::compiler::Compiler;
use crate::ownership::Ownership;
use crate::types::REF_VALUE;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) enum Glue {
    String,
    Pool,
    /// Keyed by the underlying reference type.
    Reference(TypeId),
    /// Keyed by the underlying map type.
    Map(TypeId),
}

impl Compiler<'_> {
    /// Drop function for a counted type (string, reference or map).
    pub(crate) fn drop_glue(&mut self, ty: TypeId) -> FuncId {
        let ty = self.program.types.underlying(ty);
        let key = match self.program.types.kind(ty) {
            TypeKind::Reference { .. } => Glue::Reference(ty),
            TypeKind::Map { .. } => Glue::Map(ty),
            _ => Glue::String,
        };
        self.glue(key)
    }

    pub(crate) fn pool_glue(&mut self) -> FuncId {
        self.glue(Glue::Pool)
    }

    fn glue(&mut self, key: Glue) -> FuncId {
        if let Some(&f) = self.glue.get(&key) {
            return f;
        }
        let (name, ptr_ty) = match key {
            Glue::String => ("_apic_drop$string".to_owned(), self.module.rt.string_ptr),
            Glue::Pool => ("_apic_drop$pool".to_owned(), self.module.rt.pool_ptr),
            Glue::Reference(ty) | Glue::Map(ty) => (format!("_apic_drop${}", ty.raw()), self.target(ty)),
        };
        let f = self
            .module
            .declare_function(name.clone(), vec![ptr_ty], TyId::VOID);
        self.glue.insert(key, f);
        tracing::trace!(glue = %name, "generating drop function");

        let mut b = FunctionBuilder::new(name, &[ptr_ty], TyId::VOID);
        let ptr = b.param(0);
        match key {
            Glue::String | Glue::Pool => self.emit_free(&mut b, ptr),
            Glue::Reference(ty) => {
                if let TypeKind::Reference { to } = self.program.types.kind(ty) {
                    let payload = b.field_ptr(&mut self.module.tys, ptr, REF_VALUE);
                    let value = b.load(&self.module.tys, payload);
                    self.release(&mut b, value, *to);
                }
                self.emit_free(&mut b, ptr);
            }
            Glue::Map(ty) => {
                let sig = self.map_sig(ty);
                Self::runtime_effect(&mut b, RuntimeFn::FreeMap(sig), &[ptr]);
            }
        }
        b.ret(None);
        self.module.define_function(f, b.finish());
        f
    }

    /// `apic_free(ptr->arena, ptr)`.
    fn emit_free(&mut self, b: &mut FunctionBuilder, ptr: Value) {
        let arena = b.load_field(&mut self.module.tys, ptr, field::ARENA);
        let raw = b.cast(CastOp::PtrToPtr, ptr, TyId::BYTE_PTR);
        Self::runtime_effect(b, RuntimeFn::Free, &[arena, raw]);
    }

    /// Key/value representation and release descriptors of a map type.
    pub(crate) fn map_sig(&mut self, ty: TypeId) -> MapSig {
        let (key, value) = self.map_entry_types(ty);
        MapSig {
            key: self.storage(key),
            value: self.storage(value),
            key_release: self.release_descriptor(key),
            value_release: self.release_descriptor(value),
        }
    }

    /// Semantic key and value types of a map type.
    pub(crate) fn map_entry_types(&self, ty: TypeId) -> (TypeId, TypeId) {
        let types = &self.program.types;
        match types.kind(types.underlying(ty)) {
            TypeKind::Map { key, value } => (*key, *value),
            _ => (TypeId::VOID, TypeId::VOID),
        }
    }

    fn release_descriptor(&mut self, ty: TypeId) -> Release {
        match self.ownership_of(ty) {
            Ownership::Scalar => Release::None,
            Ownership::Counted => Release::Rc(self.drop_glue(ty)),
            Ownership::Slice => Release::Slice(self.pool_glue()),
            Ownership::Aggregate => {
                tracing::warn!(
                    ty = %self.describe(ty),
                    "map entries holding counted fields inline are not released"
                );
                Release::None
            }
        }
    }
}
