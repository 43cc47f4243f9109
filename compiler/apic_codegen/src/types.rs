//! Semantic type to representation type mapping.
//!
//! Every semantic type has a *target* representation (how the value is held
//! while computing) and a *storage* representation (how it is laid out in
//! memory: globals, reference payloads, slice elements, map entries). The
//! two only differ for "packed" types: `bool` is held as `bool` but stored
//! as `u8`, and classes or static arrays containing a packed type by value
//! get a separate `<name>.storage` struct.
//!
//! Named structs are declared and cached before their bodies are computed,
//! so recursive types (a class holding a reference to itself) terminate.

use apic_backend::{CastOp, FunctionBuilder, Module, RuntimeTypes, TyId, Value};
use apic_ir::{Builtin, Program, TypeId, TypeKind};
use rustc_hash::FxHashMap;

/// Payload field of a reference header `{ ref_count, arena, value }`.
pub const REF_VALUE: u32 = 2;

/// Fields of the context struct passed as every function's first argument.
pub const CTX_GLOBALS: u32 = 0;
pub const CTX_ARENA: u32 = 1;

/// Fields of a subroutine result `{ error, value }`.
pub const RESULT_ERROR: u32 = 0;
pub const RESULT_VALUE: u32 = 1;

/// Error code of a subroutine that completed normally.
pub const ERR_SUCCESS: u32 = 0;

fn builtin_target(b: Builtin, rt: &RuntimeTypes) -> TyId {
    match b {
        Builtin::Void => TyId::VOID,
        Builtin::Bool => TyId::BOOL,
        Builtin::Int8 => TyId::I8,
        Builtin::Int16 => TyId::I16,
        Builtin::Int32 => TyId::I32,
        Builtin::Int64 => TyId::I64,
        Builtin::Uint8 => TyId::U8,
        Builtin::Uint16 => TyId::U16,
        Builtin::Uint32 => TyId::U32,
        Builtin::Uint64 => TyId::U64,
        Builtin::Float32 => TyId::F32,
        Builtin::Float64 => TyId::F64,
        Builtin::String => rt.string_ptr,
    }
}

/// Memoized semantic → representation type resolver.
#[derive(Default)]
pub struct TypeMapper {
    target: FxHashMap<TypeId, TyId>,
    storage: FxHashMap<TypeId, TyId>,
    packed: FxHashMap<TypeId, bool>,
    results: FxHashMap<TypeId, TyId>,
}

impl TypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// The register representation of `ty`.
    pub fn target(&mut self, p: &Program, m: &mut Module, ty: TypeId) -> TyId {
        if let Some(&mapped) = self.target.get(&ty) {
            return mapped;
        }
        let mapped = match p.types.kind(ty) {
            TypeKind::Builtin(b) => builtin_target(*b, &m.rt),
            TypeKind::Enum { .. } => TyId::U32,
            TypeKind::Class { name, fields } => {
                let id = m.tys.declare_struct(p.interner.lookup(*name));
                self.target.insert(ty, id);
                let body = fields.iter().map(|f| self.target(p, m, f.ty)).collect();
                m.tys.set_struct_body(id, body);
                id
            }
            TypeKind::Reference { to } => self.reference(p, m, ty, *to),
            TypeKind::Slice { .. } => m.rt.slice,
            TypeKind::Map { .. } => m.rt.map_ptr,
            TypeKind::Pointer { to } => {
                let elem = self.storage(p, m, *to);
                m.tys.pointer(elem)
            }
            TypeKind::StaticArray { of, len } => {
                let elem = self.target(p, m, *of);
                m.tys.array(elem, *len)
            }
            TypeKind::Pseudonym { to, .. } => self.target(p, m, *to),
        };
        self.target.insert(ty, mapped);
        mapped
    }

    /// The in-memory representation of `ty`.
    pub fn storage(&mut self, p: &Program, m: &mut Module, ty: TypeId) -> TyId {
        if let Some(&mapped) = self.storage.get(&ty) {
            return mapped;
        }
        if !self.is_packed(p, ty) {
            let mapped = self.target(p, m, ty);
            self.storage.insert(ty, mapped);
            return mapped;
        }
        let mapped = match p.types.kind(ty) {
            TypeKind::Class { name, fields } => {
                let id = m
                    .tys
                    .declare_struct(format!("{}.storage", p.interner.lookup(*name)));
                self.storage.insert(ty, id);
                let body = fields.iter().map(|f| self.storage(p, m, f.ty)).collect();
                m.tys.set_struct_body(id, body);
                id
            }
            TypeKind::StaticArray { of, len } => {
                let elem = self.storage(p, m, *of);
                m.tys.array(elem, *len)
            }
            TypeKind::Pseudonym { to, .. } => self.storage(p, m, *to),
            TypeKind::Builtin(Builtin::Bool) => TyId::U8,
            _ => self.target(p, m, ty),
        };
        self.storage.insert(ty, mapped);
        mapped
    }

    /// `{ ref_count: u32, arena: u8*, value: storage(to) }*`
    fn reference(&mut self, p: &Program, m: &mut Module, ty: TypeId, to: TypeId) -> TyId {
        let header = m
            .tys
            .declare_struct(format!("ref!{}", p.types.describe(to, &p.interner)));
        let ptr = m.tys.pointer(header);
        self.target.insert(ty, ptr);
        self.storage.insert(ty, ptr);
        let value = self.storage(p, m, to);
        m.tys
            .set_struct_body(header, vec![TyId::U32, TyId::BYTE_PTR, value]);
        ptr
    }

    /// Whether storage and target representations of `ty` differ.
    pub fn is_packed(&mut self, p: &Program, ty: TypeId) -> bool {
        if let Some(&packed) = self.packed.get(&ty) {
            return packed;
        }
        // Provisional answer while the fields are visited.
        self.packed.insert(ty, false);
        let packed = match p.types.kind(ty) {
            TypeKind::Builtin(b) => *b == Builtin::Bool,
            TypeKind::Class { fields, .. } => fields.iter().any(|f| self.is_packed(p, f.ty)),
            TypeKind::StaticArray { of, .. } => self.is_packed(p, *of),
            TypeKind::Pseudonym { to, .. } => self.is_packed(p, *to),
            TypeKind::Enum { .. }
            | TypeKind::Reference { .. }
            | TypeKind::Slice { .. }
            | TypeKind::Pointer { .. }
            | TypeKind::Map { .. } => false,
        };
        self.packed.insert(ty, packed);
        packed
    }

    /// Result struct returned by a subroutine declared to return `ty`:
    /// `{ error: u32, value }`, or `{ error: u32 }` for void.
    pub fn result(&mut self, p: &Program, m: &mut Module, ty: TypeId) -> TyId {
        if let Some(&mapped) = self.results.get(&ty) {
            return mapped;
        }
        let mut fields = vec![TyId::U32];
        let value = self.target(p, m, ty);
        if value != TyId::VOID {
            fields.push(value);
        }
        let name = format!("result!{}", p.types.describe(ty, &p.interner));
        let mapped = m.tys.structure(name, fields);
        self.results.insert(ty, mapped);
        mapped
    }

    /// Convert a value loaded from memory into its target representation.
    pub fn to_target(
        &mut self,
        p: &Program,
        m: &mut Module,
        b: &mut FunctionBuilder,
        value: Value,
        ty: TypeId,
    ) -> Value {
        if !self.is_packed(p, ty) {
            return value;
        }
        let ty = p.types.underlying(ty);
        match p.types.kind(ty) {
            TypeKind::Builtin(Builtin::Bool) => b.cast(CastOp::IntToBool, value, TyId::BOOL),
            TypeKind::Class { fields, .. } => {
                let target = self.target(p, m, ty);
                let mut out = b.zero(target);
                for (i, f) in (0u32..).zip(fields) {
                    let field = b.extract(&m.tys, value, i);
                    let field = self.to_target(p, m, b, field, f.ty);
                    out = b.insert(&m.tys, out, i, field);
                }
                out
            }
            TypeKind::StaticArray { of, len } => {
                let target = self.target(p, m, ty);
                let mut out = b.zero(target);
                for i in 0..*len {
                    let elem = b.extract(&m.tys, value, i);
                    let elem = self.to_target(p, m, b, elem, *of);
                    out = b.insert(&m.tys, out, i, elem);
                }
                out
            }
            _ => value,
        }
    }

    /// Convert a value into its storage representation before a store.
    pub fn to_storage(
        &mut self,
        p: &Program,
        m: &mut Module,
        b: &mut FunctionBuilder,
        value: Value,
        ty: TypeId,
    ) -> Value {
        if !self.is_packed(p, ty) {
            return value;
        }
        let ty = p.types.underlying(ty);
        match p.types.kind(ty) {
            TypeKind::Builtin(Builtin::Bool) => b.cast(CastOp::BoolToInt, value, TyId::U8),
            TypeKind::Class { fields, .. } => {
                let storage = self.storage(p, m, ty);
                let mut out = b.zero(storage);
                for (i, f) in (0u32..).zip(fields) {
                    let field = b.extract(&m.tys, value, i);
                    let field = self.to_storage(p, m, b, field, f.ty);
                    out = b.insert(&m.tys, out, i, field);
                }
                out
            }
            TypeKind::StaticArray { of, len } => {
                let storage = self.storage(p, m, ty);
                let mut out = b.zero(storage);
                for i in 0..*len {
                    let elem = b.extract(&m.tys, value, i);
                    let elem = self.to_storage(p, m, b, elem, *of);
                    out = b.insert(&m.tys, out, i, elem);
                }
                out
            }
            _ => value,
        }
    }
}
