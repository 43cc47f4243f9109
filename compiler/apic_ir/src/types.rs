//! Semantic types.
//!
//! Every semantic type lives in a [`TypePool`] and is referenced by its
//! 32-bit [`TypeId`]. Builtins have fixed indices so that checks like
//! `ty == TypeId::STRING` are a single comparison.
//!
//! Structural types (references, slices, pointers, maps, static arrays) are
//! deduplicated: asking for `slice(u8)` twice yields the same id. Nominal
//! types (classes, enums, pseudonyms) get a fresh id per declaration. Classes
//! are declared before their fields are defined so that a class can hold a
//! reference to itself.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::{ExprId, Name, StringInterner};

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const VOID: Self = Self(0);
    pub const BOOL: Self = Self(1);
    pub const INT8: Self = Self(2);
    pub const INT16: Self = Self(3);
    pub const INT32: Self = Self(4);
    pub const INT64: Self = Self(5);
    pub const UINT8: Self = Self(6);
    pub const UINT16: Self = Self(7);
    pub const UINT32: Self = Self(8);
    pub const UINT64: Self = Self(9);
    pub const FLOAT32: Self = Self(10);
    pub const FLOAT64: Self = Self(11);
    pub const STRING: Self = Self(12);

    /// First index for types created after pool construction.
    pub const FIRST_DYNAMIC: u32 = 13;

    /// Sentinel value indicating no type.
    pub const NONE: Self = Self(u32::MAX);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is one of the pre-registered builtins.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }
}

/// Builtin scalar and string types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Builtin {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
}

impl Builtin {
    /// All builtins in `TypeId` order.
    pub const ALL: [Builtin; 13] = [
        Builtin::Void,
        Builtin::Bool,
        Builtin::Int8,
        Builtin::Int16,
        Builtin::Int32,
        Builtin::Int64,
        Builtin::Uint8,
        Builtin::Uint16,
        Builtin::Uint32,
        Builtin::Uint64,
        Builtin::Float32,
        Builtin::Float64,
        Builtin::String,
    ];

    pub fn is_integer(self) -> bool {
        self.int_bits().is_some()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Builtin::Int8 | Builtin::Int16 | Builtin::Int32 | Builtin::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Builtin::Float32 | Builtin::Float64)
    }

    /// Bit width of an integer builtin.
    pub fn int_bits(self) -> Option<u8> {
        match self {
            Builtin::Int8 | Builtin::Uint8 => Some(8),
            Builtin::Int16 | Builtin::Uint16 => Some(16),
            Builtin::Int32 | Builtin::Uint32 => Some(32),
            Builtin::Int64 | Builtin::Uint64 => Some(64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Builtin::Void => "void",
            Builtin::Bool => "bool",
            Builtin::Int8 => "s8",
            Builtin::Int16 => "s16",
            Builtin::Int32 => "s32",
            Builtin::Int64 => "s64",
            Builtin::Uint8 => "u8",
            Builtin::Uint16 => "u16",
            Builtin::Uint32 => "u32",
            Builtin::Uint64 => "u64",
            Builtin::Float32 => "f32",
            Builtin::Float64 => "f64",
            Builtin::String => "string",
        }
    }
}

/// A class field.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub name: Name,
    pub ty: TypeId,
    /// Declared default value, or [`ExprId::INVALID`].
    pub default: ExprId,
}

impl Field {
    pub fn new(name: Name, ty: TypeId) -> Self {
        Self {
            name,
            ty,
            default: ExprId::INVALID,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: ExprId) -> Self {
        self.default = default;
        self
    }
}

/// The shape of a semantic type.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Builtin(Builtin),
    /// An enumeration. Entries are `u32` values.
    Enum { name: Name },
    /// A value-typed aggregate. `fields` is empty until defined.
    Class { name: Name, fields: Vec<Field> },
    /// A reference-counted heap box around a class.
    Reference { to: TypeId },
    Slice { to: TypeId },
    Pointer { to: TypeId },
    StaticArray { of: TypeId, len: u32 },
    Map { key: TypeId, value: TypeId },
    /// A named alias of another type.
    Pseudonym { name: Name, to: TypeId },
}

/// Storage for all semantic types of a program.
pub struct TypePool {
    types: Vec<TypeKind>,
    structural: FxHashMap<TypeKind, TypeId>,
}

impl TypePool {
    pub fn new() -> Self {
        let types = Builtin::ALL.iter().map(|&b| TypeKind::Builtin(b)).collect();
        Self {
            types,
            structural: FxHashMap::default(),
        }
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = u32::try_from(self.types.len())
            .unwrap_or_else(|_| panic!("type count exceeds u32::MAX"));
        self.types.push(kind);
        TypeId(id)
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.structural.get(&kind) {
            return id;
        }
        let id = self.push(kind.clone());
        self.structural.insert(kind, id);
        id
    }

    /// Get the kind of a type.
    ///
    /// # Panics
    /// Panics if `id` does not belong to this pool.
    #[inline]
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn reference(&mut self, to: TypeId) -> TypeId {
        self.intern(TypeKind::Reference { to })
    }

    pub fn slice(&mut self, to: TypeId) -> TypeId {
        self.intern(TypeKind::Slice { to })
    }

    pub fn pointer(&mut self, to: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { to })
    }

    pub fn map(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(TypeKind::Map { key, value })
    }

    pub fn static_array(&mut self, of: TypeId, len: u32) -> TypeId {
        self.intern(TypeKind::StaticArray { of, len })
    }

    pub fn enumeration(&mut self, name: Name) -> TypeId {
        self.push(TypeKind::Enum { name })
    }

    pub fn pseudonym(&mut self, name: Name, to: TypeId) -> TypeId {
        self.push(TypeKind::Pseudonym { name, to })
    }

    /// Declare a class with no fields yet.
    pub fn declare_class(&mut self, name: Name) -> TypeId {
        self.push(TypeKind::Class {
            name,
            fields: Vec::new(),
        })
    }

    /// Define the fields of a previously declared class.
    pub fn define_class(&mut self, class: TypeId, new_fields: Vec<Field>) {
        match &mut self.types[class.index()] {
            TypeKind::Class { fields, .. } => *fields = new_fields,
            other => panic!("define_class on non-class type {other:?}"),
        }
    }

    /// Declare and define a class in one step.
    pub fn class(&mut self, name: Name, fields: Vec<Field>) -> TypeId {
        let id = self.declare_class(name);
        self.define_class(id, fields);
        id
    }

    /// Strip pseudonyms until a non-alias type is reached.
    pub fn underlying(&self, mut id: TypeId) -> TypeId {
        while let TypeKind::Pseudonym { to, .. } = self.kind(id) {
            id = *to;
        }
        id
    }

    /// The builtin behind `id`, after stripping pseudonyms.
    pub fn builtin(&self, id: TypeId) -> Option<Builtin> {
        match self.kind(self.underlying(id)) {
            TypeKind::Builtin(b) => Some(*b),
            _ => None,
        }
    }

    /// The fields of a class (after stripping pseudonyms), or `&[]`.
    pub fn class_fields(&self, id: TypeId) -> &[Field] {
        match self.kind(self.underlying(id)) {
            TypeKind::Class { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Human-readable type name for diagnostics.
    pub fn describe(&self, id: TypeId, interner: &StringInterner) -> String {
        let mut out = String::new();
        self.describe_into(id, interner, &mut out);
        out
    }

    fn describe_into(&self, id: TypeId, interner: &StringInterner, out: &mut String) {
        if id == TypeId::NONE {
            out.push_str("<none>");
            return;
        }
        match self.kind(id) {
            TypeKind::Builtin(b) => out.push_str(b.as_str()),
            TypeKind::Enum { name }
            | TypeKind::Class { name, .. }
            | TypeKind::Pseudonym { name, .. } => out.push_str(interner.lookup(*name)),
            TypeKind::Reference { to } => {
                out.push_str("ref!");
                self.describe_into(*to, interner, out);
            }
            TypeKind::Slice { to } => {
                self.describe_into(*to, interner, out);
                out.push_str("[]");
            }
            TypeKind::Pointer { to } => {
                self.describe_into(*to, interner, out);
                out.push('*');
            }
            TypeKind::StaticArray { of, len } => {
                self.describe_into(*of, interner, out);
                let _ = write!(out, "[{len}]");
            }
            TypeKind::Map { key, value } => {
                out.push_str("map!(");
                self.describe_into(*key, interner, out);
                out.push_str(", ");
                self.describe_into(*value, interner, out);
                out.push(')');
            }
        }
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn builtins_have_fixed_indices() {
        let pool = TypePool::new();
        assert_eq!(pool.kind(TypeId::BOOL), &TypeKind::Builtin(Builtin::Bool));
        assert_eq!(
            pool.kind(TypeId::STRING),
            &TypeKind::Builtin(Builtin::String)
        );
        assert_eq!(pool.len(), TypeId::FIRST_DYNAMIC as usize);
    }

    #[test]
    fn structural_types_are_deduplicated() {
        let mut pool = TypePool::new();
        let a = pool.slice(TypeId::UINT8);
        let b = pool.slice(TypeId::UINT8);
        let c = pool.slice(TypeId::UINT16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nominal_types_are_distinct() {
        let interner = StringInterner::new();
        let mut pool = TypePool::new();
        let name = interner.intern("Handle");
        assert_ne!(pool.enumeration(name), pool.enumeration(name));
    }

    #[test]
    fn underlying_strips_pseudonyms() {
        let interner = StringInterner::new();
        let mut pool = TypePool::new();
        let inner = pool.pseudonym(interner.intern("Size"), TypeId::UINT64);
        let outer = pool.pseudonym(interner.intern("Count"), inner);
        assert_eq!(pool.underlying(outer), TypeId::UINT64);
        assert_eq!(pool.builtin(outer), Some(Builtin::Uint64));
    }

    #[test]
    fn self_referential_class() {
        let interner = StringInterner::new();
        let mut pool = TypePool::new();
        let node = pool.declare_class(interner.intern("Node"));
        let node_ref = pool.reference(node);
        pool.define_class(
            node,
            vec![
                Field::new(interner.intern("value"), TypeId::UINT32),
                Field::new(interner.intern("next"), node_ref),
            ],
        );
        assert_eq!(pool.class_fields(node).len(), 2);
        assert_eq!(pool.class_fields(node)[1].ty, node_ref);
    }

    #[test]
    fn describe_composite_types() {
        let interner = StringInterner::new();
        let mut pool = TypePool::new();
        let class = pool.class(interner.intern("Buffer"), vec![]);
        let r = pool.reference(class);
        let s = pool.slice(TypeId::UINT8);
        let m = pool.map(TypeId::STRING, r);
        assert_eq!(pool.describe(r, &interner), "ref!Buffer");
        assert_eq!(pool.describe(s, &interner), "u8[]");
        assert_eq!(pool.describe(m, &interner), "map!(string, ref!Buffer)");
    }

    #[test]
    fn builtin_properties() {
        assert!(Builtin::Int16.is_signed());
        assert!(!Builtin::Uint16.is_signed());
        assert_eq!(Builtin::Uint32.int_bits(), Some(32));
        assert!(Builtin::Float32.is_float());
        assert!(!Builtin::Bool.is_integer());
    }
}
