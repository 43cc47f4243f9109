//! Representation types and their memory layout.
//!
//! A [`TyTable`] owns every representation type of a module. Scalars have
//! fixed ids (like the semantic pool's builtins); pointers and arrays are
//! deduplicated; structs are nominal and may be declared before their body
//! is known so that a struct can point to itself.
//!
//! Layout follows C rules on a 64-bit target: pointers are 8 bytes, fields
//! are aligned to their natural alignment, and a struct's size is rounded up
//! to its alignment.

use std::fmt;

use rustc_hash::FxHashMap;

/// Handle to a representation type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TyId(u32);

impl TyId {
    pub const VOID: Self = Self(0);
    pub const BOOL: Self = Self(1);
    pub const I8: Self = Self(2);
    pub const I16: Self = Self(3);
    pub const I32: Self = Self(4);
    pub const I64: Self = Self(5);
    pub const U8: Self = Self(6);
    pub const U16: Self = Self(7);
    pub const U32: Self = Self(8);
    pub const U64: Self = Self(9);
    pub const F32: Self = Self(10);
    pub const F64: Self = Self(11);
    /// `u8*`, the untyped byte pointer used for arenas and raw buffers.
    pub const BYTE_PTR: Self = Self(12);

    pub const FIRST_DYNAMIC: u32 = 13;

    /// Sentinel for "no type".
    pub const NONE: Self = Self(u32::MAX);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TyId({})", self.0)
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TyKind {
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    F32,
    F64,
    Pointer(TyId),
    /// A named struct. `fields` stays empty until the body is set.
    Struct { name: String, fields: Vec<TyId> },
    Array { elem: TyId, len: u32 },
}

/// Owner of all representation types of a module.
pub struct TyTable {
    kinds: Vec<TyKind>,
    interned: FxHashMap<TyKind, TyId>,
}

impl Default for TyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TyTable {
    pub fn new() -> Self {
        let int = |bits, signed| TyKind::Int { bits, signed };
        let kinds = vec![
            TyKind::Void,
            TyKind::Bool,
            int(8, true),
            int(16, true),
            int(32, true),
            int(64, true),
            int(8, false),
            int(16, false),
            int(32, false),
            int(64, false),
            TyKind::F32,
            TyKind::F64,
            TyKind::Pointer(TyId::U8),
        ];
        let interned = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), TyId(i as u32)))
            .collect();
        Self { kinds, interned }
    }

    fn push(&mut self, kind: TyKind) -> TyId {
        let id = TyId(
            u32::try_from(self.kinds.len())
                .unwrap_or_else(|_| panic!("type table exceeds u32::MAX entries")),
        );
        self.kinds.push(kind);
        id
    }

    fn intern(&mut self, kind: TyKind) -> TyId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = self.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    #[inline]
    pub fn kind(&self, id: TyId) -> &TyKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The integer type with the given width and signedness.
    pub fn int(bits: u8, signed: bool) -> TyId {
        match (bits, signed) {
            (8, true) => TyId::I8,
            (16, true) => TyId::I16,
            (32, true) => TyId::I32,
            (64, true) => TyId::I64,
            (8, false) => TyId::U8,
            (16, false) => TyId::U16,
            (32, false) => TyId::U32,
            (64, false) => TyId::U64,
            _ => panic!("no {bits}-bit integer type"),
        }
    }

    pub fn pointer(&mut self, to: TyId) -> TyId {
        self.intern(TyKind::Pointer(to))
    }

    pub fn array(&mut self, elem: TyId, len: u32) -> TyId {
        self.intern(TyKind::Array { elem, len })
    }

    /// Declare a named struct whose body is set later.
    pub fn declare_struct(&mut self, name: impl Into<String>) -> TyId {
        self.push(TyKind::Struct {
            name: name.into(),
            fields: Vec::new(),
        })
    }

    pub fn set_struct_body(&mut self, id: TyId, body: Vec<TyId>) {
        match &mut self.kinds[id.index()] {
            TyKind::Struct { fields, .. } => *fields = body,
            other => panic!("set_struct_body on non-struct {other:?}"),
        }
    }

    pub fn structure(&mut self, name: impl Into<String>, fields: Vec<TyId>) -> TyId {
        let id = self.declare_struct(name);
        self.set_struct_body(id, fields);
        id
    }

    // Queries

    /// Width and signedness of an integer type.
    pub fn int_info(&self, id: TyId) -> Option<(u8, bool)> {
        match self.kind(id) {
            TyKind::Int { bits, signed } => Some((*bits, *signed)),
            _ => None,
        }
    }

    pub fn is_pointer(&self, id: TyId) -> bool {
        matches!(self.kind(id), TyKind::Pointer(_))
    }

    pub fn is_float(&self, id: TyId) -> bool {
        matches!(self.kind(id), TyKind::F32 | TyKind::F64)
    }

    pub fn pointee(&self, id: TyId) -> Option<TyId> {
        match self.kind(id) {
            TyKind::Pointer(to) => Some(*to),
            _ => None,
        }
    }

    /// Type of field `index` of a struct, or the element type of an array.
    pub fn field(&self, id: TyId, index: u32) -> Option<TyId> {
        match self.kind(id) {
            TyKind::Struct { fields, .. } => fields.get(index as usize).copied(),
            TyKind::Array { elem, len } if index < *len => Some(*elem),
            _ => None,
        }
    }

    // Layout

    pub fn size_of(&self, id: TyId) -> u64 {
        match self.kind(id) {
            TyKind::Void => 0,
            TyKind::Bool => 1,
            TyKind::Int { bits, .. } => u64::from(*bits) / 8,
            TyKind::F32 => 4,
            TyKind::F64 | TyKind::Pointer(_) => 8,
            TyKind::Struct { fields, .. } => {
                let mut offset = 0;
                for &f in fields {
                    offset = align_to(offset, self.align_of(f)) + self.size_of(f);
                }
                align_to(offset, self.align_of(id))
            }
            TyKind::Array { elem, len } => self.size_of(*elem) * u64::from(*len),
        }
    }

    pub fn align_of(&self, id: TyId) -> u64 {
        match self.kind(id) {
            TyKind::Struct { fields, .. } => {
                fields.iter().map(|&f| self.align_of(f)).max().unwrap_or(1)
            }
            TyKind::Array { elem, .. } => self.align_of(*elem),
            TyKind::Void => 1,
            _ => self.size_of(id),
        }
    }

    /// Byte offset of field `index` inside a struct or array.
    pub fn offset_of(&self, id: TyId, index: u32) -> u64 {
        match self.kind(id) {
            TyKind::Struct { fields, .. } => {
                let mut offset = 0;
                for (i, &f) in fields.iter().enumerate() {
                    offset = align_to(offset, self.align_of(f));
                    if i == index as usize {
                        return offset;
                    }
                    offset += self.size_of(f);
                }
                panic!("field {index} out of range for {}", self.display(id))
            }
            TyKind::Array { elem, .. } => self.size_of(*elem) * u64::from(index),
            _ => panic!("offset_of on non-aggregate {}", self.display(id)),
        }
    }

    /// Human-readable type name.
    pub fn display(&self, id: TyId) -> String {
        if id == TyId::NONE {
            return "<none>".to_owned();
        }
        match self.kind(id) {
            TyKind::Void => "void".to_owned(),
            TyKind::Bool => "bool".to_owned(),
            TyKind::Int { bits, signed } => format!("{}{bits}", if *signed { 'i' } else { 'u' }),
            TyKind::F32 => "f32".to_owned(),
            TyKind::F64 => "f64".to_owned(),
            TyKind::Pointer(to) => format!("{}*", self.display(*to)),
            TyKind::Struct { name, .. } => format!("%{name}"),
            TyKind::Array { elem, len } => format!("[{len} x {}]", self.display(*elem)),
        }
    }
}

#[inline]
pub fn align_to(offset: u64, align: u64) -> u64 {
    offset.div_ceil(align.max(1)) * align.max(1)
}
