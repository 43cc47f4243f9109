//! Runtime ABI: object layouts and callback declarations.
//!
//! Every reference-counted runtime object starts with a `u32` reference
//! count at offset 0 followed by the arena pointer it was allocated from.
//! Objects are single allocations: a string's bytes and a pool's buffer
//! live directly after their header.

use smallvec::{smallvec, SmallVec};

use crate::ir::FuncId;
use crate::ty::{TyId, TyTable};

/// Field indices of the runtime structs.
pub mod field {
    /// `u32` reference count, shared by all counted objects.
    pub const REF_COUNT: u32 = 0;
    /// Arena the object was allocated from, shared by all counted objects.
    pub const ARENA: u32 = 1;

    pub const STRING_LENGTH: u32 = 2;
    pub const STRING_DATA: u32 = 3;

    pub const POOL_BUFFER: u32 = 2;
    pub const POOL_SIZE: u32 = 3;

    pub const SLICE_POOL: u32 = 0;
    pub const SLICE_BASE: u32 = 1;
    pub const SLICE_SIZE: u32 = 2;
    pub const SLICE_COUNT: u32 = 3;

    pub const MAP_COUNT: u32 = 2;
}

/// Representation types of the runtime objects, registered once per module.
#[derive(Copy, Clone, Debug)]
pub struct RuntimeTypes {
    /// `{ ref_count: u32, arena: u8*, length: u64, data: u8* }`
    pub string: TyId,
    pub string_ptr: TyId,
    /// `{ ref_count: u32, arena: u8*, buffer: u8*, size: u64 }`
    pub pool: TyId,
    pub pool_ptr: TyId,
    /// `{ pool: pool*, base: u8*, size: u64, count: u64 }`, passed by value.
    pub slice: TyId,
    /// `{ ref_count: u32, arena: u8*, count: u64 }`; entries live in the runtime.
    pub map: TyId,
    pub map_ptr: TyId,
}

impl RuntimeTypes {
    pub fn declare(tys: &mut TyTable) -> Self {
        let string = tys.structure(
            "string",
            vec![TyId::U32, TyId::BYTE_PTR, TyId::U64, TyId::BYTE_PTR],
        );
        let string_ptr = tys.pointer(string);
        let pool = tys.structure(
            "pool",
            vec![TyId::U32, TyId::BYTE_PTR, TyId::BYTE_PTR, TyId::U64],
        );
        let pool_ptr = tys.pointer(pool);
        let slice = tys.structure(
            "slice",
            vec![pool_ptr, TyId::BYTE_PTR, TyId::U64, TyId::U64],
        );
        let map = tys.structure("map", vec![TyId::U32, TyId::BYTE_PTR, TyId::U64]);
        let map_ptr = tys.pointer(map);
        Self {
            string,
            string_ptr,
            pool,
            pool_ptr,
            slice,
            map,
            map_ptr,
        }
    }
}

/// How the runtime releases a key or value it owns.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Release {
    None,
    /// A counted pointer, dropped through the given glue.
    Rc(FuncId),
    /// A slice; its pool is dropped through the given glue.
    Slice(FuncId),
}

/// Key and value representation of one map type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct MapSig {
    pub key: TyId,
    pub value: TyId,
    pub key_release: Release,
    pub value_release: Release,
}

/// Callbacks provided by the runtime.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RuntimeFn {
    /// `(arena, size, align) -> u8*`, zeroed.
    Alloc,
    /// `(arena, ptr)`.
    Free,
    /// `(arena, length, data) -> string*` with a count of one.
    MakeString,
    /// `(a, b) -> i32`, negative/zero/positive. Null compares as empty.
    StringCompare,
    /// `(arena, a, b) -> string*` with a count of one.
    StringConcat,
    /// `(arena, size) -> pool*`, zeroed, with a count of one.
    MakePool,
    /// `(dst, src)`: copy `min(dst.size, src.size)` bytes.
    CopySlice,
    /// `(arena, base, size, count) -> slice` over a fresh pool holding a copy
    /// of `size` bytes at `base`.
    PointerToSlice,
    /// `(map, key) -> bool`.
    MapContains(MapSig),
    /// `(map, key) -> value`, borrowed; zero when absent.
    MapLookup(MapSig),
    /// `(map)`: release every entry and free the map.
    FreeMap(MapSig),
}

impl RuntimeFn {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::Alloc => "apic_alloc",
            RuntimeFn::Free => "apic_free",
            RuntimeFn::MakeString => "apic_make_string",
            RuntimeFn::StringCompare => "apic_string_compare",
            RuntimeFn::StringConcat => "apic_string_concat",
            RuntimeFn::MakePool => "apic_make_pool",
            RuntimeFn::CopySlice => "apic_copy_slice",
            RuntimeFn::PointerToSlice => "apic_pointer_to_slice",
            RuntimeFn::MapContains(_) => "apic_map_contains",
            RuntimeFn::MapLookup(_) => "apic_map_lookup",
            RuntimeFn::FreeMap(_) => "apic_free_map",
        }
    }

    /// Parameter and return types. Pointer parameters listed as `u8*`
    /// accept any pointer.
    pub fn signature(self, rt: &RuntimeTypes) -> (SmallVec<[TyId; 4]>, TyId) {
        let ptr = TyId::BYTE_PTR;
        match self {
            RuntimeFn::Alloc => (smallvec![ptr, TyId::U64, TyId::U64], ptr),
            RuntimeFn::Free => (smallvec![ptr, ptr], TyId::VOID),
            RuntimeFn::MakeString => (smallvec![ptr, TyId::U64, ptr], rt.string_ptr),
            RuntimeFn::StringCompare => (smallvec![rt.string_ptr, rt.string_ptr], TyId::I32),
            RuntimeFn::StringConcat => (
                smallvec![ptr, rt.string_ptr, rt.string_ptr],
                rt.string_ptr,
            ),
            RuntimeFn::MakePool => (smallvec![ptr, TyId::U64], rt.pool_ptr),
            RuntimeFn::CopySlice => (smallvec![rt.slice, rt.slice], TyId::VOID),
            RuntimeFn::PointerToSlice => (smallvec![ptr, ptr, TyId::U64, TyId::U64], rt.slice),
            RuntimeFn::MapContains(sig) => (smallvec![rt.map_ptr, sig.key], TyId::BOOL),
            RuntimeFn::MapLookup(sig) => (smallvec![rt.map_ptr, sig.key], sig.value),
            RuntimeFn::FreeMap(_) => (smallvec![rt.map_ptr], TyId::VOID),
        }
    }

    pub fn return_type(self, rt: &RuntimeTypes) -> TyId {
        self.signature(rt).1
    }
}
