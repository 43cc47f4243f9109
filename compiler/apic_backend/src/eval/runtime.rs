//! Native implementations of the runtime callbacks.

use std::cmp::Ordering;

use super::value::{self, Raw};
use super::{ExecError, ExecResult, Machine};
use crate::runtime::{field, MapSig, Release, RuntimeFn};

fn arg(args: &[Raw], index: usize) -> ExecResult<&Raw> {
    args.get(index).ok_or(ExecError::ArityMismatch {
        function: "runtime callback".to_owned(),
        expected: index + 1,
        found: args.len(),
    })
}

fn uint_arg(args: &[Raw], index: usize) -> ExecResult<u64> {
    arg(args, index).map(|raw| value::to_uint(raw))
}

impl Machine<'_> {
    pub(super) fn runtime(&mut self, f: RuntimeFn, args: &[Raw]) -> ExecResult<Option<Raw>> {
        tracing::trace!(callback = f.name(), "runtime call");
        match f {
            RuntimeFn::Alloc => {
                let arena = uint_arg(args, 0)?;
                if arena == 0 {
                    return Err(ExecError::NullDereference);
                }
                let size = uint_arg(args, 1)?;
                let addr = self.alloc(size, super::AllocKind::Heap);
                Ok(Some(value::from_uint(addr, 8)))
            }
            RuntimeFn::Free => {
                self.heap.free(uint_arg(args, 1)?)?;
                Ok(None)
            }
            RuntimeFn::MakeString => {
                let (arena, len, data) = (uint_arg(args, 0)?, uint_arg(args, 1)?, uint_arg(args, 2)?);
                let bytes = if len == 0 {
                    Vec::new()
                } else {
                    self.heap.read(data, len)?.to_vec()
                };
                let s = self.new_string(arena, &bytes)?;
                Ok(Some(value::from_uint(s, 8)))
            }
            RuntimeFn::StringCompare => {
                let a = self.string_bytes(uint_arg(args, 0)?)?;
                let b = self.string_bytes(uint_arg(args, 1)?)?;
                let result: i32 = match a.cmp(&b) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                };
                Ok(Some(Raw::from_slice(&result.to_le_bytes())))
            }
            RuntimeFn::StringConcat => {
                let arena = uint_arg(args, 0)?;
                let mut bytes = self.string_bytes(uint_arg(args, 1)?)?;
                bytes.extend(self.string_bytes(uint_arg(args, 2)?)?);
                let s = self.new_string(arena, &bytes)?;
                Ok(Some(value::from_uint(s, 8)))
            }
            RuntimeFn::MakePool => {
                let pool = self.new_pool(uint_arg(args, 0)?, uint_arg(args, 1)?)?;
                Ok(Some(value::from_uint(pool, 8)))
            }
            RuntimeFn::CopySlice => {
                let (_, dst_base, dst_size, _) = self.slice_parts(arg(args, 0)?);
                let (_, src_base, src_size, _) = self.slice_parts(arg(args, 1)?);
                let n = dst_size.min(src_size);
                if n > 0 {
                    let bytes = self.heap.read(src_base, n)?.to_vec();
                    self.heap.write(dst_base, &bytes)?;
                }
                Ok(None)
            }
            RuntimeFn::PointerToSlice => {
                let (arena, base, size, count) = (
                    uint_arg(args, 0)?,
                    uint_arg(args, 1)?,
                    uint_arg(args, 2)?,
                    uint_arg(args, 3)?,
                );
                let bytes = if size == 0 {
                    Vec::new()
                } else {
                    self.heap.read(base, size)?.to_vec()
                };
                Ok(Some(self.new_slice(arena, &bytes, count)?))
            }
            RuntimeFn::MapContains(sig) => {
                let found = self.map_find(sig, uint_arg(args, 0)?, arg(args, 1)?)?;
                Ok(Some(value::from_bool(found.is_some())))
            }
            RuntimeFn::MapLookup(sig) => {
                let found = self.map_find(sig, uint_arg(args, 0)?, arg(args, 1)?)?;
                Ok(Some(found.unwrap_or_else(|| {
                    value::zeros(self.module.tys.size_of(sig.value))
                })))
            }
            RuntimeFn::FreeMap(sig) => {
                let map = uint_arg(args, 0)?;
                let entries = self
                    .maps
                    .remove(&map)
                    .ok_or(ExecError::InvalidAddress { addr: map })?;
                for (key, val) in entries {
                    self.release_entry(sig.key_release, &key)?;
                    self.release_entry(sig.value_release, &val)?;
                }
                self.heap.free(map)?;
                Ok(None)
            }
        }
    }

    fn map_find(&self, sig: MapSig, map: u64, key: &Raw) -> ExecResult<Option<Raw>> {
        // Touch the header so lookups on freed maps fail loudly.
        self.ref_count(map)?;
        let entries = self
            .maps
            .get(&map)
            .ok_or(ExecError::InvalidAddress { addr: map })?;
        let string_keys = sig.key == self.module.rt.string_ptr;
        for (k, v) in entries {
            let equal = if string_keys {
                self.string_bytes(value::to_uint(k))? == self.string_bytes(value::to_uint(key))?
            } else {
                k == key
            };
            if equal {
                return Ok(Some(v.clone()));
            }
        }
        Ok(None)
    }

    fn release_entry(&mut self, release: Release, raw: &Raw) -> ExecResult<()> {
        match release {
            Release::None => Ok(()),
            Release::Rc(drop) => self.rc_dec(value::to_uint(raw), drop),
            Release::Slice(drop) => {
                let offset = self.module.tys.offset_of(self.module.rt.slice, field::SLICE_POOL);
                let offset = usize::try_from(offset).unwrap_or(0);
                let pool = value::to_uint(&raw[offset..offset + 8]);
                self.rc_dec(pool, drop)
            }
        }
    }
}
