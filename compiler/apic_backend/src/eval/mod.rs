//! Reference evaluator.
//!
//! [`Machine`] interprets a [`Module`] directly: values are byte images
//! (see [`value`]), memory is a tracked [`Heap`](heap::Heap), and every
//! [`RuntimeFn`](crate::RuntimeFn) is implemented natively. It exists to
//! observe what generated code does at run time: results, evaluation order,
//! and whether every counted object is released exactly once.

mod error;
mod heap;
mod runtime;
pub mod value;

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, Callee, Const, FuncId, Function, Instr, Terminator, ValueId};
use crate::runtime::field;
use crate::ty::{TyId, TyKind};
use crate::Module;

pub use error::{ExecError, ExecResult};
pub use heap::AllocKind;
use heap::Heap;
pub use value::Raw;

const MAX_DEPTH: usize = 256;
const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Runtime-side storage of one map: `(key, value)` images in insertion
/// order.
type MapEntries = Vec<(Raw, Raw)>;

struct Frame<'f> {
    function: &'f Function,
    values: Vec<Option<Raw>>,
    stack: Vec<u64>,
}

impl Frame<'_> {
    fn get(&self, id: ValueId) -> ExecResult<&Raw> {
        self.values
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ExecError::UndefinedValue {
                function: self.function.name.clone(),
                value: id.raw(),
            })
    }

    fn set(&mut self, id: ValueId, raw: Raw) {
        self.values[id.index()] = Some(raw);
    }

    fn ty(&self, id: ValueId) -> TyId {
        self.function.value_types[id.index()]
    }
}

/// Interpreter over a finished module.
pub struct Machine<'m> {
    module: &'m Module,
    heap: Heap,
    data: Vec<u64>,
    maps: FxHashMap<u64, MapEntries>,
    depth: usize,
    steps: u64,
    step_limit: u64,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m Module) -> Self {
        let mut heap = Heap::default();
        let data = (0..module.data_count())
            .map(|i| {
                let bytes = module.data(crate::ir::DataId::new(i as u32));
                let addr = heap.alloc(bytes.len() as u64, AllocKind::Static);
                // A fresh allocation of exactly this size cannot fail.
                let _ = heap.write(addr, bytes);
                addr
            })
            .collect();
        Self {
            module,
            heap,
            data,
            maps: FxHashMap::default(),
            depth: 0,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    #[must_use]
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Heap allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.heap.live_heap()
    }

    pub fn is_live(&self, addr: u64) -> bool {
        self.heap.is_live(addr)
    }

    /// Call a function by name.
    pub fn call_by_name(&mut self, name: &str, args: &[Raw]) -> ExecResult<Option<Raw>> {
        let func = self
            .module
            .function_by_name(name)
            .ok_or_else(|| ExecError::UndefinedFunction {
                name: name.to_owned(),
            })?;
        self.call(func, args)
    }

    pub fn call(&mut self, func: FuncId, args: &[Raw]) -> ExecResult<Option<Raw>> {
        let module = self.module;
        let function = module
            .function(func)
            .ok_or_else(|| ExecError::UndefinedFunction {
                name: module.decl(func).name.clone(),
            })?;
        if args.len() != function.params.len() {
            return Err(ExecError::ArityMismatch {
                function: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= MAX_DEPTH {
            return Err(ExecError::StackOverflow { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let mut frame = Frame {
            function,
            values: vec![None; function.value_types.len()],
            stack: Vec::new(),
        };
        for (i, arg) in args.iter().enumerate() {
            frame.values[i] = Some(arg.clone());
        }
        let result = self.run(&mut frame);
        for addr in frame.stack.drain(..) {
            self.heap.pop_stack(addr);
        }
        self.depth -= 1;
        result
    }

    fn run(&mut self, frame: &mut Frame<'m>) -> ExecResult<Option<Raw>> {
        let function = frame.function;
        let mut block = BlockId::new(0);
        loop {
            let current = function.block(block);
            for instr in &current.body {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(ExecError::StepLimit {
                        limit: self.step_limit,
                    });
                }
                self.exec(frame, instr)?;
            }
            match &current.terminator {
                Terminator::Return(value) => {
                    return value.map(|v| frame.get(v).cloned()).transpose();
                }
                Terminator::Jump(target) => block = *target,
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    block = if value::to_bool(frame.get(*cond)?) {
                        *then_block
                    } else {
                        *else_block
                    };
                }
                Terminator::Unreachable => {
                    return Err(ExecError::Unreachable {
                        function: function.name.clone(),
                        block: block.raw(),
                    });
                }
            }
        }
    }

    fn exec(&mut self, frame: &mut Frame<'m>, instr: &Instr) -> ExecResult<()> {
        let module = self.module;
        let tys = &module.tys;
        match instr {
            Instr::Const { dst, value: constant } => {
                let ty = frame.ty(*dst);
                let raw = match constant {
                    Const::Int(bits) | Const::Float(bits) => value::from_uint(*bits, tys.size_of(ty)),
                    Const::Bool(b) => value::from_bool(*b),
                    Const::Zero => value::zeros(tys.size_of(ty)),
                    Const::Data(data) => value::from_uint(self.data[data.index()], 8),
                };
                frame.set(*dst, raw);
            }
            Instr::Binary { dst, op, lhs, rhs } => {
                let raw = value::binary(tys, *op, frame.ty(*lhs), frame.get(*lhs)?, frame.get(*rhs)?)?;
                frame.set(*dst, raw);
            }
            Instr::Cmp { dst, pred, lhs, rhs } => {
                let result =
                    value::compare(tys, *pred, frame.ty(*lhs), frame.get(*lhs)?, frame.get(*rhs)?)?;
                frame.set(*dst, value::from_bool(result));
            }
            Instr::Not { dst, operand } => {
                let raw = value::not(tys, frame.ty(*operand), frame.get(*operand)?)?;
                frame.set(*dst, raw);
            }
            Instr::Cast { dst, op, value: v } => {
                let raw = value::cast(tys, *op, frame.ty(*v), frame.ty(*dst), frame.get(*v)?)?;
                frame.set(*dst, raw);
            }
            Instr::Extract {
                dst,
                aggregate,
                index,
            } => {
                let agg_ty = frame.ty(*aggregate);
                let offset = to_usize(tys.offset_of(agg_ty, *index));
                let size = to_usize(tys.size_of(frame.ty(*dst)));
                let agg = frame.get(*aggregate)?;
                let raw = Raw::from_slice(&agg[offset..offset + size]);
                frame.set(*dst, raw);
            }
            Instr::Insert {
                dst,
                aggregate,
                index,
                value: v,
            } => {
                let agg_ty = frame.ty(*aggregate);
                let offset = to_usize(tys.offset_of(agg_ty, *index));
                let field = frame.get(*v)?.clone();
                let mut raw = frame.get(*aggregate)?.clone();
                raw[offset..offset + field.len()].copy_from_slice(&field);
                frame.set(*dst, raw);
            }
            Instr::Alloca { dst, ty } => {
                let addr = self.heap.alloc(tys.size_of(*ty), AllocKind::Stack);
                frame.stack.push(addr);
                frame.set(*dst, value::from_uint(addr, 8));
            }
            Instr::Load { dst, ptr } => {
                let addr = value::to_uint(frame.get(*ptr)?);
                let size = tys.size_of(frame.ty(*dst));
                let raw = Raw::from_slice(self.heap.read(addr, size)?);
                frame.set(*dst, raw);
            }
            Instr::Store { ptr, value: v } => {
                let addr = value::to_uint(frame.get(*ptr)?);
                self.heap.write(addr, frame.get(*v)?)?;
            }
            Instr::FieldPtr { dst, ptr, index } => {
                let pointee = tys.pointee(frame.ty(*ptr)).unwrap_or(TyId::U8);
                let addr = value::to_uint(frame.get(*ptr)?);
                if addr == 0 {
                    return Err(ExecError::NullDereference);
                }
                let field = addr.wrapping_add(tys.offset_of(pointee, *index));
                frame.set(*dst, value::from_uint(field, 8));
            }
            Instr::ElemPtr { dst, ptr, index } => {
                let pointee = tys.pointee(frame.ty(*ptr)).unwrap_or(TyId::U8);
                let addr = value::to_uint(frame.get(*ptr)?);
                let index_raw = value::cast(
                    tys,
                    signed_widen(tys.kind(frame.ty(*index))),
                    frame.ty(*index),
                    TyId::U64,
                    frame.get(*index)?,
                )?;
                let offset = value::to_uint(&index_raw).wrapping_mul(tys.size_of(pointee));
                frame.set(*dst, value::from_uint(addr.wrapping_add(offset), 8));
            }
            Instr::Call { dst, callee, args } => {
                let args = args
                    .iter()
                    .map(|a| frame.get(*a).cloned())
                    .collect::<ExecResult<Vec<_>>>()?;
                let result = match callee {
                    Callee::Function(f) => self.call(*f, &args)?,
                    Callee::Runtime(r) => self.runtime(*r, &args)?,
                };
                if let (Some(dst), Some(raw)) = (dst, result) {
                    frame.set(*dst, raw);
                }
            }
            Instr::RcInc { ptr } => {
                let addr = value::to_uint(frame.get(*ptr)?);
                self.rc_inc(addr)?;
            }
            Instr::RcDec { ptr, drop } => {
                let addr = value::to_uint(frame.get(*ptr)?);
                self.rc_dec(addr, *drop)?;
            }
        }
        Ok(())
    }

    // Reference counting

    pub fn ref_count(&self, addr: u64) -> ExecResult<u32> {
        let raw = self.heap.read(addr, 4)?;
        Ok(value::to_uint(raw) as u32)
    }

    fn set_ref_count(&mut self, addr: u64, count: u32) -> ExecResult<()> {
        self.heap.write(addr, &count.to_le_bytes())
    }

    pub fn rc_inc(&mut self, addr: u64) -> ExecResult<()> {
        if addr == 0 {
            return Ok(());
        }
        let count = self.ref_count(addr)?;
        self.set_ref_count(addr, count.wrapping_add(1))
    }

    /// Drop one reference; runs `drop(addr)` when the count reaches zero.
    pub fn rc_dec(&mut self, addr: u64, drop: FuncId) -> ExecResult<()> {
        if addr == 0 {
            return Ok(());
        }
        let count = self.ref_count(addr)?;
        if count == 0 {
            return Err(ExecError::RefCountUnderflow { addr });
        }
        self.set_ref_count(addr, count - 1)?;
        if count == 1 {
            self.call(drop, &[value::from_uint(addr, 8)])?;
        }
        Ok(())
    }

    // Host memory access

    pub fn alloc(&mut self, size: u64, kind: AllocKind) -> u64 {
        self.heap.alloc(size, kind)
    }

    pub fn read(&self, addr: u64, len: u64) -> ExecResult<Raw> {
        Ok(Raw::from_slice(self.heap.read(addr, len)?))
    }

    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> ExecResult<()> {
        self.heap.write(addr, bytes)
    }

    pub fn read_u64(&self, addr: u64) -> ExecResult<u64> {
        Ok(value::to_uint(self.heap.read(addr, 8)?))
    }

    /// Host-owned arena handle. Arenas are opaque to generated code.
    pub fn new_arena(&mut self) -> u64 {
        self.heap.alloc(8, AllocKind::Static)
    }

    fn field_addr(&self, ty: TyId, addr: u64, index: u32) -> u64 {
        addr + self.module.tys.offset_of(ty, index)
    }

    fn new_counted(&mut self, ty: TyId, extra: u64, arena: u64) -> ExecResult<u64> {
        if arena == 0 {
            return Err(ExecError::NullDereference);
        }
        let size = self.module.tys.size_of(ty);
        let addr = self.heap.alloc(size + extra, AllocKind::Heap);
        self.set_ref_count(addr, 1)?;
        let arena_addr = self.field_addr(ty, addr, field::ARENA);
        self.heap.write(arena_addr, &arena.to_le_bytes())?;
        Ok(addr)
    }

    /// Allocate a string with a reference count of one.
    pub fn new_string(&mut self, arena: u64, text: &[u8]) -> ExecResult<u64> {
        let ty = self.module.rt.string;
        let header = self.module.tys.size_of(ty);
        let addr = self.new_counted(ty, text.len() as u64, arena)?;
        let data = addr + header;
        let length_addr = self.field_addr(ty, addr, field::STRING_LENGTH);
        let data_addr = self.field_addr(ty, addr, field::STRING_DATA);
        self.heap.write(data, text)?;
        self.heap.write(length_addr, &(text.len() as u64).to_le_bytes())?;
        self.heap.write(data_addr, &data.to_le_bytes())?;
        Ok(addr)
    }

    /// Bytes of a string. Null reads as empty.
    pub fn string_bytes(&self, addr: u64) -> ExecResult<Vec<u8>> {
        if addr == 0 {
            return Ok(Vec::new());
        }
        let ty = self.module.rt.string;
        let len = self.read_u64(self.field_addr(ty, addr, field::STRING_LENGTH))?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let data = self.read_u64(self.field_addr(ty, addr, field::STRING_DATA))?;
        Ok(self.heap.read(data, len)?.to_vec())
    }

    pub fn read_string(&self, addr: u64) -> ExecResult<String> {
        Ok(String::from_utf8_lossy(&self.string_bytes(addr)?).into_owned())
    }

    /// Allocate a zeroed pool of `size` bytes with a reference count of one.
    pub fn new_pool(&mut self, arena: u64, size: u64) -> ExecResult<u64> {
        let ty = self.module.rt.pool;
        let header = self.module.tys.size_of(ty);
        let addr = self.new_counted(ty, size, arena)?;
        let buffer = addr + header;
        let buffer_addr = self.field_addr(ty, addr, field::POOL_BUFFER);
        let size_addr = self.field_addr(ty, addr, field::POOL_SIZE);
        self.heap.write(buffer_addr, &buffer.to_le_bytes())?;
        self.heap.write(size_addr, &size.to_le_bytes())?;
        Ok(addr)
    }

    /// Build a slice value over a fresh pool holding `bytes`.
    pub fn new_slice(&mut self, arena: u64, bytes: &[u8], count: u64) -> ExecResult<Raw> {
        let size = bytes.len() as u64;
        let pool = self.new_pool(arena, size)?;
        let buffer = self.read_u64(self.field_addr(self.module.rt.pool, pool, field::POOL_BUFFER))?;
        if !bytes.is_empty() {
            self.heap.write(buffer, bytes)?;
        }
        Ok(self.slice_value(pool, buffer, size, count))
    }

    fn slice_value(&self, pool: u64, base: u64, size: u64, count: u64) -> Raw {
        let tys = &self.module.tys;
        let ty = self.module.rt.slice;
        let mut raw = value::zeros(tys.size_of(ty));
        for (index, v) in [
            (field::SLICE_POOL, pool),
            (field::SLICE_BASE, base),
            (field::SLICE_SIZE, size),
            (field::SLICE_COUNT, count),
        ] {
            let offset = to_usize(tys.offset_of(ty, index));
            raw[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
        }
        raw
    }

    /// `(pool, base, size, count)` of a slice value.
    pub fn slice_parts(&self, slice: &[u8]) -> (u64, u64, u64, u64) {
        let tys = &self.module.tys;
        let ty = self.module.rt.slice;
        let at = |index| {
            let offset = to_usize(tys.offset_of(ty, index));
            value::to_uint(&slice[offset..offset + 8])
        };
        (
            at(field::SLICE_POOL),
            at(field::SLICE_BASE),
            at(field::SLICE_SIZE),
            at(field::SLICE_COUNT),
        )
    }

    /// The bytes a slice views.
    pub fn slice_bytes(&self, slice: &[u8]) -> ExecResult<Vec<u8>> {
        let (_, base, size, _) = self.slice_parts(slice);
        if size == 0 {
            return Ok(Vec::new());
        }
        Ok(self.heap.read(base, size)?.to_vec())
    }

    /// Allocate an empty map with a reference count of one.
    pub fn new_map(&mut self, arena: u64) -> ExecResult<u64> {
        let addr = self.new_counted(self.module.rt.map, 0, arena)?;
        self.maps.insert(addr, Vec::new());
        Ok(addr)
    }

    /// Insert or replace an entry. The map takes over one reference of
    /// counted keys and values.
    pub fn map_insert(&mut self, map: u64, key: Raw, value: Raw) -> ExecResult<()> {
        let entries = self.maps.get_mut(&map).ok_or(ExecError::InvalidAddress { addr: map })?;
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
        let count = entries.len() as u64;
        let count_addr = self.field_addr(self.module.rt.map, map, field::MAP_COUNT);
        self.heap.write(count_addr, &count.to_le_bytes())
    }

    pub fn map_len(&self, map: u64) -> ExecResult<u64> {
        self.read_u64(self.field_addr(self.module.rt.map, map, field::MAP_COUNT))
    }
}

/// Cast that widens an index of kind `kind` to `u64`.
fn signed_widen(kind: &TyKind) -> crate::ir::CastOp {
    match kind {
        TyKind::Int { signed: true, .. } => crate::ir::CastOp::SExt,
        _ => crate::ir::CastOp::ZExt,
    }
}

fn to_usize(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests;
