//! Function builder.
//!
//! Follows the "position at a block, emit instructions, terminate" pattern
//! of LLVM's `IRBuilder`. Every emitting method returns a fresh [`Value`]
//! whose type is derived from its operands, so callers never track value
//! types by hand.

use smallvec::SmallVec;

use crate::ir::{
    BinOp, Block, BlockId, Callee, CastOp, CmpPred, Const, DataId, FuncId, Function, Instr,
    Terminator, Value, ValueId,
};
use crate::ty::{TyId, TyTable};

struct BlockBuilder {
    id: BlockId,
    body: Vec<Instr>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            body: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for one in-progress function.
pub struct FunctionBuilder {
    name: String,
    params: Vec<TyId>,
    return_type: TyId,
    blocks: Vec<BlockBuilder>,
    current_block: BlockId,
    value_types: Vec<TyId>,
    /// Number of allocas hoisted to the front of the entry block.
    entry_allocas: usize,
}

impl FunctionBuilder {
    /// Create a builder with an entry block; parameters take the first
    /// value ids.
    pub fn new(name: impl Into<String>, params: &[TyId], return_type: TyId) -> Self {
        Self {
            name: name.into(),
            params: params.to_vec(),
            return_type,
            blocks: vec![BlockBuilder::new(BlockId::new(0))],
            current_block: BlockId::new(0),
            value_types: params.to_vec(),
            entry_allocas: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> TyId {
        self.return_type
    }

    /// The value bound to parameter `index`.
    pub fn param(&self, index: usize) -> Value {
        Value {
            id: ValueId::new(index as u32),
            ty: self.params[index],
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    // Block management

    #[expect(
        clippy::cast_possible_truncation,
        reason = "block indices never exceed u32"
    )]
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BlockBuilder::new(id));
        id
    }

    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current_block = block;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    #[inline]
    pub fn entry_block(&self) -> BlockId {
        BlockId::new(0)
    }

    // Values

    #[expect(
        clippy::cast_possible_truncation,
        reason = "value indices never exceed u32"
    )]
    fn fresh(&mut self, ty: TyId) -> Value {
        let id = ValueId::new(self.value_types.len() as u32);
        self.value_types.push(ty);
        Value { id, ty }
    }

    fn push(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "emitting into terminated block {}",
            block.id.raw()
        );
        block.body.push(instr);
    }

    fn constant(&mut self, ty: TyId, value: Const) -> Value {
        let dst = self.fresh(ty);
        self.push(Instr::Const { dst: dst.id, value });
        dst
    }

    pub fn const_int(&mut self, ty: TyId, bits: u64) -> Value {
        self.constant(ty, Const::Int(bits))
    }

    pub fn const_float(&mut self, ty: TyId, bits: u64) -> Value {
        self.constant(ty, Const::Float(bits))
    }

    pub fn const_bool(&mut self, value: bool) -> Value {
        self.constant(TyId::BOOL, Const::Bool(value))
    }

    pub fn const_u32(&mut self, value: u32) -> Value {
        self.constant(TyId::U32, Const::Int(u64::from(value)))
    }

    pub fn const_u64(&mut self, value: u64) -> Value {
        self.constant(TyId::U64, Const::Int(value))
    }

    /// The all-zero value of `ty` (null for pointers).
    pub fn zero(&mut self, ty: TyId) -> Value {
        self.constant(ty, Const::Zero)
    }

    pub fn data(&mut self, data: DataId) -> Value {
        self.constant(TyId::BYTE_PTR, Const::Data(data))
    }

    // Arithmetic

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        debug_assert_eq!(
            lhs.ty, rhs.ty,
            "{op:?} operands must have the same type"
        );
        let dst = self.fresh(lhs.ty);
        self.push(Instr::Binary {
            dst: dst.id,
            op,
            lhs: lhs.id,
            rhs: rhs.id,
        });
        dst
    }

    pub fn cmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        debug_assert_eq!(
            lhs.ty, rhs.ty,
            "{pred:?} operands must have the same type"
        );
        let dst = self.fresh(TyId::BOOL);
        self.push(Instr::Cmp {
            dst: dst.id,
            pred,
            lhs: lhs.id,
            rhs: rhs.id,
        });
        dst
    }

    pub fn not(&mut self, operand: Value) -> Value {
        let dst = self.fresh(operand.ty);
        self.push(Instr::Not {
            dst: dst.id,
            operand: operand.id,
        });
        dst
    }

    /// Convert `value` to `ty`. A `Nop` to the same type returns `value`.
    pub fn cast(&mut self, op: CastOp, value: Value, ty: TyId) -> Value {
        if op == CastOp::Nop && value.ty == ty {
            return value;
        }
        let dst = self.fresh(ty);
        self.push(Instr::Cast {
            dst: dst.id,
            op,
            value: value.id,
        });
        dst
    }

    // Aggregates

    pub fn extract(&mut self, tys: &TyTable, aggregate: Value, index: u32) -> Value {
        let ty = tys.field(aggregate.ty, index).unwrap_or_else(|| {
            panic!("extract {index} from non-aggregate {}", tys.display(aggregate.ty))
        });
        let dst = self.fresh(ty);
        self.push(Instr::Extract {
            dst: dst.id,
            aggregate: aggregate.id,
            index,
        });
        dst
    }

    pub fn insert(&mut self, tys: &TyTable, aggregate: Value, index: u32, value: Value) -> Value {
        debug_assert_eq!(
            tys.field(aggregate.ty, index),
            Some(value.ty),
            "insert type mismatch at field {index} of {}",
            tys.display(aggregate.ty)
        );
        let dst = self.fresh(aggregate.ty);
        self.push(Instr::Insert {
            dst: dst.id,
            aggregate: aggregate.id,
            index,
            value: value.id,
        });
        dst
    }

    // Memory

    /// Allocate a zeroed local slot. Allocas are hoisted into the entry
    /// block so they execute exactly once per call.
    pub fn alloca(&mut self, tys: &mut TyTable, ty: TyId) -> Value {
        let dst = self.fresh(tys.pointer(ty));
        let entry = &mut self.blocks[0];
        entry
            .body
            .insert(self.entry_allocas, Instr::Alloca { dst: dst.id, ty });
        self.entry_allocas += 1;
        dst
    }

    pub fn load(&mut self, tys: &TyTable, ptr: Value) -> Value {
        let ty = tys
            .pointee(ptr.ty)
            .unwrap_or_else(|| panic!("load through non-pointer {}", tys.display(ptr.ty)));
        let dst = self.fresh(ty);
        self.push(Instr::Load {
            dst: dst.id,
            ptr: ptr.id,
        });
        dst
    }

    pub fn store(&mut self, ptr: Value, value: Value) {
        self.push(Instr::Store {
            ptr: ptr.id,
            value: value.id,
        });
    }

    pub fn field_ptr(&mut self, tys: &mut TyTable, ptr: Value, index: u32) -> Value {
        let field = tys
            .pointee(ptr.ty)
            .and_then(|agg| tys.field(agg, index))
            .unwrap_or_else(|| panic!("field {index} of {}", tys.display(ptr.ty)));
        let dst = self.fresh(tys.pointer(field));
        self.push(Instr::FieldPtr {
            dst: dst.id,
            ptr: ptr.id,
            index,
        });
        dst
    }

    /// Load field `index` of the struct behind `ptr`.
    pub fn load_field(&mut self, tys: &mut TyTable, ptr: Value, index: u32) -> Value {
        let field = self.field_ptr(tys, ptr, index);
        self.load(tys, field)
    }

    pub fn elem_ptr(&mut self, ptr: Value, index: Value) -> Value {
        let dst = self.fresh(ptr.ty);
        self.push(Instr::ElemPtr {
            dst: dst.id,
            ptr: ptr.id,
            index: index.id,
        });
        dst
    }

    // Calls and reference counting

    /// Emit a call. Returns `None` when `ret` is void.
    pub fn call(&mut self, callee: Callee, args: &[Value], ret: TyId) -> Option<Value> {
        let dst = (ret != TyId::VOID).then(|| self.fresh(ret));
        self.push(Instr::Call {
            dst: dst.map(|d| d.id),
            callee,
            args: args.iter().map(|a| a.id).collect::<SmallVec<_>>(),
        });
        dst
    }

    pub fn rc_inc(&mut self, ptr: Value) {
        self.push(Instr::RcInc { ptr: ptr.id });
    }

    pub fn rc_dec(&mut self, ptr: Value, drop: FuncId) {
        self.push(Instr::RcDec { ptr: ptr.id, drop });
    }

    // Terminators

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "block {} already terminated",
            block.id.raw()
        );
        block.terminator = Some(terminator);
    }

    pub fn ret(&mut self, value: Option<Value>) {
        debug_assert_eq!(
            value.map_or(TyId::VOID, |v| v.ty),
            self.return_type,
            "return type mismatch in {}",
            self.name
        );
        self.terminate(Terminator::Return(value.map(|v| v.id)));
    }

    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump(target));
    }

    pub fn branch(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        debug_assert_eq!(cond.ty, TyId::BOOL, "branch condition must be bool");
        self.terminate(Terminator::Branch {
            cond: cond.id,
            then_block,
            else_block,
        });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    // Finalization

    /// Consume the builder. Unterminated blocks get `Unreachable` with a
    /// tracing warning.
    pub fn finish(self) -> Function {
        let blocks = self
            .blocks
            .into_iter()
            .map(|bb| {
                let terminator = bb.terminator.unwrap_or_else(|| {
                    tracing::warn!(
                        function = %self.name,
                        block = bb.id.raw(),
                        "unterminated block, adding Unreachable"
                    );
                    Terminator::Unreachable
                });
                Block {
                    id: bb.id,
                    body: bb.body,
                    terminator,
                }
            })
            .collect();
        Function {
            name: self.name,
            params: self.params,
            return_type: self.return_type,
            blocks,
            value_types: self.value_types,
        }
    }
}
