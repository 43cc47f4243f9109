//! Block/register IR.
//!
//! A [`Function`] is a list of basic blocks. Each block is a sequence of
//! [`Instr`]s closed by exactly one [`Terminator`]. Every produced value is
//! a fresh [`ValueId`] whose representation type is recorded in
//! [`Function::value_types`]; parameters occupy the first ids.

use std::fmt;

use smallvec::SmallVec;

use crate::runtime::RuntimeFn;
use crate::ty::TyId;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "none".
            pub const NONE: Self = Self(u32::MAX);

            #[inline]
            pub const fn new(raw: u32) -> Self {
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

            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == u32::MAX
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// A value produced inside one function.
    ValueId
);
define_id!(
    /// A basic block inside one function.
    BlockId
);
define_id!(
    /// A function of a [`Module`](crate::Module).
    FuncId
);
define_id!(
    /// A read-only data blob of a [`Module`](crate::Module).
    DataId
);

/// A typed value handle.
///
/// Immutable and `Copy`; new handles only come from builder operations.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Value {
    pub id: ValueId,
    pub ty: TyId,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Const {
    /// Integer bits, truncated to the value's width.
    Int(u64),
    /// IEEE-754 bits (low 32 bits for `f32`).
    Float(u64),
    Bool(bool),
    /// All-zero value of any type (null for pointers).
    Zero,
    /// Address of a read-only data blob.
    Data(DataId),
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Signed or unsigned according to the operand type.
    Div,
    And,
    Or,
    Xor,
    Shl,
    /// Arithmetic for signed operands, logical for unsigned.
    Shr,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CmpPred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Conversion between representation types.
///
/// Semantics follow Rust's `as`: float-to-int saturates (NaN becomes zero),
/// int-to-bool tests against zero.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CastOp {
    Nop,
    Trunc,
    ZExt,
    SExt,
    SIToFP,
    UIToFP,
    FPToSI,
    FPToUI,
    FPExt,
    FPTrunc,
    IntToBool,
    BoolToInt,
    PtrToInt,
    IntToPtr,
    PtrToPtr,
}

/// Call target.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Callee {
    Function(FuncId),
    Runtime(RuntimeFn),
}

pub type Args = SmallVec<[ValueId; 4]>;

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Instr {
    Const {
        dst: ValueId,
        value: Const,
    },
    Binary {
        dst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        dst: ValueId,
        pred: CmpPred,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Logical not for `bool`, bitwise not for integers.
    Not {
        dst: ValueId,
        operand: ValueId,
    },
    Cast {
        dst: ValueId,
        op: CastOp,
        value: ValueId,
    },
    Extract {
        dst: ValueId,
        aggregate: ValueId,
        index: u32,
    },
    Insert {
        dst: ValueId,
        aggregate: ValueId,
        index: u32,
        value: ValueId,
    },
    /// Function-local storage slot, zero-initialized.
    Alloca {
        dst: ValueId,
        ty: TyId,
    },
    Load {
        dst: ValueId,
        ptr: ValueId,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
    },
    /// Address of a struct field or array element with a constant index.
    FieldPtr {
        dst: ValueId,
        ptr: ValueId,
        index: u32,
    },
    /// `ptr + index * size_of(pointee)`.
    ElemPtr {
        dst: ValueId,
        ptr: ValueId,
        index: ValueId,
    },
    Call {
        dst: Option<ValueId>,
        callee: Callee,
        args: Args,
    },
    /// Increment the `u32` reference count at offset 0. No-op on null.
    RcInc {
        ptr: ValueId,
    },
    /// Decrement the reference count; call `drop(ptr)` when it reaches zero.
    /// No-op on null.
    RcDec {
        ptr: ValueId,
        drop: FuncId,
    },
}

impl Instr {
    /// The value defined by this instruction, if any.
    pub fn defined_value(&self) -> Option<ValueId> {
        match self {
            Instr::Const { dst, .. }
            | Instr::Binary { dst, .. }
            | Instr::Cmp { dst, .. }
            | Instr::Not { dst, .. }
            | Instr::Cast { dst, .. }
            | Instr::Extract { dst, .. }
            | Instr::Insert { dst, .. }
            | Instr::Alloca { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::FieldPtr { dst, .. }
            | Instr::ElemPtr { dst, .. } => Some(*dst),
            Instr::Call { dst, .. } => *dst,
            Instr::Store { .. } | Instr::RcInc { .. } | Instr::RcDec { .. } => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Terminator {
    Return(Option<ValueId>),
    Jump(BlockId),
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub id: BlockId,
    pub body: Vec<Instr>,
    pub terminator: Terminator,
}

/// A finished function body.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<TyId>,
    pub return_type: TyId,
    pub blocks: Vec<Block>,
    pub value_types: Vec<TyId>,
}

impl Function {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Total number of instructions over all blocks.
    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(|b| b.body.len()).sum()
    }

    /// Iterate every instruction in block order.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.iter().flat_map(|b| b.body.iter())
    }
}
