//! Low-level backend for the apic compiler.
//!
//! - [`ty`]: representation types and C layout
//! - [`ir`]: blocks, instructions, terminators, value handles
//! - [`FunctionBuilder`]: position/emit/terminate construction API
//! - [`Module`]: functions, read-only data, runtime type registry
//! - [`runtime`]: object layouts and callback declarations
//! - [`eval`]: reference evaluator with allocation tracking

mod builder;
pub mod eval;
pub mod ir;
mod module;
pub mod runtime;
pub mod ty;

pub use builder::FunctionBuilder;
pub use ir::{
    BinOp, BlockId, Callee, CastOp, CmpPred, Const, DataId, FuncId, Function, Instr, Terminator,
    Value, ValueId,
};
pub use module::{FunctionDecl, Module};
pub use runtime::{MapSig, Release, RuntimeFn, RuntimeTypes};
pub use ty::{TyId, TyKind, TyTable};
