//! Semantic graph for the API-description language backend.
//!
//! This is the type checker's output as seen by the code generator:
//! interned names, a type pool, a flat expression arena, and the program
//! tables (locals, parameters, globals, functions) that expressions refer to
//! by id.

mod expr;
mod interner;
mod name;
mod program;
mod types;

pub use expr::{
    BinaryOp, CaseRange, Expr, ExprArena, ExprId, ExprKind, ExprRange, SelectCase, UnaryOp,
};
pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use program::{Binding, Function, FunctionId, GlobalId, LocalId, ParamId, Program, Stmt};
pub use types::{Builtin, Field, TypeId, TypeKind, TypePool};
