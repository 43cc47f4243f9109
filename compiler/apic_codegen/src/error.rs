//! Fatal code generation errors.
//!
//! Every error here is a compiler defect: a node kind or operand shape the
//! type checker lets through but this layer has no lowering for. Nothing
//! catches them; they abort compilation of the whole program.

use apic_ir::ExprId;

/// What went wrong.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("unhandled expression kind `{kind}`")]
    UnhandledNodeKind { kind: &'static str },

    #[error("couldn't locate {what} `{name}`, have: [{}]", .known.join(", "))]
    UnresolvedBinding {
        what: &'static str,
        name: String,
        known: Vec<String>,
    },

    #[error("operator `{op}` has no lowering for `{ty}`")]
    UnsupportedOperator { op: &'static str, ty: String },

    #[error("unexpected type for member `{field}`: `{ty}`")]
    UnexpectedMemberOperand { field: String, ty: String },

    #[error("unhandled length expression type `{ty}`")]
    UnhandledLengthOperand { ty: String },

    #[error("couldn't resolve call target #{target}")]
    UnresolvedCallTarget { target: u32 },

    #[error("`{caller}` has no error result to propagate into")]
    InvalidSubroutineCaller { caller: String },

    #[error("`{kind}` expression produced no value")]
    MissingValue { kind: &'static str },
}

/// A fatal error, attributed to the expression and function being compiled.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("in `{function}`: {kind}")]
pub struct CodegenError {
    pub kind: ErrorKind,
    /// The innermost expression being compiled, if any.
    pub expr: Option<ExprId>,
    pub function: String,
}
