//! Evaluation errors.

/// Failure while executing a module.
///
/// Memory-safety violations are reported instead of corrupting the heap so
/// that tests can assert on ownership bugs directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("null pointer dereference")]
    NullDereference,

    #[error("invalid address {addr:#x}")]
    InvalidAddress { addr: u64 },

    #[error("use after free at {addr:#x}")]
    UseAfterFree { addr: u64 },

    #[error("double free at {addr:#x}")]
    DoubleFree { addr: u64 },

    #[error("free of non-heap or interior pointer {addr:#x}")]
    InvalidFree { addr: u64 },

    #[error("out of bounds access of {len} bytes at {addr:#x}")]
    OutOfBounds { addr: u64, len: u64 },

    #[error("reference count underflow at {addr:#x}")]
    RefCountUnderflow { addr: u64 },

    #[error("reached unreachable in `{function}` (block {block})")]
    Unreachable { function: String, block: u32 },

    #[error("function `{name}` has no body")]
    UndefinedFunction { name: String },

    #[error("`{function}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("`{function}` read value {value} before it was defined")]
    UndefinedValue { function: String, value: u32 },

    #[error("invalid operation {op} on {ty}")]
    InvalidOperation { op: String, ty: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("call depth exceeded {limit}")]
    StackOverflow { limit: usize },

    #[error("step limit of {limit} exceeded")]
    StepLimit { limit: u64 },
}

pub type ExecResult<T> = Result<T, ExecError>;
