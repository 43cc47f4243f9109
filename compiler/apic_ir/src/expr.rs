//! Typed expression nodes in a flat arena.
//!
//! Expressions refer to their children by [`ExprId`]; variable-length child
//! lists are [`ExprRange`]s into the arena's shared list storage. Every node
//! carries the semantic type the checker assigned to it.

use std::fmt;

use crate::{FunctionId, GlobalId, LocalId, Name, ParamId, TypeId};

/// Index into the expression arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Invalid expression ID (sentinel value).
    pub const INVALID: ExprId = ExprId(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        ExprId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ExprId({})", self.0)
        } else {
            write!(f, "ExprId::INVALID")
        }
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Default for ExprId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Range of expression ids in the arena's list storage.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprRange {
    start: u32,
    len: u16,
}

impl ExprRange {
    pub const EMPTY: ExprRange = ExprRange { start: 0, len: 0 };

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }
}

/// Range of selection cases in the arena's case storage.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CaseRange {
    start: u32,
    len: u16,
}

impl CaseRange {
    pub const EMPTY: CaseRange = CaseRange { start: 0, len: 0 };

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }
}

/// One arm of a `select`: matches when the scrutinee equals any condition.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectCase {
    pub conditions: ExprRange,
    pub expr: ExprId,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Range,
    In,
}

impl BinaryOp {
    pub fn as_symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Range => "..",
            BinaryOp::In => "in",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Not,
    Negate,
}

impl UnaryOp {
    pub fn as_symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
        }
    }
}

/// Expression node kinds.
///
/// Children are ids into the same arena. Optional children use
/// [`ExprId::INVALID`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprKind {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    /// IEEE-754 bits.
    Float32(u32),
    /// IEEE-754 bits.
    Float64(u64),
    Str(Name),
    /// The null value of the node's type.
    Null,
    EnumEntry { value: u32 },
    /// Static array literal; the node type is the array type.
    ArrayInitializer { values: ExprRange },
    /// One entry per class field in declaration order; missing fields are
    /// `ExprId::INVALID`.
    ClassInitializer { fields: ExprRange },
    /// Heap-allocate a class initializer behind a reference.
    Create { init: ExprId },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary { op: UnaryOp, operand: ExprId },
    /// `(bits & bitfield) != 0`.
    BitTest { bitfield: ExprId, bits: ExprId },
    Call { target: FunctionId, args: ExprRange },
    /// Convert `value` to the node's type.
    Cast { value: ExprId },
    Member { object: ExprId, field: Name },
    ArrayIndex { array: ExprId, index: ExprId },
    SliceIndex { slice: ExprId, index: ExprId },
    SliceRange {
        slice: ExprId,
        start: ExprId,
        end: ExprId,
    },
    PointerRange {
        pointer: ExprId,
        start: ExprId,
        end: ExprId,
    },
    MapIndex { map: ExprId, key: ExprId },
    MapContains { map: ExprId, key: ExprId },
    Local(LocalId),
    Parameter(ParamId),
    /// An observed output; reads the underlying parameter.
    Observed(ParamId),
    Global(GlobalId),
    Select {
        value: ExprId,
        cases: CaseRange,
        default: ExprId,
    },
    Length { object: ExprId },
    /// A zeroed slice of `size` elements; the node type is the slice type.
    Make { size: ExprId },
    Clone { slice: ExprId },
    /// Placeholder with no run-time meaning.
    Ignore,
    /// Stands for its inferred expression.
    Unknown { inferred: ExprId },
}

impl ExprKind {
    /// Short kind name for diagnostics and tracing.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Bool(_) => "bool",
            ExprKind::Int8(_) => "s8",
            ExprKind::Int16(_) => "s16",
            ExprKind::Int32(_) => "s32",
            ExprKind::Int64(_) => "s64",
            ExprKind::Uint8(_) => "u8",
            ExprKind::Uint16(_) => "u16",
            ExprKind::Uint32(_) => "u32",
            ExprKind::Uint64(_) => "u64",
            ExprKind::Float32(_) => "f32",
            ExprKind::Float64(_) => "f64",
            ExprKind::Str(_) => "string",
            ExprKind::Null => "null",
            ExprKind::EnumEntry { .. } => "enum entry",
            ExprKind::ArrayInitializer { .. } => "array initializer",
            ExprKind::ClassInitializer { .. } => "class initializer",
            ExprKind::Create { .. } => "create",
            ExprKind::Binary { .. } => "binary op",
            ExprKind::Unary { .. } => "unary op",
            ExprKind::BitTest { .. } => "bit test",
            ExprKind::Call { .. } => "call",
            ExprKind::Cast { .. } => "cast",
            ExprKind::Member { .. } => "member",
            ExprKind::ArrayIndex { .. } => "array index",
            ExprKind::SliceIndex { .. } => "slice index",
            ExprKind::SliceRange { .. } => "slice range",
            ExprKind::PointerRange { .. } => "pointer range",
            ExprKind::MapIndex { .. } => "map index",
            ExprKind::MapContains { .. } => "map contains",
            ExprKind::Local(_) => "local",
            ExprKind::Parameter(_) => "parameter",
            ExprKind::Observed(_) => "observed",
            ExprKind::Global(_) => "global",
            ExprKind::Select { .. } => "select",
            ExprKind::Length { .. } => "length",
            ExprKind::Make { .. } => "make",
            ExprKind::Clone { .. } => "clone",
            ExprKind::Ignore => "ignore",
            ExprKind::Unknown { .. } => "unknown",
        }
    }
}

/// An expression node together with its semantic type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
}

/// Contiguous storage for all expressions of a program.
#[derive(Clone, Default, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprArena {
    exprs: Vec<Expr>,
    lists: Vec<ExprId>,
    cases: Vec<SelectCase>,
}

fn to_u32(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("{what} count exceeds u32::MAX"))
}

fn to_u16(len: usize, what: &str) -> u16 {
    u16::try_from(len).unwrap_or_else(|_| panic!("{what} list exceeds u16::MAX entries"))
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let id = ExprId(to_u32(self.exprs.len(), "expression"));
        self.exprs.push(Expr { kind, ty });
        id
    }

    /// Get an expression.
    ///
    /// # Panics
    /// Panics if `id` is invalid or from another arena.
    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: ExprId) -> ExprKind {
        self.exprs[id.index()].kind
    }

    #[inline]
    pub fn ty(&self, id: ExprId) -> TypeId {
        self.exprs[id.index()].ty
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn alloc_list(&mut self, ids: impl IntoIterator<Item = ExprId>) -> ExprRange {
        let start = to_u32(self.lists.len(), "list entry");
        self.lists.extend(ids);
        let len = to_u16(self.lists.len() - start as usize, "expression");
        ExprRange { start, len }
    }

    pub fn list(&self, range: ExprRange) -> &[ExprId] {
        let start = range.start as usize;
        &self.lists[start..start + range.len()]
    }

    pub fn alloc_cases(&mut self, cases: impl IntoIterator<Item = SelectCase>) -> CaseRange {
        let start = to_u32(self.cases.len(), "case");
        self.cases.extend(cases);
        let len = to_u16(self.cases.len() - start as usize, "case");
        CaseRange { start, len }
    }

    pub fn cases(&self, range: CaseRange) -> &[SelectCase] {
        let start = range.start as usize;
        &self.cases[start..start + range.len()]
    }
}
