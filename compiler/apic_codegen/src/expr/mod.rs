//! Expression dispatch.
//!
//! [`Compiler::expression`] records the node being compiled, then matches
//! every [`ExprKind`] variant without a catch-all arm, so adding a node kind
//! to the semantic graph fails to build until it is handled here. Each arm
//! delegates to a focused handler:
//!
//! ```text
//! expression
//!   ├── literals.rs    Bool, Int*, Uint*, Float*, Str, Null, EnumEntry,
//!   │                  Local, Parameter, Observed, Global
//!   ├── operators.rs   Binary, Unary, BitTest, Cast
//!   ├── calls.rs       Call
//!   ├── containers.rs  ArrayInitializer, ArrayIndex, SliceIndex, SliceRange,
//!   │                  PointerRange, MapIndex, MapContains, Length, Make, Clone
//!   ├── classes.rs     ClassInitializer, Create, Member
//!   └── select.rs      Select
//! ```
//!
//! Handlers return `Ok(None)` only for expressions without a value (calls
//! of void functions). Owned results are registered in the innermost frame
//! by the handler that creates them.

mod calls;
mod classes;
mod containers;
mod literals;
mod operators;
mod select;

use apic_backend::Value;
use apic_ir::{ExprId, ExprKind, TypeId, TypeKind};

use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::Scope;
use crate::stack::ensure_sufficient_stack;

pub(crate) type Lowered = Result<Option<Value>, CodegenError>;

impl Compiler<'_> {
    /// Compile `e` into the current block of `s`.
    ///
    /// The current-expression marker is set to `e` while its handler runs
    /// and restored afterwards, whether the handler succeeds or fails.
    pub fn expression(&mut self, s: &mut Scope, e: ExprId) -> Lowered {
        let previous = self.current_expr.replace(e);
        let result = ensure_sufficient_stack(|| self.dispatch(s, e));
        self.current_expr = previous;
        result
    }

    /// Like [`expression`](Self::expression), for positions that need a
    /// value.
    pub(crate) fn value(&mut self, s: &mut Scope, e: ExprId) -> Result<Value, CodegenError> {
        match self.expression(s, e)? {
            Some(value) => Ok(value),
            None => {
                let kind = self.program.exprs.kind(e).name();
                let previous = self.current_expr.replace(e);
                let err = self.fail(s, ErrorKind::MissingValue { kind });
                self.current_expr = previous;
                Err(err)
            }
        }
    }

    fn dispatch(&mut self, s: &mut Scope, e: ExprId) -> Lowered {
        let kind = self.program.exprs.kind(e);
        tracing::trace!(function = %s.name, expr = e.raw(), kind = kind.name(), "expression");

        match kind {
            // --- Literals & bindings (literals.rs) ---
            ExprKind::Bool(v) => Ok(Some(s.b.const_bool(v))),
            ExprKind::Int8(v) => Ok(Some(self.int_literal(s, e, i64::from(v)))),
            ExprKind::Int16(v) => Ok(Some(self.int_literal(s, e, i64::from(v)))),
            ExprKind::Int32(v) => Ok(Some(self.int_literal(s, e, i64::from(v)))),
            ExprKind::Int64(v) => Ok(Some(self.int_literal(s, e, v))),
            ExprKind::Uint8(v) => Ok(Some(self.uint_literal(s, e, u64::from(v)))),
            ExprKind::Uint16(v) => Ok(Some(self.uint_literal(s, e, u64::from(v)))),
            ExprKind::Uint32(v) => Ok(Some(self.uint_literal(s, e, u64::from(v)))),
            ExprKind::Uint64(v) => Ok(Some(self.uint_literal(s, e, v))),
            ExprKind::Float32(bits) => Ok(Some(self.float_literal(s, e, u64::from(bits)))),
            ExprKind::Float64(bits) => Ok(Some(self.float_literal(s, e, bits))),
            ExprKind::Str(text) => Ok(Some(self.string_literal(s, e, text))),
            ExprKind::Null => {
                let ty = self.target(self.expr_ty(e));
                Ok(Some(s.b.zero(ty)))
            }
            ExprKind::EnumEntry { value } => Ok(Some(s.b.const_u32(value))),
            ExprKind::Local(local) => self.local_value(s, local).map(Some),
            ExprKind::Parameter(param) | ExprKind::Observed(param) => {
                self.parameter(s, param).map(Some)
            }
            ExprKind::Global(global) => self.global_value(s, global).map(Some),

            // --- Operators (operators.rs) ---
            ExprKind::Binary { op, lhs, rhs } => self.binary(s, e, op, lhs, rhs).map(Some),
            ExprKind::Unary { op, operand } => self.unary(s, op, operand).map(Some),
            ExprKind::BitTest { bitfield, bits } => self.bit_test(s, bitfield, bits).map(Some),
            ExprKind::Cast { value } => self.cast(s, e, value).map(Some),

            // --- Calls (calls.rs) ---
            ExprKind::Call { target, args } => self.call(s, target, args),

            // --- Containers (containers.rs) ---
            ExprKind::ArrayInitializer { values } => {
                self.array_initializer(s, e, values).map(Some)
            }
            ExprKind::ArrayIndex { array, index } => self.array_index(s, array, index).map(Some),
            ExprKind::SliceIndex { slice, index } => self.slice_index(s, slice, index).map(Some),
            ExprKind::SliceRange { slice, start, end } => {
                self.slice_range(s, slice, start, end).map(Some)
            }
            ExprKind::PointerRange {
                pointer,
                start,
                end,
            } => self.pointer_range(s, e, pointer, start, end).map(Some),
            ExprKind::MapIndex { map, key } => self.map_index(s, e, map, key).map(Some),
            ExprKind::MapContains { map, key } => self.map_contains(s, map, key).map(Some),
            ExprKind::Length { object } => self.length(s, e, object).map(Some),
            ExprKind::Make { size } => self.make(s, e, size).map(Some),
            ExprKind::Clone { slice } => self.clone_slice(s, slice).map(Some),

            // --- Classes (classes.rs) ---
            ExprKind::ClassInitializer { fields } => {
                self.class_initializer(s, e, fields).map(Some)
            }
            ExprKind::Create { init } => self.create(s, e, init).map(Some),
            ExprKind::Member { object, field } => self.member(s, object, field).map(Some),

            // --- Selection (select.rs) ---
            ExprKind::Select {
                value,
                cases,
                default,
            } => self.select(s, e, value, cases, default).map(Some),

            // --- Placeholders ---
            ExprKind::Unknown { inferred } => self.expression(s, inferred),
            ExprKind::Ignore => Err(self.fail(
                s,
                ErrorKind::UnhandledNodeKind { kind: kind.name() },
            )),
        }
    }

    /// Element type of a slice, static array or pointer type.
    pub(crate) fn element_type(&self, ty: TypeId) -> TypeId {
        let types = &self.program.types;
        match types.kind(types.underlying(ty)) {
            TypeKind::Slice { to } | TypeKind::Pointer { to } => *to,
            TypeKind::StaticArray { of, .. } => *of,
            _ => TypeId::VOID,
        }
    }
}
