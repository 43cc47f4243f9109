//! Operator lowering: binary, unary, bit tests and casts.
//!
//! `&&` and `||` short-circuit through a boolean slot: the slot starts at
//! the value that decides the result without the right operand (`false`
//! for `&&`, `true` for `||`) and the right operand is only evaluated, in
//! its own block and frame, when the left one does not decide.
//!
//! String operands go through the runtime: comparisons compare the result
//! of `apic_string_compare` against zero, `+` concatenates into a new
//! string.

use apic_backend::{BinOp, CmpPred, RuntimeFn, TyId, Value};
use apic_ir::{BinaryOp, Builtin, ExprId, UnaryOp};

use crate::cast::convert;
use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::Scope;

fn predicate(op: BinaryOp) -> Option<CmpPred> {
    let pred = match op {
        BinaryOp::Eq => CmpPred::Eq,
        BinaryOp::Ne => CmpPred::Ne,
        BinaryOp::Lt => CmpPred::Lt,
        BinaryOp::Le => CmpPred::Le,
        BinaryOp::Gt => CmpPred::Gt,
        BinaryOp::Ge => CmpPred::Ge,
        _ => return None,
    };
    Some(pred)
}

fn arithmetic(op: BinaryOp) -> Option<BinOp> {
    let op = match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::BitAnd => BinOp::And,
        BinaryOp::BitOr => BinOp::Or,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        _ => return None,
    };
    Some(op)
}

impl Compiler<'_> {
    pub(super) fn binary(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<Value, CodegenError> {
        match op {
            BinaryOp::And => return self.short_circuit(s, lhs, rhs, false),
            BinaryOp::Or => return self.short_circuit(s, lhs, rhs, true),
            BinaryOp::Range | BinaryOp::In => {
                return Err(self.unsupported(s, op.as_symbol(), lhs));
            }
            _ => {}
        }

        let l = self.value(s, lhs)?;
        let r = self.value(s, rhs)?;
        if self.program.types.builtin(self.expr_ty(lhs)) == Some(Builtin::String) {
            return self.string_binary(s, e, op, lhs, l, r);
        }

        if let Some(pred) = predicate(op) {
            return Ok(s.b.cmp(pred, l, r));
        }
        let Some(arith) = arithmetic(op) else {
            return Err(self.unsupported(s, op.as_symbol(), lhs));
        };
        // The shift amount may be declared with any integer type.
        let r = if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
            convert(&mut s.b, &self.module.tys, r, l.ty)
        } else {
            r
        };
        Ok(s.b.binary(arith, l, r))
    }

    fn string_binary(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        l: Value,
        r: Value,
    ) -> Result<Value, CodegenError> {
        if let Some(pred) = predicate(op) {
            let order = self.runtime(&mut s.b, RuntimeFn::StringCompare, &[l, r]);
            let zero = s.b.zero(TyId::I32);
            return Ok(s.b.cmp(pred, order, zero));
        }
        if op == BinaryOp::Add {
            let arena = self.arena(s);
            let joined = self.runtime(&mut s.b, RuntimeFn::StringConcat, &[arena, l, r]);
            self.defer_release(s, joined, self.expr_ty(e));
            return Ok(joined);
        }
        Err(self.unsupported(s, op.as_symbol(), lhs))
    }

    /// `result = short; if lhs != short { result = rhs }`.
    fn short_circuit(
        &mut self,
        s: &mut Scope,
        lhs: ExprId,
        rhs: ExprId,
        short: bool,
    ) -> Result<Value, CodegenError> {
        let slot = s.b.alloca(&mut self.module.tys, TyId::BOOL);
        let init = s.b.const_bool(short);
        s.b.store(slot, init);

        let l = self.value(s, lhs)?;
        let rhs_block = s.b.new_block();
        let merge = s.b.new_block();
        if short {
            s.b.branch(l, merge, rhs_block);
        } else {
            s.b.branch(l, rhs_block, merge);
        }

        s.b.position_at(rhs_block);
        self.nested(s, |c, s| {
            let r = c.value(s, rhs)?;
            s.b.store(slot, r);
            Ok(())
        })?;
        if !s.b.is_terminated() {
            s.b.jump(merge);
        }

        s.b.position_at(merge);
        Ok(s.b.load(&self.module.tys, slot))
    }

    pub(super) fn unary(
        &mut self,
        s: &mut Scope,
        op: UnaryOp,
        operand: ExprId,
    ) -> Result<Value, CodegenError> {
        match op {
            UnaryOp::Not => {
                let v = self.value(s, operand)?;
                Ok(s.b.not(v))
            }
            UnaryOp::Negate => Err(self.unsupported(s, op.as_symbol(), operand)),
        }
    }

    /// `(bits & bitfield) != 0`, with `bits` converted to the bitfield's
    /// width.
    pub(super) fn bit_test(
        &mut self,
        s: &mut Scope,
        bitfield: ExprId,
        bits: ExprId,
    ) -> Result<Value, CodegenError> {
        let bits = self.value(s, bits)?;
        let field = self.value(s, bitfield)?;
        let bits = convert(&mut s.b, &self.module.tys, bits, field.ty);
        let masked = s.b.binary(BinOp::And, bits, field);
        let zero = s.b.zero(field.ty);
        Ok(s.b.cmp(CmpPred::Ne, masked, zero))
    }

    pub(super) fn cast(&mut self, s: &mut Scope, e: ExprId, value: ExprId) -> Result<Value, CodegenError> {
        let v = self.value(s, value)?;
        let dst = self.target(self.expr_ty(e));
        Ok(convert(&mut s.b, &self.module.tys, v, dst))
    }

    fn unsupported(&self, s: &Scope, op: &'static str, operand: ExprId) -> CodegenError {
        let ty = self.describe(self.expr_ty(operand));
        self.fail(s, ErrorKind::UnsupportedOperator { op, ty })
    }
}
