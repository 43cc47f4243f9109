//! `select`: the first case whose conditions contain the scrutinee.
//!
//! ```text
//! test_0:  scrutinee; any(cond == scrutinee) ? body_0 : test_1
//! test_i:  any(cond == scrutinee) ? body_i : test_i+1
//! body_i:  slot = value_i (+1), jump merge
//! last:    slot = default (+1), jump merge   | unreachable
//! merge:   load slot (owned)
//! ```
//!
//! The scrutinee is evaluated once; only the selected case's value is.

use apic_backend::{BinOp, BlockId, CmpPred, RuntimeFn, TyId, Value};
use apic_ir::{Builtin, CaseRange, ExprId, ExprRange, TypeId};

use crate::compiler::Compiler;
use crate::error::CodegenError;
use crate::scope::Scope;

impl Compiler<'_> {
    pub(super) fn select(
        &mut self,
        s: &mut Scope,
        e: ExprId,
        value: ExprId,
        cases: CaseRange,
        default: ExprId,
    ) -> Result<Value, CodegenError> {
        let program = self.program;
        let ty = self.expr_ty(e);
        let target = self.target(ty);
        let scrutinee_ty = self.expr_ty(value);
        let scrutinee = self.value(s, value)?;
        let slot = s.b.alloca(&mut self.module.tys, target);
        let merge = s.b.new_block();

        for case in program.exprs.cases(cases) {
            let matched =
                self.nested(s, |c, s| c.case_matches(s, scrutinee, scrutinee_ty, case.conditions))?;
            let body = s.b.new_block();
            let next = s.b.new_block();
            s.b.branch(matched, body, next);
            s.b.position_at(body);
            self.select_arm(s, case.expr, ty, slot, merge)?;
            s.b.position_at(next);
        }
        if default.is_valid() {
            self.select_arm(s, default, ty, slot, merge)?;
        } else {
            s.b.unreachable();
        }

        s.b.position_at(merge);
        let result = s.b.load(&self.module.tys, slot);
        self.defer_release(s, result, ty);
        Ok(result)
    }

    fn case_matches(
        &mut self,
        s: &mut Scope,
        scrutinee: Value,
        ty: TypeId,
        conditions: ExprRange,
    ) -> Result<Value, CodegenError> {
        let program = self.program;
        let mut matched = s.b.const_bool(false);
        for &cond in program.exprs.list(conditions) {
            let v = self.value(s, cond)?;
            let equal = self.equals(s, ty, scrutinee, v);
            matched = s.b.binary(BinOp::Or, matched, equal);
        }
        Ok(matched)
    }

    fn select_arm(
        &mut self,
        s: &mut Scope,
        arm: ExprId,
        ty: TypeId,
        slot: Value,
        merge: BlockId,
    ) -> Result<(), CodegenError> {
        self.nested(s, |c, s| {
            let v = c.value(s, arm)?;
            c.reference(&mut s.b, v, ty);
            s.b.store(slot, v);
            Ok(())
        })?;
        if !s.b.is_terminated() {
            s.b.jump(merge);
        }
        Ok(())
    }

    /// `a == b` for values of semantic type `ty`.
    fn equals(&mut self, s: &mut Scope, ty: TypeId, a: Value, b: Value) -> Value {
        if self.program.types.builtin(ty) == Some(Builtin::String) {
            let order = self.runtime(&mut s.b, RuntimeFn::StringCompare, &[a, b]);
            let zero = s.b.zero(TyId::I32);
            return s.b.cmp(CmpPred::Eq, order, zero);
        }
        s.b.cmp(CmpPred::Eq, a, b)
    }
}
