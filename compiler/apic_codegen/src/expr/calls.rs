//! Calls.
//!
//! The context pointer is passed first, then the arguments in source order.
//! Arguments are borrowed by the callee; the caller keeps its obligations
//! for them.
//!
//! A subroutine returns `{ error, value }`. After the call the error is
//! tested: on failure the caller releases everything it holds and returns
//! its own zeroed result carrying the same error; on success the value is
//! extracted and owned like a plain call's result.

use apic_backend::{Callee, CmpPred, TyId, Value};
use apic_ir::{ExprRange, FunctionId};
use smallvec::SmallVec;

use super::Lowered;
use crate::compiler::Compiler;
use crate::error::ErrorKind;
use crate::scope::{Protocol, Scope};
use crate::types::{ERR_SUCCESS, RESULT_ERROR, RESULT_VALUE};

impl Compiler<'_> {
    pub(super) fn call(&mut self, s: &mut Scope, target: FunctionId, args: ExprRange) -> Lowered {
        let program = self.program;
        let Some(function) = program.function(target) else {
            return Err(self.fail(
                s,
                ErrorKind::UnresolvedCallTarget {
                    target: target.raw(),
                },
            ));
        };
        if function.subroutine && !matches!(s.protocol, Protocol::Subroutine { .. }) {
            return Err(self.fail(
                s,
                ErrorKind::InvalidSubroutineCaller {
                    caller: s.name.clone(),
                },
            ));
        }
        let callee = self.compile_function(target)?;

        let mut values: SmallVec<[Value; 8]> = SmallVec::new();
        values.push(s.ctx);
        for &arg in program.exprs.list(args) {
            values.push(self.value(s, arg)?);
        }
        let ret = self.module.decl(callee).return_type;
        let result = s.b.call(Callee::Function(callee), &values, ret);

        if !function.subroutine {
            if let Some(value) = result {
                self.defer_release(s, value, function.return_type);
            }
            return Ok(result);
        }
        let Some(result) = result else {
            return Ok(None);
        };

        let error = s.b.extract(&self.module.tys, result, RESULT_ERROR);
        let success = s.b.const_u32(ERR_SUCCESS);
        let failed = s.b.cmp(CmpPred::Ne, error, success);
        let fail_block = s.b.new_block();
        let ok_block = s.b.new_block();
        s.b.branch(failed, fail_block, ok_block);

        s.b.position_at(fail_block);
        self.propagate(s, error);

        s.b.position_at(ok_block);
        if self.target(function.return_type) == TyId::VOID {
            return Ok(None);
        }
        let value = s.b.extract(&self.module.tys, result, RESULT_VALUE);
        self.defer_release(s, value, function.return_type);
        Ok(Some(value))
    }

    /// Return `error` from the current subroutine after releasing every
    /// open frame.
    fn propagate(&mut self, s: &mut Scope, error: Value) {
        let Protocol::Subroutine { result } = s.protocol else {
            return;
        };
        let zero = s.b.zero(result);
        let value = s.b.insert(&self.module.tys, zero, RESULT_ERROR, error);
        self.release_all(s);
        s.b.ret(Some(value));
    }
}
