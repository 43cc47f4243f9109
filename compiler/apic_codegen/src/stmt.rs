//! Statement compilation.
//!
//! Each statement runs in its own release frame, so temporaries are
//! released as soon as the statement completes. Locals are the exception:
//! a declared local registers its slot in the enclosing frame and is
//! released when that frame closes.

use apic_backend::Value;
use apic_ir::{ExprId, GlobalId, LocalId, Stmt};

use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::{Obligation, Protocol, Scope};
use crate::types::{RESULT_ERROR, RESULT_VALUE};

impl Compiler<'_> {
    /// Compile `body` until it ends or a statement leaves the function.
    pub(crate) fn statements(&mut self, s: &mut Scope, body: &[Stmt]) -> Result<(), CodegenError> {
        for stmt in body {
            if s.b.is_terminated() {
                break;
            }
            self.statement(s, stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, s: &mut Scope, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::DeclareLocal { local, value } => self.declare_local(s, *local, *value),
            Stmt::AssignLocal { local, value } => self.assign_local(s, *local, *value),
            Stmt::AssignGlobal { global, value } => self.assign_global(s, *global, *value),
            Stmt::Expression(e) => self.nested(s, |c, s| {
                c.expression(s, *e)?;
                Ok(())
            }),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => self.if_statement(s, *cond, then_body, else_body),
            Stmt::Return(e) => self.return_statement(s, *e),
            Stmt::Abort { code } => self.abort(s, *code),
        }
    }

    /// Evaluate `e` in a statement frame and take one reference to the
    /// result for the location it is about to be stored in.
    fn owned_value(&mut self, s: &mut Scope, e: ExprId) -> Result<Value, CodegenError> {
        let ty = self.expr_ty(e);
        self.nested(s, |c, s| {
            let value = c.value(s, e)?;
            c.reference(&mut s.b, value, ty);
            Ok(value)
        })
    }

    fn declare_local(&mut self, s: &mut Scope, local: LocalId, e: ExprId) -> Result<(), CodegenError> {
        let Some(binding) = self.program.local(local) else {
            return Err(self.unresolved_local(s, local));
        };
        let ty = binding.ty;
        let value = self.owned_value(s, e)?;
        let target = self.target(ty);
        let slot = s.b.alloca(&mut self.module.tys, target);
        s.b.store(slot, value);
        s.locals.insert(local, slot);
        if self.ownership_of(ty).is_owned() {
            s.defer(Obligation::Slot(slot, ty));
        }
        Ok(())
    }

    fn assign_local(&mut self, s: &mut Scope, local: LocalId, e: ExprId) -> Result<(), CodegenError> {
        let (Some(&slot), Some(binding)) = (s.locals.get(&local), self.program.local(local)) else {
            return Err(self.unresolved_local(s, local));
        };
        let ty = binding.ty;
        let value = self.owned_value(s, e)?;
        let old = s.b.load(&self.module.tys, slot);
        self.release(&mut s.b, old, ty);
        s.b.store(slot, value);
        Ok(())
    }

    fn assign_global(&mut self, s: &mut Scope, global: GlobalId, e: ExprId) -> Result<(), CodegenError> {
        let (ptr, ty) = self.global_ptr(s, global)?;
        let value = self.owned_value(s, e)?;
        let old = s.b.load(&self.module.tys, ptr);
        self.release(&mut s.b, old, ty);
        self.store_storage(&mut s.b, ptr, value, ty);
        Ok(())
    }

    fn if_statement(
        &mut self,
        s: &mut Scope,
        cond: ExprId,
        then_body: &[Stmt],
        else_body: &[Stmt],
    ) -> Result<(), CodegenError> {
        let cond = self.nested(s, |c, s| c.value(s, cond))?;
        let then_block = s.b.new_block();
        let else_block = s.b.new_block();
        let merge = s.b.new_block();
        s.b.branch(cond, then_block, else_block);

        for (block, body) in [(then_block, then_body), (else_block, else_body)] {
            s.b.position_at(block);
            self.nested(s, |c, s| c.statements(s, body))?;
            if !s.b.is_terminated() {
                s.b.jump(merge);
            }
        }
        s.b.position_at(merge);
        Ok(())
    }

    fn return_statement(&mut self, s: &mut Scope, e: ExprId) -> Result<(), CodegenError> {
        let value = if e.is_valid() {
            let value = self.value(s, e)?;
            let ty = self.expr_ty(e);
            self.reference(&mut s.b, value, ty);
            Some(value)
        } else {
            None
        };
        self.early_return(s, value);
        Ok(())
    }

    fn abort(&mut self, s: &mut Scope, code: u32) -> Result<(), CodegenError> {
        let Protocol::Subroutine { result } = s.protocol else {
            return Err(self.fail(
                s,
                ErrorKind::InvalidSubroutineCaller {
                    caller: s.name.clone(),
                },
            ));
        };
        let zero = s.b.zero(result);
        let code = s.b.const_u32(code);
        let value = s.b.insert(&self.module.tys, zero, RESULT_ERROR, code);
        self.release_all(s);
        s.b.ret(Some(value));
        Ok(())
    }

    /// Release every open frame and return `value` under the function's
    /// protocol: directly, or as the value of a successful result.
    pub(crate) fn early_return(&mut self, s: &mut Scope, value: Option<Value>) {
        self.release_all(s);
        let ret = s.b.return_type();
        let returned = match s.protocol {
            Protocol::Plain => match value {
                Some(value) => Some(value),
                None if ret == apic_backend::TyId::VOID => None,
                None => Some(s.b.zero(ret)),
            },
            Protocol::Subroutine { result } => {
                let zero = s.b.zero(result);
                Some(match value {
                    Some(value) => s.b.insert(&self.module.tys, zero, RESULT_VALUE, value),
                    None => zero,
                })
            }
        };
        s.b.ret(returned);
    }

    pub(crate) fn unresolved_local(&self, s: &Scope, local: LocalId) -> CodegenError {
        let program = self.program;
        let name = program.local(local).map_or_else(
            || format!("#{}", local.raw()),
            |b| program.interner.lookup(b.name).to_owned(),
        );
        let mut known: Vec<String> = s
            .locals
            .keys()
            .filter_map(|&l| program.local(l))
            .map(|b| program.interner.lookup(b.name).to_owned())
            .collect();
        known.sort();
        self.fail(
            s,
            ErrorKind::UnresolvedBinding {
                what: "local",
                name,
                known,
            },
        )
    }
}
