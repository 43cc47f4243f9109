//! Literals and bindings.
//!
//! Scalar literals are constants and own nothing. A string literal builds
//! a fresh runtime string over read-only module data and owns it. Bindings
//! (locals, parameters, globals) are borrowed: reading one takes no
//! reference.

use apic_backend::{RuntimeFn, Value};
use apic_ir::{ExprId, GlobalId, LocalId, Name, ParamId, TypeId};

use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::Scope;
use crate::types::CTX_GLOBALS;

impl Compiler<'_> {
    pub(super) fn int_literal(&mut self, s: &mut Scope, e: ExprId, v: i64) -> Value {
        let ty = self.target(self.expr_ty(e));
        s.b.const_int(ty, v as u64)
    }

    pub(super) fn uint_literal(&mut self, s: &mut Scope, e: ExprId, v: u64) -> Value {
        let ty = self.target(self.expr_ty(e));
        s.b.const_int(ty, v)
    }

    pub(super) fn float_literal(&mut self, s: &mut Scope, e: ExprId, bits: u64) -> Value {
        let ty = self.target(self.expr_ty(e));
        s.b.const_float(ty, bits)
    }

    /// `make_string(arena, len, data)` over the literal's bytes.
    pub(super) fn string_literal(&mut self, s: &mut Scope, e: ExprId, text: Name) -> Value {
        let text = self.program.interner.lookup(text);
        let data = self.module.add_data(text.as_bytes());
        let arena = self.arena(s);
        let len = s.b.const_u64(text.len() as u64);
        let bytes = s.b.data(data);
        let string = self.runtime(&mut s.b, RuntimeFn::MakeString, &[arena, len, bytes]);
        self.defer_release(s, string, self.expr_ty(e));
        string
    }

    pub(super) fn local_value(&mut self, s: &mut Scope, local: LocalId) -> Result<Value, CodegenError> {
        match s.locals.get(&local) {
            Some(&slot) => Ok(s.b.load(&self.module.tys, slot)),
            None => Err(self.unresolved_local(s, local)),
        }
    }

    /// The value bound to a parameter of the function being compiled.
    pub fn parameter(&self, s: &Scope, param: ParamId) -> Result<Value, CodegenError> {
        if let Some(&value) = s.params.get(&param) {
            return Ok(value);
        }
        let program = self.program;
        let name = program.param(param).map_or_else(
            || format!("#{}", param.raw()),
            |b| program.interner.lookup(b.name).to_owned(),
        );
        let known = program
            .function(s.function)
            .map(|f| self.parameter_names(&f.params))
            .unwrap_or_default();
        Err(self.fail(
            s,
            ErrorKind::UnresolvedBinding {
                what: "parameter",
                name,
                known,
            },
        ))
    }

    /// Address of a global's storage, reached through the context, and its
    /// semantic type.
    pub(crate) fn global_ptr(
        &mut self,
        s: &mut Scope,
        global: GlobalId,
    ) -> Result<(Value, TypeId), CodegenError> {
        let program = self.program;
        let Some(binding) = program.global(global) else {
            let known = program
                .globals
                .iter()
                .map(|b| program.interner.lookup(b.name).to_owned())
                .collect();
            return Err(self.fail(
                s,
                ErrorKind::UnresolvedBinding {
                    what: "global",
                    name: format!("#{}", global.raw()),
                    known,
                },
            ));
        };
        let globals = s.b.load_field(&mut self.module.tys, s.ctx, CTX_GLOBALS);
        let ptr = s.b.field_ptr(&mut self.module.tys, globals, global.raw());
        Ok((ptr, binding.ty))
    }

    pub(super) fn global_value(&mut self, s: &mut Scope, global: GlobalId) -> Result<Value, CodegenError> {
        let (ptr, ty) = self.global_ptr(s, global)?;
        Ok(self.load_storage(&mut s.b, ptr, ty))
    }
}
