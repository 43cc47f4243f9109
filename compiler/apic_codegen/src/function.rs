//! Function declaration and compilation.
//!
//! Every program function becomes one backend function whose first
//! parameter is the context pointer. Declaration and compilation are both
//! memoized by [`FunctionId`], which lets a call compile its target on
//! demand (and lets a function call itself).

use apic_backend::{FuncId, FunctionBuilder, TyId};
use apic_ir::{FunctionId, GlobalId};

use crate::compiler::Compiler;
use crate::error::{CodegenError, ErrorKind};
use crate::scope::{Protocol, Scope};

/// `(ctx)`: stores the initial value of every global whose initial value
/// isn't zero. Hosts call it once, after zeroing the globals block.
pub const GLOBALS_INIT: &str = "_apic_init_globals";

impl Compiler<'_> {
    /// Declare `id` in the module, once.
    pub(crate) fn declare(&mut self, id: FunctionId) -> Result<FuncId, CodegenError> {
        if let Some(&f) = self.functions.get(&id) {
            return Ok(f);
        }
        let program = self.program;
        let Some(function) = program.function(id) else {
            return Err(self.error(
                &format!("#{}", id.raw()),
                ErrorKind::UnresolvedCallTarget { target: id.raw() },
            ));
        };
        let name = program.interner.lookup(function.name);

        let mut params = vec![self.context.context_ptr];
        for &param in &function.params {
            let Some(binding) = program.param(param) else {
                return Err(self.error(
                    name,
                    ErrorKind::UnresolvedBinding {
                        what: "parameter",
                        name: format!("#{}", param.raw()),
                        known: self.parameter_names(&function.params),
                    },
                ));
            };
            params.push(self.target(binding.ty));
        }
        let return_type = if function.subroutine {
            self.types
                .result(program, &mut self.module, function.return_type)
        } else {
            self.target(function.return_type)
        };

        let f = self.module.declare_function(name, params, return_type);
        self.functions.insert(id, f);
        Ok(f)
    }

    /// Compile the body of `id`, once.
    ///
    /// The current-expression marker of a caller that triggered this
    /// compilation is restored afterwards, whether or not it succeeds.
    pub fn compile_function(&mut self, id: FunctionId) -> Result<FuncId, CodegenError> {
        let f = self.declare(id)?;
        if !self.compiled.insert(id) {
            return Ok(f);
        }
        let outer = self.current_expr.take();
        let result = self.compile_body(id);
        self.current_expr = outer;
        result.map(|()| f)
    }

    fn compile_body(&mut self, id: FunctionId) -> Result<(), CodegenError> {
        let program = self.program;
        let mut s = self.begin_function(id)?;
        if let Some(function) = program.function(id) {
            self.statements(&mut s, &function.body)?;
        }
        self.end_function(s);
        Ok(())
    }

    /// Open a scope for `id` with its parameters bound.
    pub fn begin_function(&mut self, id: FunctionId) -> Result<Scope, CodegenError> {
        let f = self.declare(id)?;
        let program = self.program;
        let decl = self.module.decl(f);
        let b = FunctionBuilder::new(decl.name.clone(), &decl.params, decl.return_type);
        let (protocol, params) = match program.function(id) {
            Some(function) if function.subroutine => (
                Protocol::Subroutine {
                    result: decl.return_type,
                },
                function.params.as_slice(),
            ),
            Some(function) => (Protocol::Plain, function.params.as_slice()),
            None => (Protocol::Plain, &[][..]),
        };
        let mut s = Scope::new(b, id, protocol);
        for (i, &param) in params.iter().enumerate() {
            let value = s.b.param(i + 1);
            s.params.insert(param, value);
        }
        tracing::trace!(function = %s.name, ?protocol, "begin function");
        Ok(s)
    }

    /// Close the body of `s` and define it in the module.
    ///
    /// A body that falls off its end releases every open frame and returns
    /// the zero value, which for a subroutine means success.
    pub fn end_function(&mut self, mut s: Scope) {
        if !s.b.is_terminated() {
            self.release_all(&mut s);
            let ret = s.b.return_type();
            if ret == TyId::VOID {
                s.b.ret(None);
            } else {
                let zero = s.b.zero(ret);
                s.b.ret(Some(zero));
            }
        }
        let Some(&f) = self.functions.get(&s.function) else {
            return;
        };
        let body = s.b.finish();
        tracing::debug!(
            function = %body.name,
            blocks = body.blocks.len(),
            instrs = body.instr_count(),
            "compiled function"
        );
        self.module.define_function(f, body);
    }

    /// Define [`GLOBALS_INIT`].
    pub fn define_globals_init(&mut self) -> Result<FuncId, CodegenError> {
        let program = self.program;
        let params = [self.context.context_ptr];
        let f = self
            .module
            .declare_function(GLOBALS_INIT, params.to_vec(), TyId::VOID);
        let b = FunctionBuilder::new(GLOBALS_INIT, &params, TyId::VOID);
        let mut s = Scope::new(b, FunctionId::new(u32::MAX), Protocol::Plain);
        for (index, binding) in (0u32..).zip(&program.globals) {
            let Some(value) = self.initial_value(&mut s, binding.ty)? else {
                continue;
            };
            let (ptr, ty) = self.global_ptr(&mut s, GlobalId::new(index))?;
            self.reference(&mut s.b, value, ty);
            self.store_storage(&mut s.b, ptr, value, ty);
        }
        self.release_all(&mut s);
        s.b.ret(None);
        self.module.define_function(f, s.b.finish());
        Ok(f)
    }

    pub(crate) fn parameter_names(&self, params: &[apic_ir::ParamId]) -> Vec<String> {
        params
            .iter()
            .filter_map(|&p| self.program.param(p))
            .map(|b| self.program.interner.lookup(b.name).to_owned())
            .collect()
    }
}
