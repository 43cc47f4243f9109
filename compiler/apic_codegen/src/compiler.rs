//! Compiler state shared by every function of a program.

use apic_backend::{Callee, FuncId, FunctionBuilder, Module, RuntimeFn, TyId, Value};
use apic_ir::{ExprId, FunctionId, Program, TypeId};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::drop_glue::Glue;
use crate::error::{CodegenError, ErrorKind};
use crate::ownership::Classifier;
use crate::scope::Scope;
use crate::types::TypeMapper;

/// Representation of the context every function receives first:
/// `{ globals: Globals*, arena: u8* }`.
#[derive(Copy, Clone, Debug)]
pub struct ContextTypes {
    pub context: TyId,
    pub context_ptr: TyId,
    /// One storage-typed field per program global, in declaration order.
    pub globals: TyId,
    pub globals_ptr: TyId,
}

/// Lowers the functions of one [`Program`] into a [`Module`].
///
/// All mutable compilation state lives here or in the [`Scope`] of the
/// function being built; both are threaded by `&mut` through every
/// handler.
pub struct Compiler<'p> {
    pub(crate) program: &'p Program,
    pub(crate) module: Module,
    pub(crate) types: TypeMapper,
    pub(crate) ownership: Classifier,
    pub(crate) glue: FxHashMap<Glue, FuncId>,
    pub(crate) functions: FxHashMap<FunctionId, FuncId>,
    pub(crate) compiled: FxHashSet<FunctionId>,
    pub(crate) context: ContextTypes,
    /// Expression currently being compiled, for error attribution.
    pub(crate) current_expr: Option<ExprId>,
}

impl<'p> Compiler<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut module = Module::new();
        let mut types = TypeMapper::new();
        let fields = program
            .globals
            .iter()
            .map(|g| types.storage(program, &mut module, g.ty))
            .collect();
        let globals = module.tys.structure("globals", fields);
        let globals_ptr = module.tys.pointer(globals);
        let context = module
            .tys
            .structure("context", vec![globals_ptr, TyId::BYTE_PTR]);
        let context_ptr = module.tys.pointer(context);
        Self {
            program,
            module,
            types,
            ownership: Classifier::default(),
            glue: FxHashMap::default(),
            functions: FxHashMap::default(),
            compiled: FxHashSet::default(),
            context: ContextTypes {
                context,
                context_ptr,
                globals,
                globals_ptr,
            },
            current_expr: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn context_types(&self) -> ContextTypes {
        self.context
    }

    /// The expression currently being compiled, if any.
    pub fn current_expr(&self) -> Option<ExprId> {
        self.current_expr
    }

    /// Backend function of an already declared program function.
    pub fn function(&self, id: FunctionId) -> Option<FuncId> {
        self.functions.get(&id).copied()
    }

    pub fn finish(self) -> CompiledProgram {
        CompiledProgram {
            module: self.module,
            functions: self.functions,
            context: self.context,
        }
    }

    // Type helpers

    pub(crate) fn target(&mut self, ty: TypeId) -> TyId {
        self.types.target(self.program, &mut self.module, ty)
    }

    pub(crate) fn storage(&mut self, ty: TypeId) -> TyId {
        self.types.storage(self.program, &mut self.module, ty)
    }

    pub(crate) fn expr_ty(&self, e: ExprId) -> TypeId {
        self.program.exprs.ty(e)
    }

    pub(crate) fn describe(&self, ty: TypeId) -> String {
        self.program.types.describe(ty, &self.program.interner)
    }

    /// Load a `ty` from memory and convert it to its target form.
    pub(crate) fn load_storage(&mut self, b: &mut FunctionBuilder, ptr: Value, ty: TypeId) -> Value {
        let raw = b.load(&self.module.tys, ptr);
        self.types
            .to_target(self.program, &mut self.module, b, raw, ty)
    }

    /// Store a target-form `ty` into memory in its storage form.
    pub(crate) fn store_storage(
        &mut self,
        b: &mut FunctionBuilder,
        ptr: Value,
        value: Value,
        ty: TypeId,
    ) {
        let stored = self
            .types
            .to_storage(self.program, &mut self.module, b, value, ty);
        b.store(ptr, stored);
    }

    /// The arena the current function allocates from.
    pub(crate) fn arena(&mut self, s: &mut Scope) -> Value {
        s.b.load_field(&mut self.module.tys, s.ctx, crate::types::CTX_ARENA)
    }

    /// Call a runtime callback that produces a value.
    pub(crate) fn runtime(&self, b: &mut FunctionBuilder, f: RuntimeFn, args: &[Value]) -> Value {
        let ret = f.return_type(&self.module.rt);
        match b.call(Callee::Runtime(f), args, ret) {
            Some(value) => value,
            None => b.zero(ret),
        }
    }

    /// Call a runtime callback for its effect.
    pub(crate) fn runtime_effect(b: &mut FunctionBuilder, f: RuntimeFn, args: &[Value]) {
        b.call(Callee::Runtime(f), args, TyId::VOID);
    }

    // Errors

    pub(crate) fn error(&self, function: &str, kind: ErrorKind) -> CodegenError {
        let err = CodegenError {
            kind,
            expr: self.current_expr,
            function: function.to_owned(),
        };
        tracing::error!(
            function,
            expr = ?err.expr,
            "{}",
            err.kind
        );
        err
    }

    pub(crate) fn fail(&self, s: &Scope, kind: ErrorKind) -> CodegenError {
        self.error(&s.name, kind)
    }
}

/// Output of [`compile_program`](crate::compile_program).
pub struct CompiledProgram {
    pub module: Module,
    functions: FxHashMap<FunctionId, FuncId>,
    pub context: ContextTypes,
}

impl CompiledProgram {
    pub fn function(&self, id: FunctionId) -> Option<FuncId> {
        self.functions.get(&id).copied()
    }
}
