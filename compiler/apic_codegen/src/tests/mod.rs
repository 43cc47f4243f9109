//! End-to-end tests: build a program, compile it, run it on the reference
//! evaluator.
//!
//! Every test that runs code also checks that the heap is empty once the
//! host has dropped what it was handed back, which is how ownership bugs
//! (leaks, double releases, use after free) show up.

mod container_tests;
mod statement_tests;

pub mod helper {
    use apic_backend::eval::value::{from_uint, to_uint};
    use apic_backend::eval::{AllocKind, ExecResult, Machine, Raw};
    use apic_backend::{FuncId, TyId};
    use apic_ir::{
        BinaryOp, ExprId, ExprKind, FunctionId, GlobalId, LocalId, ParamId, Program, Stmt,
        TypeId,
    };

    use crate::types::{CTX_ARENA, CTX_GLOBALS, RESULT_ERROR, RESULT_VALUE};
    use crate::{compile_program, CompiledProgram, GLOBALS_INIT};

    /// Compile `program`, failing the test on a codegen error.
    pub fn compile(program: &Program) -> CompiledProgram {
        crate::init_tracing();
        match compile_program(program) {
            Ok(compiled) => compiled,
            Err(err) => panic!("compilation failed: {err}"),
        }
    }

    // --- Program construction ---

    pub fn uint32(p: &mut Program, v: u32) -> ExprId {
        p.expr(ExprKind::Uint32(v), TypeId::UINT32)
    }

    pub fn uint64(p: &mut Program, v: u64) -> ExprId {
        p.expr(ExprKind::Uint64(v), TypeId::UINT64)
    }

    pub fn boolean(p: &mut Program, v: bool) -> ExprId {
        p.expr(ExprKind::Bool(v), TypeId::BOOL)
    }

    pub fn string(p: &mut Program, text: &str) -> ExprId {
        let name = p.name(text);
        p.expr(ExprKind::Str(name), TypeId::STRING)
    }

    pub fn param(p: &mut Program, id: ParamId) -> ExprId {
        let ty = p.params[id.index()].ty;
        p.expr(ExprKind::Parameter(id), ty)
    }

    pub fn local(p: &mut Program, id: LocalId) -> ExprId {
        let ty = p.locals[id.index()].ty;
        p.expr(ExprKind::Local(id), ty)
    }

    pub fn global(p: &mut Program, id: GlobalId) -> ExprId {
        let ty = p.globals[id.index()].ty;
        p.expr(ExprKind::Global(id), ty)
    }

    pub fn binary(p: &mut Program, op: BinaryOp, lhs: ExprId, rhs: ExprId, ty: TypeId) -> ExprId {
        p.expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn call(p: &mut Program, target: FunctionId, args: &[ExprId]) -> ExprId {
        let ty = p.function(target).map_or(TypeId::VOID, |f| f.return_type);
        let args = p.exprs.alloc_list(args.iter().copied());
        p.expr(ExprKind::Call { target, args }, ty)
    }

    pub fn length(p: &mut Program, object: ExprId, ty: TypeId) -> ExprId {
        p.expr(ExprKind::Length { object }, ty)
    }

    /// Declare and define a plain function.
    pub fn function(
        p: &mut Program,
        name: &str,
        params: Vec<ParamId>,
        ret: TypeId,
        body: Vec<Stmt>,
    ) -> FunctionId {
        let id = p.declare_function(name, params, ret, false);
        p.set_body(id, body);
        id
    }

    /// Declare and define a subroutine.
    pub fn subroutine(
        p: &mut Program,
        name: &str,
        params: Vec<ParamId>,
        ret: TypeId,
        body: Vec<Stmt>,
    ) -> FunctionId {
        let id = p.declare_function(name, params, ret, true);
        p.set_body(id, body);
        id
    }

    /// `calls = calls + 1`, for observing evaluation.
    pub fn count_call(p: &mut Program, counter: GlobalId) -> Stmt {
        let current = global(p, counter);
        let one = uint32(p, 1);
        let value = binary(p, BinaryOp::Add, current, one, TypeId::UINT32);
        Stmt::AssignGlobal {
            global: counter,
            value,
        }
    }

    /// `name() { trace = trace * 10 + digit; return result }`, so calls
    /// leave their order in `trace` as decimal digits.
    pub fn traced(
        p: &mut Program,
        trace: GlobalId,
        name: &str,
        digit: u32,
        result: ExprId,
    ) -> FunctionId {
        let current = global(p, trace);
        let ten = uint32(p, 10);
        let shifted = binary(p, BinaryOp::Mul, current, ten, TypeId::UINT32);
        let digit = uint32(p, digit);
        let value = binary(p, BinaryOp::Add, shifted, digit, TypeId::UINT32);
        let ty = p.exprs.ty(result);
        function(
            p,
            name,
            vec![],
            ty,
            vec![
                Stmt::AssignGlobal {
                    global: trace,
                    value,
                },
                Stmt::Return(result),
            ],
        )
    }

    // --- Execution ---

    /// An evaluator with a context, a globals block and an arena set up for
    /// one compiled program.
    pub struct Host<'m> {
        pub compiled: &'m CompiledProgram,
        pub machine: Machine<'m>,
        pub ctx: u64,
        pub globals: u64,
        pub arena: u64,
    }

    impl<'m> Host<'m> {
        pub fn new(compiled: &'m CompiledProgram) -> Self {
            let tys = &compiled.module.tys;
            let context = compiled.context;
            let mut machine = Machine::new(&compiled.module);
            let arena = machine.new_arena();
            let globals = machine.alloc(tys.size_of(context.globals), AllocKind::Static);
            let ctx = machine.alloc(tys.size_of(context.context), AllocKind::Static);
            let globals_at = ctx + tys.offset_of(context.context, CTX_GLOBALS);
            let arena_at = ctx + tys.offset_of(context.context, CTX_ARENA);
            assert!(machine.write(globals_at, &globals.to_le_bytes()).is_ok());
            assert!(machine.write(arena_at, &arena.to_le_bytes()).is_ok());
            let mut host = Self {
                compiled,
                machine,
                ctx,
                globals,
                arena,
            };
            if compiled.module.function_by_name(GLOBALS_INIT).is_some() {
                assert_eq!(host.call(GLOBALS_INIT, &[]), Ok(None));
            }
            host
        }

        /// Call `name` with the context prepended to `args`.
        pub fn call(&mut self, name: &str, args: &[Raw]) -> ExecResult<Option<Raw>> {
            let mut all = vec![from_uint(self.ctx, 8)];
            all.extend_from_slice(args);
            self.machine.call_by_name(name, &all)
        }

        /// Call `name` and read its result as an unsigned integer.
        pub fn uint(&mut self, name: &str, args: &[Raw]) -> Option<u64> {
            match self.call(name, args) {
                Ok(result) => result.map(|r| to_uint(&r)),
                Err(err) => panic!("`{name}` failed: {err}"),
            }
        }

        /// Call a subroutine and split its result into `(error, value)`.
        pub fn subroutine(&mut self, name: &str, args: &[Raw]) -> (u32, u64) {
            let Some(raw) = self.raw_result(name, args) else {
                panic!("`{name}` returned nothing");
            };
            let ret = self.decl_return(name);
            let tys = &self.compiled.module.tys;
            let at = |index| {
                let offset = usize::try_from(tys.offset_of(ret, index)).unwrap_or(0);
                let size = tys
                    .field(ret, index)
                    .map_or(0, |f| usize::try_from(tys.size_of(f)).unwrap_or(0));
                to_uint(&raw[offset..offset + size])
            };
            let value = if tys.field(ret, RESULT_VALUE).is_some() {
                at(RESULT_VALUE)
            } else {
                0
            };
            (at(RESULT_ERROR) as u32, value)
        }

        /// Call `name` and return its raw result image.
        pub fn raw_result(&mut self, name: &str, args: &[Raw]) -> Option<Raw> {
            match self.call(name, args) {
                Ok(result) => result,
                Err(err) => panic!("`{name}` failed: {err}"),
            }
        }

        fn decl_return(&self, name: &str) -> TyId {
            let module = &self.compiled.module;
            module
                .function_by_name(name)
                .map_or(TyId::VOID, |f| module.decl(f).return_type)
        }

        /// Current stored bytes of global `index`, as an unsigned integer.
        pub fn global(&self, index: u32) -> u64 {
            let tys = &self.compiled.module.tys;
            let globals = self.compiled.context.globals;
            let size = tys.field(globals, index).map_or(0, |f| tys.size_of(f));
            let addr = self.globals + tys.offset_of(globals, index);
            self.machine.read(addr, size).map_or(0, |raw| to_uint(&raw))
        }

        pub fn string(&mut self, text: &str) -> u64 {
            match self.machine.new_string(self.arena, text.as_bytes()) {
                Ok(addr) => addr,
                Err(err) => panic!("new_string failed: {err}"),
            }
        }

        /// A drop function the compiled module contains.
        pub fn drop_fn(&self, name: &str) -> FuncId {
            match self.compiled.module.function_by_name(name) {
                Some(f) => f,
                None => panic!("no drop function `{name}`"),
            }
        }

        /// Drop one reference to a string.
        pub fn release_string(&mut self, addr: u64) {
            let glue = self.drop_fn("_apic_drop$string");
            assert_eq!(self.machine.rc_dec(addr, glue), Ok(()));
        }

        /// Drop one reference to a slice's pool.
        pub fn release_slice(&mut self, slice: &[u8]) {
            let (pool, ..) = self.machine.slice_parts(slice);
            let glue = self.drop_fn("_apic_drop$pool");
            assert_eq!(self.machine.rc_dec(pool, glue), Ok(()));
        }

        pub fn live(&self) -> usize {
            self.machine.live_allocations()
        }
    }

    pub fn ptr(addr: u64) -> Raw {
        from_uint(addr, 8)
    }

    pub fn u32_arg(v: u32) -> Raw {
        from_uint(u64::from(v), 4)
    }

    pub fn u64_arg(v: u64) -> Raw {
        from_uint(v, 8)
    }

    pub fn bool_arg(v: bool) -> Raw {
        from_uint(u64::from(v), 1)
    }
}
