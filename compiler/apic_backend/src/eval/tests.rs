use pretty_assertions::assert_eq;

use super::value::{from_uint, to_uint};
use super::*;
use crate::builder::FunctionBuilder;
use crate::ir::{BinOp, CmpPred};
use crate::runtime::{MapSig, Release, RuntimeFn};

fn define(module: &mut Module, b: FunctionBuilder) -> FuncId {
    let id = module.declare_function(b.name().to_owned(), (0..b.param_count()).map(|i| b.param(i).ty).collect(), b.return_type());
    module.define_function(id, b.finish());
    id
}

/// `free_glue(p)`: free a counted object through its arena.
fn free_glue(module: &mut Module, ty: TyId) -> FuncId {
    let ptr_ty = module.tys.pointer(ty);
    let mut b = FunctionBuilder::new("free_glue", &[ptr_ty], TyId::VOID);
    let p = b.param(0);
    let arena = b.load_field(&mut module.tys, p, field::ARENA);
    let raw = b.cast(crate::ir::CastOp::PtrToPtr, p, TyId::BYTE_PTR);
    b.call(Callee::Runtime(RuntimeFn::Free), &[arena, raw], TyId::VOID);
    b.ret(None);
    define(module, b)
}

#[test]
fn arithmetic_and_branches() {
    let mut module = Module::new();
    // max(a, b) - 1
    let mut b = FunctionBuilder::new("max_minus_one", &[TyId::I32, TyId::I32], TyId::I32);
    let (x, y) = (b.param(0), b.param(1));
    let slot = b.alloca(&mut module.tys, TyId::I32);
    let gt = b.cmp(CmpPred::Gt, x, y);
    let (then_b, else_b, merge) = (b.new_block(), b.new_block(), b.new_block());
    b.branch(gt, then_b, else_b);
    b.position_at(then_b);
    b.store(slot, x);
    b.jump(merge);
    b.position_at(else_b);
    b.store(slot, y);
    b.jump(merge);
    b.position_at(merge);
    let m = b.load(&module.tys, slot);
    let one = b.const_int(TyId::I32, 1);
    let r = b.binary(BinOp::Sub, m, one);
    b.ret(Some(r));
    let f = define(&mut module, b);

    let mut machine = Machine::new(&module);
    let neg = from_uint((-5i32) as u32 as u64, 4);
    let r = machine.call(f, &[neg, from_uint(3, 4)]).ok().flatten();
    assert_eq!(r.map(|r| to_uint(&r)), Some(2));
    let r = machine.call(f, &[from_uint(9, 4), from_uint(3, 4)]).ok().flatten();
    assert_eq!(r.map(|r| to_uint(&r)), Some(8));
}

#[test]
fn strings_are_counted_and_freed() {
    let mut module = Module::new();
    let string = module.rt.string;
    let glue = free_glue(&mut module, string);
    let sp = module.rt.string_ptr;
    // concat_len(arena, a, b) -> u64: length of a ++ b, releasing the temp.
    let mut b = FunctionBuilder::new("concat_len", &[TyId::BYTE_PTR, sp, sp], TyId::U64);
    let (arena, x, y) = (b.param(0), b.param(1), b.param(2));
    let joined = b.call(Callee::Runtime(RuntimeFn::StringConcat), &[arena, x, y], sp);
    let joined = joined.unwrap_or(x);
    let len = b.load_field(&mut module.tys, joined, field::STRING_LENGTH);
    b.rc_dec(joined, glue);
    b.ret(Some(len));
    let f = define(&mut module, b);

    let mut machine = Machine::new(&module);
    let arena = machine.new_arena();
    let a = machine.new_string(arena, b"abc").unwrap_or(0);
    let c = machine.new_string(arena, b"de").unwrap_or(0);
    let args = [from_uint(arena, 8), from_uint(a, 8), from_uint(c, 8)];
    let r = machine.call(f, &args).ok().flatten();
    assert_eq!(r.map(|r| to_uint(&r)), Some(5));
    assert_eq!(machine.live_allocations(), 2);
    assert_eq!(machine.rc_dec(a, glue), Ok(()));
    assert_eq!(machine.rc_dec(c, glue), Ok(()));
    assert_eq!(machine.live_allocations(), 0);
    assert_eq!(machine.rc_dec(a, glue), Err(ExecError::UseAfterFree { addr: a }));
}

#[test]
fn string_compare_orders_bytes() {
    let mut module = Module::new();
    let sp = module.rt.string_ptr;
    let mut b = FunctionBuilder::new("cmp", &[sp, sp], TyId::I32);
    let (x, y) = (b.param(0), b.param(1));
    let r = b.call(Callee::Runtime(RuntimeFn::StringCompare), &[x, y], TyId::I32);
    b.ret(r);
    let f = define(&mut module, b);

    let mut machine = Machine::new(&module);
    let arena = machine.new_arena();
    let a = machine.new_string(arena, b"apple").unwrap_or(0);
    let z = machine.new_string(arena, b"zebra").unwrap_or(0);
    let cmp = |m: &mut Machine<'_>, l: u64, r: u64| {
        m.call(f, &[from_uint(l, 8), from_uint(r, 8)])
            .ok()
            .flatten()
            .map(|r| to_uint(&r) as u32 as i32)
    };
    assert_eq!(cmp(&mut machine, a, z), Some(-1));
    assert_eq!(cmp(&mut machine, z, a), Some(1));
    assert_eq!(cmp(&mut machine, a, a), Some(0));
    // Null is the empty string.
    assert_eq!(cmp(&mut machine, 0, a), Some(-1));
    assert_eq!(cmp(&mut machine, 0, 0), Some(0));
}

#[test]
fn map_lookup_by_string_key() {
    let mut module = Module::new();
    let string = module.rt.string;
    let glue = free_glue(&mut module, string);
    let sp = module.rt.string_ptr;
    let map_ptr = module.rt.map_ptr;
    let sig = MapSig {
        key: sp,
        value: TyId::U32,
        key_release: Release::Rc(glue),
        value_release: Release::None,
    };
    let mut b = FunctionBuilder::new("get", &[map_ptr, sp], TyId::U32);
    let (m, k) = (b.param(0), b.param(1));
    let r = b.call(Callee::Runtime(RuntimeFn::MapLookup(sig)), &[m, k], TyId::U32);
    b.ret(r);
    let get = define(&mut module, b);
    let mut b = FunctionBuilder::new("has", &[map_ptr, sp], TyId::BOOL);
    let (m, k) = (b.param(0), b.param(1));
    let r = b.call(Callee::Runtime(RuntimeFn::MapContains(sig)), &[m, k], TyId::BOOL);
    b.ret(r);
    let has = define(&mut module, b);
    let mut b = FunctionBuilder::new("free", &[map_ptr], TyId::VOID);
    let m = b.param(0);
    b.call(Callee::Runtime(RuntimeFn::FreeMap(sig)), &[m], TyId::VOID);
    b.ret(None);
    let free = define(&mut module, b);

    let mut machine = Machine::new(&module);
    let arena = machine.new_arena();
    let map = machine.new_map(arena).unwrap_or(0);
    let key = machine.new_string(arena, b"width").unwrap_or(0);
    assert_eq!(machine.map_insert(map, from_uint(key, 8), from_uint(640, 4)), Ok(()));
    assert_eq!(machine.map_len(map), Ok(1));
    let probe = machine.new_string(arena, b"width").unwrap_or(0);
    let missing = machine.new_string(arena, b"height").unwrap_or(0);
    let call = |m: &mut Machine<'_>, f, k: u64| {
        m.call(f, &[from_uint(map, 8), from_uint(k, 8)])
            .ok()
            .flatten()
            .map(|r| to_uint(&r))
    };
    assert_eq!(call(&mut machine, get, probe), Some(640));
    assert_eq!(call(&mut machine, get, missing), Some(0));
    assert_eq!(call(&mut machine, has, probe), Some(1));
    assert_eq!(call(&mut machine, has, missing), Some(0));

    assert!(machine.call(free, &[from_uint(map, 8)]).is_ok());
    assert!(!machine.is_live(key));
    assert!(machine.rc_dec(probe, glue).is_ok());
    assert!(machine.rc_dec(missing, glue).is_ok());
    assert_eq!(machine.live_allocations(), 0);
}

#[test]
fn pointer_to_slice_copies() {
    let mut module = Module::new();
    let slice = module.rt.slice;
    let mut b = FunctionBuilder::new(
        "view",
        &[TyId::BYTE_PTR, TyId::BYTE_PTR, TyId::U64, TyId::U64],
        slice,
    );
    let args: Vec<_> = (0..4).map(|i| b.param(i)).collect();
    let r = b.call(Callee::Runtime(RuntimeFn::PointerToSlice), &args, slice);
    b.ret(r);
    let f = define(&mut module, b);

    let mut machine = Machine::new(&module);
    let arena = machine.new_arena();
    let src = machine.alloc(4, AllocKind::Static);
    assert!(machine.write(src, &[1, 2, 3, 4]).is_ok());
    let args = [
        from_uint(arena, 8),
        from_uint(src + 1, 8),
        from_uint(2, 8),
        from_uint(2, 8),
    ];
    let s = machine.call(f, &args).ok().flatten().unwrap_or_default();
    assert_eq!(machine.slice_bytes(&s), Ok(vec![2, 3]));
    assert!(machine.write(src + 1, &[9]).is_ok());
    assert_eq!(machine.slice_bytes(&s), Ok(vec![2, 3]));
    let (pool, _, size, count) = machine.slice_parts(&s);
    assert_eq!((size, count), (2, 2));
    assert_eq!(machine.ref_count(pool), Ok(1));
}

#[test]
fn unreachable_and_limits() {
    let mut module = Module::new();
    let mut b = FunctionBuilder::new("trap", &[], TyId::VOID);
    b.unreachable();
    let trap = define(&mut module, b);
    let mut b = FunctionBuilder::new("spin", &[], TyId::VOID);
    let head = b.new_block();
    b.jump(head);
    b.position_at(head);
    let _ = b.const_bool(true);
    b.jump(head);
    let spin = define(&mut module, b);

    let mut machine = Machine::new(&module).with_step_limit(100);
    assert_eq!(
        machine.call(trap, &[]),
        Err(ExecError::Unreachable {
            function: "trap".to_owned(),
            block: 0
        })
    );
    assert_eq!(machine.call(spin, &[]), Err(ExecError::StepLimit { limit: 100 }));
    assert!(matches!(
        machine.call(trap, &[from_uint(1, 1)]),
        Err(ExecError::ArityMismatch { .. })
    ));
}

#[test]
fn refcount_underflow_is_reported() {
    let mut module = Module::new();
    let pool = module.rt.pool;
    let glue = free_glue(&mut module, pool);
    let mut machine = Machine::new(&module);
    let arena = machine.new_arena();
    let p = machine.new_pool(arena, 8).unwrap_or(0);
    assert!(machine.rc_inc(p).is_ok());
    assert_eq!(machine.ref_count(p), Ok(2));
    assert!(machine.rc_dec(p, glue).is_ok());
    assert!(machine.rc_dec(p, glue).is_ok());
    assert_eq!(machine.live_allocations(), 0);
    assert!(machine.rc_dec(0, glue).is_ok());
}
