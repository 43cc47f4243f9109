//! Static arrays, slices, pointer ranges and maps.

use apic_backend::eval::{AllocKind, Raw};
use apic_ir::{ExprId, ExprKind, Program, Stmt, TypeId};
use pretty_assertions::assert_eq;

use super::helper::{
    compile, function, length, local, param, ptr, string, u32_arg, uint32, Host,
};

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn slice_of(host: &mut Host<'_>, values: &[u32]) -> Raw {
    let bytes = words(values);
    match host.machine.new_slice(host.arena, &bytes, values.len() as u64) {
        Ok(slice) => slice,
        Err(err) => panic!("new_slice failed: {err}"),
    }
}

fn returned_slice(host: &mut Host<'_>, name: &str, args: &[Raw]) -> Raw {
    match host.raw_result(name, args) {
        Some(slice) => slice,
        None => panic!("`{name}` returned nothing"),
    }
}

#[test]
fn make_returns_a_zeroed_owned_slice() {
    let mut p = Program::new();
    let ints = p.types.slice(TypeId::UINT32);
    let n = p.add_param("n", TypeId::UINT32);
    let size = param(&mut p, n);
    let made = p.expr(ExprKind::Make { size }, ints);
    function(&mut p, "zeros", vec![n], ints, vec![Stmt::Return(made)]);
    let size = param(&mut p, n);
    let made = p.expr(ExprKind::Make { size }, ints);
    let len = length(&mut p, made, TypeId::UINT32);
    function(&mut p, "sized", vec![n], TypeId::UINT32, vec![Stmt::Return(len)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("sized", &[u32_arg(5)]), Some(5));
    assert_eq!(host.live(), 0);

    let zeros = returned_slice(&mut host, "zeros", &[u32_arg(3)]);
    assert_eq!(host.machine.slice_bytes(&zeros), Ok(vec![0; 12]));
    let (pool, _, size, count) = host.machine.slice_parts(&zeros);
    assert_eq!((size, count), (12, 3));
    assert_eq!(host.machine.ref_count(pool), Ok(1));
    host.release_slice(&zeros);
    assert_eq!(host.live(), 0);
}

/// `at(s, i) = s[i]`, `copy(s) = clone(s)`, `tail(s) = s[1:]` and
/// `head(s) = s[:2]` over `[]u32`.
fn slice_program() -> Program {
    let mut p = Program::new();
    let ints = p.types.slice(TypeId::UINT32);
    let s = p.add_param("s", ints);
    let i = p.add_param("i", TypeId::UINT32);

    let (slice, index) = (param(&mut p, s), param(&mut p, i));
    let elem = p.expr(ExprKind::SliceIndex { slice, index }, TypeId::UINT32);
    function(&mut p, "at", vec![s, i], TypeId::UINT32, vec![Stmt::Return(elem)]);

    let slice = param(&mut p, s);
    let copy = p.expr(ExprKind::Clone { slice }, ints);
    function(&mut p, "copy", vec![s], ints, vec![Stmt::Return(copy)]);

    let (slice, start) = (param(&mut p, s), uint32(&mut p, 1));
    let tail = p.expr(
        ExprKind::SliceRange {
            slice,
            start,
            end: ExprId::INVALID,
        },
        ints,
    );
    function(&mut p, "tail", vec![s], ints, vec![Stmt::Return(tail)]);

    let (slice, end) = (param(&mut p, s), uint32(&mut p, 2));
    let head = p.expr(
        ExprKind::SliceRange {
            slice,
            start: ExprId::INVALID,
            end,
        },
        ints,
    );
    function(&mut p, "head", vec![s], ints, vec![Stmt::Return(head)]);
    p
}

#[test]
fn slice_index_reads_the_element() {
    let program = slice_program();
    let compiled = compile(&program);
    let mut host = Host::new(&compiled);
    let s = slice_of(&mut host, &[10, 20, 30]);
    assert_eq!(host.uint("at", &[s.clone(), u32_arg(0)]), Some(10));
    assert_eq!(host.uint("at", &[s.clone(), u32_arg(2)]), Some(30));
    host.release_slice(&s);
    assert_eq!(host.live(), 0);
}

#[test]
fn clone_copies_into_a_new_pool() {
    let program = slice_program();
    let compiled = compile(&program);
    let mut host = Host::new(&compiled);
    let s = slice_of(&mut host, &[1, 2, 3]);
    let copy = returned_slice(&mut host, "copy", &[s.clone()]);

    let (original, ..) = host.machine.slice_parts(&s);
    let (cloned, ..) = host.machine.slice_parts(&copy);
    assert_ne!(original, cloned);
    assert_eq!(host.machine.slice_bytes(&copy), Ok(words(&[1, 2, 3])));
    assert_eq!(host.machine.ref_count(original), Ok(1));
    assert_eq!(host.machine.ref_count(cloned), Ok(1));

    host.release_slice(&s);
    assert_eq!(host.machine.slice_bytes(&copy), Ok(words(&[1, 2, 3])));
    host.release_slice(&copy);
    assert_eq!(host.live(), 0);
}

#[test]
fn slice_ranges_share_the_pool() {
    let program = slice_program();
    let compiled = compile(&program);
    let mut host = Host::new(&compiled);
    let s = slice_of(&mut host, &[10, 20, 30]);
    let (pool, ..) = host.machine.slice_parts(&s);

    let tail = returned_slice(&mut host, "tail", &[s.clone()]);
    let (tail_pool, _, size, count) = host.machine.slice_parts(&tail);
    assert_eq!(tail_pool, pool);
    assert_eq!((size, count), (8, 2));
    assert_eq!(host.machine.slice_bytes(&tail), Ok(words(&[20, 30])));
    assert_eq!(host.machine.ref_count(pool), Ok(2));

    let head = returned_slice(&mut host, "head", &[s.clone()]);
    assert_eq!(host.machine.slice_bytes(&head), Ok(words(&[10, 20])));
    assert_eq!(host.machine.ref_count(pool), Ok(3));

    for view in [tail, head, s] {
        host.release_slice(&view);
    }
    assert_eq!(host.live(), 0);
}

#[test]
fn pointer_range_copies_into_an_owned_slice() {
    let mut p = Program::new();
    let raw = p.types.pointer(TypeId::UINT32);
    let ints = p.types.slice(TypeId::UINT32);
    let at = p.add_param("p", raw);
    let (pointer, start, end) = (param(&mut p, at), uint32(&mut p, 1), uint32(&mut p, 3));
    let window = p.expr(ExprKind::PointerRange { pointer, start, end }, ints);
    function(&mut p, "window", vec![at], ints, vec![Stmt::Return(window)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    let buffer = host.machine.alloc(16, AllocKind::Static);
    assert!(host.machine.write(buffer, &words(&[5, 6, 7, 8])).is_ok());

    let slice = returned_slice(&mut host, "window", &[ptr(buffer)]);
    let (pool, base, _, count) = host.machine.slice_parts(&slice);
    assert_eq!(count, 2);
    assert_ne!(base, buffer + 4);
    assert_eq!(host.machine.slice_bytes(&slice), Ok(words(&[6, 7])));
    assert_eq!(host.machine.ref_count(pool), Ok(1));

    // The copy does not alias the source.
    assert!(host.machine.write(buffer + 4, &words(&[60])).is_ok());
    assert_eq!(host.machine.slice_bytes(&slice), Ok(words(&[6, 7])));
    host.release_slice(&slice);
    assert_eq!(host.live(), 0);
}

#[test]
fn array_literal_and_index() {
    let mut p = Program::new();
    let three = p.types.static_array(TypeId::UINT32, 3);
    let i = p.add_param("i", TypeId::UINT32);
    let elems = [uint32(&mut p, 10), uint32(&mut p, 20), uint32(&mut p, 30)];
    let values = p.exprs.alloc_list(elems);
    let array = p.expr(ExprKind::ArrayInitializer { values }, three);
    let index = param(&mut p, i);
    let picked = p.expr(ExprKind::ArrayIndex { array, index }, TypeId::UINT32);
    function(&mut p, "pick", vec![i], TypeId::UINT32, vec![Stmt::Return(picked)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("pick", &[u32_arg(0)]), Some(10));
    assert_eq!(host.uint("pick", &[u32_arg(2)]), Some(30));
}

#[test]
fn array_of_strings_releases_its_elements() {
    let mut p = Program::new();
    let pair = p.types.static_array(TypeId::STRING, 2);
    let elems = [string(&mut p, "a"), string(&mut p, "bcd")];
    let values = p.exprs.alloc_list(elems);
    let array = p.expr(ExprKind::ArrayInitializer { values }, pair);
    let index = uint32(&mut p, 1);
    let second = p.expr(ExprKind::ArrayIndex { array, index }, TypeId::STRING);
    let len = length(&mut p, second, TypeId::UINT32);
    function(&mut p, "second_len", vec![], TypeId::UINT32, vec![Stmt::Return(len)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("second_len", &[]), Some(3));
    assert_eq!(host.live(), 0);
}

/// `keep(m) = { copy = m; return len(copy) }`. Holding a map in a local
/// is what makes the module carry the map's drop function.
fn keep(p: &mut Program, name: &str, map_ty: TypeId) {
    let m = p.add_param("m", map_ty);
    let copy = p.add_local("copy", map_ty);
    let value = param(p, m);
    let read = local(p, copy);
    let len = length(p, read, TypeId::UINT32);
    function(
        p,
        name,
        vec![m],
        TypeId::UINT32,
        vec![Stmt::DeclareLocal { local: copy, value }, Stmt::Return(len)],
    );
}

#[test]
fn string_keyed_map() {
    let mut p = Program::new();
    let table = p.types.map(TypeId::STRING, TypeId::UINT32);
    let m = p.add_param("m", table);
    let k = p.add_param("k", TypeId::STRING);
    let (map, key) = (param(&mut p, m), param(&mut p, k));
    let found = p.expr(ExprKind::MapIndex { map, key }, TypeId::UINT32);
    function(&mut p, "lookup", vec![m, k], TypeId::UINT32, vec![Stmt::Return(found)]);
    let (map, key) = (param(&mut p, m), param(&mut p, k));
    let has = p.expr(ExprKind::MapContains { map, key }, TypeId::BOOL);
    function(&mut p, "has", vec![m, k], TypeId::BOOL, vec![Stmt::Return(has)]);
    keep(&mut p, "keep", table);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    let map = match host.machine.new_map(host.arena) {
        Ok(map) => map,
        Err(err) => panic!("new_map failed: {err}"),
    };
    for (text, value) in [("one", 1), ("two", 2)] {
        let key = host.string(text);
        assert!(host.machine.map_insert(map, ptr(key), u32_arg(value)).is_ok());
    }

    // Keys compare by contents, not by address.
    let two = host.string("two");
    let missing = host.string("three");
    assert_eq!(host.uint("lookup", &[ptr(map), ptr(two)]), Some(2));
    assert_eq!(host.uint("lookup", &[ptr(map), ptr(missing)]), Some(0));
    assert_eq!(host.uint("has", &[ptr(map), ptr(two)]), Some(1));
    assert_eq!(host.uint("has", &[ptr(map), ptr(missing)]), Some(0));
    assert_eq!(host.uint("keep", &[ptr(map)]), Some(2));
    assert_eq!(host.machine.ref_count(map), Ok(1));

    let glue = host.drop_fn(&format!("_apic_drop${}", table.raw()));
    assert_eq!(host.machine.rc_dec(map, glue), Ok(()));
    host.release_string(two);
    host.release_string(missing);
    assert_eq!(host.live(), 0);
}

#[test]
fn map_lookup_of_a_string_value_is_owned() {
    let mut p = Program::new();
    let names = p.types.map(TypeId::UINT32, TypeId::STRING);
    let m = p.add_param("m", names);
    let id = p.add_param("id", TypeId::UINT32);
    let (map, key) = (param(&mut p, m), param(&mut p, id));
    let name = p.expr(ExprKind::MapIndex { map, key }, TypeId::STRING);
    function(&mut p, "name_of", vec![m, id], TypeId::STRING, vec![Stmt::Return(name)]);
    keep(&mut p, "keep", names);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    let map = match host.machine.new_map(host.arena) {
        Ok(map) => map,
        Err(err) => panic!("new_map failed: {err}"),
    };
    let seven = host.string("seven");
    assert!(host.machine.map_insert(map, u32_arg(7), ptr(seven)).is_ok());
    assert_eq!(host.machine.map_len(map), Ok(1));

    let found = host.uint("name_of", &[ptr(map), u32_arg(7)]).unwrap_or(0);
    assert_eq!(found, seven);
    // One count for the map's entry, one for the caller.
    assert_eq!(host.machine.ref_count(seven), Ok(2));
    host.release_string(found);
    assert_eq!(host.uint("name_of", &[ptr(map), u32_arg(8)]), Some(0));

    let glue = host.drop_fn(&format!("_apic_drop${}", names.raw()));
    assert_eq!(host.machine.rc_dec(map, glue), Ok(()));
    assert_eq!(host.live(), 0);
}

#[test]
fn bool_slice_elements_are_stored_as_bytes() {
    let mut p = Program::new();
    let flags = p.types.slice(TypeId::BOOL);
    let s = p.add_param("s", flags);
    let i = p.add_param("i", TypeId::UINT32);
    let (slice, index) = (param(&mut p, s), param(&mut p, i));
    let elem = p.expr(ExprKind::SliceIndex { slice, index }, TypeId::BOOL);
    function(&mut p, "flag", vec![s, i], TypeId::BOOL, vec![Stmt::Return(elem)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    let s = match host.machine.new_slice(host.arena, &[0, 1, 0], 3) {
        Ok(slice) => slice,
        Err(err) => panic!("new_slice failed: {err}"),
    };
    assert_eq!(host.uint("flag", &[s.clone(), u32_arg(1)]), Some(1));
    assert_eq!(host.uint("flag", &[s.clone(), u32_arg(2)]), Some(0));
    host.release_slice(&s);
    assert_eq!(host.live(), 0);
}
