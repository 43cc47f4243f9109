//! Statements, release frames and function exits.

use apic_ir::{ExprId, Program, Stmt, TypeId};
use pretty_assertions::assert_eq;

use super::helper::{bool_arg, compile, function, global, length, local, param, string, uint32, Host};
use crate::Compiler;

#[test]
fn if_else_branches() {
    let mut p = Program::new();
    let flag = p.add_param("flag", TypeId::BOOL);
    let cond = param(&mut p, flag);
    let (one, two) = (uint32(&mut p, 1), uint32(&mut p, 2));
    function(
        &mut p,
        "pick",
        vec![flag],
        TypeId::UINT32,
        vec![Stmt::If {
            cond,
            then_body: vec![Stmt::Return(one)],
            else_body: vec![Stmt::Return(two)],
        }],
    );

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("pick", &[bool_arg(true)]), Some(1));
    assert_eq!(host.uint("pick", &[bool_arg(false)]), Some(2));
}

#[test]
fn branch_locals_are_released_when_the_branch_ends() {
    let mut p = Program::new();
    let last = p.add_global("last", TypeId::STRING);
    let flag = p.add_param("flag", TypeId::BOOL);
    let s = p.add_local("s", TypeId::STRING);
    let cond = param(&mut p, flag);
    let (yes, no) = (string(&mut p, "yes"), string(&mut p, "no"));
    let read = local(&mut p, s);
    function(
        &mut p,
        "remember",
        vec![flag],
        TypeId::VOID,
        vec![Stmt::If {
            cond,
            then_body: vec![
                Stmt::DeclareLocal {
                    local: s,
                    value: yes,
                },
                Stmt::AssignGlobal {
                    global: last,
                    value: read,
                },
            ],
            else_body: vec![Stmt::AssignGlobal {
                global: last,
                value: no,
            }],
        }],
    );

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("remember", &[bool_arg(true)]), None);
    let held = host.global(last.raw());
    assert_eq!(host.machine.read_string(held), Ok("yes".to_owned()));
    assert_eq!(host.machine.ref_count(held), Ok(1));
    assert_eq!(host.live(), 1);

    assert_eq!(host.uint("remember", &[bool_arg(false)]), None);
    let held = host.global(last.raw());
    assert_eq!(host.machine.read_string(held), Ok("no".to_owned()));
    assert_eq!(host.live(), 1);
    host.release_string(held);
    assert_eq!(host.live(), 0);
}

#[test]
fn early_return_releases_every_open_frame() {
    let mut p = Program::new();
    let flag = p.add_param("flag", TypeId::BOOL);
    let (outer, inner) = (p.add_local("outer", TypeId::STRING), p.add_local("inner", TypeId::STRING));
    let cond = param(&mut p, flag);
    let (long, short) = (string(&mut p, "outer!"), string(&mut p, "in"));
    let read_inner = local(&mut p, inner);
    let inner_len = length(&mut p, read_inner, TypeId::UINT32);
    let read_outer = local(&mut p, outer);
    let outer_len = length(&mut p, read_outer, TypeId::UINT32);
    function(
        &mut p,
        "early",
        vec![flag],
        TypeId::UINT32,
        vec![
            Stmt::DeclareLocal {
                local: outer,
                value: long,
            },
            Stmt::If {
                cond,
                then_body: vec![
                    Stmt::DeclareLocal {
                        local: inner,
                        value: short,
                    },
                    Stmt::Return(inner_len),
                ],
                else_body: vec![],
            },
            Stmt::Return(outer_len),
        ],
    );

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("early", &[bool_arg(true)]), Some(2));
    assert_eq!(host.live(), 0);
    assert_eq!(host.uint("early", &[bool_arg(false)]), Some(6));
    assert_eq!(host.live(), 0);
}

#[test]
fn falling_off_the_end_returns_zero() {
    let mut p = Program::new();
    let one = uint32(&mut p, 1);
    function(&mut p, "nothing", vec![], TypeId::UINT32, vec![Stmt::Expression(one)]);
    function(
        &mut p,
        "bare",
        vec![],
        TypeId::VOID,
        vec![Stmt::Return(ExprId::INVALID)],
    );
    let counter = p.add_global("counter", TypeId::UINT32);
    let read = global(&mut p, counter);
    function(&mut p, "counter", vec![], TypeId::UINT32, vec![Stmt::Return(read)]);

    let compiled = compile(&p);
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("nothing", &[]), Some(0));
    assert_eq!(host.uint("bare", &[]), None);
    assert_eq!(host.uint("counter", &[]), Some(0));
}

#[test]
fn statement_frames_track_pending_releases() {
    let mut p = Program::new();
    let f = p.declare_function("f", vec![], TypeId::VOID, false);
    let text = string(&mut p, "pending");
    let number = uint32(&mut p, 3);

    crate::init_tracing();
    let mut compiler = Compiler::new(&p);
    let mut s = match compiler.begin_function(f) {
        Ok(s) => s,
        Err(err) => panic!("begin_function failed: {err}"),
    };
    assert_eq!((s.depth(), s.pending()), (1, 0));
    assert!(matches!(compiler.expression(&mut s, number), Ok(Some(_))));
    assert_eq!(s.pending(), 0);
    assert!(matches!(compiler.expression(&mut s, text), Ok(Some(_))));
    assert_eq!(s.pending(), 1);
    assert_eq!(compiler.current_expr(), None);
    compiler.end_function(s);

    let compiled = compiler.finish();
    let mut host = Host::new(&compiled);
    assert_eq!(host.uint("f", &[]), None);
    assert_eq!(host.live(), 0);
}
