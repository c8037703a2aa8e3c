// stela-core - Execution engine tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Engine laws over hand-assembled programs.

use std::rc::Rc;

use stela_core::program::{FuncInfo, Program, SourceLoc, ENTRY_KEY};
use stela_core::{Context, Index, MathOp, OpCode, Outcome, Predicate, StelaVal};

/// Build a program whose entry starts at instruction 0 with the given frame
/// size.
fn entry_program(frame_size: usize, instructions: Vec<OpCode>) -> Program {
    let mut program = Program {
        instructions,
        ..Program::default()
    };
    program.functions.insert(
        ENTRY_KEY,
        FuncInfo {
            address: 0,
            params_count: 0,
            frame_size,
        },
    );
    program
}

fn run(program: Program) -> Context {
    let mut ctx = Context::new(Rc::new(program));
    let outcome = ctx.run().expect("run failed");
    assert_eq!(outcome, Outcome::Ended);
    ctx
}

fn default_output(ctx: &Context) -> Vec<String> {
    ctx.text_results()
        .get("default")
        .cloned()
        .unwrap_or_default()
}

#[test]
fn adds_and_emits() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(3.0),
            OpCode::PushNumber(4.0),
            OpCode::Add,
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["7"]);
}

#[test]
fn dup_then_unload_leaves_stack_unchanged() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(5.0),
            OpCode::Dup,
            OpCode::Pop,
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["5"]);
}

#[test]
fn reset_is_idempotent() {
    let once = run(entry_program(
        1,
        vec![
            OpCode::PushNumber(9.0),
            OpCode::Store(0),
            OpCode::Reset(0),
            OpCode::PushRegister(0),
            OpCode::Emit,
        ],
    ));
    let twice = run(entry_program(
        1,
        vec![
            OpCode::PushNumber(9.0),
            OpCode::Store(0),
            OpCode::Reset(0),
            OpCode::Reset(0),
            OpCode::PushRegister(0),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&once), default_output(&twice));
}

#[test]
fn conditional_jump_takes_matching_branch() {
    // load 1; load 2; jmplt 6; load "no"; emit; jmp 8; load "yes"; emit
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::PushNumber(2.0),
            OpCode::JumpIf(Predicate::Lt, 6),
            OpCode::PushText("no".into()),
            OpCode::Emit,
            OpCode::Jump(8),
            OpCode::PushText("yes".into()),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["yes"]);
}

#[test]
fn call_copies_parameters_into_registers() {
    // sum.2 at 0: load #0; load #1; add; ret -- entry at 4
    let mut program = entry_program(
        0,
        vec![
            OpCode::PushRegister(0),
            OpCode::PushRegister(1),
            OpCode::Add,
            OpCode::Ret,
            OpCode::PushNumber(10.0),
            OpCode::PushNumber(32.0),
            OpCode::Call(0),
            OpCode::Emit,
        ],
    );
    program.functions.insert(
        0,
        FuncInfo {
            address: 0,
            params_count: 2,
            frame_size: 2,
        },
    );
    program.functions.get_mut(&ENTRY_KEY).unwrap().address = 4;
    let ctx = run(program);
    assert_eq!(default_output(&ctx), ["42"]);
}

#[test]
fn sequential_calls_restore_the_caller() {
    // double.1 at 0; entry calls it twice and emits both results
    let mut program = entry_program(
        0,
        vec![
            OpCode::PushRegister(0),
            OpCode::PushNumber(2.0),
            OpCode::Mul,
            OpCode::Ret,
            OpCode::PushNumber(3.0),
            OpCode::Call(0),
            OpCode::Emit,
            OpCode::PushNumber(5.0),
            OpCode::Call(0),
            OpCode::Emit,
        ],
    );
    program.functions.insert(
        0,
        FuncInfo {
            address: 0,
            params_count: 1,
            frame_size: 1,
        },
    );
    program.functions.get_mut(&ENTRY_KEY).unwrap().address = 4;
    let ctx = run(program);
    assert_eq!(default_output(&ctx), ["6", "10"]);
}

#[test]
fn globals_shadow_across_calls() {
    // fn at 0 reads global 0; entry stores, calls, and re-reads after ret
    let mut program = entry_program(
        1,
        vec![
            OpCode::PushGlobal(0),
            OpCode::Emit,
            OpCode::Ret,
            OpCode::PushNumber(7.0),
            OpCode::StoreGlobal(0),
            OpCode::Call(0),
            OpCode::PushGlobal(0),
            OpCode::Emit,
        ],
    );
    program.shared_var_names.push("g".to_string());
    program.functions.insert(
        0,
        FuncInfo {
            address: 0,
            params_count: 0,
            frame_size: 0,
        },
    );
    program.functions.get_mut(&ENTRY_KEY).unwrap().address = 3;
    let ctx = run(program);
    assert_eq!(default_output(&ctx), ["7", "7"]);
    assert_eq!(ctx.shared("g").unwrap(), StelaVal::Number(7.0));
}

// Cross-variant comparison returns Equal. This is preserved legacy behavior:
// `1 eq "x"` is observably true from scripts.
#[test]
fn cross_variant_comparison_is_equal_legacy() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::PushText("x".into()),
            OpCode::Cmp(Predicate::Eq),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["true"]);
}

#[test]
fn empty_compares_equal_only_to_empty() {
    let empty = OpCode::PushConst {
        selector: ":null".into(),
        value: StelaVal::Empty,
    };
    let ctx = run(entry_program(
        0,
        vec![
            empty.clone(),
            empty.clone(),
            OpCode::Cmp(Predicate::Eq),
            OpCode::Emit,
            empty.clone(),
            OpCode::PushNumber(0.0),
            OpCode::Cmp(Predicate::Eq),
            OpCode::Emit,
            empty,
            OpCode::PushNumber(0.0),
            OpCode::Cmp(Predicate::Ne),
            OpCode::Emit,
        ],
    ));
    // Empty vs number is Undefined: eq fails, ne holds.
    assert_eq!(default_output(&ctx), ["true", "false", "true"]);
}

#[test]
fn division_by_zero_is_ieee_infinity() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::PushNumber(0.0),
            OpCode::Div,
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["inf"]);
}

#[test]
fn make_array_preserves_source_order() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::PushNumber(2.0),
            OpCode::PushNumber(3.0),
            OpCode::MakeArray(3),
            OpCode::GetIndex(Index::Number(0.0)),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["1"]);
}

#[test]
fn make_hash_and_immediate_lookup() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushText("a".into()),
            OpCode::PushNumber(1.0),
            OpCode::PushText("b".into()),
            OpCode::PushNumber(2.0),
            OpCode::MakeHash(2),
            OpCode::GetIndex(Index::Key("b".into())),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["2"]);
}

#[test]
fn set_op_combines_element_with_value() {
    let ctx = run(entry_program(
        1,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::MakeArray(1),
            OpCode::Store(0),
            OpCode::PushNumber(5.0),
            OpCode::PushRegister(0),
            OpCode::PushNumber(0.0),
            OpCode::SetOp(MathOp::Add),
            OpCode::PushRegister(0),
            OpCode::GetIndex(Index::Number(0.0)),
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["6"]);
}

#[test]
fn bind_refs_binds_the_hash_as_receiver() {
    // greet.1 at 0: load "hello "; load #0; get.index "name"; concat; ret
    let mut program = entry_program(
        1,
        vec![
            OpCode::PushText("hello ".into()),
            OpCode::PushRegister(0),
            OpCode::GetIndex(Index::Key("name".into())),
            OpCode::Concat,
            OpCode::Ret,
            OpCode::PushText("name".into()),
            OpCode::PushText("world".into()),
            OpCode::PushText("greet".into()),
            OpCode::MakeRef(0),
            OpCode::MakeHash(2),
            OpCode::BindRefs,
            OpCode::Store(0),
            OpCode::PushRegister(0),
            OpCode::GetIndex(Index::Key("greet".into())),
            OpCode::Invoke,
            OpCode::Emit,
        ],
    );
    program.functions.insert(
        0,
        FuncInfo {
            address: 0,
            params_count: 1,
            frame_size: 1,
        },
    );
    program.functions.get_mut(&ENTRY_KEY).unwrap().address = 5;
    let ctx = run(program);
    assert_eq!(default_output(&ctx), ["hello world"]);
}

#[test]
fn store_outer_writes_the_caller_frame() {
    let mut program = entry_program(
        1,
        vec![
            OpCode::PushNumber(42.0),
            OpCode::StoreOuter {
                level: 1,
                register: 0,
            },
            OpCode::Ret,
            OpCode::Call(0),
            OpCode::PushRegister(0),
            OpCode::Emit,
        ],
    );
    program.functions.insert(
        0,
        FuncInfo {
            address: 0,
            params_count: 0,
            frame_size: 0,
        },
    );
    program.functions.get_mut(&ENTRY_KEY).unwrap().address = 3;
    let ctx = run(program);
    assert_eq!(default_output(&ctx), ["42"]);
}

#[test]
fn runtime_errors_carry_index_opcode_and_source() {
    let mut program = entry_program(0, vec![OpCode::Pop]);
    program.source_map.insert(
        0,
        SourceLoc {
            module: "main".into(),
            line: 3,
        },
    );
    let mut ctx = Context::new(Rc::new(program));
    let err = ctx.run().expect_err("expected stack underflow");
    assert_eq!(err.index, 0);
    assert_eq!(err.opcode, "unload");
    assert!(matches!(err.kind, stela_core::Error::StackUnderflow));
    let source = err.source.clone().expect("source location");
    assert_eq!(source.module.as_ref(), "main");
    assert_eq!(source.line, 3);
    assert!(err.to_string().contains("unload"));
    assert!(err.to_string().contains("main:3"));
}

#[test]
fn format_opcode_is_reserved() {
    let mut ctx = Context::new(Rc::new(entry_program(
        0,
        vec![
            OpCode::PushText("a".into()),
            OpCode::PushText("b".into()),
            OpCode::Format,
        ],
    )));
    let err = ctx.run().expect_err("format is reserved");
    assert!(matches!(
        err.kind,
        stela_core::Error::UnsupportedOpcode(_)
    ));
}

#[test]
fn array_reads_out_of_range_fail() {
    let mut ctx = Context::new(Rc::new(entry_program(
        0,
        vec![
            OpCode::PushNumber(1.0),
            OpCode::MakeArray(1),
            OpCode::GetIndex(Index::Number(4.0)),
        ],
    )));
    let err = ctx.run().expect_err("out of range");
    assert!(matches!(
        err.kind,
        stela_core::Error::IndexOutOfRange { index: 4, length: 1 }
    ));
}

#[test]
fn logic_ops_coerce_operands() {
    let ctx = run(entry_program(
        0,
        vec![
            OpCode::PushNumber(2.0),
            OpCode::PushText("".into()),
            OpCode::Or,
            OpCode::Emit,
            OpCode::PushNumber(2.0),
            OpCode::PushText("".into()),
            OpCode::And,
            OpCode::Emit,
        ],
    ));
    assert_eq!(default_output(&ctx), ["true", "false"]);
}
