// stela-asm - Loader tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Directive handling, label resolution, frame metadata, and load failures.

use stela_core::program::{FuncInfo, Program, ENTRY_KEY};
use stela_core::{Index, ModuleRegistry, OpCode, Predicate};

fn load(source: &str) -> Program {
    stela_asm::load(source, &ModuleRegistry::standard()).expect("load failed")
}

fn load_err(source: &str) -> stela_asm::LoadError {
    stela_asm::load(source, &ModuleRegistry::standard()).expect_err("expected load failure")
}

#[test]
fn full_program_with_all_sections() {
    let program = load(
        "; assembled by hand\n\
         .refs\n\
         somelib\n\
         .shared\n\
         width\n\
         height\n\
         .data\n\
         \"a\" \"b\" 3\n\
         1 2\n\
         .defs\n\
         sum.2:\n\
         load #0\n\
         load #1\n\
         add\n\
         ret\n\
         .entry\n\
         load 10\n\
         load 32\n\
         call.udf sum\n\
         emit ; #main(7)\n",
    );

    assert_eq!(program.shared_var_names, ["width", "height"]);
    assert_eq!(program.data.len(), 2);
    assert_eq!(program.data[0].render(), "[\"a\", \"b\", 3]");
    assert_eq!(program.data[1].render(), "[1, 2]");

    assert_eq!(
        program.functions[&0],
        FuncInfo {
            address: 0,
            params_count: 2,
            frame_size: 2,
        }
    );
    let entry = program.functions[&ENTRY_KEY];
    assert_eq!(entry.address, 4);
    assert_eq!(entry.frame_size, 2);

    assert_eq!(program.instructions[6], OpCode::Call(0));
    let loc = program.source_map.get(&7).expect("source map entry");
    assert_eq!(loc.module.as_ref(), "main");
    assert_eq!(loc.line, 7);
}

#[test]
fn store_grows_the_function_frame() {
    let program = load(
        ".defs\n\
         f.1:\n\
         load #0\n\
         store 5\n\
         ret\n\
         .entry\n",
    );
    assert_eq!(program.functions[&0].frame_size, 6);
    assert_eq!(program.functions[&0].params_count, 1);
}

#[test]
fn store_in_entry_grows_the_entry_frame() {
    let program = load(".entry\nload 1\nstore 0\n");
    assert_eq!(program.functions[&ENTRY_KEY].frame_size, 1);
}

#[test]
fn entry_defaults_to_address_zero() {
    let program = load("load 1\nemit\n");
    assert_eq!(program.functions[&ENTRY_KEY].address, 0);
}

#[test]
fn shared_variables_size_the_entry_frame() {
    let program = load(".shared\nx\ny\nz\n.entry\n");
    assert_eq!(program.shared_var_names.len(), 3);
    assert_eq!(program.functions[&ENTRY_KEY].frame_size, 3);
}

#[test]
fn label_targets_stay_within_bounds() {
    let program = load(
        ".entry\n\
         load 1\n\
         load 2\n\
         jmplt then\n\
         load \"no\"\n\
         emit\n\
         jmp end\n\
         then:\n\
         load \"yes\"\n\
         emit\n\
         end:\n",
    );
    let len = program.instructions.len();
    for op in &program.instructions {
        if let Some(target) = op.target() {
            assert!(target <= len, "target {} beyond {}", target, len);
        }
    }
    assert_eq!(program.instructions[2], OpCode::JumpIf(Predicate::Lt, 6));
    assert_eq!(program.instructions[5], OpCode::Jump(8));
}

#[test]
fn mnemonics_are_case_insensitive() {
    let program = load(".entry\nLOAD 1\nEMIT\n");
    assert_eq!(program.instructions[0], OpCode::PushNumber(1.0));
    assert_eq!(program.instructions[1], OpCode::Emit);
}

#[test]
fn immediate_indexes_parse_both_forms() {
    let program = load(".entry\nget.index \"name\"\nget.index 3\n");
    assert_eq!(
        program.instructions[0],
        OpCode::GetIndex(Index::Key("name".into()))
    );
    assert_eq!(program.instructions[1], OpCode::GetIndex(Index::Number(3.0)));
}

#[test]
fn outer_operands_parse() {
    let program = load(".entry\nload.outer 1:2\nstore.outer 2:0\n");
    assert_eq!(
        program.instructions[0],
        OpCode::PushOuter {
            level: 1,
            register: 2
        }
    );
    assert_eq!(
        program.instructions[1],
        OpCode::StoreOuter {
            level: 2,
            register: 0
        }
    );
}

#[test]
fn load_const_integer_is_a_data_reference() {
    let program = load(".data\n1 2\n.entry\nload.const 0\nload.data 0\n");
    assert_eq!(program.instructions[0], OpCode::PushData(0));
    assert_eq!(program.instructions[1], OpCode::PushData(0));
}

#[test]
fn load_const_resolves_module_constants() {
    let program = load(".entry\nload.const :true\nload.const math:PI\n");
    match &program.instructions[0] {
        OpCode::PushConst { value, .. } => {
            assert_eq!(value, &stela_core::StelaVal::Boolean(true));
        }
        other => panic!("unexpected {:?}", other),
    }
    match &program.instructions[1] {
        OpCode::PushConst { value, .. } => {
            assert_eq!(value, &stela_core::StelaVal::Number(std::f64::consts::PI));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn refs_section_is_skipped() {
    let program = load(".refs\nmathlib\nmorelib\n.entry\nload 1\n");
    assert_eq!(program.instructions.len(), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn unknown_directive_fails() {
    let err = load_err(".bogus\n");
    assert_eq!(err.line, 1);
    assert!(err.message.contains("unknown directive"));
}

#[test]
fn unknown_opcode_fails() {
    let err = load_err(".entry\nfrobnicate 1\n");
    assert_eq!(err.line, 2);
    assert!(err.message.contains("unknown opcode"));
}

#[test]
fn invalid_literal_fails() {
    let err = load_err(".entry\nload 12abc\n");
    assert!(err.message.contains("invalid literal"));
}

#[test]
fn unresolved_label_fails() {
    let err = load_err(".entry\njmp nowhere\n");
    assert_eq!(err.line, 2);
    assert!(err.message.contains("unresolved label 'nowhere'"));
}

#[test]
fn duplicate_label_fails() {
    let err = load_err(".entry\nhere:\nhere:\n");
    assert_eq!(err.line, 3);
    assert!(err.message.contains("duplicate label"));
}

#[test]
fn unknown_native_function_fails() {
    let err = load_err(".entry\ncall.native :NoSuchFunction\n");
    assert!(err.message.contains("unknown native function"));
}

#[test]
fn unknown_constant_fails() {
    let err = load_err(".entry\nload.const math:TAU\n");
    assert!(err.message.contains("unknown constant"));
}

#[test]
fn global_register_outside_shared_fails() {
    let err = load_err(".shared\nonly\n.entry\nload.global 1\n");
    assert!(err.message.contains("global register"));
}

#[test]
fn data_reference_outside_data_fails() {
    let err = load_err(".entry\nload.data 0\n");
    assert!(err.message.contains("data array"));
}

#[test]
fn malformed_string_literal_fails() {
    let err = load_err(".entry\nload \"unterminated\n");
    assert!(err.message.contains("malformed string"));
}

#[test]
fn invalid_data_token_fails() {
    let err = load_err(".data\nxyz\n");
    assert_eq!(err.line, 2);
    assert!(err.message.contains("invalid data token"));
}

#[test]
fn no_partial_program_on_failure() {
    assert!(stela_asm::load(
        ".entry\nload 1\nemit\njmp nowhere\n",
        &ModuleRegistry::standard()
    )
    .is_err());
}
