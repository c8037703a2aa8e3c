// stela-asm - Disassembler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Serialize a linked [`Program`] back into loadable assembly text.
//!
//! Synthetic labels are generated for jump and call targets (`f<addr>` for
//! functions, `L<addr>` for plain targets), so reloading the output yields a
//! structurally equivalent program. Source-map comments are not
//! reconstructed.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use stela_core::program::ENTRY_KEY;
use stela_core::value::fmt_number;
use stela_core::{OpCode, Program, StelaVal};

/// Render a program as assembly text that [`crate::load`] accepts.
#[must_use]
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();

    if !program.shared_var_names.is_empty() {
        out.push_str(".shared\n");
        for name in &program.shared_var_names {
            let _ = writeln!(out, "{}", name);
        }
    }

    if !program.data.is_empty() {
        out.push_str(".data\n");
        for array in &program.data {
            let _ = writeln!(out, "{}", data_line(array));
        }
    }

    // Function starts get `f<addr>.<params>:` labels, remaining referenced
    // targets plain `L<addr>:` labels.
    let mut functions: HashMap<usize, usize> = HashMap::new();
    for (&key, info) in &program.functions {
        if key != ENTRY_KEY {
            functions.insert(info.address, info.params_count);
        }
    }
    let mut plain: BTreeSet<usize> = BTreeSet::new();
    for op in &program.instructions {
        if let Some(target) = op.target() {
            if !functions.contains_key(&target) {
                plain.insert(target);
            }
        }
    }

    let entry = program.entry();
    if !functions.is_empty() {
        out.push_str(".defs\n");
    }
    for (index, op) in program.instructions.iter().enumerate() {
        if let Some(params) = functions.get(&index) {
            let _ = writeln!(out, "f{}.{}:", index, params);
        }
        if plain.contains(&index) {
            let _ = writeln!(out, "L{}:", index);
        }
        if index == entry.address {
            out.push_str(".entry\n");
        }
        let _ = writeln!(out, "  {}", render_op(op, &functions));
    }
    // Trailing labels and an entry at the very end still need emitting.
    let end = program.instructions.len();
    if plain.contains(&end) {
        let _ = writeln!(out, "L{}:", end);
    }
    if entry.address >= end {
        out.push_str(".entry\n");
    }

    out
}

fn target_name(target: usize, functions: &HashMap<usize, usize>) -> String {
    if functions.contains_key(&target) {
        format!("f{}", target)
    } else {
        format!("L{}", target)
    }
}

fn render_op(op: &OpCode, functions: &HashMap<usize, usize>) -> String {
    match op {
        OpCode::Jump(t) => format!("jmp {}", target_name(*t, functions)),
        OpCode::JumpIf(p, t) => format!("jmp{} {}", p, target_name(*t, functions)),
        OpCode::Call(t) => format!("call.udf {}", target_name(*t, functions)),
        OpCode::MakeRef(t) => format!("mk_ref.udf {}", target_name(*t, functions)),
        other => other.to_string(),
    }
}

fn data_line(array: &StelaVal) -> String {
    let StelaVal::Array(items) = array else {
        return array.to_string();
    };
    let tokens: Vec<String> = items
        .borrow()
        .iter()
        .map(|item| match item {
            StelaVal::Text(s) => format!("\"{}\"", s),
            StelaVal::Number(n) => fmt_number(*n),
            other => other.to_string(),
        })
        .collect();
    tokens.join(" ")
}
