// stela-asm - Textual bytecode loader and linker
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Loads the textual assembly form into an executable [`Program`].
//!
//! The input is line-oriented. A line is a directive (`.refs`, `.shared`,
//! `.data`, `.defs`, `.entry`), a comment (`;`), a label (`name:`, or
//! `name.N:` declaring a function with `N` parameters), or an instruction
//! `<op>[ <arg>][ ; #<module>(<line>)]`. Directives select the current
//! section until the next directive. Mnemonics are case-insensitive.
//!
//! Label references (jumps, `call.udf`, `mk_ref.udf`) are recorded as
//! fixups and patched once the whole stream has been read; an unresolved
//! label fails the load. Module selectors (`call.native`, `load.const`)
//! resolve against the registry at load time. On any failure no partial
//! program is returned.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use stela_core::program::{FuncInfo, Program, SourceLoc, ENTRY_KEY};
use stela_core::{Index, MathOp, ModuleRegistry, OpCode, Predicate, StelaVal};

use crate::error::{LoadError, Result};

/// Load a program from its textual form, resolving native selectors against
/// the registry.
pub fn load(source: &str, registry: &ModuleRegistry) -> Result<Program> {
    Loader::new(registry).load(source)
}

/// Placeholder target patched during linking.
const UNRESOLVED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Refs,
    Shared,
    Data,
    Code,
}

struct Fixup {
    index: usize,
    label: String,
    line: usize,
}

struct Loader<'r> {
    registry: &'r ModuleRegistry,
    section: Section,
    /// Function-table key the next `store` is attributed to.
    current_fn: i32,
    program: Program,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    /// Source line of each instruction, for link-time diagnostics.
    lines: Vec<usize>,
}

impl<'r> Loader<'r> {
    fn new(registry: &'r ModuleRegistry) -> Self {
        let mut program = Program::default();
        program.functions.insert(
            ENTRY_KEY,
            FuncInfo {
                address: 0,
                params_count: 0,
                frame_size: 0,
            },
        );
        Loader {
            registry,
            section: Section::Code,
            current_fn: ENTRY_KEY,
            program,
            labels: HashMap::new(),
            fixups: Vec::new(),
            lines: Vec::new(),
        }
    }

    fn load(mut self, source: &str) -> Result<Program> {
        for (n, raw) in source.lines().enumerate() {
            let line_no = n + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if line.starts_with('.') {
                self.directive(line, line_no)?;
                continue;
            }
            match self.section {
                Section::Refs => {}
                Section::Shared => self.shared_line(line),
                Section::Data => self.data_line(line, line_no)?,
                Section::Code => self.code_line(line, line_no)?,
            }
        }
        self.link()?;
        debug!(
            instructions = self.program.instructions.len(),
            functions = self.program.functions.len(),
            shared = self.program.shared_var_names.len(),
            "loaded"
        );
        Ok(self.program)
    }

    fn directive(&mut self, line: &str, line_no: usize) -> Result<()> {
        match line.to_ascii_lowercase().as_str() {
            ".refs" => self.section = Section::Refs,
            ".shared" => self.section = Section::Shared,
            ".data" => self.section = Section::Data,
            ".defs" => self.section = Section::Code,
            ".entry" => {
                self.section = Section::Code;
                self.current_fn = ENTRY_KEY;
                let address = self.program.instructions.len();
                self.entry_mut().address = address;
            }
            other => {
                return Err(LoadError::new(
                    line_no,
                    format!("unknown directive '{}'", other),
                ));
            }
        }
        Ok(())
    }

    fn entry_mut(&mut self) -> &mut FuncInfo {
        // Inserted in new(), never removed.
        self.program
            .functions
            .get_mut(&ENTRY_KEY)
            .expect("entry function present")
    }

    fn shared_line(&mut self, line: &str) {
        if let Some(name) = line.split_whitespace().next() {
            self.program.shared_var_names.push(name.to_string());
            let count = self.program.shared_var_names.len();
            let entry = self.entry_mut();
            entry.frame_size = entry.frame_size.max(count);
        }
    }

    fn data_line(&mut self, line: &str, line_no: usize) -> Result<()> {
        let mut items = Vec::new();
        let mut rest = line.trim_start();
        while !rest.is_empty() {
            if rest.starts_with('"') {
                let (text, remainder) = take_quoted(rest, line_no)?;
                items.push(StelaVal::text(text));
                rest = remainder.trim_start();
            } else {
                let token = rest
                    .split_whitespace()
                    .next()
                    .expect("non-empty remainder");
                let number = token.parse::<f64>().map_err(|_| {
                    LoadError::new(line_no, format!("invalid data token '{}'", token))
                })?;
                items.push(StelaVal::Number(number));
                rest = rest[token.len()..].trim_start();
            }
        }
        self.program.data.push(StelaVal::array(items));
        Ok(())
    }

    fn code_line(&mut self, line: &str, line_no: usize) -> Result<()> {
        if let Some(name) = label_of(line) {
            return self.label(name, line_no);
        }
        self.instruction(line, line_no)
    }

    fn label(&mut self, name: &str, line_no: usize) -> Result<()> {
        let address = self.program.instructions.len();
        // `name.N` declares a function with N parameters, registered under
        // the bare name.
        if let Some((base, suffix)) = name.rsplit_once('.') {
            if let (false, Ok(params)) = (base.is_empty(), suffix.parse::<usize>()) {
                self.define_label(base, address, line_no)?;
                self.program.functions.insert(
                    address as i32,
                    FuncInfo {
                        address,
                        params_count: params,
                        frame_size: params,
                    },
                );
                self.current_fn = address as i32;
                return Ok(());
            }
        }
        self.define_label(name, address, line_no)
    }

    fn define_label(&mut self, name: &str, address: usize, line_no: usize) -> Result<()> {
        if self.labels.insert(name.to_string(), address).is_some() {
            return Err(LoadError::new(
                line_no,
                format!("duplicate label '{}'", name),
            ));
        }
        Ok(())
    }

    fn instruction(&mut self, line: &str, line_no: usize) -> Result<()> {
        let (code, comment) = split_comment(line);
        let index = self.program.instructions.len();
        if let Some(loc) = comment.and_then(parse_source_comment) {
            self.program.source_map.insert(index, loc);
        }
        let code = code.trim();
        let (mnemonic, arg) = match code.split_once(char::is_whitespace) {
            Some((m, a)) => (m.to_ascii_lowercase(), a.trim()),
            None => (code.to_ascii_lowercase(), ""),
        };
        let op = self.build_op(&mnemonic, arg, index, line_no)?;
        if let OpCode::Store(register) = &op {
            self.grow_frame(*register);
        }
        self.program.instructions.push(op);
        self.lines.push(line_no);
        Ok(())
    }

    /// A `store` inside a function (the entry included) may enlarge its
    /// frame.
    fn grow_frame(&mut self, register: usize) {
        if let Some(info) = self.program.functions.get_mut(&self.current_fn) {
            info.frame_size = info.frame_size.max(register + 1);
        }
    }

    fn build_op(
        &mut self,
        mnemonic: &str,
        arg: &str,
        index: usize,
        line_no: usize,
    ) -> Result<OpCode> {
        let op = match mnemonic {
            "load" => {
                if let Some(register) = arg.strip_prefix('#') {
                    OpCode::PushRegister(parse_usize(register, line_no)?)
                } else if arg.starts_with('"') {
                    OpCode::PushText(Rc::from(parse_quoted(arg, line_no)?))
                } else {
                    let number = arg.parse::<f64>().map_err(|_| {
                        LoadError::new(line_no, format!("invalid literal '{}'", arg))
                    })?;
                    OpCode::PushNumber(number)
                }
            }
            "load.global" => OpCode::PushGlobal(parse_usize(arg, line_no)?),
            "load.outer" => {
                let (level, register) = parse_level_register(arg, line_no)?;
                OpCode::PushOuter { level, register }
            }
            "load.const" => {
                if let Ok(n) = arg.parse::<usize>() {
                    OpCode::PushData(n)
                } else {
                    let (module, name) = parse_selector(arg);
                    let value = self
                        .registry
                        .resolve_constant(module, name)
                        .cloned()
                        .ok_or_else(|| {
                            LoadError::new(line_no, format!("unknown constant '{}'", arg))
                        })?;
                    OpCode::PushConst {
                        selector: Rc::from(arg),
                        value,
                    }
                }
            }
            "load.data" => OpCode::PushData(parse_usize(arg, line_no)?),
            "dup" => OpCode::Dup,
            "unload" => OpCode::Pop,
            "store" => OpCode::Store(parse_usize(arg, line_no)?),
            "store.global" => OpCode::StoreGlobal(parse_usize(arg, line_no)?),
            "store.outer" => {
                let (level, register) = parse_level_register(arg, line_no)?;
                OpCode::StoreOuter { level, register }
            }
            "reset" => OpCode::Reset(parse_usize(arg, line_no)?),
            "mk_array" => OpCode::MakeArray(parse_usize(arg, line_no)?),
            "mk_hash" => OpCode::MakeHash(parse_usize(arg, line_no)?),
            "mk_ref.udf" => {
                self.fix_later(index, arg, line_no);
                OpCode::MakeRef(UNRESOLVED)
            }
            "bind_refs" => OpCode::BindRefs,
            "get" => OpCode::Get,
            "set" => OpCode::Set,
            "get.index" => OpCode::GetIndex(parse_index(arg, line_no)?),
            "set.index" => OpCode::SetIndex(parse_index(arg, line_no)?),
            "set.op" => OpCode::SetOp(MathOp::parse(arg).ok_or_else(|| {
                LoadError::new(line_no, format!("unknown math operation '{}'", arg))
            })?),
            "add" => OpCode::Add,
            "sub" => OpCode::Sub,
            "mul" => OpCode::Mul,
            "div" => OpCode::Div,
            "mod" => OpCode::Mod,
            "concat" => OpCode::Concat,
            "format" => OpCode::Format,
            "eq" | "ne" | "lt" | "gt" | "le" | "ge" => {
                OpCode::Cmp(Predicate::parse(mnemonic).expect("checked mnemonic"))
            }
            "and" => OpCode::And,
            "or" => OpCode::Or,
            "xor" => OpCode::Xor,
            "not" => OpCode::Not,
            "jmp" => {
                self.fix_later(index, arg, line_no);
                OpCode::Jump(UNRESOLVED)
            }
            "jmpeq" | "jmpne" | "jmplt" | "jmpgt" | "jmple" | "jmpge" => {
                let predicate =
                    Predicate::parse(&mnemonic["jmp".len()..]).expect("checked mnemonic");
                self.fix_later(index, arg, line_no);
                OpCode::JumpIf(predicate, UNRESOLVED)
            }
            "emit" => OpCode::Emit,
            "emit.named" => OpCode::EmitNamed(Rc::from(parse_quoted(arg, line_no)?)),
            "call.native" => {
                let (module, name) = parse_selector(arg);
                let func = self
                    .registry
                    .resolve_function(module, name)
                    .map(|f| f.func)
                    .ok_or_else(|| {
                        LoadError::new(line_no, format!("unknown native function '{}'", arg))
                    })?;
                OpCode::CallNative {
                    selector: Rc::from(arg),
                    func,
                }
            }
            "call.udf" => {
                self.fix_later(index, arg, line_no);
                OpCode::Call(UNRESOLVED)
            }
            "invoke" => OpCode::Invoke,
            "ret" => OpCode::Ret,
            other => {
                return Err(LoadError::new(
                    line_no,
                    format!("unknown opcode '{}'", other),
                ));
            }
        };
        Ok(op)
    }

    fn fix_later(&mut self, index: usize, label: &str, line: usize) {
        self.fixups.push(Fixup {
            index,
            label: label.to_string(),
            line,
        });
    }

    /// Patch label references and validate cross-references.
    fn link(&mut self) -> Result<()> {
        for fixup in &self.fixups {
            let address = *self.labels.get(&fixup.label).ok_or_else(|| {
                LoadError::new(fixup.line, format!("unresolved label '{}'", fixup.label))
            })?;
            match &mut self.program.instructions[fixup.index] {
                OpCode::Jump(target)
                | OpCode::JumpIf(_, target)
                | OpCode::Call(target)
                | OpCode::MakeRef(target) => *target = address,
                other => {
                    return Err(LoadError::new(
                        fixup.line,
                        format!("internal: fixup on non-target opcode {}", other),
                    ));
                }
            }
        }
        let shared = self.program.shared_var_names.len();
        let data = self.program.data.len();
        for (index, op) in self.program.instructions.iter().enumerate() {
            let line = self.lines.get(index).copied().unwrap_or(0);
            match op {
                OpCode::PushGlobal(r) | OpCode::StoreGlobal(r) if *r >= shared => {
                    return Err(LoadError::new(
                        line,
                        format!("global register {} outside the {} shared variables", r, shared),
                    ));
                }
                OpCode::PushData(n) if *n >= data => {
                    return Err(LoadError::new(
                        line,
                        format!("data array #{} does not exist ({} defined)", n, data),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Line-level parsing helpers
// ============================================================================

/// A label line is a single `name:` token, more than just the colon.
fn label_of(line: &str) -> Option<&str> {
    let name = line.strip_suffix(':')?;
    if name.is_empty() || name.contains(char::is_whitespace) || name.contains('"') {
        return None;
    }
    Some(name)
}

/// Split an instruction line at the comment `;`, honoring string literals.
fn split_comment(line: &str) -> (&str, Option<&str>) {
    let mut in_string = false;
    for (at, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => {
                return (&line[..at], Some(line[at + 1..].trim()));
            }
            _ => {}
        }
    }
    (line, None)
}

/// Parse a `#module(line)` source-mapping comment. Anything else is an
/// ordinary comment and ignored.
fn parse_source_comment(comment: &str) -> Option<SourceLoc> {
    let rest = comment.strip_prefix('#')?;
    let (module, rest) = rest.split_once('(')?;
    let line = rest.strip_suffix(')')?.trim().parse::<u32>().ok()?;
    let module = module.trim();
    if module.is_empty() {
        return None;
    }
    Some(SourceLoc {
        module: Rc::from(module),
        line,
    })
}

fn parse_usize(arg: &str, line_no: usize) -> Result<usize> {
    arg.parse::<usize>()
        .map_err(|_| LoadError::new(line_no, format!("invalid integer '{}'", arg)))
}

/// Parse a `"…"` literal; quotes must balance on the same token and the
/// text cannot contain further quotes.
fn parse_quoted(arg: &str, line_no: usize) -> Result<String> {
    let inner = arg
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|s| !s.contains('"'))
        .ok_or_else(|| {
            LoadError::new(line_no, format!("malformed string literal {}", arg))
        })?;
    Ok(inner.to_string())
}

/// Take a leading `"…"` token off a `.data` line, returning the remainder.
fn take_quoted(rest: &str, line_no: usize) -> Result<(String, &str)> {
    let inner = &rest[1..];
    let end = inner
        .find('"')
        .ok_or_else(|| LoadError::new(line_no, "unterminated string literal".to_string()))?;
    Ok((inner[..end].to_string(), &inner[end + 1..]))
}

/// Parse the `L:N` operand of `load.outer`/`store.outer`.
fn parse_level_register(arg: &str, line_no: usize) -> Result<(usize, usize)> {
    let (level, register) = arg
        .split_once(':')
        .ok_or_else(|| LoadError::new(line_no, format!("expected L:N, got '{}'", arg)))?;
    Ok((parse_usize(level, line_no)?, parse_usize(register, line_no)?))
}

/// Parse an immediate index operand: a quoted key or a number.
fn parse_index(arg: &str, line_no: usize) -> Result<Index> {
    if arg.starts_with('"') {
        Ok(Index::Key(Rc::from(parse_quoted(arg, line_no)?)))
    } else {
        let number = arg
            .parse::<f64>()
            .map_err(|_| LoadError::new(line_no, format!("invalid index '{}'", arg)))?;
        Ok(Index::Number(number))
    }
}

/// Split a `[module:]name` selector; an empty module selects the default
/// built-in module. A doubled colon (`mod::name`) is tolerated.
fn parse_selector(arg: &str) -> (&str, &str) {
    match arg.split_once(':') {
        Some((module, name)) => (module, name.trim_start_matches(':')),
        None => ("", arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_single_tokens() {
        assert_eq!(label_of("then:"), Some("then"));
        assert_eq!(label_of("sum.2:"), Some("sum.2"));
        assert_eq!(label_of(":"), None);
        assert_eq!(label_of("load #0"), None);
    }

    #[test]
    fn comment_split_honors_strings() {
        let (code, comment) = split_comment("load \"a;b\" ; #mod(3)");
        assert_eq!(code.trim(), "load \"a;b\"");
        assert_eq!(comment, Some("#mod(3)"));
    }

    #[test]
    fn source_comments_parse() {
        let loc = parse_source_comment("#main(12)").unwrap();
        assert_eq!(loc.module.as_ref(), "main");
        assert_eq!(loc.line, 12);
        assert!(parse_source_comment("just a note").is_none());
    }

    #[test]
    fn selectors_split_on_first_colon() {
        assert_eq!(parse_selector("math:Abs"), ("math", "Abs"));
        assert_eq!(parse_selector(":Length"), ("", "Length"));
        assert_eq!(parse_selector("math::PI"), ("math", "PI"));
    }
}
