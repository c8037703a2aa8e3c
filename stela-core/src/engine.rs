// stela-core - Execution engine for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The opcode dispatch loop.
//!
//! The engine is a resumable state machine on [`Context`]: `step` processes
//! one opcode, `run` loops until the program ends, a native suspends, or an
//! error escapes. Jump handlers set the `jumped` sentinel to suppress the
//! implicit instruction-pointer advance.
//!
//! Re-entrant execution (a native running a script callback) enters a nested
//! dispatch loop; the callback frame's `is_referenced` flag makes its `ret`
//! terminate only that nested loop.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::context::{Context, Outcome, StateEvent};
use crate::error::{Error, Result, RuntimeError};
use crate::frame::DataFrame;
use crate::modules::events::END_EVENT;
use crate::opcode::{Index, MathOp, OpCode};
use crate::value::{FuncRef, StelaVal};

impl Context {
    /// Execute until the program ends, a native suspends, or an error
    /// escapes. After a runtime error the context is invalid.
    pub fn run(&mut self) -> std::result::Result<Outcome, RuntimeError> {
        debug!(start = self.i, "run");
        self.running = true;
        self.run_loop().map_err(|kind| self.fault(kind))?;
        Ok(self.finish())
    }

    /// Execute a single opcode and advance the instruction pointer.
    pub fn step(&mut self) -> Result<()> {
        let program = Rc::clone(&self.program);
        let op = program
            .instructions
            .get(self.i)
            .ok_or_else(|| Error::internal("instruction pointer out of bounds"))?;
        self.exec(op)?;
        if self.jumped {
            self.jumped = false;
        } else {
            self.i += 1;
        }
        Ok(())
    }

    fn run_loop(&mut self) -> Result<()> {
        let program = Rc::clone(&self.program);
        while self.running && self.i < program.instructions.len() {
            let op = &program.instructions[self.i];
            self.exec(op)?;
            if self.jumped {
                self.jumped = false;
            } else {
                self.i += 1;
            }
        }
        Ok(())
    }

    /// Classify a loop exit and publish the matching state event.
    fn finish(&mut self) -> Outcome {
        if self.running && self.i >= self.program.instructions.len() {
            self.running = false;
            self.push_event(StateEvent::Ended);
            debug!("ended");
            Outcome::Ended
        } else {
            self.push_event(StateEvent::Suspended);
            debug!(at = self.i, "suspended");
            Outcome::Suspended
        }
    }

    fn fault(&mut self, kind: Error) -> RuntimeError {
        self.running = false;
        let opcode = self
            .program
            .instructions
            .get(self.i)
            .map(|op| op.to_string())
            .unwrap_or_else(|| "<end>".to_string());
        RuntimeError {
            index: self.i,
            opcode,
            kind,
            frame_dump: self.frame.borrow().dump(),
            source: self.program.source_map.get(&self.i).cloned(),
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Deliver an external event to the registered script handler.
    ///
    /// The handler is called like a regular function with the payload as its
    /// argument and the return address pinned to the suspension point. On
    /// the handler's return the VM suspends again, except for the terminal
    /// `"exit"` event, which resumes execution at the suspension point.
    /// Returns the handler's result, if it produced one. Without a
    /// registered handler the VM is untouched and `None` is returned.
    pub fn raise_event(
        &mut self,
        name: &str,
        payload: StelaVal,
    ) -> std::result::Result<Option<StelaVal>, RuntimeError> {
        let Some(handler) = self.event_handler(name) else {
            return Ok(None);
        };
        trace!(event = name, "raise_event");
        self.push_event(StateEvent::Resumed);
        let base = self.frame.borrow().stack_len();
        self.push(payload);
        self.enter_function(
            handler.addr,
            handler.receiver.resolve(),
            handler.closure.clone(),
            self.i,
        )
        .map_err(|kind| self.fault(kind))?;
        self.jumped = false;
        if name != END_EVENT {
            self.handler_frame = Some(self.current_frame());
        }
        self.running = true;
        self.run_loop().map_err(|kind| self.fault(kind))?;
        self.finish();
        let result = if self.frame.borrow().stack_len() > base {
            self.frame.borrow_mut().pop_opt()
        } else {
            None
        };
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Re-entrant execution
    // ------------------------------------------------------------------

    /// Run a script callback from inside a native function.
    ///
    /// Enters a nested dispatch loop that terminates when the callback's
    /// frame returns, then restores the outer loop's state so it re-advances
    /// past the native-call instruction. Returns the callback's result, or
    /// `Empty` if it produced none.
    pub fn call_function_ref(&mut self, fref: &FuncRef, args: &[StelaVal]) -> Result<StelaVal> {
        self.push_event(StateEvent::NestedExec { addr: fref.addr });
        let return_to = self.i;
        let base = self.frame.borrow().stack_len();
        for arg in args {
            self.push(arg.clone());
        }
        self.enter_function(
            fref.addr,
            fref.receiver.resolve(),
            fref.closure.clone(),
            return_to,
        )?;
        self.frame.borrow_mut().is_referenced = true;
        self.jumped = false;
        let outer_running = self.running;
        self.running = true;
        self.run_loop()?;
        self.running = outer_running;
        let result = if self.frame.borrow().stack_len() > base {
            self.frame.borrow_mut().pop_opt().unwrap_or(StelaVal::Empty)
        } else {
            StelaVal::Empty
        };
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Calls and returns
    // ------------------------------------------------------------------

    /// Call setup shared by `call.udf`, `invoke`, event delivery, and
    /// re-entrant execution.
    ///
    /// A bound receiver is inserted beneath the already-pushed arguments so
    /// it is popped last and lands in register 0. Arguments are popped into
    /// registers `params_count-1 … 0`.
    fn enter_function(
        &mut self,
        addr: usize,
        receiver: Option<StelaVal>,
        closure: Option<crate::frame::FrameRef>,
        return_to: usize,
    ) -> Result<()> {
        let info = self
            .program
            .function_at(addr)
            .ok_or(Error::UnknownFunction { address: addr })?;
        if let Some(receiver) = receiver {
            let window = info.params_count.saturating_sub(1);
            self.frame.borrow_mut().push_beneath(window, receiver)?;
        }
        let mut child = DataFrame::with_links(info.frame_size, Some(self.current_frame()), closure);
        {
            let mut caller = self.frame.borrow_mut();
            for register in (0..info.params_count).rev() {
                child.set_register(register, caller.pop()?)?;
            }
        }
        self.return_addresses.push(return_to);
        self.frame = child.into_ref();
        self.i = info.address;
        self.jumped = true;
        Ok(())
    }

    /// Return from the current frame, forwarding at most one result value.
    fn do_return(&mut self) -> Result<()> {
        let returning = self.current_frame();
        let caller = returning
            .borrow()
            .caller
            .clone()
            .ok_or(Error::ReturnWithoutCaller)?;
        if let Some(result) = returning.borrow_mut().pop_opt() {
            caller.borrow_mut().push(result);
        }
        if returning.borrow().is_referenced {
            returning.borrow_mut().is_referenced = false;
            self.running = false;
        }
        if let Some(handler) = &self.handler_frame {
            if Rc::ptr_eq(handler, &returning) {
                self.handler_frame = None;
                self.running = false;
            }
        }
        let return_to = self
            .return_addresses
            .pop()
            .ok_or(Error::ReturnWithoutCaller)?;
        self.frame = caller;
        self.i = return_to;
        self.jumped = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Opcode dispatch
    // ------------------------------------------------------------------

    fn exec(&mut self, op: &OpCode) -> Result<()> {
        match op {
            OpCode::PushNumber(n) => self.push(StelaVal::Number(*n)),
            OpCode::PushText(s) => self.push(StelaVal::Text(Rc::clone(s))),
            OpCode::PushRegister(r) => {
                let value = self.frame.borrow().register(*r)?;
                self.push(value);
            }
            OpCode::PushGlobal(r) => {
                let value = DataFrame::global(&self.frame).borrow().register(*r)?;
                self.push(value);
            }
            OpCode::PushOuter { level, register } => {
                let outer = self.outer_frame(*level)?;
                let value = outer.borrow().register(*register)?;
                self.push(value);
            }
            OpCode::PushData(n) => {
                let value = self
                    .program
                    .data
                    .get(*n)
                    .cloned()
                    .ok_or_else(|| Error::internal(format!("no data array #{}", n)))?;
                self.push(value);
            }
            OpCode::PushConst { value, .. } => self.push(value.clone()),
            OpCode::Dup => {
                let top = self.peek()?;
                self.push(top);
            }
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Store(r) => {
                let value = self.pop()?;
                self.frame.borrow_mut().set_register(*r, value)?;
            }
            OpCode::StoreGlobal(r) => {
                let value = self.pop()?;
                DataFrame::global(&self.frame)
                    .borrow_mut()
                    .set_register(*r, value)?;
            }
            OpCode::StoreOuter { level, register } => {
                let value = self.pop()?;
                let outer = self.outer_frame(*level)?;
                outer.borrow_mut().set_register(*register, value)?;
            }
            OpCode::Reset(r) => {
                self.frame.borrow_mut().set_register(*r, StelaVal::Empty)?;
            }

            OpCode::MakeArray(n) => {
                let mut items = Vec::with_capacity(*n);
                for _ in 0..*n {
                    items.push(self.pop()?);
                }
                items.reverse();
                self.push(StelaVal::array(items));
            }
            OpCode::MakeHash(n) => {
                let mut flat = Vec::with_capacity(n * 2);
                for _ in 0..n * 2 {
                    flat.push(self.pop()?);
                }
                flat.reverse();
                let mut entries = indexmap::IndexMap::with_capacity(*n);
                let mut pairs = flat.into_iter();
                while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                    match key {
                        StelaVal::Text(k) => {
                            entries.insert(k.to_string(), value);
                        }
                        other => {
                            return Err(Error::type_error_in(
                                "mk_hash key",
                                "text",
                                other.type_name(),
                            ));
                        }
                    }
                }
                self.push(StelaVal::Hash(Rc::new(std::cell::RefCell::new(entries))));
            }
            OpCode::MakeRef(target) => self.push(StelaVal::func_ref(*target)),
            OpCode::BindRefs => {
                let top = self.peek()?;
                let StelaVal::Hash(hash) = top else {
                    return Err(Error::type_error_in("bind_refs", "hash", top.type_name()));
                };
                let mut body = hash.borrow_mut();
                for value in body.values_mut() {
                    if let StelaVal::FuncRef(r) = value {
                        *value = StelaVal::FuncRef(Rc::new(FuncRef::bound(r.addr, &hash)));
                    }
                }
            }

            OpCode::Get => {
                let index = index_of_value(self.pop()?)?;
                let container = self.pop()?;
                let value = container_get(&container, &index)?;
                self.push(value);
            }
            OpCode::Set => {
                let index = index_of_value(self.pop()?)?;
                let container = self.pop()?;
                let value = self.pop()?;
                container_set(&container, &index, value)?;
            }
            OpCode::GetIndex(index) => {
                let container = self.pop()?;
                let value = container_get(&container, index)?;
                self.push(value);
            }
            OpCode::SetIndex(index) => {
                let container = self.pop()?;
                let value = self.pop()?;
                container_set(&container, index, value)?;
            }
            OpCode::SetOp(op) => {
                let index = index_of_value(self.pop()?)?;
                let container = self.pop()?;
                let value = self.pop()?;
                let StelaVal::Number(value) = value else {
                    return Err(Error::type_error_in("set.op", "number", value.type_name()));
                };
                let element = container_get(&container, &index)?;
                let StelaVal::Number(element) = element else {
                    return Err(Error::type_error_in(
                        "set.op",
                        "number",
                        element.type_name(),
                    ));
                };
                container_set(&container, &index, StelaVal::Number(op.apply(element, value)))?;
            }

            OpCode::Add => self.binary_math(MathOp::Add)?,
            OpCode::Sub => self.binary_math(MathOp::Sub)?,
            OpCode::Mul => self.binary_math(MathOp::Mul)?,
            OpCode::Div => self.binary_math(MathOp::Div)?,
            OpCode::Mod => self.binary_math(MathOp::Mod)?,
            OpCode::Concat => {
                let second = self.pop()?;
                let first = self.pop()?;
                let mut text = first.render();
                text.push_str(&second.render());
                self.push(StelaVal::text(text));
            }
            OpCode::Format => {
                return Err(Error::UnsupportedOpcode("format".to_string()));
            }

            OpCode::Cmp(predicate) => {
                let result = self.compare_operands()?;
                self.push(StelaVal::Boolean(predicate.matches(result)));
            }
            OpCode::And => {
                let b = self.pop_truthy()?;
                let a = self.pop_truthy()?;
                self.push(StelaVal::Boolean(a && b));
            }
            OpCode::Or => {
                let b = self.pop_truthy()?;
                let a = self.pop_truthy()?;
                self.push(StelaVal::Boolean(a || b));
            }
            OpCode::Xor => {
                let b = self.pop_truthy()?;
                let a = self.pop_truthy()?;
                self.push(StelaVal::Boolean(a ^ b));
            }
            OpCode::Not => {
                let value = self.pop_truthy()?;
                self.push(StelaVal::Boolean(!value));
            }

            OpCode::Jump(target) => {
                self.i = *target;
                self.jumped = true;
            }
            OpCode::JumpIf(predicate, target) => {
                let result = self.compare_operands()?;
                if predicate.matches(result) {
                    self.i = *target;
                    self.jumped = true;
                }
            }
            OpCode::Call(target) => {
                self.enter_function(*target, None, None, self.i + 1)?;
            }
            OpCode::CallNative { func, .. } => {
                func(self)?;
            }
            OpCode::Invoke => {
                let fref = self.pop_func_ref()?;
                self.enter_function(
                    fref.addr,
                    fref.receiver.resolve(),
                    fref.closure.clone(),
                    self.i + 1,
                )?;
            }
            OpCode::Ret => self.do_return()?,

            OpCode::Emit => {
                let value = self.pop()?;
                self.emit_text(value.render());
            }
            OpCode::EmitNamed(key) => {
                let value = self.pop()?;
                self.insert_named_result(key, value);
            }
        }
        Ok(())
    }

    fn binary_math(&mut self, op: MathOp) -> Result<()> {
        let b = self.pop_number()?;
        let a = self.pop_number()?;
        self.push(StelaVal::Number(op.apply(a, b)));
        Ok(())
    }

    /// Pop (op2, op1), compare op1 against op2, and record the result.
    fn compare_operands(&mut self) -> Result<crate::value::CmpResult> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.cmp = a.compare(&b);
        Ok(self.cmp)
    }

    /// Walk `level` steps outward, following the closure link when present
    /// and the caller link otherwise.
    fn outer_frame(&self, level: usize) -> Result<crate::frame::FrameRef> {
        let mut frame = self.current_frame();
        for _ in 0..level {
            let next = {
                let borrowed = frame.borrow();
                borrowed.closure.clone().or_else(|| borrowed.caller.clone())
            };
            frame = next.ok_or(Error::OuterFrameMissing { level })?;
        }
        Ok(frame)
    }
}

// ============================================================================
// Container access helpers
// ============================================================================

/// Convert a popped index value into an immediate index.
pub(crate) fn index_of_value(value: StelaVal) -> Result<Index> {
    match value {
        StelaVal::Number(n) => Ok(Index::Number(n)),
        StelaVal::Text(s) => Ok(Index::Key(s)),
        other => Err(Error::type_error("number or text", other.type_name())),
    }
}

/// Bounds-checked array index.
pub(crate) fn array_index(n: f64, length: usize) -> Result<usize> {
    let index = n as i64;
    if index < 0 || index as usize >= length {
        Err(Error::IndexOutOfRange { index, length })
    } else {
        Ok(index as usize)
    }
}

/// Read an element from an array or hash.
pub(crate) fn container_get(container: &StelaVal, index: &Index) -> Result<StelaVal> {
    match (container, index) {
        (StelaVal::Array(items), Index::Number(n)) => {
            let items = items.borrow();
            let at = array_index(*n, items.len())?;
            Ok(items[at].clone())
        }
        (StelaVal::Hash(entries), Index::Key(key)) => entries
            .borrow()
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(key.to_string())),
        (StelaVal::Array(_), Index::Key(_)) => {
            Err(Error::type_error_in("array index", "number", "text"))
        }
        (StelaVal::Hash(_), Index::Number(_)) => {
            Err(Error::type_error_in("hash key", "text", "number"))
        }
        (other, _) => Err(Error::type_error("array or hash", other.type_name())),
    }
}

/// Write an element into an array or hash. Hash writes insert missing keys;
/// array writes are bounds-checked.
pub(crate) fn container_set(container: &StelaVal, index: &Index, value: StelaVal) -> Result<()> {
    match (container, index) {
        (StelaVal::Array(items), Index::Number(n)) => {
            let mut items = items.borrow_mut();
            let length = items.len();
            let at = array_index(*n, length)?;
            items[at] = value;
            Ok(())
        }
        (StelaVal::Hash(entries), Index::Key(key)) => {
            entries.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
        (StelaVal::Array(_), Index::Key(_)) => {
            Err(Error::type_error_in("array index", "number", "text"))
        }
        (StelaVal::Hash(_), Index::Number(_)) => {
            Err(Error::type_error_in("hash key", "text", "number"))
        }
        (other, _) => Err(Error::type_error("array or hash", other.type_name())),
    }
}
