// stela-core - Execution context for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The execution context.
//!
//! A `Context` owns everything a running script touches: the frame chain,
//! the instruction pointer, the return-address stack, text output contexts,
//! named results, the event-handler table, and a drainable queue of state
//! events for the host. Native functions receive `&mut Context` and talk to
//! the script through its stack API.
//!
//! A context runs one script on one thread. Never run two script
//! activations against the same context simultaneously.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::frame::{DataFrame, FrameRef};
use crate::program::Program;
use crate::value::{ArrayRef, CmpResult, FuncRef, HashRef, IterRef, StelaVal};

/// Native function signature. Natives consume and produce values through the
/// context's stack API and may suspend, raise external events, or re-enter
/// the engine for script callbacks.
pub type NativeFn = fn(&mut Context) -> Result<()>;

/// Name of the always-present default text output context.
pub const DEFAULT_OUTPUT: &str = "default";

/// Why a `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The last instruction was executed.
    Ended,
    /// A native function suspended the VM; it can be resumed by an event.
    Suspended,
}

/// State transition notifications, drained by the host.
#[derive(Debug, Clone)]
pub enum StateEvent {
    Suspended,
    Resumed,
    Ended,
    /// Raised by a native function for the host.
    ExternalEvent { name: String, payload: StelaVal },
    /// A native function re-entered the engine for a script callback.
    NestedExec { addr: usize },
}

/// The execution context of one loaded program.
pub struct Context {
    pub(crate) program: Rc<Program>,
    /// Instruction index.
    pub(crate) i: usize,
    pub(crate) running: bool,
    /// Set by jump handlers to suppress the implicit advance.
    pub(crate) jumped: bool,
    /// Current frame.
    pub(crate) frame: FrameRef,
    /// Frame of an in-flight event handler; its return re-suspends the VM.
    pub(crate) handler_frame: Option<FrameRef>,
    pub(crate) return_addresses: Vec<usize>,
    /// Last comparison result.
    pub(crate) cmp: CmpResult,
    input: HashMap<String, StelaVal>,
    outputs: IndexMap<String, Vec<String>>,
    current_output: String,
    named_results: IndexMap<String, StelaVal>,
    event_handlers: HashMap<String, Rc<FuncRef>>,
    events: Vec<StateEvent>,
}

impl Context {
    /// Create a context for a loaded program, allocating the global frame
    /// sized by the entry function.
    pub fn new(program: Rc<Program>) -> Self {
        let entry = program.entry();
        let mut outputs = IndexMap::new();
        outputs.insert(DEFAULT_OUTPUT.to_string(), Vec::new());
        Context {
            i: entry.address,
            frame: DataFrame::new(entry.frame_size).into_ref(),
            program,
            running: false,
            jumped: false,
            handler_frame: None,
            return_addresses: Vec::new(),
            cmp: CmpResult::Undefined,
            input: HashMap::new(),
            outputs,
            current_output: DEFAULT_OUTPUT.to_string(),
            named_results: IndexMap::new(),
            event_handlers: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// The program this context executes.
    #[must_use]
    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /// The current frame.
    #[must_use]
    pub fn current_frame(&self) -> FrameRef {
        Rc::clone(&self.frame)
    }

    /// True while the dispatch loop is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the dispatch loop after the current opcode. Only native
    /// functions suspend.
    pub fn suspend(&mut self) {
        self.running = false;
    }

    // ------------------------------------------------------------------
    // Stack API for opcode handlers and native functions
    // ------------------------------------------------------------------

    /// Push a value onto the current frame's operand stack.
    pub fn push(&mut self, value: StelaVal) {
        self.frame.borrow_mut().push(value);
    }

    /// Pop a value from the current frame's operand stack.
    pub fn pop(&mut self) -> Result<StelaVal> {
        self.frame.borrow_mut().pop()
    }

    /// Clone the top of the current frame's operand stack.
    pub fn peek(&self) -> Result<StelaVal> {
        self.frame.borrow().peek()
    }

    /// Pop a number.
    pub fn pop_number(&mut self) -> Result<f64> {
        match self.pop()? {
            StelaVal::Number(n) => Ok(n),
            other => Err(Error::type_error("number", other.type_name())),
        }
    }

    /// Pop a text.
    pub fn pop_text(&mut self) -> Result<Rc<str>> {
        match self.pop()? {
            StelaVal::Text(s) => Ok(s),
            other => Err(Error::type_error("text", other.type_name())),
        }
    }

    /// Pop a date.
    pub fn pop_date(&mut self) -> Result<chrono::NaiveDateTime> {
        match self.pop()? {
            StelaVal::Date(d) => Ok(d),
            other => Err(Error::type_error("date", other.type_name())),
        }
    }

    /// Pop an array handle.
    pub fn pop_array(&mut self) -> Result<ArrayRef> {
        match self.pop()? {
            StelaVal::Array(a) => Ok(a),
            other => Err(Error::type_error("array", other.type_name())),
        }
    }

    /// Pop a hash handle.
    pub fn pop_hash(&mut self) -> Result<HashRef> {
        match self.pop()? {
            StelaVal::Hash(h) => Ok(h),
            other => Err(Error::type_error("hash", other.type_name())),
        }
    }

    /// Pop an iterator handle.
    pub fn pop_iter(&mut self) -> Result<IterRef> {
        match self.pop()? {
            StelaVal::Iter(it) => Ok(it),
            other => Err(Error::type_error("iterator", other.type_name())),
        }
    }

    /// Pop a function reference.
    pub fn pop_func_ref(&mut self) -> Result<Rc<FuncRef>> {
        match self.pop()? {
            StelaVal::FuncRef(r) => Ok(r),
            other => Err(Error::type_error("funcref", other.type_name())),
        }
    }

    /// Pop with boolean coercion.
    pub fn pop_truthy(&mut self) -> Result<bool> {
        Ok(self.pop()?.is_truthy())
    }

    // ------------------------------------------------------------------
    // Shared variables
    // ------------------------------------------------------------------

    /// Read a shared variable by name.
    pub fn shared(&self, name: &str) -> Result<StelaVal> {
        let index = self
            .program
            .shared_index(name)
            .ok_or_else(|| Error::UnknownSharedVariable(name.to_string()))?;
        DataFrame::global(&self.frame).borrow().register(index)
    }

    /// Write a shared variable by name.
    pub fn set_shared(&mut self, name: &str, value: StelaVal) -> Result<()> {
        let index = self
            .program
            .shared_index(name)
            .ok_or_else(|| Error::UnknownSharedVariable(name.to_string()))?;
        DataFrame::global(&self.frame)
            .borrow_mut()
            .set_register(index, value)
    }

    // ------------------------------------------------------------------
    // Input dictionary
    // ------------------------------------------------------------------

    /// Replace the legacy named-input dictionary.
    pub fn set_input(&mut self, input: HashMap<String, StelaVal>) {
        self.input = input;
    }

    /// The legacy named-input dictionary.
    #[must_use]
    pub fn input(&self) -> &HashMap<String, StelaVal> {
        &self.input
    }

    // ------------------------------------------------------------------
    // Text output contexts & named results
    // ------------------------------------------------------------------

    /// Append a line to the current text output context.
    pub fn emit_text(&mut self, text: String) {
        self.outputs
            .entry(self.current_output.clone())
            .or_default()
            .push(text);
    }

    /// Switch the current text output context, creating it if needed.
    pub fn select_output(&mut self, name: &str) {
        self.outputs.entry(name.to_string()).or_default();
        self.current_output = name.to_string();
    }

    /// All text output contexts. `"default"` is always present.
    #[must_use]
    pub fn text_results(&self) -> &IndexMap<String, Vec<String>> {
        &self.outputs
    }

    /// Record a named result.
    pub fn insert_named_result(&mut self, key: &str, value: StelaVal) {
        self.named_results.insert(key.to_string(), value);
    }

    /// The named results recorded by `emit.named`.
    #[must_use]
    pub fn named_results(&self) -> &IndexMap<String, StelaVal> {
        &self.named_results
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a script handler for an external event.
    pub fn set_event_handler(&mut self, name: impl Into<String>, handler: Rc<FuncRef>) {
        self.event_handlers.insert(name.into(), handler);
    }

    /// Look up the handler for an event name.
    #[must_use]
    pub fn event_handler(&self, name: &str) -> Option<Rc<FuncRef>> {
        self.event_handlers.get(name).cloned()
    }

    /// Raise an event for the host to observe. Used by native functions.
    pub fn raise_external_event(&mut self, name: impl Into<String>, payload: StelaVal) {
        self.events.push(StateEvent::ExternalEvent {
            name: name.into(),
            payload,
        });
    }

    pub(crate) fn push_event(&mut self, event: StateEvent) {
        self.events.push(event);
    }

    /// Drain the queued state events.
    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        std::mem::take(&mut self.events)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("i", &self.i)
            .field("running", &self.running)
            .field("return_addresses", &self.return_addresses)
            .field("current_output", &self.current_output)
            .finish_non_exhaustive()
    }
}
