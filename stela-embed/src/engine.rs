// stela-embed - Engine and VM host surface
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The host embedding surface.
//!
//! [`Engine`] owns the module registry and loads programs; a loaded program
//! becomes a [`Vm`], which runs, suspends, receives external events, and
//! exposes shared variables and results.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use stela_asm::LoadError;
use stela_core::{Context, ModuleRegistry, Outcome, Program, RuntimeError, StateEvent, StelaVal};

use crate::convert::{FromStelaVal, IntoStelaVal};

/// Host-facing error, assembled from load-time or runtime failures.
#[derive(Debug, Clone)]
pub enum EvaluatorError {
    /// The program text failed to load.
    Load(LoadError),
    /// Execution failed; the VM is invalid afterwards.
    Runtime(RuntimeError),
    /// A host-side operation failed (shared-variable access, conversion).
    Value(stela_core::Error),
}

impl fmt::Display for EvaluatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatorError::Load(e) => write!(f, "{}", e),
            EvaluatorError::Runtime(e) => write!(f, "{}", e),
            EvaluatorError::Value(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvaluatorError {}

impl From<LoadError> for EvaluatorError {
    fn from(e: LoadError) -> Self {
        EvaluatorError::Load(e)
    }
}

impl From<RuntimeError> for EvaluatorError {
    fn from(e: RuntimeError) -> Self {
        EvaluatorError::Runtime(e)
    }
}

impl From<stela_core::Error> for EvaluatorError {
    fn from(e: stela_core::Error) -> Self {
        EvaluatorError::Value(e)
    }
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, EvaluatorError>;

/// The Stela scripting engine.
///
/// `Engine` owns the native-module registry and turns program text into
/// runnable [`Vm`] instances.
///
/// # Thread Safety
///
/// **`Engine` and `Vm` are NOT thread-safe.** The VM uses `Rc` and `RefCell`
/// internally for performance in single-threaded contexts. If you need
/// concurrent evaluation, create separate engines per thread.
///
/// # Example
///
/// ```rust
/// use stela_embed::Engine;
///
/// let engine = Engine::new();
/// let mut vm = engine.load(".entry\nload 3\nload 4\nadd\nemit\n").unwrap();
/// vm.run().unwrap();
/// assert_eq!(vm.default_output(), ["7"]);
/// ```
pub struct Engine {
    registry: ModuleRegistry,
}

impl Engine {
    /// Create an engine with the standard `$builtin`, `math`, and `events`
    /// modules.
    #[must_use]
    pub fn new() -> Self {
        Engine {
            registry: ModuleRegistry::standard(),
        }
    }

    /// Create an engine with a custom registry.
    #[must_use]
    pub fn with_registry(registry: ModuleRegistry) -> Self {
        Engine { registry }
    }

    /// The module registry used to resolve `call.native` and `load.const`.
    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Mutable registry access, for registering host modules before loading.
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Load program text into a runnable VM.
    pub fn load(&self, source: &str) -> Result<Vm> {
        let program = stela_asm::load(source, &self.registry)?;
        Ok(Vm::new(program))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// A loaded program with its execution context.
pub struct Vm {
    program: Rc<Program>,
    ctx: Context,
}

impl Vm {
    /// Wrap a loaded program, allocating the global frame.
    #[must_use]
    pub fn new(program: Program) -> Self {
        let program = Rc::new(program);
        let ctx = Context::new(Rc::clone(&program));
        Vm { program, ctx }
    }

    /// The program image.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Execute until the program ends, suspends, or fails. After an error
    /// the VM is invalid and should be discarded.
    pub fn run(&mut self) -> Result<Outcome> {
        Ok(self.ctx.run()?)
    }

    /// Provide the legacy named-input dictionary.
    pub fn set_input<V: IntoStelaVal>(&mut self, input: impl IntoIterator<Item = (String, V)>) {
        let converted: HashMap<String, StelaVal> = input
            .into_iter()
            .map(|(k, v)| (k, v.into_stela_val()))
            .collect();
        self.ctx.set_input(converted);
    }

    /// Read a shared variable. Unknown names fail.
    pub fn shared<T: FromStelaVal>(&self, name: &str) -> Result<T> {
        let value = self.ctx.shared(name)?;
        Ok(T::from_stela_val(&value)?)
    }

    /// Write a shared variable. Unknown names fail.
    pub fn set_shared(&mut self, name: &str, value: impl IntoStelaVal) -> Result<()> {
        Ok(self.ctx.set_shared(name, value.into_stela_val())?)
    }

    /// Deliver an external event to the script's registered handler,
    /// returning the handler's result if it produced one. Without a handler
    /// the VM is untouched and `None` is returned.
    pub fn raise_event(
        &mut self,
        name: &str,
        payload: impl IntoStelaVal,
    ) -> Result<Option<StelaVal>> {
        Ok(self.ctx.raise_event(name, payload.into_stela_val())?)
    }

    /// All text output contexts; `"default"` is always present.
    #[must_use]
    pub fn text_results(&self) -> &IndexMap<String, Vec<String>> {
        self.ctx.text_results()
    }

    /// The default text output context.
    #[must_use]
    pub fn default_output(&self) -> &[String] {
        self.ctx
            .text_results()
            .get(stela_core::DEFAULT_OUTPUT)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The named results recorded by `emit.named`.
    #[must_use]
    pub fn named_results(&self) -> &IndexMap<String, StelaVal> {
        self.ctx.named_results()
    }

    /// Drain queued state events (suspensions, resumes, external events).
    pub fn drain_events(&mut self) -> Vec<StateEvent> {
        self.ctx.drain_events()
    }

    /// Direct access to the execution context, for advanced hosts.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Mutable context access, for advanced hosts.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}
