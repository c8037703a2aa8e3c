// stela-core - Value model, execution engine, and native modules
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Core of the Stela virtual machine.
//!
//! This crate owns the tagged value model ([`StelaVal`]), call frames
//! ([`DataFrame`]), the execution [`Context`] with its opcode dispatch
//! engine, and the native [`modules`] resolved at load time. The textual
//! loader lives in `stela-asm`; the host embedding surface in
//! `stela-embed`.
//!
//! # Thread Safety
//!
//! A [`Context`] is **not** thread-safe. Frames and containers are shared
//! through `Rc`/`RefCell` for single-threaded performance; never run two
//! script activations against the same context simultaneously.

pub mod context;
pub mod engine;
pub mod error;
pub mod frame;
pub mod modules;
pub mod opcode;
pub mod program;
pub mod value;

pub use context::{Context, NativeFn, Outcome, StateEvent, DEFAULT_OUTPUT};
pub use error::{Error, Result, RuntimeError};
pub use frame::{DataFrame, FrameRef};
pub use modules::{Module, ModuleFunc, ModuleRegistry};
pub use opcode::{Index, MathOp, OpCode, Predicate};
pub use program::{FuncInfo, Program, SourceLoc, ENTRY_KEY};
pub use value::{CmpResult, FuncRef, IterState, Receiver, StelaVal};
