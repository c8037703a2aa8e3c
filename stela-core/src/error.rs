// stela-core - Error types for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime error types.
//!
//! [`Error`] is the kind-level error raised by opcode handlers and native
//! functions. The engine wraps it into a [`RuntimeError`] envelope at the
//! run boundary, attaching the instruction index, the opcode's printable
//! form, the source-map entry when present, and a dump of the current frame.
//!
//! Division by zero is deliberately absent: numeric division follows IEEE
//! semantics and yields infinity or NaN.

use std::fmt;

use crate::program::SourceLoc;

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while executing opcodes or native functions.
#[derive(Debug, Clone)]
pub enum Error {
    /// Pop on an empty operand stack.
    StackUnderflow,
    /// Wrong variant for a required operation.
    TypeError {
        expected: &'static str,
        got: &'static str,
        context: Option<String>,
    },
    /// Register index outside the frame's register file.
    RegisterOutOfRange { register: usize, size: usize },
    /// `load.outer`/`store.outer` walked past the frame chain.
    OuterFrameMissing { level: usize },
    /// Array index outside the container.
    IndexOutOfRange { index: i64, length: usize },
    /// Hash lookup of an absent key.
    KeyNotFound(String),
    /// Shared-variable name not declared in `.shared`.
    UnknownSharedVariable(String),
    /// Call target address has no function entry.
    UnknownFunction { address: usize },
    /// Iterator construction over an unsupported target.
    InvalidIteratorTarget(&'static str),
    /// `DateDiff` unit outside `y`/`m`/`d`.
    InvalidDateUnit(String),
    /// `ret` with no caller frame or no pending return address.
    ReturnWithoutCaller,
    /// Reserved or unimplemented opcode reached the dispatch loop.
    UnsupportedOpcode(String),
    /// General evaluation error.
    EvalError(String),
    /// Internal error - invariant violation.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StackUnderflow => write!(f, "Stack underflow"),
            Error::TypeError {
                expected,
                got,
                context,
            } => {
                if let Some(ctx) = context {
                    write!(f, "{}: expected {}, got {}", ctx, expected, got)
                } else {
                    write!(f, "Type error: expected {}, got {}", expected, got)
                }
            }
            Error::RegisterOutOfRange { register, size } => {
                write!(
                    f,
                    "Register {} out of range for frame of size {}",
                    register, size
                )
            }
            Error::OuterFrameMissing { level } => {
                write!(f, "No outer frame at level {}", level)
            }
            Error::IndexOutOfRange { index, length } => {
                write!(
                    f,
                    "Index {} out of range for array of length {}",
                    index, length
                )
            }
            Error::KeyNotFound(key) => write!(f, "Key not found: {}", key),
            Error::UnknownSharedVariable(name) => {
                write!(f, "Unknown shared variable: {}", name)
            }
            Error::UnknownFunction { address } => {
                write!(f, "No function at address {}", address)
            }
            Error::InvalidIteratorTarget(kind) => {
                write!(f, "Cannot iterate a value of type {}", kind)
            }
            Error::InvalidDateUnit(unit) => {
                write!(f, "Invalid date unit '{}' (expected y, m, or d)", unit)
            }
            Error::ReturnWithoutCaller => write!(f, "Return without a caller frame"),
            Error::UnsupportedOpcode(op) => write!(f, "Unsupported opcode: {}", op),
            Error::EvalError(msg) => write!(f, "{}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a type error.
    pub fn type_error(expected: &'static str, got: &'static str) -> Self {
        Error::TypeError {
            expected,
            got,
            context: None,
        }
    }

    /// Create a type error with context (usually the operation name).
    pub fn type_error_in(
        context: impl Into<String>,
        expected: &'static str,
        got: &'static str,
    ) -> Self {
        Error::TypeError {
            expected,
            got,
            context: Some(context.into()),
        }
    }

    /// Create an invalid-iterator-target error.
    pub fn invalid_iterator_target(kind: &'static str) -> Self {
        Error::InvalidIteratorTarget(kind)
    }

    /// Create a general evaluation error.
    pub fn eval(message: impl Into<String>) -> Self {
        Error::EvalError(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

// ============================================================================
// Runtime error envelope
// ============================================================================

/// A runtime failure with its execution context.
///
/// Built by the engine when the dispatch loop catches an [`Error`]. The VM
/// state is invalid afterwards and the context should be discarded.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// Instruction index at the point of failure.
    pub index: usize,
    /// Printable form of the failing opcode.
    pub opcode: String,
    /// The underlying error kind.
    pub kind: Error,
    /// Stringified registers and operand stack of the current frame.
    pub frame_dump: String,
    /// Source-map entry for the failing instruction, when present.
    pub source: Option<SourceLoc>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Runtime error at instruction {} ({}): {}",
            self.index, self.opcode, self.kind
        )?;
        if let Some(loc) = &self.source {
            write!(f, " [{}:{}]", loc.module, loc.line)?;
        }
        write!(f, "\n{}", self.frame_dump)
    }
}

impl std::error::Error for RuntimeError {}
