// stela-asm - Load error types
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Loader error with position information.

use std::fmt;

/// A loader-time failure. No partial program is ever returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    /// 1-based source line of the failure.
    pub line: usize,
    pub message: String,
}

impl LoadError {
    /// Create a load error at a source line.
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        LoadError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Load error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LoadError {}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;
