// stela-embed - Host embedding API for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Embed the Stela VM in a Rust host.
//!
//! ```rust
//! use stela_embed::Engine;
//!
//! let engine = Engine::new();
//! let mut vm = engine
//!     .load(".shared\ncounter\n.entry\nload.global 0\nload 1\nadd\nstore.global 0\n")
//!     .unwrap();
//! vm.set_shared("counter", 41).unwrap();
//! vm.run().unwrap();
//! let counter: f64 = vm.shared("counter").unwrap();
//! assert_eq!(counter, 42.0);
//! ```

pub mod convert;
pub mod engine;

pub use convert::{from_stela, to_stela, FromStelaVal, IntoStelaVal};
pub use engine::{Engine, EvaluatorError, Result, Vm};

pub use stela_core::{Outcome, StateEvent, StelaVal};
