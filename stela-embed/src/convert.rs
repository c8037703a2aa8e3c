// stela-embed - Type conversion traits
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Type conversion between Rust and Stela values.
//!
//! This module provides the [`IntoStelaVal`] and [`FromStelaVal`] traits for
//! converting between Rust types and [`StelaVal`].
//!
//! # Built-in Conversions
//!
//! | Rust Type | Stela Type |
//! |-----------|------------|
//! | `()` | `empty` |
//! | `bool` | `boolean` |
//! | `i32`, `i64`, `usize` | `number` (widened) |
//! | `f32`, `f64` | `number` |
//! | `String`, `&str` | `text` |
//! | `chrono::NaiveDateTime` | `date` |
//! | `Vec<T>` | `array` (recursive) |
//! | `HashMap<String, T>`, `IndexMap<String, T>` | `hash` (recursive) |
//! | `Option<T>` | `T` or `empty` |
//!
//! Function references convert outward to their integer address; iterators
//! pass through only as opaque [`StelaVal`] handles.

use std::collections::HashMap;
use std::rc::Rc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use stela_core::{Error, Result, StelaVal};

/// Convert a Rust type into a `StelaVal`.
pub trait IntoStelaVal {
    fn into_stela_val(self) -> StelaVal;
}

/// Convert a `StelaVal` into a Rust type.
pub trait FromStelaVal: Sized {
    fn from_stela_val(val: &StelaVal) -> Result<Self>;
}

// ============================================================================
// IntoStelaVal implementations
// ============================================================================

impl IntoStelaVal for StelaVal {
    fn into_stela_val(self) -> StelaVal {
        self
    }
}

impl IntoStelaVal for () {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Empty
    }
}

impl IntoStelaVal for bool {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Boolean(self)
    }
}

impl IntoStelaVal for f64 {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Number(self)
    }
}

impl IntoStelaVal for f32 {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Number(self as f64)
    }
}

impl IntoStelaVal for i64 {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Number(self as f64)
    }
}

impl IntoStelaVal for i32 {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Number(self as f64)
    }
}

impl IntoStelaVal for usize {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Number(self as f64)
    }
}

impl IntoStelaVal for String {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::text(self)
    }
}

impl IntoStelaVal for &str {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::text(self)
    }
}

impl IntoStelaVal for Rc<str> {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Text(self)
    }
}

impl IntoStelaVal for NaiveDateTime {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::Date(self)
    }
}

impl<T: IntoStelaVal> IntoStelaVal for Vec<T> {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::array(self.into_iter().map(|x| x.into_stela_val()).collect())
    }
}

impl<T: IntoStelaVal> IntoStelaVal for Option<T> {
    fn into_stela_val(self) -> StelaVal {
        match self {
            Some(v) => v.into_stela_val(),
            None => StelaVal::Empty,
        }
    }
}

impl<V: IntoStelaVal> IntoStelaVal for HashMap<String, V> {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::hash(
            self.into_iter()
                .map(|(k, v)| (k, v.into_stela_val()))
                .collect::<Vec<_>>(),
        )
    }
}

impl<V: IntoStelaVal> IntoStelaVal for IndexMap<String, V> {
    fn into_stela_val(self) -> StelaVal {
        StelaVal::hash(
            self.into_iter()
                .map(|(k, v)| (k, v.into_stela_val()))
                .collect::<Vec<_>>(),
        )
    }
}

// ============================================================================
// FromStelaVal implementations
// ============================================================================

impl FromStelaVal for StelaVal {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromStelaVal for () {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Empty => Ok(()),
            other => Err(Error::type_error("empty", other.type_name())),
        }
    }
}

impl FromStelaVal for bool {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Boolean(b) => Ok(*b),
            other => Err(Error::type_error("boolean", other.type_name())),
        }
    }
}

impl FromStelaVal for f64 {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Number(n) => Ok(*n),
            other => Err(Error::type_error("number", other.type_name())),
        }
    }
}

impl FromStelaVal for f32 {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        f64::from_stela_val(val).map(|n| n as f32)
    }
}

impl FromStelaVal for i64 {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
            StelaVal::Number(_) => Err(Error::type_error("whole number", "number")),
            // Function references surface as their address.
            StelaVal::FuncRef(r) => Ok(r.addr as i64),
            other => Err(Error::type_error("number", other.type_name())),
        }
    }
}

impl FromStelaVal for String {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Text(s) => Ok(s.to_string()),
            other => Err(Error::type_error("text", other.type_name())),
        }
    }
}

impl FromStelaVal for NaiveDateTime {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Date(d) => Ok(*d),
            other => Err(Error::type_error("date", other.type_name())),
        }
    }
}

impl<T: FromStelaVal> FromStelaVal for Vec<T> {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Array(items) => {
                items.borrow().iter().map(|x| T::from_stela_val(x)).collect()
            }
            other => Err(Error::type_error("array", other.type_name())),
        }
    }
}

impl<T: FromStelaVal> FromStelaVal for Option<T> {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Empty => Ok(None),
            other => T::from_stela_val(other).map(Some),
        }
    }
}

impl<V: FromStelaVal> FromStelaVal for HashMap<String, V> {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Hash(entries) => {
                let entries = entries.borrow();
                let mut result = HashMap::with_capacity(entries.len());
                for (k, v) in entries.iter() {
                    result.insert(k.clone(), V::from_stela_val(v)?);
                }
                Ok(result)
            }
            other => Err(Error::type_error("hash", other.type_name())),
        }
    }
}

impl<V: FromStelaVal> FromStelaVal for IndexMap<String, V> {
    fn from_stela_val(val: &StelaVal) -> Result<Self> {
        match val {
            StelaVal::Hash(entries) => {
                let entries = entries.borrow();
                let mut result = IndexMap::with_capacity(entries.len());
                for (k, v) in entries.iter() {
                    result.insert(k.clone(), V::from_stela_val(v)?);
                }
                Ok(result)
            }
            other => Err(Error::type_error("hash", other.type_name())),
        }
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Convert a Rust value into a StelaVal.
#[must_use]
pub fn to_stela<T: IntoStelaVal>(value: T) -> StelaVal {
    value.into_stela_val()
}

/// Convert a StelaVal into a Rust type.
pub fn from_stela<T: FromStelaVal>(val: &StelaVal) -> Result<T> {
    T::from_stela_val(val)
}
