// stela-core - Value types for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Core value type for Stela.
//!
//! `StelaVal` is the central enum representing all script values. Scalars
//! compare by value; arrays, hashes, and iterators compare by reference
//! identity (they are mutated in place); function references compare by
//! address.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{Datelike, NaiveDateTime, Timelike};
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::frame::FrameRef;

/// Array body: an ordered, mutable sequence of values.
pub type ArrayBody = Vec<StelaVal>;

/// Hash body: an insertion-ordered, mutable string→value mapping.
pub type HashBody = IndexMap<String, StelaVal>;

/// Shared handle to an array body.
pub type ArrayRef = Rc<RefCell<ArrayBody>>;

/// Shared handle to a hash body.
pub type HashRef = Rc<RefCell<HashBody>>;

/// Shared handle to iterator state.
pub type IterRef = Rc<RefCell<IterState>>;

// ============================================================================
// StelaVal
// ============================================================================

/// A Stela script value.
#[derive(Debug, Clone)]
pub enum StelaVal {
    /// The absent value.
    Empty,
    /// 64-bit floating point number (the only numeric type).
    Number(f64),
    /// Immutable text.
    Text(Rc<str>),
    /// Boolean.
    Boolean(bool),
    /// Calendar date and time.
    Date(NaiveDateTime),
    /// Mutable ordered sequence; identity semantics.
    Array(ArrayRef),
    /// Mutable insertion-ordered mapping; identity semantics.
    Hash(HashRef),
    /// Iterator over an array, hash key snapshot, or scalar.
    Iter(IterRef),
    /// Reference to a user-defined function.
    FuncRef(Rc<FuncRef>),
}

impl StelaVal {
    /// Create a `Number` value.
    pub fn number(n: f64) -> Self {
        StelaVal::Number(n)
    }

    /// Create a `Text` value.
    pub fn text(s: impl AsRef<str>) -> Self {
        StelaVal::Text(Rc::from(s.as_ref()))
    }

    /// Create an `Array` value from owned elements.
    pub fn array(items: Vec<StelaVal>) -> Self {
        StelaVal::Array(Rc::new(RefCell::new(items)))
    }

    /// Create a `Hash` value from owned entries, preserving order.
    pub fn hash(entries: impl IntoIterator<Item = (String, StelaVal)>) -> Self {
        StelaVal::Hash(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    /// Create a bare function reference (no receiver, no closure frame).
    pub fn func_ref(addr: usize) -> Self {
        StelaVal::FuncRef(Rc::new(FuncRef {
            addr,
            receiver: Receiver::None,
            closure: None,
        }))
    }

    /// Type name for display and error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            StelaVal::Empty => "empty",
            StelaVal::Number(_) => "number",
            StelaVal::Text(_) => "text",
            StelaVal::Boolean(_) => "boolean",
            StelaVal::Date(_) => "date",
            StelaVal::Array(_) => "array",
            StelaVal::Hash(_) => "hash",
            StelaVal::Iter(_) => "iterator",
            StelaVal::FuncRef(_) => "funcref",
        }
    }

    /// Boolean coercion.
    ///
    /// `Empty` is false; numbers are true when positive; text when non-empty;
    /// dates when past year/month/day 1; containers when non-empty; iterators
    /// while they have elements left; function refs always.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            StelaVal::Empty => false,
            StelaVal::Number(n) => *n > 0.0,
            StelaVal::Text(s) => !s.is_empty(),
            StelaVal::Boolean(b) => *b,
            StelaVal::Date(d) => d.year() > 1 || d.month() > 1 || d.day() > 1,
            StelaVal::Array(a) => !a.borrow().is_empty(),
            StelaVal::Hash(h) => !h.borrow().is_empty(),
            StelaVal::Iter(it) => it.borrow().has_next(),
            StelaVal::FuncRef(_) => true,
        }
    }

    /// Three-way comparison with an `Undefined` outcome for incomparable
    /// pairs.
    ///
    /// `Empty` compares equal only to `Empty` and undefined against anything
    /// else. Containers compare by identity: the same container is `Equal`,
    /// two distinct ones are `Undefined`. Function refs compare by address.
    /// Mismatched variants compare as `Equal` (legacy behavior, observable
    /// from scripts).
    #[must_use]
    pub fn compare(&self, other: &StelaVal) -> CmpResult {
        use StelaVal::*;
        match (self, other) {
            (Empty, Empty) => CmpResult::Equal,
            (Empty, _) | (_, Empty) => CmpResult::Undefined,
            (Number(a), Number(b)) => match a.partial_cmp(b) {
                Some(ord) => CmpResult::from(ord),
                None => CmpResult::Undefined,
            },
            (Text(a), Text(b)) => CmpResult::from(a.as_ref().cmp(b.as_ref())),
            (Boolean(a), Boolean(b)) => CmpResult::from(a.cmp(b)),
            (Date(a), Date(b)) => CmpResult::from(a.cmp(b)),
            (Array(a), Array(b)) => identity_cmp(Rc::ptr_eq(a, b)),
            (Hash(a), Hash(b)) => identity_cmp(Rc::ptr_eq(a, b)),
            (Iter(a), Iter(b)) => identity_cmp(Rc::ptr_eq(a, b)),
            (FuncRef(a), FuncRef(b)) => identity_cmp(a.addr == b.addr),
            _ => CmpResult::Equal,
        }
    }

    /// Stringify for `emit`: text without quotes, numbers without a trailing
    /// fraction when whole, `Empty` as the empty string.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            StelaVal::Empty => String::new(),
            StelaVal::Text(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

fn identity_cmp(same: bool) -> CmpResult {
    if same {
        CmpResult::Equal
    } else {
        CmpResult::Undefined
    }
}

impl PartialEq for StelaVal {
    fn eq(&self, other: &Self) -> bool {
        use StelaVal::*;
        match (self, other) {
            (Empty, Empty) => true,
            (Number(a), Number(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Array(a), Array(b)) => Rc::ptr_eq(a, b),
            (Hash(a), Hash(b)) => Rc::ptr_eq(a, b),
            (Iter(a), Iter(b)) => Rc::ptr_eq(a, b),
            (FuncRef(a), FuncRef(b)) => a.addr == b.addr,
            _ => false,
        }
    }
}

/// Format a number the way scripts observe it: whole values print without a
/// decimal point.
pub fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for StelaVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StelaVal::Empty => write!(f, "empty"),
            StelaVal::Number(n) => write!(f, "{}", fmt_number(*n)),
            StelaVal::Text(s) => write!(f, "\"{}\"", s),
            StelaVal::Boolean(b) => write!(f, "{}", b),
            StelaVal::Date(d) => {
                if d.hour() == 0 && d.minute() == 0 && d.second() == 0 {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            StelaVal::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            StelaVal::Hash(h) => {
                write!(f, "{{")?;
                for (i, (k, v)) in h.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            StelaVal::Iter(it) => {
                let it = it.borrow();
                write!(f, "#<iter {}/{}>", it.index(), it.count())
            }
            StelaVal::FuncRef(r) => write!(f, "#<fn @{}>", r.addr),
        }
    }
}

// ============================================================================
// Comparison result
// ============================================================================

/// Outcome of comparing two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpResult {
    Less,
    Equal,
    Greater,
    /// The pair has no defined ordering (e.g. `Empty` against a number, or
    /// two distinct containers).
    Undefined,
}

impl From<std::cmp::Ordering> for CmpResult {
    fn from(ord: std::cmp::Ordering) -> Self {
        match ord {
            std::cmp::Ordering::Less => CmpResult::Less,
            std::cmp::Ordering::Equal => CmpResult::Equal,
            std::cmp::Ordering::Greater => CmpResult::Greater,
        }
    }
}

// ============================================================================
// Function references
// ============================================================================

/// Reference to a user-defined function.
///
/// `receiver` carries the hash a method was bound to via `bind_refs`. The
/// handle is weak: the hash owns its values, so a strong handle here would
/// form an ownership cycle. While the hash is reachable the upgrade cannot
/// fail.
#[derive(Debug, Clone)]
pub struct FuncRef {
    /// Instruction index of the function entry.
    pub addr: usize,
    /// Bound receiver, if any.
    pub receiver: Receiver,
    /// Captured frame for outer-register access, if any.
    pub closure: Option<FrameRef>,
}

impl FuncRef {
    /// Create a reference bound to a hash receiver.
    pub fn bound(addr: usize, receiver: &HashRef) -> Self {
        FuncRef {
            addr,
            receiver: Receiver::Hash(Rc::downgrade(receiver)),
            closure: None,
        }
    }
}

/// Receiver slot of a [`FuncRef`].
#[derive(Debug, Clone, Default)]
pub enum Receiver {
    /// No receiver bound.
    #[default]
    None,
    /// Weak handle to the bound hash.
    Hash(Weak<RefCell<HashBody>>),
}

impl Receiver {
    /// Resolve the receiver to a value, if one is bound and still alive.
    #[must_use]
    pub fn resolve(&self) -> Option<StelaVal> {
        match self {
            Receiver::None => None,
            Receiver::Hash(weak) => weak.upgrade().map(StelaVal::Hash),
        }
    }
}

// ============================================================================
// Iterator state
// ============================================================================

/// State of a script-level iterator.
///
/// Arrays yield their elements by index against the live array; hashes yield
/// a key snapshot taken at construction (as `Text`); scalars yield the target
/// itself exactly once. `Empty` yields nothing.
#[derive(Debug)]
pub struct IterState {
    target: StelaVal,
    keys: Vec<Rc<str>>,
    index: usize,
    count: usize,
}

impl IterState {
    /// Build iterator state over a target value.
    ///
    /// Iterating an iterator is an error.
    pub fn new(target: StelaVal) -> Result<Self> {
        let (keys, count) = match &target {
            StelaVal::Array(a) => (Vec::new(), a.borrow().len()),
            StelaVal::Hash(h) => {
                let keys: Vec<Rc<str>> =
                    h.borrow().keys().map(|k| Rc::from(k.as_str())).collect();
                let count = keys.len();
                (keys, count)
            }
            StelaVal::Iter(_) => {
                return Err(Error::invalid_iterator_target("iterator"));
            }
            StelaVal::Empty => (Vec::new(), 0),
            _ => (Vec::new(), 1),
        };
        Ok(IterState {
            target,
            keys,
            index: 0,
            count,
        })
    }

    /// True while elements remain.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.index < self.count
    }

    /// Current position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total element count at construction.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Yield the next element and advance. Past exhaustion yields `Empty`.
    pub fn next(&mut self) -> StelaVal {
        if !self.has_next() {
            return StelaVal::Empty;
        }
        let item = match &self.target {
            StelaVal::Array(a) => a
                .borrow()
                .get(self.index)
                .cloned()
                .unwrap_or(StelaVal::Empty),
            StelaVal::Hash(_) => StelaVal::Text(Rc::clone(&self.keys[self.index])),
            other => other.clone(),
        };
        self.index += 1;
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality_is_by_value() {
        assert_eq!(StelaVal::number(1.5), StelaVal::number(1.5));
        assert_eq!(StelaVal::text("a"), StelaVal::text("a"));
        assert_ne!(StelaVal::number(1.0), StelaVal::text("1"));
    }

    #[test]
    fn container_equality_is_by_identity() {
        let a = StelaVal::array(vec![StelaVal::number(1.0)]);
        let b = StelaVal::array(vec![StelaVal::number(1.0)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(fmt_number(7.0), "7");
        assert_eq!(fmt_number(-3.0), "-3");
        assert_eq!(fmt_number(2.5), "2.5");
    }

    #[test]
    fn hash_iteration_snapshots_keys() {
        let hash = StelaVal::hash(vec![
            ("a".to_string(), StelaVal::number(1.0)),
            ("b".to_string(), StelaVal::number(2.0)),
        ]);
        let mut it = IterState::new(hash.clone()).unwrap();
        if let StelaVal::Hash(h) = &hash {
            h.borrow_mut().insert("c".to_string(), StelaVal::number(3.0));
        }
        assert_eq!(it.next(), StelaVal::text("a"));
        assert_eq!(it.next(), StelaVal::text("b"));
        assert!(!it.has_next());
    }
}
