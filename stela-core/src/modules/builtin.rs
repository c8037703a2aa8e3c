// stela-core - Default built-in native functions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `$builtin` module: conversions, container helpers, iteration
//! primitives, and output-context control.
//!
//! Natives consume their arguments from the operand stack, last argument on
//! top. Helpers that mutate a container push it back so calls chain.

use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::context::Context;
use crate::engine::array_index;
use crate::error::{Error, Result};
use crate::value::{IterState, StelaVal};

use super::{Module, ModuleRegistry};

pub(super) fn module() -> Module {
    let mut m = Module::new(ModuleRegistry::DEFAULT_MODULE);

    m.define_const("null", StelaVal::Empty);
    m.define_const("true", StelaVal::Boolean(true));
    m.define_const("false", StelaVal::Boolean(false));

    m.define_native("ToNumber", 1, builtin_to_number);
    m.define_native("ToDate", 1, builtin_to_date);
    m.define_native("Defined", 1, builtin_defined);
    m.define_native("Type", 1, builtin_type);
    m.define_native("DateNow", 0, builtin_date_now);
    m.define_native("DateDiff", 3, builtin_date_diff);
    m.define_native("Length", 1, builtin_length);
    m.define_native("Add", 2, builtin_add);
    m.define_native("Find", 2, builtin_find);
    m.define_native("Delete", 2, builtin_delete);
    m.define_native("RangeArray", 2, builtin_range_array);
    m.define_native("Flatten", 1, builtin_flatten);
    m.define_native("SortWith", 2, builtin_sort_with);
    m.define_native("Slice", 3, builtin_slice);
    m.define_native("_iter_create$", 1, builtin_iter_create);
    m.define_native("_iter_hasnext$", 1, builtin_iter_hasnext);
    m.define_native("_iter_next$", 1, builtin_iter_next);
    m.define_native("Format", 2, builtin_format);
    m.define_native("Context", 1, builtin_context);

    m
}

// ============================================================================
// Conversions & Introspection
// ============================================================================

/// `ToNumber(value)` - numeric coercion: numbers pass through, text is
/// parsed, booleans map to 1/0, `Empty` to 0.
pub(crate) fn builtin_to_number(ctx: &mut Context) -> Result<()> {
    let n = match ctx.pop()? {
        StelaVal::Number(n) => n,
        StelaVal::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::eval(format!("cannot parse '{}' as a number", s)))?,
        StelaVal::Boolean(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        StelaVal::Empty => 0.0,
        other => {
            return Err(Error::type_error_in(
                "ToNumber",
                "number, text, boolean, or empty",
                other.type_name(),
            ));
        }
    };
    ctx.push(StelaVal::Number(n));
    Ok(())
}

/// `ToDate(value)` - parse `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` text;
/// dates pass through.
pub(crate) fn builtin_to_date(ctx: &mut Context) -> Result<()> {
    let date = match ctx.pop()? {
        StelaVal::Date(d) => d,
        StelaVal::Text(s) => parse_date(s.trim())
            .ok_or_else(|| Error::eval(format!("cannot parse '{}' as a date", s)))?,
        other => {
            return Err(Error::type_error_in(
                "ToDate",
                "date or text",
                other.type_name(),
            ));
        }
    };
    ctx.push(StelaVal::Date(date));
    Ok(())
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// `Defined(value)` - true unless the value is `Empty`.
pub(crate) fn builtin_defined(ctx: &mut Context) -> Result<()> {
    let value = ctx.pop()?;
    ctx.push(StelaVal::Boolean(!matches!(value, StelaVal::Empty)));
    Ok(())
}

/// `Type(value)` - the value's type name as text.
pub(crate) fn builtin_type(ctx: &mut Context) -> Result<()> {
    let value = ctx.pop()?;
    ctx.push(StelaVal::text(value.type_name()));
    Ok(())
}

// ============================================================================
// Dates
// ============================================================================

/// `DateNow()` - the current local date and time.
pub(crate) fn builtin_date_now(ctx: &mut Context) -> Result<()> {
    ctx.push(StelaVal::Date(chrono::Local::now().naive_local()));
    Ok(())
}

/// `DateDiff(a, b, unit)` - difference `a - b` in whole days, scaled by the
/// unit: `y` = days/365, `m` = days/30, `d` = days.
pub(crate) fn builtin_date_diff(ctx: &mut Context) -> Result<()> {
    let unit = ctx.pop_text()?;
    let second = ctx.pop_date()?;
    let first = ctx.pop_date()?;
    let days = (first.date() - second.date()).num_days();
    let scaled = match unit.as_ref() {
        "y" => days / 365,
        "m" => days / 30,
        "d" => days,
        _ => return Err(Error::InvalidDateUnit(unit.to_string())),
    };
    ctx.push(StelaVal::Number(scaled as f64));
    Ok(())
}

// ============================================================================
// Containers
// ============================================================================

/// `Length(value)` - text length in characters, container element count,
/// iterator element count, 0 for `Empty`.
pub(crate) fn builtin_length(ctx: &mut Context) -> Result<()> {
    let length = match ctx.pop()? {
        StelaVal::Text(s) => s.chars().count(),
        StelaVal::Array(a) => a.borrow().len(),
        StelaVal::Hash(h) => h.borrow().len(),
        StelaVal::Iter(it) => it.borrow().count(),
        StelaVal::Empty => 0,
        other => {
            return Err(Error::type_error_in(
                "Length",
                "text, array, hash, iterator, or empty",
                other.type_name(),
            ));
        }
    };
    ctx.push(StelaVal::Number(length as f64));
    Ok(())
}

/// `Add(array, value)` - append in place; pushes the array back.
pub(crate) fn builtin_add(ctx: &mut Context) -> Result<()> {
    let value = ctx.pop()?;
    let array = ctx.pop_array()?;
    array.borrow_mut().push(value);
    ctx.push(StelaVal::Array(array));
    Ok(())
}

/// `Find(container, needle)` - for arrays, the first element comparing equal
/// to the needle, or `Empty`; for hashes, whether the key is present.
pub(crate) fn builtin_find(ctx: &mut Context) -> Result<()> {
    use crate::value::CmpResult;
    let needle = ctx.pop()?;
    let found = match ctx.pop()? {
        StelaVal::Array(items) => items
            .borrow()
            .iter()
            .find(|item| item.compare(&needle) == CmpResult::Equal)
            .cloned()
            .unwrap_or(StelaVal::Empty),
        StelaVal::Hash(entries) => match needle {
            StelaVal::Text(key) => {
                StelaVal::Boolean(entries.borrow().contains_key(key.as_ref()))
            }
            other => {
                return Err(Error::type_error_in("Find key", "text", other.type_name()));
            }
        },
        other => {
            return Err(Error::type_error_in(
                "Find",
                "array or hash",
                other.type_name(),
            ));
        }
    };
    ctx.push(found);
    Ok(())
}

/// `Delete(container, key)` - remove an array element by index or a hash
/// entry by key (absent keys are ignored); pushes the container back.
pub(crate) fn builtin_delete(ctx: &mut Context) -> Result<()> {
    let key = ctx.pop()?;
    let container = ctx.pop()?;
    match (&container, key) {
        (StelaVal::Array(items), StelaVal::Number(n)) => {
            let mut items = items.borrow_mut();
            let at = array_index(n, items.len())?;
            items.remove(at);
        }
        (StelaVal::Hash(entries), StelaVal::Text(key)) => {
            entries.borrow_mut().shift_remove(key.as_ref());
        }
        (StelaVal::Array(_), other) => {
            return Err(Error::type_error_in(
                "Delete index",
                "number",
                other.type_name(),
            ));
        }
        (StelaVal::Hash(_), other) => {
            return Err(Error::type_error_in(
                "Delete key",
                "text",
                other.type_name(),
            ));
        }
        (other, _) => {
            return Err(Error::type_error_in(
                "Delete",
                "array or hash",
                other.type_name(),
            ));
        }
    }
    ctx.push(container);
    Ok(())
}

/// `RangeArray(from, to)` - inclusive numeric range with automatic step ±1.
pub(crate) fn builtin_range_array(ctx: &mut Context) -> Result<()> {
    let to = ctx.pop_number()?;
    let from = ctx.pop_number()?;
    let step = if from <= to { 1.0 } else { -1.0 };
    let mut items = Vec::new();
    let mut current = from;
    while (step > 0.0 && current <= to) || (step < 0.0 && current >= to) {
        items.push(StelaVal::Number(current));
        current += step;
    }
    ctx.push(StelaVal::array(items));
    Ok(())
}

/// `Flatten(array)` - recursively flatten nested arrays into a new array.
pub(crate) fn builtin_flatten(ctx: &mut Context) -> Result<()> {
    let array = ctx.pop_array()?;
    let mut flat = Vec::new();
    flatten_into(&array.borrow(), &mut flat);
    ctx.push(StelaVal::array(flat));
    Ok(())
}

fn flatten_into(items: &[StelaVal], out: &mut Vec<StelaVal>) {
    for item in items {
        match item {
            StelaVal::Array(inner) => flatten_into(&inner.borrow(), out),
            other => out.push(other.clone()),
        }
    }
}

/// `SortWith(array, comparator)` - sort in place with a script comparator
/// returning a number (<0, 0, >0); pushes the array back.
///
/// Insertion sort, so every comparison can re-enter the engine without
/// holding a borrow on the array.
pub(crate) fn builtin_sort_with(ctx: &mut Context) -> Result<()> {
    let comparator = ctx.pop_func_ref()?;
    let array = ctx.pop_array()?;
    let mut items: Vec<StelaVal> = array.borrow().clone();
    for sorted in 1..items.len() {
        let key = items[sorted].clone();
        let mut at = sorted;
        while at > 0 {
            let ordering = match ctx.call_function_ref(&comparator, &[items[at - 1].clone(), key.clone()])? {
                StelaVal::Number(n) => n,
                other => {
                    return Err(Error::type_error_in(
                        "SortWith comparator result",
                        "number",
                        other.type_name(),
                    ));
                }
            };
            if ordering <= 0.0 {
                break;
            }
            items[at] = items[at - 1].clone();
            at -= 1;
        }
        items[at] = key;
    }
    *array.borrow_mut() = items;
    ctx.push(StelaVal::Array(array));
    Ok(())
}

/// `Slice(target, start, length)` - substring or subarray; `Empty` length
/// slices to the end. Arrays yield a new array.
pub(crate) fn builtin_slice(ctx: &mut Context) -> Result<()> {
    let length = match ctx.pop()? {
        StelaVal::Empty => None,
        StelaVal::Number(n) => Some(n),
        other => {
            return Err(Error::type_error_in(
                "Slice length",
                "number or empty",
                other.type_name(),
            ));
        }
    };
    let start = ctx.pop_number()?;
    let sliced = match ctx.pop()? {
        StelaVal::Text(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, take) = slice_bounds(start, length, chars.len());
            StelaVal::text(chars[from..from + take].iter().collect::<String>())
        }
        StelaVal::Array(items) => {
            let items = items.borrow();
            let (from, take) = slice_bounds(start, length, items.len());
            StelaVal::array(items[from..from + take].to_vec())
        }
        other => {
            return Err(Error::type_error_in(
                "Slice",
                "text or array",
                other.type_name(),
            ));
        }
    };
    ctx.push(sliced);
    Ok(())
}

fn slice_bounds(start: f64, length: Option<f64>, len: usize) -> (usize, usize) {
    let from = (start.max(0.0) as usize).min(len);
    let take = match length {
        None => len - from,
        Some(n) => (n.max(0.0) as usize).min(len - from),
    };
    (from, take)
}

// ============================================================================
// Iteration primitives
// ============================================================================

/// `_iter_create$(target)` - build an iterator over an array, hash, or
/// scalar.
pub(crate) fn builtin_iter_create(ctx: &mut Context) -> Result<()> {
    let target = ctx.pop()?;
    let state = IterState::new(target)?;
    ctx.push(StelaVal::Iter(Rc::new(std::cell::RefCell::new(state))));
    Ok(())
}

/// `_iter_hasnext$(iterator)` - whether elements remain.
pub(crate) fn builtin_iter_hasnext(ctx: &mut Context) -> Result<()> {
    let iter = ctx.pop_iter()?;
    let has_next = iter.borrow().has_next();
    ctx.push(StelaVal::Boolean(has_next));
    Ok(())
}

/// `_iter_next$(iterator)` - yield the next element and advance.
pub(crate) fn builtin_iter_next(ctx: &mut Context) -> Result<()> {
    let iter = ctx.pop_iter()?;
    let item = iter.borrow_mut().next();
    ctx.push(item);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

/// `Format(name, params)` - the literal formatting marker. No actual
/// formatting is performed.
pub(crate) fn builtin_format(ctx: &mut Context) -> Result<()> {
    let params = ctx.pop()?;
    let name = ctx.pop()?;
    ctx.push(StelaVal::text(format!(
        "!== FORMAT: {} {} ==!",
        name.render(),
        params.render()
    )));
    Ok(())
}

/// `Context(name)` - switch the current text output context.
pub(crate) fn builtin_context(ctx: &mut Context) -> Result<()> {
    let name = ctx.pop_text()?;
    ctx.select_output(&name);
    Ok(())
}
