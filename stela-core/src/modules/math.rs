// stela-core - Mathematical native functions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `math` module: Abs, Int, Fract, Sqrt, Pow, Sin, Cos, Tan, Rand,
//! Round, and the PI/E constants.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::Context;
use crate::error::Result;
use crate::value::StelaVal;

use super::Module;

pub(super) fn module() -> Module {
    let mut m = Module::new("math");

    m.define_const("PI", StelaVal::Number(std::f64::consts::PI));
    m.define_const("E", StelaVal::Number(std::f64::consts::E));

    m.define_native("Abs", 1, builtin_abs);
    m.define_native("Int", 1, builtin_int);
    m.define_native("Fract", 1, builtin_fract);
    m.define_native("Sqrt", 1, builtin_sqrt);
    m.define_native("Pow", 2, builtin_pow);
    m.define_native("Sin", 1, builtin_sin);
    m.define_native("Cos", 1, builtin_cos);
    m.define_native("Tan", 1, builtin_tan);
    m.define_native("Rand", 0, builtin_rand);
    m.define_native("Round", 2, builtin_round);

    m
}

fn unary(ctx: &mut Context, op: fn(f64) -> f64) -> Result<()> {
    let n = ctx.pop_number()?;
    ctx.push(StelaVal::Number(op(n)));
    Ok(())
}

/// `Abs(n)` - absolute value.
pub(crate) fn builtin_abs(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::abs)
}

/// `Int(n)` - floor.
pub(crate) fn builtin_int(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::floor)
}

/// `Fract(n)` - fractional part.
pub(crate) fn builtin_fract(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::fract)
}

/// `Sqrt(n)` - square root.
pub(crate) fn builtin_sqrt(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::sqrt)
}

/// `Pow(base, exp)` - raise base to the power exp.
pub(crate) fn builtin_pow(ctx: &mut Context) -> Result<()> {
    let exp = ctx.pop_number()?;
    let base = ctx.pop_number()?;
    ctx.push(StelaVal::Number(base.powf(exp)));
    Ok(())
}

/// `Sin(x)` - sine of x (radians).
pub(crate) fn builtin_sin(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::sin)
}

/// `Cos(x)` - cosine of x (radians).
pub(crate) fn builtin_cos(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::cos)
}

/// `Tan(x)` - tangent of x (radians).
pub(crate) fn builtin_tan(ctx: &mut Context) -> Result<()> {
    unary(ctx, f64::tan)
}

// ============================================================================
// Random Number Generation
// ============================================================================

// LCG constants (same as used in glibc)
const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;

thread_local! {
    /// Persistent RNG state, seeded lazily from system time.
    static RNG_STATE: Cell<u64> = const { Cell::new(0) };
    static RNG_SEEDED: Cell<bool> = const { Cell::new(false) };
}

fn next_random() -> u64 {
    RNG_SEEDED.with(|seeded| {
        if !seeded.get() {
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x9E3779B97F4A7C15);
            RNG_STATE.with(|state| state.set(seed | 1));
            seeded.set(true);
        }
    });
    RNG_STATE.with(|state| {
        let next = state
            .get()
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        state.set(next);
        next
    })
}

/// `Rand()` - a uniform number in [0, 1).
pub(crate) fn builtin_rand(ctx: &mut Context) -> Result<()> {
    // Use the top 53 bits for a full-precision float in [0, 1)
    let n = (next_random() >> 11) as f64 / (1u64 << 53) as f64;
    ctx.push(StelaVal::Number(n));
    Ok(())
}

/// `Round(value, digits)` - round to a number of decimal digits.
pub(crate) fn builtin_round(ctx: &mut Context) -> Result<()> {
    let digits = ctx.pop_number()?;
    let value = ctx.pop_number()?;
    let factor = 10f64.powi(digits as i32);
    ctx.push(StelaVal::Number((value * factor).round() / factor));
    Ok(())
}
