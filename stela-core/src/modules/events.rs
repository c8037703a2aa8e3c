// stela-core - Event-binding native functions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The `events` module: handler registration and the event loop entry.
//!
//! The handler table lives on the [`Context`], keyed by event name; this
//! module only registers into it. `StartLoop` suspends the VM so the host
//! can deliver events; `ExitLoop` is a no-op placeholder kept for program
//! compatibility - raising the terminal `"exit"` event is what ends a loop.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::StelaVal;

use super::Module;

/// Name of the conventional start event.
pub const START_EVENT: &str = "start";

/// Name of the terminal event; its handler's return resumes execution
/// instead of re-suspending.
pub const END_EVENT: &str = "exit";

pub(super) fn module() -> Module {
    let mut m = Module::new("events");

    m.define_const("Start", StelaVal::text(START_EVENT));
    m.define_const("End", StelaVal::text(END_EVENT));

    m.define_native("SetHandler", 2, builtin_set_handler);
    m.define_native("MapHandlers", 1, builtin_map_handlers);
    m.define_native("StartLoop", 0, builtin_start_loop);
    m.define_native("ExitLoop", 0, builtin_exit_loop);

    m
}

/// `SetHandler(name, ref)` - register a script handler for an event name.
pub(crate) fn builtin_set_handler(ctx: &mut Context) -> Result<()> {
    let handler = ctx.pop_func_ref()?;
    let name = ctx.pop_text()?;
    ctx.set_event_handler(name.to_string(), handler);
    Ok(())
}

/// `MapHandlers(hash)` - register every function-reference entry of the
/// hash as a handler, keyed by its entry name.
pub(crate) fn builtin_map_handlers(ctx: &mut Context) -> Result<()> {
    let hash = ctx.pop_hash()?;
    let handlers: Vec<(String, StelaVal)> = hash
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (name, value) in handlers {
        match value {
            StelaVal::FuncRef(handler) => ctx.set_event_handler(name, handler),
            other => {
                return Err(Error::type_error_in(
                    "MapHandlers entry",
                    "funcref",
                    other.type_name(),
                ));
            }
        }
    }
    Ok(())
}

/// `StartLoop()` - suspend the VM, handing control to the event-loop
/// driver.
pub(crate) fn builtin_start_loop(ctx: &mut Context) -> Result<()> {
    ctx.suspend();
    Ok(())
}

/// `ExitLoop()` - placeholder; has no effect.
pub(crate) fn builtin_exit_loop(_ctx: &mut Context) -> Result<()> {
    Ok(())
}
