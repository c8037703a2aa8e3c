// stela-embed - Host API tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared variables, input, results, conversions, and state events.

use stela_embed::{from_stela, to_stela, Engine, EvaluatorError, Outcome, StateEvent, StelaVal};

#[test]
fn shared_variables_round_trip_through_the_host() {
    let engine = Engine::new();
    let mut vm = engine
        .load(
            ".shared\n\
             counter\n\
             label\n\
             .entry\n\
             load.global 0\n\
             load 1\n\
             add\n\
             store.global 0\n",
        )
        .unwrap();
    vm.set_shared("counter", 41).unwrap();
    vm.set_shared("label", "answer").unwrap();
    vm.run().unwrap();
    let counter: f64 = vm.shared("counter").unwrap();
    assert_eq!(counter, 42.0);
    let label: String = vm.shared("label").unwrap();
    assert_eq!(label, "answer");
}

#[test]
fn unknown_shared_names_fail() {
    let engine = Engine::new();
    let mut vm = engine.load(".shared\nx\n.entry\n").unwrap();
    let err = vm.set_shared("nope", 1).expect_err("unknown shared");
    assert!(matches!(err, EvaluatorError::Value(_)));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn named_results_surface_popped_values() {
    let engine = Engine::new();
    let mut vm = engine
        .load(
            ".entry\n\
             load 1\n\
             load 2\n\
             mk_array 2\n\
             emit.named \"pair\"\n\
             load \"done\"\n\
             emit.named \"status\"\n",
        )
        .unwrap();
    vm.run().unwrap();
    assert_eq!(vm.named_results()["status"], StelaVal::text("done"));
    let pair: Vec<f64> = from_stela(&vm.named_results()["pair"]).unwrap();
    assert_eq!(pair, [1.0, 2.0]);
}

#[test]
fn output_contexts_are_selectable() {
    let engine = Engine::new();
    let mut vm = engine
        .load(
            ".entry\n\
             load \"first\"\n\
             emit\n\
             load \"aside\"\n\
             call.native :Context\n\
             load \"second\"\n\
             emit\n",
        )
        .unwrap();
    vm.run().unwrap();
    assert_eq!(vm.text_results()["default"], ["first"]);
    assert_eq!(vm.text_results()["aside"], ["second"]);
    assert_eq!(vm.default_output(), ["first"]);
}

#[test]
fn set_input_is_stored_on_the_context() {
    let engine = Engine::new();
    let mut vm = engine.load(".entry\n").unwrap();
    vm.set_input(vec![
        ("width".to_string(), 800),
        ("height".to_string(), 600),
    ]);
    assert_eq!(
        vm.context().input().get("width"),
        Some(&StelaVal::Number(800.0))
    );
}

#[test]
fn state_events_trace_the_lifecycle() {
    let engine = Engine::new();
    let mut vm = engine
        .load(
            ".defs\n\
             h.1:\n\
             load #0\n\
             emit\n\
             ret\n\
             .entry\n\
             load \"tick\"\n\
             mk_ref.udf h\n\
             call.native events:SetHandler\n\
             load \"exit\"\n\
             mk_ref.udf h\n\
             call.native events:SetHandler\n\
             call.native events:StartLoop\n",
        )
        .unwrap();
    assert_eq!(vm.run().unwrap(), Outcome::Suspended);
    let events = vm.drain_events();
    assert!(matches!(events.last(), Some(StateEvent::Suspended)));

    vm.raise_event("tick", 1).unwrap();
    let events = vm.drain_events();
    assert!(matches!(events.first(), Some(StateEvent::Resumed)));
    assert!(matches!(events.last(), Some(StateEvent::Suspended)));

    vm.raise_event("exit", "bye").unwrap();
    let events = vm.drain_events();
    assert!(matches!(events.last(), Some(StateEvent::Ended)));
    assert_eq!(vm.text_results()["default"], ["1", "bye"]);
}

#[test]
fn raise_event_without_a_handler_returns_none() {
    let engine = Engine::new();
    let mut vm = engine.load(".entry\ncall.native events:StartLoop\n").unwrap();
    vm.run().unwrap();
    assert_eq!(vm.raise_event("missing", 1).unwrap(), None);
}

#[test]
fn func_refs_surface_as_their_address() {
    let engine = Engine::new();
    let mut vm = engine
        .load(
            ".shared\n\
             callback\n\
             .defs\n\
             noop.0:\n\
             ret\n\
             .entry\n\
             mk_ref.udf noop\n\
             store.global 0\n",
        )
        .unwrap();
    vm.run().unwrap();
    let address: i64 = vm.shared("callback").unwrap();
    assert_eq!(address, 0);
}

#[test]
fn conversions_round_trip() {
    let val = to_stela(vec![1.0, 2.5]);
    let back: Vec<f64> = from_stela(&val).unwrap();
    assert_eq!(back, [1.0, 2.5]);

    let val = to_stela(Some("text"));
    assert_eq!(val, StelaVal::text("text"));
    let none: Option<String> = from_stela(&StelaVal::Empty).unwrap();
    assert_eq!(none, None);

    let mut map = std::collections::HashMap::new();
    map.insert("k".to_string(), 3);
    let val = to_stela(map);
    let back: std::collections::HashMap<String, f64> = from_stela(&val).unwrap();
    assert_eq!(back["k"], 3.0);

    assert!(from_stela::<bool>(&StelaVal::number(1.0)).is_err());
}

#[test]
fn runtime_errors_invalidate_the_vm() {
    let engine = Engine::new();
    let mut vm = engine.load(".entry\nunload\n").unwrap();
    let err = vm.run().expect_err("stack underflow");
    assert!(matches!(err, EvaluatorError::Runtime(_)));
    assert!(err.to_string().contains("unload"));
}

#[test]
fn custom_modules_resolve_at_load_time() {
    use stela_core::{Context, Module, Result, StelaVal as Val};

    fn shout(ctx: &mut Context) -> Result<()> {
        let text = ctx.pop_text()?;
        ctx.push(Val::text(text.to_uppercase()));
        Ok(())
    }

    let mut engine = Engine::new();
    let mut module = Module::new("host");
    module.define_native("Shout", 1, shout);
    engine.registry_mut().insert(module);

    let mut vm = engine
        .load(".entry\nload \"hey\"\ncall.native host:Shout\nemit\n")
        .unwrap();
    vm.run().unwrap();
    assert_eq!(vm.text_results()["default"], ["HEY"]);
}
