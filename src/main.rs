// stela - Command-line runner for the Stela VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::process;

use stela_embed::Engine;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();

    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("Stela v{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if args.len() != 2 {
        eprintln!("Usage: stela <file.sasm>");
        process::exit(2);
    }

    let path = &args[1];
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot read {}: {}", path, e);
            process::exit(1);
        }
    };

    let engine = Engine::new();
    let mut vm = match engine.load(&source) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = vm.run() {
        eprintln!("{}", e);
        process::exit(1);
    }

    for line in vm.default_output() {
        println!("{}", line);
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
