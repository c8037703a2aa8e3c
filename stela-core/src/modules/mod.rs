// stela-core - Native module registry
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Named bundles of constants and native callables.
//!
//! A [`ModuleRegistry`] resolves `module:name` selectors during load, for
//! `load.const` and `call.native`. It is a plain value owned by the host
//! (usually the embedding engine), not process-global state; registries have
//! no runtime role once a program is linked.

pub mod builtin;
pub mod events;
pub mod math;

use indexmap::IndexMap;

use crate::context::NativeFn;
use crate::value::StelaVal;

/// A native function entry. Arity is informational (for listings); it is
/// not checked at runtime.
#[derive(Debug, Clone, Copy)]
pub struct ModuleFunc {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn,
}

/// A named bundle of constants and native functions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: &'static str,
    constants: IndexMap<&'static str, StelaVal>,
    functions: IndexMap<&'static str, ModuleFunc>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: &'static str) -> Self {
        Module {
            name,
            constants: IndexMap::new(),
            functions: IndexMap::new(),
        }
    }

    /// The module's registered name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a constant.
    pub fn define_const(&mut self, name: &'static str, value: StelaVal) {
        self.constants.insert(name, value);
    }

    /// Register a native function.
    pub fn define_native(&mut self, name: &'static str, arity: usize, func: NativeFn) {
        self.functions.insert(name, ModuleFunc { name, arity, func });
    }

    /// Look up a constant.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&StelaVal> {
        self.constants.get(name)
    }

    /// Look up a function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&ModuleFunc> {
        self.functions.get(name)
    }

    /// Iterate functions in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &ModuleFunc> {
        self.functions.values()
    }
}

/// Registry of native modules, resolved against at load time.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<&'static str, Module>,
}

impl ModuleRegistry {
    /// Name the empty module selector resolves to.
    pub const DEFAULT_MODULE: &'static str = "$builtin";

    /// Create an empty registry.
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Create a registry with the standard `$builtin`, `math`, and `events`
    /// modules.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = ModuleRegistry::new();
        registry.insert(builtin::module());
        registry.insert(math::module());
        registry.insert(events::module());
        registry
    }

    /// Register a module, replacing any module of the same name.
    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.name(), module);
    }

    /// Look up a module; the empty selector maps to
    /// [`Self::DEFAULT_MODULE`].
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        let name = if name.is_empty() {
            Self::DEFAULT_MODULE
        } else {
            name
        };
        self.modules.get(name)
    }

    /// Resolve a `(module, name)` function selector.
    #[must_use]
    pub fn resolve_function(&self, module: &str, name: &str) -> Option<&ModuleFunc> {
        self.module(module)?.function(name)
    }

    /// Resolve a `(module, name)` constant selector.
    #[must_use]
    pub fn resolve_constant(&self, module: &str, name: &str) -> Option<&StelaVal> {
        self.module(module)?.constant(name)
    }
}
