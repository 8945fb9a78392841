//! The pass interface shared by both pipeline flavors.

use std::time::Duration;

use kiln_ir::{ModuleRef, Value};

use crate::error::Result;

/// What a pass transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassScope {
    /// One function body at a time; also runs on every definition of a module.
    Function,
    /// The module's global symbol table; only whole-module pipelines accept it.
    Module,
}

/// Outcome of running one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassResult {
    pub changed: bool,
    pub stats: PassStats,
}

impl PassResult {
    pub fn unchanged() -> Self {
        PassResult::default()
    }

    pub fn changed(items_transformed: usize) -> Self {
        PassResult {
            changed: items_transformed > 0,
            stats: PassStats {
                duration: Duration::ZERO,
                items_transformed,
            },
        }
    }

    /// Combine the results of two runs.
    #[must_use]
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            stats: PassStats {
                duration: self.stats.duration + other.stats.duration,
                items_transformed: self.stats.items_transformed + other.stats.items_transformed,
            },
        }
    }
}

/// Statistics collected during a pass run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub duration: Duration,
    /// Instructions, blocks or globals rewritten or removed.
    pub items_transformed: usize,
}

/// A transformation or analysis over Kiln IR.
pub trait Pass {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    fn scope(&self) -> PassScope {
        PassScope::Function
    }

    /// Run on a single function definition.
    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let _ = function;
        Ok(PassResult::unchanged())
    }

    /// Run on a whole module. Function passes visit every definition.
    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        let mut result = PassResult::unchanged();
        for function in module.functions()? {
            if !function.is_declaration()? {
                result = result.merge(self.run_on_function(function)?);
            }
        }
        Ok(result)
    }
}

impl<T: Pass + ?Sized> Pass for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn scope(&self) -> PassScope {
        (**self).scope()
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        (**self).run_on_function(function)
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        (**self).run_on_module(module)
    }
}
