//! Whole-module and per-function pipelines.
//!
//! Both managers keep an ordered list of passes and run them in insertion
//! order. A run reports whether any pass changed the IR; that is an
//! outcome, not an error.

use std::time::Instant;

use kiln_ir::{ModuleRef, Value};

use crate::error::{Error, ManagerState, Result};
use crate::pass::{Pass, PassResult, PassScope};
use crate::passes::{
    AggressiveDcePass, CfgSimplificationPass, ConstantMergePass, ConstantPropagationPass,
    DeadStoreEliminationPass, GlobalDcePass, GvnPass, InstructionCombiningPass, InternalizePass,
    PromoteMemoryToRegisterPass, StripDeadPrototypesPass, VerifierPass,
};

/// Print IR after every pass that changed it when `KILN_DEBUG_PASSES` is set.
fn dump_after(pass: &str, text: impl FnOnce() -> kiln_ir::Result<String>) {
    if std::env::var("KILN_DEBUG_PASSES").is_ok_and(|v| !v.is_empty()) {
        eprintln!("=== After {pass} ===");
        match text() {
            Ok(ir) => eprintln!("{ir}"),
            Err(err) => eprintln!("<unprintable: {err}>"),
        }
        eprintln!("================");
    }
}

/// Time `run` and log the outcome of one pass.
fn timed(pass: &dyn Pass, run: impl FnOnce() -> Result<PassResult>) -> Result<PassResult> {
    let start = Instant::now();
    let mut result = run()?;
    result.stats.duration = start.elapsed();
    tracing::debug!(
        pass = pass.name(),
        changed = result.changed,
        items = result.stats.items_transformed,
        duration = ?result.stats.duration,
        "pass finished"
    );
    Ok(result)
}

macro_rules! pipeline_builders {
    ($($manager:tt)*) => {
        impl $($manager)* {
            /// Append any pass to the pipeline.
            pub fn add<P: Pass + 'static>(&mut self, pass: P) {
                self.passes.push(Box::new(pass));
            }

            pub fn add_verifier_pass(&mut self) {
                self.add(VerifierPass);
            }

            pub fn add_constant_propagation_pass(&mut self) {
                self.add(ConstantPropagationPass);
            }

            pub fn add_instruction_combining_pass(&mut self) {
                self.add(InstructionCombiningPass);
            }

            pub fn add_aggressive_dce_pass(&mut self) {
                self.add(AggressiveDcePass);
            }

            pub fn add_dead_store_elimination_pass(&mut self) {
                self.add(DeadStoreEliminationPass);
            }

            pub fn add_gvn_pass(&mut self) {
                self.add(GvnPass);
            }

            pub fn add_cfg_simplification_pass(&mut self) {
                self.add(CfgSimplificationPass);
            }

            pub fn add_promote_memory_to_register_pass(&mut self) {
                self.add(PromoteMemoryToRegisterPass);
            }

            pub fn add_global_dce_pass(&mut self) {
                self.add(GlobalDcePass);
            }

            pub fn add_strip_dead_prototypes_pass(&mut self) {
                self.add(StripDeadPrototypesPass);
            }

            pub fn add_constant_merge_pass(&mut self) {
                self.add(ConstantMergePass);
            }

            /// Give every external definition internal linkage, keeping
            /// `main` visible when `all_but_main` is set.
            pub fn add_internalize_pass(&mut self, all_but_main: bool) {
                self.add(InternalizePass::new(all_but_main));
            }

            pub fn len(&self) -> usize {
                self.passes.len()
            }

            pub fn is_empty(&self) -> bool {
                self.passes.is_empty()
            }

            /// Pass names in execution order.
            pub fn pass_names(&self) -> Vec<&'static str> {
                self.passes.iter().map(|p| p.name()).collect()
            }
        }
    };
}

/// Runs passes over whole modules.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

pipeline_builders!(PassManager);

impl Default for PassManager {
    fn default() -> Self {
        Self::create()
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("passes", &self.pass_names())
            .finish()
    }
}

impl PassManager {
    pub fn create() -> Self {
        PassManager { passes: Vec::new() }
    }

    /// Run every pass over `module` in order. Returns whether any pass
    /// changed it.
    pub fn run(&self, module: &ModuleRef<'_>) -> Result<bool> {
        let module = *module;
        let _span = tracing::debug_span!("module_passes", module = %module.name()?).entered();
        let mut changed = false;
        for pass in &self.passes {
            let result = timed(pass.as_ref(), || pass.run_on_module(module))?;
            if result.changed {
                changed = true;
                dump_after(pass.name(), || module.print_to_string());
            }
        }
        Ok(changed)
    }
}

/// Runs function passes over the functions of one module.
///
/// Lifecycle: [`initialize`](Self::initialize) before any
/// [`run`](Self::run), then [`finalize`](Self::finalize) exactly once.
pub struct FunctionPassManager<'ctx> {
    module: ModuleRef<'ctx>,
    state: ManagerState,
    passes: Vec<Box<dyn Pass>>,
}

pipeline_builders!(FunctionPassManager<'_>);

impl std::fmt::Debug for FunctionPassManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionPassManager")
            .field("module", &self.module.name().unwrap_or_default())
            .field("state", &self.state)
            .field("passes", &self.pass_names())
            .finish()
    }
}

impl<'ctx> FunctionPassManager<'ctx> {
    pub fn create_for_module(module: &ModuleRef<'ctx>) -> Self {
        FunctionPassManager {
            module: *module,
            state: ManagerState::Created,
            passes: Vec::new(),
        }
    }

    pub fn module(&self) -> ModuleRef<'ctx> {
        self.module
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Prepare the pipeline. Fails if it holds a module-only pass.
    pub fn initialize(&mut self) -> Result<bool> {
        match self.state {
            ManagerState::Created => {}
            ManagerState::Finalized => return Err(Error::UseAfterDispose),
            state @ ManagerState::Initialized => {
                return Err(Error::InvalidPassManagerState {
                    operation: "initialize",
                    state,
                })
            }
        }
        if let Some(pass) = self.passes.iter().find(|p| p.scope() == PassScope::Module) {
            return Err(Error::ModuleOnlyPass { pass: pass.name() });
        }
        self.state = ManagerState::Initialized;
        tracing::debug!(passes = self.passes.len(), "function pass manager initialized");
        Ok(false)
    }

    /// Run every pass over `function`. Returns whether any pass changed it.
    pub fn run(&self, function: Value<'ctx>) -> Result<bool> {
        self.ensure_running("run")?;
        if function.global_parent()? != self.module {
            return Err(Error::ForeignFunction {
                function: function.name()?,
            });
        }
        if function.is_declaration()? {
            return Ok(false);
        }
        let _span = tracing::debug_span!("function_passes", function = %function.name()?).entered();
        let mut changed = false;
        for pass in &self.passes {
            let result = timed(pass.as_ref(), || pass.run_on_function(function))?;
            if result.changed {
                changed = true;
                dump_after(pass.name(), || function.print_to_string());
            }
        }
        Ok(changed)
    }

    /// End the pipeline's lifetime. Allowed exactly once.
    pub fn finalize(&mut self) -> Result<bool> {
        self.ensure_running("finalize")?;
        self.state = ManagerState::Finalized;
        tracing::debug!("function pass manager finalized");
        Ok(false)
    }

    /// Release the manager, finalizing it first if needed.
    pub fn dispose(mut self) -> Result<()> {
        if self.state == ManagerState::Initialized {
            self.finalize()?;
        }
        self.state = ManagerState::Finalized;
        Ok(())
    }

    fn ensure_running(&self, operation: &'static str) -> Result<()> {
        match self.state {
            ManagerState::Initialized => Ok(()),
            ManagerState::Finalized => Err(Error::UseAfterDispose),
            state @ ManagerState::Created => Err(Error::InvalidPassManagerState { operation, state }),
        }
    }
}

impl Drop for FunctionPassManager<'_> {
    fn drop(&mut self) {
        if self.state == ManagerState::Initialized {
            tracing::warn!("function pass manager dropped without finalize");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
