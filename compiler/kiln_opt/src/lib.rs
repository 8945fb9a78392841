//! Pass managers and optimization passes for Kiln IR.
//!
//! Two pipeline flavors share one pass library:
//!
//! - [`PassManager`] runs over whole modules. Function passes visit every
//!   definition; module passes edit the symbol table.
//! - [`FunctionPassManager`] runs function passes over single functions of
//!   one module. It must be initialized before use and finalized exactly
//!   once.
//!
//! `add_*_pass` calls append to the pipeline; insertion order is execution
//! order. `run` returns whether anything changed.
//!
//! # Debug Environment Variables
//!
//! - `KILN_DEBUG_PASSES`: print the IR to stderr after every pass that
//!   changed it. Any non-empty value enables this.
//!
//! - `RUST_LOG=kiln_opt=debug`: per-pass timing and change counts.
//!
//! # Example
//!
//! ```
//! use kiln_ir::Context;
//! use kiln_opt::PassManager;
//!
//! let ctx = Context::new();
//! let module = ctx.create_module("demo");
//! let i32_ty = ctx.i32_type();
//! let f = module.add_function("f", ctx.function_type(i32_ty, &[], false)?)?;
//! let mut builder = ctx.create_builder();
//! builder.position_at_end(f.append_basic_block("entry")?)?;
//! let two = i32_ty.const_int(2, false)?;
//! let four = builder.build_add(two, two, "four")?;
//! builder.build_ret(four)?;
//!
//! let mut passes = PassManager::create();
//! passes.add_constant_propagation_pass();
//! assert!(passes.run(&module)?);
//! # Ok::<(), kiln_opt::Error>(())
//! ```

mod error;
mod manager;
mod pass;
mod passes;

pub use error::{Error, ManagerState, Result};
pub use manager::{FunctionPassManager, PassManager};
pub use pass::{Pass, PassResult, PassScope, PassStats};
pub use passes::{
    AggressiveDcePass, CfgSimplificationPass, ConstantMergePass, ConstantPropagationPass,
    DeadStoreEliminationPass, GlobalDcePass, GvnPass, InstructionCombiningPass, InternalizePass,
    PromoteMemoryToRegisterPass, StripDeadPrototypesPass, VerifierPass,
};
