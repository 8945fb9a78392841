//! Execution engine for Kiln modules.
//!
//! An [`ExecutionEngine`] takes ownership of one or more [`kiln_ir::Module`]s,
//! lowers functions on first call into a slot-addressed form and runs them
//! against a flat, bounds-checked [`Memory`]. Arguments and results cross the
//! host boundary as [`GenericValue`]s.
//!
//! # Debug Environment Variables
//!
//! - `KILN_DEBUG_IR`: print module IR to stderr when a module joins an
//!   engine. Any non-empty value enables this.
//!   Example: `KILN_DEBUG_IR=1 cargo test -p kiln_jit`
//!
//! - `RUST_LOG=kiln_jit=debug`: engine lifecycle, module transfers and
//!   lazy compilation.
//!
//! - `RUST_LOG=kiln_jit=trace`: additionally every call and trap.
//!
//! # Example
//!
//! ```
//! use kiln_ir::Context;
//! use kiln_jit::{ExecutionEngine, GenericValue};
//!
//! let ctx = Context::new();
//! let module = ctx.create_module("sum");
//! let i32_ty = ctx.i32_type();
//! let fn_ty = ctx.function_type(i32_ty, &[i32_ty, i32_ty], false)?;
//! let sum = module.add_function("sum", fn_ty)?;
//! let entry = sum.append_basic_block("entry")?;
//! let mut builder = ctx.create_builder();
//! builder.position_at_end(entry)?;
//! let total = builder.build_add(sum.param(0)?, sum.param(1)?, "total")?;
//! builder.build_ret(total)?;
//!
//! let mut engine = ExecutionEngine::create_interpreter_for_module(module)
//!     .map_err(|err| err.into_error())?;
//! let result = engine.run_function(
//!     sum,
//!     &[GenericValue::of_int(i32_ty, 2, false)?, GenericValue::of_int(i32_ty, 40, false)?],
//! )?;
//! assert_eq!(result.to_int(false)?, 42);
//! # Ok::<(), kiln_jit::Error>(())
//! ```

mod engine;
mod error;
mod generic_value;
mod memory;
pub mod target;

pub use engine::{EngineKind, EngineOptions, ExecutionEngine, HostFunction, RejectedModule};
pub use error::{Error, Result, Trap};
pub use generic_value::GenericValue;
pub use memory::{Memory, RegionKind};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Installs a subscriber only when
/// `RUST_LOG` is set, e.g. `RUST_LOG=kiln_jit=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
