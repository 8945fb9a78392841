use kiln_ir::{ModuleRef, Value};

use crate::error::Result;
use crate::pass::{Pass, PassResult};

/// Fails the pipeline with a verification error on malformed IR.
#[derive(Clone, Copy, Debug, Default)]
pub struct VerifierPass;

impl Pass for VerifierPass {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        function.verify_function()?;
        Ok(PassResult::unchanged())
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        module.verify()?;
        Ok(PassResult::unchanged())
    }
}
