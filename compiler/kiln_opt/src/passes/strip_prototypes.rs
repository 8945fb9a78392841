use kiln_ir::ModuleRef;

use crate::error::Result;
use crate::pass::{Pass, PassResult, PassScope};

/// Deletes function declarations nothing calls or references.
#[derive(Clone, Copy, Debug, Default)]
pub struct StripDeadPrototypesPass;

impl Pass for StripDeadPrototypesPass {
    fn name(&self) -> &'static str {
        "strip-dead-prototypes"
    }

    fn scope(&self) -> PassScope {
        PassScope::Module
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        let mut stripped = 0;
        for function in module.functions()? {
            if function.is_declaration()? && !function.has_uses() {
                tracing::trace!(function = %function.name()?, "prototype stripped");
                function.delete_function()?;
                stripped += 1;
            }
        }
        Ok(PassResult::changed(stripped))
    }
}
