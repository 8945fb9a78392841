use kiln_ir::{Linkage, ModuleRef};

use crate::error::Result;
use crate::pass::{Pass, PassResult, PassScope};

/// Gives every externally visible definition internal linkage, optionally
/// sparing `main`, so later passes may treat the module as closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct InternalizePass {
    all_but_main: bool,
}

impl InternalizePass {
    pub fn new(all_but_main: bool) -> Self {
        InternalizePass { all_but_main }
    }
}

impl Pass for InternalizePass {
    fn name(&self) -> &'static str {
        "internalize"
    }

    fn scope(&self) -> PassScope {
        PassScope::Module
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        let mut internalized = 0;
        for global in module.functions()?.into_iter().chain(module.globals()?) {
            if global.is_declaration()? || global.linkage()? != Linkage::External {
                continue;
            }
            if self.all_but_main && global.name()? == "main" {
                continue;
            }
            global.set_linkage(Linkage::Internal)?;
            internalized += 1;
        }
        Ok(PassResult::changed(internalized))
    }
}
