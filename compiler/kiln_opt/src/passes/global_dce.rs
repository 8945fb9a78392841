//! Removal of unreachable internal globals.
//!
//! Globals visible outside the module, and every alias, are roots. The
//! bodies of live functions and the initializers of live variables mark
//! what they mention. Internal functions and variables never marked are
//! deleted, provided every remaining reference comes from something else
//! being deleted. References held by constant expressions keep a global.

use kiln_ir::{GlobalKind, ModuleRef, Value, ValueKind};
use rustc_hash::FxHashSet;

use super::instructions;
use crate::error::Result;
use crate::pass::{Pass, PassResult, PassScope};

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalDcePass;

struct Marker<'ctx> {
    live: FxHashSet<Value<'ctx>>,
    seen_constants: FxHashSet<Value<'ctx>>,
    worklist: Vec<Value<'ctx>>,
}

impl<'ctx> Marker<'ctx> {
    fn mark(&mut self, global: Value<'ctx>) {
        if self.live.insert(global) {
            self.worklist.push(global);
        }
    }

    /// Mark the globals `value` mentions, looking through constants.
    fn visit(&mut self, value: Value<'ctx>) -> Result<()> {
        match value.kind()? {
            ValueKind::Global(_) => self.mark(value),
            ValueKind::Constant(_) if self.seen_constants.insert(value) => {
                for operand in value.operands()? {
                    self.visit(operand)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        while let Some(global) = self.worklist.pop() {
            let referenced = if global.is_function() {
                let mut operands = Vec::new();
                for instr in instructions(global)? {
                    operands.extend(instr.operands()?);
                }
                operands
            } else {
                global.operands()?
            };
            for operand in referenced {
                self.visit(operand)?;
            }
        }
        Ok(())
    }
}

impl Pass for GlobalDcePass {
    fn name(&self) -> &'static str {
        "globaldce"
    }

    fn scope(&self) -> PassScope {
        PassScope::Module
    }

    fn run_on_module(&self, module: ModuleRef<'_>) -> Result<PassResult> {
        let functions = module.functions()?;
        let variables = module.globals()?;
        let mut marker = Marker {
            live: FxHashSet::default(),
            seen_constants: FxHashSet::default(),
            worklist: Vec::new(),
        };
        for &global in functions.iter().chain(&variables) {
            if !global.linkage()?.is_local() {
                marker.mark(global);
            }
        }
        for alias in module.aliases()? {
            marker.mark(alias);
        }
        marker.run()?;

        let mut doomed: FxHashSet<Value<'_>> = functions
            .iter()
            .chain(&variables)
            .copied()
            .filter(|g| !marker.live.contains(g))
            .collect();
        // Keep anything still referenced from outside the doomed set.
        loop {
            let mut kept = Vec::new();
            for &global in &doomed {
                if !only_referenced_by(global, &doomed)? {
                    kept.push(global);
                }
            }
            if kept.is_empty() {
                break;
            }
            for global in kept {
                doomed.remove(&global);
            }
        }

        for &global in &doomed {
            match global.kind()? {
                ValueKind::Global(GlobalKind::Function) if !global.is_declaration()? => {
                    global.delete_function_body()?;
                }
                ValueKind::Global(GlobalKind::Variable) => global.set_initializer(None)?,
                _ => {}
            }
        }
        for &global in &doomed {
            if global.is_function() {
                global.delete_function()?;
            } else {
                global.delete_global()?;
            }
        }
        if !doomed.is_empty() {
            tracing::debug!(module = %module.name()?, removed = doomed.len(), "dead globals removed");
        }
        Ok(PassResult::changed(doomed.len()))
    }
}

/// Every user of `global` is an instruction in a doomed function or a
/// doomed variable's initializer.
fn only_referenced_by<'ctx>(global: Value<'ctx>, doomed: &FxHashSet<Value<'ctx>>) -> Result<bool> {
    for user in global.users() {
        let owner = if user.is_instruction() {
            user.instruction_parent()?.and_then(|block| block.parent().ok().flatten())
        } else if matches!(user.kind()?, ValueKind::Global(_)) {
            Some(user)
        } else {
            None
        };
        if !owner.is_some_and(|owner| doomed.contains(&owner)) {
            return Ok(false);
        }
    }
    Ok(true)
}
