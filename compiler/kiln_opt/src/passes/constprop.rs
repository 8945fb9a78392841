use kiln_ir::Value;
use rustc_hash::FxHashSet;

use super::{instructions, replace_and_erase};
use crate::error::Result;
use crate::pass::{Pass, PassResult};

/// Replaces instructions over constant operands with the constant they
/// compute, following the chain through users.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantPropagationPass;

impl Pass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "constprop"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let mut worklist = instructions(function)?;
        worklist.reverse();
        let mut queued: FxHashSet<Value<'_>> = worklist.iter().copied().collect();
        let mut folded = 0;

        while let Some(instr) = worklist.pop() {
            queued.remove(&instr);
            if !instr.is_alive() {
                continue;
            }
            let Some(constant) = instr.try_fold()? else {
                continue;
            };
            for user in instr.users() {
                if user.is_instruction() && queued.insert(user) {
                    worklist.push(user);
                }
            }
            replace_and_erase(instr, constant)?;
            folded += 1;
        }

        if folded > 0 {
            tracing::trace!(function = %function.name()?, folded, "constants propagated");
        }
        Ok(PassResult::changed(folded))
    }
}
