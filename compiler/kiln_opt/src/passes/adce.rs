use kiln_ir::Value;
use rustc_hash::FxHashSet;

use super::{erase_all, instructions};
use crate::error::Result;
use crate::pass::{Pass, PassResult};

/// Assumes every instruction dead until a side-effecting instruction needs
/// it. Unlike use-count based cleanup this also removes dead cycles, such
/// as a loop counter nobody reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct AggressiveDcePass;

impl Pass for AggressiveDcePass {
    fn name(&self) -> &'static str {
        "adce"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let all = instructions(function)?;
        let mut live: FxHashSet<Value<'_>> = FxHashSet::default();
        let mut worklist = Vec::new();
        for &instr in &all {
            if instr.opcode()?.has_side_effects() {
                live.insert(instr);
                worklist.push(instr);
            }
        }
        while let Some(instr) = worklist.pop() {
            for operand in instr.operands()? {
                if operand.is_instruction() && live.insert(operand) {
                    worklist.push(operand);
                }
            }
        }

        let dead: Vec<Value<'_>> = all.into_iter().filter(|i| !live.contains(i)).collect();
        erase_all(&dead)?;
        Ok(PassResult::changed(dead.len()))
    }
}
