use kiln_ir::{Opcode, Value};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::pass::{Pass, PassResult};

/// Removes stores that are overwritten before anything can read them, and
/// stores into stack slots that are never read at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeadStoreEliminationPass;

impl Pass for DeadStoreEliminationPass {
    fn name(&self) -> &'static str {
        "dse"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let mut removed = 0;
        for block in function.basic_blocks()? {
            removed += overwritten_stores(block.instructions()?)?;
        }
        for instr in function.entry_basic_block()?.instructions()? {
            if instr.opcode()? == Opcode::Alloca {
                removed += write_only_slot(instr)?;
            }
        }
        Ok(PassResult::changed(removed))
    }
}

/// Within one block, a store is dead when a later store of the same type
/// to the same pointer follows with no possible read in between.
fn overwritten_stores(instrs: Vec<Value<'_>>) -> Result<usize> {
    let mut pending: FxHashMap<Value<'_>, Value<'_>> = FxHashMap::default();
    let mut removed = 0;
    for instr in instrs {
        match instr.opcode()? {
            Opcode::Store => {
                let pointer = instr.operand(1)?;
                if let Some(earlier) = pending.insert(pointer, instr) {
                    if earlier.operand(0)?.type_of()? == instr.operand(0)?.type_of()? {
                        earlier.erase_from_parent()?;
                        removed += 1;
                    }
                }
            }
            Opcode::Load | Opcode::Call | Opcode::Invoke | Opcode::VAArg => pending.clear(),
            _ => {}
        }
    }
    Ok(removed)
}

/// Erase every store into `slot` when the slot is only ever stored to.
fn write_only_slot(slot: Value<'_>) -> Result<usize> {
    let mut stores = Vec::new();
    for edge in slot.uses() {
        if edge.operand_index != 1 || edge.user.opcode()? != Opcode::Store {
            return Ok(0);
        }
        stores.push(edge.user);
    }
    for &store in &stores {
        store.erase_from_parent()?;
    }
    if !stores.is_empty() {
        slot.erase_from_parent()?;
    }
    Ok(stores.len())
}
