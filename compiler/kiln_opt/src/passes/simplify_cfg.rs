//! Control-flow cleanup.
//!
//! Rounds of four rewrites run until none applies:
//!
//! 1. Branches and switches on constants become unconditional branches.
//! 2. Blocks unreachable from the entry are deleted.
//! 3. Blocks holding only an unconditional branch are bypassed.
//! 4. A block with a single predecessor that falls through to it is
//!    merged into that predecessor.

use kiln_ir::{BasicBlock, Cfg, Opcode, Value};

use super::{erase_all, leading_phis, remove_phi_entries, replace_and_erase};
use crate::error::Result;
use crate::pass::{Pass, PassResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct CfgSimplificationPass;

impl Pass for CfgSimplificationPass {
    fn name(&self) -> &'static str {
        "simplifycfg"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let mut total = 0;
        loop {
            let round = fold_constant_branches(function)?
                + remove_unreachable_blocks(function)?
                + bypass_forwarding_block(function)?
                + merge_into_predecessor(function)?;
            if round == 0 {
                break;
            }
            total += round;
        }
        Ok(PassResult::changed(total))
    }
}

/// Replace `term` with `br dest`.
fn branch_to<'ctx>(term: Value<'ctx>, dest: BasicBlock<'ctx>) -> Result<()> {
    let mut builder = term.context().create_builder();
    builder.position_before(term)?;
    builder.build_br(dest)?;
    term.erase_from_parent()?;
    Ok(())
}

/// The destination a constant-condition terminator always takes.
fn constant_destination<'ctx>(term: Value<'ctx>) -> Result<Option<BasicBlock<'ctx>>> {
    match term.opcode()? {
        Opcode::Br if term.num_operands()? == 3 => {
            let then = term.operand(1)?.as_basic_block()?;
            let otherwise = term.operand(2)?.as_basic_block()?;
            if then == otherwise {
                return Ok(Some(then));
            }
            Ok(term
                .operand(0)?
                .const_int_zext_value()
                .ok()
                .map(|c| if c != 0 { then } else { otherwise }))
        }
        Opcode::Switch => {
            let cond = term.operand(0)?;
            if !cond.is_constant() || cond.const_int_zext_value().is_err() {
                return Ok(None);
            }
            let operands = term.operands()?;
            let mut dest = term.operand(1)?;
            for case in operands[2..].chunks_exact(2) {
                if case[0] == cond {
                    dest = case[1];
                    break;
                }
            }
            Ok(Some(dest.as_basic_block()?))
        }
        _ => Ok(None),
    }
}

fn fold_constant_branches(function: Value<'_>) -> Result<usize> {
    let mut folded = 0;
    for block in function.basic_blocks()? {
        let Some(term) = block.terminator() else {
            continue;
        };
        let Some(dest) = constant_destination(term)? else {
            continue;
        };
        for succ in block.successors() {
            if succ != dest {
                remove_phi_entries(succ, block)?;
            }
        }
        branch_to(term, dest)?;
        folded += 1;
    }
    Ok(folded)
}

fn remove_unreachable_blocks(function: Value<'_>) -> Result<usize> {
    let cfg = Cfg::build(function)?;
    let reachable = cfg.reachable();
    let dead: Vec<BasicBlock<'_>> = (0..cfg.len())
        .filter(|&index| !reachable[index])
        .filter_map(|index| cfg.block(index))
        .collect();
    if dead.is_empty() {
        return Ok(0);
    }

    let mut doomed = Vec::new();
    for &block in &dead {
        for succ in block.successors() {
            if !dead.contains(&succ) {
                remove_phi_entries(succ, block)?;
            }
        }
        doomed.extend(block.instructions()?);
    }
    erase_all(&doomed)?;
    for &block in &dead {
        block.delete()?;
    }
    tracing::trace!(blocks = dead.len(), "unreachable blocks deleted");
    Ok(dead.len())
}

/// Bypass one block that only branches elsewhere. Its target must not
/// start with phis, which would need an entry per bypassed edge.
fn bypass_forwarding_block(function: Value<'_>) -> Result<usize> {
    let entry = function.entry_basic_block()?;
    for block in function.basic_blocks()? {
        if block == entry {
            continue;
        }
        let instrs = block.instructions()?;
        let [term] = instrs.as_slice() else {
            continue;
        };
        if term.opcode()? != Opcode::Br || term.num_operands()? != 1 {
            continue;
        }
        let target = term.operand(0)?.as_basic_block()?;
        if target == block || !leading_phis(target)?.is_empty() {
            continue;
        }
        block.as_value()?.replace_all_uses_with(target.as_value()?)?;
        term.erase_from_parent()?;
        block.delete()?;
        return Ok(1);
    }
    Ok(0)
}

/// Merge one block into its sole predecessor when that predecessor ends
/// in an unconditional branch to it.
fn merge_into_predecessor(function: Value<'_>) -> Result<usize> {
    let entry = function.entry_basic_block()?;
    for block in function.basic_blocks()? {
        if block == entry {
            continue;
        }
        let preds = block.predecessors();
        let &[pred] = preds.as_slice() else {
            continue;
        };
        if pred == block {
            continue;
        }
        let Some(term) = pred.terminator() else {
            continue;
        };
        if term.opcode()? != Opcode::Br || term.num_operands()? != 1 {
            continue;
        }

        for phi in leading_phis(block)? {
            let value = phi.incoming_value(0)?;
            let value = if value == phi { phi.type_of()?.undef()? } else { value };
            replace_and_erase(phi, value)?;
        }
        term.erase_from_parent()?;
        let mut builder = function.context().create_builder();
        builder.position_at_end(pred)?;
        for instr in block.instructions()? {
            instr.remove_from_parent()?;
            builder.insert(instr)?;
        }
        for succ in pred.successors() {
            retarget_phi_entries(succ, block, pred)?;
        }
        block.delete()?;
        return Ok(1);
    }
    Ok(0)
}

/// Phi entries of `block` that name `from` now name `to`.
fn retarget_phi_entries<'ctx>(block: BasicBlock<'ctx>, from: BasicBlock<'ctx>, to: BasicBlock<'ctx>) -> Result<()> {
    for phi in leading_phis(block)? {
        for index in (0..phi.count_incoming()?).rev() {
            if phi.incoming_block(index)? == from {
                let value = phi.remove_incoming(index)?;
                phi.add_incoming(&[(value, to)])?;
            }
        }
    }
    Ok(())
}
