//! The pass library.
//!
//! Function passes rewrite one body at a time and never touch the CFG
//! snapshot of another function. Module passes edit the symbol table.

mod adce;
mod constant_merge;
mod constprop;
mod dse;
mod global_dce;
mod gvn;
mod instcombine;
mod internalize;
mod mem2reg;
mod simplify_cfg;
mod strip_prototypes;
mod verifier;

pub use adce::AggressiveDcePass;
pub use constant_merge::ConstantMergePass;
pub use constprop::ConstantPropagationPass;
pub use dse::DeadStoreEliminationPass;
pub use global_dce::GlobalDcePass;
pub use gvn::GvnPass;
pub use instcombine::InstructionCombiningPass;
pub use internalize::InternalizePass;
pub use mem2reg::PromoteMemoryToRegisterPass;
pub use simplify_cfg::CfgSimplificationPass;
pub use strip_prototypes::StripDeadPrototypesPass;
pub use verifier::VerifierPass;

use kiln_ir::{BasicBlock, Opcode, Value};

use crate::error::Result;

/// Every instruction of `function` in layout order.
pub(crate) fn instructions<'ctx>(function: Value<'ctx>) -> Result<Vec<Value<'ctx>>> {
    let mut out = Vec::new();
    for block in function.basic_blocks()? {
        out.extend(block.instructions()?);
    }
    Ok(out)
}

/// The phis at the top of `block`.
pub(crate) fn leading_phis<'ctx>(block: BasicBlock<'ctx>) -> Result<Vec<Value<'ctx>>> {
    let mut phis = Vec::new();
    for instr in block.instructions()? {
        if instr.opcode()? != Opcode::Phi {
            break;
        }
        phis.push(instr);
    }
    Ok(phis)
}

/// Redirect the uses of `instr` to `with`, then erase it.
pub(crate) fn replace_and_erase<'ctx>(instr: Value<'ctx>, with: Value<'ctx>) -> Result<()> {
    instr.replace_all_uses_with(with)?;
    instr.erase_from_parent()?;
    Ok(())
}

/// Erase a set of instructions whose results are used only inside the set.
pub(crate) fn erase_all(instrs: &[Value<'_>]) -> Result<()> {
    for &instr in instrs {
        if instr.has_uses() {
            instr.replace_all_uses_with(instr.type_of()?.undef()?)?;
        }
    }
    for &instr in instrs {
        instr.erase_from_parent()?;
    }
    Ok(())
}

/// Unused and free of side effects.
pub(crate) fn is_trivially_dead(instr: Value<'_>) -> Result<bool> {
    Ok(!instr.has_uses() && !instr.opcode()?.has_side_effects())
}

/// Drop the incoming entries of every phi in `block` that name `pred`.
pub(crate) fn remove_phi_entries<'ctx>(block: BasicBlock<'ctx>, pred: BasicBlock<'ctx>) -> Result<()> {
    for phi in leading_phis(block)? {
        for index in (0..phi.count_incoming()?).rev() {
            if phi.incoming_block(index)? == pred {
                phi.remove_incoming(index)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
