//! Promotion of stack slots to SSA values.
//!
//! A slot qualifies when it is a single scalar allocated in the entry
//! block and every use is a load from it or a store into it. Phis go on
//! the iterated dominance frontier of the storing blocks; a walk of the
//! dominator tree then rewrites loads to the reaching stored value.

use kiln_ir::{BasicBlock, Cfg, Opcode, Type, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use super::replace_and_erase;
use crate::error::Result;
use crate::pass::{Pass, PassResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct PromoteMemoryToRegisterPass;

fn is_promotable(slot: Value<'_>) -> Result<bool> {
    let ty = slot.allocated_type()?;
    if !(ty.is_integer() || ty.is_floating_point() || ty.is_pointer()) {
        return Ok(false);
    }
    if slot.operand(0)?.const_int_zext_value().ok() != Some(1) {
        return Ok(false);
    }
    for edge in slot.uses() {
        let user = edge.user;
        let direct = match user.opcode()? {
            Opcode::Load => user.type_of()? == ty,
            Opcode::Store => edge.operand_index == 1 && user.operand(0)?.type_of()? == ty,
            _ => false,
        };
        if !direct {
            return Ok(false);
        }
    }
    Ok(true)
}

/// One promoted slot and its reaching-definition stack.
struct Slot<'ctx> {
    alloca: Value<'ctx>,
    ty: Type<'ctx>,
    undef: Value<'ctx>,
    stack: Vec<Value<'ctx>>,
}

impl<'ctx> Slot<'ctx> {
    fn current(&self) -> Value<'ctx> {
        self.stack.last().copied().unwrap_or(self.undef)
    }
}

enum Visit {
    Enter(usize),
    /// Pop one reaching definition per listed slot.
    Exit(Vec<usize>),
}

impl Pass for PromoteMemoryToRegisterPass {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let mut slots = Vec::new();
        for instr in function.entry_basic_block()?.instructions()? {
            if instr.opcode()? == Opcode::Alloca && is_promotable(instr)? {
                let ty = instr.allocated_type()?;
                slots.push(Slot {
                    alloca: instr,
                    ty,
                    undef: ty.undef()?,
                    stack: Vec::new(),
                });
            }
        }
        if slots.is_empty() {
            return Ok(PassResult::unchanged());
        }
        let slot_of: FxHashMap<Value<'_>, usize> =
            slots.iter().enumerate().map(|(i, s)| (s.alloca, i)).collect();

        let cfg = Cfg::build(function)?;
        let doms = cfg.dominator_tree();
        let reachable = cfg.reachable();
        let frontiers = doms.frontiers(&cfg);
        let blocks: Vec<BasicBlock<'_>> = (0..cfg.len()).filter_map(|i| cfg.block(i)).collect();

        // Accesses in unreachable blocks never execute.
        for (index, &block) in blocks.iter().enumerate() {
            if reachable[index] {
                continue;
            }
            for instr in block.instructions()? {
                match access(instr, &slot_of)? {
                    Some((Opcode::Load, slot)) => replace_and_erase(instr, slots[slot].undef)?,
                    Some(_) => instr.erase_from_parent()?,
                    None => {}
                }
            }
        }

        let (phi_at, phi_slot) = place_phis(&blocks, &reachable, &frontiers, &slots, &slot_of)?;

        let children = doms.children();
        let mut visits = vec![Visit::Enter(0)];
        while let Some(visit) = visits.pop() {
            let index = match visit {
                Visit::Enter(index) => index,
                Visit::Exit(pushed) => {
                    for slot in pushed {
                        slots[slot].stack.pop();
                    }
                    continue;
                }
            };
            let block = blocks[index];
            let mut pushed = Vec::new();
            for instr in block.instructions()? {
                if let Some(&slot) = phi_slot.get(&instr) {
                    slots[slot].stack.push(instr);
                    pushed.push(slot);
                    continue;
                }
                match access(instr, &slot_of)? {
                    Some((Opcode::Load, slot)) => replace_and_erase(instr, slots[slot].current())?,
                    Some((_, slot)) => {
                        slots[slot].stack.push(instr.operand(0)?);
                        pushed.push(slot);
                        instr.erase_from_parent()?;
                    }
                    None => {}
                }
            }
            for &succ in cfg.successors(index) {
                for (slot, state) in slots.iter().enumerate() {
                    if let Some(&phi) = phi_at.get(&(succ, slot)) {
                        phi.add_incoming(&[(state.current(), block)])?;
                    }
                }
            }
            visits.push(Visit::Exit(pushed));
            if let Some(kids) = children.get(index) {
                visits.extend(kids.iter().rev().map(|&kid| Visit::Enter(kid)));
            }
        }

        // Edges from unreachable predecessors still need an entry.
        for (&(index, slot), &phi) in &phi_at {
            for &pred in cfg.predecessors(index) {
                if !reachable[pred] {
                    phi.add_incoming(&[(slots[slot].undef, blocks[pred])])?;
                }
            }
        }

        for slot in &slots {
            slot.alloca.erase_from_parent()?;
        }
        prune_dead_phis(phi_at.values().copied().collect())?;

        tracing::trace!(function = %function.name()?, promoted = slots.len(), "slots promoted");
        Ok(PassResult::changed(slots.len()))
    }
}

/// The kind of access and the slot, if `instr` loads or stores a
/// promoted slot.
fn access<'ctx>(instr: Value<'ctx>, slot_of: &FxHashMap<Value<'ctx>, usize>) -> Result<Option<(Opcode, usize)>> {
    let opcode = instr.opcode()?;
    let pointer = match opcode {
        Opcode::Load => instr.operand(0)?,
        Opcode::Store => instr.operand(1)?,
        _ => return Ok(None),
    };
    Ok(slot_of.get(&pointer).map(|&slot| (opcode, slot)))
}

type PhiPlacement<'ctx> = (FxHashMap<(usize, usize), Value<'ctx>>, FxHashMap<Value<'ctx>, usize>);

/// Insert an empty phi for each slot at the iterated dominance frontier
/// of its storing blocks.
fn place_phis<'ctx>(
    blocks: &[BasicBlock<'ctx>],
    reachable: &[bool],
    frontiers: &[Vec<usize>],
    slots: &[Slot<'ctx>],
    slot_of: &FxHashMap<Value<'ctx>, usize>,
) -> Result<PhiPlacement<'ctx>> {
    let mut stores: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); slots.len()];
    for (index, &block) in blocks.iter().enumerate() {
        if !reachable[index] {
            continue;
        }
        for instr in block.instructions()? {
            if let Some((Opcode::Store, slot)) = access(instr, slot_of)? {
                stores[slot].insert(index);
            }
        }
    }

    let mut phi_at = FxHashMap::default();
    let mut phi_slot = FxHashMap::default();
    let Some(&entry) = blocks.first() else {
        return Ok((phi_at, phi_slot));
    };
    let mut builder = entry.context().create_builder();
    for (slot, state) in slots.iter().enumerate() {
        let name = state.alloca.name()?;
        let mut worklist: Vec<usize> = stores[slot].iter().copied().collect();
        while let Some(index) = worklist.pop() {
            for &frontier in &frontiers[index] {
                if phi_at.contains_key(&(frontier, slot)) {
                    continue;
                }
                let block = blocks[frontier];
                builder.position_in(block, block.first_instruction())?;
                let phi = builder.build_phi(state.ty, &name)?;
                phi_at.insert((frontier, slot), phi);
                phi_slot.insert(phi, slot);
                if !stores[slot].contains(&frontier) {
                    worklist.push(frontier);
                }
            }
        }
    }
    Ok((phi_at, phi_slot))
}

/// Erase inserted phis that nothing but themselves uses.
fn prune_dead_phis(phis: Vec<Value<'_>>) -> Result<()> {
    loop {
        let mut erased = false;
        for &phi in &phis {
            if !phi.is_alive() {
                continue;
            }
            let users = phi.users();
            if users.iter().all(|&user| user == phi) {
                if !users.is_empty() {
                    phi.replace_all_uses_with(phi.type_of()?.undef()?)?;
                }
                phi.erase_from_parent()?;
                erased = true;
            }
        }
        if !erased {
            return Ok(());
        }
    }
}
