//! Basic blocks: ordered instruction containers inside a function.
//!
//! A block is owned by at most one function. Detached blocks (created by
//! [`BasicBlock::remove_from_parent`]) keep their instructions and can be
//! moved back with [`BasicBlock::move_before`]/[`BasicBlock::move_after`].
//!
//! Every block carries a label value of type `label`; branches, switches
//! and invokes name their destinations through it, which is also how
//! [`BasicBlock::predecessors`] finds incoming edges.

use std::fmt;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::{BlockId, ValueId};
use crate::opcode::Opcode;
use crate::store::{BlockData, Payload, Store};
use crate::types::table::TypeTable;
use crate::value::Value;

/// Observing handle to a basic block.
#[derive(Clone, Copy)]
pub struct BasicBlock<'ctx> {
    ctx: &'ctx Context,
    id: BlockId,
}

impl PartialEq for BasicBlock<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.id() == other.ctx.id() && self.id == other.id
    }
}

impl Eq for BasicBlock<'_> {}

impl Hash for BasicBlock<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ctx.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for BasicBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or_else(|_| "<disposed>".to_owned());
        f.debug_tuple("BasicBlock").field(&name).finish()
    }
}

// ── Store operations ────────────────────────────────────────────────

impl Store {
    /// Create a detached block with its label value.
    pub(crate) fn new_block(&mut self, name: &str) -> BlockId {
        let label = self.alloc_value(TypeTable::LABEL, name, Payload::Undef, &[]);
        let block = self.blocks.insert(BlockData {
            value: label,
            parent: None,
            instrs: Vec::new(),
        });
        if let Ok(data) = self.value_mut(label) {
            data.payload = Payload::Block(block);
        }
        block
    }

    pub(crate) fn append_block(&mut self, function: ValueId, name: &str) -> Result<BlockId> {
        self.function(function)?;
        let block = self.new_block(name);
        self.attach_block(block, function, None)?;
        Ok(block)
    }

    /// Put a detached block into `function` before `before` (or at the end).
    fn attach_block(&mut self, block: BlockId, function: ValueId, before: Option<BlockId>) -> Result<()> {
        let blocks = &mut self.function_mut(function)?.blocks;
        let pos = match before {
            Some(before) => blocks
                .iter()
                .position(|&b| b == before)
                .ok_or(Error::Disposed)?,
            None => blocks.len(),
        };
        blocks.insert(pos, block);
        self.block_mut(block)?.parent = Some(function);
        Ok(())
    }

    /// Successor blocks named by the terminator of `block`, in operand
    /// order, duplicates included.
    pub(crate) fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 4]> {
        let Some(&last) = self.block(block).ok().and_then(|data| data.instrs.last()) else {
            return SmallVec::new();
        };
        if !self.opcode(last).is_some_and(Opcode::is_terminator) {
            return SmallVec::new();
        }
        let Ok(data) = self.value(last) else {
            return SmallVec::new();
        };
        data.operands
            .iter()
            .filter_map(|&op| self.label_block(op).ok())
            .collect()
    }
}

// ── Handle ──────────────────────────────────────────────────────────

impl<'ctx> BasicBlock<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, id: BlockId) -> Self {
        Self { ctx, id }
    }

    pub(crate) fn id(self) -> BlockId {
        self.id
    }

    pub fn context(self) -> &'ctx Context {
        self.ctx
    }

    fn wrap(self, id: BlockId) -> BasicBlock<'ctx> {
        BasicBlock::new(self.ctx, id)
    }

    fn get<R>(self, f: impl FnOnce(&BlockData) -> R) -> Result<R> {
        self.ctx.read(|s| Ok(f(s.block(self.id)?)))
    }

    pub fn is_alive(self) -> bool {
        self.ctx.read(|s| s.blocks.contains(self.id))
    }

    pub fn name(self) -> Result<String> {
        self.ctx.read(|s| Ok(s.value(s.block(self.id)?.value)?.name.clone()))
    }

    pub fn set_name(self, name: &str) -> Result<()> {
        self.as_value()?.set_name(name)
    }

    /// The label value standing for this block.
    pub fn as_value(self) -> Result<Value<'ctx>> {
        let label = self.get(|data| data.value)?;
        Ok(Value::new(self.ctx, label))
    }

    /// Function containing the block, `None` while detached.
    pub fn parent(self) -> Result<Option<Value<'ctx>>> {
        let parent = self.get(|data| data.parent)?;
        Ok(parent.map(|id| Value::new(self.ctx, id)))
    }

    // ── Layout ──────────────────────────────────────────────────────

    /// Create a new block in the same function, directly before this one.
    pub fn insert_before(self, name: &str) -> Result<BasicBlock<'ctx>> {
        let block = self.ctx.write(|s| {
            let parent = s.block(self.id)?.parent.ok_or_else(|| {
                Error::invalid_operand("cannot insert before a block without a parent")
            })?;
            let block = s.new_block(name);
            s.attach_block(block, parent, Some(self.id))?;
            Ok::<_, Error>(block)
        })?;
        Ok(self.wrap(block))
    }

    /// Move this block directly before `other`, into `other`'s function.
    pub fn move_before(self, other: BasicBlock<'ctx>) -> Result<()> {
        self.move_relative(other, false)
    }

    /// Move this block directly after `other`, into `other`'s function.
    pub fn move_after(self, other: BasicBlock<'ctx>) -> Result<()> {
        self.move_relative(other, true)
    }

    fn move_relative(self, other: BasicBlock<'ctx>, after: bool) -> Result<()> {
        self.ctx.ensure_same(other.ctx)?;
        if self == other {
            return Ok(());
        }
        self.ctx.write(|s| {
            s.block(self.id)?;
            let parent = s.block(other.id)?.parent.ok_or_else(|| {
                Error::invalid_operand("cannot move relative to a block without a parent")
            })?;
            s.unlink_block(self.id)?;
            let blocks = &s.function(parent)?.blocks;
            let pos = blocks
                .iter()
                .position(|&b| b == other.id)
                .ok_or(Error::Disposed)?;
            let before = if after { blocks.get(pos + 1).copied() } else { Some(other.id) };
            s.attach_block(self.id, parent, before)
        })
    }

    /// Detach from the parent function without releasing anything.
    pub fn remove_from_parent(self) -> Result<()> {
        self.ctx.write(|s| s.unlink_block(self.id))
    }

    /// Release the block and its instructions.
    ///
    /// Fails with `StillInUse` while branches or phis refer to the block,
    /// or values defined in it are used outside it.
    pub fn delete(self) -> Result<()> {
        self.ctx.write(|s| s.delete_block(self.id))
    }

    pub fn next(self) -> Option<BasicBlock<'ctx>> {
        self.sibling(1)
    }

    pub fn previous(self) -> Option<BasicBlock<'ctx>> {
        self.sibling(-1)
    }

    fn sibling(self, offset: isize) -> Option<BasicBlock<'ctx>> {
        self.ctx
            .read(|s| {
                let parent = s.block(self.id).ok()?.parent?;
                let blocks = &s.function(parent).ok()?.blocks;
                let pos = blocks.iter().position(|&b| b == self.id)?;
                blocks.get(pos.checked_add_signed(offset)?).copied()
            })
            .map(|id| self.wrap(id))
    }

    // ── Contents ────────────────────────────────────────────────────

    pub fn instructions(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.get(|data| data.instrs.clone())?;
        Ok(ids.into_iter().map(|id| Value::new(self.ctx, id)).collect())
    }

    pub fn count_instructions(self) -> Result<usize> {
        self.get(|data| data.instrs.len())
    }

    pub fn first_instruction(self) -> Option<Value<'ctx>> {
        self.get(|data| data.instrs.first().copied())
            .ok()
            .flatten()
            .map(|id| Value::new(self.ctx, id))
    }

    pub fn last_instruction(self) -> Option<Value<'ctx>> {
        self.get(|data| data.instrs.last().copied())
            .ok()
            .flatten()
            .map(|id| Value::new(self.ctx, id))
    }

    /// The last instruction, if it is a terminator.
    pub fn terminator(self) -> Option<Value<'ctx>> {
        self.last_instruction().filter(|i| i.is_terminator())
    }

    /// Blocks the terminator may transfer control to, without duplicates.
    pub fn successors(self) -> Vec<BasicBlock<'ctx>> {
        let ids = self.ctx.read(|s| s.successors(self.id));
        let mut out: Vec<BasicBlock<'ctx>> = Vec::with_capacity(ids.len());
        for id in ids {
            let block = self.wrap(id);
            if !out.contains(&block) {
                out.push(block);
            }
        }
        out
    }

    /// Blocks of the same function whose terminator names this block, in
    /// layout order.
    pub fn predecessors(self) -> Vec<BasicBlock<'ctx>> {
        self.ctx
            .read(|s| {
                let Some(parent) = s.block(self.id).ok().and_then(|data| data.parent) else {
                    return Vec::new();
                };
                let Ok(func) = s.function(parent) else {
                    return Vec::new();
                };
                func.blocks
                    .iter()
                    .copied()
                    .filter(|&b| s.successors(b).contains(&self.id))
                    .collect()
            })
            .into_iter()
            .map(|id| self.wrap(id))
            .collect()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
