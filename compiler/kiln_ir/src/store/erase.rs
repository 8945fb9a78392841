//! Releasing IR objects.
//!
//! Removal never leaves a dangling operand behind: an object that is still
//! referenced from outside the set being removed is rejected with
//! `StillInUse`, except on module disposal, where outside references are
//! redirected to `undef` first.

use rustc_hash::FxHashSet;

use super::{Extra, GlobalPayload, Payload, Store};
use crate::error::{Error, Result};
use crate::id::{BlockId, ModuleId, ValueId};

impl Store {
    fn describe(&self, id: ValueId) -> String {
        match self.value(id) {
            Ok(data) if !data.name.is_empty() => {
                let sigil = if matches!(data.payload, Payload::Global(_)) {
                    '@'
                } else {
                    '%'
                };
                format!("{} `{sigil}{}`", super::describe_kind(self.kind_of(data)), data.name)
            }
            Ok(data) => super::describe_kind(self.kind_of(data)),
            Err(_) => "value".to_owned(),
        }
    }

    /// Fail if any user of `id` lies outside `inside`.
    fn ensure_only_used_by(&self, id: ValueId, inside: &FxHashSet<ValueId>) -> Result<()> {
        let data = self.value(id)?;
        if data.uses.iter().any(|edge| !inside.contains(&edge.user)) {
            return Err(Error::StillInUse(self.describe(id)));
        }
        Ok(())
    }

    // ── Instructions ────────────────────────────────────────────────

    /// Detach an instruction from its block without releasing it.
    pub(crate) fn unlink_instruction(&mut self, id: ValueId) -> Result<()> {
        let Some(block) = self.instr(id)?.block else {
            return Ok(());
        };
        if let Ok(data) = self.block_mut(block) {
            data.instrs.retain(|&i| i != id);
        }
        self.instr_mut(id)?.block = None;
        Ok(())
    }

    /// Release an unused instruction.
    pub(crate) fn erase_instruction(&mut self, id: ValueId) -> Result<()> {
        self.instr(id)?;
        if !self.value(id)?.uses.is_empty() {
            return Err(Error::StillInUse(self.describe(id)));
        }
        self.unlink_instruction(id)?;
        self.drop_operands(id)?;
        self.values.remove(id);
        Ok(())
    }

    // ── Blocks ──────────────────────────────────────────────────────

    /// Phi instructions outside `skip` whose incoming list names `block`.
    fn phis_naming_block(&self, function: ValueId, block: BlockId, skip: &FxHashSet<ValueId>) -> bool {
        let Ok(func) = self.function(function) else {
            return false;
        };
        func.blocks.iter().any(|&b| {
            self.block(b).is_ok_and(|data| {
                data.instrs.iter().any(|&i| {
                    !skip.contains(&i)
                        && self.instr(i).is_ok_and(|instr| {
                            matches!(&instr.extra, Extra::Phi { blocks } if blocks.contains(&block))
                        })
                })
            })
        })
    }

    /// Remove a block from its function's layout without releasing it.
    pub(crate) fn unlink_block(&mut self, id: BlockId) -> Result<()> {
        let Some(parent) = self.block(id)?.parent else {
            return Ok(());
        };
        if let Ok(func) = self.function_mut(parent) {
            func.blocks.retain(|&b| b != id);
        }
        self.block_mut(id)?.parent = None;
        Ok(())
    }

    /// Release a block and every instruction in it.
    pub(crate) fn delete_block(&mut self, id: BlockId) -> Result<()> {
        let data = self.block(id)?;
        let label = data.value;
        let instrs = data.instrs.clone();
        let parent = data.parent;

        let inside: FxHashSet<ValueId> = instrs.iter().copied().collect();
        for &instr in &instrs {
            self.ensure_only_used_by(instr, &inside)?;
        }
        self.ensure_only_used_by(label, &inside)?;
        if let Some(function) = parent {
            if self.phis_naming_block(function, id, &inside) {
                return Err(Error::StillInUse(self.describe(label)));
            }
        }

        self.unlink_block(id)?;
        self.release_instructions(&instrs)?;
        self.values.remove(label);
        self.blocks.remove(id);
        Ok(())
    }

    /// Drop every operand first so intra-set references never block removal.
    fn release_instructions(&mut self, instrs: &[ValueId]) -> Result<()> {
        for &instr in instrs {
            self.drop_operands(instr)?;
        }
        for &instr in instrs {
            self.values.remove(instr);
        }
        Ok(())
    }

    // ── Globals ─────────────────────────────────────────────────────

    /// Every value owned by a function: arguments, labels, instructions.
    fn function_contents(&self, function: ValueId) -> Result<(Vec<ValueId>, Vec<BlockId>)> {
        let func = self.function(function)?;
        let mut contents = func.params.clone();
        for &block in &func.blocks {
            let data = self.block(block)?;
            contents.push(data.value);
            contents.extend_from_slice(&data.instrs);
        }
        Ok((contents, func.blocks.clone()))
    }

    /// Release a function with its body. Only self-references are allowed.
    pub(crate) fn delete_function(&mut self, id: ValueId) -> Result<()> {
        let (contents, blocks) = self.function_contents(id)?;
        let inside: FxHashSet<ValueId> = contents.iter().copied().collect();
        self.ensure_only_used_by(id, &inside)?;
        for &value in &contents {
            self.ensure_only_used_by(value, &inside)?;
        }
        let module = self.global(id)?.module;

        self.release_function_body(&contents, &blocks)?;
        self.drop_operands(id)?;
        if let Ok(data) = self.module_mut(module) {
            data.functions.retain(|&f| f != id);
        }
        self.values.remove(id);
        Ok(())
    }

    /// Release the blocks of a function, keeping the function itself.
    pub(crate) fn delete_function_body(&mut self, id: ValueId) -> Result<()> {
        let (contents, blocks) = self.function_contents(id)?;
        let params = self.function(id)?.params.clone();
        let body: Vec<ValueId> = contents
            .iter()
            .copied()
            .filter(|v| !params.contains(v))
            .collect();
        let inside: FxHashSet<ValueId> = body.iter().copied().collect();
        for &value in &body {
            self.ensure_only_used_by(value, &inside)?;
        }
        self.release_function_body(&body, &blocks)?;
        self.function_mut(id)?.blocks.clear();
        Ok(())
    }

    fn release_function_body(&mut self, contents: &[ValueId], blocks: &[BlockId]) -> Result<()> {
        for &value in contents {
            if matches!(self.value(value)?.payload, Payload::Instruction(_)) {
                self.drop_operands(value)?;
            }
        }
        for &value in contents {
            self.values.remove(value);
        }
        for &block in blocks {
            self.blocks.remove(block);
        }
        Ok(())
    }

    /// Release an unused global variable or alias.
    pub(crate) fn delete_global(&mut self, id: ValueId) -> Result<()> {
        let global = self.global(id)?;
        let module = global.module;
        if matches!(global.kind, GlobalPayload::Function(_)) {
            return self.delete_function(id);
        }
        if !self.value(id)?.uses.is_empty() {
            return Err(Error::StillInUse(self.describe(id)));
        }
        self.drop_operands(id)?;
        if let Ok(data) = self.module_mut(module) {
            data.globals.retain(|&g| g != id);
            data.aliases.retain(|&a| a != id);
        }
        self.values.remove(id);
        Ok(())
    }

    // ── Modules ─────────────────────────────────────────────────────

    /// Release a module and everything in it. References from outside the
    /// module (other modules, constant expressions) are redirected to
    /// `undef` of the same type.
    pub(crate) fn dispose_module(&mut self, id: ModuleId) -> Result<()> {
        let module = self.modules.remove(id).ok_or(Error::Disposed)?;

        let mut owned: Vec<ValueId> = Vec::new();
        let mut blocks: Vec<BlockId> = Vec::new();
        for &function in &module.functions {
            if let Ok((contents, fn_blocks)) = self.function_contents(function) {
                owned.extend(contents);
                blocks.extend(fn_blocks);
            }
        }
        owned.extend(module.functions.iter().copied());
        owned.extend(module.globals.iter().copied());
        owned.extend(module.aliases.iter().copied());

        for &value in &owned {
            self.drop_operands(value)?;
        }
        for &value in &owned {
            let (ty, used) = {
                let data = self.value(value)?;
                (data.ty, !data.uses.is_empty())
            };
            if used {
                let undef = self.undef(ty);
                self.replace_all_uses_raw(value, undef)?;
            }
        }
        for &value in &owned {
            self.values.remove(value);
        }
        for block in blocks {
            self.blocks.remove(block);
        }
        tracing::debug!(module = %module.name, values = owned.len(), "module released");
        Ok(())
    }
}
