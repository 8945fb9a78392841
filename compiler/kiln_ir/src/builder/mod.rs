//! Cursor-based instruction builder.
//!
//! A [`Builder`] owns no IR, only an insertion cursor and an optional
//! debug location. The cursor is a small state machine:
//!
//! ```text
//!   Unpositioned ──position_at_end(b)──▶ AtEnd(b)
//!        ▲        ──position_before(i)─▶ Before(i)
//!        └──────── clear_insertion_position ──┘
//! ```
//!
//! Every `build_*` method requires a positioned builder, type-checks its
//! operands, inserts the new instruction at the cursor and leaves the
//! cursor after it, so consecutive builds appear in call order. The
//! builder never folds: building over constant operands still produces an
//! instruction (see [`Value::try_fold`]).
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Control flow | `build_ret`, `build_br`, `build_cond_br`, `build_switch`, `build_invoke`, `build_phi`, `build_select`, ... |
//! | Arithmetic | `build_add`, `build_nsw_add`, `build_fadd`, `build_bin_op`, `build_neg`, `build_not`, ... |
//! | Memory | `build_alloca`, `build_load`, `build_store`, `build_gep`, `build_malloc`, `build_free`, ... |
//! | Conversions | `build_trunc`, `build_zext`, `build_bit_cast`, `build_cast`, `build_int_cast`, ... |
//! | Comparisons | `build_icmp`, `build_fcmp`, `build_is_null`, `build_ptr_diff` |
//! | Calls | `build_call`, `build_va_arg` |
//! | Aggregates | `build_extract_value`, `build_insert_element`, `build_shuffle_vector`, ... |

mod aggregates;
mod arithmetic;
mod calls;
mod comparisons;
mod control_flow;
mod conversions;
mod memory;

use smallvec::SmallVec;

use crate::attributes::ArithFlags;
use crate::block::BasicBlock;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::{BlockId, TypeId, ValueId};
use crate::metadata::DebugLoc;
use crate::module::ModuleRef;
use crate::opcode::Opcode;
use crate::store::{Extra, InstrData, Payload, Store};
use crate::types::table::TypeTable;
use crate::value::Value;

/// Where the next instruction goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    Unpositioned,
    AtEnd(BlockId),
    Before(ValueId),
}

/// Observable builder state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position<'ctx> {
    Unpositioned,
    /// Instructions are appended to the block.
    AtEnd(BasicBlock<'ctx>),
    /// Instructions are inserted before this instruction.
    Before(Value<'ctx>),
}

/// Description of an instruction about to be emitted.
pub(crate) struct Inst {
    pub(crate) ty: TypeId,
    pub(crate) opcode: Opcode,
    pub(crate) flags: ArithFlags,
    pub(crate) extra: Extra,
    pub(crate) operands: SmallVec<[ValueId; 4]>,
}

impl Inst {
    pub(crate) fn new(ty: TypeId, opcode: Opcode, operands: &[ValueId]) -> Self {
        Self {
            ty,
            opcode,
            flags: ArithFlags::empty(),
            extra: Extra::None,
            operands: SmallVec::from_slice(operands),
        }
    }

    pub(crate) fn flags(mut self, flags: ArithFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }
}

/// Instruction builder. Create one with [`Context::create_builder`].
pub struct Builder<'ctx> {
    ctx: &'ctx Context,
    cursor: Cursor,
    debug_loc: Option<DebugLoc>,
}

impl std::fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("position", &self.position())
            .field("debug_loc", &self.debug_loc)
            .finish()
    }
}

impl<'ctx> Builder<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            cursor: Cursor::Unpositioned,
            debug_loc: None,
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    /// Release the builder. Equivalent to dropping it.
    pub fn dispose(self) {}

    // ── Positioning ─────────────────────────────────────────────────

    pub fn position(&self) -> Position<'ctx> {
        match self.cursor {
            Cursor::Unpositioned => Position::Unpositioned,
            Cursor::AtEnd(block) => Position::AtEnd(BasicBlock::new(self.ctx, block)),
            Cursor::Before(instr) => Position::Before(Value::new(self.ctx, instr)),
        }
    }

    pub fn position_at_end(&mut self, block: BasicBlock<'ctx>) -> Result<()> {
        self.ctx.ensure_same(block.context())?;
        self.ctx.read(|s| s.block(block.id()).map(|_| ()))?;
        self.cursor = Cursor::AtEnd(block.id());
        Ok(())
    }

    /// Position before `instr`, which must be inside a block.
    pub fn position_before(&mut self, instr: Value<'ctx>) -> Result<()> {
        self.ctx.ensure_same(instr.context())?;
        self.ctx.read(|s| match s.instr(instr.id())?.block {
            Some(_) => Ok(()),
            None => Err(Error::invalid_operand("cannot position before a detached instruction")),
        })?;
        self.cursor = Cursor::Before(instr.id());
        Ok(())
    }

    /// Position before `instr` when given, otherwise at the end of `block`.
    pub fn position_in(&mut self, block: BasicBlock<'ctx>, instr: Option<Value<'ctx>>) -> Result<()> {
        match instr {
            Some(instr) => {
                let parent = instr.instruction_parent()?;
                if parent != Some(block) {
                    return Err(Error::invalid_operand("instruction is not in the given block"));
                }
                self.position_before(instr)
            }
            None => self.position_at_end(block),
        }
    }

    pub fn clear_insertion_position(&mut self) {
        self.cursor = Cursor::Unpositioned;
    }

    /// Block the cursor points into.
    pub fn insert_block(&self) -> Option<BasicBlock<'ctx>> {
        let block = self.ctx.read(|s| self.current_block(s).ok())?;
        Some(BasicBlock::new(self.ctx, block))
    }

    // ── Debug location ──────────────────────────────────────────────

    /// Location copied onto every instruction built from now on.
    pub fn set_current_debug_location(&mut self, loc: Option<DebugLoc>) {
        self.debug_loc = loc;
    }

    pub fn current_debug_location(&self) -> Option<DebugLoc> {
        self.debug_loc
    }

    /// Give `instr` the builder's current location.
    pub fn set_inst_debug_location(&self, instr: Value<'ctx>) -> Result<()> {
        self.ctx.ensure_same(instr.context())?;
        instr.set_debug_loc(self.debug_loc)
    }

    // ── Insertion core ──────────────────────────────────────────────

    fn current_block(&self, s: &Store) -> Result<BlockId> {
        match self.cursor {
            Cursor::Unpositioned => Err(Error::BuilderUnpositioned),
            Cursor::AtEnd(block) => {
                s.block(block)?;
                Ok(block)
            }
            Cursor::Before(instr) => s.instr(instr)?.block.ok_or(Error::BuilderUnpositioned),
        }
    }

    /// Place the detached instruction `id` at the cursor.
    fn place(&self, s: &mut Store, id: ValueId) -> Result<()> {
        let block = self.current_block(s)?;
        let data = s.block_mut(block)?;
        let pos = match self.cursor {
            Cursor::Before(before) => data
                .instrs
                .iter()
                .position(|&i| i == before)
                .ok_or(Error::BuilderUnpositioned)?,
            _ => data.instrs.len(),
        };
        data.instrs.insert(pos, id);
        s.instr_mut(id)?.block = Some(block);
        Ok(())
    }

    /// Check the cursor, run `describe` to type-check operands and compute
    /// the instruction, then create and place it. Nothing is created when
    /// either step fails.
    pub(crate) fn emit(&self, name: &str, describe: impl FnOnce(&mut Store) -> Result<Inst>) -> Result<Value<'ctx>> {
        let id = self.ctx.write(|s| {
            self.current_block(s)?;
            let inst = describe(s)?;
            for &operand in &inst.operands {
                s.value(operand)?;
            }
            let name = if inst.ty == TypeTable::VOID { "" } else { name };
            let id = s.alloc_value(
                inst.ty,
                name,
                Payload::Instruction(Box::new(InstrData {
                    opcode: inst.opcode,
                    block: None,
                    flags: inst.flags,
                    extra: inst.extra,
                    debug_loc: self.debug_loc,
                })),
                &inst.operands,
            );
            self.place(s, id)?;
            Ok::<_, Error>(id)
        })?;
        Ok(Value::new(self.ctx, id))
    }

    /// Resolve handles to IDs, rejecting handles from another context.
    pub(crate) fn ids<const N: usize>(&self, values: [Value<'ctx>; N]) -> Result<[ValueId; N]> {
        for value in &values {
            self.ctx.ensure_same(value.context())?;
        }
        Ok(values.map(Value::id))
    }

    pub(crate) fn label(&self, s: &Store, block: BasicBlock<'ctx>) -> Result<ValueId> {
        self.ctx.ensure_same(block.context())?;
        Ok(s.block(block.id())?.value)
    }

    /// Module of the block the cursor points into.
    pub(crate) fn current_module(&self) -> Result<ModuleRef<'ctx>> {
        let module = self.ctx.read(|s| {
            let block = self.current_block(s)?;
            let function = s
                .block(block)?
                .parent
                .ok_or_else(|| Error::invalid_operand("builder block has no parent function"))?;
            Ok::<_, Error>(s.global(function)?.module)
        })?;
        Ok(ModuleRef::new(self.ctx, module))
    }

    /// Return type of the function the cursor points into, if attached.
    pub(crate) fn current_return_type(&self, s: &Store) -> Result<Option<TypeId>> {
        let block = self.current_block(s)?;
        let Some(function) = s.block(block)?.parent else {
            return Ok(None);
        };
        let fn_ty = s.types.pointee(s.ty(function)?).ok_or(Error::Disposed)?;
        Ok(s.types.function_info(fn_ty).map(|(ret, _, _)| ret))
    }

    // ── Reinsertion ─────────────────────────────────────────────────

    /// Insert a detached instruction at the cursor.
    pub fn insert(&self, instr: Value<'ctx>) -> Result<()> {
        self.ctx.ensure_same(instr.context())?;
        self.ctx.write(|s| {
            if s.instr(instr.id())?.block.is_some() {
                return Err(Error::invalid_operand("instruction is already in a block"));
            }
            self.place(s, instr.id())
        })
    }

    /// Insert a detached instruction at the cursor and rename it.
    pub fn insert_with_name(&self, instr: Value<'ctx>, name: &str) -> Result<()> {
        self.insert(instr)?;
        instr.set_name(name)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
