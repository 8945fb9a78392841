//! Instruction queries and edits.

use crate::attributes::{ArithFlags, Attributes, CallConv};
use crate::block::BasicBlock;
use crate::error::{Error, Result};
use crate::fold;
use crate::id::ValueId;
use crate::metadata::DebugLoc;
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::store::{Extra, InstrData, Payload, Store};
use crate::types::Type;

use super::{value_ids, Value};

impl<'ctx> Value<'ctx> {
    fn instr_read<R>(self, f: impl FnOnce(&Store, &InstrData) -> Result<R>) -> Result<R> {
        self.read(|s| f(s, s.instr(self.id())?))
    }

    /// Opcode data of an instruction or a constant expression.
    fn extra_read<R>(self, f: impl FnOnce(&Store, &Extra) -> Result<R>) -> Result<R> {
        self.read(|s| match &s.value(self.id())?.payload {
            Payload::Instruction(instr) => f(s, &instr.extra),
            Payload::ConstExpr(expr) => f(s, &expr.extra),
            _ => Err(s.kind_mismatch("instruction or constant expression", self.id())),
        })
    }

    // ── Placement ───────────────────────────────────────────────────

    /// Block containing this instruction, `None` while detached.
    pub fn instruction_parent(self) -> Result<Option<BasicBlock<'ctx>>> {
        let block = self.instr_read(|_, instr| Ok(instr.block))?;
        Ok(block.map(|b| BasicBlock::new(self.context(), b)))
    }

    pub fn next_instruction(self) -> Option<Value<'ctx>> {
        self.sibling_instruction(1)
    }

    pub fn previous_instruction(self) -> Option<Value<'ctx>> {
        self.sibling_instruction(-1)
    }

    fn sibling_instruction(self, offset: isize) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| {
                let block = s.instr(self.id()).ok()?.block?;
                let instrs = &s.block(block).ok()?.instrs;
                let pos = instrs.iter().position(|&i| i == self.id())?;
                instrs.get(pos.checked_add_signed(offset)?).copied()
            })
            .map(|id| self.wrap(id))
    }

    /// Unlink and release the instruction. Fails with `StillInUse` while
    /// other values use it.
    pub fn erase_from_parent(self) -> Result<()> {
        self.write(|s| s.erase_instruction(self.id()))
    }

    /// Detach the instruction from its block, keeping it alive for
    /// reinsertion with [`Builder::insert`](crate::Builder::insert).
    pub fn remove_from_parent(self) -> Result<()> {
        self.write(|s| s.unlink_instruction(self.id()))
    }

    // ── Opcode data ─────────────────────────────────────────────────

    pub fn opcode(self) -> Result<Opcode> {
        self.instr_read(|_, instr| Ok(instr.opcode))
    }

    pub fn is_terminator(self) -> bool {
        self.opcode().is_ok_and(Opcode::is_terminator)
    }

    pub fn arith_flags(self) -> Result<ArithFlags> {
        self.instr_read(|_, instr| Ok(instr.flags))
    }

    pub fn icmp_predicate(self) -> Result<IntPredicate> {
        self.extra_read(|s, extra| match *extra {
            Extra::ICmp(predicate) => Ok(predicate),
            _ => Err(s.kind_mismatch("icmp instruction", self.id())),
        })
    }

    pub fn fcmp_predicate(self) -> Result<FloatPredicate> {
        self.extra_read(|s, extra| match *extra {
            Extra::FCmp(predicate) => Ok(predicate),
            _ => Err(s.kind_mismatch("fcmp instruction", self.id())),
        })
    }

    /// Type allocated by an `alloca`.
    pub fn allocated_type(self) -> Result<Type<'ctx>> {
        let ty = self.instr_read(|s, instr| match instr.extra {
            Extra::Alloca { allocated } => Ok(allocated),
            _ => Err(s.kind_mismatch("alloca instruction", self.id())),
        })?;
        Ok(Type::new(self.context(), ty))
    }

    /// Constant indices of `extractvalue`/`insertvalue`.
    pub fn indices(self) -> Result<Vec<u32>> {
        self.extra_read(|s, extra| match extra {
            Extra::Indices(indices) => Ok(indices.clone()),
            _ => Err(s.kind_mismatch("extractvalue or insertvalue", self.id())),
        })
    }

    pub fn is_in_bounds(self) -> Result<bool> {
        self.extra_read(|s, extra| match *extra {
            Extra::Gep { in_bounds } => Ok(in_bounds),
            _ => Err(s.kind_mismatch("getelementptr instruction", self.id())),
        })
    }

    // ── Call sites ──────────────────────────────────────────────────

    fn call_extra(self) -> Result<(CallConv, bool, Attributes)> {
        self.instr_read(|s, instr| match instr.extra {
            Extra::Call {
                call_conv,
                tail,
                attrs,
            } => Ok((call_conv, tail, attrs)),
            _ => Err(s.kind_mismatch("call or invoke", self.id())),
        })
    }

    fn update_call(self, f: impl FnOnce(&mut CallConv, &mut bool, &mut Attributes)) -> Result<()> {
        self.call_extra()?;
        self.write(|s| {
            if let Extra::Call {
                call_conv,
                tail,
                attrs,
            } = &mut s.instr_mut(self.id())?.extra
            {
                f(call_conv, tail, attrs);
            }
            Ok(())
        })
    }

    pub fn instruction_call_conv(self) -> Result<CallConv> {
        Ok(self.call_extra()?.0)
    }

    pub fn set_instruction_call_conv(self, cc: CallConv) -> Result<()> {
        self.update_call(|call_conv, _, _| *call_conv = cc)
    }

    pub fn is_tail_call(self) -> Result<bool> {
        Ok(self.call_extra()?.1)
    }

    pub fn set_tail_call(self, is_tail: bool) -> Result<()> {
        self.update_call(|_, tail, _| *tail = is_tail)
    }

    pub fn call_attrs(self) -> Result<Attributes> {
        Ok(self.call_extra()?.2)
    }

    pub fn add_call_attr(self, new: Attributes) -> Result<()> {
        self.update_call(|_, _, attrs| attrs.insert(new))
    }

    pub fn remove_call_attr(self, old: Attributes) -> Result<()> {
        self.update_call(|_, _, attrs| attrs.remove(old))
    }

    /// Callee of a call or invoke (its last operand).
    pub fn called_value(self) -> Result<Value<'ctx>> {
        self.call_extra()?;
        let id = self.read(|s| s.value(self.id())?.operands.last().copied().ok_or(Error::Disposed))?;
        Ok(self.wrap(id))
    }

    // ── Phi ─────────────────────────────────────────────────────────

    fn phi_blocks(s: &Store, id: ValueId) -> Result<Vec<crate::id::BlockId>> {
        match &s.instr(id)?.extra {
            Extra::Phi { blocks } => Ok(blocks.clone()),
            _ => Err(s.kind_mismatch("phi instruction", id)),
        }
    }

    /// Append incoming `(value, block)` pairs. Each value must have the
    /// phi's type.
    pub fn add_incoming(self, incoming: &[(Value<'ctx>, BasicBlock<'ctx>)]) -> Result<()> {
        let values: Vec<Value<'ctx>> = incoming.iter().map(|(v, _)| *v).collect();
        let values = value_ids(self.context(), &values)?;
        for (_, block) in incoming {
            self.context().ensure_same(block.context())?;
        }
        self.write(|s| {
            let mut blocks = Self::phi_blocks(s, self.id())?;
            let ty = s.ty(self.id())?;
            for &value in &values {
                s.expect_type(ty, s.ty(value)?)?;
            }
            for (&(_, block), &value) in incoming.iter().zip(&values) {
                s.block(block.id())?;
                s.push_operand(self.id(), value);
                blocks.push(block.id());
            }
            s.instr_mut(self.id())?.extra = Extra::Phi { blocks };
            Ok(())
        })
    }

    pub fn count_incoming(self) -> Result<usize> {
        self.read(|s| Ok(Self::phi_blocks(s, self.id())?.len()))
    }

    pub fn incoming_value(self, index: usize) -> Result<Value<'ctx>> {
        self.read(|s| Self::phi_blocks(s, self.id()))?;
        self.operand(index)
    }

    pub fn incoming_block(self, index: usize) -> Result<BasicBlock<'ctx>> {
        let block = self.read(|s| {
            let blocks = Self::phi_blocks(s, self.id())?;
            blocks.get(index).copied().ok_or(Error::IndexOutOfRange {
                index,
                len: blocks.len(),
            })
        })?;
        Ok(BasicBlock::new(self.context(), block))
    }

    /// Remove incoming pair `index`, returning its value.
    pub fn remove_incoming(self, index: usize) -> Result<Value<'ctx>> {
        let removed = self.write(|s| {
            let mut blocks = Self::phi_blocks(s, self.id())?;
            if index >= blocks.len() {
                return Err(Error::IndexOutOfRange {
                    index,
                    len: blocks.len(),
                });
            }
            let mut operands = s.value(self.id())?.operands.to_vec();
            let removed = operands.remove(index);
            blocks.remove(index);
            s.replace_operands(self.id(), &operands)?;
            s.instr_mut(self.id())?.extra = Extra::Phi { blocks };
            Ok(removed)
        })?;
        Ok(self.wrap(removed))
    }

    // ── Switch ──────────────────────────────────────────────────────

    /// Add a case to a `switch`. `on` must be an integer constant of the
    /// condition's type and not already handled.
    pub fn add_case(self, on: Value<'ctx>, dest: BasicBlock<'ctx>) -> Result<()> {
        self.context().ensure_same(on.context())?;
        self.context().ensure_same(dest.context())?;
        self.write(|s| {
            if s.instr(self.id())?.opcode != Opcode::Switch {
                return Err(s.kind_mismatch("switch instruction", self.id()));
            }
            let operands = s.value(self.id())?.operands.to_vec();
            let cond = *operands.first().ok_or(Error::Disposed)?;
            s.expect_type(s.ty(cond)?, s.ty(on.id())?)?;
            let Some(value) = s.int_value(on.id()) else {
                return Err(Error::invalid_operand("switch case must be an integer constant"));
            };
            let duplicate = operands
                .iter()
                .skip(2)
                .step_by(2)
                .any(|&case| s.int_value(case) == Some(value));
            if duplicate {
                return Err(Error::invalid_operand(format!("duplicate switch case {value}")));
            }
            let label = s.block(dest.id())?.value;
            s.push_operand(self.id(), on.id());
            s.push_operand(self.id(), label);
            Ok(())
        })
    }

    // ── Debug location ──────────────────────────────────────────────

    pub fn debug_loc(self) -> Result<Option<DebugLoc>> {
        self.instr_read(|_, instr| Ok(instr.debug_loc))
    }

    pub fn set_debug_loc(self, loc: Option<DebugLoc>) -> Result<()> {
        self.write(|s| {
            s.instr_mut(self.id())?.debug_loc = loc;
            Ok(())
        })
    }

    // ── Folding ─────────────────────────────────────────────────────

    /// The constant this instruction computes, when every operand is a
    /// plain constant and the result is defined. The instruction itself is
    /// left unchanged.
    pub fn try_fold(self) -> Result<Option<Value<'ctx>>> {
        let folded = self.write(|s| {
            let instr = s.instr(self.id())?;
            let (opcode, extra) = (instr.opcode, instr.extra.clone());
            let ty = s.ty(self.id())?;
            let operands = s.value(self.id())?.operands.to_vec();
            Ok(fold::fold(s, ty, opcode, &extra, &operands))
        })?;
        Ok(folded.map(|id| self.wrap(id)))
    }
}
