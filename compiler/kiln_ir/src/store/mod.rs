//! Arena storage behind a [`Context`](crate::Context).
//!
//! # Architecture
//!
//! All IR objects of a context live in one `Store`:
//!
//! - **types** — interned [`TypeTable`]
//! - **values** — every node of the def-use graph ([`ValueData`]), keyed by
//!   generational [`ValueId`]
//! - **blocks** — instruction containers ([`BlockData`]); each block also
//!   owns a label value so branches can take it as an operand
//! - **modules** — ordered function/global lists and ownership state
//! - **constants** — structural interning map for every constant kind
//!
//! Operands are stored on the user; uses are the reverse edges stored on
//! the operand. Every mutation of an operand slot goes through this module
//! so the two directions never disagree.

mod constants;
mod erase;
mod typing;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub(crate) use constants::{AggregateKind, ConstKey};

use crate::attributes::{ArithFlags, Attributes, CallConv, Linkage, Visibility};
use crate::error::{Error, Result};
use crate::id::{BlockId, ModuleId, TypeId, ValueId};
use crate::metadata::{DebugLoc, Metadata};
use crate::module::Owner;
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::slots::Slots;
use crate::types::table::TypeTable;
use crate::value::{ConstantKind, GlobalKind, ValueKind};

pub(crate) type Operands = SmallVec<[ValueId; 3]>;

/// Reverse edge: `user.operands[index] == self`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UseEdge {
    pub(crate) user: ValueId,
    pub(crate) index: u32,
}

pub(crate) struct ValueData {
    pub(crate) ty: TypeId,
    pub(crate) name: String,
    pub(crate) payload: Payload,
    pub(crate) operands: Operands,
    pub(crate) uses: Vec<UseEdge>,
    pub(crate) metadata: Vec<(u32, Metadata)>,
}

pub(crate) enum Payload {
    Argument(ArgumentData),
    Block(BlockId),
    InlineAsm(InlineAsmData),
    ConstInt(u128),
    ConstFp(f64),
    /// Elements are the operands.
    ConstArray,
    ConstStruct,
    ConstVector,
    AggregateZero,
    PointerNull,
    ConstExpr(ExprData),
    Undef,
    Global(Box<GlobalData>),
    Instruction(Box<InstrData>),
}

pub(crate) struct ArgumentData {
    pub(crate) function: ValueId,
    pub(crate) attrs: Attributes,
    pub(crate) alignment: u32,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct InlineAsmData {
    pub(crate) asm: String,
    pub(crate) constraints: String,
    pub(crate) side_effects: bool,
    pub(crate) align_stack: bool,
}

pub(crate) struct ExprData {
    pub(crate) opcode: Opcode,
    pub(crate) flags: ArithFlags,
    pub(crate) extra: Extra,
}

pub(crate) struct GlobalData {
    pub(crate) module: ModuleId,
    pub(crate) linkage: Linkage,
    pub(crate) visibility: Visibility,
    pub(crate) section: Option<String>,
    pub(crate) alignment: u32,
    pub(crate) kind: GlobalPayload,
}

pub(crate) enum GlobalPayload {
    Function(FunctionData),
    /// Operand 0, when present, is the initializer.
    Variable { thread_local: bool, constant: bool },
    /// Operand 0 is the aliasee.
    Alias,
}

pub(crate) struct FunctionData {
    pub(crate) params: Vec<ValueId>,
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) call_conv: CallConv,
    pub(crate) gc: Option<String>,
    pub(crate) attrs: Attributes,
    pub(crate) intrinsic_id: u32,
}

pub(crate) struct InstrData {
    pub(crate) opcode: Opcode,
    pub(crate) block: Option<BlockId>,
    pub(crate) flags: ArithFlags,
    pub(crate) extra: Extra,
    pub(crate) debug_loc: Option<DebugLoc>,
}

/// Opcode-specific instruction data that is not an operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Extra {
    None,
    ICmp(IntPredicate),
    FCmp(FloatPredicate),
    Alloca { allocated: TypeId },
    Gep { in_bounds: bool },
    /// Incoming blocks, parallel to the phi's operands.
    Phi { blocks: Vec<BlockId> },
    Call {
        call_conv: CallConv,
        tail: bool,
        attrs: Attributes,
    },
    /// Constant aggregate indices for `extractvalue`/`insertvalue`.
    Indices(Vec<u32>),
}

pub(crate) struct BlockData {
    pub(crate) value: ValueId,
    pub(crate) parent: Option<ValueId>,
    pub(crate) instrs: Vec<ValueId>,
}

pub(crate) struct ModuleData {
    pub(crate) name: String,
    pub(crate) data_layout: String,
    pub(crate) target_triple: String,
    pub(crate) inline_asm: String,
    pub(crate) functions: Vec<ValueId>,
    pub(crate) globals: Vec<ValueId>,
    pub(crate) aliases: Vec<ValueId>,
    pub(crate) owner: Owner,
}

pub(crate) struct Store {
    pub(crate) types: TypeTable,
    pub(crate) values: Slots<ValueId, ValueData>,
    pub(crate) blocks: Slots<BlockId, BlockData>,
    pub(crate) modules: Slots<ModuleId, ModuleData>,
    pub(crate) constants: FxHashMap<ConstKey, ValueId>,
    md_kinds: Vec<String>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self {
            types: TypeTable::new(),
            values: Slots::default(),
            blocks: Slots::default(),
            modules: Slots::default(),
            constants: FxHashMap::default(),
            md_kinds: vec!["dbg".to_owned()],
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub(crate) fn value(&self, id: ValueId) -> Result<&ValueData> {
        self.values.get(id).ok_or(Error::Disposed)
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> Result<&mut ValueData> {
        self.values.get_mut(id).ok_or(Error::Disposed)
    }

    pub(crate) fn block(&self, id: BlockId) -> Result<&BlockData> {
        self.blocks.get(id).ok_or(Error::Disposed)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Result<&mut BlockData> {
        self.blocks.get_mut(id).ok_or(Error::Disposed)
    }

    pub(crate) fn module(&self, id: ModuleId) -> Result<&ModuleData> {
        self.modules.get(id).ok_or(Error::Disposed)
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> Result<&mut ModuleData> {
        self.modules.get_mut(id).ok_or(Error::Disposed)
    }

    pub(crate) fn ty(&self, id: ValueId) -> Result<TypeId> {
        Ok(self.value(id)?.ty)
    }

    pub(crate) fn type_name(&self, ty: TypeId) -> String {
        self.types.display(ty)
    }

    pub(crate) fn instr(&self, id: ValueId) -> Result<&InstrData> {
        match &self.value(id)?.payload {
            Payload::Instruction(data) => Ok(data),
            _ => Err(self.kind_mismatch("instruction", id)),
        }
    }

    pub(crate) fn instr_mut(&mut self, id: ValueId) -> Result<&mut InstrData> {
        if !matches!(self.value(id)?.payload, Payload::Instruction(_)) {
            return Err(self.kind_mismatch("instruction", id));
        }
        match &mut self.value_mut(id)?.payload {
            Payload::Instruction(data) => Ok(data),
            _ => Err(Error::Disposed),
        }
    }

    pub(crate) fn global(&self, id: ValueId) -> Result<&GlobalData> {
        match &self.value(id)?.payload {
            Payload::Global(data) => Ok(data),
            _ => Err(self.kind_mismatch("global value", id)),
        }
    }

    pub(crate) fn global_mut(&mut self, id: ValueId) -> Result<&mut GlobalData> {
        if !matches!(self.value(id)?.payload, Payload::Global(_)) {
            return Err(self.kind_mismatch("global value", id));
        }
        match &mut self.value_mut(id)?.payload {
            Payload::Global(data) => Ok(data),
            _ => Err(Error::Disposed),
        }
    }

    pub(crate) fn function(&self, id: ValueId) -> Result<&FunctionData> {
        match &self.global(id).map_err(|_| self.kind_mismatch("function", id))?.kind {
            GlobalPayload::Function(data) => Ok(data),
            _ => Err(self.kind_mismatch("function", id)),
        }
    }

    pub(crate) fn function_mut(&mut self, id: ValueId) -> Result<&mut FunctionData> {
        if !matches!(
            self.global(id).map(|g| &g.kind),
            Ok(GlobalPayload::Function(_))
        ) {
            return Err(self.kind_mismatch("function", id));
        }
        match &mut self.global_mut(id)?.kind {
            GlobalPayload::Function(data) => Ok(data),
            _ => Err(Error::Disposed),
        }
    }

    pub(crate) fn argument(&self, id: ValueId) -> Result<&ArgumentData> {
        match &self.value(id)?.payload {
            Payload::Argument(data) => Ok(data),
            _ => Err(self.kind_mismatch("argument", id)),
        }
    }

    pub(crate) fn argument_mut(&mut self, id: ValueId) -> Result<&mut ArgumentData> {
        if !matches!(self.value(id)?.payload, Payload::Argument(_)) {
            return Err(self.kind_mismatch("argument", id));
        }
        match &mut self.value_mut(id)?.payload {
            Payload::Argument(data) => Ok(data),
            _ => Err(Error::Disposed),
        }
    }

    /// The block a label value stands for.
    pub(crate) fn label_block(&self, id: ValueId) -> Result<BlockId> {
        match &self.value(id)?.payload {
            Payload::Block(block) => Ok(*block),
            _ => Err(self.kind_mismatch("basic block", id)),
        }
    }

    pub(crate) fn kind_mismatch(&self, expected: &'static str, id: ValueId) -> Error {
        let found = match self.value(id) {
            Ok(data) => describe_kind(self.kind_of(data)),
            Err(_) => "disposed value".to_owned(),
        };
        Error::KindMismatch { expected, found }
    }

    // ── Classification ──────────────────────────────────────────────

    pub(crate) fn kind(&self, id: ValueId) -> Result<ValueKind> {
        Ok(self.kind_of(self.value(id)?))
    }

    pub(crate) fn kind_of(&self, data: &ValueData) -> ValueKind {
        match &data.payload {
            Payload::Argument(_) => ValueKind::Argument,
            Payload::Block(_) => ValueKind::BasicBlock,
            Payload::InlineAsm(_) => ValueKind::InlineAsm,
            Payload::ConstInt(_) => ValueKind::Constant(ConstantKind::Int),
            Payload::ConstFp(_) => ValueKind::Constant(ConstantKind::Fp),
            Payload::ConstArray => ValueKind::Constant(ConstantKind::Array),
            Payload::ConstStruct => ValueKind::Constant(ConstantKind::Struct),
            Payload::ConstVector => ValueKind::Constant(ConstantKind::Vector),
            Payload::AggregateZero => ValueKind::Constant(ConstantKind::AggregateZero),
            Payload::PointerNull => ValueKind::Constant(ConstantKind::PointerNull),
            Payload::ConstExpr(expr) => ValueKind::Constant(ConstantKind::Expr(expr.opcode)),
            Payload::Undef => ValueKind::Undef,
            Payload::Global(global) => ValueKind::Global(match global.kind {
                GlobalPayload::Function(_) => GlobalKind::Function,
                GlobalPayload::Variable { .. } => GlobalKind::Variable,
                GlobalPayload::Alias => GlobalKind::Alias,
            }),
            Payload::Instruction(instr) => ValueKind::Instruction(instr.opcode),
        }
    }

    pub(crate) fn opcode(&self, id: ValueId) -> Option<Opcode> {
        match &self.value(id).ok()?.payload {
            Payload::Instruction(instr) => Some(instr.opcode),
            _ => None,
        }
    }

    /// Constants, including globals (whose value is their address).
    pub(crate) fn is_constant(&self, id: ValueId) -> bool {
        self.value(id).is_ok_and(|data| {
            matches!(
                data.payload,
                Payload::ConstInt(_)
                    | Payload::ConstFp(_)
                    | Payload::ConstArray
                    | Payload::ConstStruct
                    | Payload::ConstVector
                    | Payload::AggregateZero
                    | Payload::PointerNull
                    | Payload::ConstExpr(_)
                    | Payload::Undef
                    | Payload::Global(_)
            )
        })
    }

    /// Plain constants: no expressions, no globals.
    pub(crate) fn is_plain_constant(&self, id: ValueId) -> bool {
        self.value(id).is_ok_and(|data| match data.payload {
            Payload::ConstInt(_)
            | Payload::ConstFp(_)
            | Payload::AggregateZero
            | Payload::PointerNull
            | Payload::Undef => true,
            Payload::ConstArray | Payload::ConstStruct | Payload::ConstVector => {
                data.operands.iter().all(|&op| self.is_plain_constant(op))
            }
            _ => false,
        })
    }

    /// The module a global, argument, block label or instruction belongs to.
    pub(crate) fn owning_module(&self, id: ValueId) -> Option<ModuleId> {
        match &self.value(id).ok()?.payload {
            Payload::Global(global) => Some(global.module),
            Payload::Argument(arg) => self.owning_module(arg.function),
            Payload::Block(block) => {
                let parent = self.block(*block).ok()?.parent?;
                self.owning_module(parent)
            }
            Payload::Instruction(instr) => {
                let parent = self.block(instr.block?).ok()?.parent?;
                self.owning_module(parent)
            }
            _ => None,
        }
    }

    /// The function containing an instruction, argument or block label.
    pub(crate) fn owning_function(&self, id: ValueId) -> Option<ValueId> {
        match &self.value(id).ok()?.payload {
            Payload::Argument(arg) => Some(arg.function),
            Payload::Block(block) => self.block(*block).ok()?.parent,
            Payload::Instruction(instr) => self.block(instr.block?).ok()?.parent,
            _ => None,
        }
    }

    // ── Allocation and operand edges ────────────────────────────────

    pub(crate) fn alloc_value(
        &mut self,
        ty: TypeId,
        name: impl Into<String>,
        payload: Payload,
        operands: &[ValueId],
    ) -> ValueId {
        let id = self.values.insert(ValueData {
            ty,
            name: name.into(),
            payload,
            operands: SmallVec::new(),
            uses: Vec::new(),
            metadata: Vec::new(),
        });
        for &operand in operands {
            self.push_operand(id, operand);
        }
        id
    }

    pub(crate) fn push_operand(&mut self, user: ValueId, operand: ValueId) {
        let Some(data) = self.values.get_mut(user) else {
            return;
        };
        let index = data.operands.len() as u32;
        data.operands.push(operand);
        self.add_use(operand, user, index);
    }

    fn add_use(&mut self, operand: ValueId, user: ValueId, index: u32) {
        if let Some(data) = self.values.get_mut(operand) {
            data.uses.push(UseEdge { user, index });
        }
    }

    fn remove_use(&mut self, operand: ValueId, user: ValueId, index: u32) {
        if let Some(data) = self.values.get_mut(operand) {
            if let Some(pos) = data
                .uses
                .iter()
                .position(|u| u.user == user && u.index == index)
            {
                data.uses.remove(pos);
            }
        }
    }

    /// Point operand slot `index` of `user` at `new`. No type check.
    pub(crate) fn set_operand_raw(&mut self, user: ValueId, index: usize, new: ValueId) -> Result<()> {
        let data = self.value_mut(user)?;
        let len = data.operands.len();
        let Some(slot) = data.operands.get_mut(index) else {
            return Err(Error::IndexOutOfRange { index, len });
        };
        let old = std::mem::replace(slot, new);
        if old == new {
            return Ok(());
        }
        self.remove_use(old, user, index as u32);
        self.add_use(new, user, index as u32);
        self.uninterned_if_constant(user);
        Ok(())
    }

    /// Replace the whole operand list of `user`, keeping use edges exact.
    pub(crate) fn replace_operands(&mut self, user: ValueId, operands: &[ValueId]) -> Result<()> {
        self.drop_operands(user)?;
        for &operand in operands {
            self.push_operand(user, operand);
        }
        Ok(())
    }

    /// Remove every operand edge of `user`.
    pub(crate) fn drop_operands(&mut self, user: ValueId) -> Result<()> {
        let operands = std::mem::take(&mut self.value_mut(user)?.operands);
        for (index, operand) in operands.into_iter().enumerate() {
            self.remove_use(operand, user, index as u32);
        }
        Ok(())
    }

    /// Rewrite every use of `old` to `new`. No type check.
    pub(crate) fn replace_all_uses_raw(&mut self, old: ValueId, new: ValueId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        self.value(new)?;
        let uses = std::mem::take(&mut self.value_mut(old)?.uses);
        for edge in &uses {
            if let Some(user) = self.values.get_mut(edge.user) {
                user.operands[edge.index as usize] = new;
            }
        }
        self.value_mut(new)?.uses.extend_from_slice(&uses);
        for edge in uses {
            self.uninterned_if_constant(edge.user);
        }
        Ok(())
    }

    /// A constant whose operands changed no longer matches its interning
    /// key, so it must not be handed out again.
    fn uninterned_if_constant(&mut self, id: ValueId) {
        let is_interned = self.value(id).is_ok_and(|data| {
            matches!(
                data.payload,
                Payload::ConstArray
                    | Payload::ConstStruct
                    | Payload::ConstVector
                    | Payload::ConstExpr(_)
            )
        });
        if is_interned {
            self.constants.retain(|_, value| *value != id);
        }
    }

    // ── Ownership ───────────────────────────────────────────────────

    /// Move a module from `from` to `to`, failing if `from` is not the
    /// current owner.
    pub(crate) fn transfer_module(&mut self, id: ModuleId, from: Owner, to: Owner) -> Result<()> {
        let module = self.module_mut(id)?;
        if module.owner != from {
            return Err(Error::OwnerMismatch {
                expected: from,
                found: module.owner,
            });
        }
        module.owner = to;
        Ok(())
    }

    // ── Metadata kinds ──────────────────────────────────────────────

    pub(crate) fn md_kind_id(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.md_kinds.iter().position(|k| k == name) {
            return pos as u32;
        }
        self.md_kinds.push(name.to_owned());
        (self.md_kinds.len() - 1) as u32
    }

    pub(crate) fn md_kind_name(&self, kind: u32) -> Option<&str> {
        self.md_kinds.get(kind as usize).map(String::as_str)
    }
}

pub(crate) fn describe_kind(kind: ValueKind) -> String {
    match kind {
        ValueKind::Argument => "argument".to_owned(),
        ValueKind::BasicBlock => "basic block".to_owned(),
        ValueKind::InlineAsm => "inline asm".to_owned(),
        ValueKind::Constant(ConstantKind::Expr(op)) => format!("`{op}` constant expression"),
        ValueKind::Constant(_) => "constant".to_owned(),
        ValueKind::Global(GlobalKind::Function) => "function".to_owned(),
        ValueKind::Global(GlobalKind::Variable) => "global variable".to_owned(),
        ValueKind::Global(GlobalKind::Alias) => "global alias".to_owned(),
        ValueKind::Undef => "undef".to_owned(),
        ValueKind::Instruction(op) => format!("`{op}` instruction"),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
