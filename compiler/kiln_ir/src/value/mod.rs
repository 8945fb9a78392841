//! Value handles and the def-use graph.
//!
//! A [`Value`] is an observing handle to one node of the graph: a constant,
//! global, argument, basic-block label or instruction. Operands are ordered
//! and stored on the user; [`Value::uses`] walks the reverse edges.
//!
//! # Invariants
//!
//! - `v.operand(i) == u` exactly when `(v, i)` is among `u.uses()`
//! - every value has one type, fixed at creation
//! - instructions are only created by the builder and by folding helpers
//!
//! The kind of a value is a closed enumeration ([`ValueKind`]); checked
//! downcasts such as [`Value::as_basic_block`] fail with `KindMismatch`.

mod constant;
mod global;
mod instruction;

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::block::BasicBlock;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::ValueId;
use crate::metadata::Metadata;
use crate::opcode::Opcode;
use crate::store::{Payload, Store};
use crate::types::Type;

/// Kinds of constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Int,
    Fp,
    Array,
    Struct,
    Vector,
    AggregateZero,
    PointerNull,
    /// Unfolded constant expression.
    Expr(Opcode),
}

/// Kinds of global values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Function,
    Variable,
    Alias,
}

/// Classification of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Argument,
    BasicBlock,
    InlineAsm,
    Constant(ConstantKind),
    Global(GlobalKind),
    Undef,
    Instruction(Opcode),
}

impl ValueKind {
    pub fn is_instruction(self) -> bool {
        matches!(self, ValueKind::Instruction(_))
    }

    pub fn is_function(self) -> bool {
        matches!(self, ValueKind::Global(GlobalKind::Function))
    }

    /// Constants in the broad sense: constant data, expressions, undef and
    /// globals (whose value is their address).
    pub fn is_constant(self) -> bool {
        matches!(
            self,
            ValueKind::Constant(_) | ValueKind::Global(_) | ValueKind::Undef
        )
    }
}

/// One edge of the def-use graph: `user.operand(operand_index)` is the
/// value the use was obtained from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use<'ctx> {
    pub user: Value<'ctx>,
    pub operand_index: usize,
}

/// Observing handle to a node of the def-use graph.
#[derive(Clone, Copy)]
pub struct Value<'ctx> {
    ctx: &'ctx Context,
    id: ValueId,
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.id() == other.ctx.id() && self.id == other.id
    }
}

impl Eq for Value<'_> {}

impl Hash for Value<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ctx.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .print_to_string()
            .unwrap_or_else(|_| "<disposed>".to_owned());
        write!(f, "Value({text})")
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.print_to_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<disposed>"),
        }
    }
}

/// Resolve value handles to IDs, rejecting handles from other contexts.
pub(crate) fn value_ids(ctx: &Context, values: &[Value<'_>]) -> Result<Vec<ValueId>> {
    values
        .iter()
        .map(|v| {
            ctx.ensure_same(v.ctx)?;
            Ok(v.id)
        })
        .collect()
}

impl<'ctx> Value<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, id: ValueId) -> Self {
        Self { ctx, id }
    }

    pub(crate) fn id(self) -> ValueId {
        self.id
    }

    pub fn context(self) -> &'ctx Context {
        self.ctx
    }

    pub(crate) fn wrap(self, id: ValueId) -> Value<'ctx> {
        Value::new(self.ctx, id)
    }

    pub(crate) fn read<R>(self, f: impl FnOnce(&Store) -> Result<R>) -> Result<R> {
        self.ctx.read(f)
    }

    pub(crate) fn write<R>(self, f: impl FnOnce(&mut Store) -> Result<R>) -> Result<R> {
        self.ctx.write(f)
    }

    /// Whether the value has not been released.
    pub fn is_alive(self) -> bool {
        self.ctx.read(|s| s.values.contains(self.id))
    }

    pub fn kind(self) -> Result<ValueKind> {
        self.read(|s| s.kind(self.id))
    }

    pub fn type_of(self) -> Result<Type<'ctx>> {
        let ty = self.read(|s| s.ty(self.id))?;
        Ok(Type::new(self.ctx, ty))
    }

    pub fn name(self) -> Result<String> {
        self.read(|s| Ok(s.value(self.id)?.name.clone()))
    }

    /// Rename the value. Globals keep unique names within their module;
    /// a taken name gets a numeric suffix.
    pub fn set_name(self, name: &str) -> Result<()> {
        self.write(|s| {
            let name = match (&s.value(self.id)?.payload, s.owning_module(self.id)) {
                (Payload::Global(_), Some(module)) => {
                    crate::module::unique_symbol_excluding(s, module, name, self.id)
                }
                _ => name.to_owned(),
            };
            s.value_mut(self.id)?.name = name;
            Ok(())
        })
    }

    pub fn print_to_string(self) -> Result<String> {
        self.read(|s| crate::print::print_value(s, self.id))
    }

    /// Print to stderr.
    pub fn dump(self) {
        match self.print_to_string() {
            Ok(text) => eprintln!("{text}"),
            Err(err) => eprintln!("<{err}>"),
        }
    }

    // ── Operands ────────────────────────────────────────────────────

    pub fn num_operands(self) -> Result<usize> {
        self.read(|s| Ok(s.value(self.id)?.operands.len()))
    }

    pub fn operand(self, index: usize) -> Result<Value<'ctx>> {
        let id = self.read(|s| {
            let operands = &s.value(self.id)?.operands;
            operands.get(index).copied().ok_or(Error::IndexOutOfRange {
                index,
                len: operands.len(),
            })
        })?;
        Ok(self.wrap(id))
    }

    pub fn operands(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.read(|s| Ok(s.value(self.id)?.operands.to_vec()))?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    /// Replace operand `index`. The new operand must have the same type
    /// as the one it replaces.
    pub fn set_operand(self, index: usize, value: Value<'ctx>) -> Result<()> {
        self.ctx.ensure_same(value.ctx)?;
        self.write(|s| {
            let operands = &s.value(self.id)?.operands;
            let old = *operands.get(index).ok_or(Error::IndexOutOfRange {
                index,
                len: operands.len(),
            })?;
            s.expect_type(s.ty(old)?, s.ty(value.id)?)?;
            s.set_operand_raw(self.id, index, value.id)
        })
    }

    // ── Uses ────────────────────────────────────────────────────────

    /// Lazily walk the uses of this value. The iterator reads the graph on
    /// every step; calling `uses()` again restarts the walk.
    pub fn uses(self) -> Uses<'ctx> {
        Uses {
            value: self,
            next: 0,
        }
    }

    pub fn first_use(self) -> Option<Use<'ctx>> {
        self.uses().next()
    }

    pub fn has_uses(self) -> bool {
        self.ctx
            .read(|s| s.value(self.id).is_ok_and(|v| !v.uses.is_empty()))
    }

    pub fn count_uses(self) -> usize {
        self.ctx
            .read(|s| s.value(self.id).map_or(0, |v| v.uses.len()))
    }

    /// Distinct users, in first-use order.
    pub fn users(self) -> Vec<Value<'ctx>> {
        let mut users: Vec<Value<'ctx>> = Vec::new();
        for u in self.uses() {
            if !users.contains(&u.user) {
                users.push(u.user);
            }
        }
        users
    }

    /// Rewrite every use of `self` to use `new`. Both must have the same
    /// type. All-or-nothing: on error nothing was rewritten.
    pub fn replace_all_uses_with(self, new: Value<'ctx>) -> Result<()> {
        self.ctx.ensure_same(new.ctx)?;
        if self == new {
            return Ok(());
        }
        self.write(|s| {
            s.expect_type(s.ty(self.id)?, s.ty(new.id)?)?;
            s.replace_all_uses_raw(self.id, new.id)
        })
    }

    // ── Downcasts ───────────────────────────────────────────────────

    /// The block this label value stands for.
    pub fn as_basic_block(self) -> Result<BasicBlock<'ctx>> {
        let block = self.read(|s| s.label_block(self.id))?;
        Ok(BasicBlock::new(self.ctx, block))
    }

    pub fn is_basic_block(self) -> bool {
        matches!(self.kind(), Ok(ValueKind::BasicBlock))
    }

    pub fn is_instruction(self) -> bool {
        self.kind().is_ok_and(ValueKind::is_instruction)
    }

    pub fn is_function(self) -> bool {
        self.kind().is_ok_and(ValueKind::is_function)
    }

    pub fn is_global(self) -> bool {
        matches!(self.kind(), Ok(ValueKind::Global(_)))
    }

    pub fn is_argument(self) -> bool {
        matches!(self.kind(), Ok(ValueKind::Argument))
    }

    pub fn is_inline_asm(self) -> bool {
        matches!(self.kind(), Ok(ValueKind::InlineAsm))
    }

    // ── Metadata ────────────────────────────────────────────────────

    pub fn has_metadata(self) -> bool {
        self.ctx
            .read(|s| s.value(self.id).is_ok_and(|v| !v.metadata.is_empty()))
    }

    pub fn metadata(self, kind: u32) -> Result<Option<Metadata>> {
        self.read(|s| {
            Ok(s.value(self.id)?
                .metadata
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, node)| node.clone()))
        })
    }

    /// Attach `node` under `kind`, or detach with `None`.
    pub fn set_metadata(self, kind: u32, node: Option<Metadata>) -> Result<()> {
        self.write(|s| {
            let attachments = &mut s.value_mut(self.id)?.metadata;
            attachments.retain(|(k, _)| *k != kind);
            if let Some(node) = node {
                attachments.push((kind, node));
            }
            Ok(())
        })
    }

    /// All attachments, ordered by kind ID.
    pub fn all_metadata(self) -> Result<Vec<(u32, Metadata)>> {
        self.read(|s| {
            let mut all = s.value(self.id)?.metadata.clone();
            all.sort_by_key(|(kind, _)| *kind);
            Ok(all)
        })
    }
}

/// Lazy, restartable walk over the uses of a value.
pub struct Uses<'ctx> {
    value: Value<'ctx>,
    next: usize,
}

impl<'ctx> Iterator for Uses<'ctx> {
    type Item = Use<'ctx>;

    fn next(&mut self) -> Option<Use<'ctx>> {
        let edge = self.value.ctx.read(|s| {
            s.value(self.value.id)
                .ok()
                .and_then(|v| v.uses.get(self.next).copied())
        })?;
        self.next += 1;
        Some(Use {
            user: self.value.wrap(edge.user),
            operand_index: edge.index as usize,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
