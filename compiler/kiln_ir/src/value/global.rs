//! Operations on global values, functions and their parameters.

use crate::attributes::{Attributes, CallConv, Linkage, Visibility};
use crate::block::BasicBlock;
use crate::error::{Error, Result};
use crate::id::ValueId;
use crate::module::ModuleRef;
use crate::store::{GlobalPayload, Store};

use super::Value;

/// Neighbor of `id` in `list` at `offset` (+1 next, -1 previous).
fn neighbor(list: &[ValueId], id: ValueId, offset: isize) -> Option<ValueId> {
    let pos = list.iter().position(|&v| v == id)?;
    let target = pos.checked_add_signed(offset)?;
    list.get(target).copied()
}

impl<'ctx> Value<'ctx> {
    // ── Globals ─────────────────────────────────────────────────────

    /// Module that owns this global.
    pub fn global_parent(self) -> Result<ModuleRef<'ctx>> {
        let module = self.read(|s| Ok(s.global(self.id())?.module))?;
        Ok(ModuleRef::new(self.context(), module))
    }

    /// Functions without blocks and variables without an initializer are
    /// declarations. Aliases never are.
    pub fn is_declaration(self) -> Result<bool> {
        self.read(|s| {
            Ok(match &s.global(self.id())?.kind {
                GlobalPayload::Function(func) => func.blocks.is_empty(),
                GlobalPayload::Variable { .. } => s.value(self.id())?.operands.is_empty(),
                GlobalPayload::Alias => false,
            })
        })
    }

    pub fn linkage(self) -> Result<Linkage> {
        self.read(|s| Ok(s.global(self.id())?.linkage))
    }

    pub fn set_linkage(self, linkage: Linkage) -> Result<()> {
        self.write(|s| {
            s.global_mut(self.id())?.linkage = linkage;
            Ok(())
        })
    }

    pub fn visibility(self) -> Result<Visibility> {
        self.read(|s| Ok(s.global(self.id())?.visibility))
    }

    pub fn set_visibility(self, visibility: Visibility) -> Result<()> {
        self.write(|s| {
            s.global_mut(self.id())?.visibility = visibility;
            Ok(())
        })
    }

    pub fn section(self) -> Result<Option<String>> {
        self.read(|s| Ok(s.global(self.id())?.section.clone()))
    }

    /// Set the output section; an empty name clears it.
    pub fn set_section(self, section: &str) -> Result<()> {
        self.write(|s| {
            s.global_mut(self.id())?.section =
                (!section.is_empty()).then(|| section.to_owned());
            Ok(())
        })
    }

    /// Alignment in bytes, 0 when unspecified.
    pub fn alignment(self) -> Result<u32> {
        self.read(|s| Ok(s.global(self.id())?.alignment))
    }

    /// Set the alignment. Must be zero or a power of two.
    pub fn set_alignment(self, bytes: u32) -> Result<()> {
        if bytes != 0 && !bytes.is_power_of_two() {
            return Err(Error::invalid_operand(format!(
                "alignment {bytes} is not a power of two"
            )));
        }
        self.write(|s| {
            s.global_mut(self.id())?.alignment = bytes;
            Ok(())
        })
    }

    /// Release an unused global variable or alias, or a function (see
    /// [`Value::delete_function`]).
    pub fn delete_global(self) -> Result<()> {
        self.write(|s| s.delete_global(self.id()))?;
        tracing::trace!("global deleted");
        Ok(())
    }

    pub fn next_global(self) -> Option<Value<'ctx>> {
        self.sibling_global(1)
    }

    pub fn previous_global(self) -> Option<Value<'ctx>> {
        self.sibling_global(-1)
    }

    fn sibling_global(self, offset: isize) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| {
                let module = s.module(s.global(self.id()).ok()?.module).ok()?;
                neighbor(&module.globals, self.id(), offset)
            })
            .map(|id| self.wrap(id))
    }

    // ── Global variables ────────────────────────────────────────────

    fn variable_flags(s: &Store, id: ValueId) -> Result<(bool, bool)> {
        match s.global(id)?.kind {
            GlobalPayload::Variable {
                thread_local,
                constant,
            } => Ok((thread_local, constant)),
            _ => Err(s.kind_mismatch("global variable", id)),
        }
    }

    fn set_variable_flags(self, f: impl FnOnce(&mut bool, &mut bool)) -> Result<()> {
        self.write(|s| {
            let id = self.id();
            Self::variable_flags(s, id)?;
            if let GlobalPayload::Variable {
                thread_local,
                constant,
            } = &mut s.global_mut(id)?.kind
            {
                f(thread_local, constant);
            }
            Ok(())
        })
    }

    /// Initializer of a global variable, `None` for declarations.
    pub fn initializer(self) -> Result<Option<Value<'ctx>>> {
        let id = self.read(|s| {
            Self::variable_flags(s, self.id())?;
            Ok(s.value(self.id())?.operands.first().copied())
        })?;
        Ok(id.map(|id| self.wrap(id)))
    }

    /// Set or clear the initializer. It must be a constant of the
    /// variable's value type.
    pub fn set_initializer(self, init: Option<Value<'ctx>>) -> Result<()> {
        if let Some(init) = init {
            self.context().ensure_same(init.context())?;
        }
        self.write(|s| {
            Self::variable_flags(s, self.id())?;
            match init {
                Some(init) => {
                    if !s.is_constant(init.id()) {
                        return Err(Error::invalid_operand("initializer must be a constant"));
                    }
                    let value_ty = s
                        .types
                        .pointee(s.ty(self.id())?)
                        .ok_or(Error::Disposed)?;
                    s.expect_type(value_ty, s.ty(init.id())?)?;
                    s.replace_operands(self.id(), &[init.id()])
                }
                None => s.drop_operands(self.id()),
            }
        })
    }

    pub fn is_thread_local(self) -> Result<bool> {
        self.read(|s| Ok(Self::variable_flags(s, self.id())?.0))
    }

    pub fn set_thread_local(self, value: bool) -> Result<()> {
        self.set_variable_flags(|thread_local, _| *thread_local = value)
    }

    pub fn is_global_constant(self) -> Result<bool> {
        self.read(|s| Ok(Self::variable_flags(s, self.id())?.1))
    }

    pub fn set_global_constant(self, value: bool) -> Result<()> {
        self.set_variable_flags(|_, constant| *constant = value)
    }

    /// Target of an alias.
    pub fn aliasee(self) -> Result<Value<'ctx>> {
        let id = self.read(|s| match s.global(self.id())?.kind {
            GlobalPayload::Alias => s
                .value(self.id())?
                .operands
                .first()
                .copied()
                .ok_or(Error::Disposed),
            _ => Err(s.kind_mismatch("global alias", self.id())),
        })?;
        Ok(self.wrap(id))
    }

    // ── Functions ───────────────────────────────────────────────────

    pub fn next_function(self) -> Option<Value<'ctx>> {
        self.sibling_function(1)
    }

    pub fn previous_function(self) -> Option<Value<'ctx>> {
        self.sibling_function(-1)
    }

    fn sibling_function(self, offset: isize) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| {
                let module = s.module(s.global(self.id()).ok()?.module).ok()?;
                neighbor(&module.functions, self.id(), offset)
            })
            .map(|id| self.wrap(id))
    }

    /// Release a function with its body. Fails with `StillInUse` while
    /// anything outside the function refers to it or its contents.
    pub fn delete_function(self) -> Result<()> {
        self.write(|s| s.delete_function(self.id()))?;
        tracing::trace!("function deleted");
        Ok(())
    }

    /// Release every block of the function, turning it into a declaration.
    pub fn delete_function_body(self) -> Result<()> {
        self.write(|s| s.delete_function_body(self.id()))
    }

    /// Nonzero for recognised intrinsics such as `llvm.memcpy.*`.
    pub fn intrinsic_id(self) -> Result<u32> {
        self.read(|s| Ok(s.function(self.id())?.intrinsic_id))
    }

    pub fn call_conv(self) -> Result<CallConv> {
        self.read(|s| Ok(s.function(self.id())?.call_conv))
    }

    pub fn set_call_conv(self, cc: CallConv) -> Result<()> {
        self.write(|s| {
            s.function_mut(self.id())?.call_conv = cc;
            Ok(())
        })
    }

    /// Garbage collector strategy name.
    pub fn gc(self) -> Result<Option<String>> {
        self.read(|s| Ok(s.function(self.id())?.gc.clone()))
    }

    pub fn set_gc(self, name: Option<&str>) -> Result<()> {
        self.write(|s| {
            s.function_mut(self.id())?.gc = name.map(str::to_owned);
            Ok(())
        })
    }

    pub fn function_attrs(self) -> Result<Attributes> {
        self.read(|s| Ok(s.function(self.id())?.attrs))
    }

    pub fn add_function_attr(self, attrs: Attributes) -> Result<()> {
        self.write(|s| {
            s.function_mut(self.id())?.attrs.insert(attrs);
            Ok(())
        })
    }

    pub fn remove_function_attr(self, attrs: Attributes) -> Result<()> {
        self.write(|s| {
            s.function_mut(self.id())?.attrs.remove(attrs);
            Ok(())
        })
    }

    /// Run the verifier over this function only.
    pub fn verify_function(self) -> Result<()> {
        self.read(|s| crate::verify::verify_function(s, self.id()))
    }

    // ── Parameters ──────────────────────────────────────────────────

    pub fn count_params(self) -> Result<usize> {
        self.read(|s| Ok(s.function(self.id())?.params.len()))
    }

    pub fn params(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.read(|s| Ok(s.function(self.id())?.params.clone()))?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    pub fn param(self, index: usize) -> Result<Value<'ctx>> {
        let id = self.read(|s| {
            let params = &s.function(self.id())?.params;
            params.get(index).copied().ok_or(Error::IndexOutOfRange {
                index,
                len: params.len(),
            })
        })?;
        Ok(self.wrap(id))
    }

    pub fn first_param(self) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| s.function(self.id()).ok()?.params.first().copied())
            .map(|id| self.wrap(id))
    }

    pub fn last_param(self) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| s.function(self.id()).ok()?.params.last().copied())
            .map(|id| self.wrap(id))
    }

    pub fn next_param(self) -> Option<Value<'ctx>> {
        self.sibling_param(1)
    }

    pub fn previous_param(self) -> Option<Value<'ctx>> {
        self.sibling_param(-1)
    }

    fn sibling_param(self, offset: isize) -> Option<Value<'ctx>> {
        self.context()
            .read(|s| {
                let function = s.argument(self.id()).ok()?.function;
                neighbor(&s.function(function).ok()?.params, self.id(), offset)
            })
            .map(|id| self.wrap(id))
    }

    /// Function declaring this parameter.
    pub fn param_parent(self) -> Result<Value<'ctx>> {
        let id = self.read(|s| Ok(s.argument(self.id())?.function))?;
        Ok(self.wrap(id))
    }

    pub fn param_attrs(self) -> Result<Attributes> {
        self.read(|s| Ok(s.argument(self.id())?.attrs))
    }

    pub fn add_param_attr(self, attrs: Attributes) -> Result<()> {
        self.write(|s| {
            s.argument_mut(self.id())?.attrs.insert(attrs);
            Ok(())
        })
    }

    pub fn remove_param_attr(self, attrs: Attributes) -> Result<()> {
        self.write(|s| {
            s.argument_mut(self.id())?.attrs.remove(attrs);
            Ok(())
        })
    }

    pub fn param_alignment(self) -> Result<u32> {
        self.read(|s| Ok(s.argument(self.id())?.alignment))
    }

    pub fn set_param_alignment(self, bytes: u32) -> Result<()> {
        if bytes != 0 && !bytes.is_power_of_two() {
            return Err(Error::invalid_operand(format!(
                "alignment {bytes} is not a power of two"
            )));
        }
        self.write(|s| {
            s.argument_mut(self.id())?.alignment = bytes;
            Ok(())
        })
    }

    // ── Function body ───────────────────────────────────────────────

    pub fn count_basic_blocks(self) -> Result<usize> {
        self.read(|s| Ok(s.function(self.id())?.blocks.len()))
    }

    /// Blocks in layout order.
    pub fn basic_blocks(self) -> Result<Vec<BasicBlock<'ctx>>> {
        let ids = self.read(|s| Ok(s.function(self.id())?.blocks.clone()))?;
        Ok(ids
            .into_iter()
            .map(|id| BasicBlock::new(self.context(), id))
            .collect())
    }

    pub fn first_basic_block(self) -> Option<BasicBlock<'ctx>> {
        self.context()
            .read(|s| s.function(self.id()).ok()?.blocks.first().copied())
            .map(|id| BasicBlock::new(self.context(), id))
    }

    pub fn last_basic_block(self) -> Option<BasicBlock<'ctx>> {
        self.context()
            .read(|s| s.function(self.id()).ok()?.blocks.last().copied())
            .map(|id| BasicBlock::new(self.context(), id))
    }

    /// The first block, where execution starts.
    pub fn entry_basic_block(self) -> Result<BasicBlock<'ctx>> {
        let id = self.read(|s| {
            let first = s.function(self.id())?.blocks.first().copied();
            match first {
                Some(block) => Ok(block),
                None => Err(Error::NotFound(format!(
                    "entry block of `@{}`",
                    s.value(self.id())?.name
                ))),
            }
        })?;
        Ok(BasicBlock::new(self.context(), id))
    }

    /// Append a new, empty block to this function.
    pub fn append_basic_block(self, name: &str) -> Result<BasicBlock<'ctx>> {
        let block = self.write(|s| s.append_block(self.id(), name))?;
        Ok(BasicBlock::new(self.context(), block))
    }
}
