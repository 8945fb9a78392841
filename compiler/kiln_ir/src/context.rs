//! The root lifetime scope for IR objects.
//!
//! A [`Context`] owns every type, constant and IR object created through
//! it. Handles (`Type<'ctx>`, `Value<'ctx>`, `BasicBlock<'ctx>`,
//! `Module<'ctx>`, `Builder<'ctx>`) borrow the context, so none of them can
//! outlive it.
//!
//! # Threading
//!
//! A context is used from one logical thread at a time. The store lives in
//! a `RefCell`, which makes `&Context` (and therefore every handle) neither
//! `Send` nor `Sync`. A whole `Context` may still be moved to another thread
//! when no handles borrow it.
//!
//! Internally every operation borrows the store for the duration of one
//! closure; no borrow is held across calls into other handle methods.

use std::cell::RefCell;
use std::fmt;

use crate::block::BasicBlock;
use crate::builder::Builder;
use crate::error::{Error, Result};
use crate::id::ContextId;
use crate::module::Module;
use crate::store::Store;
use crate::value::Value;

/// Owner of all types, constants and IR objects.
pub struct Context {
    id: ContextId,
    store: RefCell<Store>,
}

impl Context {
    pub fn new() -> Self {
        let id = ContextId::fresh();
        tracing::debug!(context = id.raw(), "context created");
        Self {
            id,
            store: RefCell::new(Store::new()),
        }
    }

    /// Process-unique identity of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        f(&self.store.borrow())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.store.borrow_mut())
    }

    /// Fail with `ContextMismatch` unless `other` is this context.
    pub(crate) fn ensure_same(&self, other: &Context) -> Result<()> {
        if self.id == other.id {
            Ok(())
        } else {
            Err(Error::ContextMismatch)
        }
    }

    /// Create an empty module owned by the caller.
    pub fn create_module(&self, name: &str) -> Module<'_> {
        Module::create(self, name)
    }

    /// Create an unpositioned builder.
    pub fn create_builder(&self) -> Builder<'_> {
        Builder::new(self)
    }

    /// Append a block to `function`, checking that the function belongs
    /// to this context.
    pub fn append_basic_block<'ctx>(&'ctx self, function: Value<'ctx>, name: &str) -> Result<BasicBlock<'ctx>> {
        self.ensure_same(function.context())?;
        function.append_basic_block(name)
    }

    /// Insert a block before `before`, checking that it belongs to this
    /// context.
    pub fn insert_basic_block<'ctx>(&'ctx self, before: BasicBlock<'ctx>, name: &str) -> Result<BasicBlock<'ctx>> {
        self.ensure_same(before.context())?;
        before.insert_before(name)
    }

    /// Stable ID for a metadata kind name. `"dbg"` is always kind 0.
    pub fn md_kind_id(&self, name: &str) -> u32 {
        self.write(|s| s.md_kind_id(name))
    }

    /// Name registered for a metadata kind ID.
    pub fn md_kind_name(&self, kind: u32) -> Option<String> {
        self.read(|s| s.md_kind_name(kind).map(str::to_owned))
    }

    /// Number of live modules.
    pub fn module_count(&self) -> usize {
        self.read(|s| s.modules.len())
    }

    /// Number of live values (constants, globals, arguments, labels and
    /// instructions).
    pub fn value_count(&self) -> usize {
        self.read(|s| s.values.len())
    }

    /// Number of distinct types.
    pub fn type_count(&self) -> usize {
        self.read(|s| s.types.len())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
