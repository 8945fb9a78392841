//! Modules: named collections of functions, global variables and aliases.
//!
//! # Ownership
//!
//! [`Module`] is the owning handle. Exactly one party owns a module at a
//! time: the caller holding the `Module` value, or an execution engine
//! the module was moved into. Ownership transfer is a move, so transferring
//! twice or disposing after transfer does not compile:
//!
//! ```compile_fail
//! let ctx = kiln_ir::Context::new();
//! let module = ctx.create_module("m");
//! let moved = module;
//! module.dispose(); // use of moved value
//! # drop(moved);
//! ```
//!
//! The store additionally records the current [`Owner`] so services that
//! take modules can reject a transfer from the wrong owner at runtime.
//!
//! [`ModuleRef`] is the observing handle (`Copy`). Any number may exist;
//! once the module is released, every operation through them fails with
//! [`Error::Disposed`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::attributes::{CallConv, Linkage, Visibility};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::{ModuleId, ValueId};
use crate::store::{FunctionData, GlobalData, GlobalPayload, ModuleData, Payload, Store};
use crate::types::Type;
use crate::value::Value;

/// Current owner of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The caller holds the owning [`Module`] handle.
    Caller,
    /// An execution engine, identified by its engine ID.
    Engine(u32),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Caller => f.write_str("the caller"),
            Owner::Engine(id) => write!(f, "execution engine #{id}"),
        }
    }
}

/// Observing handle to a module.
#[derive(Clone, Copy)]
pub struct ModuleRef<'ctx> {
    ctx: &'ctx Context,
    id: ModuleId,
}

impl PartialEq for ModuleRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.id() == other.ctx.id() && self.id == other.id
    }
}

impl Eq for ModuleRef<'_> {}

impl Hash for ModuleRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ctx.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for ModuleRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or_else(|_| "<disposed>".to_owned());
        f.debug_struct("ModuleRef").field("name", &name).finish()
    }
}

/// Owning handle to a module. Releases the module when dropped.
pub struct Module<'ctx> {
    handle: ModuleRef<'ctx>,
}

impl<'ctx> Deref for Module<'ctx> {
    type Target = ModuleRef<'ctx>;

    fn deref(&self) -> &ModuleRef<'ctx> {
        &self.handle
    }
}

impl fmt::Debug for Module<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Module").field(&self.handle).finish()
    }
}

impl Drop for Module<'_> {
    fn drop(&mut self) {
        let id = self.handle.id;
        if let Err(err) = self.handle.ctx.write(|s| s.dispose_module(id)) {
            tracing::warn!(%err, "module already released");
        }
    }
}

impl<'ctx> Module<'ctx> {
    pub(crate) fn create(ctx: &'ctx Context, name: &str) -> Self {
        let id = ctx.write(|s| {
            s.modules.insert(ModuleData {
                name: name.to_owned(),
                data_layout: String::new(),
                target_triple: String::new(),
                inline_asm: String::new(),
                functions: Vec::new(),
                globals: Vec::new(),
                aliases: Vec::new(),
                owner: Owner::Caller,
            })
        });
        tracing::debug!(module = name, "module created");
        Self {
            handle: ModuleRef { ctx, id },
        }
    }

    /// An observing handle that may outlive this borrow.
    pub fn as_module_ref(&self) -> ModuleRef<'ctx> {
        self.handle
    }

    /// Release the module and everything in it.
    pub fn dispose(self) {
        drop(self);
    }

    /// Record a change of owner. Fails with `OwnerMismatch` unless `from`
    /// is the current owner. Used by services that take modules over.
    pub fn transfer_ownership(&self, from: Owner, to: Owner) -> Result<()> {
        let id = self.handle.id;
        self.handle.ctx.write(|s| s.transfer_module(id, from, to))?;
        tracing::debug!(from = %from, to = %to, "module ownership transferred");
        Ok(())
    }
}

impl<'ctx> ModuleRef<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, id: ModuleId) -> Self {
        Self { ctx, id }
    }

    pub fn context(self) -> &'ctx Context {
        self.ctx
    }

    /// Whether the module has not been released.
    pub fn is_alive(self) -> bool {
        self.ctx.read(|s| s.modules.contains(self.id))
    }

    pub fn owner(self) -> Result<Owner> {
        self.ctx.read(|s| Ok(s.module(self.id)?.owner))
    }

    fn get<R>(self, f: impl FnOnce(&ModuleData) -> R) -> Result<R> {
        self.ctx.read(|s| s.module(self.id).map(f))
    }

    fn set(self, f: impl FnOnce(&mut ModuleData)) -> Result<()> {
        self.ctx.write(|s| s.module_mut(self.id).map(f))
    }

    pub fn name(self) -> Result<String> {
        self.get(|m| m.name.clone())
    }

    pub fn data_layout(self) -> Result<String> {
        self.get(|m| m.data_layout.clone())
    }

    pub fn set_data_layout(self, layout: &str) -> Result<()> {
        self.set(|m| m.data_layout = layout.to_owned())
    }

    pub fn target_triple(self) -> Result<String> {
        self.get(|m| m.target_triple.clone())
    }

    pub fn set_target_triple(self, triple: &str) -> Result<()> {
        self.set(|m| m.target_triple = triple.to_owned())
    }

    /// Module-level inline assembly.
    pub fn inline_asm(self) -> Result<String> {
        self.get(|m| m.inline_asm.clone())
    }

    pub fn set_inline_asm(self, asm: &str) -> Result<()> {
        self.set(|m| m.inline_asm = asm.to_owned())
    }

    fn wrap(self, id: ValueId) -> Value<'ctx> {
        Value::new(self.ctx, id)
    }

    // ── Functions ───────────────────────────────────────────────────

    /// Declare a function of type `fn_type`. The function has no body
    /// until a block is appended. A taken name gets a numeric suffix.
    pub fn add_function(self, name: &str, fn_type: Type<'ctx>) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(fn_type.context())?;
        let module = self.id;
        let id = self.ctx.write(|s| {
            s.module(module)?;
            let fn_ty = fn_type.id();
            let params = s
                .types
                .function_info(fn_ty)
                .map(|(_, params, _)| params.to_vec())
                .ok_or_else(|| Error::KindMismatch {
                    expected: "function type",
                    found: format!("`{}`", s.type_name(fn_ty)),
                })?;
            let ptr_ty = s.types.pointer(fn_ty, 0)?;
            let name = unique_symbol(s, module, name);
            let intrinsic_id = intrinsic_id(&name);
            let function = s.alloc_value(
                ptr_ty,
                name,
                Payload::Global(Box::new(GlobalData {
                    module,
                    linkage: Linkage::External,
                    visibility: Visibility::Default,
                    section: None,
                    alignment: 0,
                    kind: GlobalPayload::Function(FunctionData {
                        params: Vec::new(),
                        blocks: Vec::new(),
                        call_conv: CallConv::C,
                        gc: None,
                        attrs: crate::Attributes::empty(),
                        intrinsic_id,
                    }),
                })),
                &[],
            );
            let args: Vec<_> = params
                .iter()
                .map(|&ty| {
                    s.alloc_value(
                        ty,
                        String::new(),
                        Payload::Argument(crate::store::ArgumentData {
                            function,
                            attrs: crate::Attributes::empty(),
                            alignment: 0,
                        }),
                        &[],
                    )
                })
                .collect();
            s.function_mut(function)?.params = args;
            s.module_mut(module)?.functions.push(function);
            Ok::<_, Error>(function)
        })?;
        tracing::trace!(function = name, "function added");
        Ok(self.wrap(id))
    }

    pub fn get_function(self, name: &str) -> Option<Value<'ctx>> {
        self.ctx
            .read(|s| {
                let module = s.module(self.id).ok()?;
                module
                    .functions
                    .iter()
                    .copied()
                    .find(|&f| s.value(f).is_ok_and(|v| v.name == name))
            })
            .map(|id| self.wrap(id))
    }

    /// Functions in declaration order.
    pub fn functions(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.get(|m| m.functions.clone())?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    pub fn first_function(self) -> Option<Value<'ctx>> {
        self.get(|m| m.functions.first().copied())
            .ok()
            .flatten()
            .map(|id| self.wrap(id))
    }

    pub fn last_function(self) -> Option<Value<'ctx>> {
        self.get(|m| m.functions.last().copied())
            .ok()
            .flatten()
            .map(|id| self.wrap(id))
    }

    // ── Global variables ────────────────────────────────────────────

    /// Declare a global variable of type `ty`; its value is a pointer
    /// to `ty`.
    pub fn add_global(self, ty: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.add_global_in_address_space(ty, name, 0)
    }

    pub fn add_global_in_address_space(
        self,
        ty: Type<'ctx>,
        name: &str,
        address_space: u32,
    ) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        let module = self.id;
        let id = self.ctx.write(|s| {
            s.module(module)?;
            if !s.types.is_first_class(ty.id()) || !s.types.is_sized(ty.id()) {
                return Err(Error::invalid_type(format!(
                    "global variable of type `{}`",
                    s.type_name(ty.id())
                )));
            }
            let ptr_ty = s.types.pointer(ty.id(), address_space)?;
            let name = unique_symbol(s, module, name);
            let global = s.alloc_value(
                ptr_ty,
                name,
                Payload::Global(Box::new(GlobalData {
                    module,
                    linkage: Linkage::External,
                    visibility: Visibility::Default,
                    section: None,
                    alignment: 0,
                    kind: GlobalPayload::Variable {
                        thread_local: false,
                        constant: false,
                    },
                })),
                &[],
            );
            s.module_mut(module)?.globals.push(global);
            Ok(global)
        })?;
        Ok(self.wrap(id))
    }

    pub fn get_global(self, name: &str) -> Option<Value<'ctx>> {
        self.ctx
            .read(|s| {
                let module = s.module(self.id).ok()?;
                module
                    .globals
                    .iter()
                    .copied()
                    .find(|&g| s.value(g).is_ok_and(|v| v.name == name))
            })
            .map(|id| self.wrap(id))
    }

    /// Global variables in declaration order.
    pub fn globals(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.get(|m| m.globals.clone())?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    pub fn first_global(self) -> Option<Value<'ctx>> {
        self.get(|m| m.globals.first().copied())
            .ok()
            .flatten()
            .map(|id| self.wrap(id))
    }

    pub fn last_global(self) -> Option<Value<'ctx>> {
        self.get(|m| m.globals.last().copied())
            .ok()
            .flatten()
            .map(|id| self.wrap(id))
    }

    // ── Aliases ─────────────────────────────────────────────────────

    /// Add an alias of type `ty` (a pointer type) for `aliasee`.
    pub fn add_alias(self, ty: Type<'ctx>, aliasee: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        self.ctx.ensure_same(aliasee.context())?;
        let module = self.id;
        let id = self.ctx.write(|s| {
            s.module(module)?;
            if !s.is_constant(aliasee.id()) {
                return Err(Error::invalid_operand("alias target must be a constant"));
            }
            s.expect_type(ty.id(), s.ty(aliasee.id())?)?;
            let name = unique_symbol(s, module, name);
            let alias = s.alloc_value(
                ty.id(),
                name,
                Payload::Global(Box::new(GlobalData {
                    module,
                    linkage: Linkage::External,
                    visibility: Visibility::Default,
                    section: None,
                    alignment: 0,
                    kind: GlobalPayload::Alias,
                })),
                &[aliasee.id()],
            );
            s.module_mut(module)?.aliases.push(alias);
            Ok(alias)
        })?;
        Ok(self.wrap(id))
    }

    pub fn aliases(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.get(|m| m.aliases.clone())?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    pub fn get_alias(self, name: &str) -> Option<Value<'ctx>> {
        self.ctx
            .read(|s| {
                let module = s.module(self.id).ok()?;
                module
                    .aliases
                    .iter()
                    .copied()
                    .find(|&a| s.value(a).is_ok_and(|v| v.name == name))
            })
            .map(|id| self.wrap(id))
    }

    /// Named struct type from the module's context.
    pub fn get_type(self, name: &str) -> Option<Type<'ctx>> {
        self.ctx.get_struct_type(name)
    }

    // ── Verification and printing ───────────────────────────────────

    /// Run the structural verifier over every function and global.
    pub fn verify(self) -> Result<()> {
        self.ctx.read(|s| crate::verify::verify_module(s, self.id))
    }

    pub fn print_to_string(self) -> Result<String> {
        self.ctx.read(|s| crate::print::print_module(s, self.id))
    }

    /// Print to stderr.
    pub fn dump(self) {
        match self.print_to_string() {
            Ok(text) => eprint!("{text}"),
            Err(err) => eprintln!("<{err}>"),
        }
    }
}

/// `name`, or `name.N` for the first free `N` if the module already has a
/// global with that name. Empty names stay empty.
fn unique_symbol(s: &Store, module: ModuleId, name: &str) -> String {
    unique_symbol_impl(s, module, name, None)
}

/// Like `unique_symbol`, ignoring the current name of `exclude`.
pub(crate) fn unique_symbol_excluding(s: &Store, module: ModuleId, name: &str, exclude: ValueId) -> String {
    unique_symbol_impl(s, module, name, Some(exclude))
}

fn unique_symbol_impl(s: &Store, module: ModuleId, name: &str, exclude: Option<ValueId>) -> String {
    let Ok(data) = s.module(module) else {
        return name.to_owned();
    };
    let taken = |candidate: &str| {
        data.functions
            .iter()
            .chain(&data.globals)
            .chain(&data.aliases)
            .filter(|&&g| Some(g) != exclude)
            .any(|&g| s.value(g).is_ok_and(|v| v.name == candidate))
    };
    if name.is_empty() || !taken(name) {
        return name.to_owned();
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{name}.{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Intrinsic families recognised by name (`llvm.memcpy.*` etc).
const INTRINSICS: [&str; 12] = [
    "llvm.memcpy",
    "llvm.memmove",
    "llvm.memset",
    "llvm.sqrt",
    "llvm.powi",
    "llvm.sin",
    "llvm.cos",
    "llvm.pow",
    "llvm.trap",
    "llvm.stacksave",
    "llvm.stackrestore",
    "llvm.va_start",
];

/// Nonzero for names of known intrinsics.
pub(crate) fn intrinsic_id(name: &str) -> u32 {
    INTRINSICS
        .iter()
        .position(|base| {
            name == *base
                || name
                    .strip_prefix(base)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .map_or(0, |pos| pos as u32 + 1)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
