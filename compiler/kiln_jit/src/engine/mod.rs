//! The execution engine.
//!
//! An engine owns the modules it was given and runs their functions on
//! demand. Functions are lowered on their first call; with
//! [`EngineKind::Jit`] the lowered form stays cached until
//! [`ExecutionEngine::free_machine_code_for_function`] drops it, while
//! [`EngineKind::Interpreter`] lowers on every call.
//!
//! Global variables get their storage lazily, the first time their address
//! is taken, and are initialized from their initializer at that point.
//! Function addresses are opaque one-byte code regions used only as call
//! targets.

mod builtins;
mod constants;
mod encode;
mod exec;
mod lower;
mod ops;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use kiln_ir::{arith, Context, DataLayout, GlobalKind, Module, ModuleRef, Owner, Type, TypeKind, Value, ValueKind};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result, Trap};
use crate::generic_value::{Data, GenericValue};
use crate::memory::{Memory, RegionKind};
use crate::target;
use lower::Compiled;

static NEXT_ENGINE_ID: AtomicU32 = AtomicU32::new(1);

/// Backend selection. Determines caching and target requirements through
/// policy methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Compile each function once and keep the result.
    #[default]
    Jit,
    /// Lower on every call; needs no target initialization.
    Interpreter,
}

impl EngineKind {
    /// Whether lowered functions are kept between calls.
    #[inline]
    pub fn caches_code(self) -> bool {
        matches!(self, Self::Jit)
    }

    /// Whether creation requires [`target::initialize_native_target`].
    #[inline]
    pub fn requires_native_target(self) -> bool {
        matches!(self, Self::Jit)
    }
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    pub kind: EngineKind,
    /// 0..=3.
    pub opt_level: u32,
    /// Frames allowed on the call stack, the outermost call included.
    pub max_call_depth: usize,
    /// Bytes of `alloca` storage live at once.
    pub stack_size_limit: u64,
    /// Bytes of `malloc` storage live at once.
    pub heap_size_limit: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            kind: EngineKind::Jit,
            opt_level: 2,
            max_call_depth: 1024,
            stack_size_limit: 8 << 20,
            heap_size_limit: 256 << 20,
        }
    }
}

impl EngineOptions {
    /// Diagnostic for options no backend can honor.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.opt_level > 3 {
            return Err(format!(
                "optimization level {} is out of range (0..=3)",
                self.opt_level
            ));
        }
        if self.max_call_depth == 0 {
            return Err("maximum call depth must be at least 1".to_owned());
        }
        if self.kind.requires_native_target() && !target::is_native_target_initialized() {
            return Err("native target is not initialized".to_owned());
        }
        Ok(())
    }
}

/// Callback standing in for an external function. Receives the engine
/// memory and the call arguments.
pub type HostFunction<'ctx> = Box<dyn FnMut(&mut Memory, &[GenericValue]) -> Result<GenericValue> + 'ctx>;

/// A module the engine refused, handed back together with the reason.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RejectedModule<'ctx> {
    error: Error,
    module: Module<'ctx>,
}

impl<'ctx> RejectedModule<'ctx> {
    fn new(error: impl Into<Error>, module: Module<'ctx>) -> Self {
        Self {
            error: error.into(),
            module,
        }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn into_error(self) -> Error {
        self.error
    }

    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    pub fn into_parts(self) -> (Error, Module<'ctx>) {
        (self.error, self.module)
    }
}

/// Executes functions of the modules it owns.
pub struct ExecutionEngine<'ctx> {
    id: u32,
    ctx: &'ctx Context,
    options: EngineOptions,
    modules: Vec<Module<'ctx>>,
    layout: DataLayout,
    memory: Memory,
    cache: FxHashMap<Value<'ctx>, Rc<Compiled<'ctx>>>,
    /// Addresses of globals whose storage exists or was mapped.
    globals: FxHashMap<Value<'ctx>, u64>,
    /// Function addresses back to their functions.
    code: FxHashMap<u64, Value<'ctx>>,
    /// Host callbacks by symbol name.
    hosts: FxHashMap<String, HostFunction<'ctx>>,
}

impl fmt::Debug for ExecutionEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("modules", &self.modules)
            .field("compiled", &self.cache.len())
            .field("host_functions", &self.hosts.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutionEngine<'_> {
    fn drop(&mut self) {
        tracing::debug!(engine = self.id, modules = self.modules.len(), "execution engine disposed");
    }
}

/// Print module IR to stderr when `KILN_DEBUG_IR` is set.
fn debug_print_ir(module: ModuleRef<'_>) {
    if std::env::var("KILN_DEBUG_IR").is_ok_and(|v| !v.is_empty()) {
        let name = module.name().unwrap_or_default();
        match module.print_to_string() {
            Ok(ir) => {
                eprintln!("=== Kiln IR for {name} ===");
                eprintln!("{ir}");
                eprintln!("=== END IR ===");
            }
            Err(err) => eprintln!("=== Kiln IR for {name} unavailable: {err} ==="),
        }
    }
}

fn data_layout_for(module: ModuleRef<'_>, kind: EngineKind) -> Result<DataLayout> {
    let text = module.data_layout()?;
    if !text.is_empty() {
        return Ok(DataLayout::parse(&text)?);
    }
    match target::native_target() {
        Some(native) if kind == EngineKind::Jit => Ok(DataLayout::parse(&native.data_layout)?),
        _ => Ok(DataLayout::default()),
    }
}

fn not_a_global(value: Value<'_>) -> Error {
    let found = value
        .kind()
        .map_or_else(|_| "a disposed value".to_owned(), |kind| format!("{kind:?}"));
    kiln_ir::Error::KindMismatch {
        expected: "global value",
        found,
    }
    .into()
}

impl<'ctx> ExecutionEngine<'ctx> {
    /// Create a JIT engine if the native target is initialized, an
    /// interpreter otherwise.
    pub fn create_for_module(module: Module<'ctx>) -> std::result::Result<Self, RejectedModule<'ctx>> {
        let kind = if target::is_native_target_initialized() {
            EngineKind::Jit
        } else {
            EngineKind::Interpreter
        };
        Self::with_options(
            module,
            EngineOptions {
                kind,
                ..EngineOptions::default()
            },
        )
    }

    pub fn create_interpreter_for_module(module: Module<'ctx>) -> std::result::Result<Self, RejectedModule<'ctx>> {
        Self::with_options(
            module,
            EngineOptions {
                kind: EngineKind::Interpreter,
                ..EngineOptions::default()
            },
        )
    }

    pub fn create_jit_compiler_for_module(
        module: Module<'ctx>,
        opt_level: u32,
    ) -> std::result::Result<Self, RejectedModule<'ctx>> {
        Self::with_options(
            module,
            EngineOptions {
                kind: EngineKind::Jit,
                opt_level,
                ..EngineOptions::default()
            },
        )
    }

    /// Verify `module`, build the backend and take ownership. On failure
    /// the module comes back inside the error.
    pub fn with_options(
        module: Module<'ctx>,
        options: EngineOptions,
    ) -> std::result::Result<Self, RejectedModule<'ctx>> {
        if let Err(err) = module.verify() {
            return Err(RejectedModule::new(err, module));
        }
        if let Err(diagnostic) = options.validate() {
            return Err(RejectedModule::new(Error::CreationFailed { diagnostic }, module));
        }
        let layout = match data_layout_for(module.as_module_ref(), options.kind) {
            Ok(layout) => layout,
            Err(err) => {
                let diagnostic = err.to_string();
                return Err(RejectedModule::new(Error::CreationFailed { diagnostic }, module));
            }
        };
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = module.transfer_ownership(Owner::Caller, Owner::Engine(id)) {
            return Err(RejectedModule::new(err, module));
        }
        debug_print_ir(module.as_module_ref());
        tracing::debug!(
            engine = id,
            kind = ?options.kind,
            opt_level = options.opt_level,
            "execution engine created"
        );
        Ok(Self {
            id,
            ctx: module.context(),
            memory: Memory::new(
                layout.is_big_endian(),
                options.stack_size_limit,
                options.heap_size_limit,
            ),
            options,
            modules: vec![module],
            layout,
            cache: FxHashMap::default(),
            globals: FxHashMap::default(),
            code: FxHashMap::default(),
            hosts: FxHashMap::default(),
        })
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn kind(&self) -> EngineKind {
        self.options.kind
    }

    pub fn opt_level(&self) -> u32 {
        self.options.opt_level
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Observing handles of the owned modules, in the order they were added.
    pub fn modules(&self) -> Vec<ModuleRef<'ctx>> {
        self.modules.iter().map(|m| m.as_module_ref()).collect()
    }

    pub fn target_data(&self) -> &DataLayout {
        &self.layout
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    // ── Module ownership ────────────────────────────────────────────

    /// Take ownership of another module of the same context.
    ///
    /// The module is moved in, so it cannot be added a second time:
    ///
    /// ```compile_fail
    /// let ctx = kiln_ir::Context::new();
    /// let main = ctx.create_module("main");
    /// let extra = ctx.create_module("extra");
    /// let Ok(mut engine) = kiln_jit::ExecutionEngine::create_interpreter_for_module(main) else {
    ///     return;
    /// };
    /// let _ = engine.add_module(extra);
    /// let _ = engine.add_module(extra); // use of moved value
    /// ```
    ///
    /// nor disposed by the caller once the engine owns it:
    ///
    /// ```compile_fail
    /// let ctx = kiln_ir::Context::new();
    /// let main = ctx.create_module("main");
    /// let extra = ctx.create_module("extra");
    /// let Ok(mut engine) = kiln_jit::ExecutionEngine::create_interpreter_for_module(main) else {
    ///     return;
    /// };
    /// let _ = engine.add_module(extra);
    /// extra.dispose(); // use of moved value
    /// ```
    ///
    /// A rejected module comes back inside [`RejectedModule`].
    pub fn add_module(&mut self, module: Module<'ctx>) -> std::result::Result<(), RejectedModule<'ctx>> {
        if module.context().id() != self.ctx.id() {
            return Err(RejectedModule::new(kiln_ir::Error::ContextMismatch, module));
        }
        if let Err(err) = module.verify() {
            return Err(RejectedModule::new(err, module));
        }
        if let Err(err) = module.transfer_ownership(Owner::Caller, Owner::Engine(self.id)) {
            return Err(RejectedModule::new(err, module));
        }
        debug_print_ir(module.as_module_ref());
        tracing::debug!(engine = self.id, module = %module.name().unwrap_or_default(), "module added");
        self.modules.push(module);
        Ok(())
    }

    /// Give an owned module back to the caller. Compiled code, storage
    /// mappings and host bindings of its globals are forgotten.
    pub fn remove_module(&mut self, module: ModuleRef<'ctx>) -> Result<Module<'ctx>> {
        let pos = self
            .modules
            .iter()
            .position(|owned| **owned == module)
            .ok_or(kiln_ir::Error::ModuleNotFound)?;
        self.modules[pos].transfer_ownership(Owner::Engine(self.id), Owner::Caller)?;
        let module = self.modules.remove(pos);

        let belongs = |value: &Value<'ctx>| value.global_parent().is_ok_and(|parent| parent == module.as_module_ref());
        self.cache.retain(|function, _| !belongs(function));
        self.globals.retain(|global, _| !belongs(global));
        self.code.retain(|_, function| !belongs(function));
        tracing::debug!(engine = self.id, module = %module.name().unwrap_or_default(), "module removed");
        Ok(module)
    }

    /// First function named `name` across the owned modules, definitions
    /// before declarations.
    pub fn find_function(&self, name: &str) -> Result<Value<'ctx>> {
        let mut declaration = None;
        for module in &self.modules {
            if let Some(function) = module.get_function(name) {
                if !function.is_declaration()? {
                    return Ok(function);
                }
                declaration.get_or_insert(function);
            }
        }
        declaration.ok_or_else(|| kiln_ir::Error::NotFound(name.to_owned()).into())
    }

    fn check_owned(&self, value: Value<'ctx>) -> Result<()> {
        let owned = value
            .global_parent()
            .is_ok_and(|parent| self.modules.iter().any(|m| **m == parent));
        if owned {
            Ok(())
        } else {
            Err(Error::NotOwnedByEngine {
                function: value.name().unwrap_or_default(),
            })
        }
    }

    /// A definition with the same symbol name as `declaration` in any owned
    /// module.
    fn find_definition(&self, declaration: Value<'ctx>) -> Result<Option<Value<'ctx>>> {
        let name = declaration.name()?;
        let is_function = declaration.kind()?.is_function();
        for module in &self.modules {
            let candidate = if is_function {
                module.get_function(&name)
            } else {
                module.get_global(&name)
            };
            if let Some(candidate) = candidate {
                if candidate != declaration && !candidate.is_declaration()? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    // ── Running code ────────────────────────────────────────────────

    fn signature(function: Value<'ctx>) -> Result<Type<'ctx>> {
        if !function.kind()?.is_function() {
            return Err(not_a_global(function));
        }
        Ok(function.type_of()?.element_type()?)
    }

    /// Run `function` with `args` and return its result (`void` for
    /// functions without one).
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run_function(&mut self, function: Value<'ctx>, args: &[GenericValue]) -> Result<GenericValue> {
        self.check_owned(function)?;
        let fn_ty = Self::signature(function)?;
        let params = fn_ty.param_types()?;
        let mismatch = |detail: String| Error::ArgumentMismatch {
            function: function.name().unwrap_or_default(),
            detail,
        };
        let count_ok = if fn_ty.is_var_arg()? {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !count_ok {
            return Err(mismatch(format!(
                "expected {} arguments, found {}",
                params.len(),
                args.len()
            )));
        }
        for (i, (arg, &param)) in args.iter().zip(&params).enumerate() {
            if !arg.data().fits(param) {
                return Err(mismatch(format!(
                    "argument {i} is {}, expected `{param}`",
                    arg.data().describe()
                )));
            }
        }
        let args = args.iter().map(|arg| arg.data().clone()).collect();
        self.execute(function, args).map(GenericValue::from_data)
    }

    /// Run a `main`-like function: `(argc, argv, envp)`, each parameter
    /// optional. `argv` and `envp` become null-terminated arrays of C
    /// strings in engine memory. Returns the exit code.
    pub fn run_function_as_main(&mut self, function: Value<'ctx>, argv: &[&str], envp: &[&str]) -> Result<i32> {
        self.check_owned(function)?;
        let params = Self::signature(function)?.param_types()?;
        let mismatch = |detail: &str| Error::ArgumentMismatch {
            function: function.name().unwrap_or_default(),
            detail: detail.to_owned(),
        };
        if params.len() > 3 {
            return Err(mismatch("main takes at most three parameters"));
        }
        let mut args = Vec::with_capacity(params.len());
        if let Some(argc) = params.first() {
            if argc.kind() != TypeKind::Integer {
                return Err(mismatch("argc must be an integer"));
            }
            args.push(Data::int(argv.len() as u128, argc.int_width()?));
        }
        for (param, strings) in params.iter().skip(1).zip([argv, envp]) {
            if !param.is_pointer() {
                return Err(mismatch("argv and envp must be pointers"));
            }
            args.push(Data::Pointer(self.string_table(strings)?));
        }
        Ok(match self.execute(function, args)? {
            Data::Int { bits, width } => arith::sign_extend(bits, width) as i32,
            _ => 0,
        })
    }

    fn string_table(&mut self, strings: &[&str]) -> Result<u64> {
        let width = self.layout.pointer_size();
        let table = self
            .memory
            .allocate(width * (strings.len() as u64 + 1), width)?;
        for (i, text) in strings.iter().enumerate() {
            let address = self.memory.allocate_c_string(text)?;
            self.memory
                .write_uint(table + i as u64 * width, width, u128::from(address))?;
        }
        Ok(table)
    }

    /// Run the functions listed in `llvm.global_ctors`, lowest priority
    /// first.
    pub fn run_static_constructors(&mut self) -> Result<()> {
        self.run_static_table("llvm.global_ctors")
    }

    /// Run the functions listed in `llvm.global_dtors`, lowest priority
    /// first.
    pub fn run_static_destructors(&mut self) -> Result<()> {
        self.run_static_table("llvm.global_dtors")
    }

    fn run_static_table(&mut self, table: &str) -> Result<()> {
        let mut entries = Vec::new();
        for module in self.modules() {
            let Some(global) = module.get_global(table) else {
                continue;
            };
            let Some(init) = global.initializer()? else {
                continue;
            };
            if !matches!(init.kind()?, ValueKind::Constant(kiln_ir::ConstantKind::Array)) {
                continue;
            }
            for entry in init.const_elements()? {
                // { i32 priority, fn ptr, data ptr }
                if let [priority, function, ..] = entry.const_elements()?.as_slice() {
                    entries.push((priority.const_int_sext_value()?, *function));
                }
            }
        }
        entries.sort_by_key(|&(priority, _)| priority);
        tracing::debug!(table, count = entries.len(), "running static initializers");
        for (_, function) in entries {
            let address = self
                .constant(function)?
                .as_address()
                .ok_or_else(|| Trap::Unsupported(format!("`{table}` entry is not a pointer")))?;
            if address == 0 {
                continue;
            }
            let target = *self.code.get(&address).ok_or(Trap::BadCallTarget(address))?;
            self.execute(target, Vec::new())?;
        }
        Ok(())
    }

    // ── Code and address management ─────────────────────────────────

    /// Drop the compiled form of `function`. Returns whether there was one.
    pub fn free_machine_code_for_function(&mut self, function: Value<'ctx>) -> bool {
        let freed = self.cache.remove(&function).is_some();
        if freed {
            tracing::debug!(function = %function.name().unwrap_or_default(), "compiled code freed");
        }
        freed
    }

    /// Lower `function` again from its current IR and return its address.
    pub fn recompile_and_relink_function(&mut self, function: Value<'ctx>) -> Result<u64> {
        self.check_owned(function)?;
        Self::signature(function)?;
        self.cache.remove(&function);
        let code = Rc::new(self.lower(function)?);
        if self.options.kind.caches_code() {
            self.cache.insert(function, code);
        }
        self.global_address(function)
    }

    /// Make `global` resolve to `address`. For functions the address
    /// becomes a call target for the same function.
    pub fn add_global_mapping(&mut self, global: Value<'ctx>, address: u64) -> Result<()> {
        let ValueKind::Global(kind) = global.kind()? else {
            return Err(not_a_global(global));
        };
        if let Some(old) = self.globals.insert(global, address) {
            if self.code.get(&old) == Some(&global) {
                self.code.remove(&old);
            }
        }
        if kind == GlobalKind::Function {
            self.code.insert(address, global);
        }
        tracing::debug!(global = %global.name()?, address = format_args!("{address:#x}"), "global mapped");
        Ok(())
    }

    /// Address of `global`, allocating and initializing storage on first
    /// use.
    pub fn pointer_to_global(&mut self, global: Value<'ctx>) -> Result<u64> {
        self.check_owned(global)?;
        self.global_address(global)
    }

    /// Route calls of `function` (usually a declaration) to `callback`.
    pub fn add_host_function(
        &mut self,
        function: Value<'ctx>,
        callback: impl FnMut(&mut Memory, &[GenericValue]) -> Result<GenericValue> + 'ctx,
    ) -> Result<()> {
        Self::signature(function)?;
        let name = function.name()?;
        tracing::debug!(function = %name, "host function bound");
        self.hosts.insert(name, Box::new(callback));
        Ok(())
    }

    pub(super) fn global_address(&mut self, global: Value<'ctx>) -> Result<u64> {
        if let Some(&address) = self.globals.get(&global) {
            return Ok(address);
        }
        let ValueKind::Global(kind) = global.kind()? else {
            return Err(not_a_global(global));
        };
        let address = match kind {
            GlobalKind::Function => {
                let address = self.memory.reserve(RegionKind::Code, 1, 1)?;
                self.code.insert(address, global);
                address
            }
            GlobalKind::Variable if global.is_declaration()? => {
                let Some(definition) = self.find_definition(global)? else {
                    return Err(Trap::UnresolvedExternal(global.name()?).into());
                };
                self.global_address(definition)?
            }
            GlobalKind::Variable => {
                let ty = global.type_of()?.element_type()?;
                let size = self.layout.size_of_type(ty)?.max(1);
                let align = self
                    .layout
                    .abi_alignment_of_type(ty)?
                    .max(u64::from(global.alignment()?));
                let address = self.memory.reserve(RegionKind::Global, size, align)?;
                // Registered before the initializer so self-references resolve.
                self.globals.insert(global, address);
                if let Some(init) = global.initializer()? {
                    let value = self.constant(init)?;
                    encode::store(&mut self.memory, &self.layout, ty, address, &value)?;
                }
                address
            }
            GlobalKind::Alias => self
                .constant(global.aliasee()?)?
                .as_address()
                .ok_or_else(|| Trap::Unsupported("alias of a non-pointer".to_owned()))?,
        };
        self.globals.insert(global, address);
        Ok(address)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
