//! Type handles and type constructors.
//!
//! Types are immutable and interned per context, with one exception:
//! named structs follow a two-phase protocol. [`Context::named_struct_type`]
//! creates an opaque placeholder, which may be referenced (through
//! pointers) before [`Type::set_body`] fills it in, exactly once. Querying
//! the elements of a struct whose body is unset fails with
//! [`Error::IncompleteType`].

pub(crate) mod table;

use std::fmt;
use std::hash::{Hash, Hasher};

pub use table::MAX_INT_WIDTH;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::TypeId;
use table::{TypeData, TypeTable};

/// Classification of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Half,
    Float,
    Double,
    X86Fp80,
    Fp128,
    PpcFp128,
    Label,
    Integer,
    Function,
    Struct,
    Array,
    Pointer,
    Vector,
    Metadata,
    X86Mmx,
}

/// Observing handle to an interned type.
#[derive(Clone, Copy)]
pub struct Type<'ctx> {
    ctx: &'ctx Context,
    id: TypeId,
}

impl PartialEq for Type<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.id() == other.ctx.id() && self.id == other.id
    }
}

impl Eq for Type<'_> {}

impl Hash for Type<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ctx.id().hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.print_to_string())
    }
}

impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print_to_string())
    }
}

/// Resolve a slice of handles to IDs, rejecting handles from other contexts.
pub(crate) fn type_ids(ctx: &Context, types: &[Type<'_>]) -> Result<Vec<TypeId>> {
    types
        .iter()
        .map(|ty| {
            ctx.ensure_same(ty.ctx)?;
            Ok(ty.id)
        })
        .collect()
}

impl<'ctx> Type<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, id: TypeId) -> Self {
        Self { ctx, id }
    }

    pub(crate) fn id(self) -> TypeId {
        self.id
    }

    /// The context this type belongs to.
    pub fn context(self) -> &'ctx Context {
        self.ctx
    }

    fn wrap(self, id: TypeId) -> Type<'ctx> {
        Type::new(self.ctx, id)
    }

    fn mismatch(self, expected: &'static str) -> Error {
        Error::KindMismatch {
            expected,
            found: format!("`{self}`"),
        }
    }

    pub fn kind(self) -> TypeKind {
        self.ctx.read(|s| match s.types.get(self.id) {
            TypeData::Void => TypeKind::Void,
            TypeData::Label => TypeKind::Label,
            TypeData::Metadata => TypeKind::Metadata,
            TypeData::Half => TypeKind::Half,
            TypeData::Float => TypeKind::Float,
            TypeData::Double => TypeKind::Double,
            TypeData::X86Fp80 => TypeKind::X86Fp80,
            TypeData::Fp128 => TypeKind::Fp128,
            TypeData::PpcFp128 => TypeKind::PpcFp128,
            TypeData::X86Mmx => TypeKind::X86Mmx,
            TypeData::Int(_) => TypeKind::Integer,
            TypeData::Function { .. } => TypeKind::Function,
            TypeData::Struct { .. } | TypeData::Named { .. } => TypeKind::Struct,
            TypeData::Array { .. } => TypeKind::Array,
            TypeData::Pointer { .. } => TypeKind::Pointer,
            TypeData::Vector { .. } => TypeKind::Vector,
        })
    }

    pub fn is_void(self) -> bool {
        self.kind() == TypeKind::Void
    }

    pub fn is_integer(self) -> bool {
        self.kind() == TypeKind::Integer
    }

    pub fn is_floating_point(self) -> bool {
        self.ctx.read(|s| s.types.is_float(self.id))
    }

    pub fn is_pointer(self) -> bool {
        self.kind() == TypeKind::Pointer
    }

    pub fn is_function(self) -> bool {
        self.kind() == TypeKind::Function
    }

    pub fn is_struct(self) -> bool {
        self.kind() == TypeKind::Struct
    }

    pub fn is_array(self) -> bool {
        self.kind() == TypeKind::Array
    }

    pub fn is_vector(self) -> bool {
        self.kind() == TypeKind::Vector
    }

    /// Whether values of this type have a size in memory.
    pub fn is_sized(self) -> bool {
        self.ctx.read(|s| s.types.is_sized(self.id))
    }

    /// Whether SSA values may have this type.
    pub fn is_first_class(self) -> bool {
        self.ctx.read(|s| s.types.is_first_class(self.id))
    }

    // ── Integer ─────────────────────────────────────────────────────

    pub fn int_width(self) -> Result<u32> {
        self.ctx
            .read(|s| s.types.int_width(self.id))
            .ok_or_else(|| self.mismatch("integer type"))
    }

    // ── Function ────────────────────────────────────────────────────

    pub fn return_type(self) -> Result<Type<'ctx>> {
        let ret = self
            .ctx
            .read(|s| s.types.function_info(self.id).map(|(ret, _, _)| ret))
            .ok_or_else(|| self.mismatch("function type"))?;
        Ok(self.wrap(ret))
    }

    pub fn param_types(self) -> Result<Vec<Type<'ctx>>> {
        let params = self
            .ctx
            .read(|s| s.types.function_info(self.id).map(|(_, p, _)| p.to_vec()))
            .ok_or_else(|| self.mismatch("function type"))?;
        Ok(params.into_iter().map(|p| self.wrap(p)).collect())
    }

    pub fn count_param_types(self) -> Result<usize> {
        self.ctx
            .read(|s| s.types.function_info(self.id).map(|(_, p, _)| p.len()))
            .ok_or_else(|| self.mismatch("function type"))
    }

    pub fn is_var_arg(self) -> Result<bool> {
        self.ctx
            .read(|s| s.types.function_info(self.id).map(|(_, _, v)| v))
            .ok_or_else(|| self.mismatch("function type"))
    }

    // ── Sequential ──────────────────────────────────────────────────

    /// Element type of an array or vector, or pointee of a pointer.
    pub fn element_type(self) -> Result<Type<'ctx>> {
        let element = self
            .ctx
            .read(|s| match s.types.get(self.id) {
                TypeData::Array { element, .. } | TypeData::Vector { element, .. } => {
                    Some(*element)
                }
                TypeData::Pointer { pointee, .. } => Some(*pointee),
                _ => None,
            })
            .ok_or_else(|| self.mismatch("array, vector or pointer type"))?;
        Ok(self.wrap(element))
    }

    pub fn array_len(self) -> Result<u64> {
        self.ctx
            .read(|s| match s.types.get(self.id) {
                TypeData::Array { len, .. } => Some(*len),
                _ => None,
            })
            .ok_or_else(|| self.mismatch("array type"))
    }

    pub fn vector_len(self) -> Result<u32> {
        self.ctx
            .read(|s| s.types.vector_info(self.id).map(|(_, len)| len))
            .ok_or_else(|| self.mismatch("vector type"))
    }

    pub fn pointer_address_space(self) -> Result<u32> {
        self.ctx
            .read(|s| match s.types.get(self.id) {
                TypeData::Pointer { address_space, .. } => Some(*address_space),
                _ => None,
            })
            .ok_or_else(|| self.mismatch("pointer type"))
    }

    // ── Struct ──────────────────────────────────────────────────────

    /// Name of a named struct; `None` for literal structs and non-structs.
    pub fn struct_name(self) -> Option<String> {
        self.ctx.read(|s| match s.types.get(self.id) {
            TypeData::Named { name, .. } => Some(name.clone()),
            _ => None,
        })
    }

    /// Whether this is a named struct whose body has not been set.
    pub fn is_opaque_struct(self) -> bool {
        self.ctx
            .read(|s| matches!(s.types.get(self.id), TypeData::Named { body: None, .. }))
    }

    pub fn is_packed_struct(self) -> Result<bool> {
        self.ctx
            .read(|s| s.types.struct_body(self.id).map(|(_, packed)| packed))
    }

    /// Element types of a struct. Fails with `IncompleteType` while a
    /// named struct is still opaque.
    pub fn struct_element_types(self) -> Result<Vec<Type<'ctx>>> {
        let elements = self
            .ctx
            .read(|s| s.types.struct_body(self.id).map(|(e, _)| e.to_vec()))?;
        Ok(elements.into_iter().map(|e| self.wrap(e)).collect())
    }

    pub fn count_struct_element_types(self) -> Result<usize> {
        self.ctx
            .read(|s| s.types.struct_body(self.id).map(|(e, _)| e.len()))
    }

    /// Set the body of an opaque named struct. Allowed once.
    pub fn set_body(self, elements: &[Type<'ctx>], packed: bool) -> Result<()> {
        let ids = type_ids(self.ctx, elements)?;
        self.ctx
            .write(|s| s.types.set_struct_body(self.id, &ids, packed))
    }

    // ── Derived types ───────────────────────────────────────────────

    pub fn array_type(self, len: u64) -> Result<Type<'ctx>> {
        let id = self.ctx.write(|s| s.types.array(self.id, len))?;
        Ok(self.wrap(id))
    }

    pub fn pointer_type(self, address_space: u32) -> Result<Type<'ctx>> {
        let id = self.ctx.write(|s| s.types.pointer(self.id, address_space))?;
        Ok(self.wrap(id))
    }

    /// Pointer in the default address space.
    pub fn ptr_type(self) -> Result<Type<'ctx>> {
        self.pointer_type(0)
    }

    pub fn vector_type(self, len: u32) -> Result<Type<'ctx>> {
        let id = self.ctx.write(|s| s.types.vector(self.id, len))?;
        Ok(self.wrap(id))
    }

    /// Function type returning `self`.
    pub fn fn_type(self, params: &[Type<'ctx>], var_arg: bool) -> Result<Type<'ctx>> {
        self.ctx.function_type(self, params, var_arg)
    }

    // ── Rendering ───────────────────────────────────────────────────

    pub fn print_to_string(self) -> String {
        self.ctx.read(|s| s.types.display(self.id))
    }

    /// Print to stderr.
    pub fn dump(self) {
        eprintln!("{}", self.print_to_string());
    }
}

// ── Context constructors ────────────────────────────────────────────

impl Context {
    fn fixed(&self, id: TypeId) -> Type<'_> {
        Type::new(self, id)
    }

    pub fn void_type(&self) -> Type<'_> {
        self.fixed(TypeTable::VOID)
    }

    pub fn label_type(&self) -> Type<'_> {
        self.fixed(TypeTable::LABEL)
    }

    pub fn metadata_type(&self) -> Type<'_> {
        self.fixed(TypeTable::METADATA)
    }

    pub fn half_type(&self) -> Type<'_> {
        self.fixed(TypeTable::HALF)
    }

    pub fn float_type(&self) -> Type<'_> {
        self.fixed(TypeTable::FLOAT)
    }

    pub fn double_type(&self) -> Type<'_> {
        self.fixed(TypeTable::DOUBLE)
    }

    pub fn x86_fp80_type(&self) -> Type<'_> {
        self.fixed(TypeTable::X86_FP80)
    }

    pub fn fp128_type(&self) -> Type<'_> {
        self.fixed(TypeTable::FP128)
    }

    pub fn ppc_fp128_type(&self) -> Type<'_> {
        self.fixed(TypeTable::PPC_FP128)
    }

    pub fn x86_mmx_type(&self) -> Type<'_> {
        self.fixed(TypeTable::X86_MMX)
    }

    pub fn i1_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I1)
    }

    pub fn i8_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I8)
    }

    pub fn i16_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I16)
    }

    pub fn i32_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I32)
    }

    pub fn i64_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I64)
    }

    pub fn i128_type(&self) -> Type<'_> {
        self.fixed(TypeTable::I128)
    }

    /// Integer type of `bits` width, `1..=MAX_INT_WIDTH`.
    pub fn int_type(&self, bits: u32) -> Result<Type<'_>> {
        let id = self.write(|s| s.types.int(bits))?;
        Ok(Type::new(self, id))
    }

    pub fn function_type<'ctx>(
        &'ctx self,
        ret: Type<'ctx>,
        params: &[Type<'ctx>],
        var_arg: bool,
    ) -> Result<Type<'ctx>> {
        self.ensure_same(ret.ctx)?;
        let params = type_ids(self, params)?;
        let id = self.write(|s| s.types.function(ret.id, &params, var_arg))?;
        Ok(Type::new(self, id))
    }

    /// Literal struct type.
    pub fn struct_type<'ctx>(&'ctx self, elements: &[Type<'ctx>], packed: bool) -> Result<Type<'ctx>> {
        let elements = type_ids(self, elements)?;
        let id = self.write(|s| s.types.literal_struct(&elements, packed))?;
        Ok(Type::new(self, id))
    }

    /// Opaque named struct. A name already in use gets a `.N` suffix.
    pub fn named_struct_type(&self, name: &str) -> Type<'_> {
        let id = self.write(|s| s.types.named_struct(name));
        Type::new(self, id)
    }

    /// Look up a named struct.
    pub fn get_struct_type(&self, name: &str) -> Option<Type<'_>> {
        self.read(|s| s.types.lookup_named(name))
            .map(|id| Type::new(self, id))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
