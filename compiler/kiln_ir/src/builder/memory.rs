//! Stack and heap allocation, loads, stores, address arithmetic and
//! global strings.

use crate::attributes::Linkage;
use crate::error::{Error, Result};
use crate::layout::DataLayout;
use crate::opcode::Opcode;
use crate::store::Extra;
use crate::types::table::TypeTable;
use crate::types::Type;
use crate::value::{value_ids, Value};

use super::{Builder, Inst};

impl<'ctx> Builder<'ctx> {
    // ── Stack ───────────────────────────────────────────────────────

    /// Stack slot for one `ty`; the result is a `ty*`.
    pub fn build_alloca(&self, ty: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let one = self.ctx.i32_type().const_int(1, false)?;
        self.build_array_alloca(ty, one, name)
    }

    /// Stack slot for `count` consecutive `ty`s.
    pub fn build_array_alloca(&self, ty: Type<'ctx>, count: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        let [count] = self.ids([count])?;
        self.emit(name, |s| {
            if !s.types.is_sized(ty.id()) {
                return Err(Error::invalid_type(format!(
                    "cannot allocate unsized type `{}`",
                    s.type_name(ty.id())
                )));
            }
            if !s.types.is_int(s.ty(count)?) {
                return Err(Error::invalid_operand("allocation count must be an integer"));
            }
            let ptr = s.types.pointer(ty.id(), 0)?;
            Ok(Inst::new(ptr, Opcode::Alloca, &[count]).extra(Extra::Alloca { allocated: ty.id() }))
        })
    }

    // ── Heap ────────────────────────────────────────────────────────

    /// Declaration of a runtime function in the current module, added on
    /// first use.
    fn runtime_function(&self, name: &str, ret: Type<'ctx>, params: &[Type<'ctx>]) -> Result<Value<'ctx>> {
        let module = self.current_module()?;
        if let Some(function) = module.get_function(name) {
            return Ok(function);
        }
        let fn_ty = self.ctx.function_type(ret, params, false)?;
        module.add_function(name, fn_ty)
    }

    fn alloc_size(&self, ty: Type<'ctx>) -> Result<Value<'ctx>> {
        let layout = DataLayout::parse(&self.current_module()?.data_layout()?)?;
        let size = layout.size_of_type(ty)?;
        self.ctx.i64_type().const_int(size, false)
    }

    /// Heap allocation of one `ty` through the module's `malloc`.
    pub fn build_malloc(&self, ty: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        let size = self.alloc_size(ty)?;
        self.malloc_bytes(ty, size, name)
    }

    /// Heap allocation of `count` consecutive `ty`s.
    pub fn build_array_malloc(&self, ty: Type<'ctx>, count: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        let i64_ty = self.ctx.i64_type();
        let count = self.build_int_cast(count, i64_ty, false, "")?;
        let size = self.alloc_size(ty)?;
        let bytes = self.build_mul(count, size, "")?;
        self.malloc_bytes(ty, bytes, name)
    }

    fn malloc_bytes(&self, ty: Type<'ctx>, bytes: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let i8_ptr = self.ctx.i8_type().ptr_type()?;
        let malloc = self.runtime_function("malloc", i8_ptr, &[self.ctx.i64_type()])?;
        let raw = self.build_call(malloc, &[bytes], "")?;
        self.build_bit_cast(raw, ty.ptr_type()?, name)
    }

    /// Release memory from [`Builder::build_malloc`] through the module's
    /// `free`.
    pub fn build_free(&self, pointer: Value<'ctx>) -> Result<Value<'ctx>> {
        let i8_ptr = self.ctx.i8_type().ptr_type()?;
        let free = self.runtime_function("free", self.ctx.void_type(), &[i8_ptr])?;
        let raw = if pointer.type_of()? == i8_ptr {
            pointer
        } else {
            self.build_bit_cast(pointer, i8_ptr, "")?
        };
        self.build_call(free, &[raw], "")
    }

    // ── Loads and stores ────────────────────────────────────────────

    pub fn build_load(&self, pointer: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let [pointer] = self.ids([pointer])?;
        self.emit(name, |s| {
            let ptr_ty = s.ty(pointer)?;
            let pointee = s.types.pointee(ptr_ty).ok_or_else(|| {
                Error::invalid_operand(format!("load from non-pointer `{}`", s.type_name(ptr_ty)))
            })?;
            if !s.types.is_first_class(pointee) || !s.types.is_sized(pointee) {
                return Err(Error::invalid_operand(format!(
                    "cannot load a value of type `{}`",
                    s.type_name(pointee)
                )));
            }
            Ok(Inst::new(pointee, Opcode::Load, &[pointer]))
        })
    }

    /// `store value, pointer`. The pointer must point to the value's type.
    pub fn build_store(&self, value: Value<'ctx>, pointer: Value<'ctx>) -> Result<Value<'ctx>> {
        let [value, pointer] = self.ids([value, pointer])?;
        self.emit("", |s| {
            let ptr_ty = s.ty(pointer)?;
            let pointee = s.types.pointee(ptr_ty).ok_or_else(|| {
                Error::invalid_operand(format!("store to non-pointer `{}`", s.type_name(ptr_ty)))
            })?;
            s.expect_type(pointee, s.ty(value)?)?;
            Ok(Inst::new(TypeTable::VOID, Opcode::Store, &[value, pointer]))
        })
    }

    // ── Address arithmetic ──────────────────────────────────────────

    fn build_gep_impl(
        &self,
        pointer: Value<'ctx>,
        indices: &[Value<'ctx>],
        in_bounds: bool,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [pointer] = self.ids([pointer])?;
        let indices = value_ids(self.ctx, indices)?;
        self.emit(name, |s| {
            let ty = s.gep_type(pointer, &indices)?;
            let mut operands = vec![pointer];
            operands.extend_from_slice(&indices);
            Ok(Inst::new(ty, Opcode::GetElementPtr, &operands).extra(Extra::Gep { in_bounds }))
        })
    }

    pub fn build_gep(&self, pointer: Value<'ctx>, indices: &[Value<'ctx>], name: &str) -> Result<Value<'ctx>> {
        self.build_gep_impl(pointer, indices, false, name)
    }

    pub fn build_in_bounds_gep(
        &self,
        pointer: Value<'ctx>,
        indices: &[Value<'ctx>],
        name: &str,
    ) -> Result<Value<'ctx>> {
        self.build_gep_impl(pointer, indices, true, name)
    }

    /// Address of field `index` of the struct `pointer` points to.
    pub fn build_struct_gep(&self, pointer: Value<'ctx>, index: u32, name: &str) -> Result<Value<'ctx>> {
        let pointee = pointer.type_of()?.element_type()?;
        if !pointee.is_struct() {
            return Err(Error::invalid_operand("struct_gep requires a pointer to a struct"));
        }
        let i32_ty = self.ctx.i32_type();
        let zero = i32_ty.const_int(0, false)?;
        let field = i32_ty.const_int(u64::from(index), false)?;
        self.build_in_bounds_gep(pointer, &[zero, field], name)
    }

    // ── Global strings ──────────────────────────────────────────────

    /// Private constant global holding `text` with a trailing NUL. The
    /// result points to the whole array.
    pub fn build_global_string(&self, text: &str, name: &str) -> Result<Value<'ctx>> {
        let module = self.current_module()?;
        let init = self.ctx.const_string(text.as_bytes(), false);
        let global = module.add_global(init.type_of()?, name)?;
        global.set_initializer(Some(init))?;
        global.set_linkage(Linkage::Private)?;
        global.set_global_constant(true)?;
        Ok(global)
    }

    /// Like [`Builder::build_global_string`], returning an `i8*` to the
    /// first character.
    pub fn build_global_string_ptr(&self, text: &str, name: &str) -> Result<Value<'ctx>> {
        let global = self.build_global_string(text, name)?;
        let zero = self.ctx.i32_type().const_int(0, false)?;
        global.const_in_bounds_gep(&[zero, zero])
    }
}
