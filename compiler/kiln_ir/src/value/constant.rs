//! Constant constructors, constant queries and constant expressions.
//!
//! Every constructor interns: asking for the same constant twice returns
//! the same handle. Constant expression helpers fold when all operands
//! are plain constants and otherwise build an unfolded expression node.

use crate::arith;
use crate::attributes::ArithFlags;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fold;
use crate::id::{TypeId, ValueId};
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::store::{AggregateKind, Extra, InlineAsmData, Payload, Store};
use crate::types::table::{TypeData, TypeTable};
use crate::types::{type_ids, Type};

use super::{value_ids, Value};

// ── Constructors on Type ────────────────────────────────────────────

impl<'ctx> Type<'ctx> {
    fn make(self, f: impl FnOnce(&mut Store, TypeId) -> Result<ValueId>) -> Result<Value<'ctx>> {
        let id = self.context().write(|s| f(s, self.id()))?;
        Ok(Value::new(self.context(), id))
    }

    /// Integer constant.
    ///
    /// `value` is taken as a 64-bit pattern: it must fit the type's width
    /// as an unsigned number or, when `sign_extend` is set, as a signed
    /// number. Values that fit neither fail with `ConstantOutOfRange`
    /// instead of being truncated.
    pub fn const_int(self, value: u64, sign_extend: bool) -> Result<Value<'ctx>> {
        let wide = if sign_extend {
            i128::from(value as i64)
        } else {
            i128::from(value)
        };
        self.const_int_wide(wide, sign_extend)
    }

    /// Integer constant from a full-width signed value, with the same range
    /// rules as [`Type::const_int`].
    pub fn const_int_wide(self, value: i128, sign_extend: bool) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            let width = s.types.int_width(ty).ok_or_else(|| Error::KindMismatch {
                expected: "integer type",
                found: format!("`{}`", s.type_name(ty)),
            })?;
            if !arith::fits(value, width, sign_extend) {
                return Err(Error::ConstantOutOfRange {
                    value: value.to_string(),
                    width,
                });
            }
            Ok(s.const_int(ty, arith::from_signed(value, width)))
        })
    }

    /// Integer constant parsed from `text` in `radix` (2..=36). A leading
    /// `-` is allowed.
    pub fn const_int_of_string(self, text: &str, radix: u32) -> Result<Value<'ctx>> {
        if !(2..=36).contains(&radix) {
            return Err(Error::invalid_operand(format!("invalid radix {radix}")));
        }
        let value = i128::from_str_radix(text.trim(), radix)
            .map_err(|err| Error::invalid_operand(format!("`{text}`: {err}")))?;
        self.const_int_wide(value, value < 0)
    }

    /// Floating-point constant.
    pub fn const_real(self, value: f64) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            if !s.types.is_float(ty) {
                return Err(Error::KindMismatch {
                    expected: "floating-point type",
                    found: format!("`{}`", s.type_name(ty)),
                });
            }
            Ok(s.const_fp(ty, value))
        })
    }

    pub fn const_real_of_string(self, text: &str) -> Result<Value<'ctx>> {
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|err| Error::invalid_operand(format!("`{text}`: {err}")))?;
        self.const_real(value)
    }

    /// The zero value of this type.
    pub fn const_null(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            if !s.types.is_first_class(ty) || matches!(s.types.get(ty), TypeData::Label) {
                return Err(Error::invalid_type(format!(
                    "no null value for `{}`",
                    s.type_name(ty)
                )));
            }
            Ok(s.null_value(ty))
        })
    }

    /// All bits set, for integers and integer vectors.
    pub fn const_all_ones(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            if let Some((lane, len)) = s.types.vector_info(ty) {
                if let Some(width) = s.types.int_width(lane) {
                    let one = s.const_int(lane, arith::mask(width));
                    let lanes = vec![one; len as usize];
                    return Ok(s.const_aggregate(ty, AggregateKind::Vector, &lanes));
                }
            }
            let width = s.types.int_width(ty).ok_or_else(|| Error::KindMismatch {
                expected: "integer type",
                found: format!("`{}`", s.type_name(ty)),
            })?;
            Ok(s.const_int(ty, arith::mask(width)))
        })
    }

    pub fn const_pointer_null(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            if !s.types.is_pointer(ty) {
                return Err(Error::KindMismatch {
                    expected: "pointer type",
                    found: format!("`{}`", s.type_name(ty)),
                });
            }
            Ok(s.pointer_null(ty))
        })
    }

    pub fn undef(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            if !s.types.is_first_class(ty) {
                return Err(Error::invalid_type(format!(
                    "no undef value for `{}`",
                    s.type_name(ty)
                )));
            }
            Ok(s.undef(ty))
        })
    }

    /// Constant array of `self`-typed elements.
    pub fn const_array(self, elements: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        let elements = value_ids(self.context(), elements)?;
        self.make(|s, element_ty| {
            check_constant_elements(s, &elements, |_| Some(element_ty))?;
            let ty = s.types.array(element_ty, elements.len() as u64)?;
            Ok(s.const_aggregate(ty, AggregateKind::Array, &elements))
        })
    }

    /// Constant of this named struct type.
    pub fn const_named_struct(self, elements: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        let elements = value_ids(self.context(), elements)?;
        self.make(|s, ty| {
            let fields = s.types.struct_body(ty)?.0.to_vec();
            if fields.len() != elements.len() {
                return Err(Error::invalid_operand(format!(
                    "struct has {} field(s), got {}",
                    fields.len(),
                    elements.len()
                )));
            }
            check_constant_elements(s, &elements, |i| fields.get(i).copied())?;
            Ok(s.const_aggregate(ty, AggregateKind::Struct, &elements))
        })
    }

    /// Allocation size of the type in bytes, as an `i64` constant.
    pub fn size_of(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            let size = crate::layout::DataLayout::default().alloc_size(&s.types, ty)?;
            Ok(s.const_int(TypeTable::I64, u128::from(size)))
        })
    }

    /// ABI alignment of the type in bytes, as an `i64` constant.
    pub fn align_of(self) -> Result<Value<'ctx>> {
        self.make(|s, ty| {
            let align = crate::layout::DataLayout::default().abi_align(&s.types, ty)?;
            Ok(s.const_int(TypeTable::I64, u128::from(align)))
        })
    }
}

fn check_constant_elements(
    s: &Store,
    elements: &[ValueId],
    expected: impl Fn(usize) -> Option<TypeId>,
) -> Result<()> {
    for (i, &element) in elements.iter().enumerate() {
        if !s.is_constant(element) {
            return Err(Error::invalid_operand("aggregate elements must be constants"));
        }
        let want = expected(i).ok_or(Error::IndexOutOfRange {
            index: i,
            len: elements.len(),
        })?;
        s.expect_type(want, s.ty(element)?)?;
    }
    Ok(())
}

// ── Constructors on Context ─────────────────────────────────────────

impl Context {
    /// Literal-struct constant whose type is derived from the elements.
    pub fn const_struct<'ctx>(&'ctx self, elements: &[Value<'ctx>], packed: bool) -> Result<Value<'ctx>> {
        let elements = value_ids(self, elements)?;
        let id = self.write(|s| {
            let types: Vec<TypeId> = elements
                .iter()
                .map(|&e| s.ty(e))
                .collect::<Result<_>>()?;
            check_constant_elements(s, &elements, |i| types.get(i).copied())?;
            let ty = s.types.literal_struct(&types, packed)?;
            Ok::<_, Error>(s.const_aggregate(ty, AggregateKind::Struct, &elements))
        })?;
        Ok(Value::new(self, id))
    }

    /// Constant vector; all elements must share one scalar type.
    pub fn const_vector<'ctx>(&'ctx self, elements: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        let elements = value_ids(self, elements)?;
        let id = self.write(|s| {
            let first = *elements
                .first()
                .ok_or_else(|| Error::invalid_type("vector length must be at least 1"))?;
            let lane = s.ty(first)?;
            check_constant_elements(s, &elements, |_| Some(lane))?;
            let ty = s.types.vector(lane, elements.len() as u32)?;
            Ok::<_, Error>(s.const_aggregate(ty, AggregateKind::Vector, &elements))
        })?;
        Ok(Value::new(self, id))
    }

    /// `[N x i8]` constant holding `text`, plus a trailing NUL unless
    /// `dont_null_terminate`.
    pub fn const_string(&self, text: &[u8], dont_null_terminate: bool) -> Value<'_> {
        let id = self.write(|s| {
            let mut bytes: Vec<ValueId> = text
                .iter()
                .map(|&b| s.const_int(TypeTable::I8, u128::from(b)))
                .collect();
            if !dont_null_terminate {
                bytes.push(s.const_int(TypeTable::I8, 0));
            }
            let ty = s.intern_array_of_i8(bytes.len() as u64);
            s.const_aggregate(ty, AggregateKind::Array, &bytes)
        });
        Value::new(self, id)
    }

    /// Inline assembly callable through a pointer to `fn_type`.
    pub fn const_inline_asm<'ctx>(
        &'ctx self,
        fn_type: Type<'ctx>,
        asm: &str,
        constraints: &str,
        side_effects: bool,
        align_stack: bool,
    ) -> Result<Value<'ctx>> {
        type_ids(self, &[fn_type])?;
        let id = self.write(|s| {
            if !s.types.is_function(fn_type.id()) {
                return Err(Error::KindMismatch {
                    expected: "function type",
                    found: format!("`{}`", s.type_name(fn_type.id())),
                });
            }
            let ty = s.types.pointer(fn_type.id(), 0)?;
            Ok(s.inline_asm(
                ty,
                InlineAsmData {
                    asm: asm.to_owned(),
                    constraints: constraints.to_owned(),
                    side_effects,
                    align_stack,
                },
            ))
        })?;
        Ok(Value::new(self, id))
    }
}

impl Store {
    fn intern_array_of_i8(&mut self, len: u64) -> TypeId {
        self.types.intern(TypeData::Array {
            element: TypeTable::I8,
            len,
        })
    }
}

// ── Queries and constant expressions on Value ───────────────────────

impl<'ctx> Value<'ctx> {
    pub fn is_constant(self) -> bool {
        self.context().read(|s| s.is_constant(self.id()))
    }

    pub fn is_undef(self) -> bool {
        self.context().read(|s| s.is_undef(self.id()))
    }

    /// Zero integer, zero float, null pointer or zero aggregate.
    pub fn is_null(self) -> bool {
        self.context().read(|s| s.is_null(self.id()))
    }

    /// Zero-extended value of an integer constant.
    pub fn const_int_zext_value(self) -> Result<u128> {
        self.read(|s| {
            s.int_value(self.id())
                .ok_or_else(|| s.kind_mismatch("integer constant", self.id()))
        })
    }

    /// Sign-extended value of an integer constant.
    pub fn const_int_sext_value(self) -> Result<i128> {
        self.read(|s| {
            let bits = s
                .int_value(self.id())
                .ok_or_else(|| s.kind_mismatch("integer constant", self.id()))?;
            let width = s.types.int_width(s.ty(self.id())?).unwrap_or(128);
            Ok(arith::sign_extend(bits, width))
        })
    }

    pub fn const_real_value(self) -> Result<f64> {
        self.read(|s| {
            s.fp_value(self.id())
                .ok_or_else(|| s.kind_mismatch("floating-point constant", self.id()))
        })
    }

    /// Elements of a constant array, struct or vector.
    pub fn const_elements(self) -> Result<Vec<Value<'ctx>>> {
        let ids = self.read(|s| match s.value(self.id())?.payload {
            Payload::ConstArray | Payload::ConstStruct | Payload::ConstVector => {
                Ok(s.value(self.id())?.operands.to_vec())
            }
            _ => Err(s.kind_mismatch("constant aggregate", self.id())),
        })?;
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    /// Opcode of an unfolded constant expression.
    pub fn const_opcode(self) -> Result<Opcode> {
        self.read(|s| match &s.value(self.id())?.payload {
            Payload::ConstExpr(expr) => Ok(expr.opcode),
            _ => Err(s.kind_mismatch("constant expression", self.id())),
        })
    }

    fn ensure_constants(self, operands: &[Value<'ctx>]) -> Result<Vec<ValueId>> {
        let ids = value_ids(self.context(), operands)?;
        self.read(|s| {
            for &id in &ids {
                if !s.is_constant(id) {
                    return Err(Error::invalid_operand(
                        "constant expression operands must be constants",
                    ));
                }
            }
            Ok(())
        })?;
        Ok(ids)
    }

    fn const_binary(self, opcode: Opcode, flags: ArithFlags, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, rhs])?;
        let id = self.write(|s| {
            let ty = s.binary_type(opcode, ids[0], ids[1])?;
            Ok(fold::build_constant(s, ty, opcode, flags, Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_add(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Add, ArithFlags::empty(), rhs)
    }

    pub fn const_nsw_add(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Add, ArithFlags::NSW, rhs)
    }

    pub fn const_fadd(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::FAdd, ArithFlags::empty(), rhs)
    }

    pub fn const_sub(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Sub, ArithFlags::empty(), rhs)
    }

    pub fn const_fsub(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::FSub, ArithFlags::empty(), rhs)
    }

    pub fn const_mul(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Mul, ArithFlags::empty(), rhs)
    }

    pub fn const_fmul(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::FMul, ArithFlags::empty(), rhs)
    }

    pub fn const_udiv(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::UDiv, ArithFlags::empty(), rhs)
    }

    pub fn const_sdiv(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::SDiv, ArithFlags::empty(), rhs)
    }

    pub fn const_exact_sdiv(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::SDiv, ArithFlags::EXACT, rhs)
    }

    pub fn const_fdiv(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::FDiv, ArithFlags::empty(), rhs)
    }

    pub fn const_urem(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::URem, ArithFlags::empty(), rhs)
    }

    pub fn const_srem(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::SRem, ArithFlags::empty(), rhs)
    }

    pub fn const_frem(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::FRem, ArithFlags::empty(), rhs)
    }

    pub fn const_and(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::And, ArithFlags::empty(), rhs)
    }

    pub fn const_or(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Or, ArithFlags::empty(), rhs)
    }

    pub fn const_xor(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Xor, ArithFlags::empty(), rhs)
    }

    pub fn const_shl(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::Shl, ArithFlags::empty(), rhs)
    }

    pub fn const_lshr(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::LShr, ArithFlags::empty(), rhs)
    }

    pub fn const_ashr(self, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        self.const_binary(Opcode::AShr, ArithFlags::empty(), rhs)
    }

    /// `0 - self`.
    pub fn const_neg(self) -> Result<Value<'ctx>> {
        let zero = self.type_of()?.const_null()?;
        zero.const_sub(self)
    }

    /// `-self` for floating-point constants.
    pub fn const_fneg(self) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self])?;
        let id = self.write(|s| {
            let ty = s.ty(ids[0])?;
            if !s.types.is_float_or_float_vector(ty) {
                return Err(Error::invalid_operand("fneg requires a floating-point operand"));
            }
            Ok(fold::build_constant(s, ty, Opcode::FNeg, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    /// `self ^ -1`.
    pub fn const_not(self) -> Result<Value<'ctx>> {
        let ones = self.type_of()?.const_all_ones()?;
        self.const_xor(ones)
    }

    pub fn const_icmp(self, predicate: IntPredicate, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, rhs])?;
        let id = self.write(|s| {
            let ty = s.compare_type(ids[0], ids[1], false)?;
            Ok(fold::build_constant(s, ty, Opcode::ICmp, ArithFlags::empty(), Extra::ICmp(predicate), &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_fcmp(self, predicate: FloatPredicate, rhs: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, rhs])?;
        let id = self.write(|s| {
            let ty = s.compare_type(ids[0], ids[1], true)?;
            Ok(fold::build_constant(s, ty, Opcode::FCmp, ArithFlags::empty(), Extra::FCmp(predicate), &ids))
        })?;
        Ok(self.wrap(id))
    }

    /// Constant conversion by `opcode` (one of the cast opcodes).
    pub fn const_cast(self, opcode: Opcode, to: Type<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self])?;
        type_ids(self.context(), &[to])?;
        let id = self.write(|s| {
            s.check_cast(opcode, s.ty(ids[0])?, to.id())?;
            Ok(fold::build_constant(s, to.id(), opcode, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_trunc(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::Trunc, to)
    }

    pub fn const_zext(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::ZExt, to)
    }

    pub fn const_sext(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::SExt, to)
    }

    pub fn const_fptrunc(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::FPTrunc, to)
    }

    pub fn const_fpext(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::FPExt, to)
    }

    pub fn const_uitofp(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::UIToFP, to)
    }

    pub fn const_sitofp(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::SIToFP, to)
    }

    pub fn const_fptoui(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::FPToUI, to)
    }

    pub fn const_fptosi(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::FPToSI, to)
    }

    pub fn const_ptrtoint(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::PtrToInt, to)
    }

    pub fn const_inttoptr(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::IntToPtr, to)
    }

    pub fn const_bitcast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        self.const_cast(Opcode::BitCast, to)
    }

    /// `zext` when widening, `bitcast` when the width is unchanged.
    pub fn const_zext_or_bitcast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        if self.type_of()? == to {
            return Ok(self);
        }
        match (self.type_of()?.int_width(), to.int_width()) {
            (Ok(from), Ok(to_width)) if from < to_width => self.const_zext(to),
            _ => self.const_bitcast(to),
        }
    }

    pub fn const_sext_or_bitcast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        if self.type_of()? == to {
            return Ok(self);
        }
        match (self.type_of()?.int_width(), to.int_width()) {
            (Ok(from), Ok(to_width)) if from < to_width => self.const_sext(to),
            _ => self.const_bitcast(to),
        }
    }

    pub fn const_trunc_or_bitcast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        if self.type_of()? == to {
            return Ok(self);
        }
        match (self.type_of()?.int_width(), to.int_width()) {
            (Ok(from), Ok(to_width)) if from > to_width => self.const_trunc(to),
            _ => self.const_bitcast(to),
        }
    }

    /// `ptrtoint` to integers, `bitcast` to other pointer types.
    pub fn const_pointer_cast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        if to.is_integer() {
            self.const_ptrtoint(to)
        } else {
            self.const_bitcast(to)
        }
    }

    /// Integer-to-integer conversion choosing `trunc`, `zext`/`sext` or
    /// nothing by width.
    pub fn const_int_cast(self, to: Type<'ctx>, signed: bool) -> Result<Value<'ctx>> {
        let from = self.type_of()?.int_width()?;
        let to_width = to.int_width()?;
        match from.cmp(&to_width) {
            std::cmp::Ordering::Equal => Ok(self),
            std::cmp::Ordering::Greater => self.const_trunc(to),
            std::cmp::Ordering::Less if signed => self.const_sext(to),
            std::cmp::Ordering::Less => self.const_zext(to),
        }
    }

    pub fn const_fp_cast(self, to: Type<'ctx>) -> Result<Value<'ctx>> {
        let from = self.type_of()?;
        if from == to {
            return Ok(self);
        }
        let (from_bits, to_bits) = self
            .context()
            .read(|s| (s.primitive_bits(from.id()), s.primitive_bits(to.id())));
        if from_bits > to_bits {
            self.const_fptrunc(to)
        } else {
            self.const_fpext(to)
        }
    }

    pub fn const_select(self, then: Value<'ctx>, otherwise: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, then, otherwise])?;
        let id = self.write(|s| {
            if !s.is_bool(ids[0])? {
                return Err(Error::invalid_operand("select condition must be i1"));
            }
            let ty = s.ty(ids[1])?;
            s.expect_type(ty, s.ty(ids[2])?)?;
            Ok(fold::build_constant(s, ty, Opcode::Select, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    fn const_gep_impl(self, indices: &[Value<'ctx>], in_bounds: bool) -> Result<Value<'ctx>> {
        let mut operands = vec![self];
        operands.extend_from_slice(indices);
        let ids = self.ensure_constants(&operands)?;
        let id = self.write(|s| {
            let ty = s.gep_type(ids[0], &ids[1..])?;
            Ok(fold::build_constant(s, ty, Opcode::GetElementPtr, ArithFlags::empty(), Extra::Gep { in_bounds }, &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_gep(self, indices: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        self.const_gep_impl(indices, false)
    }

    pub fn const_in_bounds_gep(self, indices: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        self.const_gep_impl(indices, true)
    }

    pub fn const_extract_value(self, indices: &[u32]) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self])?;
        let id = self.write(|s| {
            let ty = s.types.indexed_type(s.ty(ids[0])?, indices)?;
            Ok(fold::build_constant(s, ty, Opcode::ExtractValue, ArithFlags::empty(), Extra::Indices(indices.to_vec()), &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_insert_value(self, element: Value<'ctx>, indices: &[u32]) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, element])?;
        let id = self.write(|s| {
            let ty = s.ty(ids[0])?;
            let slot = s.types.indexed_type(ty, indices)?;
            s.expect_type(slot, s.ty(ids[1])?)?;
            Ok(fold::build_constant(s, ty, Opcode::InsertValue, ArithFlags::empty(), Extra::Indices(indices.to_vec()), &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_extract_element(self, index: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, index])?;
        let id = self.write(|s| {
            let (lane, _) = s
                .types
                .vector_info(s.ty(ids[0])?)
                .ok_or_else(|| Error::invalid_operand("extractelement requires a vector"))?;
            Ok(fold::build_constant(s, lane, Opcode::ExtractElement, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_insert_element(self, element: Value<'ctx>, index: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, element, index])?;
        let id = self.write(|s| {
            let ty = s.ty(ids[0])?;
            let (lane, _) = s
                .types
                .vector_info(ty)
                .ok_or_else(|| Error::invalid_operand("insertelement requires a vector"))?;
            s.expect_type(lane, s.ty(ids[1])?)?;
            Ok(fold::build_constant(s, ty, Opcode::InsertElement, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }

    pub fn const_shuffle_vector(self, other: Value<'ctx>, mask: Value<'ctx>) -> Result<Value<'ctx>> {
        let ids = self.ensure_constants(&[self, other, mask])?;
        let id = self.write(|s| {
            let ty = s.shuffle_type(ids[0], ids[1], ids[2])?;
            Ok(fold::build_constant(s, ty, Opcode::ShuffleVector, ArithFlags::empty(), Extra::None, &ids))
        })?;
        Ok(self.wrap(id))
    }
}
