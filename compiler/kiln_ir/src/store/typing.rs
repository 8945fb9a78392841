//! Operand type rules shared by the builder and constant expressions.

use super::Store;
use crate::error::{Error, Result};
use crate::id::{TypeId, ValueId};
use crate::opcode::Opcode;
use crate::types::table::{TypeData, TypeTable};

impl Store {
    pub(crate) fn expect_type(&self, expected: TypeId, found: TypeId) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.type_name(expected),
                found: self.type_name(found),
            })
        }
    }

    /// Result type of a binary operator.
    pub(crate) fn binary_type(&self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> Result<TypeId> {
        let lhs_ty = self.ty(lhs)?;
        let rhs_ty = self.ty(rhs)?;
        self.expect_type(lhs_ty, rhs_ty)?;
        let ok = if opcode.is_float_binary() {
            self.types.is_float_or_float_vector(lhs_ty)
        } else {
            self.types.is_int_or_int_vector(lhs_ty)
        };
        if !ok {
            return Err(Error::invalid_operand(format!(
                "`{opcode}` does not accept operands of type `{}`",
                self.type_name(lhs_ty)
            )));
        }
        Ok(lhs_ty)
    }

    /// `i1`, or a vector of `i1` matching the operand shape.
    pub(crate) fn compare_type(&mut self, lhs: ValueId, rhs: ValueId, float: bool) -> Result<TypeId> {
        let lhs_ty = self.ty(lhs)?;
        let rhs_ty = self.ty(rhs)?;
        self.expect_type(lhs_ty, rhs_ty)?;
        let scalar = self.types.scalar(lhs_ty);
        let ok = if float {
            self.types.is_float(scalar)
        } else {
            self.types.is_int(scalar) || self.types.is_pointer(scalar)
        };
        if !ok {
            return Err(Error::invalid_operand(format!(
                "cannot compare values of type `{}`",
                self.type_name(lhs_ty)
            )));
        }
        match self.types.vector_info(lhs_ty) {
            Some((_, len)) => self.types.vector(TypeTable::I1, len),
            None => Ok(TypeTable::I1),
        }
    }

    /// Validate a conversion from `from` to `to`.
    pub(crate) fn check_cast(&self, opcode: Opcode, from: TypeId, to: TypeId) -> Result<()> {
        let t = &self.types;
        let (from_s, to_s) = (t.scalar(from), t.scalar(to));
        let same_shape = match (t.vector_info(from), t.vector_info(to)) {
            (Some((_, a)), Some((_, b))) => a == b,
            (None, None) => true,
            _ => false,
        };
        let int_bits = |ty| t.int_width(ty).unwrap_or(0);
        let fp_rank = |ty| match t.get(ty) {
            TypeData::Half => 1,
            TypeData::Float => 2,
            TypeData::Double => 3,
            TypeData::X86Fp80 => 4,
            TypeData::Fp128 | TypeData::PpcFp128 => 5,
            _ => 0,
        };
        let valid = match opcode {
            Opcode::Trunc => same_shape && t.is_int(from_s) && t.is_int(to_s) && int_bits(from_s) > int_bits(to_s),
            Opcode::ZExt | Opcode::SExt => {
                same_shape && t.is_int(from_s) && t.is_int(to_s) && int_bits(from_s) < int_bits(to_s)
            }
            Opcode::FPToUI | Opcode::FPToSI => same_shape && t.is_float(from_s) && t.is_int(to_s),
            Opcode::UIToFP | Opcode::SIToFP => same_shape && t.is_int(from_s) && t.is_float(to_s),
            Opcode::FPTrunc => same_shape && fp_rank(from_s) > fp_rank(to_s) && fp_rank(to_s) > 0,
            Opcode::FPExt => same_shape && fp_rank(from_s) < fp_rank(to_s) && fp_rank(from_s) > 0,
            Opcode::PtrToInt => same_shape && t.is_pointer(from_s) && t.is_int(to_s),
            Opcode::IntToPtr => same_shape && t.is_int(from_s) && t.is_pointer(to_s),
            Opcode::BitCast => {
                if t.is_pointer(from) || t.is_pointer(to) {
                    t.is_pointer(from) && t.is_pointer(to)
                } else {
                    t.is_first_class(from)
                        && t.is_first_class(to)
                        && !t.is_aggregate(from)
                        && !t.is_aggregate(to)
                        && self.primitive_bits(from).is_some()
                        && self.primitive_bits(from) == self.primitive_bits(to)
                }
            }
            _ => return Err(Error::invalid_operand(format!("`{opcode}` is not a cast"))),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::invalid_operand(format!(
                "invalid cast `{opcode}` from `{}` to `{}`",
                self.type_name(from),
                self.type_name(to)
            )))
        }
    }

    /// Bit width of a non-aggregate, non-pointer type.
    pub(crate) fn primitive_bits(&self, ty: TypeId) -> Option<u64> {
        match self.types.get(ty) {
            TypeData::Int(width) => Some(u64::from(*width)),
            TypeData::Half => Some(16),
            TypeData::Float => Some(32),
            TypeData::Double | TypeData::X86Mmx => Some(64),
            TypeData::X86Fp80 => Some(80),
            TypeData::Fp128 | TypeData::PpcFp128 => Some(128),
            TypeData::Vector { element, len } => {
                self.primitive_bits(*element).map(|bits| bits * u64::from(*len))
            }
            _ => None,
        }
    }

    /// Result type of `getelementptr ptr, indices...`.
    ///
    /// The first index steps over the pointer; the rest index into the
    /// pointee. Struct indices must be constant `i32`s.
    pub(crate) fn gep_type(&mut self, pointer: ValueId, indices: &[ValueId]) -> Result<TypeId> {
        let ptr_ty = self.ty(pointer)?;
        let (pointee, address_space) = match self.types.get(ptr_ty) {
            TypeData::Pointer {
                pointee,
                address_space,
            } => (*pointee, *address_space),
            _ => {
                return Err(Error::invalid_operand(format!(
                    "getelementptr base must be a pointer, found `{}`",
                    self.type_name(ptr_ty)
                )))
            }
        };
        if indices.is_empty() {
            return Ok(ptr_ty);
        }
        for &index in indices {
            let index_ty = self.ty(index)?;
            if !self.types.is_int(index_ty) {
                return Err(Error::invalid_operand(format!(
                    "getelementptr index must be an integer, found `{}`",
                    self.type_name(index_ty)
                )));
            }
        }
        let mut current = pointee;
        for &index in &indices[1..] {
            current = match self.types.get(current) {
                TypeData::Struct { .. } | TypeData::Named { .. } => {
                    let Some(field) = self.int_value(index) else {
                        return Err(Error::invalid_operand(
                            "struct index in getelementptr must be a constant",
                        ));
                    };
                    let (elements, _) = self.types.struct_body(current)?;
                    *elements.get(field as usize).ok_or(Error::IndexOutOfRange {
                        index: field as usize,
                        len: elements.len(),
                    })?
                }
                TypeData::Array { element, .. } | TypeData::Vector { element, .. } => *element,
                _ => {
                    return Err(Error::invalid_operand(format!(
                        "cannot index into `{}`",
                        self.type_name(current)
                    )))
                }
            };
        }
        self.types.pointer(current, address_space)
    }

    /// `(function type, return, params, var_arg)` of a callee, which must
    /// be a pointer to a function.
    pub(crate) fn callee_signature(&self, callee: ValueId) -> Result<(TypeId, TypeId, Vec<TypeId>, bool)> {
        let callee_ty = self.ty(callee)?;
        let fn_ty = self
            .types
            .pointee(callee_ty)
            .filter(|&p| self.types.is_function(p))
            .ok_or_else(|| {
                Error::invalid_operand(format!(
                    "callee must be a pointer to a function, found `{}`",
                    self.type_name(callee_ty)
                ))
            })?;
        let (ret, params, var_arg) = self
            .types
            .function_info(fn_ty)
            .ok_or_else(|| Error::invalid_operand("callee has no function type"))?;
        Ok((fn_ty, ret, params.to_vec(), var_arg))
    }

    /// Validate call arguments against a callee signature.
    pub(crate) fn check_call_args(&self, callee: ValueId, args: &[ValueId]) -> Result<TypeId> {
        let (_, ret, params, var_arg) = self.callee_signature(callee)?;
        let count_ok = if var_arg {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !count_ok {
            return Err(Error::invalid_operand(format!(
                "call expects {} argument(s), got {}",
                params.len(),
                args.len()
            )));
        }
        for (&param, &arg) in params.iter().zip(args) {
            self.expect_type(param, self.ty(arg)?)?;
        }
        Ok(ret)
    }

    /// Result type of `shufflevector a, b, mask`: a vector of the operand
    /// lane type as long as the `i32` mask.
    pub(crate) fn shuffle_type(&mut self, a: ValueId, b: ValueId, mask: ValueId) -> Result<TypeId> {
        let a_ty = self.ty(a)?;
        self.expect_type(a_ty, self.ty(b)?)?;
        let (lane, _) = self
            .types
            .vector_info(a_ty)
            .ok_or_else(|| Error::invalid_operand("shufflevector requires vector operands"))?;
        let mask_ty = self.ty(mask)?;
        let mask_len = match self.types.vector_info(mask_ty) {
            Some((TypeTable::I32, len)) if self.is_constant(mask) => len,
            _ => {
                return Err(Error::invalid_operand(
                    "shufflevector mask must be a constant vector of i32",
                ))
            }
        };
        self.types.vector(lane, mask_len)
    }

    /// Whether `id` is an `i1` (or vector of `i1`) value.
    pub(crate) fn is_bool(&self, id: ValueId) -> Result<bool> {
        let ty = self.ty(id)?;
        Ok(self.types.scalar(ty) == TypeTable::I1)
    }
}
