//! Casts between integer, float, pointer and vector types.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::types::Type;
use crate::value::Value;

use super::{Builder, Inst};

macro_rules! cast_ops {
    ($( $method:ident => $opcode:ident; )*) => {
        impl<'ctx> Builder<'ctx> {
            $(
                pub fn $method(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
                    self.build_cast(Opcode::$opcode, value, to, name)
                }
            )*
        }
    };
}

cast_ops! {
    build_trunc => Trunc;
    build_zext => ZExt;
    build_sext => SExt;
    build_fp_to_ui => FPToUI;
    build_fp_to_si => FPToSI;
    build_ui_to_fp => UIToFP;
    build_si_to_fp => SIToFP;
    build_fp_trunc => FPTrunc;
    build_fp_ext => FPExt;
    build_ptr_to_int => PtrToInt;
    build_int_to_ptr => IntToPtr;
    build_bit_cast => BitCast;
}

impl<'ctx> Builder<'ctx> {
    /// Any cast by opcode; the conversion must be valid for the operand
    /// and destination types.
    pub fn build_cast(&self, opcode: Opcode, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let [value] = self.ids([value])?;
        self.ctx.ensure_same(to.context())?;
        self.emit(name, |s| {
            s.check_cast(opcode, s.ty(value)?, to.id())?;
            Ok(Inst::new(to.id(), opcode, &[value]))
        })
    }

    /// Integer widths of `value` and `to`, when both are integers.
    fn int_widths(value: Value<'ctx>, to: Type<'ctx>) -> Result<Option<(u32, u32)>> {
        let from = value.type_of()?;
        Ok(match (from.int_width(), to.int_width()) {
            (Ok(a), Ok(b)) => Some((a, b)),
            _ => None,
        })
    }

    pub fn build_zext_or_bit_cast(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        match Self::int_widths(value, to)? {
            Some((from, width)) if from < width => self.build_zext(value, to, name),
            _ => self.build_bit_cast(value, to, name),
        }
    }

    pub fn build_sext_or_bit_cast(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        match Self::int_widths(value, to)? {
            Some((from, width)) if from < width => self.build_sext(value, to, name),
            _ => self.build_bit_cast(value, to, name),
        }
    }

    pub fn build_trunc_or_bit_cast(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        match Self::int_widths(value, to)? {
            Some((from, width)) if from > width => self.build_trunc(value, to, name),
            _ => self.build_bit_cast(value, to, name),
        }
    }

    /// `ptrtoint` for integer destinations, `bitcast` between pointers.
    pub fn build_pointer_cast(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        if !value.type_of()?.is_pointer() {
            return Err(Error::invalid_operand("pointer cast of a non-pointer"));
        }
        if to.is_integer() {
            self.build_ptr_to_int(value, to, name)
        } else {
            self.build_bit_cast(value, to, name)
        }
    }

    /// Integer resize: `trunc`, `sext`/`zext`, or a plain `bitcast` when
    /// the widths already match.
    pub fn build_int_cast(&self, value: Value<'ctx>, to: Type<'ctx>, signed: bool, name: &str) -> Result<Value<'ctx>> {
        let Some((from, width)) = Self::int_widths(value, to)? else {
            return Err(Error::invalid_operand("int cast requires integer types"));
        };
        match from.cmp(&width) {
            Ordering::Greater => self.build_trunc(value, to, name),
            Ordering::Less if signed => self.build_sext(value, to, name),
            Ordering::Less => self.build_zext(value, to, name),
            Ordering::Equal => self.build_bit_cast(value, to, name),
        }
    }

    /// Float resize: `fptrunc`, `fpext`, or `bitcast` for the same type.
    pub fn build_fp_cast(&self, value: Value<'ctx>, to: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let from = value.type_of()?;
        if !from.is_floating_point() || !to.is_floating_point() {
            return Err(Error::invalid_operand("fp cast requires floating-point types"));
        }
        if from == to {
            return self.build_bit_cast(value, to, name);
        }
        let (from_bits, to_bits) = self
            .ctx
            .read(|s| (s.primitive_bits(from.id()), s.primitive_bits(to.id())));
        if from_bits > to_bits {
            self.build_fp_trunc(value, to, name)
        } else {
            self.build_fp_ext(value, to, name)
        }
    }
}
