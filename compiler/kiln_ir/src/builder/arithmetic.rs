//! Integer, float and bitwise arithmetic.

use crate::attributes::ArithFlags;
use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::value::Value;

use super::{Builder, Inst};

macro_rules! binary_ops {
    ($( $(#[$doc:meta])* $method:ident => $opcode:ident, $flags:expr; )*) => {
        impl<'ctx> Builder<'ctx> {
            $(
                $(#[$doc])*
                pub fn $method(&self, lhs: Value<'ctx>, rhs: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
                    self.build_binary(Opcode::$opcode, $flags, lhs, rhs, name)
                }
            )*
        }
    };
}

binary_ops! {
    build_add => Add, ArithFlags::empty();
    /// Add with no signed wrap.
    build_nsw_add => Add, ArithFlags::NSW;
    /// Add with no unsigned wrap.
    build_nuw_add => Add, ArithFlags::NUW;
    build_fadd => FAdd, ArithFlags::empty();
    build_sub => Sub, ArithFlags::empty();
    build_nsw_sub => Sub, ArithFlags::NSW;
    build_nuw_sub => Sub, ArithFlags::NUW;
    build_fsub => FSub, ArithFlags::empty();
    build_mul => Mul, ArithFlags::empty();
    build_nsw_mul => Mul, ArithFlags::NSW;
    build_nuw_mul => Mul, ArithFlags::NUW;
    build_fmul => FMul, ArithFlags::empty();
    build_udiv => UDiv, ArithFlags::empty();
    build_sdiv => SDiv, ArithFlags::empty();
    /// Signed division known to leave no remainder.
    build_exact_sdiv => SDiv, ArithFlags::EXACT;
    build_fdiv => FDiv, ArithFlags::empty();
    build_urem => URem, ArithFlags::empty();
    build_srem => SRem, ArithFlags::empty();
    build_frem => FRem, ArithFlags::empty();
    build_shl => Shl, ArithFlags::empty();
    build_lshr => LShr, ArithFlags::empty();
    build_ashr => AShr, ArithFlags::empty();
    build_and => And, ArithFlags::empty();
    build_or => Or, ArithFlags::empty();
    build_xor => Xor, ArithFlags::empty();
}

impl<'ctx> Builder<'ctx> {
    fn build_binary(
        &self,
        opcode: Opcode,
        flags: ArithFlags,
        lhs: Value<'ctx>,
        rhs: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [lhs, rhs] = self.ids([lhs, rhs])?;
        self.emit(name, |s| {
            let ty = s.binary_type(opcode, lhs, rhs)?;
            Ok(Inst::new(ty, opcode, &[lhs, rhs]).flags(flags))
        })
    }

    /// Any binary operator by opcode.
    pub fn build_bin_op(
        &self,
        opcode: Opcode,
        lhs: Value<'ctx>,
        rhs: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        if !opcode.is_binary() {
            return Err(Error::invalid_operand(format!("`{opcode}` is not a binary operator")));
        }
        self.build_binary(opcode, ArithFlags::empty(), lhs, rhs, name)
    }

    fn build_negation(&self, flags: ArithFlags, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let zero = value.type_of()?.const_null()?;
        self.build_binary(Opcode::Sub, flags, zero, value, name)
    }

    /// `sub 0, value`.
    pub fn build_neg(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.build_negation(ArithFlags::empty(), value, name)
    }

    pub fn build_nsw_neg(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.build_negation(ArithFlags::NSW, value, name)
    }

    pub fn build_nuw_neg(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.build_negation(ArithFlags::NUW, value, name)
    }

    pub fn build_fneg(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let [value] = self.ids([value])?;
        self.emit(name, |s| {
            let ty = s.ty(value)?;
            if !s.types.is_float_or_float_vector(ty) {
                return Err(Error::invalid_operand(format!(
                    "fneg does not accept operands of type `{}`",
                    s.type_name(ty)
                )));
            }
            Ok(Inst::new(ty, Opcode::FNeg, &[value]))
        })
    }

    /// `xor value, -1`.
    pub fn build_not(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let ones = value.type_of()?.const_all_ones()?;
        self.build_binary(Opcode::Xor, ArithFlags::empty(), value, ones, name)
    }
}
