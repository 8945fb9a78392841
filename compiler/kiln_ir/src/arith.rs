//! Integer and floating-point semantics of the instruction set.
//!
//! Integers are carried as zero-extended `u128` bit patterns together with
//! their width; signedness belongs to the operation, not the value. These
//! functions are shared by constant folding and by execution engines, so a
//! folded constant and an executed instruction always agree.

use crate::opcode::{FloatPredicate, IntPredicate, Opcode};

/// Why an integer operation has no defined result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithFault {
    DivisionByZero,
    /// `INT_MIN / -1` and `INT_MIN % -1`.
    SignedOverflow,
    /// Shift amount not smaller than the bit width.
    ShiftOutOfRange,
    /// The opcode is not an integer binary operator.
    NotAnIntegerOp,
}

/// All-ones mask for `width` bits.
#[inline]
pub fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Keep the low `width` bits.
#[inline]
pub fn truncate(bits: u128, width: u32) -> u128 {
    bits & mask(width)
}

/// Interpret the low `width` bits as a two's-complement integer.
#[inline]
pub fn sign_extend(bits: u128, width: u32) -> i128 {
    if width >= 128 {
        return bits as i128;
    }
    let shift = 128 - width;
    ((bits << shift) as i128) >> shift
}

/// Two's-complement bit pattern of `value` in `width` bits.
#[inline]
pub fn from_signed(value: i128, width: u32) -> u128 {
    truncate(value as u128, width)
}

/// Whether `value` is representable in `width` bits, unsigned or (when
/// `signed` is allowed) as a two's-complement number.
pub fn fits(value: i128, width: u32, signed: bool) -> bool {
    let unsigned_ok = value >= 0 && (width >= 128 || (value as u128) <= mask(width));
    if unsigned_ok {
        return true;
    }
    if !signed {
        return false;
    }
    if width >= 128 {
        return true;
    }
    let min = -(1i128 << (width - 1));
    let max = (1i128 << (width - 1)) - 1;
    (min..=max).contains(&value)
}

/// Evaluate an integer binary operator.
pub fn int_binary(opcode: Opcode, width: u32, lhs: u128, rhs: u128) -> Result<u128, ArithFault> {
    let (lhs, rhs) = (truncate(lhs, width), truncate(rhs, width));
    let signed_min = from_signed(i128::MIN >> (128 - width), width);
    let minus_one = mask(width);
    let result = match opcode {
        Opcode::Add => lhs.wrapping_add(rhs),
        Opcode::Sub => lhs.wrapping_sub(rhs),
        Opcode::Mul => lhs.wrapping_mul(rhs),
        Opcode::UDiv | Opcode::URem if rhs == 0 => return Err(ArithFault::DivisionByZero),
        Opcode::UDiv => lhs / rhs,
        Opcode::URem => lhs % rhs,
        Opcode::SDiv | Opcode::SRem if rhs == 0 => return Err(ArithFault::DivisionByZero),
        Opcode::SDiv | Opcode::SRem if lhs == signed_min && rhs == minus_one => {
            return Err(ArithFault::SignedOverflow)
        }
        Opcode::SDiv => from_signed(sign_extend(lhs, width) / sign_extend(rhs, width), width),
        Opcode::SRem => from_signed(sign_extend(lhs, width) % sign_extend(rhs, width), width),
        Opcode::Shl | Opcode::LShr | Opcode::AShr if rhs >= u128::from(width) => {
            return Err(ArithFault::ShiftOutOfRange)
        }
        Opcode::Shl => lhs << rhs,
        Opcode::LShr => lhs >> rhs,
        Opcode::AShr => from_signed(sign_extend(lhs, width) >> rhs, width),
        Opcode::And => lhs & rhs,
        Opcode::Or => lhs | rhs,
        Opcode::Xor => lhs ^ rhs,
        _ => return Err(ArithFault::NotAnIntegerOp),
    };
    Ok(truncate(result, width))
}

/// Whether signed or unsigned overflow occurs for `add`/`sub`/`mul`.
pub fn overflows(opcode: Opcode, width: u32, lhs: u128, rhs: u128, signed: bool) -> bool {
    if signed {
        let (a, b) = (sign_extend(lhs, width), sign_extend(rhs, width));
        let exact = match opcode {
            Opcode::Add => a.checked_add(b),
            Opcode::Sub => a.checked_sub(b),
            Opcode::Mul => a.checked_mul(b),
            _ => return false,
        };
        exact.map_or(true, |v| !fits_signed(v, width))
    } else {
        let (a, b) = (truncate(lhs, width), truncate(rhs, width));
        let exact = match opcode {
            Opcode::Add => a.checked_add(b),
            Opcode::Sub => a.checked_sub(b),
            Opcode::Mul => a.checked_mul(b),
            _ => return false,
        };
        exact.map_or(true, |v| v > mask(width))
    }
}

fn fits_signed(value: i128, width: u32) -> bool {
    width >= 128 || (-(1i128 << (width - 1))..(1i128 << (width - 1))).contains(&value)
}

pub fn int_compare(predicate: IntPredicate, width: u32, lhs: u128, rhs: u128) -> bool {
    let (ul, ur) = (truncate(lhs, width), truncate(rhs, width));
    let (sl, sr) = (sign_extend(lhs, width), sign_extend(rhs, width));
    match predicate {
        IntPredicate::Eq => ul == ur,
        IntPredicate::Ne => ul != ur,
        IntPredicate::Ugt => ul > ur,
        IntPredicate::Uge => ul >= ur,
        IntPredicate::Ult => ul < ur,
        IntPredicate::Ule => ul <= ur,
        IntPredicate::Sgt => sl > sr,
        IntPredicate::Sge => sl >= sr,
        IntPredicate::Slt => sl < sr,
        IntPredicate::Sle => sl <= sr,
    }
}

/// Evaluate a floating-point binary operator in `f64`.
pub fn float_binary(opcode: Opcode, lhs: f64, rhs: f64) -> Option<f64> {
    Some(match opcode {
        Opcode::FAdd => lhs + rhs,
        Opcode::FSub => lhs - rhs,
        Opcode::FMul => lhs * rhs,
        Opcode::FDiv => lhs / rhs,
        Opcode::FRem => lhs % rhs,
        _ => return None,
    })
}

pub fn float_compare(predicate: FloatPredicate, lhs: f64, rhs: f64) -> bool {
    let unordered = lhs.is_nan() || rhs.is_nan();
    match predicate {
        FloatPredicate::False => false,
        FloatPredicate::True => true,
        FloatPredicate::Ord => !unordered,
        FloatPredicate::Uno => unordered,
        FloatPredicate::Oeq => !unordered && lhs == rhs,
        FloatPredicate::Ogt => !unordered && lhs > rhs,
        FloatPredicate::Oge => !unordered && lhs >= rhs,
        FloatPredicate::Olt => !unordered && lhs < rhs,
        FloatPredicate::Ole => !unordered && lhs <= rhs,
        FloatPredicate::One => !unordered && lhs != rhs,
        FloatPredicate::Ueq => unordered || lhs == rhs,
        FloatPredicate::Ugt => unordered || lhs > rhs,
        FloatPredicate::Uge => unordered || lhs >= rhs,
        FloatPredicate::Ult => unordered || lhs < rhs,
        FloatPredicate::Ule => unordered || lhs <= rhs,
        FloatPredicate::Une => unordered || lhs != rhs,
    }
}

/// `trunc`, `zext` or `sext` between integer widths.
pub fn int_cast(opcode: Opcode, from_width: u32, to_width: u32, bits: u128) -> u128 {
    match opcode {
        Opcode::SExt => from_signed(sign_extend(bits, from_width), to_width),
        Opcode::ZExt => truncate(bits, from_width),
        _ => truncate(bits, to_width),
    }
}

pub fn int_to_float(bits: u128, width: u32, signed: bool) -> f64 {
    if signed {
        sign_extend(bits, width) as f64
    } else {
        truncate(bits, width) as f64
    }
}

/// Convert toward zero; `None` when the result is not representable.
pub fn float_to_int(value: f64, width: u32, signed: bool) -> Option<u128> {
    if !value.is_finite() {
        return None;
    }
    let value = value.trunc();
    if signed {
        if value < -(2f64.powi(width as i32 - 1)) || value >= 2f64.powi(width as i32 - 1) {
            return None;
        }
        Some(from_signed(value as i128, width))
    } else {
        if value < 0.0 || value >= 2f64.powi(width as i32) {
            return None;
        }
        Some(value as u128)
    }
}
