//! Constant folding.
//!
//! Folding turns an operation over plain constants into a new plain
//! constant, using the semantics in [`crate::arith`]. Operations that
//! cannot be folded (a global operand, an undefined result such as a
//! division by zero) return `None`; callers then build an unfolded
//! constant expression or keep the instruction.
//!
//! [`build_constant`] is the single entry point used both by the constant
//! expression helpers on `Value` and by `Value::try_fold` on instructions.

use smallvec::SmallVec;

use crate::arith;
use crate::attributes::ArithFlags;
use crate::id::{TypeId, ValueId};
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::store::{AggregateKind, Extra, Payload, Store};
use crate::types::table::{TypeData, TypeTable};

/// Fold `opcode` over constant `operands`, or build an unfolded constant
/// expression of type `ty`.
pub(crate) fn build_constant(
    s: &mut Store,
    ty: TypeId,
    opcode: Opcode,
    flags: ArithFlags,
    extra: Extra,
    operands: &[ValueId],
) -> ValueId {
    if let Some(folded) = fold(s, ty, opcode, &extra, operands) {
        return folded;
    }
    s.const_expr(ty, opcode, flags, extra, operands)
}

/// Fold without building an expression.
pub(crate) fn fold(
    s: &mut Store,
    ty: TypeId,
    opcode: Opcode,
    extra: &Extra,
    operands: &[ValueId],
) -> Option<ValueId> {
    if !operands.iter().all(|&op| s.is_plain_constant(op)) {
        return None;
    }
    match (opcode, operands) {
        (op, &[lhs, rhs]) if op.is_binary() => fold_binary(s, ty, op, lhs, rhs),
        (Opcode::FNeg, &[value]) => fold_fneg(s, ty, value),
        (Opcode::ICmp, &[lhs, rhs]) => match extra {
            Extra::ICmp(predicate) => fold_icmp(s, ty, *predicate, lhs, rhs),
            _ => None,
        },
        (Opcode::FCmp, &[lhs, rhs]) => match extra {
            Extra::FCmp(predicate) => fold_fcmp(s, ty, *predicate, lhs, rhs),
            _ => None,
        },
        (op, &[value]) if op.is_cast() => fold_cast(s, op, value, ty),
        (Opcode::Select, &[cond, then, otherwise]) => fold_select(s, cond, then, otherwise),
        (Opcode::ExtractValue, &[aggregate]) => match extra {
            Extra::Indices(indices) => fold_extract_value(s, aggregate, indices),
            _ => None,
        },
        (Opcode::InsertValue, &[aggregate, value]) => match extra {
            Extra::Indices(indices) => fold_insert_value(s, aggregate, value, indices),
            _ => None,
        },
        (Opcode::ExtractElement, &[vector, index]) => fold_extract_element(s, vector, index),
        (Opcode::InsertElement, &[vector, element, index]) => {
            fold_insert_element(s, vector, element, index)
        }
        (Opcode::ShuffleVector, &[a, b, mask]) => fold_shuffle(s, ty, a, b, mask),
        _ => None,
    }
}

// ── Element access ──────────────────────────────────────────────────

/// Elements of a constant aggregate or vector, expanding zero and undef.
fn elements(s: &mut Store, value: ValueId) -> Option<SmallVec<[ValueId; 8]>> {
    let (ty, is_zero, is_undef, operands) = {
        let data = s.value(value).ok()?;
        (
            data.ty,
            matches!(data.payload, Payload::AggregateZero),
            matches!(data.payload, Payload::Undef),
            match data.payload {
                Payload::ConstArray | Payload::ConstStruct | Payload::ConstVector => {
                    Some(data.operands.clone())
                }
                _ => None,
            },
        )
    };
    if let Some(operands) = operands {
        return Some(operands.into_iter().collect());
    }
    if !is_zero && !is_undef {
        return None;
    }
    let element_types: Vec<TypeId> = match s.types.get(ty) {
        TypeData::Array { element, len } => vec![*element; usize::try_from(*len).ok()?],
        TypeData::Vector { element, len } => vec![*element; *len as usize],
        TypeData::Struct { .. } | TypeData::Named { .. } => s.types.struct_body(ty).ok()?.0.to_vec(),
        _ => return None,
    };
    Some(
        element_types
            .into_iter()
            .map(|t| if is_zero { s.null_value(t) } else { s.undef(t) })
            .collect(),
    )
}

fn rebuild(s: &mut Store, ty: TypeId, elements: &[ValueId]) -> ValueId {
    let kind = match s.types.get(ty) {
        TypeData::Array { .. } => AggregateKind::Array,
        TypeData::Vector { .. } => AggregateKind::Vector,
        _ => AggregateKind::Struct,
    };
    s.const_aggregate(ty, kind, elements)
}

/// Apply `f` lane by lane when both operands are vectors.
fn lanewise(
    s: &mut Store,
    ty: TypeId,
    lhs: ValueId,
    rhs: ValueId,
    f: impl Fn(&mut Store, TypeId, ValueId, ValueId) -> Option<ValueId>,
) -> Option<ValueId> {
    let (lane_ty, _) = s.types.vector_info(ty)?;
    let a = elements(s, lhs)?;
    let b = elements(s, rhs)?;
    let lanes: Option<Vec<ValueId>> = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| f(s, lane_ty, x, y))
        .collect();
    Some(rebuild(s, ty, &lanes?))
}

// ── Operators ───────────────────────────────────────────────────────

fn fold_binary(s: &mut Store, ty: TypeId, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
    if s.types.is_vector(ty) {
        return lanewise(s, ty, lhs, rhs, |s, lane, x, y| fold_binary(s, lane, opcode, x, y));
    }
    if s.is_undef(lhs) || s.is_undef(rhs) {
        // Division by undef may trap; everything else may pick any value.
        return if opcode.is_division() {
            None
        } else {
            Some(s.undef(ty))
        };
    }
    if let Some(width) = s.types.int_width(ty) {
        let a = s.int_value(lhs)?;
        let b = s.int_value(rhs)?;
        let bits = arith::int_binary(opcode, width, a, b).ok()?;
        return Some(s.const_int(ty, bits));
    }
    let a = s.fp_value(lhs)?;
    let b = s.fp_value(rhs)?;
    let result = arith::float_binary(opcode, a, b)?;
    Some(s.const_fp(ty, result))
}

fn fold_fneg(s: &mut Store, ty: TypeId, value: ValueId) -> Option<ValueId> {
    if s.types.is_vector(ty) {
        let (lane_ty, _) = s.types.vector_info(ty)?;
        let lanes: Option<Vec<ValueId>> = elements(s, value)?
            .into_iter()
            .map(|lane| fold_fneg(s, lane_ty, lane))
            .collect();
        return Some(rebuild(s, ty, &lanes?));
    }
    let v = s.fp_value(value)?;
    Some(s.const_fp(ty, -v))
}

fn compare_lanes(s: &mut Store, ty: TypeId, lhs: ValueId, rhs: ValueId, lane: impl Fn(&mut Store, ValueId, ValueId) -> Option<bool>) -> Option<ValueId> {
    if s.types.is_vector(ty) {
        return lanewise(s, ty, lhs, rhs, |s, lane_ty, x, y| {
            let result = lane(s, x, y)?;
            Some(s.const_int(lane_ty, u128::from(result)))
        });
    }
    let result = lane(s, lhs, rhs)?;
    Some(s.const_int(TypeTable::I1, u128::from(result)))
}

fn fold_icmp(s: &mut Store, ty: TypeId, predicate: IntPredicate, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
    compare_lanes(s, ty, lhs, rhs, |s, x, y| {
        let operand_ty = s.ty(x).ok()?;
        if s.types.is_pointer(operand_ty) {
            // Only null pointers are plain constants.
            return match predicate {
                IntPredicate::Eq | IntPredicate::Uge | IntPredicate::Ule | IntPredicate::Sge | IntPredicate::Sle => Some(true),
                _ => Some(false),
            };
        }
        let width = s.types.int_width(operand_ty)?;
        let a = s.int_value(x)?;
        let b = s.int_value(y)?;
        Some(arith::int_compare(predicate, width, a, b))
    })
}

fn fold_fcmp(s: &mut Store, ty: TypeId, predicate: FloatPredicate, lhs: ValueId, rhs: ValueId) -> Option<ValueId> {
    compare_lanes(s, ty, lhs, rhs, |s, x, y| {
        let a = s.fp_value(x)?;
        let b = s.fp_value(y)?;
        Some(arith::float_compare(predicate, a, b))
    })
}

fn fold_cast(s: &mut Store, opcode: Opcode, value: ValueId, dest: TypeId) -> Option<ValueId> {
    let source = s.ty(value).ok()?;
    if s.is_undef(value) {
        return Some(s.undef(dest));
    }
    if s.types.is_vector(dest) {
        let (lane_ty, _) = s.types.vector_info(dest)?;
        let lanes: Option<Vec<ValueId>> = elements(s, value)?
            .into_iter()
            .map(|lane| fold_cast(s, opcode, lane, lane_ty))
            .collect();
        return Some(rebuild(s, dest, &lanes?));
    }
    match opcode {
        Opcode::Trunc | Opcode::ZExt | Opcode::SExt => {
            let from = s.types.int_width(source)?;
            let to = s.types.int_width(dest)?;
            let bits = s.int_value(value)?;
            Some(s.const_int(dest, arith::int_cast(opcode, from, to, bits)))
        }
        Opcode::UIToFP | Opcode::SIToFP => {
            let width = s.types.int_width(source)?;
            let bits = s.int_value(value)?;
            let result = arith::int_to_float(bits, width, opcode == Opcode::SIToFP);
            Some(s.const_fp(dest, result))
        }
        Opcode::FPToUI | Opcode::FPToSI => {
            let width = s.types.int_width(dest)?;
            let v = s.fp_value(value)?;
            let bits = arith::float_to_int(v, width, opcode == Opcode::FPToSI)?;
            Some(s.const_int(dest, bits))
        }
        Opcode::FPTrunc | Opcode::FPExt => {
            let v = s.fp_value(value)?;
            Some(s.const_fp(dest, v))
        }
        Opcode::PtrToInt => s.is_null(value).then(|| s.const_int(dest, 0)),
        Opcode::IntToPtr => (s.int_value(value)? == 0).then(|| s.pointer_null(dest)),
        Opcode::BitCast => fold_bitcast(s, value, source, dest),
        _ => None,
    }
}

fn fold_bitcast(s: &mut Store, value: ValueId, source: TypeId, dest: TypeId) -> Option<ValueId> {
    if source == dest {
        return Some(value);
    }
    if s.types.is_pointer(dest) {
        return s.is_null(value).then(|| s.pointer_null(dest));
    }
    let bits: u128 = if let Some(bits) = s.int_value(value) {
        bits
    } else {
        let v = s.fp_value(value)?;
        match s.types.get(source) {
            TypeData::Float => u128::from((v as f32).to_bits()),
            TypeData::Double => u128::from(v.to_bits()),
            _ => return None,
        }
    };
    if s.types.is_int(dest) {
        return Some(s.const_int(dest, bits));
    }
    match s.types.get(dest) {
        TypeData::Float => Some(s.const_fp(dest, f64::from(f32::from_bits(bits as u32)))),
        TypeData::Double => Some(s.const_fp(dest, f64::from_bits(bits as u64))),
        _ => None,
    }
}

fn fold_select(s: &mut Store, cond: ValueId, then: ValueId, otherwise: ValueId) -> Option<ValueId> {
    let bit = s.int_value(cond)?;
    Some(if bit & 1 == 1 { then } else { otherwise })
}

fn fold_extract_value(s: &mut Store, aggregate: ValueId, indices: &[u32]) -> Option<ValueId> {
    let mut current = aggregate;
    for &index in indices {
        current = *elements(s, current)?.get(index as usize)?;
    }
    Some(current)
}

fn fold_insert_value(s: &mut Store, aggregate: ValueId, value: ValueId, indices: &[u32]) -> Option<ValueId> {
    let (&first, rest) = indices.split_first()?;
    let mut items = elements(s, aggregate)?;
    let slot = items.get_mut(first as usize)?;
    *slot = if rest.is_empty() {
        value
    } else {
        fold_insert_value(s, *slot, value, rest)?
    };
    let ty = s.ty(aggregate).ok()?;
    Some(rebuild(s, ty, &items))
}

fn fold_extract_element(s: &mut Store, vector: ValueId, index: ValueId) -> Option<ValueId> {
    let index = usize::try_from(s.int_value(index)?).ok()?;
    elements(s, vector)?.get(index).copied()
}

fn fold_insert_element(s: &mut Store, vector: ValueId, element: ValueId, index: ValueId) -> Option<ValueId> {
    let index = usize::try_from(s.int_value(index)?).ok()?;
    let mut items = elements(s, vector)?;
    *items.get_mut(index)? = element;
    let ty = s.ty(vector).ok()?;
    Some(rebuild(s, ty, &items))
}

fn fold_shuffle(s: &mut Store, ty: TypeId, a: ValueId, b: ValueId, mask: ValueId) -> Option<ValueId> {
    let left = elements(s, a)?;
    let right = elements(s, b)?;
    let mask = elements(s, mask)?;
    let mut lanes = Vec::with_capacity(mask.len());
    for lane in mask {
        let picked = if s.is_undef(lane) {
            let (lane_ty, _) = s.types.vector_info(ty)?;
            s.undef(lane_ty)
        } else {
            let index = usize::try_from(s.int_value(lane)?).ok()?;
            if index < left.len() {
                left[index]
            } else {
                *right.get(index - left.len())?
            }
        };
        lanes.push(picked);
    }
    Some(rebuild(s, ty, &lanes))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
