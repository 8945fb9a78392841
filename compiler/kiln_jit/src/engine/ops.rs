//! Instruction semantics over runtime values.
//!
//! Integer and float arithmetic delegates to [`kiln_ir::arith`], so executed
//! code and constant folding agree bit for bit. Vector operands are
//! processed lane by lane.

use kiln_ir::{arith, DataLayout, FloatPredicate, IntPredicate, Opcode, Type, TypeKind};

use super::encode;
use crate::error::{Error, Result, Trap};
use crate::generic_value::Data;

fn unsupported(what: String) -> Error {
    Trap::Unsupported(what).into()
}

fn lanewise(lhs: &[Data], rhs: &[Data], f: impl Fn(&Data, &Data) -> Result<Data>) -> Result<Data> {
    if lhs.len() != rhs.len() {
        return Err(unsupported(format!(
            "vectors of {} and {} lanes",
            lhs.len(),
            rhs.len()
        )));
    }
    lhs.iter()
        .zip(rhs)
        .map(|(l, r)| f(l, r))
        .collect::<Result<_>>()
        .map(Data::Aggregate)
}

pub(super) fn make_float(ty: Type<'_>, value: f64) -> Result<Data> {
    match ty.kind() {
        TypeKind::Float => Ok(Data::Float(value as f32)),
        TypeKind::Double => Ok(Data::Double(value)),
        _ => Err(unsupported(format!("floating-point values of type `{ty}`"))),
    }
}

pub(super) fn binary(opcode: Opcode, lhs: &Data, rhs: &Data) -> Result<Data> {
    match (lhs, rhs) {
        (Data::Int { bits: a, width }, Data::Int { bits: b, .. }) => {
            let bits = arith::int_binary(opcode, *width, *a, *b).map_err(Trap::from)?;
            Ok(Data::int(bits, *width))
        }
        (Data::Float(a), Data::Float(b)) => arith::float_binary(opcode, f64::from(*a), f64::from(*b))
            .map(|v| Data::Float(v as f32))
            .ok_or_else(|| unsupported(format!("`{opcode}` on float"))),
        (Data::Double(a), Data::Double(b)) => arith::float_binary(opcode, *a, *b)
            .map(Data::Double)
            .ok_or_else(|| unsupported(format!("`{opcode}` on double"))),
        (Data::Aggregate(a), Data::Aggregate(b)) => lanewise(a, b, |l, r| binary(opcode, l, r)),
        _ => Err(unsupported(format!(
            "`{opcode}` on {} and {}",
            lhs.describe(),
            rhs.describe()
        ))),
    }
}

pub(super) fn fneg(value: &Data) -> Result<Data> {
    match value {
        Data::Float(v) => Ok(Data::Float(-v)),
        Data::Double(v) => Ok(Data::Double(-v)),
        Data::Aggregate(lanes) => lanes.iter().map(fneg).collect::<Result<_>>().map(Data::Aggregate),
        other => Err(unsupported(format!("fneg on {}", other.describe()))),
    }
}

pub(super) fn icmp(predicate: IntPredicate, lhs: &Data, rhs: &Data) -> Result<Data> {
    match (lhs, rhs) {
        (Data::Int { bits: a, width }, Data::Int { bits: b, .. }) => {
            Ok(Data::bool(arith::int_compare(predicate, *width, *a, *b)))
        }
        (Data::Pointer(a), Data::Pointer(b)) => Ok(Data::bool(arith::int_compare(
            predicate,
            64,
            u128::from(*a),
            u128::from(*b),
        ))),
        (Data::Aggregate(a), Data::Aggregate(b)) => lanewise(a, b, |l, r| icmp(predicate, l, r)),
        _ => Err(unsupported(format!(
            "icmp on {} and {}",
            lhs.describe(),
            rhs.describe()
        ))),
    }
}

pub(super) fn fcmp(predicate: FloatPredicate, lhs: &Data, rhs: &Data) -> Result<Data> {
    match (lhs, rhs) {
        (Data::Aggregate(a), Data::Aggregate(b)) => lanewise(a, b, |l, r| fcmp(predicate, l, r)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Data::bool(arith::float_compare(predicate, a, b))),
            _ => Err(unsupported(format!(
                "fcmp on {} and {}",
                lhs.describe(),
                rhs.describe()
            ))),
        },
    }
}

fn truth(cond: &Data) -> Result<bool> {
    cond.as_bits()
        .map(|bits| bits & 1 == 1)
        .ok_or_else(|| unsupported(format!("condition of type {}", cond.describe())))
}

pub(super) fn select(cond: &Data, then: &Data, otherwise: &Data) -> Result<Data> {
    match (cond, then, otherwise) {
        (Data::Aggregate(mask), Data::Aggregate(a), Data::Aggregate(b)) => {
            if mask.len() != a.len() || a.len() != b.len() {
                return Err(unsupported("select with mismatched lane counts".to_owned()));
            }
            mask.iter()
                .zip(a.iter().zip(b))
                .map(|(m, (x, y))| Ok(if truth(m)? { x.clone() } else { y.clone() }))
                .collect::<Result<_>>()
                .map(Data::Aggregate)
        }
        _ => Ok(if truth(cond)? { then.clone() } else { otherwise.clone() }),
    }
}

/// Evaluate a conversion from `from` to `to`.
pub(super) fn cast(layout: &DataLayout, opcode: Opcode, value: &Data, from: Type<'_>, to: Type<'_>) -> Result<Data> {
    if let Data::Aggregate(lanes) = value {
        if opcode != Opcode::BitCast {
            let (from_lane, to_lane) = (from.element_type()?, to.element_type()?);
            return lanes
                .iter()
                .map(|lane| cast(layout, opcode, lane, from_lane, to_lane))
                .collect::<Result<_>>()
                .map(Data::Aggregate);
        }
    }
    let mismatch = || unsupported(format!("`{opcode}` of {} to `{to}`", value.describe()));
    match opcode {
        Opcode::Trunc | Opcode::ZExt | Opcode::SExt => match *value {
            Data::Int { bits, width } => {
                let to_width = to.int_width()?;
                Ok(Data::int(arith::int_cast(opcode, width, to_width, bits), to_width))
            }
            _ => Err(mismatch()),
        },
        Opcode::FPToUI | Opcode::FPToSI => {
            let v = value.as_f64().ok_or_else(mismatch)?;
            let to_width = to.int_width()?;
            let bits = arith::float_to_int(v, to_width, opcode == Opcode::FPToSI)
                .ok_or(Trap::ConversionOutOfRange)?;
            Ok(Data::int(bits, to_width))
        }
        Opcode::UIToFP | Opcode::SIToFP => match *value {
            Data::Int { bits, width } => {
                make_float(to, arith::int_to_float(bits, width, opcode == Opcode::SIToFP))
            }
            _ => Err(mismatch()),
        },
        Opcode::FPTrunc | Opcode::FPExt => make_float(to, value.as_f64().ok_or_else(mismatch)?),
        Opcode::PtrToInt => {
            let address = value.as_address().ok_or_else(mismatch)?;
            Ok(Data::int(u128::from(address), to.int_width()?))
        }
        Opcode::IntToPtr => match *value {
            Data::Int { bits, .. } => Ok(Data::Pointer(bits as u64)),
            _ => Err(mismatch()),
        },
        Opcode::BitCast => {
            if from == to || (from.is_pointer() && to.is_pointer()) {
                Ok(value.clone())
            } else {
                encode::reinterpret(layout, value, from, to)
            }
        }
        _ => Err(unsupported(format!("`{opcode}` is not a conversion"))),
    }
}

fn lane_index(index: &Data, len: usize) -> Result<usize> {
    let raw = index
        .as_bits()
        .ok_or_else(|| unsupported(format!("lane index of type {}", index.describe())))?;
    usize::try_from(raw)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| {
            Trap::IndexOutOfRange {
                index: raw as u64,
                len: len as u64,
            }
            .into()
        })
}

fn lanes(vector: &Data) -> Result<&[Data]> {
    vector
        .elements()
        .ok_or_else(|| unsupported(format!("vector operation on {}", vector.describe())))
}

pub(super) fn extract_element(vector: &Data, index: &Data) -> Result<Data> {
    let lanes = lanes(vector)?;
    Ok(lanes[lane_index(index, lanes.len())?].clone())
}

pub(super) fn insert_element(vector: &Data, element: &Data, index: &Data) -> Result<Data> {
    let mut lanes = lanes(vector)?.to_vec();
    let i = lane_index(index, lanes.len())?;
    lanes[i] = element.clone();
    Ok(Data::Aggregate(lanes))
}

/// Pick lanes from the concatenation of `lhs` and `rhs`; `None` mask lanes
/// are undefined and take lane 0.
pub(super) fn shuffle(lhs: &Data, rhs: &Data, mask: &[Option<usize>]) -> Result<Data> {
    let pool: Vec<&Data> = lanes(lhs)?.iter().chain(lanes(rhs)?).collect();
    mask.iter()
        .map(|pick| {
            let i = pick.unwrap_or(0);
            pool.get(i).map(|&lane| lane.clone()).ok_or_else(|| {
                Trap::IndexOutOfRange {
                    index: i as u64,
                    len: pool.len() as u64,
                }
                .into()
            })
        })
        .collect::<Result<_>>()
        .map(Data::Aggregate)
}

fn member<'a>(aggregate: &'a Data, index: u32) -> Result<&'a Data> {
    let items = aggregate
        .elements()
        .ok_or_else(|| unsupported(format!("extractvalue on {}", aggregate.describe())))?;
    items.get(index as usize).ok_or_else(|| {
        Trap::IndexOutOfRange {
            index: u64::from(index),
            len: items.len() as u64,
        }
        .into()
    })
}

pub(super) fn extract_value(aggregate: &Data, indices: &[u32]) -> Result<Data> {
    indices
        .iter()
        .try_fold(aggregate, |current, &index| member(current, index))
        .cloned()
}

pub(super) fn insert_value(aggregate: &Data, element: &Data, indices: &[u32]) -> Result<Data> {
    let Some((&first, rest)) = indices.split_first() else {
        return Ok(element.clone());
    };
    let inner = insert_value(member(aggregate, first)?, element, rest)?;
    let mut items = aggregate.elements().map(<[Data]>::to_vec).unwrap_or_default();
    items[first as usize] = inner;
    Ok(Data::Aggregate(items))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
