//! In-memory representation of typed values.
//!
//! Layout and byte order come from the engine's [`DataLayout`]; a value of
//! type `T` occupies `store_size_of_type(T)` bytes.

use kiln_ir::{DataLayout, Type, TypeKind};

use crate::error::{Result, Trap};
use crate::generic_value::Data;
use crate::memory::Memory;

fn unsupported(ty: Type<'_>) -> crate::Error {
    Trap::Unsupported(format!("values of type `{ty}`")).into()
}

fn put(big_endian: bool, buf: &mut [u8], value: u128) {
    let n = buf.len().min(16);
    if big_endian {
        buf[..n].copy_from_slice(&value.to_be_bytes()[16 - n..]);
    } else {
        buf[..n].copy_from_slice(&value.to_le_bytes()[..n]);
    }
}

fn get(big_endian: bool, buf: &[u8]) -> u128 {
    let n = buf.len().min(16);
    let mut wide = [0u8; 16];
    if big_endian {
        wide[16 - n..].copy_from_slice(&buf[..n]);
        u128::from_be_bytes(wide)
    } else {
        wide[..n].copy_from_slice(&buf[..n]);
        u128::from_le_bytes(wide)
    }
}

/// Offsets and types of the elements of an aggregate type.
fn members<'ctx>(layout: &DataLayout, ty: Type<'ctx>) -> Result<Vec<(u64, Type<'ctx>)>> {
    match ty.kind() {
        TypeKind::Struct => {
            let offsets = layout.struct_layout(ty)?.offsets;
            Ok(offsets.into_iter().zip(ty.struct_element_types()?).collect())
        }
        TypeKind::Array | TypeKind::Vector => {
            let element = ty.element_type()?;
            let (stride, len) = if ty.is_array() {
                (layout.size_of_type(element)?, ty.array_len()?)
            } else {
                (layout.store_size_of_type(element)?, u64::from(ty.vector_len()?))
            };
            Ok((0..len).map(|i| (i * stride, element)).collect())
        }
        _ => Err(unsupported(ty)),
    }
}

/// The all-zero value of `ty`. Also the runtime value of `undef`.
pub(super) fn zero(layout: &DataLayout, ty: Type<'_>) -> Result<Data> {
    Ok(match ty.kind() {
        TypeKind::Void => Data::Void,
        TypeKind::Integer => Data::int(0, ty.int_width()?),
        TypeKind::Float => Data::Float(0.0),
        TypeKind::Double => Data::Double(0.0),
        TypeKind::Pointer => Data::Pointer(0),
        TypeKind::Struct | TypeKind::Array | TypeKind::Vector => Data::Aggregate(
            members(layout, ty)?
                .into_iter()
                .map(|(_, member)| zero(layout, member))
                .collect::<Result<_>>()?,
        ),
        _ => return Err(unsupported(ty)),
    })
}

/// Write `value` into `buf`, which holds at least the store size of `ty`.
pub(super) fn encode(layout: &DataLayout, ty: Type<'_>, value: &Data, buf: &mut [u8]) -> Result<()> {
    let big = layout.is_big_endian();
    let size = layout.store_size_of_type(ty)? as usize;
    let fault = || -> crate::Error {
        Trap::Unsupported(format!("storing {} as `{ty}`", value.describe())).into()
    };
    let dest = buf.get_mut(..size).ok_or_else(fault)?;
    match (ty.kind(), value) {
        (TypeKind::Integer, Data::Int { bits, .. }) => put(big, dest, *bits),
        (TypeKind::Pointer | TypeKind::Integer, Data::Pointer(address)) => {
            put(big, dest, u128::from(*address));
        }
        (TypeKind::Pointer, Data::Int { bits, .. }) => put(big, dest, *bits),
        (TypeKind::Float, Data::Float(v)) => put(big, dest, u128::from(v.to_bits())),
        (TypeKind::Double, Data::Double(v)) => put(big, dest, u128::from(v.to_bits())),
        (TypeKind::Struct | TypeKind::Array | TypeKind::Vector, Data::Aggregate(items)) => {
            let members = members(layout, ty)?;
            if members.len() != items.len() {
                return Err(fault());
            }
            for ((offset, member), item) in members.into_iter().zip(items) {
                let rest = dest.get_mut(offset as usize..).ok_or_else(fault)?;
                encode(layout, member, item, rest)?;
            }
        }
        _ => return Err(fault()),
    }
    Ok(())
}

/// Read a value of type `ty` from the front of `buf`.
pub(super) fn decode(layout: &DataLayout, ty: Type<'_>, buf: &[u8]) -> Result<Data> {
    let big = layout.is_big_endian();
    let size = layout.store_size_of_type(ty)? as usize;
    let src = buf
        .get(..size)
        .ok_or_else(|| -> crate::Error { Trap::Unsupported(format!("short read of `{ty}`")).into() })?;
    Ok(match ty.kind() {
        TypeKind::Integer => Data::int(get(big, src), ty.int_width()?),
        TypeKind::Pointer => Data::Pointer(get(big, src) as u64),
        TypeKind::Float => Data::Float(f32::from_bits(get(big, src) as u32)),
        TypeKind::Double => Data::Double(f64::from_bits(get(big, src) as u64)),
        TypeKind::Struct | TypeKind::Array | TypeKind::Vector => Data::Aggregate(
            members(layout, ty)?
                .into_iter()
                .map(|(offset, member)| {
                    let rest = src.get(offset as usize..).unwrap_or_default();
                    decode(layout, member, rest)
                })
                .collect::<Result<_>>()?,
        ),
        _ => return Err(unsupported(ty)),
    })
}

pub(super) fn load(memory: &Memory, layout: &DataLayout, ty: Type<'_>, address: u64) -> Result<Data> {
    let size = layout.store_size_of_type(ty)?;
    let bytes = memory.read(address, size)?;
    decode(layout, ty, bytes)
}

pub(super) fn store(
    memory: &mut Memory,
    layout: &DataLayout,
    ty: Type<'_>,
    address: u64,
    value: &Data,
) -> Result<()> {
    let size = layout.store_size_of_type(ty)?;
    // Padding keeps whatever the destination held.
    let mut buf = memory.read(address, size)?.to_vec();
    encode(layout, ty, value, &mut buf)?;
    memory.write(address, &buf)
}

/// Reinterpret the bits of `value` from `from` as `to`.
pub(super) fn reinterpret(layout: &DataLayout, value: &Data, from: Type<'_>, to: Type<'_>) -> Result<Data> {
    let size = layout.store_size_of_type(from)?;
    if size != layout.store_size_of_type(to)? {
        return Err(Trap::Unsupported(format!("bitcast from `{from}` to `{to}`")).into());
    }
    let mut buf = vec![0u8; size as usize];
    encode(layout, from, value, &mut buf)?;
    decode(layout, to, &buf)
}
