//! Target data layout: type sizes, alignments and struct field offsets.
//!
//! A layout is parsed from the module's data layout string, a `-`
//! separated list of specifications:
//!
//! | Spec | Meaning |
//! |------|---------|
//! | `e` / `E` | little / big endian |
//! | `p[n]:size:abi[:pref]` | pointer size and alignment in bits |
//! | `i<size>:abi[:pref]` | integer alignment |
//! | `f<size>:abi[:pref]` | floating-point alignment |
//! | `v<size>:abi[:pref]` | vector alignment |
//! | `a[n]:abi[:pref]` | aggregate alignment |
//! | `n…`, `S…` | native widths, stack alignment (accepted, ignored) |
//!
//! The empty string is the default layout: little endian, 64-bit
//! pointers, naturally aligned scalars.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::id::TypeId;
use crate::types::table::{TypeData, TypeTable};
use crate::types::Type;

/// Field placement of a struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructLayout {
    /// Allocation size in bytes, including tail padding.
    pub size: u64,
    pub align: u64,
    /// Byte offset of each field.
    pub offsets: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataLayout {
    big_endian: bool,
    pointer_bits: u32,
    pointer_align: u64,
    aggregate_align: u64,
    /// ABI alignment overrides in bytes, keyed by bit width.
    int_align: FxHashMap<u32, u64>,
    float_align: FxHashMap<u32, u64>,
    vector_align: FxHashMap<u32, u64>,
    source: String,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            big_endian: false,
            pointer_bits: 64,
            pointer_align: 8,
            aggregate_align: 1,
            int_align: FxHashMap::default(),
            float_align: FxHashMap::default(),
            vector_align: FxHashMap::default(),
            source: String::new(),
        }
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_bits(spec: &str, field: &str) -> Result<u32> {
    field
        .parse()
        .map_err(|_| Error::invalid_operand(format!("invalid data layout spec `{spec}`")))
}

/// Alignment in bytes from a bit count; must be a power of two.
fn align_bytes(spec: &str, field: &str) -> Result<u64> {
    let bits = parse_bits(spec, field)?;
    let bytes = u64::from(bits / 8);
    if bits % 8 != 0 || !bytes.is_power_of_two() {
        return Err(Error::invalid_operand(format!(
            "invalid alignment in data layout spec `{spec}`"
        )));
    }
    Ok(bytes)
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align.max(1)) * align.max(1)
}

impl DataLayout {
    /// Parse a data layout string.
    pub fn parse(text: &str) -> Result<Self> {
        let mut layout = DataLayout {
            source: text.to_owned(),
            ..DataLayout::default()
        };
        for spec in text.split('-').filter(|s| !s.is_empty()) {
            let mut fields = spec.split(':');
            let head = fields.next().unwrap_or_default();
            let rest: Vec<&str> = fields.collect();
            let abi = |index: usize| -> Result<u64> {
                rest.get(index)
                    .ok_or_else(|| Error::invalid_operand(format!("incomplete data layout spec `{spec}`")))
                    .and_then(|field| align_bytes(spec, field))
            };
            match head.chars().next() {
                Some('e') if head == "e" => layout.big_endian = false,
                Some('E') if head == "E" => layout.big_endian = true,
                Some('p') => {
                    let size = rest.first().ok_or_else(|| {
                        Error::invalid_operand(format!("incomplete data layout spec `{spec}`"))
                    })?;
                    layout.pointer_bits = parse_bits(spec, size)?;
                    if layout.pointer_bits == 0 || layout.pointer_bits % 8 != 0 {
                        return Err(Error::invalid_operand(format!(
                            "invalid pointer size in `{spec}`"
                        )));
                    }
                    layout.pointer_align = abi(1)?;
                }
                Some('i') => {
                    let width = parse_bits(spec, &head[1..])?;
                    layout.int_align.insert(width, abi(0)?);
                }
                Some('f') => {
                    let width = parse_bits(spec, &head[1..])?;
                    layout.float_align.insert(width, abi(0)?);
                }
                Some('v') => {
                    let width = parse_bits(spec, &head[1..])?;
                    layout.vector_align.insert(width, abi(0)?);
                }
                Some('a') => layout.aggregate_align = abi(0)?,
                Some('n' | 'S' | 's') => {}
                _ => {
                    return Err(Error::invalid_operand(format!(
                        "unknown data layout spec `{spec}`"
                    )))
                }
            }
        }
        tracing::trace!(layout = text, "data layout parsed");
        Ok(layout)
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Pointer size in bytes.
    pub fn pointer_size(&self) -> u64 {
        u64::from(self.pointer_bits / 8)
    }

    // ── Handle-level queries ────────────────────────────────────────

    /// Allocation size of `ty` in bytes (store size rounded up to the
    /// ABI alignment).
    pub fn size_of_type(&self, ty: Type<'_>) -> Result<u64> {
        ty.context().read(|s| self.alloc_size(&s.types, ty.id()))
    }

    /// Bytes written by a store of `ty`.
    pub fn store_size_of_type(&self, ty: Type<'_>) -> Result<u64> {
        ty.context().read(|s| self.store_size(&s.types, ty.id()))
    }

    pub fn abi_alignment_of_type(&self, ty: Type<'_>) -> Result<u64> {
        ty.context().read(|s| self.abi_align(&s.types, ty.id()))
    }

    pub fn struct_layout(&self, ty: Type<'_>) -> Result<StructLayout> {
        ty.context().read(|s| self.layout_struct(&s.types, ty.id()))
    }

    /// Byte offset of field `index` in struct type `ty`.
    pub fn offset_of_element(&self, ty: Type<'_>, index: usize) -> Result<u64> {
        let layout = self.struct_layout(ty)?;
        layout
            .offsets
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: layout.offsets.len(),
            })
    }

    /// Index of the field containing byte `offset` of struct type `ty`.
    pub fn element_at_offset(&self, ty: Type<'_>, offset: u64) -> Result<usize> {
        let layout = self.struct_layout(ty)?;
        Ok(layout
            .offsets
            .iter()
            .rposition(|&start| start <= offset)
            .unwrap_or(0))
    }

    // ── Table-level computation ─────────────────────────────────────

    pub(crate) fn alloc_size(&self, t: &TypeTable, ty: TypeId) -> Result<u64> {
        Ok(round_up(self.store_size(t, ty)?, self.abi_align(t, ty)?))
    }

    pub(crate) fn store_size(&self, t: &TypeTable, ty: TypeId) -> Result<u64> {
        Ok(match t.get(ty) {
            TypeData::Int(width) => u64::from(*width).div_ceil(8),
            TypeData::Half => 2,
            TypeData::Float => 4,
            TypeData::Double | TypeData::X86Mmx => 8,
            TypeData::X86Fp80 => 10,
            TypeData::Fp128 | TypeData::PpcFp128 => 16,
            TypeData::Pointer { .. } => self.pointer_size(),
            TypeData::Array { element, len } => self.alloc_size(t, *element)? * len,
            TypeData::Vector { element, len } => {
                let lane_bits = match t.get(*element) {
                    TypeData::Pointer { .. } => u64::from(self.pointer_bits),
                    _ => self.store_size(t, *element)? * 8,
                };
                (lane_bits * u64::from(*len)).div_ceil(8)
            }
            TypeData::Struct { .. } | TypeData::Named { .. } => self.layout_struct(t, ty)?.size,
            TypeData::Void | TypeData::Label | TypeData::Metadata | TypeData::Function { .. } => {
                return Err(Error::invalid_type(format!(
                    "`{}` has no size",
                    t.display(ty)
                )))
            }
        })
    }

    pub(crate) fn abi_align(&self, t: &TypeTable, ty: TypeId) -> Result<u64> {
        let natural = |bytes: u64, cap: u64| bytes.max(1).next_power_of_two().min(cap);
        Ok(match t.get(ty) {
            TypeData::Int(width) => match self.int_align.get(width) {
                Some(&align) => align,
                None => natural(u64::from(*width).div_ceil(8), 8),
            },
            TypeData::Half | TypeData::Float | TypeData::Double => {
                let bits = match t.get(ty) {
                    TypeData::Half => 16,
                    TypeData::Float => 32,
                    _ => 64,
                };
                match self.float_align.get(&bits) {
                    Some(&align) => align,
                    None => u64::from(bits / 8),
                }
            }
            TypeData::X86Fp80 | TypeData::Fp128 | TypeData::PpcFp128 => 16,
            TypeData::X86Mmx => 8,
            TypeData::Pointer { .. } => self.pointer_align,
            TypeData::Array { element, .. } => self.abi_align(t, *element)?,
            TypeData::Vector { .. } => {
                let bits = (self.store_size(t, ty)? * 8) as u32;
                match self.vector_align.get(&bits) {
                    Some(&align) => align,
                    None => natural(self.store_size(t, ty)?, 16),
                }
            }
            TypeData::Struct { .. } | TypeData::Named { .. } => self.layout_struct(t, ty)?.align,
            TypeData::Void | TypeData::Label | TypeData::Metadata | TypeData::Function { .. } => {
                return Err(Error::invalid_type(format!(
                    "`{}` has no alignment",
                    t.display(ty)
                )))
            }
        })
    }

    pub(crate) fn layout_struct(&self, t: &TypeTable, ty: TypeId) -> Result<StructLayout> {
        let (elements, packed) = t.struct_body(ty)?;
        let mut offset = 0u64;
        let mut align = if packed { 1 } else { self.aggregate_align };
        let mut offsets = Vec::with_capacity(elements.len());
        for &element in elements {
            let field_align = if packed { 1 } else { self.abi_align(t, element)? };
            offset = round_up(offset, field_align);
            offsets.push(offset);
            offset += self.alloc_size(t, element)?;
            align = align.max(field_align);
        }
        Ok(StructLayout {
            size: round_up(offset, align),
            align,
            offsets,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
