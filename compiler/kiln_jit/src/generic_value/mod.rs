//! Values crossing the host/engine boundary.
//!
//! [`Data`] is the engine's runtime representation of one IR value.
//! [`GenericValue`] wraps it for callers: arguments are created from an IR
//! type plus a host scalar, results are read back the same way.

use kiln_ir::{arith, Type, TypeKind};

use crate::error::{Error, Result};

/// Runtime value of a first-class IR type.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Data {
    Void,
    /// Zero-extended bit pattern of an `i{width}`.
    Int { bits: u128, width: u32 },
    Float(f32),
    Double(f64),
    Pointer(u64),
    /// Struct fields, array elements or vector lanes.
    Aggregate(Vec<Data>),
}

impl Data {
    pub(crate) fn int(bits: u128, width: u32) -> Self {
        Data::Int {
            bits: arith::truncate(bits, width),
            width,
        }
    }

    pub(crate) fn bool(value: bool) -> Self {
        Data::int(u128::from(value), 1)
    }

    /// Integer bits, or the address of a pointer.
    pub(crate) fn as_bits(&self) -> Option<u128> {
        match *self {
            Data::Int { bits, .. } => Some(bits),
            Data::Pointer(address) => Some(u128::from(address)),
            _ => None,
        }
    }

    pub(crate) fn as_address(&self) -> Option<u64> {
        match *self {
            Data::Pointer(address) => Some(address),
            Data::Int { bits, .. } => Some(bits as u64),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match *self {
            Data::Float(value) => Some(f64::from(value)),
            Data::Double(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn elements(&self) -> Option<&[Data]> {
        match self {
            Data::Aggregate(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this value can inhabit `ty`.
    pub(crate) fn fits(&self, ty: Type<'_>) -> bool {
        match (self, ty.kind()) {
            (Data::Void, TypeKind::Void) => true,
            (Data::Int { width, .. }, TypeKind::Integer) => ty.int_width().ok() == Some(*width),
            (Data::Float(_), TypeKind::Float) | (Data::Double(_), TypeKind::Double) => true,
            (Data::Pointer(_), TypeKind::Pointer) => true,
            (Data::Aggregate(items), TypeKind::Struct) => ty
                .struct_element_types()
                .is_ok_and(|fields| {
                    fields.len() == items.len()
                        && items.iter().zip(fields).all(|(item, field)| item.fits(field))
                }),
            (Data::Aggregate(items), TypeKind::Array | TypeKind::Vector) => {
                let len = match ty.kind() {
                    TypeKind::Array => ty.array_len().ok(),
                    _ => ty.vector_len().ok().map(u64::from),
                };
                let Ok(element) = ty.element_type() else {
                    return false;
                };
                len == Some(items.len() as u64) && items.iter().all(|item| item.fits(element))
            }
            _ => false,
        }
    }

    /// Short description for argument mismatch diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            Data::Void => "void".to_owned(),
            Data::Int { width, .. } => format!("i{width}"),
            Data::Float(_) => "float".to_owned(),
            Data::Double(_) => "double".to_owned(),
            Data::Pointer(_) => "pointer".to_owned(),
            Data::Aggregate(items) => format!("aggregate of {}", items.len()),
        }
    }
}

fn kind_mismatch(expected: &'static str, ty: Type<'_>) -> Error {
    Error::Ir(kiln_ir::Error::KindMismatch {
        expected,
        found: ty.print_to_string(),
    })
}

fn int_width_of(ty: Type<'_>) -> Result<u32> {
    if !ty.is_integer() {
        return Err(kind_mismatch("integer type", ty));
    }
    Ok(ty.int_width()?)
}

fn out_of_range(value: String, width: u32) -> Error {
    Error::Ir(kiln_ir::Error::ConstantOutOfRange { value, width })
}

/// A value passed to or returned from executed code.
///
/// Released on drop or through [`dispose`](Self::dispose).
#[derive(Clone, Debug, PartialEq)]
pub struct GenericValue {
    data: Data,
}

impl GenericValue {
    pub(crate) fn from_data(data: Data) -> Self {
        Self { data }
    }

    pub(crate) fn data(&self) -> &Data {
        &self.data
    }

    pub(crate) fn into_data(self) -> Data {
        self.data
    }

    /// An integer of type `ty`. With `signed`, `value` is read as an `i64`.
    /// The value must fit the width of `ty` as an unsigned number or, with
    /// `signed`, as a signed one.
    pub fn of_int(ty: Type<'_>, value: u64, signed: bool) -> Result<Self> {
        let wide = if signed {
            i128::from(value as i64)
        } else {
            i128::from(value)
        };
        let width = int_width_of(ty)?;
        if !arith::fits(wide, width, signed) {
            return Err(out_of_range(wide.to_string(), width));
        }
        Ok(Self::from_data(Data::int(arith::from_signed(wide, width), width)))
    }

    /// An integer of type `ty` from a 128-bit pattern. Bits above the width
    /// must be all zeros or a sign extension of the top bit.
    pub fn of_int_bits(ty: Type<'_>, bits: u128) -> Result<Self> {
        let width = int_width_of(ty)?;
        let zero_extended = width >= 128 || bits <= arith::mask(width);
        if !zero_extended && !arith::fits(bits as i128, width, true) {
            return Err(out_of_range(format!("{bits:#x}"), width));
        }
        Ok(Self::from_data(Data::int(bits, width)))
    }

    /// A `float` or `double` of type `ty`. `float`s are rounded to single
    /// precision.
    pub fn of_float(ty: Type<'_>, value: f64) -> Result<Self> {
        let data = match ty.kind() {
            TypeKind::Float => Data::Float(value as f32),
            TypeKind::Double => Data::Double(value),
            _ => return Err(kind_mismatch("float or double type", ty)),
        };
        Ok(Self::from_data(data))
    }

    /// A pointer holding an engine memory address.
    pub fn of_pointer(address: u64) -> Self {
        Self::from_data(Data::Pointer(address))
    }

    /// A struct, array or vector value.
    pub fn of_aggregate(elements: Vec<GenericValue>) -> Self {
        Self::from_data(Data::Aggregate(
            elements.into_iter().map(GenericValue::into_data).collect(),
        ))
    }

    /// The result of a `void` function.
    pub fn void() -> Self {
        Self::from_data(Data::Void)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.data, Data::Void)
    }

    /// Bit width of an integer value, 0 for anything else.
    pub fn int_width(&self) -> u32 {
        match self.data {
            Data::Int { width, .. } => width,
            _ => 0,
        }
    }

    /// The low 64 bits of an integer, zero- or sign-extended from its width.
    /// Pointers yield their address; anything else is a type mismatch.
    pub fn to_int(&self, signed: bool) -> Result<u64> {
        match self.data {
            Data::Int { bits, width } if signed => Ok(arith::sign_extend(bits, width) as u64),
            Data::Int { bits, .. } => Ok(bits as u64),
            Data::Pointer(address) => Ok(address),
            ref other => Err(self.mismatch("integer", other)),
        }
    }

    /// Full-width signed view of an integer.
    pub fn to_i128(&self) -> Result<i128> {
        match self.data {
            Data::Int { bits, width } => Ok(arith::sign_extend(bits, width)),
            Data::Pointer(address) => Ok(i128::from(address)),
            ref other => Err(self.mismatch("integer", other)),
        }
    }

    /// Read a floating-point value as `ty`, which must be `float` or
    /// `double` and match the value.
    pub fn to_float(&self, ty: Type<'_>) -> Result<f64> {
        match (ty.kind(), &self.data) {
            (TypeKind::Float, Data::Float(value)) => Ok(f64::from(*value)),
            (TypeKind::Double, Data::Double(value)) => Ok(*value),
            (TypeKind::Float | TypeKind::Double, other) => Err(Error::Ir(kiln_ir::Error::TypeMismatch {
                expected: ty.print_to_string(),
                found: other.describe(),
            })),
            _ => Err(kind_mismatch("float or double type", ty)),
        }
    }

    /// Address held by a pointer.
    pub fn to_pointer(&self) -> Result<u64> {
        match self.data {
            Data::Pointer(address) => Ok(address),
            ref other => Err(self.mismatch("pointer", other)),
        }
    }

    fn mismatch(&self, expected: &str, found: &Data) -> Error {
        Error::Ir(kiln_ir::Error::TypeMismatch {
            expected: expected.to_owned(),
            found: found.describe(),
        })
    }

    /// Elements of an aggregate, empty for scalars.
    pub fn elements(&self) -> Vec<GenericValue> {
        self.data
            .elements()
            .map(|items| items.iter().cloned().map(Self::from_data).collect())
            .unwrap_or_default()
    }

    /// Release the value.
    pub fn dispose(self) {}
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
