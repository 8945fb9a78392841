//! Structural interning of constants.
//!
//! Every constant kind is uniqued per context: requesting the same
//! constant twice returns the same [`ValueId`].

use smallvec::SmallVec;

use super::{Extra, InlineAsmData, Payload, Store};
use crate::attributes::ArithFlags;
use crate::id::{TypeId, ValueId};
use crate::opcode::Opcode;
use crate::types::table::TypeData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AggregateKind {
    Array,
    Struct,
    Vector,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum ConstKey {
    Int(TypeId, u128),
    /// Stored as raw bits so NaN payloads and signed zeros stay distinct.
    Fp(TypeId, u64),
    Aggregate(TypeId, AggregateKind, SmallVec<[ValueId; 4]>),
    Zero(TypeId),
    Null(TypeId),
    Undef(TypeId),
    Expr(TypeId, Opcode, ArithFlags, Extra, SmallVec<[ValueId; 3]>),
    InlineAsm(TypeId, InlineAsmData),
}

/// All-ones mask for an integer of `width` bits.
pub(crate) fn width_mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Store {
    fn intern(&mut self, key: ConstKey, ty: TypeId, payload: Payload, operands: &[ValueId]) -> ValueId {
        if let Some(&id) = self.constants.get(&key) {
            if self.values.contains(id) {
                return id;
            }
        }
        let id = self.alloc_value(ty, String::new(), payload, operands);
        self.constants.insert(key, id);
        id
    }

    /// Integer constant; `bits` is truncated to the type's width.
    pub(crate) fn const_int(&mut self, ty: TypeId, bits: u128) -> ValueId {
        let width = self.types.int_width(ty).unwrap_or(128);
        let bits = bits & width_mask(width);
        self.intern(ConstKey::Int(ty, bits), ty, Payload::ConstInt(bits), &[])
    }

    /// Floating-point constant, rounded to `float` precision when `ty` is
    /// `float`.
    pub(crate) fn const_fp(&mut self, ty: TypeId, value: f64) -> ValueId {
        let value = self.round_fp(ty, value);
        self.intern(
            ConstKey::Fp(ty, value.to_bits()),
            ty,
            Payload::ConstFp(value),
            &[],
        )
    }

    pub(crate) fn round_fp(&self, ty: TypeId, value: f64) -> f64 {
        if matches!(self.types.get(ty), TypeData::Float) {
            f64::from(value as f32)
        } else {
            value
        }
    }

    pub(crate) fn undef(&mut self, ty: TypeId) -> ValueId {
        self.intern(ConstKey::Undef(ty), ty, Payload::Undef, &[])
    }

    pub(crate) fn pointer_null(&mut self, ty: TypeId) -> ValueId {
        self.intern(ConstKey::Null(ty), ty, Payload::PointerNull, &[])
    }

    /// The zero value of any first-class type.
    pub(crate) fn null_value(&mut self, ty: TypeId) -> ValueId {
        if self.types.is_int(ty) {
            self.const_int(ty, 0)
        } else if self.types.is_pointer(ty) {
            self.pointer_null(ty)
        } else if self.types.is_float(ty) {
            self.const_fp(ty, 0.0)
        } else {
            self.intern(ConstKey::Zero(ty), ty, Payload::AggregateZero, &[])
        }
    }

    /// Aggregate constant. Callers have already checked element types.
    pub(crate) fn const_aggregate(&mut self, ty: TypeId, kind: AggregateKind, elements: &[ValueId]) -> ValueId {
        let payload = match kind {
            AggregateKind::Array => Payload::ConstArray,
            AggregateKind::Struct => Payload::ConstStruct,
            AggregateKind::Vector => Payload::ConstVector,
        };
        self.intern(
            ConstKey::Aggregate(ty, kind, elements.iter().copied().collect()),
            ty,
            payload,
            elements,
        )
    }

    /// Unfolded constant expression node.
    pub(crate) fn const_expr(
        &mut self,
        ty: TypeId,
        opcode: Opcode,
        flags: ArithFlags,
        extra: Extra,
        operands: &[ValueId],
    ) -> ValueId {
        let key = ConstKey::Expr(
            ty,
            opcode,
            flags,
            extra.clone(),
            operands.iter().copied().collect(),
        );
        self.intern(
            key,
            ty,
            Payload::ConstExpr(super::ExprData {
                opcode,
                flags,
                extra,
            }),
            operands,
        )
    }

    pub(crate) fn inline_asm(&mut self, ty: TypeId, data: InlineAsmData) -> ValueId {
        self.intern(
            ConstKey::InlineAsm(ty, data.clone()),
            ty,
            Payload::InlineAsm(data),
            &[],
        )
    }

    /// Integer payload of a `ConstInt`.
    pub(crate) fn int_value(&self, id: ValueId) -> Option<u128> {
        match self.value(id).ok()?.payload {
            Payload::ConstInt(bits) => Some(bits),
            _ => None,
        }
    }

    pub(crate) fn fp_value(&self, id: ValueId) -> Option<f64> {
        match self.value(id).ok()?.payload {
            Payload::ConstFp(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn is_undef(&self, id: ValueId) -> bool {
        self.value(id)
            .is_ok_and(|data| matches!(data.payload, Payload::Undef))
    }

    /// Zero integer, zero float, null pointer or zero aggregate.
    pub(crate) fn is_null(&self, id: ValueId) -> bool {
        self.value(id).is_ok_and(|data| match data.payload {
            Payload::ConstInt(bits) => bits == 0,
            Payload::ConstFp(value) => value.to_bits() == 0,
            Payload::PointerNull | Payload::AggregateZero => true,
            _ => false,
        })
    }
}
