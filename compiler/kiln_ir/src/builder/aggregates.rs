//! Vector lanes and aggregate fields.

use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::store::Extra;
use crate::value::Value;

use super::{Builder, Inst};

impl<'ctx> Builder<'ctx> {
    pub fn build_extract_element(&self, vector: Value<'ctx>, index: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let [vector, index] = self.ids([vector, index])?;
        self.emit(name, |s| {
            let (lane, _) = s
                .types
                .vector_info(s.ty(vector)?)
                .ok_or_else(|| Error::invalid_operand("extractelement requires a vector"))?;
            if !s.types.is_int(s.ty(index)?) {
                return Err(Error::invalid_operand("lane index must be an integer"));
            }
            Ok(Inst::new(lane, Opcode::ExtractElement, &[vector, index]))
        })
    }

    pub fn build_insert_element(
        &self,
        vector: Value<'ctx>,
        element: Value<'ctx>,
        index: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [vector, element, index] = self.ids([vector, element, index])?;
        self.emit(name, |s| {
            let ty = s.ty(vector)?;
            let (lane, _) = s
                .types
                .vector_info(ty)
                .ok_or_else(|| Error::invalid_operand("insertelement requires a vector"))?;
            s.expect_type(lane, s.ty(element)?)?;
            if !s.types.is_int(s.ty(index)?) {
                return Err(Error::invalid_operand("lane index must be an integer"));
            }
            Ok(Inst::new(ty, Opcode::InsertElement, &[vector, element, index]))
        })
    }

    /// Lanes of `a` and `b` picked by the constant `i32` vector `mask`.
    pub fn build_shuffle_vector(
        &self,
        a: Value<'ctx>,
        b: Value<'ctx>,
        mask: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [a, b, mask] = self.ids([a, b, mask])?;
        self.emit(name, |s| {
            let ty = s.shuffle_type(a, b, mask)?;
            Ok(Inst::new(ty, Opcode::ShuffleVector, &[a, b, mask]))
        })
    }

    /// Field `index` of a struct or array value.
    pub fn build_extract_value(&self, aggregate: Value<'ctx>, index: u32, name: &str) -> Result<Value<'ctx>> {
        let [aggregate] = self.ids([aggregate])?;
        self.emit(name, |s| {
            let ty = s.types.indexed_type(s.ty(aggregate)?, &[index])?;
            Ok(Inst::new(ty, Opcode::ExtractValue, &[aggregate]).extra(Extra::Indices(vec![index])))
        })
    }

    /// Copy of `aggregate` with field `index` replaced by `element`.
    pub fn build_insert_value(
        &self,
        aggregate: Value<'ctx>,
        element: Value<'ctx>,
        index: u32,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [aggregate, element] = self.ids([aggregate, element])?;
        self.emit(name, |s| {
            let ty = s.ty(aggregate)?;
            let field = s.types.indexed_type(ty, &[index])?;
            s.expect_type(field, s.ty(element)?)?;
            Ok(Inst::new(ty, Opcode::InsertValue, &[aggregate, element]).extra(Extra::Indices(vec![index])))
        })
    }
}
