//! Integer, float and pointer comparisons.

use crate::error::{Error, Result};
use crate::opcode::{FloatPredicate, IntPredicate, Opcode};
use crate::store::Extra;
use crate::value::Value;

use super::{Builder, Inst};

impl<'ctx> Builder<'ctx> {
    /// Integer or pointer comparison producing `i1` (or a vector of `i1`).
    pub fn build_icmp(
        &self,
        predicate: IntPredicate,
        lhs: Value<'ctx>,
        rhs: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [lhs, rhs] = self.ids([lhs, rhs])?;
        self.emit(name, |s| {
            let ty = s.compare_type(lhs, rhs, false)?;
            Ok(Inst::new(ty, Opcode::ICmp, &[lhs, rhs]).extra(Extra::ICmp(predicate)))
        })
    }

    pub fn build_fcmp(
        &self,
        predicate: FloatPredicate,
        lhs: Value<'ctx>,
        rhs: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [lhs, rhs] = self.ids([lhs, rhs])?;
        self.emit(name, |s| {
            let ty = s.compare_type(lhs, rhs, true)?;
            Ok(Inst::new(ty, Opcode::FCmp, &[lhs, rhs]).extra(Extra::FCmp(predicate)))
        })
    }

    /// `icmp eq value, null`.
    pub fn build_is_null(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let null = value.type_of()?.const_null()?;
        self.build_icmp(IntPredicate::Eq, value, null, name)
    }

    /// `icmp ne value, null`.
    pub fn build_is_not_null(&self, value: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let null = value.type_of()?.const_null()?;
        self.build_icmp(IntPredicate::Ne, value, null, name)
    }

    /// Distance between two pointers of the same type, in elements, as an
    /// `i64`.
    pub fn build_ptr_diff(&self, lhs: Value<'ctx>, rhs: Value<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let ptr_ty = lhs.type_of()?;
        if ptr_ty != rhs.type_of()? || !ptr_ty.is_pointer() {
            return Err(Error::invalid_operand("ptr_diff requires two pointers of the same type"));
        }
        let i64_ty = self.ctx.i64_type();
        let l = self.build_ptr_to_int(lhs, i64_ty, "")?;
        let r = self.build_ptr_to_int(rhs, i64_ty, "")?;
        let bytes = self.build_sub(l, r, "")?;
        let size = ptr_ty.element_type()?.size_of()?;
        self.build_exact_sdiv(bytes, size, name)
    }
}
