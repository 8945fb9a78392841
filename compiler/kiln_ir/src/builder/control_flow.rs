//! Terminators, phi and select.

use crate::attributes::Attributes;
use crate::block::BasicBlock;
use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::store::Extra;
use crate::types::table::TypeTable;
use crate::types::Type;
use crate::value::{value_ids, Value};

use super::{Builder, Inst};

impl<'ctx> Builder<'ctx> {
    /// `ret void`.
    pub fn build_ret_void(&self) -> Result<Value<'ctx>> {
        self.emit("", |s| {
            if let Some(ret) = self.current_return_type(s)? {
                s.expect_type(ret, TypeTable::VOID)?;
            }
            Ok(Inst::new(TypeTable::VOID, Opcode::Ret, &[]))
        })
    }

    /// `ret value`. The value must have the function's return type.
    pub fn build_ret(&self, value: Value<'ctx>) -> Result<Value<'ctx>> {
        let [value] = self.ids([value])?;
        self.emit("", |s| {
            if let Some(ret) = self.current_return_type(s)? {
                s.expect_type(ret, s.ty(value)?)?;
            }
            Ok(Inst::new(TypeTable::VOID, Opcode::Ret, &[value]))
        })
    }

    /// Return several values packed into the function's struct return
    /// type, built as an `insertvalue` chain followed by `ret`.
    pub fn build_aggregate_ret(&self, values: &[Value<'ctx>]) -> Result<Value<'ctx>> {
        let ret_ty = self
            .ctx
            .read(|s| self.current_return_type(s))?
            .ok_or_else(|| Error::invalid_operand("aggregate return outside a function"))?;
        let mut aggregate = Type::new(self.ctx, ret_ty).undef()?;
        for (index, &value) in values.iter().enumerate() {
            aggregate = self.build_insert_value(aggregate, value, index as u32, "")?;
        }
        self.build_ret(aggregate)
    }

    /// Unconditional branch.
    pub fn build_br(&self, dest: BasicBlock<'ctx>) -> Result<Value<'ctx>> {
        self.emit("", |s| {
            let dest = self.label(s, dest)?;
            Ok(Inst::new(TypeTable::VOID, Opcode::Br, &[dest]))
        })
    }

    /// Conditional branch on an `i1`.
    pub fn build_cond_br(
        &self,
        cond: Value<'ctx>,
        then: BasicBlock<'ctx>,
        otherwise: BasicBlock<'ctx>,
    ) -> Result<Value<'ctx>> {
        let [cond] = self.ids([cond])?;
        self.emit("", |s| {
            s.expect_type(TypeTable::I1, s.ty(cond)?)?;
            let then = self.label(s, then)?;
            let otherwise = self.label(s, otherwise)?;
            Ok(Inst::new(TypeTable::VOID, Opcode::Br, &[cond, then, otherwise]))
        })
    }

    /// `switch` with only a default destination; add cases with
    /// [`Value::add_case`].
    pub fn build_switch(&self, cond: Value<'ctx>, default: BasicBlock<'ctx>) -> Result<Value<'ctx>> {
        let [cond] = self.ids([cond])?;
        self.emit("", |s| {
            if !s.types.is_int(s.ty(cond)?) {
                return Err(Error::invalid_operand("switch condition must be an integer"));
            }
            let default = self.label(s, default)?;
            Ok(Inst::new(TypeTable::VOID, Opcode::Switch, &[cond, default]))
        })
    }

    /// Call that continues at `then` on normal return and at `catch` on
    /// unwind.
    pub fn build_invoke(
        &self,
        callee: Value<'ctx>,
        args: &[Value<'ctx>],
        then: BasicBlock<'ctx>,
        catch: BasicBlock<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [callee] = self.ids([callee])?;
        let args = value_ids(self.ctx, args)?;
        self.emit(name, |s| {
            let ret = s.check_call_args(callee, &args)?;
            let call_conv = s.function(callee).map(|f| f.call_conv).unwrap_or_default();
            let mut operands = args.clone();
            operands.push(self.label(s, then)?);
            operands.push(self.label(s, catch)?);
            operands.push(callee);
            Ok(Inst::new(ret, Opcode::Invoke, &operands).extra(Extra::Call {
                call_conv,
                tail: false,
                attrs: Attributes::empty(),
            }))
        })
    }

    pub fn build_unreachable(&self) -> Result<Value<'ctx>> {
        self.emit("", |_| Ok(Inst::new(TypeTable::VOID, Opcode::Unreachable, &[])))
    }

    /// Empty phi of type `ty`; add edges with [`Value::add_incoming`].
    pub fn build_phi(&self, ty: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        self.ctx.ensure_same(ty.context())?;
        self.emit(name, |s| {
            if !s.types.is_first_class(ty.id()) || ty.id() == TypeTable::LABEL {
                return Err(Error::invalid_type(format!(
                    "phi of type `{}`",
                    s.type_name(ty.id())
                )));
            }
            Ok(Inst::new(ty.id(), Opcode::Phi, &[]).extra(Extra::Phi { blocks: Vec::new() }))
        })
    }

    /// `select cond, then, otherwise`. A vector condition selects lanewise.
    pub fn build_select(
        &self,
        cond: Value<'ctx>,
        then: Value<'ctx>,
        otherwise: Value<'ctx>,
        name: &str,
    ) -> Result<Value<'ctx>> {
        let [cond, then, otherwise] = self.ids([cond, then, otherwise])?;
        self.emit(name, |s| {
            let ty = s.ty(then)?;
            s.expect_type(ty, s.ty(otherwise)?)?;
            let cond_ty = s.ty(cond)?;
            let ok = match s.types.vector_info(cond_ty) {
                Some((lane, len)) => {
                    lane == TypeTable::I1 && s.types.vector_info(ty).is_some_and(|(_, n)| n == len)
                }
                None => cond_ty == TypeTable::I1,
            };
            if !ok {
                return Err(Error::invalid_operand(format!(
                    "select condition of type `{}` does not match `{}`",
                    s.type_name(cond_ty),
                    s.type_name(ty)
                )));
            }
            Ok(Inst::new(ty, Opcode::Select, &[cond, then, otherwise]))
        })
    }
}
