//! Calls and variadic argument access.

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::opcode::Opcode;
use crate::store::Extra;
use crate::types::Type;
use crate::value::{value_ids, Value};

use super::{Builder, Inst};

impl<'ctx> Builder<'ctx> {
    /// Call `callee`, a function or any pointer to a function type. The
    /// arguments must match the parameter types; var-arg callees accept
    /// extra trailing arguments. Calls inherit the callee's calling
    /// convention when it is a function.
    pub fn build_call(&self, callee: Value<'ctx>, args: &[Value<'ctx>], name: &str) -> Result<Value<'ctx>> {
        let [callee] = self.ids([callee])?;
        let args = value_ids(self.ctx, args)?;
        self.emit(name, |s| {
            let ret = s.check_call_args(callee, &args)?;
            let call_conv = s.function(callee).map(|f| f.call_conv).unwrap_or_default();
            let mut operands = args.clone();
            operands.push(callee);
            Ok(Inst::new(ret, Opcode::Call, &operands).extra(Extra::Call {
                call_conv,
                tail: false,
                attrs: Attributes::empty(),
            }))
        })
    }

    /// Read the next variadic argument of type `ty` from `list`.
    pub fn build_va_arg(&self, list: Value<'ctx>, ty: Type<'ctx>, name: &str) -> Result<Value<'ctx>> {
        let [list] = self.ids([list])?;
        self.ctx.ensure_same(ty.context())?;
        self.emit(name, |s| {
            if !s.types.is_pointer(s.ty(list)?) {
                return Err(Error::invalid_operand("va_arg list must be a pointer"));
            }
            if !s.types.is_first_class(ty.id()) {
                return Err(Error::invalid_type(format!(
                    "va_arg of type `{}`",
                    s.type_name(ty.id())
                )));
            }
            Ok(Inst::new(ty.id(), Opcode::VAArg, &[list]))
        })
    }
}
