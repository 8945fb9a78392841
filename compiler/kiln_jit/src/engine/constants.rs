//! Evaluation of IR constants to runtime values.

use kiln_ir::{ConstantKind, Opcode, Value, ValueKind};

use super::{encode, lower, ops, ExecutionEngine};
use crate::error::{Result, Trap};
use crate::generic_value::Data;

impl<'ctx> ExecutionEngine<'ctx> {
    /// Runtime value of a constant. Globals evaluate to their address,
    /// `undef` to zero.
    pub(super) fn constant(&mut self, value: Value<'ctx>) -> Result<Data> {
        let ty = value.type_of()?;
        match value.kind()? {
            ValueKind::Undef | ValueKind::Constant(ConstantKind::AggregateZero) => encode::zero(&self.layout, ty),
            ValueKind::Constant(ConstantKind::Int) => Ok(Data::int(value.const_int_zext_value()?, ty.int_width()?)),
            ValueKind::Constant(ConstantKind::Fp) => ops::make_float(ty, value.const_real_value()?),
            ValueKind::Constant(ConstantKind::PointerNull) => Ok(Data::Pointer(0)),
            ValueKind::Constant(ConstantKind::Array | ConstantKind::Struct | ConstantKind::Vector) => value
                .const_elements()?
                .into_iter()
                .map(|element| self.constant(element))
                .collect::<Result<_>>()
                .map(Data::Aggregate),
            ValueKind::Constant(ConstantKind::Expr(opcode)) => self.constant_expr(value, opcode),
            ValueKind::Global(_) => Ok(Data::Pointer(self.global_address(value)?)),
            other => Err(Trap::Unsupported(format!("{other:?} as a constant")).into()),
        }
    }

    fn constant_expr(&mut self, expr: Value<'ctx>, opcode: Opcode) -> Result<Data> {
        let operands = expr.operands()?;
        let args = operands
            .iter()
            .map(|&operand| self.constant(operand))
            .collect::<Result<Vec<_>>>()?;
        match (opcode, args.as_slice()) {
            (op, [lhs, rhs]) if op.is_binary() => ops::binary(op, lhs, rhs),
            (Opcode::FNeg, [value]) => ops::fneg(value),
            (Opcode::ICmp, [lhs, rhs]) => ops::icmp(expr.icmp_predicate()?, lhs, rhs),
            (Opcode::FCmp, [lhs, rhs]) => ops::fcmp(expr.fcmp_predicate()?, lhs, rhs),
            (Opcode::Select, [cond, then, otherwise]) => ops::select(cond, then, otherwise),
            (op, [value]) if op.is_cast() => {
                ops::cast(&self.layout, op, value, operands[0].type_of()?, expr.type_of()?)
            }
            (Opcode::GetElementPtr, [base, indices @ ..]) => {
                let steps = self.gep_steps(operands[0].type_of()?, &operands[1..])?;
                let base = base
                    .as_address()
                    .ok_or_else(|| Trap::Unsupported("getelementptr on a non-pointer".to_owned()))?;
                Ok(Data::Pointer(lower::apply_gep(base, &steps, indices)?))
            }
            (Opcode::ExtractElement, [vector, index]) => ops::extract_element(vector, index),
            (Opcode::InsertElement, [vector, element, index]) => ops::insert_element(vector, element, index),
            (Opcode::ShuffleVector, [lhs, rhs, _]) => ops::shuffle(lhs, rhs, &lower::shuffle_mask(operands[2])?),
            (Opcode::ExtractValue, [aggregate]) => ops::extract_value(aggregate, &expr.indices()?),
            (Opcode::InsertValue, [aggregate, element]) => {
                ops::insert_value(aggregate, element, &expr.indices()?)
            }
            _ => Err(Trap::Unsupported(format!("constant expression `{opcode}`")).into()),
        }
    }
}
