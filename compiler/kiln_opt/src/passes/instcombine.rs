//! Local algebraic simplification.
//!
//! Each instruction is replaced by an existing value when an identity
//! makes it redundant (`x + 0`, `x & x`, `select true, a, b`, ...).
//! Instructions left without uses and side effects are erased. The pass
//! repeats until nothing changes.

use kiln_ir::{Cfg, DominatorTree, IntPredicate, Opcode, Value};

use super::{instructions, is_trivially_dead, replace_and_erase};
use crate::error::Result;
use crate::pass::{Pass, PassResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct InstructionCombiningPass;

impl Pass for InstructionCombiningPass {
    fn name(&self) -> &'static str {
        "instcombine"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let mut total = 0;
        loop {
            let cfg = Cfg::build(function)?;
            let doms = cfg.dominator_tree();
            let mut round = 0;
            for instr in instructions(function)? {
                if !instr.is_alive() {
                    continue;
                }
                if is_trivially_dead(instr)? {
                    instr.erase_from_parent()?;
                    round += 1;
                } else if let Some(simpler) = simplify(instr, &cfg, &doms)? {
                    replace_and_erase(instr, simpler)?;
                    round += 1;
                }
            }
            if round == 0 {
                break;
            }
            total += round;
        }
        Ok(PassResult::changed(total))
    }
}

/// Value of an integer constant, if `value` is one.
fn int_constant(value: Value<'_>) -> Option<i128> {
    value.const_int_sext_value().ok()
}

fn is_zero(value: Value<'_>) -> bool {
    int_constant(value) == Some(0)
}

fn is_one(value: Value<'_>) -> bool {
    value.const_int_zext_value().ok() == Some(1)
}

fn is_all_ones(value: Value<'_>) -> bool {
    int_constant(value) == Some(-1)
}

/// An existing value `instr` is equivalent to.
fn simplify<'ctx>(instr: Value<'ctx>, cfg: &Cfg<'ctx>, doms: &DominatorTree) -> Result<Option<Value<'ctx>>> {
    if let Some(constant) = instr.try_fold()? {
        return Ok(Some(constant));
    }
    let opcode = instr.opcode()?;
    let ty = instr.type_of()?;
    match opcode {
        _ if opcode.is_binary() && ty.is_integer() => simplify_binary(instr, opcode),
        Opcode::ICmp if ty.is_integer() => {
            let (lhs, rhs) = (instr.operand(0)?, instr.operand(1)?);
            if lhs != rhs {
                return Ok(None);
            }
            let reflexive = matches!(
                instr.icmp_predicate()?,
                IntPredicate::Eq
                    | IntPredicate::Uge
                    | IntPredicate::Ule
                    | IntPredicate::Sge
                    | IntPredicate::Sle
            );
            Ok(Some(ty.const_int(u64::from(reflexive), false)?))
        }
        Opcode::Select => {
            let (cond, then, otherwise) = (instr.operand(0)?, instr.operand(1)?, instr.operand(2)?);
            if then == otherwise {
                return Ok(Some(then));
            }
            Ok(int_constant(cond).map(|c| if c != 0 { then } else { otherwise }))
        }
        Opcode::BitCast => {
            let source = instr.operand(0)?;
            Ok((source.type_of()? == ty).then_some(source))
        }
        Opcode::Phi => simplify_phi(instr, cfg, doms),
        _ => Ok(None),
    }
}

fn simplify_binary<'ctx>(instr: Value<'ctx>, opcode: Opcode) -> Result<Option<Value<'ctx>>> {
    let (lhs, rhs) = (instr.operand(0)?, instr.operand(1)?);
    let zero = || instr.type_of()?.const_null();
    let simpler = match opcode {
        Opcode::Add if is_zero(rhs) => Some(lhs),
        Opcode::Add if is_zero(lhs) => Some(rhs),
        Opcode::Sub if is_zero(rhs) => Some(lhs),
        Opcode::Sub | Opcode::Xor if lhs == rhs => Some(zero()?),
        Opcode::Mul if is_one(rhs) => Some(lhs),
        Opcode::Mul if is_one(lhs) => Some(rhs),
        Opcode::Mul if is_zero(lhs) || is_zero(rhs) => Some(zero()?),
        Opcode::UDiv | Opcode::SDiv if is_one(rhs) => Some(lhs),
        Opcode::URem | Opcode::SRem if is_one(rhs) => Some(zero()?),
        Opcode::Shl | Opcode::LShr | Opcode::AShr if is_zero(rhs) => Some(lhs),
        Opcode::Shl | Opcode::LShr | Opcode::AShr if is_zero(lhs) => Some(lhs),
        Opcode::And | Opcode::Or if lhs == rhs => Some(lhs),
        Opcode::And if is_zero(lhs) => Some(lhs),
        Opcode::And if is_zero(rhs) => Some(rhs),
        Opcode::And if is_all_ones(rhs) => Some(lhs),
        Opcode::And if is_all_ones(lhs) => Some(rhs),
        Opcode::Or | Opcode::Xor if is_zero(rhs) => Some(lhs),
        Opcode::Or | Opcode::Xor if is_zero(lhs) => Some(rhs),
        Opcode::Or if is_all_ones(lhs) => Some(lhs),
        Opcode::Or if is_all_ones(rhs) => Some(rhs),
        _ => None,
    };
    Ok(simpler)
}

/// A phi whose incoming values, ignoring itself, are all one value that
/// dominates it.
fn simplify_phi<'ctx>(phi: Value<'ctx>, cfg: &Cfg<'ctx>, doms: &DominatorTree) -> Result<Option<Value<'ctx>>> {
    let mut common = None;
    for index in 0..phi.count_incoming()? {
        let value = phi.incoming_value(index)?;
        if value == phi || Some(value) == common {
            continue;
        }
        if common.is_some() {
            return Ok(None);
        }
        common = Some(value);
    }
    let Some(value) = common else {
        return Ok(None);
    };
    if !value.is_instruction() {
        return Ok(Some(value));
    }
    let defined = value.instruction_parent()?.and_then(|b| cfg.index_of(b));
    let used = phi.instruction_parent()?.and_then(|b| cfg.index_of(b));
    match (defined, used) {
        (Some(d), Some(u)) if d != u && doms.dominates(d, u) => Ok(Some(value)),
        _ => Ok(None),
    }
}
