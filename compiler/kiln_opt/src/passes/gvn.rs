//! Dominator-based redundancy elimination.
//!
//! Pure instructions are keyed by opcode, type, flags and operands. An
//! instruction whose key was already computed in a dominating position is
//! replaced by the earlier result. Blocks are visited in reverse
//! postorder, so every dominator is seen before the blocks it dominates.

use kiln_ir::{ArithFlags, Cfg, FloatPredicate, IntPredicate, Opcode, Type, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::replace_and_erase;
use crate::error::Result;
use crate::pass::{Pass, PassResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct GvnPass;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Detail {
    None,
    Int(IntPredicate),
    Float(FloatPredicate),
    Indices(SmallVec<[u32; 2]>),
    InBounds(bool),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Expression<'ctx> {
    opcode: Opcode,
    ty: Type<'ctx>,
    flags: ArithFlags,
    detail: Detail,
    operands: SmallVec<[Value<'ctx>; 3]>,
}

impl<'ctx> Expression<'ctx> {
    /// The key of a pure instruction, `None` for anything that reads or
    /// writes memory, transfers control or merges values.
    fn of(instr: Value<'ctx>) -> Result<Option<Self>> {
        let opcode = instr.opcode()?;
        let detail = match opcode {
            _ if opcode.is_binary() || opcode.is_cast() => Detail::None,
            Opcode::FNeg
            | Opcode::Select
            | Opcode::ExtractElement
            | Opcode::InsertElement
            | Opcode::ShuffleVector => Detail::None,
            Opcode::ICmp => Detail::Int(instr.icmp_predicate()?),
            Opcode::FCmp => Detail::Float(instr.fcmp_predicate()?),
            Opcode::ExtractValue | Opcode::InsertValue => Detail::Indices(instr.indices()?.into_iter().collect()),
            Opcode::GetElementPtr => Detail::InBounds(instr.is_in_bounds()?),
            _ => return Ok(None),
        };
        let flags = if opcode.is_binary() {
            instr.arith_flags()?
        } else {
            ArithFlags::empty()
        };
        Ok(Some(Expression {
            opcode,
            ty: instr.type_of()?,
            flags,
            detail,
            operands: instr.operands()?.into_iter().collect(),
        }))
    }

    /// The same computation with its two operands exchanged.
    fn swapped(&self) -> Option<Self> {
        let [lhs, rhs] = self.operands.as_slice() else {
            return None;
        };
        let detail = match &self.detail {
            Detail::None if self.opcode.is_commutative() => Detail::None,
            Detail::Int(predicate) if self.opcode == Opcode::ICmp => Detail::Int(predicate.swapped()),
            _ => return None,
        };
        Some(Expression {
            detail,
            operands: SmallVec::from_slice(&[*rhs, *lhs]),
            ..self.clone()
        })
    }
}

impl Pass for GvnPass {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn run_on_function(&self, function: Value<'_>) -> Result<PassResult> {
        let cfg = Cfg::build(function)?;
        let doms = cfg.dominator_tree();
        let mut table: FxHashMap<Expression<'_>, Vec<(usize, Value<'_>)>> = FxHashMap::default();
        let mut replaced = 0;

        for index in cfg.reverse_postorder() {
            let Some(block) = cfg.block(index) else {
                continue;
            };
            for instr in block.instructions()? {
                let Some(expr) = Expression::of(instr)? else {
                    continue;
                };
                let leader = [Some(expr.clone()), expr.swapped()]
                    .into_iter()
                    .flatten()
                    .find_map(|key| {
                        table.get(&key).and_then(|defs| {
                            defs.iter()
                                .find(|(def_block, _)| doms.dominates(*def_block, index))
                                .map(|&(_, value)| value)
                        })
                    });
                match leader {
                    Some(value) => {
                        replace_and_erase(instr, value)?;
                        replaced += 1;
                    }
                    None => table.entry(expr).or_default().push((index, instr)),
                }
            }
        }
        Ok(PassResult::changed(replaced))
    }
}
