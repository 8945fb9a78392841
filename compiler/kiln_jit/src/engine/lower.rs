//! Lowering of IR functions into the engine's executable form.
//!
//! Every argument and instruction gets a slot index, blocks get dense
//! indices in layout order, and constant operands are evaluated once. Phis
//! are split off the block bodies since they are resolved on the edge, not
//! executed in sequence.

use kiln_ir::{BasicBlock, FloatPredicate, IntPredicate, Opcode, Type, TypeKind, Value, ValueKind};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::ExecutionEngine;
use crate::error::{Result, Trap};
use crate::generic_value::Data;

#[derive(Clone, Debug)]
pub(super) enum Operand {
    Slot(usize),
    Const(Data),
}

#[derive(Clone, Debug)]
pub(super) enum Callee<'ctx> {
    Direct(Value<'ctx>),
    Indirect(Operand),
    InlineAsm,
}

/// One address computation step of a `getelementptr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum GepStep {
    /// Add the `index`-th index operand times `size`.
    Scaled { index: usize, size: u64 },
    /// Add a constant field offset.
    Offset(u64),
}

#[derive(Debug)]
pub(super) enum Op<'ctx> {
    Ret(Option<Operand>),
    Br(usize),
    CondBr {
        cond: Operand,
        then: usize,
        otherwise: usize,
    },
    Switch {
        cond: Operand,
        default: usize,
        cases: Vec<(u128, usize)>,
    },
    Unreachable,
    Binary {
        opcode: Opcode,
        lhs: Operand,
        rhs: Operand,
    },
    FNeg(Operand),
    ICmp {
        predicate: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        predicate: FloatPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Alloca {
        size: u64,
        align: u64,
        count: Operand,
    },
    Load {
        ty: Type<'ctx>,
        pointer: Operand,
    },
    Store {
        ty: Type<'ctx>,
        value: Operand,
        pointer: Operand,
    },
    Gep {
        base: Operand,
        indices: SmallVec<[Operand; 4]>,
        steps: Vec<GepStep>,
    },
    Cast {
        opcode: Opcode,
        value: Operand,
        from: Type<'ctx>,
        to: Type<'ctx>,
    },
    Select {
        cond: Operand,
        then: Operand,
        otherwise: Operand,
    },
    Call {
        callee: Callee<'ctx>,
        args: SmallVec<[Operand; 4]>,
        /// Continuation block of an `invoke`.
        normal: Option<usize>,
    },
    VaArg,
    ExtractElement {
        vector: Operand,
        index: Operand,
    },
    InsertElement {
        vector: Operand,
        element: Operand,
        index: Operand,
    },
    ShuffleVector {
        lhs: Operand,
        rhs: Operand,
        mask: Vec<Option<usize>>,
    },
    ExtractValue {
        aggregate: Operand,
        indices: Vec<u32>,
    },
    InsertValue {
        aggregate: Operand,
        element: Operand,
        indices: Vec<u32>,
    },
}

#[derive(Debug)]
pub(super) struct Inst<'ctx> {
    pub(super) op: Op<'ctx>,
    pub(super) dest: Option<usize>,
}

#[derive(Debug)]
pub(super) struct Phi {
    pub(super) dest: usize,
    /// `(predecessor block, value)` pairs.
    pub(super) incoming: Vec<(usize, Operand)>,
}

#[derive(Debug, Default)]
pub(super) struct Block<'ctx> {
    pub(super) phis: Vec<Phi>,
    pub(super) body: Vec<Inst<'ctx>>,
}

/// Executable form of one function.
#[derive(Debug)]
pub(super) struct Compiled<'ctx> {
    pub(super) name: String,
    pub(super) params: usize,
    pub(super) slots: usize,
    pub(super) blocks: Vec<Block<'ctx>>,
}

/// Symbol tables of the function being lowered.
struct Scope<'ctx> {
    slots: FxHashMap<Value<'ctx>, usize>,
    blocks: FxHashMap<BasicBlock<'ctx>, usize>,
}

fn unsupported(what: impl Into<String>) -> crate::Error {
    Trap::Unsupported(what.into()).into()
}

impl<'ctx> ExecutionEngine<'ctx> {
    /// Lower `function`, which must have a body.
    pub(super) fn lower(&mut self, function: Value<'ctx>) -> Result<Compiled<'ctx>> {
        let name = function.name()?;
        let params = function.params()?;
        let layout_blocks = function.basic_blocks()?;
        if layout_blocks.is_empty() {
            return Err(Trap::UnresolvedExternal(name).into());
        }

        let mut scope = Scope {
            slots: FxHashMap::default(),
            blocks: FxHashMap::default(),
        };
        for (i, &param) in params.iter().enumerate() {
            scope.slots.insert(param, i);
        }
        let mut next_slot = params.len();
        for (i, &block) in layout_blocks.iter().enumerate() {
            scope.blocks.insert(block, i);
            for inst in block.instructions()? {
                scope.slots.insert(inst, next_slot);
                next_slot += 1;
            }
        }

        let mut blocks = Vec::with_capacity(layout_blocks.len());
        let mut count = 0usize;
        for &block in &layout_blocks {
            let mut lowered = Block::default();
            for inst in block.instructions()? {
                let dest = scope.slots.get(&inst).copied();
                count += 1;
                if inst.opcode()? == Opcode::Phi {
                    let incoming = (0..inst.count_incoming()?)
                        .map(|i| {
                            let pred = self.target(&scope, inst.incoming_block(i)?)?;
                            Ok((pred, self.operand(&scope, inst.incoming_value(i)?)?))
                        })
                        .collect::<Result<_>>()?;
                    lowered.phis.push(Phi {
                        dest: dest.unwrap_or_default(),
                        incoming,
                    });
                } else {
                    let op = self.lower_instruction(&scope, inst)?;
                    let dest = dest.filter(|_| inst.type_of().is_ok_and(|ty| !ty.is_void()));
                    lowered.body.push(Inst { op, dest });
                }
            }
            blocks.push(lowered);
        }
        tracing::debug!(function = %name, blocks = blocks.len(), instructions = count, "function compiled");
        Ok(Compiled {
            name,
            params: params.len(),
            slots: next_slot,
            blocks,
        })
    }

    fn operand(&mut self, scope: &Scope<'ctx>, value: Value<'ctx>) -> Result<Operand> {
        if let Some(&slot) = scope.slots.get(&value) {
            return Ok(Operand::Slot(slot));
        }
        match value.kind()? {
            ValueKind::Argument | ValueKind::Instruction(_) => Err(unsupported(format!(
                "`{}` is defined in another function",
                value.name()?
            ))),
            ValueKind::BasicBlock => Err(unsupported("label used as a data operand")),
            _ => Ok(Operand::Const(self.constant(value)?)),
        }
    }

    fn target(&self, scope: &Scope<'ctx>, block: BasicBlock<'ctx>) -> Result<usize> {
        scope
            .blocks
            .get(&block)
            .copied()
            .ok_or_else(|| unsupported("branch to a block of another function"))
    }

    fn label(&self, scope: &Scope<'ctx>, value: Value<'ctx>) -> Result<usize> {
        self.target(scope, value.as_basic_block()?)
    }

    fn operands(&mut self, scope: &Scope<'ctx>, values: &[Value<'ctx>]) -> Result<SmallVec<[Operand; 4]>> {
        values.iter().map(|&v| self.operand(scope, v)).collect()
    }

    fn callee(&mut self, scope: &Scope<'ctx>, value: Value<'ctx>) -> Result<Callee<'ctx>> {
        Ok(match value.kind()? {
            ValueKind::Global(kiln_ir::GlobalKind::Function) => Callee::Direct(value),
            ValueKind::InlineAsm => Callee::InlineAsm,
            _ => Callee::Indirect(self.operand(scope, value)?),
        })
    }

    fn lower_instruction(&mut self, scope: &Scope<'ctx>, inst: Value<'ctx>) -> Result<Op<'ctx>> {
        let opcode = inst.opcode()?;
        let values = inst.operands()?;
        let ops = self.operands_for(scope, opcode, &values)?;
        let mut ops = ops.into_iter();
        let mut next = || ops.next().ok_or_else(|| unsupported(format!("malformed `{opcode}`")));

        Ok(match opcode {
            Opcode::Ret => Op::Ret(if values.is_empty() { None } else { Some(next()?) }),
            Opcode::Br => match values.as_slice() {
                [dest] => Op::Br(self.label(scope, *dest)?),
                [_, then, otherwise] => Op::CondBr {
                    cond: next()?,
                    then: self.label(scope, *then)?,
                    otherwise: self.label(scope, *otherwise)?,
                },
                _ => return Err(unsupported("malformed `br`")),
            },
            Opcode::Switch => {
                let default = values
                    .get(1)
                    .ok_or_else(|| unsupported("malformed `switch`"))?;
                let cases = values[2..]
                    .chunks_exact(2)
                    .map(|pair| Ok((pair[0].const_int_zext_value()?, self.label(scope, pair[1])?)))
                    .collect::<Result<_>>()?;
                Op::Switch {
                    cond: next()?,
                    default: self.label(scope, *default)?,
                    cases,
                }
            }
            Opcode::Unreachable => Op::Unreachable,
            Opcode::Invoke => {
                // [args..., then, catch, callee]
                let [.., then, _, callee] = values.as_slice() else {
                    return Err(unsupported("malformed `invoke`"));
                };
                let args = self.operands(scope, &values[..values.len() - 3])?;
                Op::Call {
                    callee: self.callee(scope, *callee)?,
                    args,
                    normal: Some(self.label(scope, *then)?),
                }
            }
            Opcode::Call => {
                let Some((callee, args)) = values.split_last() else {
                    return Err(unsupported("malformed `call`"));
                };
                Op::Call {
                    callee: self.callee(scope, *callee)?,
                    args: self.operands(scope, args)?,
                    normal: None,
                }
            }
            op if op.is_binary() => Op::Binary {
                opcode,
                lhs: next()?,
                rhs: next()?,
            },
            Opcode::FNeg => Op::FNeg(next()?),
            Opcode::ICmp => Op::ICmp {
                predicate: inst.icmp_predicate()?,
                lhs: next()?,
                rhs: next()?,
            },
            Opcode::FCmp => Op::FCmp {
                predicate: inst.fcmp_predicate()?,
                lhs: next()?,
                rhs: next()?,
            },
            Opcode::Alloca => {
                let ty = inst.allocated_type()?;
                Op::Alloca {
                    size: self.layout.size_of_type(ty)?,
                    align: self.layout.abi_alignment_of_type(ty)?,
                    count: next()?,
                }
            }
            Opcode::Load => Op::Load {
                ty: inst.type_of()?,
                pointer: next()?,
            },
            Opcode::Store => Op::Store {
                ty: values[0].type_of()?,
                value: next()?,
                pointer: next()?,
            },
            Opcode::GetElementPtr => {
                let base = next()?;
                let steps = self.gep_steps(values[0].type_of()?, &values[1..])?;
                Op::Gep {
                    base,
                    indices: ops.collect(),
                    steps,
                }
            }
            op if op.is_cast() => Op::Cast {
                opcode,
                value: next()?,
                from: values[0].type_of()?,
                to: inst.type_of()?,
            },
            Opcode::Select => Op::Select {
                cond: next()?,
                then: next()?,
                otherwise: next()?,
            },
            Opcode::VAArg => Op::VaArg,
            Opcode::ExtractElement => Op::ExtractElement {
                vector: next()?,
                index: next()?,
            },
            Opcode::InsertElement => Op::InsertElement {
                vector: next()?,
                element: next()?,
                index: next()?,
            },
            Opcode::ShuffleVector => Op::ShuffleVector {
                lhs: next()?,
                rhs: next()?,
                mask: shuffle_mask(values[2])?,
            },
            Opcode::ExtractValue => Op::ExtractValue {
                aggregate: next()?,
                indices: inst.indices()?,
            },
            Opcode::InsertValue => Op::InsertValue {
                aggregate: next()?,
                element: next()?,
                indices: inst.indices()?,
            },
            other => return Err(unsupported(format!("`{other}` instruction"))),
        })
    }

    /// Data operands of an instruction; labels, callees and shuffle masks
    /// are handled by the caller.
    fn operands_for(
        &mut self,
        scope: &Scope<'ctx>,
        opcode: Opcode,
        values: &[Value<'ctx>],
    ) -> Result<SmallVec<[Operand; 4]>> {
        let data = match opcode {
            Opcode::Br | Opcode::Switch => &values[..values.len().min(1)],
            Opcode::Call | Opcode::Invoke | Opcode::VAArg | Opcode::Unreachable => &[],
            Opcode::ShuffleVector => &values[..values.len().min(2)],
            _ => values,
        };
        // A one-operand `br` has no condition.
        if opcode == Opcode::Br && values.len() == 1 {
            return Ok(SmallVec::new());
        }
        self.operands(scope, data)
    }

    /// Address computation plan for `getelementptr` on `pointer_ty`.
    pub(super) fn gep_steps(&self, pointer_ty: Type<'ctx>, indices: &[Value<'ctx>]) -> Result<Vec<GepStep>> {
        let mut current = pointer_ty.element_type()?;
        let mut steps = Vec::with_capacity(indices.len());
        for (i, index) in indices.iter().enumerate() {
            if i == 0 {
                steps.push(GepStep::Scaled {
                    index: 0,
                    size: self.layout.size_of_type(current)?,
                });
                continue;
            }
            match current.kind() {
                TypeKind::Struct => {
                    let field = index.const_int_zext_value()? as usize;
                    steps.push(GepStep::Offset(self.layout.offset_of_element(current, field)?));
                    current = current
                        .struct_element_types()?
                        .get(field)
                        .copied()
                        .ok_or_else(|| unsupported("struct index out of range"))?;
                }
                TypeKind::Array | TypeKind::Vector => {
                    current = current.element_type()?;
                    steps.push(GepStep::Scaled {
                        index: i,
                        size: self.layout.size_of_type(current)?,
                    });
                }
                _ => return Err(unsupported(format!("getelementptr into `{current}`"))),
            }
        }
        Ok(steps)
    }
}

pub(super) fn shuffle_mask(mask: Value<'_>) -> Result<Vec<Option<usize>>> {
    let lanes = match mask.kind()? {
        ValueKind::Constant(kiln_ir::ConstantKind::Vector) => mask.const_elements()?,
        ValueKind::Constant(kiln_ir::ConstantKind::AggregateZero) => {
            let len = mask.type_of()?.vector_len()?;
            return Ok(vec![Some(0); len as usize]);
        }
        ValueKind::Undef => {
            let len = mask.type_of()?.vector_len()?;
            return Ok(vec![None; len as usize]);
        }
        _ => return Err(unsupported("shuffle mask must be a constant vector")),
    };
    lanes
        .into_iter()
        .map(|lane| {
            if lane.is_undef() {
                Ok(None)
            } else {
                Ok(Some(lane.const_int_zext_value()? as usize))
            }
        })
        .collect()
}

/// Evaluate a planned `getelementptr`.
pub(super) fn apply_gep(base: u64, steps: &[GepStep], indices: &[Data]) -> Result<u64> {
    steps.iter().try_fold(base, |address, step| match *step {
        GepStep::Offset(offset) => Ok(address.wrapping_add(offset)),
        GepStep::Scaled { index, size } => {
            let value = indices
                .get(index)
                .ok_or_else(|| unsupported("missing getelementptr index"))?;
            let offset = match *value {
                Data::Int { bits, width } => kiln_ir::arith::sign_extend(bits, width) as i64,
                _ => return Err(unsupported(format!("getelementptr index {}", value.describe()))),
            };
            Ok(address.wrapping_add((offset as u64).wrapping_mul(size)))
        }
    })
}
