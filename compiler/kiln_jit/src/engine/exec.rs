//! The frame loop.
//!
//! Calls between lowered functions push frames on an explicit stack rather
//! than recursing on the host stack, so deep IR recursion is bounded by
//! `max_call_depth` alone.

use std::rc::Rc;

use kiln_ir::Value;

use super::lower::{Callee, Compiled, Op, Operand};
use super::{builtins, encode, lower, ops, ExecutionEngine};
use crate::error::{Result, Trap};
use crate::generic_value::{Data, GenericValue};
use crate::memory::RegionKind;

/// Where a call result goes once the callee returns.
struct Pending {
    dest: Option<usize>,
    normal: Option<usize>,
}

struct Frame<'ctx> {
    code: Rc<Compiled<'ctx>>,
    slots: Vec<Data>,
    block: usize,
    pc: usize,
    /// `alloca` regions, released on return.
    stack: Vec<u64>,
    pending: Option<Pending>,
}

impl Frame<'_> {
    fn read(&self, operand: &Operand) -> Data {
        match operand {
            Operand::Slot(slot) => self.slots.get(*slot).cloned().unwrap_or(Data::Void),
            Operand::Const(data) => data.clone(),
        }
    }

    fn address(&self, operand: &Operand) -> Result<u64> {
        let value = self.read(operand);
        value
            .as_address()
            .ok_or_else(|| Trap::Unsupported(format!("{} used as an address", value.describe())).into())
    }

    fn set(&mut self, slot: usize, value: Data) {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = value;
        }
    }

    /// Enter `target`, resolving its phis against the current block.
    fn jump(&mut self, target: usize) -> Result<()> {
        let code = Rc::clone(&self.code);
        let block = code
            .blocks
            .get(target)
            .ok_or_else(|| Trap::Unsupported(format!("branch to missing block in `{}`", code.name)))?;
        let from = self.block;
        // Phis read their inputs before any of them is written.
        let values = block
            .phis
            .iter()
            .map(|phi| {
                phi.incoming
                    .iter()
                    .find(|(pred, _)| *pred == from)
                    .map(|(_, value)| self.read(value))
                    .ok_or_else(|| {
                        Trap::Unsupported(format!("phi in `{}` has no value for this edge", code.name)).into()
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        for (phi, value) in block.phis.iter().zip(values) {
            self.set(phi.dest, value);
        }
        self.block = target;
        self.pc = 0;
        Ok(())
    }

    /// Deliver a call result and continue after the call.
    fn resume(&mut self, value: Data) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if let Some(dest) = pending.dest {
            self.set(dest, value);
        }
        match pending.normal {
            Some(normal) => self.jump(normal),
            None => Ok(()),
        }
    }
}

enum Flow<'ctx> {
    Next,
    Call {
        function: Value<'ctx>,
        args: Vec<Data>,
    },
    Return(Data),
}

/// Outcome of entering a callee.
enum Entered<'ctx> {
    Frame(Frame<'ctx>),
    /// Host function or builtin, already finished.
    Done(Data),
}

fn truth(value: &Data) -> Result<bool> {
    value
        .as_bits()
        .map(|bits| bits & 1 == 1)
        .ok_or_else(|| Trap::Unsupported(format!("branch on {}", value.describe())).into())
}

impl<'ctx> ExecutionEngine<'ctx> {
    /// Run `function` to completion. Arguments are already checked.
    pub(super) fn execute(&mut self, function: Value<'ctx>, args: Vec<Data>) -> Result<Data> {
        let mut frames = Vec::new();
        let result = self.run_frames(&mut frames, function, args);
        for frame in frames {
            self.release(frame);
        }
        if let Err(err) = &result {
            tracing::debug!(%err, "execution stopped");
        }
        result
    }

    fn run_frames(&mut self, frames: &mut Vec<Frame<'ctx>>, function: Value<'ctx>, args: Vec<Data>) -> Result<Data> {
        match self.enter(function, args)? {
            Entered::Frame(frame) => frames.push(frame),
            Entered::Done(value) => return Ok(value),
        }
        let mut result = Data::Void;
        while let Some(frame) = frames.last_mut() {
            match self.step(frame)? {
                Flow::Next => {}
                Flow::Call { function, args } => {
                    if frames.len() >= self.options.max_call_depth {
                        return Err(Trap::CallDepthExceeded(self.options.max_call_depth).into());
                    }
                    match self.enter(function, args)? {
                        Entered::Frame(callee) => frames.push(callee),
                        Entered::Done(value) => {
                            if let Some(caller) = frames.last_mut() {
                                caller.resume(value)?;
                            }
                        }
                    }
                }
                Flow::Return(value) => {
                    if let Some(done) = frames.pop() {
                        tracing::trace!(function = %done.code.name, "return");
                        self.release(done);
                    }
                    match frames.last_mut() {
                        Some(caller) => caller.resume(value)?,
                        None => result = value,
                    }
                }
            }
        }
        Ok(result)
    }

    fn release(&mut self, frame: Frame<'ctx>) {
        for address in frame.stack {
            self.memory.release_stack(address);
        }
    }

    /// Compiled body of `function`, or `None` for declarations.
    fn compiled(&mut self, function: Value<'ctx>) -> Result<Option<Rc<Compiled<'ctx>>>> {
        if function.is_declaration()? {
            return Ok(None);
        }
        if let Some(code) = self.cache.get(&function) {
            return Ok(Some(Rc::clone(code)));
        }
        let code = Rc::new(self.lower(function)?);
        if self.options.kind.caches_code() {
            self.cache.insert(function, Rc::clone(&code));
        }
        Ok(Some(code))
    }

    /// Resolve a callee: host function, own body, a definition in another
    /// owned module, then builtins.
    fn enter(&mut self, function: Value<'ctx>, args: Vec<Data>) -> Result<Entered<'ctx>> {
        let name = function.name()?;
        tracing::trace!(function = %name, args = args.len(), "call");

        if let Some(host) = self.hosts.get_mut(&name) {
            let args: Vec<GenericValue> = args.into_iter().map(GenericValue::from_data).collect();
            let result = host(&mut self.memory, &args)?;
            return Ok(Entered::Done(result.into_data()));
        }
        if let Some(code) = self.compiled(function)? {
            if args.len() < code.params {
                return Err(Trap::Unsupported(format!(
                    "`{name}` called with {} arguments, expected {}",
                    args.len(),
                    code.params
                ))
                .into());
            }
            let mut slots = vec![Data::Void; code.slots];
            for (slot, arg) in slots.iter_mut().zip(args.into_iter().take(code.params)) {
                *slot = arg;
            }
            return Ok(Entered::Frame(Frame {
                code,
                slots,
                block: 0,
                pc: 0,
                stack: Vec::new(),
                pending: None,
            }));
        }
        if let Some(definition) = self.find_definition(function)? {
            return self.enter(definition, args);
        }
        if let Some(result) = builtins::call(self, &name, &args)? {
            return Ok(Entered::Done(result));
        }
        tracing::trace!(function = %name, "unresolved external");
        Err(Trap::UnresolvedExternal(name).into())
    }

    fn step(&mut self, frame: &mut Frame<'ctx>) -> Result<Flow<'ctx>> {
        let code = Rc::clone(&frame.code);
        let Some(inst) = code.blocks.get(frame.block).and_then(|b| b.body.get(frame.pc)) else {
            return Err(Trap::Unsupported(format!("ran past the end of a block in `{}`", code.name)).into());
        };
        frame.pc += 1;

        let value = match &inst.op {
            Op::Ret(value) => return Ok(Flow::Return(value.as_ref().map_or(Data::Void, |v| frame.read(v)))),
            Op::Br(target) => {
                frame.jump(*target)?;
                return Ok(Flow::Next);
            }
            Op::CondBr { cond, then, otherwise } => {
                let target = if truth(&frame.read(cond))? { *then } else { *otherwise };
                frame.jump(target)?;
                return Ok(Flow::Next);
            }
            Op::Switch { cond, default, cases } => {
                let value = frame.read(cond);
                let bits = value
                    .as_bits()
                    .ok_or_else(|| Trap::Unsupported(format!("switch on {}", value.describe())))?;
                let target = cases
                    .iter()
                    .find(|(case, _)| *case == bits)
                    .map_or(*default, |&(_, target)| target);
                frame.jump(target)?;
                return Ok(Flow::Next);
            }
            Op::Unreachable => return Err(Trap::Unreachable.into()),
            Op::Binary { opcode, lhs, rhs } => ops::binary(*opcode, &frame.read(lhs), &frame.read(rhs))?,
            Op::FNeg(value) => ops::fneg(&frame.read(value))?,
            Op::ICmp { predicate, lhs, rhs } => ops::icmp(*predicate, &frame.read(lhs), &frame.read(rhs))?,
            Op::FCmp { predicate, lhs, rhs } => ops::fcmp(*predicate, &frame.read(lhs), &frame.read(rhs))?,
            Op::Alloca { size, align, count } => {
                let count = frame.read(count);
                let count = count
                    .as_bits()
                    .and_then(|bits| u64::try_from(bits).ok())
                    .ok_or_else(|| Trap::Unsupported(format!("alloca count {}", count.describe())))?;
                let bytes = size
                    .checked_mul(count)
                    .ok_or(Trap::StackOverflow(self.options.stack_size_limit))?;
                let address = self.memory.reserve(RegionKind::Stack, bytes.max(1), *align)?;
                frame.stack.push(address);
                Data::Pointer(address)
            }
            Op::Load { ty, pointer } => encode::load(&self.memory, &self.layout, *ty, frame.address(pointer)?)?,
            Op::Store { ty, value, pointer } => {
                let address = frame.address(pointer)?;
                encode::store(&mut self.memory, &self.layout, *ty, address, &frame.read(value))?;
                Data::Void
            }
            Op::Gep { base, indices, steps } => {
                let indices: Vec<Data> = indices.iter().map(|index| frame.read(index)).collect();
                Data::Pointer(lower::apply_gep(frame.address(base)?, steps, &indices)?)
            }
            Op::Cast { opcode, value, from, to } => ops::cast(&self.layout, *opcode, &frame.read(value), *from, *to)?,
            Op::Select { cond, then, otherwise } => {
                ops::select(&frame.read(cond), &frame.read(then), &frame.read(otherwise))?
            }
            Op::Call { callee, args, normal } => {
                let function = match callee {
                    Callee::Direct(function) => *function,
                    Callee::Indirect(target) => {
                        let address = frame.address(target)?;
                        *self.code.get(&address).ok_or(Trap::BadCallTarget(address))?
                    }
                    Callee::InlineAsm => return Err(Trap::Unsupported("inline assembly".to_owned()).into()),
                };
                frame.pending = Some(Pending {
                    dest: inst.dest,
                    normal: *normal,
                });
                let args = args.iter().map(|arg| frame.read(arg)).collect();
                return Ok(Flow::Call { function, args });
            }
            Op::VaArg => return Err(Trap::Unsupported("va_arg".to_owned()).into()),
            Op::ExtractElement { vector, index } => ops::extract_element(&frame.read(vector), &frame.read(index))?,
            Op::InsertElement { vector, element, index } => {
                ops::insert_element(&frame.read(vector), &frame.read(element), &frame.read(index))?
            }
            Op::ShuffleVector { lhs, rhs, mask } => ops::shuffle(&frame.read(lhs), &frame.read(rhs), mask)?,
            Op::ExtractValue { aggregate, indices } => ops::extract_value(&frame.read(aggregate), indices)?,
            Op::InsertValue { aggregate, element, indices } => {
                ops::insert_value(&frame.read(aggregate), &frame.read(element), indices)?
            }
        };
        if let Some(dest) = inst.dest {
            frame.set(dest, value);
        }
        Ok(Flow::Next)
    }
}
