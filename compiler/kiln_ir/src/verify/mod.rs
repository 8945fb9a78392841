//! Structural verifier.
//!
//! Checks the invariants the data model does not enforce on every edit:
//!
//! | Check | Scope |
//! |-------|-------|
//! | every block ends with exactly one terminator | block |
//! | phis are grouped at the top of their block | block |
//! | phi incoming blocks equal the block's predecessors | block |
//! | the entry block has no predecessors | function |
//! | operands belong to the same function / module | instruction |
//! | definitions dominate their uses | instruction |
//! | `ret` matches the function's return type | instruction |
//! | declarations have external linkage | global |
//! | initializers and aliasees come from the same module | global |
//!
//! All problems are collected before failing, so one
//! [`Error::Verification`] reports every violation found, one per line.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::attributes::Linkage;
use crate::error::{Error, Result};
use crate::graph::{BlockGraph, DominatorTree};
use crate::id::{BlockId, ModuleId, ValueId};
use crate::opcode::Opcode;
use crate::store::{Extra, GlobalPayload, Payload, Store};
use crate::types::table::TypeTable;

/// Collected violations for one verification run.
#[derive(Default)]
struct Diagnostics {
    lines: Vec<String>,
}

impl Diagnostics {
    fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    fn finish(self) -> Result<()> {
        if self.lines.is_empty() {
            Ok(())
        } else {
            Err(Error::Verification {
                diagnostic: self.lines.join("\n"),
            })
        }
    }
}

pub(crate) fn verify_module(s: &Store, id: ModuleId) -> Result<()> {
    let module = s.module(id)?;
    let mut diags = Diagnostics::default();
    for &global in module.globals.iter().chain(&module.aliases) {
        check_global(s, id, global, &mut diags);
    }
    for &function in &module.functions {
        check_declaration(s, function, &mut diags);
        check_function(s, function, &mut diags)?;
    }
    tracing::trace!(
        module = %module.name,
        problems = diags.lines.len(),
        "module verified"
    );
    diags.finish()
}

pub(crate) fn verify_function(s: &Store, id: ValueId) -> Result<()> {
    let mut diags = Diagnostics::default();
    check_declaration(s, id, &mut diags);
    check_function(s, id, &mut diags)?;
    diags.finish()
}

fn global_name(s: &Store, id: ValueId) -> String {
    s.value(id)
        .map_or_else(|_| "@<disposed>".to_owned(), |v| format!("@{}", v.name))
}

fn local_name(s: &Store, id: ValueId) -> String {
    match s.value(id) {
        Ok(v) if !v.name.is_empty() => format!("%{}", v.name),
        Ok(_) => match s.opcode(id) {
            Some(opcode) => format!("unnamed `{opcode}`"),
            None => "unnamed value".to_owned(),
        },
        Err(_) => "<disposed>".to_owned(),
    }
}

fn block_name(s: &Store, block: BlockId) -> String {
    s.block(block)
        .map_or_else(|_| "<disposed>".to_owned(), |b| local_name(s, b.value))
}

// ── Globals ─────────────────────────────────────────────────────────

fn check_declaration(s: &Store, function: ValueId, diags: &mut Diagnostics) {
    let (Ok(global), Ok(data)) = (s.global(function), s.function(function)) else {
        return;
    };
    let external = matches!(
        global.linkage,
        Linkage::External | Linkage::ExternalWeak | Linkage::DllImport
    );
    if data.blocks.is_empty() && !external {
        diags.push(format!(
            "{}: declaration has `{}` linkage",
            global_name(s, function),
            global.linkage.name()
        ));
    }
}

fn check_global(s: &Store, module: ModuleId, global: ValueId, diags: &mut Diagnostics) {
    let Ok(data) = s.value(global) else { return };
    let Some(&target) = data.operands.first() else {
        return;
    };
    if let Some(owner) = s.owning_module(target) {
        if owner != module {
            diags.push(format!(
                "{}: references a global of another module",
                global_name(s, global)
            ));
        }
    }
    if let Ok(g) = s.global(global) {
        if let GlobalPayload::Variable { .. } = g.kind {
            let expected = s.types.pointee(data.ty);
            let found = s.ty(target).ok();
            if expected != found {
                diags.push(format!(
                    "{}: initializer type does not match the global",
                    global_name(s, global)
                ));
            }
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────

fn check_function(s: &Store, function: ValueId, diags: &mut Diagnostics) -> Result<()> {
    let data = s.function(function)?;
    if data.blocks.is_empty() {
        return Ok(());
    }
    let fname = global_name(s, function);
    let module = s.global(function)?.module;
    let graph = BlockGraph::build(s, function)?;
    let doms = DominatorTree::from_graph(&graph);

    if !graph.preds[0].is_empty() {
        diags.push(format!("{fname}: entry block has predecessors"));
    }

    // Where each instruction of this function lives: (block index, position).
    let mut place: FxHashMap<ValueId, (usize, usize)> = FxHashMap::default();
    for (bi, &block) in graph.blocks.iter().enumerate() {
        for (pos, &instr) in s.block(block)?.instrs.iter().enumerate() {
            place.insert(instr, (bi, pos));
        }
    }

    let fn_ty = s.types.pointee(s.ty(function)?).ok_or(Error::Disposed)?;
    let ret_ty = s
        .types
        .function_info(fn_ty)
        .map_or(TypeTable::VOID, |(ret, _, _)| ret);

    for (bi, &block) in graph.blocks.iter().enumerate() {
        let bname = block_name(s, block);
        let instrs = &s.block(block)?.instrs;
        check_block_shape(s, &fname, &bname, instrs, diags);

        for (pos, &instr) in instrs.iter().enumerate() {
            let idata = s.instr(instr)?;
            if idata.block != Some(block) {
                diags.push(format!(
                    "{fname}: {} is listed in {bname} but records another block",
                    local_name(s, instr)
                ));
            }
            let operands = &s.value(instr)?.operands;
            let site = UseSite {
                function,
                module,
                fname: &fname,
                instr,
                block: bi,
                pos,
            };
            match &idata.extra {
                Extra::Phi { blocks } => {
                    check_phi(s, &site, &graph, blocks, diags);
                    for (&value, &incoming) in operands.iter().zip(blocks) {
                        let Some(from) = graph.blocks.iter().position(|&b| b == incoming) else {
                            continue;
                        };
                        // A phi operand is used at the end of its incoming block.
                        let edge = UseSite {
                            block: from,
                            pos: usize::MAX,
                            ..site
                        };
                        check_operand(s, &edge, value, &place, &doms, diags);
                    }
                }
                _ => {
                    for &operand in operands {
                        check_operand(s, &site, operand, &place, &doms, diags);
                    }
                }
            }
            if idata.opcode == Opcode::Ret {
                let found = match operands.first() {
                    Some(&value) => s.ty(value)?,
                    None => TypeTable::VOID,
                };
                if found != ret_ty {
                    diags.push(format!(
                        "{fname}: `ret {}` in a function returning `{}`",
                        s.type_name(found),
                        s.type_name(ret_ty)
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_block_shape(s: &Store, fname: &str, bname: &str, instrs: &[ValueId], diags: &mut Diagnostics) {
    let Some(&last) = instrs.last() else {
        diags.push(format!("{fname}: block {bname} is empty"));
        return;
    };
    if !s.opcode(last).is_some_and(Opcode::is_terminator) {
        diags.push(format!("{fname}: block {bname} does not end with a terminator"));
    }
    let early = instrs[..instrs.len() - 1]
        .iter()
        .filter(|&&i| s.opcode(i).is_some_and(Opcode::is_terminator))
        .count();
    if early > 0 {
        diags.push(format!(
            "{fname}: block {bname} has a terminator in the middle"
        ));
    }
    let first_non_phi = instrs
        .iter()
        .position(|&i| s.opcode(i) != Some(Opcode::Phi))
        .unwrap_or(instrs.len());
    if instrs[first_non_phi..]
        .iter()
        .any(|&i| s.opcode(i) == Some(Opcode::Phi))
    {
        diags.push(format!(
            "{fname}: block {bname} has a phi after a non-phi instruction"
        ));
    }
}

/// Where an operand is used.
#[derive(Clone, Copy)]
struct UseSite<'a> {
    function: ValueId,
    module: ModuleId,
    fname: &'a str,
    instr: ValueId,
    block: usize,
    /// `usize::MAX` for the end of the block.
    pos: usize,
}

fn check_phi(s: &Store, site: &UseSite<'_>, graph: &BlockGraph, blocks: &[BlockId], diags: &mut Diagnostics) {
    let preds: FxHashSet<BlockId> = graph.preds[site.block]
        .iter()
        .map(|&p| graph.blocks[p])
        .collect();
    let incoming: FxHashSet<BlockId> = blocks.iter().copied().collect();
    if preds != incoming {
        diags.push(format!(
            "{}: phi {} has {} incoming block(s) but its block has {} predecessor(s)",
            site.fname,
            local_name(s, site.instr),
            incoming.len(),
            preds.len()
        ));
    }
}

fn check_operand(
    s: &Store,
    site: &UseSite<'_>,
    operand: ValueId,
    place: &FxHashMap<ValueId, (usize, usize)>,
    doms: &DominatorTree,
    diags: &mut Diagnostics,
) {
    let user = local_name(s, site.instr);
    let Ok(data) = s.value(operand) else {
        diags.push(format!("{}: {user} uses a released value", site.fname));
        return;
    };
    match &data.payload {
        Payload::Instruction(_) => {
            let Some(&(def_block, def_pos)) = place.get(&operand) else {
                diags.push(format!(
                    "{}: {user} uses {} from outside the function",
                    site.fname,
                    local_name(s, operand)
                ));
                return;
            };
            let dominated = if def_block == site.block {
                def_pos < site.pos
            } else {
                doms.dominates(def_block, site.block)
            };
            if !dominated {
                diags.push(format!(
                    "{}: {} does not dominate its use in {user}",
                    site.fname,
                    local_name(s, operand)
                ));
            }
        }
        Payload::Argument(arg) if arg.function != site.function => {
            diags.push(format!(
                "{}: {user} uses an argument of another function",
                site.fname
            ));
        }
        Payload::Block(block) => {
            if s.block(*block).ok().and_then(|b| b.parent) != Some(site.function) {
                diags.push(format!(
                    "{}: {user} refers to a block of another function",
                    site.fname
                ));
            }
        }
        Payload::Global(global) if global.module != site.module => {
            diags.push(format!(
                "{}: {user} uses {} from another module",
                site.fname,
                global_name(s, operand)
            ));
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
