//! Textual IR rendering.
//!
//! Output follows the classic typed-pointer assembly syntax:
//!
//! ```text
//! ; ModuleID = 'demo'
//!
//! define i32 @sum(i32 %a, i32 %b) {
//! entry:
//!   %tmp = add i32 %a, %b
//!   ret i32 %tmp
//! }
//! ```
//!
//! Unnamed arguments, blocks and instructions are numbered per function
//! in layout order (`%0`, `%1`, ...), the way the text would be read back.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::arith;
use crate::attributes::{ArithFlags, CallConv, Linkage, Visibility};
use crate::error::Result;
use crate::id::{BlockId, ModuleId, ValueId};
use crate::opcode::Opcode;
use crate::store::{Extra, GlobalPayload, Payload, Store};
use crate::types::table::{TypeData, TypeTable};

/// Slot numbers for the unnamed locals of one function.
#[derive(Default)]
struct Slots {
    numbers: FxHashMap<ValueId, u32>,
}

impl Slots {
    fn for_function(s: &Store, function: Option<ValueId>) -> Self {
        let mut slots = Slots::default();
        let Some(data) = function.and_then(|f| s.function(f).ok()) else {
            return slots;
        };
        let mut next = 0u32;
        let mut number = |id: ValueId, numbers: &mut FxHashMap<ValueId, u32>| {
            let unnamed = s
                .value(id)
                .is_ok_and(|v| v.name.is_empty() && v.ty != TypeTable::VOID);
            if unnamed {
                numbers.insert(id, next);
                next += 1;
            }
        };
        for &param in &data.params {
            number(param, &mut slots.numbers);
        }
        for &block in &data.blocks {
            let Ok(b) = s.block(block) else { continue };
            number(b.value, &mut slots.numbers);
            for &instr in &b.instrs {
                number(instr, &mut slots.numbers);
            }
        }
        slots
    }
}

/// Quote names that are not plain identifiers.
fn write_name(out: &mut String, sigil: char, name: &str) {
    out.push(sigil);
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '$' | '-'));
    if plain {
        out.push_str(name);
    } else {
        out.push('"');
        write_escaped(out, name.as_bytes());
        out.push('"');
    }
}

fn write_escaped(out: &mut String, bytes: &[u8]) {
    for &byte in bytes {
        if byte.is_ascii_graphic() && byte != b'"' && byte != b'\\' || byte == b' ' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{byte:02X}");
        }
    }
}

/// `1.500000e+00` style, or the raw bits for values that do not round-trip
/// through decimal.
fn write_fp(out: &mut String, value: f64) {
    let text = format!("{value:.6e}");
    let exact = text.parse::<f64>().map(f64::to_bits) == Ok(value.to_bits());
    match text.split_once('e') {
        Some((mantissa, exp)) if exact && value.is_finite() => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            let _ = write!(out, "{mantissa}e{sign}{:02}", exp.abs());
        }
        _ => {
            let _ = write!(out, "0x{:016X}", value.to_bits());
        }
    }
}

struct Printer<'s> {
    s: &'s Store,
    slots: Slots,
    out: String,
}

impl<'s> Printer<'s> {
    fn new(s: &'s Store, function: Option<ValueId>) -> Self {
        Self {
            s,
            slots: Slots::for_function(s, function),
            out: String::new(),
        }
    }

    fn ty(&mut self, ty: crate::id::TypeId) {
        self.s.types.write_type(&mut self.out, ty);
    }

    // ── Operand references ──────────────────────────────────────────

    /// Reference without a type: `%x`, `@g`, `42`, `null`, ...
    fn value_ref(&mut self, id: ValueId) {
        let s = self.s;
        let Ok(data) = s.value(id) else {
            self.out.push_str("<badref>");
            return;
        };
        match &data.payload {
            Payload::Global(_) => write_name(&mut self.out, '@', &data.name),
            Payload::Argument(_) | Payload::Instruction(_) | Payload::Block(_) => {
                if let Some(slot) = self.slots.numbers.get(&id) {
                    let _ = write!(self.out, "%{slot}");
                } else if data.name.is_empty() {
                    self.out.push_str("%<badref>");
                } else {
                    write_name(&mut self.out, '%', &data.name);
                }
            }
            Payload::ConstInt(bits) => {
                let width = s.types.int_width(data.ty).unwrap_or(128);
                if width == 1 {
                    self.out.push_str(if *bits & 1 == 1 { "true" } else { "false" });
                } else {
                    let _ = write!(self.out, "{}", arith::sign_extend(*bits, width));
                }
            }
            Payload::ConstFp(value) => write_fp(&mut self.out, *value),
            Payload::PointerNull => self.out.push_str("null"),
            Payload::AggregateZero => self.out.push_str("zeroinitializer"),
            Payload::Undef => self.out.push_str("undef"),
            Payload::ConstArray => {
                if let Some(bytes) = self.string_bytes(id) {
                    self.out.push_str("c\"");
                    write_escaped(&mut self.out, &bytes);
                    self.out.push('"');
                } else {
                    self.typed_list('[', &data.operands, ']');
                }
            }
            Payload::ConstStruct => {
                let packed = s.types.struct_body(data.ty).is_ok_and(|(_, p)| p);
                if packed {
                    self.out.push('<');
                }
                if data.operands.is_empty() {
                    self.out.push_str("{}");
                } else {
                    self.out.push_str("{ ");
                    self.typed_items(&data.operands);
                    self.out.push_str(" }");
                }
                if packed {
                    self.out.push('>');
                }
            }
            Payload::ConstVector => self.typed_list('<', &data.operands, '>'),
            Payload::ConstExpr(expr) => {
                self.const_expr(expr.opcode, expr.flags, &expr.extra, data.ty, &data.operands);
            }
            Payload::InlineAsm(asm) => {
                self.out.push_str("asm ");
                if asm.side_effects {
                    self.out.push_str("sideeffect ");
                }
                if asm.align_stack {
                    self.out.push_str("alignstack ");
                }
                self.out.push('"');
                write_escaped(&mut self.out, asm.asm.as_bytes());
                self.out.push_str("\", \"");
                write_escaped(&mut self.out, asm.constraints.as_bytes());
                self.out.push('"');
            }
        }
    }

    /// Reference with its type: `i32 %x`, `label %bb`.
    fn typed_ref(&mut self, id: ValueId) {
        match self.s.ty(id) {
            Ok(ty) => {
                self.ty(ty);
                self.out.push(' ');
                self.value_ref(id);
            }
            Err(_) => self.out.push_str("<badref>"),
        }
    }

    fn typed_items(&mut self, items: &[ValueId]) {
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.typed_ref(item);
        }
    }

    fn typed_list(&mut self, open: char, items: &[ValueId], close: char) {
        self.out.push(open);
        self.typed_items(items);
        self.out.push(close);
    }

    /// Bytes of an `[N x i8]` constant made only of integers.
    fn string_bytes(&self, id: ValueId) -> Option<Vec<u8>> {
        let data = self.s.value(id).ok()?;
        let TypeData::Array { element, .. } = self.s.types.get(data.ty) else {
            return None;
        };
        if *element != TypeTable::I8 || data.operands.is_empty() {
            return None;
        }
        data.operands
            .iter()
            .map(|&op| self.s.int_value(op).map(|b| b as u8))
            .collect()
    }

    fn flags(&mut self, flags: ArithFlags) {
        if flags.contains(ArithFlags::NUW) {
            self.out.push_str(" nuw");
        }
        if flags.contains(ArithFlags::NSW) {
            self.out.push_str(" nsw");
        }
        if flags.contains(ArithFlags::EXACT) {
            self.out.push_str(" exact");
        }
    }

    fn const_expr(
        &mut self,
        opcode: Opcode,
        flags: ArithFlags,
        extra: &Extra,
        ty: crate::id::TypeId,
        operands: &[ValueId],
    ) {
        self.out.push_str(opcode.name());
        self.flags(flags);
        match extra {
            Extra::ICmp(p) => {
                let _ = write!(self.out, " {p}");
            }
            Extra::FCmp(p) => {
                let _ = write!(self.out, " {p}");
            }
            Extra::Gep { in_bounds: true } => self.out.push_str(" inbounds"),
            _ => {}
        }
        self.out.push_str(" (");
        self.typed_items(operands);
        if opcode.is_cast() {
            self.out.push_str(" to ");
            self.ty(ty);
        }
        if let Extra::Indices(indices) = extra {
            for index in indices {
                let _ = write!(self.out, ", {index}");
            }
        }
        self.out.push(')');
    }

    // ── Instructions ────────────────────────────────────────────────

    fn instruction(&mut self, id: ValueId) -> Result<()> {
        let s = self.s;
        let data = s.value(id)?;
        let instr = s.instr(id)?;
        let ops = &data.operands;
        if data.ty != TypeTable::VOID {
            self.value_ref(id);
            self.out.push_str(" = ");
        }
        if matches!(instr.extra, Extra::Call { tail: true, .. }) {
            self.out.push_str("tail ");
        }
        self.out.push_str(instr.opcode.name());
        match instr.opcode {
            op if op.is_binary() => {
                self.flags(instr.flags);
                self.out.push(' ');
                self.typed_ref(ops[0]);
                self.out.push_str(", ");
                self.value_ref(ops[1]);
            }
            Opcode::ICmp | Opcode::FCmp => {
                match &instr.extra {
                    Extra::ICmp(p) => {
                        let _ = write!(self.out, " {p}");
                    }
                    Extra::FCmp(p) => {
                        let _ = write!(self.out, " {p}");
                    }
                    _ => {}
                }
                self.out.push(' ');
                self.typed_ref(ops[0]);
                self.out.push_str(", ");
                self.value_ref(ops[1]);
            }
            op if op.is_cast() => {
                self.out.push(' ');
                self.typed_ref(ops[0]);
                self.out.push_str(" to ");
                self.ty(data.ty);
            }
            Opcode::Alloca => {
                self.out.push(' ');
                if let Extra::Alloca { allocated } = instr.extra {
                    self.ty(allocated);
                }
                if let Some(&count) = ops.first() {
                    if s.int_value(count) != Some(1) {
                        self.out.push_str(", ");
                        self.typed_ref(count);
                    }
                }
            }
            Opcode::Br | Opcode::Ret | Opcode::Load | Opcode::Store | Opcode::FNeg
            | Opcode::Select | Opcode::ExtractElement | Opcode::InsertElement
            | Opcode::ShuffleVector => {
                if ops.is_empty() && instr.opcode == Opcode::Ret {
                    self.out.push_str(" void");
                } else if !ops.is_empty() {
                    self.out.push(' ');
                    self.typed_items(ops);
                }
            }
            Opcode::GetElementPtr => {
                if matches!(instr.extra, Extra::Gep { in_bounds: true }) {
                    self.out.push_str(" inbounds");
                }
                self.out.push(' ');
                self.typed_items(ops);
            }
            Opcode::Switch => {
                self.out.push(' ');
                self.typed_items(&ops[..2.min(ops.len())]);
                self.out.push_str(" [");
                for case in ops.get(2..).unwrap_or_default().chunks(2) {
                    self.out.push_str("\n    ");
                    self.typed_items(case);
                }
                self.out.push_str("\n  ]");
            }
            Opcode::Phi => {
                self.out.push(' ');
                self.ty(data.ty);
                if let Extra::Phi { blocks } = &instr.extra {
                    for (i, (&value, &block)) in ops.iter().zip(blocks).enumerate() {
                        self.out.push_str(if i == 0 { " [ " } else { ", [ " });
                        self.value_ref(value);
                        self.out.push_str(", ");
                        self.block_ref(block);
                        self.out.push_str(" ]");
                    }
                }
            }
            Opcode::Call | Opcode::Invoke => self.call(instr.opcode, &instr.extra, ops)?,
            Opcode::VAArg => {
                self.out.push(' ');
                self.typed_ref(ops[0]);
                self.out.push_str(", ");
                self.ty(data.ty);
            }
            Opcode::ExtractValue | Opcode::InsertValue => {
                self.out.push(' ');
                self.typed_items(ops);
                if let Extra::Indices(indices) = &instr.extra {
                    for index in indices {
                        let _ = write!(self.out, ", {index}");
                    }
                }
            }
            _ => {}
        }
        if let Some(loc) = instr.debug_loc {
            let _ = write!(self.out, ", !dbg !{{line: {}, column: {}}}", loc.line, loc.column);
        }
        for (kind, node) in &data.metadata {
            let name = s.md_kind_name(*kind).unwrap_or("unknown");
            let _ = write!(self.out, ", !{name} {node}");
        }
        Ok(())
    }

    fn block_ref(&mut self, block: BlockId) {
        match self.s.block(block) {
            Ok(b) => self.value_ref(b.value),
            Err(_) => self.out.push_str("%<badref>"),
        }
    }

    fn call(&mut self, opcode: Opcode, extra: &Extra, ops: &[ValueId]) -> Result<()> {
        let s = self.s;
        let Some((&callee, rest)) = ops.split_last() else {
            return Ok(());
        };
        let args = if opcode == Opcode::Invoke {
            &rest[..rest.len().saturating_sub(2)]
        } else {
            rest
        };
        if let Extra::Call { call_conv, attrs, .. } = extra {
            if *call_conv != CallConv::C {
                let _ = write!(self.out, " {call_conv}");
            }
            for name in attrs.names() {
                let _ = write!(self.out, " {name}");
            }
        }
        let (fn_ty, ret, _, var_arg) = s.callee_signature(callee)?;
        self.out.push(' ');
        if var_arg {
            self.ty(fn_ty);
            self.out.push('*');
        } else {
            self.ty(ret);
        }
        self.out.push(' ');
        self.value_ref(callee);
        self.out.push('(');
        self.typed_items(args);
        self.out.push(')');
        if opcode == Opcode::Invoke && rest.len() >= 2 {
            self.out.push_str("\n          to ");
            self.typed_ref(rest[rest.len() - 2]);
            self.out.push_str(" unwind ");
            self.typed_ref(rest[rest.len() - 1]);
        }
        Ok(())
    }

    // ── Blocks and functions ────────────────────────────────────────

    fn block(&mut self, block: BlockId) -> Result<()> {
        let s = self.s;
        let data = s.block(block)?;
        let label = s.value(data.value)?;
        if let Some(slot) = self.slots.numbers.get(&data.value) {
            let _ = writeln!(self.out, "{slot}:");
        } else {
            let start = self.out.len();
            write_name(&mut self.out, '%', &label.name);
            self.out.remove(start);
            self.out.push_str(":\n");
        }
        for &instr in &data.instrs {
            self.out.push_str("  ");
            self.instruction(instr)?;
            self.out.push('\n');
        }
        Ok(())
    }

    fn linkage(&mut self, linkage: Linkage, visibility: Visibility) {
        if linkage != Linkage::External {
            let _ = write!(self.out, "{} ", linkage.name());
        }
        if visibility != Visibility::Default {
            let _ = write!(self.out, "{} ", visibility.name());
        }
    }

    fn function(&mut self, id: ValueId) -> Result<()> {
        let s = self.s;
        let data = s.value(id)?;
        let global = s.global(id)?;
        let function = s.function(id)?;
        let fn_ty = s.types.pointee(data.ty).unwrap_or(TypeTable::VOID);
        let (ret, _, var_arg) = s.types.function_info(fn_ty).unwrap_or((TypeTable::VOID, &[], false));
        let is_declaration = function.blocks.is_empty();

        self.out.push_str(if is_declaration { "declare " } else { "define " });
        self.linkage(global.linkage, global.visibility);
        if function.call_conv != CallConv::C {
            let _ = write!(self.out, "{} ", function.call_conv);
        }
        self.ty(ret);
        self.out.push(' ');
        write_name(&mut self.out, '@', &data.name);
        self.out.push('(');
        for (i, &param) in function.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let pdata = s.value(param)?;
            self.ty(pdata.ty);
            let arg = s.argument(param)?;
            for name in arg.attrs.names() {
                let _ = write!(self.out, " {name}");
            }
            if arg.alignment != 0 {
                let _ = write!(self.out, " align {}", arg.alignment);
            }
            if !is_declaration {
                self.out.push(' ');
                self.value_ref(param);
            }
        }
        if var_arg {
            if !function.params.is_empty() {
                self.out.push_str(", ");
            }
            self.out.push_str("...");
        }
        self.out.push(')');
        for name in function.attrs.names() {
            let _ = write!(self.out, " {name}");
        }
        if let Some(section) = &global.section {
            self.out.push_str(" section \"");
            write_escaped(&mut self.out, section.as_bytes());
            self.out.push('"');
        }
        if global.alignment != 0 {
            let _ = write!(self.out, " align {}", global.alignment);
        }
        if let Some(gc) = &function.gc {
            let _ = write!(self.out, " gc \"{gc}\"");
        }
        if is_declaration {
            self.out.push('\n');
            return Ok(());
        }
        self.out.push_str(" {\n");
        for (i, &block) in function.blocks.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.block(block)?;
        }
        self.out.push_str("}\n");
        Ok(())
    }

    fn global_variable(&mut self, id: ValueId) -> Result<()> {
        let s = self.s;
        let data = s.value(id)?;
        let global = s.global(id)?;
        write_name(&mut self.out, '@', &data.name);
        self.out.push_str(" = ");
        let init = data.operands.first().copied();
        if init.is_none() && global.linkage == Linkage::External {
            self.out.push_str("external ");
        }
        self.linkage(global.linkage, global.visibility);
        match global.kind {
            GlobalPayload::Variable {
                thread_local,
                constant,
            } => {
                if thread_local {
                    self.out.push_str("thread_local ");
                }
                self.out.push_str(if constant { "constant " } else { "global " });
                let pointee = s.types.pointee(data.ty).unwrap_or(TypeTable::VOID);
                self.ty(pointee);
                if let Some(init) = init {
                    self.out.push(' ');
                    self.value_ref(init);
                }
            }
            GlobalPayload::Alias => {
                self.out.push_str("alias ");
                if let Some(target) = init {
                    self.typed_ref(target);
                }
            }
            GlobalPayload::Function(_) => {}
        }
        if let Some(section) = &global.section {
            self.out.push_str(", section \"");
            write_escaped(&mut self.out, section.as_bytes());
            self.out.push('"');
        }
        if global.alignment != 0 {
            let _ = write!(self.out, ", align {}", global.alignment);
        }
        self.out.push('\n');
        Ok(())
    }

    fn module(&mut self, id: ModuleId) -> Result<()> {
        let s = self.s;
        let module = s.module(id)?;
        self.out.push_str("; ModuleID = '");
        self.out.push_str(&module.name);
        self.out.push_str("'\n");
        if !module.data_layout.is_empty() {
            let _ = writeln!(self.out, "target datalayout = \"{}\"", module.data_layout);
        }
        if !module.target_triple.is_empty() {
            let _ = writeln!(self.out, "target triple = \"{}\"", module.target_triple);
        }
        for line in module.inline_asm.lines() {
            self.out.push_str("module asm \"");
            write_escaped(&mut self.out, line.as_bytes());
            self.out.push_str("\"\n");
        }

        let named: Vec<_> = s.types.named_structs().collect();
        if !named.is_empty() {
            self.out.push('\n');
        }
        for ty in named {
            self.ty(ty);
            self.out.push_str(" = type ");
            match s.types.struct_body(ty) {
                Ok((elements, packed)) => {
                    let elements = elements.to_vec();
                    s.types.write_struct_body(&mut self.out, &elements, packed);
                }
                Err(_) => self.out.push_str("opaque"),
            }
            self.out.push('\n');
        }

        if !module.globals.is_empty() || !module.aliases.is_empty() {
            self.out.push('\n');
        }
        for &global in module.globals.iter().chain(&module.aliases) {
            self.global_variable(global)?;
        }
        for &function in &module.functions {
            self.out.push('\n');
            self.slots = Slots::for_function(s, Some(function));
            self.function(function)?;
        }
        Ok(())
    }
}

pub(crate) fn print_module(s: &Store, id: ModuleId) -> Result<String> {
    let mut printer = Printer::new(s, None);
    printer.module(id)?;
    Ok(printer.out)
}

/// One value: a full definition for functions, globals and blocks, the
/// instruction line for instructions, `type value` for everything else.
pub(crate) fn print_value(s: &Store, id: ValueId) -> Result<String> {
    let data = s.value(id)?;
    let mut printer = Printer::new(s, s.owning_function(id));
    match &data.payload {
        Payload::Global(global) => match global.kind {
            GlobalPayload::Function(_) => {
                printer.slots = Slots::for_function(s, Some(id));
                printer.function(id)?;
            }
            _ => printer.global_variable(id)?,
        },
        Payload::Instruction(_) => printer.instruction(id)?,
        Payload::Block(block) => printer.block(*block)?,
        _ => printer.typed_ref(id),
    }
    Ok(printer.out.trim_end_matches('\n').to_owned())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
