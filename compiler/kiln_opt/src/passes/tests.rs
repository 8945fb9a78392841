use kiln_ir::{Builder, Context, IntPredicate, Linkage, Module, Type};
use pretty_assertions::assert_eq;

use super::*;
use crate::pass::Pass;

/// A function with an `entry` block and a builder positioned in it.
fn function<'ctx>(
    module: &Module<'ctx>,
    name: &str,
    ret: Type<'ctx>,
    params: &[Type<'ctx>],
) -> (Value<'ctx>, Builder<'ctx>) {
    let ctx = module.context();
    let f = module
        .add_function(name, ctx.function_type(ret, params, false).unwrap())
        .unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(f.append_basic_block("entry").unwrap()).unwrap();
    (f, builder)
}

fn opcodes(function: Value<'_>) -> Vec<Opcode> {
    instructions(function)
        .unwrap()
        .into_iter()
        .map(|i| i.opcode().unwrap())
        .collect()
}

fn returned(function: Value<'_>) -> Value<'_> {
    let last = function.last_basic_block().unwrap();
    last.terminator().unwrap().operand(0).unwrap()
}

fn int(ty: Type<'_>, value: u64) -> Value<'_> {
    ty.const_int(value, false).unwrap()
}

// Constant propagation

#[test]
fn constants_propagate_through_users() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[]);
    let six = b.build_mul(int(i32_ty, 2), int(i32_ty, 3), "six").unwrap();
    let ten = b.build_add(six, int(i32_ty, 4), "ten").unwrap();
    b.build_ret(ten).unwrap();

    let result = ConstantPropagationPass.run_on_function(f).unwrap();
    assert!(result.changed);
    assert_eq!(result.stats.items_transformed, 2);
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
    assert_eq!(returned(f).const_int_zext_value().unwrap(), 10);
    module.verify().unwrap();
}

#[test]
fn trapping_division_is_not_folded() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[]);
    let q = b.build_sdiv(int(i32_ty, 1), int(i32_ty, 0), "q").unwrap();
    b.build_ret(q).unwrap();

    assert!(!ConstantPropagationPass.run_on_function(f).unwrap().changed);
    assert_eq!(opcodes(f), vec![Opcode::SDiv, Opcode::Ret]);
}

// Instruction combining

#[test]
fn algebraic_identities_collapse() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[i32_ty]);
    let x = f.param(0).unwrap();
    let a = b.build_add(x, int(i32_ty, 0), "a").unwrap();
    let m = b.build_mul(a, int(i32_ty, 1), "m").unwrap();
    let zero = b.build_sub(m, m, "zero").unwrap();
    let d = b.build_or(m, zero, "d").unwrap();
    b.build_ret(d).unwrap();

    assert!(InstructionCombiningPass.run_on_function(f).unwrap().changed);
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
    assert_eq!(returned(f), x);
}

#[test]
fn reflexive_compare_feeds_select() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[i32_ty, i32_ty]);
    let (x, y) = (f.param(0).unwrap(), f.param(1).unwrap());
    let same = b.build_icmp(IntPredicate::Sle, x, x, "same").unwrap();
    let pick = b.build_select(same, x, y, "pick").unwrap();
    b.build_ret(pick).unwrap();

    InstructionCombiningPass.run_on_function(f).unwrap();
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
    assert_eq!(returned(f), x);
}

#[test]
fn unused_pure_instructions_are_erased() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[i32_ty]);
    let x = f.param(0).unwrap();
    let t = b.build_xor(x, int(i32_ty, 5), "t").unwrap();
    b.build_shl(t, int(i32_ty, 2), "unused").unwrap();
    b.build_ret(x).unwrap();

    let result = InstructionCombiningPass.run_on_function(f).unwrap();
    assert_eq!(result.stats.items_transformed, 2);
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
}

// Aggressive DCE

#[test]
fn dead_cycles_are_removed() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[]);
    let entry = f.entry_basic_block().unwrap();
    let body = f.append_basic_block("loop").unwrap();
    let exit = f.append_basic_block("exit").unwrap();
    b.build_br(body).unwrap();

    b.position_at_end(body).unwrap();
    let i = b.build_phi(i32_ty, "i").unwrap();
    let acc = b.build_phi(i32_ty, "acc").unwrap();
    let next = b.build_add(i, int(i32_ty, 1), "next").unwrap();
    let acc_next = b.build_add(acc, int(i32_ty, 2), "acc.next").unwrap();
    i.add_incoming(&[(int(i32_ty, 0), entry), (next, body)]).unwrap();
    acc.add_incoming(&[(int(i32_ty, 0), entry), (acc_next, body)]).unwrap();
    let more = b.build_icmp(IntPredicate::Ult, next, int(i32_ty, 10), "more").unwrap();
    b.build_cond_br(more, body, exit).unwrap();

    b.position_at_end(exit).unwrap();
    b.build_ret(int(i32_ty, 7)).unwrap();

    let result = AggressiveDcePass.run_on_function(f).unwrap();
    assert_eq!(result.stats.items_transformed, 2);
    assert!(!acc.is_alive());
    assert!(!acc_next.is_alive());
    assert!(i.is_alive());
    module.verify().unwrap();
}

// Dead store elimination

#[test]
fn overwritten_store_is_removed() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let ptr_ty = i32_ty.pointer_type(0).unwrap();
    let (f, b) = function(&module, "f", i32_ty, &[ptr_ty]);
    let p = f.param(0).unwrap();
    let first = b.build_store(int(i32_ty, 1), p).unwrap();
    b.build_store(int(i32_ty, 2), p).unwrap();
    let v = b.build_load(p, "v").unwrap();
    b.build_store(int(i32_ty, 3), p).unwrap();
    b.build_ret(v).unwrap();

    let result = DeadStoreEliminationPass.run_on_function(f).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    assert!(!first.is_alive());
    assert_eq!(
        opcodes(f),
        vec![Opcode::Store, Opcode::Load, Opcode::Store, Opcode::Ret]
    );
}

#[test]
fn write_only_slot_is_removed() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[]);
    let slot = b.build_alloca(i32_ty, "slot").unwrap();
    b.build_store(int(i32_ty, 5), slot).unwrap();
    b.build_ret(int(i32_ty, 0)).unwrap();

    DeadStoreEliminationPass.run_on_function(f).unwrap();
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
}

// GVN

#[test]
fn commuted_expression_reuses_the_dominating_value() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, b) = function(&module, "f", i32_ty, &[i32_ty, i32_ty]);
    let (x, y) = (f.param(0).unwrap(), f.param(1).unwrap());
    let a = b.build_add(x, y, "a").unwrap();
    let c = b.build_add(y, x, "c").unwrap();
    let product = b.build_mul(a, c, "product").unwrap();
    b.build_ret(product).unwrap();

    let result = GvnPass.run_on_function(f).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    assert!(!c.is_alive());
    assert_eq!(product.operands().unwrap(), vec![a, a]);
}

#[test]
fn sibling_branches_do_not_share_values() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[i32_ty, ctx.i1_type()]);
    let (x, cond) = (f.param(0).unwrap(), f.param(1).unwrap());
    let then = f.append_basic_block("then").unwrap();
    let other = f.append_basic_block("other").unwrap();
    b.build_cond_br(cond, then, other).unwrap();

    b.position_at_end(then).unwrap();
    let left = b.build_mul(x, x, "left").unwrap();
    b.build_ret(left).unwrap();
    b.position_at_end(other).unwrap();
    let right = b.build_mul(x, x, "right").unwrap();
    b.build_ret(right).unwrap();

    assert!(!GvnPass.run_on_function(f).unwrap().changed);
    assert!(right.is_alive());
}

// CFG simplification

#[test]
fn constant_branch_folds_to_a_single_block() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[]);
    let taken = f.append_basic_block("taken").unwrap();
    let skipped = f.append_basic_block("skipped").unwrap();
    let join = f.append_basic_block("join").unwrap();
    b.build_cond_br(ctx.i1_type().const_int(1, false).unwrap(), taken, skipped).unwrap();

    b.position_at_end(taken).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(skipped).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(join).unwrap();
    let phi = b.build_phi(i32_ty, "r").unwrap();
    phi.add_incoming(&[(int(i32_ty, 1), taken), (int(i32_ty, 2), skipped)]).unwrap();
    b.build_ret(phi).unwrap();

    assert!(CfgSimplificationPass.run_on_function(f).unwrap().changed);
    assert_eq!(f.count_basic_blocks().unwrap(), 1);
    assert_eq!(returned(f).const_int_zext_value().unwrap(), 1);
    module.verify().unwrap();
}

#[test]
fn forwarding_blocks_are_bypassed() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[ctx.i1_type()]);
    let hop = f.append_basic_block("hop").unwrap();
    let exit = f.append_basic_block("exit").unwrap();
    b.build_cond_br(f.param(0).unwrap(), hop, exit).unwrap();
    b.position_at_end(hop).unwrap();
    b.build_br(exit).unwrap();
    b.position_at_end(exit).unwrap();
    b.build_ret(int(i32_ty, 3)).unwrap();

    CfgSimplificationPass.run_on_function(f).unwrap();
    assert_eq!(f.count_basic_blocks().unwrap(), 1);
    assert_eq!(opcodes(f), vec![Opcode::Ret]);
    module.verify().unwrap();
}

#[test]
fn constant_switch_takes_the_matching_case() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[]);
    let default = f.append_basic_block("default").unwrap();
    let two = f.append_basic_block("two").unwrap();
    let switch = b.build_switch(int(i32_ty, 2), default).unwrap();
    switch.add_case(int(i32_ty, 2), two).unwrap();
    b.position_at_end(default).unwrap();
    b.build_ret(int(i32_ty, 0)).unwrap();
    b.position_at_end(two).unwrap();
    b.build_ret(int(i32_ty, 20)).unwrap();

    CfgSimplificationPass.run_on_function(f).unwrap();
    assert_eq!(f.count_basic_blocks().unwrap(), 1);
    assert_eq!(returned(f).const_int_zext_value().unwrap(), 20);
    module.verify().unwrap();
}

// mem2reg

#[test]
fn diamond_slot_becomes_a_phi() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[i32_ty]);
    let x = f.param(0).unwrap();
    let then = f.append_basic_block("then").unwrap();
    let other = f.append_basic_block("other").unwrap();
    let join = f.append_basic_block("join").unwrap();
    let slot = b.build_alloca(i32_ty, "v").unwrap();
    b.build_store(int(i32_ty, 0), slot).unwrap();
    let positive = b.build_icmp(IntPredicate::Sgt, x, int(i32_ty, 0), "positive").unwrap();
    b.build_cond_br(positive, then, other).unwrap();

    b.position_at_end(then).unwrap();
    b.build_store(int(i32_ty, 1), slot).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(other).unwrap();
    b.build_store(int(i32_ty, 2), slot).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(join).unwrap();
    let v = b.build_load(slot, "v").unwrap();
    b.build_ret(v).unwrap();

    let result = PromoteMemoryToRegisterPass.run_on_function(f).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    let ops = opcodes(f);
    assert!(!ops.contains(&Opcode::Alloca));
    assert!(!ops.contains(&Opcode::Load));
    assert!(!ops.contains(&Opcode::Store));

    let phi = returned(f);
    assert_eq!(phi.opcode().unwrap(), Opcode::Phi);
    assert_eq!(phi.count_incoming().unwrap(), 2);
    module.verify().unwrap();
}

#[test]
fn loop_counter_in_memory_is_promoted() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let (f, mut b) = function(&module, "f", i32_ty, &[]);
    let header = f.append_basic_block("header").unwrap();
    let body = f.append_basic_block("body").unwrap();
    let exit = f.append_basic_block("exit").unwrap();
    let slot = b.build_alloca(i32_ty, "i").unwrap();
    b.build_store(int(i32_ty, 0), slot).unwrap();
    b.build_br(header).unwrap();

    b.position_at_end(header).unwrap();
    let i = b.build_load(slot, "i.cur").unwrap();
    let more = b.build_icmp(IntPredicate::Slt, i, int(i32_ty, 4), "more").unwrap();
    b.build_cond_br(more, body, exit).unwrap();
    b.position_at_end(body).unwrap();
    let i = b.build_load(slot, "i.body").unwrap();
    let next = b.build_add(i, int(i32_ty, 1), "next").unwrap();
    b.build_store(next, slot).unwrap();
    b.build_br(header).unwrap();
    b.position_at_end(exit).unwrap();
    let done = b.build_load(slot, "i.done").unwrap();
    b.build_ret(done).unwrap();

    PromoteMemoryToRegisterPass.run_on_function(f).unwrap();
    let first = header.first_instruction().unwrap();
    assert_eq!(first.opcode().unwrap(), Opcode::Phi);
    assert_eq!(returned(f), first);
    module.verify().unwrap();
}

#[test]
fn escaping_slot_stays_in_memory() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let ptr_ty = i32_ty.pointer_type(0).unwrap();
    let sink = module
        .add_function("sink", ctx.function_type(ctx.void_type(), &[ptr_ty], false).unwrap())
        .unwrap();
    let (f, b) = function(&module, "f", i32_ty, &[]);
    let slot = b.build_alloca(i32_ty, "slot").unwrap();
    b.build_store(int(i32_ty, 9), slot).unwrap();
    b.build_call(sink, &[slot], "").unwrap();
    let v = b.build_load(slot, "v").unwrap();
    b.build_ret(v).unwrap();

    assert!(!PromoteMemoryToRegisterPass.run_on_function(f).unwrap().changed);
    assert!(slot.is_alive());
}

// Module passes

#[test]
fn global_dce_keeps_only_what_roots_reach() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();

    let kept = module.add_global(i32_ty, "kept").unwrap();
    kept.set_initializer(Some(int(i32_ty, 1))).unwrap();
    kept.set_linkage(Linkage::Internal).unwrap();
    let unused = module.add_global(i32_ty, "unused").unwrap();
    unused.set_initializer(Some(int(i32_ty, 2))).unwrap();
    unused.set_linkage(Linkage::Internal).unwrap();

    let (live, b) = function(&module, "live", i32_ty, &[]);
    live.set_linkage(Linkage::Internal).unwrap();
    let v = b.build_load(kept, "v").unwrap();
    b.build_ret(v).unwrap();

    // `ping` and `pong` only call each other.
    let (ping, ping_b) = function(&module, "ping", i32_ty, &[]);
    let (pong, pong_b) = function(&module, "pong", i32_ty, &[]);
    ping.set_linkage(Linkage::Internal).unwrap();
    pong.set_linkage(Linkage::Internal).unwrap();
    let r = ping_b.build_call(pong, &[], "r").unwrap();
    ping_b.build_ret(r).unwrap();
    let r = pong_b.build_call(ping, &[], "r").unwrap();
    pong_b.build_ret(r).unwrap();

    let (main, b) = function(&module, "main", i32_ty, &[]);
    let r = b.build_call(live, &[], "r").unwrap();
    b.build_ret(r).unwrap();

    let result = GlobalDcePass.run_on_module(*module).unwrap();
    assert_eq!(result.stats.items_transformed, 3);
    assert!(module.get_function("ping").is_none());
    assert!(module.get_function("pong").is_none());
    assert!(module.get_global("unused").is_none());
    assert_eq!(module.get_function("live"), Some(live));
    assert_eq!(module.get_function("main"), Some(main));
    assert_eq!(module.get_global("kept"), Some(kept));
    module.verify().unwrap();
}

#[test]
fn unused_prototypes_are_stripped() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let proto = ctx.function_type(i32_ty, &[], false).unwrap();
    module.add_function("unused", proto).unwrap();
    let used = module.add_function("used", proto).unwrap();
    let (_, b) = function(&module, "main", i32_ty, &[]);
    let r = b.build_call(used, &[], "r").unwrap();
    b.build_ret(r).unwrap();

    let result = StripDeadPrototypesPass.run_on_module(*module).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    assert!(module.get_function("unused").is_none());
    assert!(module.get_function("used").is_some());
}

#[test]
fn identical_internal_constants_merge() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let constant = |name: &str| {
        let g = module.add_global(i32_ty, name).unwrap();
        g.set_initializer(Some(int(i32_ty, 42))).unwrap();
        g.set_global_constant(true).unwrap();
        g.set_linkage(Linkage::Private).unwrap();
        g
    };
    let first = constant("first");
    let second = constant("second");

    let (_, b) = function(&module, "main", i32_ty, &[]);
    let x = b.build_load(first, "x").unwrap();
    let y = b.build_load(second, "y").unwrap();
    let sum = b.build_add(x, y, "sum").unwrap();
    b.build_ret(sum).unwrap();

    let result = ConstantMergePass.run_on_module(*module).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    assert!(module.get_global("second").is_none());
    assert_eq!(y.operand(0).unwrap(), first);
    module.verify().unwrap();
}

#[test]
fn internalize_spares_main_and_declarations() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let ext = module
        .add_function("ext", ctx.function_type(i32_ty, &[], false).unwrap())
        .unwrap();
    let (helper, b) = function(&module, "helper", i32_ty, &[]);
    b.build_ret(int(i32_ty, 1)).unwrap();
    let (main, b) = function(&module, "main", i32_ty, &[]);
    let r = b.build_call(ext, &[], "r").unwrap();
    b.build_ret(r).unwrap();

    let result = InternalizePass::new(true).run_on_module(*module).unwrap();
    assert_eq!(result.stats.items_transformed, 1);
    assert_eq!(helper.linkage().unwrap(), Linkage::Internal);
    assert_eq!(main.linkage().unwrap(), Linkage::External);
    assert_eq!(ext.linkage().unwrap(), Linkage::External);

    InternalizePass::new(false).run_on_module(*module).unwrap();
    assert_eq!(main.linkage().unwrap(), Linkage::Internal);
}

#[test]
fn verifier_pass_reports_malformed_functions() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let f = module
        .add_function("f", ctx.function_type(ctx.void_type(), &[], false).unwrap())
        .unwrap();
    f.append_basic_block("entry").unwrap();
    assert!(matches!(
        VerifierPass.run_on_function(f),
        Err(crate::Error::Ir(kiln_ir::Error::Verification { .. }))
    ));
}
