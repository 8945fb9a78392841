use pretty_assertions::assert_eq;

use crate::attributes::Linkage;
use crate::context::Context;
use crate::error::Error;
use crate::module::Module;
use crate::value::Value;
use crate::BasicBlock;

/// `i32 f(i32 %a, i1 %c)` with blocks `entry`, `then`, `else`, `join`.
struct Diamond<'ctx> {
    module: Module<'ctx>,
    f: Value<'ctx>,
    blocks: [BasicBlock<'ctx>; 4],
}

fn diamond(ctx: &Context) -> Diamond<'_> {
    let module = ctx.create_module("verify");
    let i32_ty = ctx.i32_type();
    let fn_ty = ctx
        .function_type(i32_ty, &[i32_ty, ctx.i1_type()], false)
        .unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    let blocks = ["entry", "then", "else", "join"].map(|name| ctx.append_basic_block(f, name).unwrap());
    Diamond { module, f, blocks }
}

fn diagnostic(err: Error) -> String {
    match err {
        Error::Verification { diagnostic } => diagnostic,
        other => panic!("expected a verification error, got {other:?}"),
    }
}

#[test]
fn well_formed_diamond_verifies() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let [entry, then, other, join] = d.blocks;
    let mut b = ctx.create_builder();

    b.position_at_end(entry).unwrap();
    let a = d.f.param(0).unwrap();
    let c = d.f.param(1).unwrap();
    b.build_cond_br(c, then, other).unwrap();

    b.position_at_end(then).unwrap();
    let one = ctx.i32_type().const_int(1, false).unwrap();
    let inc = b.build_add(a, one, "inc").unwrap();
    b.build_br(join).unwrap();

    b.position_at_end(other).unwrap();
    b.build_br(join).unwrap();

    b.position_at_end(join).unwrap();
    let phi = b.build_phi(ctx.i32_type(), "r").unwrap();
    phi.add_incoming(&[(inc, then), (a, other)]).unwrap();
    b.build_ret(phi).unwrap();

    d.module.verify().unwrap();
    d.f.verify_function().unwrap();
}

#[test]
fn missing_terminator_is_reported() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let mut b = ctx.create_builder();
    b.position_at_end(d.blocks[0]).unwrap();
    let a = d.f.param(0).unwrap();
    b.build_add(a, a, "twice").unwrap();

    let text = diagnostic(d.module.verify().unwrap_err());
    assert!(text.contains("@f: block %entry does not end with a terminator"), "{text}");
    assert!(text.contains("block %then is empty"), "{text}");
}

#[test]
fn all_problems_are_collected() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let text = diagnostic(d.module.verify().unwrap_err());
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn use_outside_dominated_region_is_reported() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let [entry, then, other, join] = d.blocks;
    let mut b = ctx.create_builder();
    let a = d.f.param(0).unwrap();

    b.position_at_end(entry).unwrap();
    b.build_cond_br(d.f.param(1).unwrap(), then, other).unwrap();
    b.position_at_end(then).unwrap();
    let inc = b.build_add(a, a, "inc").unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(other).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(join).unwrap();
    b.build_ret(inc).unwrap();

    let text = diagnostic(d.f.verify_function().unwrap_err());
    assert_eq!(text, "@f: %inc does not dominate its use in unnamed `ret`");
}

#[test]
fn phi_must_cover_every_predecessor() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let [entry, then, other, join] = d.blocks;
    let mut b = ctx.create_builder();
    let a = d.f.param(0).unwrap();

    b.position_at_end(entry).unwrap();
    b.build_cond_br(d.f.param(1).unwrap(), then, other).unwrap();
    b.position_at_end(then).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(other).unwrap();
    b.build_br(join).unwrap();
    b.position_at_end(join).unwrap();
    let phi = b.build_phi(ctx.i32_type(), "r").unwrap();
    phi.add_incoming(&[(a, then)]).unwrap();
    b.build_ret(phi).unwrap();

    let text = diagnostic(d.module.verify().unwrap_err());
    assert_eq!(
        text,
        "@f: phi %r has 1 incoming block(s) but its block has 2 predecessor(s)"
    );
}

#[test]
fn entry_block_may_not_be_a_branch_target() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let [entry, then, other, join] = d.blocks;
    let mut b = ctx.create_builder();
    b.position_at_end(entry).unwrap();
    b.build_br(then).unwrap();
    b.position_at_end(then).unwrap();
    b.build_br(entry).unwrap();
    other.delete().unwrap();
    join.delete().unwrap();

    let text = diagnostic(d.module.verify().unwrap_err());
    assert_eq!(text, "@f: entry block has predecessors");
}

#[test]
fn moved_return_of_the_wrong_type_is_reported() {
    let ctx = Context::new();
    let d = diamond(&ctx);
    let void_fn = d
        .module
        .add_function("g", ctx.function_type(ctx.void_type(), &[], false).unwrap())
        .unwrap();
    let g_entry = ctx.append_basic_block(void_fn, "entry").unwrap();
    let mut b = ctx.create_builder();
    b.position_at_end(g_entry).unwrap();
    let ret_void = b.build_ret_void().unwrap();

    // Move `ret void` into the i32 function.
    ret_void.remove_from_parent().unwrap();
    b.position_at_end(d.blocks[0]).unwrap();
    b.insert(ret_void).unwrap();
    for block in &d.blocks[1..] {
        block.delete().unwrap();
    }
    b.position_at_end(g_entry).unwrap();
    b.build_ret_void().unwrap();

    let text = diagnostic(d.module.verify().unwrap_err());
    assert_eq!(text, "@f: `ret void` in a function returning `i32`");
}

#[test]
fn declarations_need_external_linkage() {
    let ctx = Context::new();
    let module = ctx.create_module("decls");
    let fn_ty = ctx.function_type(ctx.void_type(), &[], false).unwrap();
    let ext = module.add_function("ext", fn_ty).unwrap();
    module.verify().unwrap();

    ext.set_linkage(Linkage::Internal).unwrap();
    let text = diagnostic(module.verify().unwrap_err());
    assert_eq!(text, "@ext: declaration has `internal` linkage");
}

#[test]
fn initializer_must_match_global_type() {
    let ctx = Context::new();
    let module = ctx.create_module("globals");
    let g = module.add_global(ctx.i32_type(), "g").unwrap();
    g.set_initializer(Some(ctx.i32_type().const_int(7, false).unwrap()))
        .unwrap();
    module.verify().unwrap();
}
