use pretty_assertions::assert_eq;

use crate::context::Context;
use crate::opcode::IntPredicate;

use super::write_fp;

fn fp(value: f64) -> String {
    let mut out = String::new();
    write_fp(&mut out, value);
    out
}

// Modules

#[test]
fn sum_function() {
    let ctx = Context::new();
    let module = ctx.create_module("demo");
    let i32_ty = ctx.i32_type();
    let fn_ty = ctx.function_type(i32_ty, &[i32_ty, i32_ty], false).unwrap();
    let sum = module.add_function("sum", fn_ty).unwrap();
    let [a, b] = [0, 1].map(|i| sum.param(i).unwrap());
    a.set_name("a").unwrap();
    b.set_name("b").unwrap();
    let entry = sum.append_basic_block("entry").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let tmp = builder.build_add(a, b, "tmp").unwrap();
    builder.build_ret(tmp).unwrap();

    assert_eq!(
        module.print_to_string().unwrap(),
        "; ModuleID = 'demo'\n\
         \n\
         define i32 @sum(i32 %a, i32 %b) {\n\
         entry:\n  \
           %tmp = add i32 %a, %b\n  \
           ret i32 %tmp\n\
         }\n"
    );
}

#[test]
fn unnamed_locals_are_numbered() {
    let ctx = Context::new();
    let module = ctx.create_module("slots");
    let i32_ty = ctx.i32_type();
    let f = module
        .add_function("inc", ctx.function_type(i32_ty, &[i32_ty], false).unwrap())
        .unwrap();
    let entry = f.append_basic_block("").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let one = i32_ty.const_int(1, false).unwrap();
    let sum = builder.build_nsw_add(f.param(0).unwrap(), one, "").unwrap();
    builder.build_ret(sum).unwrap();

    assert_eq!(
        f.print_to_string().unwrap(),
        "define i32 @inc(i32 %0) {\n\
         1:\n  \
           %2 = add nsw i32 %0, 1\n  \
           ret i32 %2\n\
         }"
    );
}

#[test]
fn header_types_and_globals() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    module.set_target_triple("x86_64-unknown-linux-gnu").unwrap();
    let pair = ctx.named_struct_type("pair");
    pair.set_body(&[ctx.i32_type(), ctx.i8_type()], false).unwrap();
    ctx.named_struct_type("node");
    let g = module.add_global(ctx.i32_type(), "counter").unwrap();
    g.set_initializer(Some(ctx.i32_type().const_int(7, false).unwrap()))
        .unwrap();
    module
        .add_function("ext", ctx.function_type(ctx.void_type(), &[], false).unwrap())
        .unwrap();

    assert_eq!(
        module.print_to_string().unwrap(),
        "; ModuleID = 'm'\n\
         target triple = \"x86_64-unknown-linux-gnu\"\n\
         \n\
         %pair = type { i32, i8 }\n\
         %node = type opaque\n\
         \n\
         @counter = global i32 7\n\
         \n\
         declare void @ext()\n"
    );
}

// Instructions

#[test]
fn branches_and_phis() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let f = module
        .add_function("max", ctx.function_type(i32_ty, &[i32_ty, i32_ty], false).unwrap())
        .unwrap();
    let [a, b] = [0, 1].map(|i| f.param(i).unwrap());
    a.set_name("a").unwrap();
    b.set_name("b").unwrap();
    let [entry, left, join] = ["entry", "left", "join"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let gt = builder.build_icmp(IntPredicate::Sgt, a, b, "gt").unwrap();
    let br = builder.build_cond_br(gt, left, join).unwrap();
    builder.position_at_end(left).unwrap();
    builder.build_br(join).unwrap();
    builder.position_at_end(join).unwrap();
    let phi = builder.build_phi(i32_ty, "m").unwrap();
    phi.add_incoming(&[(a, left), (b, entry)]).unwrap();

    assert_eq!(gt.print_to_string().unwrap(), "%gt = icmp sgt i32 %a, %b");
    assert_eq!(
        br.print_to_string().unwrap(),
        "br i1 %gt, label %left, label %join"
    );
    assert_eq!(
        phi.print_to_string().unwrap(),
        "%m = phi i32 [ %a, %left ], [ %b, %entry ]"
    );
}

#[test]
fn memory_and_calls() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let i32_ty = ctx.i32_type();
    let callee = module
        .add_function("id", ctx.function_type(i32_ty, &[i32_ty], false).unwrap())
        .unwrap();
    let f = module
        .add_function("f", ctx.function_type(ctx.void_type(), &[], false).unwrap())
        .unwrap();
    let entry = f.append_basic_block("entry").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let slot = builder.build_alloca(i32_ty, "slot").unwrap();
    let five = i32_ty.const_int(5, false).unwrap();
    let store = builder.build_store(five, slot).unwrap();
    let load = builder.build_load(slot, "v").unwrap();
    let call = builder.build_call(callee, &[load], "r").unwrap();
    let widened = builder.build_zext(call, ctx.i64_type(), "w").unwrap();

    assert_eq!(slot.print_to_string().unwrap(), "%slot = alloca i32");
    assert_eq!(store.print_to_string().unwrap(), "store i32 5, i32* %slot");
    assert_eq!(load.print_to_string().unwrap(), "%v = load i32* %slot");
    assert_eq!(call.print_to_string().unwrap(), "%r = call i32 @id(i32 %v)");
    assert_eq!(widened.print_to_string().unwrap(), "%w = zext i32 %r to i64");
}

// Constants

#[test]
fn scalar_constants() {
    let ctx = Context::new();
    let i32_ty = ctx.i32_type();
    let minus_three = i32_ty.const_int((-3i64) as u64, true).unwrap();
    assert_eq!(minus_three.print_to_string().unwrap(), "i32 -3");
    let t = ctx.i1_type().const_int(1, false).unwrap();
    assert_eq!(t.print_to_string().unwrap(), "i1 true");
    let half = ctx.double_type().const_real(2.5).unwrap();
    assert_eq!(half.print_to_string().unwrap(), "double 2.500000e+00");
    let null = i32_ty.ptr_type().unwrap().const_pointer_null().unwrap();
    assert_eq!(null.print_to_string().unwrap(), "i32* null");
    assert_eq!(i32_ty.undef().unwrap().print_to_string().unwrap(), "i32 undef");
}

#[test]
fn aggregate_constants() {
    let ctx = Context::new();
    let text = ctx.const_string(b"hi", false);
    assert_eq!(text.print_to_string().unwrap(), "[3 x i8] c\"hi\\00\"");

    let one = ctx.i32_type().const_int(1, false).unwrap();
    let two = ctx.i8_type().const_int(2, false).unwrap();
    let pair = ctx.const_struct(&[one, two], false).unwrap();
    assert_eq!(
        pair.print_to_string().unwrap(),
        "{ i32, i8 } { i32 1, i8 2 }"
    );
    let zero = ctx.struct_type(&[ctx.i32_type()], false).unwrap().const_null().unwrap();
    assert_eq!(zero.print_to_string().unwrap(), "{ i32 } zeroinitializer");
}

#[test]
fn floats_print_exactly_or_as_bits() {
    assert_eq!(fp(0.0), "0.000000e+00");
    assert_eq!(fp(-1.5), "-1.500000e+00");
    assert_eq!(fp(1e-10), "1.000000e-10");
    assert_eq!(fp(f64::INFINITY), "0x7FF0000000000000");
    assert_eq!(fp(1.0 / 3.0), format!("0x{:016X}", (1.0f64 / 3.0).to_bits()));
}

#[test]
fn awkward_names_are_quoted() {
    let mut out = String::new();
    super::write_name(&mut out, '@', "has space");
    assert_eq!(out, "@\"has space\"");
    out.clear();
    super::write_name(&mut out, '%', "x.1");
    assert_eq!(out, "%x.1");
}
