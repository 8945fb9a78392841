use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::module::Module;
use crate::opcode::IntPredicate;

/// `i32 f(i32)` with an empty `entry` block and a builder at its end.
fn unary_fn(ctx: &Context) -> (Module<'_>, Value<'_>, crate::Builder<'_>) {
    let module = ctx.create_module("m");
    let fn_ty = ctx
        .function_type(ctx.i32_type(), &[ctx.i32_type()], false)
        .unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    let entry = f.append_basic_block("entry").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    (module, f, builder)
}

fn i32_const(ctx: &Context, value: u64) -> Value<'_> {
    ctx.i32_type().const_int(value, false).unwrap()
}

// Def-use graph

#[test]
fn uses_mirror_operands() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let y = builder.build_mul(x, a, "y").unwrap();

    let uses: Vec<(Value<'_>, usize)> = a.uses().map(|u| (u.user, u.operand_index)).collect();
    assert_eq!(uses, vec![(x, 0), (x, 1), (y, 1)]);
    assert_eq!(a.users(), vec![x, y]);
    assert_eq!(a.count_uses(), 3);
    for u in a.uses() {
        assert_eq!(u.user.operand(u.operand_index).unwrap(), a);
    }
    assert_eq!(x.first_use().map(|u| u.user), Some(y));
    assert!(!y.has_uses());
}

#[test]
fn uses_walk_restarts() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    builder.build_add(a, a, "x").unwrap();
    let mut walk = a.uses();
    walk.next();
    assert_eq!(walk.count(), 1);
    assert_eq!(a.uses().count(), 2);
}

#[test]
fn set_operand_keeps_types_and_edges() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let y = builder.build_mul(x, a, "y").unwrap();

    let wide = ctx.i64_type().const_int(1, false).unwrap();
    assert!(matches!(
        y.set_operand(1, wide).unwrap_err(),
        Error::TypeMismatch { .. }
    ));
    assert_eq!(
        y.set_operand(2, x).unwrap_err(),
        Error::IndexOutOfRange { index: 2, len: 2 }
    );

    y.set_operand(1, x).unwrap();
    assert_eq!(y.operands().unwrap(), vec![x, x]);
    assert_eq!(a.count_uses(), 2);
    assert_eq!(x.count_uses(), 2);
}

#[test]
fn replace_all_uses_is_all_or_nothing() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let y = builder.build_mul(x, x, "y").unwrap();

    let wide = ctx.i64_type().const_int(1, false).unwrap();
    assert!(x.replace_all_uses_with(wide).is_err());
    assert_eq!(x.count_uses(), 2);

    let seven = i32_const(&ctx, 7);
    x.replace_all_uses_with(seven).unwrap();
    assert!(!x.has_uses());
    assert_eq!(y.operands().unwrap(), vec![seven, seven]);
    assert_eq!(seven.users(), vec![y]);
}

#[test]
fn values_from_another_context_are_rejected() {
    let ctx = Context::new();
    let other = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let x = builder.build_add(f.param(0).unwrap(), f.param(0).unwrap(), "x").unwrap();
    let foreign = i32_const(&other, 1);
    assert_eq!(x.set_operand(0, foreign).unwrap_err(), Error::ContextMismatch);
    assert_eq!(x.replace_all_uses_with(foreign).unwrap_err(), Error::ContextMismatch);
}

// Kinds and names

#[test]
fn kinds_classify_values() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let entry = f.entry_basic_block().unwrap();
    let label = entry.as_value().unwrap();

    assert_eq!(a.kind().unwrap(), ValueKind::Argument);
    assert_eq!(f.kind().unwrap(), ValueKind::Global(GlobalKind::Function));
    assert_eq!(x.kind().unwrap(), ValueKind::Instruction(Opcode::Add));
    assert_eq!(label.kind().unwrap(), ValueKind::BasicBlock);
    assert_eq!(
        i32_const(&ctx, 1).kind().unwrap(),
        ValueKind::Constant(ConstantKind::Int)
    );
    assert_eq!(ctx.i32_type().undef().unwrap().kind().unwrap(), ValueKind::Undef);

    assert!(a.is_argument() && f.is_function() && x.is_instruction());
    assert_eq!(label.as_basic_block().unwrap(), entry);
    assert!(matches!(
        x.as_basic_block().unwrap_err(),
        Error::KindMismatch { .. }
    ));
}

#[test]
fn renaming_globals_stays_unique() {
    let ctx = Context::new();
    let (module, f, builder) = unary_fn(&ctx);
    let x = builder.build_add(f.param(0).unwrap(), i32_const(&ctx, 1), "x").unwrap();
    x.set_name("sum").unwrap();
    assert_eq!(x.name().unwrap(), "sum");

    module.add_global(ctx.i8_type(), "g").unwrap();
    f.set_name("g").unwrap();
    assert_eq!(f.name().unwrap(), "g.1");
    f.set_name("g.1").unwrap();
    assert_eq!(f.name().unwrap(), "g.1");
}

// Metadata

#[test]
fn metadata_attaches_by_kind() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let x = builder.build_add(f.param(0).unwrap(), i32_const(&ctx, 1), "x").unwrap();
    let note = ctx.md_kind_id("note");
    let range = ctx.md_kind_id("range");
    assert!(!x.has_metadata());

    x.set_metadata(range, Some(Metadata::Integer(4))).unwrap();
    x.set_metadata(note, Some(Metadata::String("hot".into()))).unwrap();
    x.set_metadata(note, Some(Metadata::String("cold".into()))).unwrap();
    assert_eq!(
        x.metadata(note).unwrap(),
        Some(Metadata::String("cold".into()))
    );
    assert_eq!(
        x.all_metadata().unwrap(),
        vec![
            (note, Metadata::String("cold".into())),
            (range, Metadata::Integer(4)),
        ]
    );

    x.set_metadata(note, None).unwrap();
    x.set_metadata(range, None).unwrap();
    assert!(!x.has_metadata());
}

// Constants

#[test]
fn integer_constants_are_interned_and_range_checked() {
    let ctx = Context::new();
    let i8_ty = ctx.i8_type();
    assert_eq!(i8_ty.const_int(7, false).unwrap(), i8_ty.const_int(7, false).unwrap());
    assert_eq!(
        i8_ty.const_int(256, false).unwrap_err(),
        Error::ConstantOutOfRange {
            value: "256".into(),
            width: 8,
        }
    );

    let minus_one = i8_ty.const_int(u64::MAX, true).unwrap();
    assert_eq!(minus_one.const_int_sext_value().unwrap(), -1);
    assert_eq!(minus_one.const_int_zext_value().unwrap(), 255);
    assert_eq!(i8_ty.const_int(255, false).unwrap(), minus_one);

    let parsed = ctx.i32_type().const_int_of_string("-ff", 16).unwrap();
    assert_eq!(parsed.const_int_sext_value().unwrap(), -255);
    assert!(ctx.i32_type().const_int_of_string("12", 40).is_err());
    assert!(ctx.float_type().const_int(1, false).is_err());
}

#[test]
fn aggregate_constants_check_elements() {
    let ctx = Context::new();
    let one = i32_const(&ctx, 1);
    let two = i32_const(&ctx, 2);
    let array = ctx.i32_type().const_array(&[one, two]).unwrap();
    assert_eq!(array.type_of().unwrap(), ctx.i32_type().array_type(2).unwrap());
    assert_eq!(array.const_elements().unwrap(), vec![one, two]);

    let byte = ctx.i8_type().const_int(1, false).unwrap();
    assert!(ctx.i32_type().const_array(&[one, byte]).is_err());
    assert!(ctx.const_vector(&[]).is_err());

    let text = ctx.const_string(b"ok", true);
    assert_eq!(text.type_of().unwrap(), ctx.i8_type().array_type(2).unwrap());
    assert!(ctx.i32_type().const_null().unwrap().is_null());
}

#[test]
fn constant_expressions_fold_plain_operands() {
    let ctx = Context::new();
    let two = i32_const(&ctx, 2);
    let three = i32_const(&ctx, 3);
    assert_eq!(two.const_add(three).unwrap(), i32_const(&ctx, 5));
    assert_eq!(two.const_sub(three).unwrap().const_int_sext_value().unwrap(), -1);
    assert_eq!(two.const_neg().unwrap().const_int_sext_value().unwrap(), -2);
    assert_eq!(
        two.const_icmp(IntPredicate::Ult, three).unwrap(),
        ctx.i1_type().const_int(1, false).unwrap()
    );
    assert_eq!(
        two.const_zext(ctx.i64_type()).unwrap(),
        ctx.i64_type().const_int(2, false).unwrap()
    );
}

#[test]
fn unfoldable_constant_expressions_stay_symbolic() {
    let ctx = Context::new();
    let module = ctx.create_module("m");
    let g = module.add_global(ctx.i32_type(), "g").unwrap();
    let addr = g.const_ptrtoint(ctx.i64_type()).unwrap();
    assert_eq!(addr.kind().unwrap(), ValueKind::Constant(ConstantKind::Expr(Opcode::PtrToInt)));
    assert_eq!(addr.operand(0).unwrap(), g);

    let zero = i32_const(&ctx, 0);
    let quotient = i32_const(&ctx, 1).const_sdiv(zero).unwrap();
    assert_eq!(quotient.const_opcode().unwrap(), Opcode::SDiv);

    let (_m, f, _builder) = unary_fn(&ctx);
    assert!(f.param(0).unwrap().const_add(zero).is_err());
}

// Instructions

#[test]
fn erase_requires_no_remaining_uses() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let y = builder.build_mul(x, a, "y").unwrap();

    assert!(matches!(x.erase_from_parent().unwrap_err(), Error::StillInUse(_)));
    y.erase_from_parent().unwrap();
    x.erase_from_parent().unwrap();
    assert!(!x.is_alive());
    assert!(!a.has_uses());
    assert_eq!(x.name().unwrap_err(), Error::Disposed);
}

#[test]
fn try_fold_leaves_the_instruction_in_place() {
    let ctx = Context::new();
    let (_module, _f, builder) = unary_fn(&ctx);
    let sum = builder
        .build_add(i32_const(&ctx, 2), i32_const(&ctx, 3), "sum")
        .unwrap();
    assert!(sum.is_instruction());
    assert_eq!(sum.try_fold().unwrap(), Some(i32_const(&ctx, 5)));
    assert!(sum.instruction_parent().unwrap().is_some());

    let quotient = builder
        .build_udiv(i32_const(&ctx, 2), i32_const(&ctx, 0), "q")
        .unwrap();
    assert_eq!(quotient.try_fold().unwrap(), None);
}

#[test]
fn switch_cases_are_unique_constants() {
    let ctx = Context::new();
    let (_module, f, builder) = unary_fn(&ctx);
    let [one, other] = ["one", "other"].map(|n| f.append_basic_block(n).unwrap());
    let switch = builder.build_switch(f.param(0).unwrap(), other).unwrap();
    switch.add_case(i32_const(&ctx, 1), one).unwrap();
    assert!(switch.add_case(i32_const(&ctx, 1), other).is_err());
    assert!(switch.add_case(f.param(0).unwrap(), one).is_err());
    assert!(switch
        .add_case(ctx.i64_type().const_int(2, false).unwrap(), one)
        .is_err());
    assert_eq!(switch.num_operands().unwrap(), 4);
}

#[test]
fn phi_incoming_pairs() {
    let ctx = Context::new();
    let (_module, f, mut builder) = unary_fn(&ctx);
    let entry = f.entry_basic_block().unwrap();
    let join = f.append_basic_block("join").unwrap();
    builder.build_br(join).unwrap();
    builder.position_at_end(join).unwrap();
    let phi = builder.build_phi(ctx.i32_type(), "p").unwrap();
    let a = f.param(0).unwrap();
    phi.add_incoming(&[(a, entry), (i32_const(&ctx, 0), join)]).unwrap();
    assert_eq!(phi.count_incoming().unwrap(), 2);
    assert_eq!(phi.incoming_value(0).unwrap(), a);
    assert_eq!(phi.incoming_block(1).unwrap(), join);

    let wide = ctx.i64_type().const_int(0, false).unwrap();
    assert!(phi.add_incoming(&[(wide, entry)]).is_err());
    assert_eq!(phi.count_incoming().unwrap(), 2);

    assert_eq!(phi.remove_incoming(0).unwrap(), a);
    assert_eq!(phi.count_incoming().unwrap(), 1);
    assert!(!a.has_uses());
}

mod proptest_folding {
    use super::*;

    proptest! {
        #[test]
        fn i8_arithmetic_wraps(a in any::<u8>(), b in any::<u8>()) {
            let ctx = Context::new();
            let i8_ty = ctx.i8_type();
            let x = i8_ty.const_int(u64::from(a), false).unwrap();
            let y = i8_ty.const_int(u64::from(b), false).unwrap();
            let sum = x.const_add(y).unwrap().const_int_zext_value().unwrap();
            let product = x.const_mul(y).unwrap().const_int_zext_value().unwrap();
            prop_assert_eq!(sum, u128::from(a.wrapping_add(b)));
            prop_assert_eq!(product, u128::from(a.wrapping_mul(b)));
        }

        #[test]
        fn folding_agrees_with_comparison(a in any::<i16>(), b in any::<i16>()) {
            let ctx = Context::new();
            let i16_ty = ctx.i16_type();
            let x = i16_ty.const_int(a as u64, true).unwrap();
            let y = i16_ty.const_int(b as u64, true).unwrap();
            let lt = x.const_icmp(IntPredicate::Slt, y).unwrap();
            prop_assert_eq!(lt.const_int_zext_value().unwrap(), u128::from(a < b));
        }
    }
}
