use pretty_assertions::assert_eq;

use super::*;
use crate::attributes::Linkage;
use crate::module::Module;
use crate::opcode::IntPredicate;
use crate::types::Type;

/// `i32 f(i32, i1)` with one `entry` block.
fn function(ctx: &Context) -> (Module<'_>, Value<'_>, BasicBlock<'_>) {
    let module = ctx.create_module("m");
    let fn_ty = ctx
        .function_type(ctx.i32_type(), &[ctx.i32_type(), ctx.i1_type()], false)
        .unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    let entry = f.append_basic_block("entry").unwrap();
    (module, f, entry)
}

fn opcodes(block: BasicBlock<'_>) -> Vec<Opcode> {
    block
        .instructions()
        .unwrap()
        .into_iter()
        .map(|i| i.opcode().unwrap())
        .collect()
}

// Positioning

#[test]
fn new_builders_are_unpositioned() {
    let ctx = Context::new();
    let (_module, f, _entry) = function(&ctx);
    let builder = ctx.create_builder();
    assert_eq!(builder.position(), Position::Unpositioned);
    assert_eq!(builder.insert_block(), None);
    let a = f.param(0).unwrap();
    assert_eq!(builder.build_add(a, a, "x").unwrap_err(), Error::BuilderUnpositioned);
    assert_eq!(builder.build_ret_void().unwrap_err(), Error::BuilderUnpositioned);
}

#[test]
fn position_transitions() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    assert_eq!(builder.position(), Position::AtEnd(entry));
    assert_eq!(builder.insert_block(), Some(entry));

    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    builder.position_before(x).unwrap();
    assert_eq!(builder.position(), Position::Before(x));
    assert_eq!(builder.insert_block(), Some(entry));

    builder.clear_insertion_position();
    assert_eq!(builder.position(), Position::Unpositioned);
    assert_eq!(builder.build_add(a, a, "y").unwrap_err(), Error::BuilderUnpositioned);

    builder.position_in(entry, None).unwrap();
    assert_eq!(builder.position(), Position::AtEnd(entry));
    builder.position_in(entry, Some(x)).unwrap();
    assert_eq!(builder.position(), Position::Before(x));
}

#[test]
fn positioning_rejects_bad_targets() {
    let ctx = Context::new();
    let other = Context::new();
    let (_module, f, entry) = function(&ctx);
    let (_other_module, _g, foreign) = function(&other);
    let mut builder = ctx.create_builder();
    assert_eq!(builder.position_at_end(foreign).unwrap_err(), Error::ContextMismatch);

    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    x.remove_from_parent().unwrap();
    assert!(builder.position_before(x).is_err());
    assert_eq!(builder.position(), Position::AtEnd(entry));

    let second = f.append_basic_block("second").unwrap();
    let y = builder.build_add(a, a, "y").unwrap();
    assert!(builder.position_in(second, Some(y)).is_err());
}

#[test]
fn deleting_the_block_unpositions_the_builder() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let extra = f.append_basic_block("extra").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(extra).unwrap();
    extra.delete().unwrap();
    let a = f.param(0).unwrap();
    assert_eq!(builder.build_add(a, a, "x").unwrap_err(), Error::Disposed);
    assert_eq!(entry.count_instructions().unwrap(), 0);
}

// Insertion order

#[test]
fn builds_appear_in_call_order() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let ret = builder.build_ret(x).unwrap();

    builder.position_before(ret).unwrap();
    let y = builder.build_mul(x, a, "y").unwrap();
    let z = builder.build_sub(y, a, "z").unwrap();
    assert_eq!(entry.instructions().unwrap(), vec![x, y, z, ret]);
    assert_eq!(builder.position(), Position::Before(ret));
}

#[test]
fn detached_instructions_can_be_reinserted() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let x = builder.build_add(a, a, "x").unwrap();
    let y = builder.build_mul(a, a, "y").unwrap();

    x.remove_from_parent().unwrap();
    assert_eq!(x.instruction_parent().unwrap(), None);
    assert_eq!(entry.instructions().unwrap(), vec![y]);
    assert!(builder.insert(y).is_err());

    builder.insert_with_name(x, "moved").unwrap();
    assert_eq!(entry.instructions().unwrap(), vec![y, x]);
    assert_eq!(x.name().unwrap(), "moved");
}

#[test]
fn failed_builds_create_nothing() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let before = ctx.value_count();
    let a = f.param(0).unwrap();
    let wide = ctx.i64_type().const_int(1, false).unwrap();
    let after_const = ctx.value_count();
    assert_eq!(after_const, before + 1);

    assert!(matches!(
        builder.build_add(a, wide, "bad").unwrap_err(),
        Error::TypeMismatch { .. }
    ));
    assert!(builder.build_load(a, "bad").is_err());
    assert!(builder.build_store(wide, a).is_err());
    assert_eq!(ctx.value_count(), after_const);
    assert_eq!(entry.count_instructions().unwrap(), 0);
}

#[test]
fn builder_does_not_fold() {
    let ctx = Context::new();
    let (_module, _f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let two = ctx.i32_type().const_int(2, false).unwrap();
    let sum = builder.build_add(two, two, "sum").unwrap();
    assert!(sum.is_instruction());
    assert_eq!(opcodes(entry), vec![Opcode::Add]);
}

// Type rules

#[test]
fn returns_match_the_function() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    assert!(matches!(
        builder.build_ret_void().unwrap_err(),
        Error::TypeMismatch { .. }
    ));
    let flag = f.param(1).unwrap();
    assert!(builder.build_ret(flag).is_err());
    let ret = builder.build_ret(f.param(0).unwrap()).unwrap();
    assert!(ret.is_terminator());
    assert_eq!(ret.type_of().unwrap(), ctx.void_type());
}

#[test]
fn branches_need_an_i1_condition() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let [then, otherwise] = ["then", "else"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    assert!(builder.build_cond_br(f.param(0).unwrap(), then, otherwise).is_err());
    let br = builder
        .build_cond_br(f.param(1).unwrap(), then, otherwise)
        .unwrap();
    assert_eq!(br.num_operands().unwrap(), 3);
    assert_eq!(entry.successors(), vec![then, otherwise]);
}

#[test]
fn comparisons_and_selects() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let zero = ctx.i32_type().const_int(0, false).unwrap();
    let neg = builder.build_icmp(IntPredicate::Slt, a, zero, "neg").unwrap();
    assert_eq!(neg.type_of().unwrap(), ctx.i1_type());
    assert_eq!(neg.icmp_predicate().unwrap(), IntPredicate::Slt);

    let abs = builder.build_neg(a, "minus").unwrap();
    let picked = builder.build_select(neg, abs, a, "abs").unwrap();
    assert_eq!(picked.type_of().unwrap(), ctx.i32_type());
    assert!(builder.build_select(a, abs, a, "bad").is_err());
    assert!(builder
        .build_select(neg, abs, ctx.i64_type().const_int(0, false).unwrap(), "bad")
        .is_err());
}

#[test]
fn calls_check_arguments() {
    let ctx = Context::new();
    let (module, f, entry) = function(&ctx);
    let printf_ty = ctx
        .function_type(
            ctx.i32_type(),
            &[ctx.i8_type().ptr_type().unwrap()],
            true,
        )
        .unwrap();
    let printf = module.add_function("printf", printf_ty).unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();

    let format = builder.build_global_string_ptr("%d\n", "fmt").unwrap();
    let call = builder.build_call(printf, &[format, a], "n").unwrap();
    assert_eq!(call.called_value().unwrap(), printf);
    assert_eq!(call.type_of().unwrap(), ctx.i32_type());

    assert!(builder.build_call(printf, &[], "bad").is_err());
    assert!(builder.build_call(printf, &[a], "bad").is_err());
    assert!(builder.build_call(a, &[], "bad").is_err());
}

#[test]
fn void_results_are_never_named() {
    let ctx = Context::new();
    let (module, _f, entry) = function(&ctx);
    let void_ty = ctx.function_type(ctx.void_type(), &[], false).unwrap();
    let g = module.add_function("g", void_ty).unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let call = builder.build_call(g, &[], "ignored").unwrap();
    assert_eq!(call.name().unwrap(), "");
}

// Memory

#[test]
fn stack_slots() {
    let ctx = Context::new();
    let (_module, _f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let pair = ctx
        .struct_type(&[ctx.i32_type(), ctx.double_type()], false)
        .unwrap();
    let slot = builder.build_alloca(pair, "slot").unwrap();
    assert_eq!(slot.type_of().unwrap(), pair.ptr_type().unwrap());
    assert_eq!(slot.allocated_type().unwrap(), pair);
    assert_eq!(slot.operand(0).unwrap().const_int_zext_value().unwrap(), 1);

    let field = builder.build_struct_gep(slot, 1, "field").unwrap();
    assert_eq!(field.type_of().unwrap(), ctx.double_type().ptr_type().unwrap());
    assert!(field.is_in_bounds().unwrap());
    assert!(builder.build_struct_gep(field, 0, "bad").is_err());

    let opaque = ctx.named_struct_type("opaque");
    assert!(builder.build_alloca(opaque, "bad").is_err());
}

#[test]
fn heap_allocation_declares_runtime_functions() {
    let ctx = Context::new();
    let (module, _f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let cell = builder.build_malloc(ctx.i64_type(), "cell").unwrap();
    assert_eq!(cell.type_of().unwrap(), ctx.i64_type().ptr_type().unwrap());
    builder.build_free(cell).unwrap();
    builder.build_malloc(ctx.i32_type(), "again").unwrap();

    let malloc = module.get_function("malloc").unwrap();
    assert!(malloc.is_declaration().unwrap());
    assert!(module.get_function("free").is_some());
    assert_eq!(module.functions().unwrap().len(), 3);
    assert_eq!(
        opcodes(entry),
        vec![
            Opcode::Call,
            Opcode::BitCast,
            Opcode::BitCast,
            Opcode::Call,
            Opcode::Call,
            Opcode::BitCast,
        ]
    );
}

#[test]
fn global_strings_are_private_constants() {
    let ctx = Context::new();
    let (module, _f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let text = builder.build_global_string("hi", "greeting").unwrap();
    assert_eq!(module.get_global("greeting"), Some(text));
    assert_eq!(text.linkage().unwrap(), Linkage::Private);
    assert!(text.is_global_constant().unwrap());
    let init = text.initializer().unwrap().unwrap();
    assert_eq!(init.type_of().unwrap(), ctx.i8_type().array_type(3).unwrap());
}

// Conversions

#[test]
fn int_casts_pick_the_opcode() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let cast = |to: Type<'_>, signed| {
        builder
            .build_int_cast(a, to, signed, "")
            .unwrap()
            .opcode()
            .unwrap()
    };
    assert_eq!(cast(ctx.i64_type(), true), Opcode::SExt);
    assert_eq!(cast(ctx.i64_type(), false), Opcode::ZExt);
    assert_eq!(cast(ctx.i8_type(), true), Opcode::Trunc);
    assert_eq!(cast(ctx.i32_type(), true), Opcode::BitCast);
    assert!(builder.build_zext(a, ctx.i16_type(), "bad").is_err());
    assert!(builder.build_trunc(a, ctx.float_type(), "bad").is_err());
}

// Debug locations

#[test]
fn debug_location_is_stamped_on_new_instructions() {
    let ctx = Context::new();
    let (_module, f, entry) = function(&ctx);
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let a = f.param(0).unwrap();
    let plain = builder.build_add(a, a, "plain").unwrap();

    let loc = DebugLoc::new(3, 7);
    builder.set_current_debug_location(Some(loc));
    let located = builder.build_add(a, a, "located").unwrap();
    assert_eq!(located.debug_loc().unwrap(), Some(loc));
    assert_eq!(plain.debug_loc().unwrap(), None);

    builder.set_inst_debug_location(plain).unwrap();
    assert_eq!(plain.debug_loc().unwrap(), Some(loc));

    builder.set_current_debug_location(None);
    assert_eq!(builder.current_debug_location(), None);
    let later = builder.build_add(a, a, "later").unwrap();
    assert_eq!(later.debug_loc().unwrap(), None);
}
