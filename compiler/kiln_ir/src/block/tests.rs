use pretty_assertions::assert_eq;

use super::*;
use crate::module::Module;

fn void_fn(ctx: &Context) -> (Module<'_>, Value<'_>) {
    let module = ctx.create_module("m");
    let fn_ty = ctx
        .function_type(ctx.void_type(), &[ctx.i1_type()], false)
        .unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    (module, f)
}

fn names(blocks: &[BasicBlock<'_>]) -> Vec<String> {
    blocks.iter().map(|b| b.name().unwrap()).collect()
}

// Layout

#[test]
fn blocks_append_in_order() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let a = f.append_basic_block("a").unwrap();
    let b = ctx.append_basic_block(f, "b").unwrap();
    assert_eq!(f.basic_blocks().unwrap(), vec![a, b]);
    assert_eq!(f.entry_basic_block().unwrap(), a);
    assert_eq!(a.next(), Some(b));
    assert_eq!(b.previous(), Some(a));
    assert_eq!(b.next(), None);
    assert_eq!(a.parent().unwrap(), Some(f));
}

#[test]
fn insert_before_places_a_new_block() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let a = f.append_basic_block("a").unwrap();
    let c = f.append_basic_block("c").unwrap();
    c.insert_before("b").unwrap();
    ctx.insert_basic_block(a, "start").unwrap();
    assert_eq!(names(&f.basic_blocks().unwrap()), ["start", "a", "b", "c"]);
}

#[test]
fn moving_blocks() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let [a, b, c] = ["a", "b", "c"].map(|n| f.append_basic_block(n).unwrap());
    c.move_before(a).unwrap();
    assert_eq!(f.basic_blocks().unwrap(), vec![c, a, b]);
    c.move_after(b).unwrap();
    assert_eq!(f.basic_blocks().unwrap(), vec![a, b, c]);
    a.move_after(a).unwrap();
    assert_eq!(f.basic_blocks().unwrap(), vec![a, b, c]);
}

#[test]
fn detached_blocks_keep_their_contents() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let [a, b] = ["a", "b"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(b).unwrap();
    let ret = builder.build_ret_void().unwrap();

    b.remove_from_parent().unwrap();
    assert_eq!(b.parent().unwrap(), None);
    assert_eq!(f.count_basic_blocks().unwrap(), 1);
    assert_eq!(b.instructions().unwrap(), vec![ret]);
    assert_eq!(b.next(), None);

    b.move_before(a).unwrap();
    assert_eq!(f.basic_blocks().unwrap(), vec![b, a]);
}

// Contents

#[test]
fn instructions_and_terminator() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let entry = f.append_basic_block("entry").unwrap();
    assert_eq!(entry.first_instruction(), None);
    assert_eq!(entry.terminator(), None);

    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let slot = builder.build_alloca(ctx.i32_type(), "slot").unwrap();
    assert_eq!(entry.terminator(), None);
    let ret = builder.build_ret_void().unwrap();
    assert_eq!(entry.count_instructions().unwrap(), 2);
    assert_eq!(entry.first_instruction(), Some(slot));
    assert_eq!(entry.last_instruction(), Some(ret));
    assert_eq!(entry.terminator(), Some(ret));
    assert_eq!(slot.next_instruction(), Some(ret));
    assert_eq!(ret.previous_instruction(), Some(slot));
    assert_eq!(ret.instruction_parent().unwrap(), Some(entry));
}

#[test]
fn edges_follow_terminators() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let [entry, then, join] = ["entry", "then", "join"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    builder
        .build_cond_br(f.param(0).unwrap(), then, then)
        .unwrap();
    builder.position_at_end(then).unwrap();
    builder.build_br(join).unwrap();

    assert_eq!(entry.successors(), vec![then]);
    assert_eq!(then.successors(), vec![join]);
    assert_eq!(join.successors(), vec![]);
    assert_eq!(then.predecessors(), vec![entry]);
    assert_eq!(join.predecessors(), vec![then]);
    assert_eq!(entry.predecessors(), vec![]);
}

// Labels

#[test]
fn label_values_name_the_block() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let entry = f.append_basic_block("entry").unwrap();
    let label = entry.as_value().unwrap();
    assert_eq!(label.type_of().unwrap(), ctx.label_type());
    entry.set_name("start").unwrap();
    assert_eq!(label.name().unwrap(), "start");
    assert_eq!(label.as_basic_block().unwrap(), entry);
}

// Deletion

#[test]
fn delete_refuses_while_branched_to() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let [entry, exit] = ["entry", "exit"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let br = builder.build_br(exit).unwrap();
    builder.position_at_end(exit).unwrap();
    let ret = builder.build_ret_void().unwrap();

    assert!(matches!(exit.delete().unwrap_err(), Error::StillInUse(_)));
    assert!(exit.is_alive());

    br.erase_from_parent().unwrap();
    exit.delete().unwrap();
    assert!(!exit.is_alive());
    assert!(!ret.is_alive());
    assert_eq!(f.basic_blocks().unwrap(), vec![entry]);
}

#[test]
fn delete_refuses_while_values_escape() {
    let ctx = Context::new();
    let (_module, f) = void_fn(&ctx);
    let [entry, exit] = ["entry", "exit"].map(|n| f.append_basic_block(n).unwrap());
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let slot = builder.build_alloca(ctx.i32_type(), "slot").unwrap();
    builder.position_at_end(exit).unwrap();
    builder.build_load(slot, "v").unwrap();

    assert!(entry.delete().is_err());
    exit.delete().unwrap();
    entry.delete().unwrap();
    assert_eq!(f.count_basic_blocks().unwrap(), 0);
}
