use pretty_assertions::assert_eq;

use super::*;
use crate::value::{ConstantKind, ValueKind};

fn int(s: &mut Store, ty: TypeId, bits: u128) -> ValueId {
    s.const_int(ty, bits)
}

fn vector(s: &mut Store, lane: TypeId, lanes: &[u128]) -> ValueId {
    let ty = s.types.vector(lane, lanes.len() as u32).unwrap();
    let items: Vec<ValueId> = lanes.iter().map(|&bits| s.const_int(lane, bits)).collect();
    s.const_aggregate(ty, AggregateKind::Vector, &items)
}

// Scalars

#[test]
fn integer_binary_ops_wrap_at_width() {
    let mut s = Store::new();
    let a = int(&mut s, TypeTable::I8, 200);
    let b = int(&mut s, TypeTable::I8, 100);
    let sum = fold(&mut s, TypeTable::I8, Opcode::Add, &Extra::None, &[a, b]).unwrap();
    assert_eq!(s.int_value(sum), Some(44));
    let diff = fold(&mut s, TypeTable::I8, Opcode::Sub, &Extra::None, &[b, a]).unwrap();
    assert_eq!(s.int_value(diff), Some(156));
}

#[test]
fn undefined_results_do_not_fold() {
    let mut s = Store::new();
    let one = int(&mut s, TypeTable::I32, 1);
    let zero = int(&mut s, TypeTable::I32, 0);
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::UDiv, &Extra::None, &[one, zero]), None);
    let shift = int(&mut s, TypeTable::I32, 32);
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::Shl, &Extra::None, &[one, shift]), None);
}

#[test]
fn undef_operands() {
    let mut s = Store::new();
    let one = int(&mut s, TypeTable::I32, 1);
    let undef = s.undef(TypeTable::I32);
    let sum = fold(&mut s, TypeTable::I32, Opcode::Add, &Extra::None, &[one, undef]).unwrap();
    assert!(s.is_undef(sum));
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::SDiv, &Extra::None, &[one, undef]), None);
    let widened = fold(&mut s, TypeTable::I64, Opcode::ZExt, &Extra::None, &[undef]).unwrap();
    assert_eq!(s.ty(widened).unwrap(), TypeTable::I64);
    assert!(s.is_undef(widened));
}

#[test]
fn comparisons_produce_i1() {
    let mut s = Store::new();
    let minus_one = int(&mut s, TypeTable::I8, 0xff);
    let one = int(&mut s, TypeTable::I8, 1);
    let signed = fold(&mut s, TypeTable::I1, Opcode::ICmp, &Extra::ICmp(IntPredicate::Slt), &[minus_one, one]).unwrap();
    let unsigned = fold(&mut s, TypeTable::I1, Opcode::ICmp, &Extra::ICmp(IntPredicate::Ult), &[minus_one, one]).unwrap();
    assert_eq!(s.int_value(signed), Some(1));
    assert_eq!(s.int_value(unsigned), Some(0));

    let nan = s.const_fp(TypeTable::DOUBLE, f64::NAN);
    let two = s.const_fp(TypeTable::DOUBLE, 2.0);
    let ordered = fold(&mut s, TypeTable::I1, Opcode::FCmp, &Extra::FCmp(FloatPredicate::Olt), &[nan, two]).unwrap();
    let unordered = fold(&mut s, TypeTable::I1, Opcode::FCmp, &Extra::FCmp(FloatPredicate::Ult), &[nan, two]).unwrap();
    assert_eq!(s.int_value(ordered), Some(0));
    assert_eq!(s.int_value(unordered), Some(1));
}

#[test]
fn float_arithmetic() {
    let mut s = Store::new();
    let a = s.const_fp(TypeTable::DOUBLE, 1.5);
    let b = s.const_fp(TypeTable::DOUBLE, 2.25);
    let product = fold(&mut s, TypeTable::DOUBLE, Opcode::FMul, &Extra::None, &[a, b]).unwrap();
    assert_eq!(s.fp_value(product), Some(3.375));
    let negated = fold(&mut s, TypeTable::DOUBLE, Opcode::FNeg, &Extra::None, &[a]).unwrap();
    assert_eq!(s.fp_value(negated), Some(-1.5));
}

// Casts

#[test]
fn integer_casts() {
    let mut s = Store::new();
    let byte = int(&mut s, TypeTable::I8, 0x80);
    let sext = fold(&mut s, TypeTable::I32, Opcode::SExt, &Extra::None, &[byte]).unwrap();
    let zext = fold(&mut s, TypeTable::I32, Opcode::ZExt, &Extra::None, &[byte]).unwrap();
    assert_eq!(s.int_value(sext), Some(0xffff_ff80));
    assert_eq!(s.int_value(zext), Some(0x80));
    let trunc = fold(&mut s, TypeTable::I1, Opcode::Trunc, &Extra::None, &[sext]).unwrap();
    assert_eq!(s.int_value(trunc), Some(0));
}

#[test]
fn float_int_conversions() {
    let mut s = Store::new();
    let minus_seven = int(&mut s, TypeTable::I32, 0xffff_fff9);
    let as_float = fold(&mut s, TypeTable::DOUBLE, Opcode::SIToFP, &Extra::None, &[minus_seven]).unwrap();
    assert_eq!(s.fp_value(as_float), Some(-7.0));
    let back = fold(&mut s, TypeTable::I32, Opcode::FPToSI, &Extra::None, &[as_float]).unwrap();
    assert_eq!(back, minus_seven);

    let huge = s.const_fp(TypeTable::DOUBLE, 1e30);
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::FPToSI, &Extra::None, &[huge]), None);
}

#[test]
fn bitcasts_reinterpret_bits() {
    let mut s = Store::new();
    let one = s.const_fp(TypeTable::FLOAT, 1.0);
    let bits = fold(&mut s, TypeTable::I32, Opcode::BitCast, &Extra::None, &[one]).unwrap();
    assert_eq!(s.int_value(bits), Some(0x3f80_0000));
    let again = fold(&mut s, TypeTable::FLOAT, Opcode::BitCast, &Extra::None, &[bits]).unwrap();
    assert_eq!(again, one);
}

#[test]
fn pointer_casts_only_fold_null() {
    let mut s = Store::new();
    let ptr_ty = s.types.pointer(TypeTable::I8, 0).unwrap();
    let null = s.pointer_null(ptr_ty);
    let addr = fold(&mut s, TypeTable::I64, Opcode::PtrToInt, &Extra::None, &[null]).unwrap();
    assert_eq!(s.int_value(addr), Some(0));
    let nonzero = int(&mut s, TypeTable::I64, 16);
    assert_eq!(fold(&mut s, ptr_ty, Opcode::IntToPtr, &Extra::None, &[nonzero]), None);
}

// Aggregates and vectors

#[test]
fn vectors_fold_lane_by_lane() {
    let mut s = Store::new();
    let a = vector(&mut s, TypeTable::I32, &[1, 2, 3, 4]);
    let b = vector(&mut s, TypeTable::I32, &[10, 20, 30, 40]);
    let ty = s.ty(a).unwrap();
    let sum = fold(&mut s, ty, Opcode::Add, &Extra::None, &[a, b]).unwrap();
    let expected = vector(&mut s, TypeTable::I32, &[11, 22, 33, 44]);
    assert_eq!(sum, expected);
}

#[test]
fn vector_element_access() {
    let mut s = Store::new();
    let v = vector(&mut s, TypeTable::I32, &[5, 6, 7]);
    let two = int(&mut s, TypeTable::I32, 2);
    let lane = fold(&mut s, TypeTable::I32, Opcode::ExtractElement, &Extra::None, &[v, two]).unwrap();
    assert_eq!(s.int_value(lane), Some(7));

    let nine = int(&mut s, TypeTable::I32, 9);
    let ty = s.ty(v).unwrap();
    let updated = fold(&mut s, ty, Opcode::InsertElement, &Extra::None, &[v, nine, two]).unwrap();
    let expected = vector(&mut s, TypeTable::I32, &[5, 6, 9]);
    assert_eq!(updated, expected);

    let out_of_range = int(&mut s, TypeTable::I32, 3);
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::ExtractElement, &Extra::None, &[v, out_of_range]), None);
}

#[test]
fn shuffles_pick_from_both_inputs() {
    let mut s = Store::new();
    let a = vector(&mut s, TypeTable::I32, &[1, 2]);
    let b = vector(&mut s, TypeTable::I32, &[3, 4]);
    let mask = vector(&mut s, TypeTable::I32, &[3, 0, 2]);
    let ty = s.types.vector(TypeTable::I32, 3).unwrap();
    let shuffled = fold(&mut s, ty, Opcode::ShuffleVector, &Extra::None, &[a, b, mask]).unwrap();
    let expected = vector(&mut s, TypeTable::I32, &[4, 1, 3]);
    assert_eq!(shuffled, expected);
}

#[test]
fn struct_values_expand_zero_initializers() {
    let mut s = Store::new();
    let ty = s.types.literal_struct(&[TypeTable::I32, TypeTable::I8], false).unwrap();
    let zero = s.null_value(ty);
    let field = fold(&mut s, TypeTable::I8, Opcode::ExtractValue, &Extra::Indices(vec![1]), &[zero]).unwrap();
    assert_eq!(s.int_value(field), Some(0));

    let seven = int(&mut s, TypeTable::I8, 7);
    let updated = fold(&mut s, ty, Opcode::InsertValue, &Extra::Indices(vec![1]), &[zero, seven]).unwrap();
    let first = s.const_int(TypeTable::I32, 0);
    assert_eq!(s.value(updated).unwrap().operands.as_slice(), &[first, seven]);
}

#[test]
fn select_picks_by_condition() {
    let mut s = Store::new();
    let t = int(&mut s, TypeTable::I1, 1);
    let a = int(&mut s, TypeTable::I32, 1);
    let b = int(&mut s, TypeTable::I32, 2);
    assert_eq!(fold(&mut s, TypeTable::I32, Opcode::Select, &Extra::None, &[t, a, b]), Some(a));
}

// Expressions

#[test]
fn unfoldable_operations_become_expressions() {
    let mut s = Store::new();
    let one = int(&mut s, TypeTable::I32, 1);
    let zero = int(&mut s, TypeTable::I32, 0);
    let expr = build_constant(&mut s, TypeTable::I32, Opcode::SDiv, ArithFlags::EXACT, Extra::None, &[one, zero]);
    assert_eq!(
        s.kind(expr).unwrap(),
        ValueKind::Constant(ConstantKind::Expr(Opcode::SDiv))
    );
    let again = build_constant(&mut s, TypeTable::I32, Opcode::SDiv, ArithFlags::EXACT, Extra::None, &[one, zero]);
    assert_eq!(expr, again);
    let folded = build_constant(&mut s, TypeTable::I32, Opcode::Add, ArithFlags::empty(), Extra::None, &[one, one]);
    assert_eq!(s.int_value(folded), Some(2));
}
