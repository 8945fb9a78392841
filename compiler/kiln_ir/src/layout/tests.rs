use super::*;
use crate::context::Context;

#[test]
fn default_layout_is_little_endian_64_bit() {
    let layout = DataLayout::parse("").unwrap();
    assert!(!layout.is_big_endian());
    assert_eq!(layout.pointer_size(), 8);
    assert_eq!(layout, DataLayout::default());
}

#[test]
fn parses_common_specs() {
    let layout = DataLayout::parse("E-p:32:32-i64:32-f64:32-a:8-n8:16:32-S128").unwrap();
    assert!(layout.is_big_endian());
    assert_eq!(layout.pointer_size(), 4);
    assert_eq!(layout.to_string(), "E-p:32:32-i64:32-f64:32-a:8-n8:16:32-S128");

    let ctx = Context::new();
    assert_eq!(layout.abi_alignment_of_type(ctx.i64_type()).unwrap(), 4);
    assert_eq!(layout.abi_alignment_of_type(ctx.double_type()).unwrap(), 4);
    let ptr = ctx.i8_type().ptr_type().unwrap();
    assert_eq!(layout.size_of_type(ptr).unwrap(), 4);
}

#[test]
fn rejects_malformed_specs() {
    assert!(DataLayout::parse("q").is_err());
    assert!(DataLayout::parse("p:64").is_err());
    assert!(DataLayout::parse("i32:24").is_err());
    assert!(DataLayout::parse("p:0:8").is_err());
}

// Sizes

#[test]
fn scalar_sizes() {
    let ctx = Context::new();
    let layout = DataLayout::default();
    assert_eq!(layout.size_of_type(ctx.i1_type()).unwrap(), 1);
    assert_eq!(layout.size_of_type(ctx.i32_type()).unwrap(), 4);
    assert_eq!(layout.store_size_of_type(ctx.int_type(24).unwrap()).unwrap(), 3);
    assert_eq!(layout.size_of_type(ctx.int_type(24).unwrap()).unwrap(), 4);
    assert_eq!(layout.size_of_type(ctx.x86_fp80_type()).unwrap(), 16);
    assert_eq!(layout.store_size_of_type(ctx.x86_fp80_type()).unwrap(), 10);
    assert!(layout.size_of_type(ctx.void_type()).is_err());
}

#[test]
fn struct_fields_are_padded_to_alignment() {
    let ctx = Context::new();
    let layout = DataLayout::default();
    let ty = ctx
        .struct_type(&[ctx.i8_type(), ctx.i32_type(), ctx.i8_type()], false)
        .unwrap();
    let fields = layout.struct_layout(ty).unwrap();
    assert_eq!(fields.offsets, vec![0, 4, 8]);
    assert_eq!(fields.size, 12);
    assert_eq!(fields.align, 4);
    assert_eq!(layout.offset_of_element(ty, 1).unwrap(), 4);
    assert_eq!(layout.element_at_offset(ty, 6).unwrap(), 1);
    assert!(layout.offset_of_element(ty, 3).is_err());
}

#[test]
fn packed_structs_have_no_padding() {
    let ctx = Context::new();
    let layout = DataLayout::default();
    let ty = ctx
        .struct_type(&[ctx.i8_type(), ctx.i32_type()], true)
        .unwrap();
    let fields = layout.struct_layout(ty).unwrap();
    assert_eq!(fields.offsets, vec![0, 1]);
    assert_eq!(fields.size, 5);
    assert_eq!(fields.align, 1);
}

#[test]
fn arrays_and_vectors() {
    let ctx = Context::new();
    let layout = DataLayout::default();
    let array = ctx.i16_type().array_type(10).unwrap();
    assert_eq!(layout.size_of_type(array).unwrap(), 20);
    assert_eq!(layout.abi_alignment_of_type(array).unwrap(), 2);
    let vector = ctx.float_type().vector_type(4).unwrap();
    assert_eq!(layout.size_of_type(vector).unwrap(), 16);
    assert_eq!(layout.abi_alignment_of_type(vector).unwrap(), 16);
}

#[test]
fn opaque_structs_have_no_layout() {
    let ctx = Context::new();
    let layout = DataLayout::default();
    let opaque = ctx.named_struct_type("opaque");
    assert!(layout.size_of_type(opaque).is_err());
}
