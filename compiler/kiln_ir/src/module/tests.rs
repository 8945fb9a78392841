use pretty_assertions::assert_eq;

use super::*;

fn void_fn(ctx: &Context) -> Type<'_> {
    ctx.function_type(ctx.void_type(), &[], false).unwrap()
}

// Contents

#[test]
fn module_properties() {
    let ctx = Context::new();
    let module = ctx.create_module("props");
    assert_eq!(module.name().unwrap(), "props");
    assert_eq!(module.data_layout().unwrap(), "");
    module.set_data_layout("e-p:64:64").unwrap();
    module.set_target_triple("x86_64-pc-linux-gnu").unwrap();
    module.set_inline_asm("nop").unwrap();
    assert_eq!(module.data_layout().unwrap(), "e-p:64:64");
    assert_eq!(module.target_triple().unwrap(), "x86_64-pc-linux-gnu");
    assert_eq!(module.inline_asm().unwrap(), "nop");
    assert_eq!(module.owner().unwrap(), Owner::Caller);
}

#[test]
fn functions_keep_declaration_order() {
    let ctx = Context::new();
    let module = ctx.create_module("order");
    let a = module.add_function("a", void_fn(&ctx)).unwrap();
    let b = module.add_function("b", void_fn(&ctx)).unwrap();
    assert_eq!(module.functions().unwrap(), vec![a, b]);
    assert_eq!(module.first_function(), Some(a));
    assert_eq!(module.last_function(), Some(b));
    assert_eq!(module.get_function("b"), Some(b));
    assert_eq!(module.get_function("c"), None);
    assert_eq!(a.next_function(), Some(b));
    assert_eq!(b.previous_function(), Some(a));
}

#[test]
fn taken_symbol_names_get_a_suffix() {
    let ctx = Context::new();
    let module = ctx.create_module("names");
    let first = module.add_function("f", void_fn(&ctx)).unwrap();
    let second = module.add_function("f", void_fn(&ctx)).unwrap();
    let global = module.add_global(ctx.i32_type(), "f").unwrap();
    assert_eq!(first.name().unwrap(), "f");
    assert_eq!(second.name().unwrap(), "f.1");
    assert_eq!(global.name().unwrap(), "f.2");
}

#[test]
fn functions_get_one_argument_per_parameter() {
    let ctx = Context::new();
    let module = ctx.create_module("args");
    let fn_ty = ctx
        .function_type(ctx.i32_type(), &[ctx.i32_type(), ctx.double_type()], false)
        .unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    assert_eq!(f.count_params().unwrap(), 2);
    assert_eq!(f.param(1).unwrap().type_of().unwrap(), ctx.double_type());
    assert_eq!(f.type_of().unwrap(), fn_ty.ptr_type().unwrap());
    assert!(f.is_declaration().unwrap());
    assert!(module.add_function("bad", ctx.i32_type()).is_err());
}

#[test]
fn globals_and_aliases() {
    let ctx = Context::new();
    let module = ctx.create_module("globals");
    let g = module.add_global(ctx.i64_type(), "g").unwrap();
    assert_eq!(g.type_of().unwrap(), ctx.i64_type().ptr_type().unwrap());
    assert_eq!(module.globals().unwrap(), vec![g]);
    assert_eq!(module.get_global("g"), Some(g));

    let ptr_ty = ctx.i64_type().ptr_type().unwrap();
    let alias = module.add_alias(ptr_ty, g, "h").unwrap();
    assert_eq!(module.aliases().unwrap(), vec![alias]);
    assert_eq!(module.get_alias("h"), Some(alias));
    assert_eq!(alias.aliasee().unwrap(), g);
    assert!(module
        .add_alias(ctx.i32_type().ptr_type().unwrap(), g, "wrong")
        .is_err());
}

#[test]
fn named_types_are_visible_through_the_module() {
    let ctx = Context::new();
    let module = ctx.create_module("types");
    let node = ctx.named_struct_type("node");
    assert_eq!(module.get_type("node"), Some(node));
}

// Lifetime

#[test]
fn disposal_invalidates_observing_handles() {
    let ctx = Context::new();
    let module = ctx.create_module("gone");
    let handle = module.as_module_ref();
    let f = module.add_function("f", void_fn(&ctx)).unwrap();
    module.dispose();
    assert!(!handle.is_alive());
    assert_eq!(handle.name().unwrap_err(), Error::Disposed);
    assert!(!f.is_alive());
    assert_eq!(ctx.module_count(), 0);
}

#[test]
fn disposal_redirects_outside_references_to_undef() {
    let ctx = Context::new();
    let doomed = ctx.create_module("doomed");
    let keeper = ctx.create_module("keeper");
    let g = doomed.add_global(ctx.i32_type(), "g").unwrap();
    let ptr = keeper.add_global(ctx.i32_type().ptr_type().unwrap(), "p").unwrap();
    ptr.set_initializer(Some(g)).unwrap();

    doomed.dispose();
    let init = ptr.initializer().unwrap().unwrap();
    assert!(init.is_undef());
    assert_eq!(init.type_of().unwrap(), ctx.i32_type().ptr_type().unwrap());
}

#[test]
fn ownership_transfer_checks_the_current_owner() {
    let ctx = Context::new();
    let module = ctx.create_module("owned");
    module
        .transfer_ownership(Owner::Caller, Owner::Engine(7))
        .unwrap();
    assert_eq!(module.owner().unwrap(), Owner::Engine(7));
    assert_eq!(
        module
            .transfer_ownership(Owner::Caller, Owner::Engine(8))
            .unwrap_err(),
        Error::OwnerMismatch {
            expected: Owner::Caller,
            found: Owner::Engine(7),
        }
    );
}

// Intrinsics

#[test]
fn intrinsic_ids_follow_the_name() {
    assert_eq!(intrinsic_id("printf"), 0);
    assert_eq!(intrinsic_id("llvm.memcpy"), 1);
    assert_eq!(intrinsic_id("llvm.memcpy.p0i8.p0i8.i64"), 1);
    assert_eq!(intrinsic_id("llvm.memcpyx"), 0);
    assert_ne!(intrinsic_id("llvm.sqrt.f64"), 0);

    let ctx = Context::new();
    let module = ctx.create_module("intrinsics");
    let trap = module.add_function("llvm.trap", void_fn(&ctx)).unwrap();
    assert_ne!(trap.intrinsic_id().unwrap(), 0);
}
