use kiln_ir::{Context, IntPredicate, Module};
use pretty_assertions::assert_eq;

use super::*;

/// `i32 sum(i32, i32)` returning the sum of its parameters.
fn sum_module(ctx: &Context) -> (Module<'_>, Value<'_>) {
    let module = ctx.create_module("sum");
    let i32_ty = ctx.i32_type();
    let fn_ty = ctx.function_type(i32_ty, &[i32_ty, i32_ty], false).unwrap();
    let sum = module.add_function("sum", fn_ty).unwrap();
    let entry = sum.append_basic_block("entry").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    let total = builder
        .build_add(sum.param(0).unwrap(), sum.param(1).unwrap(), "total")
        .unwrap();
    builder.build_ret(total).unwrap();
    (module, sum)
}

fn int(ctx: &Context, value: u64) -> GenericValue {
    GenericValue::of_int(ctx.i32_type(), value, false).unwrap()
}

fn interpreter(module: Module<'_>) -> ExecutionEngine<'_> {
    ExecutionEngine::create_interpreter_for_module(module).unwrap()
}

// Options

#[test]
fn options_validation() {
    let options = EngineOptions {
        kind: EngineKind::Interpreter,
        ..EngineOptions::default()
    };
    assert_eq!(options.validate(), Ok(()));

    let too_high = EngineOptions {
        opt_level: 4,
        ..options.clone()
    };
    assert!(too_high.validate().unwrap_err().contains("optimization level 4"));

    let no_depth = EngineOptions {
        max_call_depth: 0,
        ..options
    };
    assert!(no_depth.validate().is_err());
}

#[test]
fn engine_kind_policies() {
    assert!(EngineKind::Jit.caches_code());
    assert!(EngineKind::Jit.requires_native_target());
    assert!(!EngineKind::Interpreter.caches_code());
    assert!(!EngineKind::Interpreter.requires_native_target());
    assert_eq!(EngineKind::default(), EngineKind::Jit);
}

// Creation and ownership

#[test]
fn creation_takes_ownership() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let handle = module.as_module_ref();
    let engine = interpreter(module);
    assert!(matches!(handle.owner().unwrap(), Owner::Engine(id) if id == engine.id));
    assert_eq!(engine.modules(), vec![handle]);
    drop(engine);
    assert!(!handle.is_alive());
}

#[test]
fn rejected_module_is_handed_back() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let handle = module.as_module_ref();
    let options = EngineOptions {
        kind: EngineKind::Interpreter,
        opt_level: 9,
        ..EngineOptions::default()
    };
    let rejected = ExecutionEngine::with_options(module, options).unwrap_err();
    assert_eq!(rejected.error().class(), kiln_ir::ErrorClass::ConstructionFailure);
    let (error, module) = rejected.into_parts();
    assert!(matches!(error, Error::CreationFailed { .. }));
    assert_eq!(module.as_module_ref(), handle);
    assert_eq!(handle.owner().unwrap(), Owner::Caller);
}

#[test]
fn unverifiable_module_is_rejected() {
    let ctx = Context::new();
    let module = ctx.create_module("broken");
    let fn_ty = ctx.function_type(ctx.void_type(), &[], false).unwrap();
    let f = module.add_function("f", fn_ty).unwrap();
    f.append_basic_block("entry").unwrap();
    let rejected = ExecutionEngine::create_interpreter_for_module(module).unwrap_err();
    assert_eq!(rejected.error().class(), kiln_ir::ErrorClass::VerificationFailure);
}

#[test]
fn modules_can_be_added_and_removed() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let extra = ctx.create_module("extra");
    let extra_ref = extra.as_module_ref();
    engine.add_module(extra).unwrap();
    assert_eq!(engine.modules().len(), 2);

    let back = engine.remove_module(extra_ref).unwrap();
    assert_eq!(back.owner().unwrap(), Owner::Caller);
    assert_eq!(
        engine.remove_module(extra_ref).unwrap_err(),
        Error::Ir(kiln_ir::Error::ModuleNotFound)
    );
}

#[test]
fn modules_of_other_contexts_are_rejected() {
    let ctx = Context::new();
    let other = Context::new();
    let (module, _) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let foreign = other.create_module("foreign");
    let rejected = engine.add_module(foreign).unwrap_err();
    assert_eq!(rejected.error(), &Error::Ir(kiln_ir::Error::ContextMismatch));
}

// Running

#[test]
fn runs_a_function() {
    let ctx = Context::new();
    let (module, sum) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let result = engine.run_function(sum, &[int(&ctx, 2), int(&ctx, 40)]).unwrap();
    assert_eq!(result.to_int(false).unwrap(), 42);
    assert_eq!(engine.find_function("sum").unwrap(), sum);
    assert_eq!(
        engine.find_function("missing").unwrap_err(),
        Error::Ir(kiln_ir::Error::NotFound("missing".to_owned()))
    );
}

#[test]
fn arguments_are_checked() {
    let ctx = Context::new();
    let (module, sum) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let err = engine.run_function(sum, &[int(&ctx, 2)]).unwrap_err();
    assert!(matches!(err, Error::ArgumentMismatch { .. }));

    let wide = GenericValue::of_int(ctx.i64_type(), 2, false).unwrap();
    let err = engine.run_function(sum, &[wide, int(&ctx, 40)]).unwrap_err();
    assert_eq!(err.class(), kiln_ir::ErrorClass::ConstructionFailure);
}

#[test]
fn foreign_functions_are_not_run() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let (other, other_sum) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let err = engine
        .run_function(other_sum, &[int(&ctx, 1), int(&ctx, 1)])
        .unwrap_err();
    assert_eq!(
        err,
        Error::NotOwnedByEngine {
            function: "sum".to_owned()
        }
    );
    assert_eq!(err.class(), kiln_ir::ErrorClass::OwnershipViolation);
    drop(other);
}

// Lowering and caching

#[test]
fn lowering_numbers_params_before_instructions() {
    let ctx = Context::new();
    let module = ctx.create_module("loop");
    let i32_ty = ctx.i32_type();
    let fn_ty = ctx.function_type(i32_ty, &[i32_ty], false).unwrap();
    let f = module.add_function("count", fn_ty).unwrap();
    let entry = f.append_basic_block("entry").unwrap();
    let body = f.append_basic_block("body").unwrap();
    let exit = f.append_basic_block("exit").unwrap();
    let mut builder = ctx.create_builder();
    builder.position_at_end(entry).unwrap();
    builder.build_br(body).unwrap();
    builder.position_at_end(body).unwrap();
    let i = builder.build_phi(i32_ty, "i").unwrap();
    let next = builder
        .build_add(i, i32_ty.const_int(1, false).unwrap(), "next")
        .unwrap();
    let done = builder
        .build_icmp(IntPredicate::Uge, next, f.param(0).unwrap(), "done")
        .unwrap();
    builder.build_cond_br(done, exit, body).unwrap();
    i.add_incoming(&[(i32_ty.const_int(0, false).unwrap(), entry), (next, body)])
        .unwrap();
    builder.position_at_end(exit).unwrap();
    builder.build_ret(next).unwrap();

    let mut engine = interpreter(module);
    let code = engine.lower(f).unwrap();
    assert_eq!(code.params, 1);
    // br, phi, add, icmp, br, ret
    assert_eq!(code.slots, 7);
    assert_eq!(code.blocks.len(), 3);
    assert_eq!(code.blocks[1].phis.len(), 1);
    assert_eq!(code.blocks[1].phis[0].incoming.len(), 2);
    assert_eq!(code.blocks[1].body.len(), 3);

    let result = engine.run_function(f, &[int(&ctx, 5)]).unwrap();
    assert_eq!(result.to_int(false).unwrap(), 5);
}

#[test]
fn jit_caches_until_freed() {
    crate::target::initialize_native_target();
    let ctx = Context::new();
    let (module, sum) = sum_module(&ctx);
    let mut engine = ExecutionEngine::create_jit_compiler_for_module(module, 2).unwrap();
    assert_eq!(engine.kind(), EngineKind::Jit);
    engine.run_function(sum, &[int(&ctx, 1), int(&ctx, 2)]).unwrap();
    assert!(engine.cache.contains_key(&sum));
    assert!(engine.free_machine_code_for_function(sum));
    assert!(!engine.free_machine_code_for_function(sum));

    let address = engine.recompile_and_relink_function(sum).unwrap();
    assert!(engine.cache.contains_key(&sum));
    assert_eq!(engine.pointer_to_global(sum).unwrap(), address);
    assert_eq!(engine.memory().region_kind(address), Some(RegionKind::Code));
}

#[test]
fn interpreter_does_not_cache() {
    let ctx = Context::new();
    let (module, sum) = sum_module(&ctx);
    let mut engine = interpreter(module);
    engine.run_function(sum, &[int(&ctx, 1), int(&ctx, 2)]).unwrap();
    assert!(engine.cache.is_empty());
}

// Globals

#[test]
fn globals_are_allocated_and_initialized_lazily() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let i32_ty = ctx.i32_type();
    let counter = module.add_global(i32_ty, "counter").unwrap();
    counter
        .set_initializer(Some(i32_ty.const_int(7, false).unwrap()))
        .unwrap();
    let mut engine = interpreter(module);
    assert_eq!(engine.memory().count_regions(RegionKind::Global), 0);

    let address = engine.pointer_to_global(counter).unwrap();
    assert_eq!(engine.memory().count_regions(RegionKind::Global), 1);
    assert_eq!(engine.memory().read_uint(address, 4).unwrap(), 7);
    assert_eq!(engine.pointer_to_global(counter).unwrap(), address);
}

#[test]
fn self_referencing_global_points_at_itself() {
    let ctx = Context::new();
    let module = ctx.create_module("cycle");
    let ptr_ty = ctx.i8_type().ptr_type().unwrap().ptr_type().unwrap();
    let slot = module.add_global(ctx.i8_type().ptr_type().unwrap(), "slot").unwrap();
    let cast = slot.const_bitcast(ctx.i8_type().ptr_type().unwrap()).unwrap();
    slot.set_initializer(Some(cast)).unwrap();
    assert_eq!(slot.type_of().unwrap(), ptr_ty);

    let mut engine = interpreter(module);
    let address = engine.pointer_to_global(slot).unwrap();
    assert_eq!(engine.memory().read_uint(address, 8).unwrap(), u128::from(address));
}

#[test]
fn constant_gep_offsets_into_a_global() {
    let ctx = Context::new();
    let module = ctx.create_module("table");
    let i32_ty = ctx.i32_type();
    let array_ty = i32_ty.array_type(4).unwrap();
    let table = module.add_global(array_ty, "table").unwrap();
    table
        .set_initializer(Some(array_ty.const_null().unwrap()))
        .unwrap();
    let zero = i32_ty.const_int(0, false).unwrap();
    let two = i32_ty.const_int(2, false).unwrap();
    let element = table.const_gep(&[zero, two]).unwrap();

    let mut engine = interpreter(module);
    let base = engine.pointer_to_global(table).unwrap();
    assert_eq!(engine.constant(element).unwrap(), Data::Pointer(base + 8));
}

#[test]
fn mapped_function_addresses_are_call_targets() {
    let ctx = Context::new();
    let (module, sum) = sum_module(&ctx);
    let mut engine = interpreter(module);
    engine.add_global_mapping(sum, 0x4000).unwrap();
    assert_eq!(engine.pointer_to_global(sum).unwrap(), 0x4000);
    assert_eq!(engine.code.get(&0x4000), Some(&sum));
}

#[test]
fn undef_evaluates_to_zero() {
    let ctx = Context::new();
    let (module, _) = sum_module(&ctx);
    let mut engine = interpreter(module);
    let undef = ctx.i32_type().undef().unwrap();
    assert_eq!(engine.constant(undef).unwrap(), Data::int(0, 32));
}
