//! Runtime support for external symbols no module defines.
//!
//! Covers the C allocation and memory functions plus the intrinsics the
//! builder emits. Overloaded intrinsics match by prefix, so
//! `llvm.memcpy.p0i8.p0i8.i64` resolves like `llvm.memcpy`.

use super::ExecutionEngine;
use crate::error::{Result, Trap};
use crate::generic_value::Data;

/// `name` is `base` or `base` followed by an overload suffix.
fn matches(name: &str, base: &str) -> bool {
    name.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn arg(args: &[Data], index: usize, name: &str) -> Result<u64> {
    args.get(index)
        .and_then(Data::as_address)
        .ok_or_else(|| Trap::Unsupported(format!("`{name}` argument {index}")).into())
}

fn float_arg(args: &[Data], index: usize, name: &str) -> Result<f64> {
    args.get(index)
        .and_then(Data::as_f64)
        .ok_or_else(|| Trap::Unsupported(format!("`{name}` argument {index}")).into())
}

/// Result of a float intrinsic, in the precision of its first argument.
fn like_first(args: &[Data], value: f64) -> Data {
    match args.first() {
        Some(Data::Float(_)) => Data::Float(value as f32),
        _ => Data::Double(value),
    }
}

type Unary = fn(f64) -> f64;

const UNARY_MATH: [(&str, Unary); 7] = [
    ("llvm.sqrt", f64::sqrt),
    ("llvm.sin", f64::sin),
    ("llvm.cos", f64::cos),
    ("llvm.fabs", f64::abs),
    ("llvm.floor", f64::floor),
    ("llvm.ceil", f64::ceil),
    ("llvm.exp", f64::exp),
];

/// Run builtin `name`, or `None` if there is no such builtin.
pub(super) fn call(engine: &mut ExecutionEngine<'_>, name: &str, args: &[Data]) -> Result<Option<Data>> {
    let memory = &mut engine.memory;
    let result = match name {
        "malloc" => Data::Pointer(memory.allocate(arg(args, 0, name)?, 16)?),
        "calloc" => {
            let size = arg(args, 0, name)?.saturating_mul(arg(args, 1, name)?);
            Data::Pointer(memory.allocate(size, 16)?)
        }
        "free" => {
            let address = arg(args, 0, name)?;
            if address != 0 {
                memory.free(address)?;
            }
            Data::Void
        }
        "abort" | "llvm.trap" => return Err(Trap::Abort.into()),
        "llvm.stacksave" => Data::Pointer(0),
        "llvm.stackrestore" => Data::Void,
        _ if ["memcpy", "llvm.memcpy", "memmove", "llvm.memmove"]
            .iter()
            .any(|base| matches(name, base)) =>
        {
            let dest = arg(args, 0, name)?;
            memory.copy(dest, arg(args, 1, name)?, arg(args, 2, name)?)?;
            Data::Pointer(dest)
        }
        _ if matches(name, "memset") || matches(name, "llvm.memset") => {
            let dest = arg(args, 0, name)?;
            memory.fill(dest, arg(args, 1, name)? as u8, arg(args, 2, name)?)?;
            Data::Pointer(dest)
        }
        _ if matches(name, "llvm.lifetime") || matches(name, "llvm.dbg") => Data::Void,
        _ if matches(name, "llvm.pow") => {
            let value = float_arg(args, 0, name)?.powf(float_arg(args, 1, name)?);
            like_first(args, value)
        }
        _ if matches(name, "llvm.powi") => {
            let exponent = match args.get(1) {
                Some(Data::Int { bits, width }) => kiln_ir::arith::sign_extend(*bits, *width) as i32,
                _ => return Err(Trap::Unsupported(format!("`{name}` argument 1")).into()),
            };
            like_first(args, float_arg(args, 0, name)?.powi(exponent))
        }
        _ => match UNARY_MATH.iter().find(|(base, _)| matches(name, base)) {
            Some((_, f)) => like_first(args, f(float_arg(args, 0, name)?)),
            None => return Ok(None),
        },
    };
    tracing::trace!(builtin = name, "builtin call");
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn overload_suffixes_match() {
        assert!(matches("llvm.memcpy", "llvm.memcpy"));
        assert!(matches("llvm.memcpy.p0i8.p0i8.i64", "llvm.memcpy"));
        assert!(!matches("llvm.memcpyx", "llvm.memcpy"));
        assert!(!matches("llvm.powi.f64", "llvm.pow"));
    }
}
