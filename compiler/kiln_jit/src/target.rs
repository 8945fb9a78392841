//! Process-wide native target initialization.
//!
//! JIT engines require the native target to be initialized once per
//! process; interpreters do not. Initialization is idempotent and has no
//! teardown.

use std::sync::OnceLock;

/// Description of the host target, recorded on first initialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeTarget {
    pub triple: String,
    /// Default data layout string for modules that do not set one.
    pub data_layout: String,
}

static NATIVE_TARGET: OnceLock<NativeTarget> = OnceLock::new();

fn host_triple() -> String {
    let os = match std::env::consts::OS {
        "macos" => "apple-darwin",
        "windows" => "pc-windows-msvc",
        "linux" => "unknown-linux-gnu",
        other => other,
    };
    format!("{}-{os}", std::env::consts::ARCH)
}

fn host_data_layout() -> String {
    let endian = if cfg!(target_endian = "big") { "E" } else { "e" };
    let bits = usize::BITS;
    format!("{endian}-p:{bits}:{bits}-i64:64-f80:128-n8:16:32:64-S128")
}

/// Initialize the native target. Returns `true` on the call that actually
/// performed the initialization.
pub fn initialize_native_target() -> bool {
    let mut initialized = false;
    NATIVE_TARGET.get_or_init(|| {
        initialized = true;
        let target = NativeTarget {
            triple: host_triple(),
            data_layout: host_data_layout(),
        };
        tracing::debug!(triple = %target.triple, "native target initialized");
        target
    });
    initialized
}

pub fn is_native_target_initialized() -> bool {
    NATIVE_TARGET.get().is_some()
}

/// The native target, once initialized.
pub fn native_target() -> Option<&'static NativeTarget> {
    NATIVE_TARGET.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_is_idempotent() {
        initialize_native_target();
        assert!(!initialize_native_target());
        assert!(is_native_target_initialized());
        let target = native_target().map(|t| t.triple.clone()).unwrap_or_default();
        assert!(target.starts_with(std::env::consts::ARCH));
    }

    #[test]
    fn host_layout_parses() {
        let layout = kiln_ir::DataLayout::parse(&host_data_layout());
        assert!(layout.is_ok_and(|l| l.pointer_size() == u64::from(usize::BITS / 8)));
    }
}
