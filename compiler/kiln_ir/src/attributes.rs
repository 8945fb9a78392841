//! Function, parameter and call-site attributes, linkage and visibility.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Attributes attachable to functions, parameters and call sites.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Attributes: u32 {
        const ZEXT = 1 << 0;
        const SEXT = 1 << 1;
        const NO_RETURN = 1 << 2;
        const IN_REG = 1 << 3;
        const STRUCT_RET = 1 << 4;
        const NO_UNWIND = 1 << 5;
        const NO_ALIAS = 1 << 6;
        const BY_VAL = 1 << 7;
        const NEST = 1 << 8;
        const READ_NONE = 1 << 9;
        const READ_ONLY = 1 << 10;
        const NO_INLINE = 1 << 11;
        const ALWAYS_INLINE = 1 << 12;
        const OPTIMIZE_FOR_SIZE = 1 << 13;
        const STACK_PROTECT = 1 << 14;
        const STACK_PROTECT_REQ = 1 << 15;
        const NO_CAPTURE = 1 << 16;
        const NO_RED_ZONE = 1 << 17;
        const NO_IMPLICIT_FLOAT = 1 << 18;
        const NAKED = 1 << 19;
        const INLINE_HINT = 1 << 20;
    }
}

impl Attributes {
    /// Textual names of the set flags, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        const NAMES: [(Attributes, &str); 21] = [
            (Attributes::ZEXT, "zeroext"),
            (Attributes::SEXT, "signext"),
            (Attributes::NO_RETURN, "noreturn"),
            (Attributes::IN_REG, "inreg"),
            (Attributes::STRUCT_RET, "sret"),
            (Attributes::NO_UNWIND, "nounwind"),
            (Attributes::NO_ALIAS, "noalias"),
            (Attributes::BY_VAL, "byval"),
            (Attributes::NEST, "nest"),
            (Attributes::READ_NONE, "readnone"),
            (Attributes::READ_ONLY, "readonly"),
            (Attributes::NO_INLINE, "noinline"),
            (Attributes::ALWAYS_INLINE, "alwaysinline"),
            (Attributes::OPTIMIZE_FOR_SIZE, "optsize"),
            (Attributes::STACK_PROTECT, "ssp"),
            (Attributes::STACK_PROTECT_REQ, "sspreq"),
            (Attributes::NO_CAPTURE, "nocapture"),
            (Attributes::NO_RED_ZONE, "noredzone"),
            (Attributes::NO_IMPLICIT_FLOAT, "noimplicitfloat"),
            (Attributes::NAKED, "naked"),
            (Attributes::INLINE_HINT, "inlinehint"),
        ];
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

bitflags! {
    /// Wrapping and exactness flags on arithmetic instructions.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct ArithFlags: u8 {
        /// No signed wrap.
        const NSW = 1 << 0;
        /// No unsigned wrap.
        const NUW = 1 << 1;
        /// Division is exact (no remainder).
        const EXACT = 1 << 2;
    }
}

/// Calling convention, as a numeric ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CallConv(pub u32);

impl CallConv {
    pub const C: CallConv = CallConv(0);
    pub const FAST: CallConv = CallConv(8);
    pub const COLD: CallConv = CallConv(9);
    pub const X86_STDCALL: CallConv = CallConv(64);
    pub const X86_FASTCALL: CallConv = CallConv(65);
}

impl Default for CallConv {
    fn default() -> Self {
        CallConv::C
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CallConv::C => f.write_str("ccc"),
            CallConv::FAST => f.write_str("fastcc"),
            CallConv::COLD => f.write_str("coldcc"),
            CallConv::X86_STDCALL => f.write_str("x86_stdcallcc"),
            CallConv::X86_FASTCALL => f.write_str("x86_fastcallcc"),
            CallConv(other) => write!(f, "cc {other}"),
        }
    }
}

/// Symbol linkage of a global value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    External,
    AvailableExternally,
    LinkOnceAny,
    LinkOnceOdr,
    WeakAny,
    WeakOdr,
    Appending,
    Internal,
    Private,
    DllImport,
    DllExport,
    ExternalWeak,
    Common,
    LinkerPrivate,
}

impl Linkage {
    /// Whether the symbol is invisible outside its module.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Linkage::Internal | Linkage::Private | Linkage::LinkerPrivate
        )
    }

    /// Whether another definition may replace this one at link time.
    pub fn is_overridable(self) -> bool {
        matches!(
            self,
            Linkage::LinkOnceAny | Linkage::WeakAny | Linkage::ExternalWeak | Linkage::Common
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Linkage::External => "external",
            Linkage::AvailableExternally => "available_externally",
            Linkage::LinkOnceAny => "linkonce",
            Linkage::LinkOnceOdr => "linkonce_odr",
            Linkage::WeakAny => "weak",
            Linkage::WeakOdr => "weak_odr",
            Linkage::Appending => "appending",
            Linkage::Internal => "internal",
            Linkage::Private => "private",
            Linkage::DllImport => "dllimport",
            Linkage::DllExport => "dllexport",
            Linkage::ExternalWeak => "extern_weak",
            Linkage::Common => "common",
            Linkage::LinkerPrivate => "linker_private",
        }
    }
}

/// Symbol visibility of a global value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Default,
    Hidden,
    Protected,
}

impl Visibility {
    pub fn name(self) -> &'static str {
        match self {
            Visibility::Default => "default",
            Visibility::Hidden => "hidden",
            Visibility::Protected => "protected",
        }
    }
}
