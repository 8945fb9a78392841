//! IR construction errors.
//!
//! Every fallible operation in this crate returns [`Error`]. Each variant
//! belongs to exactly one [`ErrorClass`], which callers use to decide how
//! to react: construction and lookup failures are recoverable locally,
//! state violations usually indicate a sequencing bug in the caller, and
//! ownership violations are never recoverable.

use std::fmt;

use crate::module::Owner;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Invalid input to a constructor: bad width, type mismatch, bad operand.
    ConstructionFailure,
    /// A named entity (function, global, module) was not found.
    LookupFailure,
    /// Operation sequenced incorrectly: unpositioned builder, stale handle,
    /// body set twice, query of an incomplete type.
    StateViolation,
    /// Ownership of a module or engine resource was transferred incorrectly.
    OwnershipViolation,
    /// The IR is structurally invalid.
    VerificationFailure,
    /// A fault raised while executing IR.
    ExecutionFault,
}

impl ErrorClass {
    /// Whether the caller may continue using the affected objects.
    ///
    /// Ownership violations leave the resource in an unknown owner state,
    /// every other class leaves all objects usable.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorClass::OwnershipViolation)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::ConstructionFailure => "construction failure",
            ErrorClass::LookupFailure => "lookup failure",
            ErrorClass::StateViolation => "state violation",
            ErrorClass::OwnershipViolation => "ownership violation",
            ErrorClass::VerificationFailure => "verification failure",
            ErrorClass::ExecutionFault => "execution fault",
        };
        f.write_str(name)
    }
}

/// Error raised by IR construction, mutation and query operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    // ── Construction ────────────────────────────────────────────────
    #[error("handles belong to different contexts")]
    ContextMismatch,

    #[error("invalid integer width {0}: expected 1..=128")]
    InvalidIntWidth(u32),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("constant {value} does not fit in i{width}")]
    ConstantOutOfRange { value: String, width: u32 },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: String,
    },

    // ── Lookup ──────────────────────────────────────────────────────
    #[error("`{0}` not found")]
    NotFound(String),

    #[error("module not found")]
    ModuleNotFound,

    // ── State ───────────────────────────────────────────────────────
    #[error("struct type `{0}` has no body")]
    IncompleteType(String),

    #[error("struct type `{0}` already has a body")]
    BodyAlreadySet(String),

    #[error("builder is not positioned")]
    BuilderUnpositioned,

    #[error("object was disposed")]
    Disposed,

    #[error("{0} is still in use")]
    StillInUse(String),

    // ── Ownership ───────────────────────────────────────────────────
    #[error("module is owned by {found}, expected {expected}")]
    OwnerMismatch { expected: Owner, found: Owner },

    // ── Verification ────────────────────────────────────────────────
    #[error("verification failed:\n{diagnostic}")]
    Verification { diagnostic: String },
}

impl Error {
    /// Classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ContextMismatch
            | Error::InvalidIntWidth(_)
            | Error::InvalidType(_)
            | Error::TypeMismatch { .. }
            | Error::InvalidOperand(_)
            | Error::ConstantOutOfRange { .. }
            | Error::IndexOutOfRange { .. }
            | Error::KindMismatch { .. } => ErrorClass::ConstructionFailure,
            Error::NotFound(_) | Error::ModuleNotFound => ErrorClass::LookupFailure,
            Error::IncompleteType(_)
            | Error::BodyAlreadySet(_)
            | Error::BuilderUnpositioned
            | Error::Disposed
            | Error::StillInUse(_) => ErrorClass::StateViolation,
            Error::OwnerMismatch { .. } => ErrorClass::OwnershipViolation,
            Error::Verification { .. } => ErrorClass::VerificationFailure,
        }
    }

    pub(crate) fn invalid_operand(msg: impl Into<String>) -> Self {
        Error::InvalidOperand(msg.into())
    }

    pub(crate) fn invalid_type(msg: impl Into<String>) -> Self {
        Error::InvalidType(msg.into())
    }
}

/// Result alias for IR operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests;
