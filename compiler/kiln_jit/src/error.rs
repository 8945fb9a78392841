//! Execution engine errors.
//!
//! IR errors raised while the engine reads or rewrites a module pass
//! through unchanged as [`Error::Ir`]. Faults of the executed program are
//! [`Trap`]s and always belong to [`ErrorClass::ExecutionFault`].

use kiln_ir::ErrorClass;

/// A fault raised by the executed program.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("integer division by zero")]
    DivisionByZero,

    #[error("signed division overflow")]
    SignedOverflow,

    #[error("shift amount not smaller than the bit width")]
    ShiftOutOfRange,

    #[error("floating-point value out of range for the integer conversion")]
    ConversionOutOfRange,

    #[error("access of {len} bytes at {address:#x} is out of bounds")]
    OutOfBounds { address: u64, len: u64 },

    #[error("{0:#x} is not the start of a heap allocation")]
    InvalidFree(u64),

    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("executed `unreachable`")]
    Unreachable,

    #[error("program aborted")]
    Abort,

    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("stack size limit of {0} bytes exceeded")]
    StackOverflow(u64),

    #[error("heap allocation of {requested} bytes exceeds the limit of {limit} bytes")]
    HeapExhausted { requested: u64, limit: u64 },

    #[error("no address range left for a region of {0} bytes")]
    AddressSpaceExhausted(u64),

    #[error("unresolved external symbol `{0}`")]
    UnresolvedExternal(String),

    #[error("{0:#x} is not a function address")]
    BadCallTarget(u64),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("host function `{function}` failed: {message}")]
    Host { function: String, message: String },
}

/// Error raised by engine creation, module management and execution.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ir(#[from] kiln_ir::Error),

    #[error("failed to create execution engine: {diagnostic}")]
    CreationFailed { diagnostic: String },

    #[error("function `{function}` does not belong to a module owned by this engine")]
    NotOwnedByEngine { function: String },

    #[error("invalid arguments for `{function}`: {detail}")]
    ArgumentMismatch { function: String, detail: String },

    #[error("execution trapped: {0}")]
    Trap(#[from] Trap),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Ir(err) => err.class(),
            Error::CreationFailed { .. } | Error::ArgumentMismatch { .. } => {
                ErrorClass::ConstructionFailure
            }
            Error::NotOwnedByEngine { .. } => ErrorClass::OwnershipViolation,
            Error::Trap(_) => ErrorClass::ExecutionFault,
        }
    }

    /// The trap, if execution faulted.
    pub fn as_trap(&self) -> Option<&Trap> {
        match self {
            Error::Trap(trap) => Some(trap),
            _ => None,
        }
    }
}

impl From<kiln_ir::arith::ArithFault> for Trap {
    fn from(fault: kiln_ir::arith::ArithFault) -> Self {
        use kiln_ir::arith::ArithFault;
        match fault {
            ArithFault::DivisionByZero => Trap::DivisionByZero,
            ArithFault::SignedOverflow => Trap::SignedOverflow,
            ArithFault::ShiftOutOfRange => Trap::ShiftOutOfRange,
            ArithFault::NotAnIntegerOp => Trap::Unsupported("non-integer operator on integers".to_owned()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
