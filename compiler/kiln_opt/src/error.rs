//! Pass manager errors.

use kiln_ir::ErrorClass;

/// Lifecycle state of a [`FunctionPassManager`](crate::FunctionPassManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    Created,
    Initialized,
    Finalized,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ManagerState::Created => "created",
            ManagerState::Initialized => "initialized",
            ManagerState::Finalized => "finalized",
        })
    }
}

/// Error raised while configuring or running a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ir(#[from] kiln_ir::Error),

    #[error("cannot {operation} a pass manager that is {state}")]
    InvalidPassManagerState {
        operation: &'static str,
        state: ManagerState,
    },

    #[error("pass manager used after it was finalized")]
    UseAfterDispose,

    #[error("function `{function}` does not belong to the pass manager's module")]
    ForeignFunction { function: String },

    #[error("pass `{pass}` transforms whole modules and cannot run per function")]
    ModuleOnlyPass { pass: &'static str },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Ir(err) => err.class(),
            Error::InvalidPassManagerState { .. }
            | Error::UseAfterDispose
            | Error::ModuleOnlyPass { .. } => ErrorClass::StateViolation,
            Error::ForeignFunction { .. } => ErrorClass::OwnershipViolation,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
