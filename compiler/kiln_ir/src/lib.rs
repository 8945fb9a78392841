//! Typed, memory-safe IR construction for Kiln.
//!
//! This crate provides:
//!
//! - **Context** ([`Context`]): the root scope. It owns every type,
//!   constant and IR object. Handles borrow it, so nothing built through a
//!   context can outlive it.
//!
//! - **Types** ([`Type`]): interned and compared by identity within one
//!   context. Named structs may be created opaque and completed later.
//!
//! - **Values** ([`Value`]): one handle for constants, globals, functions,
//!   arguments, blocks and instructions. Every operand edge is mirrored by
//!   a use edge, so [`Value::uses`] and [`Value::operands`] always agree.
//!
//! - **Blocks and the builder** ([`BasicBlock`], [`Builder`]): blocks hold
//!   ordered instructions; the builder is a cursor that type-checks every
//!   instruction it inserts.
//!
//! - **Modules** ([`Module`], [`ModuleRef`]): an owning handle that disposes
//!   its contents on drop unless ownership was transferred (to an execution
//!   engine, for example).
//!
//! - **Analyses** ([`verify`](ModuleRef::verify), [`Cfg`],
//!   [`DominatorTree`], [`DataLayout`]) and textual printing.
//!
//! # Errors
//!
//! Every fallible operation returns [`Result`]. Errors never leave the IR
//! half-modified: checks run before any mutation.
//!
//! # Threading
//!
//! A context and its handles are used from one thread at a time; handles
//! are neither `Send` nor `Sync`.

pub mod arith;
mod attributes;
mod block;
mod builder;
mod context;
mod error;
mod fold;
pub mod graph;
mod id;
mod layout;
mod metadata;
mod module;
mod opcode;
mod print;
mod slots;
mod store;
mod types;
mod value;
mod verify;

pub use attributes::{ArithFlags, Attributes, CallConv, Linkage, Visibility};
pub use block::BasicBlock;
pub use builder::{Builder, Position};
pub use context::Context;
pub use error::{Error, ErrorClass, Result};
pub use graph::{Cfg, DominatorTree};
pub use id::ContextId;
pub use layout::{DataLayout, StructLayout};
pub use metadata::{DebugLoc, Metadata};
pub use module::{Module, ModuleRef, Owner};
pub use opcode::{FloatPredicate, IntPredicate, Opcode};
pub use types::{Type, TypeKind, MAX_INT_WIDTH};
pub use value::{ConstantKind, GlobalKind, Use, Uses, Value, ValueKind};
