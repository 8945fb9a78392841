//! Opaque ID newtypes for objects stored in a [`Context`](crate::Context).
//!
//! IR objects live in per-context arenas and are referenced by `Copy` IDs.
//! Objects that can be released before their context (values, blocks,
//! modules) use a generational ID: the arena slot index plus the generation
//! the slot had when the object was created. Reusing a slot bumps its
//! generation, so a stale ID never aliases a newer object.
//!
//! Types are never released, so [`TypeId`] is a plain index.
//!
//! None of these IDs expose their raw representation publicly: they can
//! only be obtained from a live handle and only be resolved by the context
//! that produced them.

use std::sync::atomic::{AtomicU32, Ordering};

// ── Context identity ────────────────────────────────────────────────

/// Process-unique identity of a [`Context`](crate::Context).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ContextId(u32);

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

impl ContextId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

// ── Type IDs ────────────────────────────────────────────────────────

/// Interned type within a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Generational IDs ────────────────────────────────────────────────

/// Arena key with a slot index and a generation.
pub(crate) trait SlotKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> usize;
    fn generation(self) -> u32;
}

macro_rules! generational_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl SlotKey for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> usize {
                self.index as usize
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

generational_id!(
    /// Value in the def-use graph (constant, global, argument, block label
    /// or instruction).
    ValueId
);

generational_id!(
    /// Basic block.
    BlockId
);

generational_id!(
    /// Module.
    ModuleId
);
