//! Identifier types for entity types, predicates and ground predicates.
//!
//! Every identifier is a niche-optimized `NonZeroU64`. The upper 32 bits carry
//! the generation of the store that issued it, the lower 32 bits a sequential
//! index. A store uses the generation to reject identifiers issued by another
//! store, and the index keeps identifiers from one store totally ordered by
//! creation.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Create an identifier from its raw `u64` encoding.
            ///
            /// Returns `None` if `raw` is zero.
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Get the raw `u64` encoding.
            pub fn get(self) -> u64 {
                self.0.get()
            }

            /// Generation of the store that issued this identifier.
            pub fn generation(self) -> Generation {
                Generation((self.0.get() >> 32) as u32)
            }

            /// Sequential index within the issuing store.
            pub fn index(self) -> u32 {
                self.0.get() as u32
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.index())
            }
        }

        impl From<NonZeroU64> for $name {
            fn from(raw: NonZeroU64) -> Self {
                Self(raw)
            }
        }
    };
}

define_id!(
    /// Identifier of an [`EntityType`](crate::store::EntityType).
    EntityTypeId,
    "type"
);

define_id!(
    /// Identifier of a [`Predicate`](crate::store::Predicate).
    PredicateId,
    "pred"
);

define_id!(
    /// Identifier of a [`GroundPredicate`](crate::store::GroundPredicate).
    GroundPredicateId,
    "ground"
);

/// Generation stamp shared by all identifiers of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation(u32);

impl Generation {
    /// Draw a fresh, non-zero generation.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(1..=u32::MAX))
    }

    /// Wrap a raw generation. Zero is bumped to one so encoded ids stay non-zero.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Thread-safe allocator for one identifier kind of one store.
///
/// Produces indices starting from 1, stamped with the store's generation.
/// Safe to share across threads.
#[derive(Debug)]
pub struct IdAllocator {
    generation: Generation,
    next: AtomicU32,
}

impl IdAllocator {
    /// Create an allocator for the given generation, starting from index 1.
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next raw identifier.
    ///
    /// Returns `None` once the 32-bit index space is exhausted.
    pub fn next_raw(&self) -> Option<NonZeroU64> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        if index == 0 || index == u32::MAX {
            return None;
        }
        NonZeroU64::new((u64::from(self.generation.0) << 32) | u64::from(index))
    }

    /// Allocate the next identifier of kind `T`.
    pub fn next_id<T: From<NonZeroU64>>(&self) -> Option<T> {
        self.next_raw().map(T::from)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}
