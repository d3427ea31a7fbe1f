//! Error taxonomy for fallible handle accessors.
//!
//! Every failure a handle can report is local and immediate; nothing is
//! retried or deferred. Operator impls (`Deref`, `Index`, `IndexMut`) fail
//! fast by panicking with the same display text the `try_*` accessors
//! return, so the two surfaces never disagree about what went wrong.

use thiserror::Error;

/// Error returned by the `try_*` accessors on [`Unique`](crate::Unique),
/// [`Shared`](crate::Shared) and [`SharedArray`](crate::SharedArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Dereference through an empty scalar handle.
    #[error("null pointer dereference through an empty handle")]
    NullDeref,

    /// Indexed access through an empty array handle.
    #[error("indexed access through an empty array handle")]
    NullAccess,

    /// Index at or past the end of an owned array. Checked on every
    /// access, release builds included.
    #[error("index {index} out of bounds for shared array of length {len}")]
    OutOfBounds {
        /// The rejected index.
        index: usize,
        /// The array's element count at the time of the access.
        len: usize,
    },

    /// Mutable access while other handles alias the same allocation.
    /// Mutation requires `use_count() == 1`.
    #[error("mutable access through an aliased handle (use_count {count})")]
    Aliased {
        /// The alias count observed when the access was rejected.
        count: usize,
    },
}
