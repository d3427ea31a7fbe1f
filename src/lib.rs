//! rc-handles: Single-threaded ownership handles over raw heap
//! allocations, one sole-owner type and two reference-counted types,
//! with an explicit count and release discipline.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: make manual ownership auditable by building it in small,
//!   verifiable layers so each piece can be reasoned about
//!   independently.
//! - Layers:
//!   - tokens::AliasCount: interior-mutable count that mints one linear
//!     Token per attached handle; a token cannot be dropped, only
//!     returned through `put`, so the count and the set of live handles
//!     stay in lockstep.
//!   - count records (in `shared` and `shared_array`): one heap record
//!     per shared allocation holding the count and the payload pointer
//!     (plus the element count for arrays). Every alias points at the
//!     same record, and the record is the single release authority.
//!   - Unique<T>, Shared<T>, SharedArray<T>: the public handle types;
//!     all destruction funnels through one release routine per type.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (no atomics); counts
//!   are `Cell<usize>` inside the records.
//! - Exactly-one-release: each payload and each record is freed by
//!   exactly one event. `Option::take` empties the handle before any
//!   free runs, so re-entry through `Drop` sees consistent state.
//! - Fallible access: empty handles and out-of-range indexes surface
//!   `HandleError`; the operator sugar (`Deref`, `Index`, `IndexMut`)
//!   panics with the same message rather than touching memory.
//! - Empty means zero: an empty shared handle reads `use_count() == 0`
//!   and owns no count record at all.
//!
//! Why this split?
//! - Localize invariants: each layer has a small, precise contract
//!   (tokens count, records own, handles expose).
//! - Minimize unsafe: raw-pointer dereference and freeing are confined
//!   to the handle modules' access and release paths; the count
//!   arithmetic itself is safe code in `tokens`.
//! - Mechanical audit: debug builds track every live allocation in
//!   `ledger`, so a leak or a double free fails a test instead of
//!   corrupting memory.
//!
//! Mutation policy
//! - Shared payloads mutate only through the sole attached handle;
//!   `try_get_mut` reports `Aliased` whenever another handle is
//!   attached. Aliased mutation would hand out overlapping `&mut`, so
//!   the count gate is what makes the raw-pointer access sound.
//!
//! Overflow semantics
//! - Count overflow aborts the process, matching `Rc`: reaching it
//!   requires `usize::MAX` live tokens, and continuing with a wrapped
//!   count would free allocations that still have handles.
//!
//! Notes and non-goals
//! - No weak handles, no thread-safe variant, no custom allocators or
//!   deleters, no copy-on-write.
//! - `Shared` does not implement `DerefMut`; mutation is explicit and
//!   gated.
//! - Array length is fixed at adoption; there is no resize.
//! - Public API surface is the three handle types, `HandleError`, and
//!   the `ledger::live` probe; tokens and records are implementation
//!   details.

mod error;
pub mod ledger;
mod shared;
mod shared_array;
mod tokens;
mod unique;

// Public surface
pub use error::HandleError;
pub use shared::Shared;
pub use shared_array::SharedArray;
pub use unique::Unique;
