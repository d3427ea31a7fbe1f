//! Debug-only allocation ledger.
//!
//! Single-threaded bookkeeping that makes the "each allocation is released
//! exactly once" invariant mechanically checkable. In debug builds every
//! allocation a handle owns (payload blocks and count records) is
//! registered by address when adopted and retired at its one release
//! point. Retiring an address the ledger does not know panics (a would-be
//! double free), as does registering an address that is already live. In
//! release builds everything here compiles to a zero-cost no-op.
//!
//! The ledger never runs user code while its map is borrowed: register and
//! retire are self-contained, and the release paths retire an allocation
//! before dropping the payload stored in it.
//!
//! Zero-sized payloads and zero-length array blocks are not real
//! allocations (their pointers are aligned dangling values shared between
//! instances) and are never tracked.

#[cfg(debug_assertions)]
use core::cell::RefCell;
#[cfg(debug_assertions)]
use hashbrown::HashMap;

/// What an address was registered as; retirement must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// A payload block: one `T` or a `[T]` array block.
    Payload,
    /// A count record backing a shared allocation.
    Record,
}

#[cfg(debug_assertions)]
thread_local! {
    static LEDGER: RefCell<HashMap<usize, Kind>> = RefCell::new(HashMap::new());
}

/// Number of allocations currently tracked on this thread.
///
/// Debug builds only; release builds always report 0. Tests assert that
/// scopes leave this unchanged.
pub fn live() -> usize {
    #[cfg(debug_assertions)]
    {
        LEDGER.with(|l| l.borrow().len())
    }
    #[cfg(not(debug_assertions))]
    {
        0
    }
}

/// Start tracking an allocation the crate now owns.
#[inline]
pub(crate) fn register(addr: usize, kind: Kind) {
    #[cfg(debug_assertions)]
    LEDGER.with(|l| {
        let prev = l.borrow_mut().insert(addr, kind);
        assert!(
            prev.is_none(),
            "ledger: address {addr:#x} registered while already live"
        );
    });
    #[cfg(not(debug_assertions))]
    let _ = (addr, kind);
}

/// Stop tracking an allocation at its release point (or where ownership
/// leaves the crate, as in `Unique::release`).
#[inline]
pub(crate) fn retire(addr: usize, kind: Kind) {
    #[cfg(debug_assertions)]
    LEDGER.with(|l| {
        let prev = l.borrow_mut().remove(&addr);
        match prev {
            Some(k) => assert!(
                k == kind,
                "ledger: address {addr:#x} retired as {kind:?} but registered as {k:?}"
            ),
            None => panic!("ledger: address {addr:#x} retired twice or never registered"),
        }
    });
    #[cfg(not(debug_assertions))]
    let _ = (addr, kind);
}

/// Track a payload block. Zero-sized payloads are skipped (dangling,
/// shared addresses); array call sites additionally skip zero-length
/// blocks before calling in.
#[inline]
pub(crate) fn register_payload<T>(p: core::ptr::NonNull<T>) {
    if core::mem::size_of::<T>() != 0 {
        register(p.as_ptr() as usize, Kind::Payload);
    }
}

/// Untrack a payload block at its release point.
#[inline]
pub(crate) fn retire_payload<T>(p: core::ptr::NonNull<T>) {
    if core::mem::size_of::<T>() != 0 {
        retire(p.as_ptr() as usize, Kind::Payload);
    }
}

/// Track a count record (never zero-sized).
#[inline]
pub(crate) fn register_record<T>(p: core::ptr::NonNull<T>) {
    register(p.as_ptr() as usize, Kind::Record);
}

/// Untrack a count record at its release point.
#[inline]
pub(crate) fn retire_record<T>(p: core::ptr::NonNull<T>) {
    retire(p.as_ptr() as usize, Kind::Record);
}
