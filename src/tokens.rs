//! Linear count units for the alias counters.
//!
//! Tokens are zero-sized proofs that one unit was added to an
//! [`AliasCount`]. Dropping a token panics; the only valid way to dispose
//! of one is to return it to a counter via [`AliasCount::put`], which
//! performs the matching decrement. Every live handle owns exactly one
//! token, so increments and decrements stay paired by construction and the
//! count-reaches-zero event fires at most once per counter.

use core::cell::Cell;
use core::marker::PhantomData;

/// Zero-sized, linear token branded with the counter type that minted it.
pub(crate) struct Token<C: ?Sized> {
    _ctr: PhantomData<*const C>,
}

impl<C: ?Sized> Token<C> {
    #[inline]
    fn new() -> Self {
        Self { _ctr: PhantomData }
    }
}

impl<C: ?Sized> Drop for Token<C> {
    fn drop(&mut self) {
        // A token must be consumed by AliasCount::put, never dropped.
        panic!("count token dropped without AliasCount::put");
    }
}

/// Single-threaded alias counter for one allocation.
#[derive(Debug)]
pub(crate) struct AliasCount {
    count: Cell<usize>,
}

impl AliasCount {
    pub(crate) fn new(initial: usize) -> Self {
        Self {
            count: Cell::new(initial),
        }
    }

    /// Current count. Reads do not mint or consume tokens.
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    /// Add one unit and mint the token for it.
    #[inline]
    pub(crate) fn get(&self) -> Token<Self> {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Overflow aborts, matching Rc; a wrapped count would free
            // live allocations.
            std::process::abort();
        }
        Token::new()
    }

    /// Consume a token, removing one unit. Returns true if the count is
    /// now zero.
    #[inline]
    pub(crate) fn put(&self, t: Token<Self>) -> bool {
        // Forget the token first so an underflow assert panics once instead
        // of double-panicking through the token's own drop.
        core::mem::forget(t);
        let c = self.count.get();
        assert!(c > 0, "alias count underflow");
        self.count.set(c - 1);
        c - 1 == 0
    }
}
