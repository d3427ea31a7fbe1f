//! Single-owner handle over one heap allocation.
//!
//! [`Unique`] owns at most one heap value and destroys it exactly once,
//! through one routine ([`destroy`]). Ownership moves; it is never
//! duplicated. A moved-from or defaulted handle is observably empty: its
//! pointer is null and dereferencing it reports
//! [`HandleError::NullDeref`] instead of touching freed memory.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::error::HandleError;
use crate::ledger;

/// Sole owner of a single heap-allocated `T`.
///
/// The handle is either empty (null pointer, no allocation) or owns
/// exactly one allocation that no other handle refers to. Dropping the
/// handle frees the allocation; [`release`](Unique::release) hands the
/// allocation to the caller instead. Equality and hashing use the
/// pointer, not the payload, so two empty handles compare equal and two
/// handles over equal values at different addresses do not.
///
/// `Unique` is single-threaded state and is neither `Send` nor `Sync`.
pub struct Unique<T> {
    ptr: Option<NonNull<T>>,
    // Owns a T, so drop check must see the T like Box does.
    _owns: PhantomData<T>,
}

impl<T> Unique<T> {
    /// Creates an empty handle. No allocation happens.
    #[inline]
    pub fn empty() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
        }
    }

    /// Moves `value` to the heap and takes sole ownership of it.
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        ledger::register_payload(ptr);
        Self {
            ptr: Some(ptr),
            _owns: PhantomData,
        }
    }

    /// Adopts an existing allocation. A null `ptr` yields an empty
    /// handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from `Box::<T>::into_raw` (or
    /// [`Unique::release`]) and nothing else may own or free it
    /// afterwards: this handle frees it with `Box::from_raw` exactly
    /// once.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let ptr = NonNull::new(ptr);
        if let Some(p) = ptr {
            ledger::register_payload(p);
        }
        Self {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Raw pointer to the owned value, null when empty. Ownership stays
    /// with the handle.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// True when the handle owns nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Gives up ownership without destroying the value.
    ///
    /// The handle becomes empty and the caller takes over the returned
    /// pointer, typically to reclaim it later with `Box::from_raw` or
    /// [`Unique::from_raw`]. Returns null when the handle was already
    /// empty.
    pub fn release(&mut self) -> *mut T {
        match self.ptr.take() {
            Some(p) => {
                ledger::retire_payload(p);
                p.as_ptr()
            }
            None => ptr::null_mut(),
        }
    }

    /// Destroys the owned value, if any, and adopts `ptr` in its place.
    ///
    /// A null `ptr` just empties the handle. Resetting to the pointer
    /// the handle already owns is a no-op, so the value being adopted is
    /// never the one being freed.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` carries the same contract as
    /// [`Unique::from_raw`].
    pub unsafe fn reset(&mut self, ptr: *mut T) {
        if ptr == self.as_ptr() {
            return;
        }
        let next = NonNull::new(ptr);
        if let Some(p) = next {
            ledger::register_payload(p);
        }
        if let Some(old) = mem::replace(&mut self.ptr, next) {
            destroy(old);
        }
    }

    /// Moves ownership out, leaving this handle empty.
    ///
    /// This is the explicit move surface: the source stays usable and
    /// observably empty, unlike a plain Rust move which statically
    /// retires the source binding.
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            _owns: PhantomData,
        }
    }

    /// Borrows the owned value, or reports `NullDeref` when empty.
    #[inline]
    pub fn try_get(&self) -> Result<&T, HandleError> {
        match &self.ptr {
            // Safety: the allocation stays live while this handle owns
            // it, and the returned borrow keeps `self` shared-borrowed.
            Some(p) => Ok(unsafe { p.as_ref() }),
            None => Err(HandleError::NullDeref),
        }
    }

    /// Mutably borrows the owned value, or reports `NullDeref` when
    /// empty.
    #[inline]
    pub fn try_get_mut(&mut self) -> Result<&mut T, HandleError> {
        match &mut self.ptr {
            // Safety: sole owner plus an exclusive borrow of the handle,
            // so no other path to the value exists.
            Some(p) => Ok(unsafe { p.as_mut() }),
            None => Err(HandleError::NullDeref),
        }
    }
}

/// The one place an owned allocation is freed. `p` must have left the
/// handle before the call.
fn destroy<T>(p: NonNull<T>) {
    ledger::retire_payload(p);
    // Safety: `p` was adopted under the from_raw contract and the caller
    // removed it from the handle, so this is the sole remaining owner.
    drop(unsafe { Box::from_raw(p.as_ptr()) });
}

impl<T> Drop for Unique<T> {
    fn drop(&mut self) {
        if let Some(p) = self.ptr.take() {
            destroy(p);
        }
    }
}

impl<T> Default for Unique<T> {
    /// The default handle is empty.
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for Unique<T> {
    type Target = T;

    /// Panics when the handle is empty. [`Unique::try_get`] is the
    /// fallible form.
    #[inline]
    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> DerefMut for Unique<T> {
    /// Panics when the handle is empty. [`Unique::try_get_mut`] is the
    /// fallible form.
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        match self.try_get_mut() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> PartialEq for Unique<T> {
    /// Pointer identity, not payload comparison. All empty handles are
    /// equal to each other. Identity is exact only for sized payloads:
    /// zero-sized payloads allocate no storage and share one dangling
    /// address, so distinct live handles over them also compare equal.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl<T> Eq for Unique<T> {}

impl<T> Hash for Unique<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state);
    }
}

impl<T> fmt::Debug for Unique<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unique").field("ptr", &self.as_ptr()).finish()
    }
}
