//! Reference-counted shared handle over one heap-allocated array.
//!
//! Same counting contract as [`crate::shared`], with two additions: the
//! record carries the element count, so every alias observes the same
//! length, and element access is bounds-checked on every call in every
//! build profile. The payload is one contiguous block, allocated and
//! freed whole.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use core::ptr::{self, NonNull};
use core::slice;

use crate::error::HandleError;
use crate::ledger;
use crate::tokens::{AliasCount, Token};

/// Per-array count record: alias count, first-element pointer, element
/// count. The length never changes while the record is live.
struct ArrayRecord<T> {
    count: AliasCount,
    payload: NonNull<T>,
    len: usize,
}

/// A handle's live attachment to an array record.
struct Binding<T> {
    record: NonNull<ArrayRecord<T>>,
    token: Token<AliasCount>,
}

/// Shared owner of a heap-allocated array of `T`.
///
/// Counting, cloning, and release work exactly as in
/// [`Shared`](crate::Shared): the last detaching handle frees the
/// element block and the record. Element access always checks for an
/// empty handle and for the index bound, and reports [`HandleError`]
/// instead of touching memory; the `[]` operators are sugar that panics
/// with the same message. A zero-length array is a live allocation with
/// `len() == 0`, not an empty handle.
///
/// `SharedArray` is single-threaded state and is neither `Send` nor
/// `Sync`.
pub struct SharedArray<T> {
    bind: Option<Binding<T>>,
    // Dropping the last handle drops the elements.
    _owns: PhantomData<T>,
}

/// Allocates the record for a freshly adopted block and mints its first
/// token, yielding a count of one.
fn adopt<T>(payload: NonNull<T>, len: usize) -> Binding<T> {
    let record = NonNull::from(Box::leak(Box::new(ArrayRecord {
        count: AliasCount::new(0),
        payload,
        len,
    })));
    ledger::register_record(record);
    // Safety: the record was just leaked and nothing else refers to it.
    let token = unsafe { record.as_ref() }.count.get();
    Binding { record, token }
}

/// The one place attachments end. Returns the handle's token; when it
/// was the last one, frees the element block whole and then the record.
fn release<T>(bind: Binding<T>) {
    let Binding { record, token } = bind;
    // Safety: the record stays allocated until its last token comes
    // back, and `token` proves one is still outstanding.
    let last = unsafe { record.as_ref() }.count.put(token);
    if last {
        ledger::retire_record(record);
        // Safety: the count reached zero, so no handle can observe the
        // record or the block anymore.
        let rec = unsafe { Box::from_raw(record.as_ptr()) };
        if rec.len > 0 {
            ledger::retire_payload(rec.payload);
        }
        // Reconstitute the boxed slice so the whole block and every
        // element go back to the allocator at once.
        let block = ptr::slice_from_raw_parts_mut(rec.payload.as_ptr(), rec.len);
        drop(unsafe { Box::from_raw(block) });
    }
}

impl<T> SharedArray<T> {
    /// Creates an empty handle. No allocation happens and the count and
    /// length both read zero.
    #[inline]
    pub fn empty() -> Self {
        Self {
            bind: None,
            _owns: PhantomData,
        }
    }

    /// Allocates `len` default-constructed elements and starts sharing
    /// them at a count of one. `len` may be zero; the result is then a
    /// live zero-length array, not an empty handle.
    pub fn new(len: usize) -> Self
    where
        T: Default,
    {
        let mut elems = Vec::with_capacity(len);
        elems.resize_with(len, T::default);
        Self::from_boxed_slice(elems.into_boxed_slice())
    }

    /// Adopts a boxed slice as the shared block, count one.
    pub fn from_boxed_slice(slice: Box<[T]>) -> Self {
        let len = slice.len();
        let first = Box::into_raw(slice) as *mut T;
        // A boxed slice pointer is never null (zero-length ones are
        // dangling but well aligned).
        let payload = NonNull::new(first).expect("boxed slice has a non-null pointer");
        if len > 0 {
            ledger::register_payload(payload);
        }
        Self {
            bind: Some(adopt(payload, len)),
            _owns: PhantomData,
        }
    }

    /// Adopts an existing block of `len` elements and starts sharing it
    /// at a count of one. A null `ptr` yields an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must carry exactly `len` initialized elements
    /// laid out as by `Box::<[T]>::into_raw`, and nothing else may own
    /// or free the block afterwards: the last handle frees it whole
    /// with `Box::from_raw` exactly once.
    pub unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Self {
        match NonNull::new(ptr) {
            Some(payload) => {
                if len > 0 {
                    ledger::register_payload(payload);
                }
                Self {
                    bind: Some(adopt(payload, len)),
                    _owns: PhantomData,
                }
            }
            None => Self::empty(),
        }
    }

    /// Raw pointer to the first element, null when the handle is empty.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        match &self.bind {
            Some(b) => unsafe { b.record.as_ref() }.payload.as_ptr(),
            None => ptr::null(),
        }
    }

    /// True when the handle owns nothing. A live zero-length array is
    /// not empty in this sense; check [`len`](SharedArray::len) for
    /// element count.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bind.is_none()
    }

    /// Element count of the shared block, zero for an empty handle.
    /// Stored once in the record, so every alias reads the same value.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.bind {
            Some(b) => unsafe { b.record.as_ref() }.len,
            None => 0,
        }
    }

    /// Number of handles currently attached to the block, zero for an
    /// empty handle.
    #[inline]
    pub fn use_count(&self) -> usize {
        match &self.bind {
            Some(b) => unsafe { b.record.as_ref() }.count.count(),
            None => 0,
        }
    }

    /// Borrows element `index`.
    ///
    /// Fails with `NullAccess` on an empty handle and `OutOfBounds`
    /// past the end. Both checks run on every call, release builds
    /// included.
    #[inline]
    pub fn try_get(&self, index: usize) -> Result<&T, HandleError> {
        match &self.bind {
            Some(b) => {
                let rec = unsafe { b.record.as_ref() };
                if index >= rec.len {
                    return Err(HandleError::OutOfBounds {
                        index,
                        len: rec.len,
                    });
                }
                // Safety: index is inside the live block, and the
                // borrow keeps `self` attached.
                Ok(unsafe { &*rec.payload.as_ptr().add(index) })
            }
            None => Err(HandleError::NullAccess),
        }
    }

    /// Mutably borrows element `index`.
    ///
    /// Checks run in order: empty handle (`NullAccess`), bound
    /// (`OutOfBounds`), then aliasing (`Aliased`); mutation is only
    /// allowed through the sole handle.
    pub fn try_get_mut(&mut self, index: usize) -> Result<&mut T, HandleError> {
        match &self.bind {
            Some(b) => {
                let rec = unsafe { b.record.as_ref() };
                if index >= rec.len {
                    return Err(HandleError::OutOfBounds {
                        index,
                        len: rec.len,
                    });
                }
                let count = rec.count.count();
                if count != 1 {
                    return Err(HandleError::Aliased { count });
                }
                // Safety: in bounds, sole attached handle, exclusive
                // borrow of it.
                Ok(unsafe { &mut *rec.payload.as_ptr().add(index) })
            }
            None => Err(HandleError::NullAccess),
        }
    }

    /// Borrows the whole block as a slice, or `NullAccess` when empty.
    pub fn try_as_slice(&self) -> Result<&[T], HandleError> {
        match &self.bind {
            Some(b) => {
                let rec = unsafe { b.record.as_ref() };
                // Safety: the block holds exactly `len` initialized
                // elements while any handle is attached.
                Ok(unsafe { slice::from_raw_parts(rec.payload.as_ptr(), rec.len) })
            }
            None => Err(HandleError::NullAccess),
        }
    }

    /// Mutably borrows the whole block, with the same empty and
    /// aliasing rules as [`try_get_mut`](SharedArray::try_get_mut).
    pub fn try_as_slice_mut(&mut self) -> Result<&mut [T], HandleError> {
        match &self.bind {
            Some(b) => {
                let rec = unsafe { b.record.as_ref() };
                let count = rec.count.count();
                if count != 1 {
                    return Err(HandleError::Aliased { count });
                }
                // Safety: sole attached handle, exclusive borrow of it.
                Ok(unsafe { slice::from_raw_parts_mut(rec.payload.as_ptr(), rec.len) })
            }
            None => Err(HandleError::NullAccess),
        }
    }

    /// Moves the attachment out, leaving this handle empty. The count
    /// does not change; the returned handle carries this one's token.
    pub fn take(&mut self) -> Self {
        Self {
            bind: self.bind.take(),
            _owns: PhantomData,
        }
    }

    /// Same allocation test that stays exact for zero-length blocks,
    /// whose dangling element pointers collide across instances.
    #[inline]
    fn same_record(&self, other: &Self) -> bool {
        match (&self.bind, &other.bind) {
            (Some(a), Some(b)) => a.record == b.record,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for SharedArray<T> {
    /// Attaches one more handle to the same block, raising the count by
    /// one. Cloning an empty handle yields an empty handle.
    fn clone(&self) -> Self {
        let bind = self.bind.as_ref().map(|b| Binding {
            record: b.record,
            // Safety: `self` is attached, so the record is live.
            token: unsafe { b.record.as_ref() }.count.get(),
        });
        Self {
            bind,
            _owns: PhantomData,
        }
    }

    /// Rebinds `self` to `source`'s block, detaching from the current
    /// one first. Assigning a handle over an alias of itself is a
    /// no-op, so the shared block is never released mid-assign.
    fn clone_from(&mut self, source: &Self) {
        if self.same_record(source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T> Drop for SharedArray<T> {
    fn drop(&mut self) {
        if let Some(bind) = self.bind.take() {
            release(bind);
        }
    }
}

impl<T> Default for SharedArray<T> {
    /// The default handle is empty.
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Index<usize> for SharedArray<T> {
    type Output = T;

    /// Panics on an empty handle or an out-of-bounds index.
    /// [`SharedArray::try_get`] is the fallible form.
    #[inline]
    fn index(&self, index: usize) -> &T {
        match self.try_get(index) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> IndexMut<usize> for SharedArray<T> {
    /// Panics on an empty handle, an out-of-bounds index, or an aliased
    /// block. [`SharedArray::try_get_mut`] is the fallible form.
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.try_get_mut(index) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> PartialEq for SharedArray<T> {
    /// Allocation identity: aliases are equal, empty handles are
    /// equal, distinct blocks are not, zero-length blocks included.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same_record(other)
    }
}

impl<T> Eq for SharedArray<T> {}

impl<T> Hash for SharedArray<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let addr = match &self.bind {
            Some(b) => b.record.as_ptr() as usize,
            None => 0,
        };
        addr.hash(state);
    }
}

impl<T> fmt::Debug for SharedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArray")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::SharedArray;
    use crate::error::HandleError;
    use std::cell::Cell;

    /// Invariant: `new(len)` yields `len` default elements at count
    /// one, and writes through the sole handle land.
    #[test]
    fn new_defaults_and_writes() {
        let mut a = SharedArray::<u32>::new(4);
        assert_eq!(a.len(), 4);
        assert_eq!(a.use_count(), 1);
        for i in 0..4 {
            assert_eq!(*a.try_get(i).unwrap(), 0);
            *a.try_get_mut(i).unwrap() = (i as u32) * 10;
        }
        assert_eq!(a.try_as_slice().unwrap(), &[0, 10, 20, 30]);
    }

    /// Invariant: every access checks the bound and reports the index
    /// and length it saw; in-bounds neighbors stay accessible.
    #[test]
    fn bounds_are_checked_every_access() {
        let mut a = SharedArray::from_boxed_slice(vec![1u8, 2, 3].into_boxed_slice());
        assert_eq!(
            a.try_get(3).unwrap_err(),
            HandleError::OutOfBounds { index: 3, len: 3 }
        );
        assert_eq!(
            a.try_get_mut(9).unwrap_err(),
            HandleError::OutOfBounds { index: 9, len: 3 }
        );
        assert_eq!(*a.try_get(2).unwrap(), 3);
    }

    /// Invariant: an empty handle refuses element access with
    /// `NullAccess`, never a bounds error.
    #[test]
    fn empty_handle_refuses_access() {
        let mut e = SharedArray::<i32>::empty();
        assert_eq!(e.len(), 0);
        assert_eq!(e.use_count(), 0);
        assert_eq!(e.try_get(0).unwrap_err(), HandleError::NullAccess);
        assert_eq!(e.try_get_mut(0).unwrap_err(), HandleError::NullAccess);
        assert_eq!(e.try_as_slice().unwrap_err(), HandleError::NullAccess);
    }

    /// Invariant: a zero-length live array is distinct from an empty
    /// handle. It counts as an allocation and indexing it is a bounds
    /// error, not a null access.
    #[test]
    fn zero_length_is_live_not_empty() {
        let z = SharedArray::<u64>::new(0);
        assert!(!z.is_empty());
        assert_eq!(z.len(), 0);
        assert_eq!(z.use_count(), 1);
        assert_eq!(
            z.try_get(0).unwrap_err(),
            HandleError::OutOfBounds { index: 0, len: 0 }
        );
        assert_eq!(z.try_as_slice().unwrap(), &[]);
    }

    /// Invariant: the length lives in the record, so aliases agree on
    /// it, and writes through the sole handle are visible to a later
    /// alias.
    #[test]
    fn aliases_agree_on_length_and_content() {
        let mut a = SharedArray::<u16>::new(3);
        *a.try_get_mut(1).unwrap() = 7;
        let b = a.clone();
        assert_eq!(a.len(), b.len());
        assert_eq!(*b.try_get(1).unwrap(), 7);
        assert_eq!(a.use_count(), 2);
    }

    /// Invariant: mutable access while aliased reports the observed
    /// count; the read path stays open.
    #[test]
    fn writes_require_sole_handle() {
        let mut a = SharedArray::<u8>::new(2);
        let alias = a.clone();
        assert_eq!(
            a.try_get_mut(0).unwrap_err(),
            HandleError::Aliased { count: 2 }
        );
        assert_eq!(
            a.try_as_slice_mut().unwrap_err(),
            HandleError::Aliased { count: 2 }
        );
        assert_eq!(*a.try_get(0).unwrap(), 0);
        drop(alias);
        *a.try_get_mut(0).unwrap() = 9;
        assert_eq!(a[0], 9);
    }

    /// Invariant: elements drop exactly once, all together, when the
    /// last handle detaches.
    #[test]
    fn block_drops_whole_at_last_detach() {
        struct Tally<'a>(&'a Cell<u32>);
        impl Drop for Tally<'_> {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Cell::new(0u32);
        let a = SharedArray::from_boxed_slice(
            vec![Tally(&drops), Tally(&drops), Tally(&drops)].into_boxed_slice(),
        );
        let b = a.clone();
        drop(a);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 3);
    }

    /// Invariant: `clone_from` distinguishes two zero-length blocks
    /// even though their dangling element pointers coincide; the counts
    /// move to the adopted record.
    #[test]
    fn clone_from_rebinds_zero_length_blocks() {
        let a = SharedArray::<u32>::new(0);
        let mut b = SharedArray::<u32>::new(0);
        assert_ne!(a, b);
        b.clone_from(&a);
        assert_eq!(a.use_count(), 2);
        assert_eq!(a, b);
        b.clone_from(&a);
        assert_eq!(a.use_count(), 2);
    }

    /// Invariant: the `[]` operators fail fast with the same message
    /// the fallible API reports.
    #[test]
    #[should_panic(expected = "out of bounds")]
    fn index_operator_panics_past_end() {
        let a = SharedArray::<i8>::new(1);
        let _ = a[1];
    }

    /// Invariant: indexing an empty handle panics with the null-access
    /// message, not a bounds message.
    #[test]
    #[should_panic(expected = "empty array handle")]
    fn index_operator_panics_on_empty() {
        let e = SharedArray::<i8>::empty();
        let _ = e[0];
    }
}
