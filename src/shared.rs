//! Reference-counted shared handle over one heap allocation.
//!
//! Every shared allocation is guarded by exactly one heap [`Record`]
//! holding the alias count and the payload pointer. Aliasing handles
//! all point at that record, and each holds one linear count token as
//! proof of attachment. The record is the single release authority:
//! the only code that frees the payload or the record is [`release`],
//! which runs when the count returns to zero.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::{self, NonNull};

use crate::error::HandleError;
use crate::ledger;
use crate::tokens::{AliasCount, Token};

/// Per-allocation count record. Outlives every handle attached to it;
/// freed exactly once, after its payload, when the count reaches zero.
struct Record<T> {
    count: AliasCount,
    payload: NonNull<T>,
}

/// A handle's live attachment: the record plus the one count token this
/// handle is responsible for returning.
struct Binding<T> {
    record: NonNull<Record<T>>,
    token: Token<AliasCount>,
}

/// Shared owner of a single heap-allocated `T`.
///
/// Cloning attaches another handle to the same allocation and raises
/// [`use_count`](Shared::use_count) by one; dropping a handle lowers it,
/// and the last drop frees the payload and its record. An empty handle
/// owns nothing and reports a count of zero. Equality and hashing use
/// allocation identity, so clones compare equal and empty handles equal
/// each other.
///
/// Reads go through [`try_get`](Shared::try_get) or `Deref`; mutation
/// goes through [`try_get_mut`](Shared::try_get_mut), which refuses
/// while the allocation is aliased. `Shared` is single-threaded state
/// and is neither `Send` nor `Sync`.
pub struct Shared<T> {
    bind: Option<Binding<T>>,
    // Dropping the last handle drops a T.
    _owns: PhantomData<T>,
}

/// Allocates the record for a freshly adopted payload and mints its
/// first token, yielding a count of one.
fn adopt<T>(payload: NonNull<T>) -> Binding<T> {
    let record = NonNull::from(Box::leak(Box::new(Record {
        count: AliasCount::new(0),
        payload,
    })));
    ledger::register_record(record);
    // Safety: the record was just leaked and nothing else refers to it.
    let token = unsafe { record.as_ref() }.count.get();
    Binding { record, token }
}

/// The one place attachments end. Returns the handle's token; when it
/// was the last one, frees the payload and then the record, each
/// exactly once.
fn release<T>(bind: Binding<T>) {
    let Binding { record, token } = bind;
    // Safety: the record stays allocated until its last token comes
    // back, and `token` proves one is still outstanding.
    let last = unsafe { record.as_ref() }.count.put(token);
    if last {
        ledger::retire_record(record);
        // Safety: the count reached zero, so no handle can observe the
        // record or the payload anymore.
        let rec = unsafe { Box::from_raw(record.as_ptr()) };
        ledger::retire_payload(rec.payload);
        drop(unsafe { Box::from_raw(rec.payload.as_ptr()) });
    }
}

impl<T> Shared<T> {
    /// Creates an empty handle. No allocation happens and the count
    /// reads zero.
    #[inline]
    pub fn empty() -> Self {
        Self {
            bind: None,
            _owns: PhantomData,
        }
    }

    /// Moves `value` to the heap and starts sharing it at a count of
    /// one.
    pub fn new(value: T) -> Self {
        let payload = NonNull::from(Box::leak(Box::new(value)));
        ledger::register_payload(payload);
        Self {
            bind: Some(adopt(payload)),
            _owns: PhantomData,
        }
    }

    /// Adopts an existing allocation and starts sharing it at a count
    /// of one. A null `ptr` yields an empty handle with a count of
    /// zero.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from `Box::<T>::into_raw` (or
    /// [`Unique::release`](crate::Unique::release)) and nothing else
    /// may own or free it afterwards: the last handle frees it with
    /// `Box::from_raw` exactly once.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(payload) => {
                ledger::register_payload(payload);
                Self {
                    bind: Some(adopt(payload)),
                    _owns: PhantomData,
                }
            }
            None => Self::empty(),
        }
    }

    /// Raw pointer to the shared value, null when empty. Ownership
    /// stays with the handles.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        match &self.bind {
            Some(b) => unsafe { b.record.as_ref() }.payload.as_ptr(),
            None => ptr::null(),
        }
    }

    /// True when the handle owns nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bind.is_none()
    }

    /// Number of handles currently attached to the allocation, zero for
    /// an empty handle.
    #[inline]
    pub fn use_count(&self) -> usize {
        match &self.bind {
            Some(b) => unsafe { b.record.as_ref() }.count.count(),
            None => 0,
        }
    }

    /// Borrows the shared value, or reports `NullDeref` when empty.
    #[inline]
    pub fn try_get(&self) -> Result<&T, HandleError> {
        match &self.bind {
            Some(b) => {
                // Safety: record and payload stay live while any handle
                // is attached, and the borrow keeps `self` attached.
                let rec = unsafe { b.record.as_ref() };
                Ok(unsafe { &*rec.payload.as_ptr() })
            }
            None => Err(HandleError::NullDeref),
        }
    }

    /// Mutably borrows the shared value.
    ///
    /// Fails with `NullDeref` when empty and with `Aliased` while any
    /// other handle is attached; mutation is only allowed through the
    /// sole handle, so no alias can observe it mid-write.
    pub fn try_get_mut(&mut self) -> Result<&mut T, HandleError> {
        match &self.bind {
            Some(b) => {
                let rec = unsafe { b.record.as_ref() };
                let count = rec.count.count();
                if count != 1 {
                    return Err(HandleError::Aliased { count });
                }
                // Safety: count 1 means this is the only attached
                // handle, and the exclusive borrow of it blocks every
                // other path to the payload.
                Ok(unsafe { &mut *rec.payload.as_ptr() })
            }
            None => Err(HandleError::NullDeref),
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

    /// Same allocation test that stays exact for zero-sized payloads,
    /// whose dangling pointers collide across instances.
    #[inline]
    fn same_record(&self, other: &Self) -> bool {
        match (&self.bind, &other.bind) {
            (Some(a), Some(b)) => a.record == b.record,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for Shared<T> {
    /// Attaches one more handle to the same allocation, raising the
    /// count by one. Cloning an empty handle yields an empty handle.
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

    /// Rebinds `self` to `source`'s allocation, detaching from the
    /// current one first. Assigning a handle over an alias of itself is
    /// a no-op, so the shared allocation is never released mid-assign.
    fn clone_from(&mut self, source: &Self) {
        if self.same_record(source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(bind) = self.bind.take() {
            release(bind);
        }
    }
}

impl<T> Default for Shared<T> {
    /// The default handle is empty.
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    /// Panics when the handle is empty. [`Shared::try_get`] is the
    /// fallible form.
    #[inline]
    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T> PartialEq for Shared<T> {
    /// Allocation identity: aliases of one allocation are equal, empty
    /// handles are equal, distinct allocations are not, zero-sized
    /// payloads included.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same_record(other)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let addr = match &self.bind {
            Some(b) => b.record.as_ptr() as usize,
            None => 0,
        };
        addr.hash(state);
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("ptr", &self.as_ptr())
            .field("use_count", &self.use_count())
            .finish()
    }
}
