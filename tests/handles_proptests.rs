// Handle property tests (consolidated).
//
// Property 1: shared counts stay in lockstep with live handles.
//  - Model: per-slot vector of live Shared handles; slot k's payload
//    records origin k and a drop tally.
//  - Invariant: every handle in slot k reads use_count == live[k].len()
//    and origin k; each allocation's payload drops exactly once.
//  - Operations: new, clone, drop-one, drop-all, take, clone_from
//    across slots (which migrates the handle to the source's slot).
//
// Property 2: array access matches a Vec model under aliasing.
//  - Model: a Vec<u32> mirror of the block plus a vector of aliases.
//  - Invariant: reads agree with the model; writes succeed only while
//    the handle is sole and in bounds; every failure names the exact
//    error (OutOfBounds carries the probed index and length, Aliased
//    carries the observed count); the length never changes.
//  - Operations: read, write, clone alias, drop alias, slice compare.
//
// Property 3: unique handles preserve exactly-one-destroy across
// transfers.
//  - Model: a vector of slots (empty handles stand for vacancy) plus
//    expected payload ids per slot and a created/dropped tally.
//  - Invariant: drops == created - live after every step; each slot's
//    payload id matches the model; the ledger returns to base.
//  - Operations: new (displacing), move between slots, release then
//    readopt, clear, swap.
use proptest::prelude::*;
use rc_handles::{HandleError, Shared, SharedArray, Unique};
use std::cell::Cell;

struct Tag<'a> {
    origin: usize,
    bump: &'a Cell<u32>,
}

impl Drop for Tag<'_> {
    fn drop(&mut self) {
        self.bump.set(self.bump.get() + 1);
    }
}

// Property 1: shared counts in lockstep with live handles.
proptest! {
    #[test]
    fn prop_shared_counts_track_handles(
        slots in 1usize..=4,
        ops in proptest::collection::vec((0u8..=5u8, 0usize..64usize, 0usize..64usize), 1..100)
    ) {
        let base = rc_handles::ledger::live();
        let drops = Cell::new(0u32);
        let mut created = 0u32;
        let mut live: Vec<Vec<Shared<Tag>>> = (0..slots).map(|_| Vec::new()).collect();

        for (op, a, b) in ops {
            let k = a % slots;
            let j = b % slots;
            match op {
                // New allocation, only into a vacant slot.
                0 => {
                    if live[k].is_empty() {
                        live[k].push(Shared::new(Tag { origin: k, bump: &drops }));
                        created += 1;
                    }
                }
                // Clone one existing handle in the slot.
                1 => {
                    if let Some(h) = live[k].last() {
                        let c = h.clone();
                        live[k].push(c);
                    }
                }
                // Drop one handle.
                2 => {
                    if let Some(h) = live[k].pop() {
                        drop(h);
                    }
                }
                // Drop every handle in the slot (release at zero).
                3 => {
                    while let Some(h) = live[k].pop() {
                        drop(h);
                    }
                }
                // Take: the attachment moves, the count must not.
                4 => {
                    if let Some(mut h) = live[k].pop() {
                        let t = h.take();
                        prop_assert!(h.is_empty());
                        prop_assert_eq!(h.use_count(), 0);
                        live[k].push(t);
                    }
                }
                // clone_from: rebind one handle of k onto j's allocation;
                // it then belongs to slot j.
                5 => {
                    if let Some(mut h) = live[k].pop() {
                        match live[j].first() {
                            Some(src) => {
                                h.clone_from(src);
                                live[j].push(h);
                            }
                            None => live[k].push(h),
                        }
                    }
                }
                _ => unreachable!(),
            }

            // Invariant after each step: counts and origins agree with
            // the model in every slot.
            for (t, group) in live.iter().enumerate() {
                for h in group {
                    prop_assert_eq!(h.use_count(), group.len());
                    prop_assert_eq!(h.try_get().expect("live handle").origin, t);
                }
            }
        }

        // Drain everything: each allocation released exactly once, and
        // the ledger is back at base (it reads zero in release builds).
        for group in &mut live {
            while let Some(h) = group.pop() {
                drop(h);
            }
        }
        prop_assert_eq!(drops.get(), created);
        prop_assert_eq!(rc_handles::ledger::live(), base);
    }
}

// Property 2: array access matches a Vec model under aliasing.
proptest! {
    #[test]
    fn prop_array_access_matches_model(
        len in 0usize..8,
        ops in proptest::collection::vec((0u8..=4u8, 0usize..16usize, 0u32..1000u32), 1..100)
    ) {
        let mut arr = SharedArray::<u32>::new(len);
        let mut model = vec![0u32; len];
        let mut aliases: Vec<SharedArray<u32>> = Vec::new();

        for (op, i, v) in ops {
            match op {
                // Read: agrees with the model in bounds, names the
                // probed index and length past the end.
                0 => match arr.try_get(i) {
                    Ok(got) => {
                        prop_assert!(i < len);
                        prop_assert_eq!(*got, model[i]);
                    }
                    Err(HandleError::OutOfBounds { index, len: l }) => {
                        prop_assert!(i >= len);
                        prop_assert_eq!((index, l), (i, len));
                    }
                    Err(e) => prop_assert!(false, "unexpected read error {:?}", e),
                },
                // Write: only while sole and in bounds; the bound is
                // checked before the aliasing gate.
                1 => match arr.try_get_mut(i) {
                    Ok(slot) => {
                        prop_assert!(aliases.is_empty());
                        prop_assert!(i < len);
                        *slot = v;
                        model[i] = v;
                    }
                    Err(HandleError::OutOfBounds { index, len: l }) => {
                        prop_assert!(i >= len);
                        prop_assert_eq!((index, l), (i, len));
                    }
                    Err(HandleError::Aliased { count }) => {
                        prop_assert!(i < len);
                        prop_assert!(!aliases.is_empty());
                        prop_assert_eq!(count, aliases.len() + 1);
                    }
                    Err(e) => prop_assert!(false, "unexpected write error {:?}", e),
                },
                // Attach an alias.
                2 => aliases.push(arr.clone()),
                // Drop an alias.
                3 => {
                    if let Some(h) = aliases.pop() {
                        drop(h);
                    }
                }
                // Whole-slice view agrees with the model.
                4 => {
                    prop_assert_eq!(arr.try_as_slice().expect("live handle"), model.as_slice());
                }
                _ => unreachable!(),
            }

            // Invariant after each step: length fixed, count exact,
            // content matches the model.
            prop_assert_eq!(arr.len(), len);
            prop_assert_eq!(arr.use_count(), aliases.len() + 1);
            prop_assert_eq!(arr.try_as_slice().expect("live handle"), model.as_slice());
            for alias in &aliases {
                prop_assert_eq!(alias.len(), len);
            }
        }
    }
}

// Property 3: unique handles preserve exactly-one-destroy.
proptest! {
    #[test]
    fn prop_unique_transfers_destroy_once(
        n in 1usize..=4,
        ops in proptest::collection::vec((0u8..=4u8, 0usize..64usize, 0usize..64usize), 1..100)
    ) {
        let base = rc_handles::ledger::live();
        let drops = Cell::new(0u32);
        let mut created = 0u32;
        let mut slots: Vec<Unique<Tag>> = (0..n).map(|_| Unique::empty()).collect();
        let mut ids: Vec<Option<usize>> = vec![None; n];
        let mut next_id = 0usize;

        for (op, a, b) in ops {
            let k = a % n;
            let j = b % n;
            match op {
                // New payload displaces whatever the slot held.
                0 => {
                    slots[k] = Unique::new(Tag { origin: next_id, bump: &drops });
                    ids[k] = Some(next_id);
                    next_id += 1;
                    created += 1;
                }
                // Move k into j; moving a slot onto itself is identity.
                1 => {
                    let h = slots[k].take();
                    slots[j] = h;
                    let moved = ids[k].take();
                    ids[j] = moved;
                }
                // Release then readopt: custody leaves the crate and
                // comes back, the payload untouched.
                2 => {
                    let raw = slots[k].release();
                    // Safety: just released by this handle, adopted
                    // back exactly once.
                    slots[k] = unsafe { Unique::from_raw(raw) };
                }
                // Clear the slot.
                3 => {
                    slots[k] = Unique::empty();
                    ids[k] = None;
                }
                // Swap two slots.
                4 => {
                    slots.swap(k, j);
                    ids.swap(k, j);
                }
                _ => unreachable!(),
            }

            // Invariant after each step: occupancy and ids match the
            // model, and drop accounting balances.
            let live_count = slots.iter().filter(|s| !s.is_empty()).count() as u32;
            prop_assert_eq!(drops.get(), created - live_count);
            for (slot, id) in slots.iter().zip(&ids) {
                prop_assert_eq!(slot.is_empty(), id.is_none());
                prop_assert_eq!(slot.as_ptr().is_null(), id.is_none());
                if let Some(id) = id {
                    prop_assert_eq!(slot.try_get().expect("occupied slot").origin, *id);
                }
            }
        }

        // Drain: every created payload destroyed exactly once.
        for slot in &mut slots {
            *slot = Unique::empty();
        }
        prop_assert_eq!(drops.get(), created);
        prop_assert_eq!(rc_handles::ledger::live(), base);
    }
}
