//! Property-based tests for ownership transfer and storage transparency.
//!
//! Whether a callable lands in the inline buffer or on the heap must never change what it
//! returns, and `take` must leave exactly one live owner behind.

use std::{cell::Cell, rc::Rc};

use proptest::prelude::*;

use minifunction::{FunctionRef, InvalidCall, UniqueFunction};

/// Counts how many times it was dropped.
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn inline_and_heap_agree(seed in any::<i64>(), pad in any::<[u8; 32]>(), arg in any::<i64>()) {
        let mut small: UniqueFunction<(i64,), i64> =
            UniqueFunction::new(move |x: i64| x.wrapping_mul(seed));

        let mut large: UniqueFunction<(i64,), i64> = UniqueFunction::new(move |x: i64| {
            let _pad = &pad;
            x.wrapping_mul(seed)
        });

        prop_assert!(small.is_inline());
        prop_assert!(!large.is_inline());
        prop_assert_eq!(small.call(arg), large.call(arg));

        // Same answers after swapping storage locations between the two owners.
        small.swap(&mut large);
        prop_assert!(!small.is_inline());
        prop_assert!(large.is_inline());
        prop_assert_eq!(small.call(arg), large.call(arg));
    }

    #[test]
    fn take_transfers_ownership(heap in any::<bool>(), calls in 1usize..8) {
        let drops = Rc::new(Cell::new(0));
        let counter = DropCounter(drops.clone());
        let pad = [0u8; 32];

        let mut source: UniqueFunction<(), usize> = if heap {
            UniqueFunction::new(move || counter.0.get() + pad.len())
        } else {
            UniqueFunction::new(move || counter.0.get())
        };
        prop_assert_eq!(source.is_inline(), !heap);

        let mut dest = source.take();
        prop_assert!(!source.has_value());
        prop_assert_eq!(source.call(), Err(InvalidCall));

        for _ in 0..calls {
            prop_assert!(dest.call().is_ok());
        }
        prop_assert_eq!(drops.get(), 0);

        drop(source);
        prop_assert_eq!(drops.get(), 0);

        drop(dest);
        prop_assert_eq!(drops.get(), 1);
    }

    #[test]
    fn reference_matches_owner(seed in any::<i64>(), arg in any::<i64>()) {
        let closure = move |x: i64| x ^ seed;

        let mut owner: UniqueFunction<(i64,), i64> = UniqueFunction::new(closure);
        let expected = owner.call(arg);

        let r = FunctionRef::<(i64,), i64>::new_typed(&closure);
        prop_assert_eq!(r.call(arg), expected);
        prop_assert_eq!(r.target_type(), owner.target_type());
    }
}
