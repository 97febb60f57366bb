//! Move-only type-erased callables with inline small-object storage.
//!
//! - [`UniqueFunction`] owns a callable of any `'static` type behind a fixed call signature.
//!   Callables of up to [`INLINE_CAPACITY`] bytes are stored inline, larger ones on the heap.
//! - [`FunctionRef`] is a copyable, non-owning reference to a callable; it never allocates.
//! - [`ThreadPool`] runs a queue of [`UniqueFunction`] tasks on worker threads.
//!
//! Signatures are written as an argument tuple plus a result type: `R(A0, A1)` is
//! `UniqueFunction<(A0, A1), R>`. Calling an empty function or reference returns [`InvalidCall`].
//!
//! ```
//! use minifunction::{FunctionRef, InvalidCall, UniqueFunction};
//!
//! fn add(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! let mut f: UniqueFunction<(), i32> = UniqueFunction::new(|| add(1, 2));
//! assert_eq!(f.call(), Ok(3));
//!
//! let mut g = f.take();
//! assert_eq!(f.call(), Err(InvalidCall));
//! assert_eq!(g.call(), Ok(3));
//!
//! let r = FunctionRef::<(i32, i32), i32>::from_fn(add);
//! assert_eq!(r.call(2, 3), Ok(5));
//! ```
//!
//! [`UniqueFunction`]: struct.UniqueFunction.html
//! [`FunctionRef`]: struct.FunctionRef.html
//! [`ThreadPool`]: struct.ThreadPool.html
//! [`INLINE_CAPACITY`]: constant.INLINE_CAPACITY.html
//! [`InvalidCall`]: struct.InvalidCall.html

#[macro_use]
extern crate static_assertions;

mod callable;
mod error;
mod function_ref;
mod thread_pool;
mod unique_function;

pub use {
    callable::{Callable, SharedCallable},
    error::{InvalidCall, PoolError},
    function_ref::FunctionRef,
    thread_pool::{TaskHandle, ThreadPool, ThreadPoolBuilder},
    unique_function::{UniqueFunction, INLINE_ALIGN, INLINE_CAPACITY},
};

const_assert!(INLINE_CAPACITY >= 2 * std::mem::size_of::<usize>());
const_assert!(INLINE_ALIGN.is_power_of_two());
