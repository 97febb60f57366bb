//! Call signatures expressed as argument tuples.
//!
//! A signature `R(A0, .., An)` is written as the pair `(A, R)` where `A` is the tuple `(A0, .., An)`.
//! Every closure, function item and function pointer of arity 0..=8 implements the traits below
//! through blanket impls; the same macro also provides the positional `call` methods and the
//! `from_fn` constructors of [`UniqueFunction`] and [`FunctionRef`].
//!
//! [`UniqueFunction`]: ../struct.UniqueFunction.html
//! [`FunctionRef`]: ../struct.FunctionRef.html

use std::any::TypeId;
use std::mem;

use crate::error::InvalidCall;
use crate::function_ref::FunctionRef;
use crate::unique_function::UniqueFunction;

/// A callable which may mutate its own state when called.
///
/// Implemented for every `FnMut(A0, .., An) -> R`.
pub trait Callable<A, R> {
    fn call_mut(&mut self, args: A) -> R;
}

/// A callable which only needs shared access to itself when called.
///
/// Implemented for every `Fn(A0, .., An) -> R`.
pub trait SharedCallable<A, R> {
    fn call_ref(&self, args: A) -> R;
}

macro_rules! impl_arity {
    ($($ty:ident $arg:ident),*) => {
        impl<Func, R, $($ty,)*> Callable<($($ty,)*), R> for Func
        where
            Func: FnMut($($ty),*) -> R,
        {
            #[inline]
            #[allow(clippy::unused_unit)]
            fn call_mut(&mut self, ($($arg,)*): ($($ty,)*)) -> R {
                (self)($($arg),*)
            }
        }

        impl<Func, R, $($ty,)*> SharedCallable<($($ty,)*), R> for Func
        where
            Func: Fn($($ty),*) -> R,
        {
            #[inline]
            #[allow(clippy::unused_unit)]
            fn call_ref(&self, ($($arg,)*): ($($ty,)*)) -> R {
                (self)($($arg),*)
            }
        }

        impl<R, $($ty,)*> UniqueFunction<($($ty,)*), R> {
            /// Calls the stored callable with positional arguments.
            ///
            /// Returns [`InvalidCall`] if the function is empty.
            ///
            /// [`InvalidCall`]: struct.InvalidCall.html
            #[inline]
            pub fn call(&mut self, $($arg: $ty),*) -> Result<R, InvalidCall> {
                self.invoke(($($arg,)*))
            }
        }

        impl<R: 'static, $($ty: 'static,)*> UniqueFunction<($($ty,)*), R> {
            /// Creates a function holding the function pointer `f`.
            ///
            /// All function pointers of one signature share a single erased type:
            /// [`target_type`] reports the function pointer type, not the individual function.
            ///
            /// [`target_type`]: #method.target_type
            pub fn from_fn(f: fn($($ty),*) -> R) -> Self {
                Self::new(f)
            }
        }

        impl<'a, R, $($ty,)*> FunctionRef<'a, ($($ty,)*), R> {
            /// Calls the referenced callable with positional arguments.
            ///
            /// Returns [`InvalidCall`] if the reference is empty.
            ///
            /// [`InvalidCall`]: struct.InvalidCall.html
            #[inline]
            pub fn call(&self, $($arg: $ty),*) -> Result<R, InvalidCall> {
                self.invoke(($($arg,)*))
            }
        }

        impl<R: 'static, $($ty: 'static,)*> FunctionRef<'static, ($($ty,)*), R> {
            /// Creates a reference to the function pointer `f`.
            ///
            /// The type tag is the function pointer type, shared by every function of this
            /// signature. There is no addressable object behind the reference, so [`target`]
            /// always returns `None`.
            ///
            /// [`target`]: #method.target
            pub fn from_fn(f: fn($($ty),*) -> R) -> Self {
                #[allow(clippy::unused_unit)]
                unsafe fn invoke_fn<R, $($ty,)*>(ptr: *const (), ($($arg,)*): ($($ty,)*)) -> R {
                    let f = mem::transmute_copy::<*const (), fn($($ty),*) -> R>(&ptr);
                    f($($arg),*)
                }

                unsafe {
                    FunctionRef::from_function_ptr(
                        f as *const (),
                        invoke_fn::<R, $($ty,)*>,
                        TypeId::of::<fn($($ty),*) -> R>,
                    )
                }
            }
        }
    };
}

impl_arity!();
impl_arity!(A0 a0);
impl_arity!(A0 a0, A1 a1);
impl_arity!(A0 a0, A1 a1, A2 a2);
impl_arity!(A0 a0, A1 a1, A2 a2, A3 a3);
impl_arity!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4);
impl_arity!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_arity!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_arity!(A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
