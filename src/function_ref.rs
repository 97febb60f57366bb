use {
    crate::{callable::SharedCallable, error::InvalidCall},
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{any::TypeId, fmt, marker::PhantomData, ptr},
};

/// Static function which casts the target pointer back to the referenced callable
/// (or function pointer) and calls it with the argument tuple.
type RefInvoker<A, R> = unsafe fn(*const (), A) -> R;

/// Non-owning, copyable, type-erased reference to a callable with signature `R(A)`.
///
/// Never allocates; holds the address of the referenced callable and a thunk which knows how to
/// call it. The referent must outlive the reference, which the `'a` lifetime enforces.
///
/// Only shared access to the referent is ever handed out, so any number of copies may coexist.
/// A `FunctionRef` is not itself a [`SharedCallable`]: copying it is the only way to get another
/// reference to the same callable.
///
/// Any callable can be referenced, including closures borrowing locals. Only references created
/// with [`new_typed`] from a `'static` callable know its type: the others report the type of `()`
/// from [`target_type`] and never return a [`target`].
///
/// ```
/// use minifunction::FunctionRef;
///
/// let offset = 10;
/// let add = move |x: i32| x + offset;
///
/// let r = FunctionRef::<(i32,), i32>::new(&add);
/// let copy = r;
///
/// assert_eq!(r.call(1), Ok(11));
/// assert_eq!(copy.call(2), Ok(12));
/// ```
///
/// [`SharedCallable`]: trait.SharedCallable.html
/// [`new_typed`]: #method.new_typed
/// [`target_type`]: #method.target_type
/// [`target`]: #method.target
pub struct FunctionRef<'a, A, R> {
    ptr: *const (),
    /// `None` iff the reference is empty.
    invoke: Option<RefInvoker<A, R>>,
    type_id: fn() -> TypeId,
    /// `true` iff `ptr` points to an object of the type `type_id` reports.
    addressable: bool,
    _marker: PhantomData<&'a ()>,
}

assert_impl_all!(FunctionRef<'static, (), ()>: Copy, Clone);
assert_not_impl_any!(FunctionRef<'static, (), ()>: Send, Sync);

unsafe fn invoke_ref<T: SharedCallable<A, R>, A, R>(ptr: *const (), args: A) -> R {
    (*(ptr as *const T)).call_ref(args)
}

impl<'a, A, R> FunctionRef<'a, A, R> {
    /// Creates an empty reference. Calling it returns [`InvalidCall`].
    ///
    /// [`InvalidCall`]: struct.InvalidCall.html
    pub fn empty() -> Self {
        Self {
            ptr: ptr::null(),
            invoke: None,
            type_id: TypeId::of::<()>,
            addressable: false,
            _marker: PhantomData,
        }
    }

    /// Creates a reference to the callable `target`.
    ///
    /// `target` may borrow from the enclosing scope. Its type is not recorded:
    /// see [`new_typed`].
    ///
    /// [`new_typed`]: #method.new_typed
    pub fn new<T>(target: &'a T) -> Self
    where
        T: SharedCallable<A, R>,
    {
        Self {
            ptr: target as *const T as *const (),
            invoke: Some(invoke_ref::<T, A, R>),
            type_id: TypeId::of::<()>,
            addressable: false,
            _marker: PhantomData,
        }
    }

    /// Creates a reference to the `'static` callable `target`, recording its type
    /// for [`target_type`] and [`target`].
    ///
    /// [`target_type`]: #method.target_type
    /// [`target`]: #method.target
    pub fn new_typed<T>(target: &'a T) -> Self
    where
        T: SharedCallable<A, R> + 'static,
    {
        Self {
            type_id: TypeId::of::<T>,
            addressable: true,
            ..Self::new(target)
        }
    }

    /// # Safety
    ///
    /// `invoke` must accept `ptr` as its first argument.
    pub(crate) unsafe fn from_function_ptr(
        ptr: *const (),
        invoke: RefInvoker<A, R>,
        type_id: fn() -> TypeId,
    ) -> Self {
        Self {
            ptr,
            invoke: Some(invoke),
            type_id,
            addressable: false,
            _marker: PhantomData,
        }
    }

    /// Calls the referenced callable with the argument tuple `args`.
    ///
    /// Returns [`InvalidCall`] if the reference is empty.
    ///
    /// [`InvalidCall`]: struct.InvalidCall.html
    #[inline]
    pub fn invoke(&self, args: A) -> Result<R, InvalidCall> {
        let invoke = self.invoke.ok_or(InvalidCall)?;

        Ok(unsafe { invoke(self.ptr, args) })
    }

    /// If the reference points to a callable, returns `true`; otherwise returns `false`.
    #[inline]
    pub fn has_value(&self) -> bool {
        self.invoke.is_some()
    }

    /// `TypeId` of the referenced callable.
    ///
    /// The type of `()` if the reference is empty or was created with [`new`].
    ///
    /// [`new`]: #method.new
    pub fn target_type(&self) -> TypeId {
        (self.type_id)()
    }

    /// Returns the referenced callable if it is exactly of type `T`.
    ///
    /// Always `None` for references created by [`new`] or [`from_fn`].
    ///
    /// [`new`]: #method.new
    /// [`from_fn`]: #method.from_fn
    pub fn target<T: 'static>(&self) -> Option<&'a T> {
        if self.addressable && self.target_type() == TypeId::of::<T>() {
            Some(unsafe { &*(self.ptr as *const T) })
        } else {
            None
        }
    }
}

impl<'a, A, R> Clone for FunctionRef<'a, A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, A, R> Copy for FunctionRef<'a, A, R> {}

impl<'a, A, R> Default for FunctionRef<'a, A, R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, T, A, R> From<&'a T> for FunctionRef<'a, A, R>
where
    T: SharedCallable<A, R>,
{
    fn from(target: &'a T) -> Self {
        Self::new(target)
    }
}

impl<'a, A, R> fmt::Debug for FunctionRef<'a, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("has_value", &self.has_value())
            .field("ptr", &self.ptr)
            .finish()
    }
}
