use {
    crate::{
        callable::{Callable, SharedCallable},
        error::InvalidCall,
        function_ref::FunctionRef,
    },
    static_assertions::{assert_eq_size, assert_not_impl_any, const_assert},
    std::{
        any::TypeId,
        fmt,
        mem::{self, align_of, size_of, MaybeUninit},
        ptr,
    },
};

/// Number of machine words available for inline callable storage.
const INLINE_WORDS: usize = 2;

/// Amount of memory, in bytes, available to store a callable inline in a [`UniqueFunction`].
///
/// x86: 8b, x64: 16b. Callables larger than this are stored on the heap.
///
/// [`UniqueFunction`]: struct.UniqueFunction.html
pub const INLINE_CAPACITY: usize = INLINE_WORDS * size_of::<usize>();

/// Alignment of the inline storage buffer.
/// Callables with a stricter alignment are stored on the heap even if they fit in [`INLINE_CAPACITY`].
///
/// [`INLINE_CAPACITY`]: constant.INLINE_CAPACITY.html
pub const INLINE_ALIGN: usize = align_of::<usize>();

/// Static function which
/// 1) casts the object pointer to the concrete callable type,
/// 2) calls it with the argument tuple.
type Invoker<A, R> = unsafe fn(*mut u8, A) -> R;

/// Static function which drops the concrete callable at the object pointer,
/// in place for inline storage, freeing the allocation for heap storage.
type DropHandler = unsafe fn(*mut u8);

/// Where the callable lives.
#[derive(Clone, Copy, Eq, Debug, PartialEq)]
enum StorageTag {
    Inline,
    Heap,
}

/// Vtable for a concrete callable type which knows
/// 1) how to drop it;
/// 2) its `TypeId`;
/// 3) whether its storage is inline or on the heap.
/// A static reference to this is stored in the function; the signature-dependent invoker is stored
/// next to it.
struct ObjectVTable {
    drop: DropHandler,
    type_id: fn() -> TypeId,
    storage_tag: StorageTag,
}

static EMPTY_VTABLE: ObjectVTable = ObjectVTable {
    drop: drop_nothing,
    type_id: TypeId::of::<()>,
    storage_tag: StorageTag::Heap,
};

unsafe fn invoke<F: Callable<A, R>, A, R>(object: *mut u8, args: A) -> R {
    (*(object as *mut F)).call_mut(args)
}

unsafe fn drop_inline<F>(object: *mut u8) {
    ptr::drop_in_place(object as *mut F);
}

unsafe fn drop_heap<F>(object: *mut u8) {
    drop(Box::from_raw(object as *mut F));
}

unsafe fn drop_nothing(_: *mut u8) {}

fn fits_inline<F>() -> bool {
    size_of::<F>() <= INLINE_CAPACITY && align_of::<F>() <= INLINE_ALIGN
}

/// Callable storage, inline or heap.
/// Tag/discriminant is encoded in the vtable.
#[repr(C)]
union Storage {
    inline: MaybeUninit<[usize; INLINE_WORDS]>,
    heap: *mut u8,
}

impl Storage {
    fn empty() -> Self {
        Self {
            heap: ptr::null_mut(),
        }
    }

    fn object(&self, storage_tag: StorageTag) -> *const u8 {
        match storage_tag {
            StorageTag::Inline => self as *const Self as *const u8,
            StorageTag::Heap => unsafe { self.heap },
        }
    }

    fn object_mut(&mut self, storage_tag: StorageTag) -> *mut u8 {
        match storage_tag {
            StorageTag::Inline => self as *mut Self as *mut u8,
            StorageTag::Heap => unsafe { self.heap },
        }
    }
}

assert_eq_size!(Storage, [u8; INLINE_CAPACITY]);
const_assert!(size_of::<*mut u8>() <= INLINE_CAPACITY);

/// Move-only, type-erased callable with signature `R(A)`, where `A` is the argument tuple.
///
/// Internally uses the small function optimization: callables of up to [`INLINE_CAPACITY`] bytes
/// (and no stricter alignment than [`INLINE_ALIGN`]) are stored inline, larger ones on the heap.
/// Behaviour is identical for both; only the allocation differs.
///
/// Stored callables must be `'static`, which is what makes [`target_type`] / [`target`] possible.
///
/// Not internally synchronized, and neither `Send` nor `Sync`: the concrete type is erased,
/// so nothing is known about its thread safety.
///
/// ```
/// use minifunction::UniqueFunction;
///
/// let mut f: UniqueFunction<(i32, i32), i32> = UniqueFunction::new(|a: i32, b: i32| a + b);
/// assert_eq!(f.call(1, 2), Ok(3));
///
/// let mut g = f.take();
/// assert!(!f.has_value());
/// assert_eq!(g.call(3, 4), Ok(7));
/// ```
///
/// [`INLINE_CAPACITY`]: constant.INLINE_CAPACITY.html
/// [`INLINE_ALIGN`]: constant.INLINE_ALIGN.html
/// [`target_type`]: #method.target_type
/// [`target`]: #method.target
pub struct UniqueFunction<A, R> {
    /// `None` iff the function is empty.
    invoke: Option<Invoker<A, R>>,
    vtable: &'static ObjectVTable,
    storage: Storage,
}

assert_eq_size!(UniqueFunction<(), ()>, [usize; INLINE_WORDS + 2]);
assert_not_impl_any!(UniqueFunction<(), ()>: Send, Sync, Clone);

impl<A, R> UniqueFunction<A, R> {
    /// Creates an empty function. Calling it returns [`InvalidCall`].
    ///
    /// [`InvalidCall`]: struct.InvalidCall.html
    pub fn empty() -> Self {
        Self {
            invoke: None,
            vtable: &EMPTY_VTABLE,
            storage: Storage::empty(),
        }
    }

    /// Creates a function which owns the callable `f`.
    ///
    /// `f` is stored inline if it fits, otherwise it is moved into a single heap allocation.
    pub fn new<F>(f: F) -> Self
    where
        F: Callable<A, R> + 'static,
    {
        let mut result = Self::empty();
        result.store(f);
        result
    }

    /// Replaces the stored callable with `f`.
    ///
    /// The previous callable, if any, is dropped before `f` is stored.
    pub fn set<F>(&mut self, f: F)
    where
        F: Callable<A, R> + 'static,
    {
        self.clear();
        self.store(f);
    }

    /// Drops the stored callable, if any, freeing the heap allocation if necessary.
    /// The function is empty afterwards.
    pub fn clear(&mut self) {
        // Reset before dropping so a panicking destructor leaves `self` empty.
        self.invoke = None;
        let vtable = mem::replace(&mut self.vtable, &EMPTY_VTABLE);

        unsafe {
            (vtable.drop)(self.storage.object_mut(vtable.storage_tag));
        }

        self.storage = Storage::empty();
    }

    /// Moves the stored callable out into a new function, leaving `self` empty.
    ///
    /// Taking from an empty function returns an empty function.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }

    /// Swaps the stored callables of `self` and `other`.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Calls the stored callable with the argument tuple `args`.
    ///
    /// Returns [`InvalidCall`] if the function is empty.
    ///
    /// [`InvalidCall`]: struct.InvalidCall.html
    #[inline]
    pub fn invoke(&mut self, args: A) -> Result<R, InvalidCall> {
        let invoke = self.invoke.ok_or(InvalidCall)?;
        let object = self.storage.object_mut(self.vtable.storage_tag);

        Ok(unsafe { invoke(object, args) })
    }

    /// If the function holds a callable, returns `true`; otherwise returns `false`.
    #[inline]
    pub fn has_value(&self) -> bool {
        self.invoke.is_some()
    }

    /// Returns `true` if the stored callable lives in the inline buffer.
    /// Always `false` for an empty function.
    pub fn is_inline(&self) -> bool {
        self.has_value() && self.vtable.storage_tag == StorageTag::Inline
    }

    /// `TypeId` of the stored callable, or of `()` if the function is empty.
    pub fn target_type(&self) -> TypeId {
        (self.vtable.type_id)()
    }

    /// Returns a reference to the stored callable if it is exactly of type `T`.
    pub fn target<T: 'static>(&self) -> Option<&T> {
        if self.holds::<T>() {
            let object = self.storage.object(self.vtable.storage_tag) as *const T;
            Some(unsafe { &*object })
        } else {
            None
        }
    }

    /// Returns a mutable reference to the stored callable if it is exactly of type `T`.
    pub fn target_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.holds::<T>() {
            let object = self.storage.object_mut(self.vtable.storage_tag) as *mut T;
            Some(unsafe { &mut *object })
        } else {
            None
        }
    }

    /// Returns a [`FunctionRef`] to the stored callable if it is exactly of type `T`,
    /// otherwise an empty one.
    ///
    /// The reference borrows `self`, so the function can't be moved, cleared or reassigned
    /// while the reference is alive.
    ///
    /// [`FunctionRef`]: struct.FunctionRef.html
    pub fn get_ref<T>(&self) -> FunctionRef<'_, A, R>
    where
        T: SharedCallable<A, R> + 'static,
    {
        match self.target::<T>() {
            Some(target) => FunctionRef::new_typed(target),
            None => FunctionRef::empty(),
        }
    }

    fn store<F>(&mut self, f: F)
    where
        F: Callable<A, R> + 'static,
    {
        debug_assert!(!self.has_value());

        if fits_inline::<F>() {
            unsafe {
                ptr::write(&mut self.storage as *mut Storage as *mut F, f);
            }

            self.vtable = &ObjectVTable {
                drop: drop_inline::<F>,
                type_id: TypeId::of::<F>,
                storage_tag: StorageTag::Inline,
            };
        } else {
            self.storage.heap = Box::into_raw(Box::new(f)) as *mut u8;

            self.vtable = &ObjectVTable {
                drop: drop_heap::<F>,
                type_id: TypeId::of::<F>,
                storage_tag: StorageTag::Heap,
            };
        }

        self.invoke = Some(invoke::<F, A, R>);
    }

    fn holds<T: 'static>(&self) -> bool {
        self.has_value() && self.target_type() == TypeId::of::<T>()
    }
}

impl<A, R> Default for UniqueFunction<A, R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A, R> Drop for UniqueFunction<A, R> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A, R> fmt::Debug for UniqueFunction<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueFunction")
            .field("has_value", &self.has_value())
            .field("storage", &self.vtable.storage_tag)
            .field("vtable", &(self.vtable as *const ObjectVTable))
            .finish()
    }
}
