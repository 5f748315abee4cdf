//! Header state guarded by the per-instance lock.
//!
//! With `thread-safe` the state sits behind a [`spin::Mutex`]; otherwise it is
//! a bare cell and "locking" just hands out the mutable view. Either way every
//! mutating allocator call goes through [`Guarded::lock`] and the guard is
//! released on every exit path when it goes out of scope.

cfg_if::cfg_if! {
    if #[cfg(feature = "thread-safe")] {
        pub(crate) use spin::MutexGuard as Guard;

        pub(crate) struct Guarded<T> {
            inner: spin::Mutex<T>,
        }

        impl<T> Guarded<T> {
            pub(crate) const fn new(value: T) -> Self {
                Self {
                    inner: spin::Mutex::new(value),
                }
            }

            pub(crate) fn lock(&self) -> Guard<'_, T> {
                self.inner.lock()
            }
        }
    } else {
        use core::{
            cell::UnsafeCell,
            ops::{Deref, DerefMut},
        };

        #[repr(transparent)]
        pub(crate) struct Guarded<T> {
            inner: UnsafeCell<T>,
        }

        pub(crate) struct Guard<'a, T> {
            value: &'a mut T,
        }

        impl<T> Guarded<T> {
            pub(crate) const fn new(value: T) -> Self {
                Self {
                    inner: UnsafeCell::new(value),
                }
            }

            /// Returns exclusive access to the state.
            ///
            /// Without `thread-safe` the allocator views are `!Sync`, and no
            /// allocator method locks the same header twice, so the returned
            /// guard is the only live reference to the state.
            pub(crate) fn lock(&self) -> Guard<'_, T> {
                Guard {
                    value: unsafe { &mut *self.inner.get() },
                }
            }
        }

        impl<T> Deref for Guard<'_, T> {
            type Target = T;

            fn deref(&self) -> &T {
                self.value
            }
        }

        impl<T> DerefMut for Guard<'_, T> {
            fn deref_mut(&mut self) -> &mut T {
                self.value
            }
        }
    }
}
