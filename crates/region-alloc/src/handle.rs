//! Handles to blocks handed out by the allocators.
//!
//! A handle refers to an allocated block in one of two representations:
//!
//! - [`AddrHandle`]: the absolute address of the block.
//! - [`OffsetHandle`]: the distance in bytes from the base of the owning
//!   allocator (the first byte of the block the allocator was initialized
//!   over).
//!
//! The representation is picked once for the whole program by the
//! `offset-handles` feature and exposed as [`Handle`]; the two are never mixed
//! within a build. Offset handles stay valid when the whole backing block is
//! copied or remapped elsewhere, which makes them suitable for blocks that are
//! persisted or shared through a memory mapping. Address handles do not
//! survive relocation.
//!
//! The free functions of this module ([`to_handle`], [`to_pointer`],
//! [`cast`], [`offset_by`], [`is_null`]) work on [`Handle`] and read the same
//! whichever representation is selected.
//!
//! ```text
//!   base                         ptr
//!    │                            │
//!    ▼                            ▼
//!    ┌────────┬──────────────────┬──────┬────────────────┐
//!    │ header │    allocated     │ blk  │      free      │
//!    └────────┴──────────────────┴──────┴────────────────┘
//!    ◀──────────── OffsetHandle ─▶
//!                                 AddrHandle = ptr
//! ```

use core::{fmt, ptr::NonNull};

/// A memory block that handles can be resolved against.
///
/// Implemented by every allocator view. The base is the first byte of the
/// block the allocator was initialized over.
pub trait Region {
    /// Returns the base address of the region.
    fn base(&self) -> NonNull<u8>;
}

/// The operations shared by both handle representations.
pub trait HandleRepr: Copy + Eq + fmt::Debug + Send + Sync {
    /// The null handle.
    const NULL: Self;

    /// Builds the handle of `ptr` relative to a region starting at `base`.
    ///
    /// A null `ptr` yields [`NULL`](Self::NULL).
    fn from_ptr(base: *mut u8, ptr: *mut u8) -> Self;

    /// Resolves the handle against a region starting at `base`.
    ///
    /// The null handle resolves to a null pointer.
    fn to_ptr(self, base: *mut u8) -> *mut u8;

    /// Returns the raw value (address or offset) of the handle.
    fn raw(self) -> usize;

    /// Returns `true` if this is the null handle.
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Returns the handle `delta` bytes past this one.
    ///
    /// The null handle stays null.
    #[must_use]
    fn offset_by(self, delta: isize) -> Self;
}

/// A handle that stores the absolute address of a block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AddrHandle(*mut u8);

// An address is plain data; dereferencing it is what needs care.
unsafe impl Send for AddrHandle {}
unsafe impl Sync for AddrHandle {}

impl AddrHandle {
    /// Wraps a raw address.
    #[must_use]
    pub const fn from_raw(ptr: *mut u8) -> Self {
        Self(ptr)
    }

    /// Returns the address as a pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0
    }
}

impl fmt::Debug for AddrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddrHandle({:p})", self.0)
    }
}

impl HandleRepr for AddrHandle {
    const NULL: Self = Self(core::ptr::null_mut());

    fn from_ptr(_base: *mut u8, ptr: *mut u8) -> Self {
        Self(ptr)
    }

    fn to_ptr(self, _base: *mut u8) -> *mut u8 {
        self.0
    }

    fn raw(self) -> usize {
        self.0.addr()
    }

    fn is_null(self) -> bool {
        self.0.is_null()
    }

    fn offset_by(self, delta: isize) -> Self {
        if self.is_null() {
            return Self::NULL;
        }
        Self(self.0.wrapping_offset(delta))
    }
}

/// A handle that stores the offset of a block from its allocator's base.
///
/// Offset `0` is reserved for the null handle: the allocator header occupies
/// the first bytes of every block, so no allocation ever starts there.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct OffsetHandle(usize);

impl OffsetHandle {
    /// Wraps a raw offset.
    #[must_use]
    pub const fn from_raw(offset: usize) -> Self {
        Self(offset)
    }

    /// Returns the offset in bytes.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl HandleRepr for OffsetHandle {
    const NULL: Self = Self(0);

    fn from_ptr(base: *mut u8, ptr: *mut u8) -> Self {
        if ptr.is_null() {
            return Self::NULL;
        }
        Self(ptr.addr().wrapping_sub(base.addr()))
    }

    fn to_ptr(self, base: *mut u8) -> *mut u8 {
        if self.is_null() {
            return core::ptr::null_mut();
        }
        base.wrapping_add(self.0)
    }

    fn raw(self) -> usize {
        self.0
    }

    fn offset_by(self, delta: isize) -> Self {
        if self.is_null() {
            return Self::NULL;
        }
        Self(self.0.wrapping_add_signed(delta))
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "offset-handles")] {
        /// The handle representation selected for this build.
        pub type Handle = OffsetHandle;
    } else {
        /// The handle representation selected for this build.
        pub type Handle = AddrHandle;
    }
}

/// The null handle of the selected representation.
pub const NULL: Handle = <Handle as HandleRepr>::NULL;

/// Converts a pointer into `region` to a handle.
pub fn to_handle<R>(region: &R, ptr: *mut u8) -> Handle
where
    R: Region + ?Sized,
{
    Handle::from_ptr(region.base().as_ptr(), ptr)
}

/// Resolves a handle issued by `region` to a pointer.
///
/// The null handle resolves to a null pointer. Resolving a handle that was
/// not issued by `region` yields an unspecified address.
pub fn to_pointer<R>(region: &R, handle: Handle) -> *mut u8
where
    R: Region + ?Sized,
{
    handle.to_ptr(region.base().as_ptr())
}

/// Resolves a handle issued by `region` to a typed pointer.
pub fn cast<T, R>(region: &R, handle: Handle) -> *mut T
where
    R: Region + ?Sized,
{
    to_pointer(region, handle).cast()
}

/// Returns the handle `delta` bytes past `handle`, keeping null handles null.
#[must_use]
pub fn offset_by(handle: Handle, delta: isize) -> Handle {
    handle.offset_by(delta)
}

/// Returns `true` if `handle` is the null handle.
#[must_use]
pub fn is_null(handle: Handle) -> bool {
    handle.is_null()
}
