//! Arena allocator implementation.
//!
//! An [`Arena`] is a bump allocator placed at the start of a caller-supplied
//! block. Allocation advances a single cursor through the rest of the block;
//! individual blocks are never reclaimed, and the whole region is recycled at
//! once with [`Arena::reset`].
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────┬─────┬──────── allocated ────────┬─── free ───┐
//! │ ArenaHeader              │ pad │                           │            │
//! │ ┌────────┬──────┬──────┐ │     │                           │            │
//! │ │ offset │ size │ lock │ │     │                           │            │
//! │ └────────┴──────┴──────┘ │     │                           │            │
//! └──────────────────────────┴─────┴───────────────────────────┴────────────┘
//! ▲                          ▲                                 ▲
//! base                       payload                 payload + offset
//! ```
//!
//! The lock only exists with the `thread-safe` feature.
//!
//! # Usage Example
//!
//! ```rust
//! use region_alloc::{AlignedBlock, Arena, handle};
//!
//! let mut block = AlignedBlock::<256>::new();
//! let arena = Arena::init(block.as_mut_slice()).unwrap();
//!
//! let h = arena.alloc(size_of::<u64>()).unwrap();
//! let value = handle::cast::<u64, _>(&arena, h);
//! unsafe { value.write(42) };
//!
//! // Freeing only checks the handle; the space comes back on reset.
//! arena.free(h);
//! arena.reset();
//! assert_eq!(arena.used(), 0);
//! ```

use core::{fmt, marker::PhantomData, ptr, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
    block,
    bump::{self, Cursor},
    config,
    error::InitError,
    handle::{self, Handle, HandleRepr as _, Region},
    sync::Guarded,
};

#[repr(C)]
struct ArenaHeader {
    cursor: Guarded<Cursor>,
}

const HEADER: usize = size_of::<ArenaHeader>();
const HEADER_ALIGN: usize = block::header_align::<ArenaHeader>();

/// A bump allocator living inside a caller-supplied block.
///
/// `Arena` is a view of the block: the allocator state itself is the header
/// stamped into the first bytes of the block by [`init`](Self::init). The view
/// borrows the block for `'buf` and never frees it.
pub struct Arena<'buf> {
    header: NonNull<ArenaHeader>,
    _block: PhantomData<&'buf mut [u8]>,
}

// The view is the only handle to its block, like the `&mut [u8]` it came from.
unsafe impl Send for Arena<'_> {}
#[cfg(feature = "thread-safe")]
unsafe impl Sync for Arena<'_> {}

impl<'buf> Arena<'buf> {
    /// Size in bytes of the header at the start of the block.
    pub const HEADER_SIZE: usize = HEADER;

    /// Smallest block an arena can be placed in: the header plus the padding
    /// that aligns the first allocation.
    pub const MIN_BLOCK_SIZE: usize = bump::footprint(HEADER);

    /// Places an arena at the start of `block`.
    ///
    /// Everything after the header is available for allocation.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::BlockTooSmall`] if `block` is shorter than
    /// [`MIN_BLOCK_SIZE`](Self::MIN_BLOCK_SIZE), and
    /// [`InitError::UnalignedBlock`] if it does not start on the header
    /// alignment (at least [`ALIGN`](config::ALIGN)).
    pub fn init(block: &'buf mut [u8]) -> Result<Self, InitError> {
        let (base, len) = block::raw_parts(block);
        unsafe { Self::init_raw(base, len) }
    }

    /// Places an arena at the start of the `len` bytes at `base`.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for reads and writes for `'buf` and
    /// must not be accessed other than through the returned arena and the
    /// blocks it hands out.
    pub unsafe fn init_raw(base: NonNull<u8>, len: usize) -> Result<Self, InitError> {
        block::check(base, len, Self::MIN_BLOCK_SIZE, HEADER_ALIGN)?;

        let header = base.cast::<ArenaHeader>();
        unsafe {
            header.write(ArenaHeader {
                cursor: Guarded::new(Cursor::new(HEADER, len)),
            });
        }
        debug!(base = ?base, len, "arena initialized");

        Ok(Self {
            header,
            _block: PhantomData,
        })
    }

    /// Re-attaches a view to a block that already holds an arena.
    ///
    /// # Safety
    ///
    /// `base` must be the base of a block initialized with
    /// [`init`](Self::init) or [`init_raw`](Self::init_raw) (possibly copied
    /// there bit for bit from another address), valid for `'buf`, and no other
    /// view of the same block may be alive.
    #[must_use]
    pub const unsafe fn from_raw(base: NonNull<u8>) -> Self {
        Self {
            header: base.cast(),
            _block: PhantomData,
        }
    }

    /// Consumes the view and returns the base of its block.
    ///
    /// The allocator state stays in the block; [`from_raw`](Self::from_raw)
    /// attaches a new view to it.
    #[must_use]
    pub const fn into_raw(self) -> NonNull<u8> {
        self.header.cast()
    }

    fn header(&self) -> &ArenaHeader {
        unsafe { self.header.as_ref() }
    }

    fn payload(&self) -> *mut u8 {
        self.base().as_ptr().wrapping_add(HEADER)
    }

    /// Returns the offset of `handle` from the payload, if it points past it.
    fn payload_offset(&self, handle: Handle) -> Option<usize> {
        handle::to_pointer(self, handle)
            .addr()
            .checked_sub(self.payload().addr())
    }

    /// Allocates `size` bytes.
    ///
    /// The block starts on a multiple of [`ALIGN`](config::ALIGN) from the
    /// base of the arena. A zero `size` reserves nothing and returns the
    /// handle the next allocation will get; such a probe must not be freed.
    ///
    /// Returns `None` if the arena has fewer than `size` bytes left. The arena
    /// is left unchanged in that case.
    #[must_use]
    pub fn alloc(&self, size: usize) -> Option<Handle> {
        let mut cursor = self.header().cursor.lock();
        let Some(at) = cursor.bump(HEADER, size) else {
            trace!(base = ?self.base(), size, remaining = cursor.remaining(), "arena exhausted");
            return None;
        };
        Some(handle::to_handle(self, self.payload().wrapping_add(at)))
    }

    /// Releases a block.
    ///
    /// Arenas never reclaim single blocks: the only effect is a diagnostic
    /// when `handle` does not point into the allocated range, which means a
    /// double free after a reset or a handle from another allocator. The
    /// null handle is ignored.
    pub fn free(&self, handle: Handle) {
        if !config::SAFETY_CHECKS || handle.is_null() {
            return;
        }
        if !self.contains(handle) {
            warn!(
                base = ?self.base(),
                ?handle,
                "invalid free: handle outside the allocated range (double free or foreign handle)"
            );
        }
    }

    /// Returns `true` if `handle` points into a block allocated since the
    /// last reset.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        let cursor = self.header().cursor.lock();
        self.payload_offset(handle)
            .is_some_and(|at| cursor.contains(HEADER, at))
    }

    /// Rewinds the arena to its empty state.
    ///
    /// Every handle issued before the reset is invalidated; using one
    /// afterwards is not detected.
    pub fn reset(&self) {
        self.header().cursor.lock().rewind(HEADER);
        trace!(base = ?self.base(), "arena reset");
    }

    /// Bytes allocated since the last reset, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.header().cursor.lock().used(HEADER)
    }

    /// Bytes still available for allocation.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.header().cursor.lock().remaining()
    }

    /// Bytes available in the empty arena.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.header().cursor.lock().capacity(HEADER)
    }

    /// Copies the arena, with every block allocated so far, into `dst`.
    ///
    /// This is how an arena grows: allocate a larger block, relocate into it
    /// and drop the old view. Blocks keep their offsets from the base, so
    /// [`OffsetHandle`](crate::OffsetHandle)s issued by `self` resolve to the
    /// same data in the returned arena. Address handles keep pointing into
    /// the old block.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::BlockTooSmall`] if `dst` cannot hold the header
    /// and the allocated blocks, and [`InitError::UnalignedBlock`] if it is
    /// misaligned. `self` is left untouched.
    pub fn relocate<'dst>(&self, dst: &'dst mut [u8]) -> Result<Arena<'dst>, InitError> {
        let cursor = self.header().cursor.lock();
        let (base, len) = block::raw_parts(dst);
        block::check(base, len, HEADER + cursor.offset, HEADER_ALIGN)?;

        let header = base.cast::<ArenaHeader>();
        unsafe {
            ptr::copy_nonoverlapping(self.payload(), base.as_ptr().add(HEADER), cursor.offset);
            header.write(ArenaHeader {
                cursor: Guarded::new(Cursor {
                    offset: cursor.offset,
                    size: len - HEADER,
                }),
            });
        }
        debug!(from = ?self.base(), to = ?base, len, "arena relocated");

        Ok(Arena {
            header,
            _block: PhantomData,
        })
    }

    /// Releases the header lock.
    ///
    /// The block itself stays owned by the caller.
    #[cfg(feature = "thread-safe")]
    pub fn destroy(self) {
        trace!(base = ?self.base(), "arena destroyed");
        unsafe { ptr::drop_in_place(self.header.as_ptr()) };
    }
}

impl Region for Arena<'_> {
    fn base(&self) -> NonNull<u8> {
        self.header.cast()
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = *self.header().cursor.lock();
        f.debug_struct("Arena")
            .field("base", &self.base())
            .field("offset", &cursor.offset)
            .field("size", &cursor.size)
            .finish()
    }
}
