//! Surge allocator implementation.
//!
//! A [`Surge`] bumps through its block exactly like an
//! [`Arena`](crate::Arena), and additionally counts the blocks that are live.
//! Freeing the last live block rewinds the cursor in the same call, so a surge
//! recycles itself once it is fully drained, with no explicit reset:
//!
//! ```text
//!   alloc A, B, C        count = 3   [hdr|A|B|C|         ]
//!   free B, free A       count = 1   [hdr|A|B|C|         ]  (nothing moves)
//!   free C               count = 0   [hdr|               ]  (rewound)
//! ```
//!
//! # Memory Layout
//!
//! The header is `{ offset, size, count }`, followed by the lock with the
//! `thread-safe` feature, then the padded payload (see
//! [`Arena`](crate::Arena)).
//!
//! # Zero-size allocations
//!
//! `alloc(0)` returns the handle of the next block without reserving it and
//! without counting it. Freeing such a probe is rejected as long as nothing
//! has been allocated past it; once a real block sits at the same position
//! the two handles are indistinguishable, so probes must never be freed.

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
#[derive(Debug, Clone, Copy)]
struct SurgeState {
    cursor: Cursor,
    /// Live non-zero-size blocks.
    count: usize,
}

#[repr(C)]
struct SurgeHeader {
    state: Guarded<SurgeState>,
}

const HEADER: usize = size_of::<SurgeHeader>();
const HEADER_ALIGN: usize = block::header_align::<SurgeHeader>();

/// A self-recycling bump allocator living inside a caller-supplied block.
///
/// Like [`Arena`](crate::Arena), `Surge` is a view of the block it was
/// initialized over.
pub struct Surge<'buf> {
    header: NonNull<SurgeHeader>,
    _block: PhantomData<&'buf mut [u8]>,
}

unsafe impl Send for Surge<'_> {}
#[cfg(feature = "thread-safe")]
unsafe impl Sync for Surge<'_> {}

impl<'buf> Surge<'buf> {
    /// Size in bytes of the header at the start of the block.
    pub const HEADER_SIZE: usize = HEADER;

    /// Smallest block a surge can be placed in.
    pub const MIN_BLOCK_SIZE: usize = bump::footprint(HEADER);

    /// Places a surge at the start of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::BlockTooSmall`] if `block` is shorter than
    /// [`MIN_BLOCK_SIZE`](Self::MIN_BLOCK_SIZE), and
    /// [`InitError::UnalignedBlock`] if it is misaligned.
    pub fn init(block: &'buf mut [u8]) -> Result<Self, InitError> {
        let (base, len) = block::raw_parts(block);
        unsafe { Self::init_raw(base, len) }
    }

    /// Places a surge at the start of the `len` bytes at `base`.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for reads and writes for `'buf` and
    /// must not be accessed other than through the returned surge and the
    /// blocks it hands out.
    pub unsafe fn init_raw(base: NonNull<u8>, len: usize) -> Result<Self, InitError> {
        block::check(base, len, Self::MIN_BLOCK_SIZE, HEADER_ALIGN)?;

        let header = base.cast::<SurgeHeader>();
        unsafe {
            header.write(SurgeHeader {
                state: Guarded::new(SurgeState {
                    cursor: Cursor::new(HEADER, len),
                    count: 0,
                }),
            });
        }
        debug!(base = ?base, len, "surge initialized");

        Ok(Self {
            header,
            _block: PhantomData,
        })
    }

    /// Re-attaches a view to a block that already holds a surge.
    ///
    /// # Safety
    ///
    /// Same contract as [`Arena::from_raw`](crate::Arena::from_raw).
    #[must_use]
    pub const unsafe fn from_raw(base: NonNull<u8>) -> Self {
        Self {
            header: base.cast(),
            _block: PhantomData,
        }
    }

    /// Consumes the view and returns the base of its block.
    #[must_use]
    pub const fn into_raw(self) -> NonNull<u8> {
        self.header.cast()
    }

    fn header(&self) -> &SurgeHeader {
        unsafe { self.header.as_ref() }
    }

    fn payload(&self) -> *mut u8 {
        self.base().as_ptr().wrapping_add(HEADER)
    }

    fn payload_offset(&self, handle: Handle) -> Option<usize> {
        handle::to_pointer(self, handle)
            .addr()
            .checked_sub(self.payload().addr())
    }

    /// Allocates `size` bytes and counts the block as live.
    ///
    /// A zero `size` returns the handle of the next block without reserving or
    /// counting anything. Returns `None` when fewer than `size` bytes are
    /// left.
    #[must_use]
    pub fn alloc(&self, size: usize) -> Option<Handle> {
        let mut state = self.header().state.lock();
        let Some(at) = state.cursor.bump(HEADER, size) else {
            trace!(base = ?self.base(), size, live = state.count, "surge exhausted");
            return None;
        };
        if size > 0 {
            state.count += 1;
        }
        Some(handle::to_handle(self, self.payload().wrapping_add(at)))
    }

    /// Releases a block.
    ///
    /// The block's bytes are not reused on their own; freeing the last live
    /// block rewinds the whole surge. Handles outside the allocated range and
    /// frees with no live block are reported and ignored. The null handle is
    /// ignored.
    pub fn free(&self, handle: Handle) {
        if handle.is_null() {
            return;
        }

        let mut state = self.header().state.lock();
        if config::SAFETY_CHECKS {
            let in_range = self
                .payload_offset(handle)
                .is_some_and(|at| state.cursor.contains(HEADER, at));
            if !in_range {
                warn!(
                    base = ?self.base(),
                    ?handle,
                    "invalid free: handle outside the allocated range (double free or foreign handle)"
                );
                return;
            }
            if state.count == 0 {
                warn!(base = ?self.base(), ?handle, "invalid free: no live block (double free)");
                return;
            }
        }

        if state.count == 1 {
            state.cursor.rewind(HEADER);
            trace!(base = ?self.base(), "surge drained");
        }
        state.count = state.count.saturating_sub(1);
    }

    /// Returns `true` if `handle` points into a block allocated since the
    /// last rewind.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        let state = self.header().state.lock();
        self.payload_offset(handle)
            .is_some_and(|at| state.cursor.contains(HEADER, at))
    }

    /// Abandons every live block and rewinds the surge.
    pub fn reset(&self) {
        let mut state = self.header().state.lock();
        state.cursor.rewind(HEADER);
        state.count = 0;
        trace!(base = ?self.base(), "surge reset");
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live(&self) -> usize {
        self.header().state.lock().count
    }

    /// Bytes allocated since the last rewind, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.header().state.lock().cursor.used(HEADER)
    }

    /// Bytes still available for allocation.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.header().state.lock().cursor.remaining()
    }

    /// Bytes available in the empty surge.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.header().state.lock().cursor.capacity(HEADER)
    }

    /// Copies the surge, with its live blocks and count, into `dst`.
    ///
    /// See [`Arena::relocate`](crate::Arena::relocate).
    ///
    /// # Errors
    ///
    /// Returns [`InitError::BlockTooSmall`] if `dst` cannot hold the header
    /// and the allocated blocks, and [`InitError::UnalignedBlock`] if it is
    /// misaligned.
    pub fn relocate<'dst>(&self, dst: &'dst mut [u8]) -> Result<Surge<'dst>, InitError> {
        let state = self.header().state.lock();
        let (base, len) = block::raw_parts(dst);
        block::check(base, len, HEADER + state.cursor.offset, HEADER_ALIGN)?;

        let header = base.cast::<SurgeHeader>();
        unsafe {
            ptr::copy_nonoverlapping(
                self.payload(),
                base.as_ptr().add(HEADER),
                state.cursor.offset,
            );
            header.write(SurgeHeader {
                state: Guarded::new(SurgeState {
                    cursor: Cursor {
                        offset: state.cursor.offset,
                        size: len - HEADER,
                    },
                    count: state.count,
                }),
            });
        }
        debug!(from = ?self.base(), to = ?base, len, "surge relocated");

        Ok(Surge {
            header,
            _block: PhantomData,
        })
    }

    /// Releases the header lock.
    #[cfg(feature = "thread-safe")]
    pub fn destroy(self) {
        trace!(base = ?self.base(), "surge destroyed");
        unsafe { ptr::drop_in_place(self.header.as_ptr()) };
    }
}

impl Region for Surge<'_> {
    fn base(&self) -> NonNull<u8> {
        self.header.cast()
    }
}

impl fmt::Debug for Surge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.header().state.lock();
        f.debug_struct("Surge")
            .field("base", &self.base())
            .field("offset", &state.cursor.offset)
            .field("size", &state.cursor.size)
            .field("count", &state.count)
            .finish()
    }
}
