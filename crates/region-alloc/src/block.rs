//! Caller-supplied memory blocks.

use core::ptr::NonNull;

use snafu::ensure;

use crate::{
    config::ALIGN,
    error::{BlockTooSmallSnafu, InitError, UnalignedBlockSnafu},
};

/// A stack-friendly byte block aligned for every allocator header.
///
/// The alignment covers the largest `align-N` feature, so an allocator placed
/// in an `AlignedBlock` never fails with
/// [`InitError::UnalignedBlock`].
///
/// # Examples
///
/// ```
/// use region_alloc::{AlignedBlock, Arena};
///
/// let mut block = AlignedBlock::<256>::new();
/// let arena = Arena::init(block.as_mut_slice()).unwrap();
/// assert!(arena.alloc(64).is_some());
/// ```
#[repr(C, align(64))]
pub struct AlignedBlock<const N: usize>([u8; N]);

impl<const N: usize> Default for AlignedBlock<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AlignedBlock<N> {
    /// Creates a zero-filled block.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; N])
    }

    /// Returns the block as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Checks that `len` bytes at `base` can hold a header of `needed` bytes
/// aligned to `align`.
pub(crate) fn check(base: NonNull<u8>, len: usize, needed: usize, align: usize) -> Result<(), InitError> {
    let address = base.as_ptr().addr();
    ensure!(
        address.is_multiple_of(align),
        UnalignedBlockSnafu { address, align }
    );
    ensure!(len >= needed, BlockTooSmallSnafu { needed, actual: len });
    Ok(())
}

/// Alignment a block must have to carry a header of type `H`.
pub(crate) const fn header_align<H>() -> usize {
    let align = align_of::<H>();
    if align > ALIGN { align } else { ALIGN }
}

/// Splits a mutable slice into its base pointer and length.
pub(crate) fn raw_parts(block: &mut [u8]) -> (NonNull<u8>, usize) {
    let len = block.len();
    (NonNull::from(block).cast(), len)
}
