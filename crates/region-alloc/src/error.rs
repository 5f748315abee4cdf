use core::fmt;

use snafu::Snafu;

use crate::totem::Member;

/// The error returned when an allocator cannot be placed in a block.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum InitError {
    /// The block cannot hold the allocator header.
    #[snafu(display("block too small for allocator header: needed={needed}, actual={actual}"))]
    BlockTooSmall { needed: usize, actual: usize },
    /// The block does not start on the alignment the header requires.
    #[snafu(display("unaligned block: address={address:#x}, expected_alignment={align}"))]
    UnalignedBlock { address: usize, align: usize },
}

/// The error returned by [`Totem::push`](crate::Totem::push) when every slot
/// is taken.
///
/// The rejected member is handed back so the caller keeps ownership of it.
#[derive(Debug)]
pub struct PushError<'buf> {
    member: Member<'buf>,
    capacity: usize,
}

impl<'buf> PushError<'buf> {
    pub(crate) const fn new(member: Member<'buf>, capacity: usize) -> Self {
        Self { member, capacity }
    }

    /// Capacity of the totem that rejected the member.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the rejected member.
    #[must_use]
    pub fn into_member(self) -> Member<'buf> {
        self.member
    }
}

impl fmt::Display for PushError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "totem full: capacity={}, rejected={:?}",
            self.capacity,
            self.member.kind()
        )
    }
}

impl core::error::Error for PushError<'_> {}
