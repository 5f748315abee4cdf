//! The bump cursor shared by [`Arena`](crate::Arena) and
//! [`Surge`](crate::Surge).
//!
//! Both allocators lay out their block the same way:
//!
//! ```text
//!   ┌────────┬─────┬───────── allocated ─────────┬───────── free ─────────┐
//!   │ header │ pad │ A1 │ A2 │ A3 │ ...          │                        │
//!   └────────┴─────┴─────────────────────────────┴────────────────────────┘
//!            ▲     ▲                             ▲                        ▲
//!            │     └─ payload + initial offset   └─ payload + offset      │
//!            └─ payload                              payload + size ──────┘
//! ```
//!
//! `offset` and `size` are measured from the payload, the first byte after the
//! header. The padding makes the first block start on a multiple of
//! [`ALIGN`] from the base of the block, and every later block is aligned the
//! same way.

use crate::config::{ALIGN, round_up};

/// Position of the next block inside a payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    /// Offset of the next block from the payload.
    pub(crate) offset: usize,
    /// Usable bytes after the header.
    pub(crate) size: usize,
}

impl Cursor {
    /// Creates the cursor of a block of `len` bytes behind a `header`-byte
    /// header.
    ///
    /// `len` must be at least [`footprint(header)`](footprint).
    pub(crate) const fn new(header: usize, len: usize) -> Self {
        Self {
            offset: initial_offset(header),
            size: len - header,
        }
    }

    /// Reserves `size` bytes and returns their offset from the payload.
    ///
    /// A zero `size` reserves nothing and returns the offset the next block
    /// would get. Returns `None` if the payload cannot hold `size` more bytes,
    /// leaving the cursor untouched.
    pub(crate) fn bump(&mut self, header: usize, size: usize) -> Option<usize> {
        if size == 0 {
            return Some(self.offset);
        }
        if self.size - self.offset < size {
            return None;
        }

        let at = self.offset;
        // Rounding may step past the end of a payload whose size is not a
        // multiple of `ALIGN`; the cursor never does.
        let next = round_up(header + at + size, ALIGN) - header;
        self.offset = usize::min(next, self.size);
        Some(at)
    }

    /// Returns the cursor to the first block position.
    pub(crate) const fn rewind(&mut self, header: usize) {
        self.offset = initial_offset(header);
    }

    /// Returns `true` if payload offset `at` lies inside an allocated block.
    pub(crate) const fn contains(&self, header: usize, at: usize) -> bool {
        initial_offset(header) <= at && at < self.offset
    }

    /// Bytes handed out since the last rewind, including alignment padding.
    pub(crate) const fn used(&self, header: usize) -> usize {
        self.offset - initial_offset(header)
    }

    /// Bytes still available.
    pub(crate) const fn remaining(&self) -> usize {
        self.size - self.offset
    }

    /// Bytes available in an empty allocator.
    pub(crate) const fn capacity(&self, header: usize) -> usize {
        self.size - initial_offset(header)
    }
}

/// Padding between a `header`-byte header and the first block.
pub(crate) const fn initial_offset(header: usize) -> usize {
    round_up(header, ALIGN) - header
}

/// Smallest block that fits a `header`-byte header and its padding.
pub(crate) const fn footprint(header: usize) -> usize {
    round_up(header, ALIGN)
}
