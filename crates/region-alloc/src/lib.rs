//! Region allocators that live inside caller-supplied memory blocks.
//!
//! Each allocator stamps a small header into the first bytes of a block the
//! caller owns and hands out pieces of the rest of it. Nothing is allocated
//! from the system; the allocator state is the block itself, so a block can be
//! copied, persisted or shared through a memory mapping together with the
//! allocator that manages it.
//!
//! The header layout is fixed (`repr(C)`) only without the `thread-safe`
//! feature. With it, the header embeds a `spin::Mutex`, whose layout is not
//! specified, so a persisted block can only be re-attached by a build of the
//! same crate version with the same features.
//!
//! # Available Allocators
//!
//! ## [`Arena`]
//!
//! A bump allocator. Blocks are never reclaimed one by one; the whole region
//! is recycled at once with [`Arena::reset`].
//!
//! ## [`Surge`]
//!
//! A bump allocator that counts its live blocks and rewinds itself when the
//! last one is freed. Best suited for bursts of short-lived allocations that
//! all die together, such as per-request or per-frame scratch data.
//!
//! ## [`Totem`]
//!
//! A bounded stack of allocators of any kind, nested totems included.
//! Requests go to the most recently pushed member with room, and frees are
//! routed to the member that owns the pointer.
//!
//! # Handles
//!
//! Allocations are returned as [`Handle`]s. By default a handle is the address
//! of the block; with the `offset-handles` feature it is the offset of the
//! block from the base of its allocator, which survives relocation of the
//! whole block. The [`handle`] module converts between handles and pointers.
//!
//! # Usage Examples
//!
//! ## Arena
//!
//! ```rust
//! use region_alloc::{AlignedBlock, Arena, handle};
//!
//! let mut block = AlignedBlock::<1024>::new();
//! let arena = Arena::init(block.as_mut_slice()).unwrap();
//!
//! let h = arena.alloc(3 * size_of::<u32>()).unwrap();
//! let values = handle::cast::<u32, _>(&arena, h);
//! unsafe { values.write(7) };
//!
//! arena.reset();
//! assert_eq!(arena.used(), 0);
//! ```
//!
//! ## Surge
//!
//! ```rust
//! use region_alloc::{AlignedBlock, Surge};
//!
//! let mut block = AlignedBlock::<1024>::new();
//! let surge = Surge::init(block.as_mut_slice()).unwrap();
//!
//! let a = surge.alloc(64).unwrap();
//! let b = surge.alloc(64).unwrap();
//! surge.free(a);
//! assert_eq!(surge.live(), 1);
//!
//! // The last free rewinds the surge.
//! surge.free(b);
//! assert_eq!(surge.used(), 0);
//! ```
//!
//! ## Growing with a Totem
//!
//! ```rust
//! use region_alloc::{AlignedBlock, Arena, Totem};
//!
//! let mut totem_block = AlignedBlock::<256>::new();
//! let mut first = AlignedBlock::<128>::new();
//! let mut second = AlignedBlock::<128>::new();
//!
//! let totem = Totem::init(totem_block.as_mut_slice()).unwrap();
//! totem.push(Arena::init(first.as_mut_slice()).unwrap().into()).unwrap();
//!
//! while totem.alloc(32).is_some() {}
//!
//! // Out of room: push another member and retry.
//! totem.push(Arena::init(second.as_mut_slice()).unwrap().into()).unwrap();
//! assert!(totem.alloc(32).is_some());
//! ```
//!
//! # Design Considerations
//!
//! ## Memory Safety
//!
//! The allocator views ([`Arena`], [`Surge`], [`Totem`]) borrow their block
//! for their whole lifetime, and are move-only: a view is the single owner of
//! its allocator, and pushing a view into a [`Totem`] transfers it. Handles
//! are plain data; reading or writing through them is `unsafe`, and the caller
//! must not use a block after freeing it or after resetting its allocator.
//!
//! Invalid frees (handles outside the allocated range, or a [`Surge`] with no
//! live block) are reported through [`tracing`] at `WARN` level and ignored.
//! The `unchecked` feature removes these checks.
//!
//! ## Thread Safety
//!
//! Views are `Send`. With the `thread-safe` feature every allocator header
//! carries a spin lock held for the duration of each call, and the views are
//! also `Sync`. A [`Totem`] locks itself before its members, so lock order
//! always follows the ownership tree.
//!
//! ## Build Configuration
//!
//! See the [`config`] module for the Cargo features and the constants they
//! resolve to.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    arena::Arena,
    block::AlignedBlock,
    error::{InitError, PushError},
    handle::{AddrHandle, Handle, HandleRepr, OffsetHandle, Region},
    surge::Surge,
    totem::{Member, MemberKind, Totem},
};

pub mod arena;
mod block;
mod bump;
pub mod config;
mod error;
pub mod handle;
pub mod surge;
mod sync;
#[cfg(test)]
mod testing;
pub mod totem;

/// Short names for the allocator types and handle helpers.
///
/// ```rust
/// use region_alloc::prelude::*;
///
/// let mut block = AlignedBlock::<256>::new();
/// let arena = Arena::init(block.as_mut_slice()).unwrap();
/// let h = arena.alloc(8).unwrap();
/// assert!(!is_null(h));
/// assert!(!to_pointer(&arena, h).is_null());
/// ```
pub mod prelude {
    pub use crate::{
        AlignedBlock, Arena, Handle, HandleRepr as _, Member, MemberKind, Region as _, Surge,
        Totem,
        handle::{NULL, cast, is_null, offset_by, to_handle, to_pointer},
    };
}
