//! Totem allocator implementation.
//!
//! A [`Totem`] is a bounded stack of allocators living inside a caller-supplied
//! block. Requests are forwarded to the members, most recently pushed first:
//!
//! - [`alloc`](Totem::alloc) is served by the first member with room. When
//!   every member is exhausted the caller pushes a fresh one and retries.
//! - [`free`](Totem::free) finds the member whose allocated range holds the
//!   pointer and forwards the free to it.
//! - [`reset`](Totem::reset) resets every member.
//!
//! Members can be [`Arena`]s, [`Surge`]s or other totems. A full totem does
//! not grow; push it into a larger one instead.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────┬─────┬────────┬────────┬─────┬──────────────┐
//! │ TotemHeader             │ pad │ slot 0 │ slot 1 │ ... │ slot cap - 1 │
//! │ ┌─────┬──────────┬──────┐     │ oldest │        │     │              │
//! │ │ len │ capacity │ lock │     └────────┴────────┴─────┴──────────────┘
//! │ └─────┴──────────┴──────┘           each slot = (member base, kind)
//! └─────────────────────────┘
//! ```
//!
//! Slots `0..len` hold the live members, oldest first.
//!
//! # Ownership
//!
//! [`push`](Totem::push) takes the member view by value and
//! [`pop`](Totem::pop) hands it back, so a totem owns its members while they
//! are on the stack. A totem can therefore never end up inside itself, and
//! locks are always taken parent first.
//!
//! # Usage Example
//!
//! ```rust
//! use region_alloc::{AlignedBlock, Arena, Member, MemberKind, Surge, Totem};
//!
//! let mut totem_block = AlignedBlock::<128>::new();
//! let mut arena_block = AlignedBlock::<128>::new();
//! let mut surge_block = AlignedBlock::<128>::new();
//!
//! let totem = Totem::init(totem_block.as_mut_slice()).unwrap();
//! totem.push(Arena::init(arena_block.as_mut_slice()).unwrap().into()).unwrap();
//! totem.push(Surge::init(surge_block.as_mut_slice()).unwrap().into()).unwrap();
//!
//! // Served by the surge, the most recent member.
//! let ptr = totem.alloc_ptr(16).unwrap();
//! assert!(totem.free(ptr.as_ptr()));
//!
//! let surge = totem.pop(-1).unwrap();
//! assert_eq!(surge.kind(), MemberKind::Surge);
//! assert_eq!(totem.len(), 1);
//! ```

use core::{fmt, marker::PhantomData, ptr, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
    arena::Arena,
    block,
    config::{self, round_up},
    error::{InitError, PushError},
    handle::{self, Handle, Region},
    surge::Surge,
    sync::Guarded,
};

/// The kind of a totem member.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A [`Surge`].
    Surge = 1,
    /// An [`Arena`].
    Arena = 2,
    /// A nested [`Totem`].
    Totem = 3,
}

/// An allocator a [`Totem`] can hold.
#[derive(Debug)]
pub enum Member<'buf> {
    /// An arena.
    Arena(Arena<'buf>),
    /// A surge.
    Surge(Surge<'buf>),
    /// A nested totem, which owns its own members.
    Totem(Totem<'buf>),
}

impl<'buf> From<Arena<'buf>> for Member<'buf> {
    fn from(arena: Arena<'buf>) -> Self {
        Self::Arena(arena)
    }
}

impl<'buf> From<Surge<'buf>> for Member<'buf> {
    fn from(surge: Surge<'buf>) -> Self {
        Self::Surge(surge)
    }
}

impl<'buf> From<Totem<'buf>> for Member<'buf> {
    fn from(totem: Totem<'buf>) -> Self {
        Self::Totem(totem)
    }
}

impl<'buf> Member<'buf> {
    /// Returns the kind of allocator this member is.
    #[must_use]
    pub const fn kind(&self) -> MemberKind {
        match self {
            Self::Arena(_) => MemberKind::Arena,
            Self::Surge(_) => MemberKind::Surge,
            Self::Totem(_) => MemberKind::Totem,
        }
    }

    /// Allocates `size` bytes from the member.
    ///
    /// The handle is relative to the member that served it (see
    /// [`Totem::alloc`]).
    #[must_use]
    pub fn alloc(&self, size: usize) -> Option<Handle> {
        match self {
            Self::Arena(arena) => arena.alloc(size),
            Self::Surge(surge) => surge.alloc(size),
            Self::Totem(totem) => totem.alloc(size),
        }
    }

    /// Allocates `size` bytes from the member and returns their address.
    #[must_use]
    pub fn alloc_ptr(&self, size: usize) -> Option<NonNull<u8>> {
        match self {
            Self::Arena(arena) => NonNull::new(handle::to_pointer(arena, arena.alloc(size)?)),
            Self::Surge(surge) => NonNull::new(handle::to_pointer(surge, surge.alloc(size)?)),
            Self::Totem(totem) => totem.alloc_ptr(size),
        }
    }

    /// Resets the member.
    pub fn reset(&self) {
        match self {
            Self::Arena(arena) => arena.reset(),
            Self::Surge(surge) => surge.reset(),
            Self::Totem(totem) => totem.reset(),
        }
    }

    /// Frees `ptr` if it lies in the allocated range of this member.
    ///
    /// Returns `false`, without any diagnostic, if it does not.
    fn release(&self, ptr: *mut u8) -> bool {
        match self {
            Self::Arena(arena) => {
                let handle = handle::to_handle(arena, ptr);
                let found = arena.contains(handle);
                if found {
                    arena.free(handle);
                }
                found
            }
            Self::Surge(surge) => {
                let handle = handle::to_handle(surge, ptr);
                let found = surge.contains(handle);
                if found {
                    surge.free(handle);
                }
                found
            }
            Self::Totem(totem) => totem.release(ptr),
        }
    }

    /// Releases the member's lock, recursively for nested totems.
    #[cfg(feature = "thread-safe")]
    pub fn destroy(self) {
        match self {
            Self::Arena(arena) => arena.destroy(),
            Self::Surge(surge) => surge.destroy(),
            Self::Totem(totem) => totem.destroy(),
        }
    }

    fn into_slot(self) -> Slot {
        let (base, kind) = match self {
            Self::Arena(arena) => (arena.into_raw(), MemberKind::Arena),
            Self::Surge(surge) => (surge.into_raw(), MemberKind::Surge),
            Self::Totem(totem) => (totem.into_raw(), MemberKind::Totem),
        };
        Slot { base, kind }
    }

    /// # Safety
    ///
    /// `slot` must have been produced by [`into_slot`](Self::into_slot) from a
    /// member valid for `'buf`, and no other view of it may be alive.
    const unsafe fn from_slot(slot: Slot) -> Self {
        unsafe {
            match slot.kind {
                MemberKind::Arena => Self::Arena(Arena::from_raw(slot.base)),
                MemberKind::Surge => Self::Surge(Surge::from_raw(slot.base)),
                MemberKind::Totem => Self::Totem(Totem::from_raw(slot.base)),
            }
        }
    }
}

impl Region for Member<'_> {
    fn base(&self) -> NonNull<u8> {
        match self {
            Self::Arena(arena) => arena.base(),
            Self::Surge(surge) => surge.base(),
            Self::Totem(totem) => totem.base(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Slot {
    base: NonNull<u8>,
    kind: MemberKind,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Stack {
    len: u16,
    capacity: u16,
}

#[repr(C)]
struct TotemHeader {
    stack: Guarded<Stack>,
}

const SLOT: usize = size_of::<Slot>();
const SLOTS_OFFSET: usize = round_up(size_of::<TotemHeader>(), align_of::<Slot>());
const HEADER_ALIGN: usize = {
    let align = block::header_align::<TotemHeader>();
    if align_of::<Slot>() > align {
        align_of::<Slot>()
    } else {
        align
    }
};

/// A bounded stack of allocators living inside a caller-supplied block.
///
/// Unlike the other views, `Totem` is invariant in `'buf`: a member pushed
/// through `&self` must live exactly as long as the totem's own lifetime says,
/// so a `&Totem<'long>` cannot be shortened to accept a shorter-lived member.
pub struct Totem<'buf> {
    header: NonNull<TotemHeader>,
    _block: PhantomData<fn(&'buf mut [u8]) -> &'buf mut [u8]>,
}

unsafe impl Send for Totem<'_> {}
#[cfg(feature = "thread-safe")]
unsafe impl Sync for Totem<'_> {}

impl<'buf> Totem<'buf> {
    /// Most members a totem can hold.
    pub const MAX_CAPACITY: usize = u16::MAX as usize;

    /// Smallest block a totem can be placed in: the header alone, with no
    /// slot.
    pub const MIN_BLOCK_SIZE: usize = Self::required_size(0);

    /// Returns the block size a totem of `capacity` members needs.
    #[must_use]
    pub const fn required_size(capacity: usize) -> usize {
        SLOTS_OFFSET + capacity * SLOT
    }

    /// Places an empty totem at the start of `block`.
    ///
    /// The capacity is the number of slots that fit after the header, capped
    /// at [`MAX_CAPACITY`](Self::MAX_CAPACITY).
    ///
    /// # Errors
    ///
    /// Returns [`InitError::BlockTooSmall`] if `block` cannot hold the header,
    /// and [`InitError::UnalignedBlock`] if it is misaligned. A block with no
    /// room for a slot gives a totem of capacity 0, which rejects every push.
    pub fn init(block: &'buf mut [u8]) -> Result<Self, InitError> {
        let (base, len) = block::raw_parts(block);
        unsafe { Self::init_raw(base, len) }
    }

    /// Places an empty totem at the start of the `len` bytes at `base`.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for reads and writes for `'buf` and
    /// must not be accessed other than through the returned totem.
    pub unsafe fn init_raw(base: NonNull<u8>, len: usize) -> Result<Self, InitError> {
        block::check(base, len, Self::MIN_BLOCK_SIZE, HEADER_ALIGN)?;

        let capacity = u16::try_from((len - SLOTS_OFFSET) / SLOT).unwrap_or(u16::MAX);
        let header = base.cast::<TotemHeader>();
        unsafe {
            header.write(TotemHeader {
                stack: Guarded::new(Stack { len: 0, capacity }),
            });
        }
        debug!(base = ?base, len, capacity, "totem initialized");

        Ok(Self {
            header,
            _block: PhantomData,
        })
    }

    /// Re-attaches a view to a block that already holds a totem.
    ///
    /// # Safety
    ///
    /// Same contract as [`Arena::from_raw`], extended to every member on the
    /// stack.
    #[must_use]
    pub const unsafe fn from_raw(base: NonNull<u8>) -> Self {
        Self {
            header: base.cast(),
            _block: PhantomData,
        }
    }

    /// Consumes the view and returns the base of its block.
    ///
    /// The members stay on the stack.
    #[must_use]
    pub const fn into_raw(self) -> NonNull<u8> {
        self.header.cast()
    }

    fn header(&self) -> &TotemHeader {
        unsafe { self.header.as_ref() }
    }

    fn slots(&self) -> *mut Slot {
        self.base()
            .as_ptr()
            .wrapping_add(SLOTS_OFFSET)
            .cast::<Slot>()
    }

    /// Returns a temporary view of the member in slot `index`.
    ///
    /// `index` must be below the current length, under the lock.
    fn member(&self, index: usize) -> Member<'buf> {
        unsafe { Member::from_slot(self.slots().add(index).read()) }
    }

    /// Pushes `member` on top of the stack and returns its base.
    ///
    /// # Errors
    ///
    /// Returns a [`PushError`] carrying `member` back if every slot is taken.
    /// The stack is left unchanged.
    ///
    /// A member must live at least as long as the totem:
    ///
    /// ```compile_fail
    /// use region_alloc::{AlignedBlock, Arena, Totem};
    ///
    /// let mut totem_block = AlignedBlock::<128>::new();
    /// let totem = Totem::init(totem_block.as_mut_slice()).unwrap();
    /// {
    ///     let mut member_block = AlignedBlock::<128>::new();
    ///     let arena = Arena::init(member_block.as_mut_slice()).unwrap();
    ///     totem.push(arena.into()).unwrap();
    /// }
    /// let _ = totem.alloc(8);
    /// ```
    pub fn push(&self, member: Member<'buf>) -> Result<NonNull<u8>, PushError<'buf>> {
        let mut stack = self.header().stack.lock();
        if stack.len == stack.capacity {
            trace!(base = ?self.base(), capacity = stack.capacity, "totem full");
            return Err(PushError::new(member, usize::from(stack.capacity)));
        }

        let kind = member.kind();
        let slot = member.into_slot();
        unsafe { self.slots().add(usize::from(stack.len)).write(slot) };
        stack.len += 1;
        debug!(base = ?self.base(), ?kind, len = stack.len, "totem member pushed");

        Ok(slot.base)
    }

    /// Removes the member at `index` and returns it.
    ///
    /// Index `0` is the oldest member. A negative index counts from the top,
    /// `-1` being the most recent member. Members above the removed one move
    /// down one slot. Returns `None` if `index` is out of range.
    pub fn pop(&self, index: isize) -> Option<Member<'buf>> {
        let mut stack = self.header().stack.lock();
        let len = usize::from(stack.len);
        let index = if index < 0 {
            len.checked_sub(index.unsigned_abs())?
        } else {
            index.unsigned_abs()
        };
        if index >= len {
            trace!(base = ?self.base(), index, len, "totem pop out of range");
            return None;
        }

        let member = self.member(index);
        unsafe {
            let slots = self.slots();
            ptr::copy(slots.add(index + 1), slots.add(index), len - index - 1);
        }
        stack.len -= 1;
        debug!(base = ?self.base(), kind = ?member.kind(), index, len = stack.len, "totem member popped");

        Some(member)
    }

    /// Allocates `size` bytes from the most recent member with room.
    ///
    /// Members are tried from the top of the stack down, and exactly one of
    /// them serves the request. Returns `None` if every member is exhausted.
    ///
    /// With `offset-handles` the handle is relative to the member that served
    /// it, which the caller cannot tell apart; use
    /// [`alloc_ptr`](Self::alloc_ptr) to get an address instead.
    #[must_use]
    pub fn alloc(&self, size: usize) -> Option<Handle> {
        let stack = self.header().stack.lock();
        let found = (0..usize::from(stack.len))
            .rev()
            .find_map(|i| self.member(i).alloc(size));
        if found.is_none() {
            trace!(base = ?self.base(), size, len = stack.len, "totem exhausted");
        }
        found
    }

    /// Like [`alloc`](Self::alloc), but resolves the block through the member
    /// that served it.
    #[must_use]
    pub fn alloc_ptr(&self, size: usize) -> Option<NonNull<u8>> {
        let stack = self.header().stack.lock();
        let found = (0..usize::from(stack.len))
            .rev()
            .find_map(|i| self.member(i).alloc_ptr(size));
        if found.is_none() {
            trace!(base = ?self.base(), size, len = stack.len, "totem exhausted");
        }
        found
    }

    /// Frees the block at `ptr` through the member that allocated it.
    ///
    /// Members are searched from the top of the stack down, nested totems
    /// included. Returns `false` if no member holds `ptr` in its allocated
    /// range; that is reported as an invalid free. The null pointer is
    /// ignored.
    pub fn free(&self, ptr: *mut u8) -> bool {
        if ptr.is_null() {
            return false;
        }
        let found = self.release(ptr);
        if config::SAFETY_CHECKS && !found {
            warn!(base = ?self.base(), ?ptr, "invalid free: pointer not owned by any totem member");
        }
        found
    }

    fn release(&self, ptr: *mut u8) -> bool {
        let stack = self.header().stack.lock();
        (0..usize::from(stack.len))
            .rev()
            .any(|i| self.member(i).release(ptr))
    }

    /// Resets every member, nested totems included.
    ///
    /// The members stay on the stack.
    pub fn reset(&self) {
        let stack = self.header().stack.lock();
        for i in (0..usize::from(stack.len)).rev() {
            self.member(i).reset();
        }
        trace!(base = ?self.base(), len = stack.len, "totem reset");
    }

    /// Number of members on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.header().stack.lock().len)
    }

    /// Returns `true` if the stack has no member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::from(self.header().stack.lock().capacity)
    }

    /// Returns the kind of the member at `index`, oldest first.
    #[must_use]
    pub fn kind_at(&self, index: usize) -> Option<MemberKind> {
        let stack = self.header().stack.lock();
        (index < usize::from(stack.len)).then(|| unsafe { self.slots().add(index).read().kind })
    }

    /// Releases the lock of the totem and of every member, recursively.
    #[cfg(feature = "thread-safe")]
    pub fn destroy(self) {
        let len = usize::from(self.header().stack.lock().len);
        for i in (0..len).rev() {
            self.member(i).destroy();
        }
        trace!(base = ?self.base(), len, "totem destroyed");
        unsafe { ptr::drop_in_place(self.header.as_ptr()) };
    }
}

impl Region for Totem<'_> {
    fn base(&self) -> NonNull<u8> {
        self.header.cast()
    }
}

impl fmt::Debug for Totem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = *self.header().stack.lock();
        f.debug_struct("Totem")
            .field("base", &self.base())
            .field("len", &stack.len)
            .field("capacity", &stack.capacity)
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::*;
    use crate::{
        config::ALIGN,
        testing::{count_warnings, with_test_block},
    };

    const MEMBER_BLOCK: usize = 1024;

    /// Runs `test_fn` with a totem of `capacity` slots and `members` scratch
    /// blocks for its members.
    fn with_totem<F>(capacity: usize, members: usize, test_fn: F)
    where
        F: for<'a> FnOnce(Totem<'a>, &mut [&'a mut [u8]]),
    {
        with_test_block(Totem::required_size(capacity), |block| {
            with_test_block(members * MEMBER_BLOCK, |pool| {
                let totem = Totem::init(block).unwrap();
                assert_eq!(totem.capacity(), capacity);
                let mut blocks: Vec<&mut [u8]> = pool.chunks_mut(MEMBER_BLOCK).collect();
                test_fn(totem, &mut blocks);
            });
        });
    }

    fn take<'a>(blocks: &mut [&'a mut [u8]], i: usize) -> &'a mut [u8] {
        core::mem::take(&mut blocks[i])
    }

    #[test]
    fn test_init() {
        with_test_block(Totem::MIN_BLOCK_SIZE - 1, |block| {
            assert!(matches!(
                Totem::init(block),
                Err(InitError::BlockTooSmall { .. })
            ));
        });
        with_test_block(Totem::MIN_BLOCK_SIZE, |block| {
            let totem = Totem::init(block).unwrap();
            assert_eq!(totem.capacity(), 0);
        });
        with_test_block(Totem::required_size(3) + SLOT - 1, |block| {
            let totem = Totem::init(block).unwrap();
            assert_eq!(totem.capacity(), 3);
            assert!(totem.is_empty());
            assert_eq!(totem.kind_at(0), None);
        });
    }

    #[test]
    fn test_zero_capacity_rejects_push() {
        with_test_block(Totem::required_size(1) - 1, |totem_block| {
            with_test_block(MEMBER_BLOCK, |member_block| {
                let totem = Totem::init(totem_block).unwrap();
                assert_eq!(totem.capacity(), 0);
                let arena = Arena::init(member_block).unwrap();
                let err = totem.push(arena.into()).unwrap_err();
                assert_eq!(err.capacity(), 0);
                assert_eq!(err.into_member().kind(), MemberKind::Arena);
                assert!(totem.is_empty());
                assert!(totem.alloc(8).is_none());
            });
        });
    }

    #[test]
    fn test_capacity_is_capped() {
        with_test_block(Totem::required_size(Totem::MAX_CAPACITY + 10), |block| {
            let totem = Totem::init(block).unwrap();
            assert_eq!(totem.capacity(), Totem::MAX_CAPACITY);
        });
    }

    #[test]
    fn test_push_pop_order() {
        with_totem(4, 2, |totem, blocks| {
            let a = Arena::init(take(blocks, 0)).unwrap();
            let b = Surge::init(take(blocks, 1)).unwrap();
            let a_base = a.base();
            let b_base = b.base();

            assert_eq!(totem.push(a.into()).unwrap(), a_base);
            assert_eq!(totem.push(b.into()).unwrap(), b_base);
            assert_eq!(totem.kind_at(0), Some(MemberKind::Arena));
            assert_eq!(totem.kind_at(1), Some(MemberKind::Surge));

            let top = totem.pop(-1).unwrap();
            assert_eq!(top.kind(), MemberKind::Surge);
            assert_eq!(top.base(), b_base);

            let bottom = totem.pop(0).unwrap();
            assert_eq!(bottom.kind(), MemberKind::Arena);
            assert_eq!(bottom.base(), a_base);
            assert!(totem.is_empty());
        });
    }

    #[test]
    fn test_full_push_is_rejected() {
        with_totem(2, 3, |totem, blocks| {
            totem.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            totem.push(Surge::init(take(blocks, 1)).unwrap().into()).unwrap();

            let third = Arena::init(take(blocks, 2)).unwrap();
            let third_base = third.base();
            let err = totem.push(third.into()).unwrap_err();
            assert_eq!(err.capacity(), 2);
            assert_eq!(err.into_member().base(), third_base);

            assert_eq!(totem.len(), 2);
            assert_eq!(totem.kind_at(0), Some(MemberKind::Arena));
            assert_eq!(totem.kind_at(1), Some(MemberKind::Surge));

            assert!(totem.pop(-1).is_some());
            assert!(totem.pop(-1).is_some());
            assert!(totem.pop(-1).is_none());
            assert!(totem.pop(0).is_none());
        });
    }

    #[test]
    fn test_pop_out_of_range() {
        with_totem(3, 2, |totem, blocks| {
            totem.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            totem.push(Arena::init(take(blocks, 1)).unwrap().into()).unwrap();
            assert!(totem.pop(2).is_none());
            assert!(totem.pop(-3).is_none());
            assert_eq!(totem.len(), 2);
        });
    }

    #[test]
    fn test_pop_middle_shifts_down() {
        with_totem(3, 3, |totem, blocks| {
            let bases: Vec<_> = (0..3)
                .map(|i| {
                    let arena = Arena::init(take(blocks, i)).unwrap();
                    totem.push(arena.into()).unwrap()
                })
                .collect();

            let middle = totem.pop(-2).unwrap();
            assert_eq!(middle.base(), bases[1]);
            assert_eq!(totem.len(), 2);
            assert_eq!(totem.pop(1).unwrap().base(), bases[2]);
            assert_eq!(totem.pop(0).unwrap().base(), bases[0]);
        });
    }

    #[test]
    fn test_alloc_prefers_most_recent_member() {
        with_totem(2, 2, |totem, blocks| {
            assert!(totem.alloc(8).is_none());

            let older = Arena::init(take(blocks, 0)).unwrap();
            let newer = Arena::init(take(blocks, 1)).unwrap();
            totem.push(older.into()).unwrap();
            totem.push(newer.into()).unwrap();

            let ptr = totem.alloc_ptr(16).unwrap();
            let Member::Arena(newer) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            assert!(newer.contains(handle::to_handle(&newer, ptr.as_ptr())));
            let Member::Arena(older) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            // Exactly one member served the request.
            assert_eq!(older.used(), 0);
        });
    }

    #[test]
    fn test_alloc_falls_back_to_older_members() {
        with_totem(2, 2, |totem, blocks| {
            let older = Arena::init(take(blocks, 0)).unwrap();
            let newer = Surge::init(take(blocks, 1)).unwrap();
            let room = newer.capacity();
            totem.push(older.into()).unwrap();
            totem.push(newer.into()).unwrap();

            let top = totem.alloc_ptr(room).unwrap();
            let bottom = totem.alloc_ptr(ALIGN).unwrap();
            assert!(totem.alloc_ptr(MEMBER_BLOCK).is_none());

            let Member::Surge(newer) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            assert!(newer.contains(handle::to_handle(&newer, top.as_ptr())));
            assert_eq!(newer.remaining(), 0);
            let Member::Arena(older) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            assert!(older.contains(handle::to_handle(&older, bottom.as_ptr())));
        });
    }

    #[test]
    fn test_free_finds_owner() {
        with_totem(2, 2, |totem, blocks| {
            totem.push(Surge::init(take(blocks, 0)).unwrap().into()).unwrap();
            let (no_room, _) = take(blocks, 1).split_at_mut(Arena::MIN_BLOCK_SIZE);
            totem.push(Arena::init(no_room).unwrap().into()).unwrap();

            // The arena has no room, so both blocks come from the surge.
            let a = totem.alloc_ptr(8).unwrap();
            let b = totem.alloc_ptr(8).unwrap();
            assert!(totem.free(a.as_ptr()));
            assert!(totem.free(b.as_ptr()));

            let Member::Arena(arena) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            let Member::Surge(surge) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            assert_eq!(arena.capacity(), 0);
            assert_eq!(surge.live(), 0);
            assert_eq!(surge.used(), 0);
        });
    }

    #[test]
    fn test_free_unknown_pointer() {
        with_totem(1, 1, |totem, blocks| {
            totem.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            let mut outside = [0_u8; 8];
            assert!(!totem.free(outside.as_mut_ptr()));
            assert!(!totem.free(ptr::null_mut()));
        });
    }

    #[test]
    fn test_failed_free_is_reported() {
        with_totem(2, 2, |totem, blocks| {
            totem.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            totem.push(Surge::init(take(blocks, 1)).unwrap().into()).unwrap();
            let ptr = totem.alloc_ptr(16).unwrap();

            let (found, warnings) = count_warnings(|| totem.free(ptr.as_ptr()));
            assert!(found);
            assert_eq!(warnings, 0);

            // The surge drained, so the same pointer is no longer owned.
            let mut outside = [0_u8; 8];
            for stray in [ptr.as_ptr(), outside.as_mut_ptr()] {
                let (found, warnings) = count_warnings(|| totem.free(stray));
                assert!(!found);
                assert_eq!(warnings, usize::from(config::SAFETY_CHECKS));
            }
        });
    }

    #[test]
    fn test_nested_totem() {
        with_totem(2, 3, |outer, blocks| {
            let inner = Totem::init(take(blocks, 2)).unwrap();
            inner.push(Surge::init(take(blocks, 0)).unwrap().into()).unwrap();

            outer.push(Arena::init(take(blocks, 1)).unwrap().into()).unwrap();
            outer.push(inner.into()).unwrap();
            assert_eq!(outer.kind_at(1), Some(MemberKind::Totem));

            // Served by the surge inside the nested totem.
            let ptr = outer.alloc_ptr(32).unwrap();
            assert!(outer.free(ptr.as_ptr()));

            let Member::Totem(inner) = outer.pop(-1).unwrap() else {
                unreachable!()
            };
            let Member::Surge(surge) = inner.pop(0).unwrap() else {
                unreachable!()
            };
            assert_eq!(surge.live(), 0);
            assert_eq!(surge.used(), 0);
        });
    }

    #[test]
    fn test_reset_recurses() {
        with_totem(2, 3, |outer, blocks| {
            let inner = Totem::init(take(blocks, 2)).unwrap();
            inner.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            outer.push(Surge::init(take(blocks, 1)).unwrap().into()).unwrap();
            outer.push(inner.into()).unwrap();

            // The second block no longer fits in the nested arena.
            outer.alloc_ptr(MEMBER_BLOCK / 2).unwrap();
            outer.alloc_ptr(MEMBER_BLOCK / 2).unwrap();
            outer.reset();
            assert_eq!(outer.len(), 2);

            let Member::Totem(inner) = outer.pop(-1).unwrap() else {
                unreachable!()
            };
            let Member::Arena(arena) = inner.pop(-1).unwrap() else {
                unreachable!()
            };
            let Member::Surge(surge) = outer.pop(-1).unwrap() else {
                unreachable!()
            };
            assert_eq!(arena.used(), 0);
            assert_eq!(surge.used(), 0);
            assert_eq!(surge.live(), 0);
        });
    }

    #[test]
    fn test_grow_by_nesting() {
        with_totem(1, 3, |small, blocks| {
            small.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            let spare = Arena::init(take(blocks, 1)).unwrap();
            let spare = small.push(spare.into()).unwrap_err().into_member();

            let large = Totem::init(take(blocks, 2)).unwrap();
            large.push(small.into()).unwrap();
            large.push(spare).unwrap();
            assert_eq!(large.len(), 2);
            assert!(large.alloc(8).is_some());
        });
    }

    #[cfg(feature = "thread-safe")]
    #[test]
    fn test_concurrent_alloc_free() {
        with_totem(2, 2, |totem, blocks| {
            totem.push(Arena::init(take(blocks, 0)).unwrap().into()).unwrap();
            totem.push(Surge::init(take(blocks, 1)).unwrap().into()).unwrap();
            std::thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        let held: Vec<_> = (0..3).map(|_| totem.alloc_ptr(ALIGN).unwrap()).collect();
                        for ptr in held {
                            assert!(totem.free(ptr.as_ptr()));
                        }
                    });
                }
            });
            let Member::Surge(surge) = totem.pop(-1).unwrap() else {
                unreachable!()
            };
            assert_eq!(surge.live(), 0);
            totem.destroy();
        });
    }
}
