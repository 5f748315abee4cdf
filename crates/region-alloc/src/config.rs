//! Build-time configuration.
//!
//! Every knob of this crate is a Cargo feature, resolved once for the whole
//! program:
//!
//! | Feature          | Effect                                                  |
//! |------------------|---------------------------------------------------------|
//! | `align-N`        | Block alignment of `N` bytes (4, 16, 32, 64; default 8) |
//! | `offset-handles` | [`Handle`](crate::Handle) is an offset, not an address  |
//! | `thread-safe`    | One lock per allocator header, plus `destroy`           |
//! | `unchecked`      | No invalid-free / double-free diagnostics               |
//!
//! When several `align-N` features are enabled together the largest one wins.
//!
//! The features change the header layout, so a block stamped by one build must
//! be re-attached with [`from_raw`](crate::Arena::from_raw) by a build with the
//! same features. Under `thread-safe` the lock inside the header is a
//! `spin::Mutex`, which has no stable layout.

cfg_if::cfg_if! {
    if #[cfg(feature = "align-64")] {
        /// Alignment in bytes of every block handed out by an allocator.
        pub const ALIGN: usize = 64;
    } else if #[cfg(feature = "align-32")] {
        /// Alignment in bytes of every block handed out by an allocator.
        pub const ALIGN: usize = 32;
    } else if #[cfg(feature = "align-16")] {
        /// Alignment in bytes of every block handed out by an allocator.
        pub const ALIGN: usize = 16;
    } else if #[cfg(feature = "align-4")] {
        /// Alignment in bytes of every block handed out by an allocator.
        pub const ALIGN: usize = 4;
    } else {
        /// Alignment in bytes of every block handed out by an allocator.
        pub const ALIGN: usize = 8;
    }
}
const _: () = assert!(ALIGN.is_power_of_two());

/// Whether invalid frees and double frees are reported.
pub const SAFETY_CHECKS: bool = cfg!(not(feature = "unchecked"));

/// Whether allocator headers carry a lock.
pub const THREAD_SAFE: bool = cfg!(feature = "thread-safe");

/// Whether [`Handle`](crate::Handle) is the offset representation.
pub const OFFSET_HANDLES: bool = cfg!(feature = "offset-handles");

/// Rounds `n` up to the next multiple of `align`.
///
/// `align` must be a power of two.
#[must_use]
pub const fn round_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        for i in 0..10 {
            let sizes = (ALIGN * i + 1)..=(ALIGN * (i + 1));
            for size in sizes {
                assert_eq!(round_up(size, ALIGN), ALIGN * (i + 1));
            }
        }
        assert_eq!(round_up(0, ALIGN), 0);
    }

    #[test]
    fn test_round_up_other_alignments() {
        assert_eq!(round_up(13, 1), 13);
        assert_eq!(round_up(13, 4), 16);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(17, 16), 32);
    }
}
