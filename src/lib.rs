//! # allocompose - Composable Block Allocators
//!
//! This crate builds memory allocators out of small pieces. Every piece
//! implements one [`Allocator`] contract over raw [`Block`]s, and every
//! decorator is itself an `Allocator`, so strategies stack:
//!
//! ```text
//!   Composition:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ CorruptionGuarded ─ guard │ client bytes │ guard                     │
//!   │   └── Segregator<256>                                                │
//!   │         ├── small: Arena<64 KiB>                                     │
//!   │         └── large: Fallback                                          │
//!   │                      ├── primary:   Arena<1 MiB>                     │
//!   │                      └── secondary: Heap                             │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Each layer sees only the contract of the layer below.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   allocompose
//!   ├── align              - Alignment helpers (align_to!, align_up)
//!   ├── block              - Block: address + size capability token
//!   ├── allocator          - Allocator trait and Capabilities flags
//!   │
//!   ├── heap               - Heap / AlignedHeap over libc malloc
//!   ├── null               - NullAllocator, always fails
//!   ├── arena              - Arena<CAPACITY, ALIGNMENT> bump allocator
//!   │
//!   ├── affix              - Affix<A, Prefix, Suffix> decorator
//!   ├── fallback           - Fallback<Primary, Secondary>
//!   ├── router             - AlignmentRouter<Aligned, Unaligned>
//!   ├── force_align        - ForceAlign<A, FORCED>
//!   ├── segregator         - Segregator<THRESHOLD, Small, Large>
//!   ├── binary_segregator  - BinarySegregator over a bucket list
//!   ├── either             - Either<L, R> for mixed bucket types
//!   ├── guard              - PatternGuard and corruption responses
//!   │
//!   ├── shared             - Shared<K> process-wide instances
//!   ├── container          - ContainerAllocator<T, A> typed adapter
//!   └── config             - Allocator categories and build-time defaults
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use allocompose::{Allocator, Arena, Fallback, Heap};
//!
//! let mut allocator = Fallback::new(Box::new(Arena::<256, 16>::new()), Heap::new());
//!
//! let small = allocator.allocate(10);
//! let large = allocator.allocate(4096);
//! assert!(allocator.primary().owns(small));
//! assert!(!allocator.primary().owns(large));
//!
//! unsafe {
//!   small.as_mut_slice().fill(0xAB);
//!   allocator.deallocate(large);
//!   allocator.deallocate(small);
//! }
//! ```
//!
//! ## The Contract
//!
//! A [`Block`] is a region, not an owner. Failure never panics: a failed
//! allocation returns the zero block, a failed reallocation returns `false`
//! and leaves the block as it was.
//!
//! ```text
//!   Block lifecycle:
//!
//!   allocate / allocate_all ──► Block{ptr, n} ──► reallocate ──► Block{ptr', m}
//!                                     │                               │
//!                                     └──────────► deallocate ◄───────┘
//!                                                  (exactly once)
//! ```
//!
//! `allocate`, `deallocate` and `owns` are always available. The aligned,
//! resizing and bulk operations are optional: each allocator lists the ones it
//! really implements in its [`Capabilities`] constant, and composites combine
//! those flags at compile time instead of probing at runtime.
//!
//! ## Routing Frees
//!
//! Composites decide where a block goes back to by asking `owns`. Arenas and
//! the null allocator answer precisely; heaps cannot tell and always answer
//! `true`.
//!
//! ```text
//!   Fallback<Arena, Heap>::deallocate(block)
//!
//!        arena.owns(block)?
//!          ├── yes ──► arena.deallocate(block)
//!          └── no  ──► heap.deallocate(block)
//! ```
//!
//! The precise side is always asked first. Two optimistic allocators in one
//! routing composite cannot be told apart and fail to compile (or, for
//! [`BinarySegregator`], fail to build with [`BucketError`]).
//!
//! ## Limitations
//!
//! - **No locking**: `Shared` instances need external synchronization
//! - **LIFO arenas**: only the most recent arena block is really freed
//! - **Unix-only**: the heap primitives use `libc` (`posix_memalign`)
//!
//! ## Safety
//!
//! Handing out memory is safe. Giving it back (`deallocate*`, `reallocate*`,
//! `deallocate_all`) is `unsafe`: the caller promises the block came from that
//! allocator and is consumed once.

pub mod align;
pub mod allocator;
pub mod block;

pub mod arena;
pub mod heap;
pub mod null;

pub mod affix;
pub mod binary_segregator;
pub mod either;
pub mod fallback;
pub mod force_align;
pub mod guard;
pub mod router;
pub mod segregator;

pub mod config;
pub mod container;
pub mod shared;

pub use affix::Affix;
pub use allocator::{Allocator, Capabilities, accepts};
pub use arena::Arena;
pub use binary_segregator::{BinarySegregator, BucketError};
pub use block::Block;
pub use either::Either;
pub use config::{
  AudioAllocator, AudioCategory, AllocatorCategory, CategoryAllocator, DefaultAllocator, DefaultCategory,
};
pub use container::{AllocError, ContainerAllocator};
pub use fallback::Fallback;
pub use force_align::ForceAlign;
pub use guard::{CorruptionError, CorruptionGuarded, PatternGuard, ResponsePolicy};
pub use heap::{AlignedHeap, Heap};
pub use null::NullAllocator;
pub use router::AlignmentRouter;
pub use segregator::Segregator;
pub use shared::{Shared, SharedKey};
