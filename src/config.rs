//! Build-time allocator selection.
//!
//! Consumers never name a concrete allocator. They ask for the one configured
//! for a category, which is either one of the built-in categories below or one
//! declared with [`allocator_category!`](crate::allocator_category). The
//! process default is picked by cargo features:
//!
//! ```text
//!   features                          DefaultAllocator
//!   ────────────────────────────────  ─────────────────────────────────────────
//!   (none)                            Heap
//!   aligned-default                   AlignmentRouter<AlignedHeap, Heap>
//!   guarded-default                   CorruptionGuarded<Heap>
//!   aligned-default, guarded-default  CorruptionGuarded<AlignmentRouter<..>>
//! ```
//!
//! The features only choose among the presets. An embedder that wants its own
//! type declares a category for it and writes consumers generic over
//! `C: AllocatorCategory`, so the choice is made once where `C` is named:
//!
//! ```
//! use allocompose::{Allocator, Arena, AllocatorCategory, Fallback, Heap, allocator_category};
//!
//! allocator_category! {
//!   pub struct EngineCategory => Fallback<Box<Arena<8192, 16>>, Heap>;
//! }
//!
//! struct Mixer<C: AllocatorCategory> {
//!   allocator: C::Allocator,
//! }
//!
//! impl<C: AllocatorCategory> Mixer<C> {
//!   fn new() -> Self {
//!     Self { allocator: C::allocator() }
//!   }
//! }
//!
//! let mut mixer = Mixer::<EngineCategory>::new();
//! let block = mixer.allocator.allocate(256);
//! assert!(mixer.allocator.primary().owns(block));
//! unsafe { mixer.allocator.deallocate(block) };
//! ```

use crate::{allocator::Allocator, force_align::ForceAlign};

/// Alignment of every block handed to audio consumers.
pub const AUDIO_ALIGNMENT: usize = 16;

#[cfg(not(feature = "aligned-default"))]
type Base = crate::heap::Heap;

#[cfg(feature = "aligned-default")]
type Base = crate::router::AlignmentRouter<crate::heap::AlignedHeap, crate::heap::Heap>;

#[cfg(not(feature = "guarded-default"))]
pub type DefaultAllocator = Base;

#[cfg(feature = "guarded-default")]
pub type DefaultAllocator = crate::guard::CorruptionGuarded<Base>;

pub type AudioAllocator = ForceAlign<DefaultAllocator, AUDIO_ALIGNMENT>;

/// A named allocator configuration.
///
/// Implement it for a marker type to give a family of consumers its own
/// allocator, or for a consumer type itself to override its choice.
pub trait AllocatorCategory {
  type Allocator: Allocator + Default;

  fn allocator() -> Self::Allocator {
    Self::Allocator::default()
  }
}

/// The allocator configured for category `C`.
pub type CategoryAllocator<C> = <C as AllocatorCategory>::Allocator;

/// Declares a category marker bound to an allocator type.
///
/// ```
/// use allocompose::{Allocator, Arena, AllocatorCategory, allocator_category};
///
/// allocator_category! {
///   /// Per-frame scratch space.
///   pub struct FrameCategory => Box<Arena<4096, 16>>;
/// }
///
/// let mut frame = FrameCategory::allocator();
/// assert!(frame.allocate(100).is_valid());
/// ```
#[macro_export]
macro_rules! allocator_category {
  ($(#[$meta:meta])* $vis:vis struct $name:ident => $allocator:ty;) => {
    $(#[$meta])*
    #[derive(Clone, Copy, Debug, Default)]
    $vis struct $name;

    impl $crate::config::AllocatorCategory for $name {
      type Allocator = $allocator;
    }
  };
}

allocator_category! {
  /// Everything without a more specific category.
  pub struct DefaultCategory => DefaultAllocator;
}

allocator_category! {
  /// Sample buffers and parameter tables of the audio engine.
  pub struct AudioCategory => AudioAllocator;
}
