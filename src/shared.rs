use std::{cell::UnsafeCell, fmt, marker::PhantomData, sync::OnceLock};

use log::debug;

use crate::{
  allocator::{Allocator, Capabilities},
  block::Block,
};

/// Storage for one process-wide allocator instance.
///
/// Hands out raw access only; exclusivity is promised by the [`SharedKey`]
/// implementation that owns the cell.
pub struct SharedCell<A> {
  allocator: UnsafeCell<A>,
}

// SAFETY: access goes through `SharedKey`, whose implementor guarantees calls
// never overlap.
unsafe impl<A: Send> Sync for SharedCell<A> {}

impl<A> SharedCell<A> {
  pub const fn new(allocator: A) -> Self {
    Self {
      allocator: UnsafeCell::new(allocator),
    }
  }

  /// Initializes `once` on first access, exactly once across threads.
  pub fn get_or_init(
    once: &'static OnceLock<SharedCell<A>>,
    name: &'static str,
  ) -> &'static SharedCell<A>
  where
    A: Default,
  {
    once.get_or_init(|| {
      debug!("shared allocator {}: initialized", name);
      SharedCell::new(A::default())
    })
  }

  fn get(&self) -> *mut A {
    self.allocator.get()
  }
}

/// Names one process-wide allocator instance.
///
/// Implemented through [`shared_allocator!`](crate::shared_allocator).
///
/// # Safety
///
/// Operations on the instance are not synchronized. The implementor
/// guarantees that no two calls through [`Shared`] handles of this key ever
/// run concurrently, by confining use to one thread or by external locking.
pub unsafe trait SharedKey: 'static {
  type Allocator: Allocator + Send + 'static;

  fn cell() -> &'static SharedCell<Self::Allocator>;
}

/// Declares a [`SharedKey`] backed by a lazily built `static`.
///
/// ```
/// use allocompose::{Allocator, Arena, Shared, shared_allocator};
///
/// shared_allocator! {
///   /// Scratch memory for the main thread.
///   pub unsafe struct Scratch(Arena<1024, 16>);
/// }
///
/// let mut first = Shared::<Scratch>::new();
/// let mut second = Shared::<Scratch>::new();
///
/// let block = first.allocate(64);
/// unsafe { second.deallocate(block) };
/// assert_eq!(Shared::<Scratch>::with(|arena| arena.used()), 0);
/// ```
#[macro_export]
macro_rules! shared_allocator {
  ($(#[$meta:meta])* $vis:vis unsafe struct $name:ident($allocator:ty);) => {
    $(#[$meta])*
    #[derive(Clone, Copy, Debug, Default)]
    $vis struct $name;

    unsafe impl $crate::shared::SharedKey for $name {
      type Allocator = $allocator;

      fn cell() -> &'static $crate::shared::SharedCell<$allocator> {
        static CELL: ::std::sync::OnceLock<$crate::shared::SharedCell<$allocator>> =
          ::std::sync::OnceLock::new();
        $crate::shared::SharedCell::get_or_init(&CELL, ::std::stringify!($name))
      }
    }
  };
}

/// Handle to the process-wide instance named by `K`.
///
/// Every handle, wherever it was created, reaches the same state. The
/// instance is built on first use and lives until the process exits.
pub struct Shared<K> {
  key: PhantomData<fn() -> K>,
}

impl<K: SharedKey> Shared<K> {
  pub const fn new() -> Self {
    Self { key: PhantomData }
  }

  /// Inspects the shared instance.
  pub fn with<R>(f: impl FnOnce(&K::Allocator) -> R) -> R {
    // SAFETY: `SharedKey` rules out a concurrent mutable access.
    f(unsafe { &*K::cell().get() })
  }

  #[inline]
  fn instance(&mut self) -> &mut K::Allocator {
    // SAFETY: calls on one key never overlap, so this is the only live
    // reference for the duration of the call.
    unsafe { &mut *K::cell().get() }
  }
}

impl<K: SharedKey> Allocator for Shared<K> {
  const ALIGNMENT: usize = K::Allocator::ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = K::Allocator::MIN_ALLOC_SIZE;
  const MAX_ALLOC_SIZE: usize = K::Allocator::MAX_ALLOC_SIZE;
  const CAPABILITIES: Capabilities = K::Allocator::CAPABILITIES;

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    self.instance().allocate(size)
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    unsafe { self.instance().deallocate(block) }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    Self::with(|allocator| allocator.owns(block))
  }

  fn owns_precisely(&self) -> bool {
    Self::with(|allocator| allocator.owns_precisely())
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    self.instance().allocate_aligned(size, alignment)
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    unsafe { self.instance().deallocate_aligned(block) }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    unsafe { self.instance().reallocate(block, size) }
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    unsafe { self.instance().reallocate_aligned(block, size, alignment) }
  }

  fn allocate_all(&mut self) -> Block {
    self.instance().allocate_all()
  }

  fn allocate_all_aligned(
    &mut self,
    alignment: usize,
  ) -> Block {
    self.instance().allocate_all_aligned(alignment)
  }

  unsafe fn deallocate_all(&mut self) {
    unsafe { self.instance().deallocate_all() }
  }
}

impl<K: SharedKey> Default for Shared<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K> Clone for Shared<K> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<K> Copy for Shared<K> {}

impl<K> fmt::Debug for Shared<K> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Shared<{}>", std::any::type_name::<K>())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, heap::Heap};

  // Each key is used by a single test, so tests on parallel threads never
  // touch the same instance.
  shared_allocator! {
    unsafe struct LifoArena(Arena<256, 16>);
  }

  shared_allocator! {
    unsafe struct ResetArena(Arena<128, 16>);
  }

  shared_allocator! {
    unsafe struct SharedHeap(Heap);
  }

  #[test]
  fn test_handles_share_one_cursor() {
    let mut first = Shared::<LifoArena>::new();
    let mut second = Shared::<LifoArena>::new();

    let a = first.allocate(10);
    let b = second.allocate(20);
    assert!(a.is_valid() && b.is_valid());
    assert!(a.end() <= b.address());
    assert!(first.owns(b) && second.owns(a));
    assert_eq!(Shared::<LifoArena>::with(|arena| arena.used()), 48);

    unsafe {
      first.deallocate(b);
      second.deallocate(a);
    }
    assert_eq!(Shared::<LifoArena>::with(|arena| arena.used()), 0);
  }

  #[test]
  fn test_copies_reach_same_instance() {
    let mut handle = Shared::<ResetArena>::default();
    let mut copy = handle;

    let rest = handle.allocate_all();
    assert_eq!(rest.size(), 128);
    assert!(!copy.allocate(1).is_valid());

    unsafe { copy.deallocate_all() };
    assert_eq!(Shared::<ResetArena>::with(|arena| arena.remaining()), 128);
  }

  #[test]
  fn test_forwards_capabilities() {
    assert_eq!(Shared::<SharedHeap>::CAPABILITIES, Heap::CAPABILITIES);
    assert_eq!(Shared::<LifoArena>::ALIGNMENT, 16);

    let mut heap = Shared::<SharedHeap>::new();
    let mut block = heap.allocate(8);
    unsafe {
      assert!(heap.reallocate(&mut block, 4096));
      heap.deallocate(block);
    }
  }
}
