use std::{fmt, mem, ptr};

use crate::{
  align::{align_up, max_alignment},
  allocator::{Allocator, Capabilities, Trivial, reallocate_trivial},
  block::Block,
};

/// Distance from the raw inner block to the aligned client block, stored
/// right after the client bytes when the inner allocator cannot align.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
struct PaddingRecord {
  offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
  /// The inner allocator already aligns every block well enough.
  Direct,
  /// The inner allocator has its own aligned operations.
  Native,
  /// Over-allocate and carve an aligned sub-block.
  Padded,
}

/// Makes every `allocate` return an address aligned to `FORCED`.
pub struct ForceAlign<A, const FORCED: usize> {
  inner: A,
}

impl<A: Allocator, const FORCED: usize> ForceAlign<A, FORCED> {
  const VALID: () = assert!(FORCED.is_power_of_two(), "forced alignment must be a power of two");

  const STRATEGY: Strategy = if A::ALIGNMENT >= FORCED {
    Strategy::Direct
  } else if A::CAPABILITIES.allocate_aligned && A::CAPABILITIES.deallocate_aligned {
    Strategy::Native
  } else {
    Strategy::Padded
  };

  const PADDING: usize = FORCED - 1 + mem::size_of::<PaddingRecord>();

  pub fn new(inner: A) -> Self {
    let () = Self::VALID;
    Self { inner }
  }

  pub fn inner(&self) -> &A {
    &self.inner
  }

  pub fn into_inner(self) -> A {
    self.inner
  }

  fn allocate_padded(
    &mut self,
    size: usize,
  ) -> Block {
    let Some(total) = size.checked_add(Self::PADDING) else {
      return Block::empty();
    };

    let raw = self.inner.allocate(total);
    if !raw.is_valid() {
      return Block::empty();
    }

    let Some(aligned) = align_up(raw.address(), FORCED) else {
      unsafe { self.inner.deallocate(raw) };
      return Block::empty();
    };
    let offset = aligned - raw.address();

    unsafe {
      let address = raw.as_ptr().add(offset);
      ptr::write_unaligned(address.add(size).cast::<PaddingRecord>(), PaddingRecord { offset });
      Block::new(address, size)
    }
  }

  /// Rebuilds the raw inner block from an aligned client block.
  unsafe fn raw_block(block: Block) -> Block {
    unsafe {
      let record = ptr::read_unaligned(block.as_ptr().add(block.size()).cast::<PaddingRecord>());
      Block::new(block.as_ptr().sub(record.offset), block.size() + Self::PADDING)
    }
  }
}

impl<A: Allocator, const FORCED: usize> Allocator for ForceAlign<A, FORCED> {
  const ALIGNMENT: usize = max_alignment(FORCED, A::ALIGNMENT);
  const MIN_ALLOC_SIZE: usize = 1;
  const MAX_ALLOC_SIZE: usize = match Self::STRATEGY {
    Strategy::Padded => A::MAX_ALLOC_SIZE.saturating_sub(Self::PADDING),
    _ => A::MAX_ALLOC_SIZE,
  };
  const CAPABILITIES: Capabilities = Capabilities {
    reallocate: true,
    deallocate_all: A::CAPABILITIES.deallocate_all,
    precise_owns: A::CAPABILITIES.precise_owns,
    ..Capabilities::NONE
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    if size == 0 || size > Self::MAX_ALLOC_SIZE {
      return Block::empty();
    }

    match Self::STRATEGY {
      Strategy::Direct => self.inner.allocate(size),
      Strategy::Native => self.inner.allocate_aligned(size, FORCED),
      Strategy::Padded => self.allocate_padded(size),
    }
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    unsafe {
      match Self::STRATEGY {
        Strategy::Direct => self.inner.deallocate(block),
        Strategy::Native => self.inner.deallocate_aligned(block),
        Strategy::Padded => self.inner.deallocate(Self::raw_block(block)),
      }
    }
  }

  /// The client address always lies inside the inner block.
  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.inner.owns(block)
  }

  fn owns_precisely(&self) -> bool {
    self.inner.owns_precisely()
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if size > Self::MAX_ALLOC_SIZE {
      return false;
    }

    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, None) } {
      return done;
    }

    let resized = match Self::STRATEGY {
      Strategy::Direct if A::CAPABILITIES.reallocate => unsafe { self.inner.reallocate(block, size) },
      Strategy::Native if A::CAPABILITIES.reallocate_aligned => unsafe {
        self.inner.reallocate_aligned(block, size, FORCED)
      },
      _ => false,
    };
    if resized {
      return true;
    }

    let fresh = self.allocate(size);
    if !fresh.is_valid() {
      return false;
    }

    unsafe {
      block.copy_into(&fresh);
      self.deallocate(*block);
    }
    *block = fresh;
    true
  }

  unsafe fn deallocate_all(&mut self) {
    if A::CAPABILITIES.deallocate_all {
      unsafe { self.inner.deallocate_all() }
    }
  }
}

impl<A: Allocator + Default, const FORCED: usize> Default for ForceAlign<A, FORCED> {
  fn default() -> Self {
    Self::new(A::default())
  }
}

impl<A: Clone, const FORCED: usize> Clone for ForceAlign<A, FORCED> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<A: fmt::Debug, const FORCED: usize> fmt::Debug for ForceAlign<A, FORCED> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("ForceAlign")
      .field("inner", &self.inner)
      .field("alignment", &FORCED)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    align::is_aligned,
    arena::Arena,
    heap::{AlignedHeap, Heap},
  };

  #[test]
  fn test_strategy_selection() {
    assert_eq!(ForceAlign::<Heap, 64>::STRATEGY, Strategy::Padded);
    assert_eq!(ForceAlign::<Heap, 8>::STRATEGY, Strategy::Direct);
    assert_eq!(ForceAlign::<AlignedHeap<16>, 64>::STRATEGY, Strategy::Native);
  }

  #[test]
  fn test_padded_addresses_are_aligned() {
    let mut forced = ForceAlign::<Heap, 64>::new(Heap::new());
    let mut blocks = Vec::new();

    for size in 1..200 {
      let block = forced.allocate(size);
      assert!(block.is_valid());
      assert_eq!(block.size(), size);
      assert!(is_aligned(block.address(), 64));
      unsafe { block.as_mut_slice().fill(0xEE) };
      blocks.push(block);
    }

    for block in blocks {
      unsafe { forced.deallocate(block) };
    }
  }

  #[test]
  fn test_native_addresses_are_aligned() {
    let mut forced = ForceAlign::<AlignedHeap<16>, 64>::new(AlignedHeap::new());

    for size in [1, 63, 64, 65, 4096] {
      let block = forced.allocate(size);
      assert!(is_aligned(block.address(), 64));
      unsafe { forced.deallocate(block) };
    }
  }

  #[test]
  fn test_direct_over_arena_releases_lifo() {
    let mut forced = ForceAlign::<Box<Arena<512, 8>>, 8>::new(Box::new(Arena::new()));

    let block = forced.allocate(24);
    assert!(is_aligned(block.address(), 8));
    unsafe { forced.deallocate(block) };
    assert_eq!(forced.inner().used(), 0);
  }

  #[test]
  fn test_reallocate_keeps_alignment_and_contents() {
    let mut forced = ForceAlign::<Heap, 128>::new(Heap::new());
    let mut block = forced.allocate(10);

    unsafe {
      block.as_mut_slice().copy_from_slice(b"0123456789");
      assert!(forced.reallocate(&mut block, 1000));
      assert!(is_aligned(block.address(), 128));
      assert_eq!(&block.as_slice()[..10], b"0123456789");
      forced.deallocate(block);
    }
  }
}
