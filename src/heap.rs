use std::{mem, ptr};

use libc::{c_void, free, malloc, posix_memalign, realloc};
use log::trace;

use crate::{
  allocator::{Allocator, Capabilities, Trivial, accepts, reallocate_trivial},
  block::Block,
};

/// Alignment `malloc` guarantees on every supported target.
pub const MALLOC_ALIGNMENT: usize = 2 * mem::size_of::<usize>();

/// Largest request the heap primitives will forward to libc.
pub const MAX_HEAP_SIZE: usize = isize::MAX as usize;

/// Stateless allocator over the process heap (`malloc`/`realloc`/`free`).
///
/// No bookkeeping is kept, so [`owns`](Allocator::owns) answers `true` for
/// everything. Put a precise allocator in front of it when composing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heap;

impl Heap {
  pub const fn new() -> Self {
    Self
  }
}

impl Allocator for Heap {
  const ALIGNMENT: usize = MALLOC_ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = 1;
  const MAX_ALLOC_SIZE: usize = MAX_HEAP_SIZE;
  const CAPABILITIES: Capabilities = Capabilities {
    reallocate: true,
    ..Capabilities::NONE
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    if !accepts::<Self>(size) {
      return Block::empty();
    }

    let address = unsafe { malloc(size) } as *mut u8;
    trace!("heap: malloc({}) -> {:p}", size, address);

    if address.is_null() {
      return Block::empty();
    }

    Block::new(address, size)
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    debug_assert!(self.owns(block));

    if !block.is_valid() {
      return;
    }

    trace!("heap: free({:p}, {})", block.as_ptr(), block.size());
    unsafe { free(block.as_ptr() as *mut c_void) }
  }

  fn owns(
    &self,
    _block: Block,
  ) -> bool {
    true
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

    let address = unsafe { realloc(block.as_ptr() as *mut c_void, size) } as *mut u8;
    trace!(
      "heap: realloc({:p}, {} -> {}) -> {:p}",
      block.as_ptr(),
      block.size(),
      size,
      address
    );

    if address.is_null() {
      return false;
    }

    *block = Block::new(address, size);
    true
  }
}

/// Heap allocator backed by `posix_memalign`.
///
/// Plain [`allocate`](Allocator::allocate) uses `DEFAULT_ALIGNMENT`; the
/// aligned operations accept any power of two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlignedHeap<const DEFAULT_ALIGNMENT: usize = 16>;

impl<const DEFAULT_ALIGNMENT: usize> AlignedHeap<DEFAULT_ALIGNMENT> {
  const VALID: () = assert!(
    DEFAULT_ALIGNMENT.is_power_of_two(),
    "default alignment must be a power of two"
  );

  pub const fn new() -> Self {
    let () = Self::VALID;
    Self
  }

  fn memalign(
    size: usize,
    alignment: usize,
  ) -> Block {
    if !accepts::<Self>(size) || !alignment.is_power_of_two() {
      return Block::empty();
    }

    // posix_memalign wants a multiple of the pointer size.
    let alignment = alignment.max(mem::size_of::<*mut c_void>());
    let mut address: *mut c_void = ptr::null_mut();
    let status = unsafe { posix_memalign(&mut address, alignment, size) };
    trace!(
      "heap: posix_memalign({}, {}) -> {:p} ({})",
      alignment, size, address, status
    );

    if status != 0 || address.is_null() {
      return Block::empty();
    }

    Block::new(address as *mut u8, size)
  }
}

impl<const DEFAULT_ALIGNMENT: usize> Allocator for AlignedHeap<DEFAULT_ALIGNMENT> {
  const ALIGNMENT: usize = DEFAULT_ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = 1;
  const MAX_ALLOC_SIZE: usize = MAX_HEAP_SIZE;
  const CAPABILITIES: Capabilities = Capabilities {
    allocate_aligned: true,
    deallocate_aligned: true,
    reallocate: true,
    reallocate_aligned: true,
    ..Capabilities::NONE
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    self.allocate_aligned(size, DEFAULT_ALIGNMENT)
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    unsafe { self.deallocate_aligned(block) }
  }

  fn owns(
    &self,
    _block: Block,
  ) -> bool {
    true
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    Self::memalign(size, alignment)
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    trace!("heap: aligned free({:p}, {})", block.as_ptr(), block.size());
    unsafe { free(block.as_ptr() as *mut c_void) }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    unsafe { self.reallocate_aligned(block, size, DEFAULT_ALIGNMENT) }
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    if !alignment.is_power_of_two() {
      return false;
    }

    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, Some(alignment)) } {
      return done;
    }

    // There is no aligned realloc; move through a fresh region.
    let fresh = Self::memalign(size, alignment);
    if !fresh.is_valid() {
      return false;
    }

    unsafe {
      block.copy_into(&fresh);
      self.deallocate_aligned(*block);
    }
    *block = fresh;
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::is_aligned;

  #[test]
  fn test_heap_allocate_and_free() {
    let mut heap = Heap::new();

    let block = heap.allocate(24);
    assert!(block.is_valid());
    assert_eq!(block.size(), 24);
    assert!(is_aligned(block.address(), Heap::ALIGNMENT));

    unsafe {
      block.as_mut_slice().fill(0x5A);
      heap.deallocate(block);
    }
  }

  #[test]
  fn test_heap_rejects_zero_and_oversized() {
    let mut heap = Heap::new();

    assert!(!heap.allocate(0).is_valid());
    assert!(!heap.allocate(usize::MAX).is_valid());
  }

  #[test]
  fn test_heap_owns_everything() {
    let heap = Heap::new();
    let mut byte = 0u8;

    assert!(heap.owns(Block::new(&mut byte, 1)));
    assert!(heap.owns(Block::empty()));
  }

  #[test]
  fn test_heap_reallocate_keeps_contents() {
    let mut heap = Heap::new();
    let mut block = heap.allocate(8);

    unsafe {
      block.as_mut_slice().copy_from_slice(b"abcdefgh");
      assert!(heap.reallocate(&mut block, 4096));
      assert_eq!(block.size(), 4096);
      assert_eq!(&block.as_slice()[..8], b"abcdefgh");
      heap.deallocate(block);
    }
  }

  #[test]
  fn test_heap_failed_reallocate_leaves_block() {
    let mut heap = Heap::new();
    let mut block = heap.allocate(8);
    let before = block;

    unsafe {
      assert!(!heap.reallocate(&mut block, usize::MAX));
      assert_eq!(block, before);
      heap.deallocate(block);
    }
  }

  #[test]
  fn test_heap_reallocate_to_zero_frees() {
    let mut heap = Heap::new();
    let mut block = heap.allocate(8);

    unsafe {
      assert!(heap.reallocate(&mut block, 0));
    }
    assert!(block.is_empty());
  }

  #[test]
  fn test_aligned_heap_honours_alignment() {
    let mut heap = AlignedHeap::<16>::new();

    for alignment in [16, 64, 256, 4096] {
      let block = heap.allocate_aligned(100, alignment);
      assert!(block.is_valid());
      assert!(is_aligned(block.address(), alignment));
      unsafe { heap.deallocate_aligned(block) };
    }

    let block = heap.allocate(3);
    assert!(is_aligned(block.address(), 16));
    unsafe { heap.deallocate(block) };
  }

  #[test]
  fn test_aligned_heap_rejects_bad_alignment() {
    let mut heap = AlignedHeap::<16>::new();

    assert!(!heap.allocate_aligned(32, 24).is_valid());
    assert!(!heap.allocate_aligned(0, 64).is_valid());
  }

  #[test]
  fn test_aligned_heap_reallocate_keeps_alignment() {
    let mut heap = AlignedHeap::<16>::new();
    let mut block = heap.allocate_aligned(16, 128);

    unsafe {
      block.as_mut_slice().fill(7);
      assert!(heap.reallocate_aligned(&mut block, 1000, 128));
      assert!(is_aligned(block.address(), 128));
      assert!(block.as_slice()[..16].iter().all(|&b| b == 7));
      heap.deallocate_aligned(block);
    }
  }
}
