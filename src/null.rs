use crate::{
  allocator::{Allocator, Capabilities},
  block::Block,
};

/// Allocator that always fails. Terminal or disabled branch of a composite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullAllocator;

impl NullAllocator {
  pub const fn new() -> Self {
    Self
  }
}

impl Allocator for NullAllocator {
  const ALIGNMENT: usize = 64 * 1024;
  const MIN_ALLOC_SIZE: usize = 0;
  const MAX_ALLOC_SIZE: usize = usize::MAX;
  const CAPABILITIES: Capabilities = Capabilities {
    allocate_aligned: true,
    deallocate_aligned: true,
    reallocate: true,
    reallocate_aligned: true,
    allocate_all: true,
    allocate_all_aligned: true,
    deallocate_all: true,
    precise_owns: true,
  };

  fn allocate(
    &mut self,
    _size: usize,
  ) -> Block {
    Block::empty()
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    debug_assert!(block.is_empty(), "null allocator never hands out {:?}", block);
  }

  /// Only the zero block belongs here.
  fn owns(
    &self,
    block: Block,
  ) -> bool {
    block.is_empty()
  }

  fn allocate_aligned(
    &mut self,
    _size: usize,
    _alignment: usize,
  ) -> Block {
    Block::empty()
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    debug_assert!(block.is_empty(), "null allocator never hands out {:?}", block);
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    debug_assert!(block.is_empty());
    size == 0
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    _alignment: usize,
  ) -> bool {
    debug_assert!(block.is_empty());
    size == 0
  }

  fn allocate_all(&mut self) -> Block {
    Block::empty()
  }

  fn allocate_all_aligned(
    &mut self,
    _alignment: usize,
  ) -> Block {
    Block::empty()
  }

  unsafe fn deallocate_all(&mut self) {}
}
