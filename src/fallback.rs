use crate::{
  allocator::{Allocator, Capabilities, Trivial, move_block, reallocate_trivial},
  block::Block,
};

/// Tries `Primary` first and retries `Secondary` when it fails.
///
/// Frees are routed by ownership. The allocator with a precise `owns` is
/// asked first, so an optimistic heap may sit on either side; two optimistic
/// allocators cannot be told apart and are rejected at compile time.
#[derive(Clone, Debug)]
pub struct Fallback<Primary, Secondary> {
  primary: Primary,
  secondary: Secondary,
}

impl<Primary: Allocator, Secondary: Allocator> Fallback<Primary, Secondary> {
  const ROUTABLE: () = assert!(
    Primary::CAPABILITIES.precise_owns || Secondary::CAPABILITIES.precise_owns,
    "fallback needs at least one allocator with a precise `owns`"
  );

  pub fn new(
    primary: Primary,
    secondary: Secondary,
  ) -> Self {
    let () = Self::ROUTABLE;
    Self { primary, secondary }
  }

  pub fn primary(&self) -> &Primary {
    &self.primary
  }

  pub fn primary_mut(&mut self) -> &mut Primary {
    &mut self.primary
  }

  pub fn secondary(&self) -> &Secondary {
    &self.secondary
  }

  pub fn secondary_mut(&mut self) -> &mut Secondary {
    &mut self.secondary
  }

  fn primary_owns(
    &self,
    block: Block,
  ) -> bool {
    if Primary::CAPABILITIES.precise_owns {
      self.primary.owns(block)
    } else {
      !self.secondary.owns(block)
    }
  }

  /// # Safety
  ///
  /// Every block handed out by the primary allocator becomes dangling.
  pub unsafe fn deallocate_all_primary(&mut self) {
    if Primary::CAPABILITIES.deallocate_all {
      unsafe { self.primary.deallocate_all() }
    }
  }

  /// # Safety
  ///
  /// Every block handed out by the secondary allocator becomes dangling.
  pub unsafe fn deallocate_all_fallback(&mut self) {
    if Secondary::CAPABILITIES.deallocate_all {
      unsafe { self.secondary.deallocate_all() }
    }
  }
}

impl<Primary, Secondary> Default for Fallback<Primary, Secondary>
where
  Primary: Allocator + Default,
  Secondary: Allocator + Default,
{
  fn default() -> Self {
    Self::new(Primary::default(), Secondary::default())
  }
}

impl<Primary: Allocator, Secondary: Allocator> Allocator for Fallback<Primary, Secondary> {
  const ALIGNMENT: usize = if Primary::ALIGNMENT < Secondary::ALIGNMENT {
    Primary::ALIGNMENT
  } else {
    Secondary::ALIGNMENT
  };
  const MIN_ALLOC_SIZE: usize = if Primary::MIN_ALLOC_SIZE < Secondary::MIN_ALLOC_SIZE {
    Primary::MIN_ALLOC_SIZE
  } else {
    Secondary::MIN_ALLOC_SIZE
  };
  const MAX_ALLOC_SIZE: usize = if Primary::MAX_ALLOC_SIZE > Secondary::MAX_ALLOC_SIZE {
    Primary::MAX_ALLOC_SIZE
  } else {
    Secondary::MAX_ALLOC_SIZE
  };
  const CAPABILITIES: Capabilities = {
    let both = Primary::CAPABILITIES.and(Secondary::CAPABILITIES);
    Capabilities {
      // Primary blocks can always move over to the secondary.
      reallocate: Secondary::CAPABILITIES.reallocate,
      reallocate_aligned: both.reallocate_aligned,
      deallocate_all: both.deallocate_all,
      precise_owns: both.precise_owns,
      ..Primary::CAPABILITIES.or(Secondary::CAPABILITIES)
    }
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    let block = self.primary.allocate(size);
    if block.is_valid() {
      return block;
    }

    self.secondary.allocate(size)
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    if self.primary_owns(block) {
      unsafe { self.primary.deallocate(block) }
    } else {
      debug_assert!(self.secondary.owns(block));
      unsafe { self.secondary.deallocate(block) }
    }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.primary.owns(block) || self.secondary.owns(block)
  }

  fn owns_precisely(&self) -> bool {
    self.primary.owns_precisely() && self.secondary.owns_precisely()
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    if Primary::CAPABILITIES.allocate_aligned {
      let block = self.primary.allocate_aligned(size, alignment);
      if block.is_valid() {
        return block;
      }
    }

    if Secondary::CAPABILITIES.allocate_aligned {
      return self.secondary.allocate_aligned(size, alignment);
    }

    Block::empty()
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    if self.primary_owns(block) {
      unsafe { self.primary.deallocate_aligned(block) }
    } else {
      unsafe { self.secondary.deallocate_aligned(block) }
    }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, None) } {
      return done;
    }

    if !self.primary_owns(*block) {
      return Secondary::CAPABILITIES.reallocate && unsafe { self.secondary.reallocate(block, size) };
    }

    if Primary::CAPABILITIES.reallocate && unsafe { self.primary.reallocate(block, size) } {
      return true;
    }

    unsafe { move_block(&mut self.primary, &mut self.secondary, block, size) }
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    if !Self::CAPABILITIES.reallocate_aligned {
      return false;
    }

    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, Some(alignment)) } {
      return done;
    }

    if self.primary_owns(*block) {
      unsafe { self.primary.reallocate_aligned(block, size, alignment) }
    } else {
      unsafe { self.secondary.reallocate_aligned(block, size, alignment) }
    }
  }

  fn allocate_all(&mut self) -> Block {
    if Primary::CAPABILITIES.allocate_all {
      let block = self.primary.allocate_all();
      if block.is_valid() {
        return block;
      }
    }

    if Secondary::CAPABILITIES.allocate_all {
      return self.secondary.allocate_all();
    }

    Block::empty()
  }

  fn allocate_all_aligned(
    &mut self,
    alignment: usize,
  ) -> Block {
    if Primary::CAPABILITIES.allocate_all_aligned {
      let block = self.primary.allocate_all_aligned(alignment);
      if block.is_valid() {
        return block;
      }
    }

    if Secondary::CAPABILITIES.allocate_all_aligned {
      return self.secondary.allocate_all_aligned(alignment);
    }

    Block::empty()
  }

  unsafe fn deallocate_all(&mut self) {
    unsafe {
      self.deallocate_all_primary();
      self.deallocate_all_fallback();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, heap::Heap, null::NullAllocator};

  type Small = Box<Arena<64, 16>>;

  fn arena_then_heap() -> Fallback<Small, Heap> {
    Fallback::new(Box::new(Arena::new()), Heap::new())
  }

  #[test]
  fn test_null_then_heap_owns() {
    let mut fallback = Fallback::new(NullAllocator::new(), Heap::new());

    for size in [1, 7, 64, 1000] {
      let block = fallback.allocate(size);
      assert!(block.is_valid());
      assert!(!fallback.primary().owns(block));
      assert!(fallback.secondary().owns(block));
      assert!(fallback.owns(block));
      unsafe { fallback.deallocate(block) };
    }

    assert!(fallback.primary().owns(Block::empty()));
  }

  #[test]
  fn test_spills_to_secondary() {
    let mut fallback = arena_then_heap();

    let small = fallback.allocate(48);
    let large = fallback.allocate(48);

    assert!(fallback.primary().owns(small));
    assert!(!fallback.primary().owns(large));

    unsafe {
      fallback.deallocate(large);
      fallback.deallocate(small);
    }
    assert_eq!(fallback.primary().used(), 0);
  }

  #[test]
  fn test_optimistic_primary_routes_by_secondary() {
    let mut fallback: Fallback<Heap, Small> = Fallback::new(Heap::new(), Box::new(Arena::new()));
    let block = fallback.allocate(16);

    assert!(!fallback.secondary().owns(block));
    unsafe { fallback.deallocate(block) };
    assert_eq!(fallback.secondary().used(), 0);
  }

  #[test]
  fn test_reallocate_moves_to_secondary() {
    let mut fallback = arena_then_heap();
    let mut block = fallback.allocate(16);

    unsafe {
      block.as_mut_slice().fill(3);
      assert!(fallback.reallocate(&mut block, 1024));
      assert!(!fallback.primary().owns(block));
      assert!(block.as_slice()[..16].iter().all(|&b| b == 3));
      fallback.deallocate(block);
    }
    assert_eq!(fallback.primary().used(), 0);
  }

  #[test]
  fn test_deallocate_all_primary_only() {
    let mut fallback = Fallback::new(Box::new(Arena::<64, 16>::new()), Box::new(Arena::<64, 16>::new()));

    fallback.allocate(64);
    fallback.allocate(32);
    unsafe { fallback.deallocate_all_primary() };

    assert_eq!(fallback.primary().used(), 0);
    assert_eq!(fallback.secondary().used(), 32);

    unsafe { fallback.deallocate_all() };
    assert_eq!(fallback.secondary().used(), 0);
  }
}
