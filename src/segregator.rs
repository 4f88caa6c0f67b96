use crate::{
  allocator::{Allocator, Capabilities, Trivial, move_block, reallocate_trivial},
  block::Block,
};

/// Routes requests of at most `THRESHOLD` bytes to `Small`, the rest to
/// `Large`.
///
/// A block's size cannot always be re-derived here, so frees are routed by
/// ownership, asking the precise side first. Put an `Affix` size prefix on
/// top when routing must follow the original request size instead.
#[derive(Clone, Debug)]
pub struct Segregator<const THRESHOLD: usize, Small, Large> {
  small: Small,
  large: Large,
}

impl<const THRESHOLD: usize, Small: Allocator, Large: Allocator> Segregator<THRESHOLD, Small, Large> {
  const ROUTABLE: () = assert!(
    Small::CAPABILITIES.precise_owns || Large::CAPABILITIES.precise_owns,
    "segregator needs at least one allocator with a precise `owns`"
  );

  pub fn new(
    small: Small,
    large: Large,
  ) -> Self {
    let () = Self::ROUTABLE;
    Self { small, large }
  }

  pub fn small(&self) -> &Small {
    &self.small
  }

  pub fn large(&self) -> &Large {
    &self.large
  }

  #[inline]
  pub const fn is_small(size: usize) -> bool {
    size <= THRESHOLD
  }

  fn small_owns(
    &self,
    block: Block,
  ) -> bool {
    if Small::CAPABILITIES.precise_owns {
      self.small.owns(block)
    } else {
      !self.large.owns(block)
    }
  }
}

impl<const THRESHOLD: usize, Small, Large> Default for Segregator<THRESHOLD, Small, Large>
where
  Small: Allocator + Default,
  Large: Allocator + Default,
{
  fn default() -> Self {
    Self::new(Small::default(), Large::default())
  }
}

impl<const THRESHOLD: usize, Small: Allocator, Large: Allocator> Allocator for Segregator<THRESHOLD, Small, Large> {
  const ALIGNMENT: usize = if Small::ALIGNMENT < Large::ALIGNMENT {
    Small::ALIGNMENT
  } else {
    Large::ALIGNMENT
  };
  const MIN_ALLOC_SIZE: usize = Small::MIN_ALLOC_SIZE;
  const MAX_ALLOC_SIZE: usize = Large::MAX_ALLOC_SIZE;
  const CAPABILITIES: Capabilities = {
    let both = Small::CAPABILITIES.and(Large::CAPABILITIES);
    Capabilities {
      allocate_all: false,
      allocate_all_aligned: false,
      ..both
    }
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    if Self::is_small(size) {
      self.small.allocate(size)
    } else {
      self.large.allocate(size)
    }
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    if self.small_owns(block) {
      unsafe { self.small.deallocate(block) }
    } else {
      debug_assert!(self.large.owns(block));
      unsafe { self.large.deallocate(block) }
    }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.small.owns(block) || self.large.owns(block)
  }

  fn owns_precisely(&self) -> bool {
    self.small.owns_precisely() && self.large.owns_precisely()
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    if Self::is_small(size) {
      self.small.allocate_aligned(size, alignment)
    } else {
      self.large.allocate_aligned(size, alignment)
    }
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    if self.small_owns(block) {
      unsafe { self.small.deallocate_aligned(block) }
    } else {
      unsafe { self.large.deallocate_aligned(block) }
    }
  }

  /// Resizes in place while the size class holds, otherwise moves the block
  /// into the other class.
  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if !Self::CAPABILITIES.reallocate {
      return false;
    }

    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, None) } {
      return done;
    }

    let from_small = self.small_owns(*block);
    unsafe {
      match (from_small, Self::is_small(size)) {
        (true, true) => self.small.reallocate(block, size),
        (false, false) => self.large.reallocate(block, size),
        (true, false) => move_block(&mut self.small, &mut self.large, block, size),
        (false, true) => move_block(&mut self.large, &mut self.small, block, size),
      }
    }
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

    // Crossing classes would need an aligned move; keep the owner.
    if self.small_owns(*block) {
      unsafe { self.small.reallocate_aligned(block, size, alignment) }
    } else {
      unsafe { self.large.reallocate_aligned(block, size, alignment) }
    }
  }

  unsafe fn deallocate_all(&mut self) {
    if Self::CAPABILITIES.deallocate_all {
      unsafe {
        self.small.deallocate_all();
        self.large.deallocate_all();
      }
    }
  }
}
