use crate::{
  allocator::{Allocator, Capabilities},
  block::Block,
};

/// Sends plain requests to `Unaligned` and explicitly aligned requests to
/// `Aligned`, so alignment is only paid for when asked for.
#[derive(Clone, Debug, Default)]
pub struct AlignmentRouter<Aligned, Unaligned> {
  aligned: Aligned,
  unaligned: Unaligned,
}

impl<Aligned: Allocator, Unaligned: Allocator> AlignmentRouter<Aligned, Unaligned> {
  pub fn new(
    aligned: Aligned,
    unaligned: Unaligned,
  ) -> Self {
    Self { aligned, unaligned }
  }

  pub fn aligned(&self) -> &Aligned {
    &self.aligned
  }

  pub fn unaligned(&self) -> &Unaligned {
    &self.unaligned
  }
}

impl<Aligned: Allocator, Unaligned: Allocator> Allocator for AlignmentRouter<Aligned, Unaligned> {
  const ALIGNMENT: usize = Unaligned::ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = Unaligned::MIN_ALLOC_SIZE;
  const MAX_ALLOC_SIZE: usize = Unaligned::MAX_ALLOC_SIZE;
  const CAPABILITIES: Capabilities = Capabilities {
    allocate_aligned: Aligned::CAPABILITIES.allocate_aligned,
    deallocate_aligned: Aligned::CAPABILITIES.deallocate_aligned,
    reallocate: Unaligned::CAPABILITIES.reallocate,
    reallocate_aligned: Aligned::CAPABILITIES.reallocate_aligned,
    allocate_all: Unaligned::CAPABILITIES.allocate_all,
    allocate_all_aligned: Aligned::CAPABILITIES.allocate_all_aligned,
    deallocate_all: Aligned::CAPABILITIES.deallocate_all && Unaligned::CAPABILITIES.deallocate_all,
    precise_owns: Aligned::CAPABILITIES.precise_owns && Unaligned::CAPABILITIES.precise_owns,
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    self.unaligned.allocate(size)
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    unsafe { self.unaligned.deallocate(block) }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.aligned.owns(block) || self.unaligned.owns(block)
  }

  fn owns_precisely(&self) -> bool {
    self.aligned.owns_precisely() && self.unaligned.owns_precisely()
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    self.aligned.allocate_aligned(size, alignment)
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    unsafe { self.aligned.deallocate_aligned(block) }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    unsafe { self.unaligned.reallocate(block, size) }
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    unsafe { self.aligned.reallocate_aligned(block, size, alignment) }
  }

  fn allocate_all(&mut self) -> Block {
    self.unaligned.allocate_all()
  }

  fn allocate_all_aligned(
    &mut self,
    alignment: usize,
  ) -> Block {
    self.aligned.allocate_all_aligned(alignment)
  }

  unsafe fn deallocate_all(&mut self) {
    unsafe {
      if Aligned::CAPABILITIES.deallocate_all {
        self.aligned.deallocate_all();
      }
      if Unaligned::CAPABILITIES.deallocate_all {
        self.unaligned.deallocate_all();
      }
    }
  }
}
