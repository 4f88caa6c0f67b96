use crate::{
  allocator::{Allocator, Capabilities},
  block::Block,
};

/// One of two allocator types, chosen per instance.
///
/// Lets a [`BinarySegregator`](crate::BinarySegregator) mix bucket types, for
/// example arena size classes over a heap bucket that takes everything else:
///
/// ```
/// use allocompose::{Allocator, Arena, BinarySegregator, Either, Heap};
///
/// type Class = Either<Box<Arena<4096, 16>>, Heap>;
///
/// let mut classes = BinarySegregator::new([
///   (64, Class::Left(Box::new(Arena::new()))),
///   (512, Class::Left(Box::new(Arena::new()))),
///   (usize::MAX, Class::Right(Heap::new())),
/// ])
/// .unwrap();
///
/// let large = classes.allocate(1 << 16);
/// assert!(classes.bucket(2).unwrap().owns(large));
/// unsafe { classes.deallocate(large) };
/// ```
///
/// Its `CAPABILITIES` are those of either side, and `precise_owns` only when
/// both sides are precise. [`Allocator::owns_precisely`] answers for the
/// variant actually held.
#[derive(Debug)]
pub enum Either<L, R> {
  Left(L),
  Right(R),
}

macro_rules! either {
  ($value:expr, $inner:ident => $body:expr) => {
    match $value {
      Either::Left($inner) => $body,
      Either::Right($inner) => $body,
    }
  };
}

impl<L, R> Either<L, R> {
  pub fn left(&self) -> Option<&L> {
    match self {
      Either::Left(left) => Some(left),
      Either::Right(_) => None,
    }
  }

  pub fn right(&self) -> Option<&R> {
    match self {
      Either::Left(_) => None,
      Either::Right(right) => Some(right),
    }
  }
}

impl<L: Allocator, R: Allocator> Allocator for Either<L, R> {
  const ALIGNMENT: usize = if L::ALIGNMENT < R::ALIGNMENT {
    L::ALIGNMENT
  } else {
    R::ALIGNMENT
  };
  const MIN_ALLOC_SIZE: usize = if L::MIN_ALLOC_SIZE < R::MIN_ALLOC_SIZE {
    L::MIN_ALLOC_SIZE
  } else {
    R::MIN_ALLOC_SIZE
  };
  const MAX_ALLOC_SIZE: usize = if L::MAX_ALLOC_SIZE > R::MAX_ALLOC_SIZE {
    L::MAX_ALLOC_SIZE
  } else {
    R::MAX_ALLOC_SIZE
  };
  const CAPABILITIES: Capabilities = Capabilities {
    precise_owns: L::CAPABILITIES.precise_owns && R::CAPABILITIES.precise_owns,
    ..L::CAPABILITIES.or(R::CAPABILITIES)
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    either!(self, inner => inner.allocate(size))
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    either!(self, inner => unsafe { inner.deallocate(block) })
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    either!(self, inner => inner.owns(block))
  }

  fn owns_precisely(&self) -> bool {
    either!(self, inner => inner.owns_precisely())
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    either!(self, inner => inner.allocate_aligned(size, alignment))
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    either!(self, inner => unsafe { inner.deallocate_aligned(block) })
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    either!(self, inner => unsafe { inner.reallocate(block, size) })
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    either!(self, inner => unsafe { inner.reallocate_aligned(block, size, alignment) })
  }

  fn allocate_all(&mut self) -> Block {
    either!(self, inner => inner.allocate_all())
  }

  fn allocate_all_aligned(
    &mut self,
    alignment: usize,
  ) -> Block {
    either!(self, inner => inner.allocate_all_aligned(alignment))
  }

  unsafe fn deallocate_all(&mut self) {
    either!(self, inner => unsafe { inner.deallocate_all() })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, heap::Heap};

  type Mixed = Either<Box<Arena<256, 16>>, Heap>;

  #[test]
  fn test_precision_follows_variant() {
    let arena = Mixed::Left(Box::new(Arena::new()));
    let heap = Mixed::Right(Heap::new());

    assert!(!Mixed::CAPABILITIES.precise_owns);
    assert!(Mixed::CAPABILITIES.allocate_all);
    assert!(arena.owns_precisely());
    assert!(!heap.owns_precisely());
  }

  #[test]
  fn test_forwards_to_held_allocator() {
    let mut arena = Mixed::Left(Box::new(Arena::new()));
    let mut heap = Mixed::Right(Heap::new());

    let inside = arena.allocate(40);
    let outside = heap.allocate(40);
    assert!(arena.owns(inside));
    assert!(!arena.owns(outside));
    assert_eq!(arena.left().map(|arena| arena.used()), Some(48));

    unsafe {
      arena.deallocate(inside);
      heap.deallocate(outside);
    }
    assert_eq!(arena.left().map(|arena| arena.used()), Some(0));
    assert!(heap.right().is_some());
    assert!(!heap.allocate_all().is_valid());
  }
}
