use crate::{align::is_aligned, block::Block};

/// Optional operations an [`Allocator`] really implements.
///
/// `allocate`, `deallocate` and `owns` are always present. Every other
/// operation has a failing default on the trait; the matching flag here tells
/// composites whether forwarding to it can ever succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
  pub allocate_aligned: bool,
  pub deallocate_aligned: bool,
  pub reallocate: bool,
  pub reallocate_aligned: bool,
  pub allocate_all: bool,
  pub allocate_all_aligned: bool,
  pub deallocate_all: bool,
  /// `owns` is a real membership test rather than an optimistic `true`.
  pub precise_owns: bool,
}

impl Capabilities {
  pub const NONE: Capabilities = Capabilities {
    allocate_aligned: false,
    deallocate_aligned: false,
    reallocate: false,
    reallocate_aligned: false,
    allocate_all: false,
    allocate_all_aligned: false,
    deallocate_all: false,
    precise_owns: false,
  };

  /// Operations both sides support.
  pub const fn and(
    self,
    other: Capabilities,
  ) -> Capabilities {
    Capabilities {
      allocate_aligned: self.allocate_aligned && other.allocate_aligned,
      deallocate_aligned: self.deallocate_aligned && other.deallocate_aligned,
      reallocate: self.reallocate && other.reallocate,
      reallocate_aligned: self.reallocate_aligned && other.reallocate_aligned,
      allocate_all: self.allocate_all && other.allocate_all,
      allocate_all_aligned: self.allocate_all_aligned && other.allocate_all_aligned,
      deallocate_all: self.deallocate_all && other.deallocate_all,
      precise_owns: self.precise_owns && other.precise_owns,
    }
  }

  /// Operations at least one side supports.
  pub const fn or(
    self,
    other: Capabilities,
  ) -> Capabilities {
    Capabilities {
      allocate_aligned: self.allocate_aligned || other.allocate_aligned,
      deallocate_aligned: self.deallocate_aligned || other.deallocate_aligned,
      reallocate: self.reallocate || other.reallocate,
      reallocate_aligned: self.reallocate_aligned || other.reallocate_aligned,
      allocate_all: self.allocate_all || other.allocate_all,
      allocate_all_aligned: self.allocate_all_aligned || other.allocate_all_aligned,
      deallocate_all: self.deallocate_all || other.deallocate_all,
      precise_owns: self.precise_owns || other.precise_owns,
    }
  }
}

/// The capability contract every allocator implements a subset of.
///
/// Failure is never a panic: a failed allocation returns [`Block::empty`], a
/// failed reallocation returns `false` and leaves the block untouched.
pub trait Allocator {
  /// Every block handed out by `allocate` is aligned to this.
  const ALIGNMENT: usize;
  const MIN_ALLOC_SIZE: usize;
  const MAX_ALLOC_SIZE: usize;
  const CAPABILITIES: Capabilities;

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block;

  /// # Safety
  ///
  /// `block` must come from this allocator's `allocate` (or `allocate_all`,
  /// or a successful `reallocate`) and must not be used afterwards.
  unsafe fn deallocate(
    &mut self,
    block: Block,
  );

  /// Side-effect-free membership test used to route frees in composites.
  fn owns(
    &self,
    block: Block,
  ) -> bool;

  /// Whether this instance's `owns` is a real membership test.
  ///
  /// Defaults to the `precise_owns` flag. Allocators whose precision depends
  /// on their runtime shape (see [`crate::Either`]) answer per instance.
  fn owns_precisely(&self) -> bool {
    Self::CAPABILITIES.precise_owns
  }

  fn allocate_aligned(
    &mut self,
    _size: usize,
    _alignment: usize,
  ) -> Block {
    Block::empty()
  }

  /// # Safety
  ///
  /// `block` must come from this allocator's `allocate_aligned` (or
  /// `allocate_all_aligned`, or a successful `reallocate_aligned`).
  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    debug_assert!(block.is_empty(), "deallocate_aligned is not supported");
  }

  /// # Safety
  ///
  /// `block` must be owned by this allocator. On `false` it is untouched.
  unsafe fn reallocate(
    &mut self,
    _block: &mut Block,
    _size: usize,
  ) -> bool {
    false
  }

  /// # Safety
  ///
  /// `block` must come from this allocator's aligned operations.
  unsafe fn reallocate_aligned(
    &mut self,
    _block: &mut Block,
    _size: usize,
    _alignment: usize,
  ) -> bool {
    false
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

  /// # Safety
  ///
  /// Every block previously handed out becomes dangling.
  unsafe fn deallocate_all(&mut self) {}
}

macro_rules! forward_allocator {
  ($($outer:ty),+) => {
    $(
      impl<A: Allocator> Allocator for $outer {
        const ALIGNMENT: usize = A::ALIGNMENT;
        const MIN_ALLOC_SIZE: usize = A::MIN_ALLOC_SIZE;
        const MAX_ALLOC_SIZE: usize = A::MAX_ALLOC_SIZE;
        const CAPABILITIES: Capabilities = A::CAPABILITIES;

        #[inline]
        fn allocate(
          &mut self,
          size: usize,
        ) -> Block {
          (**self).allocate(size)
        }

        #[inline]
        unsafe fn deallocate(
          &mut self,
          block: Block,
        ) {
          unsafe { (**self).deallocate(block) }
        }

        #[inline]
        fn owns(
          &self,
          block: Block,
        ) -> bool {
          (**self).owns(block)
        }

        #[inline]
        fn owns_precisely(&self) -> bool {
          (**self).owns_precisely()
        }

        #[inline]
        fn allocate_aligned(
          &mut self,
          size: usize,
          alignment: usize,
        ) -> Block {
          (**self).allocate_aligned(size, alignment)
        }

        #[inline]
        unsafe fn deallocate_aligned(
          &mut self,
          block: Block,
        ) {
          unsafe { (**self).deallocate_aligned(block) }
        }

        #[inline]
        unsafe fn reallocate(
          &mut self,
          block: &mut Block,
          size: usize,
        ) -> bool {
          unsafe { (**self).reallocate(block, size) }
        }

        #[inline]
        unsafe fn reallocate_aligned(
          &mut self,
          block: &mut Block,
          size: usize,
          alignment: usize,
        ) -> bool {
          unsafe { (**self).reallocate_aligned(block, size, alignment) }
        }

        #[inline]
        fn allocate_all(&mut self) -> Block {
          (**self).allocate_all()
        }

        #[inline]
        fn allocate_all_aligned(
          &mut self,
          alignment: usize,
        ) -> Block {
          (**self).allocate_all_aligned(alignment)
        }

        #[inline]
        unsafe fn deallocate_all(&mut self) {
          unsafe { (**self).deallocate_all() }
        }
      }
    )+
  };
}

// Boxing pins an inline arena in place; `&mut` lends one to a composite.
forward_allocator!(Box<A>, &mut A);

/// Whether `A` can ever satisfy a request of `size` bytes.
#[inline]
pub fn accepts<A: Allocator + ?Sized>(size: usize) -> bool {
  size != 0 && size >= A::MIN_ALLOC_SIZE && size <= A::MAX_ALLOC_SIZE
}

/// Outcome of the reallocation cases every allocator resolves the same way.
pub(crate) enum Trivial {
  Done(bool),
  Resize,
}

/// Resolves same-size, shrink-to-zero and grow-from-empty reallocations.
///
/// A same-size request keeps the block only if it already meets `alignment`.
///
/// # Safety
///
/// `block` must be owned by `allocator` (or be the zero block).
pub(crate) unsafe fn reallocate_trivial<A: Allocator + ?Sized>(
  allocator: &mut A,
  block: &mut Block,
  size: usize,
  alignment: Option<usize>,
) -> Trivial {
  let placed = alignment.is_none_or(|alignment| is_aligned(block.address(), alignment));
  if block.size() == size && block.is_valid() && placed {
    return Trivial::Done(true);
  }

  if size == 0 {
    if block.is_valid() {
      match alignment {
        Some(_) => unsafe { allocator.deallocate_aligned(*block) },
        None => unsafe { allocator.deallocate(*block) },
      }
    }
    *block = Block::empty();
    return Trivial::Done(true);
  }

  if !block.is_valid() {
    let fresh = match alignment {
      Some(alignment) => allocator.allocate_aligned(size, alignment),
      None => allocator.allocate(size),
    };
    if !fresh.is_valid() {
      return Trivial::Done(false);
    }
    *block = fresh;
    return Trivial::Done(true);
  }

  Trivial::Resize
}

/// Moves `block` from `from` into a fresh `size`-byte block of `to`.
///
/// # Safety
///
/// `block` must be valid and owned by `from`.
pub(crate) unsafe fn move_block<F, T>(
  from: &mut F,
  to: &mut T,
  block: &mut Block,
  size: usize,
) -> bool
where
  F: Allocator + ?Sized,
  T: Allocator + ?Sized,
{
  let fresh = to.allocate(size);
  if !fresh.is_valid() {
    return false;
  }

  unsafe {
    block.copy_into(&fresh);
    from.deallocate(*block);
  }
  *block = fresh;
  true
}
