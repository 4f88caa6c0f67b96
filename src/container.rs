use std::{fmt, marker::PhantomData, mem, ptr::NonNull};

use thiserror::Error;

use crate::{
  affix::Affix,
  allocator::Allocator,
  block::Block,
};

/// Failed element allocations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("{count} elements of {element} bytes overflow the address space")]
  CapacityOverflow { count: usize, element: usize },
  #[error("allocator could not provide {bytes} bytes")]
  Exhausted { bytes: usize },
  #[error("element alignment {required} exceeds the allocator's {provided}")]
  OverAligned { required: usize, provided: usize },
}

/// Typed element allocation on top of a block allocator.
///
/// Container code frees with an element count, not the block it was given.
/// Every block therefore carries its byte size in an [`Affix`] prefix, and
/// `deallocate` rebuilds the exact original block from it.
pub struct ContainerAllocator<T, A: Allocator> {
  inner: Affix<A, usize>,
  element: PhantomData<fn() -> T>,
}

impl<T, A: Allocator> ContainerAllocator<T, A> {
  pub fn new(allocator: A) -> Self {
    Self {
      inner: Affix::new(allocator),
      element: PhantomData,
    }
  }

  pub fn inner(&self) -> &A {
    self.inner.inner()
  }

  pub fn inner_mut(&mut self) -> &mut A {
    self.inner.inner_mut()
  }

  pub fn into_inner(self) -> A {
    self.inner.into_inner()
  }

  /// The same allocator, handing out `U`s instead.
  pub fn rebind<U>(self) -> ContainerAllocator<U, A> {
    ContainerAllocator {
      inner: self.inner,
      element: PhantomData,
    }
  }

  /// Largest element count a single `allocate` could ever satisfy.
  pub fn max_size(&self) -> usize {
    match mem::size_of::<T>() {
      0 => usize::MAX,
      element => <Affix<A, usize>>::MAX_ALLOC_SIZE / element,
    }
  }

  /// Uninitialized storage for `count` elements.
  ///
  /// Zero-sized requests get a dangling, well-aligned pointer that must still
  /// be passed back to `deallocate` with the same count.
  pub fn allocate(
    &mut self,
    count: usize,
  ) -> Result<NonNull<T>, AllocError> {
    if mem::align_of::<T>() > <Affix<A, usize>>::ALIGNMENT {
      return Err(AllocError::OverAligned {
        required: mem::align_of::<T>(),
        provided: <Affix<A, usize>>::ALIGNMENT,
      });
    }

    let bytes = count
      .checked_mul(mem::size_of::<T>())
      .ok_or(AllocError::CapacityOverflow {
        count,
        element: mem::size_of::<T>(),
      })?;

    if bytes == 0 {
      return Ok(NonNull::dangling());
    }

    let block = self.inner.allocate(bytes);
    let Some(address) = NonNull::new(block.as_ptr()) else {
      return Err(AllocError::Exhausted { bytes });
    };

    unsafe { *self.inner.prefix(block) = block.size() };
    Ok(address.cast())
  }

  /// # Safety
  ///
  /// `pointer` must come from `allocate(count)` on this allocator (or one it
  /// was rebound from), and every element must already be destroyed.
  pub unsafe fn deallocate(
    &mut self,
    pointer: NonNull<T>,
    count: usize,
  ) {
    if count == 0 || mem::size_of::<T>() == 0 {
      return;
    }

    unsafe {
      let address = pointer.as_ptr().cast::<u8>();
      let size = *self.inner.prefix(Block::new(address, 0));
      debug_assert_eq!(size, count * mem::size_of::<T>(), "freed with the wrong count");
      self.inner.deallocate(Block::new(address, size));
    }
  }

  /// Moves `value` into the uninitialized slot at `pointer`.
  ///
  /// # Safety
  ///
  /// `pointer` must address an element slot from `allocate`.
  pub unsafe fn construct(
    &self,
    pointer: NonNull<T>,
    value: T,
  ) {
    unsafe { pointer.write(value) }
  }

  /// Drops the element at `pointer` in place, leaving the slot uninitialized.
  ///
  /// # Safety
  ///
  /// `pointer` must hold an element built by `construct`.
  pub unsafe fn destroy(
    &self,
    pointer: NonNull<T>,
  ) {
    unsafe { pointer.drop_in_place() }
  }
}

impl<T, A: Allocator + Default> Default for ContainerAllocator<T, A> {
  fn default() -> Self {
    Self::new(A::default())
  }
}

impl<T, A: Allocator + fmt::Debug> fmt::Debug for ContainerAllocator<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("ContainerAllocator")
      .field("element", &std::any::type_name::<T>())
      .field("inner", self.inner())
      .finish()
  }
}
