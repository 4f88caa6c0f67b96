use std::{fmt, marker::PhantomData, mem, ptr};

use crate::{
  align_to,
  allocator::{Allocator, Capabilities},
  block::Block,
};

/// Brackets every client block with a `Prefix` and a `Suffix` object.
///
/// ```text
///   inner block
///   ┌──────────────┬───────────────────────────┬────────┐
///   │ Prefix (pad) │        client block       │ Suffix │
///   └──────────────┴───────────────────────────┴────────┘
///                  ▲
///                  └── address handed to the caller
/// ```
///
/// The prefix is padded to the inner alignment so the client address keeps
/// it. The suffix follows the client bytes directly and may be unaligned.
/// Both are built with `Default` on allocation and dropped on deallocation.
/// Use `()` for an absent affix.
pub struct Affix<A, Prefix = (), Suffix = ()> {
  inner: A,
  marker: PhantomData<(fn() -> Prefix, fn() -> Suffix)>,
}

impl<A, Prefix, Suffix> Affix<A, Prefix, Suffix>
where
  A: Allocator,
  Prefix: Default,
  Suffix: Default,
{
  pub const PREFIX_SIZE: usize = if mem::size_of::<Prefix>() == 0 {
    0
  } else {
    align_to!(mem::size_of::<Prefix>(), A::ALIGNMENT)
  };

  pub const SUFFIX_SIZE: usize = mem::size_of::<Suffix>();

  const OVERHEAD: usize = Self::PREFIX_SIZE + Self::SUFFIX_SIZE;

  const PREFIX_FITS: () = assert!(
    mem::align_of::<Prefix>() <= A::ALIGNMENT,
    "prefix needs more alignment than the inner allocator provides"
  );

  pub fn new(inner: A) -> Self {
    let () = Self::PREFIX_FITS;
    Self {
      inner,
      marker: PhantomData,
    }
  }

  pub fn inner(&self) -> &A {
    &self.inner
  }

  pub fn inner_mut(&mut self) -> &mut A {
    &mut self.inner
  }

  pub fn into_inner(self) -> A {
    self.inner
  }

  /// The inner block a client block was carved from.
  fn outer(client: Block) -> Block {
    if !client.is_valid() {
      return client;
    }

    Block::new(
      client.as_ptr().wrapping_sub(Self::PREFIX_SIZE),
      client.size() + Self::OVERHEAD,
    )
  }

  fn client(outer: Block) -> Block {
    Block::new(
      outer.as_ptr().wrapping_add(Self::PREFIX_SIZE),
      outer.size() - Self::OVERHEAD,
    )
  }

  /// Location of the prefix object of `client`.
  ///
  /// # Safety
  ///
  /// `client` must be a live block handed out by this allocator.
  pub unsafe fn prefix(
    &self,
    client: Block,
  ) -> *mut Prefix {
    unsafe { client.as_ptr().sub(Self::PREFIX_SIZE) }.cast()
  }

  /// Location of the suffix object of `client`. The pointer may be
  /// unaligned; access it with `read_unaligned`/`write_unaligned`.
  ///
  /// # Safety
  ///
  /// `client` must be a live block handed out by this allocator, with its
  /// original size.
  pub unsafe fn suffix(
    &self,
    client: Block,
  ) -> *mut Suffix {
    unsafe { client.as_ptr().add(client.size()) }.cast()
  }

  unsafe fn construct(
    &self,
    client: Block,
  ) {
    unsafe {
      ptr::write(self.prefix(client), Prefix::default());
      ptr::write_unaligned(self.suffix(client), Suffix::default());
    }
  }

  unsafe fn destroy(
    &self,
    client: Block,
  ) {
    unsafe {
      drop(ptr::read_unaligned(self.suffix(client)));
      drop(ptr::read(self.prefix(client)));
    }
  }
}

impl<A, Prefix, Suffix> Allocator for Affix<A, Prefix, Suffix>
where
  A: Allocator,
  Prefix: Default,
  Suffix: Default,
{
  const ALIGNMENT: usize = A::ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = {
    let min = A::MIN_ALLOC_SIZE.saturating_sub(Self::OVERHEAD);
    if min == 0 { 1 } else { min }
  };
  const MAX_ALLOC_SIZE: usize = A::MAX_ALLOC_SIZE.saturating_sub(Self::OVERHEAD);
  const CAPABILITIES: Capabilities = Capabilities {
    reallocate: A::CAPABILITIES.reallocate,
    deallocate_all: A::CAPABILITIES.deallocate_all
      && !mem::needs_drop::<Prefix>()
      && !mem::needs_drop::<Suffix>(),
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

    let outer = self.inner.allocate(size + Self::OVERHEAD);
    if !outer.is_valid() {
      return Block::empty();
    }

    let client = Self::client(outer);
    unsafe { self.construct(client) };
    client
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    debug_assert!(self.owns(block));

    unsafe {
      self.destroy(block);
      self.inner.deallocate(Self::outer(block));
    }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.inner.owns(Self::outer(block))
  }

  fn owns_precisely(&self) -> bool {
    self.inner.owns_precisely()
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if !A::CAPABILITIES.reallocate || size > Self::MAX_ALLOC_SIZE {
      return false;
    }

    if size == 0 {
      unsafe { self.deallocate(*block) };
      *block = Block::empty();
      return true;
    }

    if !block.is_valid() {
      let fresh = self.allocate(size);
      if fresh.is_valid() {
        *block = fresh;
      }
      return fresh.is_valid();
    }

    if block.size() == size {
      return true;
    }

    // The suffix moves with the end of the block; park it while resizing.
    let suffix = unsafe { ptr::read_unaligned(self.suffix(*block)) };
    let mut outer = Self::outer(*block);

    if !unsafe { self.inner.reallocate(&mut outer, size + Self::OVERHEAD) } {
      // The original bytes are untouched and still hold the suffix.
      mem::forget(suffix);
      return false;
    }

    let client = Self::client(outer);
    unsafe { ptr::write_unaligned(self.suffix(client), suffix) };
    *block = client;
    true
  }

  unsafe fn deallocate_all(&mut self) {
    if Self::CAPABILITIES.deallocate_all {
      unsafe { self.inner.deallocate_all() }
    }
  }
}

impl<A, Prefix, Suffix> Default for Affix<A, Prefix, Suffix>
where
  A: Allocator + Default,
  Prefix: Default,
  Suffix: Default,
{
  fn default() -> Self {
    Self::new(A::default())
  }
}

impl<A: Clone, Prefix, Suffix> Clone for Affix<A, Prefix, Suffix> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      marker: PhantomData,
    }
  }
}

impl<A: fmt::Debug, Prefix, Suffix> fmt::Debug for Affix<A, Prefix, Suffix> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Affix")
      .field("inner", &self.inner)
      .field("prefix", &std::any::type_name::<Prefix>())
      .field("suffix", &std::any::type_name::<Suffix>())
      .finish()
  }
}
