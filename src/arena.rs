use std::{cell::UnsafeCell, fmt, mem, mem::MaybeUninit};

use log::{debug, trace};

use crate::{
  align::{align_up, is_aligned},
  align_to,
  allocator::{Allocator, Capabilities, Trivial, accepts, reallocate_trivial},
  block::Block,
};

const STORAGE_ALIGNMENT: usize = mem::align_of::<Storage<0>>();

#[repr(C, align(16))]
struct Storage<const CAPACITY: usize>(UnsafeCell<[MaybeUninit<u8>; CAPACITY]>);

/// Left in the padding skipped before an over-aligned block, so that freeing
/// the block can put the cursor back where it was.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
struct Padding {
  /// Cursor before the padded allocation.
  start: usize,
  /// Offset of the previous padded block, or `NO_PADDING`.
  previous: usize,
}

const PADDING: usize = mem::size_of::<Padding>();
const NO_PADDING: usize = usize::MAX;

/// Fixed-capacity bump allocator over an inline buffer.
///
/// Every allocation bumps the cursor forward by the request rounded up to
/// `ALIGNMENT`. Space comes back only when the most recent block is freed
/// (strict LIFO) or when everything is released with `deallocate_all`.
///
/// ```text
///   ┌──────┬──────────┬────────────────────────────────┐
///   │  A1  │    A2    │           free space           │
///   └──────┴──────────┴────────────────────────────────┘
///   ▲                 ▲                                ▲
///   base              cursor                    base + capacity
/// ```
///
/// Offsets count from the first `ALIGNMENT`-aligned byte of the buffer. The
/// buffer itself is only 16-aligned, so an arena with a larger `ALIGNMENT`
/// gives up `ALIGNMENT - 16` bytes of `CAPACITY` to keep that base in reach.
///
/// Over-aligned requests skip ahead to their boundary. The skipped padding
/// holds a small record of the old cursor, and freeing such a block in LIFO
/// order rewinds past the padding too:
///
/// ```text
///   ┌──────┬─────────────┬────────┬──────────┐
///   │  A1  │ pad ▸record │   A2   │   free   │
///   └──────┴─────────────┴────────┴──────────┘
///          ▲                      ▲
///          record.start           cursor
/// ```
///
/// Blocks point into the arena itself, so it must not move while any are
/// outstanding. Box it, or share one instance through [`crate::Shared`].
pub struct Arena<const CAPACITY: usize, const ALIGNMENT: usize = 16> {
  storage: Storage<CAPACITY>,
  cursor: usize,
  /// Offset of the most recent padded block still reserved.
  padded: usize,
}

impl<const CAPACITY: usize, const ALIGNMENT: usize> Arena<CAPACITY, ALIGNMENT> {
  const SLACK: usize = ALIGNMENT.saturating_sub(STORAGE_ALIGNMENT);
  const USABLE: usize = CAPACITY.saturating_sub(Self::SLACK);

  const VALID: () = {
    assert!(ALIGNMENT.is_power_of_two(), "arena alignment must be a power of two");
    assert!(Self::USABLE > 0, "arena capacity must exceed its alignment slack");
  };

  pub const fn new() -> Self {
    let () = Self::VALID;
    Self {
      storage: Storage(UnsafeCell::new([MaybeUninit::uninit(); CAPACITY])),
      cursor: 0,
      padded: NO_PADDING,
    }
  }

  /// Bytes available from the aligned base.
  pub const fn capacity(&self) -> usize {
    Self::USABLE
  }

  /// Bytes between the base and the cursor, padding included.
  pub const fn used(&self) -> usize {
    self.cursor
  }

  pub const fn remaining(&self) -> usize {
    Self::USABLE - self.cursor
  }

  /// First `ALIGNMENT`-aligned byte of the storage.
  fn base(&self) -> *mut u8 {
    let start = self.storage.0.get().cast::<u8>();
    let lead = align_to!(start as usize, ALIGNMENT) - start as usize;
    start.wrapping_add(lead)
  }

  fn base_address(&self) -> usize {
    self.base() as usize
  }

  fn offset_of(
    &self,
    block: &Block,
  ) -> usize {
    block.address() - self.base_address()
  }

  /// Offset of the first `alignment`-aligned address at or past the cursor.
  ///
  /// Padding, when there is any, is widened until a [`Padding`] record fits.
  fn placement(
    &self,
    alignment: usize,
  ) -> Option<usize> {
    let cursor = self.base_address().checked_add(self.cursor)?;
    let mut address = align_up(cursor, alignment)?;
    if address != cursor && address - cursor < PADDING {
      address = align_up(cursor.checked_add(PADDING)?, alignment)?;
    }

    let offset = address - self.base_address();
    (offset <= Self::USABLE).then_some(offset)
  }

  /// Where the cursor sits right after `block` was bumped out.
  fn bumped_end(
    &self,
    block: &Block,
  ) -> (usize, usize) {
    let offset = self.offset_of(block);
    let exact = offset + block.size();
    let rounded = align_up(block.size(), ALIGNMENT).map_or(Self::USABLE, |size| (offset + size).min(Self::USABLE));
    (exact, rounded)
  }

  fn is_last(
    &self,
    block: &Block,
  ) -> bool {
    let (exact, rounded) = self.bumped_end(block);
    self.cursor == rounded || self.cursor == exact
  }

  /// Advance needed for `size` bytes at `offset`, or `None` if they do not fit.
  fn advance_for(
    offset: usize,
    size: usize,
  ) -> Option<usize> {
    let remaining = Self::USABLE - offset;
    match align_up(size, ALIGNMENT) {
      Some(rounded) if rounded <= remaining => Some(rounded),
      // The final allocation may take the exact tail unrounded.
      _ if size <= remaining => Some(size),
      _ => None,
    }
  }

  /// Moves the cursor to `end` for a block placed at `offset`, recording the
  /// padding skipped on the way.
  fn claim(
    &mut self,
    offset: usize,
    end: usize,
  ) -> *mut u8 {
    if offset != self.cursor {
      let record = Padding {
        start: self.cursor,
        previous: self.padded,
      };
      // SAFETY: `placement` left at least `PADDING` bytes between the cursor
      // and `offset`, all inside the storage.
      unsafe { self.base().add(offset - PADDING).cast::<Padding>().write_unaligned(record) };
      self.padded = offset;
    }

    self.cursor = end;
    unsafe { self.base().add(offset) }
  }

  /// Rewinds the cursor to where it was before `block`, the most recent block,
  /// was allocated.
  fn rewind(
    &mut self,
    block: &Block,
  ) {
    let offset = self.offset_of(block);
    if offset != self.padded {
      self.cursor = offset;
      return;
    }

    // SAFETY: `claim` wrote this record when it placed the block at `offset`.
    let record = unsafe { self.base().add(offset - PADDING).cast::<Padding>().read_unaligned() };
    self.cursor = record.start;
    self.padded = record.previous;
  }

  fn bump(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    if !accepts::<Self>(size) {
      return Block::empty();
    }

    let Some(offset) = self.placement(alignment) else {
      return Block::empty();
    };

    let Some(advance) = Self::advance_for(offset, size) else {
      trace!(
        "arena: {} bytes do not fit ({} of {} used)",
        size,
        self.cursor,
        Self::USABLE
      );
      return Block::empty();
    };

    let address = self.claim(offset, offset + advance);
    trace!(
      "arena: allocated {} bytes at {:p}, cursor = {}",
      size, address, self.cursor
    );

    Block::new(address, size)
  }

  fn take_rest(
    &mut self,
    alignment: usize,
  ) -> Block {
    let Some(offset) = self.placement(alignment) else {
      return Block::empty();
    };

    if offset == Self::USABLE {
      return Block::empty();
    }

    let address = self.claim(offset, Self::USABLE);
    Block::new(address, Self::USABLE - offset)
  }

  unsafe fn resize(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    // A block off the requested boundary can only move.
    if is_aligned(block.address(), alignment) {
      if self.is_last(block) {
        let offset = self.offset_of(block);
        return match Self::advance_for(offset, size) {
          Some(advance) => {
            self.cursor = offset + advance;
            *block = Block::new(block.as_ptr(), size);
            true
          }
          None => false,
        };
      }

      if size < block.size() {
        *block = Block::new(block.as_ptr(), size);
        return true;
      }
    }

    // Move it; the old region stays reserved.
    let fresh = self.bump(size, alignment);
    if !fresh.is_valid() {
      return false;
    }

    unsafe { block.copy_into(&fresh) };
    *block = fresh;
    true
  }
}

impl<const CAPACITY: usize, const ALIGNMENT: usize> Default for Arena<CAPACITY, ALIGNMENT> {
  fn default() -> Self {
    Self::new()
  }
}

impl<const CAPACITY: usize, const ALIGNMENT: usize> fmt::Debug for Arena<CAPACITY, ALIGNMENT> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Arena")
      .field("base", &self.base())
      .field("capacity", &Self::USABLE)
      .field("alignment", &ALIGNMENT)
      .field("cursor", &self.cursor)
      .finish()
  }
}

impl<const CAPACITY: usize, const ALIGNMENT: usize> Allocator for Arena<CAPACITY, ALIGNMENT> {
  const ALIGNMENT: usize = ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = 1;
  const MAX_ALLOC_SIZE: usize = Self::USABLE;
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
    size: usize,
  ) -> Block {
    self.bump(size, ALIGNMENT)
  }

  /// Rewinds the cursor if `block` is the most recent allocation; any other
  /// block stays reserved until `deallocate_all`.
  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    debug_assert!(self.owns(block), "{:?} is not inside {:?}", block, self);

    if self.is_last(&block) {
      self.rewind(&block);
      trace!("arena: released {:?}, cursor = {}", block, self.cursor);
    } else {
      debug!("arena: {:?} is not the most recent block, kept until reset", block);
    }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    block.is_within(self.base_address(), self.base_address() + Self::USABLE)
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    if !alignment.is_power_of_two() {
      return Block::empty();
    }

    self.bump(size, alignment.max(ALIGNMENT))
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    unsafe { self.deallocate(block) }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if size > Self::USABLE {
      return false;
    }

    match unsafe { reallocate_trivial(self, block, size, None) } {
      Trivial::Done(done) => done,
      Trivial::Resize => unsafe { self.resize(block, size, ALIGNMENT) },
    }
  }

  unsafe fn reallocate_aligned(
    &mut self,
    block: &mut Block,
    size: usize,
    alignment: usize,
  ) -> bool {
    if size > Self::USABLE || !alignment.is_power_of_two() {
      return false;
    }

    let alignment = alignment.max(ALIGNMENT);
    match unsafe { reallocate_trivial(self, block, size, Some(alignment)) } {
      Trivial::Done(done) => done,
      Trivial::Resize => unsafe { self.resize(block, size, alignment) },
    }
  }

  fn allocate_all(&mut self) -> Block {
    self.take_rest(ALIGNMENT)
  }

  fn allocate_all_aligned(
    &mut self,
    alignment: usize,
  ) -> Block {
    if !alignment.is_power_of_two() {
      return Block::empty();
    }

    self.take_rest(alignment.max(ALIGNMENT))
  }

  unsafe fn deallocate_all(&mut self) {
    trace!("arena: reset, {} bytes released", self.cursor);
    self.cursor = 0;
    self.padded = NO_PADDING;
  }
}
