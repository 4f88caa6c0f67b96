use std::{cmp::Ordering, fmt, ptr, slice};

/// Address and size of a raw memory region.
///
/// A `Block` never owns the memory it describes. It is handed out by one
/// allocator call and consumed by exactly one later `deallocate` or
/// `reallocate` on an allocator that owns it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
  address: *mut u8,
  size: usize,
}

unsafe impl Send for Block {}

unsafe impl Sync for Block {}

impl Block {
  /// The zero block: null address, zero size. Every failed allocation
  /// returns it.
  #[inline]
  pub const fn empty() -> Self {
    Self {
      address: ptr::null_mut(),
      size: 0,
    }
  }

  #[inline]
  pub const fn new(
    address: *mut u8,
    size: usize,
  ) -> Self {
    Self { address, size }
  }

  /// Non-null address and non-zero size.
  #[inline]
  pub fn is_valid(&self) -> bool {
    !self.address.is_null() && self.size != 0
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    *self == Self::empty()
  }

  #[inline]
  pub const fn as_ptr(&self) -> *mut u8 {
    self.address
  }

  #[inline]
  pub fn address(&self) -> usize {
    self.address as usize
  }

  #[inline]
  pub const fn size(&self) -> usize {
    self.size
  }

  /// One past the last byte of the region.
  #[inline]
  pub fn end(&self) -> usize {
    self.address() + self.size
  }

  /// Compares addresses only; sizes are ignored.
  #[inline]
  pub fn cmp_address(
    &self,
    other: &Block,
  ) -> Ordering {
    self.address().cmp(&other.address())
  }

  /// Whether the block's address falls inside `[start, end)`.
  #[inline]
  pub fn is_within(
    &self,
    start: usize,
    end: usize,
  ) -> bool {
    self.address() >= start && self.address() < end
  }

  /// # Safety
  ///
  /// The block must be valid and describe live, initialized memory that is
  /// not mutably aliased for the returned lifetime.
  #[inline]
  pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
    unsafe { slice::from_raw_parts(self.address, self.size) }
  }

  /// # Safety
  ///
  /// The block must be valid and describe live memory that is not aliased
  /// for the returned lifetime.
  #[inline]
  pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.address, self.size) }
  }

  /// Copies `min(self.size, to.size)` bytes into `to`.
  ///
  /// # Safety
  ///
  /// Both blocks must be valid, live and non-overlapping.
  #[inline]
  pub(crate) unsafe fn copy_into(
    &self,
    to: &Block,
  ) {
    unsafe { ptr::copy_nonoverlapping(self.address, to.address, self.size.min(to.size)) }
  }
}

impl Default for Block {
  fn default() -> Self {
    Self::empty()
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Block({:p}, {})", self.address, self.size)
  }
}
