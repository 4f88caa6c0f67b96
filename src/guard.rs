use std::{fmt, marker::PhantomData, panic, process};

use log::error;
use thiserror::Error;

use crate::affix::Affix;

pub const DEFAULT_PATTERN: u32 = 0xDEAD_BEEF;

/// A guard sentinel no longer matched its pattern when it was dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("memory guard corrupted: expected {expected:#010x}, found {found:#010x}")]
pub struct CorruptionError {
  pub expected: u32,
  pub found: u32,
}

/// What a guard does when it finds its sentinel overwritten.
pub trait ResponsePolicy {
  fn respond(error: &CorruptionError);
}

/// Carries on silently.
#[derive(Debug)]
pub struct Ignore;

/// Reports through the `log` facade and carries on.
#[derive(Debug)]
pub struct Log;

/// Panics with the [`CorruptionError`] as payload.
#[derive(Debug)]
pub struct Raise;

/// Logs, then aborts the process.
#[derive(Debug)]
pub struct Trap;

/// `Debug` in builds with debug assertions, `Release` otherwise.
pub struct ByProfile<Debug, Release>(PhantomData<(Debug, Release)>);

pub type DefaultResponse = ByProfile<Trap, Log>;

impl ResponsePolicy for Ignore {
  fn respond(_error: &CorruptionError) {}
}

impl ResponsePolicy for Log {
  fn respond(error: &CorruptionError) {
    error!("{}", error);
  }
}

impl ResponsePolicy for Raise {
  fn respond(error: &CorruptionError) {
    panic::panic_any(*error)
  }
}

impl ResponsePolicy for Trap {
  fn respond(error: &CorruptionError) {
    error!("{}, aborting", error);
    process::abort()
  }
}

impl<Debug: ResponsePolicy, Release: ResponsePolicy> ResponsePolicy for ByProfile<Debug, Release> {
  fn respond(error: &CorruptionError) {
    if cfg!(debug_assertions) {
      Debug::respond(error)
    } else {
      Release::respond(error)
    }
  }
}

/// Sentinel written on construction and checked on drop.
///
/// Used as the prefix and/or suffix of an [`Affix`], so stray writes just
/// outside a client block are caught when the block is freed.
#[repr(transparent)]
pub struct PatternGuard<const PATTERN: u32 = DEFAULT_PATTERN, R: ResponsePolicy = DefaultResponse> {
  sentinel: u32,
  policy: PhantomData<fn() -> R>,
}

impl<const PATTERN: u32, R: ResponsePolicy> PatternGuard<PATTERN, R> {
  pub const fn new() -> Self {
    Self {
      sentinel: PATTERN,
      policy: PhantomData,
    }
  }

  pub fn is_intact(&self) -> bool {
    self.sentinel == PATTERN
  }

  pub fn check(&self) -> Result<(), CorruptionError> {
    if self.is_intact() {
      return Ok(());
    }

    Err(CorruptionError {
      expected: PATTERN,
      found: self.sentinel,
    })
  }
}

impl<const PATTERN: u32, R: ResponsePolicy> Default for PatternGuard<PATTERN, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<const PATTERN: u32, R: ResponsePolicy> Drop for PatternGuard<PATTERN, R> {
  fn drop(&mut self) {
    if let Err(error) = self.check() {
      R::respond(&error);
    }
  }
}

impl<const PATTERN: u32, R: ResponsePolicy> fmt::Debug for PatternGuard<PATTERN, R> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "PatternGuard({:#010x})", self.sentinel)
  }
}

/// Brackets every block of `A` with a guard on both sides.
pub type CorruptionGuarded<A, G = PatternGuard> = Affix<A, G, G>;

#[cfg(test)]
mod tests {
  use std::{cell::Cell, panic::AssertUnwindSafe, ptr};

  use super::*;
  use crate::{allocator::Allocator, heap::Heap};

  thread_local! {
    static RESPONSES: Cell<usize> = const { Cell::new(0) };
  }

  struct Count;

  impl ResponsePolicy for Count {
    fn respond(_error: &CorruptionError) {
      RESPONSES.with(|responses| responses.set(responses.get() + 1));
    }
  }

  type Counted = PatternGuard<0x0BAD_F00D, Count>;

  fn responses() -> usize {
    RESPONSES.with(Cell::get)
  }

  fn guarded() -> CorruptionGuarded<Heap, Counted> {
    RESPONSES.with(|responses| responses.set(0));
    Affix::new(Heap::new())
  }

  #[test]
  fn test_intact_guards_stay_quiet() {
    let mut allocator = guarded();

    let block = allocator.allocate(32);
    unsafe {
      block.as_mut_slice().fill(0xFF);
      allocator.deallocate(block);
    }

    assert_eq!(responses(), 0);
  }

  #[test]
  fn test_overflow_hits_suffix_once() {
    let mut allocator = guarded();

    let block = allocator.allocate(10);
    unsafe {
      // One byte past the end of the client block.
      block.as_ptr().add(block.size()).write(0);
      allocator.deallocate(block);
    }

    assert_eq!(responses(), 1);
  }

  #[test]
  fn test_prefix_corruption_detected() {
    let mut allocator = guarded();

    let block = allocator.allocate(10);
    unsafe {
      ptr::write(allocator.prefix(block).cast::<u32>(), 0);
      allocator.deallocate(block);
    }

    assert_eq!(responses(), 1);
  }

  #[test]
  fn test_raise_panics_with_error() {
    let mut allocator: CorruptionGuarded<Heap, PatternGuard<DEFAULT_PATTERN, Raise>> = Affix::new(Heap::new());
    let block = allocator.allocate(4);
    unsafe { block.as_ptr().add(4).write(0x11) };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { allocator.deallocate(block) }));
    let payload = outcome.unwrap_err();
    let error = payload.downcast_ref::<CorruptionError>().unwrap();

    assert_eq!(error.expected, DEFAULT_PATTERN);
    assert_ne!(error.found, DEFAULT_PATTERN);
  }

  #[test]
  fn test_check_reports_found_value() {
    let mut guard = PatternGuard::<0x1234_5678, Ignore>::new();
    assert!(guard.check().is_ok());

    guard.sentinel = 7;
    assert_eq!(
      guard.check(),
      Err(CorruptionError {
        expected: 0x1234_5678,
        found: 7
      })
    );
  }
}
