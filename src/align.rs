/// Rounds `value` up to the power-of-two `alignment`.
///
/// Wraps on overflow; use [`align_up`] when `value` is caller-controlled.
///
/// ```rust
/// use allocompose::align_to;
///
/// assert_eq!(align_to!(10usize, 16), 16);
/// assert_eq!(align_to!(32usize, 16), 32);
/// assert_eq!(align_to!(0usize, 64), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value).wrapping_add(($alignment) - 1) & !(($alignment) - 1)
  };
}

/// Rounds `value` up to `alignment`, or `None` on overflow.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn align_up(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  debug_assert!(alignment.is_power_of_two());
  match value.checked_add(alignment - 1) {
    Some(bumped) => Some(bumped & !(alignment - 1)),
    None => None,
  }
}

#[inline]
pub const fn is_aligned(
  value: usize,
  alignment: usize,
) -> bool {
  value & (alignment - 1) == 0
}

/// Largest of two alignments; usable in constant position.
#[inline]
pub const fn max_alignment(
  a: usize,
  b: usize,
) -> usize {
  if a > b { a } else { b }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::mem;

  #[test]
  fn test_align_to_word() {
    let word = mem::size_of::<usize>();

    for i in 0..10 {
      for size in (word * i + 1)..=(word * (i + 1)) {
        assert_eq!(align_to!(size, word), word * (i + 1));
        assert_eq!(align_up(size, word), Some(word * (i + 1)));
      }
    }
  }

  #[test]
  fn test_align_to_powers_of_two() {
    for shift in 0..12 {
      let alignment = 1usize << shift;
      for value in 0..256usize {
        let rounded = align_to!(value, alignment);
        assert!(rounded >= value);
        assert!(rounded - value < alignment);
        assert!(is_aligned(rounded, alignment));
      }
    }
  }

  #[test]
  fn test_align_up_overflow() {
    assert_eq!(align_up(usize::MAX, 16), None);
    assert_eq!(align_up(usize::MAX - 15, 16), Some(usize::MAX - 15));
    assert_eq!(align_up(17, 8), Some(24));
  }

  #[test]
  fn test_max_alignment() {
    assert_eq!(max_alignment(8, 64), 64);
    assert_eq!(max_alignment(32, 4), 32);
  }
}
