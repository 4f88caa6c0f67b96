use std::collections::BTreeSet;

use allocompose::{Allocator, Arena, BinarySegregator, Block, ForceAlign, Heap, NullAllocator, align::is_aligned};
use proptest::prelude::*;

fn segregator(thresholds: &BTreeSet<usize>) -> BinarySegregator<NullAllocator> {
  BinarySegregator::new(thresholds.iter().map(|&threshold| (threshold, NullAllocator::new()))).unwrap()
}

#[derive(Clone, Copy, Debug)]
enum Request {
  Plain(usize),
  Aligned(usize, usize),
}

fn request() -> impl Strategy<Value = Request> {
  prop_oneof![
    (1usize..200).prop_map(Request::Plain),
    (1usize..200, 0u32..10).prop_map(|(size, shift)| Request::Aligned(size, 1 << shift)),
  ]
}

/// Serves `requests` from a fresh arena, then frees the blocks newest first.
fn unwind_lifo<const CAPACITY: usize, const ALIGNMENT: usize>(requests: &[Request]) -> Result<(), TestCaseError> {
  let mut arena = Box::new(Arena::<CAPACITY, ALIGNMENT>::new());
  let mut blocks: Vec<(Block, Request)> = Vec::new();

  for &request in requests {
    let (block, size, alignment) = match request {
      Request::Plain(size) => (arena.allocate(size), size, ALIGNMENT),
      Request::Aligned(size, alignment) => (arena.allocate_aligned(size, alignment), size, alignment.max(ALIGNMENT)),
    };
    if !block.is_valid() {
      break;
    }

    prop_assert_eq!(block.size(), size);
    prop_assert!(is_aligned(block.address(), alignment));
    if let Some((last, _)) = blocks.last() {
      prop_assert!(last.end() <= block.address());
    }
    blocks.push((block, request));
  }

  for (block, request) in blocks.into_iter().rev() {
    unsafe {
      match request {
        Request::Plain(_) => arena.deallocate(block),
        Request::Aligned(..) => arena.deallocate_aligned(block),
      }
    }
  }

  prop_assert_eq!(arena.used(), 0);
  prop_assert!(arena.allocate(Arena::<CAPACITY, ALIGNMENT>::MAX_ALLOC_SIZE).is_valid());
  Ok(())
}

proptest! {
  #[test]
  fn test_tree_dispatch_matches_scan(
    thresholds in prop::collection::btree_set(1usize..100_000, 1..40),
    probes in prop::collection::vec(0usize..120_000, 0..64),
  ) {
    let segregator = segregator(&thresholds);

    for &threshold in &thresholds {
      for size in [threshold - 1, threshold, threshold + 1] {
        prop_assert_eq!(segregator.dispatch(size), segregator.linear_dispatch(size));
      }
    }
    for size in probes {
      prop_assert_eq!(segregator.dispatch(size), segregator.linear_dispatch(size));
    }
  }

  #[test]
  fn test_tree_depth_is_logarithmic(thresholds in prop::collection::btree_set(1usize..1_000_000, 1..200)) {
    let segregator = segregator(&thresholds);
    let bound = usize::BITS - (thresholds.len() - 1).leading_zeros() + 1;
    prop_assert!(segregator.depth() <= bound as usize);
  }

  #[test]
  fn test_arena_blocks_aligned_and_disjoint(sizes in prop::collection::vec(1usize..200, 1..32)) {
    let mut arena = Box::new(Arena::<4096, 16>::new());
    let mut blocks: Vec<Block> = Vec::new();

    for size in sizes {
      let block = arena.allocate(size);
      if !block.is_valid() {
        break;
      }
      prop_assert_eq!(block.size(), size);
      prop_assert!(is_aligned(block.address(), 16));
      if let Some(last) = blocks.last() {
        prop_assert!(last.end() <= block.address());
      }
      blocks.push(block);
    }

    for block in blocks.into_iter().rev() {
      unsafe { arena.deallocate(block) };
    }
    prop_assert_eq!(arena.used(), 0);
  }

  #[test]
  fn test_arena_mixed_requests_unwind(requests in prop::collection::vec(request(), 1..24)) {
    unwind_lifo::<8192, 16>(&requests)?;
    unwind_lifo::<8192, 32>(&requests)?;
    unwind_lifo::<8192, 64>(&requests)?;
  }

  #[test]
  fn test_arena_reallocate_aligned_lands_on_boundary(
    offset in 0usize..100,
    size in 1usize..100,
    grown in 1usize..400,
    shift in 0u32..10,
  ) {
    let mut arena = Box::new(Arena::<8192, 32>::new());
    let alignment = 1usize << shift;

    if offset > 0 {
      arena.allocate(offset);
    }
    let mut block = arena.allocate(size);

    unsafe {
      block.as_mut_slice().fill(0xA5);
      prop_assert!(arena.reallocate_aligned(&mut block, grown, alignment));
      prop_assert!(block.as_slice()[..size.min(grown)].iter().all(|&byte| byte == 0xA5));
    }
    prop_assert_eq!(block.size(), grown);
    prop_assert!(is_aligned(block.address(), alignment.max(32)));
  }

  #[test]
  fn test_force_align_over_heap(size in 1usize..20_000) {
    let mut forced = ForceAlign::<Heap, 64>::new(Heap::new());
    let block = forced.allocate(size);

    prop_assert_eq!(block.size(), size);
    prop_assert!(is_aligned(block.address(), 64));
    unsafe {
      block.as_mut_slice().fill(0xCD);
      forced.deallocate(block);
    }
  }
}
