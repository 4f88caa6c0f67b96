use log::debug;
use thiserror::Error;

use crate::{
  allocator::{Allocator, Capabilities, Trivial, move_block, reallocate_trivial},
  block::Block,
};

/// Rejected bucket lists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BucketError {
  #[error("a segregator needs at least one bucket")]
  Empty,
  #[error("bucket {index} has threshold {threshold}, not above the previous {previous}")]
  Unsorted {
    index: usize,
    previous: usize,
    threshold: usize,
  },
  #[error("{count} buckets answer `owns` optimistically; frees could not be routed")]
  AmbiguousOwnership { count: usize },
}

type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Node {
  Leaf {
    bucket: usize,
  },
  Split {
    threshold: usize,
    below: NodeId,
    above: NodeId,
  },
}

/// Size-class dispatch over an ascending list of `(threshold, allocator)`
/// buckets.
///
/// A request of `size` bytes belongs to the first bucket whose threshold is
/// at least `size`; requests above the last threshold fail. Instead of
/// scanning the list, the buckets are arranged once into a balanced binary
/// tree keyed on the median threshold of every range:
///
/// ```text
///   buckets: 16   32   64   128   256
///
///                 [<= 64]
///                /       \
///          [<= 32]       [<= 128]
///          /     \        /     \
///      [<= 16]   64     128     256
///       /   \
///      16   32
/// ```
///
/// so dispatch costs `O(log n)` threshold comparisons.
///
/// Frees are routed by asking the precise buckets first. At most one bucket
/// may answer `owns` optimistically; it takes whatever no precise bucket
/// claims. Wrap differing bucket types in [`Either`](crate::Either) to mix
/// arena classes with a heap bucket.
#[derive(Debug)]
pub struct BinarySegregator<A> {
  thresholds: Vec<usize>,
  allocators: Vec<A>,
  nodes: Vec<Node>,
  root: NodeId,
}

impl<A: Allocator> BinarySegregator<A> {
  pub fn new<I>(buckets: I) -> Result<Self, BucketError>
  where
    I: IntoIterator<Item = (usize, A)>,
  {
    let (thresholds, allocators): (Vec<usize>, Vec<A>) = buckets.into_iter().unzip();

    if thresholds.is_empty() {
      return Err(BucketError::Empty);
    }

    for (index, pair) in thresholds.windows(2).enumerate() {
      if pair[1] <= pair[0] {
        return Err(BucketError::Unsorted {
          index: index + 1,
          previous: pair[0],
          threshold: pair[1],
        });
      }
    }

    let optimistic = allocators.iter().filter(|allocator| !allocator.owns_precisely()).count();
    if optimistic > 1 {
      return Err(BucketError::AmbiguousOwnership { count: optimistic });
    }

    let mut nodes = Vec::with_capacity(2 * thresholds.len() - 1);
    let root = Self::build(&thresholds, 0, thresholds.len(), &mut nodes);

    let segregator = Self {
      thresholds,
      allocators,
      nodes,
      root,
    };
    debug!(
      "binary segregator: {} buckets {:?}, depth {}",
      segregator.len(),
      segregator.thresholds,
      segregator.depth()
    );

    Ok(segregator)
  }

  /// Builds the subtree over buckets `lo..hi`, returning its root.
  fn build(
    thresholds: &[usize],
    lo: usize,
    hi: usize,
    nodes: &mut Vec<Node>,
  ) -> NodeId {
    let node = if hi - lo == 1 {
      Node::Leaf { bucket: lo }
    } else {
      let median = lo + (hi - lo - 1) / 2;
      let below = Self::build(thresholds, lo, median + 1, nodes);
      let above = Self::build(thresholds, median + 1, hi, nodes);
      Node::Split {
        threshold: thresholds[median],
        below,
        above,
      }
    };

    nodes.push(node);
    nodes.len() - 1
  }

  pub fn len(&self) -> usize {
    self.allocators.len()
  }

  pub fn is_empty(&self) -> bool {
    self.allocators.is_empty()
  }

  pub fn thresholds(&self) -> &[usize] {
    &self.thresholds
  }

  pub fn bucket(
    &self,
    index: usize,
  ) -> Option<&A> {
    self.allocators.get(index)
  }

  /// Bucket index serving `size`, found through the tree.
  pub fn dispatch(
    &self,
    size: usize,
  ) -> Option<usize> {
    let mut id = self.root;
    loop {
      match self.nodes[id] {
        Node::Split {
          threshold,
          below,
          above,
        } => id = if size <= threshold { below } else { above },
        Node::Leaf { bucket } => return (size <= self.thresholds[bucket]).then_some(bucket),
      }
    }
  }

  /// Bucket index serving `size`, found by scanning the list in order.
  pub fn linear_dispatch(
    &self,
    size: usize,
  ) -> Option<usize> {
    self.thresholds.iter().position(|&threshold| size <= threshold)
  }

  /// Threshold comparisons on the longest root-to-leaf path.
  pub fn depth(&self) -> usize {
    fn walk(
      nodes: &[Node],
      id: NodeId,
    ) -> usize {
      match nodes[id] {
        Node::Leaf { .. } => 1,
        Node::Split { below, above, .. } => 1 + walk(nodes, below).max(walk(nodes, above)),
      }
    }

    walk(&self.nodes, self.root)
  }

  fn owner(
    &self,
    block: Block,
  ) -> Option<usize> {
    let claims = |precise: bool| {
      self
        .allocators
        .iter()
        .position(|allocator| allocator.owns_precisely() == precise && allocator.owns(block))
    };
    claims(true).or_else(|| claims(false))
  }

  fn pair_mut(
    &mut self,
    from: usize,
    to: usize,
  ) -> (&mut A, &mut A) {
    debug_assert_ne!(from, to);
    if from < to {
      let (head, tail) = self.allocators.split_at_mut(to);
      (&mut head[from], &mut tail[0])
    } else {
      let (head, tail) = self.allocators.split_at_mut(from);
      (&mut tail[0], &mut head[to])
    }
  }
}

impl<A: Allocator> Allocator for BinarySegregator<A> {
  const ALIGNMENT: usize = A::ALIGNMENT;
  const MIN_ALLOC_SIZE: usize = A::MIN_ALLOC_SIZE;
  const MAX_ALLOC_SIZE: usize = A::MAX_ALLOC_SIZE;
  const CAPABILITIES: Capabilities = Capabilities {
    reallocate_aligned: false,
    allocate_all: false,
    allocate_all_aligned: false,
    ..A::CAPABILITIES
  };

  fn allocate(
    &mut self,
    size: usize,
  ) -> Block {
    match self.dispatch(size) {
      Some(bucket) => self.allocators[bucket].allocate(size),
      None => Block::empty(),
    }
  }

  unsafe fn deallocate(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    match self.owner(block) {
      Some(bucket) => unsafe { self.allocators[bucket].deallocate(block) },
      None => debug_assert!(false, "{:?} belongs to no bucket", block),
    }
  }

  fn owns(
    &self,
    block: Block,
  ) -> bool {
    self.owner(block).is_some()
  }

  fn owns_precisely(&self) -> bool {
    self.allocators.iter().all(|allocator| allocator.owns_precisely())
  }

  fn allocate_aligned(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Block {
    match self.dispatch(size) {
      Some(bucket) => self.allocators[bucket].allocate_aligned(size, alignment),
      None => Block::empty(),
    }
  }

  unsafe fn deallocate_aligned(
    &mut self,
    block: Block,
  ) {
    if !block.is_valid() {
      return;
    }

    match self.owner(block) {
      Some(bucket) => unsafe { self.allocators[bucket].deallocate_aligned(block) },
      None => debug_assert!(false, "{:?} belongs to no bucket", block),
    }
  }

  unsafe fn reallocate(
    &mut self,
    block: &mut Block,
    size: usize,
  ) -> bool {
    if !A::CAPABILITIES.reallocate {
      return false;
    }

    if let Trivial::Done(done) = unsafe { reallocate_trivial(self, block, size, None) } {
      return done;
    }

    let (Some(from), Some(to)) = (self.owner(*block), self.dispatch(size)) else {
      return false;
    };

    if from == to {
      return unsafe { self.allocators[from].reallocate(block, size) };
    }

    let (source, target) = self.pair_mut(from, to);
    unsafe { move_block(source, target, block, size) }
  }

  unsafe fn deallocate_all(&mut self) {
    if A::CAPABILITIES.deallocate_all {
      for allocator in &mut self.allocators {
        unsafe { allocator.deallocate_all() };
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, either::Either, heap::Heap};

  type Bucket = Box<Arena<1024, 16>>;

  fn buckets(thresholds: &[usize]) -> BinarySegregator<Bucket> {
    BinarySegregator::new(thresholds.iter().map(|&threshold| (threshold, Box::new(Arena::new())))).unwrap()
  }

  #[test]
  fn test_tree_matches_linear_scan_at_boundaries() {
    for count in 1..=9 {
      let thresholds: Vec<usize> = (0..count).map(|i| 16 << i).collect();
      let segregator = buckets(&thresholds);

      for &threshold in &thresholds {
        for size in [threshold - 1, threshold, threshold + 1] {
          assert_eq!(
            segregator.dispatch(size),
            segregator.linear_dispatch(size),
            "size {} over {:?}",
            size,
            thresholds
          );
        }
      }
      assert_eq!(segregator.dispatch(0), Some(0));
      assert_eq!(segregator.dispatch(usize::MAX), None);
    }
  }

  #[test]
  fn test_tree_is_balanced() {
    assert_eq!(buckets(&[8]).depth(), 1);
    assert_eq!(buckets(&[8, 16]).depth(), 2);
    assert_eq!(buckets(&[8, 16, 32, 64]).depth(), 3);
    assert_eq!(buckets(&[8, 16, 32, 64, 128, 256, 512, 1024]).depth(), 4);
  }

  #[test]
  fn test_allocates_from_matching_bucket() {
    let mut segregator = buckets(&[16, 64, 256]);

    let small = segregator.allocate(10);
    let medium = segregator.allocate(17);
    let large = segregator.allocate(256);

    assert!(segregator.bucket(0).unwrap().owns(small));
    assert!(segregator.bucket(1).unwrap().owns(medium));
    assert!(segregator.bucket(2).unwrap().owns(large));
    assert!(!segregator.allocate(257).is_valid());

    unsafe {
      segregator.deallocate(large);
      segregator.deallocate(medium);
      segregator.deallocate(small);
    }
    for index in 0..segregator.len() {
      assert_eq!(segregator.bucket(index).unwrap().used(), 0);
    }
  }

  #[test]
  fn test_reallocate_moves_between_buckets() {
    let mut segregator = buckets(&[16, 64, 256]);
    let mut block = segregator.allocate(12);

    unsafe {
      block.as_mut_slice().copy_from_slice(b"binary-tree!");
      assert!(segregator.reallocate(&mut block, 200));
      assert!(segregator.bucket(2).unwrap().owns(block));
      assert_eq!(&block.as_slice()[..12], b"binary-tree!");
      assert_eq!(segregator.bucket(0).unwrap().used(), 0);
    }
  }

  #[test]
  fn test_rejects_bad_bucket_lists() {
    let empty: Vec<(usize, Bucket)> = Vec::new();
    assert_eq!(BinarySegregator::new(empty).unwrap_err(), BucketError::Empty);

    let unsorted = BinarySegregator::new(
      [32, 16]
        .into_iter()
        .map(|threshold| (threshold, Box::new(Arena::<64, 16>::new()))),
    );
    assert_eq!(
      unsorted.unwrap_err(),
      BucketError::Unsorted {
        index: 1,
        previous: 32,
        threshold: 16
      }
    );

    let optimistic = BinarySegregator::new([(16, Heap::new()), (32, Heap::new())]);
    assert_eq!(
      optimistic.unwrap_err(),
      BucketError::AmbiguousOwnership { count: 2 }
    );
    assert!(BinarySegregator::new([(usize::MAX, Heap::new())]).is_ok());
  }

  type Class = Either<Box<Arena<1024, 16>>, Heap>;

  fn arena_class() -> Class {
    Class::Left(Box::new(Arena::new()))
  }

  #[test]
  fn test_arena_classes_over_heap_bucket() {
    let mut segregator = BinarySegregator::new([
      (16, arena_class()),
      (128, arena_class()),
      (usize::MAX, Class::Right(Heap::new())),
    ])
    .unwrap();
    assert!(!segregator.owns_precisely());

    let small = segregator.allocate(8);
    let mut medium = segregator.allocate(100);
    let large = segregator.allocate(5000);

    assert!(segregator.bucket(0).unwrap().owns(small));
    assert!(segregator.bucket(1).unwrap().owns(medium));
    assert!(!segregator.bucket(0).unwrap().owns(large));
    assert!(!segregator.bucket(1).unwrap().owns(large));
    assert!(segregator.owns(large));

    unsafe {
      medium.as_mut_slice().fill(0x42);
      assert!(segregator.reallocate(&mut medium, 4000));
      assert!(medium.as_slice()[..100].iter().all(|&byte| byte == 0x42));

      segregator.deallocate(large);
      segregator.deallocate(medium);
      segregator.deallocate(small);
    }

    for index in 0..2 {
      let arena = segregator.bucket(index).and_then(Either::left);
      assert_eq!(arena.map(|arena| arena.used()), Some(0));
    }
  }

  #[test]
  fn test_counts_optimistic_buckets_per_instance() {
    let two_heaps = BinarySegregator::new([
      (16, arena_class()),
      (64, Class::Right(Heap::new())),
      (usize::MAX, Class::Right(Heap::new())),
    ]);
    assert_eq!(
      two_heaps.unwrap_err(),
      BucketError::AmbiguousOwnership { count: 2 }
    );

    let arenas = BinarySegregator::new([(16, arena_class()), (64, arena_class())]).unwrap();
    assert!(arenas.owns_precisely());
  }

  #[test]
  #[cfg(debug_assertions)]
  #[should_panic(expected = "belongs to no bucket")]
  fn test_unowned_aligned_free_is_caught() {
    let mut segregator = buckets(&[16, 64]);
    let mut outside = [0u8; 8];

    unsafe { segregator.deallocate_aligned(Block::new(outside.as_mut_ptr(), 8)) };
  }
}
