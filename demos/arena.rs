use std::io::Read;

use allocompose::{Allocator, Arena, Block, CorruptionGuarded, Fallback, Heap, Shared, shared_allocator};

shared_allocator! {
  /// The demo runs on the main thread only.
  unsafe struct DemoArena(Arena<256, 16>);
}

/// Waits for ENTER when the demo runs with `--step`, so the arena can be
/// inspected between steps (e.g. with `gdb`).
fn pause(stepping: bool) {
  if stepping {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_block(
  label: &str,
  block: Block,
) {
  println!(
    "[{}] {:?}, addr % 16 = {}, used = {}",
    label,
    block,
    block.address() % 16,
    Shared::<DemoArena>::with(|arena| arena.used())
  );
}

fn main() {
  env_logger::init();
  let stepping = std::env::args().any(|arg| arg == "--step");

  let mut arena = Shared::<DemoArena>::new();

  // --------------------------------------------------------------------
  // 1) Two allocations bump the cursor by their rounded sizes.
  // --------------------------------------------------------------------
  let first = arena.allocate(10);
  print_block("1: 10 bytes", first);
  let second = arena.allocate(20);
  print_block("1: 20 bytes", second);
  pause(stepping);

  // --------------------------------------------------------------------
  // 2) Freeing the most recent block rewinds the cursor, so the next
  //    allocation lands on the same address.
  // --------------------------------------------------------------------
  unsafe { arena.deallocate(second) };
  let third = arena.allocate(5);
  print_block("2: 5 bytes after LIFO free", third);
  println!("[2] reused freed address? {}", third.as_ptr() == second.as_ptr());
  pause(stepping);

  // --------------------------------------------------------------------
  // 3) Freeing out of order keeps the block reserved until a reset.
  // --------------------------------------------------------------------
  unsafe { arena.deallocate(first) };
  print_block("3: after out-of-order free", first);
  unsafe { arena.deallocate_all() };
  println!("[3] reset, used = {}", Shared::<DemoArena>::with(|arena| arena.used()));
  pause(stepping);

  // --------------------------------------------------------------------
  // 4) Behind a fallback, requests the arena cannot hold go to the heap.
  //    Another handle to the same arena is just as good as the first.
  // --------------------------------------------------------------------
  let mut chain = Fallback::new(Shared::<DemoArena>::new(), Heap::new());
  let small = chain.allocate(64);
  let large = chain.allocate(4096);
  println!("[4] 64 bytes from arena? {}", chain.primary().owns(small));
  println!("[4] 4096 bytes from arena? {}", chain.primary().owns(large));
  unsafe {
    chain.deallocate(large);
    chain.deallocate(small);
  }
  pause(stepping);

  // --------------------------------------------------------------------
  // 5) Guards on both sides of every block are checked when it is freed.
  //    Run with RUST_LOG=debug to see the allocator traffic.
  // --------------------------------------------------------------------
  let mut guarded: CorruptionGuarded<Shared<DemoArena>> = CorruptionGuarded::new(Shared::new());
  let block = guarded.allocate(16);
  unsafe {
    block.as_mut_slice().fill(0x5A);
    guarded.deallocate(block);
  }
  println!("[5] guarded block freed cleanly, used = {}", Shared::<DemoArena>::with(|arena| arena.used()));

  println!("\n[6] End of demo.");
}
