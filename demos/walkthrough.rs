use std::io::Read;

use log::{LevelFilter, Log, Metadata, Record};
use tagalloc::{ExplicitAllocator, HeapExtend, MmapHeap};

/// Prints allocator log records to stdout.
struct StdoutLogger {
  max_level: LevelFilter,
}

impl Log for StdoutLogger {
  fn enabled(
    &self,
    metadata: &Metadata,
  ) -> bool {
    metadata.level() <= self.max_level
  }

  fn log(
    &self,
    record: &Record,
  ) {
    if self.enabled(record.metadata()) {
      println!("  [{}] {}: {}", record.level(), record.target(), record.args());
    }
  }

  fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger {
  max_level: LevelFilter::Trace,
};

/// Waits until the user presses ENTER.
/// Set `TAGALLOC_NO_PAUSE` to run straight through.
fn block_until_enter_pressed() {
  if std::env::var_os("TAGALLOC_NO_PAUSE").is_some() {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap(
  label: &str,
  allocator: &ExplicitAllocator<MmapHeap>,
) {
  let heap = allocator.heap();
  println!(
    "\n[{}] base = {:?}, break = {:?}",
    label,
    heap.base(),
    heap.base().wrapping_add(heap.len()),
  );
  print!("{}", allocator.dump());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  log::set_logger(&LOGGER).map_err(|err| err.to_string())?;
  log::set_max_level(LevelFilter::Trace);

  let mut allocator = ExplicitAllocator::init(MmapHeap::new()?)?;
  print_heap("start", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three allocations land one after another at the top of the heap.
  // --------------------------------------------------------------------
  let first = allocator.allocate(40).ok_or("out of memory")?;
  let second = allocator.allocate(200).ok_or("out of memory")?;
  let third = allocator.allocate(40).ok_or("out of memory")?;
  allocator.payload_mut(first)[..4].copy_from_slice(&0xDEADBEEFu32.to_ne_bytes());
  print_heap("1: allocate 40, 200, 40", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Freeing the first block puts it on the free list.
  // --------------------------------------------------------------------
  allocator.deallocate(Some(first));
  print_heap("2: free first", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A smaller request reuses it instead of growing the heap.
  // --------------------------------------------------------------------
  let reused = allocator.allocate(32).ok_or("out of memory")?;
  println!(
    "\n[3] reused == first? {}",
    if reused == first { "Yes, best fit picked the freed block" } else { "No" }
  );
  print_heap("3: allocate 32", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Freeing the middle block next to a free neighbour merges them.
  // --------------------------------------------------------------------
  allocator.deallocate(Some(reused));
  allocator.deallocate(Some(second));
  print_heap("4: free reused and second", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) The topmost block grows in place by moving the break.
  // --------------------------------------------------------------------
  let grown = allocator.reallocate(Some(third), 4096).ok_or("out of memory")?;
  println!("\n[5] moved? {}", grown != third);
  print_heap("5: reallocate third to 4 KiB", &allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Double frees are reported and ignored.
  // --------------------------------------------------------------------
  allocator.deallocate(Some(second));
  let stats = allocator.check()?;
  println!("\n[6] heap is consistent: {stats:?}");

  println!("\n[7] End of example. Dropping the allocator unmaps the heap.");
  Ok(())
}
