//! Global allocator backing the JSON documents parsed by `vent`.

use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use embedded_alloc::LlffHeap as Heap;

#[global_allocator]
static HEAP: Heap = Heap::empty();

/// 64 KB of the F767's 512 KB SRAM. TLS buffers live in static cells, not
/// here.
pub const HEAP_SIZE: usize = 64 * 1024;

/// Must be called once, before anything allocates.
pub fn init() {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    unsafe { HEAP.init(addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
}
