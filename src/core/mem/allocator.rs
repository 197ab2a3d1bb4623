//! カーネルヒープ
//!
//! カーネルイメージ内の静的領域をヒープにする。ヒープは下位1 GiBにあるため
//! 仮想アドレスと物理アドレスが一致し、ページテーブルをそのまま置ける。

use crate::config::KERNEL_HEAP_SIZE;
use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[repr(align(4096))]
struct HeapArea([u8; KERNEL_HEAP_SIZE]);

static mut HEAP_AREA: HeapArea = HeapArea([0; KERNEL_HEAP_SIZE]);

/// ヒープを初期化
pub fn init_heap() {
    // SAFETY: 起動時に一度だけ呼ばれ、HEAP_AREAは他から参照されない
    unsafe {
        let start = (&raw mut HEAP_AREA).cast::<u8>();
        ALLOCATOR.lock().init(start, KERNEL_HEAP_SIZE);
    }
    crate::debug!("Kernel heap: {} KiB", KERNEL_HEAP_SIZE / 1024);
}
