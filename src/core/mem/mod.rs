//! メモリ管理モジュール
//!
//! GDT、TSS、カーネルヒープ、ページング、ユーザーポインタの検証

pub mod paging;
pub mod user;

#[cfg(target_os = "none")]
pub mod allocator;
#[cfg(target_os = "none")]
pub mod gdt;
#[cfg(target_os = "none")]
pub mod tss;

/// GDT/TSSとカーネルヒープを初期化する
#[cfg(target_os = "none")]
pub fn init() {
    crate::info!("Initializing memory...");

    gdt::init();
    allocator::init_heap();

    crate::debug!("Memory initialized");
}
