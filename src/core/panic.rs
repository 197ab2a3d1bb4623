//! パニックハンドラ
//!
//! カーネルパニック時の処理
//! 通常のパニックは最終手段として使用し、可能な限りResult型でエラー処理を行うこと

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    crate::error!("!!! KERNEL PANIC !!!");

    if let Some(loc) = info.location() {
        crate::error!("Location: {}:{}:{}", loc.file(), loc.line(), loc.column());
    }
    crate::error!("Message: {}", info.message());
    crate::warn!("System halted. Please reset.");

    crate::kernel::halt_forever()
}
