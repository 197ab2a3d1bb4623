//! カーネルイメージのエントリポイント
//!
//! ブートローダーは`BootInfo`へのポインタを第1引数にして`_start`を呼ぶ

#![no_std]
#![no_main]

use termos::BootInfo;

#[no_mangle]
pub extern "C" fn _start(boot_info: &'static BootInfo) -> ! {
    termos::kernel_entry(boot_info)
}
