//! タイマー割込み管理
//!
//! PIT (Programmable Interval Timer) の管理とタイマー割込みハンドラ

use crate::config::TIMER_FREQUENCY_HZ;
use crate::debug;
use crate::kernel::with_kernel;
use crate::task::context::switch_context;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::InterruptStackFrame;

/// PITの入力クロック
const PIT_BASE_FREQUENCY: u32 = 1_193_182;

/// タイマー割り込みハンドラ（IRQ0）
///
/// 切替先のコンテキストへのポインタはロック中に取り、切替はロックを離してから行う
pub extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let switch = with_kernel(|kernel| {
        let switch = kernel.on_timer_tick()?;
        let switch = kernel.confirm_switch(switch)?;
        Some((kernel.context_ptr(switch.from)?, kernel.context_ptr(switch.to)?))
    })
    .flatten();

    if let Some((save, load)) = switch {
        // SAFETY: 両方とも生存中のPCBのスロットで、割り込みは禁止されている
        unsafe { switch_context(save, load) };
    }
}

/// PITを初期化して`TIMER_FREQUENCY_HZ`の周期割り込みを設定
pub fn init_pit() {
    let divisor = (PIT_BASE_FREQUENCY / TIMER_FREQUENCY_HZ) as u16;
    debug!("Initializing PIT at {} Hz (divisor {})", TIMER_FREQUENCY_HZ, divisor);
    unsafe {
        // Channel 0、LSB+MSB、Mode 2 (rate generator)、Binary
        Port::<u8>::new(0x43).write(0x34);

        // IO待機
        for _ in 0..100 {
            core::hint::spin_loop();
        }

        Port::<u8>::new(0x40).write((divisor & 0xff) as u8);

        for _ in 0..100 {
            core::hint::spin_loop();
        }

        Port::<u8>::new(0x40).write(((divisor >> 8) & 0xff) as u8);
    }
}
