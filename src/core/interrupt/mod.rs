//! 割込み管理モジュール
//!
//! IDT、PIC、タイマーなどの割込み処理を管理

/// PITのIRQ番号
pub const TIMER_IRQ: u8 = 0;

/// スレーブPICが繋がるIRQ番号
pub const CASCADE_IRQ: u8 = 2;

#[cfg(target_os = "none")]
pub mod idt;
#[cfg(target_os = "none")]
pub mod pic;
#[cfg(target_os = "none")]
pub mod timer;

#[cfg(target_os = "none")]
pub use pic::send_eoi;

/// IDTを読み込み、PICを再配置する（全IRQはマスクされたまま）
#[cfg(target_os = "none")]
pub fn init() {
    idt::init();
    pic::init();
}
