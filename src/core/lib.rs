//! termos: 3つの仮想端末を持つプリエンプティブなマルチタスクカーネル
//!
//! カーネル本体はハードウェアから切り離されており（[`hal::Hal`]）、
//! ホスト上のテストでもそのまま動く。実機でだけ必要なもの
//! （GDT/IDT、割り込みハンドラ、コンテキスト切替のアセンブリ）は
//! `target_os = "none"`のときだけコンパイルされる。

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

extern crate alloc;

/// コンパイル時設定
pub mod config;

/// デバイスドライバ
pub mod driver;

/// エラー型定義
pub mod error;

/// 起動用ファイルシステム
pub mod fs;

/// ハードウェア抽象化層
pub mod hal;

/// 割込み管理
pub mod interrupt;

/// ファイルディスクリプタと操作テーブル
pub mod io;

/// カーネル本体
pub mod kernel;

/// メモリ管理、GDT、TSSを含む
pub mod mem;

/// パニックハンドラ
pub mod panic;

/// システムコール
pub mod syscall;

/// タスク管理
pub mod task;

/// 仮想端末
pub mod terminal;

/// ユーティリティモジュール
pub mod util;

#[cfg(test)]
mod testing;

pub use error::{KernelError, Result};
pub use kernel::Kernel;
#[cfg(target_os = "none")]
pub use kernel::kernel_entry;

/// ブートローダーから渡される情報
#[repr(C)]
pub struct BootInfo {
    /// 起動用ファイルシステムイメージの物理アドレス
    pub fs_image_addr: u64,
    /// イメージのバイト数
    pub fs_image_len: usize,
    /// ログレベル（0=Trace .. 4=Error）
    pub log_level: u8,
}
