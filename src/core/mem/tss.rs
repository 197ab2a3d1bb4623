//! TSS管理モジュール
//!
//! ユーザーモードからの割り込みで使うカーネルスタック (RSP0) を保持する

use crate::info;
use spin::Once;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// ダブルフォルト用ISTインデックス
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

static TSS: Once<TaskStateSegment> = Once::new();

/// TSSを初期化して返す
pub fn init() -> &'static TaskStateSegment {
    info!("Initializing TSS...");

    TSS.call_once(|| {
        let mut tss = TaskStateSegment::new();

        // ダブルフォルト用の専用スタック
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            const STACK_SIZE: usize = 4096 * 5;
            static mut STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

            let stack_start = VirtAddr::from_ptr(&raw const STACK);
            stack_start + STACK_SIZE as u64
        };

        // 最初のプロセスが起動するまでの仮のRing0スタック
        tss.privilege_stack_table[0] = {
            const RING0_STACK_SIZE: usize = 4096 * 2;
            static mut RING0_STACK: [u8; RING0_STACK_SIZE] = [0; RING0_STACK_SIZE];

            let stack_start = VirtAddr::from_ptr(&raw const RING0_STACK);
            stack_start + RING0_STACK_SIZE as u64
        };

        info!(
            "  IST[{}] stack: {:#x}",
            DOUBLE_FAULT_IST_INDEX,
            tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize].as_u64()
        );
        tss
    })
}

/// Ring 0スタック (RSP0) を更新
///
/// プロセスを切り替えるたびに、そのプロセスのカーネルスタックを設定する
pub fn set_rsp0(rsp: u64) {
    if let Some(tss) = TSS.get() {
        let ptr = tss as *const TaskStateSegment as *mut TaskStateSegment;
        // SAFETY: 単一コアかつ割り込み禁止中にのみ呼ばれる。CPUはTSSを読むだけ
        unsafe {
            (*ptr).privilege_stack_table[0] = VirtAddr::new(rsp);
        }
    }
}
