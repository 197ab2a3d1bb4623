//! ユーザーモード実行サポート

use super::context::SavedContext;
use super::Launch;

/// 準備済みの`launch`へ入る
///
/// `save`が非NULLなら呼び出し元のコンテキストをそこへ保存する。
/// 保存したコンテキストが後で再開されたときだけ戻り、渡された値を返す。
///
/// # Safety
/// 割り込み禁止状態で呼ぶこと。`save`は生存中のPCBを指していること。
#[cfg(target_os = "none")]
pub unsafe fn enter(launch: &Launch, save: *mut SavedContext) -> i64 {
    use crate::mem::gdt;

    let (user_cs, user_ss) = match (gdt::user_code_selector(), gdt::user_data_selector()) {
        (Some(cs), Some(ss)) => (cs.0 as u64 | 3, ss.0 as u64 | 3), // RPL=3
        _ => {
            crate::error!("GDT not initialized, cannot enter user mode");
            return -1;
        }
    };

    crate::debug!(
        "Entering pid {} at {:#x} (stack {:#x})",
        launch.pid,
        launch.entry,
        launch.user_stack
    );

    super::context::save_and_enter_user(save, launch.entry, launch.user_stack, user_cs, user_ss)
}
