//! タスク管理モジュール
//!
//! プロセスの生成・終了、コンテキスト切替、端末をまたぐラウンドロビンスケジューリング

pub mod context;
pub mod exec;
pub mod process;
pub mod scheduler;
#[cfg(target_os = "none")]
pub mod usermode;

pub use context::SavedContext;
pub use exec::{parse_command, Command};
pub use process::{Args, Pid, Process, ProcessTable};
pub use scheduler::Scheduler;

use x86_64::VirtAddr;

/// ユーザーモードへの一方向の遷移
///
/// 準備（窓・PCB・カーネルスタック）は済んでおり、あとはレジスタを切り替えるだけ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    /// 新しいプロセス
    pub pid: Pid,
    /// エントリポイント
    pub entry: u64,
    /// ユーザースタックの初期値
    pub user_stack: u64,
    /// 新しいプロセスのカーネルスタック
    pub kernel_stack: VirtAddr,
    /// 呼び出し元のコンテキストの保存先
    pub save_into: Option<Pid>,
}

/// halt の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltOutcome {
    /// 親の execute から戻る
    Resume { parent: Pid, status: i64 },
    /// 端末のベースシェルを起動し直す
    Respawn(Launch),
}

/// スケジューラが決めた切替
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: Pid,
    pub to: Pid,
}

/// 終了状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// halt(status)
    Code(u8),
    /// 例外による強制終了
    Faulted,
}

impl ExitStatus {
    /// 親の execute が受け取る値
    pub fn code(self) -> i64 {
        match self {
            ExitStatus::Code(code) => i64::from(code),
            ExitStatus::Faulted => 256,
        }
    }
}
