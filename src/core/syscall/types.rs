//! システムコール番号と戻り値

use crate::error::{IoError, KernelError, ProcessError};

/// システムコール番号
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    /// プロセス終了 (arg0=status)
    Halt = 1,
    /// コマンドを実行し、終了を待つ (arg0=command_ptr)
    Execute = 2,
    /// 読み込み (arg0=fd, arg1=buf_ptr, arg2=len)
    Read = 3,
    /// 書き込み (arg0=fd, arg1=buf_ptr, arg2=len)
    Write = 4,
    /// ファイルを開く (arg0=name_ptr)
    Open = 5,
    /// ファイルを閉じる (arg0=fd)
    Close = 6,
    /// 引数を取得 (arg0=buf_ptr, arg1=len)
    GetArgs = 7,
    /// ビデオメモリをユーザーにマップ (arg0=out_ptr)
    Vidmap = 8,
    /// シグナルハンドラ登録（未サポート）
    SetHandler = 9,
    /// シグナルから復帰（未サポート）
    Sigreturn = 10,
}

impl TryFrom<u64> for SyscallNumber {
    type Error = KernelError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => SyscallNumber::Halt,
            2 => SyscallNumber::Execute,
            3 => SyscallNumber::Read,
            4 => SyscallNumber::Write,
            5 => SyscallNumber::Open,
            6 => SyscallNumber::Close,
            7 => SyscallNumber::GetArgs,
            8 => SyscallNumber::Vidmap,
            9 => SyscallNumber::SetHandler,
            10 => SyscallNumber::Sigreturn,
            _ => return Err(KernelError::NotImplemented),
        })
    }
}

/// 一般的な失敗
pub const FAILURE: i64 = -1;
/// プロセス数の上限
pub const EPROCLIM: i64 = -2;
/// 空きディスクリプタがない
pub const EMFILE: i64 = -3;

/// エラーをユーザーへ返す値に変換
///
/// 資源の枯渇だけは区別して返す
pub fn error_code(error: &KernelError) -> i64 {
    match error {
        KernelError::Process(ProcessError::MaxProcessesReached) => EPROCLIM,
        KernelError::Io(IoError::NoFreeDescriptor) => EMFILE,
        _ => FAILURE,
    }
}
