//! termosエラー型定義
//!
//! すべてのカーネルエラーをResult型で表現し、panicを禁止

use core::fmt;

/// トップレベルエラー型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// メモリエラー
    Memory(MemoryError),
    /// プロセスエラー
    Process(ProcessError),
    /// デバイスエラー
    Device(DeviceError),
    /// ファイルシステムエラー
    Fs(FsError),
    /// ファイルディスクリプタエラー
    Io(IoError),
    /// 無効なパラメータ
    InvalidParam,
    /// 未実装の機能
    NotImplemented,
}

/// メモリ関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// 無効なアドレスへのアクセス
    InvalidAddress,
    /// マップされていないアドレス
    NotMapped,
}

/// プロセス関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// 無効なプロセスID
    InvalidPid,
    /// 実行中のプロセスがない
    NoCurrentProcess,
    /// プロセス数の上限に達した
    MaxProcessesReached,
    /// コマンドラインが不正
    BadCommand,
    /// 実行可能形式ではない
    BadExecutable,
    /// 引数がない、またはバッファに収まらない
    NoArguments,
}

/// デバイス関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// デバイスがビジー状態（再試行で成功する）
    Busy,
    /// 不正な操作
    InvalidOperation,
    /// サポートされていない値
    Unsupported,
}

/// ファイルシステム関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// ファイルが見つからない
    NotFound,
    /// 通常ファイルではない
    NotRegularFile,
    /// イメージが壊れている
    Corrupted,
}

/// ファイルディスクリプタ関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// 不正なディスクリプタ
    BadDescriptor,
    /// 空きディスクリプタがない
    NoFreeDescriptor,
}

impl KernelError {
    /// このエラーが致命的かどうか
    ///
    /// 致命的なエラーはブートイメージの破損を意味し、以後の動作は保証できない
    /// - `FsError::Corrupted`
    pub fn is_fatal(&self) -> bool {
        matches!(self, KernelError::Fs(FsError::Corrupted))
    }

    /// このエラーがリトライ可能かどうか
    ///
    /// リトライ可能なエラーは、一時的な問題であり、再試行によって成功する可能性がある
    /// - `DeviceError::Busy`
    pub fn is_retryable(&self) -> bool {
        matches!(self, KernelError::Device(DeviceError::Busy))
    }
}

impl From<MemoryError> for KernelError {
    fn from(e: MemoryError) -> Self {
        KernelError::Memory(e)
    }
}

impl From<ProcessError> for KernelError {
    fn from(e: ProcessError) -> Self {
        KernelError::Process(e)
    }
}

impl From<DeviceError> for KernelError {
    fn from(e: DeviceError) -> Self {
        KernelError::Device(e)
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        KernelError::Fs(e)
    }
}

impl From<IoError> for KernelError {
    fn from(e: IoError) -> Self {
        KernelError::Io(e)
    }
}

impl fmt::Display for KernelError {
    /// エラーをフォーマット表示
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Memory(e) => write!(f, "Memory error: {}", e),
            KernelError::Process(e) => write!(f, "Process error: {}", e),
            KernelError::Device(e) => write!(f, "Device error: {}", e),
            KernelError::Fs(e) => write!(f, "Filesystem error: {}", e),
            KernelError::Io(e) => write!(f, "I/O error: {}", e),
            KernelError::InvalidParam => write!(f, "Invalid parameter"),
            KernelError::NotImplemented => write!(f, "Not implemented"),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::InvalidAddress => write!(f, "Invalid address"),
            MemoryError::NotMapped => write!(f, "Not mapped"),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::InvalidPid => write!(f, "Invalid pid"),
            ProcessError::NoCurrentProcess => write!(f, "No current process"),
            ProcessError::MaxProcessesReached => write!(f, "Too many processes"),
            ProcessError::BadCommand => write!(f, "Bad command line"),
            ProcessError::BadExecutable => write!(f, "Not an executable"),
            ProcessError::NoArguments => write!(f, "No arguments"),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Busy => write!(f, "Device busy"),
            DeviceError::InvalidOperation => write!(f, "Invalid operation"),
            DeviceError::Unsupported => write!(f, "Unsupported"),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file"),
            FsError::NotRegularFile => write!(f, "Not a regular file"),
            FsError::Corrupted => write!(f, "Corrupted image"),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::BadDescriptor => write!(f, "Bad file descriptor"),
            IoError::NoFreeDescriptor => write!(f, "No free file descriptor"),
        }
    }
}

/// 結果型のエイリアス
pub type Result<T> = core::result::Result<T, KernelError>;
