//! ロギングユーティリティ

use core::sync::atomic::{AtomicU8, Ordering};

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    /// BootInfoの数値からレベルを得る（範囲外はInfo）
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Trace => "[TRACE]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Info => "[INFO] ",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Error => "[ERROR]",
        }
    }
}

/// 現在のログレベル（デフォルト: Info）
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

fn should_log(level: LogLevel) -> bool {
    level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// ログレベルを設定
pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// ログ出力（シリアル）
pub fn log(level: LogLevel, args: core::fmt::Arguments) {
    if !should_log(level) {
        return;
    }
    crate::sprintln!("{} {}", level.prefix(), args);
}

/// トレースログ
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::util::log::log($crate::util::log::LogLevel::Trace, format_args!($($arg)*))
    };
}

/// デバッグログ
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::util::log::log($crate::util::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

/// 情報ログ
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::util::log::log($crate::util::log::LogLevel::Info, format_args!($($arg)*))
    };
}

/// 警告ログ
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::util::log::log($crate::util::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// エラーログ
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::util::log::log($crate::util::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(1), LogLevel::Debug);
        assert_eq!(LogLevel::from_u8(4), LogLevel::Error);
        assert_eq!(LogLevel::from_u8(200), LogLevel::Info);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Info);
    }
}
