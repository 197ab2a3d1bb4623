//! シリアルポート出力
//!
//! カーネルログの出力先。ホスト上のテストでは何も出力しない。

use core::fmt;

#[cfg(target_os = "none")]
mod serial {
    use crate::config::DEBUG_SERIAL_PORT;
    use core::fmt;
    use spin::Mutex;
    use x86_64::instructions::port::Port;

    /// シリアルポート (COM1)
    pub static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(DEBUG_SERIAL_PORT));

    /// UARTシリアルポート
    pub struct SerialPort {
        /// データ
        data: Port<u8>,
        /// 割り込み有効化
        int_en: Port<u8>,
        /// FIFO制御
        fifo_ctrl: Port<u8>,
        /// ライン制御
        line_ctrl: Port<u8>,
        /// モデム制御
        modem_ctrl: Port<u8>,
        /// ラインステータス
        line_status: Port<u8>,
    }

    impl SerialPort {
        const fn new(base: u16) -> Self {
            Self {
                data: Port::new(base),
                int_en: Port::new(base + 1),
                fifo_ctrl: Port::new(base + 2),
                line_ctrl: Port::new(base + 3),
                modem_ctrl: Port::new(base + 4),
                line_status: Port::new(base + 5),
            }
        }

        /// 38400 baud, 8N1で初期化
        pub fn init(&mut self) {
            unsafe {
                self.int_en.write(0x00);
                // ボーレート設定を有効化
                self.line_ctrl.write(0x80);
                // divisor = 3
                self.data.write(0x03);
                self.int_en.write(0x00);
                self.line_ctrl.write(0x03);
                // FIFOを有効化, クリア, 14バイトしきい値
                self.fifo_ctrl.write(0xC7);
                self.modem_ctrl.write(0x0B);
            }
        }

        fn send_byte(&mut self, byte: u8) {
            unsafe {
                // 送信準備完了を待つ
                while self.line_status.read() & 0x20 == 0 {}
                self.data.write(byte);
            }
        }
    }

    impl fmt::Write for SerialPort {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for byte in s.bytes() {
                if byte == b'\n' {
                    self.send_byte(b'\r');
                }
                self.send_byte(byte);
            }
            Ok(())
        }
    }
}

/// シリアルポートを初期化
pub fn init() {
    #[cfg(target_os = "none")]
    x86_64::instructions::interrupts::without_interrupts(|| serial::SERIAL.lock().init());
}

/// シリアルポートに文字列を出力
///
/// カーネル状態のロック中にも呼ばれるため、割り込みを止めてからポートを取る
pub fn print(args: fmt::Arguments) {
    #[cfg(target_os = "none")]
    {
        use core::fmt::Write;
        x86_64::instructions::interrupts::without_interrupts(|| {
            let _ = serial::SERIAL.lock().write_fmt(args);
        });
    }
    #[cfg(not(target_os = "none"))]
    let _ = args;
}

/// シリアル出力マクロ
#[macro_export]
macro_rules! sprint {
    ($($arg:tt)*) => {
        $crate::util::console::print(format_args!($($arg)*))
    };
}

/// 改行付きのシリアル出力マクロ
#[macro_export]
macro_rules! sprintln {
    () => ($crate::sprint!("\n"));
    ($($arg:tt)*) => {
        $crate::sprint!("{}\n", format_args!($($arg)*))
    };
}
