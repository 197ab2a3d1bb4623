//! PIC管理
//!
//! 8259 PICのペアをベクタ0x20-0x2Fへ再配置し、IRQごとにマスクとEOIを扱う

use spin::Mutex;
use x86_64::instructions::port::Port;

/// PICのオフセット（IRQ番号をINT番号に変換）
pub const PIC1_OFFSET: u8 = 0x20; // IRQ 0-7 -> INT 0x20-0x27
pub const PIC2_OFFSET: u8 = 0x28; // IRQ 8-15 -> INT 0x28-0x2F

/// EOIコマンド
const EOI: u8 = 0x20;

/// 8259 PICペア
static PICS: Mutex<ChainedPics> = Mutex::new(ChainedPics::new(PIC1_OFFSET, PIC2_OFFSET));

/// マスターとスレーブの2つのPIC
struct ChainedPics {
    master: Pic,
    slave: Pic,
}

impl ChainedPics {
    const fn new(master_offset: u8, slave_offset: u8) -> Self {
        Self {
            master: Pic::new(0x20, master_offset),
            slave: Pic::new(0xA0, slave_offset),
        }
    }

    /// PICを初期化
    unsafe fn initialize(&mut self) {
        let mut wait_port: Port<u8> = Port::new(0x80);
        let mut wait = || wait_port.write(0);

        // 初期化コマンド送信
        self.master.command.write(0x11);
        wait();
        self.slave.command.write(0x11);
        wait();

        // オフセット設定
        self.master.data.write(self.master.offset);
        wait();
        self.slave.data.write(self.slave.offset);
        wait();

        // カスケード設定
        self.master.data.write(4); // スレーブはIRQ2に接続
        wait();
        self.slave.data.write(2); // スレーブID = 2
        wait();

        // 8086モード
        self.master.data.write(0x01);
        wait();
        self.slave.data.write(0x01);
        wait();

        // すべての割込みをマスク（無効化）
        self.master.data.write(0xFF);
        wait();
        self.slave.data.write(0xFF);
        wait();
    }

    /// IRQ線のマスクを変更する（0=有効, 1=無効）
    unsafe fn set_masked(&mut self, irq: u8, masked: bool) {
        let (pic, line) = if irq < 8 {
            (&mut self.master, irq)
        } else {
            (&mut self.slave, irq - 8)
        };
        let current = pic.data.read();
        let next = if masked {
            current | (1 << line)
        } else {
            current & !(1 << line)
        };
        pic.data.write(next);
    }

    /// 割込み終了を通知（EOI: End Of Interrupt）
    unsafe fn end_of_interrupt(&mut self, irq: u8) {
        if irq >= 8 {
            // スレーブPICの割込みの場合、両方にEOIを送る
            self.slave.command.write(EOI);
        }
        self.master.command.write(EOI);
    }
}

/// 単一のPIC
struct Pic {
    command: Port<u8>,
    data: Port<u8>,
    offset: u8,
}

impl Pic {
    const fn new(port: u16, offset: u8) -> Self {
        Self {
            command: Port::new(port),
            data: Port::new(port + 1),
            offset,
        }
    }
}

/// PICを再配置し、全IRQをマスクする
pub fn init() {
    crate::debug!("Remapping PIC to {:#x}/{:#x}", PIC1_OFFSET, PIC2_OFFSET);
    unsafe { PICS.lock().initialize() };
}

/// IRQ線を有効化または無効化
pub fn set_irq_enabled(irq: u8, enabled: bool) {
    if irq >= 16 {
        crate::warn!("Ignoring mask change for invalid IRQ {}", irq);
        return;
    }
    unsafe { PICS.lock().set_masked(irq, !enabled) };
}

/// IRQの割込み終了を通知
pub fn send_eoi(irq: u8) {
    unsafe { PICS.lock().end_of_interrupt(irq) };
}
