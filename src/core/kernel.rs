//! カーネル本体
//!
//! カーネルの状態はすべて [`Kernel`] 1つにまとまっている。
//! 実機ではこれを`spin::Mutex`に入れ、割り込み禁止中にだけ触る。

use crate::config::{BASE_SHELL, VGA_PHYS};
use crate::driver::ps2_keyboard::KeyboardState;
use crate::driver::rtc::RtcClock;
use crate::error::Result;
use crate::fs::BootFs;
use crate::hal::Hal;
use crate::mem::paging::AddressSpace;
use crate::task::{Launch, Pid, Process, ProcessTable, SavedContext, Scheduler};
use crate::terminal::TerminalTable;
use x86_64::PhysAddr;

/// カーネルの状態
pub struct Kernel<'fs, H> {
    pub(crate) hal: H,
    pub(crate) space: AddressSpace,
    pub(crate) procs: ProcessTable,
    pub(crate) terms: TerminalTable,
    pub(crate) fs: BootFs<'fs>,
    pub(crate) keyboard: KeyboardState,
    pub(crate) rtc: RtcClock,
    pub(crate) scheduler: Scheduler,
    /// CPU上で動いている（または最後に動いた）プロセス
    pub(crate) current: Option<Pid>,
}

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// ファイルシステムイメージからカーネルを組み立てる
    pub fn new(hal: H, image: &'fs [u8]) -> Result<Self> {
        let fs = BootFs::new(image)?;
        let mut kernel = Self {
            hal,
            space: AddressSpace::new(),
            procs: ProcessTable::new(),
            terms: TerminalTable::new(),
            fs,
            keyboard: KeyboardState::new(),
            rtc: RtcClock::new(),
            scheduler: Scheduler::new(),
            current: None,
        };
        kernel.init_screens()?;
        crate::info!("Boot file system: {} entries", fs.len());
        Ok(kernel)
    }

    /// 前面の端末でベースシェルを起動し、スケジューラを有効にする
    pub fn start(&mut self) -> Result<Launch> {
        let fg = self.terms.foreground();
        self.terms.get_mut(fg).running = true;
        self.space
            .set_video_window(&mut self.hal, PhysAddr::new(VGA_PHYS));
        let launch = self.launch(BASE_SHELL, b"", fg, None, None)?;
        self.scheduler.enable();
        Ok(launch)
    }

    /// `pid`を現在のプロセスにする
    ///
    /// ユーザー窓・ビデオ窓・カーネルスタックをそのプロセスに合わせる
    pub(crate) fn activate(&mut self, pid: Pid) {
        self.space.set_process_window(&mut self.hal, pid);
        let video = match self.procs.get(pid) {
            Some(process) => self.terms.video_target(process.terminal()),
            None => PhysAddr::new(VGA_PHYS),
        };
        self.space.set_video_window(&mut self.hal, video);
        let top = self.procs.kernel_stack_top(pid);
        self.hal.set_kernel_stack(top);
        self.current = Some(pid);
    }

    /// 現在のプロセス
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.procs.get(pid)
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn terminals(&self) -> &TerminalTable {
        &self.terms
    }

    /// プロセスの保存コンテキストへの生ポインタ
    ///
    /// ロックを離した後の切替に使う。スロットが空いていればNone。
    pub fn context_ptr(&mut self, pid: Pid) -> Option<*mut SavedContext> {
        self.procs.context_ptr(pid)
    }
}

#[cfg(target_os = "none")]
mod global {
    use super::Kernel;
    use crate::driver::ps2_keyboard::KEYBOARD_IRQ;
    use crate::driver::rtc::{self, RTC_IRQ};
    use crate::hal::{Hal, X86Hal};
    use crate::interrupt::{self, CASCADE_IRQ, TIMER_IRQ};
    use crate::mem::{self, paging};
    use crate::task::{usermode, Launch};
    use crate::util::log::{self, LogLevel};
    use crate::{BootInfo, Result};
    use spin::{Mutex, Once};
    use x86_64::instructions::interrupts;

    static KERNEL: Once<Mutex<Kernel<'static, X86Hal>>> = Once::new();

    /// 割り込みを禁止してカーネル状態を操作する
    ///
    /// 初期化前ならNone
    pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel<'static, X86Hal>) -> R) -> Option<R> {
        interrupts::without_interrupts(|| KERNEL.get().map(|kernel| f(&mut kernel.lock())))
    }

    /// ロックが取れた場合だけ操作する（例外ハンドラ用）
    pub fn try_with_kernel<R>(f: impl FnOnce(&mut Kernel<'static, X86Hal>) -> R) -> Option<R> {
        interrupts::without_interrupts(|| {
            let kernel = KERNEL.get()?;
            let mut guard = kernel.try_lock()?;
            Some(f(&mut guard))
        })
    }

    /// カーネルエントリポイント
    #[no_mangle]
    pub extern "C" fn kernel_entry(boot_info: &'static BootInfo) -> ! {
        interrupts::disable();
        crate::util::console::init();
        log::set_level(LogLevel::from_u8(boot_info.log_level));
        crate::info!("termos starting");

        mem::init();
        interrupt::init();

        let launch = match boot(boot_info) {
            Ok(launch) => launch,
            Err(e) if e.is_fatal() => {
                crate::error!("Boot image is unusable: {}", e);
                halt_forever();
            }
            Err(e) => {
                crate::error!("Boot failed: {}", e);
                halt_forever();
            }
        };

        // ブート文脈は保存しない
        unsafe {
            usermode::enter(&launch, core::ptr::null_mut());
        }
        crate::error!("Boot context resumed unexpectedly");
        halt_forever();
    }

    fn boot(boot_info: &'static BootInfo) -> Result<Launch> {
        // SAFETY: ローダーが渡したイメージはカーネルの生存中ずっと有効
        let image = unsafe {
            core::slice::from_raw_parts(
                boot_info.fs_image_addr as *const u8,
                boot_info.fs_image_len,
            )
        };
        let mut kernel = Kernel::new(X86Hal, image)?;
        paging::activate(kernel.address_space());

        rtc::init_hardware();
        interrupt::timer::init_pit();
        for irq in [TIMER_IRQ, KEYBOARD_IRQ, CASCADE_IRQ, RTC_IRQ] {
            kernel.hal_mut().set_irq_enabled(irq, true);
        }

        let launch = kernel.start()?;
        KERNEL.call_once(|| Mutex::new(kernel));
        Ok(launch)
    }

    /// システムを無限ループで停止
    pub fn halt_forever() -> ! {
        loop {
            interrupts::disable();
            x86_64::instructions::hlt();
        }
    }
}

#[cfg(target_os = "none")]
pub use global::{halt_forever, kernel_entry, try_with_kernel, with_kernel};
