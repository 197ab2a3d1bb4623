//! 仮想端末
//!
//! 3つの端末が1枚のビデオメモリを共有する。前面の端末の内容は本物のビデオメモリにあり、
//! 背面の端末は専用の4 KiBバッファに描画される。
//! キーボード入力は常に前面の端末の行バッファに入る。

pub mod screen;

use crate::config::{
    BASE_SHELL, INPUT_BUFFER_SIZE, PAGE_SIZE, SCREEN_BYTES, TERMINAL_BUFFER_BASE, TERMINAL_COUNT,
    VGA_PHYS,
};
use crate::driver::ps2_keyboard::{KeyEvent, KEYBOARD_IRQ};
use crate::error::{DeviceError, KernelError, Result};
use crate::hal::{copy_phys, Hal};
use crate::kernel::Kernel;
use crate::task::{Launch, Pid};
use x86_64::PhysAddr;

pub use screen::{Cursor, Screen};

/// 端末ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TermId(usize);

impl TermId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    fn is_valid(self) -> bool {
        self.0 < TERMINAL_COUNT
    }
}

impl core::fmt::Display for TermId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// キーボード入力の行バッファ
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: [u8; INPUT_BUFFER_SIZE],
    len: usize,
    entered: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; INPUT_BUFFER_SIZE],
            len: 0,
            entered: false,
        }
    }

    /// 文字を追加する（改行用に最後の1バイトは残す）
    pub fn push(&mut self, ch: u8) -> bool {
        if self.len >= INPUT_BUFFER_SIZE - 1 {
            return false;
        }
        self.buf[self.len] = ch;
        self.len += 1;
        true
    }

    /// 改行を追加して行を確定する
    pub fn push_newline(&mut self) {
        if self.len < INPUT_BUFFER_SIZE {
            self.buf[self.len] = b'\n';
            self.len += 1;
        }
        self.entered = true;
    }

    /// 最後の文字を取り除く（確定済みの改行は消さない）
    pub fn pop(&mut self) -> bool {
        if self.len == 0 || self.buf[self.len - 1] == b'\n' {
            return false;
        }
        self.len -= 1;
        self.buf[self.len] = 0;
        true
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 確定した行を`out`へ取り出し、バッファを空にする
    ///
    /// 最大127バイトをコピーし、改行はNULに置き換える。改行より前のバイト数を返す。
    pub fn take_line(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(INPUT_BUFFER_SIZE - 1);
        out[..n].copy_from_slice(&self.buf[..n]);
        let count = match out[..n].iter().position(|&b| b == b'\n') {
            Some(newline) => {
                out[newline] = 0;
                newline
            }
            None => n,
        };
        self.clear();
        count
    }

    pub fn clear(&mut self) {
        self.buf = [0; INPUT_BUFFER_SIZE];
        self.len = 0;
        self.entered = false;
    }
}

/// 端末の状態
#[derive(Debug)]
pub struct Terminal {
    id: TermId,
    /// シェルが起動済みかどうか
    pub(crate) running: bool,
    /// この端末で最後に動いているプロセス
    pub(crate) pid: Option<Pid>,
    /// この端末に属するプロセス数
    pub(crate) attached: usize,
    pub(crate) cursor: Cursor,
    pub(crate) input: LineBuffer,
}

impl Terminal {
    fn new(id: TermId) -> Self {
        Self {
            id,
            running: false,
            pid: None,
            attached: 0,
            cursor: Cursor::default(),
            input: LineBuffer::new(),
        }
    }

    pub fn id(&self) -> TermId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn attached(&self) -> usize {
        self.attached
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn input(&self) -> &LineBuffer {
        &self.input
    }

    /// 背面にいる間の描画先
    pub fn buffer(&self) -> PhysAddr {
        PhysAddr::new(TERMINAL_BUFFER_BASE + self.id.index() as u64 * PAGE_SIZE)
    }
}

/// 全端末と前面端末の管理
#[derive(Debug)]
pub struct TerminalTable {
    terminals: [Terminal; TERMINAL_COUNT],
    foreground: TermId,
}

impl TerminalTable {
    pub fn new() -> Self {
        Self {
            terminals: core::array::from_fn(|i| Terminal::new(TermId::new(i))),
            foreground: TermId::new(0),
        }
    }

    pub fn get(&self, id: TermId) -> &Terminal {
        &self.terminals[id.index()]
    }

    pub fn get_mut(&mut self, id: TermId) -> &mut Terminal {
        &mut self.terminals[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Terminal> {
        self.terminals.iter()
    }

    pub fn foreground(&self) -> TermId {
        self.foreground
    }

    /// 起動済みの端末数
    pub fn running_count(&self) -> usize {
        self.terminals.iter().filter(|t| t.running).count()
    }

    /// `from`の次（循環）でプロセスが動いている端末
    ///
    /// 他に無ければ`from`自身を返す
    pub fn next_running_after(&self, from: TermId) -> Option<TermId> {
        (1..=TERMINAL_COUNT)
            .map(|step| TermId::new((from.index() + step) % TERMINAL_COUNT))
            .find(|&id| {
                let term = self.get(id);
                term.running && term.pid.is_some()
            })
    }

    /// 端末`id`のビデオ窓が指すべき物理アドレス
    pub fn video_target(&self, id: TermId) -> PhysAddr {
        if id == self.foreground {
            PhysAddr::new(VGA_PHYS)
        } else {
            self.get(id).buffer()
        }
    }
}

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// 全端末の画面を空白で初期化する
    pub(crate) fn init_screens(&mut self) -> Result<()> {
        screen::blank(self.hal.phys_mut(PhysAddr::new(VGA_PHYS), SCREEN_BYTES)?);
        for term in self.terms.iter() {
            screen::blank(self.hal.phys_mut(term.buffer(), SCREEN_BYTES)?);
        }
        self.hal.set_cursor(0);
        Ok(())
    }

    /// 端末の現在の描画先に対して`f`を実行する
    fn with_screen<R>(&mut self, id: TermId, f: impl FnOnce(&mut Screen<'_>) -> R) -> Result<R> {
        let foreground = id == self.terms.foreground();
        let target = self.terms.video_target(id);
        let term = self.terms.get_mut(id);
        let cells = self.hal.phys_mut(target, SCREEN_BYTES)?;
        let mut screen = Screen::new(cells, &mut term.cursor);
        let result = f(&mut screen);
        let position = screen.cursor_offset();
        if foreground {
            self.hal.set_cursor(position);
        }
        Ok(result)
    }

    /// 端末へ書き込む（NULは飛ばす）
    pub fn console_write(&mut self, id: TermId, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() || !id.is_valid() {
            return Err(KernelError::InvalidParam);
        }
        self.with_screen(id, |screen| screen.write_bytes(bytes))
    }

    /// 確定した入力行を読む
    ///
    /// 行が確定するまで`DeviceError::Busy`を返す
    pub fn console_read(&mut self, id: TermId, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() || !id.is_valid() {
            return Err(KernelError::InvalidParam);
        }
        let input = &mut self.terms.get_mut(id).input;
        if !input.is_entered() {
            return Err(DeviceError::Busy.into());
        }
        Ok(input.take_line(out))
    }

    /// 端末の画面をクリア
    pub fn clear_terminal(&mut self, id: TermId) -> Result<()> {
        self.with_screen(id, |screen| screen.clear())
    }

    /// 前面の端末を切り替える
    ///
    /// 初めて前面に出た端末ではベースシェルを起動し、その`Launch`を返す
    pub fn switch_foreground(&mut self, target: TermId) -> Result<Option<Launch>> {
        if !target.is_valid() {
            return Err(KernelError::InvalidParam);
        }
        let from = self.terms.foreground();
        if from == target {
            return Ok(None);
        }

        let vga = PhysAddr::new(VGA_PHYS);
        copy_phys(&mut self.hal, self.terms.get(from).buffer(), vga, SCREEN_BYTES)?;
        copy_phys(&mut self.hal, vga, self.terms.get(target).buffer(), SCREEN_BYTES)?;
        self.terms.foreground = target;
        let position = self.terms.get(target).cursor.offset() as u16;
        self.hal.set_cursor(position);
        crate::debug!("Foreground terminal {} -> {}", from, target);

        if self.terms.get(target).running {
            self.refresh_video_window();
            return Ok(None);
        }

        self.terms.get_mut(target).running = true;
        self.space.set_video_window(&mut self.hal, vga);
        match self.launch(BASE_SHELL, b"", target, None, self.current) {
            Ok(launch) => {
                crate::info!("Started shell on terminal {} as pid {}", target, launch.pid);
                Ok(Some(launch))
            }
            Err(e) => {
                crate::warn!("Failed to start shell on terminal {}: {}", target, e);
                self.terms.get_mut(target).running = false;
                // targetのバッファは書き換えていない
                copy_phys(&mut self.hal, vga, self.terms.get(from).buffer(), SCREEN_BYTES)?;
                self.terms.foreground = from;
                let position = self.terms.get(from).cursor.offset() as u16;
                self.hal.set_cursor(position);
                self.refresh_video_window();
                Err(e)
            }
        }
    }

    /// 現在のプロセスの端末に合わせてビデオ窓を向け直す
    pub(crate) fn refresh_video_window(&mut self) {
        let target = match self.current.and_then(|pid| self.procs.get(pid)) {
            Some(process) => self.terms.video_target(process.terminal()),
            None => PhysAddr::new(VGA_PHYS),
        };
        self.space.set_video_window(&mut self.hal, target);
    }

    /// キーイベントを前面の端末に適用する
    pub fn handle_key(&mut self, event: KeyEvent) -> Result<Option<Launch>> {
        let fg = self.terms.foreground();
        match event {
            KeyEvent::Char(ch) => self.echo_input(fg, ch)?,
            KeyEvent::Tab => {
                for _ in 0..4 {
                    self.echo_input(fg, b' ')?;
                }
            }
            KeyEvent::Enter => {
                self.terms.get_mut(fg).input.push_newline();
                self.with_screen(fg, |screen| screen.write_byte(b'\n'))?;
            }
            KeyEvent::Backspace => {
                if self.terms.get_mut(fg).input.pop() {
                    self.with_screen(fg, |screen| screen.backspace())?;
                }
            }
            KeyEvent::ClearScreen => self.clear_terminal(fg)?,
            KeyEvent::SwitchTerminal(target) => return self.switch_foreground(target),
        }
        Ok(None)
    }

    fn echo_input(&mut self, id: TermId, ch: u8) -> Result<()> {
        if self.terms.get_mut(id).input.push(ch) {
            self.with_screen(id, |screen| screen.write_byte(ch))?;
        }
        Ok(())
    }

    /// キーボード割り込み
    pub fn on_keyboard(&mut self, scancode: u8) -> Option<Launch> {
        self.hal.end_of_interrupt(KEYBOARD_IRQ);
        let event = self.keyboard.process(scancode)?;
        match self.handle_key(event) {
            Ok(launch) => launch,
            Err(e) if e.is_fatal() => {
                crate::error!("Key event {:?} failed: {}", event, e);
                None
            }
            Err(e) => {
                crate::warn!("Key event {:?} dropped: {}", event, e);
                None
            }
        }
    }
}
