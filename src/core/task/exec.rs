//! プログラムの起動と終了
//!
//! execute はコマンドラインを解釈して実行ファイルをプロセス窓に読み込み、
//! ユーザーモードへ入るための [`Launch`] を返す。実際のレジスタ切替は呼び出し側が行う。

use super::{ExitStatus, HaltOutcome, Launch, Pid};
use crate::config::{
    BASE_SHELL, ENTRY_POINT_OFFSET, MAX_ARG_LEN, MAX_NAME_LEN, PROGRAM_LOAD_ADDR, USER_STACK_TOP,
    USER_WINDOW_BASE, USER_WINDOW_SIZE,
};
use crate::error::{FsError, ProcessError, Result};
use crate::fs::FileType;
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::mem::paging::process_window_phys;
use crate::terminal::TermId;

use super::process::{Args, Process};

/// 実行ファイルのマジックナンバー
const EXECUTABLE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// 確認のために読むヘッダの長さ（エントリポイントまで）
const HEADER_LEN: usize = ENTRY_POINT_OFFSET + 4;

/// 解釈済みのコマンドライン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    /// プログラム名
    pub name: &'a [u8],
    /// 引数文字列（前後の空白を除いたもの）
    pub args: &'a [u8],
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != b'\n')
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// コマンドラインをプログラム名と引数に分ける
///
/// NULで打ち切り、先頭の空白を飛ばす。名前は32バイトまで、引数は127バイトまで。
pub fn parse_command(line: &[u8]) -> Result<Command<'_>> {
    let line = match line.iter().position(|&b| b == 0) {
        Some(end) => &line[..end],
        None => line,
    };
    let line = trim_start(line);
    let name_end = line
        .iter()
        .position(|&b| b == b' ' || b == b'\n')
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ProcessError::BadCommand.into());
    }

    let args = trim_end(trim_start(&line[name_end..]));
    if args.len() >= MAX_ARG_LEN {
        return Err(ProcessError::BadCommand.into());
    }
    Ok(Command { name, args })
}

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// コマンドを起動する
    ///
    /// 呼び出し元がいれば同じ端末に、いなければ前面の端末に属する。
    /// 端末で最初のプロセスには親がない（ベースシェル）。
    pub fn execute(&mut self, line: &[u8]) -> Result<Launch> {
        let command = parse_command(line)?;
        let (terminal, parent) = match self.current.and_then(|pid| self.procs.get(pid)) {
            Some(caller) => {
                let terminal = caller.terminal();
                let parent = if self.terms.get(terminal).attached == 0 {
                    None
                } else {
                    Some(caller.pid())
                };
                (terminal, parent)
            }
            None => (self.terms.foreground(), None),
        };
        self.launch(command.name, command.args, terminal, parent, self.current)
    }

    /// 実行ファイルを検証して読み込み、新しいプロセスを現在のプロセスにする
    ///
    /// 失敗した場合はpidも端末の状態も変わらない
    pub(crate) fn launch(
        &mut self,
        name: &[u8],
        args: &[u8],
        terminal: TermId,
        parent: Option<Pid>,
        save_into: Option<Pid>,
    ) -> Result<Launch> {
        let dentry = self.fs.lookup_by_name(name)?;
        if dentry.kind != FileType::Regular {
            return Err(FsError::NotRegularFile.into());
        }

        let mut header = [0u8; HEADER_LEN];
        let read = self.fs.read(dentry.inode, 0, &mut header)?;
        if read < HEADER_LEN || header[..4] != EXECUTABLE_MAGIC {
            return Err(ProcessError::BadExecutable.into());
        }
        let size = self.fs.size_of(dentry.inode)? as usize;
        if size as u64 > USER_WINDOW_BASE + USER_WINDOW_SIZE - PROGRAM_LOAD_ADDR {
            return Err(ProcessError::BadExecutable.into());
        }
        let args = Args::new(args).ok_or(ProcessError::BadCommand)?;
        let pid = self
            .procs
            .free_slot()
            .ok_or(ProcessError::MaxProcessesReached)?;

        self.space.set_process_window(&mut self.hal, pid);
        if let Err(e) = self.load_image(pid, dentry.inode, size) {
            if let Some(previous) = self.current {
                self.space.set_process_window(&mut self.hal, previous);
            }
            return Err(e);
        }

        let mut entry = [0u8; 4];
        entry.copy_from_slice(&header[ENTRY_POINT_OFFSET..HEADER_LEN]);
        let entry = u64::from(u32::from_le_bytes(entry));

        self.procs.insert(Process::new(pid, parent, terminal, args));
        let term = self.terms.get_mut(terminal);
        term.pid = Some(pid);
        term.attached += 1;
        self.activate(pid);

        crate::info!(
            "Started pid {} on terminal {} (entry {:#x}, parent {:?})",
            pid,
            terminal,
            entry,
            parent
        );
        Ok(Launch {
            pid,
            entry,
            user_stack: USER_STACK_TOP,
            kernel_stack: self.procs.kernel_stack_top(pid),
            save_into,
        })
    }

    /// ファイル全体を`pid`の窓のロードアドレスへコピーする
    fn load_image(&mut self, pid: Pid, inode: u32, size: usize) -> Result<()> {
        let base = process_window_phys(pid) + (PROGRAM_LOAD_ADDR - USER_WINDOW_BASE);
        let dst = self.hal.phys_mut(base, size)?;
        if self.fs.read(inode, 0, dst)? != size {
            return Err(FsError::Corrupted.into());
        }
        Ok(())
    }

    /// 現在のプロセスを終了する
    ///
    /// 親がいれば親を現在のプロセスに戻し、いなければ同じ端末でシェルを起動し直す
    pub fn halt(&mut self, status: ExitStatus) -> Result<HaltOutcome> {
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let mut process = self.procs.remove(pid).ok_or(ProcessError::InvalidPid)?;
        let closed = process.files.close_all();
        let terminal = process.terminal();
        let term = self.terms.get_mut(terminal);
        term.attached = term.attached.saturating_sub(1);
        crate::debug!(
            "pid {} halted with {} ({} files closed)",
            pid,
            status.code(),
            closed
        );

        match process.parent() {
            Some(parent) => {
                self.terms.get_mut(terminal).pid = Some(parent);
                self.activate(parent);
                self.console_write(terminal, b"\n")?;
                Ok(HaltOutcome::Resume {
                    parent,
                    status: status.code(),
                })
            }
            None => {
                self.terms.get_mut(terminal).pid = None;
                self.current = None;
                self.clear_terminal(terminal)?;
                crate::info!("Base shell on terminal {} exited, restarting", terminal);
                let launch = self.launch(BASE_SHELL, b"", terminal, None, None)?;
                Ok(HaltOutcome::Respawn(launch))
            }
        }
    }

    /// 現在のプロセスの引数をNUL終端付きで`buf`へコピーする
    pub fn getargs(&self, buf: &mut [u8]) -> Result<()> {
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let args = self
            .procs
            .get(pid)
            .ok_or(ProcessError::InvalidPid)?
            .args()
            .as_bytes();
        if args.is_empty() || args.len() >= buf.len() {
            return Err(ProcessError::NoArguments.into());
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()..].fill(0);
        Ok(())
    }

    /// CPU例外を現在のプロセスの強制終了に変える
    ///
    /// プロセスがなければNone（呼び出し側で停止する）
    pub fn on_exception(&mut self, name: &str) -> Option<HaltOutcome> {
        let pid = self.current?;
        let terminal = self.procs.get(pid)?.terminal();
        crate::error!("{} in pid {}", name, pid);
        if let Err(e) = self.console_write(terminal, name.as_bytes()) {
            crate::warn!("Failed to report exception: {}", e);
        }
        match self.halt(ExitStatus::Faulted) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                crate::error!("Failed to halt faulted pid {}: {}", pid, e);
                None
            }
        }
    }
}
