use crate::config::{KERNEL_STACK_SIZE, MAX_ARG_LEN, MAX_PROCESSES};
use crate::io::FdTable;
use crate::terminal::TermId;
use alloc::boxed::Box;
use alloc::vec;
use x86_64::VirtAddr;

use super::context::SavedContext;

/// プロセスID（プロセススロットの番号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(usize);

impl Pid {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// コマンドライン引数のコピー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args {
    buf: [u8; MAX_ARG_LEN],
    len: usize,
}

impl Args {
    pub const fn empty() -> Self {
        Self {
            buf: [0; MAX_ARG_LEN],
            len: 0,
        }
    }

    /// 終端NULの分を残して収まる場合のみ作成
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= MAX_ARG_LEN {
            return None;
        }
        let mut args = Self::empty();
        args.buf[..bytes.len()].copy_from_slice(bytes);
        args.len = bytes.len();
        Some(args)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// プロセス制御ブロック
pub struct Process {
    /// プロセスID
    pid: Pid,
    /// 親プロセス（端末のベースシェルはNone）
    parent: Option<Pid>,
    /// 所属する端末
    terminal: TermId,
    /// ファイルディスクリプタ表
    pub files: FdTable,
    /// 引数
    args: Args,
    /// 実行していない間の保存コンテキスト
    pub context: SavedContext,
}

impl Process {
    pub fn new(pid: Pid, parent: Option<Pid>, terminal: TermId, args: Args) -> Self {
        Self {
            pid,
            parent,
            terminal,
            files: FdTable::with_console(),
            args,
            context: SavedContext::new(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn terminal(&self) -> TermId {
        self.terminal
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("terminal", &self.terminal)
            .field("args", &core::str::from_utf8(self.args.as_bytes()).unwrap_or("???"))
            .finish()
    }
}

/// 1プロセス分のスロット（PCBとカーネルスタック）
struct ProcessSlot {
    process: Option<Process>,
    kernel_stack: Box<[u8]>,
}

/// プロセステーブル
///
/// pidで直接引ける固定長のアリーナ。スロットが埋まっていれば生存中。
pub struct ProcessTable {
    slots: [ProcessSlot; MAX_PROCESSES],
}

impl ProcessTable {
    /// カーネルスタックを確保してテーブルを作成
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| ProcessSlot {
                process: None,
                kernel_stack: vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice(),
            }),
        }
    }

    /// 最初の空きスロット
    pub fn free_slot(&self) -> Option<Pid> {
        self.slots
            .iter()
            .position(|slot| slot.process.is_none())
            .map(Pid::new)
    }

    /// プロセスをそのpidのスロットに置く
    pub fn insert(&mut self, process: Process) -> &mut Process {
        let slot = &mut self.slots[process.pid().index()];
        slot.process.insert(process)
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots.get(pid.index())?.process.as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.slots.get_mut(pid.index())?.process.as_mut()
    }

    /// スロットを解放する（カーネルスタックは次のプロセスが再利用する）
    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        self.slots.get_mut(pid.index())?.process.take()
    }

    /// 生存中のプロセス数
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.process.is_some()).count()
    }

    /// 生存中のpid一覧
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.process.is_some())
            .map(|(i, _)| Pid::new(i))
    }

    /// カーネルスタックの先頭（16バイト境界）
    pub fn kernel_stack_top(&self, pid: Pid) -> VirtAddr {
        let stack = &self.slots[pid.index()].kernel_stack;
        let end = stack.as_ptr() as u64 + stack.len() as u64;
        VirtAddr::new(end & !0xF)
    }

    /// 保存コンテキストへの生ポインタ
    ///
    /// ロックを手放した後のコンテキスト切替で使う
    pub fn context_ptr(&mut self, pid: Pid) -> Option<*mut SavedContext> {
        self.get_mut(pid).map(|p| &mut p.context as *mut SavedContext)
    }
}
