//! ファイルディスクリプタと操作テーブル
//!
//! ディスクリプタは種別 ([`FileKind`]) ごとに open/close/read/write を振り分ける。
//! 0番と1番はコンソール（端末）で、ユーザーからは閉じられない。

use crate::config::{FIRST_USER_FD, MAX_FILES, MAX_NAME_LEN};
use crate::driver::rtc::{VirtualRtc, RTC_IRQ};
use crate::error::{DeviceError, IoError, ProcessError, Result};
use crate::fs::FileType;
use crate::hal::Hal;
use crate::kernel::Kernel;

/// 標準入力
pub const STDIN: usize = 0;
/// 標準出力
pub const STDOUT: usize = 1;

/// 操作テーブルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Rtc,
    Directory,
    Regular,
    Console,
}

impl From<FileType> for FileKind {
    fn from(kind: FileType) -> Self {
        match kind {
            FileType::Rtc => FileKind::Rtc,
            FileType::Directory => FileKind::Directory,
            FileType::Regular => FileKind::Regular,
        }
    }
}

/// 使用中のファイルディスクリプタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    /// 操作テーブル
    pub kind: FileKind,
    /// inode（通常ファイルのみ）
    pub inode: Option<u32>,
    /// 読み出し位置（ディレクトリではエントリ番号）
    pub offset: u32,
    /// RTCの仮想周波数
    pub rtc: Option<VirtualRtc>,
}

impl FileDescriptor {
    pub const fn console() -> Self {
        Self {
            kind: FileKind::Console,
            inode: None,
            offset: 0,
            rtc: None,
        }
    }

    /// 種別ごとの後始末をして閉じる
    ///
    /// どの種別も保持している資源はなく、閉じる操作は常に成功する
    pub fn close(self) -> Result<()> {
        match self.kind {
            FileKind::Rtc => {
                crate::trace!("RTC closed at {:?}", self.rtc);
                Ok(())
            }
            FileKind::Directory | FileKind::Regular => Ok(()),
            FileKind::Console => Ok(()),
        }
    }
}

/// プロセスごとのディスクリプタ表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdTable {
    slots: [Option<FileDescriptor>; MAX_FILES],
}

impl FdTable {
    /// すべて空の表
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_FILES],
        }
    }

    /// 0/1にコンソールを開いた表
    pub fn with_console() -> Self {
        let mut table = Self::new();
        table.slots[STDIN] = Some(FileDescriptor::console());
        table.slots[STDOUT] = Some(FileDescriptor::console());
        table
    }

    pub fn get(&self, fd: usize) -> Option<&FileDescriptor> {
        self.slots.get(fd)?.as_ref()
    }

    pub fn get_mut(&mut self, fd: usize) -> Option<&mut FileDescriptor> {
        self.slots.get_mut(fd)?.as_mut()
    }

    /// ユーザー用の最初の空きディスクリプタ
    pub fn free_slot(&self) -> Option<usize> {
        (FIRST_USER_FD..MAX_FILES).find(|&fd| self.slots[fd].is_none())
    }

    pub fn install(&mut self, fd: usize, desc: FileDescriptor) {
        self.slots[fd] = Some(desc);
    }

    pub fn take(&mut self, fd: usize) -> Option<FileDescriptor> {
        self.slots.get_mut(fd)?.take()
    }

    /// 使用中のディスクリプタ数
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// 0/1を含むすべてのディスクリプタを種別ごとの`close`で閉じる
    ///
    /// 閉じたユーザーディスクリプタの数を返す
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            let Some(desc) = slot.take() else { continue };
            if let Err(e) = desc.close() {
                crate::warn!("Closing fd {} failed: {}", fd, e);
            }
            if fd >= FIRST_USER_FD {
                closed += 1;
            }
        }
        closed
    }
}

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// 名前でファイルを開き、ディスクリプタ番号を返す
    pub fn open(&mut self, name: &[u8]) -> Result<usize> {
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let fd = self
            .procs
            .get(pid)
            .ok_or(ProcessError::InvalidPid)?
            .files
            .free_slot()
            .ok_or(IoError::NoFreeDescriptor)?;
        let dentry = self.fs.lookup_by_name(name)?;

        let kind = FileKind::from(dentry.kind);
        let desc = FileDescriptor {
            kind,
            inode: (kind == FileKind::Regular).then_some(dentry.inode),
            offset: 0,
            rtc: (kind == FileKind::Rtc).then(|| VirtualRtc::open(self.rtc.now())),
        };
        self.procs
            .get_mut(pid)
            .ok_or(ProcessError::InvalidPid)?
            .files
            .install(fd, desc);
        Ok(fd)
    }

    /// ディスクリプタを閉じる
    pub fn close(&mut self, fd: usize) -> Result<()> {
        if fd < FIRST_USER_FD {
            return Err(IoError::BadDescriptor.into());
        }
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let files = &mut self.procs.get_mut(pid).ok_or(ProcessError::InvalidPid)?.files;
        files.take(fd).ok_or(IoError::BadDescriptor)?.close()
    }

    /// ディスクリプタから読む
    ///
    /// 入力待ちの場合は`DeviceError::Busy`を返す
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        if fd == STDOUT {
            return Err(IoError::BadDescriptor.into());
        }
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let process = self.procs.get_mut(pid).ok_or(ProcessError::InvalidPid)?;
        let terminal = process.terminal();
        let desc = process.files.get_mut(fd).ok_or(IoError::BadDescriptor)?;

        let kind = desc.kind;
        match kind {
            FileKind::Regular => {
                let inode = desc.inode.ok_or(IoError::BadDescriptor)?;
                let n = self.fs.read(inode, desc.offset, buf)?;
                desc.offset += n as u32;
                Ok(n)
            }
            FileKind::Directory => {
                let index = desc.offset as usize;
                if index >= self.fs.len() {
                    return Ok(0);
                }
                let dentry = self.fs.lookup_by_index(index)?;
                desc.offset += 1;
                let name = dentry.name();
                let n = name.len().min(buf.len()).min(MAX_NAME_LEN);
                buf[..n].copy_from_slice(&name[..n]);
                Ok(n)
            }
            FileKind::Rtc => {
                let now = self.rtc.now();
                desc.rtc.as_mut().ok_or(IoError::BadDescriptor)?.poll(now)
            }
            FileKind::Console => self.console_read(terminal, buf),
        }
    }

    /// ディスクリプタへ書く
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
        if fd == STDIN {
            return Err(IoError::BadDescriptor.into());
        }
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        let process = self.procs.get_mut(pid).ok_or(ProcessError::InvalidPid)?;
        let terminal = process.terminal();
        let desc = process.files.get_mut(fd).ok_or(IoError::BadDescriptor)?;

        let kind = desc.kind;
        match kind {
            FileKind::Console => self.console_write(terminal, buf),
            FileKind::Rtc => {
                desc.rtc
                    .as_mut()
                    .ok_or(IoError::BadDescriptor)?
                    .set_frequency(buf)?;
                Ok(0)
            }
            FileKind::Regular | FileKind::Directory => Err(DeviceError::InvalidOperation.into()),
        }
    }

    /// 現在のプロセスの`fd`の種類
    pub(crate) fn file_kind(&self, fd: usize) -> Option<FileKind> {
        self.current
            .and_then(|pid| self.procs.get(pid))
            .and_then(|p| p.files.get(fd))
            .map(|d| d.kind)
    }

    /// RTC割り込み
    pub fn on_rtc_tick(&mut self) {
        self.hal.end_of_interrupt(RTC_IRQ);
        self.rtc.tick();
    }
}
