//! ユーザーポインタの検証とコピー
//!
//! システムコールに渡されたアドレスは現在のページテーブルで辿り、
//! ユーザーからアクセスできるページだけを読み書きする。

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, MemoryError};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::Result;
use x86_64::VirtAddr;

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// `[addr, addr + len)`をページ単位に分け、各断片に`f`を適用する
    fn for_each_user_chunk(
        &mut self,
        addr: u64,
        len: usize,
        mut f: impl FnMut(&mut [u8], usize),
    ) -> Result<()> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(KernelError::Memory(MemoryError::InvalidAddress))?;
        let mut cursor = addr;
        while cursor < end {
            let page_end = (cursor / PAGE_SIZE + 1) * PAGE_SIZE;
            let chunk = (page_end.min(end) - cursor) as usize;
            let virt = VirtAddr::try_new(cursor)
                .map_err(|_| KernelError::Memory(MemoryError::InvalidAddress))?;
            let phys = self
                .space
                .translate(virt, true)
                .ok_or(KernelError::Memory(MemoryError::NotMapped))?;
            let bytes = self.hal.phys_mut(phys, chunk)?;
            f(bytes, (cursor - addr) as usize);
            cursor += chunk as u64;
        }
        Ok(())
    }

    /// 事前に範囲全体を検証する
    pub(crate) fn check_user_range(&mut self, addr: u64, len: usize) -> Result<()> {
        self.for_each_user_chunk(addr, len, |_, _| {})
    }

    /// ユーザー空間から`out`へコピー
    pub fn copy_from_user(&mut self, addr: u64, out: &mut [u8]) -> Result<()> {
        self.check_user_range(addr, out.len())?;
        self.for_each_user_chunk(addr, out.len(), |bytes, at| {
            out[at..at + bytes.len()].copy_from_slice(bytes);
        })
    }

    /// `data`をユーザー空間へコピー
    ///
    /// 範囲の一部でも不正なら1バイトも書き込まない
    pub fn copy_to_user(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.check_user_range(addr, data.len())?;
        self.for_each_user_chunk(addr, data.len(), |bytes, at| {
            bytes.copy_from_slice(&data[at..at + bytes.len()]);
        })
    }

    /// NUL終端文字列を`out`に読み込み、NULを除いた長さを返す
    ///
    /// `out`に収まる範囲でNULが見つからなければエラー
    pub fn read_user_cstr(&mut self, addr: u64, out: &mut [u8]) -> Result<usize> {
        for i in 0..out.len() {
            let mut byte = [0u8; 1];
            self.copy_from_user(addr.saturating_add(i as u64), &mut byte)?;
            if byte[0] == 0 {
                return Ok(i);
            }
            out[i] = byte[0];
        }
        Err(KernelError::InvalidParam)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{USER_WINDOW_BASE, USER_WINDOW_SIZE, VGA_PHYS, VIDEO_WINDOW_BASE};
    use crate::error::{KernelError, MemoryError};
    use crate::testing::{booted, sample_image};

    #[test]
    fn test_copy_round_trip_across_page_boundary() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let addr = USER_WINDOW_BASE + 0x1FFE;
        kernel.copy_to_user(addr, b"abcdef").unwrap();

        let mut out = [0u8; 6];
        kernel.copy_from_user(addr, &mut out).unwrap();
        assert_eq!(&out, b"abcdef");
    }

    #[test]
    fn test_rejects_kernel_and_null_addresses() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let mut out = [0u8; 4];
        assert_eq!(
            kernel.copy_from_user(0, &mut out),
            Err(KernelError::Memory(MemoryError::NotMapped))
        );
        assert!(kernel.copy_to_user(0x10_0000, b"x").is_err());
        assert!(kernel.copy_from_user(u64::MAX - 1, &mut out).is_err());
    }

    #[test]
    fn test_partial_overlap_writes_nothing() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let last = USER_WINDOW_BASE + USER_WINDOW_SIZE - 2;
        assert!(kernel.copy_to_user(last, b"abcd").is_err());

        let mut out = [0u8; 2];
        kernel.copy_from_user(last, &mut out).unwrap();
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_video_page_only_after_vidmap() {
        let image = sample_image();
        let mut kernel = booted(&image);
        assert!(kernel.copy_to_user(VIDEO_WINDOW_BASE, b"Z").is_err());

        kernel.space.map_user_video(&mut kernel.hal);
        kernel.copy_to_user(VIDEO_WINDOW_BASE, b"Z").unwrap();
        assert_eq!(kernel.hal_mut().peek(VGA_PHYS, 1), b"Z");
    }

    #[test]
    fn test_read_user_cstr() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let addr = USER_WINDOW_BASE + 0x100;
        kernel.copy_to_user(addr, b"ls -l\0junk").unwrap();

        let mut out = [0u8; 16];
        let len = kernel.read_user_cstr(addr, &mut out).unwrap();
        assert_eq!(&out[..len], b"ls -l");

        let mut short = [0u8; 3];
        assert_eq!(
            kernel.read_user_cstr(addr, &mut short),
            Err(KernelError::InvalidParam)
        );
    }
}
