//! ページング管理モジュール
//!
//! 下位1 GiBを2 MiBページでアイデンティティマップし、その中の2つの窓だけを
//! プロセス切替のたびに書き換える。
//! - ユーザー窓: 0x0800_0000 から 4 MiB（2 MiBエントリ×2）
//! - ビデオ窓: 0x08C0_0000 の4 KiB（専用ページテーブルの先頭エントリ）

use crate::config::{
    LARGE_PAGE_SIZE, PAGE_SIZE, PROCESS_PHYS_BASE, USER_WINDOW_BASE, USER_WINDOW_SIZE,
    VGA_PHYS, VIDEO_WINDOW_BASE,
};
use crate::hal::Hal;
use crate::task::Pid;
use alloc::boxed::Box;
use x86_64::structures::paging::{PageTable, PageTableFlags};
use x86_64::{PhysAddr, VirtAddr};

/// アイデンティティマップする範囲
const IDENTITY_LIMIT: u64 = 0x4000_0000;

const USER_WINDOW_INDEX: usize = (USER_WINDOW_BASE / LARGE_PAGE_SIZE) as usize;
const USER_WINDOW_ENTRIES: usize = (USER_WINDOW_SIZE / LARGE_PAGE_SIZE) as usize;
const VIDEO_WINDOW_INDEX: usize = (VIDEO_WINDOW_BASE / LARGE_PAGE_SIZE) as usize;

/// プロセスの物理窓の先頭
pub fn process_window_phys(pid: Pid) -> PhysAddr {
    PhysAddr::new(PROCESS_PHYS_BASE + pid.index() as u64 * USER_WINDOW_SIZE)
}

fn table_phys(table: &PageTable) -> PhysAddr {
    // ヒープは物理アドレスと同じ仮想アドレスに置かれている
    PhysAddr::new(table as *const PageTable as u64)
}

/// カーネル全体で1つのアドレス空間
pub struct AddressSpace {
    pml4: Box<PageTable>,
    pdpt: Box<PageTable>,
    pd: Box<PageTable>,
    video: Box<PageTable>,
    window: Option<Pid>,
    video_target: PhysAddr,
    video_user: bool,
}

impl AddressSpace {
    /// ページテーブルを構築する（CR3にはまだ載せない）
    pub fn new() -> Self {
        let mut space = Self {
            pml4: Box::new(PageTable::new()),
            pdpt: Box::new(PageTable::new()),
            pd: Box::new(PageTable::new()),
            video: Box::new(PageTable::new()),
            window: None,
            video_target: PhysAddr::new(VGA_PHYS),
            video_user: false,
        };

        let upper = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        let pdpt_phys = table_phys(&space.pdpt);
        let pd_phys = table_phys(&space.pd);
        space.pml4[0].set_addr(pdpt_phys, upper);
        space.pdpt[0].set_addr(pd_phys, upper);

        let kernel = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::HUGE_PAGE
            | PageTableFlags::GLOBAL;
        for (i, entry) in space.pd.iter_mut().enumerate() {
            entry.set_addr(PhysAddr::new(i as u64 * LARGE_PAGE_SIZE), kernel);
        }
        for i in 0..USER_WINDOW_ENTRIES {
            space.pd[USER_WINDOW_INDEX + i].set_unused();
        }

        let video_phys = table_phys(&space.video);
        space.pd[VIDEO_WINDOW_INDEX].set_addr(video_phys, PageTableFlags::PRESENT | PageTableFlags::WRITABLE);
        space.video[0].set_addr(
            PhysAddr::new(VGA_PHYS),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
        );
        space
    }

    /// CR3に載せるトップレベルテーブル
    pub fn root(&self) -> PhysAddr {
        table_phys(&self.pml4)
    }

    /// 現在ユーザー窓にマップされているプロセス
    pub fn window(&self) -> Option<Pid> {
        self.window
    }

    /// ビデオ窓の現在の行き先
    pub fn video_target(&self) -> PhysAddr {
        self.video_target
    }

    /// ユーザー窓を`pid`の物理窓に向ける
    pub fn set_process_window<H: Hal>(&mut self, hal: &mut H, pid: Pid) {
        let base = process_window_phys(pid);
        let flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE
            | PageTableFlags::HUGE_PAGE;
        for i in 0..USER_WINDOW_ENTRIES {
            self.pd[USER_WINDOW_INDEX + i].set_addr(base + i as u64 * LARGE_PAGE_SIZE, flags);
        }
        self.window = Some(pid);
        hal.flush_tlb();
    }

    /// ビデオ窓を本物のビデオメモリか端末の退避バッファに向ける
    pub fn set_video_window<H: Hal>(&mut self, hal: &mut H, target: PhysAddr) {
        let flags = self.video[0].flags();
        self.video[0].set_addr(target, flags);
        self.video_target = target;
        hal.flush_tlb();
    }

    /// ビデオ窓をユーザーから見えるようにし、その仮想アドレスを返す
    pub fn map_user_video<H: Hal>(&mut self, hal: &mut H) -> VirtAddr {
        if !self.video_user {
            let flags = self.pd[VIDEO_WINDOW_INDEX].flags() | PageTableFlags::USER_ACCESSIBLE;
            let addr = self.pd[VIDEO_WINDOW_INDEX].addr();
            self.pd[VIDEO_WINDOW_INDEX].set_addr(addr, flags);
            self.video_user = true;
            hal.flush_tlb();
        }
        VirtAddr::new(VIDEO_WINDOW_BASE)
    }

    /// ページテーブルをソフトウェアで辿る
    ///
    /// `user`が真ならユーザーからアクセスできるマッピングのみ有効
    pub fn translate(&self, addr: VirtAddr, user: bool) -> Option<PhysAddr> {
        let addr = addr.as_u64();
        if addr >= IDENTITY_LIMIT {
            return None;
        }
        let entry = &self.pd[(addr / LARGE_PAGE_SIZE) as usize];
        let flags = entry.flags();
        if !flags.contains(PageTableFlags::PRESENT) {
            return None;
        }
        if user && !flags.contains(PageTableFlags::USER_ACCESSIBLE) {
            return None;
        }
        if flags.contains(PageTableFlags::HUGE_PAGE) {
            return Some(entry.addr() + (addr % LARGE_PAGE_SIZE));
        }

        // 4 KiBテーブルを持つのはビデオ窓だけ
        if entry.addr() != table_phys(&self.video) {
            return None;
        }
        let leaf = &self.video[((addr % LARGE_PAGE_SIZE) / PAGE_SIZE) as usize];
        if !leaf.flags().contains(PageTableFlags::PRESENT) {
            return None;
        }
        Some(leaf.addr() + (addr % PAGE_SIZE))
    }
}

/// 構築したアドレス空間をCR3に載せる
#[cfg(target_os = "none")]
pub fn activate(space: &AddressSpace) {
    use x86_64::registers::control::{Cr3, Cr3Flags, Cr4, Cr4Flags};
    use x86_64::structures::paging::PhysFrame;

    crate::info!("Loading page tables at {:#x}", space.root().as_u64());
    unsafe {
        Cr4::update(|flags| flags.insert(Cr4Flags::PAGE_GLOBAL));
        Cr3::write(PhysFrame::containing_address(space.root()), Cr3Flags::empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TERMINAL_BUFFER_BASE;
    use crate::hal::mock::MockHal;

    #[test]
    fn test_kernel_memory_is_identity_mapped_supervisor_only() {
        let space = AddressSpace::new();
        let addr = VirtAddr::new(0x12_3456);
        assert_eq!(space.translate(addr, false), Some(PhysAddr::new(0x12_3456)));
        assert_eq!(space.translate(addr, true), None);
        assert_eq!(space.translate(VirtAddr::new(USER_WINDOW_BASE), false), None);
    }

    #[test]
    fn test_process_windows_are_isolated() {
        let mut hal = MockHal::new();
        let mut space = AddressSpace::new();
        let probe = VirtAddr::new(USER_WINDOW_BASE + 0x48000);

        for (pid, byte) in [(Pid::new(0), 0xAAu8), (Pid::new(1), 0xBB)] {
            space.set_process_window(&mut hal, pid);
            let phys = space.translate(probe, true).unwrap();
            hal.phys_mut(phys, 1).unwrap()[0] = byte;
        }

        space.set_process_window(&mut hal, Pid::new(0));
        let phys0 = space.translate(probe, true).unwrap();
        assert_eq!(phys0, process_window_phys(Pid::new(0)) + 0x48000u64);
        assert_eq!(hal.peek(phys0.as_u64(), 1), [0xAA]);

        space.set_process_window(&mut hal, Pid::new(1));
        let phys1 = space.translate(probe, true).unwrap();
        assert_ne!(phys0, phys1);
        assert_eq!(hal.peek(phys1.as_u64(), 1), [0xBB]);

        let top = VirtAddr::new(USER_WINDOW_BASE + USER_WINDOW_SIZE - 1);
        assert_eq!(
            space.translate(top, true),
            Some(process_window_phys(Pid::new(1)) + (USER_WINDOW_SIZE - 1))
        );
    }

    #[test]
    fn test_set_process_window_is_idempotent() {
        let mut hal = MockHal::new();
        let mut space = AddressSpace::new();
        space.set_process_window(&mut hal, Pid::new(2));
        let first = space.translate(VirtAddr::new(USER_WINDOW_BASE), true);
        space.set_process_window(&mut hal, Pid::new(2));
        assert_eq!(space.translate(VirtAddr::new(USER_WINDOW_BASE), true), first);
        assert_eq!(space.window(), Some(Pid::new(2)));
        assert_eq!(hal.tlb_flushes, 2);
    }

    #[test]
    fn test_video_window_follows_target() {
        let mut hal = MockHal::new();
        let mut space = AddressSpace::new();
        let video = VirtAddr::new(VIDEO_WINDOW_BASE + 10);

        assert_eq!(space.translate(video, true), None);
        assert_eq!(space.map_user_video(&mut hal), VirtAddr::new(VIDEO_WINDOW_BASE));
        assert_eq!(space.translate(video, true), Some(PhysAddr::new(VGA_PHYS + 10)));

        space.set_video_window(&mut hal, PhysAddr::new(TERMINAL_BUFFER_BASE));
        assert_eq!(
            space.translate(video, true),
            Some(PhysAddr::new(TERMINAL_BUFFER_BASE + 10))
        );
        assert_eq!(space.translate(VirtAddr::new(VIDEO_WINDOW_BASE + PAGE_SIZE), true), None);
    }
}
