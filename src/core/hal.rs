//! ハードウェア抽象化層
//!
//! カーネル本体が機械に触れる箇所はすべてこのトレイトを経由する。
//! 実機では [`X86Hal`]、テストではモックを使う。

use crate::Result;
use x86_64::{PhysAddr, VirtAddr};

/// カーネルが必要とするハードウェア操作
pub trait Hal {
    /// 物理メモリ領域をバイト列として参照する
    fn phys_mut(&mut self, addr: PhysAddr, len: usize) -> Result<&mut [u8]>;

    /// TLBを全消去
    fn flush_tlb(&mut self);

    /// 特権遷移時に使うカーネルスタック (TSS.RSP0) を設定
    fn set_kernel_stack(&mut self, top: VirtAddr);

    /// 割り込みコントローラにEOIを送信
    fn end_of_interrupt(&mut self, irq: u8);

    /// IRQラインのマスクを変更
    fn set_irq_enabled(&mut self, irq: u8, enabled: bool);

    /// ハードウェアカーソルの位置（セル番号）を設定
    fn set_cursor(&mut self, position: u16);
}

/// 物理メモリ間で`len`バイトをコピーする
///
/// 2つの領域を同時に借用しないよう、小さな中継バッファを経由する
pub fn copy_phys<H: Hal>(hal: &mut H, dst: PhysAddr, src: PhysAddr, len: usize) -> Result<()> {
    let mut bounce = [0u8; 512];
    let mut done = 0;
    while done < len {
        let chunk = bounce.len().min(len - done);
        bounce[..chunk].copy_from_slice(hal.phys_mut(src + done as u64, chunk)?);
        hal.phys_mut(dst + done as u64, chunk)?
            .copy_from_slice(&bounce[..chunk]);
        done += chunk;
    }
    Ok(())
}

/// 実機用HAL
///
/// 下位1 GiBがアイデンティティマップされている前提で物理メモリを参照する
#[cfg(target_os = "none")]
pub struct X86Hal;

#[cfg(target_os = "none")]
impl Hal for X86Hal {
    fn phys_mut(&mut self, addr: PhysAddr, len: usize) -> Result<&mut [u8]> {
        if addr.as_u64() == 0 || addr.as_u64() + len as u64 > 0x4000_0000 {
            return Err(crate::error::MemoryError::InvalidAddress.into());
        }
        // SAFETY: 下位1 GiBはカーネルから常にアクセス可能
        Ok(unsafe { core::slice::from_raw_parts_mut(addr.as_u64() as *mut u8, len) })
    }

    fn flush_tlb(&mut self) {
        x86_64::instructions::tlb::flush_all();
    }

    fn set_kernel_stack(&mut self, top: VirtAddr) {
        crate::mem::tss::set_rsp0(top.as_u64());
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        crate::interrupt::send_eoi(irq);
    }

    fn set_irq_enabled(&mut self, irq: u8, enabled: bool) {
        crate::interrupt::pic::set_irq_enabled(irq, enabled);
    }

    fn set_cursor(&mut self, position: u16) {
        use x86_64::instructions::port::Port;

        let mut index = Port::<u8>::new(0x3D4);
        let mut data = Port::<u8>::new(0x3D5);
        unsafe {
            index.write(0x0F);
            data.write((position & 0xFF) as u8);
            index.write(0x0E);
            data.write((position >> 8) as u8);
        }
    }
}
