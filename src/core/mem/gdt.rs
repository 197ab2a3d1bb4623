//! GDT管理モジュール
//!
//! Global Descriptor Tableを管理

use crate::mem::tss;
use core::arch::asm;
use spin::Once;
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};

/// ダブルフォルト用ISTインデックス（TSSと同じ値を使用）
pub const DOUBLE_FAULT_IST_INDEX: u16 = tss::DOUBLE_FAULT_IST_INDEX;

static GDT: Once<(GlobalDescriptorTable, Selectors)> = Once::new();

/// GDTセレクタ
struct Selectors {
    code_selector: SegmentSelector,
    data_selector: SegmentSelector,
    user_code_selector: SegmentSelector,
    user_data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

/// ユーザーモードのコードセグメントセレクタ（初期化前はNone）
pub fn user_code_selector() -> Option<SegmentSelector> {
    GDT.get().map(|(_, s)| s.user_code_selector)
}

/// ユーザーモードのデータセグメントセレクタ（初期化前はNone）
pub fn user_data_selector() -> Option<SegmentSelector> {
    GDT.get().map(|(_, s)| s.user_data_selector)
}

/// カーネルのコードセグメントセレクタ
pub fn code_selector() -> Option<SegmentSelector> {
    GDT.get().map(|(_, s)| s.code_selector)
}

/// GDTを初期化
pub fn init() {
    crate::debug!("Initializing GDT...");

    let tss = tss::init();

    let (gdt, selectors) = GDT.call_once(|| {
        let mut gdt = GlobalDescriptorTable::new();
        let code_selector = gdt.append(Descriptor::kernel_code_segment());
        let data_selector = gdt.append(Descriptor::kernel_data_segment());
        let user_data_selector = gdt.append(Descriptor::user_data_segment());
        let user_code_selector = gdt.append(Descriptor::user_code_segment());
        let tss_selector = gdt.append(Descriptor::tss_segment(tss));

        crate::debug!(
            "GDT: code {:?}, data {:?}, user code {:?}, user data {:?}, tss {:?}",
            code_selector,
            data_selector,
            user_code_selector,
            user_data_selector,
            tss_selector
        );

        (
            gdt,
            Selectors {
                code_selector,
                data_selector,
                user_code_selector,
                user_data_selector,
                tss_selector,
            },
        )
    });

    unsafe {
        gdt.load();
        set_cs(selectors.code_selector);
        set_data_segments(selectors.data_selector);
        load_tss(selectors.tss_selector);
    }

    crate::debug!("GDT loaded with TSS");
}

/// データセグメントレジスタを設定
unsafe fn set_data_segments(selector: SegmentSelector) {
    asm!(
        "mov ds, {0:x}",
        "mov es, {0:x}",
        "mov fs, {0:x}",
        "mov gs, {0:x}",
        "mov ss, {0:x}",
        in(reg) selector.0,
        options(nostack, preserves_flags)
    );
}

/// コードセグメントを設定（far returnを使用）
unsafe fn set_cs(selector: SegmentSelector) {
    asm!(
        "push {sel}",
        "lea {tmp}, [rip + 2f]",
        "push {tmp}",
        "retfq",
        "2:",
        sel = in(reg) u64::from(selector.0),
        tmp = lateout(reg) _,
        options(preserves_flags)
    );
}
