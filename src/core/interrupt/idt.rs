//! IDT (Interrupt Descriptor Table) 管理
//!
//! IDTの初期化と例外・ハードウェア割り込みハンドラの定義

use super::pic::{PIC1_OFFSET, PIC2_OFFSET};
use crate::driver::ps2_keyboard::{self, KEYBOARD_IRQ};
use crate::driver::rtc::{self, RTC_IRQ};
use crate::kernel::{halt_forever, try_with_kernel, with_kernel};
use crate::mem::gdt;
use crate::task::context::{restore_context, SavedContext};
use crate::task::{usermode, HaltOutcome, Launch};
use crate::{debug, error, warn};
use core::ptr;
use spin::Once;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

static IDT: Once<InterruptDescriptorTable> = Once::new();

/// システムコールのベクタ
const SYSCALL_VECTOR: u8 = 0x80;

/// IDTを初期化
pub fn init() {
    debug!("Initializing IDT...");

    let idt = IDT.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();

        // CPU例外ハンドラ
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.debug.set_handler_fn(debug_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded
            .set_handler_fn(bound_range_exceeded_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available
            .set_handler_fn(device_not_available_handler);

        // ダブルフォルトハンドラ（専用スタック使用）
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }

        idt.invalid_tss.set_handler_fn(invalid_tss_handler);
        idt.segment_not_present
            .set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault
            .set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault
            .set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.x87_floating_point
            .set_handler_fn(x87_floating_point_handler);
        idt.alignment_check.set_handler_fn(alignment_check_handler);
        idt.machine_check.set_handler_fn(machine_check_handler);
        idt.simd_floating_point
            .set_handler_fn(simd_floating_point_handler);
        idt.virtualization.set_handler_fn(virtualization_handler);

        // ハードウェア割り込みハンドラ（32-47番）
        for i in PIC1_OFFSET..PIC2_OFFSET + 8 {
            idt[i].set_handler_fn(spurious_interrupt_handler);
        }
        idt[PIC1_OFFSET + super::TIMER_IRQ].set_handler_fn(super::timer::timer_interrupt_handler);
        idt[PIC1_OFFSET + KEYBOARD_IRQ].set_handler_fn(keyboard_interrupt_handler);
        idt[PIC1_OFFSET + RTC_IRQ].set_handler_fn(rtc_interrupt_handler);

        // システムコール割り込み (0x80)
        // アセンブリのトラップなので、アドレスで設定
        unsafe {
            let handler_addr = crate::syscall::entry::syscall_trap as *const () as u64;
            idt[SYSCALL_VECTOR]
                .set_handler_addr(VirtAddr::new(handler_addr))
                .set_privilege_level(PrivilegeLevel::Ring3);
        }

        idt
    });

    idt.load();

    // IDTが正しくロードされたか確認
    use x86_64::instructions::tables::sidt;
    let idtr = sidt();
    debug!(
        "IDT loaded: base={:p}, limit={}",
        idtr.base.as_ptr::<u8>(),
        idtr.limit
    );
}

// ========================================
// 例外からの回復
// ========================================

/// ロックを離した後の遷移
enum Recovery {
    Resume(*mut SavedContext, i64),
    Respawn(Launch),
}

/// 例外を現在のプロセスの強制終了に変える
///
/// プロセスがない、またはカーネル状態がロック中なら停止する
fn fault(name: &str, stack_frame: &InterruptStackFrame) -> ! {
    let from_user = stack_frame.code_segment.rpl() == PrivilegeLevel::Ring3;
    error!(
        "EXCEPTION: {} ({})",
        name,
        if from_user { "USER MODE" } else { "KERNEL MODE" }
    );
    debug!("{:#?}", stack_frame);

    let recovery = try_with_kernel(|kernel| match kernel.on_exception(name)? {
        HaltOutcome::Resume { parent, status } => {
            Some(Recovery::Resume(kernel.context_ptr(parent)?, status))
        }
        HaltOutcome::Respawn(launch) => Some(Recovery::Respawn(launch)),
    })
    .flatten();

    match recovery {
        // SAFETY: 親のPCBは生存中で、割り込みは禁止されている
        Some(Recovery::Resume(context, status)) => unsafe { restore_context(context, status) },
        Some(Recovery::Respawn(launch)) => {
            // SAFETY: 終了したプロセスの文脈は保存しない
            unsafe { usermode::enter(&launch, ptr::null_mut()) };
            halt_forever();
        }
        None => {
            error!("Unrecoverable exception, system halted");
            halt_forever();
        }
    }
}

// ========================================
// CPU例外ハンドラ
// ========================================

macro_rules! fault_handler {
    ($handler:ident, $name:literal) => {
        extern "x86-interrupt" fn $handler(stack_frame: InterruptStackFrame) {
            fault($name, &stack_frame);
        }
    };
    ($handler:ident, $name:literal, error_code) => {
        extern "x86-interrupt" fn $handler(stack_frame: InterruptStackFrame, error_code: u64) {
            error!("Error code: {:#x}", error_code);
            fault($name, &stack_frame);
        }
    };
}

fault_handler!(divide_error_handler, "DIVIDE ERROR");
fault_handler!(overflow_handler, "OVERFLOW");
fault_handler!(bound_range_exceeded_handler, "BOUND RANGE EXCEEDED");
fault_handler!(invalid_opcode_handler, "INVALID OPCODE");
fault_handler!(device_not_available_handler, "DEVICE NOT AVAILABLE");
fault_handler!(x87_floating_point_handler, "X87 FLOATING POINT");
fault_handler!(simd_floating_point_handler, "SIMD FLOATING POINT");
fault_handler!(virtualization_handler, "VIRTUALIZATION");
fault_handler!(invalid_tss_handler, "INVALID TSS", error_code);
fault_handler!(segment_not_present_handler, "SEGMENT NOT PRESENT", error_code);
fault_handler!(stack_segment_fault_handler, "STACK SEGMENT FAULT", error_code);
fault_handler!(alignment_check_handler, "ALIGNMENT CHECK", error_code);

extern "x86-interrupt" fn debug_handler(stack_frame: InterruptStackFrame) {
    debug!("EXCEPTION: DEBUG");
    debug!("{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    warn!("EXCEPTION: BREAKPOINT");
    debug!("{:#?}", stack_frame);
}

extern "x86-interrupt" fn nmi_handler(stack_frame: InterruptStackFrame) {
    error!("EXCEPTION: NON-MASKABLE INTERRUPT");
    debug!("{:#?}", stack_frame);
    halt_forever();
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    error!("EXCEPTION: DOUBLE FAULT");
    error!("Error code: {:#x}", error_code);
    debug!("{:#?}", stack_frame);
    halt_forever();
}

extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) -> ! {
    error!("EXCEPTION: MACHINE CHECK");
    debug!("{:#?}", stack_frame);
    halt_forever();
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    // エラーコードの詳細を解析
    let external = (error_code & 0x1) != 0;
    let table = (error_code >> 1) & 0x3;
    let index = (error_code >> 3) & 0x1FFF;
    error!(
        "Error code: {:#x} (external: {}, table: {}, index: {})",
        error_code,
        external,
        match table {
            0 => "GDT",
            1 => "IDT",
            _ => "LDT",
        },
        index
    );
    fault("GENERAL PROTECTION FAULT", &stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    match Cr2::read() {
        Ok(addr) => error!("Accessed address: {:#x}", addr.as_u64()),
        Err(_) => error!("Accessed address is not canonical"),
    }
    error!("Error code: {:?}", error_code);
    fault("PAGE FAULT", &stack_frame);
}

// ========================================
// ハードウェア割り込みハンドラ
// ========================================

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let Some(scancode) = ps2_keyboard::read_scancode() else {
        super::send_eoi(KEYBOARD_IRQ);
        return;
    };

    let launch = with_kernel(|kernel| {
        let launch = kernel.on_keyboard(scancode)?;
        let save = launch
            .save_into
            .and_then(|pid| kernel.context_ptr(pid))
            .unwrap_or(ptr::null_mut());
        Some((launch, save))
    })
    .flatten();

    // 新しい端末のシェルへ入る。割り込まれたプロセスは後でスケジューラが再開する
    if let Some((launch, save)) = launch {
        // SAFETY: 割り込み禁止中で、保存先は生存中のPCBを指す
        unsafe { usermode::enter(&launch, save) };
    }
}

extern "x86-interrupt" fn rtc_interrupt_handler(_stack_frame: InterruptStackFrame) {
    rtc::acknowledge();
    with_kernel(|kernel| kernel.on_rtc_tick());
}

extern "x86-interrupt" fn spurious_interrupt_handler(_stack_frame: InterruptStackFrame) {
    crate::trace!("INTERRUPT: SPURIOUS");
}
