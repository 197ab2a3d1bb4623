//! `int 0x80`の入口
//!
//! 呼び出し時のレジスタ:
//!   RAX = システムコール番号
//!   RDI = arg0, RSI = arg1, RDX = arg2
//! 戻り値はRAXに入れて`iretq`で返す。RAX以外の汎用レジスタは保存される。

use super::{dispatch, Action};
use crate::kernel::{halt_forever, with_kernel};
use crate::task::context::{restore_context, SavedContext};
use crate::task::{usermode, Launch};
use core::ptr;
use x86_64::instructions::interrupts;

extern "C" {
    /// IDTの0x80番に登録するトラップ
    pub fn syscall_trap();
}

// CPUが積む5語と14個のレジスタで、呼び出し時にスタックが16バイト境界からずれるため8バイト下げる
core::arch::global_asm!(
    r#"
    .global syscall_trap
    .type syscall_trap, @function
syscall_trap:
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rcx, rdx
    mov rdx, rsi
    mov rsi, rdi
    mov rdi, rax
    sub rsp, 8
    call syscall_handler
    add rsp, 8
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    iretq
"#
);

/// ロックを離した後に行う遷移
enum Transition {
    Return(i64),
    Wait,
    Enter(Launch, *mut SavedContext),
    Resume(Option<*mut SavedContext>, i64),
}

#[no_mangle]
extern "C" fn syscall_handler(num: u64, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    loop {
        let transition = with_kernel(|kernel| match dispatch(kernel, num, arg0, arg1, arg2) {
            Action::Return(value) => Transition::Return(value),
            Action::Wait => Transition::Wait,
            Action::Launch(launch) => {
                let save = launch
                    .save_into
                    .and_then(|pid| kernel.context_ptr(pid))
                    .unwrap_or(ptr::null_mut());
                Transition::Enter(launch, save)
            }
            Action::Resume { parent, status } => {
                Transition::Resume(kernel.context_ptr(parent), status)
            }
        });

        match transition {
            None => return super::FAILURE,
            Some(Transition::Return(value)) => return value,
            Some(Transition::Wait) => {
                // 入力やRTCの割り込みを受け付けてからやり直す
                interrupts::enable_and_hlt();
                interrupts::disable();
            }
            // SAFETY: 割り込み禁止中で、保存先は生存中のPCBを指す
            Some(Transition::Enter(launch, save)) => return unsafe { usermode::enter(&launch, save) },
            Some(Transition::Resume(Some(context), status)) => unsafe {
                restore_context(context, status)
            },
            Some(Transition::Resume(None, _)) => {
                crate::error!("Parent context missing");
                halt_forever();
            }
        }
    }
}
