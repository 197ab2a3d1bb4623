//! 保存コンテキストと生のスタック切替
//!
//! 3つのルーチンはすべて同じフレーム形式を使う。
//! 保存側は callee-saved レジスタ (rbx, r12-r15) をスタックに積み、rsp と rbp を
//! [`SavedContext`] に書く。復元側は rsp と rbp を読み戻し、レジスタを降ろして `ret` する。
//! したがってどの保存点も、どの復元ルーチンからでも再開できる。
//!
//! - [`save_and_enter_user`]: 呼び出し元を保存して iretq でユーザーモードへ入る
//! - [`switch_context`]: 現在を保存して別のコンテキストを再開する
//! - [`restore_context`]: 保存せずに再開し、`rax` に値を渡す

/// 実行していないプロセスの保存コンテキスト
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SavedContext {
    /// スタックポインタ
    pub rsp: u64,
    /// フレームポインタ
    pub rbp: u64,
}

impl SavedContext {
    pub const fn new() -> Self {
        Self { rsp: 0, rbp: 0 }
    }

    /// 一度でも保存されたかどうか
    pub fn is_saved(&self) -> bool {
        self.rsp != 0
    }
}

#[cfg(target_os = "none")]
extern "C" {
    /// `save`（NULL可）に現在のコンテキストを保存し、ユーザーモードの`entry`へ入る
    ///
    /// 後で [`restore_context`] により再開されると、渡された値を返す
    pub fn save_and_enter_user(
        save: *mut SavedContext,
        entry: u64,
        user_stack: u64,
        user_cs: u64,
        user_ss: u64,
    ) -> i64;

    /// 現在を`save`に保存し、`load`を再開する
    pub fn switch_context(save: *mut SavedContext, load: *const SavedContext);

    /// `load`を再開し、再開先に`value`を返す
    pub fn restore_context(load: *const SavedContext, value: i64) -> !;
}

#[cfg(target_os = "none")]
core::arch::global_asm!(
    r#"
    .global save_and_enter_user
    .type save_and_enter_user, @function
save_and_enter_user:
    push rbx
    push r12
    push r13
    push r14
    push r15
    test rdi, rdi
    jz 2f
    mov [rdi + 0x00], rsp
    mov [rdi + 0x08], rbp
2:
    mov ax, r8w
    mov ds, ax
    mov es, ax
    push r8
    push rdx
    push 0x202
    push rcx
    push rsi
    xor eax, eax
    xor ebx, ebx
    xor ecx, ecx
    xor edx, edx
    xor esi, esi
    xor edi, edi
    xor ebp, ebp
    xor r8d, r8d
    xor r9d, r9d
    xor r10d, r10d
    xor r11d, r11d
    iretq

    .global switch_context
    .type switch_context, @function
switch_context:
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi + 0x00], rsp
    mov [rdi + 0x08], rbp
    mov rsp, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    ret

    .global restore_context
    .type restore_context, @function
restore_context:
    mov rsp, [rdi + 0x00]
    mov rbp, [rdi + 0x08]
    mov rax, rsi
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    ret
"#
);
