//! システムコール
//!
//! `int 0x80`で呼ばれる。番号は`rax`、引数は`rdi`, `rsi`, `rdx`、戻り値は`rax`。
//! [`dispatch`]はカーネル状態だけを操作し、レジスタやスタックの切替は
//! [`Action`]として呼び出し側（実機ではトラップハンドラ）に任せる。

#[cfg(target_os = "none")]
pub mod entry;
mod types;

pub use types::{error_code, SyscallNumber, EMFILE, EPROCLIM, FAILURE};

use crate::config::{MAX_ARG_LEN, MAX_COMMAND_LEN, MAX_NAME_LEN, USER_WINDOW_BASE, USER_WINDOW_SIZE};
use crate::error::{IoError, KernelError, MemoryError};
use crate::hal::Hal;
use crate::io::FileKind;
use crate::kernel::Kernel;
use crate::task::{ExitStatus, HaltOutcome, Launch, Pid};
use crate::Result;

/// 1回のカーネル内コピーの単位
const IO_CHUNK: usize = 1024;

/// システムコールの結果としてトラップハンドラが行うこと
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 呼び出し元へ値を返す
    Return(i64),
    /// 新しいプロセスへ入る（呼び出し元は`save_into`に保存される）
    Launch(Launch),
    /// 親の execute から`status`で戻る
    Resume { parent: Pid, status: i64 },
    /// 割り込みを許可して待ち、同じ呼び出しをやり直す
    Wait,
}

/// システムコールのディスパッチ
pub fn dispatch<H: Hal>(
    kernel: &mut Kernel<'_, H>,
    num: u64,
    arg0: u64,
    arg1: u64,
    arg2: u64,
) -> Action {
    let number = match SyscallNumber::try_from(num) {
        Ok(number) => number,
        Err(_) => {
            crate::debug!("Unknown syscall {}", num);
            return Action::Return(FAILURE);
        }
    };

    let result = match number {
        SyscallNumber::Halt => return halt(kernel, arg0),
        SyscallNumber::Execute => execute(kernel, arg0),
        SyscallNumber::Read => read(kernel, arg0, arg1, arg2),
        SyscallNumber::Write => write(kernel, arg0, arg1, arg2),
        SyscallNumber::Open => open(kernel, arg0),
        SyscallNumber::Close => descriptor(arg0)
            .and_then(|fd| kernel.close(fd))
            .map(|()| Action::Return(0)),
        SyscallNumber::GetArgs => getargs(kernel, arg0, arg1),
        SyscallNumber::Vidmap => vidmap(kernel, arg0),
        SyscallNumber::SetHandler | SyscallNumber::Sigreturn => Err(KernelError::NotImplemented),
    };

    match result {
        Ok(action) => action,
        Err(e) if e.is_retryable() => Action::Wait,
        Err(e) => {
            if e.is_fatal() {
                crate::error!("syscall {:?} hit a broken boot image: {}", number, e);
            } else {
                crate::trace!("syscall {:?} failed: {}", number, e);
            }
            Action::Return(error_code(&e))
        }
    }
}

fn descriptor(fd: u64) -> Result<usize> {
    usize::try_from(fd).map_err(|_| IoError::BadDescriptor.into())
}

fn length(len: u64) -> Result<usize> {
    usize::try_from(len).map_err(|_| KernelError::InvalidParam)
}

/// 終了状態は下位8ビットだけを使う
fn halt<H: Hal>(kernel: &mut Kernel<'_, H>, status: u64) -> Action {
    match kernel.halt(ExitStatus::Code(status as u8)) {
        Ok(HaltOutcome::Resume { parent, status }) => Action::Resume { parent, status },
        Ok(HaltOutcome::Respawn(launch)) => Action::Launch(launch),
        Err(e) => {
            crate::error!("halt failed: {}", e);
            Action::Return(error_code(&e))
        }
    }
}

fn execute<H: Hal>(kernel: &mut Kernel<'_, H>, command: u64) -> Result<Action> {
    let mut line = [0u8; MAX_COMMAND_LEN];
    let len = kernel.read_user_cstr(command, &mut line)?;
    kernel.execute(&line[..len]).map(Action::Launch)
}

fn read<H: Hal>(kernel: &mut Kernel<'_, H>, fd: u64, buf: u64, len: u64) -> Result<Action> {
    let fd = descriptor(fd)?;
    let len = length(len)?;
    kernel.check_user_range(buf, len)?;

    let kind = kernel.file_kind(fd);
    let mut chunk = [0u8; IO_CHUNK];
    let mut total = 0;
    loop {
        let want = (len - total).min(IO_CHUNK);
        let got = kernel.read(fd, &mut chunk[..want])?;
        // コンソールは行末のNULまで渡す
        let copied = if kind == Some(FileKind::Console) {
            (got + 1).min(want)
        } else {
            got
        };
        kernel.copy_to_user(buf + total as u64, &chunk[..copied])?;
        total += got;
        // 続けて読むのは通常ファイルだけ
        if total == len || got < want || kind != Some(FileKind::Regular) {
            break;
        }
    }
    Ok(Action::Return(total as i64))
}

fn write<H: Hal>(kernel: &mut Kernel<'_, H>, fd: u64, buf: u64, len: u64) -> Result<Action> {
    let fd = descriptor(fd)?;
    let len = length(len)?;
    kernel.check_user_range(buf, len)?;

    let mut chunk = [0u8; IO_CHUNK];
    let mut done = 0;
    let mut written = 0;
    loop {
        let want = (len - done).min(IO_CHUNK);
        kernel.copy_from_user(buf + done as u64, &mut chunk[..want])?;
        written += kernel.write(fd, &chunk[..want])?;
        done += want;
        if done >= len {
            break;
        }
    }
    Ok(Action::Return(written as i64))
}

fn open<H: Hal>(kernel: &mut Kernel<'_, H>, name: u64) -> Result<Action> {
    let mut buf = [0u8; MAX_NAME_LEN + 1];
    let len = kernel.read_user_cstr(name, &mut buf)?;
    let fd = kernel.open(&buf[..len])?;
    Ok(Action::Return(fd as i64))
}

fn getargs<H: Hal>(kernel: &mut Kernel<'_, H>, buf: u64, len: u64) -> Result<Action> {
    let len = length(len)?;
    kernel.check_user_range(buf, len)?;
    let mut args = [0u8; MAX_ARG_LEN];
    let n = len.min(MAX_ARG_LEN);
    kernel.getargs(&mut args[..n])?;
    kernel.copy_to_user(buf, &args[..n])?;
    Ok(Action::Return(0))
}

/// ビデオ窓をユーザーに公開し、そのアドレスを`out`へ書く
///
/// `out`はユーザー窓の中になければならない
fn vidmap<H: Hal>(kernel: &mut Kernel<'_, H>, out: u64) -> Result<Action> {
    let window = USER_WINDOW_BASE..=USER_WINDOW_BASE + USER_WINDOW_SIZE - 8;
    if !window.contains(&out) {
        return Err(MemoryError::InvalidAddress.into());
    }
    let video = kernel.space.map_user_video(&mut kernel.hal);
    kernel.copy_to_user(out, &video.as_u64().to_le_bytes())?;
    Ok(Action::Return(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_PROCESSES, VGA_PHYS, VIDEO_WINDOW_BASE};
    use crate::hal::mock::MockHal;
    use crate::terminal::TermId;
    use crate::testing::{booted, sample_image};
    use x86_64::VirtAddr;

    const SCRATCH: u64 = USER_WINDOW_BASE + 0x1000;

    fn put_str(kernel: &mut Kernel<'_, MockHal>, addr: u64, s: &[u8]) {
        kernel.copy_to_user(addr, s).unwrap();
        kernel.copy_to_user(addr + s.len() as u64, &[0]).unwrap();
    }

    fn call(kernel: &mut Kernel<'_, MockHal>, num: SyscallNumber, a0: u64, a1: u64, a2: u64) -> Action {
        dispatch(kernel, num as u64, a0, a1, a2)
    }

    #[test]
    fn test_unknown_and_signal_calls_fail() {
        let image = sample_image();
        let mut kernel = booted(&image);
        assert_eq!(dispatch(&mut kernel, 0, 0, 0, 0), Action::Return(-1));
        assert_eq!(dispatch(&mut kernel, 42, 0, 0, 0), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::SetHandler, 0, 0, 0), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::Sigreturn, 0, 0, 0), Action::Return(-1));
    }

    #[test]
    fn test_execute_and_halt_round_trip() {
        let image = sample_image();
        let mut kernel = booted(&image);
        put_str(&mut kernel, SCRATCH, b"ls  -a");

        let launch = match call(&mut kernel, SyscallNumber::Execute, SCRATCH, 0, 0) {
            Action::Launch(launch) => launch,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(launch.pid, Pid::new(1));
        assert_eq!(launch.save_into, Some(Pid::new(0)));

        let mut buf = [0xFFu8; 8];
        assert_eq!(call(&mut kernel, SyscallNumber::GetArgs, SCRATCH, 8, 0), Action::Return(0));
        kernel.copy_from_user(SCRATCH, &mut buf).unwrap();
        assert_eq!(&buf, b"-a\0\0\0\0\0\0");

        assert_eq!(
            call(&mut kernel, SyscallNumber::Halt, 0x1_07, 0, 0),
            Action::Resume {
                parent: Pid::new(0),
                status: 7
            }
        );
        assert_eq!(kernel.current(), Some(Pid::new(0)));
    }

    #[test]
    fn test_execute_failures() {
        let image = sample_image();
        let mut kernel = booted(&image);
        for command in [&b"nosuch"[..], b"notexec", b"frame0.txt", b"   ", b"rtc"] {
            put_str(&mut kernel, SCRATCH, command);
            assert_eq!(
                call(&mut kernel, SyscallNumber::Execute, SCRATCH, 0, 0),
                Action::Return(-1)
            );
        }
        assert_eq!(call(&mut kernel, SyscallNumber::Execute, 0, 0, 0), Action::Return(-1));
        assert_eq!(kernel.current(), Some(Pid::new(0)));
        assert_eq!(kernel.terminals().get(TermId::new(0)).attached(), 1);
    }

    #[test]
    fn test_seventh_process_reports_limit() {
        let image = sample_image();
        let mut kernel = booted(&image);
        put_str(&mut kernel, SCRATCH, b"counter");
        for _ in 1..MAX_PROCESSES {
            assert!(matches!(
                call(&mut kernel, SyscallNumber::Execute, SCRATCH, 0, 0),
                Action::Launch(_)
            ));
            // 子のウィンドウにもコマンドを置く
            put_str(&mut kernel, SCRATCH, b"counter");
        }
        assert_eq!(
            call(&mut kernel, SyscallNumber::Execute, SCRATCH, 0, 0),
            Action::Return(EPROCLIM)
        );
        assert_eq!(kernel.current(), Some(Pid::new(MAX_PROCESSES - 1)));
    }

    #[test]
    fn test_open_exhaustion_reports_distinct_code() {
        let image = sample_image();
        let mut kernel = booted(&image);
        put_str(&mut kernel, SCRATCH, b"frame0.txt");
        for fd in 2..8 {
            assert_eq!(
                call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0),
                Action::Return(fd)
            );
        }
        assert_eq!(call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0), Action::Return(EMFILE));

        put_str(&mut kernel, SCRATCH, b"missing");
        assert_eq!(call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0), Action::Return(EMFILE));
        assert_eq!(call(&mut kernel, SyscallNumber::Close, 7, 0, 0), Action::Return(0));
        assert_eq!(call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::Close, 7, 0, 0), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::Close, 1, 0, 0), Action::Return(-1));
    }

    #[test]
    fn test_read_file_into_user_buffer() {
        let image = sample_image();
        let mut kernel = booted(&image);
        put_str(&mut kernel, SCRATCH, b"frame0.txt");
        assert_eq!(call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0), Action::Return(2));

        let buf = SCRATCH + 0x100;
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 2, buf, 4), Action::Return(4));
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 2, buf + 4, 100), Action::Return(8));
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 2, buf, 100), Action::Return(0));

        let mut out = [0u8; 12];
        kernel.copy_from_user(buf, &mut out).unwrap();
        assert_eq!(&out, b"/\\/\\/\\ fish\n");

        // 不正なバッファはオフセットを進めない
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 2, 0x1000, 4), Action::Return(-1));
    }

    #[test]
    fn test_console_read_waits_for_line() {
        let image = sample_image();
        let mut kernel = booted(&image);
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 0, SCRATCH, 64), Action::Wait);

        for &ch in b"hi" {
            kernel.handle_key(crate::driver::ps2_keyboard::KeyEvent::Char(ch)).unwrap();
        }
        kernel.handle_key(crate::driver::ps2_keyboard::KeyEvent::Enter).unwrap();
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 0, SCRATCH, 64), Action::Return(2));

        let mut out = [0xFFu8; 4];
        kernel.copy_to_user(SCRATCH, &out).unwrap();
        for &ch in b"yo" {
            kernel.handle_key(crate::driver::ps2_keyboard::KeyEvent::Char(ch)).unwrap();
        }
        kernel.handle_key(crate::driver::ps2_keyboard::KeyEvent::Enter).unwrap();
        assert_eq!(call(&mut kernel, SyscallNumber::Read, 0, SCRATCH, 64), Action::Return(2));
        kernel.copy_from_user(SCRATCH, &mut out).unwrap();
        assert_eq!(&out, b"yo\0\xFF");
    }

    #[test]
    fn test_write_to_console_and_rtc() {
        let image = sample_image();
        let mut kernel = booted(&image);
        put_str(&mut kernel, SCRATCH, b"ok");
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 1, SCRATCH, 2), Action::Return(2));
        assert_eq!(kernel.hal_mut().peek(VGA_PHYS, 3), [b'o', 0x07, b'k']);
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 0, SCRATCH, 2), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 1, SCRATCH, 0), Action::Return(-1));

        put_str(&mut kernel, SCRATCH, b"rtc");
        assert_eq!(call(&mut kernel, SyscallNumber::Open, SCRATCH, 0, 0), Action::Return(2));
        kernel.copy_to_user(SCRATCH, &32u32.to_le_bytes()).unwrap();
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 2, SCRATCH, 4), Action::Return(0));
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 2, SCRATCH, 2), Action::Return(-1));
        kernel.copy_to_user(SCRATCH, &33u32.to_le_bytes()).unwrap();
        assert_eq!(call(&mut kernel, SyscallNumber::Write, 2, SCRATCH, 4), Action::Return(-1));
    }

    #[test]
    fn test_vidmap() {
        let image = sample_image();
        let mut kernel = booted(&image);
        assert_eq!(call(&mut kernel, SyscallNumber::Vidmap, 0, 0, 0), Action::Return(-1));
        assert_eq!(call(&mut kernel, SyscallNumber::Vidmap, 0x40_0000, 0, 0), Action::Return(-1));
        let end = USER_WINDOW_BASE + USER_WINDOW_SIZE;
        assert_eq!(call(&mut kernel, SyscallNumber::Vidmap, end - 4, 0, 0), Action::Return(-1));

        assert_eq!(call(&mut kernel, SyscallNumber::Vidmap, SCRATCH, 0, 0), Action::Return(0));
        let mut out = [0u8; 8];
        kernel.copy_from_user(SCRATCH, &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), VIDEO_WINDOW_BASE);
        assert!(kernel
            .address_space()
            .translate(VirtAddr::new(VIDEO_WINDOW_BASE), true)
            .is_some());
    }

    #[test]
    fn test_getargs_without_arguments_fails() {
        let image = sample_image();
        let mut kernel = booted(&image);
        assert_eq!(call(&mut kernel, SyscallNumber::GetArgs, SCRATCH, 32, 0), Action::Return(-1));
    }

    #[test]
    fn test_base_shell_halt_respawns() {
        let image = sample_image();
        let mut kernel = booted(&image);
        match call(&mut kernel, SyscallNumber::Halt, 0, 0, 0) {
            Action::Launch(launch) => {
                assert_eq!(launch.pid, Pid::new(0));
                assert_eq!(launch.save_into, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(kernel.current(), Some(Pid::new(0)));
    }
}
