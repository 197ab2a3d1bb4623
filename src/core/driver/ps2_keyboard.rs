//! PS/2キーボードドライバ
//!
//! スキャンコードセット1を解釈し、端末の行編集が使うキーイベントに変換する

use crate::terminal::TermId;

const DATA_PORT: u16 = 0x60;
const STATUS_PORT: u16 = 0x64;

/// キーボードのIRQ番号
pub const KEYBOARD_IRQ: u8 = 1;

const ENTER: u8 = 0x1C;
const BACKSPACE: u8 = 0x0E;
const TAB: u8 = 0x0F;
const CTRL: u8 = 0x1D;
const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const ALT: u8 = 0x38;
const CAPS_LOCK: u8 = 0x3A;
const F1: u8 = 0x3B;
const F3: u8 = 0x3D;

/// 端末へ渡すキーイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// 表示可能な文字
    Char(u8),
    Enter,
    Backspace,
    Tab,
    /// Ctrl+L
    ClearScreen,
    /// Alt+F1..F3
    SwitchTerminal(TermId),
}

/// 修飾キーの状態
#[derive(Debug, Default)]
pub struct KeyboardState {
    shift: bool,
    caps: bool,
    ctrl: bool,
    alt: bool,
    extended: bool,
}

impl KeyboardState {
    pub const fn new() -> Self {
        Self {
            shift: false,
            caps: false,
            ctrl: false,
            alt: false,
            extended: false,
        }
    }

    /// スキャンコードを1つ処理する
    pub fn process(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == 0xE0 {
            self.extended = true;
            return None;
        }

        let released = scancode & 0x80 != 0;
        let code = scancode & 0x7F;
        let extended = core::mem::replace(&mut self.extended, false);

        match code {
            LSHIFT | RSHIFT if !extended => {
                self.shift = !released;
                return None;
            }
            CTRL => {
                self.ctrl = !released;
                return None;
            }
            ALT => {
                self.alt = !released;
                return None;
            }
            CAPS_LOCK => {
                if !released {
                    self.caps = !self.caps;
                }
                return None;
            }
            _ => {}
        }

        if released || extended {
            return None;
        }

        if self.alt && (F1..=F3).contains(&code) {
            return Some(KeyEvent::SwitchTerminal(TermId::new((code - F1) as usize)));
        }

        match code {
            ENTER => return Some(KeyEvent::Enter),
            BACKSPACE => return Some(KeyEvent::Backspace),
            TAB => return Some(KeyEvent::Tab),
            _ => {}
        }

        let ch = scancode_to_ascii(code, self.shift, self.caps)?;
        if self.ctrl {
            return match ch {
                b'l' | b'L' => Some(KeyEvent::ClearScreen),
                _ => None,
            };
        }
        Some(KeyEvent::Char(ch))
    }
}

/// データポートからスキャンコードを読む
#[cfg(target_os = "none")]
pub fn read_scancode() -> Option<u8> {
    use x86_64::instructions::port::Port;

    let status = unsafe { Port::<u8>::new(STATUS_PORT).read() };
    if status & 0x01 == 0 {
        return None;
    }
    Some(unsafe { Port::<u8>::new(DATA_PORT).read() })
}

fn scancode_to_ascii(code: u8, shift: bool, caps: bool) -> Option<u8> {
    let ch = match code {
        0x02 => b'1',
        0x03 => b'2',
        0x04 => b'3',
        0x05 => b'4',
        0x06 => b'5',
        0x07 => b'6',
        0x08 => b'7',
        0x09 => b'8',
        0x0A => b'9',
        0x0B => b'0',
        0x0C => b'-',
        0x0D => b'=',
        0x10 => b'q',
        0x11 => b'w',
        0x12 => b'e',
        0x13 => b'r',
        0x14 => b't',
        0x15 => b'y',
        0x16 => b'u',
        0x17 => b'i',
        0x18 => b'o',
        0x19 => b'p',
        0x1A => b'[',
        0x1B => b']',
        0x1E => b'a',
        0x1F => b's',
        0x20 => b'd',
        0x21 => b'f',
        0x22 => b'g',
        0x23 => b'h',
        0x24 => b'j',
        0x25 => b'k',
        0x26 => b'l',
        0x27 => b';',
        0x28 => b'\'',
        0x29 => b'`',
        0x2B => b'\\',
        0x2C => b'z',
        0x2D => b'x',
        0x2E => b'c',
        0x2F => b'v',
        0x30 => b'b',
        0x31 => b'n',
        0x32 => b'm',
        0x33 => b',',
        0x34 => b'.',
        0x35 => b'/',
        0x39 => b' ',
        _ => return None,
    };

    if ch.is_ascii_alphabetic() {
        if caps ^ shift {
            return Some(ch.to_ascii_uppercase());
        }
        return Some(ch);
    }

    if !shift {
        return Some(ch);
    }

    let shifted = match ch {
        b'1' => b'!',
        b'2' => b'@',
        b'3' => b'#',
        b'4' => b'$',
        b'5' => b'%',
        b'6' => b'^',
        b'7' => b'&',
        b'8' => b'*',
        b'9' => b'(',
        b'0' => b')',
        b'-' => b'_',
        b'=' => b'+',
        b'[' => b'{',
        b']' => b'}',
        b'\\' => b'|',
        b';' => b':',
        b'\'' => b'"',
        b',' => b'<',
        b'.' => b'>',
        b'/' => b'?',
        b'`' => b'~',
        _ => ch,
    };

    Some(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(kbd: &mut KeyboardState, codes: &[u8]) -> std::vec::Vec<KeyEvent> {
        codes.iter().filter_map(|&c| kbd.process(c)).collect()
    }

    #[test]
    fn test_shift_and_caps() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[0x1E]), [KeyEvent::Char(b'a')]);
        assert_eq!(feed(&mut kbd, &[LSHIFT, 0x1E, 0x02, LSHIFT | 0x80]), [
            KeyEvent::Char(b'A'),
            KeyEvent::Char(b'!')
        ]);
        assert_eq!(feed(&mut kbd, &[CAPS_LOCK, CAPS_LOCK | 0x80, 0x1E, 0x02]), [
            KeyEvent::Char(b'A'),
            KeyEvent::Char(b'1')
        ]);
        assert_eq!(feed(&mut kbd, &[RSHIFT, 0x1E]), [KeyEvent::Char(b'a')]);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[0x1E | 0x80, ENTER | 0x80]), []);
    }

    #[test]
    fn test_control_chords() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[CTRL, 0x26]), [KeyEvent::ClearScreen]);
        assert_eq!(feed(&mut kbd, &[0x2E]), []);
        assert_eq!(feed(&mut kbd, &[CTRL | 0x80, 0x2E]), [KeyEvent::Char(b'c')]);
    }

    #[test]
    fn test_alt_function_keys_switch_terminal() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[F1]), []);
        assert_eq!(feed(&mut kbd, &[ALT, 0x3C]), [KeyEvent::SwitchTerminal(TermId::new(1))]);
        assert_eq!(feed(&mut kbd, &[F3, ALT | 0x80, F1]), [
            KeyEvent::SwitchTerminal(TermId::new(2))
        ]);
    }

    #[test]
    fn test_editing_keys() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[ENTER, BACKSPACE, TAB]), [
            KeyEvent::Enter,
            KeyEvent::Backspace,
            KeyEvent::Tab
        ]);
    }

    #[test]
    fn test_extended_right_alt_counts_as_alt() {
        let mut kbd = KeyboardState::new();
        assert_eq!(feed(&mut kbd, &[0xE0, ALT, 0x3D]), [KeyEvent::SwitchTerminal(TermId::new(2))]);
        // 拡張コードの矢印キーは無視
        assert_eq!(feed(&mut kbd, &[0xE0, 0x48]), []);
    }
}
