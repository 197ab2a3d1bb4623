//! テキスト画面への書き込み
//!
//! 80x25の文字+属性セル（VGAテキストモードと同じ形式）を操作する。
//! 対象は本物のビデオメモリでも端末の退避バッファでもよい。

use crate::config::{SCREEN_BYTES, SCREEN_COLS, SCREEN_ROWS, TEXT_ATTRIBUTE};

/// カーソル位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// 桁
    pub x: usize,
    /// 行
    pub y: usize,
}

impl Cursor {
    /// セル番号
    pub fn offset(&self) -> usize {
        self.y * SCREEN_COLS + self.x
    }
}

/// 画面全体を空白で埋める
pub fn blank(cells: &mut [u8]) {
    for cell in cells.chunks_exact_mut(2) {
        cell[0] = b' ';
        cell[1] = TEXT_ATTRIBUTE;
    }
}

/// 画面ライター
pub struct Screen<'a> {
    /// 文字と属性のセル列
    cells: &'a mut [u8],
    /// 端末のカーソル
    cursor: &'a mut Cursor,
}

impl<'a> Screen<'a> {
    /// `cells`は1画面分（4000バイト）以上あること
    pub fn new(cells: &'a mut [u8], cursor: &'a mut Cursor) -> Self {
        debug_assert!(cells.len() >= SCREEN_BYTES);
        Self { cells, cursor }
    }

    /// 1バイト書き込み
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            byte => {
                if self.cursor.x >= SCREEN_COLS {
                    self.new_line();
                }
                let at = self.cursor.offset() * 2;
                self.cells[at] = byte;
                self.cells[at + 1] = TEXT_ATTRIBUTE;
                self.cursor.x += 1;
            }
        }
    }

    /// バイト列を書き込み、描画したバイト数を返す（NULは飛ばす）
    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut written = 0;
        for &byte in bytes.iter().filter(|&&b| b != 0) {
            self.write_byte(byte);
            written += 1;
        }
        written
    }

    /// 直前の1文字を消す（行頭なら前の行の末尾へ戻る）
    pub fn backspace(&mut self) {
        if self.cursor.x == 0 {
            if self.cursor.y == 0 {
                return;
            }
            self.cursor.y -= 1;
            self.cursor.x = SCREEN_COLS;
        }
        self.cursor.x -= 1;
        let at = self.cursor.offset() * 2;
        self.cells[at] = b' ';
        self.cells[at + 1] = TEXT_ATTRIBUTE;
    }

    /// 画面全体をクリア
    pub fn clear(&mut self) {
        blank(&mut self.cells[..SCREEN_BYTES]);
        *self.cursor = Cursor::default();
    }

    /// ハードウェアカーソルに渡すセル番号
    pub fn cursor_offset(&self) -> u16 {
        self.cursor.offset() as u16
    }

    /// 改行処理
    fn new_line(&mut self) {
        self.cursor.x = 0;
        if self.cursor.y + 1 < SCREEN_ROWS {
            self.cursor.y += 1;
            return;
        }

        // 1行スクロール
        let row = SCREEN_COLS * 2;
        self.cells.copy_within(row..SCREEN_BYTES, 0);
        blank(&mut self.cells[SCREEN_BYTES - row..SCREEN_BYTES]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn text_at(cells: &[u8], row: usize) -> std::vec::Vec<u8> {
        cells[row * SCREEN_COLS * 2..(row + 1) * SCREEN_COLS * 2]
            .chunks(2)
            .map(|c| c[0])
            .collect()
    }

    #[test]
    fn test_write_and_newline() {
        let mut cells = vec![0u8; SCREEN_BYTES];
        let mut cursor = Cursor::default();
        let mut screen = Screen::new(&mut cells, &mut cursor);
        screen.clear();
        assert_eq!(screen.write_bytes(b"hi\n\0yo"), 5);
        assert_eq!(screen.cursor_offset(), (SCREEN_COLS + 2) as u16);
        assert_eq!(&text_at(&cells, 0)[..3], b"hi ");
        assert_eq!(&text_at(&cells, 1)[..2], b"yo");
        assert_eq!(cells[1], TEXT_ATTRIBUTE);
    }

    #[test]
    fn test_wraps_at_line_end() {
        let mut cells = vec![0u8; SCREEN_BYTES];
        let mut cursor = Cursor::default();
        Screen::new(&mut cells, &mut cursor).write_bytes(&[b'x'; SCREEN_COLS + 1]);
        assert_eq!(cursor, Cursor { x: 1, y: 1 });
        assert_eq!(text_at(&cells, 1)[0], b'x');
    }

    #[test]
    fn test_scrolls_at_bottom() {
        let mut cells = vec![0u8; SCREEN_BYTES];
        let mut cursor = Cursor::default();
        let mut screen = Screen::new(&mut cells, &mut cursor);
        screen.clear();
        screen.write_bytes(b"first\n");
        for _ in 1..SCREEN_ROWS {
            screen.write_bytes(b"line\n");
        }
        assert_eq!(cursor, Cursor { x: 0, y: SCREEN_ROWS - 1 });
        assert_eq!(&text_at(&cells, 0)[..4], b"line");
        assert!(text_at(&cells, SCREEN_ROWS - 1).iter().all(|&c| c == b' '));
    }

    #[test]
    fn test_backspace_crosses_lines() {
        let mut cells = vec![0u8; SCREEN_BYTES];
        let mut cursor = Cursor { x: 0, y: 1 };
        let mut screen = Screen::new(&mut cells, &mut cursor);
        screen.backspace();
        assert_eq!(*screen.cursor, Cursor { x: SCREEN_COLS - 1, y: 0 });

        let mut origin = Cursor::default();
        Screen::new(&mut cells, &mut origin).backspace();
        assert_eq!(origin, Cursor::default());
    }
}
