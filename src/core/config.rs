//! カーネル設定定数
//!
//! メモリレイアウト、各種上限値、デバイス周波数などのコンパイル時設定

/// 同時に存在できるプロセス数
pub const MAX_PROCESSES: usize = 6;

/// プロセスあたりのファイルディスクリプタ数
pub const MAX_FILES: usize = 8;

/// ユーザーが開けるディスクリプタの先頭 (0/1はコンソール)
pub const FIRST_USER_FD: usize = 2;

/// 仮想端末の数
pub const TERMINAL_COUNT: usize = 3;

/// プログラム名の最大長（ファイル名長と同じ）
pub const MAX_NAME_LEN: usize = 32;

/// 引数文字列の最大長（終端NULを含む）
pub const MAX_ARG_LEN: usize = 128;

/// コマンドライン全体の最大長（終端NULを含む）
pub const MAX_COMMAND_LEN: usize = MAX_NAME_LEN + 1 + MAX_ARG_LEN;

/// プロセスごとのカーネルスタックサイズ (8 KiB)
pub const KERNEL_STACK_SIZE: usize = 8 * 1024;

/// カーネルヒープサイズ (256 KiB)
pub const KERNEL_HEAP_SIZE: usize = 256 * 1024;

/// 大きいページのサイズ (2 MiB)
pub const LARGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// ユーザーウィンドウの仮想ベースアドレス (128 MiB)
pub const USER_WINDOW_BASE: u64 = 0x0800_0000;

/// ユーザーウィンドウのサイズ (4 MiB)
pub const USER_WINDOW_SIZE: u64 = 0x0040_0000;

/// プロセス0の物理ウィンドウ (8 MiB)
pub const PROCESS_PHYS_BASE: u64 = 0x0080_0000;

/// 実行ファイルのロード先
pub const PROGRAM_LOAD_ADDR: u64 = 0x0804_8000;

/// 実行ファイル内のエントリポイントのオフセット
pub const ENTRY_POINT_OFFSET: usize = 24;

/// ユーザースタックの初期値
pub const USER_STACK_TOP: u64 = USER_WINDOW_BASE + USER_WINDOW_SIZE - 8;

/// ビデオウィンドウの仮想アドレス (140 MiB)
pub const VIDEO_WINDOW_BASE: u64 = 0x08C0_0000;

/// VGAテキストメモリの物理アドレス
pub const VGA_PHYS: u64 = 0xB8000;

/// 4 KiB ページ
pub const PAGE_SIZE: u64 = 4096;

/// 端末0の退避バッファ（以降4 KiBごと）
pub const TERMINAL_BUFFER_BASE: u64 = VGA_PHYS + PAGE_SIZE;

/// 画面の桁数
pub const SCREEN_COLS: usize = 80;

/// 画面の行数
pub const SCREEN_ROWS: usize = 25;

/// 文字属性（黒地に明るい灰色）
pub const TEXT_ATTRIBUTE: u8 = 0x07;

/// 画面1枚分のバイト数
pub const SCREEN_BYTES: usize = SCREEN_COLS * SCREEN_ROWS * 2;

/// 端末の入力行バッファ
pub const INPUT_BUFFER_SIZE: usize = 128;

/// タイマー割り込み周波数
pub const TIMER_FREQUENCY_HZ: u32 = 100;

/// スケジューラのタイムスライス（タイマー割り込み回数）
pub const TIME_SLICE_TICKS: u64 = 1;

/// RTCの実周波数
pub const RTC_BASE_FREQUENCY: u32 = 1024;

/// RTCを開いた直後の仮想周波数
pub const RTC_DEFAULT_FREQUENCY: u32 = 2;

/// 端末に自動起動するシェル
pub const BASE_SHELL: &[u8] = b"shell";

/// デバッグ出力用シリアルポート (COM1)
pub const DEBUG_SERIAL_PORT: u16 = 0x3F8;
