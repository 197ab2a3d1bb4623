//! デバイスドライバ

pub mod ps2_keyboard;
pub mod rtc;
