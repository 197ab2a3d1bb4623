//! RTC (Real Time Clock) ドライバ
//!
//! ハードウェアは常に1024 Hzで割り込みを上げ、ディスクリプタごとの仮想周波数は
//! 割り込み回数を間引いて実現する。

use crate::config::{RTC_BASE_FREQUENCY, RTC_DEFAULT_FREQUENCY};
use crate::error::{DeviceError, Result};

/// RTCのIRQ番号
pub const RTC_IRQ: u8 = 8;

/// RTC割り込みの累積回数
#[derive(Debug, Default)]
pub struct RtcClock {
    ticks: u64,
}

impl RtcClock {
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn now(&self) -> u64 {
        self.ticks
    }
}

/// 1つのディスクリプタから見える仮想RTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRtc {
    frequency: u32,
    mark: u64,
}

impl VirtualRtc {
    /// open直後は2 Hz
    pub fn open(now: u64) -> Self {
        Self {
            frequency: RTC_DEFAULT_FREQUENCY,
            mark: now,
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// 4バイトのリトルエンディアン値で周波数を設定する
    ///
    /// 2..=1024の2のべき乗のみ受け付ける
    pub fn set_frequency(&mut self, bytes: &[u8]) -> Result<()> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| DeviceError::InvalidOperation)?;
        let frequency = u32::from_le_bytes(raw);
        if !(RTC_DEFAULT_FREQUENCY..=RTC_BASE_FREQUENCY).contains(&frequency)
            || !frequency.is_power_of_two()
        {
            return Err(DeviceError::Unsupported.into());
        }
        self.frequency = frequency;
        Ok(())
    }

    /// 次の仮想割り込みが来ていれば0を返し、まだならBusy
    pub fn poll(&mut self, now: u64) -> Result<usize> {
        let period = u64::from(RTC_BASE_FREQUENCY / self.frequency);
        if now < self.mark + period {
            return Err(DeviceError::Busy.into());
        }
        self.mark = now;
        Ok(0)
    }
}

/// RTCを1024 Hzの周期割り込みに設定する
#[cfg(target_os = "none")]
pub fn init_hardware() {
    use x86_64::instructions::port::Port;

    crate::debug!("Initializing RTC at {} Hz...", RTC_BASE_FREQUENCY);
    let mut index = Port::<u8>::new(0x70);
    let mut data = Port::<u8>::new(0x71);
    unsafe {
        // レジスタA: レート6 = 1024 Hz（NMI無効のまま設定）
        index.write(0x8A);
        let prev = data.read();
        index.write(0x8A);
        data.write((prev & 0xF0) | 0x06);

        // レジスタB: 周期割り込み (PIE) を有効化
        index.write(0x8B);
        let prev = data.read();
        index.write(0x8B);
        data.write(prev | 0x40);

        index.write(0x0D);
    }
}

/// レジスタCを読んで次の割り込みを許可する
#[cfg(target_os = "none")]
pub fn acknowledge() {
    use x86_64::instructions::port::Port;

    unsafe {
        Port::<u8>::new(0x70).write(0x0C);
        Port::<u8>::new(0x71).read();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;

    #[test]
    fn test_default_rate_waits_half_a_second() {
        let mut rtc = VirtualRtc::open(100);
        assert_eq!(rtc.frequency(), 2);
        assert_eq!(rtc.poll(100 + 511), Err(DeviceError::Busy.into()));
        assert_eq!(rtc.poll(100 + 512), Ok(0));
        assert!(rtc.poll(100 + 513).is_err());
    }

    #[test]
    fn test_set_frequency_validates() {
        let mut rtc = VirtualRtc::open(0);
        assert!(rtc.set_frequency(&1024u32.to_le_bytes()).is_ok());
        assert_eq!(rtc.poll(1), Ok(0));

        assert_eq!(
            rtc.set_frequency(&3u32.to_le_bytes()),
            Err(KernelError::Device(DeviceError::Unsupported))
        );
        assert!(rtc.set_frequency(&2048u32.to_le_bytes()).is_err());
        assert!(rtc.set_frequency(&1u32.to_le_bytes()).is_err());
        assert!(rtc.set_frequency(&[2, 0]).is_err());
        assert_eq!(rtc.frequency(), 1024);
    }

    #[test]
    fn test_clock_counts_ticks() {
        let mut clock = RtcClock::new();
        clock.tick();
        clock.tick();
        assert_eq!(clock.now(), 2);
    }
}
