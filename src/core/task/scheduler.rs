//! スケジューラ
//!
//! 端末ごとに最後に動いていたプロセスをラウンドロビンで切り替える

use super::Switch;
use crate::config::TIME_SLICE_TICKS;
use crate::hal::Hal;
use crate::interrupt::TIMER_IRQ;
use crate::kernel::Kernel;

/// スケジューラ
///
/// タイマー割り込みの回数を数え、タイムスライスごとに切替を許可する
#[derive(Debug)]
pub struct Scheduler {
    /// スケジューラが有効かどうか
    enabled: bool,
    /// タイムスライス（タイマー割り込み回数）
    time_slice: u64,
    /// 現在のタイムスライスカウンタ
    current_slice: u64,
}

impl Scheduler {
    /// 新しいスケジューラを作成（無効状態）
    pub const fn new() -> Self {
        Self::with_time_slice(TIME_SLICE_TICKS)
    }

    /// タイムスライスを指定して作成（0は1として扱う）
    pub const fn with_time_slice(slice: u64) -> Self {
        Self {
            enabled: false,
            time_slice: if slice == 0 { 1 } else { slice },
            current_slice: 0,
        }
    }

    /// スケジューラを有効化
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// スケジューラが有効かどうか
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// タイマー割り込み時に呼ばれる
    ///
    /// タイムスライスの期限が来たらtrue
    pub fn tick(&mut self) -> bool {
        if !self.enabled {
            return false;
        }

        self.current_slice += 1;
        if self.current_slice >= self.time_slice {
            self.current_slice = 0;
            true
        } else {
            false
        }
    }

    /// タイムスライスをリセット
    pub fn reset_slice(&mut self) {
        self.current_slice = 0;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl<'fs, H: Hal> Kernel<'fs, H> {
    /// タイマー割り込み
    ///
    /// EOIを送ってから切替先を決める。切替は呼び出し側がロックを離してから行う。
    pub fn on_timer_tick(&mut self) -> Option<Switch> {
        self.hal.end_of_interrupt(TIMER_IRQ);
        if !self.scheduler.tick() {
            return None;
        }
        self.schedule()
    }

    /// 次の端末のプロセスへ切り替える準備をする
    ///
    /// 現在の端末しか動いていなければ何もしない
    pub fn schedule(&mut self) -> Option<Switch> {
        if self.terms.running_count() < 2 {
            return None;
        }
        let from = self.current?;
        let terminal = self.procs.get(from)?.terminal();
        let next = self.terms.next_running_after(terminal)?;
        let to = self.terms.get(next).pid()?;
        if to == from {
            return None;
        }

        self.activate(to);
        self.scheduler.reset_slice();
        crate::trace!("Switch pid {} -> {}", from, to);
        Some(Switch { from, to })
    }

    /// 切替先に保存済みの文脈があることを確かめる
    ///
    /// 無ければ`from`を現在のプロセスに戻して`None`を返す
    pub fn confirm_switch(&mut self, switch: Switch) -> Option<Switch> {
        let saved = self
            .procs
            .get(switch.to)
            .is_some_and(|process| process.context.is_saved());
        if saved {
            return Some(switch);
        }
        crate::warn!("pid {} has no saved context, staying on pid {}", switch.to, switch.from);
        self.activate(switch.from);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TERMINAL_BUFFER_BASE, VGA_PHYS};
    use crate::hal::mock::MockHal;
    use crate::task::Pid;
    use crate::terminal::TermId;
    use crate::testing::{booted, sample_image};
    use x86_64::PhysAddr;

    #[test]
    fn test_time_slice() {
        let mut scheduler = Scheduler::with_time_slice(3);
        assert!(!scheduler.tick());

        scheduler.enable();
        assert!(scheduler.is_enabled());
        assert!(!scheduler.tick());
        assert!(!scheduler.tick());
        assert!(scheduler.tick());
        assert!(!scheduler.tick());
        scheduler.reset_slice();
        assert!(!scheduler.tick());
        assert!(!scheduler.tick());
        assert!(scheduler.tick());

        let mut zero = Scheduler::with_time_slice(0);
        zero.enable();
        assert!(zero.tick());
        assert!(zero.tick());
    }

    #[test]
    fn test_single_terminal_never_switches() {
        let image = sample_image();
        let mut kernel = booted(&image);
        kernel.execute(b"counter").unwrap();
        for _ in 0..50 {
            assert_eq!(kernel.on_timer_tick(), None);
            assert_eq!(kernel.current(), Some(Pid::new(1)));
        }
        assert_eq!(kernel.hal_mut().eois.len(), 50);
        assert!(kernel.hal_mut().eois.iter().all(|&irq| irq == TIMER_IRQ));
    }

    #[test]
    fn test_no_process_is_noop() {
        let image = sample_image();
        let mut kernel = Kernel::new(MockHal::new(), &image).unwrap();
        kernel.scheduler.enable();
        assert_eq!(kernel.on_timer_tick(), None);
        assert_eq!(kernel.hal_mut().eois, [TIMER_IRQ]);
    }

    #[test]
    fn test_round_robin_across_terminals() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let shell1 = kernel.switch_foreground(TermId::new(1)).unwrap().unwrap().pid;
        let shell2 = kernel.switch_foreground(TermId::new(2)).unwrap().unwrap().pid;
        assert_eq!((shell1, shell2), (Pid::new(1), Pid::new(2)));
        assert_eq!(kernel.current(), Some(shell2));

        let order: std::vec::Vec<Pid> = (0..6)
            .filter_map(|_| kernel.on_timer_tick())
            .map(|switch| switch.to)
            .collect();
        assert_eq!(
            order,
            [Pid::new(0), Pid::new(1), Pid::new(2), Pid::new(0), Pid::new(1), Pid::new(2)]
        );
    }

    #[test]
    fn test_switch_needs_saved_context() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let shell1 = kernel.switch_foreground(TermId::new(1)).unwrap().unwrap().pid;

        let switch = kernel.on_timer_tick().unwrap();
        assert_eq!(kernel.confirm_switch(switch), None);
        assert_eq!(kernel.current(), Some(shell1));
        assert_eq!(kernel.address_space().window(), Some(shell1));
        let stack = kernel.procs.kernel_stack_top(shell1);
        assert_eq!(kernel.hal_mut().kernel_stack, Some(stack));

        kernel.procs.get_mut(switch.to).unwrap().context.rsp = 0x1000;
        let switch = kernel.on_timer_tick().unwrap();
        assert_eq!(kernel.confirm_switch(switch), Some(switch));
        assert_eq!(kernel.current(), Some(Pid::new(0)));
    }

    #[test]
    fn test_switch_follows_latest_process_of_terminal() {
        let image = sample_image();
        let mut kernel = booted(&image);
        let child = kernel.execute(b"counter").unwrap().pid;
        kernel.switch_foreground(TermId::new(1)).unwrap();

        let switch = kernel.on_timer_tick().unwrap();
        assert_eq!(switch.to, child);
        assert_eq!(kernel.current(), Some(child));
        assert_eq!(kernel.address_space().window(), Some(child));
        let stack = kernel.procs.kernel_stack_top(child);
        assert_eq!(kernel.hal_mut().kernel_stack, Some(stack));
        // 端末0は背面なのでビデオ窓は退避バッファ
        assert_eq!(
            kernel.address_space().video_target(),
            PhysAddr::new(TERMINAL_BUFFER_BASE)
        );

        let back = kernel.on_timer_tick().unwrap();
        assert_eq!(back.from, child);
        assert_eq!(kernel.address_space().video_target(), PhysAddr::new(VGA_PHYS));
    }
}
