//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 睡眠
//!
//! usleep/msleep 不忙等：在栈上建一个零许可的信号量和一个
//! 看门狗，看门狗到期回调归还许可，调用任务在信号量上阻塞，
//! 等待期间让出处理器。

use crate::errno::{Errno, KernResult};
use crate::sched::{self, Scheduler};
use crate::sync::Semaphore;
use crate::time::{usecs_to_ticks, wdog::Wdog};

/// 看门狗回调：唤醒睡眠任务
fn sleep_wakeup(sched: &Scheduler, arg: *mut u8) {
    // SAFETY: arg 指向 usleep_on 栈帧里的信号量，
    // 睡眠任务返回之前栈帧一直存活
    let sem = unsafe { &*(arg as *const Semaphore) };
    sem.unlock_on(sched);
}

/// 睡眠至少 `usecs` 微秒
///
/// 时长向上取整到滴答边界，只会多睡不会少睡
pub fn usleep(usecs: u64) -> KernResult<()> {
    match sched::kernel() {
        Some(k) => usleep_on(k, usecs),
        None => {
            log::error!("usleep before scheduler init");
            Err(Errno::OperationNotPermitted)
        }
    }
}

pub(crate) fn usleep_on(sched: &Scheduler, usecs: u64) -> KernResult<()> {
    let sem = Semaphore::new(0);
    let mut wdog = Wdog::new();

    sched.wdog_start(
        &mut wdog,
        usecs_to_ticks(usecs),
        sleep_wakeup,
        &sem as *const _ as *mut u8,
    )?;

    let woken = sem.lock_on(sched);

    // 正常路径上看门狗已触发，这里只是兜底
    let _ = sched.wdog_cancel(&mut wdog);

    if woken {
        Ok(())
    } else {
        Err(Errno::InterruptedSystemCall)
    }
}

/// 睡眠至少 `msecs` 毫秒
pub fn msleep(msecs: u64) -> KernResult<()> {
    usleep(msecs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USEC_PER_TICK;
    use crate::irq::IrqGuard;
    use crate::sched::PolicyKind;
    use crate::time::usecs_to_ticks;

    fn noop_entry(_arg: usize) {}

    #[test]
    fn test_sleep_parks_and_wakes_at_deadline() {
        // usleep 的组成部分：零许可信号量 + 看门狗回调；
        // 到期前决不返回，等待期间让出处理器（不忙等）
        let sched = Scheduler::new(PolicyKind::Fifo);
        let sleeper = sched.task_run("sleeper", noop_entry, 0, 2, 256).unwrap();
        let other = sched.task_run("other", noop_entry, 0, 2, 256).unwrap();
        sched.schedule();
        assert_eq!(sched.current(), Some(sleeper));

        let sem = Semaphore::new(0);
        let mut wdog = Wdog::new();
        let delay = usecs_to_ticks(3 * USEC_PER_TICK);
        assert_eq!(delay, 3);
        sched
            .wdog_start(&mut wdog, delay, sleep_wakeup, &sem as *const _ as *mut u8)
            .unwrap();

        // 睡眠任务阻塞在信号量上，处理器让给其他任务
        {
            let _g = IrqGuard::new();
            assert!(sched.block_current_on(sem.wait_head()));
        }
        assert_eq!(sched.current(), Some(other));
        // SAFETY: 控制块在 task_kill 之前存活
        unsafe {
            assert!((*sleeper).is_blocked());
        }

        // 到期前的滴答不唤醒
        sched.scheduler_tick();
        sched.scheduler_tick();
        unsafe {
            assert!((*sleeper).is_blocked());
        }
        assert_eq!(sem.count(), 0);

        // 到期滴答：回调归还许可并唤醒睡眠任务
        sched.scheduler_tick();
        unsafe {
            assert!((*sleeper).is_runnable());
        }
        // 睡眠任务恢复后的重查拿到许可（usleep 返回点）
        assert!(sem.trylock());

        sched.task_kill(sleeper).unwrap();
        sched.task_kill(other).unwrap();
    }

    #[test]
    fn test_subtick_sleep_rounds_up() {
        // 不足一个滴答的睡眠也要等到下一个滴答边界，决不提前
        let sched = Scheduler::new(PolicyKind::Fifo);
        let sem = Semaphore::new(0);
        let mut wdog = Wdog::new();

        sched
            .wdog_start(
                &mut wdog,
                usecs_to_ticks(1000),
                sleep_wakeup,
                &sem as *const _ as *mut u8,
            )
            .unwrap();

        assert!(!sem.trylock());
        sched.scheduler_tick();
        assert!(sem.trylock());
    }
}
