//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度策略 (FIFO / Round-Robin)
//!
//! 每种策略私有地持有按优先级分区的运行队列（ListHead 数组，
//! 下标即优先级），通过统一的分发接口接入调度器核心：
//! init / pick_task / enqueue / dequeue / 优先级边界 / 轮转间隔。
//!
//! pick_task 从最高优先级向下扫描，返回第一个非空队列的候选
//! 任务，但不摘除——摘除走 dequeue，发生在任务因别的原因
//! 停止可运行时。所有队列修改都由调用方包在关中断临界区内。

use core::mem::offset_of;

use crate::config::{PRIO_MAX, PRIO_MIN, NR_PRIO, TIME_SLICE_TICKS};
use crate::errno::{Errno, KernResult};
use crate::kassert;
use crate::list::ListHead;
use crate::task::Task;

/// 策略标识，任务控制块反向引用接纳它的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// 先进先出：同级任务严格按入队顺序执行，不主动轮换
    Fifo,
    /// 时间片轮转：同级任务按时间片公平轮换
    Rr,
}

/// 调度策略分发接口
pub trait SchedPolicyOps: Send {
    /// 运行队列原地初始化
    ///
    /// 必须在策略对象落到最终地址（装箱）之后、使用之前调用：
    /// 侵入式队列头按地址自指，初始化后对象不得再移动
    fn init(&mut self);

    fn kind(&self) -> PolicyKind;

    /// 本策略接受的最低优先级
    fn prio_min(&self) -> i32 {
        PRIO_MIN
    }

    /// 本策略接受的最高优先级
    fn prio_max(&self) -> i32 {
        PRIO_MAX
    }

    /// 选出下一个运行任务，不从队列摘除
    fn pick_task(&mut self) -> Option<*mut Task>;

    /// 任务进入运行队列，优先级越界立即失败
    fn enqueue(&mut self, task: *mut Task) -> KernResult<()>;

    /// 任务退出运行队列
    fn dequeue(&mut self, task: *mut Task) -> KernResult<()>;

    /// 轮转时间片长度（滴答数）；非轮转策略无
    fn rr_get_interval(&self) -> Option<u64>;

    /// 当前入队任务数
    fn nr_queued(&self) -> usize;
}

/// 按优先级分区的运行队列存储，两种策略共用
struct PrioQueues {
    /// 每个优先级一条队列，下标即优先级
    queues: [ListHead; NR_PRIO],
    nr_queued: usize,
}

impl PrioQueues {
    fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| ListHead::new()),
            nr_queued: 0,
        }
    }

    fn init(&mut self) {
        for q in self.queues.iter_mut() {
            q.init();
        }
        self.nr_queued = 0;
    }

    /// 最高的非空优先级
    fn top_nonempty(&self) -> Option<usize> {
        (0..NR_PRIO).rev().find(|&q| !self.queues[q].is_empty())
    }

    /// 指定优先级的队首任务
    fn head_task(&mut self, prio: usize) -> Option<*mut Task> {
        // SAFETY: 队列里只挂 Task::link 节点
        unsafe { ListHead::first_entry::<Task>(&mut self.queues[prio], offset_of!(Task, link)) }
    }

    fn enqueue(&mut self, task: *mut Task) -> KernResult<()> {
        kassert!(!task.is_null(), Err(Errno::InvalidArgument));
        // SAFETY: 非空指针由上面保证，队列操作在调用方的临界区内
        unsafe {
            let prio = (*task).prio();
            kassert!(
                (PRIO_MIN..=PRIO_MAX).contains(&prio),
                Err(Errno::InvalidArgument)
            );
            // 一个任务同一时刻只能挂在一条链表上
            kassert!(!(*task).is_linked(), Err(Errno::InvalidArgument));
            (*task).link.add_tail(&mut self.queues[prio as usize]);
        }
        self.nr_queued += 1;
        Ok(())
    }

    fn dequeue(&mut self, task: *mut Task) -> KernResult<()> {
        kassert!(!task.is_null(), Err(Errno::InvalidArgument));
        // SAFETY: 同 enqueue
        unsafe {
            let prio = (*task).prio();
            kassert!(
                (PRIO_MIN..=PRIO_MAX).contains(&prio),
                Err(Errno::InvalidArgument)
            );
            kassert!((*task).is_linked(), Err(Errno::InvalidArgument));
            (*task).link.del();
        }
        self.nr_queued -= 1;
        Ok(())
    }
}

/// FIFO 策略
///
/// 每级队首就是下一个任务，严格保持入队顺序；
/// 同级或更低优先级的任务不会被主动抢占
pub struct FifoPolicy {
    rq: PrioQueues,
}

unsafe impl Send for FifoPolicy {}

impl FifoPolicy {
    pub fn new() -> Self {
        Self {
            rq: PrioQueues::new(),
        }
    }
}

impl Default for FifoPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedPolicyOps for FifoPolicy {
    fn init(&mut self) {
        self.rq.init();
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Fifo
    }

    fn pick_task(&mut self) -> Option<*mut Task> {
        let prio = self.rq.top_nonempty()?;
        self.rq.head_task(prio)
    }

    fn enqueue(&mut self, task: *mut Task) -> KernResult<()> {
        self.rq.enqueue(task)
    }

    fn dequeue(&mut self, task: *mut Task) -> KernResult<()> {
        self.rq.dequeue(task)
    }

    fn rr_get_interval(&self) -> Option<u64> {
        None
    }

    fn nr_queued(&self) -> usize {
        self.rq.nr_queued
    }
}

/// Round-Robin 策略
///
/// 选中队首之后把该级队列旋转一格，于是连续的 pick 按入队
/// 顺序循环遍历同级任务（A,B,C,A,B,C,…）。旋转放在选中之后
/// 而不是之前：先旋转会让首个入队的任务在第一轮被跳过。
pub struct RrPolicy {
    rq: PrioQueues,
}

unsafe impl Send for RrPolicy {}

impl RrPolicy {
    pub fn new() -> Self {
        Self {
            rq: PrioQueues::new(),
        }
    }
}

impl Default for RrPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedPolicyOps for RrPolicy {
    fn init(&mut self) {
        self.rq.init();
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Rr
    }

    fn pick_task(&mut self) -> Option<*mut Task> {
        let prio = self.rq.top_nonempty()?;
        let task = self.rq.head_task(prio)?;
        // SAFETY: 队列头在 init 后地址稳定
        unsafe {
            self.rq.queues[prio].rotate_anticlockwise();
        }
        Some(task)
    }

    fn enqueue(&mut self, task: *mut Task) -> KernResult<()> {
        self.rq.enqueue(task)
    }

    fn dequeue(&mut self, task: *mut Task) -> KernResult<()> {
        self.rq.dequeue(task)
    }

    /// 时间片长度，由系统滴答频率推导
    fn rr_get_interval(&self) -> Option<u64> {
        Some(TIME_SLICE_TICKS as u64)
    }

    fn nr_queued(&self) -> usize {
        self.rq.nr_queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    fn spawn(policy: PolicyKind, prio: i32) -> *mut Task {
        Box::into_raw(Box::new(Task::new(0, policy, prio, "t")))
    }

    unsafe fn reap(tasks: &[*mut Task]) {
        for &t in tasks {
            if (*t).is_linked() {
                (*t).link.del();
            }
            drop(Box::from_raw(t));
        }
    }

    #[test]
    fn test_fifo_priority_scenario() {
        // 按 [2, 5, 2, 5] 的优先级顺序入队：
        // 先选第一个 5，其退出后选第二个 5，再按原序选两个 2
        let mut pol = FifoPolicy::new();
        pol.init();

        let t2a = spawn(PolicyKind::Fifo, 2);
        let t5a = spawn(PolicyKind::Fifo, 5);
        let t2b = spawn(PolicyKind::Fifo, 2);
        let t5b = spawn(PolicyKind::Fifo, 5);
        for &t in [t2a, t5a, t2b, t5b].iter() {
            pol.enqueue(t).unwrap();
        }

        assert_eq!(pol.pick_task(), Some(t5a));
        // 不摘除时重复选择同一个任务（FIFO 不轮换）
        assert_eq!(pol.pick_task(), Some(t5a));

        pol.dequeue(t5a).unwrap();
        assert_eq!(pol.pick_task(), Some(t5b));
        pol.dequeue(t5b).unwrap();
        assert_eq!(pol.pick_task(), Some(t2a));
        pol.dequeue(t2a).unwrap();
        assert_eq!(pol.pick_task(), Some(t2b));
        pol.dequeue(t2b).unwrap();
        assert_eq!(pol.pick_task(), None);

        unsafe { reap(&[t2a, t5a, t2b, t5b]) };
    }

    #[test]
    fn test_rr_rotation_law() {
        // 同级任务 A,B,C 按入队顺序轮转：A,B,C,A,B,C
        let mut pol = RrPolicy::new();
        pol.init();

        let a = spawn(PolicyKind::Rr, 4);
        let b = spawn(PolicyKind::Rr, 4);
        let c = spawn(PolicyKind::Rr, 4);
        for &t in [a, b, c].iter() {
            pol.enqueue(t).unwrap();
        }

        let picks: Vec<*mut Task> = (0..6).map(|_| pol.pick_task().unwrap()).collect();
        assert_eq!(picks, [a, b, c, a, b, c]);

        unsafe { reap(&[a, b, c]) };
    }

    #[test]
    fn test_rr_fairness_after_block() {
        let mut pol = RrPolicy::new();
        pol.init();

        let a = spawn(PolicyKind::Rr, 1);
        let b = spawn(PolicyKind::Rr, 1);
        let c = spawn(PolicyKind::Rr, 1);
        for &t in [a, b, c].iter() {
            pol.enqueue(t).unwrap();
        }

        assert_eq!(pol.pick_task(), Some(a));
        // a 阻塞退出队列后，轮转在剩余任务间继续
        pol.dequeue(a).unwrap();
        assert_eq!(pol.pick_task(), Some(b));
        assert_eq!(pol.pick_task(), Some(c));
        assert_eq!(pol.pick_task(), Some(b));

        unsafe { reap(&[a, b, c]) };
    }

    #[test]
    fn test_cross_priority_is_strict() {
        let mut pol = RrPolicy::new();
        pol.init();

        let low = spawn(PolicyKind::Rr, 1);
        let high = spawn(PolicyKind::Rr, 9);
        pol.enqueue(low).unwrap();
        pol.enqueue(high).unwrap();

        // 高优先级永远先于低优先级，没有照顾低级别的机制
        for _ in 0..4 {
            assert_eq!(pol.pick_task(), Some(high));
        }
        pol.dequeue(high).unwrap();
        assert_eq!(pol.pick_task(), Some(low));

        unsafe { reap(&[low, high]) };
    }

    #[test]
    fn test_enqueue_validates_priority() {
        let mut pol = FifoPolicy::new();
        pol.init();

        let bad_high = spawn(PolicyKind::Fifo, PRIO_MAX + 1);
        let bad_low = spawn(PolicyKind::Fifo, -1);
        assert_eq!(pol.enqueue(bad_high), Err(Errno::InvalidArgument));
        assert_eq!(pol.enqueue(bad_low), Err(Errno::InvalidArgument));
        assert_eq!(pol.nr_queued(), 0);

        unsafe { reap(&[bad_high, bad_low]) };
    }

    #[test]
    fn test_double_enqueue_rejected() {
        // 任务同一时刻最多挂一条链表
        let mut pol = FifoPolicy::new();
        pol.init();

        let t = spawn(PolicyKind::Fifo, 3);
        pol.enqueue(t).unwrap();
        assert_eq!(pol.enqueue(t), Err(Errno::InvalidArgument));
        assert_eq!(pol.nr_queued(), 1);

        unsafe { reap(&[t]) };
    }

    #[test]
    fn test_rr_interval() {
        let fifo = FifoPolicy::new();
        let rr = RrPolicy::new();
        assert_eq!(fifo.rr_get_interval(), None);
        assert_eq!(rr.rr_get_interval(), Some(TIME_SLICE_TICKS as u64));
        assert_eq!(fifo.prio_min(), PRIO_MIN);
        assert_eq!(fifo.prio_max(), PRIO_MAX);
    }
}
