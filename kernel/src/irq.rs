//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 中断屏蔽与原子操作原语
//!
//! 单核目标上内核是一个统一的中断屏蔽域：disable/enable 维护一个
//! 可嵌套的计数器，0→1 时真正关中断，1→0 时重新开中断。
//! 调用者必须严格配对，失配会导致中断状态失步（致命级错误，
//! 这里不做防护）。
//!
//! 运行队列与等待队列的全部修改都在这个屏蔽窗口内完成，
//! 这是系统里唯一的加锁手段。

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::arch;

/// 可嵌套的中断屏蔽计数器
///
/// 可以独立实例化（单元测试用），内核全局只有 [`KERNEL_IRQ`] 一份
pub struct IrqMask {
    nesting: AtomicU32,
}

impl IrqMask {
    pub const fn new() -> Self {
        Self {
            nesting: AtomicU32::new(0),
        }
    }

    /// 进入屏蔽，返回是否发生 0→1 跃迁（需要真正关中断）
    pub fn disable(&self) -> bool {
        self.nesting.fetch_add(1, Ordering::Acquire) == 0
    }

    /// 退出屏蔽，返回是否发生 1→0 跃迁（需要重新开中断）
    pub fn enable(&self) -> bool {
        self.nesting.fetch_sub(1, Ordering::Release) == 1
    }

    /// 当前嵌套深度
    pub fn nesting(&self) -> u32 {
        self.nesting.load(Ordering::Relaxed)
    }
}

impl Default for IrqMask {
    fn default() -> Self {
        Self::new()
    }
}

static KERNEL_IRQ: IrqMask = IrqMask::new();

/// 关中断（可嵌套）
pub fn disable() {
    if KERNEL_IRQ.disable() {
        arch::irq_mask();
    }
}

/// 开中断（可嵌套，必须与 [`disable`] 配对）
pub fn enable() {
    if KERNEL_IRQ.enable() {
        arch::irq_unmask();
    }
}

/// 当前全局屏蔽嵌套深度
pub fn nesting() -> u32 {
    KERNEL_IRQ.nesting()
}

/// 作用域式临界区：构造时关中断，析构时开中断
///
/// 所有提前返回路径都由 Drop 保证配对释放
pub struct IrqGuard(());

impl IrqGuard {
    pub fn new() -> Self {
        disable();
        IrqGuard(())
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        enable();
    }
}

// ============================================================
// 机器字原子操作
//
// 单核不可抢占场景下不需要总线锁，关中断已经保证了原子性；
// 这里仍然使用原子类型，使宿主环境（多线程测试）同样正确
// ============================================================

/// 原子加，返回旧值
pub fn atomic_add(v: &AtomicI32, delta: i32) -> i32 {
    v.fetch_add(delta, Ordering::AcqRel)
}

/// 原子加一，返回旧值
pub fn atomic_inc(v: &AtomicI32) -> i32 {
    atomic_add(v, 1)
}

/// 原子减一，返回旧值
pub fn atomic_dec(v: &AtomicI32) -> i32 {
    atomic_add(v, -1)
}

/// 原子读取
pub fn atomic_get(v: &AtomicI32) -> i32 {
    v.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irq_mask_nesting() {
        let mask = IrqMask::new();
        assert_eq!(mask.nesting(), 0);

        // 0→1 跃迁
        assert!(mask.disable());
        assert_eq!(mask.nesting(), 1);

        // 嵌套进入不再跃迁
        assert!(!mask.disable());
        assert_eq!(mask.nesting(), 2);

        // 退出内层不跃迁，退出外层跃迁
        assert!(!mask.enable());
        assert!(mask.enable());
        assert_eq!(mask.nesting(), 0);
    }

    #[test]
    fn test_atomic_ops() {
        let v = AtomicI32::new(3);
        assert_eq!(atomic_inc(&v), 3);
        assert_eq!(atomic_get(&v), 4);
        assert_eq!(atomic_dec(&v), 4);
        assert_eq!(atomic_add(&v, -3), 3);
        assert_eq!(atomic_get(&v), 0);
    }
}
