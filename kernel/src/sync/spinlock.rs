//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 单核自旋锁
//!
//! 单核可中断目标上不存在真正的并行，互斥只需要挡住中断：
//! lock 就是进入关中断临界区，unlock 就是退出，没有自旋环节。
//! 中断嵌套计数由 irq 模块维护，嵌套加锁因此是允许的
//! （但同一把锁的守卫不得嵌套持有，那会对数据产生双重可变引用）。

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::irq;

pub struct SpinLock<T> {
    /// 被保护的数据。通过共享引用修改，互斥性由关中断保证
    data: UnsafeCell<T>,
}

// SAFETY: 临界区内只有唯一的执行流访问数据
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            data: UnsafeCell::new(value),
        }
    }

    /// 进入临界区并获得数据访问权
    ///
    /// 返回的守卫在离开作用域时恢复中断状态
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        irq::disable();
        SpinLockGuard { lock: self }
    }

    /// 绕过锁直接取可变引用
    ///
    /// `&mut self` 已在编译期保证独占，初始化阶段使用
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// 临界区守卫
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存活期间中断被屏蔽，访问是独占的
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        irq::enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_gives_access() {
        let lock = SpinLock::new(7_u32);
        {
            let mut g = lock.lock();
            *g += 1;
        }
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn test_get_mut() {
        let mut lock = SpinLock::new(1_u32);
        *lock.get_mut() = 5;
        assert_eq!(*lock.lock(), 5);
    }
}
