//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内核内存分配接口
//!
//! 任务控制块、任务栈等动态对象统一走 kmalloc/kzalloc/kfree。
//! 宿主环境下直接落在全局分配器上；裸机目标启用 `heap` 特性后，
//! 由 linked_list_allocator 提供全局分配器，板级启动代码负责
//! 调用 [`init_heap`] 交出堆内存区间。

use core::alloc::Layout;

use alloc::alloc::{alloc, alloc_zeroed, dealloc};

/// 分配一块内存，失败返回空指针
///
/// # Safety
/// `layout` 的 size 必须非 0
pub unsafe fn kmalloc(layout: Layout) -> *mut u8 {
    alloc(layout)
}

/// 分配一块清零的内存，失败返回空指针
///
/// # Safety
/// `layout` 的 size 必须非 0
pub unsafe fn kzalloc(layout: Layout) -> *mut u8 {
    alloc_zeroed(layout)
}

/// 释放 kmalloc/kzalloc 分配的内存
///
/// # Safety
/// `ptr` 必须是同一 `layout` 下 kmalloc/kzalloc 的返回值
pub unsafe fn kfree(ptr: *mut u8, layout: Layout) {
    dealloc(ptr, layout);
}

#[cfg(all(feature = "heap", not(test)))]
mod heap {
    use linked_list_allocator::LockedHeap;

    #[global_allocator]
    static KERNEL_HEAP: LockedHeap = LockedHeap::empty();

    /// 初始化裸机堆
    ///
    /// # Safety
    /// `[start, start + size)` 必须是本内核独占的可写内存，
    /// 且只能调用一次
    pub unsafe fn init_heap(start: *mut u8, size: usize) {
        KERNEL_HEAP.lock().init(start, size);
    }
}

#[cfg(all(feature = "heap", not(test)))]
pub use heap::init_heap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kzalloc_zeroes() {
        unsafe {
            let layout = Layout::from_size_align(64, 8).unwrap();
            let p = kzalloc(layout);
            assert!(!p.is_null());
            for i in 0..64 {
                assert_eq!(*p.add(i), 0);
            }
            kfree(p, layout);
        }
    }
}
