//! 同步原语 (Synchronization Primitives)
//!
//! - 自旋锁：单核上就是关中断临界区
//! - 信号量 / 互斥锁：带等待队列的阻塞原语
//! - 条件变量：与外部互斥锁配合的 signal/broadcast
//!
//! 核心约定：所有队列操作都在关中断临界区内完成，
//! 这是系统里唯一的加锁手段。

pub mod condvar;
pub mod semaphore;
pub mod spinlock;

pub use condvar::TaskCond;
pub use semaphore::{Mutex, MutexGuard, Semaphore};
pub use spinlock::{SpinLock, SpinLockGuard};
