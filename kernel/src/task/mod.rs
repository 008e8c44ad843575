//! 任务管理
//!
//! 控制块、文件描述符表与 PID 分配。
//! 生命周期操作（创建/运行/杀死/退出）在 sched 模块，
//! 需要与运行队列联动。

pub mod fdtable;
pub mod pid;
pub mod task;

pub use fdtable::{FdTable, File, FileFlags, FileOps};
pub use pid::{alloc_pid, free_pid, PID_IDLE};
pub use task::{Pid, Task, TaskState, TASK_NAME_LEN};
