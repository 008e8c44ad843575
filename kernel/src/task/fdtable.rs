//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 文件描述符表
//!
//! 每个任务把小整数描述符映射到打开文件对象。文件系统本体
//! 属于外部层，这里只保留打开文件对象的最小形态：打开标志、
//! 操作函数表和私有数据指针。

use core::cell::UnsafeCell;
use core::ptr;

use alloc::sync::Arc;

use crate::config::NR_FDS;
use crate::errno::{Errno, KernResult};
use crate::kassert;

/// 打开标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1;
    pub const O_RDWR: u32 = 2;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn readable(&self) -> bool {
        self.0 & 0x3 != Self::O_WRONLY
    }

    pub fn writable(&self) -> bool {
        self.0 & 0x3 != Self::O_RDONLY
    }
}

/// 文件操作函数表
pub struct FileOps {
    pub read: Option<fn(&File, &mut [u8]) -> isize>,
    pub write: Option<fn(&File, &[u8]) -> isize>,
    pub close: Option<fn(&File)>,
}

/// 打开文件对象
pub struct File {
    flags: FileFlags,
    ops: UnsafeCell<Option<&'static FileOps>>,
    /// 驱动私有数据
    pub private_data: UnsafeCell<*mut u8>,
}

// SAFETY: ops/private_data 只在打开路径一次性设置
unsafe impl Send for File {}
unsafe impl Sync for File {}

impl File {
    pub fn new(flags: FileFlags) -> Self {
        Self {
            flags,
            ops: UnsafeCell::new(None),
            private_data: UnsafeCell::new(ptr::null_mut()),
        }
    }

    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    /// 绑定操作函数表（打开时一次性调用）
    pub fn set_ops(&self, ops: &'static FileOps) {
        // SAFETY: 打开路径单次写入，之后只读
        unsafe {
            *self.ops.get() = Some(ops);
        }
    }

    pub fn set_private_data(&self, data: *mut u8) {
        // SAFETY: 同上
        unsafe {
            *self.private_data.get() = data;
        }
    }

    fn ops(&self) -> Option<&'static FileOps> {
        // SAFETY: 见 set_ops
        unsafe { *self.ops.get() }
    }

    pub fn read(&self, buf: &mut [u8]) -> isize {
        match self.ops().and_then(|o| o.read) {
            Some(f) => f(self, buf),
            None => Errno::OperationNotPermitted.as_neg_i32() as isize,
        }
    }

    pub fn write(&self, buf: &[u8]) -> isize {
        match self.ops().and_then(|o| o.write) {
            Some(f) => f(self, buf),
            None => Errno::OperationNotPermitted.as_neg_i32() as isize,
        }
    }
}

/// 文件描述符表
pub struct FdTable {
    files: [Option<Arc<File>>; NR_FDS],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            files: core::array::from_fn(|_| None),
        }
    }

    /// 在指定描述符上安装文件（覆盖旧项）
    pub fn install_fd(&mut self, fd: usize, file: Arc<File>) -> KernResult<()> {
        kassert!(fd < NR_FDS, Err(Errno::InvalidArgument));
        self.files[fd] = Some(file);
        Ok(())
    }

    /// 分配最小可用描述符
    pub fn alloc_fd(&mut self, file: Arc<File>) -> KernResult<usize> {
        for (fd, slot) in self.files.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(fd);
            }
        }
        Err(Errno::TooManyOpenFiles)
    }

    /// 关闭描述符
    pub fn close_fd(&mut self, fd: usize) -> KernResult<()> {
        kassert!(fd < NR_FDS, Err(Errno::InvalidArgument));
        match self.files[fd].take() {
            Some(file) => {
                if let Some(close) = file.ops().and_then(|o| o.close) {
                    close(&file);
                }
                Ok(())
            }
            None => Err(Errno::InvalidArgument),
        }
    }

    /// 取描述符对应的文件
    pub fn get(&self, fd: usize) -> Option<Arc<File>> {
        self.files.get(fd).and_then(|f| f.clone())
    }

    /// 关闭全部打开文件（任务销毁路径）
    pub fn close_all(&mut self) {
        for fd in 0..NR_FDS {
            if self.files[fd].is_some() {
                let _ = self.close_fd(fd);
            }
        }
    }

    /// 打开文件数
    pub fn open_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_fd_takes_lowest() {
        let mut table = FdTable::new();
        let f0 = table
            .alloc_fd(Arc::new(File::new(FileFlags::new(FileFlags::O_RDONLY))))
            .unwrap();
        let f1 = table
            .alloc_fd(Arc::new(File::new(FileFlags::new(FileFlags::O_WRONLY))))
            .unwrap();
        assert_eq!((f0, f1), (0, 1));

        table.close_fd(0).unwrap();
        let f2 = table
            .alloc_fd(Arc::new(File::new(FileFlags::new(FileFlags::O_RDWR))))
            .unwrap();
        assert_eq!(f2, 0);
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn test_close_invalid_fd() {
        let mut table = FdTable::new();
        assert_eq!(table.close_fd(NR_FDS), Err(Errno::InvalidArgument));
        assert_eq!(table.close_fd(3), Err(Errno::InvalidArgument));
    }

    #[test]
    fn test_file_without_ops_rejects_io() {
        let file = File::new(FileFlags::new(FileFlags::O_RDWR));
        let mut buf = [0_u8; 4];
        assert!(file.read(&mut buf) < 0);
        assert!(file.write(&buf) < 0);
    }

    #[test]
    fn test_flags() {
        assert!(FileFlags::new(FileFlags::O_RDONLY).readable());
        assert!(!FileFlags::new(FileFlags::O_RDONLY).writable());
        assert!(FileFlags::new(FileFlags::O_RDWR).writable());
    }
}
