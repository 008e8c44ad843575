//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 双向循环链表实现
//!
//! 参考 Linux: include/linux/list.h
//!
//! 用途：
//! - 调度队列: 每个优先级一条运行队列
//! - 等待队列: 信号量/条件变量的阻塞任务链
//! - 定时器: 按到期时间排序的看门狗链
//!
//! 设计特点：
//! - 侵入式链表：list_head 直接嵌入数据结构中
//! - 不拥有所含对象，只是穿过别处拥有的内存
//! - 同一个节点同一时刻最多挂在一条链表上，插入时在
//!   调试构建下检查重复挂链（违反即为使用错误）
//!
//! 并发约定：调用者负责串行化，所有现有调用点都包在
//! 关中断临界区里。

use core::ptr;

#[repr(C)]
pub struct ListHead {
    /// 下一个节点
    pub next: *mut ListHead,
    /// 前一个节点
    pub prev: *mut ListHead,
}

impl ListHead {
    /// 创建一个新的链表节点
    ///
    /// 通常用于初始化链表头；使用前必须调用 [`init`](Self::init)
    pub const fn new() -> Self {
        Self {
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        }
    }

    /// 初始化链表节点
    ///
    /// 使节点指向自己，形成一个空链表。
    /// 节点一旦挂入链表，所在结构体不得再移动（按地址链接）。
    pub fn init(&mut self) {
        self.next = self;
        self.prev = self;
    }

    /// 检查链表是否为空
    pub fn is_empty(&self) -> bool {
        self.next == self as *const _ as *mut _
    }

    /// 检查节点是否挂在某条链表上
    ///
    /// 未初始化（空指针）和自环（已 init 或已 del）都视为未挂链
    pub fn is_linked(&self) -> bool {
        !self.next.is_null() && self.next != self as *const _ as *mut _
    }

    /// 在指定节点之后插入当前节点（即链表头部）
    ///
    /// # Safety
    /// 调用者必须确保 `head` 是有效的
    pub unsafe fn add(&mut self, head: *mut ListHead) {
        debug_assert!(!self.is_linked(), "list node already linked");
        let next = (*head).next;

        // 插入当前节点到 head 和 head->next 之间
        self.next = next;
        self.prev = head;
        (*head).next = self;
        (*next).prev = self;
    }

    /// 在链表尾部添加节点
    ///
    /// # 参数
    /// - `head`: 链表头（在 head 之前插入，即尾部）
    ///
    /// # Safety
    /// 调用者必须确保 `head` 是有效的
    pub unsafe fn add_tail(&mut self, head: *mut ListHead) {
        debug_assert!(!self.is_linked(), "list node already linked");
        let prev = (*head).prev;

        // 插入当前节点到 head->prev 和 head 之间
        self.next = head;
        self.prev = prev;
        (*head).prev = self;
        (*prev).next = self;
    }

    /// 按比较器有序插入当前节点
    ///
    /// 从头部开始线性扫描，直到比较器认定当前节点应排在候选
    /// 节点之前，然后插到那里。稳定插入：键相等的节点排在已有
    /// 节点之后。O(n)。
    ///
    /// # 参数
    /// - `head`: 链表头
    /// - `less`: less(new, pos) 为真表示 new 应排在 pos 之前
    ///
    /// # Safety
    /// 调用者必须确保 `head` 是有效的，且比较器不修改链表
    pub unsafe fn sorted_add<F>(&mut self, head: *mut ListHead, mut less: F)
    where
        F: FnMut(*const ListHead, *const ListHead) -> bool,
    {
        let mut pos = (*head).next;
        while pos != head {
            if less(self as *const _, pos as *const _) {
                break;
            }
            pos = (*pos).next;
        }

        // 插到 pos 之前；pos 回到 head 时即追加到尾部
        self.add_tail(pos);
    }

    /// 从链表中删除当前节点
    ///
    /// 删除后节点恢复自环，因此重复 del 不会破坏链表；
    /// 但对仍挂在链表上的节点保存的旧指针再操作属于使用错误
    ///
    /// # Safety
    /// 调用者必须确保节点在链表中
    pub unsafe fn del(&mut self) {
        let next = self.next;
        let prev = self.prev;
        debug_assert!(
            (*next).prev == self as *mut _ && (*prev).next == self as *mut _,
            "list node corrupted"
        );

        (*next).prev = prev;
        (*prev).next = next;

        // 恢复自环（同时作为"未挂链"标记）
        self.next = self as *mut _;
        self.prev = self as *mut _;
    }

    /// 逆时针旋转一格：头部第一个节点移到尾部
    ///
    /// 链表头本身是可移动的哨兵，轮转调度用它实现同优先级
    /// 任务间的公平轮换
    ///
    /// # Safety
    /// `self` 必须是已初始化的链表头
    pub unsafe fn rotate_anticlockwise(&mut self) {
        if self.is_empty() {
            return;
        }
        let first = self.next;
        if (*first).next == self as *mut _ {
            // 只有一个元素，旋转是空操作
            return;
        }
        (*first).del();
        (*first).add_tail(self as *mut _);
    }

    /// 顺时针旋转一格：尾部最后一个节点移到头部
    ///
    /// # Safety
    /// `self` 必须是已初始化的链表头
    pub unsafe fn rotate_clockwise(&mut self) {
        if self.is_empty() {
            return;
        }
        let last = self.prev;
        if (*last).prev == self as *mut _ {
            return;
        }
        (*last).del();
        (*last).add(self as *mut _);
    }

    /// 获取包含此 ListHead 的结构体指针
    ///
    /// # 参数
    /// - `ptr`: ListHead 指针
    /// - `offset`: ListHead 字段在结构体中的偏移（offset_of!）
    ///
    /// # Safety
    /// 调用者必须确保 `ptr` 指向 `T` 中偏移为 `offset` 的字段
    pub unsafe fn entry<T>(ptr: *mut ListHead, offset: usize) -> *mut T {
        (ptr as *mut u8).sub(offset) as *mut T
    }

    /// 获取第一个节点所在的结构体指针
    ///
    /// # Safety
    /// 同 [`entry`](Self::entry)，且 `head` 必须是有效链表头
    pub unsafe fn first_entry<T>(head: *mut ListHead, offset: usize) -> Option<*mut T> {
        if (*head).next == head {
            None
        } else {
            Some(Self::entry((*head).next, offset))
        }
    }

    /// 遍历链表
    ///
    /// # Safety
    /// 调用者必须确保 `head` 是有效的；闭包可以删除当前节点，
    /// 但不得改动链表的其他部分
    pub unsafe fn for_each<F>(head: *mut ListHead, mut f: F)
    where
        F: FnMut(*mut ListHead),
    {
        let mut pos = (*head).next;
        while pos != head {
            let next = (*pos).next;
            f(pos);
            pos = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn collect(head: *mut ListHead) -> alloc::vec::Vec<*mut ListHead> {
        let mut v = alloc::vec::Vec::new();
        ListHead::for_each(head, |n| v.push(n));
        v
    }

    #[test]
    fn test_list_init() {
        let mut head = ListHead::new();
        head.init();
        assert!(head.is_empty());
        assert!(!head.is_linked());
        assert_eq!(head.next, &head as *const _ as *mut _);
        assert_eq!(head.prev, &head as *const _ as *mut _);
    }

    #[test]
    fn test_list_add() {
        unsafe {
            let mut head = ListHead::new();
            head.init();

            let mut node1 = ListHead::new();
            node1.init();
            node1.add(&mut head);

            assert!(!head.is_empty());
            assert!(node1.is_linked());
            assert_eq!(head.next, &node1 as *const _ as *mut _);
            assert_eq!(head.prev, &node1 as *const _ as *mut _);
        }
    }

    #[test]
    fn test_list_add_tail() {
        unsafe {
            let mut head = ListHead::new();
            head.init();

            let mut node1 = ListHead::new();
            node1.init();
            node1.add_tail(&mut head);

            let mut node2 = ListHead::new();
            node2.init();
            node2.add_tail(&mut head);

            // head -> node1 -> node2 -> head
            assert_eq!(head.next, &node1 as *const _ as *mut _);
            assert_eq!(node1.next, &node2 as *const _ as *mut _);
            assert_eq!(node2.next, &head as *const _ as *mut _);
        }
    }

    #[test]
    fn test_list_del() {
        unsafe {
            let mut head = ListHead::new();
            head.init();

            let mut node1 = ListHead::new();
            node1.init();
            node1.add(&mut head);

            assert!(!head.is_empty());

            node1.del();

            assert!(head.is_empty());
            assert!(!node1.is_linked());
        }
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_link_rejected() {
        unsafe {
            let mut head = ListHead::new();
            head.init();
            let mut other = ListHead::new();
            other.init();

            let mut node = ListHead::new();
            node.init();
            node.add_tail(&mut head);
            // 同一节点同时挂两条链表：调试构建下直接拒绝
            node.add_tail(&mut other);
        }
    }

    #[test]
    fn test_sorted_add_is_stable() {
        // 用节点地址之外的键排序：借 prev 字段存键不行，
        // 直接按包含结构排序
        #[repr(C)]
        struct Item {
            node: ListHead,
            key: u32,
        }
        unsafe fn key_of(n: *const ListHead) -> u32 {
            (*(n as *const Item)).key
        }

        unsafe {
            let mut head = ListHead::new();
            head.init();

            let mut items = [
                Item { node: ListHead::new(), key: 30 },
                Item { node: ListHead::new(), key: 10 },
                Item { node: ListHead::new(), key: 20 },
                Item { node: ListHead::new(), key: 20 },
            ];
            for it in items.iter_mut() {
                it.node.init();
            }
            let base = items.as_mut_ptr();
            for i in 0..items.len() {
                (*base.add(i))
                    .node
                    .sorted_add(&mut head, |a, b| unsafe { key_of(a) < key_of(b) });
            }

            let order: alloc::vec::Vec<u32> = collect(&mut head)
                .into_iter()
                .map(|n| unsafe { key_of(n) })
                .collect();
            assert_eq!(order, [10, 20, 20, 30]);

            // 稳定性：两个 20 保持插入顺序（先 items[2] 后 items[3]）
            let nodes = collect(&mut head);
            assert_eq!(nodes[1], &mut (*base.add(2)).node as *mut _);
            assert_eq!(nodes[2], &mut (*base.add(3)).node as *mut _);
        }
    }

    #[test]
    fn test_rotate_anticlockwise() {
        unsafe {
            let mut head = ListHead::new();
            head.init();
            let mut a = ListHead::new();
            let mut b = ListHead::new();
            let mut c = ListHead::new();
            for n in [&mut a, &mut b, &mut c] {
                n.init();
            }
            a.add_tail(&mut head);
            b.add_tail(&mut head);
            c.add_tail(&mut head);

            // a b c -> b c a
            head.rotate_anticlockwise();
            let order = collect(&mut head);
            assert_eq!(order[0], &mut b as *mut _);
            assert_eq!(order[2], &mut a as *mut _);

            // 再转两次回到原序
            head.rotate_anticlockwise();
            head.rotate_anticlockwise();
            let order = collect(&mut head);
            assert_eq!(order[0], &mut a as *mut _);
        }
    }

    #[test]
    fn test_rotate_clockwise() {
        unsafe {
            let mut head = ListHead::new();
            head.init();
            let mut a = ListHead::new();
            let mut b = ListHead::new();
            let mut c = ListHead::new();
            for n in [&mut a, &mut b, &mut c] {
                n.init();
            }
            a.add_tail(&mut head);
            b.add_tail(&mut head);
            c.add_tail(&mut head);

            // a b c -> c a b
            head.rotate_clockwise();
            let order = collect(&mut head);
            assert_eq!(order[0], &mut c as *mut _);
            assert_eq!(order[1], &mut a as *mut _);
        }
    }

    #[test]
    fn test_rotate_single_element_is_noop() {
        unsafe {
            let mut head = ListHead::new();
            head.init();
            let mut a = ListHead::new();
            a.init();
            a.add_tail(&mut head);

            head.rotate_anticlockwise();
            assert_eq!(head.next, &mut a as *mut _);
            head.rotate_clockwise();
            assert_eq!(head.next, &mut a as *mut _);
        }
    }
}
