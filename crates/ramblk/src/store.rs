//! 设备的后备内存，一整块在创建时清零的连续字节
//!
//! 这里不做任何边界检查和加锁，调用者（即 [`Dispatcher`]）负责保证访问范围合法，
//! 并保证不会有与写操作重叠的并发访问
//!
//! [`Dispatcher`]: crate::Dispatcher

use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
};

use defines::error::{errno, KResult};

pub struct BackingStore {
    ptr: NonNull<u8>,
    layout: Layout,
}

// 所有并发访问都需要调用者通过 unsafe 方法自行保证互斥
unsafe impl Send for BackingStore {}
unsafe impl Sync for BackingStore {}

impl BackingStore {
    /// 分配 `len` 字节并清零。分配失败时返回 `ENOMEM`，不会 abort
    pub fn new_zeroed(len: usize) -> KResult<Self> {
        if len == 0 {
            return Err(errno::EINVAL);
        }
        let layout = Layout::array::<u8>(len).map_err(|_layout_err| errno::ENOMEM)?;
        // SAFETY: layout 的大小非零
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(errno::ENOMEM)?;
        Ok(Self { ptr, layout })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// 把 `[offset, offset + dst.len())` 的内容复制到 `dst`
    ///
    /// # Safety
    ///
    /// `offset + dst.len()` 不能超过 [`capacity`](Self::capacity)，并且期间不能有对该范围的并发写
    #[inline]
    pub unsafe fn read_at(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.capacity());
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// 把 `src` 复制到 `[offset, offset + src.len())`
    ///
    /// # Safety
    ///
    /// `offset + src.len()` 不能超过 [`capacity`](Self::capacity)，并且期间不能有对该范围的其它并发访问
    #[inline]
    pub unsafe fn write_at(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.capacity());
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        // SAFETY: ptr 与 layout 都来自 `new_zeroed`
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
