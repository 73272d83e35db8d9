use crate::object::Retirable;
use crate::proxy::{Pinned, Proxy};
use crate::sync::{AtomicPtr, Ordering};
use std::ptr;

/// An engine-protected publication pointer.
///
/// `ProxyPtr<T>` is an atomic pointer that readers load while pinned and a
/// writer republishes through [`store`], retiring the superseded value into
/// whichever engine the writer passes in.
///
/// **Safety contract**:
/// - Readers must hold a pin guard when calling [`load`]; the returned
///   reference is lifetime-bound to the guard, so it cannot escape the
///   critical section.
/// - All stores on pointers reachable by the same readers must go through
///   the same engine, and with the lock-backed engines the writer must hold
///   the exclusive side around the store.
///
/// 受引擎保护的发布指针。
/// `ProxyPtr<T>` 是一个原子指针：读者在钉住状态下加载它，写入者通过
/// [`store`] 重新发布并把被替换的值退休到传入的引擎。
/// **安全合约**：读者调用 [`load`] 时必须持有钉住守卫；返回的引用的生命
/// 周期绑定到守卫，因此不能逃出临界区。对同一批读者可达的指针的所有存储
/// 必须经过同一个引擎。
///
/// [`load`]: ProxyPtr::load
/// [`store`]: ProxyPtr::store
pub struct ProxyPtr<T> {
    ptr: AtomicPtr<T>,
}

// The atomic pointer hands out &T across threads and moves Box<T> ownership
// into the engines, so the usual container bounds apply.
unsafe impl<T: Send> Send for ProxyPtr<T> {}
unsafe impl<T: Send + Sync> Sync for ProxyPtr<T> {}

impl<T: Retirable> ProxyPtr<T> {
    /// Create a pointer publishing the given value.
    /// 创建一个发布给定值的指针。
    #[inline]
    pub fn new(data: T) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(data))),
        }
    }

    /// Create an empty pointer.
    /// 创建一个空指针。
    #[inline]
    pub fn null() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Reader load: the current value, or `None` if nothing is published.
    ///
    /// The guard parameter is what makes this safe: the reference cannot
    /// outlive the pin, and the engine will not destroy the value while the
    /// pin covers it.
    ///
    /// 读者加载：当前值，若未发布任何内容则为 `None`。守卫参数是安全性的
    /// 来源：引用不能比钉住活得更久，而引擎在钉住覆盖期间不会销毁该值。
    #[inline]
    pub fn load<'g, G: Pinned>(&self, _guard: &'g G) -> Option<&'g T> {
        unsafe { self.ptr.load(Ordering::Acquire).as_ref() }
    }

    /// Writer store: publish a new value and retire the old one into
    /// `proxy`.
    ///
    /// 写入者存储：发布一个新值，并将旧值退休到 `proxy`。
    #[inline]
    pub fn store<P: Proxy>(&self, data: T, proxy: &P) {
        let new_ptr = Box::into_raw(Box::new(data));
        let old_ptr = self.ptr.swap(new_ptr, Ordering::AcqRel);
        unsafe { proxy.retire(old_ptr) };
    }

    /// Unpublish: clear the pointer and retire whatever it held.
    ///
    /// 取消发布：清空指针并退休它所持有的值。
    #[inline]
    pub fn take<P: Proxy>(&self, proxy: &P) {
        let old_ptr = self.ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        unsafe { proxy.retire(old_ptr) };
    }
}

impl<T> std::fmt::Debug for ProxyPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ptr = self.ptr.load(Ordering::Relaxed);
        f.debug_tuple("ProxyPtr").field(&ptr).finish()
    }
}

impl<T> Drop for ProxyPtr<T> {
    /// Drops the still-published value, if any.
    ///
    /// At drop time no reader can be pinned on this pointer any more, so the
    /// final value is taken back directly instead of going through an
    /// engine.
    ///
    /// drop 仍在发布中的值（如果有）。drop 时不再有读者钉住此指针，因此
    /// 最后的值被直接收回而不经过引擎。
    #[inline]
    fn drop(&mut self) {
        let ptr = self.ptr.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}
