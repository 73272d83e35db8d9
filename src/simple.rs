//! Lock-backed and no-op engines.
//!
//! These exist to satisfy the contract uniformly, as drop-in comparison
//! points for the real engines; they contain no deferral machinery and
//! destroy retired objects on the spot.
//!
//! 基于锁的引擎和无操作引擎。它们的存在是为了统一地满足契约，作为真实
//! 引擎的可互换对照点；它们不含延迟机制，当场销毁退休对象。

use crate::object::{self, Retirable};
use crate::proxy::{Pinned, Proxy, ProxyRef};
use crate::sync::{
    Arc, Mutex, MutexGuard, Ordering, RwLock, RwLockReadGuard, RwLockWriteGuard, fence,
};

/// Reader-writer-lock engine: pin takes the shared side, retire destroys
/// immediately. Writers take the exclusive side through [`exclusive`] around
/// their updates, which is what makes immediate destruction safe.
///
/// 读写锁引擎：钉住获取共享端，退休立即销毁。写入者在更新周围通过
/// [`exclusive`] 获取独占端，这正是立即销毁得以安全的原因。
///
/// [`exclusive`]: RwLockProxy::exclusive
pub struct RwLockProxy {
    lock: Arc<RwLock<()>>,
}

impl RwLockProxy {
    pub fn new() -> RwLockProxy {
        RwLockProxy {
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// The writer's exclusive section: no reader is pinned while the
    /// returned guard is held.
    ///
    /// 写入者的独占区间：持有返回的守卫期间没有读者处于钉住状态。
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

impl Default for RwLockProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy for RwLockProxy {
    type Ref = RwLockRef;

    fn acquire_ref(&self) -> RwLockRef {
        RwLockRef {
            lock: Arc::clone(&self.lock),
        }
    }

    unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        unsafe { object::destroy_now(obj) }
    }
}

/// Reader handle for [`RwLockProxy`].
/// [`RwLockProxy`] 的读者句柄。
pub struct RwLockRef {
    lock: Arc<RwLock<()>>,
}

impl ProxyRef for RwLockRef {
    type Guard<'a>
        = RwLockPin<'a>
    where
        Self: 'a;

    fn pin(&mut self) -> RwLockPin<'_> {
        RwLockPin {
            _shared: self.lock.read(),
        }
    }
}

/// Shared-lock pin guard.
/// 共享锁钉住守卫。
#[must_use]
pub struct RwLockPin<'a> {
    _shared: RwLockReadGuard<'a, ()>,
}

impl Pinned for RwLockPin<'_> {}

/// Mutex engine: readers and the writer serialise on one mutex, retire
/// destroys immediately.
///
/// 互斥锁引擎：读者与写入者在同一把互斥锁上串行，退休立即销毁。
pub struct MutexProxy {
    mutex: Arc<Mutex<()>>,
}

impl MutexProxy {
    pub fn new() -> MutexProxy {
        MutexProxy {
            mutex: Arc::new(Mutex::new(())),
        }
    }

    /// The writer's exclusive section.
    /// 写入者的独占区间。
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }
}

impl Default for MutexProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy for MutexProxy {
    type Ref = MutexRef;

    fn acquire_ref(&self) -> MutexRef {
        MutexRef {
            mutex: Arc::clone(&self.mutex),
        }
    }

    unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        unsafe { object::destroy_now(obj) }
    }
}

/// Reader handle for [`MutexProxy`].
/// [`MutexProxy`] 的读者句柄。
pub struct MutexRef {
    mutex: Arc<Mutex<()>>,
}

impl ProxyRef for MutexRef {
    type Guard<'a>
        = MutexPin<'a>
    where
        Self: 'a;

    fn pin(&mut self) -> MutexPin<'_> {
        MutexPin {
            _held: self.mutex.lock(),
        }
    }
}

/// Mutex pin guard.
/// 互斥锁钉住守卫。
#[must_use]
pub struct MutexPin<'a> {
    _held: MutexGuard<'a, ()>,
}

impl Pinned for MutexPin<'_> {}

/// No-op engine: pin and unpin are thread fences only, retire destroys
/// immediately.
///
/// Deliberately unsafe as a reclamation scheme; it exists as the performance
/// floor the real engines are measured against. Readers racing a retire will
/// observe freed memory.
///
/// 无操作引擎：钉住与解除钉住仅是线程栅栏，退休立即销毁。作为回收方案它
/// 是蓄意不安全的；它作为真实引擎对照的性能下限而存在。与退休竞争的读者
/// 会观察到已释放的内存。
pub struct NoopProxy;

impl NoopProxy {
    pub fn new() -> NoopProxy {
        NoopProxy
    }
}

impl Default for NoopProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy for NoopProxy {
    type Ref = NoopRef;

    fn acquire_ref(&self) -> NoopRef {
        NoopRef
    }

    unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        unsafe { object::destroy_now(obj) }
    }
}

/// Reader handle for [`NoopProxy`].
/// [`NoopProxy`] 的读者句柄。
pub struct NoopRef;

impl ProxyRef for NoopRef {
    type Guard<'a>
        = NoopPin
    where
        Self: 'a;

    fn pin(&mut self) -> NoopPin {
        fence(Ordering::Acquire);
        NoopPin
    }
}

/// Fence-only pin guard.
/// 仅栅栏的钉住守卫。
#[must_use]
pub struct NoopPin;

impl Pinned for NoopPin {}

impl Drop for NoopPin {
    fn drop(&mut self) {
        fence(Ordering::Release);
    }
}
