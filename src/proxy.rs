use crate::object::Retirable;

/// The capability set every reclamation engine satisfies.
///
/// A proxy mediates between writers that retire objects and readers that
/// traverse them: readers hold a [`ProxyRef`] handle and pin it around every
/// critical section, writers hand superseded objects to [`retire`], and the
/// engine destroys each retired object once no reader can still observe it.
///
/// The engine must not be dropped while any handle it issued is still alive.
///
/// 每个回收引擎都满足的能力集合。
/// 代理在退休对象的写入者与遍历对象的读者之间进行协调：读者持有一个
/// [`ProxyRef`] 句柄并在每个临界区周围钉住它，写入者把被替换的对象交给
/// [`retire`]，引擎在没有读者能再观察到某个退休对象后将其销毁。
/// 在其签发的任何句柄仍然存活时，引擎不得被 drop。
///
/// [`retire`]: Proxy::retire
pub trait Proxy: Send + Sync {
    /// The reader handle type issued by this engine.
    /// 此引擎签发的读者句柄类型。
    type Ref: ProxyRef;

    /// Create a handle for one reader thread. The handle is returned to the
    /// engine by dropping it; it must be unpinned at that point.
    ///
    /// 为一个读者线程创建句柄。通过 drop 将句柄交还给引擎；那时它必须
    /// 处于未钉住状态。
    fn acquire_ref(&self) -> Self::Ref;

    /// Transfer ownership of `obj` to the engine for deferred destruction.
    ///
    /// Never blocks on readers; at worst it serialises briefly on an
    /// engine-internal critical section. A null pointer is a no-op.
    ///
    /// # Safety
    /// `obj` must be null, or a pointer obtained from `Box::into_raw` that
    /// has been unlinked from shared state (no *new* reader can reach it)
    /// and has not been retired before. The caller must not use it again.
    ///
    /// 将 `obj` 的所有权转移给引擎以延迟销毁。绝不阻塞在读者上；最坏情况
    /// 下只在引擎内部的临界区上短暂串行。空指针是无操作。
    unsafe fn retire<T: Retirable>(&self, obj: *mut T);
}

/// A reader handle: pins and unpins one reader's critical sections.
///
/// Handles are intended to be one per reader thread. Pinning borrows the
/// handle mutably, so a second `pin` before the first guard is dropped (the
/// re-entrancy the contract forbids) is rejected at compile time.
///
/// 读者句柄：钉住和解除钉住一个读者的临界区。句柄按每个读者线程一个来
/// 使用。钉住以可变方式借用句柄，因此在第一个守卫被 drop 之前再次 `pin`
///（契约禁止的重入）会在编译期被拒绝。
pub trait ProxyRef: Send {
    /// The guard that keeps the reader pinned for its lifetime.
    /// 在其生命周期内保持读者钉住状态的守卫。
    type Guard<'a>: Pinned
    where
        Self: 'a;

    /// Begin a critical section. Wait-free in the lock-free engines.
    /// 开始一个临界区。在无锁引擎中是 wait-free 的。
    fn pin(&mut self) -> Self::Guard<'_>;
}

/// Marker for pin guards. [`ProxyPtr::load`](crate::ProxyPtr::load) borrows
/// against any `Pinned` value so the returned reference cannot outlive the
/// critical section.
///
/// 钉住守卫的标记。[`ProxyPtr::load`] 针对任何 `Pinned` 值进行借用，使返回
/// 的引用不能比临界区活得更久。
pub trait Pinned {}
