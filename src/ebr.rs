use crate::barrier;
use crate::epoch::{AtomicEpoch, Epoch};
use crate::object::{self, Retirable, Retired};
use crate::proxy::{Pinned, Proxy, ProxyRef};
use crate::sync::{Arc, AtomicBool, AtomicPtr, Condvar, Mutex, Ordering};
use std::ptr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default pacing of the reclaimer when the defer queue is non-empty.
/// 延迟队列非空时回收者的默认节奏。
pub(crate) const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_millis(50);

/// A slot allocated for one reader, shared with the reclaimer.
///
/// Cache-aligned to prevent false sharing between readers.
///
/// 为一个读者分配的槽，与回收者共享。缓存对齐以防止读者之间的伪共享。
#[repr(align(64))]
struct EpochSlot {
    /// Epoch the reader pinned at, or the zero sentinel when unpinned.
    /// 读者钉住时的纪元，未钉住时为零哨兵值。
    ref_epoch: AtomicEpoch,
    /// The latest domain epoch broadcast to this reader by the reclaimer.
    /// 回收者向该读者广播的最新域纪元。
    shadow_epoch: AtomicEpoch,
    /// Oldest epoch this reader might still observe. Reclaimer-only.
    /// 该读者可能仍在观察的最老纪元。仅回收者使用。
    effective_epoch: AtomicEpoch,
}

/// Head of an expiry-stamped chain sitting in the defer queue.
struct DeferChain(*mut Retired);

unsafe impl Send for DeferChain {}

struct EpochInner {
    refs: Vec<Arc<EpochSlot>>,
    defer: Vec<DeferChain>,
}

struct EpochShared {
    /// Domain epoch; starts at 1, advanced only under the mutex.
    domain: AtomicEpoch,
    /// Lock-free stack of freshly retired objects.
    tail: AtomicPtr<Retired>,
    inner: Mutex<EpochInner>,
    cvar: Condvar,
    active: AtomicBool,
    wait: Duration,
}

impl Drop for EpochShared {
    fn drop(&mut self) {
        // Past this point no reader handle and no reclaimer can exist; the
        // remaining objects are destroyed regardless of epoch.
        let drained = self.tail.swap(ptr::null_mut(), Ordering::Acquire);
        unsafe { object::destroy_chain(drained) };

        let mut inner = self.inner.lock();
        for chain in inner.defer.drain(..) {
            unsafe { object::destroy_chain(chain.0) };
        }
    }
}

/// Builder for configuring an [`EpochProxy`].
///
/// 用于配置 [`EpochProxy`] 的构建器。
pub struct EpochProxyBuilder {
    wait: Duration,
}

impl EpochProxyBuilder {
    /// Create a builder with the default reclaim interval.
    /// 创建一个带有默认回收间隔的构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            wait: DEFAULT_RECLAIM_INTERVAL,
        }
    }

    /// Set how long the reclaimer sleeps between cycles while deferred
    /// objects remain. Purely a pacing parameter; correctness does not
    /// depend on it.
    ///
    /// Default: 50 ms.
    ///
    /// 设置在仍有延迟对象时回收者在两个周期之间休眠多久。纯粹的节奏参数，
    /// 正确性不依赖于它。默认值：50 毫秒。
    #[inline]
    pub fn reclaim_interval(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Build the engine and start its reclaimer thread.
    ///
    /// # Panics
    /// Panics if the reclaimer thread cannot be started; the engine would be
    /// inert without it.
    ///
    /// 构建引擎并启动其回收者线程。若回收者线程无法启动则 panic。
    pub fn build(self) -> EpochProxy {
        barrier::register();

        let shared = Arc::new(EpochShared {
            domain: AtomicEpoch::new(Epoch::new(1)),
            tail: AtomicPtr::new(ptr::null_mut()),
            inner: Mutex::new(EpochInner {
                refs: Vec::new(),
                defer: Vec::new(),
            }),
            cvar: Condvar::new(),
            active: AtomicBool::new(true),
            wait: self.wait,
        });

        let task = Arc::clone(&shared);
        let reclaimer = thread::Builder::new()
            .name("epoch-reclaim".to_string())
            .spawn(move || reclaim_loop(&task))
            .expect("failed to start reclaimer thread");

        EpochProxy {
            shared,
            reclaimer: Some(reclaimer),
        }
    }
}

impl Default for EpochProxyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The epoch-based reclamation engine.
///
/// A background reclaimer tracks a monotonically advancing domain epoch.
/// Each reader records, at pin time, the epoch broadcast to it; retired
/// objects are stamped with an expiry epoch and destroyed once every
/// reader's recorded epoch has moved past it.
///
/// Reader pin and unpin are wait-free: a pin is one relaxed load and one
/// store of the reader's own slot (the reclaimer's process-wide barrier
/// supplies the ordering), an unpin is a single release store. [`retire`]
/// is a lock-free stack push.
///
/// **Typical Usage**:
/// ```
/// use proxy_reclaim::{EpochProxy, ProxyPtr, Retirable, Retired};
///
/// struct Conf {
///     hdr: Retired,
///     limit: usize,
/// }
/// unsafe impl Retirable for Conf {
///     fn retired(&self) -> &Retired {
///         &self.hdr
///     }
/// }
///
/// let proxy = EpochProxy::new();
/// let shared = ProxyPtr::new(Conf { hdr: Retired::new(), limit: 8 });
///
/// // Reader thread:
/// let mut handle = proxy.acquire_ref();
/// let guard = handle.pin();
/// let conf = shared.load(&guard).unwrap();
/// assert_eq!(conf.limit, 8);
/// drop(guard);
///
/// // Writer thread:
/// shared.store(Conf { hdr: Retired::new(), limit: 16 }, &proxy);
/// ```
///
/// 基于纪元的回收引擎。
/// 后台回收者跟踪一个单调推进的域纪元。每个读者在钉住时记录广播给它的
/// 纪元；退休对象被盖上过期纪元，并在每个读者记录的纪元都越过它之后被
/// 销毁。
/// 读者的钉住与解除钉住是 wait-free 的：钉住是对读者自己槽位的一次宽松
/// 加载和一次存储（回收者的进程级屏障提供排序），解除钉住是单次 release
/// 存储。[`retire`] 是一次无锁栈压入。
///
/// [`retire`]: EpochProxy::retire
pub struct EpochProxy {
    shared: Arc<EpochShared>,
    reclaimer: Option<JoinHandle<()>>,
}

impl EpochProxy {
    /// Create an engine with the default reclaim interval.
    /// 创建一个带有默认回收间隔的引擎。
    #[inline]
    pub fn new() -> EpochProxy {
        Self::builder().build()
    }

    /// Create a builder for configuring the engine.
    /// 创建用于配置引擎的构建器。
    #[inline]
    pub fn builder() -> EpochProxyBuilder {
        EpochProxyBuilder::new()
    }

    /// Register a reader and return its handle.
    ///
    /// 注册一个读者并返回其句柄。
    pub fn acquire_ref(&self) -> EpochRef {
        let mut inner = self.shared.inner.lock();
        let epoch = self.shared.domain.load(Ordering::Relaxed);
        let slot = Arc::new(EpochSlot {
            ref_epoch: AtomicEpoch::new(Epoch::ZERO),
            shadow_epoch: AtomicEpoch::new(epoch),
            effective_epoch: AtomicEpoch::new(epoch),
        });
        inner.refs.push(Arc::clone(&slot));

        EpochRef {
            shared: Arc::clone(&self.shared),
            slot,
        }
    }

    /// Hand `obj` to the engine for deferred destruction.
    ///
    /// Stamps the object's `pre_expiry` with the current domain epoch (a
    /// deliberately loose lower bound), pushes it onto the lock-free retire
    /// stack, and wakes the reclaimer if the stack was empty.
    ///
    /// # Safety
    /// See [`Proxy::retire`].
    ///
    /// 将 `obj` 交给引擎延迟销毁。用当前域纪元给对象的 `pre_expiry` 盖章
    ///（一个刻意宽松的下界），将其压入无锁退休栈，若栈原本为空则唤醒
    /// 回收者。
    pub unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        if obj.is_null() {
            return;
        }

        let header = unsafe { Retired::bind(obj) };
        let pre_expiry = self.shared.domain.load(Ordering::Relaxed);
        unsafe {
            (*header).pre_expiry.store(pre_expiry, Ordering::Relaxed);
        }

        let mut head = self.shared.tail.load(Ordering::Relaxed);
        loop {
            unsafe {
                (*header).next.store(head, Ordering::Relaxed);
            }
            match self.shared.tail.compare_exchange_weak(
                head,
                header,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        if head.is_null() {
            // empty -> non-empty: the reclaimer may be in an unbounded wait
            let _inner = self.shared.inner.lock();
            self.shared.cvar.notify_all();
        }
    }

    /// Run one reclaim cycle synchronously.
    ///
    /// Returns whether deferred objects remain afterwards. The background
    /// reclaimer runs the same cycle on its own; this entry point exists for
    /// manual pacing and deterministic tests.
    ///
    /// 同步运行一个回收周期。返回之后是否仍有延迟对象。后台回收者自行运行
    /// 同样的周期；此入口用于手动控制节奏和确定性测试。
    pub fn try_reclaim(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        try_reclaim_locked(&self.shared, &mut inner)
    }

    #[cfg(test)]
    pub(crate) fn domain_epoch(&self) -> Epoch {
        self.shared.domain.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn deferred_chains(&self) -> usize {
        self.shared.inner.lock().defer.len()
    }
}

impl Default for EpochProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy for EpochProxy {
    type Ref = EpochRef;

    #[inline]
    fn acquire_ref(&self) -> EpochRef {
        EpochProxy::acquire_ref(self)
    }

    #[inline]
    unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        unsafe { EpochProxy::retire(self, obj) }
    }
}

impl Drop for EpochProxy {
    /// Stop the reclaimer and join it. The reclaimer runs one final cycle on
    /// its way out; whatever it could not free yet is destroyed when the
    /// shared state unwinds.
    ///
    /// 停止回收者并 join 它。回收者在退出前运行最后一个周期；尚未释放的
    /// 对象在共享状态展开时被销毁。
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::Relaxed);
        {
            let _inner = self.shared.inner.lock();
            self.shared.cvar.notify_all();
        }
        if let Some(reclaimer) = self.reclaimer.take() {
            let _ = reclaimer.join();
        }
    }
}

fn reclaim_loop(shared: &EpochShared) {
    let mut inner = shared.inner.lock();
    while shared.active.load(Ordering::Relaxed) {
        if try_reclaim_locked(shared, &mut inner) {
            inner = shared.cvar.wait_timeout(inner, shared.wait).0;
        } else {
            inner = shared.cvar.wait(inner);
        }
    }
    try_reclaim_locked(shared, &mut inner);
}

/// One reclaim cycle; the engine mutex must be held.
fn try_reclaim_locked(shared: &EpochShared, inner: &mut EpochInner) -> bool {
    let drained = shared.tail.swap(ptr::null_mut(), Ordering::Acquire);
    if !drained.is_null() {
        // Any strictly positive step works; 2 keeps parity with the reader
        // bookkeeping.
        let expiry = shared.domain.load(Ordering::Relaxed) + 2;
        shared.domain.store(expiry, Ordering::Relaxed);
        unsafe { object::stamp_expiry(drained, expiry) };
        inner.defer.push(DeferChain(drained));

        barrier::reclaim_fence();
    }

    // Broadcast the epoch, then sample every reader's oldness.
    let current = shared.domain.load(Ordering::Relaxed);
    let mut oldest = current;
    for slot in &inner.refs {
        slot.shadow_epoch.store(current, Ordering::Relaxed);
        let ref_epoch = slot.ref_epoch.load(Ordering::Relaxed);
        let effective = if ref_epoch.is_zero() {
            current
        } else {
            let previous = slot.effective_epoch.load(Ordering::Relaxed);
            if ref_epoch > previous { ref_epoch } else { previous }
        };
        slot.effective_epoch.store(effective, Ordering::Relaxed);
        if effective < oldest {
            oldest = effective;
        }
    }

    inner.defer.retain(|chain| {
        let expiry = unsafe { (*chain.0).expiry.load(Ordering::Relaxed) };
        if expiry > oldest {
            true
        } else {
            unsafe { object::destroy_chain(chain.0) };
            false
        }
    });

    !inner.defer.is_empty()
}

/// A reader handle for the epoch engine.
///
/// One handle per reader thread. Dropping the handle unregisters the reader;
/// it must be unpinned at that point, which the borrow on [`pin`] enforces.
///
/// 纪元引擎的读者句柄。每个读者线程一个。drop 句柄即注销读者；那时它必须
/// 处于未钉住状态，[`pin`] 上的借用保证了这一点。
///
/// [`pin`]: EpochRef::pin
pub struct EpochRef {
    shared: Arc<EpochShared>,
    slot: Arc<EpochSlot>,
}

impl EpochRef {
    /// Begin a critical section.
    ///
    /// Reads the epoch the reclaimer last broadcast to this reader and
    /// publishes it as the pin epoch. With the barrier facility compiled in
    /// this is one relaxed load, one relaxed store and a compiler fence;
    /// otherwise the publish is sequentially consistent.
    ///
    /// 开始一个临界区。读取回收者最近广播给该读者的纪元并将其发布为钉住
    /// 纪元。编入屏障设施时这是一次宽松加载、一次宽松存储和一个编译器
    /// 栅栏；否则发布是顺序一致的。
    #[inline]
    pub fn pin(&mut self) -> EpochGuard<'_> {
        let epoch = self.slot.shadow_epoch.load(Ordering::Relaxed);
        self.slot.ref_epoch.store(epoch, Ordering::Relaxed);
        barrier::pin_fence();

        EpochGuard { slot: &self.slot }
    }
}

impl ProxyRef for EpochRef {
    type Guard<'a>
        = EpochGuard<'a>
    where
        Self: 'a;

    #[inline]
    fn pin(&mut self) -> EpochGuard<'_> {
        EpochRef::pin(self)
    }
}

impl Drop for EpochRef {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.refs.retain(|slot| !Arc::ptr_eq(slot, &self.slot));
    }
}

/// A guard that keeps its reader pinned for its lifetime.
///
/// Dropping the guard unpins the reader with a single release store.
///
/// 在其生命周期内保持读者钉住状态的守卫。drop 守卫即以单次 release 存储
/// 解除钉住。
#[must_use]
pub struct EpochGuard<'a> {
    slot: &'a EpochSlot,
}

impl EpochGuard<'_> {
    /// Extend this reader's pin forward to cover a stale object.
    ///
    /// During a long traversal, individual nodes may be retired behind the
    /// reader. If `obj` is stale (its `pre_expiry` is stamped) and newer
    /// than the current pin epoch, the pin is raised to it, which lets the
    /// reclaimer free everything the reader has already walked past while
    /// the walk continues.
    ///
    /// 将该读者的钉住向前扩展以覆盖一个陈旧对象。长遍历期间，个别节点可能
    /// 在读者身后退休。若 `obj` 已陈旧（其 `pre_expiry` 已盖章）且比当前
    /// 钉住纪元更新，则将钉住提升到它，使回收者可以在遍历继续的同时释放
    /// 读者已经走过的一切。
    pub fn update_epoch<T: Retirable>(&self, obj: &T) {
        let ref_epoch = self.slot.ref_epoch.load(Ordering::Relaxed);
        if ref_epoch.is_zero() {
            return;
        }

        let pre_expiry = obj.retired().pre_expiry.load(Ordering::Relaxed);
        if pre_expiry.is_zero() {
            return;
        }

        if pre_expiry > ref_epoch {
            self.slot.ref_epoch.store(pre_expiry, Ordering::Relaxed);
        }
    }
}

impl Pinned for EpochGuard<'_> {}

impl Drop for EpochGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.slot.ref_epoch.store(Epoch::ZERO, Ordering::Release);
    }
}
