use crate::object::{self, Retirable, Retired};
use crate::proxy::{Pinned, Proxy, ProxyRef};
use crate::sync::{Arc, AtomicPtr, AtomicU64, Ordering};
use std::ptr;

/// Packed 64-bit pair: high word / low word.
///
/// Node counts pack as `(local:32, link:32)`; the tail packs as
/// `(pin accumulator:32, node index:32)`.
#[inline]
const fn pack(hi: u32, lo: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

#[inline]
const fn hi(value: u64) -> u32 {
    (value >> 32) as u32
}

#[inline]
const fn lo(value: u64) -> u32 {
    value as u32
}

/// One local (reader) reference on a node count.
const ONE_LOCAL: u64 = pack(1, 0);
/// One link reference on a node count.
const ONE_LINK: u64 = pack(0, 1);
/// Count of a node on the free list: one link for the tail ownership it will
/// take, one for its predecessor's forward link.
const FREE: u64 = pack(0, 2);

/// A generation node: the batch of retires made while it was tail, plus the
/// packed reference count that keeps them alive.
///
/// 一个代节点：它作为尾部期间的全部退休对象，加上使它们存活的打包引用
/// 计数。
#[repr(align(64))]
struct RingNode {
    /// Packed `(local, link)` count.
    count: AtomicU64,
    /// Lock-free stack of objects retired onto this generation.
    reclaim_queue: AtomicPtr<Retired>,
}

struct RingShared {
    /// Packed `(pin accumulator, index)` pointing at the current tail node.
    tail: AtomicU64,
    nodes: Box<[RingNode]>,
}

impl RingShared {
    /// Pin the current tail; returns its index. Wait-free.
    #[inline]
    fn lock(&self) -> u32 {
        lo(self.tail.fetch_add(ONE_LOCAL, Ordering::Acquire))
    }

    /// Drop one local reference from `start` and propagate link drops down
    /// the chain of prior generations.
    fn unlock(&self, start: u32) {
        let mut ndx = start;
        let mut drop_count = ONE_LOCAL;
        loop {
            let node = &self.nodes[ndx as usize];
            let prev = node.count.fetch_sub(drop_count, Ordering::Relaxed);

            if prev == drop_count {
                // This drop took the count to zero: reap the generation and
                // return the node to the free list.
                let queued = node.reclaim_queue.swap(ptr::null_mut(), Ordering::Acquire);
                unsafe { object::destroy_chain(queued) };
                node.count.store(FREE, Ordering::Release);
            } else if lo(self.tail.load(Ordering::Relaxed)) == ndx
                && !node.reclaim_queue.load(Ordering::Relaxed).is_null()
                && self.advanceable(ndx)
            {
                // Still the tail but carrying retires, and the ring has room:
                // try to move the tail forward so this batch can drain.
                // Re-pin first; the pin being released is what keeps `ndx`
                // valid. Without the room check this walk would spin against
                // a saturated ring instead of leaving the batch piled on the
                // tail.
                let repinned = self.lock();
                self.add_tail(ndx);
                ndx = repinned;
                drop_count = ONE_LOCAL;
                continue;
            } else {
                return;
            }

            // The reaped node held a link on its successor.
            drop_count = ONE_LINK;
            ndx = (ndx + 1) % self.nodes.len() as u32;
        }
    }

    /// Whether the tail could advance past `ndx` right now: `ndx` holds only
    /// the tail link and its successor is on the free list. Same relaxed
    /// probes as [`add_tail`](RingShared::add_tail); a stale answer is
    /// harmless on either side.
    fn advanceable(&self, ndx: u32) -> bool {
        if lo(self.nodes[ndx as usize].count.load(Ordering::Relaxed)) != 1 {
            return false;
        }
        let next = (ndx + 1) % self.nodes.len() as u32;
        self.nodes[next as usize].count.load(Ordering::Relaxed) == FREE
    }

    /// Attempt to advance the tail past `old_ndx`. A pin must be held.
    ///
    /// Preconditions (checked with relaxed loads, so failure is always
    /// possible and always harmless): `old_ndx` holds only the tail link,
    /// has pending retires, and its successor is on the free list.
    fn add_tail(&self, old_ndx: u32) {
        let node = &self.nodes[old_ndx as usize];

        if lo(node.count.load(Ordering::Relaxed)) != 1 {
            return;
        }
        if node.reclaim_queue.load(Ordering::Relaxed).is_null() {
            return;
        }

        let new_ndx = (old_ndx + 1) % self.nodes.len() as u32;
        if self.nodes[new_ndx as usize].count.load(Ordering::Relaxed) != FREE {
            return;
        }

        let new_tail = pack(0, new_ndx);
        let mut old_tail = self.tail.load(Ordering::Relaxed);
        loop {
            if lo(old_tail) != old_ndx {
                return;
            }
            match self.tail.compare_exchange_weak(
                old_tail,
                new_tail,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => old_tail = current,
            }
        }

        // The pins accumulated on the packed tail move into the node itself,
        // where unpin drops can retire them; the tail ownership link moves
        // on with the tail.
        let pins = hi(old_tail);
        node.count
            .fetch_add(pack(pins, 0).wrapping_sub(ONE_LINK), Ordering::AcqRel);
    }
}

impl Drop for RingShared {
    fn drop(&mut self) {
        // No handle can exist any more; whatever is still queued is
        // destroyed by force.
        for node in self.nodes.iter() {
            let queued = node.reclaim_queue.swap(ptr::null_mut(), Ordering::Acquire);
            unsafe { object::destroy_chain(queued) };
        }
    }
}

/// The refcount-ring reclamation engine.
///
/// A bounded ring of generation nodes takes the place of an epoch counter.
/// Every pin bumps a local count packed into the tail pointer; every retire
/// is serialised onto the generation that was tail at that moment. A
/// generation is reaped, and its batch destroyed, once both its local and
/// link counts reach zero, at which point the node returns to the free list
/// and the tail can advance over it again.
///
/// The engine has no background thread; reclamation happens inside unpin.
/// Pins are wait-free (a single fetch-add); retire and unpin are lock-free.
///
/// If the ring is saturated (no free successor), the tail simply stops
/// advancing and retires keep accumulating on the current generation; this
/// is safe but delays reclamation, so `size` should be generous relative to
/// reader concurrency.
///
/// 引用计数环回收引擎。
/// 一个有界的代节点环取代了纪元计数器。每次钉住都会增加打包在尾指针中的
/// 本地计数；每次退休都被串行化到当时作为尾部的代上。当某代的本地计数与
/// 链接计数都归零时，该代被收割、其批次被销毁，节点回到空闲列表，尾部可
/// 以再次越过它。
/// 引擎没有后台线程；回收发生在解除钉住的过程中。钉住是 wait-free 的
///（单次 fetch-add）；退休和解除钉住是无锁的。
/// 若环已饱和（没有空闲的后继节点），尾部会停止推进，退休对象继续在当前
/// 代上累积；这是安全的，但会推迟回收，因此 `size` 相对读者并发度应当
/// 宽裕。
pub struct RingProxy {
    shared: Arc<RingShared>,
}

impl RingProxy {
    /// Create an engine with `size` generation nodes.
    ///
    /// # Panics
    /// Panics if `size < 2`: a one-node ring can never have a free
    /// successor, so the tail could never advance.
    ///
    /// 创建一个带有 `size` 个代节点的引擎。若 `size < 2` 则 panic：单节点
    /// 环永远不会有空闲的后继，尾部永远无法推进。
    pub fn new(size: usize) -> RingProxy {
        assert!(size >= 2, "ring needs at least two generation nodes");
        assert!(size <= u32::MAX as usize, "ring index must fit in 32 bits");

        let nodes: Box<[RingNode]> = (0..size)
            .map(|ndx| RingNode {
                // Node 0 starts as the tail and already owns the tail link.
                count: AtomicU64::new(if ndx == 0 { pack(0, 1) } else { FREE }),
                reclaim_queue: AtomicPtr::new(ptr::null_mut()),
            })
            .collect();

        RingProxy {
            shared: Arc::new(RingShared {
                tail: AtomicU64::new(pack(0, 0)),
                nodes,
            }),
        }
    }

    /// Create a reader handle. Allocator call only.
    ///
    /// 创建一个读者句柄。仅涉及分配器调用。
    #[inline]
    pub fn acquire_ref(&self) -> RingRef {
        RingRef {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Hand `obj` to the engine for deferred destruction.
    ///
    /// Pins the current tail, pushes `obj` onto that generation's reclaim
    /// queue, and unpins; the retire is thereby serialised to one concrete
    /// generation.
    ///
    /// # Safety
    /// See [`Proxy::retire`].
    ///
    /// 将 `obj` 交给引擎延迟销毁。钉住当前尾部，将 `obj` 压入该代的回收
    /// 队列，然后解除钉住；退休因此被串行化到一个具体的代上。
    pub unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        if obj.is_null() {
            return;
        }

        let header = unsafe { Retired::bind(obj) };
        let ndx = self.shared.lock();

        let queue = &self.shared.nodes[ndx as usize].reclaim_queue;
        let mut head = queue.load(Ordering::Relaxed);
        loop {
            unsafe {
                (*header).next.store(head, Ordering::Relaxed);
            }
            match queue.compare_exchange_weak(head, header, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        self.shared.unlock(ndx);
    }

    #[cfg(test)]
    pub(crate) fn node_counts(&self) -> Vec<(u32, u32)> {
        self.shared
            .nodes
            .iter()
            .map(|node| {
                let count = node.count.load(Ordering::Relaxed);
                (hi(count), lo(count))
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn tail_state(&self) -> (u32, u32) {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        (hi(tail), lo(tail))
    }
}

impl Proxy for RingProxy {
    type Ref = RingRef;

    #[inline]
    fn acquire_ref(&self) -> RingRef {
        RingProxy::acquire_ref(self)
    }

    #[inline]
    unsafe fn retire<T: Retirable>(&self, obj: *mut T) {
        unsafe { RingProxy::retire(self, obj) }
    }
}

/// A reader handle for the ring engine.
///
/// 环引擎的读者句柄。
pub struct RingRef {
    shared: Arc<RingShared>,
}

impl RingRef {
    /// Begin a critical section: pin the current tail generation.
    ///
    /// 开始一个临界区：钉住当前的尾部代。
    #[inline]
    pub fn pin(&mut self) -> RingGuard<'_> {
        let ndx = self.shared.lock();
        RingGuard {
            shared: &self.shared,
            ndx,
        }
    }
}

impl ProxyRef for RingRef {
    type Guard<'a>
        = RingGuard<'a>
    where
        Self: 'a;

    #[inline]
    fn pin(&mut self) -> RingGuard<'_> {
        RingRef::pin(self)
    }
}

/// A guard that keeps one generation pinned; records the pinned index.
///
/// Dropping the guard releases the pin and may reap drained generations,
/// advance the tail, or both.
///
/// 保持某个代被钉住的守卫；记录被钉住的索引。drop 守卫会释放钉住，并可能
/// 收割已排空的代、推进尾部，或两者皆有。
#[must_use]
pub struct RingGuard<'a> {
    shared: &'a RingShared,
    ndx: u32,
}

impl Pinned for RingGuard<'_> {}

impl Drop for RingGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.shared.unlock(self.ndx);
    }
}
