use crate::epoch::{AtomicEpoch, Epoch};
use crate::sync::{AtomicPtr, Ordering};
use std::cell::UnsafeCell;
use std::ptr;

#[cfg(debug_assertions)]
use crate::sync::AtomicBool;

/// Type-erased ownership record, written once when the object is retired.
/// 类型擦除的所有权记录，对象退休时写入一次。
struct Owner {
    obj: *mut (),
    dtor: Option<unsafe fn(*mut ())>,
}

/// The intrusive header every reclaimable object embeds.
///
/// The header carries the next-link used to chain retired objects onto the
/// engines' internal queues, the epoch bookkeeping consulted by the
/// epoch-based engine, and a type-erased destructor recorded at retire time
/// so destruction stays polymorphic after the concrete type is forgotten.
///
/// After an object has been handed to [`Proxy::retire`](crate::Proxy::retire)
/// the engine owns it; the application must not touch it again. The only
/// field with any reader-side meaning is `pre_expiry`, which
/// [`EpochGuard::update_epoch`](crate::EpochGuard::update_epoch) consults
/// during slow traversals.
///
/// 每个可回收对象内嵌的侵入式头部。
/// 头部携带用于将退休对象链接到引擎内部队列的 next 链接、基于纪元的引擎
/// 查询的纪元记录，以及退休时记录的类型擦除析构函数，使得在具体类型被遗忘后
/// 析构仍保持多态。
/// 对象交给 `retire` 后归引擎所有，应用程序不得再触碰它。唯一对读者侧有
/// 意义的字段是 `pre_expiry`，慢速遍历时由 `update_epoch` 查询。
pub struct Retired {
    /// Intrusive link for the engines' retire queues.
    /// 引擎退休队列的侵入式链接。
    pub(crate) next: AtomicPtr<Retired>,
    /// Lower bound on the expiry epoch, stamped at retire.
    /// 过期纪元的下界，退休时盖章。
    pub(crate) pre_expiry: AtomicEpoch,
    /// Expiry epoch, stamped by the reclaimer when the object is deferred.
    /// 过期纪元，对象进入延迟队列时由回收者盖章。
    pub(crate) expiry: AtomicEpoch,
    owner: UnsafeCell<Owner>,
    #[cfg(debug_assertions)]
    destroyed: AtomicBool,
}

// The owner cell is written exactly once, by the retiring thread, before the
// header is published onto a queue; it is read exactly once, by whichever
// thread wins the right to destroy the object.
unsafe impl Send for Retired {}
unsafe impl Sync for Retired {}

impl Retired {
    /// Create a fresh header. The epoch fields start at the zero sentinel.
    /// 创建一个新头部。纪元字段以零哨兵值开始。
    pub fn new() -> Retired {
        Retired {
            next: AtomicPtr::new(ptr::null_mut()),
            pre_expiry: AtomicEpoch::new(Epoch::ZERO),
            expiry: AtomicEpoch::new(Epoch::ZERO),
            owner: UnsafeCell::new(Owner {
                obj: ptr::null_mut(),
                dtor: None,
            }),
            #[cfg(debug_assertions)]
            destroyed: AtomicBool::new(false),
        }
    }

    /// Record ownership of `obj` in its own header and return the header
    /// pointer, which is what the engines chain and destroy.
    ///
    /// # Safety
    /// `obj` must be a valid pointer obtained from `Box::into_raw` and must
    /// not already be bound.
    pub(crate) unsafe fn bind<T: Retirable>(obj: *mut T) -> *mut Retired {
        unsafe {
            let header = (*obj).retired() as *const Retired as *mut Retired;
            (*header).owner.get().write(Owner {
                obj: obj as *mut (),
                dtor: Some(drop_boxed::<T>),
            });
            header
        }
    }

    /// Destroy the object that owns `header`.
    ///
    /// # Safety
    /// `header` must have been produced by [`Retired::bind`] and must not be
    /// destroyed twice.
    pub(crate) unsafe fn destroy(header: *mut Retired) {
        unsafe {
            #[cfg(debug_assertions)]
            {
                let twice = (*header).destroyed.swap(true, Ordering::Relaxed);
                assert!(!twice, "BUG: retired object destroyed twice");
            }

            let Owner { obj, dtor } = ptr::read((*header).owner.get());
            if let Some(dtor) = dtor {
                dtor(obj);
            }
        }
    }
}

impl Default for Retired {
    fn default() -> Retired {
        Retired::new()
    }
}

unsafe fn drop_boxed<T>(obj: *mut ()) {
    unsafe {
        drop(Box::from_raw(obj as *mut T));
    }
}

/// An object the reclamation engines can take ownership of.
///
/// Implementors embed a [`Retired`] header and hand it out through
/// [`retired`](Retirable::retired). Destruction happens by dropping the
/// original `Box`, so a `Drop` impl on the concrete type runs as usual.
///
/// # Safety
/// `retired` must return a reference to a header that is a field of `self`,
/// unique to this instance. Returning a shared or foreign header corrupts
/// the engines' queues and leads to double destruction.
///
/// 回收引擎可以取得所有权的对象。
/// 实现者内嵌一个 [`Retired`] 头部并通过 `retired` 交出它。析构通过 drop
/// 原始的 `Box` 完成，具体类型上的 `Drop` 照常运行。
/// 安全性：`retired` 必须返回 `self` 自身字段中、且为该实例独有的头部。
pub unsafe trait Retirable: Send + 'static {
    fn retired(&self) -> &Retired;
}

/// Destroy an intrusively chained list of retired objects.
///
/// # Safety
/// Every header in the chain must be bound, exclusively owned by the caller,
/// and not destroyed before.
pub(crate) unsafe fn destroy_chain(head: *mut Retired) {
    let mut cur = head;
    while !cur.is_null() {
        unsafe {
            let next = (*cur).next.load(Ordering::Relaxed);
            Retired::destroy(cur);
            cur = next;
        }
    }
}

/// Stamp `expiry` on every object of a chain.
///
/// # Safety
/// The chain must be exclusively owned by the caller.
pub(crate) unsafe fn stamp_expiry(head: *mut Retired, expiry: Epoch) {
    let mut cur = head;
    while !cur.is_null() {
        unsafe {
            (*cur).expiry.store(expiry, Ordering::Relaxed);
            cur = (*cur).next.load(Ordering::Relaxed);
        }
    }
}

/// Bind and immediately destroy `obj`; no-op on null. Used by the engines
/// that reclaim synchronously.
///
/// # Safety
/// Same contract as [`Proxy::retire`](crate::Proxy::retire).
pub(crate) unsafe fn destroy_now<T: Retirable>(obj: *mut T) {
    if obj.is_null() {
        return;
    }
    unsafe {
        let header = Retired::bind(obj);
        Retired::destroy(header);
    }
}
