//! Process-wide memory barrier facility.
//!
//! With the `membarrier` feature enabled, the reclaimer can force a full
//! memory barrier on every thread of the process at once (Linux
//! `membarrier(2)` expedited mode, or the platform equivalent), which lets
//! the reader fast path publish its pin with a plain store and a compiler
//! fence. Without the feature (and always under loom), readers publish with
//! sequentially consistent ordering and the reclaimer issues a single
//! sequentially consistent fence instead. The choice is made at compile time.
//!
//! 进程级内存屏障设施。
//! 启用 `membarrier` 特性后，回收者可以一次性强制进程内所有线程执行完整的
//! 内存屏障（Linux `membarrier(2)` 加速模式或对应的平台原语），读者快速路径
//! 因此只需普通存储加编译器栅栏即可发布其钉住状态。未启用该特性（以及在
//! loom 下）时，读者以顺序一致的方式发布，回收者改用单个顺序一致栅栏。
//! 该选择在编译期做出。

use crate::sync::{Ordering, fence};

/// Register the process with the barrier facility.
///
/// Must run before the first [`reclaim_fence`]. The first expedited barrier
/// issued here also registers the calling process with the OS primitive.
///
/// 向屏障设施注册进程。必须在第一次 [`reclaim_fence`] 之前运行。
#[cfg(all(feature = "membarrier", not(feature = "loom")))]
pub(crate) fn register() {
    membarrier::heavy();
}

#[cfg(not(all(feature = "membarrier", not(feature = "loom"))))]
pub(crate) fn register() {}

/// Reader-side ordering for the pin publish, paired with [`reclaim_fence`].
/// 读者侧钉住发布的排序，与 [`reclaim_fence`] 配对。
#[inline]
pub(crate) fn pin_fence() {
    #[cfg(all(feature = "membarrier", not(feature = "loom")))]
    membarrier::light();

    #[cfg(not(all(feature = "membarrier", not(feature = "loom"))))]
    fence(Ordering::SeqCst);
}

/// Reclaimer-side barrier: on return, every other thread in the process has
/// executed a full memory barrier since the call began.
///
/// 回收者侧屏障：返回时，进程内每个其他线程都已在调用开始后执行过一次完整的
/// 内存屏障。
pub(crate) fn reclaim_fence() {
    #[cfg(all(feature = "membarrier", not(feature = "loom")))]
    {
        fence(Ordering::SeqCst);
        membarrier::heavy();
        fence(Ordering::SeqCst);
    }

    #[cfg(not(all(feature = "membarrier", not(feature = "loom"))))]
    fence(Ordering::SeqCst);
}
