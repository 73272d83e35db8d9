//! # Safe Memory Reclamation Proxies
//!
//! This crate provides safe-memory-reclamation engines for lock-free readers
//! that traverse mutable shared data structures. A writer publishes new
//! versions of data and *retires* the old ones; an engine defers destruction
//! of every retired object until no reader can still observe it. Two
//! interchangeable engines sit behind one contract, so an application can
//! swap strategies without touching reader or writer code:
//!
//! - [`EpochProxy`] — epoch-based reclamation. A background reclaimer
//!   advances a global epoch; readers record the epoch at which they pinned;
//!   retired objects carry an expiry epoch and are freed once every reader
//!   has moved past it.
//! - [`RingProxy`] — a bounded ring of reference-counted generation nodes.
//!   Each pin holds the current tail generation; each retire lands on it; a
//!   generation's batch is destroyed when its counts drain to zero.
//!
//! Lock-backed and no-op engines ([`RwLockProxy`], [`MutexProxy`],
//! [`NoopProxy`]) satisfy the same contract as comparison points.
//!
//! ## Core Concepts
//!
//! **Pin / unpin**: a reader's declaration of "I may be reading shared
//! state" / "I am done". Pinning is wait-free in both real engines and is
//! expressed as a RAII guard.
//!
//! **Retire**: hand an object to the engine for deferred destruction.
//! Objects embed a [`Retired`] header and implement [`Retirable`]; ownership
//! transfers to the engine at the `retire` call.
//!
//! **Reclaim**: the engine's destruction of retired objects once no reader
//! can observe them — on a background thread for [`EpochProxy`], inside
//! unpin for [`RingProxy`].
//!
//! ## Typical Usage
//!
//! ```
//! use proxy_reclaim::{EpochProxy, ProxyPtr, Retirable, Retired};
//!
//! struct Snapshot {
//!     hdr: Retired,
//!     value: u64,
//! }
//!
//! unsafe impl Retirable for Snapshot {
//!     fn retired(&self) -> &Retired {
//!         &self.hdr
//!     }
//! }
//!
//! let proxy = EpochProxy::new();
//! let shared = ProxyPtr::new(Snapshot { hdr: Retired::new(), value: 1 });
//!
//! // Reader: pin, dereference, unpin.
//! let mut handle = proxy.acquire_ref();
//! {
//!     let guard = handle.pin();
//!     let snap = shared.load(&guard).unwrap();
//!     assert_eq!(snap.value, 1);
//! }
//!
//! // Writer: publish a new version; the old one is retired and destroyed
//! // once no reader can observe it.
//! shared.store(Snapshot { hdr: Retired::new(), value: 2 }, &proxy);
//! ```
//!
//! # 安全内存回收代理
//!
//! 本 crate 为遍历可变共享数据结构的无锁读者提供安全内存回收引擎。写入者
//! 发布新版本的数据并*退休*旧版本；引擎将每个退休对象的销毁推迟到没有
//! 读者能再观察到它为止。两个可互换的引擎位于同一契约之后，应用程序无需
//! 改动读者或写入者代码即可切换策略：
//!
//! - [`EpochProxy`] — 基于纪元的回收。后台回收者推进全局纪元；读者记录其
//!   钉住时的纪元；退休对象携带过期纪元，在每个读者都越过它后被释放。
//! - [`RingProxy`] — 由引用计数代节点组成的有界环。每次钉住持有当前尾部
//!   代；每次退休落在其上；某代的计数清零后其批次被销毁。
//!
//! 基于锁的引擎和无操作引擎（[`RwLockProxy`]、[`MutexProxy`]、
//! [`NoopProxy`]）满足同一契约，作为对照点。

mod barrier;
mod ebr;
mod epoch;
mod object;
mod proxy;
mod ptr;
mod ring;
mod simple;
mod sync;

pub use ebr::{EpochGuard, EpochProxy, EpochProxyBuilder, EpochRef};
pub use epoch::{AtomicEpoch, Epoch};
pub use object::{Retirable, Retired};
pub use proxy::{Pinned, Proxy, ProxyRef};
pub use ptr::ProxyPtr;
pub use ring::{RingGuard, RingProxy, RingRef};
pub use simple::{
    MutexPin, MutexProxy, MutexRef, NoopPin, NoopProxy, NoopRef, RwLockPin, RwLockProxy, RwLockRef,
};

#[cfg(all(test, not(feature = "loom")))]
mod tests;
