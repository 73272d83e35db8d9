/// 基础测试模块
/// 测试两个真实引擎与辅助引擎的核心契约行为
use super::{TestObj, drop_counter};
use crate::{
    Epoch, EpochProxy, MutexProxy, NoopProxy, Proxy, ProxyPtr, ProxyRef, RingProxy, RwLockProxy,
};
use std::ptr;
use std::sync::atomic::Ordering;

/// 跨引擎的通用读取辅助函数：验证统一契约可以泛型使用
fn pinned_value<P: Proxy>(proxy: &P, shared: &ProxyPtr<TestObj>) -> bool {
    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    shared.load(&guard).map(|obj| obj.is_live()).unwrap_or(false)
}

/// 测试1: 创建纪元引擎并钉住/解除钉住
#[test]
fn test_epoch_pin_unpin() {
    let proxy = EpochProxy::new();
    let mut handle = proxy.acquire_ref();

    {
        let _guard = handle.pin();
        // guard 在这里保持钉住状态
    }
    // guard 被 drop，读者回到未钉住状态

    {
        let _guard = handle.pin();
    }
}

/// 测试2: ProxyPtr 的创建与读取
#[test]
fn test_proxy_ptr_load() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    let obj = shared.load(&guard).unwrap();
    assert!(obj.is_live());
}

/// 测试3: 空的 ProxyPtr 返回 None
#[test]
fn test_proxy_ptr_null() {
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::<TestObj>::null();

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    assert!(shared.load(&guard).is_none());
}

/// 测试4: retire 空指针是无操作
#[test]
fn test_retire_null_is_noop() {
    let proxy = EpochProxy::new();
    unsafe { proxy.retire(ptr::null_mut::<TestObj>()) };
    assert!(!proxy.try_reclaim());

    let ring = RingProxy::new(4);
    unsafe { ring.retire(ptr::null_mut::<TestObj>()) };
}

/// 测试5: 写入者发布新版本，旧版本在两个回收周期内被销毁
#[test]
fn test_epoch_publish_and_reclaim() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    // 读者钉住、读取、解除钉住
    let mut handle = proxy.acquire_ref();
    {
        let guard = handle.pin();
        assert!(shared.load(&guard).unwrap().is_live());
    }

    // 写入者发布新版本并退休旧版本
    shared.store(TestObj::new(&drops), &proxy);

    // 两个回收周期后旧版本必然已被销毁
    proxy.try_reclaim();
    proxy.try_reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    // 新版本仍然存活
    {
        let guard = handle.pin();
        assert!(shared.load(&guard).unwrap().is_live());
    }
}

/// 测试6: 钉住的读者跨越两个回收周期阻止销毁
#[test]
fn test_epoch_held_reader_defers_destruction() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    let obj = shared.load(&guard).unwrap();

    // 在读者钉住期间退休旧版本
    shared.store(TestObj::new(&drops), &proxy);

    proxy.try_reclaim();
    proxy.try_reclaim();

    // 读者仍然钉住：退休对象不得被销毁
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(obj.is_live());

    drop(guard);

    // 解除钉住后再来一个周期，对象被销毁
    proxy.try_reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试7: 解除钉住后重新钉住不会滞留旧纪元（钉住/解除钉住是幂等的）
#[test]
fn test_epoch_unpin_repin_releases_old_epoch() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    shared.store(TestObj::new(&drops), &proxy);
    proxy.try_reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(guard);

    // 重新钉住会读取新的影子纪元，不再保护旧的退休对象
    let _guard = handle.pin();
    proxy.try_reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试8: 环引擎：读者解除钉住时排空尾部代
#[test]
fn test_ring_unpin_drains_generation() {
    let drops = drop_counter();
    let proxy = RingProxy::new(4);

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();

    // 写入者退休对象 A，它落在读者钉住的代上
    unsafe { proxy.retire(Box::into_raw(Box::new(TestObj::new(&drops)))) };
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // 读者解除钉住：计数归零，A 被销毁
    drop(guard);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试9: 环引擎经由 ProxyPtr 的发布与回收
#[test]
fn test_ring_publish_and_reclaim() {
    let drops = drop_counter();
    let proxy = RingProxy::new(4);
    let shared = ProxyPtr::new(TestObj::new(&drops));

    assert!(pinned_value(&proxy, &shared));

    shared.store(TestObj::new(&drops), &proxy);
    // 没有读者钉住：退休对象在退休路径自身的解除钉住中被销毁
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(pinned_value(&proxy, &shared));
}

/// 测试10: 读写锁引擎立即销毁退休对象
#[test]
fn test_rwlock_proxy_immediate_destroy() {
    let drops = drop_counter();
    let proxy = RwLockProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    assert!(pinned_value(&proxy, &shared));

    {
        let _writer = proxy.exclusive();
        shared.store(TestObj::new(&drops), &proxy);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(pinned_value(&proxy, &shared));
}

/// 测试11: 互斥锁引擎立即销毁退休对象
#[test]
fn test_mutex_proxy_immediate_destroy() {
    let drops = drop_counter();
    let proxy = MutexProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    assert!(pinned_value(&proxy, &shared));

    {
        let _writer = proxy.exclusive();
        shared.store(TestObj::new(&drops), &proxy);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试12: 无操作引擎满足契约并立即销毁
#[test]
fn test_noop_proxy_contract() {
    let drops = drop_counter();
    let proxy = NoopProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    assert!(pinned_value(&proxy, &shared));

    shared.store(TestObj::new(&drops), &proxy);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试13: 域纪元从 1 开始，每次排空到退休对象时步进 2
#[test]
fn test_domain_epoch_advances_by_two() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    assert_eq!(proxy.domain_epoch(), Epoch::new(1));

    // 钉住一个读者，使延迟队列的内容保持确定
    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();

    unsafe { proxy.retire(Box::into_raw(Box::new(TestObj::new(&drops)))) };
    proxy.try_reclaim();
    assert_eq!(proxy.domain_epoch(), Epoch::new(3));
    assert_eq!(proxy.deferred_chains(), 1);

    drop(guard);
    proxy.try_reclaim();
    assert_eq!(proxy.deferred_chains(), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试14: take 取消发布并退休
#[test]
fn test_proxy_ptr_take() {
    let drops = drop_counter();
    let proxy = EpochProxy::new();
    let shared = ProxyPtr::new(TestObj::new(&drops));

    shared.take(&proxy);
    proxy.try_reclaim();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    let mut handle = proxy.acquire_ref();
    let guard = handle.pin();
    assert!(shared.load(&guard).is_none());
}
