/// 测试支撑模块
/// 提供带有状态哨兵和析构计数的测试对象
mod basic_tests;
mod epoch_tests;

use crate::{Retirable, Retired};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// 存活对象的状态哨兵
pub(crate) const STATE_LIVE: u32 = 0x0101_0101;
/// 已销毁对象的状态哨兵
pub(crate) const STATE_INVALID: u32 = 0xefef_efef;

/// 可退休的测试对象：携带状态哨兵并在析构时计数
pub(crate) struct TestObj {
    hdr: Retired,
    state: AtomicU32,
    drops: Arc<AtomicUsize>,
}

impl TestObj {
    pub(crate) fn new(drops: &Arc<AtomicUsize>) -> TestObj {
        TestObj {
            hdr: Retired::new(),
            state: AtomicU32::new(STATE_LIVE),
            drops: Arc::clone(drops),
        }
    }

    /// 读者用来验证自己从未观察到已销毁的对象
    pub(crate) fn is_live(&self) -> bool {
        self.state.load(Ordering::Relaxed) == STATE_LIVE
    }
}

unsafe impl Retirable for TestObj {
    fn retired(&self) -> &Retired {
        &self.hdr
    }
}

impl Drop for TestObj {
    fn drop(&mut self) {
        let state = self.state.swap(STATE_INVALID, Ordering::Relaxed);
        assert_eq!(state, STATE_LIVE, "BUG: test object destroyed twice");
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// 新建一个析构计数器
pub(crate) fn drop_counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}
