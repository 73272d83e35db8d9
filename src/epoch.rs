use crate::sync::{AtomicU64, Ordering};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A monotone 64-bit epoch with wrap-safe ordering.
///
/// Two epochs are compared through the signed interpretation of their
/// difference, so the counter can advance indefinitely: `a < b` holds for any
/// `b = a + k` with `k < 2^63`, even when the underlying integer wraps past
/// `u64::MAX`. Because of the wrap, the relation is not a total order over
/// all pairs; `Ord` is deliberately not implemented.
///
/// `Epoch::ZERO` is reserved as the "not pinned" sentinel and never used as a
/// real epoch value.
///
/// 一个具有回绕安全排序的单调 64 位纪元。
/// 两个纪元通过其差值的有符号解释进行比较，因此计数器可以无限推进：
/// 即使底层整数回绕越过 `u64::MAX`，对于任何 `b = a + k`（`k < 2^63`），
/// `a < b` 仍然成立。由于回绕，该关系不是全序，因此特意不实现 `Ord`。
/// `Epoch::ZERO` 被保留为"未钉住"的哨兵值，永远不会用作真实的纪元值。
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// The "not pinned" sentinel.
    /// "未钉住"的哨兵值。
    pub const ZERO: Epoch = Epoch(0);

    /// Create an epoch from a raw value.
    /// 从原始值创建一个纪元。
    #[inline]
    pub const fn new(value: u64) -> Epoch {
        Epoch(value)
    }

    /// The raw counter value.
    /// 原始计数器值。
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Whether this is the "not pinned" sentinel.
    /// 是否为"未钉住"的哨兵值。
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Epoch {
    #[inline]
    fn from(value: u64) -> Epoch {
        Epoch(value)
    }
}

impl From<Epoch> for u64 {
    #[inline]
    fn from(epoch: Epoch) -> u64 {
        epoch.0
    }
}

impl PartialOrd for Epoch {
    #[inline]
    fn partial_cmp(&self, other: &Epoch) -> Option<CmpOrdering> {
        Some((self.0.wrapping_sub(other.0) as i64).cmp(&0))
    }
}

impl Add<u64> for Epoch {
    type Output = Epoch;

    #[inline]
    fn add(self, delta: u64) -> Epoch {
        Epoch(self.0.wrapping_add(delta))
    }
}

impl AddAssign<u64> for Epoch {
    #[inline]
    fn add_assign(&mut self, delta: u64) {
        self.0 = self.0.wrapping_add(delta);
    }
}

impl Sub<u64> for Epoch {
    type Output = Epoch;

    #[inline]
    fn sub(self, delta: u64) -> Epoch {
        Epoch(self.0.wrapping_sub(delta))
    }
}

impl SubAssign<u64> for Epoch {
    #[inline]
    fn sub_assign(&mut self, delta: u64) {
        self.0 = self.0.wrapping_sub(delta);
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Epoch").field(&self.0).finish()
    }
}

/// An atomic cell holding an [`Epoch`].
///
/// Thin wrapper over a 64-bit atomic so epoch fields stay lock-free on every
/// supported target.
///
/// 持有 [`Epoch`] 的原子单元。
/// 对 64 位原子量的薄封装，使纪元字段在每个受支持的目标上保持无锁。
pub struct AtomicEpoch(AtomicU64);

impl AtomicEpoch {
    #[inline]
    pub fn new(epoch: Epoch) -> AtomicEpoch {
        AtomicEpoch(AtomicU64::new(epoch.0))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> Epoch {
        Epoch(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, epoch: Epoch, order: Ordering) {
        self.0.store(epoch.0, order)
    }
}

impl fmt::Debug for AtomicEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicEpoch")
            .field(&self.0.load(Ordering::Relaxed))
            .finish()
    }
}
