/// 纪元测试模块
/// 测试回绕安全的比较、哨兵值和原子单元
use crate::{AtomicEpoch, Epoch};
use std::sync::atomic::Ordering;

const MAX63: u64 = i64::MAX as u64;
const MAX31: u64 = i32::MAX as u64;

/// 测试1: 跨越符号边界的比较仍然正确
#[test]
fn test_ordering_across_sign_boundary() {
    assert!(Epoch::new(MAX63 - 31) < Epoch::new(MAX63.wrapping_add(31)));
    assert!(Epoch::new(MAX31 - 3) < Epoch::new(MAX31 + 1));
    assert!(Epoch::new(MAX31 + 1) > Epoch::new(0));
}

/// 测试2: 回绕越过零：刚回绕之前的值小于回绕之后的值
#[test]
fn test_ordering_across_wrap() {
    let before_wrap = Epoch::new(0u64.wrapping_sub(16));
    let after_wrap = Epoch::new(16);
    assert!(before_wrap < after_wrap);
    assert!(after_wrap > before_wrap);
}

/// 测试3: 相等与不等
#[test]
fn test_equality() {
    assert_eq!(Epoch::new(0), Epoch::new(0));
    assert_eq!(Epoch::new(1), Epoch::new(1));
    assert_ne!(Epoch::new(1), Epoch::new(2));
}

/// 测试4: 任意 k < 2^63 的推进保持有序，包括接近和越过 u64::MAX 的情形
#[test]
fn test_advance_preserves_ordering() {
    for &start in &[0u64, 1, MAX31, MAX63, u64::MAX - 1, u64::MAX] {
        for &delta in &[1u64, 2, 31, 1 << 31, 1 << 62, (1 << 63) - 1] {
            let a = Epoch::new(start);
            let b = a + delta;
            assert!(a < b, "start={start} delta={delta}");
            assert!(b > a, "start={start} delta={delta}");
        }
    }
}

/// 测试5: 加减运算与赋值形式
#[test]
fn test_arithmetic() {
    let x0 = Epoch::new(20);
    let mut x1 = x0;
    x1 += 2;
    assert!(x0 < x1);
    assert_eq!(x1, Epoch::new(22));
    assert_eq!(x1 - 2, x0);

    x1 -= 2;
    assert_eq!(x1, x0);

    // 在 u64::MAX 处回绕
    assert_eq!(Epoch::new(u64::MAX) + 1, Epoch::new(0));
    assert_eq!(Epoch::new(0) - 1, Epoch::new(u64::MAX));
}

/// 测试6: 零哨兵值
#[test]
fn test_zero_sentinel() {
    assert!(Epoch::ZERO.is_zero());
    assert!(!Epoch::new(1).is_zero());
    assert_eq!(Epoch::default(), Epoch::ZERO);
    assert_eq!(u64::from(Epoch::ZERO), 0);
}

/// 测试7: 原子单元的加载与存储
#[test]
fn test_atomic_epoch() {
    let cell = AtomicEpoch::new(Epoch::new(1));
    assert_eq!(cell.load(Ordering::Relaxed), Epoch::new(1));

    cell.store(Epoch::new(3), Ordering::Release);
    assert_eq!(cell.load(Ordering::Acquire), Epoch::new(3));
}

/// 测试8: 原始值转换
#[test]
fn test_raw_conversions() {
    let epoch = Epoch::from(42u64);
    assert_eq!(epoch.value(), 42);
    assert_eq!(u64::from(epoch), 42);
}
