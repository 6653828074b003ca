//! # sync：可切换的互斥锁
//!
//! `loom` 运行时需要接管互斥锁以枚举调度交错，因此在模型检查配置下切换到
//! `loom::sync::Mutex`；常规构建使用 `parking_lot::Mutex`，锁不会中毒，持锁期间 panic
//! 也不会让供给器永久不可用。两种实现对外暴露相同的 `lock()` 签名。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use parking_lot::Mutex;

#[cfg(any(loom, spark_loom))]
pub(crate) use self::model::Mutex;

#[cfg(any(loom, spark_loom))]
mod model {
    use std::sync::PoisonError;

    pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
