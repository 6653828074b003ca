//! # executor：回调执行上下文
//!
//! ## 契约声明
//! * 每个回调都声明自己的执行器；Provider 与供给器只能通过它派发完成信号，
//!   禁止在调用线程上内联执行调用方回调。
//! * 执行器只负责“把任务交给某个调度域”，不承诺顺序，也不返回句柄。

use std::sync::Arc;

/// 交给执行器的一次性任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 回调执行器契约。
///
/// # 设计背景（Why）
/// - 供给器在同步失败路径上必须把失败信号异步送达，执行器是唯一的派发出口；
/// - 以 trait 对象形式出现，便于测试替身记录派发线程或手动驱动任务队列。
///
/// # 契约说明（What）
/// - `execute` 必须最终运行 `task` 恰好一次；
/// - 实现可在任意线程运行任务，但不应在 `execute` 内同步运行（测试替身除外）。
pub trait CallbackExecutor: Send + Sync + 'static {
    fn execute(&self, task: Task);
}

/// 共享的执行器句柄。
pub type SharedExecutor = Arc<dyn CallbackExecutor>;

impl<F> CallbackExecutor for F
where
    F: Fn(Task) + Send + Sync + 'static,
{
    fn execute(&self, task: Task) {
        self(task)
    }
}

#[cfg(feature = "runtime-tokio")]
pub use tokio_executor::TokioExecutor;

#[cfg(feature = "runtime-tokio")]
mod tokio_executor {
    use tokio::runtime::Handle;

    use super::{CallbackExecutor, Task};
    use crate::error::SupplierError;

    /// 基于 Tokio 运行时句柄的执行器。
    ///
    /// # 契约（What）
    /// - 每个任务以独立 Tokio 任务运行，`JoinHandle` 被直接丢弃；
    /// - 运行时关闭后提交的任务会被 Tokio 静默丢弃，持有的回调随之析构。
    #[derive(Clone, Debug)]
    pub struct TokioExecutor {
        handle: Handle,
    }

    impl TokioExecutor {
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }

        /// 捕获当前线程所在的 Tokio 运行时。
        ///
        /// 不在运行时上下文内调用时返回 [`SupplierError::InvalidArgument`]。
        pub fn try_current() -> Result<Self, SupplierError> {
            Handle::try_current().map(Self::new).map_err(|_| {
                SupplierError::invalid_argument(
                    "executor",
                    "no tokio runtime is active on the current thread",
                )
            })
        }
    }

    impl CallbackExecutor for TokioExecutor {
        fn execute(&self, task: Task) {
            drop(self.handle.spawn(async move { task() }));
        }
    }
}
