//! # provider：TLS 上下文生产者
//!
//! ## 核心意图（Why）
//! - Provider 是昂贵且共享的异步生产者：证书可能尚未就绪，也可能在运行中轮换；
//! - 供给器只通过 [`TlsContextProvider::add_callback`] 与之交互，不触碰其内部状态。
//!
//! ## 行为契约（What）
//! - `add_callback` 登记兴趣，回调最终恰好收到一次成功或失败信号，并在回调声明的执行器上运行；
//! - `close` 由 Registry 在引用计数归零时调用，之后 Provider 不再产出上下文。
//!
//! ## 参考实现
//! - [`PushContextProvider`]：上下文由外部（证书监听器、测试）推送的 Provider，支持轮换。

use std::{fmt, mem, sync::Arc};

use tracing::debug;

use crate::{
    callback::{self, ContextCallback},
    context::SecureContext,
    descriptor::TlsContextDescriptor,
    error::SupplierError,
    sync::Mutex,
};

/// TLS 上下文生产者契约。
pub trait TlsContextProvider: Send + Sync + 'static {
    /// Provider 对应的描述符，Registry 以其定位缓存条目。
    fn descriptor(&self) -> &TlsContextDescriptor;

    /// 登记一次性回调。
    fn add_callback(&self, callback: Box<dyn ContextCallback>);

    /// 拆除 Provider；Registry 在最后一个引用释放后调用。
    fn close(&self) {}
}

/// 被 Registry 与各持有方共享的 Provider 句柄。
pub type SharedProvider = Arc<dyn TlsContextProvider>;

/// 由外部推送上下文的 Provider。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 证书监听器在证书就绪或轮换时调用 [`publish`](Self::publish)，等待中的连接随即获得配置；
/// - 新到达的回调若已有可用上下文，立即（经其执行器）得到最新快照，而无需等待下一次轮换。
///
/// ## 逻辑（How）
/// - 内部状态 `{current, pending, closed}` 由一把互斥锁保护；
/// - 派发前先把待通知回调移出锁外，避免在持锁状态下运行任何外部代码。
///
/// ## 契约（What）
/// - `publish`：上下文的侧必须与描述符一致，否则返回 `InvalidArgument`；
/// - `fail`：仅通知等待中的回调，保留上一次成功的上下文；
/// - `close`：等待中的回调收到 `ProviderClosed`，之后的 `add_callback` 同样立即失败。
///
/// ## 风险与权衡（Trade-offs）
/// - 在从未成功发布前，回调会无限期排队；上层如需超时，应自行在回调外层设置截止时间。
pub struct PushContextProvider {
    descriptor: TlsContextDescriptor,
    state: Mutex<PushState>,
}

#[derive(Default)]
struct PushState {
    current: Option<SecureContext>,
    pending: Vec<Box<dyn ContextCallback>>,
    closed: bool,
}

impl PushContextProvider {
    pub fn new(descriptor: TlsContextDescriptor) -> Self {
        Self {
            descriptor,
            state: Mutex::new(PushState::default()),
        }
    }

    /// 发布新的上下文，并完成所有等待中的回调。
    pub fn publish(&self, context: SecureContext) -> Result<(), SupplierError> {
        if context.side() != self.descriptor.side() {
            return Err(SupplierError::invalid_argument(
                "context",
                "published context side does not match the descriptor side",
            ));
        }
        let waiters = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SupplierError::ProviderClosed);
            }
            state.current = Some(context.clone());
            mem::take(&mut state.pending)
        };
        debug!(
            side = %self.descriptor.side(),
            waiters = waiters.len(),
            "tls context published"
        );
        for waiter in waiters {
            callback::dispatch(waiter, Ok(context.clone()));
        }
        Ok(())
    }

    /// 以失败完成所有等待中的回调。
    pub fn fail(&self, cause: SupplierError) {
        let waiters = mem::take(&mut self.state.lock().pending);
        for waiter in waiters {
            callback::fail_async(waiter, cause.clone());
        }
    }

    /// 当前可用的上下文快照。
    pub fn current(&self) -> Option<SecureContext> {
        self.state.lock().current.clone()
    }

    /// 等待中的回调数量。
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl TlsContextProvider for PushContextProvider {
    fn descriptor(&self) -> &TlsContextDescriptor {
        &self.descriptor
    }

    fn add_callback(&self, callback: Box<dyn ContextCallback>) {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                Err(SupplierError::ProviderClosed)
            } else if let Some(context) = &state.current {
                Ok(context.clone())
            } else {
                state.pending.push(callback);
                return;
            }
        };
        callback::dispatch(callback, outcome);
    }

    fn close(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.closed = true;
            state.current = None;
            mem::take(&mut state.pending)
        };
        debug!(side = %self.descriptor.side(), "tls context provider closed");
        for waiter in waiters {
            callback::fail_async(waiter, SupplierError::ProviderClosed);
        }
    }
}

impl fmt::Debug for PushContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PushContextProvider")
            .field("descriptor", &self.descriptor)
            .field("resolved", &state.current.is_some())
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}
