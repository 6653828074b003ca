//! # supplier：按需解析的 TLS 上下文供给器
//!
//! ## 核心意图（Why）
//! - 连接协商方只关心“此刻可用的 TLS 上下文”，而 Provider 昂贵、共享且异步产出；
//!   供给器把协商方与 Provider 的生命周期解耦：仅在真正需要时才向 Registry 申请 Provider，
//!   避免未启用安全传输的连接也持有证书资源；
//! - 供给器自身不缓存配置、不计数、不做任何密码学工作，只负责正确地组合 Registry 调用。
//!
//! ## 行为契约（What）
//! - `update`：首次调用时缓存一份兴趣引用；每次调用另行获取一份调用引用，
//!   随完成回调一起交给 Provider，信号送达后归还；
//! - `close`：幂等；归还兴趣引用（若有）并永久进入关闭状态；
//! - 运行期失败从不返回给调用线程，一律在回调的执行器上以失败信号送达。
//!
//! ## 状态机
//! `Active(未缓存)` → 首次成功 `update` → `Active(已缓存)` → `close` → `Shutdown`；
//! `Active(未缓存)` → `close` → `Shutdown`。`Shutdown` 为终态。

use std::{fmt, future::Future, sync::Arc};

use tracing::{debug, warn};

use crate::{
    callback::{self, ContextCallback},
    context::SecureContext,
    descriptor::TlsContextDescriptor,
    error::SupplierError,
    executor::SharedExecutor,
    lease::ProviderLease,
    registry::SharedRegistry,
    sync::Mutex,
};

/// 按需解析、引用计数的 TLS 上下文供给器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 一个供给器对应一个逻辑消费方绑定（例如某条集群路由的上游 TLS 配置）；
/// - 同一实例会被多个连接线程并发调用，`update` 与 `close` 需要在同一把锁下串行化。
///
/// ## 逻辑（How）
/// 1. 持锁检查 `shutdown` 与缓存：未关闭且未缓存时获取兴趣引用并缓存；
/// 2. 仍在锁内获取本次调用的独立引用（即便已关闭也会获取）；
/// 3. 释放锁后，把“调用方回调 + 调用引用”封装为 [`LeasedCallback`] 交给 Provider；
/// 4. 第 1、2 步任一失败时，在调用方回调的执行器上派发失败信号。
///
/// ## 契约（What）
/// - [`descriptor`](Self::descriptor) 在整个生命周期内返回同一个 `Arc`；
/// - 每次 `update` 恰好产生一次成功或失败信号；
/// - 每份调用引用恰好释放一次；兴趣引用至多释放一次（`close` 或供给器析构）。
///
/// ## 风险与权衡（Trade-offs）
/// - 关闭后的 `update` 仍会获取调用引用并正常完成，这允许关闭前已在途的协商收尾，
///   代价是关闭后仍可能短暂地重新创建 Provider；
/// - 向 Provider 登记回调发生在锁外，Provider 即便内联完成回调也不会重入供给器锁。
pub struct TlsContextProviderSupplier {
    descriptor: Arc<TlsContextDescriptor>,
    registry: SharedRegistry,
    state: Mutex<SupplierState>,
}

#[derive(Default)]
struct SupplierState {
    cached: Option<ProviderLease>,
    shutdown: bool,
}

impl TlsContextProviderSupplier {
    /// 绑定描述符与仓储，初始为“未缓存、未关闭”。
    pub fn new(descriptor: impl Into<Arc<TlsContextDescriptor>>, registry: SharedRegistry) -> Self {
        Self {
            descriptor: descriptor.into(),
            registry,
            state: Mutex::new(SupplierState::default()),
        }
    }

    /// 以建造器形式构造，缺失参数时返回 [`SupplierError::InvalidArgument`]。
    pub fn builder() -> SupplierBuilder {
        SupplierBuilder::default()
    }

    /// 绑定的描述符。无副作用，关闭后仍可调用。
    pub fn descriptor(&self) -> &Arc<TlsContextDescriptor> {
        &self.descriptor
    }

    /// 为一次调用解析当前 TLS 上下文，结果经 `callback` 异步送达。
    ///
    /// # 契约（What）
    /// - **返回**：立即返回，不等待上下文解析；
    /// - **信号**：`callback` 恰好收到一次成功或失败，均在其执行器上运行；
    /// - **失败路径**：Registry 同步失败时不会持有任何引用，失败信号携带 Registry 返回的错误。
    pub fn update(&self, callback: Box<dyn ContextCallback>) {
        match self.acquire_for_call() {
            Ok(lease) => {
                let provider = Arc::clone(lease.provider());
                provider.add_callback(Box::new(LeasedCallback::new(callback, lease)));
            }
            Err(cause) => {
                warn!(
                    side = %self.descriptor.side(),
                    code = cause.code(),
                    error = %cause,
                    "tls context provider acquisition failed"
                );
                callback::fail_async(callback, cause);
            }
        }
    }

    /// `update` 的 `Future` 形态：完成信号在 `executor` 上送达后 `Future` 就绪。
    pub fn resolve(
        &self,
        executor: SharedExecutor,
    ) -> impl Future<Output = Result<SecureContext, SupplierError>> + Send + 'static {
        let (callback, receiver) = callback::oneshot(executor);
        self.update(callback);
        async move { receiver.await.unwrap_or(Err(SupplierError::Abandoned)) }
    }

    fn acquire_for_call(&self) -> Result<ProviderLease, SupplierError> {
        let mut state = self.state.lock();
        if !state.shutdown && state.cached.is_none() {
            let lease = ProviderLease::acquire(&self.registry, &self.descriptor)?;
            debug!(side = %lease.side(), "cached long-lived tls context provider reference");
            state.cached = Some(lease);
        }
        // 调用引用与缓存相互独立，关闭后依旧获取。
        ProviderLease::acquire(&self.registry, &self.descriptor)
    }

    /// 关闭供给器：归还兴趣引用并永久进入关闭状态。幂等。
    pub fn close(&self) {
        let cached = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.cached.take()
        };
        match cached {
            Some(lease) => {
                debug!(side = %lease.side(), "tls context supplier closed; releasing cached reference");
                lease.release();
            }
            None => debug!(side = %self.descriptor.side(), "tls context supplier closed"),
        }
    }

    /// 是否已关闭，仅供诊断与测试。
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

impl fmt::Debug for TlsContextProviderSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TlsContextProviderSupplier")
            .field("descriptor", &self.descriptor)
            .field("cached", &state.cached)
            .field("shutdown", &state.shutdown)
            .finish_non_exhaustive()
    }
}

/// [`TlsContextProviderSupplier`] 的建造器。
#[derive(Default)]
pub struct SupplierBuilder {
    descriptor: Option<Arc<TlsContextDescriptor>>,
    registry: Option<SharedRegistry>,
}

impl SupplierBuilder {
    pub fn descriptor(mut self, descriptor: impl Into<Arc<TlsContextDescriptor>>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<TlsContextProviderSupplier, SupplierError> {
        let descriptor = self
            .descriptor
            .ok_or(SupplierError::invalid_argument("descriptor", "descriptor is required"))?;
        let registry = self
            .registry
            .ok_or(SupplierError::invalid_argument("registry", "registry is required"))?;
        Ok(TlsContextProviderSupplier::new(descriptor, registry))
    }
}

/// 登记到 Provider 上的包装回调：转发信号后归还调用引用。
///
/// # 契约（What）
/// - 执行器沿用调用方回调的执行器；
/// - 先转发信号，再归还引用；调用方回调 panic 时引用随展开析构归还；
/// - Provider 未发信号即丢弃包装回调时，调用方收到 [`SupplierError::Abandoned`]，
///   引用随该失败任务一起移交执行器，同样在信号之后归还。
struct LeasedCallback {
    executor: SharedExecutor,
    inner: Option<Box<dyn ContextCallback>>,
    // 仅在放弃路径上被提前取走；其余路径随包装回调析构归还。
    lease: Option<ProviderLease>,
}

impl LeasedCallback {
    fn new(inner: Box<dyn ContextCallback>, lease: ProviderLease) -> Self {
        Self {
            executor: SharedExecutor::clone(inner.executor()),
            inner: Some(inner),
            lease: Some(lease),
        }
    }
}

impl ContextCallback for LeasedCallback {
    fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    fn on_context(mut self: Box<Self>, context: SecureContext) {
        if let Some(inner) = self.inner.take() {
            inner.on_context(context);
        }
    }

    fn on_failure(mut self: Box<Self>, cause: SupplierError) {
        if let Some(inner) = self.inner.take() {
            inner.on_failure(cause);
        }
    }
}

impl Drop for LeasedCallback {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let lease = self.lease.take();
        warn!(
            side = ?lease.as_ref().map(ProviderLease::side),
            "tls context callback dropped by provider without completion"
        );
        // 执行器丢弃任务而未运行时，`inner` 与 `lease` 随闭包析构，引用仍只归还一次。
        self.executor.execute(Box::new(move || {
            inner.on_failure(SupplierError::Abandoned);
            drop(lease);
        }));
    }
}
