#![doc = r#"
# spark-tls-supplier

## 设计动机（Why）
- **按需解析**：连接协商时才向 Registry 申请 TLS 上下文 Provider，未启用安全传输的连接不会触发证书加载；
- **生命周期解耦**：Provider 创建昂贵、被多个消费方共享且异步产出，供给器以引用计数租约把协商方与其生命周期隔离；
- **并发安全**：`update` 与 `close` 可被任意线程并发调用，关闭与在途获取之间的竞争不会泄露或重复归还引用。

## 核心契约（What）
- [`TlsContextProviderSupplier`]：绑定一个 [`TlsContextDescriptor`]，`update` 经回调交付 [`SecureContext`]，`close` 幂等关闭；
- [`TlsContextRegistry`] / [`TlsContextProvider`]：外部协作方的窄契约，按客户端/服务端变体分派；
- [`ContextCallback`] 与 [`CallbackExecutor`]：一次性完成信号及其执行上下文；
- 错误统一为 [`SupplierError`]，每个变体带有 `spark.tls.*` 稳定错误码。

## 实现策略（How）
- 兴趣引用与调用引用均由 [`ProviderLease`] 表达，析构即归还，保证每份引用恰好释放一次；
- 供给器状态由单把互斥锁保护，登记回调发生在锁外；
- 附带参考实现 [`RefCountingRegistry`]（`DashMap` 引用计数仓储）与 [`PushContextProvider`]（推送式 Provider）。

## 风险与考量（Trade-offs）
- 关闭后的 `update` 仍会获取调用引用并完成，允许在途协商收尾；
- 回调执行器由调用方决定，若选择内联执行器，信号将在 Provider 的完成线程上运行。
"#]

mod callback;
mod context;
mod descriptor;
mod error;
mod executor;
mod lease;
mod provider;
mod registry;
mod supplier;
mod sync;

pub use callback::{ContextCallback, FnContextCallback, Outcome, dispatch, fail_async, oneshot};
pub use context::SecureContext;
pub use descriptor::{
    CertificateProviderInstance, CertificateValidationContext, CommonTlsContext, ContextSide,
    DownstreamTlsContext, TlsContextDescriptor, UpstreamTlsContext,
};
pub use error::{SharedCause, SupplierError};
#[cfg(feature = "runtime-tokio")]
pub use executor::TokioExecutor;
pub use executor::{CallbackExecutor, SharedExecutor, Task};
pub use lease::ProviderLease;
pub use provider::{PushContextProvider, SharedProvider, TlsContextProvider};
pub use registry::{ProviderFactory, RefCountingRegistry, SharedRegistry, TlsContextRegistry};
pub use supplier::{SupplierBuilder, TlsContextProviderSupplier};
