use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    descriptor::{ContextSide, TlsContextDescriptor},
    error::SupplierError,
    provider::SharedProvider,
    registry::{SharedRegistry, TlsContextRegistry},
};

/// Registry 中一份 Provider 引用的所有权句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 供给器持有两类引用：生命周期与供给器一致的“兴趣引用”，以及随单次 `update` 移入完成回调的
///   “调用引用”。二者的释放义务完全相同，因此用同一个句柄类型表达；
/// - 释放写在 `Drop` 中：无论完成回调正常返回、调用方回调 panic，还是 Provider 直接丢弃回调，
///   引用都会且只会归还一次。
///
/// ## 逻辑（How）
/// - [`acquire`](Self::acquire) 按描述符变体调用 `find_or_create_client` / `find_or_create_server`；
/// - `Drop` 按 [`ContextSide`] 路由到 `release_client` / `release_server`。
///
/// ## 契约（What）
/// - 每个成功构造的 `ProviderLease` 对应 Registry 中恰好一次递增，析构时恰好一次递减；
/// - 获取失败时不构造句柄，因此也不会产生释放调用。
pub struct ProviderLease {
    registry: SharedRegistry,
    side: ContextSide,
    provider: SharedProvider,
}

impl ProviderLease {
    /// 按描述符变体向 Registry 申请一份引用。
    pub fn acquire(
        registry: &SharedRegistry,
        descriptor: &TlsContextDescriptor,
    ) -> Result<Self, SupplierError> {
        let provider = match descriptor {
            TlsContextDescriptor::Client(upstream) => registry.find_or_create_client(upstream)?,
            TlsContextDescriptor::Server(downstream) => {
                registry.find_or_create_server(downstream)?
            }
        };
        Ok(Self {
            registry: Arc::clone(registry),
            side: descriptor.side(),
            provider,
        })
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn side(&self) -> ContextSide {
        self.side
    }

    /// 显式归还引用，等价于 `drop(lease)`。
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        debug!(side = %self.side, "releasing tls context provider reference");
        release_to(
            self.registry.as_ref(),
            self.side,
            Arc::clone(&self.provider),
        );
    }
}

/// 按侧路由释放操作。
fn release_to(registry: &dyn TlsContextRegistry, side: ContextSide, provider: SharedProvider) {
    match side {
        ContextSide::Client => registry.release_client(provider),
        ContextSide::Server => registry.release_server(provider),
    }
}

impl fmt::Debug for ProviderLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderLease")
            .field("side", &self.side)
            .field("provider", &self.provider.descriptor())
            .finish_non_exhaustive()
    }
}
