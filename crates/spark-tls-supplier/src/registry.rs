//! # registry：Provider 引用计数仓储
//!
//! ## 核心意图（Why）
//! - Provider 创建昂贵且可被多个供给器共享，Registry 以描述符为键做“查找或创建”，
//!   并以手工引用计数决定何时拆除；
//! - 供给器只消费 [`TlsContextRegistry`] 这一窄契约，按描述符变体选择客户端或服务端操作。
//!
//! ## 行为契约（What）
//! - `find_or_create_*`：首次引用时创建 Provider，每次调用都递增引用计数，可同步失败；
//! - `release_*`：递减引用计数，归零时拆除；调用次数不得超过对应 Provider 的成功获取次数。
//!
//! ## 参考实现
//! - [`RefCountingRegistry`]：基于 `DashMap` 的实现，键为完整描述符，Provider 由
//!   [`ProviderFactory`] 创建。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` 分片锁在工厂创建 Provider 期间保持持有，同分片的其它键会短暂阻塞；
//!   工厂应只做轻量装配，把证书加载放到 Provider 的异步路径上。

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, warn};

use crate::{
    descriptor::{ContextSide, DownstreamTlsContext, TlsContextDescriptor, UpstreamTlsContext},
    error::SupplierError,
    provider::SharedProvider,
};

/// Provider 仓储契约。
///
/// # 契约说明（What）
/// - 客户端与服务端各一对获取/释放操作，由调用方按描述符变体选择；
/// - 获取失败以 [`SupplierError`] 返回，通常为 `InvalidArgument`（描述符不合法）或 `Acquire`；
/// - 释放操作不返回错误：调用点往往位于析构路径，实现应自行记录不平衡的释放。
pub trait TlsContextRegistry: Send + Sync + 'static {
    fn find_or_create_client(
        &self,
        upstream: &UpstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError>;

    fn find_or_create_server(
        &self,
        downstream: &DownstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError>;

    fn release_client(&self, provider: SharedProvider);

    fn release_server(&self, provider: SharedProvider);
}

/// 共享的仓储句柄。
pub type SharedRegistry = Arc<dyn TlsContextRegistry>;

/// Provider 工厂：Registry 在首次引用某描述符时调用。
///
/// # 契约（What）
/// - 返回的 Provider 其 `descriptor()` 必须与传入的描述符相等：释放路径以 Provider 自报的描述符
///   定位缓存条目，二者不一致时引用永远无法归零；
/// - 不满足该要求的产物会被 [`RefCountingRegistry`] 以 `InvalidArgument("factory")` 拒绝，且不入缓存。
pub trait ProviderFactory: Send + Sync + 'static {
    fn create(&self, descriptor: &TlsContextDescriptor) -> Result<SharedProvider, SupplierError>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&TlsContextDescriptor) -> Result<SharedProvider, SupplierError> + Send + Sync + 'static,
{
    fn create(&self, descriptor: &TlsContextDescriptor) -> Result<SharedProvider, SupplierError> {
        self(descriptor)
    }
}

/// 基于 `DashMap` 的引用计数仓储。
///
/// # 教案式注释
/// - **意图 (Why)**：封装“查找或创建 + 引用计数 + 归零拆除”，避免各调用方手工维护计数；
/// - **契约 (What)**：
///   - 获取前先执行 [`TlsContextDescriptor::validate`]，不合法的描述符不会触发工厂；
///   - 工厂产物自报的描述符必须等于缓存键，否则以 `InvalidArgument("factory")` 拒绝；
///   - 计数归零时移除条目并调用 Provider 的 `close`，`close` 在分片锁之外执行；
///   - 释放未知或已被替换的 Provider 时记录 `warn` 并忽略；
/// - **风险 (Trade-offs)**：条目按完整描述符哈希，描述符中任何字段变化都会产生新的 Provider。
pub struct RefCountingRegistry {
    factory: Box<dyn ProviderFactory>,
    entries: DashMap<TlsContextDescriptor, RegistryEntry>,
}

struct RegistryEntry {
    provider: SharedProvider,
    refs: usize,
}

impl RefCountingRegistry {
    pub fn new(factory: impl ProviderFactory) -> Self {
        Self {
            factory: Box::new(factory),
            entries: DashMap::new(),
        }
    }

    /// 指定描述符当前的引用计数；未缓存时为 0。
    pub fn ref_count(&self, descriptor: &TlsContextDescriptor) -> usize {
        self.entries
            .get(descriptor)
            .map_or(0, |entry| entry.refs)
    }

    /// 当前缓存的 Provider 数量。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find_or_create(
        &self,
        descriptor: TlsContextDescriptor,
    ) -> Result<SharedProvider, SupplierError> {
        descriptor.validate()?;
        match self.entries.entry(descriptor) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.refs += 1;
                Ok(Arc::clone(&entry.provider))
            }
            Entry::Vacant(vacant) => {
                let provider = self.factory.create(vacant.key())?;
                if provider.descriptor() != vacant.key() {
                    warn!(
                        side = %vacant.key().side(),
                        "provider factory returned a provider for a different descriptor; rejecting"
                    );
                    return Err(SupplierError::invalid_argument(
                        "factory",
                        "created provider must report the descriptor it was created for",
                    ));
                }
                debug!(side = %vacant.key().side(), "tls context provider created");
                vacant.insert(RegistryEntry {
                    provider: Arc::clone(&provider),
                    refs: 1,
                });
                Ok(provider)
            }
        }
    }

    fn release(&self, side: ContextSide, provider: SharedProvider) {
        let descriptor = provider.descriptor();
        if descriptor.side() != side {
            warn!(
                %side,
                provider_side = %descriptor.side(),
                "tls context provider released through the wrong side; ignoring"
            );
            return;
        }
        let removed = match self.entries.entry(descriptor.clone()) {
            Entry::Occupied(mut occupied) => {
                if !Arc::ptr_eq(&occupied.get().provider, &provider) {
                    warn!(%side, "released tls context provider is not the cached instance; ignoring");
                    return;
                }
                let entry = occupied.get_mut();
                entry.refs -= 1;
                if entry.refs == 0 {
                    Some(occupied.remove().provider)
                } else {
                    None
                }
            }
            Entry::Vacant(_) => {
                warn!(%side, "released tls context provider is not registered; ignoring");
                return;
            }
        };
        if let Some(provider) = removed {
            debug!(%side, "last tls context provider reference released; closing");
            provider.close();
        }
    }
}

impl TlsContextRegistry for RefCountingRegistry {
    fn find_or_create_client(
        &self,
        upstream: &UpstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError> {
        self.find_or_create(TlsContextDescriptor::Client(upstream.clone()))
    }

    fn find_or_create_server(
        &self,
        downstream: &DownstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError> {
        self.find_or_create(TlsContextDescriptor::Server(downstream.clone()))
    }

    fn release_client(&self, provider: SharedProvider) {
        self.release(ContextSide::Client, provider);
    }

    fn release_server(&self, provider: SharedProvider) {
        self.release(ContextSide::Server, provider);
    }
}

impl std::fmt::Debug for RefCountingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCountingRegistry")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
