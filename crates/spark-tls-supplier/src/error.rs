use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

use crate::descriptor::ContextSide;

/// 可跨线程共享、可廉价克隆的错误原因。
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// 供给器错误域。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 供给器向调用方承诺“运行期失败一律经回调的失败信号送达”，因此错误类型必须可克隆：
///   同一次 Provider 失败可能需要扇出给多个排队中的回调；
/// - 提供稳定错误码，使协商器、运维脚本能够按错误码聚合，而无需解析底层库文案。
///
/// ## 逻辑（How）
/// - 外部原因统一收敛为 [`SharedCause`]（`Arc<dyn Error + Send + Sync>`），克隆只增加引用计数；
/// - `code()` 为每个变体返回 `spark.tls.*` 前缀的稳定错误码，与 `OperationKind` 的命名方式一致。
///
/// ## 契约（What）
/// - `InvalidArgument`：必需输入缺失或描述符不合法；
/// - `Acquire`：Registry 在 `find_or_create_*` 阶段同步失败；
/// - `Resolve`：Provider 报告的异步解析失败，原因对供给器不透明，原样转发；
/// - `ProviderClosed`：Provider 已被 Registry 拆除；
/// - `Abandoned`：回调在未收到任何信号前被丢弃；
/// - `InvalidConfig`：描述符配置文本无法解析。
///
/// ## 风险与权衡（Trade-offs）
/// - `InvalidArgument` 使用 `&'static str` 承载参数名与原因，零分配但无法拼接动态上下文；
///   需要动态信息的场景应使用 `InvalidConfig`。
#[derive(Clone, Debug, Error)]
pub enum SupplierError {
    /// 必需参数缺失或取值非法。
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: &'static str,
    },

    /// Registry 查找或创建 Provider 时失败。
    #[error("{side} tls context provider acquisition failed: {source}")]
    Acquire {
        side: ContextSide,
        source: SharedCause,
    },

    /// Provider 无法产出 TLS 上下文。
    #[error("tls context resolution failed: {source}")]
    Resolve { source: SharedCause },

    /// Provider 已关闭，不再接受回调。
    #[error("tls context provider has been closed")]
    ProviderClosed,

    /// 回调在完成前被丢弃。
    #[error("tls context callback was dropped before completion")]
    Abandoned,

    /// 描述符配置文本解析失败。
    #[error("invalid tls context configuration: {detail}")]
    InvalidConfig { detail: String },
}

impl SupplierError {
    /// 构造参数错误。
    pub const fn invalid_argument(argument: &'static str, reason: &'static str) -> Self {
        SupplierError::InvalidArgument { argument, reason }
    }

    /// 将任意底层错误包装为指定侧的获取失败。
    pub fn acquire<E>(side: ContextSide, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        SupplierError::Acquire {
            side,
            source: Arc::new(cause),
        }
    }

    /// 将任意底层错误包装为解析失败。
    pub fn resolve<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        SupplierError::Resolve {
            source: Arc::new(cause),
        }
    }

    /// 以纯文本构造解析失败，适用于没有结构化错误源的 Provider。
    pub fn resolve_message(message: impl Into<String>) -> Self {
        Self::resolve(Message(message.into()))
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SupplierError::InvalidArgument { .. } => "spark.tls.supplier.invalid_argument",
            SupplierError::Acquire { .. } => "spark.tls.registry.acquire_failed",
            SupplierError::Resolve { .. } => "spark.tls.provider.resolve_failed",
            SupplierError::ProviderClosed => "spark.tls.provider.closed",
            SupplierError::Abandoned => "spark.tls.supplier.callback_abandoned",
            SupplierError::InvalidConfig { .. } => "spark.tls.config.invalid",
        }
    }
}

impl From<toml::de::Error> for SupplierError {
    fn from(error: toml::de::Error) -> Self {
        SupplierError::InvalidConfig {
            detail: error.message().to_owned(),
        }
    }
}

/// 无结构化来源时使用的文本错误。
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}
