use std::sync::Arc;

use rustls::{ClientConfig, ServerConfig};

use crate::descriptor::ContextSide;

/// Provider 解析完成后交付给回调的 TLS 上下文。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协商器拿到的是可直接交给 `tokio-rustls` 的 `rustls` 配置快照，而不是证书原料；
/// - 变体与 [`ContextSide`] 一一对应，Provider 发布时即可校验“侧”是否匹配。
///
/// ## 契约（What）
/// - 克隆仅增加 `Arc` 引用计数；快照不会随 Provider 后续轮换而改变，新回调才会拿到新配置。
#[derive(Clone, Debug)]
pub enum SecureContext {
    Client(Arc<ClientConfig>),
    Server(Arc<ServerConfig>),
}

impl SecureContext {
    pub fn side(&self) -> ContextSide {
        match self {
            SecureContext::Client(_) => ContextSide::Client,
            SecureContext::Server(_) => ContextSide::Server,
        }
    }

    pub fn client_config(&self) -> Option<&Arc<ClientConfig>> {
        match self {
            SecureContext::Client(config) => Some(config),
            SecureContext::Server(_) => None,
        }
    }

    pub fn server_config(&self) -> Option<&Arc<ServerConfig>> {
        match self {
            SecureContext::Server(config) => Some(config),
            SecureContext::Client(_) => None,
        }
    }

    /// 基于客户端配置构造 `tokio-rustls` 连接器；服务端上下文返回 `None`。
    #[cfg(feature = "runtime-tokio")]
    pub fn connector(&self) -> Option<tokio_rustls::TlsConnector> {
        self.client_config()
            .map(|config| tokio_rustls::TlsConnector::from(Arc::clone(config)))
    }

    /// 基于服务端配置构造 `tokio-rustls` 受理器；客户端上下文返回 `None`。
    #[cfg(feature = "runtime-tokio")]
    pub fn acceptor(&self) -> Option<tokio_rustls::TlsAcceptor> {
        self.server_config()
            .map(|config| tokio_rustls::TlsAcceptor::from(Arc::clone(config)))
    }
}

impl From<Arc<ClientConfig>> for SecureContext {
    fn from(config: Arc<ClientConfig>) -> Self {
        SecureContext::Client(config)
    }
}

impl From<Arc<ServerConfig>> for SecureContext {
    fn from(config: Arc<ServerConfig>) -> Self {
        SecureContext::Server(config)
    }
}
