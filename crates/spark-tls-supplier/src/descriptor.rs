//! # descriptor：TLS 上下文描述符
//!
//! ## 定位（Why）
//! - 描述符是供给器的不可变输入：它决定向 Registry 申请哪一侧（客户端/服务端）的 Provider，
//!   同时作为 Registry 的缓存键；
//! - 以显式枚举 [`TlsContextDescriptor`] 表达“客户端或服务端”两种变体，调用点通过 `match`
//!   完成分派，不依赖运行时类型判断。
//!
//! ## 契约（What）
//! - 所有类型实现 `Clone + Eq + Hash`，可直接作为 `DashMap` 键；
//! - 支持 serde 反序列化，配置文本以 `side = "client" | "server"` 区分变体；
//! - [`TlsContextDescriptor::validate`] 只做结构性校验，不解析任何证书内容。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SupplierError;

/// TLS 上下文所属的一侧。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSide {
    /// 发起连接的一侧（上游）。
    Client,
    /// 接受连接的一侧（下游）。
    Server,
}

impl fmt::Display for ContextSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextSide::Client => f.write_str("client"),
            ContextSide::Server => f.write_str("server"),
        }
    }
}

/// 证书提供方实例引用。
///
/// - `instance_name`：证书提供方插件实例名，由 Provider 工厂解释；
/// - `certificate_name`：同一实例下的证书名，缺省为空串表示默认证书。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateProviderInstance {
    pub instance_name: String,
    pub certificate_name: String,
}

impl CertificateProviderInstance {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            certificate_name: String::new(),
        }
    }

    pub fn with_certificate_name(mut self, certificate_name: impl Into<String>) -> Self {
        self.certificate_name = certificate_name.into();
        self
    }
}

/// 对端证书校验配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateValidationContext {
    /// 提供信任根（CA）的证书提供方实例。
    pub ca_certificate_provider: Option<CertificateProviderInstance>,
    /// 对端证书 SAN 需至少命中其中之一；为空表示不做 SAN 匹配。
    pub match_subject_alt_names: Vec<String>,
    /// 是否使用系统信任根。
    pub system_root_certs: bool,
}

impl CertificateValidationContext {
    fn has_trust_source(&self) -> bool {
        self.ca_certificate_provider.is_some() || self.system_root_certs
    }
}

/// 客户端与服务端共享的 TLS 配置片段。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonTlsContext {
    /// 本端身份证书的提供方实例。
    pub tls_certificate_provider: Option<CertificateProviderInstance>,
    pub validation_context: Option<CertificateValidationContext>,
    pub alpn_protocols: Vec<String>,
}

/// 客户端（上游）TLS 配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamTlsContext {
    pub common: CommonTlsContext,
    /// 固定的 SNI；为空且 `auto_host_sni` 为真时由连接目标主机名推导。
    pub sni: Option<String>,
    pub auto_host_sni: bool,
    /// 以实际发送的 SNI 校验服务端证书 SAN。
    pub auto_sni_san_validation: bool,
}

/// 服务端（下游）TLS 配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamTlsContext {
    pub common: CommonTlsContext,
    /// 为真时执行双向 TLS，要求客户端出示证书。
    pub require_client_certificate: bool,
    pub require_sni: bool,
}

/// 供给器绑定的 TLS 上下文描述符。
///
/// # 教案式说明
/// - **意图 (Why)**：把“客户端还是服务端”编码进类型，Registry 的获取/释放操作据此分派；
/// - **契约 (What)**：构造后不可变；供给器以 `Arc` 形式只读共享，生命周期内始终返回同一实例；
/// - **风险 (Trade-offs)**：作为 Registry 键时会整体参与哈希，字段较多的描述符会带来少量哈希开销，
///   但避免了“键与配置不一致”的整类问题。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum TlsContextDescriptor {
    Client(UpstreamTlsContext),
    Server(DownstreamTlsContext),
}

impl TlsContextDescriptor {
    /// 返回描述符所属的一侧。
    pub fn side(&self) -> ContextSide {
        match self {
            TlsContextDescriptor::Client(_) => ContextSide::Client,
            TlsContextDescriptor::Server(_) => ContextSide::Server,
        }
    }

    /// 两侧共享的配置片段。
    pub fn common(&self) -> &CommonTlsContext {
        match self {
            TlsContextDescriptor::Client(upstream) => &upstream.common,
            TlsContextDescriptor::Server(downstream) => &downstream.common,
        }
    }

    /// 从 TOML 文本加载描述符。
    ///
    /// # 契约（What）
    /// - 顶层必须包含 `side = "client"` 或 `side = "server"`，其余字段平铺在同一表内；
    /// - 解析失败返回 [`SupplierError::InvalidConfig`]；本方法不做 [`Self::validate`] 校验，
    ///   结构合法性由 Registry 在首次获取时判定。
    pub fn from_toml_str(text: &str) -> Result<Self, SupplierError> {
        Ok(toml::from_str(text)?)
    }

    /// 结构性校验。
    ///
    /// # 契约（What）
    /// - 服务端必须配置身份证书提供方；
    /// - 服务端要求客户端证书时必须配置 CA 提供方；
    /// - 客户端必须具备至少一种信任来源（CA 提供方或系统信任根）。
    ///
    /// 失败统一返回 [`SupplierError::InvalidArgument`]，参数名固定为 `descriptor`。
    pub fn validate(&self) -> Result<(), SupplierError> {
        match self {
            TlsContextDescriptor::Client(upstream) => {
                let trusted = upstream
                    .common
                    .validation_context
                    .as_ref()
                    .is_some_and(CertificateValidationContext::has_trust_source);
                if !trusted {
                    return Err(SupplierError::invalid_argument(
                        "descriptor",
                        "client tls context requires a ca certificate provider or system root certs",
                    ));
                }
            }
            TlsContextDescriptor::Server(downstream) => {
                if downstream.common.tls_certificate_provider.is_none() {
                    return Err(SupplierError::invalid_argument(
                        "descriptor",
                        "server tls context requires a certificate provider instance",
                    ));
                }
                let has_ca = downstream
                    .common
                    .validation_context
                    .as_ref()
                    .is_some_and(|validation| validation.ca_certificate_provider.is_some());
                if downstream.require_client_certificate && !has_ca {
                    return Err(SupplierError::invalid_argument(
                        "descriptor",
                        "server tls context requiring client certificates needs a ca certificate provider",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl From<UpstreamTlsContext> for TlsContextDescriptor {
    fn from(upstream: UpstreamTlsContext) -> Self {
        TlsContextDescriptor::Client(upstream)
    }
}

impl From<DownstreamTlsContext> for TlsContextDescriptor {
    fn from(downstream: DownstreamTlsContext) -> Self {
        TlsContextDescriptor::Server(downstream)
    }
}
