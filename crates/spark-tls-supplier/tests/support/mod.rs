//! 集成测试共享替身。
//!
//! # 教案级导览
//! - **Why**：供给器的契约全部体现在“对 Registry 的调用序列”与“回调信号的送达时机”上，
//!   因此替身把两者写入同一份有序 [`Journal`]，断言可以直接比较事件顺序；
//! - **How**：[`RecordingRegistry`] 记录获取/释放并返回同一个 [`ScriptedProvider`]；
//!   Provider 只暂存回调，由测试显式决定何时以何种结果完成；
//!   [`QueueExecutor`] 只排队不执行，证明信号从未在调用线程内联发生。
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    crypto::{CryptoProvider, ring},
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
};
use spark_tls_supplier::{
    CertificateProviderInstance, CertificateValidationContext, CommonTlsContext, ContextCallback,
    ContextSide, DownstreamTlsContext, FnContextCallback, Outcome, SecureContext, SharedExecutor,
    SharedProvider, SupplierError, Task, TlsContextDescriptor, TlsContextProvider,
    TlsContextRegistry, UpstreamTlsContext, dispatch,
};

/// 测试中可观测的事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Acquire(ContextSide),
    AcquireFailed(ContextSide),
    Release(ContextSide),
    AddCallback,
    Success(&'static str),
    Failure(&'static str, &'static str),
}

/// 有序事件日志。
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// 只排队、由测试手动驱动的执行器。
#[derive(Default)]
pub struct QueueExecutor {
    tasks: Mutex<VecDeque<Task>>,
}

impl QueueExecutor {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// 运行所有排队任务（包括运行期间新入队的任务），返回运行数量。
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.lock().unwrap().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl spark_tls_supplier::CallbackExecutor for QueueExecutor {
    fn execute(&self, task: Task) {
        self.tasks.lock().unwrap().push_back(task);
    }
}

/// 在提交线程上立即运行任务的执行器。
pub fn inline() -> SharedExecutor {
    Arc::new(|task: Task| task())
}

/// 只暂存回调的 Provider。
pub struct ScriptedProvider {
    descriptor: TlsContextDescriptor,
    journal: Journal,
    pending: Mutex<Vec<Box<dyn ContextCallback>>>,
}

impl ScriptedProvider {
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// 以同一结果完成全部暂存回调，返回完成数量。
    pub fn complete_all(&self, outcome: Outcome) -> usize {
        let waiters = std::mem::take(&mut *self.pending.lock().unwrap());
        let count = waiters.len();
        for waiter in waiters {
            dispatch(waiter, outcome.clone());
        }
        count
    }
}

impl TlsContextProvider for ScriptedProvider {
    fn descriptor(&self) -> &TlsContextDescriptor {
        &self.descriptor
    }

    fn add_callback(&self, callback: Box<dyn ContextCallback>) {
        self.journal.push(Event::AddCallback);
        self.pending.lock().unwrap().push(callback);
    }
}

/// 记录调用序列的 Registry。
///
/// 所有获取都返回同一个 [`ScriptedProvider`]；`fail_with` 之后的获取同步失败，
/// `fail_nth` 只让指定序号的那一次获取失败。
pub struct RecordingRegistry {
    journal: Journal,
    provider: Arc<ScriptedProvider>,
    failure: Mutex<Option<SupplierError>>,
    acquisitions: Mutex<usize>,
    nth_failure: Mutex<Option<(usize, SupplierError)>>,
}

impl RecordingRegistry {
    pub fn new(journal: &Journal, descriptor: TlsContextDescriptor) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            provider: Arc::new(ScriptedProvider {
                descriptor,
                journal: journal.clone(),
                pending: Mutex::default(),
            }),
            failure: Mutex::default(),
            acquisitions: Mutex::default(),
            nth_failure: Mutex::default(),
        })
    }

    pub fn provider(&self) -> &Arc<ScriptedProvider> {
        &self.provider
    }

    pub fn fail_with(&self, cause: SupplierError) {
        *self.failure.lock().unwrap() = Some(cause);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// 让第 `nth` 次获取（从 1 计数，含已发生的获取）同步失败，其余获取照常成功。
    pub fn fail_nth(&self, nth: usize, cause: SupplierError) {
        *self.nth_failure.lock().unwrap() = Some((nth, cause));
    }

    fn acquire(&self, side: ContextSide) -> Result<SharedProvider, SupplierError> {
        let attempt = {
            let mut acquisitions = self.acquisitions.lock().unwrap();
            *acquisitions += 1;
            *acquisitions
        };
        let scheduled = match &*self.nth_failure.lock().unwrap() {
            Some((nth, cause)) if *nth == attempt => Some(cause.clone()),
            _ => None,
        };
        if let Some(cause) = scheduled.or_else(|| self.failure.lock().unwrap().clone()) {
            self.journal.push(Event::AcquireFailed(side));
            return Err(cause);
        }
        self.journal.push(Event::Acquire(side));
        Ok(self.provider.clone())
    }
}

impl TlsContextRegistry for RecordingRegistry {
    fn find_or_create_client(
        &self,
        _upstream: &UpstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError> {
        self.acquire(ContextSide::Client)
    }

    fn find_or_create_server(
        &self,
        _downstream: &DownstreamTlsContext,
    ) -> Result<SharedProvider, SupplierError> {
        self.acquire(ContextSide::Server)
    }

    fn release_client(&self, _provider: SharedProvider) {
        self.journal.push(Event::Release(ContextSide::Client));
    }

    fn release_server(&self, _provider: SharedProvider) {
        self.journal.push(Event::Release(ContextSide::Server));
    }
}

/// 把信号写入日志的回调。
pub fn probe(
    journal: &Journal,
    executor: SharedExecutor,
    label: &'static str,
) -> Box<dyn ContextCallback> {
    let on_success = journal.clone();
    let on_failure = journal.clone();
    FnContextCallback::new(
        executor,
        move |_context: SecureContext| on_success.push(Event::Success(label)),
        move |cause: SupplierError| on_failure.push(Event::Failure(label, cause.code())),
    )
    .boxed()
}

pub fn client_descriptor() -> TlsContextDescriptor {
    TlsContextDescriptor::Client(UpstreamTlsContext {
        common: CommonTlsContext {
            validation_context: Some(CertificateValidationContext {
                ca_certificate_provider: Some(CertificateProviderInstance::new("mesh-ca")),
                ..CertificateValidationContext::default()
            }),
            alpn_protocols: vec!["h2".to_owned()],
            ..CommonTlsContext::default()
        },
        sni: Some("backend.mesh.local".to_owned()),
        ..UpstreamTlsContext::default()
    })
}

pub fn server_descriptor() -> TlsContextDescriptor {
    TlsContextDescriptor::Server(DownstreamTlsContext {
        common: CommonTlsContext {
            tls_certificate_provider: Some(CertificateProviderInstance::new("mesh-identity")),
            ..CommonTlsContext::default()
        },
        ..DownstreamTlsContext::default()
    })
}

fn crypto() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

pub fn client_context() -> SecureContext {
    let config = ClientConfig::builder_with_provider(crypto())
        .with_safe_default_protocol_versions()
        .expect("ring 支持默认协议版本")
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    SecureContext::Client(Arc::new(config))
}

pub fn server_context() -> SecureContext {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
        .expect("生成自签证书");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
    let config = ServerConfig::builder_with_provider(crypto())
        .with_safe_default_protocol_versions()
        .expect("ring 支持默认协议版本")
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)
        .expect("自签证书与私钥匹配");
    SecureContext::Server(Arc::new(config))
}
