//! # callback：一次性完成回调
//!
//! ## 意图（Why）
//! - 调用方通过回调接收“成功（携带上下文）/失败（携带原因）”二选一的完成信号；
//! - 回调以 `Box<Self>` 消费式签名表达“恰好一次”：信号方法拿走所有权，重复调用在类型上不可能。
//!
//! ## 契约（What）
//! - 每个回调声明自己的 [`CallbackExecutor`](crate::executor::CallbackExecutor)，信号必须在该执行器上运行；
//! - [`dispatch`] / [`fail_async`] 是把信号交给执行器的唯一入口，Provider 与供给器都经由它们派发。

use futures::channel::oneshot as channel;

use crate::{
    context::SecureContext,
    error::SupplierError,
    executor::SharedExecutor,
};

/// 完成回调契约。
///
/// # 契约说明（What）
/// - `executor`：信号派发所用的执行器，在回调生命周期内保持不变；
/// - `on_context` / `on_failure`：二者恰好其一被调用一次，调用后回调即被消费。
pub trait ContextCallback: Send + 'static {
    fn executor(&self) -> &SharedExecutor;

    fn on_context(self: Box<Self>, context: SecureContext);

    fn on_failure(self: Box<Self>, cause: SupplierError);
}

/// 解析结果。
pub type Outcome = Result<SecureContext, SupplierError>;

/// 在回调自身的执行器上派发完成信号。
pub fn dispatch(callback: Box<dyn ContextCallback>, outcome: Outcome) {
    let executor = SharedExecutor::clone(callback.executor());
    executor.execute(Box::new(move || match outcome {
        Ok(context) => callback.on_context(context),
        Err(cause) => callback.on_failure(cause),
    }));
}

/// 在回调自身的执行器上派发失败信号，绝不在调用线程内联执行。
pub fn fail_async(callback: Box<dyn ContextCallback>, cause: SupplierError) {
    dispatch(callback, Err(cause));
}

/// 由两个闭包组成的回调。
///
/// # 教案式说明
/// - **意图 (Why)**：多数调用点只需要两个闭包，无需为每个协商器手写回调类型；
/// - **契约 (What)**：`S` 处理成功，`F` 处理失败；两者都只会被调用至多一次。
pub struct FnContextCallback<S, F> {
    executor: SharedExecutor,
    on_context: S,
    on_failure: F,
}

impl<S, F> FnContextCallback<S, F>
where
    S: FnOnce(SecureContext) + Send + 'static,
    F: FnOnce(SupplierError) + Send + 'static,
{
    pub fn new(executor: SharedExecutor, on_context: S, on_failure: F) -> Self {
        Self {
            executor,
            on_context,
            on_failure,
        }
    }

    /// 装箱为 trait 对象，便于直接交给 `update`。
    pub fn boxed(self) -> Box<dyn ContextCallback> {
        Box::new(self)
    }
}

impl<S, F> ContextCallback for FnContextCallback<S, F>
where
    S: FnOnce(SecureContext) + Send + 'static,
    F: FnOnce(SupplierError) + Send + 'static,
{
    fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    fn on_context(self: Box<Self>, context: SecureContext) {
        (self.on_context)(context)
    }

    fn on_failure(self: Box<Self>, cause: SupplierError) {
        (self.on_failure)(cause)
    }
}

/// 将完成信号转发到一次性通道的回调。
struct OneshotCallback {
    executor: SharedExecutor,
    sender: channel::Sender<Outcome>,
}

impl ContextCallback for OneshotCallback {
    fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    fn on_context(self: Box<Self>, context: SecureContext) {
        // 接收端已放弃等待时发送失败，属于调用方主动忽略结果。
        let _ = self.sender.send(Ok(context));
    }

    fn on_failure(self: Box<Self>, cause: SupplierError) {
        let _ = self.sender.send(Err(cause));
    }
}

/// 构造“回调 + 接收端”对，供 `Future` 风格的调用点等待结果。
///
/// 回调在未发送信号的情况下被丢弃时，接收端得到 `Canceled`。
pub fn oneshot(executor: SharedExecutor) -> (Box<dyn ContextCallback>, channel::Receiver<Outcome>) {
    let (sender, receiver) = channel::channel();
    (Box::new(OneshotCallback { executor, sender }), receiver)
}
