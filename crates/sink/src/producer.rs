//! 메시지 생산자: 모듈 채널로 메시지를 보냅니다.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::SinkError;

/// 메시지 생산자 trait
pub trait MessageProducer<M>: Send + Sync {
    /// 메시지 하나를 보냅니다.
    ///
    /// 채널이 가득 차면 자리가 날 때까지 기다립니다.
    fn send(&self, message: M) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// 프로세스 내부 채널 생산자
///
/// [`MessageConsumerManager::producer`](crate::consumer::MessageConsumerManager::producer)로 얻습니다.
pub struct ChannelProducer<M> {
    module_id: Arc<str>,
    tx: mpsc::Sender<M>,
}

impl<M> ChannelProducer<M> {
    pub(crate) fn new(module_id: &str, tx: mpsc::Sender<M>) -> Self {
        Self {
            module_id: Arc::from(module_id),
            tx,
        }
    }

    /// 대상 모듈 id
    pub fn module_id(&self) -> &str {
        &self.module_id
    }
}

impl<M> Clone for ChannelProducer<M> {
    fn clone(&self) -> Self {
        Self {
            module_id: Arc::clone(&self.module_id),
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send + 'static> MessageProducer<M> for ChannelProducer<M> {
    async fn send(&self, message: M) -> Result<(), SinkError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| SinkError::ChannelClosed(self.module_id.to_string()))
    }
}
