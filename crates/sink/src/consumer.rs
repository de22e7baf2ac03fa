//! 메시지 소비자와 소비자 관리자
//!
//! 모듈마다 bounded 채널 하나를 만들고, 수신단을 워커들이 공유합니다.
//! 워커 수는 [`SinkModule::num_consumer_threads`]를 따릅니다.
//!
//! ```text
//! ChannelProducer ──▶ mpsc ──▶ Arc<Mutex<Receiver>> ──┬─▶ worker 0 ──▶ handle_message
//!                                                     └─▶ worker N ──▶ handle_message
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::module::SinkModule;
use crate::producer::ChannelProducer;

/// 메시지 소비자 trait
pub trait MessageConsumer: Send + Sync + 'static {
    /// 소비 대상 모듈
    type Module: SinkModule;

    /// 소비 대상 모듈을 반환합니다.
    fn module(&self) -> &Self::Module;

    /// 메시지 하나를 처리합니다. 워커 여러 개에서 동시에 호출될 수 있습니다.
    fn handle_message(&self, message: <Self::Module as SinkModule>::Message);
}

type MessageOf<C> = <<C as MessageConsumer>::Module as SinkModule>::Message;

type SharedReceiver<M> = Arc<tokio::sync::Mutex<mpsc::Receiver<M>>>;

struct Registration {
    /// `mpsc::Sender<Module::Message>`
    sender: Box<dyn Any + Send + Sync>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// 소비자 등록과 워커 풀 수명을 관리합니다.
pub struct MessageConsumerManager {
    channel_capacity: usize,
    registrations: Mutex<HashMap<String, Registration>>,
}

impl MessageConsumerManager {
    /// 모듈 채널 용량을 지정하여 관리자를 생성합니다.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// 소비자를 등록하고 워커를 띄웁니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn register_consumer<C: MessageConsumer>(&self, consumer: C) -> Result<(), SinkError> {
        let module_id = consumer.module().id().to_owned();
        let threads = consumer.module().num_consumer_threads().max(1);

        let mut registrations = self.lock();
        if registrations.contains_key(&module_id) {
            return Err(SinkError::AlreadyRegistered(module_id));
        }

        let (tx, rx) = mpsc::channel::<MessageOf<C>>(self.channel_capacity);
        let rx: SharedReceiver<MessageOf<C>> = Arc::new(tokio::sync::Mutex::new(rx));
        let consumer = Arc::new(consumer);
        let cancel = CancellationToken::new();

        let workers = (0..threads)
            .map(|worker| {
                spawn_worker(
                    worker,
                    module_id.clone(),
                    Arc::clone(&consumer),
                    Arc::clone(&rx),
                    cancel.clone(),
                )
            })
            .collect();

        registrations.insert(
            module_id.clone(),
            Registration {
                sender: Box::new(tx),
                cancel,
                workers,
            },
        );

        info!(module = %module_id, threads, "consumer registered");
        Ok(())
    }

    /// 등록된 모듈로 보내는 생산자를 반환합니다.
    pub fn producer<S: SinkModule>(
        &self,
        module: &S,
    ) -> Result<ChannelProducer<S::Message>, SinkError> {
        let registrations = self.lock();
        let registration = registrations
            .get(module.id())
            .ok_or_else(|| SinkError::NotRegistered(module.id().to_owned()))?;

        registration
            .sender
            .downcast_ref::<mpsc::Sender<S::Message>>()
            .map(|tx| ChannelProducer::new(module.id(), tx.clone()))
            .ok_or_else(|| SinkError::MessageTypeMismatch(module.id().to_owned()))
    }

    /// 모든 소비자를 해제하고 워커가 끝날 때까지 기다립니다.
    ///
    /// 채널에 남은 메시지는 버려집니다.
    pub async fn unregister_all(&self) {
        let drained: Vec<(String, Registration)> = self.lock().drain().collect();

        for (module_id, registration) in drained {
            registration.cancel.cancel();
            for worker in registration.workers {
                if let Err(e) = worker.await {
                    warn!(module = %module_id, error = %e, "consumer worker ended abnormally");
                }
            }
            info!(module = %module_id, "consumer unregistered");
        }
    }

    /// 모듈에 소비자가 등록되어 있는지 확인합니다.
    pub fn is_registered(&self, module_id: &str) -> bool {
        self.lock().contains_key(module_id)
    }

    /// 등록된 모듈 수
    pub fn registered_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker<C: MessageConsumer>(
    worker: usize,
    module_id: String,
    consumer: Arc<C>,
    rx: SharedReceiver<MessageOf<C>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(module = %module_id, worker, "consumer worker started");
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = async { rx.lock().await.recv().await } => message,
            };
            match message {
                Some(message) => consumer.handle_message(message),
                None => break,
            }
        }
        debug!(module = %module_id, worker, "consumer worker stopped");
    })
}
