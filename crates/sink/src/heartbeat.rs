//! 하트비트 모듈: 생존 신호 메시지의 생성과 계수
//!
//! [`HeartbeatGenerator`]는 tokio interval로 초당 전송 수를 제한하며,
//! [`HeartbeatConsumer`]는 수신 건수만 셉니다. 페이로드는 아무도 해석하지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use beacon_core::metrics as m;

use crate::consumer::MessageConsumer;
use crate::error::SinkError;
use crate::module::SinkModule;
use crate::producer::MessageProducer;

/// 하트비트 모듈 id
pub const HEARTBEAT_MODULE_ID: &str = "Heartbeat";

/// 하트비트 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// 메시지 고유 ID
    pub id: String,
    /// 보낸 생성기 번호
    pub generator: usize,
    /// 생성기 안에서의 순번
    pub sequence: u64,
    /// 생성 시각
    pub timestamp: SystemTime,
}

impl Heartbeat {
    /// 새 하트비트를 생성합니다.
    pub fn new(generator: usize, sequence: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            generator,
            sequence,
            timestamp: SystemTime::now(),
        }
    }
}

/// 하트비트 싱크 모듈
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatModule {
    consumer_threads: usize,
}

impl HeartbeatModule {
    /// 소비자 워커 수를 지정하여 생성합니다.
    pub fn new(consumer_threads: usize) -> Self {
        Self { consumer_threads }
    }
}

impl Default for HeartbeatModule {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SinkModule for HeartbeatModule {
    type Message = Heartbeat;

    fn id(&self) -> &str {
        HEARTBEAT_MODULE_ID
    }

    fn num_consumer_threads(&self) -> usize {
        self.consumer_threads
    }
}

/// 수신 건수만 세는 하트비트 소비자
///
/// 복제본끼리 수신 카운터를 공유하므로, 하나를 관리자에 등록하고
/// 다른 하나로 [`received`](Self::received)를 읽을 수 있습니다.
#[derive(Debug, Clone)]
pub struct HeartbeatConsumer {
    module: HeartbeatModule,
    received: Arc<AtomicU64>,
}

impl HeartbeatConsumer {
    /// 새 소비자를 생성합니다.
    pub fn new(module: HeartbeatModule) -> Self {
        Self {
            module,
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 지금까지 받은 하트비트 수
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl MessageConsumer for HeartbeatConsumer {
    type Module = HeartbeatModule;

    fn module(&self) -> &HeartbeatModule {
        &self.module
    }

    fn handle_message(&self, message: Heartbeat) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SINK_HEARTBEATS_RECEIVED_TOTAL).increment(1);
        trace!(generator = message.generator, sequence = message.sequence, "heartbeat received");
    }
}

/// 속도 제한 하트비트 생성기
pub struct HeartbeatGenerator<P> {
    index: usize,
    producer: Arc<P>,
    rate: u64,
    sent: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<P> HeartbeatGenerator<P>
where
    P: MessageProducer<Heartbeat> + 'static,
{
    /// 생성기를 만듭니다. `rate`는 초당 전송 수이며 0이면 에러입니다.
    pub fn new(index: usize, producer: P, rate: u64) -> Result<Self, SinkError> {
        if rate == 0 {
            return Err(SinkError::Config {
                field: "rate_per_generator".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(Self {
            index,
            producer: Arc::new(producer),
            rate,
            sent: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// 전송 간격
    pub fn period(&self) -> Duration {
        Duration::from_nanos((1_000_000_000 / self.rate).max(1))
    }

    /// 생성 태스크를 시작합니다.
    pub fn start(&mut self) -> Result<(), SinkError> {
        if self.task.is_some() {
            return Err(SinkError::GeneratorRunning(self.index));
        }

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let producer = Arc::clone(&self.producer);
        let sent = Arc::clone(&self.sent);
        let index = self.index;
        let period = self.period();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sequence = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let started = Instant::now();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = producer.send(Heartbeat::new(index, sequence)) => result,
                };

                match result {
                    Ok(()) => {
                        metrics::histogram!(m::SINK_SEND_DURATION_SECONDS)
                            .record(started.elapsed().as_secs_f64());
                        metrics::counter!(m::SINK_HEARTBEATS_SENT_TOTAL).increment(1);
                        sent.fetch_add(1, Ordering::Relaxed);
                        sequence += 1;
                    }
                    Err(e) => {
                        warn!(generator = index, error = %e, "heartbeat send failed, stopping generator");
                        break;
                    }
                }
            }
            debug!(generator = index, sent = sequence, "heartbeat generator finished");
        }));

        info!(generator = self.index, rate = self.rate, "heartbeat generator started");
        Ok(())
    }

    /// 생성 태스크를 멈추고 끝날 때까지 기다립니다.
    pub async fn stop(&mut self) -> Result<(), SinkError> {
        let task = self
            .task
            .take()
            .ok_or(SinkError::GeneratorNotRunning(self.index))?;

        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(generator = self.index, error = %e, "heartbeat generator task ended abnormally");
        }
        info!(generator = self.index, sent = self.sent(), "heartbeat generator stopped");
        Ok(())
    }

    /// 지금까지 보낸 하트비트 수
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 생성 태스크가 살아 있는지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 생성기 번호
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Discard;

    impl MessageProducer<Heartbeat> for Discard {
        async fn send(&self, _message: Heartbeat) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn module_reports_id_and_threads() {
        let module = HeartbeatModule::new(4);
        assert_eq!(module.id(), HEARTBEAT_MODULE_ID);
        assert_eq!(module.num_consumer_threads(), 4);
        assert_eq!(HeartbeatModule::default().num_consumer_threads(), 1);
    }

    #[test]
    fn consumer_clones_share_counter() {
        let consumer = HeartbeatConsumer::new(HeartbeatModule::default());
        let registered = consumer.clone();

        registered.handle_message(Heartbeat::new(0, 0));
        registered.handle_message(Heartbeat::new(0, 1));

        assert_eq!(consumer.received(), 2);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            HeartbeatGenerator::new(0, Discard, 0),
            Err(SinkError::Config { .. })
        ));
    }

    #[test]
    fn period_follows_rate() {
        let generator = HeartbeatGenerator::new(0, Discard, 4).unwrap();
        assert_eq!(generator.period(), Duration::from_millis(250));

        let generator = HeartbeatGenerator::new(0, Discard, u64::MAX).unwrap();
        assert_eq!(generator.period(), Duration::from_nanos(1));
    }

    #[tokio::test]
    async fn start_twice_and_stop_twice_fail() {
        let mut generator = HeartbeatGenerator::new(2, Discard, 10).unwrap();
        assert!(!generator.is_running());

        generator.start().unwrap();
        assert!(matches!(generator.start(), Err(SinkError::GeneratorRunning(2))));

        generator.stop().await.unwrap();
        assert!(matches!(
            generator.stop().await,
            Err(SinkError::GeneratorNotRunning(2))
        ));
    }

    #[test]
    fn heartbeat_ids_are_unique() {
        assert_ne!(Heartbeat::new(0, 0).id, Heartbeat::new(0, 0).id);
    }
}
