//! 이벤트 버스: 타입별 구독/발행
//!
//! [`EventBus`]는 최선 노력(at-most-effort) 전달을 전제로 합니다.
//! 발행은 절대 블로킹하지 않으며, 구독 채널이 가득 차면 해당 구독자에 대한
//! 전달을 버리고 경고를 남깁니다. 유실은 주기적 재조정 경로가 복구합니다.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::BusEvent;
use crate::metrics as m;

/// 이벤트 버스 trait
pub trait EventBus: Send + Sync {
    /// 이벤트를 발행합니다. 응답을 기다리지 않습니다.
    fn publish(&self, event: BusEvent);

    /// 지정한 이벤트 타입을 구독합니다.
    ///
    /// `ueis`가 비어 있으면 모든 이벤트를 받습니다.
    fn subscribe(&self, ueis: &[&str], capacity: usize) -> mpsc::Receiver<BusEvent>;
}

struct Subscriber {
    ueis: HashSet<String>,
    tx: mpsc::Sender<BusEvent>,
}

impl Subscriber {
    fn wants(&self, uei: &str) -> bool {
        self.ueis.is_empty() || self.ueis.contains(uei)
    }
}

/// 프로세스 내부 이벤트 버스
#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl InMemoryEventBus {
    /// 빈 버스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: BusEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());

        // 닫힌 구독자는 이번 발행에서 정리
        subscribers.retain(|sub| !sub.tx.is_closed());

        let mut delivered = 0usize;
        for sub in subscribers.iter().filter(|sub| sub.wants(&event.uei)) {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    metrics::counter!(m::BUS_EVENTS_DROPPED_TOTAL).increment(1);
                    warn!(uei = %event.uei, event_id = %event.id, "subscriber channel full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        metrics::counter!(m::BUS_EVENTS_PUBLISHED_TOTAL).increment(1);
        debug!(uei = %event.uei, delivered, "event published");
    }

    fn subscribe(&self, ueis: &[&str], capacity: usize) -> mpsc::Receiver<BusEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sub = Subscriber {
            ueis: ueis.iter().map(|u| (*u).to_owned()).collect(),
            tx,
        };
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sub);
        rx
    }
}
