//! 상태 변경 알림기: 상태 전이를 버스 이벤트로 발행합니다.

use std::sync::Arc;

use beacon_core::bus::EventBus;
use beacon_core::event::{
    BusEvent, MODULE_BSM, PARM_BUSINESS_SERVICE_ID, PARM_BUSINESS_SERVICE_NAME,
    PARM_NEW_SEVERITY_ID, PARM_NEW_SEVERITY_LABEL, PARM_PREV_SEVERITY_ID,
    PARM_PREV_SEVERITY_LABEL, UEI_BSM_STATUS_CHANGED,
};

use crate::aggregator::{StatusChange, StatusChangeHandler};

/// 상태 전이를 이벤트 버스로 전달하는 핸들러
///
/// 발행은 fire-and-forget이며 수신 확인을 기다리지 않습니다.
pub struct BusNotifier {
    bus: Arc<dyn EventBus>,
}

impl BusNotifier {
    /// 새 알림기를 생성합니다.
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }
}

impl StatusChangeHandler for BusNotifier {
    fn on_status_change(&self, change: &StatusChange) {
        self.bus.publish(status_change_event(change));
    }
}

/// 상태 전이 하나를 버스 이벤트로 변환합니다.
pub fn status_change_event(change: &StatusChange) -> BusEvent {
    BusEvent::new(UEI_BSM_STATUS_CHANGED, MODULE_BSM)
        .with_param(PARM_BUSINESS_SERVICE_ID, change.service_id)
        .with_param(PARM_BUSINESS_SERVICE_NAME, &change.service_name)
        .with_param(PARM_PREV_SEVERITY_ID, change.previous.id())
        .with_param(PARM_PREV_SEVERITY_LABEL, change.previous.label())
        .with_param(PARM_NEW_SEVERITY_ID, change.current.id())
        .with_param(PARM_NEW_SEVERITY_LABEL, change.current.label())
}
