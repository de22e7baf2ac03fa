//! 이벤트 시스템: 이벤트 버스를 오가는 메시지의 기본 단위
//!
//! 버스 위의 모든 메시지는 `{타입(UEI), 파라미터(문자열 → 문자열)}` 형태의
//! [`BusEvent`]입니다. [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는
//! 추적 정보이며, [`Event`] trait은 이벤트 타입이 구현해야 하는 인터페이스입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// 비즈니스 서비스 모니터 모듈명
pub const MODULE_BSM: &str = "bsmd";
/// 리로드 요청과 결과 이벤트의 `daemonName` 값
pub const DAEMON_NAME_BSM: &str = "Bsmd";
/// 하트비트 싱크 모듈명
pub const MODULE_SINK: &str = "heartbeat-sink";
/// 데몬 모듈명
pub const MODULE_DAEMON: &str = "beacon-daemon";

// --- 이벤트 타입(UEI) 상수 ---

/// 알람 생성
pub const UEI_ALARM_CREATED: &str = "uei.opennms.org/internal/alarms/alarmCreated";
/// 알람 상향
pub const UEI_ALARM_ESCALATED: &str = "uei.opennms.org/internal/alarms/alarmEscalated";
/// 알람 해제
pub const UEI_ALARM_CLEARED: &str = "uei.opennms.org/internal/alarms/alarmCleared";
/// 알람 해제 취소
pub const UEI_ALARM_UNCLEARED: &str = "uei.opennms.org/internal/alarms/alarmUncleared";
/// 축약 이벤트로 알람 갱신
pub const UEI_ALARM_UPDATED_WITH_REDUCED_EVENT: &str =
    "uei.opennms.org/internal/alarms/alarmUpdatedWithReducedEvent";

/// 알람 수명주기 이벤트 타입 전체
pub const ALARM_LIFECYCLE_UEIS: [&str; 5] = [
    UEI_ALARM_CREATED,
    UEI_ALARM_ESCALATED,
    UEI_ALARM_CLEARED,
    UEI_ALARM_UNCLEARED,
    UEI_ALARM_UPDATED_WITH_REDUCED_EVENT,
];

/// 노드 서비스 유실
pub const UEI_NODE_LOST_SERVICE: &str = "uei.opennms.org/nodes/nodeLostService";
/// 노드 다운
pub const UEI_NODE_DOWN: &str = "uei.opennms.org/nodes/nodeDown";

/// 비즈니스 서비스 운영 상태 변경
pub const UEI_BSM_STATUS_CHANGED: &str = "uei.opennms.org/bsm/serviceOperationalStatusChanged";

/// 데몬 설정 리로드 요청
pub const UEI_RELOAD_DAEMON_CONFIG: &str = "uei.opennms.org/internal/reloadDaemonConfig";
/// 데몬 설정 리로드 성공
pub const UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL: &str =
    "uei.opennms.org/internal/reloadDaemonConfigSuccessful";
/// 데몬 설정 리로드 실패
pub const UEI_RELOAD_DAEMON_CONFIG_FAILED: &str =
    "uei.opennms.org/internal/reloadDaemonConfigFailed";

// --- 파라미터 이름 상수 ---

/// 알람 id
pub const PARM_ALARM_ID: &str = "alarmId";
/// 데몬 이름
pub const PARM_DAEMON_NAME: &str = "daemonName";
/// 실패 사유
pub const PARM_REASON: &str = "reason";
/// 비즈니스 서비스 id
pub const PARM_BUSINESS_SERVICE_ID: &str = "businessServiceId";
/// 비즈니스 서비스 이름
pub const PARM_BUSINESS_SERVICE_NAME: &str = "businessServiceName";
/// 이전 심각도 id
pub const PARM_PREV_SEVERITY_ID: &str = "prevSeverityId";
/// 이전 심각도 레이블
pub const PARM_PREV_SEVERITY_LABEL: &str = "prevSeverityLabel";
/// 새 심각도 id
pub const PARM_NEW_SEVERITY_ID: &str = "newSeverityId";
/// 새 심각도 레이블
pub const PARM_NEW_SEVERITY_LABEL: &str = "newSeverityLabel";

/// 이벤트 메타데이터: 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "bsmd")
    pub source_module: String,
    /// 분산 추적 ID: 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 이벤트 버스 메시지
///
/// 수신 측은 페이로드에 담긴 상태를 신뢰하지 않고 식별자만 꺼내 쓰는 것을 전제로 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 이벤트 타입 (UEI)
    pub uei: String,
    /// 파라미터
    pub params: BTreeMap<String, String>,
}

impl BusEvent {
    /// 새로운 trace를 시작하는 버스 이벤트를 생성합니다.
    pub fn new(uei: impl Into<String>, source_module: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(source_module),
            uei: uei.into(),
            params: BTreeMap::new(),
        }
    }

    /// 파라미터를 추가한 이벤트를 반환합니다.
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// 파라미터 값을 조회합니다.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl Event for BusEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        &self.uei
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BusEvent[{}] uei={} params={}",
            &self.id[..8.min(self.id.len())],
            self.uei,
            self.params.len(),
        )
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}", duration.as_secs()),
        Err(_) => "unknown".to_owned(),
    }
}
