//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `beacon_`
//! - 모듈명: `bus_`, `bsm_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use beacon_core::metrics as m;
//!
//! metrics::counter!(m::BSM_ALARMS_APPLIED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (cleared ~ critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 이벤트 타입 레이블 키
pub const LABEL_UEI: &str = "uei";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Event Bus 메트릭 ──────────────────────────────────────────────

/// Bus: 발행된 이벤트 수 (counter)
pub const BUS_EVENTS_PUBLISHED_TOTAL: &str = "beacon_bus_events_published_total";

/// Bus: 구독 채널 포화로 버린 이벤트 수 (counter)
pub const BUS_EVENTS_DROPPED_TOTAL: &str = "beacon_bus_events_dropped_total";

// ─── BSM 메트릭 ────────────────────────────────────────────────────

/// BSM: 상태가 바뀐 알람 적용 수 (counter)
pub const BSM_ALARMS_APPLIED_TOTAL: &str = "beacon_bsm_alarms_applied_total";

/// BSM: 동일 상태라 무시된 알람 적용 수 (counter)
pub const BSM_ALARMS_DUPLICATE_TOTAL: &str = "beacon_bsm_alarms_duplicate_total";

/// BSM: 버려진 수명주기 이벤트 수 (counter, label: uei)
pub const BSM_LIFECYCLE_EVENTS_REJECTED_TOTAL: &str =
    "beacon_bsm_lifecycle_events_rejected_total";

/// BSM: 완료된 재조정 패스 수 (counter)
pub const BSM_RECONCILIATIONS_TOTAL: &str = "beacon_bsm_reconciliations_total";

/// BSM: 실패한 재조정 패스 수 (counter)
pub const BSM_RECONCILIATION_FAILURES_TOTAL: &str = "beacon_bsm_reconciliation_failures_total";

/// BSM: 재조정 패스 소요 시간 (histogram, 초)
pub const BSM_RECONCILIATION_DURATION_SECONDS: &str =
    "beacon_bsm_reconciliation_duration_seconds";

/// BSM: 리로드 수 (counter, label: result)
pub const BSM_RELOADS_TOTAL: &str = "beacon_bsm_reloads_total";

/// BSM: 상태 변경 알림 수 (counter)
pub const BSM_STATUS_CHANGES_TOTAL: &str = "beacon_bsm_status_changes_total";

/// BSM: 로드된 비즈니스 서비스 수 (gauge)
pub const BSM_SERVICES_LOADED: &str = "beacon_bsm_services_loaded";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 전송된 하트비트 수 (counter)
pub const SINK_HEARTBEATS_SENT_TOTAL: &str = "beacon_sink_heartbeats_sent_total";

/// Sink: 수신된 하트비트 수 (counter)
pub const SINK_HEARTBEATS_RECEIVED_TOTAL: &str = "beacon_sink_heartbeats_received_total";

/// Sink: 하트비트 전송 지연 시간 (histogram, 초)
pub const SINK_SEND_DURATION_SECONDS: &str = "beacon_sink_send_duration_seconds";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "beacon_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "beacon_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 재조정 패스 소요 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 30s 범위 (전체 스캔은 저장소 I/O 포함)
pub const RECONCILIATION_DURATION_BUCKETS: [f64; 9] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

/// 전송 지연 시간 히스토그램 버킷 (초)
pub const SEND_DURATION_BUCKETS: [f64; 8] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `beacon-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Event Bus
    describe_counter!(
        BUS_EVENTS_PUBLISHED_TOTAL,
        "Total number of events published on the in-process bus"
    );
    describe_counter!(
        BUS_EVENTS_DROPPED_TOTAL,
        "Total number of deliveries dropped because a subscriber channel was full"
    );

    // BSM
    describe_counter!(
        BSM_ALARMS_APPLIED_TOTAL,
        "Total number of alarm snapshots that changed the alarm table"
    );
    describe_counter!(
        BSM_ALARMS_DUPLICATE_TOTAL,
        "Total number of alarm applications ignored as identical to the stored snapshot"
    );
    describe_counter!(
        BSM_LIFECYCLE_EVENTS_REJECTED_TOTAL,
        "Total number of malformed or unresolvable alarm lifecycle events"
    );
    describe_counter!(
        BSM_RECONCILIATIONS_TOTAL,
        "Total number of completed reconciliation passes"
    );
    describe_counter!(
        BSM_RECONCILIATION_FAILURES_TOTAL,
        "Total number of failed reconciliation passes"
    );
    describe_histogram!(
        BSM_RECONCILIATION_DURATION_SECONDS,
        "Duration of a reconciliation pass in seconds"
    );
    describe_counter!(
        BSM_RELOADS_TOTAL,
        "Total number of service graph reloads by result"
    );
    describe_counter!(
        BSM_STATUS_CHANGES_TOTAL,
        "Total number of business service status transitions"
    );
    describe_gauge!(
        BSM_SERVICES_LOADED,
        "Number of business services in the live graph"
    );

    // Sink
    describe_counter!(
        SINK_HEARTBEATS_SENT_TOTAL,
        "Total number of heartbeat messages sent"
    );
    describe_counter!(
        SINK_HEARTBEATS_RECEIVED_TOTAL,
        "Total number of heartbeat messages received"
    );
    describe_histogram!(
        SINK_SEND_DURATION_SECONDS,
        "Heartbeat send latency in seconds"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Beacon daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
