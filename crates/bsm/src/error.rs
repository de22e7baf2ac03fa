//! 비즈니스 서비스 모니터 에러 타입
//!
//! [`BsmError`]는 bsm 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<BsmError> for BeaconError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use beacon_core::error::BeaconError;
use beacon_core::types::{AlarmId, ServiceId};

/// 서비스 그래프 검증 에러
///
/// 그래프 로드가 이 에러로 실패하면 기존 그래프는 그대로 유지됩니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// 같은 id가 두 번 정의됨
    #[error("duplicate business service id {id}")]
    DuplicateService {
        /// 중복된 id
        id: ServiceId,
    },

    /// 선언되지 않은 서비스를 자식으로 참조
    #[error("business service {service} references unknown child {target}")]
    UnknownChild {
        /// 참조하는 서비스
        service: ServiceId,
        /// 존재하지 않는 대상
        target: ServiceId,
    },

    /// 서비스가 자기 자신을 (간접적으로) 포함
    #[error("cycle detected among business services {services:?}")]
    Cycle {
        /// 사이클을 이루는 서비스 (오름차순)
        services: Vec<ServiceId>,
    },

    /// 축약 전략 누락
    #[error("business service {service} has no reduce strategy")]
    MissingReduceStrategy {
        /// 문제가 된 서비스
        service: ServiceId,
    },

    /// THRESHOLD 구성 오류
    #[error("business service {service} has invalid thresholds: {reason}")]
    InvalidThreshold {
        /// 문제가 된 서비스
        service: ServiceId,
        /// 사유
        reason: String,
    },
}

/// 비즈니스 서비스 모니터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum BsmError {
    /// 서비스 그래프 검증 실패
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// 필수 협력자 누락
    #[error("required collaborator missing: {0}")]
    MissingCollaborator(&'static str),

    /// 리덕션 키 계약 위반
    #[error("reduction key contract violated for '{uei}': {reason}")]
    ReductionKeyContract {
        /// 이벤트 타입
        uei: String,
        /// 사유
        reason: String,
    },

    /// 잘못된 수명주기 이벤트
    #[error("malformed event '{uei}': {reason}")]
    MalformedEvent {
        /// 이벤트 타입
        uei: String,
        /// 사유
        reason: String,
    },

    /// 알람 id를 찾을 수 없음
    #[error("alarm {0} not found")]
    AlarmNotFound(AlarmId),

    /// 외부 저장소 호출 실패
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<BeaconError> for BsmError {
    fn from(err: BeaconError) -> Self {
        BsmError::Collaborator(err.to_string())
    }
}

impl From<BsmError> for BeaconError {
    fn from(err: BsmError) -> Self {
        BeaconError::Bsm(err.to_string())
    }
}
