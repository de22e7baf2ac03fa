//! 싱크 에러 타입
//!
//! `From<SinkError> for BeaconError` 변환이 구현되어 있어
//! 데몬 레이어에서 `?` 연산자로 전파할 수 있습니다.

use beacon_core::error::BeaconError;

/// 메시지 싱크 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 같은 모듈에 소비자가 이미 등록됨
    #[error("consumer already registered for module '{0}'")]
    AlreadyRegistered(String),

    /// 모듈에 등록된 소비자가 없음
    #[error("no consumer registered for module '{0}'")]
    NotRegistered(String),

    /// 등록된 채널의 메시지 타입이 요청과 다름
    #[error("message type mismatch for module '{0}'")]
    MessageTypeMismatch(String),

    /// 소비자 채널이 닫힘
    #[error("channel closed for module '{0}'")]
    ChannelClosed(String),

    /// 생성기가 이미 실행 중
    #[error("heartbeat generator {0} already running")]
    GeneratorRunning(usize),

    /// 생성기가 실행 중이 아님
    #[error("heartbeat generator {0} not running")]
    GeneratorNotRunning(usize),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<SinkError> for BeaconError {
    fn from(err: SinkError) -> Self {
        BeaconError::Sink(err.to_string())
    }
}
