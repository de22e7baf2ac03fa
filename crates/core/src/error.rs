//! 에러 타입: 도메인별 에러 정의

/// Beacon 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 외부 저장소(알람 디렉토리, 서비스 정의 저장소) 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 이벤트 버스 에러
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// 비즈니스 서비스 모니터 에러
    #[error("bsm error: {0}")]
    Bsm(String),

    /// 메시지 싱크 에러
    #[error("sink error: {0}")]
    Sink(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 외부 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 저장소 연결/열기 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 조회 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 저장된 레코드 형식 오류
    #[error("corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

/// 이벤트 버스 에러
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// 구독 채널이 닫힘
    #[error("subscriber channel closed: {0}")]
    Closed(String),

    /// 구독 채널이 가득 참
    #[error("subscriber channel full: {0}")]
    Full(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_beacon_error() {
        let err: BeaconError = ConfigError::InvalidValue {
            field: "bsm.poll_interval_secs".to_owned(),
            reason: "must be positive".to_owned(),
        }
        .into();
        assert!(matches!(err, BeaconError::Config(_)));
        assert!(err.to_string().contains("bsm.poll_interval_secs"));
    }

    #[test]
    fn store_error_display_includes_id() {
        let err = StoreError::Corrupt {
            id: "42".to_owned(),
            reason: "missing reduction key".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt record '42': missing reduction key"
        );
    }

    #[test]
    fn pipeline_error_variants_display() {
        assert_eq!(
            PipelineError::AlreadyRunning.to_string(),
            "pipeline already running"
        );
        assert_eq!(PipelineError::NotRunning.to_string(), "pipeline not running");
    }
}
