//! 싱크 모듈: 메시지 타입과 소비자 병렬도를 묶는 단위

/// 싱크 모듈 trait
///
/// 모듈 id는 소비자 관리자 안에서 유일해야 합니다.
pub trait SinkModule: Send + Sync + 'static {
    /// 이 모듈이 실어 나르는 메시지 타입
    type Message: Send + 'static;

    /// 모듈 id
    fn id(&self) -> &str;

    /// 소비자 워커 수
    fn num_consumer_threads(&self) -> usize {
        1
    }
}
