//! 비즈니스 서비스 모니터 설정
//!
//! [`BsmDaemonConfig`]는 core의 [`BsmConfig`](beacon_core::config::BsmConfig)에서
//! 데몬이 직접 사용하는 항목만 추려 낸 설정입니다.
//! 저장소 경로 같은 협력자 설정은 데몬 조립 단계에서 사용합니다.
//!
//! # 사용 예시
//! ```ignore
//! use beacon_core::config::BeaconConfig;
//! use beacon_bsm::config::BsmDaemonConfig;
//!
//! let core_config = BeaconConfig::default();
//! let config = BsmDaemonConfig::from_core(&core_config.bsm);
//! ```

use std::time::Duration;

use beacon_core::config::DEFAULT_POLL_INTERVAL_SECS;
use serde::{Deserialize, Serialize};

use crate::error::BsmError;

/// 비즈니스 서비스 모니터 데몬 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BsmDaemonConfig {
    /// 재조정 주기 (초, 원본 값 그대로 보관)
    pub poll_interval_secs: i64,
    /// 시작/리로드 시 리덕션 키 계약 검사 여부
    pub verify_reduction_keys: bool,
    /// 이벤트 구독 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for BsmDaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            verify_reduction_keys: true,
            event_channel_capacity: 1024,
        }
    }
}

impl BsmDaemonConfig {
    /// core의 `BsmConfig`에서 데몬 설정을 생성합니다.
    pub fn from_core(core: &beacon_core::config::BsmConfig) -> Self {
        Self {
            poll_interval_secs: core.poll_interval_secs,
            verify_reduction_keys: core.verify_reduction_keys,
            event_channel_capacity: core.event_channel_capacity,
        }
    }

    /// 실제로 사용할 재조정 주기를 반환합니다.
    pub fn poll_interval(&self) -> Duration {
        resolve_poll_interval(self.poll_interval_secs)
    }

    /// 설정 유효성을 검증합니다.
    ///
    /// 재조정 주기는 검증하지 않습니다. 잘못된 값은 기본값으로 대체됩니다.
    pub fn validate(&self) -> Result<(), BsmError> {
        if self.event_channel_capacity == 0 {
            return Err(BsmError::Config {
                field: "event_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// 재조정 주기 원본 값을 `Duration`으로 변환합니다.
///
/// 0 이하의 값은 경고를 남기고 기본값(30초)으로 대체합니다.
pub fn resolve_poll_interval(raw_secs: i64) -> Duration {
    match u64::try_from(raw_secs) {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            tracing::warn!(
                configured = raw_secs,
                default = DEFAULT_POLL_INTERVAL_SECS,
                "invalid poll interval, using default"
            );
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS.unsigned_abs())
        }
    }
}
