//! 설정 관리: beacon.toml 파싱 및 런타임 설정
//!
//! [`BeaconConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BEACON_BSM_POLL_INTERVAL_SECS=60` 형식)
//! 3. 설정 파일 (`beacon.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), beacon_core::error::BeaconError> {
//! use beacon_core::config::BeaconConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BeaconConfig::load("beacon.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BeaconConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BeaconError, ConfigError};
use crate::event::{UEI_NODE_DOWN, UEI_NODE_LOST_SERVICE};
use crate::types::EventDefinition;

/// 재조정 주기 기본값 (초)
pub const DEFAULT_POLL_INTERVAL_SECS: i64 = 30;

/// 노드 서비스 유실 이벤트의 리덕션 키 템플릿
pub const NODE_LOST_SERVICE_REDUCTION_KEY: &str = "%uei%:%dpname%:%nodeid%:%interface%:%service%";

/// 노드 다운 이벤트의 리덕션 키 템플릿
pub const NODE_DOWN_REDUCTION_KEY: &str = "%uei%:%dpname%:%nodeid%";

/// Beacon 통합 설정
///
/// `beacon.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 비즈니스 서비스 모니터 설정
    #[serde(default)]
    pub bsm: BsmConfig,
    /// 하트비트 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BeaconConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BeaconError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BeaconError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BeaconError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BeaconError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BeaconError> {
        toml::from_str(toml_str).map_err(|e| {
            BeaconError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BEACON_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BEACON_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BEACON_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "BEACON_GENERAL_PID_FILE");

        // BSM
        override_bool(&mut self.bsm.enabled, "BEACON_BSM_ENABLED");
        override_poll_interval(
            &mut self.bsm.poll_interval_secs,
            "BEACON_BSM_POLL_INTERVAL_SECS",
        );
        override_bool(
            &mut self.bsm.verify_reduction_keys,
            "BEACON_BSM_VERIFY_REDUCTION_KEYS",
        );
        override_string(&mut self.bsm.services_dir, "BEACON_BSM_SERVICES_DIR");
        override_string(&mut self.bsm.alarms_file, "BEACON_BSM_ALARMS_FILE");
        override_usize(
            &mut self.bsm.event_channel_capacity,
            "BEACON_BSM_EVENT_CHANNEL_CAPACITY",
        );

        // Sink
        override_bool(&mut self.sink.enabled, "BEACON_SINK_ENABLED");
        override_usize(&mut self.sink.generators, "BEACON_SINK_GENERATORS");
        override_u64(
            &mut self.sink.rate_per_generator,
            "BEACON_SINK_RATE_PER_GENERATOR",
        );
        override_usize(
            &mut self.sink.consumer_threads,
            "BEACON_SINK_CONSUMER_THREADS",
        );
        override_usize(
            &mut self.sink.channel_capacity,
            "BEACON_SINK_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "BEACON_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "BEACON_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "BEACON_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "BEACON_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// `bsm.poll_interval_secs`는 검증하지 않습니다. 잘못된 값은 사용 시점에
    /// 기본값으로 대체됩니다.
    pub fn validate(&self) -> Result<(), BeaconError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.bsm.enabled {
            if self.bsm.services_dir.is_empty() {
                return Err(invalid(
                    "bsm.services_dir",
                    "services_dir must not be empty when bsm is enabled".to_owned(),
                ));
            }
            if self.bsm.alarms_file.is_empty() {
                return Err(invalid(
                    "bsm.alarms_file",
                    "alarms_file must not be empty when bsm is enabled".to_owned(),
                ));
            }
            if self.bsm.event_channel_capacity == 0 {
                return Err(invalid(
                    "bsm.event_channel_capacity",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.sink.enabled {
            if self.sink.consumer_threads == 0 {
                return Err(invalid(
                    "sink.consumer_threads",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.sink.rate_per_generator == 0 {
                return Err(invalid(
                    "sink.rate_per_generator",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.sink.channel_capacity == 0 {
                return Err(invalid(
                    "sink.channel_capacity",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> BeaconError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 비즈니스 서비스 모니터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BsmConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 재조정 주기 (초). 0 이하이면 기본값(30)으로 대체됩니다.
    /// 정수로 해석할 수 없는 값은 경고 후 기본값이 됩니다.
    #[serde(deserialize_with = "deserialize_poll_interval")]
    pub poll_interval_secs: i64,
    /// 리덕션 키 계약 검사 여부
    pub verify_reduction_keys: bool,
    /// 비즈니스 서비스 정의(YAML) 디렉토리
    pub services_dir: String,
    /// 알람 디렉토리(JSON) 파일 경로
    pub alarms_file: String,
    /// 이벤트 정의 레지스트리 항목
    pub event_definitions: Vec<EventDefinition>,
    /// 수명주기/리로드 이벤트 구독 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for BsmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            verify_reduction_keys: true,
            services_dir: "/etc/beacon/services".to_owned(),
            alarms_file: "/var/lib/beacon/alarms.json".to_owned(),
            event_definitions: vec![
                EventDefinition {
                    uei: UEI_NODE_LOST_SERVICE.to_owned(),
                    reduction_key: Some(NODE_LOST_SERVICE_REDUCTION_KEY.to_owned()),
                },
                EventDefinition {
                    uei: UEI_NODE_DOWN.to_owned(),
                    reduction_key: Some(NODE_DOWN_REDUCTION_KEY.to_owned()),
                },
            ],
            event_channel_capacity: 1024,
        }
    }
}

/// 하트비트 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 하트비트 생성기 수
    pub generators: usize,
    /// 생성기당 초당 전송 수
    pub rate_per_generator: u64,
    /// 소비자 워커 수
    pub consumer_threads: usize,
    /// 메시지 채널 용량
    pub channel_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            generators: 1,
            rate_per_generator: 1,
            consumer_threads: 2,
            channel_capacity: 1024,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

/// 재조정 주기를 관대하게 읽습니다. 정수 문자열은 허용하고, 그 외의 값은 기본값으로 바꿉니다.
fn deserialize_poll_interval<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = toml::Value::deserialize(deserializer)?;
    let parsed = match &value {
        toml::Value::Integer(secs) => Some(*secs),
        toml::Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    Ok(parsed.unwrap_or_else(|| {
        warn!(
            value = %value,
            default = DEFAULT_POLL_INTERVAL_SECS,
            "bsm.poll_interval_secs could not be interpreted as an integer, falling back to default"
        );
        DEFAULT_POLL_INTERVAL_SECS
    }))
}

/// 재조정 주기 오버라이드: 해석할 수 없는 값은 무시하지 않고 기본값으로 대체합니다.
fn override_poll_interval(target: &mut i64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<i64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => {
                warn!(
                    env_key,
                    value = val.as_str(),
                    default = DEFAULT_POLL_INTERVAL_SECS,
                    "poll interval could not be interpreted as an integer, falling back to default"
                );
                *target = DEFAULT_POLL_INTERVAL_SECS;
            }
        }
    }
}
