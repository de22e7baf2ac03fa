//! beacon-core: Beacon 공통 기반 크레이트
//!
//! 모든 Beacon 크레이트가 공유하는 심각도/알람/비즈니스 서비스 타입,
//! 이벤트 버스, 외부 협력자 trait, 모듈 생명주기 trait, 통합 설정,
//! 메트릭 이름, 에러 타입을 정의합니다.

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{BeaconError, BusError, ConfigError, PipelineError, StoreError};

// 설정
pub use config::BeaconConfig;

// 이벤트
pub use bus::{EventBus, InMemoryEventBus};
pub use event::{BusEvent, Event, EventMetadata};

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};

// 협력자 trait
pub use store::{AlarmDirectory, BusinessServiceStore, EventConfRegistry};

// 도메인 타입
pub use types::{
    AlarmId, AlarmRow, ChildDefinition, EventDefinition, MapFunction, ReduceStrategy,
    ServiceDefinition, ServiceId, Severity, Threshold,
};
