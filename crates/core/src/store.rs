//! 외부 협력자 trait: 알람 디렉토리, 서비스 정의 저장소, 이벤트 정의 레지스트리
//!
//! 각 비동기 호출은 하나의 읽기 트랜잭션 범위에 해당합니다.
//! 호출자는 집계기 잠금 밖에서 이 메서드들을 호출해야 합니다.

use std::future::Future;
use std::sync::RwLock;

use crate::error::BeaconError;
use crate::types::{AlarmId, AlarmRow, EventDefinition, ServiceDefinition};

/// 알람 디렉토리
pub trait AlarmDirectory: Send + Sync + 'static {
    /// 전체 알람을 디렉토리 순서대로 조회합니다.
    fn find_all(&self) -> impl Future<Output = Result<Vec<AlarmRow>, BeaconError>> + Send;

    /// id로 알람을 조회합니다. 없으면 `Ok(None)`입니다.
    fn get(&self, id: AlarmId) -> impl Future<Output = Result<Option<AlarmRow>, BeaconError>> + Send;
}

/// 비즈니스 서비스 정의 저장소
pub trait BusinessServiceStore: Send + Sync + 'static {
    /// 현재 저장된 정의 전체를 조회합니다.
    fn find_all(&self)
    -> impl Future<Output = Result<Vec<ServiceDefinition>, BeaconError>> + Send;
}

/// 이벤트 정의 레지스트리
pub trait EventConfRegistry: Send + Sync + 'static {
    /// 이벤트 타입에 해당하는 정의를 모두 반환합니다.
    fn get_events_for_uei(&self, uei: &str) -> Vec<EventDefinition>;
}

// --- 메모리 구현 ---

/// 메모리 알람 디렉토리
///
/// 테스트와 임베딩 용도로 사용합니다. 삽입 순서가 디렉토리 순서입니다.
#[derive(Default)]
pub struct InMemoryAlarmDirectory {
    rows: RwLock<Vec<AlarmRow>>,
}

impl InMemoryAlarmDirectory {
    /// 주어진 행으로 디렉토리를 생성합니다.
    pub fn new(rows: Vec<AlarmRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// 같은 id가 있으면 교체하고, 없으면 끝에 추가합니다.
    pub fn upsert(&self, row: AlarmRow) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// id로 행을 제거합니다.
    pub fn remove(&self, id: AlarmId) -> Option<AlarmRow> {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let pos = rows.iter().position(|r| r.id == id)?;
        Some(rows.remove(pos))
    }

    /// 모든 행을 제거합니다.
    pub fn clear(&self) {
        self.rows.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl AlarmDirectory for InMemoryAlarmDirectory {
    async fn find_all(&self) -> Result<Vec<AlarmRow>, BeaconError> {
        Ok(self.rows.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn get(&self, id: AlarmId) -> Result<Option<AlarmRow>, BeaconError> {
        Ok(self
            .rows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}

/// 메모리 서비스 정의 저장소
#[derive(Default)]
pub struct InMemoryServiceStore {
    definitions: RwLock<Vec<ServiceDefinition>>,
}

impl InMemoryServiceStore {
    /// 주어진 정의로 저장소를 생성합니다.
    pub fn new(definitions: Vec<ServiceDefinition>) -> Self {
        Self {
            definitions: RwLock::new(definitions),
        }
    }

    /// 정의 전체를 교체합니다.
    pub fn replace(&self, definitions: Vec<ServiceDefinition>) {
        *self.definitions.write().unwrap_or_else(|e| e.into_inner()) = definitions;
    }
}

impl BusinessServiceStore for InMemoryServiceStore {
    async fn find_all(&self) -> Result<Vec<ServiceDefinition>, BeaconError> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
