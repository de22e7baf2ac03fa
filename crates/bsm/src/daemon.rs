//! 수집 파이프라인: 이벤트 경로, 재조정 경로, 리로드를 하나의 상태 머신에 연결합니다.
//!
//! [`BsmDaemon`]은 core의 [`Pipeline`] trait을 구현하여
//! `beacon-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! EventBus ──▶ dispatch task ──┬─ alarm lifecycle ─▶ AlarmDirectory::get ─▶ apply_alarm
//!                              └─ reload request  ─▶ contract ─▶ ServiceStore::find_all ─▶ replace_graph
//!
//! interval ──▶ reconcile task ──▶ AlarmDirectory::find_all ─▶ apply_alarm × N
//!
//! BusinessServiceStateMachine ──▶ BusNotifier ──▶ EventBus (status changed)
//! ```
//!
//! 저장소 호출은 모두 상태 머신 잠금 밖에서 이루어집니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use beacon_core::bus::EventBus;
use beacon_core::error::{BeaconError, PipelineError};
use beacon_core::event::{
    ALARM_LIFECYCLE_UEIS, BusEvent, DAEMON_NAME_BSM, MODULE_BSM, PARM_ALARM_ID, PARM_DAEMON_NAME,
    PARM_REASON, UEI_RELOAD_DAEMON_CONFIG, UEI_RELOAD_DAEMON_CONFIG_FAILED, UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL,
};
use beacon_core::metrics as m;
use beacon_core::pipeline::{HealthStatus, Pipeline};
use beacon_core::store::{AlarmDirectory, BusinessServiceStore, EventConfRegistry};
use beacon_core::types::{AlarmId, ServiceId};

use crate::aggregator::{BusinessServiceStateMachine, HandlerId};
use crate::config::BsmDaemonConfig;
use crate::contract::verify_reduction_keys;
use crate::error::BsmError;
use crate::graph::ServiceGraph;
use crate::notifier::BusNotifier;

/// 리로드 실패 사유 최대 길이 (문자 단위)
pub const MAX_REASON_LEN: usize = 128;

/// 데몬 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 리로드 요청 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// 다른 데몬 대상이거나 daemonName이 없음
    Ignored,
    /// 새 그래프로 교체됨
    Succeeded {
        /// 심각도가 바뀐 서비스
        changed: BTreeSet<ServiceId>,
    },
    /// 실패, 이전 그래프 유지
    Failed {
        /// 잘린 사유
        reason: String,
    },
}

/// 재조정 패스 한 번의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 스캔한 알람 행 수
    pub rows: usize,
    /// 심각도가 바뀐 서비스
    pub changed: BTreeSet<ServiceId>,
}

/// 이벤트 타입별 처리 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Lifecycle,
    Reload,
}

/// 처리 카운터 및 최근 실패 사유
#[derive(Default)]
struct IngestionStats {
    lifecycle_processed: AtomicU64,
    lifecycle_rejected: AtomicU64,
    reconciliations: AtomicU64,
    reconciliation_failures: AtomicU64,
    reloads_succeeded: AtomicU64,
    reloads_failed: AtomicU64,
    last_reload_error: Mutex<Option<String>>,
    last_reconciliation_error: Mutex<Option<String>>,
}

impl IngestionStats {
    fn set_reload_error(&self, reason: Option<String>) {
        *self
            .last_reload_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason;
    }

    fn set_reconciliation_error(&self, reason: Option<String>) {
        *self
            .last_reconciliation_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason;
    }

    fn degraded_reason(&self) -> Option<String> {
        let reload = self
            .last_reload_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(reason) = reload {
            return Some(format!("last reload failed: {reason}"));
        }

        self.last_reconciliation_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|reason| format!("last reconciliation pass failed: {reason}"))
    }
}

/// 시작 시점에 협력자가 모두 확인된 처리 컨텍스트
struct Ingestion<A, S, R> {
    config: BsmDaemonConfig,
    machine: Arc<BusinessServiceStateMachine>,
    alarms: Arc<A>,
    services: Arc<S>,
    registry: Arc<R>,
    bus: Arc<dyn EventBus>,
    stats: Arc<IngestionStats>,
}

impl<A, S, R> Ingestion<A, S, R>
where
    A: AlarmDirectory,
    S: BusinessServiceStore,
    R: EventConfRegistry,
{
    async fn handle_lifecycle_event(&self, event: &BusEvent) -> Result<BTreeSet<ServiceId>, BsmError> {
        let result = self.apply_lifecycle_event(event).await;

        match &result {
            Ok(_) => {
                self.stats.lifecycle_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.lifecycle_rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    m::BSM_LIFECYCLE_EVENTS_REJECTED_TOTAL,
                    m::LABEL_UEI => event.uei.clone()
                )
                .increment(1);
                match e {
                    BsmError::AlarmNotFound(_) => {
                        error!(uei = %event.uei, error = %e, "alarm lifecycle event dropped")
                    }
                    _ => warn!(uei = %event.uei, error = %e, "alarm lifecycle event dropped"),
                }
            }
        }
        result
    }

    /// 디스패치 루프용 진입점. 실패는 통계와 로그로만 남습니다.
    async fn dispatch_lifecycle_event(&self, event: &BusEvent) {
        if let Ok(changed) = self.handle_lifecycle_event(event).await {
            debug!(uei = %event.uei, changed = changed.len(), "alarm lifecycle event applied");
        }
    }

    async fn apply_lifecycle_event(&self, event: &BusEvent) -> Result<BTreeSet<ServiceId>, BsmError> {
        let raw = event
            .param(PARM_ALARM_ID)
            .ok_or_else(|| BsmError::MalformedEvent {
                uei: event.uei.clone(),
                reason: format!("missing {PARM_ALARM_ID} parameter"),
            })?;
        let alarm_id = raw
            .trim()
            .parse::<u64>()
            .map(AlarmId)
            .map_err(|_| BsmError::MalformedEvent {
                uei: event.uei.clone(),
                reason: format!("non-numeric {PARM_ALARM_ID} '{raw}'"),
            })?;

        // 페이로드를 신뢰하지 않고 디렉토리에서 최신 행을 다시 읽습니다.
        let row = self
            .alarms
            .get(alarm_id)
            .await?
            .ok_or(BsmError::AlarmNotFound(alarm_id))?;

        Ok(self
            .machine
            .apply_alarm(&row.reduction_key, row.severity, row.id))
    }

    async fn handle_reload_event(&self, event: &BusEvent) -> ReloadOutcome {
        let Some(daemon_name) = event.param(PARM_DAEMON_NAME) else {
            warn!(uei = %event.uei, "reload request without {PARM_DAEMON_NAME}, ignoring");
            return ReloadOutcome::Ignored;
        };
        if !daemon_name.eq_ignore_ascii_case(DAEMON_NAME_BSM) {
            debug!(daemon = daemon_name, "reload request for another daemon, ignoring");
            return ReloadOutcome::Ignored;
        }

        info!("reloading business service graph");
        match self.reload().await {
            Ok(changed) => {
                self.stats.reloads_succeeded.fetch_add(1, Ordering::Relaxed);
                self.stats.set_reload_error(None);
                metrics::counter!(m::BSM_RELOADS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(changed = changed.len(), "business service graph reloaded");

                self.bus.publish(
                    BusEvent::new(UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL, MODULE_BSM)
                        .with_param(PARM_DAEMON_NAME, DAEMON_NAME_BSM),
                );
                ReloadOutcome::Succeeded { changed }
            }
            Err(e) => {
                let reason = truncate_reason(&e.to_string());
                self.stats.reloads_failed.fetch_add(1, Ordering::Relaxed);
                self.stats.set_reload_error(Some(reason.clone()));
                metrics::counter!(m::BSM_RELOADS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                error!(error = %e, "business service graph reload failed, keeping previous graph");

                self.bus.publish(
                    BusEvent::new(UEI_RELOAD_DAEMON_CONFIG_FAILED, MODULE_BSM)
                        .with_param(PARM_DAEMON_NAME, DAEMON_NAME_BSM)
                        .with_param(PARM_REASON, &reason),
                );
                ReloadOutcome::Failed { reason }
            }
        }
    }

    async fn reload(&self) -> Result<BTreeSet<ServiceId>, BsmError> {
        if self.config.verify_reduction_keys {
            verify_reduction_keys(self.registry.as_ref())?;
        }

        let definitions = self.services.find_all().await?;
        let graph = ServiceGraph::load(definitions)?;
        Ok(self.machine.replace_graph(graph))
    }

    async fn reconcile_once(&self) -> Result<ReconcileReport, BsmError> {
        let started = Instant::now();

        let rows = match self.alarms.find_all().await {
            Ok(rows) => rows,
            Err(e) => {
                self.stats
                    .reconciliation_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.stats.set_reconciliation_error(Some(e.to_string()));
                metrics::counter!(m::BSM_RECONCILIATION_FAILURES_TOTAL).increment(1);
                return Err(e.into());
            }
        };

        // 스캔에 없는 키는 해제로 간주하지 않습니다.
        let mut changed = BTreeSet::new();
        for row in &rows {
            changed.extend(
                self.machine
                    .apply_alarm(&row.reduction_key, row.severity, row.id),
            );
        }

        self.stats.reconciliations.fetch_add(1, Ordering::Relaxed);
        self.stats.set_reconciliation_error(None);
        metrics::counter!(m::BSM_RECONCILIATIONS_TOTAL).increment(1);
        metrics::histogram!(m::BSM_RECONCILIATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            rows = rows.len(),
            changed = changed.len(),
            "reconciliation pass completed"
        );

        Ok(ReconcileReport {
            rows: rows.len(),
            changed,
        })
    }
}

/// 비즈니스 서비스 모니터 데몬
///
/// core의 `Pipeline` trait을 구현하여 `beacon-daemon`에서
/// 다른 모듈과 동일한 생명주기(start/stop/health_check)로 관리됩니다.
///
/// # 사용 예시
/// ```ignore
/// use beacon_bsm::BsmDaemonBuilder;
///
/// let mut daemon = BsmDaemonBuilder::new()
///     .config(config)
///     .alarm_directory(alarms)
///     .service_store(services)
///     .event_registry(registry)
///     .event_bus(bus)
///     .build()?;
///
/// daemon.start().await?;
/// ```
pub struct BsmDaemon<A, S, R> {
    config: BsmDaemonConfig,
    state: DaemonState,
    machine: Arc<BusinessServiceStateMachine>,
    alarms: Option<Arc<A>>,
    services: Option<Arc<S>>,
    registry: Option<Arc<R>>,
    bus: Option<Arc<dyn EventBus>>,
    stats: Arc<IngestionStats>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    notifier: Option<HandlerId>,
}

impl<A, S, R> BsmDaemon<A, S, R>
where
    A: AlarmDirectory,
    S: BusinessServiceStore,
    R: EventConfRegistry,
{
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            DaemonState::Initialized => "initialized",
            DaemonState::Running => "running",
            DaemonState::Stopped => "stopped",
        }
    }

    /// 데몬 설정
    pub fn config(&self) -> &BsmDaemonConfig {
        &self.config
    }

    /// 상태 머신을 반환합니다. 외부 관찰자 등록과 조회에 사용합니다.
    pub fn machine(&self) -> Arc<BusinessServiceStateMachine> {
        Arc::clone(&self.machine)
    }

    /// 적용된 수명주기 이벤트 수
    pub fn lifecycle_events_processed(&self) -> u64 {
        self.stats.lifecycle_processed.load(Ordering::Relaxed)
    }

    /// 버려진 수명주기 이벤트 수
    pub fn lifecycle_events_rejected(&self) -> u64 {
        self.stats.lifecycle_rejected.load(Ordering::Relaxed)
    }

    /// 완료된 재조정 패스 수
    pub fn reconciliations(&self) -> u64 {
        self.stats.reconciliations.load(Ordering::Relaxed)
    }

    /// 실패한 재조정 패스 수
    pub fn reconciliation_failures(&self) -> u64 {
        self.stats.reconciliation_failures.load(Ordering::Relaxed)
    }

    /// 성공한 리로드 요청 수
    pub fn reloads_succeeded(&self) -> u64 {
        self.stats.reloads_succeeded.load(Ordering::Relaxed)
    }

    /// 실패한 리로드 요청 수
    pub fn reloads_failed(&self) -> u64 {
        self.stats.reloads_failed.load(Ordering::Relaxed)
    }

    /// 알람 수명주기 이벤트 하나를 처리합니다.
    ///
    /// 잘못된 이벤트와 찾을 수 없는 알람은 기록 후 에러로 반환되며,
    /// 재시도는 다음 재조정 패스가 맡습니다.
    pub async fn handle_lifecycle_event(
        &self,
        event: &BusEvent,
    ) -> Result<BTreeSet<ServiceId>, BsmError> {
        self.ingestion()?.handle_lifecycle_event(event).await
    }

    /// 리로드 요청 이벤트 하나를 처리하고 결과 이벤트를 발행합니다.
    pub async fn handle_reload_event(&self, event: &BusEvent) -> Result<ReloadOutcome, BsmError> {
        Ok(self.ingestion()?.handle_reload_event(event).await)
    }

    /// 계약 검사 후 서비스 정의를 다시 읽어 그래프를 교체합니다.
    ///
    /// 실패하면 기존 그래프가 그대로 유지됩니다.
    pub async fn reload(&self) -> Result<BTreeSet<ServiceId>, BsmError> {
        self.ingestion()?.reload().await
    }

    /// 알람 디렉토리 전체를 스캔하여 상태 머신에 다시 적용합니다.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, BsmError> {
        self.ingestion()?.reconcile_once().await
    }

    fn ingestion(&self) -> Result<Ingestion<A, S, R>, BsmError> {
        Ok(Ingestion {
            config: self.config.clone(),
            machine: Arc::clone(&self.machine),
            alarms: Arc::clone(
                self.alarms
                    .as_ref()
                    .ok_or(BsmError::MissingCollaborator("alarm_directory"))?,
            ),
            services: Arc::clone(
                self.services
                    .as_ref()
                    .ok_or(BsmError::MissingCollaborator("service_store"))?,
            ),
            registry: Arc::clone(
                self.registry
                    .as_ref()
                    .ok_or(BsmError::MissingCollaborator("event_registry"))?,
            ),
            bus: Arc::clone(
                self.bus
                    .as_ref()
                    .ok_or(BsmError::MissingCollaborator("event_bus"))?,
            ),
            stats: Arc::clone(&self.stats),
        })
    }

    fn spawn_dispatch(&mut self, ingestion: Arc<Ingestion<A, S, R>>) {
        let routes: HashMap<&'static str, Route> = ALARM_LIFECYCLE_UEIS
            .iter()
            .map(|uei| (*uei, Route::Lifecycle))
            .chain(std::iter::once((UEI_RELOAD_DAEMON_CONFIG, Route::Reload)))
            .collect();
        let ueis: Vec<&str> = routes.keys().copied().collect();
        let mut rx = ingestion
            .bus
            .subscribe(&ueis, ingestion.config.event_channel_capacity);
        let cancel = self.cancel.clone();

        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("bsm dispatch loop cancelled");
                        break;
                    }
                    event = rx.recv() => {
                        let Some(event) = event else {
                            info!("event bus closed, stopping bsm dispatch loop");
                            break;
                        };
                        match routes.get(event.uei.as_str()) {
                            Some(Route::Lifecycle) => {
                                ingestion.dispatch_lifecycle_event(&event).await;
                            }
                            Some(Route::Reload) => {
                                ingestion.handle_reload_event(&event).await;
                            }
                            None => debug!(uei = %event.uei, "unrouted event ignored"),
                        }
                    }
                }
            }
        }));
    }

    fn spawn_reconciliation(&mut self, ingestion: Arc<Ingestion<A, S, R>>) {
        let period = ingestion.config.poll_interval();
        let cancel = self.cancel.clone();

        self.tasks.push(tokio::spawn(async move {
            // 첫 패스는 한 주기 뒤에 실행됩니다.
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("reconciliation timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = ingestion.reconcile_once().await {
                            warn!(error = %e, "reconciliation pass failed, will retry next interval");
                        }
                    }
                }
            }
        }));
    }
}

impl<A, S, R> Pipeline for BsmDaemon<A, S, R>
where
    A: AlarmDirectory,
    S: BusinessServiceStore,
    R: EventConfRegistry,
{
    async fn start(&mut self) -> Result<(), BeaconError> {
        if self.state == DaemonState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting business service monitor");

        // 1. 필수 협력자 확인
        let ingestion = Arc::new(self.ingestion()?);

        // 2. 상태 변경 알림 연결
        let notifier = self
            .machine
            .on_status_change(BusNotifier::new(Arc::clone(&ingestion.bus)));

        // 3. 계약 검사 및 초기 그래프 로드
        if let Err(e) = ingestion.reload().await {
            self.machine.remove_handler(notifier);
            error!(error = %e, "initial business service graph load failed");
            return Err(e.into());
        }
        self.notifier = Some(notifier);
        info!(
            services = self.machine.graph().len(),
            "business service graph loaded"
        );

        // 4. 이벤트 구독 및 재조정 타이머 시작
        self.cancel = CancellationToken::new();
        self.spawn_dispatch(Arc::clone(&ingestion));
        self.spawn_reconciliation(ingestion);

        self.state = DaemonState::Running;
        info!(
            poll_interval_secs = self.config.poll_interval().as_secs(),
            "business service monitor started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BeaconError> {
        if self.state != DaemonState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping business service monitor");

        // 진행 중인 패스는 끝까지 실행됩니다.
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "bsm task ended abnormally");
            }
        }

        if let Some(notifier) = self.notifier.take() {
            self.machine.remove_handler(notifier);
        }

        self.state = DaemonState::Stopped;
        info!("business service monitor stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            DaemonState::Running => match self.stats.degraded_reason() {
                Some(reason) => HealthStatus::Degraded(reason),
                None => HealthStatus::Healthy,
            },
            DaemonState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            DaemonState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 사유 문자열을 문자 경계에서 [`MAX_REASON_LEN`]자로 자릅니다.
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_LEN).collect()
}

/// 비즈니스 서비스 모니터 빌더
///
/// 협력자는 `start()`에서 검증됩니다. 빌드 단계에서는 설정만 검사합니다.
pub struct BsmDaemonBuilder<A, S, R> {
    config: BsmDaemonConfig,
    alarms: Option<Arc<A>>,
    services: Option<Arc<S>>,
    registry: Option<Arc<R>>,
    bus: Option<Arc<dyn EventBus>>,
    machine: Option<Arc<BusinessServiceStateMachine>>,
}

impl<A, S, R> BsmDaemonBuilder<A, S, R>
where
    A: AlarmDirectory,
    S: BusinessServiceStore,
    R: EventConfRegistry,
{
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: BsmDaemonConfig::default(),
            alarms: None,
            services: None,
            registry: None,
            bus: None,
            machine: None,
        }
    }

    /// 데몬 설정을 지정합니다.
    pub fn config(mut self, config: BsmDaemonConfig) -> Self {
        self.config = config;
        self
    }

    /// 알람 디렉토리를 설정합니다.
    pub fn alarm_directory(mut self, alarms: Arc<A>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    /// 비즈니스 서비스 정의 저장소를 설정합니다.
    pub fn service_store(mut self, services: Arc<S>) -> Self {
        self.services = Some(services);
        self
    }

    /// 이벤트 정의 레지스트리를 설정합니다.
    pub fn event_registry(mut self, registry: Arc<R>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 이벤트 버스를 설정합니다.
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 기존 상태 머신을 공유합니다. 설정하지 않으면 빈 상태 머신을 만듭니다.
    pub fn state_machine(mut self, machine: Arc<BusinessServiceStateMachine>) -> Self {
        self.machine = Some(machine);
        self
    }

    /// 데몬을 빌드합니다.
    pub fn build(self) -> Result<BsmDaemon<A, S, R>, BsmError> {
        self.config.validate()?;

        Ok(BsmDaemon {
            config: self.config,
            state: DaemonState::Initialized,
            machine: self.machine.unwrap_or_default(),
            alarms: self.alarms,
            services: self.services,
            registry: self.registry,
            bus: self.bus,
            stats: Arc::default(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            notifier: None,
        })
    }
}

impl<A, S, R> Default for BsmDaemonBuilder<A, S, R>
where
    A: AlarmDirectory,
    S: BusinessServiceStore,
    R: EventConfRegistry,
{
    fn default() -> Self {
        Self::new()
    }
}
