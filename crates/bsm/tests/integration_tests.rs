//! 통합 테스트: 수집 파이프라인 전체 플로우 검증
//!
//! 알람 수명주기 이벤트 → 알람 재조회 → 상태 머신 → 상태 변경 이벤트
//! 재조정 타이머, 리로드 원자성, 계약 검사 시나리오를
//! 실제 이벤트 버스 통신을 사용하여 테스트합니다.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use beacon_bsm::{
    BsmDaemon, BsmDaemonBuilder, BsmDaemonConfig, BusinessServiceStateMachine, ReloadOutcome,
    ServiceGraph, StatusChange,
};
use beacon_core::bus::{EventBus, InMemoryEventBus};
use beacon_core::config::{NODE_DOWN_REDUCTION_KEY, NODE_LOST_SERVICE_REDUCTION_KEY};
use beacon_core::event::{
    BusEvent, PARM_ALARM_ID, PARM_BUSINESS_SERVICE_ID, PARM_DAEMON_NAME, PARM_NEW_SEVERITY_LABEL,
    PARM_PREV_SEVERITY_LABEL, PARM_REASON, UEI_ALARM_CLEARED, UEI_ALARM_CREATED,
    UEI_BSM_STATUS_CHANGED, UEI_NODE_DOWN, UEI_NODE_LOST_SERVICE, UEI_RELOAD_DAEMON_CONFIG,
    UEI_RELOAD_DAEMON_CONFIG_FAILED, UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL,
};
use beacon_core::pipeline::{HealthStatus, Pipeline};
use beacon_core::store::{EventConfRegistry, InMemoryAlarmDirectory, InMemoryServiceStore};
use beacon_core::types::{
    AlarmId, AlarmRow, ChildDefinition, EventDefinition, MapFunction, ReduceStrategy,
    ServiceDefinition, ServiceId, Severity, Threshold,
};
use tokio::sync::mpsc;

const KEY: &str = "uei:down:nodeid:123";
const ROOT: ServiceId = ServiceId(1);
const SVC_A: ServiceId = ServiceId(2);

// --- 테스트 협력자 ---

struct StaticRegistry(std::sync::RwLock<Vec<EventDefinition>>);

impl StaticRegistry {
    fn valid() -> Self {
        Self(std::sync::RwLock::new(vec![
            EventDefinition {
                uei: UEI_NODE_LOST_SERVICE.to_owned(),
                reduction_key: Some(NODE_LOST_SERVICE_REDUCTION_KEY.to_owned()),
            },
            EventDefinition {
                uei: UEI_NODE_DOWN.to_owned(),
                reduction_key: Some(NODE_DOWN_REDUCTION_KEY.to_owned()),
            },
        ]))
    }

    fn break_node_down_template(&self) {
        for def in self.0.write().unwrap().iter_mut() {
            if def.uei == UEI_NODE_DOWN {
                def.reduction_key = Some("%uei%:%nodeid%".to_owned());
            }
        }
    }
}

impl EventConfRegistry for StaticRegistry {
    fn get_events_for_uei(&self, uei: &str) -> Vec<EventDefinition> {
        self.0
            .read()
            .unwrap()
            .iter()
            .filter(|d| d.uei == uei)
            .cloned()
            .collect()
    }
}

type TestDaemon = BsmDaemon<InMemoryAlarmDirectory, InMemoryServiceStore, StaticRegistry>;

struct Harness {
    daemon: TestDaemon,
    bus: Arc<InMemoryEventBus>,
    alarms: Arc<InMemoryAlarmDirectory>,
    services: Arc<InMemoryServiceStore>,
    registry: Arc<StaticRegistry>,
}

fn alarm_child(key: &str) -> ChildDefinition {
    ChildDefinition::Alarm {
        reduction_key: key.to_owned(),
        friendly_name: Some(key.to_owned()),
        map: MapFunction::Identity,
        weight: 1,
    }
}

fn node_child(target: ServiceId) -> ChildDefinition {
    ChildDefinition::Node {
        target,
        map: MapFunction::Identity,
        weight: 1,
    }
}

/// svcRoot(1) ─▶ svcA(2) ─▶ KEY
fn chain_definitions() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition {
            id: ROOT,
            name: "svcRoot".to_owned(),
            reduce: Some(ReduceStrategy::HighestSeverity),
            children: vec![node_child(SVC_A)],
        },
        ServiceDefinition {
            id: SVC_A,
            name: "svcA".to_owned(),
            reduce: Some(ReduceStrategy::HighestSeverity),
            children: vec![alarm_child(KEY)],
        },
    ]
}

fn row(id: u64, key: &str, severity: Severity) -> AlarmRow {
    AlarmRow {
        id: AlarmId(id),
        reduction_key: key.to_owned(),
        severity,
    }
}

fn harness(poll_interval_secs: i64, rows: Vec<AlarmRow>) -> Harness {
    let bus = Arc::new(InMemoryEventBus::new());
    let alarms = Arc::new(InMemoryAlarmDirectory::new(rows));
    let services = Arc::new(InMemoryServiceStore::new(chain_definitions()));
    let registry = Arc::new(StaticRegistry::valid());

    let daemon = BsmDaemonBuilder::new()
        .config(BsmDaemonConfig {
            poll_interval_secs,
            ..Default::default()
        })
        .alarm_directory(Arc::clone(&alarms))
        .service_store(Arc::clone(&services))
        .event_registry(Arc::clone(&registry))
        .event_bus(bus.clone())
        .build()
        .unwrap();

    Harness {
        daemon,
        bus,
        alarms,
        services,
        registry,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<BusEvent>) -> BusEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus closed")
}

fn reload_request(daemon_name: &str) -> BusEvent {
    BusEvent::new(UEI_RELOAD_DAEMON_CONFIG, "test").with_param(PARM_DAEMON_NAME, daemon_name)
}

// --- 이벤트 경로 ---

#[tokio::test]
async fn lifecycle_event_propagates_to_root_and_publishes_changes() {
    let mut h = harness(30, vec![row(77, KEY, Severity::Major)]);
    let mut changes = h.bus.subscribe(&[UEI_BSM_STATUS_CHANGED], 16);
    h.daemon.start().await.unwrap();

    h.bus
        .publish(BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, 77));

    let first = next_event(&mut changes).await;
    let second = next_event(&mut changes).await;
    assert_eq!(first.param(PARM_BUSINESS_SERVICE_ID), Some("2"));
    assert_eq!(second.param(PARM_BUSINESS_SERVICE_ID), Some("1"));
    assert_eq!(second.param(PARM_PREV_SEVERITY_LABEL), Some("CLEARED"));
    assert_eq!(second.param(PARM_NEW_SEVERITY_LABEL), Some("MAJOR"));

    let machine = h.daemon.machine();
    assert_eq!(machine.severity_of(SVC_A), Some(Severity::Major));
    assert_eq!(machine.severity_of(ROOT), Some(Severity::Major));

    h.daemon.stop().await.unwrap();
}

#[tokio::test]
async fn clear_event_uses_directory_state_not_payload() {
    let h = harness(30, vec![row(77, KEY, Severity::Major)]);
    h.daemon.reload().await.unwrap();

    let created = BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, 77);
    h.daemon.handle_lifecycle_event(&created).await.unwrap();

    h.alarms.upsert(row(77, KEY, Severity::Cleared));
    let cleared = BusEvent::new(UEI_ALARM_CLEARED, "alarmd").with_param(PARM_ALARM_ID, 77);
    let changed = h.daemon.handle_lifecycle_event(&cleared).await.unwrap();

    assert_eq!(changed, BTreeSet::from([ROOT, SVC_A]));
    assert_eq!(h.daemon.machine().severity_of(ROOT), Some(Severity::Cleared));
}

#[tokio::test]
async fn duplicate_lifecycle_event_changes_nothing() {
    let h = harness(30, vec![row(77, KEY, Severity::Major)]);
    h.daemon.reload().await.unwrap();

    let event = BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, 77);
    assert_eq!(h.daemon.handle_lifecycle_event(&event).await.unwrap().len(), 2);
    assert!(h.daemon.handle_lifecycle_event(&event).await.unwrap().is_empty());
}

#[tokio::test]
async fn bad_lifecycle_events_do_not_stop_dispatch() {
    let mut h = harness(30, vec![row(77, KEY, Severity::Minor)]);
    let mut changes = h.bus.subscribe(&[UEI_BSM_STATUS_CHANGED], 16);
    h.daemon.start().await.unwrap();

    h.bus.publish(BusEvent::new(UEI_ALARM_CREATED, "alarmd"));
    h.bus
        .publish(BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, "x"));
    h.bus
        .publish(BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, 404));
    h.bus
        .publish(BusEvent::new(UEI_ALARM_CREATED, "alarmd").with_param(PARM_ALARM_ID, 77));

    let event = next_event(&mut changes).await;
    assert_eq!(event.param(PARM_NEW_SEVERITY_LABEL), Some("MINOR"));
    assert_eq!(h.daemon.lifecycle_events_rejected(), 3);

    h.daemon.stop().await.unwrap();
}

// --- 재조정 경로 ---

#[tokio::test(start_paused = true)]
async fn reconciliation_first_runs_after_one_interval() {
    let mut h = harness(5, vec![row(1, KEY, Severity::Warning)]);
    h.daemon.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.daemon.reconciliations(), 0);
    assert_eq!(h.daemon.machine().severity_of(ROOT), Some(Severity::Cleared));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.daemon.reconciliations(), 1);
    assert_eq!(h.daemon.machine().severity_of(ROOT), Some(Severity::Warning));

    h.daemon.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn invalid_poll_interval_uses_default() {
    let mut h = harness(-1, vec![row(1, KEY, Severity::Warning)]);
    h.daemon.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(h.daemon.reconciliations(), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.daemon.reconciliations(), 1);

    h.daemon.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_reconciliation_timer() {
    let mut h = harness(5, vec![]);
    h.daemon.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.daemon.reconciliations(), 2);

    h.daemon.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.daemon.reconciliations(), 2);
}

#[tokio::test]
async fn missed_event_is_repaired_by_reconciliation() {
    let h = harness(30, vec![]);
    h.daemon.reload().await.unwrap();

    // 이벤트 없이 디렉토리만 바뀐 상황
    h.alarms.upsert(row(9, KEY, Severity::Critical));
    let report = h.daemon.reconcile_once().await.unwrap();

    assert_eq!(report.rows, 1);
    assert_eq!(report.changed, BTreeSet::from([ROOT, SVC_A]));
    assert_eq!(h.daemon.machine().severity_of(ROOT), Some(Severity::Critical));
}

#[tokio::test]
async fn absence_from_scan_is_not_clearance() {
    let h = harness(30, vec![row(9, KEY, Severity::Major)]);
    h.daemon.reload().await.unwrap();
    h.daemon.reconcile_once().await.unwrap();

    h.alarms.clear();
    let report = h.daemon.reconcile_once().await.unwrap();

    assert_eq!(report.rows, 0);
    assert!(report.changed.is_empty());
    let snapshot = h.daemon.machine().snapshot_of(KEY).unwrap();
    assert_eq!(snapshot.severity, Severity::Major);
    assert_eq!(h.daemon.machine().severity_of(ROOT), Some(Severity::Major));
}

// --- 리로드 ---

#[tokio::test]
async fn reload_request_publishes_success() {
    let mut h = harness(30, vec![row(1, KEY, Severity::Minor)]);
    let mut outcomes = h.bus.subscribe(
        &[UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL, UEI_RELOAD_DAEMON_CONFIG_FAILED],
        8,
    );
    h.daemon.start().await.unwrap();

    h.bus.publish(reload_request("BSMD"));

    let outcome = next_event(&mut outcomes).await;
    assert_eq!(outcome.uei, UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL);
    assert_eq!(outcome.param(PARM_DAEMON_NAME), Some("Bsmd"));

    h.daemon.stop().await.unwrap();
}

#[tokio::test]
async fn failed_reload_keeps_previous_graph() {
    let h = harness(30, vec![row(1, KEY, Severity::Major)]);
    let mut outcomes = h.bus.subscribe(&[UEI_RELOAD_DAEMON_CONFIG_FAILED], 8);
    h.daemon.reload().await.unwrap();
    h.daemon.reconcile_once().await.unwrap();
    let machine = h.daemon.machine();
    let version = machine.graph().version();

    // svcA가 svcRoot를 자식으로 가지면 사이클
    let mut cyclic = chain_definitions();
    cyclic[1].children.push(node_child(ROOT));
    h.services.replace(cyclic);

    let outcome = h.daemon.handle_reload_event(&reload_request("bsmd")).await.unwrap();
    let ReloadOutcome::Failed { reason } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.contains("cycle"));
    assert!(reason.chars().count() <= 128);

    let event = next_event(&mut outcomes).await;
    assert_eq!(event.param(PARM_DAEMON_NAME), Some("Bsmd"));
    assert_eq!(event.param(PARM_REASON), Some(reason.as_str()));
    assert_eq!(machine.graph().version(), version);
    assert_eq!(machine.severity_of(ROOT), Some(Severity::Major));
    assert_eq!(machine.severity_of(SVC_A), Some(Severity::Major));
}

#[tokio::test]
async fn contract_mismatch_fails_reload_and_degrades_health() {
    let mut h = harness(30, vec![]);
    h.daemon.start().await.unwrap();
    assert_eq!(h.daemon.health_check().await, HealthStatus::Healthy);

    h.registry.break_node_down_template();
    let outcome = h.daemon.handle_reload_event(&reload_request("bsmd")).await.unwrap();
    assert!(matches!(outcome, ReloadOutcome::Failed { ref reason } if reason.contains("reduction key")));
    assert_eq!(h.daemon.reloads_failed(), 1);
    assert!(matches!(
        h.daemon.health_check().await,
        HealthStatus::Degraded(ref reason) if reason.contains("reload")
    ));

    h.daemon.stop().await.unwrap();
}

#[tokio::test]
async fn contract_mismatch_at_start_is_fatal() {
    let mut h = harness(30, vec![]);
    h.registry.break_node_down_template();

    let err = h.daemon.start().await.unwrap_err();
    assert!(err.to_string().contains("unsupported reduction key"));
    assert_eq!(h.daemon.state_name(), "initialized");
}

#[tokio::test]
async fn contract_check_can_be_disabled() {
    let bus = Arc::new(InMemoryEventBus::new());
    let registry = Arc::new(StaticRegistry(std::sync::RwLock::new(vec![])));
    let mut daemon = BsmDaemonBuilder::new()
        .config(BsmDaemonConfig {
            verify_reduction_keys: false,
            ..Default::default()
        })
        .alarm_directory(Arc::new(InMemoryAlarmDirectory::default()))
        .service_store(Arc::new(InMemoryServiceStore::new(chain_definitions())))
        .event_registry(registry)
        .event_bus(bus)
        .build()
        .unwrap();

    daemon.start().await.unwrap();
    assert_eq!(daemon.machine().graph().len(), 2);
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn reload_notifies_new_nodes_only_when_not_minimum() {
    let h = harness(30, vec![row(1, KEY, Severity::Minor), row(2, "other", Severity::Normal)]);
    h.daemon.reload().await.unwrap();
    h.daemon.reconcile_once().await.unwrap();

    let mut defs = chain_definitions();
    defs.push(ServiceDefinition {
        id: ServiceId(3),
        name: "quiet".to_owned(),
        reduce: Some(ReduceStrategy::HighestSeverity),
        children: vec![],
    });
    defs.push(ServiceDefinition {
        id: ServiceId(4),
        name: "noisy".to_owned(),
        reduce: Some(ReduceStrategy::HighestSeverity),
        children: vec![alarm_child("other")],
    });
    h.services.replace(defs);

    let changed = h.daemon.reload().await.unwrap();
    assert_eq!(changed, BTreeSet::from([ServiceId(4)]));
}

// --- 상태 머신 시나리오 ---

#[test]
fn threshold_scenario_from_three_children() {
    let graph = ServiceGraph::load(vec![ServiceDefinition {
        id: ServiceId(1),
        name: "cluster".to_owned(),
        reduce: Some(ReduceStrategy::Threshold {
            thresholds: vec![
                Threshold {
                    count: 2,
                    severity: Severity::Major,
                },
                Threshold {
                    count: 1,
                    severity: Severity::Critical,
                },
            ],
        }),
        children: vec![alarm_child("a"), alarm_child("b"), alarm_child("c")],
    }])
    .unwrap();
    let machine = BusinessServiceStateMachine::new(graph);

    machine.apply_alarm("a", Severity::Major, AlarmId(1));
    machine.apply_alarm("b", Severity::Major, AlarmId(2));
    machine.apply_alarm("c", Severity::Normal, AlarmId(3));

    assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::Major));
}

#[test]
fn observers_see_each_transition_once() {
    let machine = BusinessServiceStateMachine::new(ServiceGraph::load(chain_definitions()).unwrap());
    let seen = Arc::new(std::sync::Mutex::new(Vec::<StatusChange>::new()));
    let sink = Arc::clone(&seen);
    machine.on_status_change(move |change: &StatusChange| sink.lock().unwrap().push(change.clone()));

    let changed = machine.apply_alarm(KEY, Severity::Major, AlarmId(77));
    machine.apply_alarm(KEY, Severity::Major, AlarmId(77));

    let seen = seen.lock().unwrap();
    assert_eq!(changed, BTreeSet::from([ROOT, SVC_A]));
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].service_name, "svcA");
    assert_eq!(seen[1].service_name, "svcRoot");
}

// --- 속성 기반 테스트 ---

mod properties {
    use super::*;
    use proptest::prelude::*;

    const KEYS: usize = 8;

    /// 여러 축약 전략과 매핑 함수가 섞인 4단 그래프
    fn mixed_graph() -> ServiceGraph {
        let alarm = |i: usize, map: MapFunction, weight: u32| ChildDefinition::Alarm {
            reduction_key: format!("k{i}"),
            friendly_name: None,
            map,
            weight,
        };
        ServiceGraph::load(vec![
            ServiceDefinition {
                id: ServiceId(1),
                name: "root".to_owned(),
                reduce: Some(ReduceStrategy::Threshold {
                    thresholds: vec![Threshold {
                        count: 2,
                        severity: Severity::Minor,
                    }],
                }),
                children: vec![
                    node_child(ServiceId(10)),
                    node_child(ServiceId(11)),
                    node_child(ServiceId(12)),
                ],
            },
            ServiceDefinition {
                id: ServiceId(10),
                name: "front".to_owned(),
                reduce: Some(ReduceStrategy::HighestSeverity),
                children: vec![
                    alarm(0, MapFunction::Identity, 1),
                    alarm(1, MapFunction::Identity, 1),
                    alarm(2, MapFunction::Identity, 1),
                ],
            },
            ServiceDefinition {
                id: ServiceId(11),
                name: "storage".to_owned(),
                reduce: Some(ReduceStrategy::Threshold {
                    thresholds: vec![
                        Threshold {
                            count: 2,
                            severity: Severity::Major,
                        },
                        Threshold {
                            count: 1,
                            severity: Severity::Critical,
                        },
                    ],
                }),
                children: vec![
                    alarm(2, MapFunction::Identity, 1),
                    alarm(3, MapFunction::Identity, 2),
                    alarm(4, MapFunction::Identity, 1),
                    alarm(5, MapFunction::Ignore, 1),
                ],
            },
            ServiceDefinition {
                id: ServiceId(12),
                name: "edge".to_owned(),
                reduce: Some(ReduceStrategy::HighestSeverity),
                children: vec![
                    alarm(
                        6,
                        MapFunction::Cap {
                            severity: Severity::Minor,
                        },
                        1,
                    ),
                    alarm(7, MapFunction::Increase, 1),
                    alarm(
                        5,
                        MapFunction::SetTo {
                            severity: Severity::Warning,
                        },
                        1,
                    ),
                    ChildDefinition::Node {
                        target: ServiceId(10),
                        map: MapFunction::Decrease,
                        weight: 1,
                    },
                ],
            },
        ])
        .unwrap()
    }

    fn severities(machine: &BusinessServiceStateMachine) -> Vec<Option<Severity>> {
        [1, 10, 11, 12]
            .iter()
            .map(|id| machine.severity_of(ServiceId(*id)))
            .collect()
    }

    fn ancestors(graph: &ServiceGraph, key: &str) -> BTreeSet<ServiceId> {
        let mut result = BTreeSet::new();
        let mut pending = graph.parents_of_reduction_key(key);
        while let Some(id) = pending.pop() {
            if result.insert(id) {
                pending.extend(graph.parents_of_node(id));
            }
        }
        result
    }

    fn snapshots() -> impl Strategy<Value = (Vec<(usize, usize)>, Vec<(usize, usize)>)> {
        // 키마다 스냅샷이 없거나 하나
        prop::collection::vec(prop::option::of(0..Severity::ALL.len()), KEYS).prop_flat_map(
            |per_key| {
                let ordered: Vec<(usize, usize)> = per_key
                    .into_iter()
                    .enumerate()
                    .filter_map(|(key, severity)| severity.map(|s| (key, s)))
                    .collect();
                (Just(ordered.clone()), Just(ordered).prop_shuffle())
            },
        )
    }

    fn apply_all(machine: &BusinessServiceStateMachine, snapshots: &[(usize, usize)]) {
        for (key, severity) in snapshots {
            machine.apply_alarm(
                &format!("k{key}"),
                Severity::ALL[*severity],
                AlarmId(*key as u64),
            );
        }
    }

    proptest! {
        #[test]
        fn application_order_does_not_matter((ordered, shuffled) in snapshots()) {
            let a = BusinessServiceStateMachine::new(mixed_graph());
            let b = BusinessServiceStateMachine::new(mixed_graph());
            apply_all(&a, &ordered);
            apply_all(&b, &shuffled);
            prop_assert_eq!(severities(&a), severities(&b));
        }

        #[test]
        fn incremental_matches_full_recompute((ordered, _) in snapshots()) {
            let incremental = BusinessServiceStateMachine::new(mixed_graph());
            apply_all(&incremental, &ordered);

            let full = BusinessServiceStateMachine::default();
            apply_all(&full, &ordered);
            full.replace_graph(mixed_graph());

            prop_assert_eq!(severities(&incremental), severities(&full));
        }

        #[test]
        fn reapplying_same_snapshots_changes_nothing((ordered, shuffled) in snapshots()) {
            let machine = BusinessServiceStateMachine::new(mixed_graph());
            apply_all(&machine, &ordered);
            for (key, severity) in &shuffled {
                let changed = machine.apply_alarm(
                    &format!("k{key}"),
                    Severity::ALL[*severity],
                    AlarmId(*key as u64),
                );
                prop_assert!(changed.is_empty());
            }
        }

        #[test]
        fn changes_stay_within_ancestor_closure(
            (ordered, _) in snapshots(),
            key in 0..KEYS,
            severity in 0..Severity::ALL.len(),
        ) {
            let machine = BusinessServiceStateMachine::new(mixed_graph());
            apply_all(&machine, &ordered);

            let graph = machine.graph();
            let key = format!("k{key}");
            let changed = machine.apply_alarm(&key, Severity::ALL[severity], AlarmId(999));
            prop_assert!(changed.is_subset(&ancestors(&graph, &key)));
        }
    }
}
