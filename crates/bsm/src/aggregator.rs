//! 비즈니스 서비스 상태 머신 (집계기)
//!
//! [`BusinessServiceStateMachine`]은 현재 그래프, 알람 스냅샷 테이블,
//! 노드별 유효 상태 캐시를 하나의 뮤텍스 아래에서 관리합니다.
//!
//! # 변경 전파
//! ```text
//! apply_alarm(key) ──▶ 스냅샷 갱신 ──▶ key의 부모부터 위상 순서로 재계산
//!                                        │ 변경됨 → 부모를 작업 목록에 추가
//!                                        │ 그대로 → 해당 가지 전파 중단
//!                                        ▼
//!                               변경 노드마다 핸들러 호출 (잠금 안에서)
//! ```
//!
//! `severity_of` 조회는 별도의 `RwLock` 스냅샷에서 처리하므로
//! 변경 작업과 경합하지 않습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use std::time::SystemTime;

use beacon_core::metrics as m;
use beacon_core::types::{AlarmId, ServiceId, Severity};

use crate::graph::{EdgeInput, ServiceGraph, ServiceNode};
use crate::reduce::reduce;

/// 리덕션 키별 최신 알람 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSnapshot {
    /// 리덕션 키
    pub reduction_key: String,
    /// 마지막으로 적용된 알람 id
    pub alarm_id: AlarmId,
    /// 마지막으로 적용된 심각도
    pub severity: Severity,
    /// 마지막으로 변경된 시각
    pub last_seen_at: SystemTime,
}

/// 노드의 캐시된 유효 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveStatus {
    /// 서비스 id
    pub service_id: ServiceId,
    /// 계산된 심각도
    pub severity: Severity,
    /// 계산에 사용된 그래프 버전
    pub version: u64,
}

/// 상태 전이 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// 서비스 id
    pub service_id: ServiceId,
    /// 서비스 이름
    pub service_name: String,
    /// 이전 심각도
    pub previous: Severity,
    /// 새 심각도
    pub current: Severity,
}

/// 상태 전이 관찰자
///
/// 변경을 만든 작업의 잠금 안에서 동기적으로 호출됩니다.
/// 핸들러는 오래 블로킹하거나 상태 머신을 다시 호출하면 안 됩니다.
pub trait StatusChangeHandler: Send + Sync {
    /// 상태 전이 하나를 처리합니다.
    fn on_status_change(&self, change: &StatusChange);
}

impl<F> StatusChangeHandler for F
where
    F: Fn(&StatusChange) + Send + Sync,
{
    fn on_status_change(&self, change: &StatusChange) {
        self(change)
    }
}

/// 등록된 핸들러 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct MachineState {
    graph: Arc<ServiceGraph>,
    alarms: HashMap<String, AlarmSnapshot>,
    /// 그래프 아레나 인덱스별 심각도
    statuses: Vec<Severity>,
    handlers: Vec<(HandlerId, Arc<dyn StatusChangeHandler>)>,
    next_handler: u64,
}

/// 알람 기반 계층 상태 머신
pub struct BusinessServiceStateMachine {
    state: Mutex<MachineState>,
    snapshot: RwLock<HashMap<ServiceId, EffectiveStatus>>,
}

impl Default for BusinessServiceStateMachine {
    fn default() -> Self {
        Self::new(ServiceGraph::empty())
    }
}

impl BusinessServiceStateMachine {
    /// 주어진 그래프로 상태 머신을 생성합니다.
    ///
    /// 알람 스냅샷 없이 전체 축약을 한 번 수행합니다. 입력과 무관한 매핑
    /// (`SetTo`)이 있는 노드는 최소 심각도가 아닐 수 있습니다.
    pub fn new(graph: ServiceGraph) -> Self {
        let statuses = recompute_all(&graph, &HashMap::new());
        let snapshot = effective_statuses(&graph, &statuses);
        metrics::gauge!(m::BSM_SERVICES_LOADED).set(graph.len() as f64);

        Self {
            state: Mutex::new(MachineState {
                graph: Arc::new(graph),
                alarms: HashMap::new(),
                statuses,
                handlers: Vec::new(),
                next_handler: 0,
            }),
            snapshot: RwLock::new(snapshot),
        }
    }

    /// 알람 스냅샷 하나를 적용하고 심각도가 바뀐 노드를 반환합니다.
    ///
    /// 저장된 스냅샷과 알람 id, 심각도가 모두 같으면 아무것도 하지 않습니다.
    pub fn apply_alarm(
        &self,
        reduction_key: &str,
        severity: Severity,
        alarm_id: AlarmId,
    ) -> BTreeSet<ServiceId> {
        let mut guard = self.lock();
        let state = &mut *guard;

        match state.alarms.get_mut(reduction_key) {
            Some(existing) if existing.alarm_id == alarm_id && existing.severity == severity => {
                metrics::counter!(m::BSM_ALARMS_DUPLICATE_TOTAL).increment(1);
                tracing::trace!(reduction_key, alarm_id = %alarm_id, "duplicate alarm snapshot ignored");
                return BTreeSet::new();
            }
            Some(existing) => {
                existing.alarm_id = alarm_id;
                existing.severity = severity;
                existing.last_seen_at = SystemTime::now();
            }
            None => {
                state.alarms.insert(
                    reduction_key.to_owned(),
                    AlarmSnapshot {
                        reduction_key: reduction_key.to_owned(),
                        alarm_id,
                        severity,
                        last_seen_at: SystemTime::now(),
                    },
                );
            }
        }
        metrics::counter!(m::BSM_ALARMS_APPLIED_TOTAL, m::LABEL_SEVERITY => severity.label())
            .increment(1);

        let graph = Arc::clone(&state.graph);
        let mut queue: BTreeSet<(usize, usize)> = graph
            .parent_indices_of_key(reduction_key)
            .iter()
            .map(|&index| (graph.topo_position(index), index))
            .collect();

        let mut changes = Vec::new();
        while let Some((_, index)) = queue.pop_first() {
            let node = graph.node_at(index);
            let current = severity_from_children(node, &state.statuses, &state.alarms);
            let previous = state.statuses[index];
            if current == previous {
                continue;
            }

            state.statuses[index] = current;
            changes.push(StatusChange {
                service_id: node.id(),
                service_name: node.name().to_owned(),
                previous,
                current,
            });
            for &parent in graph.parent_indices_of_node(index) {
                queue.insert((graph.topo_position(parent), parent));
            }
        }

        if !changes.is_empty() {
            let mut snapshot = self.write_snapshot();
            for change in &changes {
                snapshot.insert(
                    change.service_id,
                    EffectiveStatus {
                        service_id: change.service_id,
                        severity: change.current,
                        version: graph.version(),
                    },
                );
            }
        }

        tracing::debug!(
            reduction_key,
            alarm_id = %alarm_id,
            severity = %severity,
            changed = changes.len(),
            "alarm applied"
        );
        state.notify(&changes)
    }

    /// 그래프를 통째로 교체하고 심각도가 바뀐 노드를 반환합니다.
    ///
    /// 두 그래프에 모두 있는 노드는 이전 값과 비교합니다.
    /// 새로 생긴 노드는 최소 심각도가 아닐 때만 변경으로 봅니다.
    /// 사라진 노드는 알리지 않습니다.
    pub fn replace_graph(&self, graph: ServiceGraph) -> BTreeSet<ServiceId> {
        let graph = Arc::new(graph);
        let mut state = self.lock();

        let statuses = recompute_all(&graph, &state.alarms);

        let mut changes = Vec::new();
        for &index in graph.topo_indices() {
            let node = graph.node_at(index);
            let current = statuses[index];
            let previous = state
                .graph
                .index_of(node.id())
                .map(|old| state.statuses[old]);

            let previous = match previous {
                Some(previous) if previous != current => previous,
                None if current != Severity::MIN => Severity::MIN,
                _ => continue,
            };
            changes.push(StatusChange {
                service_id: node.id(),
                service_name: node.name().to_owned(),
                previous,
                current,
            });
        }

        *self.write_snapshot() = effective_statuses(&graph, &statuses);
        metrics::gauge!(m::BSM_SERVICES_LOADED).set(graph.len() as f64);
        tracing::info!(
            version = graph.version(),
            services = graph.len(),
            changed = changes.len(),
            "service graph replaced"
        );

        state.graph = graph;
        state.statuses = statuses;
        state.notify(&changes)
    }

    /// 노드의 현재 심각도를 조회합니다. 그래프에 없는 노드는 `None`입니다.
    pub fn severity_of(&self, id: ServiceId) -> Option<Severity> {
        self.status_of(id).map(|status| status.severity)
    }

    /// 노드의 캐시된 유효 상태를 조회합니다.
    pub fn status_of(&self, id: ServiceId) -> Option<EffectiveStatus> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    /// 상태 전이 핸들러를 등록합니다.
    pub fn on_status_change<H>(&self, handler: H) -> HandlerId
    where
        H: StatusChangeHandler + 'static,
    {
        let mut state = self.lock();
        let id = HandlerId(state.next_handler);
        state.next_handler += 1;
        state.handlers.push((id, Arc::new(handler)));
        id
    }

    /// 등록된 핸들러를 제거합니다. 제거했으면 `true`입니다.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut state = self.lock();
        let before = state.handlers.len();
        state.handlers.retain(|(handler_id, _)| *handler_id != id);
        state.handlers.len() != before
    }

    /// 현재 그래프를 반환합니다.
    pub fn graph(&self) -> Arc<ServiceGraph> {
        Arc::clone(&self.lock().graph)
    }

    /// 리덕션 키의 알람 스냅샷을 조회합니다.
    pub fn snapshot_of(&self, reduction_key: &str) -> Option<AlarmSnapshot> {
        self.lock().alarms.get(reduction_key).cloned()
    }

    /// 보관 중인 알람 스냅샷 수
    pub fn alarm_count(&self) -> usize {
        self.lock().alarms.len()
    }

    fn lock(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, HashMap<ServiceId, EffectiveStatus>> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MachineState {
    /// 변경 목록을 재계산 순서대로 핸들러에 전달하고 id 집합을 반환합니다.
    fn notify(&self, changes: &[StatusChange]) -> BTreeSet<ServiceId> {
        for change in changes {
            metrics::counter!(
                m::BSM_STATUS_CHANGES_TOTAL,
                m::LABEL_SEVERITY => change.current.label()
            )
            .increment(1);
            tracing::info!(
                service_id = %change.service_id,
                service = %change.service_name,
                previous = %change.previous,
                current = %change.current,
                "business service status changed"
            );
            for (_, handler) in &self.handlers {
                handler.on_status_change(change);
            }
        }
        changes.iter().map(|change| change.service_id).collect()
    }
}

/// 그래프 전체를 위상 순서로 다시 계산합니다.
fn recompute_all(graph: &ServiceGraph, alarms: &HashMap<String, AlarmSnapshot>) -> Vec<Severity> {
    let mut statuses = vec![Severity::MIN; graph.len()];
    for &index in graph.topo_indices() {
        statuses[index] = severity_from_children(graph.node_at(index), &statuses, alarms);
    }
    statuses
}

/// 자식들의 현재 값으로 노드 심각도를 계산합니다.
fn severity_from_children(
    node: &ServiceNode,
    statuses: &[Severity],
    alarms: &HashMap<String, AlarmSnapshot>,
) -> Severity {
    let inputs: Vec<(Severity, u32)> = node
        .edges()
        .iter()
        .filter_map(|edge| {
            let child = match &edge.input {
                EdgeInput::Node(index) => statuses[*index],
                EdgeInput::Alarm(key) => alarms
                    .get(key)
                    .map(|snapshot| snapshot.severity)
                    .unwrap_or(Severity::MIN),
            };
            edge.map.apply(child).map(|severity| (severity, edge.weight))
        })
        .collect();

    reduce(node.reduce(), &inputs)
}

fn effective_statuses(
    graph: &ServiceGraph,
    statuses: &[Severity],
) -> HashMap<ServiceId, EffectiveStatus> {
    graph
        .nodes()
        .zip(statuses)
        .map(|(node, &severity)| {
            (
                node.id(),
                EffectiveStatus {
                    service_id: node.id(),
                    severity,
                    version: graph.version(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::types::{ChildDefinition, MapFunction, ReduceStrategy, ServiceDefinition};
    use std::sync::Mutex as StdMutex;

    fn service(id: u64, children: Vec<ChildDefinition>) -> ServiceDefinition {
        ServiceDefinition {
            id: ServiceId(id),
            name: format!("svc-{id}"),
            reduce: Some(ReduceStrategy::HighestSeverity),
            children,
        }
    }

    fn node_child(target: u64) -> ChildDefinition {
        ChildDefinition::Node {
            target: ServiceId(target),
            map: MapFunction::Identity,
            weight: 1,
        }
    }

    fn alarm_child(key: &str, map: MapFunction) -> ChildDefinition {
        ChildDefinition::Alarm {
            reduction_key: key.to_owned(),
            friendly_name: None,
            map,
            weight: 1,
        }
    }

    /// root(1) ─▶ a(2) ─▶ key "k1"
    ///         └▶ b(3) ─▶ key "k2"
    fn two_branch_machine() -> BusinessServiceStateMachine {
        let graph = ServiceGraph::load(vec![
            service(1, vec![node_child(2), node_child(3)]),
            service(2, vec![alarm_child("k1", MapFunction::Identity)]),
            service(3, vec![alarm_child("k2", MapFunction::Identity)]),
        ])
        .unwrap();
        BusinessServiceStateMachine::new(graph)
    }

    fn ids(values: &[u64]) -> BTreeSet<ServiceId> {
        values.iter().map(|v| ServiceId(*v)).collect()
    }

    #[test]
    fn new_machine_starts_at_min() {
        let machine = two_branch_machine();
        for id in 1..=3 {
            assert_eq!(machine.severity_of(ServiceId(id)), Some(Severity::MIN));
        }
        assert_eq!(machine.severity_of(ServiceId(99)), None);
    }

    #[test]
    fn new_machine_reduces_input_independent_edges() {
        // root(1) ─▶ a(2) ─SetTo CRITICAL─▶ key "k1"
        let definitions = vec![
            service(1, vec![node_child(2)]),
            service(
                2,
                vec![alarm_child(
                    "k1",
                    MapFunction::SetTo {
                        severity: Severity::Critical,
                    },
                )],
            ),
        ];
        let machine =
            BusinessServiceStateMachine::new(ServiceGraph::load(definitions.clone()).unwrap());

        let reloaded = BusinessServiceStateMachine::default();
        reloaded.replace_graph(ServiceGraph::load(definitions).unwrap());

        for id in [1, 2] {
            assert_eq!(machine.severity_of(ServiceId(id)), Some(Severity::Critical));
            assert_eq!(
                machine.severity_of(ServiceId(id)),
                reloaded.severity_of(ServiceId(id))
            );
        }

        // 입력이 바뀌어도 결과가 같으므로 전이가 없어야 합니다.
        assert!(machine.apply_alarm("k1", Severity::Major, AlarmId(5)).is_empty());
    }

    #[test]
    fn apply_alarm_propagates_to_ancestors() {
        let machine = two_branch_machine();
        let changed = machine.apply_alarm("k1", Severity::Major, AlarmId(77));

        assert_eq!(changed, ids(&[1, 2]));
        assert_eq!(machine.severity_of(ServiceId(2)), Some(Severity::Major));
        assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::Major));
        assert_eq!(machine.severity_of(ServiceId(3)), Some(Severity::MIN));
    }

    #[test]
    fn identical_alarm_is_idempotent() {
        let machine = two_branch_machine();
        machine.apply_alarm("k1", Severity::Major, AlarmId(77));
        let seen = machine.snapshot_of("k1").unwrap().last_seen_at;

        let changed = machine.apply_alarm("k1", Severity::Major, AlarmId(77));
        assert!(changed.is_empty());
        assert_eq!(machine.snapshot_of("k1").unwrap().last_seen_at, seen);
    }

    #[test]
    fn new_alarm_id_with_same_severity_updates_snapshot_only() {
        let machine = two_branch_machine();
        machine.apply_alarm("k1", Severity::Major, AlarmId(77));

        let changed = machine.apply_alarm("k1", Severity::Major, AlarmId(78));
        assert!(changed.is_empty());
        assert_eq!(machine.snapshot_of("k1").unwrap().alarm_id, AlarmId(78));
    }

    #[test]
    fn propagation_stops_at_unchanged_parent() {
        let machine = two_branch_machine();
        machine.apply_alarm("k1", Severity::Critical, AlarmId(1));

        // root는 이미 CRITICAL이므로 b만 변경됩니다.
        let changed = machine.apply_alarm("k2", Severity::Minor, AlarmId(2));
        assert_eq!(changed, ids(&[3]));
        assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::Critical));
    }

    #[test]
    fn clearing_alarm_restores_min() {
        let machine = two_branch_machine();
        machine.apply_alarm("k1", Severity::Major, AlarmId(1));
        let changed = machine.apply_alarm("k1", Severity::Cleared, AlarmId(1));

        assert_eq!(changed, ids(&[1, 2]));
        assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::Cleared));
    }

    #[test]
    fn unknown_reduction_key_is_stored_without_changes() {
        let machine = two_branch_machine();
        let changed = machine.apply_alarm("orphan", Severity::Critical, AlarmId(5));
        assert!(changed.is_empty());
        assert_eq!(machine.alarm_count(), 1);
    }

    #[test]
    fn ignore_map_excludes_child() {
        let graph = ServiceGraph::load(vec![service(
            1,
            vec![
                alarm_child("noisy", MapFunction::Ignore),
                alarm_child("real", MapFunction::Identity),
            ],
        )])
        .unwrap();
        let machine = BusinessServiceStateMachine::new(graph);

        assert!(machine.apply_alarm("noisy", Severity::Critical, AlarmId(1)).is_empty());
        assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::MIN));
        assert_eq!(
            machine.apply_alarm("real", Severity::Warning, AlarmId(2)),
            ids(&[1])
        );
    }

    #[test]
    fn handlers_receive_changes_in_recompute_order() {
        let machine = two_branch_machine();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        machine.on_status_change(move |change: &StatusChange| {
            sink.lock().unwrap().push((change.service_id, change.previous, change.current));
        });

        machine.apply_alarm("k1", Severity::Minor, AlarmId(1));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (ServiceId(2), Severity::Cleared, Severity::Minor),
                (ServiceId(1), Severity::Cleared, Severity::Minor),
            ]
        );
    }

    #[test]
    fn removed_handler_is_not_called() {
        let machine = two_branch_machine();
        let calls = Arc::new(StdMutex::new(0usize));
        let counter = Arc::clone(&calls);
        let id = machine.on_status_change(move |_: &StatusChange| {
            *counter.lock().unwrap() += 1;
        });

        assert!(machine.remove_handler(id));
        assert!(!machine.remove_handler(id));
        machine.apply_alarm("k1", Severity::Major, AlarmId(1));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn replace_graph_recomputes_from_existing_snapshots() {
        let machine = BusinessServiceStateMachine::default();
        machine.apply_alarm("k1", Severity::Major, AlarmId(1));

        let graph = ServiceGraph::load(vec![
            service(1, vec![node_child(2)]),
            service(2, vec![alarm_child("k1", MapFunction::Identity)]),
        ])
        .unwrap();
        let changed = machine.replace_graph(graph);

        assert_eq!(changed, ids(&[1, 2]));
        assert_eq!(machine.severity_of(ServiceId(1)), Some(Severity::Major));
    }

    #[test]
    fn replace_graph_skips_new_nodes_at_min_and_retired_nodes() {
        let machine = two_branch_machine();
        machine.apply_alarm("k2", Severity::Warning, AlarmId(1));

        // 3은 사라지고, 4는 최소 심각도로 새로 생깁니다.
        let graph = ServiceGraph::load(vec![
            service(1, vec![node_child(2)]),
            service(2, vec![alarm_child("k1", MapFunction::Identity)]),
            service(4, vec![alarm_child("k9", MapFunction::Identity)]),
        ])
        .unwrap();
        let changed = machine.replace_graph(graph);

        // root는 WARNING에서 CLEARED로 바뀝니다.
        assert_eq!(changed, ids(&[1]));
        assert_eq!(machine.severity_of(ServiceId(3)), None);
        assert_eq!(machine.severity_of(ServiceId(4)), Some(Severity::MIN));
    }

    #[test]
    fn replace_graph_bumps_status_version() {
        let machine = two_branch_machine();
        let before = machine.status_of(ServiceId(1)).unwrap().version;

        let graph = ServiceGraph::load(vec![service(1, vec![])]).unwrap();
        machine.replace_graph(graph);

        let after = machine.status_of(ServiceId(1)).unwrap().version;
        assert!(after > before);
        assert_eq!(machine.graph().version(), after);
    }
}
