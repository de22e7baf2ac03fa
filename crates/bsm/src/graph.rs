//! 비즈니스 서비스 그래프
//!
//! [`ServiceGraph`]는 서비스 정의 목록을 검증한 뒤 인덱스 기반 아레나로 보관합니다.
//! 노드는 `Vec`에 저장되고, 엣지는 아레나 인덱스로 자식을 가리킵니다.
//! 리덕션 키와 자식 노드에서 부모로 가는 역방향 인덱스를 함께 유지하여
//! 알람 하나가 바뀌었을 때 영향받는 노드만 상향 재계산할 수 있게 합니다.
//!
//! 그래프는 로드 이후 변경되지 않습니다. 리로드는 새 그래프를 만들어 통째로 교체합니다.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use beacon_core::types::{ChildDefinition, MapFunction, ReduceStrategy, ServiceDefinition, ServiceId};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;

use crate::error::GraphError;

/// 그래프 버전 발급기 (0은 빈 그래프)
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// 노드의 자식 참조 (서비스 id 기준)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    /// 다른 비즈니스 서비스
    Node {
        target: ServiceId,
        map: MapFunction,
        weight: u32,
    },
    /// 리덕션 키로 참조하는 알람
    Alarm {
        reduction_key: String,
        friendly_name: Option<String>,
        map: MapFunction,
        weight: u32,
    },
}

impl ChildRef {
    /// 엣지 매핑 함수
    pub fn map(&self) -> MapFunction {
        match self {
            Self::Node { map, .. } | Self::Alarm { map, .. } => *map,
        }
    }

    /// THRESHOLD 가중치
    pub fn weight(&self) -> u32 {
        match self {
            Self::Node { weight, .. } | Self::Alarm { weight, .. } => *weight,
        }
    }
}

/// 아레나 내부 엣지 입력
#[derive(Debug, Clone)]
pub(crate) enum EdgeInput {
    Node(usize),
    Alarm(String),
}

/// 아레나 내부 엣지
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub(crate) input: EdgeInput,
    pub(crate) map: MapFunction,
    pub(crate) weight: u32,
}

/// 그래프의 한 노드
#[derive(Debug, Clone)]
pub struct ServiceNode {
    id: ServiceId,
    name: String,
    reduce: ReduceStrategy,
    children: Vec<ChildRef>,
    edges: Vec<Edge>,
}

impl ServiceNode {
    /// 서비스 id
    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// 서비스 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 축약 전략
    pub fn reduce(&self) -> &ReduceStrategy {
        &self.reduce
    }

    /// 선언 순서대로의 자식 참조
    pub fn children(&self) -> &[ChildRef] {
        &self.children
    }

    pub(crate) fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// 검증된 불변 비즈니스 서비스 그래프
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    version: u64,
    nodes: Vec<ServiceNode>,
    index_by_id: HashMap<ServiceId, usize>,
    parents_by_key: HashMap<String, Vec<usize>>,
    parents_by_node: Vec<Vec<usize>>,
    /// 자식이 부모보다 먼저 오는 순서
    topo: Vec<usize>,
    topo_position: Vec<usize>,
}

impl ServiceGraph {
    /// 빈 그래프를 생성합니다. 버전은 0입니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 서비스 정의 목록을 검증하여 그래프를 만듭니다.
    ///
    /// 검증 순서는 id 중복, 축약 전략 누락, 임계값 오류, 알 수 없는 자식, 사이클입니다.
    /// 하나라도 실패하면 그래프를 만들지 않습니다.
    pub fn load(definitions: Vec<ServiceDefinition>) -> Result<Self, GraphError> {
        let mut index_by_id = HashMap::with_capacity(definitions.len());
        for (index, def) in definitions.iter().enumerate() {
            if index_by_id.insert(def.id, index).is_some() {
                return Err(GraphError::DuplicateService { id: def.id });
            }
        }

        let mut nodes = Vec::with_capacity(definitions.len());
        for def in definitions {
            let reduce = def
                .reduce
                .ok_or(GraphError::MissingReduceStrategy { service: def.id })?;
            reduce
                .validate()
                .map_err(|reason| GraphError::InvalidThreshold {
                    service: def.id,
                    reason,
                })?;

            let mut children = Vec::with_capacity(def.children.len());
            let mut edges = Vec::with_capacity(def.children.len());
            for child in def.children {
                match child {
                    ChildDefinition::Node {
                        target,
                        map,
                        weight,
                    } => {
                        let Some(&child_index) = index_by_id.get(&target) else {
                            return Err(GraphError::UnknownChild {
                                service: def.id,
                                target,
                            });
                        };
                        if target == def.id {
                            return Err(GraphError::Cycle {
                                services: vec![def.id],
                            });
                        }
                        edges.push(Edge {
                            input: EdgeInput::Node(child_index),
                            map,
                            weight,
                        });
                        children.push(ChildRef::Node {
                            target,
                            map,
                            weight,
                        });
                    }
                    ChildDefinition::Alarm {
                        reduction_key,
                        friendly_name,
                        map,
                        weight,
                    } => {
                        edges.push(Edge {
                            input: EdgeInput::Alarm(reduction_key.clone()),
                            map,
                            weight,
                        });
                        children.push(ChildRef::Alarm {
                            reduction_key,
                            friendly_name,
                            map,
                            weight,
                        });
                    }
                }
            }

            nodes.push(ServiceNode {
                id: def.id,
                name: def.name,
                reduce,
                children,
                edges,
            });
        }

        let topo = topological_indices(&nodes)?;
        let mut topo_position = vec![0; nodes.len()];
        for (position, &index) in topo.iter().enumerate() {
            topo_position[index] = position;
        }

        let mut parents_by_key: HashMap<String, Vec<usize>> = HashMap::new();
        let mut parents_by_node = vec![Vec::new(); nodes.len()];
        for (parent, node) in nodes.iter().enumerate() {
            for edge in &node.edges {
                let slot = match &edge.input {
                    EdgeInput::Alarm(key) => parents_by_key.entry(key.clone()).or_default(),
                    EdgeInput::Node(child) => &mut parents_by_node[*child],
                };
                if !slot.contains(&parent) {
                    slot.push(parent);
                }
            }
        }

        Ok(Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            nodes,
            index_by_id,
            parents_by_key,
            parents_by_node,
            topo,
            topo_position,
        })
    }

    /// 그래프 버전 (로드마다 증가)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 노드 수
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 노드가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 서비스가 그래프에 있는지 확인합니다.
    pub fn contains(&self, id: ServiceId) -> bool {
        self.index_by_id.contains_key(&id)
    }

    /// id로 노드를 조회합니다.
    pub fn node(&self, id: ServiceId) -> Option<&ServiceNode> {
        self.index_by_id.get(&id).map(|&index| &self.nodes[index])
    }

    /// 아레나 인덱스(선언 순서)로 노드를 조회합니다.
    pub fn node_by_index(&self, index: usize) -> Option<&ServiceNode> {
        self.nodes.get(index)
    }

    /// 선언 순서대로 모든 노드를 순회합니다.
    pub fn nodes(&self) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.iter()
    }

    /// 노드의 자식 참조를 반환합니다.
    pub fn children_of(&self, id: ServiceId) -> Option<&[ChildRef]> {
        self.node(id).map(ServiceNode::children)
    }

    /// 리덕션 키를 직접 자식으로 가진 서비스를 반환합니다.
    pub fn parents_of_reduction_key(&self, reduction_key: &str) -> Vec<ServiceId> {
        self.parent_indices_of_key(reduction_key)
            .iter()
            .map(|&index| self.nodes[index].id)
            .collect()
    }

    /// 서비스를 직접 자식으로 가진 서비스를 반환합니다.
    pub fn parents_of_node(&self, id: ServiceId) -> Vec<ServiceId> {
        self.index_by_id
            .get(&id)
            .map(|&index| {
                self.parents_by_node[index]
                    .iter()
                    .map(|&parent| self.nodes[parent].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 부모가 없는 서비스를 선언 순서대로 반환합니다.
    pub fn all_roots(&self) -> Vec<ServiceId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(index, _)| self.parents_by_node[*index].is_empty())
            .map(|(_, node)| node.id)
            .collect()
    }

    /// 자식이 부모보다 먼저 오는 위상 순서를 반환합니다.
    pub fn topological_order(&self) -> Vec<ServiceId> {
        self.topo.iter().map(|&index| self.nodes[index].id).collect()
    }

    /// 그래프가 참조하는 모든 리덕션 키
    pub fn reduction_keys(&self) -> impl Iterator<Item = &str> {
        self.parents_by_key.keys().map(String::as_str)
    }

    // --- 집계기 전용 인덱스 접근 ---

    pub(crate) fn index_of(&self, id: ServiceId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub(crate) fn node_at(&self, index: usize) -> &ServiceNode {
        &self.nodes[index]
    }

    pub(crate) fn parent_indices_of_key(&self, reduction_key: &str) -> &[usize] {
        self.parents_by_key
            .get(reduction_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn parent_indices_of_node(&self, index: usize) -> &[usize] {
        &self.parents_by_node[index]
    }

    pub(crate) fn topo_indices(&self) -> &[usize] {
        &self.topo
    }

    pub(crate) fn topo_position(&self, index: usize) -> usize {
        self.topo_position[index]
    }
}

/// 자식 우선 위상 순서를 계산합니다. 사이클이 있으면 그 구성원을 보고합니다.
fn topological_indices(nodes: &[ServiceNode]) -> Result<Vec<usize>, GraphError> {
    let mut graph = DiGraph::<usize, ()>::with_capacity(nodes.len(), nodes.len());
    let handles: Vec<_> = (0..nodes.len()).map(|index| graph.add_node(index)).collect();

    for (parent, node) in nodes.iter().enumerate() {
        for edge in &node.edges {
            if let EdgeInput::Node(child) = edge.input {
                graph.add_edge(handles[parent], handles[child], ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .rev()
            .map(|handle| graph[handle])
            .collect()),
        Err(cycle) => {
            let members: HashSet<usize> = tarjan_scc(&graph)
                .into_iter()
                .find(|component| component.len() > 1)
                .map(|component| component.into_iter().map(|h| graph[h]).collect())
                .unwrap_or_else(|| HashSet::from([graph[cycle.node_id()]]));

            let mut services: Vec<ServiceId> =
                members.into_iter().map(|index| nodes[index].id).collect();
            services.sort();
            Err(GraphError::Cycle { services })
        }
    }
}
