//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 알람 행, 심각도, 비즈니스 서비스 정의처럼 여러 크레이트가 공유하는
//! 데이터 구조를 정의합니다. 외부 저장소(YAML, JSON)와의 교환 형식도
//! 여기서 serde로 고정됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 알람과 비즈니스 서비스의 상태를 나타내는 공통 단위입니다.
/// `Ord` 구현으로 비교가 가능합니다
/// (`Cleared < Normal < Warning < Minor < Major < Critical`).
///
/// 입력으로 들어오는 `INDETERMINATE`(id 1)는 별도 변형 없이 `Normal`로 정규화됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// 문제 없음: 집계의 최솟값
    #[default]
    Cleared,
    /// 정상
    #[serde(alias = "INDETERMINATE")]
    Normal,
    /// 경고
    Warning,
    /// 경미
    Minor,
    /// 주요
    Major,
    /// 치명적: 집계의 최댓값
    Critical,
}

/// `INDETERMINATE`의 외부 id
const INDETERMINATE_ID: i32 = 1;

impl Severity {
    /// 집계에서 사용하는 최솟값
    pub const MIN: Severity = Severity::Cleared;
    /// 집계에서 사용하는 최댓값
    pub const MAX: Severity = Severity::Critical;

    /// 전체 심각도를 오름차순으로 반환합니다.
    pub const ALL: [Severity; 6] = [
        Severity::Cleared,
        Severity::Normal,
        Severity::Warning,
        Severity::Minor,
        Severity::Major,
        Severity::Critical,
    ];

    /// 외부 시스템과 공유하는 숫자 id를 반환합니다.
    pub fn id(self) -> i32 {
        match self {
            Self::Cleared => 2,
            Self::Normal => 3,
            Self::Warning => 4,
            Self::Minor => 5,
            Self::Major => 6,
            Self::Critical => 7,
        }
    }

    /// 대문자 레이블을 반환합니다.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cleared => "CLEARED",
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }

    /// 숫자 id에서 심각도를 찾습니다.
    ///
    /// `1`(INDETERMINATE)은 `Normal`로 정규화됩니다.
    pub fn from_id(id: i32) -> Option<Self> {
        if id == INDETERMINATE_ID {
            return Some(Self::Normal);
        }
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// 레이블에서 심각도를 찾습니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.trim().to_ascii_uppercase();
        if upper == "INDETERMINATE" {
            return Some(Self::Normal);
        }
        Self::ALL.into_iter().find(|s| s.label() == upper)
    }

    /// 문제 상태(`Warning` 이상)인지 확인합니다.
    pub fn is_problem(self) -> bool {
        self > Self::Normal
    }

    /// 한 단계 높은 심각도를 반환합니다. `Critical`에서는 그대로입니다.
    pub fn next_higher(self) -> Self {
        match self {
            Self::Cleared => Self::Normal,
            Self::Normal => Self::Warning,
            Self::Warning => Self::Minor,
            Self::Minor => Self::Major,
            Self::Major | Self::Critical => Self::Critical,
        }
    }

    /// 한 단계 낮은 심각도를 반환합니다. `Cleared`에서는 그대로입니다.
    pub fn next_lower(self) -> Self {
        match self {
            Self::Cleared | Self::Normal => Self::Cleared,
            Self::Warning => Self::Normal,
            Self::Minor => Self::Warning,
            Self::Major => Self::Minor,
            Self::Critical => Self::Major,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// --- 식별자 ---

/// 알람 디렉토리의 알람 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(pub u64);

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 비즈니스 서비스 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 알람 디렉토리의 한 행
///
/// 리덕션 키는 하나의 장애 조건을 생성부터 해제까지 안정적으로 식별합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRow {
    /// 알람 id
    pub id: AlarmId,
    /// 리덕션 키
    pub reduction_key: String,
    /// 현재 심각도
    pub severity: Severity,
}

impl fmt::Display for AlarmRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alarm#{} [{}] {}",
            self.id, self.severity, self.reduction_key
        )
    }
}

/// 이벤트 정의 레지스트리의 한 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    /// 이벤트 타입(UEI)
    pub uei: String,
    /// 리덕션 키 템플릿 (알람을 만들지 않는 이벤트는 없음)
    #[serde(default)]
    pub reduction_key: Option<String>,
}

// --- 비즈니스 서비스 정의 ---

/// 자식 엣지에 적용되는 심각도 매핑 함수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapFunction {
    /// 그대로 전달
    #[default]
    Identity,
    /// 문제 상태일 때 한 단계 올림
    Increase,
    /// 문제 상태일 때 한 단계 내림 (`Warning` 미만으로는 내리지 않음)
    Decrease,
    /// 항상 지정한 심각도로 변환
    SetTo { severity: Severity },
    /// 지정한 심각도를 상한으로 제한
    Cap { severity: Severity },
    /// 집계에서 제외
    Ignore,
}

impl MapFunction {
    /// 자식 심각도를 부모 집계용 입력으로 변환합니다.
    ///
    /// `None`은 해당 자식이 집계에서 빠진다는 뜻입니다.
    pub fn apply(self, severity: Severity) -> Option<Severity> {
        match self {
            Self::Identity => Some(severity),
            Self::Increase if severity.is_problem() => Some(severity.next_higher()),
            Self::Increase => Some(severity),
            Self::Decrease if severity.is_problem() => {
                Some(severity.next_lower().max(Severity::Warning))
            }
            Self::Decrease => Some(severity),
            Self::SetTo { severity: target } => Some(target),
            Self::Cap { severity: cap } => Some(severity.min(cap)),
            Self::Ignore => None,
        }
    }
}

/// THRESHOLD 전략의 한 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    /// 이 심각도 이상인 자식의 가중치 합이 충족해야 하는 개수
    pub count: u32,
    /// 충족 시 노드 심각도
    pub severity: Severity,
}

/// 자식 심각도들을 노드 심각도로 축약하는 전략
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReduceStrategy {
    /// 자식 중 최고 심각도
    HighestSeverity,
    /// 개수 임계값 기반
    Threshold { thresholds: Vec<Threshold> },
}

impl ReduceStrategy {
    /// 전략 구성의 유효성을 검증합니다.
    ///
    /// THRESHOLD는 최소 하나의 단계가 필요하고, 각 단계의 count는 0보다 커야 하며,
    /// 같은 심각도가 두 번 나오면 안 됩니다.
    pub fn validate(&self) -> Result<(), String> {
        let Self::Threshold { thresholds } = self else {
            return Ok(());
        };

        if thresholds.is_empty() {
            return Err("threshold strategy requires at least one threshold".to_owned());
        }

        for (i, threshold) in thresholds.iter().enumerate() {
            if threshold.count == 0 {
                return Err(format!(
                    "threshold for {} must have a positive count",
                    threshold.severity
                ));
            }
            if thresholds[..i]
                .iter()
                .any(|t| t.severity == threshold.severity)
            {
                return Err(format!("duplicate threshold for {}", threshold.severity));
            }
        }

        Ok(())
    }
}

fn default_weight() -> u32 {
    1
}

/// 비즈니스 서비스의 자식 참조 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChildDefinition {
    /// 다른 비즈니스 서비스
    Node {
        /// 대상 서비스 id
        target: ServiceId,
        /// 엣지 매핑 함수
        #[serde(default)]
        map: MapFunction,
        /// THRESHOLD 계산 가중치
        #[serde(default = "default_weight")]
        weight: u32,
    },
    /// 리덕션 키로 참조하는 알람
    Alarm {
        /// 리덕션 키
        reduction_key: String,
        /// 표시용 이름
        #[serde(default)]
        friendly_name: Option<String>,
        /// 엣지 매핑 함수
        #[serde(default)]
        map: MapFunction,
        /// THRESHOLD 계산 가중치
        #[serde(default = "default_weight")]
        weight: u32,
    },
}

/// 저장소에서 읽어 온 비즈니스 서비스 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// 서비스 id
    pub id: ServiceId,
    /// 서비스 이름
    pub name: String,
    /// 축약 전략: 누락 시 그래프 로드가 거부됩니다
    #[serde(default)]
    pub reduce: Option<ReduceStrategy>,
    /// 자식 참조 목록 (순서 유지)
    #[serde(default)]
    pub children: Vec<ChildDefinition>,
}

impl fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (id={}, children={})",
            self.name,
            self.id,
            self.children.len()
        )
    }
}
