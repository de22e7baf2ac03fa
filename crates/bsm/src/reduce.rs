//! 축약 함수: 자식 심각도 목록을 노드 심각도 하나로 줄입니다.

use beacon_core::types::{ReduceStrategy, Severity};

/// 가중치가 붙은 자식 입력 목록을 축약합니다.
///
/// 입력이 비어 있으면 [`Severity::MIN`]을 반환합니다.
pub fn reduce(strategy: &ReduceStrategy, inputs: &[(Severity, u32)]) -> Severity {
    match strategy {
        ReduceStrategy::HighestSeverity => highest(inputs),
        ReduceStrategy::Threshold { thresholds } => {
            let mut ordered: Vec<_> = thresholds.iter().collect();
            ordered.sort_by(|a, b| b.severity.cmp(&a.severity));

            ordered
                .into_iter()
                .find(|threshold| {
                    let weighted: u64 = inputs
                        .iter()
                        .filter(|(severity, _)| *severity >= threshold.severity)
                        .map(|(_, weight)| u64::from(*weight))
                        .sum();
                    weighted >= u64::from(threshold.count)
                })
                .map(|threshold| threshold.severity)
                .unwrap_or_else(|| highest(inputs))
        }
    }
}

fn highest(inputs: &[(Severity, u32)]) -> Severity {
    inputs
        .iter()
        .map(|(severity, _)| *severity)
        .max()
        .unwrap_or(Severity::MIN)
}
