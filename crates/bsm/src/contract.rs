//! 리덕션 키 계약 검사
//!
//! 집계기는 리덕션 키 하나가 장애 조건 하나를 안정적으로 식별한다고 가정합니다.
//! 이 가정은 이벤트 정의 레지스트리의 리덕션 키 템플릿에 달려 있으므로,
//! 잘 알려진 이벤트 타입마다 정의가 정확히 하나이고 템플릿이 기대값과
//! 글자 그대로 같은지 확인합니다.

use beacon_core::config::{NODE_DOWN_REDUCTION_KEY, NODE_LOST_SERVICE_REDUCTION_KEY};
use beacon_core::event::{UEI_NODE_DOWN, UEI_NODE_LOST_SERVICE};
use beacon_core::store::EventConfRegistry;

use crate::error::BsmError;

/// 이벤트 타입별 기대 리덕션 키 템플릿
pub const EXPECTED_REDUCTION_KEYS: [(&str, &str); 2] = [
    (UEI_NODE_LOST_SERVICE, NODE_LOST_SERVICE_REDUCTION_KEY),
    (UEI_NODE_DOWN, NODE_DOWN_REDUCTION_KEY),
];

/// 레지스트리가 리덕션 키 계약을 만족하는지 검사합니다.
///
/// 첫 번째 위반에서 [`BsmError::ReductionKeyContract`]를 반환합니다.
pub fn verify_reduction_keys<R>(registry: &R) -> Result<(), BsmError>
where
    R: EventConfRegistry + ?Sized,
{
    for (uei, expected) in EXPECTED_REDUCTION_KEYS {
        let definitions = registry.get_events_for_uei(uei);
        let [definition] = definitions.as_slice() else {
            return Err(BsmError::ReductionKeyContract {
                uei: uei.to_owned(),
                reason: format!(
                    "could not find a unique event definition ({} found)",
                    definitions.len()
                ),
            });
        };

        let actual = definition.reduction_key.as_deref().unwrap_or_default();
        if actual != expected {
            return Err(BsmError::ReductionKeyContract {
                uei: uei.to_owned(),
                reason: format!("unsupported reduction key '{actual}', expected '{expected}'"),
            });
        }
    }

    tracing::debug!("reduction key contract verified");
    Ok(())
}
