//! Per-item outcomes shared by warming and scheduled regeneration

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub slug: String,
    pub status: ItemStatus,
    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    /// Failure message, or the reason the item was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ItemResult {
    pub fn success(slug: &str, duration_ms: u64, confidence_score: f64) -> Self {
        Self {
            slug: slug.to_string(),
            status: ItemStatus::Success,
            duration_ms,
            confidence_score: Some(confidence_score),
            detail: None,
        }
    }

    pub fn skipped(slug: &str, reason: impl Into<String>) -> Self {
        Self {
            slug: slug.to_string(),
            status: ItemStatus::Skipped,
            duration_ms: 0,
            confidence_score: None,
            detail: Some(reason.into()),
        }
    }

    pub fn failed(slug: &str, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            slug: slug.to_string(),
            status: ItemStatus::Failed,
            duration_ms,
            confidence_score: None,
            detail: Some(error.into()),
        }
    }
}

/// Count results by status: `(success, skipped, failed)`
pub fn tally(results: &[ItemResult]) -> (usize, usize, usize) {
    results
        .iter()
        .fold((0, 0, 0), |(ok, skip, fail), r| match r.status {
            ItemStatus::Success => (ok + 1, skip, fail),
            ItemStatus::Skipped => (ok, skip + 1, fail),
            ItemStatus::Failed => (ok, skip, fail + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_and_wire_shape() {
        let results = vec![
            ItemResult::success("a", 10, 0.9),
            ItemResult::failed("b", 5, "timed out"),
            ItemResult::skipped("c", "in flight"),
            ItemResult::success("d", 12, 0.4),
        ];
        assert_eq!(tally(&results), (2, 1, 1));

        let json = serde_json::to_value(&results[1]).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["durationMs"], 5);
        assert!(json.get("confidenceScore").is_none());
    }
}
