//! Edge weight from confidence tier and mention frequency

use crate::schema::LinkConfidence;

/// Largest bonus mention frequency can add on top of the tier base
pub const MENTION_BONUS_CAP: f64 = 0.1;

/// Starting weight of an edge for a confidence tier
pub fn tier_base(confidence: LinkConfidence) -> f64 {
    match confidence {
        LinkConfidence::Strong => 0.9,
        LinkConfidence::Weak => 0.6,
        LinkConfidence::Ghost => 0.3,
    }
}

/// `min(1, base + cap * (1 - 1/mentions))`
///
/// Grows with the number of pages mentioning the target but saturates, so a
/// ghost link can never outrank a strong one through repetition alone.
pub fn connection_strength(confidence: LinkConfidence, mentioned_count: u64) -> f64 {
    let mentions = mentioned_count.max(1) as f64;
    let bonus = MENTION_BONUS_CAP * (1.0 - 1.0 / mentions);
    (tier_base(confidence) + bonus).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_mention_is_tier_base() {
        assert_eq!(connection_strength(LinkConfidence::Strong, 1), 0.9);
        assert_eq!(connection_strength(LinkConfidence::Weak, 1), 0.6);
        assert_eq!(connection_strength(LinkConfidence::Ghost, 0), 0.3);
    }

    #[test]
    fn test_monotonic_and_capped() {
        let mut previous = 0.0;
        for mentions in 1..200 {
            let s = connection_strength(LinkConfidence::Strong, mentions);
            assert!(s >= previous);
            assert!(s <= 1.0);
            previous = s;
        }
        assert!(connection_strength(LinkConfidence::Ghost, 1_000_000) < tier_base(LinkConfidence::Weak));
        assert!(connection_strength(LinkConfidence::Weak, 1_000_000) < tier_base(LinkConfidence::Strong));
    }
}
