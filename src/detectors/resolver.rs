//! Cross-side resolution of simultaneous divergences
//!
//! Each side (buy / sell) is first reduced to its best candidate by composite
//! score. If both sides qualify, the higher tier wins; equal tiers fall back to
//! score, and an exact score tie goes to the buy side. The loser is kept.

use std::cmp::Ordering;

use super::divergence::DivergenceCandidate;
use crate::Direction;

/// Best candidate of `direction` by composite score. The first (newest) one
/// wins an exact tie.
pub fn best_for_side(
    candidates: &[DivergenceCandidate],
    direction: Direction,
) -> Option<DivergenceCandidate> {
    candidates
        .iter()
        .filter(|c| c.direction == direction)
        .fold(None, |best: Option<DivergenceCandidate>, c| match best {
            Some(b) if b.composite_score >= c.composite_score => Some(b),
            _ => Some(*c),
        })
}

/// Total order used for resolution: tier, then score, then buy over sell.
pub fn rank(a: &DivergenceCandidate, b: &DivergenceCandidate) -> Ordering {
    a.tier()
        .cmp(&b.tier())
        .then_with(|| a.composite_score.total_cmp(&b.composite_score))
        .then_with(|| direction_rank(a.direction).cmp(&direction_rank(b.direction)))
}

#[inline]
fn direction_rank(direction: Direction) -> u8 {
    u8::from(direction.is_buy())
}

/// `(primary, rejected)` from two optional candidates. Symmetric in its
/// arguments.
pub fn resolve(
    a: Option<DivergenceCandidate>,
    b: Option<DivergenceCandidate>,
) -> (Option<DivergenceCandidate>, Option<DivergenceCandidate>) {
    match (a, b) {
        (Some(a), Some(b)) => {
            if rank(&a, &b) == Ordering::Less {
                (Some(b), Some(a))
            } else {
                (Some(a), Some(b))
            }
        }
        (Some(only), None) | (None, Some(only)) => (Some(only), None),
        (None, None) => (None, None),
    }
}

/// Reduce a bar's candidates to `(primary, rejected)`.
pub fn resolve_candidates(
    candidates: &[DivergenceCandidate],
) -> (Option<DivergenceCandidate>, Option<DivergenceCandidate>) {
    resolve(
        best_for_side(candidates, Direction::Buy),
        best_for_side(candidates, Direction::Sell),
    )
}
