use crate::data::model::Match;

/// Percentile rank → sigma level. Ranks are run-local, not absolute.
const LEVELS: [(f64, u8); 5] = [(0.90, 6), (0.75, 5), (0.60, 4), (0.40, 3), (0.20, 2)];

pub fn level_for_rank(rank: f64) -> u8 {
    LEVELS
        .iter()
        .find(|(floor, _)| rank >= *floor)
        .map_or(1, |&(_, level)| level)
}

/// Assign every match its sigma level from the rank of its score among all
/// scores of the set: `#{scores ≤ s} / n`.
pub fn assign_sigma(matches: &mut [Match]) {
    if matches.is_empty() {
        return;
    }
    let scores: Vec<f64> = matches.iter().map(|m| m.score).collect();
    let n = scores.len() as f64;
    for m in matches.iter_mut() {
        let rank = scores.iter().filter(|&&s| s <= m.score).count() as f64 / n;
        m.sigma = level_for_rank(rank);
    }
}
