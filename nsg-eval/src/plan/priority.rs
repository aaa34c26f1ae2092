//! Free-priority search

use std::collections::BTreeSet;

/// Nearest free priority strictly below `below`, never under `floor`
pub fn free_priority_below(taken: &BTreeSet<u16>, below: u16, floor: u16) -> Option<u16> {
    (floor..below).rev().find(|p| !taken.contains(p))
}

/// `preferred` if free, else the nearest free slot below it, else above it
///
/// The search stays within `floor..=ceiling`.
pub fn free_priority_near(
    taken: &BTreeSet<u16>,
    preferred: u16,
    floor: u16,
    ceiling: u16,
) -> Option<u16> {
    if floor > ceiling {
        return None;
    }
    let preferred = preferred.clamp(floor, ceiling);
    if !taken.contains(&preferred) {
        return Some(preferred);
    }
    free_priority_below(taken, preferred, floor)
        .or_else(|| (preferred..=ceiling).find(|p| !taken.contains(p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(priorities: &[u16]) -> BTreeSet<u16> {
        priorities.iter().copied().collect()
    }

    #[test]
    fn test_below_skips_taken() {
        assert_eq!(free_priority_below(&taken(&[100, 200]), 100, 1), Some(99));
        assert_eq!(free_priority_below(&taken(&[98, 99, 100]), 100, 1), Some(97));
    }

    #[test]
    fn test_below_respects_floor() {
        assert_eq!(free_priority_below(&taken(&[100]), 100, 100), None);
        assert_eq!(free_priority_below(&taken(&[100, 101]), 102, 100), None);
        assert_eq!(free_priority_below(&taken(&[]), 1, 1), None);
    }

    #[test]
    fn test_near_prefers_exact() {
        assert_eq!(free_priority_near(&taken(&[]), 1000, 100, 4096), Some(1000));
        assert_eq!(free_priority_near(&taken(&[1000]), 1000, 100, 4096), Some(999));
    }

    #[test]
    fn test_near_falls_back_upward() {
        assert_eq!(free_priority_near(&taken(&[100, 101]), 101, 100, 4096), Some(102));
        assert_eq!(free_priority_near(&taken(&[100, 101]), 101, 100, 101), None);
    }

    #[test]
    fn test_near_clamps_preferred() {
        assert_eq!(free_priority_near(&taken(&[]), 5000, 100, 4096), Some(4096));
        assert_eq!(free_priority_near(&taken(&[]), 10, 100, 4096), Some(100));
    }
}
