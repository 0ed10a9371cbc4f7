//! Nearest-value pairing within one reconciliation group.

use std::cmp::Ordering;

/// Ascending order with nulls last; equal values keep their input order
pub fn magnitude_order(values: &[Option<f64>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| match (values[a], values[b]) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    order
}

fn distance(target: f64, candidate: Option<f64>) -> f64 {
    match candidate {
        Some(value) if value.is_finite() => (target - value).abs(),
        _ => f64::INFINITY,
    }
}

/// Pair each target with the unconsumed candidate of minimal absolute
/// difference.
///
/// Both slices must already be in `magnitude_order`. Targets are served in
/// order; ties go to the earliest candidate. Returns, per target, the
/// index of its candidate or `None` once candidates are exhausted.
pub fn nearest_match(targets: &[f64], candidates: &[Option<f64>]) -> Vec<Option<usize>> {
    let mut consumed = vec![false; candidates.len()];

    targets
        .iter()
        .map(|&target| {
            let mut best: Option<(usize, f64)> = None;
            for (index, &candidate) in candidates.iter().enumerate() {
                if consumed[index] {
                    continue;
                }
                let d = distance(target, candidate);
                match best {
                    Some((_, best_d)) if d >= best_d => {}
                    _ => best = Some((index, d)),
                }
            }
            let (index, _) = best?;
            consumed[index] = true;
            Some(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_target_takes_closest() {
        assert_eq!(nearest_match(&[100.0], &[Some(95.0), Some(103.0)]), vec![Some(1)]);
    }

    #[test]
    fn test_each_candidate_consumed_once() {
        let pairs = nearest_match(&[100.0, 101.0], &[Some(95.0), Some(103.0)]);
        assert_eq!(pairs, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_ties_go_to_earliest_candidate() {
        assert_eq!(nearest_match(&[10.0], &[Some(8.0), Some(12.0)]), vec![Some(0)]);
    }

    #[test]
    fn test_null_candidates_rank_last() {
        let candidates = [Some(5.0), None];
        assert_eq!(nearest_match(&[1000.0, 1.0], &candidates), vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_more_targets_than_candidates() {
        assert_eq!(nearest_match(&[1.0, 2.0], &[Some(2.0)]), vec![Some(0), None]);
        assert_eq!(nearest_match(&[1.0], &[]), vec![None]);
    }

    #[test]
    fn test_magnitude_order_is_stable_with_nulls_last() {
        let values = [Some(3.0), None, Some(1.0), Some(3.0), None];
        assert_eq!(magnitude_order(&values), vec![2, 0, 3, 1, 4]);
    }
}
