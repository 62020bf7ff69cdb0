// THEORY:
// Binary descriptors are compared by Hamming distance. For every baseline
// descriptor the matcher finds the two closest candidate descriptors by brute
// force and keeps the pair only when the best is clearly better than the
// runner-up (Lowe's ratio test). Repeated UI elements (list rows, identical
// icons) produce near-ties; the ratio test throws those away instead of
// guessing.

use crate::core_modules::keypoints::Descriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// The (up to) two nearest train descriptors for each query, closest first.
pub fn knn2(query: &[Descriptor], train: &[Descriptor]) -> Vec<Vec<Match>> {
    query
        .iter()
        .enumerate()
        .map(|(query_idx, q)| {
            let mut best: Option<Match> = None;
            let mut second: Option<Match> = None;
            for (train_idx, t) in train.iter().enumerate() {
                let candidate = Match {
                    query_idx,
                    train_idx,
                    distance: hamming(q, t),
                };
                match best {
                    Some(b) if candidate.distance >= b.distance => {
                        if second.is_none_or(|s| candidate.distance < s.distance) {
                            second = Some(candidate);
                        }
                    }
                    _ => {
                        second = best;
                        best = Some(candidate);
                    }
                }
            }
            best.into_iter().chain(second).collect()
        })
        .collect()
}

/// Matches that pass `best < ratio * second_best`.
pub fn ratio_test_matches(query: &[Descriptor], train: &[Descriptor], ratio: f32) -> Vec<Match> {
    knn2(query, train)
        .into_iter()
        .filter_map(|pair| match pair.as_slice() {
            [best, second] if (best.distance as f32) < ratio * second.distance as f32 => Some(*best),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: u8, flipped_bits: u32) -> Descriptor {
        let mut d = [fill; 32];
        for bit in 0..flipped_bits as usize {
            d[bit / 8] ^= 1 << (bit % 8);
        }
        d
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming(&[0; 32], &[0; 32]), 0);
        assert_eq!(hamming(&[0; 32], &[0xff; 32]), 256);
        assert_eq!(hamming(&descriptor(0, 0), &descriptor(0, 13)), 13);
    }

    #[test]
    fn knn2_orders_by_distance() {
        let query = [descriptor(0, 0)];
        let train = [descriptor(0, 40), descriptor(0, 3), descriptor(0, 20)];
        let result = knn2(&query, &train);
        assert_eq!(result[0].len(), 2);
        assert_eq!(result[0][0].train_idx, 1);
        assert_eq!(result[0][0].distance, 3);
        assert_eq!(result[0][1].train_idx, 2);
        assert_eq!(result[0][1].distance, 20);
    }

    #[test]
    fn ratio_test_rejects_ambiguous_matches() {
        let query = [descriptor(0, 0), descriptor(0xff, 0)];
        // Query 0 has a clear winner, query 1 a near-tie.
        let train = [
            descriptor(0, 2),
            descriptor(0, 60),
            descriptor(0xff, 10),
            descriptor(0xff, 11),
        ];
        let good = ratio_test_matches(&query, &train, 0.75);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].query_idx, 0);
        assert_eq!(good[0].train_idx, 0);
    }

    #[test]
    fn single_train_descriptor_yields_nothing() {
        let query = [descriptor(0, 0)];
        let train = [descriptor(0, 0)];
        assert_eq!(knn2(&query, &train)[0].len(), 1);
        assert!(ratio_test_matches(&query, &train, 0.75).is_empty());
    }

    #[test]
    fn empty_sets_yield_nothing() {
        assert!(ratio_test_matches(&[], &[descriptor(0, 0)], 0.75).is_empty());
        assert!(ratio_test_matches(&[descriptor(0, 0)], &[], 0.75).is_empty());
    }
}
