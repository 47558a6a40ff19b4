//! Nearest-neighbor descriptor matching with a second-neighbor ratio test.

use super::{DescriptorKind, FeatureSet};

/// An accepted query-to-train descriptor match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Brute-force knn-2 matching with the ratio test for the given descriptor
/// kind: a match is accepted only if `best < ratio * second_best`.
///
/// Fewer than two train descriptors cannot support a ratio test, so the
/// result is empty in that case.
pub fn match_descriptors(
    query: &FeatureSet,
    train: &FeatureSet,
    kind: DescriptorKind,
) -> Vec<FeatureMatch> {
    let ratio = kind.match_ratio();
    let n_train = train.len();
    if n_train < 2 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for qi in 0..query.len() {
        let mut best = f32::INFINITY;
        let mut second = f32::INFINITY;
        let mut best_idx = 0usize;

        for ti in 0..n_train {
            let Some(d) = query.descriptors.distance(qi, &train.descriptors, ti) else {
                return Vec::new();
            };
            if d < best {
                second = best;
                best = d;
                best_idx = ti;
            } else if d < second {
                second = d;
            }
        }

        if best < ratio * second {
            matches.push(FeatureMatch {
                query_idx: qi,
                train_idx: best_idx,
                distance: best,
            });
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DescriptorStore;
    use nalgebra::Vector2;

    fn binary_set(descs: &[[u8; 2]]) -> FeatureSet {
        FeatureSet {
            keypoints: descs.iter().map(|_| Vector2::new(0.0, 0.0)).collect(),
            descriptors: DescriptorStore::Binary {
                width: 2,
                data: descs.iter().flatten().copied().collect(),
            },
        }
    }

    #[test]
    fn test_accepts_distinctive_match() {
        let query = binary_set(&[[0b1111_1111, 0b1111_1111]]);
        // Train 0 is identical, train 1 is far away.
        let train = binary_set(&[[0b1111_1111, 0b1111_1111], [0x00, 0x00]]);

        let m = match_descriptors(&query, &train, DescriptorKind::Orb);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].train_idx, 0);
        assert_eq!(m[0].distance, 0.0);
    }

    #[test]
    fn test_rejects_ambiguous_match() {
        let query = binary_set(&[[0b1111_0000, 0x00]]);
        // Both candidates are one bit away: best == second, ratio fails.
        let train = binary_set(&[[0b1110_0000, 0x00], [0b0111_0000, 0x00]]);

        let m = match_descriptors(&query, &train, DescriptorKind::Orb);
        assert!(m.is_empty());
    }

    #[test]
    fn test_single_train_descriptor_yields_nothing() {
        let query = binary_set(&[[0x01, 0x02]]);
        let train = binary_set(&[[0x01, 0x02]]);
        assert!(match_descriptors(&query, &train, DescriptorKind::Orb).is_empty());
    }
}
