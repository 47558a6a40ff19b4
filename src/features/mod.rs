//! Feature extraction and descriptor model.
//!
//! Descriptor selection is a closed enumeration: each kind declares its own
//! ratio-test threshold and distance metric, and extraction strategies are
//! dispatched once at construction rather than by string comparison at call
//! sites. Extraction itself is a capability: the crate ships one binary
//! (FAST+BRIEF style) extractor and embedders inject float-descriptor
//! extractors for the SIFT/SURF-family kinds.

pub mod fast_brief;
pub mod matching;

use anyhow::{bail, Result};
use image::GrayImage;
use nalgebra::Vector2;
use serde::Deserialize;

pub use fast_brief::FastBriefExtractor;
pub use matching::{match_descriptors, FeatureMatch};

/// Descriptor/matching strategy used for tracking or initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    Orb,
    Surf,
    ASift,
    ASurf,
}

/// Distance metric paired with a descriptor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Bit-count distance over binary descriptors.
    Hamming,
    /// Euclidean distance over float descriptors.
    L2,
}

impl DescriptorKind {
    /// Ratio-test threshold: a match is accepted when
    /// `best < ratio * second_best`.
    pub fn match_ratio(self) -> f32 {
        match self {
            DescriptorKind::Orb => 0.8,
            DescriptorKind::Surf | DescriptorKind::ASift | DescriptorKind::ASurf => 0.7,
        }
    }

    pub fn metric(self) -> DistanceMetric {
        match self {
            DescriptorKind::Orb => DistanceMetric::Hamming,
            DescriptorKind::Surf | DescriptorKind::ASift | DescriptorKind::ASurf => {
                DistanceMetric::L2
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DescriptorKind::Orb => "orb",
            DescriptorKind::Surf => "surf",
            DescriptorKind::ASift => "asift",
            DescriptorKind::ASurf => "asurf",
        }
    }
}

/// Row-major descriptor storage; binary and float descriptors never mix
/// within one set.
#[derive(Debug, Clone)]
pub enum DescriptorStore {
    Binary { width: usize, data: Vec<u8> },
    Float { width: usize, data: Vec<f32> },
}

impl DescriptorStore {
    pub fn empty_binary(width: usize) -> Self {
        Self::Binary {
            width,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Binary { width, data } => {
                if *width == 0 {
                    0
                } else {
                    data.len() / width
                }
            }
            Self::Float { width, data } => {
                if *width == 0 {
                    0
                } else {
                    data.len() / width
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance between descriptor `i` of `self` and `j` of `other`.
    /// `None` when the storages have incompatible layouts.
    pub fn distance(&self, i: usize, other: &DescriptorStore, j: usize) -> Option<f32> {
        match (self, other) {
            (
                Self::Binary { width: wa, data: a },
                Self::Binary { width: wb, data: b },
            ) if wa == wb => {
                let da = &a[i * wa..(i + 1) * wa];
                let db = &b[j * wb..(j + 1) * wb];
                let bits: u32 = da
                    .iter()
                    .zip(db)
                    .map(|(x, y)| (x ^ y).count_ones())
                    .sum();
                Some(bits as f32)
            }
            (
                Self::Float { width: wa, data: a },
                Self::Float { width: wb, data: b },
            ) if wa == wb => {
                let da = &a[i * wa..(i + 1) * wa];
                let db = &b[j * wb..(j + 1) * wb];
                let sq: f32 = da.iter().zip(db).map(|(x, y)| (x - y) * (x - y)).sum();
                Some(sq.sqrt())
            }
            _ => None,
        }
    }
}

/// Keypoints plus their descriptors, as extracted from one image.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub keypoints: Vec<Vector2<f64>>,
    pub descriptors: DescriptorStore,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Keypoint detection + description over an optionally masked image.
///
/// Pixels where the mask is zero are excluded from detection. Implementations
/// must yield descriptors whose storage matches `kind().metric()`.
pub trait FeatureExtractor: Send {
    fn kind(&self) -> DescriptorKind;

    fn extract(&self, image: &GrayImage, mask: Option<&GrayImage>) -> FeatureSet;
}

/// Build the built-in extractor for a descriptor kind.
///
/// Only the binary kind has a built-in implementation; SIFT/SURF-family
/// extractors must be injected by the embedder. An unsupported kind is a
/// construction-time error, not a silent fallback.
pub fn build_extractor(kind: DescriptorKind) -> Result<Box<dyn FeatureExtractor>> {
    match kind {
        DescriptorKind::Orb => Ok(Box::new(FastBriefExtractor::new())),
        other => bail!(
            "no built-in extractor for descriptor kind '{}'; inject one",
            other.name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_per_kind() {
        assert_eq!(DescriptorKind::Orb.match_ratio(), 0.8);
        assert_eq!(DescriptorKind::Surf.match_ratio(), 0.7);
        assert_eq!(DescriptorKind::ASift.match_ratio(), 0.7);
        assert_eq!(DescriptorKind::ASurf.match_ratio(), 0.7);
    }

    #[test]
    fn test_metric_per_kind() {
        assert_eq!(DescriptorKind::Orb.metric(), DistanceMetric::Hamming);
        assert_eq!(DescriptorKind::ASurf.metric(), DistanceMetric::L2);
    }

    #[test]
    fn test_hamming_distance() {
        let a = DescriptorStore::Binary {
            width: 2,
            data: vec![0b1111_0000, 0x00],
        };
        let b = DescriptorStore::Binary {
            width: 2,
            data: vec![0b0000_0000, 0x01],
        };
        assert_eq!(a.distance(0, &b, 0), Some(5.0));
    }

    #[test]
    fn test_mixed_storage_has_no_distance() {
        let a = DescriptorStore::Binary {
            width: 1,
            data: vec![0],
        };
        let b = DescriptorStore::Float {
            width: 1,
            data: vec![0.0],
        };
        assert_eq!(a.distance(0, &b, 0), None);
    }

    #[test]
    fn test_build_extractor_rejects_float_kinds() {
        assert!(build_extractor(DescriptorKind::Orb).is_ok());
        assert!(build_extractor(DescriptorKind::ASurf).is_err());
    }
}
