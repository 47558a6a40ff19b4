//! Built-in binary feature extractor: FAST-style corner test plus a
//! BRIEF-style 256-bit binary descriptor.
//!
//! This is deliberately modest; it exists so the binary descriptor path is
//! usable out of the box. Higher-quality extractors plug in through the
//! `FeatureExtractor` trait.

use image::GrayImage;
use nalgebra::Vector2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{DescriptorKind, DescriptorStore, FeatureExtractor, FeatureSet};

/// Bresenham circle of radius 3 around the candidate pixel.
const CIRCLE: [(i32, i32); 12] = [
    (-3, 0),
    (-2, 1),
    (-1, 2),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (2, -1),
    (1, -2),
    (0, -3),
    (-1, -2),
    (-2, -1),
];

/// Descriptor width in bytes (256 bits).
const DESCRIPTOR_BYTES: usize = 32;

/// Patch half-extent for descriptor sampling; keypoints closer than this to
/// the border are dropped.
const PATCH_RADIUS: i32 = 15;

pub struct FastBriefExtractor {
    threshold: u8,
    max_features: usize,
    /// 256 sample-point pairs within the patch, fixed at construction.
    pattern: Vec<[(i32, i32); 2]>,
}

impl FastBriefExtractor {
    pub fn new() -> Self {
        Self::with_params(20, 1000)
    }

    pub fn with_params(threshold: u8, max_features: usize) -> Self {
        // Fixed seed: identical pattern across runs, so descriptors from
        // different images remain comparable.
        let mut rng = SmallRng::seed_from_u64(0x5EED_B41F);
        let pattern = (0..DESCRIPTOR_BYTES * 8)
            .map(|_| {
                let mut sample = || {
                    (
                        rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                        rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                    )
                };
                [sample(), sample()]
            })
            .collect();
        Self {
            threshold,
            max_features,
            pattern,
        }
    }

    /// Corner score: summed absolute center-to-circle differences, zero for
    /// non-corners.
    fn corner_score(&self, image: &GrayImage, x: i32, y: i32) -> u32 {
        let p = image.get_pixel(x as u32, y as u32)[0];
        let mut brighter = 0;
        let mut darker = 0;
        let mut score = 0u32;

        for &(dx, dy) in &CIRCLE {
            let v = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
            if v > p.saturating_add(self.threshold) {
                brighter += 1;
            } else if v < p.saturating_sub(self.threshold) {
                darker += 1;
            }
            score += (v as i32 - p as i32).unsigned_abs();
        }

        // 8 of 12 lets right-angle corners fire while straight edges
        // (about half the circle) stay below the bar.
        if brighter >= 8 || darker >= 8 {
            score
        } else {
            0
        }
    }

    fn describe(&self, image: &GrayImage, x: i32, y: i32) -> [u8; DESCRIPTOR_BYTES] {
        let mut desc = [0u8; DESCRIPTOR_BYTES];
        for (i, pair) in self.pattern.iter().enumerate() {
            let v1 = image.get_pixel((x + pair[0].0) as u32, (y + pair[0].1) as u32)[0];
            let v2 = image.get_pixel((x + pair[1].0) as u32, (y + pair[1].1) as u32)[0];
            if v1 > v2 {
                desc[i / 8] |= 1 << (i % 8);
            }
        }
        desc
    }
}

impl Default for FastBriefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor for FastBriefExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Orb
    }

    fn extract(&self, image: &GrayImage, mask: Option<&GrayImage>) -> FeatureSet {
        let (width, height) = image.dimensions();
        let border = PATCH_RADIUS.max(3);

        // Score every masked-in candidate, then 3x3 non-maximum suppression.
        let mut scored: Vec<(u32, i32, i32)> = Vec::new();
        let mut score_map = vec![0u32; (width * height) as usize];
        let in_bounds = |x: i32, y: i32| {
            x >= border && y >= border && x < width as i32 - border && y < height as i32 - border
        };

        for y in border..height as i32 - border {
            for x in border..width as i32 - border {
                if let Some(m) = mask {
                    if m.get_pixel(x as u32, y as u32)[0] == 0 {
                        continue;
                    }
                }
                let s = self.corner_score(image, x, y);
                score_map[(y as u32 * width + x as u32) as usize] = s;
            }
        }
        for y in border..height as i32 - border {
            for x in border..width as i32 - border {
                let s = score_map[(y as u32 * width + x as u32) as usize];
                if s == 0 {
                    continue;
                }
                let mut local_max = true;
                'nms: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if (dx, dy) == (0, 0) || !in_bounds(x + dx, y + dy) {
                            continue;
                        }
                        if score_map[((y + dy) as u32 * width + (x + dx) as u32) as usize] > s {
                            local_max = false;
                            break 'nms;
                        }
                    }
                }
                if local_max {
                    scored.push((s, x, y));
                }
            }
        }

        scored.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.max_features);

        let mut keypoints = Vec::with_capacity(scored.len());
        let mut data = Vec::with_capacity(scored.len() * DESCRIPTOR_BYTES);
        for &(_, x, y) in &scored {
            keypoints.push(Vector2::new(x as f64, y as f64));
            data.extend_from_slice(&self.describe(image, x, y));
        }

        FeatureSet {
            keypoints,
            descriptors: DescriptorStore::Binary {
                width: DESCRIPTOR_BYTES,
                data,
            },
        }
    }
}
