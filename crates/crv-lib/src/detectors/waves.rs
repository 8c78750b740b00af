//! Morphological wave classification.
//!
//! Separates the dominant beat wave from secondary peaks (P and T waves in
//! an ECG complex) by clustering peak shapes. The clustering is seeded so a
//! run is repeatable; cluster *labels* still depend on the seed, so callers
//! should reason about which cluster is selected, not about label values.

use super::peaks::PeakSet;
use rand::{rngs::StdRng, Rng, SeedableRng};

const WAVE_CLUSTERS: usize = 3;
/// Width centroids closer than this (in samples, on the normalized window
/// scale) are considered tied and resolved by prominence instead.
const WIDTH_TIE_MARGIN: f64 = 5.0;
const MAX_ITERATIONS: usize = 100;

/// Partition peaks into three shape clusters over (width, height,
/// prominence) and return a keep-mask selecting the dominant beat wave:
/// the cluster with the smallest width centroid, ties on width broken by
/// the larger prominence centroid.
pub fn select_dominant_wave(peaks: &PeakSet, seed: u64) -> Vec<bool> {
    let points: Vec<[f64; 3]> = (0..peaks.len())
        .map(|i| [peaks.widths[i], peaks.heights[i], peaks.prominences[i]])
        .collect();
    let (labels, centroids) = kmeans(&points, seed);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| centroids[a][0].partial_cmp(&centroids[b][0]).unwrap());
    let chosen = if centroids[order[1]][0] - centroids[order[0]][0] < WIDTH_TIE_MARGIN {
        if centroids[order[1]][2] > centroids[order[0]][2] {
            order[1]
        } else {
            order[0]
        }
    } else {
        order[0]
    };

    labels.iter().map(|&label| label == chosen).collect()
}

fn kmeans(points: &[[f64; 3]], seed: u64) -> (Vec<usize>, Vec<[f64; 3]>) {
    let k = WAVE_CLUSTERS;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = seed_centroids(points, k, &mut rng);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = (0..k)
                .min_by(|&a, &b| {
                    distance_sq(point, &centroids[a])
                        .partial_cmp(&distance_sq(point, &centroids[b]))
                        .unwrap()
                })
                .unwrap();
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            for d in 0..3 {
                sums[label][d] += point[d];
            }
            counts[label] += 1;
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Re-seed an empty cluster on the point farthest from its
                // current centroid.
                let far = (0..points.len())
                    .max_by(|&a, &b| {
                        distance_sq(&points[a], &centroids[labels[a]])
                            .partial_cmp(&distance_sq(&points[b], &centroids[labels[b]]))
                            .unwrap()
                    })
                    .unwrap();
                centroids[c] = points[far];
                labels[far] = c;
                changed = true;
            } else {
                for d in 0..3 {
                    centroids[c][d] = sums[c][d] / counts[c] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }
    (labels, centroids)
}

/// k-means++ initialization.
fn seed_centroids(points: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);
    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| distance_sq(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = points.len() - 1;
            for (i, &w) in weights.iter().enumerate() {
                if target <= w {
                    pick = i;
                    break;
                }
                target -= w;
            }
            pick
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[pick]);
    }
    centroids
}

fn distance_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|d| (a[d] - b[d]) * (a[d] - b[d])).sum()
}
