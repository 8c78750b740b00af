use serde::{Deserialize, Serialize};

/// Peaks detected within one normalized window, with parallel per-peak
/// shape properties. Indices are strictly increasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeakSet {
    pub indices: Vec<usize>,
    pub heights: Vec<f64>,
    pub prominences: Vec<f64>,
    pub widths: Vec<f64>,
}

impl PeakSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// New set containing only the peaks where `mask` is true.
    pub fn filtered(&self, mask: &[bool]) -> PeakSet {
        let pick = |values: &[f64]| {
            values
                .iter()
                .zip(mask)
                .filter(|(_, &keep)| keep)
                .map(|(&v, _)| v)
                .collect()
        };
        PeakSet {
            indices: self
                .indices
                .iter()
                .zip(mask)
                .filter(|(_, &keep)| keep)
                .map(|(&i, _)| i)
                .collect(),
            heights: pick(&self.heights),
            prominences: pick(&self.prominences),
            widths: pick(&self.widths),
        }
    }
}

/// Locate local maxima satisfying an amplitude floor, a minimum vertical
/// prominence and a minimum horizontal separation. Peaks closer together
/// than `distance` samples are resolved by keeping the locally tallest
/// candidate. Widths are evaluated at half prominence with linear
/// interpolation of the crossing points.
pub fn find_peaks(
    segment: &[f64],
    distance: usize,
    min_prominence: f64,
    min_height: f64,
) -> PeakSet {
    let candidates = local_maxima(segment);
    let candidates: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| segment[i] >= min_height)
        .collect();
    let keep = select_by_distance(&candidates, segment, distance);

    let mut indices = Vec::new();
    let mut heights = Vec::new();
    let mut prominences = Vec::new();
    let mut widths = Vec::new();
    for (i, &peak) in candidates.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        let (prominence, left_base, right_base) = peak_prominence(segment, peak);
        if prominence < min_prominence {
            continue;
        }
        indices.push(peak);
        heights.push(segment[peak]);
        widths.push(half_prominence_width(
            segment, peak, prominence, left_base, right_base,
        ));
        prominences.push(prominence);
    }
    PeakSet {
        indices,
        heights,
        prominences,
        widths,
    }
}

/// Indices of strict local maxima; flat tops resolve to their midpoint.
fn local_maxima(segment: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if segment.len() < 3 {
        return maxima;
    }
    let last = segment.len() - 1;
    let mut i = 1;
    while i < last {
        if segment[i - 1] < segment[i] {
            let mut ahead = i + 1;
            while ahead < last && segment[ahead] == segment[i] {
                ahead += 1;
            }
            if segment[ahead] < segment[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Greedy tallest-first pruning: any candidate closer than `distance` to a
/// taller kept peak is dropped.
fn select_by_distance(candidates: &[usize], segment: &[f64], distance: usize) -> Vec<bool> {
    let mut keep = vec![true; candidates.len()];
    if distance <= 1 || candidates.len() < 2 {
        return keep;
    }
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        segment[candidates[a]]
            .partial_cmp(&segment[candidates[b]])
            .unwrap()
    });
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && candidates[j] - candidates[k - 1] < distance {
            k -= 1;
            keep[k] = false;
        }
        let mut k = j + 1;
        while k < candidates.len() && candidates[k] - candidates[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    keep
}

/// Vertical prominence of a peak, with the indices of its left and right
/// bases (the minima between the peak and the nearest higher terrain on
/// either side, or the segment edge).
fn peak_prominence(segment: &[f64], peak: usize) -> (f64, usize, usize) {
    let height = segment[peak];

    let mut left_base = peak;
    let mut left_min = height;
    let mut i = peak;
    while i > 0 {
        i -= 1;
        if segment[i] > height {
            break;
        }
        if segment[i] < left_min {
            left_min = segment[i];
            left_base = i;
        }
    }

    let mut right_base = peak;
    let mut right_min = height;
    let mut i = peak;
    while i + 1 < segment.len() {
        i += 1;
        if segment[i] > height {
            break;
        }
        if segment[i] < right_min {
            right_min = segment[i];
            right_base = i;
        }
    }

    (height - left_min.max(right_min), left_base, right_base)
}

/// Width of the peak at half its prominence, in samples.
fn half_prominence_width(
    segment: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
) -> f64 {
    let eval_height = segment[peak] - prominence * 0.5;

    let mut i = peak;
    while i > left_base && segment[i] > eval_height {
        i -= 1;
    }
    let mut left_ip = i as f64;
    if segment[i] < eval_height {
        left_ip += (eval_height - segment[i]) / (segment[i + 1] - segment[i]);
    }

    let mut i = peak;
    while i < right_base && segment[i] > eval_height {
        i += 1;
    }
    let mut right_ip = i as f64;
    if segment[i] < eval_height {
        right_ip -= (eval_height - segment[i]) / (segment[i - 1] - segment[i]);
    }

    right_ip - left_ip
}
