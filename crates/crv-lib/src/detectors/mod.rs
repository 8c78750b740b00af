pub mod peaks;
pub mod waves;

use peaks::PeakSet;

/// Detect beat peaks in a normalized window segment.
///
/// Runs raw peak extraction, optionally separates the dominant wave by
/// clustering, then corrects the edge peaks' prominences: a window-edge
/// peak has one of its valleys cut off by the segment boundary, which
/// systematically under-estimates its prominence, so the neighbouring
/// peak's baseline is used instead. The correction needs a neighbour on
/// each side and is skipped at 3 or fewer peaks.
pub fn detect_beat_peaks(
    segment: &[f64],
    distance: usize,
    min_prominence: f64,
    wave_clustering: bool,
    clustering_seed: u64,
) -> PeakSet {
    let mut peaks = peaks::find_peaks(segment, distance, min_prominence, 0.0);

    if wave_clustering && peaks.len() >= 3 {
        let mask = waves::select_dominant_wave(&peaks, clustering_seed);
        peaks = peaks.filtered(&mask);
    }

    if peaks.len() > 3 {
        correct_edge_prominences(&mut peaks);
    }
    peaks
}

fn correct_edge_prominences(peaks: &mut PeakSet) {
    let baseline: Vec<f64> = peaks
        .heights
        .iter()
        .zip(&peaks.prominences)
        .map(|(h, p)| h - p)
        .collect();
    let last = peaks.len() - 1;
    peaks.prominences[0] = peaks.heights[0] - baseline[1];
    peaks.prominences[last] = peaks.heights[last] - baseline[last - 1];
}
