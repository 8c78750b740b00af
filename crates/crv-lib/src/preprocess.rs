//! Signal conditioning ahead of the windowed analysis: cubic-spline
//! upsampling, zero-phase Butterworth filtering and Savitzky-Golay
//! smoothing, applied in that order with each stage individually optional.

use crate::error::ConfigError;
use crate::signal::Signal;

/// Savitzky-Golay smoothing parameters.
#[derive(Debug, Clone, Copy)]
pub struct SmoothingSettings {
    pub poly_order: usize,
    /// Window length in milliseconds; the sample window is forced odd.
    pub window_ms: f64,
}

/// Conditioning chain configuration. `None` disables a stage.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    /// Target rate for cubic-spline upsampling; applied only when greater
    /// than the input rate, and it must then be an integer multiple of it.
    pub resample_rate: Option<u32>,
    /// Butterworth high-pass cutoff (Hz).
    pub highpass_cutoff: Option<f64>,
    /// Butterworth low-pass cutoff (Hz).
    pub lowpass_cutoff: Option<f64>,
    pub smoothing: Option<SmoothingSettings>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            resample_rate: Some(1000),
            highpass_cutoff: Some(0.5),
            lowpass_cutoff: None,
            smoothing: Some(SmoothingSettings {
                poly_order: 3,
                window_ms: 100.0,
            }),
        }
    }
}

/// Run the conditioning chain. Rejects NaN input with the index of the
/// first offending sample.
pub fn preprocess(signal: &Signal, options: &PreprocessOptions) -> Result<Signal, ConfigError> {
    signal.ensure_nan_free()?;
    let mut rate = signal.sample_rate;
    let mut data = signal.data.clone();

    if let Some(target) = options.resample_rate {
        if target > rate {
            data = cubic_spline_upsample(&data, rate, target)?;
            rate = target;
        }
    }
    if let Some(cutoff) = options.highpass_cutoff {
        data = butterworth_filter(&data, cutoff, rate, FilterKind::Highpass);
    }
    if let Some(cutoff) = options.lowpass_cutoff {
        data = butterworth_filter(&data, cutoff, rate, FilterKind::Lowpass);
    }
    if let Some(smoothing) = options.smoothing {
        data = savitzky_golay(&data, rate, smoothing.poly_order, smoothing.window_ms);
    }
    Ok(Signal::new(data, rate))
}

/// Upsample by an integer ratio with a natural cubic spline through the
/// original samples.
pub fn cubic_spline_upsample(
    data: &[f64],
    sample_rate: u32,
    resample_rate: u32,
) -> Result<Vec<f64>, ConfigError> {
    if sample_rate == 0 {
        return Err(ConfigError::ZeroSampleRate);
    }
    if resample_rate % sample_rate != 0 {
        return Err(ConfigError::IndivisibleResampleRate {
            resample: resample_rate,
            sample: sample_rate,
        });
    }
    let ratio = (resample_rate / sample_rate) as usize;
    if ratio == 1 || data.len() < 2 {
        return Ok(data.to_vec());
    }
    let knots: Vec<f64> = (0..data.len()).map(|i| (i * ratio) as f64).collect();
    let spline = CubicSpline::fit(&knots, data);
    Ok((0..data.len() * ratio)
        .map(|t| spline.eval(t as f64))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Highpass,
    Lowpass,
}

/// Zero-phase fifth-order Butterworth filter: a first-order section plus
/// two biquads at the Butterworth pole Qs, run forward and backward.
pub fn butterworth_filter(data: &[f64], cutoff: f64, sample_rate: u32, kind: FilterKind) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let fs = sample_rate as f64;
    let nyquist = fs * 0.5;
    if cutoff <= 0.0 || cutoff >= nyquist {
        return data.to_vec();
    }
    let forward = cascade(data, cutoff, fs, kind);
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    reversed = cascade(&reversed, cutoff, fs, kind);
    reversed.reverse();
    reversed
}

// Pole quality factors of the order-5 Butterworth conjugate pairs.
const BUTTERWORTH5_Q: [f64; 2] = [0.6180339887498948, 1.618033988749895];

fn cascade(data: &[f64], cutoff: f64, fs: f64, kind: FilterKind) -> Vec<f64> {
    let mut out = first_order(data, cutoff, fs, kind);
    for q in BUTTERWORTH5_Q {
        out = Biquad::design(kind, cutoff, fs, q).run(&out);
    }
    out
}

fn first_order(data: &[f64], cutoff: f64, fs: f64, kind: FilterKind) -> Vec<f64> {
    // bilinear transform of the analog prototype with prewarped cutoff
    let wa = (std::f64::consts::PI * cutoff / fs).tan();
    let norm = 1.0 + wa;
    let (b0, b1) = match kind {
        FilterKind::Lowpass => (wa / norm, wa / norm),
        FilterKind::Highpass => (1.0 / norm, -1.0 / norm),
    };
    let a1 = (wa - 1.0) / norm;
    let mut out = Vec::with_capacity(data.len());
    let mut prev_x = data[0];
    let mut prev_y = data[0] * (b0 + b1) / (1.0 + a1);
    for &x in data {
        let y = b0 * x + b1 * prev_x - a1 * prev_y;
        out.push(y);
        prev_x = x;
        prev_y = y;
    }
    out
}

struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    fn design(kind: FilterKind, f0: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * std::f64::consts::PI * f0 / fs;
        let alpha = omega.sin() / (2.0 * q);
        let cos = omega.cos();
        let (b0, b1, b2) = match kind {
            FilterKind::Highpass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
            FilterKind::Lowpass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
        };
        let a0 = 1.0 + alpha;
        Biquad {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
        }
    }

    fn run(&self, data: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(data.len());
        let mut x1 = 0.0;
        let mut x2 = 0.0;
        let mut y1 = 0.0;
        let mut y2 = 0.0;
        for &x in data {
            let y = self.b[0] * x + self.b[1] * x1 + self.b[2] * x2 - self.a[0] * y1 - self.a[1] * y2;
            out.push(y);
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
        }
        out
    }
}

/// Savitzky-Golay smoothing: least-squares polynomial convolution in the
/// interior, explicit polynomial fits over the first and last window at
/// the edges.
pub fn savitzky_golay(data: &[f64], sample_rate: u32, poly_order: usize, window_ms: f64) -> Vec<f64> {
    let mut window = ((window_ms / 1000.0) * sample_rate as f64).round() as usize;
    if window % 2 == 0 {
        window += 1;
    }
    if window <= poly_order {
        window = poly_order + 1 + (poly_order % 2);
    }
    if data.len() < window || window < 3 {
        return data.to_vec();
    }
    let half = window / 2;
    let weights = savgol_weights(window, poly_order);

    let mut out = vec![0.0; data.len()];
    for i in half..data.len() - half {
        out[i] = weights
            .iter()
            .enumerate()
            .map(|(j, w)| w * data[i - half + j])
            .sum();
    }
    // polynomial edge handling
    let head = polyfit(&data[..window], poly_order);
    for (i, slot) in out.iter_mut().take(half).enumerate() {
        *slot = eval_poly(&head, i as f64);
    }
    let tail_start = data.len() - window;
    let tail = polyfit(&data[tail_start..], poly_order);
    for i in data.len() - half..data.len() {
        out[i] = eval_poly(&tail, (i - tail_start) as f64);
    }
    out
}

/// Convolution weights for the smoothed value at the window centre.
fn savgol_weights(window: usize, poly_order: usize) -> Vec<f64> {
    let half = window as isize / 2;
    let m = poly_order + 1;
    // normal matrix M[k][l] = sum_j x_j^(k+l) over centred offsets
    let mut matrix = vec![vec![0.0; m]; m];
    for k in 0..m {
        for l in 0..m {
            matrix[k][l] = (-half..=half).map(|x| (x as f64).powi((k + l) as i32)).sum();
        }
    }
    let mut rhs = vec![0.0; m];
    rhs[0] = 1.0;
    let solution = solve_linear(matrix, rhs);
    (-half..=half)
        .map(|x| {
            solution
                .iter()
                .enumerate()
                .map(|(k, z)| z * (x as f64).powi(k as i32))
                .sum()
        })
        .collect()
}

/// Least-squares polynomial coefficients (ascending powers) over samples
/// at x = 0, 1, ... len-1.
fn polyfit(samples: &[f64], poly_order: usize) -> Vec<f64> {
    let m = poly_order + 1;
    let mut matrix = vec![vec![0.0; m]; m];
    let mut rhs = vec![0.0; m];
    for (j, &y) in samples.iter().enumerate() {
        let x = j as f64;
        for k in 0..m {
            rhs[k] += y * x.powi(k as i32);
            for l in 0..m {
                matrix[k][l] += x.powi((k + l) as i32);
            }
        }
    }
    solve_linear(matrix, rhs)
}

fn eval_poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Gaussian elimination with partial pivoting for the small dense systems
/// above.
fn solve_linear(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Vec<f64> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| matrix[a][col].abs().partial_cmp(&matrix[b][col].abs()).unwrap())
            .unwrap();
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);
        let diag = matrix[col][col];
        for row in col + 1..n {
            let factor = matrix[row][col] / diag;
            for k in col..n {
                let upper = matrix[col][k];
                matrix[row][k] -= factor * upper;
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in row + 1..n {
            acc -= matrix[row][k] * solution[k];
        }
        solution[row] = acc / matrix[row][row];
    }
    solution
}

/// Natural cubic spline through strictly increasing knots.
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    second_derivs: Vec<f64>,
}

impl CubicSpline {
    /// Fit the spline; `knots` must be strictly increasing and at least
    /// two points long.
    pub fn fit(knots: &[f64], values: &[f64]) -> Self {
        let n = knots.len();
        debug_assert!(n >= 2 && n == values.len());
        let mut second = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the tridiagonal system for the interior
            // second derivatives; natural boundary conditions.
            let mut diag = vec![0.0; n];
            let mut sup = vec![0.0; n];
            let mut rhs = vec![0.0; n];
            for i in 1..n - 1 {
                let h0 = knots[i] - knots[i - 1];
                let h1 = knots[i + 1] - knots[i];
                diag[i] = 2.0 * (h0 + h1);
                sup[i] = h1;
                rhs[i] = 6.0
                    * ((values[i + 1] - values[i]) / h1 - (values[i] - values[i - 1]) / h0);
            }
            for i in 2..n - 1 {
                let sub = knots[i] - knots[i - 1];
                let w = sub / diag[i - 1];
                diag[i] -= w * sup[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            second[n - 2] = rhs[n - 2] / diag[n - 2];
            for i in (1..n - 2).rev() {
                second[i] = (rhs[i] - sup[i] * second[i + 1]) / diag[i];
            }
        }
        Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            second_derivs: second,
        }
    }

    /// Evaluate at `x`; outside the knot range the boundary segment's
    /// polynomial is extended.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.knots.len();
        let mut lo = 0usize;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.knots[mid] <= x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let h = self.knots[hi] - self.knots[lo];
        let a = (self.knots[hi] - x) / h;
        let b = (x - self.knots[lo]) / h;
        a * self.values[lo]
            + b * self.values[hi]
            + ((a.powi(3) - a) * self.second_derivs[lo] + (b.powi(3) - b) * self.second_derivs[hi])
                * h * h
                / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_interpolates_knots_exactly() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 3.0, 2.0, 5.0, 4.0];
        let spline = CubicSpline::fit(&xs, &ys);
        for (x, y) in xs.iter().zip(&ys) {
            assert!((spline.eval(*x) - y).abs() < 1e-9);
        }
    }

    #[test]
    fn spline_is_linear_for_two_points() {
        let spline = CubicSpline::fit(&[0.0, 10.0], &[0.0, 5.0]);
        assert!((spline.eval(4.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn upsample_multiplies_length() {
        let data: Vec<f64> = (0..20).map(|i| (i as f64 * 0.7).sin()).collect();
        let out = cubic_spline_upsample(&data, 100, 500).unwrap();
        assert_eq!(out.len(), data.len() * 5);
        // original samples are preserved at the knot positions
        for (i, &v) in data.iter().enumerate() {
            assert!((out[i * 5] - v).abs() < 1e-9);
        }
    }

    #[test]
    fn indivisible_resample_rate_rejected() {
        let result = cubic_spline_upsample(&[0.0, 1.0], 300, 1000);
        assert!(matches!(
            result,
            Err(ConfigError::IndivisibleResampleRate { .. })
        ));
    }

    #[test]
    fn highpass_removes_constant_offset() {
        let fs = 100u32;
        let data: Vec<f64> = (0..2000)
            .map(|i| 10.0 + (2.0 * std::f64::consts::PI * 5.0 * i as f64 / 100.0).sin())
            .collect();
        let filtered = butterworth_filter(&data, 0.5, fs, FilterKind::Highpass);
        let mid = &filtered[500..1500];
        let mean = mid.iter().sum::<f64>() / mid.len() as f64;
        assert!(mean.abs() < 0.1, "offset not removed: mean {mean}");
        // the 5 Hz carrier survives mostly intact
        let amp = mid.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(amp > 0.8, "carrier attenuated: amp {amp}");
    }

    #[test]
    fn lowpass_attenuates_fast_component() {
        let fs = 100u32;
        let data: Vec<f64> = (0..2000)
            .map(|i| {
                let t = i as f64 / 100.0;
                (2.0 * std::f64::consts::PI * 1.0 * t).sin()
                    + (2.0 * std::f64::consts::PI * 30.0 * t).sin()
            })
            .collect();
        let filtered = butterworth_filter(&data, 5.0, fs, FilterKind::Lowpass);
        // compare high-frequency energy via successive differences
        let wiggle = |xs: &[f64]| {
            xs.windows(2)
                .map(|w| (w[1] - w[0]).powi(2))
                .sum::<f64>()
        };
        assert!(wiggle(&filtered[200..1800]) < wiggle(&data[200..1800]) * 0.2);
    }

    #[test]
    fn out_of_band_cutoff_is_identity() {
        let data = vec![1.0, 2.0, 3.0];
        assert_eq!(
            butterworth_filter(&data, 60.0, 100, FilterKind::Lowpass),
            data
        );
    }

    #[test]
    fn savgol_preserves_cubic_polynomials() {
        // a degree-3 filter reproduces degree-3 data exactly, edges included
        let data: Vec<f64> = (0..50)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x * x - 2.0 * x * x + 3.0 * x - 1.0
            })
            .collect();
        let out = savitzky_golay(&data, 100, 3, 110.0);
        for (a, b) in data.iter().zip(&out) {
            assert!((a - b).abs() < 1e-6, "expected {a}, got {b}");
        }
    }

    #[test]
    fn savgol_smooths_noise() {
        let noisy: Vec<f64> = (0..200)
            .map(|i| (i as f64 * 0.1).sin() + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        let smooth = savitzky_golay(&noisy, 100, 3, 150.0);
        let wiggle = |xs: &[f64]| {
            xs.windows(2)
                .map(|w| (w[1] - w[0]).powi(2))
                .sum::<f64>()
        };
        assert!(wiggle(&smooth[20..180]) < wiggle(&noisy[20..180]) * 0.5);
    }

    #[test]
    fn preprocess_rejects_nan_with_index() {
        let signal = Signal::new(vec![0.0, f64::NAN], 100);
        match preprocess(&signal, &PreprocessOptions::default()) {
            Err(ConfigError::NanSample(idx)) => assert_eq!(idx, 1),
            other => panic!("expected NaN rejection, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn default_chain_upsamples_to_target_rate() {
        let signal = Signal::new((0..100).map(|i| (i as f64 * 0.3).sin()).collect(), 100);
        let out = preprocess(&signal, &PreprocessOptions::default()).unwrap();
        assert_eq!(out.sample_rate, 1000);
        assert_eq!(out.len(), 1000);
    }
}
