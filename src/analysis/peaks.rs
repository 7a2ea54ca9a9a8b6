//! Multi-scale, plateau-aware peak detection.
//!
//! Single-scale detection either misses broad saturated lines or
//! over-fragments noisy narrow ones. Each scale smooths the trace with a
//! boxcar, finds local maxima above a relative height, and centres every
//! maximum on its plateau. The union over scales (plus the global maximum)
//! is then merged so that no two peaks sit within [`PEAK_MERGE_NM`].

use std::cmp::Ordering;

use serde::Serialize;

use super::stats;
use crate::config::{Scale, PEAK_MERGE_NM, PEAK_REL_EPS};

/// A detected local maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub index: usize,
    pub nm: f64,
    /// Normalised intensity at `index`.
    pub amplitude: f64,
    /// Full width at half maximum (nm).
    pub fwhm_nm: f64,
}

/// Centred moving average with zero padding (`np.convolve(y, box, "same")`).
///
/// Even kernels are bumped to the next odd size.
pub fn smooth(y: &[f64], kernel: usize) -> Vec<f64> {
    if kernel <= 1 {
        return y.to_vec();
    }
    let k = if kernel % 2 == 1 { kernel } else { kernel + 1 };
    let half = k / 2;
    let n = y.len();

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in y {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            (prefix[hi] - prefix[lo]) / k as f64
        })
        .collect()
}

/// Local maxima of `y`, each centred on its plateau.
///
/// A sample qualifies when it is at least `rel_height × max(y)` and not lower
/// than either neighbour. The plateau grows while `y` stays within
/// `rel_eps × y[i]` of the candidate (and above the height threshold); the
/// returned index is the plateau midpoint. Scanning resumes after the plateau.
pub fn local_maxima_plateau(y: &[f64], rel_eps: f64, rel_height: f64) -> Vec<usize> {
    let n = y.len();
    if n < 3 {
        return Vec::new();
    }
    let ymax = stats::max(y).unwrap_or(0.0);
    let thr = rel_height * ymax;

    let mut peaks = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        let yi = y[i];
        if yi < thr || yi < y[i - 1] || yi < y[i + 1] {
            i += 1;
            continue;
        }
        let floor = thr.max(yi - rel_eps * yi.max(1e-12));
        let mut left = i;
        while left > 0 && y[left - 1] >= floor {
            left -= 1;
        }
        let mut right = i;
        while right + 1 < n && y[right + 1] >= floor {
            right += 1;
        }
        peaks.push((left + right) / 2);
        i = right + 1;
    }
    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

/// Candidate peak indices of a normalised trace, ascending.
///
/// Returns nothing for a trace without any positive sample.
pub fn detect_peaks(nm: &[f64], intensity: &[f64], scales: &[Scale]) -> Vec<usize> {
    let Some(i_max) = stats::argmax(intensity) else {
        return Vec::new();
    };
    if intensity[i_max] <= 0.0 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = scales
        .iter()
        .flat_map(|s| {
            local_maxima_plateau(&smooth(intensity, s.kernel), PEAK_REL_EPS, s.rel_height)
        })
        .collect();
    candidates.push(i_max);
    candidates.sort_unstable();
    candidates.dedup();

    let mut merged: Vec<usize> = Vec::with_capacity(candidates.len());
    for i in candidates {
        match merged.last_mut() {
            Some(prev) if (nm[i] - nm[*prev]).abs() <= PEAK_MERGE_NM => {
                if intensity[i] > intensity[*prev] {
                    *prev = i;
                }
            }
            _ => merged.push(i),
        }
    }
    merged
}

/// Enforce a minimum separation, strongest peaks first.
///
/// Ties in intensity keep the lower index. The result is ascending.
pub fn enforce_min_distance(
    nm: &[f64],
    intensity: &[f64],
    peaks: &[usize],
    min_dist_nm: f64,
) -> Vec<usize> {
    let mut by_strength = peaks.to_vec();
    by_strength.sort_by(|&a, &b| {
        intensity[b]
            .partial_cmp(&intensity[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut kept: Vec<usize> = Vec::new();
    for i in by_strength {
        if kept.iter().all(|&j| (nm[i] - nm[j]).abs() >= min_dist_nm) {
            kept.push(i);
        }
    }
    kept.sort_unstable();
    kept
}

/// Full width at half maximum around `index`, walking outward on `intensity`.
pub fn fwhm(nm: &[f64], intensity: &[f64], index: usize) -> f64 {
    let half = 0.5 * intensity[index];
    let mut left = index;
    while left > 0 && intensity[left] >= half {
        left -= 1;
    }
    let mut right = index;
    while right + 1 < intensity.len() && intensity[right] >= half {
        right += 1;
    }
    (nm[right] - nm[left]).max(0.0)
}

/// Attach position, amplitude and width to peak indices.
pub fn describe(nm: &[f64], intensity: &[f64], indices: &[usize]) -> Vec<Peak> {
    indices
        .iter()
        .map(|&index| Peak {
            index,
            nm: nm[index],
            amplitude: intensity[index],
            fwhm_nm: fwhm(nm, intensity, index),
        })
        .collect()
}
