use serde::Serialize;

use super::stats;

/// A contiguous run of near-saturated samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlateauSegment {
    pub nm_lo: f64,
    pub nm_hi: f64,
    pub nm_mid: f64,
    pub left: usize,
    pub right: usize,
}

impl PlateauSegment {
    pub fn width_nm(&self) -> f64 {
        self.nm_hi - self.nm_lo
    }
}

/// Flat-top regions at or above `rel_top × max(y)`.
///
/// Each run is widened while `y` stays within `rel_eps × max(y)` of the
/// threshold. Saturated lines often do not register as local maxima, so
/// this pass is independent of the peak detector.
pub fn plateau_segments(y: &[f64], nm: &[f64], rel_top: f64, rel_eps: f64) -> Vec<PlateauSegment> {
    let n = y.len().min(nm.len());
    let ymax = match stats::max(&y[..n]) {
        Some(m) if m > 0.0 => m,
        _ => return Vec::new(),
    };
    let thr = rel_top * ymax;
    let widen = thr - rel_eps * ymax;

    let mut segments = Vec::new();
    let mut i = 0;
    while i < n {
        if y[i] < thr {
            i += 1;
            continue;
        }
        let mut j = i;
        while j < n && y[j] >= thr {
            j += 1;
        }
        let mut left = i;
        while left > 0 && y[left - 1] >= widen {
            left -= 1;
        }
        let mut right = j - 1;
        while right + 1 < n && y[right + 1] >= widen {
            right += 1;
        }
        let (nm_lo, nm_hi) = (nm[left], nm[right]);
        segments.push(PlateauSegment {
            nm_lo,
            nm_hi,
            nm_mid: 0.5 * (nm_lo + nm_hi),
            left,
            right,
        });
        i = right + 1;
    }
    segments
}
