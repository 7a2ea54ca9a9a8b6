use serde::Serialize;

use crate::config::{FACTORY_A0, FACTORY_A1, FACTORY_A2, NORM_EPS};
use crate::data::model::RawCapture;
use crate::error::{EngineError, EngineResult};

/// Where the wavelength axis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    /// The dataset's own wavelength column, used verbatim.
    Dataset,
    /// The instrument's fixed quadratic fit.
    Factory,
}

/// A calibrated, normalised trace ordered by ascending wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub pixel: Vec<f64>,
    pub nm: Vec<f64>,
    /// Un-normalised scalar intensity (`max(R, G, B)`).
    pub raw: Vec<f64>,
    /// `raw / (max(raw) + ε)`, in `[0, 1]`.
    pub intensity: Vec<f64>,
    pub calibration: CalibrationSource,
    /// The axis was neither ascending nor simply reversed and had to be sorted.
    pub resorted: bool,
}

/// Factory pixel → nm mapping.
pub fn factory_nm(px: f64) -> f64 {
    (FACTORY_A2 * px + FACTORY_A1) * px + FACTORY_A0
}

impl Spectrum {
    /// Calibrate and normalise a capture.
    pub fn from_capture(capture: &RawCapture) -> EngineResult<Self> {
        let n = capture.len();
        if n < 3 {
            return Err(EngineError::TooFewSamples(n));
        }
        if capture.signal.len() != n {
            return Err(EngineError::LengthMismatch {
                column: "signal",
                expected: n,
                found: capture.signal.len(),
            });
        }

        let (mut nm, calibration) = match &capture.wavelength {
            Some(column) => {
                if column.len() != n {
                    return Err(EngineError::LengthMismatch {
                        column: "wavelength",
                        expected: n,
                        found: column.len(),
                    });
                }
                (column.clone(), CalibrationSource::Dataset)
            }
            None => (
                capture
                    .pixel
                    .iter()
                    .map(|&px| factory_nm(px))
                    .collect::<Vec<_>>(),
                CalibrationSource::Factory,
            ),
        };
        if let Some(i) = nm.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::NonFiniteWavelength(i));
        }

        let mut pixel = capture.pixel.clone();
        let mut raw = capture.signal.scalar();

        if nm[1] < nm[0] {
            nm.reverse();
            pixel.reverse();
            raw.reverse();
        }

        let resorted = nm.windows(2).any(|w| w[1] < w[0]);
        if resorted {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| nm[a].total_cmp(&nm[b]));
            nm = order.iter().map(|&i| nm[i]).collect();
            pixel = order.iter().map(|&i| pixel[i]).collect();
            raw = order.iter().map(|&i| raw[i]).collect();
        }

        let peak = raw
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max);
        let intensity = raw
            .iter()
            .map(|&v| if v.is_finite() { v / (peak + NORM_EPS) } else { 0.0 })
            .collect();

        log::debug!(
            "calibrated {n} samples ({calibration:?}), {:.2}..{:.2} nm",
            nm[0],
            nm[n - 1]
        );

        Ok(Self {
            pixel,
            nm,
            raw,
            intensity,
            calibration,
            resorted,
        })
    }

    pub fn len(&self) -> usize {
        self.nm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nm.is_empty()
    }

    /// `(min, max)` of the wavelength axis.
    pub fn nm_range(&self) -> (f64, f64) {
        (self.nm[0], self.nm[self.nm.len() - 1])
    }

    /// Inverted trace modelling absorption-line darkening: `(max − raw) / (max + ε)`.
    pub fn absorption_trace(&self) -> Vec<f64> {
        let peak = self
            .raw
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max);
        self.raw
            .iter()
            .map(|&v| if v.is_finite() { (peak - v) / (peak + NORM_EPS) } else { 0.0 })
            .collect()
    }
}
